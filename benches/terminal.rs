//! Parser and terminal model benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use inkdeck::parser::Parser;
use inkdeck::Terminal;

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    let plain = "Hello, World! ".repeat(1000);
    group.throughput(Throughput::Bytes(plain.len() as u64));
    group.bench_function("plain_text", |b| {
        b.iter(|| {
            let mut parser = Parser::new();
            black_box(parser.parse(black_box(plain.as_bytes())))
        })
    });

    let csi_heavy = "\x1b[7mInv\x1b[0m \x1b[5;10H\x1b[K\x1b[2J".repeat(200);
    group.throughput(Throughput::Bytes(csi_heavy.len() as u64));
    group.bench_function("csi_sequences", |b| {
        b.iter(|| {
            let mut parser = Parser::new();
            black_box(parser.parse(black_box(csi_heavy.as_bytes())))
        })
    });

    group.finish();
}

fn bench_terminal(c: &mut Criterion) {
    let mut group = c.benchmark_group("terminal");

    // Typical shell output: short lines, some colors, constant scrolling
    let listing = "drwxr-xr-x  2 pi pi 4096 \x1b[34mdir\x1b[0m\r\n".repeat(400);
    group.throughput(Throughput::Bytes(listing.len() as u64));
    group.bench_function("scrolling_listing", |b| {
        b.iter(|| {
            let mut term = Terminal::new(40, 30, 200);
            term.process(black_box(listing.as_bytes()));
            black_box(term.screen().scrollback().len())
        })
    });

    // Full-screen app repaint on the alternate grid
    let mut repaint = String::from("\x1b[?1049h");
    for row in 1..=30 {
        repaint.push_str(&format!("\x1b[{};1H\x1b[7m{:<40}\x1b[0m", row, row));
    }
    repaint.push_str("\x1b[?1049l");
    group.throughput(Throughput::Bytes(repaint.len() as u64));
    group.bench_function("alternate_repaint", |b| {
        b.iter(|| {
            let mut term = Terminal::new(40, 30, 200);
            term.process(black_box(repaint.as_bytes()));
            black_box(term)
        })
    });

    let region = "\x1b[2;29r\x1b[29;1H".to_string() + &"scrolled line\n".repeat(300);
    group.bench_function("scroll_region", |b| {
        b.iter(|| {
            let mut term = Terminal::new(40, 30, 200);
            term.process(black_box(region.as_bytes()));
            black_box(term)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_terminal);
criterion_main!(benches);
