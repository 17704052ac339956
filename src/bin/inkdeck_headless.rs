//! Inkdeck Headless Runner
//!
//! Feeds a byte stream through the terminal model at the device geometry
//! and prints the resulting state. Reads a file or stdin.

use std::io::{self, Read};
use std::process::ExitCode;

use inkdeck::app::{init_logging, Config};
use inkdeck::core::Snapshot;
use inkdeck::render::{compose_terminal, RefreshDecision, StatusBanner};
use inkdeck::Terminal;

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
    /// Draw ops of one full refresh
    Frame,
}

fn main() -> ExitCode {
    init_logging();

    let mut format = OutputFormat::Text;
    let mut input_file: Option<String> = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-t" | "--text" => format = OutputFormat::Text,
            "-j" | "--json" => format = OutputFormat::Json,
            "--frame" => format = OutputFormat::Frame,
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            },
            other if !other.starts_with('-') && input_file.is_none() => {
                input_file = Some(other.to_string());
            },
            other => {
                eprintln!("Unknown option '{}'", other);
                return ExitCode::FAILURE;
            },
        }
    }

    let input = match &input_file {
        Some(path) => match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path, e);
                return ExitCode::FAILURE;
            },
        },
        None => {
            let mut data = Vec::new();
            if let Err(e) = io::stdin().read_to_end(&mut data) {
                eprintln!("Error reading stdin: {}", e);
                return ExitCode::FAILURE;
            }
            data
        },
    };

    let config = Config::default();
    let mut terminal = Terminal::new(config.cols, config.rows, config.scrollback_lines);
    terminal.process(&input);

    let output = match format {
        OutputFormat::Text => Ok(Snapshot::from_screen(terminal.screen()).to_text()),
        OutputFormat::Json => Snapshot::from_screen(terminal.screen()).to_json(),
        OutputFormat::Frame => {
            compose_terminal(terminal.screen(), RefreshDecision::Full, &StatusBanner::new("headless")).to_json()
        },
    };
    match output {
        Ok(text) => {
            println!("{}", text.trim_end());
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            ExitCode::FAILURE
        },
    }
}

fn print_help() {
    println!("Inkdeck Headless Runner");
    println!();
    println!("Usage: inkdeck-headless [OPTIONS] [INPUT_FILE]");
    println!();
    println!("Options:");
    println!("  -t, --text   Print the screen as text (default)");
    println!("  -j, --json   Print the snapshot as JSON");
    println!("      --frame  Print the draw ops of a full refresh as JSON");
    println!("  -h, --help   Show this help message");
    println!();
    println!("Reads stdin when no input file is given.");
}
