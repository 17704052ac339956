//! Wi-Fi: saved networks, scanning, joining and the boot-time auto-connect

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::settings::settings_menu;
use super::{items, main_menu, Menu, Resume};
use crate::menu::{Dialog, InputKind, LoopAction, Reply};
use crate::runtime::Context;
use crate::services::ScanResult;

const SCAN: &str = "Scan Networks";

/// Saved networks plus a scan entry. With `resume`, a successful join
/// continues the interrupted flow instead of returning to Settings.
pub(crate) fn wifi_menu(menu: &mut Menu, ctx: &mut Context, resume: Option<Resume>) {
    let saved = ctx.wifi.saved_networks();
    let connected = ctx.wifi.ssid().filter(|_| ctx.wifi.is_connected());
    let mut labels: Vec<String> = saved
        .iter()
        .map(|ssid| {
            if connected.as_deref() == Some(ssid.as_str()) {
                format!("{} (On)", ssid)
            } else {
                ssid.clone()
            }
        })
        .collect();
    labels.push(SCAN.to_string());

    let back = resume.clone();
    menu.list("WiFi Network", labels, move |menu, ctx, index| match saved.get(index) {
        Some(ssid) => network_actions(menu, ssid.clone(), index, resume),
        None => scan(menu, ctx, resume),
    });
    menu.on_cancel(move |menu, _| leave(menu, back));
}

fn leave(menu: &mut Menu, resume: Option<Resume>) {
    match resume {
        Some(_) => main_menu(menu),
        None => settings_menu(menu),
    }
}

fn network_actions(menu: &mut Menu, ssid: String, index: usize, resume: Option<Resume>) {
    let back = resume.clone();
    let title = ssid.clone();
    menu.list(&title, items(&["Connect", "Forget"]), move |menu, ctx, choice| {
        if choice == 0 {
            let password = ctx.wifi.saved_password(&ssid).unwrap_or_default();
            join(menu, ctx, &ssid, &password, resume);
            return;
        }
        match ctx.wifi.forget(&ctx.vault, index) {
            Ok(()) => {
                info!(%ssid, "network forgotten");
                wifi_menu(menu, ctx, resume);
            },
            Err(e) => {
                warn!(error = %e, "forget failed");
                menu.message_then(e.banner(), &e.to_string(), move |menu, ctx| wifi_menu(menu, ctx, resume));
            },
        }
    });
    menu.on_cancel(move |menu, ctx| wifi_menu(menu, ctx, back));
}

fn scan(menu: &mut Menu, ctx: &mut Context, resume: Option<Resume>) {
    ctx.show_progress("WiFi", "Scanning...");
    let found = match ctx.wifi.scan() {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "scan failed");
            menu.message_then("Scan Failed", &e.to_string(), move |menu, ctx| wifi_menu(menu, ctx, resume));
            return;
        },
    };
    if found.is_empty() {
        menu.message_then("No Networks", "Nothing in range", move |menu, ctx| wifi_menu(menu, ctx, resume));
        return;
    }

    let labels = found.iter().map(ScanResult::label).collect();
    let back = resume.clone();
    menu.list("Select Network", labels, move |menu, ctx, index| {
        let Some(network) = found.get(index).cloned() else {
            return wifi_menu(menu, ctx, resume);
        };
        if !network.secure {
            return join(menu, ctx, &network.ssid, "", resume);
        }
        let back = resume.clone();
        menu.input("Password", "", InputKind::Masked, move |menu, ctx, password| {
            join(menu, ctx, &network.ssid, &password, resume);
        });
        menu.on_cancel(move |menu, ctx| wifi_menu(menu, ctx, back));
    });
    menu.on_cancel(move |menu, ctx| wifi_menu(menu, ctx, back));
}

fn join(menu: &mut Menu, ctx: &mut Context, ssid: &str, password: &str, resume: Option<Resume>) {
    ctx.show_progress("Connecting...", ssid);
    if !ctx.wifi.connect_to(ssid, password) {
        warn!(ssid, "join failed");
        menu.message_then("Connection Failed", &format!("Could not join {}", ssid), move |menu, ctx| {
            wifi_menu(menu, ctx, resume)
        });
        return;
    }

    info!(ssid, "joined network");
    if let Err(e) = ctx.wifi.save(&ctx.vault, ssid, password) {
        warn!(error = %e, "network not saved");
    }
    match resume {
        Some(resume) => resume(menu, ctx),
        None => {
            let ip = ctx.wifi.ip().unwrap_or_default();
            menu.message_then("Connected", &format!("{}\nIP: {}", ssid, ip), |menu, _| settings_menu(menu));
        },
    }
}

fn countdown(ssid: &str, seconds: u64) -> String {
    format!("Joining {} in {}s\nAny key to skip", ssid, seconds)
}

/// Offer to rejoin the last-used network. The prompt closes itself after
/// the configured delay and connects; any key skips.
pub(crate) fn auto_connect(menu: &mut Menu, ctx: &mut Context) {
    if ctx.wifi.is_connected() {
        return;
    }
    let Some(ssid) = ctx.wifi.last_used() else {
        return;
    };
    let delay = Duration::from_millis(ctx.config.wifi.auto_connect_delay_ms);
    let mut shown = delay.as_secs();

    let target = ssid.clone();
    menu.push(Dialog::message("WiFi", &countdown(&ssid, shown)), move |menu, ctx, reply| {
        if reply != Reply::Closed {
            debug!("auto-connect skipped");
            return;
        }
        ctx.show_progress("Connecting...", &target);
        if ctx.wifi.connect() {
            let joined = ctx.wifi.ssid().unwrap_or(target);
            info!(ssid = %joined, "auto-connect joined");
            menu.message("WiFi", &format!("Connected to {}", joined));
        } else {
            warn!("auto-connect failed");
            menu.message("Connection Failed", "No saved network answered");
        }
    });

    let mut deadline: Option<Instant> = None;
    menu.set_on_loop(move |ctx, dialog| {
        let end = *deadline.get_or_insert(ctx.now + delay);
        let left = end.saturating_duration_since(ctx.now);
        if left.is_zero() {
            return LoopAction::Close;
        }
        let seconds = (left.as_millis() as u64 + 999) / 1000;
        if seconds == shown {
            return LoopAction::Continue;
        }
        shown = seconds;
        dialog.set_body(&countdown(&ssid, seconds));
        LoopAction::Redraw
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_text() {
        assert_eq!(countdown("home", 3), "Joining home in 3s\nAny key to skip");
    }
}
