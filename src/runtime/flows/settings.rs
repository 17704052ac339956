//! Settings and the system pages under it

use std::time::Duration;

use tracing::{info, warn};

use super::{items, main_menu, storage, wifi, Menu};
use crate::error::{InkdeckError, Result};
use crate::menu::{validate, LoopAction, Wizard};
use crate::runtime::Context;
use crate::services::{CredentialStore, ServerStore, VaultSnapshot, VersionEntry};
use crate::FIRMWARE_VERSION;

const SETTINGS_ITEMS: [&str; 7] = [
    "Change PIN",
    "WiFi Network",
    "Storage & Keys",
    "System Update",
    "System Info",
    "Battery Info",
    "Back",
];

/// Battery page refresh
const BATTERY_REFRESH: Duration = Duration::from_secs(1);

pub(crate) fn settings_menu(menu: &mut Menu) {
    menu.list("Settings", items(&SETTINGS_ITEMS), |menu, ctx, index| match index {
        0 => change_pin(menu),
        1 => wifi::wifi_menu(menu, ctx, None),
        2 => storage::storage_menu(menu, ctx),
        3 => system_update(menu, ctx),
        4 => system_info(menu, ctx),
        5 => battery_info(menu, ctx),
        _ => main_menu(menu),
    });
    menu.on_cancel(|menu, _| main_menu(menu));
}

fn back(menu: &mut Menu, _ctx: &mut Context) {
    settings_menu(menu);
}

fn change_pin(menu: &mut Menu) {
    let wizard = Wizard::new()
        .masked("New PIN", "")
        .check(validate::not_empty)
        .masked("Confirm PIN", "");
    menu.run_wizard(
        wizard,
        |menu, ctx, answers| {
            let [pin, confirm] = answers.as_slice() else {
                return settings_menu(menu);
            };
            if pin != confirm {
                menu.message_then("PIN Mismatch", "The PINs did not match", back);
                return;
            }
            match reseal(ctx, pin) {
                Ok(()) => menu.message_then("PIN Changed", "Saved secrets re-encrypted", back),
                Err(e) => {
                    warn!(error = %e, "PIN change failed");
                    menu.message_then(e.banner(), &e.to_string(), back);
                },
            }
        },
        back,
    );
}

/// New PIN, then seal every stored secret under it
///
/// Any failure puts the old PIN back and rewrites both stores under it.
fn reseal(ctx: &mut Context, pin: &str) -> Result<()> {
    let snapshot = ctx.vault.snapshot();
    let result = ctx
        .vault
        .change_pin(pin)
        .map_err(InkdeckError::from)
        .and_then(|()| ctx.servers.re_encrypt_all(&ctx.vault))
        .and_then(|()| ctx.wifi.re_encrypt_all(&ctx.vault));
    match result {
        Ok(()) => {
            info!("PIN changed, stores re-encrypted");
            Ok(())
        },
        Err(e) => {
            roll_back(ctx, snapshot);
            Err(e)
        },
    }
}

fn roll_back(ctx: &mut Context, snapshot: VaultSnapshot) {
    if let Err(e) = ctx.vault.restore(snapshot) {
        warn!(error = %e, "could not restore previous PIN");
    }
    if let Err(e) = ctx.servers.re_encrypt_all(&ctx.vault) {
        warn!(error = %e, "servers not rewritten under previous PIN");
    }
    if let Err(e) = ctx.wifi.re_encrypt_all(&ctx.vault) {
        warn!(error = %e, "networks not rewritten under previous PIN");
    }
}

fn system_update(menu: &mut Menu, ctx: &mut Context) {
    ctx.show_progress("System Update", "Checking for updates...");
    let url = ctx.config.ota.manifest_url.clone();
    let manifest = match ctx.ota.fetch_manifest(&url) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!(error = %e, "manifest fetch failed");
            let err = InkdeckError::from(e);
            menu.message_then(err.banner(), &err.to_string(), back);
            return;
        },
    };
    if manifest.versions.is_empty() {
        menu.message_then("System Update", "No updates available", back);
        return;
    }

    let labels = manifest.labels(FIRMWARE_VERSION);
    let versions = manifest.versions;
    menu.list("Select Version", labels, move |menu, _, index| match versions.get(index).cloned() {
        Some(entry) => confirm_install(menu, entry),
        None => settings_menu(menu),
    });
    menu.on_cancel(back);
}

fn confirm_install(menu: &mut Menu, entry: VersionEntry) {
    let title = format!("Install {}?", entry.version);
    menu.list(&title, items(&["No", "Yes"]), move |menu, ctx, choice| {
        if choice != 1 {
            return settings_menu(menu);
        }
        ctx.show_progress("Updating...", &format!("Installing {}", entry.version));
        match ctx.ota.update_from_url(&entry.url, entry.sha256.as_deref()) {
            Ok(bytes) => {
                info!(version = %entry.version, bytes, "firmware written");
                menu.message_then("Update Complete", "Restart to run the new firmware", back);
            },
            Err(e) => {
                warn!(version = %entry.version, error = %e, "update failed");
                menu.message_then("System Update", &format!("Update Failed: {}", e), back);
            },
        }
    });
    menu.on_cancel(back);
}

fn system_info(menu: &mut Menu, ctx: &mut Context) {
    let mut lines = vec![
        format!("Version: {}", FIRMWARE_VERSION),
        format!("Servers: {}", ctx.servers.list().len()),
        format!("Scripts: {}", ctx.scripts.list().len()),
    ];
    if ctx.wifi.is_connected() {
        lines.push(format!("WiFi: {}", ctx.wifi.ssid().unwrap_or_default()));
        lines.push(format!("IP: {}", ctx.wifi.ip().unwrap_or_default()));
    } else {
        lines.push("WiFi: not connected".to_string());
    }
    menu.message_then("System Info", &lines.join("\n"), back);
}

fn battery_info(menu: &mut Menu, ctx: &mut Context) {
    let mut shown = ctx.power.status().describe();
    let mut next = ctx.now + BATTERY_REFRESH;
    menu.message_then("Battery Info", &shown, back);
    menu.set_on_loop(move |ctx, dialog| {
        if ctx.now < next {
            return LoopAction::Continue;
        }
        next = ctx.now + BATTERY_REFRESH;
        let body = ctx.power.status().describe();
        if body == shown {
            return LoopAction::Continue;
        }
        dialog.set_body(&body);
        shown = body;
        LoopAction::Redraw
    });
}
