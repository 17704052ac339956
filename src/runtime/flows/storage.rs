//! Storage & Keys: USB mass storage and SSH key import

use tracing::{info, warn};

use super::settings::settings_menu;
use super::{items, Menu};
use crate::error::InkdeckError;
use crate::menu::{Dialog, LoopAction, Reply};
use crate::runtime::Context;
use crate::services::{CredentialStore, SD_KEY_PATH};

/// Start USB mode, then offer the key sources
pub(crate) fn storage_menu(menu: &mut Menu, ctx: &mut Context) {
    let (title, body) = if ctx.usb.start_usb_mode() {
        ("USB Active", "Connect to PC, copy id_rsa")
    } else {
        warn!("USB mass storage did not start");
        ("Warning", "USB Init Failed")
    };
    menu.message_then(title, body, |menu, _| key_sources(menu));
    menu.on_cancel(leave);
}

fn leave(menu: &mut Menu, ctx: &mut Context) {
    if ctx.usb.is_active() {
        ctx.usb.stop_usb_mode();
    }
    settings_menu(menu);
}

fn key_sources(menu: &mut Menu) {
    let dialog = Dialog::list("Storage & Keys", items(&["Scan USB Disk", "Import from SD"]));
    menu.push(dialog, |menu, ctx, reply| match reply {
        Reply::Index(0) => {
            let key = ctx.usb.scan_for_key();
            import(menu, ctx, key);
        },
        Reply::Index(_) => {
            ctx.show_progress("Storage & Keys", "Reading SD card...");
            match ctx.usb.read_sd_key(SD_KEY_PATH) {
                Ok(key) => import(menu, ctx, key),
                Err(e) => {
                    warn!(error = %e, "SD import failed");
                    menu.message_then(e.banner(), &e.to_string(), |menu, _| key_sources(menu));
                },
            }
        },
        Reply::Closed => menu.message_then("DISCONNECTED", "Safe to remove", leave),
        _ => key_sources(menu),
    });
    menu.on_cancel(leave);
    menu.set_on_loop(|ctx, _| {
        if !ctx.usb.is_active() || !ctx.usb.is_eject_requested() {
            return LoopAction::Continue;
        }
        info!("host ejected the USB disk");
        ctx.usb.clear_eject_request();
        ctx.usb.stop_usb_mode();
        LoopAction::Close
    });
}

fn import(menu: &mut Menu, ctx: &mut Context, key: Option<String>) {
    let Some(pem) = key else {
        menu.message_then("No Key Found", "No PEM private key found", |menu, _| key_sources(menu));
        return;
    };
    match ctx.vault.save_ssh_key(&pem) {
        Ok(()) => {
            info!(bytes = pem.len(), "SSH key imported");
            menu.message_then("Key Imported!", "Stored encrypted", |menu, _| key_sources(menu));
        },
        Err(e) => {
            warn!(error = %e, "key not stored");
            let err = InkdeckError::from(e);
            menu.message_then(err.banner(), &err.to_string(), |menu, _| key_sources(menu));
        },
    }
}
