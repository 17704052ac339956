//! Menu flows: what each menu entry does
//!
//! Every flow is a chain of engine continuations. Each list hands Esc back
//! to its parent with `on_cancel`, so the chain never dead-ends.

pub(crate) mod scripts;
pub(crate) mod servers;
pub(crate) mod settings;
pub(crate) mod storage;
pub(crate) mod wifi;

use std::rc::Rc;

use tracing::{info, warn};

use super::{Context, Transition};
use crate::error::InkdeckError;
use crate::menu::{validate, MenuEngine, Wizard};
use crate::services::{CredentialStore, ServerRecord, DEFAULT_SSH_PORT};
use crate::ssh::ConnectParams;

pub type Menu = MenuEngine<Context>;

/// Continuation picked up after a detour, such as joining a network
pub(crate) type Resume = Rc<dyn Fn(&mut Menu, &mut Context)>;

const MAIN_ITEMS: [&str; 5] = ["Saved Servers", "Quick Connect", "Scripts", "Settings", "Power Off"];

pub(crate) fn items(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|label| label.to_string()).collect()
}

pub fn main_menu(menu: &mut Menu) {
    menu.list("Main Menu", items(&MAIN_ITEMS), |menu, ctx, index| match index {
        0 => servers::server_list(menu, ctx),
        1 => quick_connect(menu, None),
        2 => scripts::script_list(menu, ctx),
        3 => settings::settings_menu(menu),
        _ => ctx.go(Transition::Shutdown),
    });
}

/// Open a session to `server`, joining a network first if needed.
/// `command` is typed into the shell once it is up.
pub(crate) fn connect(menu: &mut Menu, ctx: &mut Context, server: ServerRecord, command: Option<String>) {
    if !ctx.wifi.is_connected() {
        let err = InkdeckError::NetworkUnavailable;
        warn!(host = %server.host, "connect requested without a network");
        let resume: Resume = Rc::new(move |menu: &mut Menu, ctx: &mut Context| {
            connect(menu, ctx, server.clone(), command.clone());
        });
        menu.message_then(err.banner(), "Join a network first", move |menu, ctx| {
            wifi::wifi_menu(menu, ctx, Some(resume));
        });
        return;
    }

    let key = match ctx.vault.ssh_key() {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "stored SSH key unreadable, using the password only");
            None
        },
    };
    info!(
        host = %server.host,
        port = server.port,
        user = %server.user,
        with_key = key.is_some(),
        "connecting"
    );
    let params = ConnectParams::new(&server.host, server.port, &server.user, &server.password)
        .with_terminal(&ctx.config)
        .with_key(key)
        .with_initial_command(command);
    ctx.go(Transition::Terminal(params));
}

/// Connect without saving anything
pub(crate) fn quick_connect(menu: &mut Menu, command: Option<String>) {
    let wizard = Wizard::new()
        .text("Host / IP", "")
        .check(validate::not_empty)
        .numeric("Port", &DEFAULT_SSH_PORT.to_string())
        .check(validate::port)
        .text("User", "")
        .check(validate::not_empty)
        .masked("Password", "");
    menu.run_wizard(
        wizard,
        move |menu, ctx, answers| {
            let [host, port, user, password] = answers.as_slice() else {
                return main_menu(menu);
            };
            let port = port.parse().unwrap_or(DEFAULT_SSH_PORT);
            connect(menu, ctx, ServerRecord::new("", host, port, user, password), command);
        },
        |menu, _| main_menu(menu),
    );
}
