//! Saved Servers

use tracing::{info, warn};

use super::{connect, items, main_menu, Menu};
use crate::error::Result;
use crate::menu::{validate, Wizard};
use crate::runtime::Context;
use crate::services::{ServerRecord, ServerStore, DEFAULT_SSH_PORT};

const ADD_SERVER: &str = "+ Add Server";

pub(crate) fn server_list(menu: &mut Menu, ctx: &mut Context) {
    let mut labels: Vec<String> = ctx.servers.list().iter().map(ServerRecord::label).collect();
    let count = labels.len();
    labels.push(ADD_SERVER.to_string());
    menu.list("Saved Servers", labels, move |menu, ctx, index| {
        if index == count {
            add_server(menu);
        } else {
            server_actions(menu, ctx, index);
        }
    });
    menu.on_cancel(|menu, _| main_menu(menu));
}

fn server_actions(menu: &mut Menu, ctx: &mut Context, index: usize) {
    let Some(server) = ctx.servers.get(index).cloned() else {
        return server_list(menu, ctx);
    };
    menu.list(
        &server.label(),
        items(&["Connect", "Edit", "Delete"]),
        move |menu, ctx, choice| match choice {
            0 => connect(menu, ctx, server, None),
            1 => edit_server(menu, index, &server),
            _ => confirm_delete(menu, index, &server.label()),
        },
    );
    menu.on_cancel(server_list);
}

/// Name, Host, User, Port, Password; pre-filled from `server`
fn server_wizard(server: Option<&ServerRecord>) -> Wizard {
    let blank = ServerRecord::new("", "", DEFAULT_SSH_PORT, "", "");
    let s = server.unwrap_or(&blank);
    Wizard::new()
        .text("Name", &s.name)
        .text("Host", &s.host)
        .check(validate::not_empty)
        .text("User", &s.user)
        .check(validate::not_empty)
        .numeric("Port", &s.port.to_string())
        .check(validate::port)
        .masked("Password", &s.password)
}

fn record_from(answers: &[String]) -> Option<ServerRecord> {
    let [name, host, user, port, password] = answers else {
        return None;
    };
    let port = port.parse().ok()?;
    Some(ServerRecord::new(name.trim(), host.trim(), port, user.trim(), password))
}

fn add_server(menu: &mut Menu) {
    menu.run_wizard(
        server_wizard(None),
        |menu, ctx, answers| {
            let Some(record) = record_from(&answers) else {
                return server_list(menu, ctx);
            };
            let host = record.host.clone();
            let saved = ctx.servers.add(&ctx.vault, record).map(|index| {
                info!(index, %host, "server added");
            });
            after_save(menu, ctx, saved);
        },
        server_list,
    );
}

fn edit_server(menu: &mut Menu, index: usize, server: &ServerRecord) {
    menu.run_wizard(
        server_wizard(Some(server)),
        move |menu, ctx, answers| {
            let Some(record) = record_from(&answers) else {
                return server_list(menu, ctx);
            };
            let saved = ctx.servers.update(&ctx.vault, index, record);
            after_save(menu, ctx, saved);
        },
        server_list,
    );
}

fn confirm_delete(menu: &mut Menu, index: usize, label: &str) {
    menu.list(&format!("Delete {}?", label), items(&["No", "Yes"]), move |menu, ctx, choice| {
        if choice == 1 {
            let removed = ctx.servers.remove(&ctx.vault, index);
            after_save(menu, ctx, removed);
        } else {
            server_list(menu, ctx);
        }
    });
    menu.on_cancel(server_list);
}

/// Back to the list, by way of the failure when the store refused
fn after_save(menu: &mut Menu, ctx: &mut Context, result: Result<()>) {
    match result {
        Ok(()) => server_list(menu, ctx),
        Err(e) => {
            warn!(error = %e, "server list not saved");
            menu.message_then(e.banner(), &e.to_string(), server_list);
        },
    }
}
