//! Scripts: saved commands run on a server once the shell is up

use tracing::{info, warn};

use super::{connect, items, main_menu, quick_connect, Menu};
use crate::error::InkdeckError;
use crate::menu::{validate, Wizard};
use crate::runtime::Context;
use crate::services::{Script, ServerRecord, ServerStore, StoreError};

const ADD_SCRIPT: &str = "+ Add New Script";
const CONNECT_NEW: &str = "+ Connect New";

pub(crate) fn script_list(menu: &mut Menu, ctx: &mut Context) {
    let mut labels: Vec<String> = ctx.scripts.list().iter().map(|s| s.name.clone()).collect();
    let count = labels.len();
    labels.push(ADD_SCRIPT.to_string());
    menu.list("Scripts", labels, move |menu, ctx, index| {
        if index == count {
            add_script(menu);
        } else {
            script_actions(menu, ctx, index);
        }
    });
    menu.on_cancel(|menu, _| main_menu(menu));
}

fn script_actions(menu: &mut Menu, ctx: &mut Context, index: usize) {
    let Some(script) = ctx.scripts.get(index).cloned() else {
        return script_list(menu, ctx);
    };
    let title = script.name.clone();
    menu.list(&title, items(&["Run", "Edit", "Delete"]), move |menu, ctx, choice| match choice {
        0 => pick_server(menu, ctx, script.command),
        1 => edit_script(menu, index, &script),
        _ => {
            let removed = ctx.scripts.remove(index);
            after_save(menu, ctx, removed);
        },
    });
    menu.on_cancel(script_list);
}

/// Choose where to run `command`
fn pick_server(menu: &mut Menu, ctx: &mut Context, command: String) {
    let servers: Vec<ServerRecord> = ctx.servers.list().to_vec();
    let mut labels: Vec<String> = servers.iter().map(ServerRecord::label).collect();
    labels.push(CONNECT_NEW.to_string());
    menu.list("Run On", labels, move |menu, ctx, index| match servers.get(index).cloned() {
        Some(server) => {
            info!(host = %server.host, "running script");
            connect(menu, ctx, server, Some(command));
        },
        None => quick_connect(menu, Some(command)),
    });
    menu.on_cancel(script_list);
}

fn add_script(menu: &mut Menu) {
    let wizard = Wizard::new()
        .text("Script Name", "")
        .check(validate::not_empty)
        .text("Command", "")
        .check(validate::not_empty);
    menu.run_wizard(
        wizard,
        |menu, ctx, answers| {
            let [name, command] = answers.as_slice() else {
                return script_list(menu, ctx);
            };
            let added = ctx.scripts.add(Script::new(name.trim(), command)).map(|index| {
                info!(index, "script added");
            });
            after_save(menu, ctx, added);
        },
        script_list,
    );
}

fn edit_script(menu: &mut Menu, index: usize, script: &Script) {
    let wizard = Wizard::new()
        .text("Edit Name", &script.name)
        .check(validate::not_empty)
        .text("Edit Command", &script.command)
        .check(validate::not_empty);
    menu.run_wizard(
        wizard,
        move |menu, ctx, answers| {
            let [name, command] = answers.as_slice() else {
                return script_list(menu, ctx);
            };
            let updated = ctx.scripts.update(index, Script::new(name.trim(), command));
            after_save(menu, ctx, updated);
        },
        script_list,
    );
}

fn after_save(menu: &mut Menu, ctx: &mut Context, result: Result<(), StoreError>) {
    match result {
        Ok(()) => script_list(menu, ctx),
        Err(e) => {
            warn!(error = %e, "script list not saved");
            let err = InkdeckError::from(e);
            menu.message_then(err.banner(), &err.to_string(), script_list);
        },
    }
}
