//! Everything a foreground state works against

use std::time::Instant;

use tracing::{debug, info, warn};

use super::{RefreshHandle, Transition};
use crate::app::Config;
use crate::bus::Buses;
use crate::input::{Input, TouchPoller};
use crate::render::{MenuView, RefreshDecision, Renderer, StatusBanner};
use crate::services::{
    KeyValueStore, OtaService, PinVault, PowerControl, PowerGauge, ScriptStore, StoredServers,
    UsbMassStorage, WifiControl,
};
use crate::ssh::TransportFactory;
use crate::terminal::{SharedTerminal, Terminal};

const BACKLIGHT_KEY: &str = "backlight";

/// Collaborators handed to the runtime at boot
pub struct Services {
    pub vault: PinVault,
    pub servers: StoredServers,
    pub scripts: ScriptStore,
    pub wifi: Box<dyn WifiControl>,
    pub power: Box<dyn PowerGauge>,
    pub power_control: Box<dyn PowerControl>,
    pub ota: Box<dyn OtaService>,
    pub usb: Box<dyn UsbMassStorage>,
    /// Device preferences such as the backlight
    pub prefs: Box<dyn KeyValueStore>,
    pub transports: Box<dyn TransportFactory>,
}

/// Capabilities, shared models and collaborators
pub struct Context {
    pub config: Config,
    pub terminal: SharedTerminal,
    pub renderer: Renderer,
    pub input: Input,
    pub buses: Buses,
    pub vault: PinVault,
    pub servers: StoredServers,
    pub scripts: ScriptStore,
    pub wifi: Box<dyn WifiControl>,
    pub power: Box<dyn PowerGauge>,
    pub power_control: Box<dyn PowerControl>,
    pub ota: Box<dyn OtaService>,
    pub usb: Box<dyn UsbMassStorage>,
    pub prefs: Box<dyn KeyValueStore>,
    pub transports: Box<dyn TransportFactory>,
    pub refresh: RefreshHandle,
    /// Time of the current tick
    pub now: Instant,
    touch: Option<TouchPoller>,
    pending: Option<Transition>,
    notice: Option<(String, String)>,
    auto_connect_done: bool,
    halted: bool,
}

impl Context {
    pub fn new(config: Config, renderer: Renderer, input: Input, buses: Buses, services: Services) -> Self {
        let terminal = SharedTerminal::new(Terminal::new(config.cols, config.rows, config.scrollback_lines));
        Self {
            config,
            terminal,
            renderer,
            input,
            buses,
            vault: services.vault,
            servers: services.servers,
            scripts: services.scripts,
            wifi: services.wifi,
            power: services.power,
            power_control: services.power_control,
            ota: services.ota,
            usb: services.usb,
            prefs: services.prefs,
            transports: services.transports,
            refresh: RefreshHandle::new(),
            now: Instant::now(),
            touch: None,
            pending: None,
            notice: None,
            auto_connect_done: false,
            halted: false,
        }
    }

    /// Keep the touch poller so shutdown can stop it
    pub fn with_touch_poller(mut self, poller: TouchPoller) -> Self {
        self.touch = Some(poller);
        self
    }

    /// Queue the next foreground state
    pub fn go(&mut self, next: Transition) {
        if let Some(previous) = &self.pending {
            debug!(?previous, "transition replaced");
        }
        self.pending = Some(next);
    }

    pub fn has_transition(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn take_transition(&mut self) -> Option<Transition> {
        self.pending.take()
    }

    /// Message for the menu to show on its next entry
    pub fn notify(&mut self, title: &str, body: &str) {
        self.notice = Some((title.to_string(), body.to_string()));
    }

    pub(crate) fn take_notice(&mut self) -> Option<(String, String)> {
        self.notice.take()
    }

    /// True the first time it is asked
    pub(crate) fn take_auto_connect(&mut self) -> bool {
        !std::mem::replace(&mut self.auto_connect_done, true)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Status bar contents
    pub fn status(&mut self, title: &str) -> StatusBanner {
        let battery = self.power.status();
        StatusBanner {
            title: title.to_string(),
            battery_percent: Some(battery.percentage),
            charging: battery.charging,
            wifi: self.wifi.is_connected(),
            history: self.terminal.with(|t| t.screen().view_offset()),
        }
    }

    /// Draw a dialog. Returns false when the refresh was deferred.
    pub fn draw_menu(&mut self, view: &MenuView) -> crate::error::Result<bool> {
        let status = self.status(view.title());
        let now = self.now;
        let decision = self.renderer.render_menu(view, &status, now)?;
        Ok(decision != RefreshDecision::Defer)
    }

    /// Full-screen notice shown before a blocking call
    pub fn show_progress(&mut self, title: &str, detail: &str) {
        let now = self.now;
        if let Err(e) = self.renderer.render_banner(title, detail, now) {
            warn!(error = %e, "progress banner failed");
        }
    }

    /// Status bar title in the Terminal state: network, then host
    pub fn terminal_title(&self, host: &str) -> String {
        let network: String = match self.wifi.ssid() {
            Some(ssid) if self.wifi.is_connected() => ssid.chars().take(8).collect(),
            _ => "Offline".to_string(),
        };
        let host: String = host.chars().take(10).collect();
        format!("{} > {}", network, host)
    }

    /// Load the stores whose contents need the unlocked vault
    pub fn unlock_stores(&mut self) {
        self.servers.load(&self.vault);
        self.wifi.load(&self.vault);
    }

    /// Apply the saved backlight preference
    pub fn restore_backlight(&mut self) {
        let on = self.prefs.get(BACKLIGHT_KEY).as_deref() == Some("1");
        if let Some(keyboard) = self.input.keyboard_mut() {
            if let Err(e) = keyboard.set_backlight(on) {
                warn!(error = %e, "backlight restore failed");
            }
        }
    }

    /// Flip the keyboard backlight and remember the choice
    pub fn toggle_backlight(&mut self) {
        let Some(keyboard) = self.input.keyboard_mut() else {
            return;
        };
        match keyboard.toggle_backlight() {
            Ok(on) => {
                debug!(on, "backlight toggled");
                let saved = self
                    .prefs
                    .set(BACKLIGHT_KEY, if on { "1" } else { "0" })
                    .and_then(|()| self.prefs.flush());
                if let Err(e) = saved {
                    warn!(error = %e, "backlight preference not saved");
                }
            },
            Err(e) => warn!(error = %e, "backlight toggle failed"),
        }
    }

    /// Orderly power-down: banner, flush, sleep the panel, deep sleep
    pub fn shutdown(&mut self) {
        self.show_progress("Sleeping...", "Press the side button to wake");
        if let Err(e) = self.vault.flush() {
            warn!(error = %e, "vault flush failed");
        }
        if let Err(e) = self.prefs.flush() {
            warn!(error = %e, "preferences flush failed");
        }
        if self.usb.is_active() {
            self.usb.stop_usb_mode();
        }
        if let Some(mut touch) = self.touch.take() {
            touch.stop();
        }
        if let Err(e) = self.renderer.hibernate() {
            warn!(error = %e, "panel hibernate failed");
        }
        info!("entering deep sleep");
        self.power_control.deep_sleep();
        self.halted = true;
    }

    /// Stop after showing a fatal message
    pub(crate) fn halt_with(&mut self, title: &str, detail: &str) {
        self.show_progress(title, detail);
        if let Some(mut touch) = self.touch.take() {
            touch.stop();
        }
        self.halted = true;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("renderer", &self.renderer)
            .field("input", &self.input)
            .field("pending", &self.pending)
            .field("halted", &self.halted)
            .finish()
    }
}
