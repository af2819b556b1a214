//! # Scheduler
//!
//! Drives everything at a fixed frequency on one thread. Each tick pumps
//! the UI, syncs the modules in registration order, runs the active
//! script, then sleeps for whatever is left of the period.
//!
//! ## Key Abstractions
//! - [`AppContext`]: all state the loop and its commands touch, built once
//!   at startup and owned by the [`Scheduler`]
//! - [`TickOutcome`]: the timing of one tick, computed synchronously so
//!   tests can drive ticks without a runtime
//! - Collaborator traits: [`SyncModule`], [`Ui`], [`Presence`], and
//!   [`Persistence`](crate::persistence::Persistence)
//!
//! ## Timing
//! A tick that overruns its period logs one warning and the next tick
//! starts immediately. Ticks are never skipped or batched. Nothing bounds
//! the time a script may take.
//!
//! ## Cancellation
//! The active flag is a `watch` channel flipped by the Quit command or by
//! Ctrl-C, and it is only checked between ticks.

pub mod modules;
pub mod presence;
pub mod ui;

pub use modules::{load_modules, DevicePoller, ScriptModule, SyncModule};
pub use presence::{Presence, Unchecked};
pub use ui::{Action, Command, CommandQueue, HeadlessUi, Menu, Ui};

use crate::config::ConfigError;
use crate::logging::LogStats;
use crate::persistence::{Persistence, SCRIPT_KEY};
use crate::scripting::{Script, ScriptHost};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Timing of one finished tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    OnTime { remaining: Duration },
    Overrun { by: Duration },
}

pub struct AppContext {
    pub host: ScriptHost,
    pub script: Option<Script>,
    pub modules: Vec<Box<dyn SyncModule>>,
    pub ui: Box<dyn Ui>,
    pub persistence: Box<dyn Persistence>,
    pub scripts_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub stats: LogStats,
    active: Arc<watch::Sender<bool>>,
    ticks: u64,
}

impl AppContext {
    /// A context with only the device poller registered
    pub fn new(
        host: ScriptHost,
        ui: Box<dyn Ui>,
        persistence: Box<dyn Persistence>,
        scripts_dir: PathBuf,
    ) -> Self {
        let (active, _) = watch::channel(true);
        Self {
            host,
            script: None,
            modules: vec![Box::new(DevicePoller)],
            ui,
            persistence,
            scripts_dir,
            log_file: None,
            stats: LogStats::new(),
            active: Arc::new(active),
            ticks: 0,
        }
    }

    /// Registers `module` after everything registered so far
    pub fn add_module(&mut self, module: Box<dyn SyncModule>) {
        debug!("Registered module {}", module.name());
        self.modules.push(module);
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    pub fn quit(&self) {
        self.active.send_replace(false);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn script_name(&self) -> Option<&str> {
        self.script.as_ref().map(|s| s.name())
    }

    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Quit => {
                info!("Quitting");
                self.quit();
            }
            Command::ShowLog => {
                match &self.log_file {
                    Some(path) => info!("Session log is {}", path.display()),
                    None => info!("No session log file"),
                }
                self.stats.reset();
            }
            Command::Edit => info!("Scripts are in {}", self.scripts_dir.display()),
            Command::Switch(name) => self.switch(&name),
        }
    }

    fn switch(&mut self, name: &str) {
        match Script::new(&self.scripts_dir, name) {
            Ok(script) => {
                info!("Switching to script {}", script.name());
                self.persistence.remember(SCRIPT_KEY, script.name());
                self.script = Some(script);
            }
            Err(e) => warn!("Cannot switch to script {}: {}", name, e),
        }
    }
}

pub struct Scheduler {
    ctx: AppContext,
    period: Duration,
}

impl Scheduler {
    pub fn new(ctx: AppContext, hertz: u32) -> Result<Self, ConfigError> {
        if hertz == 0 {
            return Err(ConfigError::InvalidHertz(hertz));
        }
        Ok(Self {
            ctx,
            period: Duration::from_secs(1) / hertz,
        })
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut AppContext {
        &mut self.ctx
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sender side of the active flag; sending `false` stops the loop
    pub fn active_flag(&self) -> Arc<watch::Sender<bool>> {
        self.ctx.active.clone()
    }

    /// Runs one tick without sleeping
    pub fn tick(&mut self) -> TickOutcome {
        let started = Instant::now();
        let ctx = &mut self.ctx;
        ctx.ticks += 1;
        ctx.host.set_tick(ctx.ticks);

        let menu = Menu {
            scripts_dir: &ctx.scripts_dir,
            current: ctx.script.as_ref().map(|s| s.name()),
            stats: &ctx.stats,
        };
        let commands = ctx.ui.pump(&menu);
        for command in commands {
            ctx.handle(command);
        }

        for module in ctx.modules.iter_mut() {
            module.sync(&ctx.host);
        }

        if let Some(script) = ctx.script.as_mut() {
            script.run(&ctx.host);
        }

        let elapsed = started.elapsed();
        match self.period.checked_sub(elapsed) {
            Some(remaining) => TickOutcome::OnTime { remaining },
            None => {
                warn!(
                    "{} executions took longer than sync frequency ({}ms>{}ms)",
                    self.ctx.script_name().unwrap_or("no script"),
                    elapsed.as_millis(),
                    self.period.as_millis()
                );
                TickOutcome::Overrun {
                    by: elapsed - self.period,
                }
            }
        }
    }

    /// Ticks until the active flag goes false
    pub async fn run(&mut self) {
        let active = self.active_flag();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
                active.send_replace(false);
            }
        });

        info!("Running at {}ms per tick", self.period.as_millis());
        while self.ctx.is_active() {
            if let TickOutcome::OnTime { remaining } = self.tick() {
                tokio::time::sleep(remaining).await;
            }
        }

        interrupt.abort();
        info!("Stopped after {} ticks", self.ctx.ticks);
    }
}
