//! tracing setup: console, session log file, and warning/error counters

use color_eyre::{eyre::eyre, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// WARN and ERROR totals since the last reset
#[derive(Debug, Clone, Default)]
pub struct LogStats {
    warnings: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl LogStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.warnings.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }

    /// Label of the log entry in the action list
    pub fn label(&self) -> String {
        match (self.warnings(), self.errors()) {
            (0, 0) => "Log".to_string(),
            (warnings, errors) => format!("Log ({} warnings, {} errors)", warnings, errors),
        }
    }

    pub fn layer(&self) -> CountingLayer {
        CountingLayer {
            stats: self.clone(),
        }
    }
}

pub struct CountingLayer {
    stats: LogStats,
}

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::WARN => self.stats.warnings.fetch_add(1, Ordering::Relaxed),
            Level::ERROR => self.stats.errors.fetch_add(1, Ordering::Relaxed),
            _ => return,
        };
    }
}

/// What the rest of the program needs from the installed subscriber
#[derive(Debug, Clone)]
pub struct Logging {
    pub file: PathBuf,
    pub stats: LogStats,
}

/// Installs the global subscriber; `debug` overrides `RUST_LOG`
pub fn init(debug: bool, log_dir: &Path) -> Result<Logging> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = log_dir.join(format!("simscript_{}.log", stamp));
    let file = File::create(&path)
        .map_err(|e| eyre!("Failed to create log file {}: {}", path.display(), e))?;

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let stats = LogStats::new();
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .with(stats.layer())
        .try_init()
        .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

    Ok(Logging { file: path, stats })
}
