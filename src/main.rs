use clap::{CommandFactory, Parser};
use color_eyre::Result;
use simscript::cli::Cli;
use simscript::config::Settings;
use simscript::devices::DeviceRegistry;
use simscript::logging;
use simscript::persistence::{MemoryState, Persistence, StateFile, SCRIPT_KEY};
use simscript::scheduler::{load_modules, AppContext, HeadlessUi, Presence, Scheduler, Unchecked};
use simscript::scripting::{Script, ScriptHost};
use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version go to stdout and are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return Ok(ExitCode::from(code));
        }
    };

    setup()?;
    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    settings.validate()?;
    let logging = logging::init(cli.debug, &settings.log_dir())?;
    debug!("Settings: {:?}", settings);

    let presence = Unchecked;
    if !presence.may_run() {
        info!("instance already running - exiting");
        return Ok(usage("already running"));
    }

    let persistence: Box<dyn Persistence> = match StateFile::in_config_dir() {
        Some(state) => Box::new(state),
        None => Box::new(MemoryState::default()),
    };

    let script = match &cli.script {
        Some(name) => match Script::new(&settings.scripts_dir, name) {
            Ok(script) => Some(script),
            Err(e) => return Ok(usage(&e.to_string())),
        },
        None => match persistence.recall(SCRIPT_KEY) {
            Some(name) => Script::new(&settings.scripts_dir, &name)
                .map_err(|e| debug!("restoring recalled script failed {}", e))
                .ok(),
            None => None,
        },
    };
    if script.is_none() {
        info!("No script selected, idling");
    }

    let registry = Rc::new(RefCell::new(DeviceRegistry::from_system(&settings)));
    let host = ScriptHost::new(registry);
    let modules = load_modules(&host, &settings.modules_dir);

    let mut ctx = AppContext::new(
        host,
        Box::new(HeadlessUi),
        persistence,
        settings.scripts_dir.clone(),
    );
    ctx.script = script;
    ctx.log_file = Some(logging.file);
    ctx.stats = logging.stats;
    for module in modules {
        ctx.add_module(module);
    }

    let mut scheduler = Scheduler::new(ctx, settings.hertz)?;
    scheduler.run().await;
    Ok(ExitCode::SUCCESS)
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    Ok(())
}

fn usage(message: &str) -> ExitCode {
    eprintln!("{}\n\n{}", message, Cli::command().render_usage());
    ExitCode::from(1)
}
