//! Collaborators synced once per tick, before the script runs
//!
//! [`DevicePoller`] refreshes physical device state. Each `modules/*.rhai`
//! file becomes a [`ScriptModule`]: its body runs once when loaded, then
//! its `on_tick` function is called every tick. `on_tick` may be declared
//! as `fn on_tick()` or as `fn on_tick(devices, state)` to reach the devices.

use crate::scripting::{classify, list_scripts, Fault, ScriptError, ScriptHost, SCRIPT_EXTENSION};
use rhai::{Scope, AST};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const TICK_FN: &str = "on_tick";

pub trait SyncModule {
    fn name(&self) -> &str;
    fn sync(&mut self, host: &ScriptHost);
}

/// Polls physical devices; always the first module
#[derive(Debug, Default)]
pub struct DevicePoller;

impl SyncModule for DevicePoller {
    fn name(&self) -> &str {
        "devices"
    }

    fn sync(&mut self, host: &ScriptHost) {
        host.registry().borrow_mut().poll();
    }
}

pub struct ScriptModule {
    name: String,
    ast: AST,
    scope: Scope<'static>,
    takes_globals: bool,
    reported: bool,
}

impl ScriptModule {
    /// Compiles `path` and runs its body once
    pub fn load(host: &ScriptHost, path: &Path) -> Result<Self, ScriptError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ast = host.compile(&source).map_err(|e| ScriptError::Compile {
            script: name.clone(),
            message: e.to_string(),
        })?;

        let arity = ast
            .iter_functions()
            .find(|f| f.name == TICK_FN)
            .map(|f| f.params.len());
        let takes_globals = match arity {
            Some(0) => false,
            Some(2) => true,
            _ => {
                return Err(ScriptError::Compile {
                    script: name,
                    message: "no on_tick() or on_tick(devices, state) function".to_string(),
                })
            }
        };

        let mut scope = host.scope();
        host.load(&mut scope, &ast).map_err(|e| ScriptError::Runtime {
            script: name.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            name,
            ast,
            scope,
            takes_globals,
            reported: false,
        })
    }
}

impl SyncModule for ScriptModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&mut self, host: &ScriptHost) {
        let Err(err) = host.call(&mut self.scope, &self.ast, TICK_FN, self.takes_globals) else {
            return;
        };
        let message = match classify(&err) {
            Fault::Skip => return,
            Fault::Device(device) => device.to_string(),
            Fault::Runtime => err.to_string(),
        };
        // modules are loaded once, so their generation is the process lifetime
        if !self.reported {
            warn!("Module {} sync failed: {}", self.name, message);
            self.reported = true;
        }
    }
}

/// Loads every module in `dir`; modules that fail to load are skipped
pub fn load_modules(host: &ScriptHost, dir: &Path) -> Vec<Box<dyn SyncModule>> {
    let mut modules: Vec<Box<dyn SyncModule>> = Vec::new();
    for name in list_scripts(dir) {
        let path = dir.join(format!("{}.{}", name, SCRIPT_EXTENSION));
        match ScriptModule::load(host, &path) {
            Ok(module) => {
                info!("Loaded module {}", name);
                modules.push(Box::new(module));
            }
            Err(e) => {
                warn!("Couldn't initialize module {}: {}", name, e);
                debug!("{:?}", e);
            }
        }
    }
    modules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::MockPhysicalPort;
    use crate::devices::DeviceRegistry;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn host(physical: &MockPhysicalPort) -> ScriptHost {
        let registry = DeviceRegistry::enumerate(Some(Box::new(physical.clone())), None);
        ScriptHost::new(Rc::new(RefCell::new(registry)))
    }

    #[test]
    fn poller_refreshes_devices() {
        let physical = MockPhysicalPort::new();
        let host = host(&physical);
        let mut poller = DevicePoller;
        poller.sync(&host);
        poller.sync(&host);
        assert_eq!(physical.update_count(), 2);
    }

    #[test]
    fn modules_keep_top_level_state_and_sync_every_tick() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("counter.rhai"),
            r#"state["loaded"] = true; fn on_tick(devices, state) { state["syncs"] = if state["syncs"] == () { 1 } else { state["syncs"] + 1 }; }"#,
        )
        .unwrap();
        fs::write(dir.path().join("quiet.rhai"), "fn on_tick() { 42 }").unwrap();

        let physical = MockPhysicalPort::new();
        let host = host(&physical);
        let mut modules = load_modules(&host, dir.path());
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name(), "counter");

        for _ in 0..3 {
            for module in modules.iter_mut() {
                module.sync(&host);
            }
        }
        assert_eq!(host.state().get("loaded").as_bool(), Ok(true));
        assert_eq!(host.state().get("syncs").as_int(), Ok(3));
    }

    #[test]
    #[traced_test]
    fn broken_modules_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("syntax.rhai"), "fn on_tick( {").unwrap();
        fs::write(dir.path().join("nosync.rhai"), "let x = 1;").unwrap();
        fs::write(dir.path().join("ok.rhai"), "fn on_tick() {}").unwrap();
        fs::write(dir.path().join("reserved.rhai"), "fn sync() {}").unwrap();

        let physical = MockPhysicalPort::new();
        let modules = load_modules(&host(&physical), dir.path());
        assert_eq!(modules.len(), 1);
        assert!(logs_contain("Couldn't initialize module syntax"));
        assert!(logs_contain("Couldn't initialize module nosync"));
        assert!(logs_contain("Couldn't initialize module reserved"));
    }

    #[test]
    #[traced_test]
    fn sync_faults_are_reported_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("faulty.rhai");
        fs::write(&path, r#"fn on_tick() { throw "module fault"; }"#).unwrap();

        let physical = MockPhysicalPort::new();
        let host = host(&physical);
        let mut module = ScriptModule::load(&host, &path).unwrap();
        for _ in 0..100 {
            module.sync(&host);
        }
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|l| l.contains("WARN") && l.contains("module fault"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one warning, got {}", n)),
            }
        });
    }
}
