//! A hot-reloadable script file
//!
//! The file is recompiled whenever its modification time moves past the
//! last compile, and the whole body runs once per tick. Faults are logged
//! at most once per compilation generation: a script failing every tick
//! produces one warning until the file changes again.

use super::error::{classify, Fault, ScriptError};
use super::host::ScriptHost;
use rhai::AST;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info_span, warn};

pub const SCRIPT_EXTENSION: &str = "rhai";

pub struct Script {
    name: String,
    path: PathBuf,
    last_compile: SystemTime,
    last_error: Option<SystemTime>,
    last_fault: Option<ScriptError>,
    ast: Option<AST>,
    compilations: u64,
}

impl Script {
    /// Selects `<dir>/<name>.rhai`; the extension in `name` is optional
    pub fn new(dir: &Path, name: &str) -> Result<Self, ScriptError> {
        let name = name
            .strip_suffix(&format!(".{}", SCRIPT_EXTENSION))
            .unwrap_or(name);
        let path = dir.join(format!("{}.{}", name, SCRIPT_EXTENSION));
        if name.is_empty() || !path.is_file() {
            return Err(ScriptError::NotFound(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            path,
            last_compile: SystemTime::UNIX_EPOCH,
            last_error: None,
            last_fault: None,
            ast: None,
            compilations: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compile attempts so far, successful or not
    pub fn compilations(&self) -> u64 {
        self.compilations
    }

    pub fn is_compiled(&self) -> bool {
        self.ast.is_some()
    }

    /// Most recent reported fault of the current generation
    pub fn last_fault(&self) -> Option<&ScriptError> {
        self.last_fault.as_ref()
    }

    /// Recompiles if the file changed, then runs the body once
    pub fn run(&mut self, host: &ScriptHost) {
        let span = info_span!("script", name = %self.name);
        let _enter = span.enter();

        match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) if modified > self.last_compile => self.compile(host, modified),
            Ok(_) => {}
            Err(source) => {
                let err = ScriptError::Io {
                    path: self.path.clone(),
                    source,
                };
                self.report(err);
                return;
            }
        }

        let result = match &self.ast {
            Some(ast) => host.run(ast),
            None => return,
        };
        if let Err(err) = result {
            let message = match classify(&err) {
                Fault::Skip => return,
                Fault::Device(device) => device.to_string(),
                Fault::Runtime => err.to_string(),
            };
            self.report(ScriptError::Runtime {
                script: self.name.clone(),
                message,
            });
        }
    }

    fn compile(&mut self, host: &ScriptHost, modified: SystemTime) {
        // a broken file is only retried once it changes again
        self.last_compile = modified;
        self.compilations += 1;
        self.ast = None;

        let compiled = fs::read_to_string(&self.path)
            .map_err(|source| ScriptError::Io {
                path: self.path.clone(),
                source,
            })
            .and_then(|source| {
                host.compile(&source).map_err(|e| ScriptError::Compile {
                    script: self.name.clone(),
                    message: e.to_string(),
                })
            });

        match compiled {
            Ok(ast) => {
                debug!("Compiled {}", self.path.display());
                self.ast = Some(ast);
            }
            Err(err) => {
                warn!("{}", err);
                self.last_error = Some(self.last_compile);
                self.last_fault = Some(err);
            }
        }
    }

    fn report(&mut self, err: ScriptError) {
        if self.last_error.is_some_and(|t| t >= self.last_compile) {
            return;
        }
        warn!("{}", err);
        self.last_error = Some(self.last_compile);
        self.last_fault = Some(err);
    }
}

/// Sorted base names of the `*.rhai` files in `dir`
pub fn list_scripts(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == SCRIPT_EXTENSION)
        })
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::MockPhysicalPort;
    use crate::devices::DeviceRegistry;
    use std::cell::RefCell;
    use std::fs::File;
    use std::rc::Rc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn host() -> ScriptHost {
        let physical = MockPhysicalPort::new();
        physical.add_device("Saitek X52", 2, 4);
        let registry = DeviceRegistry::enumerate(Some(Box::new(physical)), None);
        ScriptHost::new(Rc::new(RefCell::new(registry)))
    }

    fn write(dir: &TempDir, name: &str, source: &str) -> PathBuf {
        let path = dir.path().join(format!("{}.rhai", name));
        fs::write(&path, source).unwrap();
        path
    }

    /// Moves the file's mtime forward, as an editor save would
    fn touch(path: &Path, source: &str, ahead: u64) {
        fs::write(path, source).unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(ahead))
            .unwrap();
    }

    fn count_warnings(logs: &[&str], needle: &str) -> usize {
        logs.iter()
            .filter(|line| line.contains("WARN") && line.contains(needle))
            .count()
    }

    #[test]
    fn missing_script_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Script::new(dir.path(), "nope"),
            Err(ScriptError::NotFound(name)) if name == "nope"
        ));
        assert!(Script::new(dir.path(), "").is_err());
    }

    #[test]
    fn extension_is_optional() {
        let dir = TempDir::new().unwrap();
        write(&dir, "remap", "1");
        assert_eq!(Script::new(dir.path(), "remap.rhai").unwrap().name(), "remap");
        assert_eq!(Script::new(dir.path(), "remap").unwrap().name(), "remap");
    }

    #[test]
    fn unchanged_file_compiles_once() {
        let dir = TempDir::new().unwrap();
        write(&dir, "count", r#"state["n"] = if state["n"] == () { 1 } else { state["n"] + 1 };"#);
        let host = host();
        let mut script = Script::new(dir.path(), "count").unwrap();

        for _ in 0..5 {
            script.run(&host);
        }
        assert_eq!(script.compilations(), 1);
        assert_eq!(host.state().get("n").as_int().unwrap(), 5);
    }

    #[test]
    fn modified_file_recompiles_exactly_once() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "value", r#"state["v"] = 1;"#);
        let host = host();
        let mut script = Script::new(dir.path(), "value").unwrap();
        script.run(&host);

        touch(&path, r#"state["v"] = 2;"#, 10);
        script.run(&host);
        script.run(&host);
        assert_eq!(script.compilations(), 2);
        assert_eq!(host.state().get("v").as_int().unwrap(), 2);
    }

    #[test]
    #[traced_test]
    fn runtime_fault_is_logged_once_per_generation() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken", r#"throw "first generation";"#);
        let host = host();
        let mut script = Script::new(dir.path(), "broken").unwrap();

        for _ in 0..1000 {
            script.run(&host);
        }
        assert!(matches!(script.last_fault(), Some(ScriptError::Runtime { .. })));

        touch(&path, r#"throw "second generation";"#, 10);
        for _ in 0..1000 {
            script.run(&host);
        }

        logs_assert(|lines: &[&str]| {
            match (
                count_warnings(lines, "first generation"),
                count_warnings(lines, "second generation"),
            ) {
                (1, 1) => Ok(()),
                counts => Err(format!("expected one warning per generation, got {:?}", counts)),
            }
        });
    }

    #[test]
    #[traced_test]
    fn device_faults_share_the_gate() {
        let dir = TempDir::new().unwrap();
        write(&dir, "absent", r#"devices.get("Throttle").getAxis(0);"#);
        let host = host();
        let mut script = Script::new(dir.path(), "absent").unwrap();
        for _ in 0..50 {
            script.run(&host);
        }
        logs_assert(|lines: &[&str]| {
            match count_warnings(lines, "devices.get('Throttle') is not available") {
                1 => Ok(()),
                n => Err(format!("expected one warning, got {}", n)),
            }
        });
    }

    #[test]
    #[traced_test]
    fn broken_source_is_not_retried_until_changed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "syntax", "let = ;");
        let host = host();
        let mut script = Script::new(dir.path(), "syntax").unwrap();
        for _ in 0..10 {
            script.run(&host);
        }
        assert_eq!(script.compilations(), 1);
        assert!(!script.is_compiled());

        touch(&path, r#"state["fixed"] = true;"#, 10);
        script.run(&host);
        assert!(script.is_compiled());
        assert_eq!(host.state().get("fixed").as_bool(), Ok(true));

        logs_assert(|lines: &[&str]| match count_warnings(lines, "compilation failed") {
            1 => Ok(()),
            n => Err(format!("expected one compile warning, got {}", n)),
        });
    }

    #[test]
    #[traced_test]
    fn skip_is_silent() {
        let dir = TempDir::new().unwrap();
        write(&dir, "early", r#"skip(); throw "unreachable";"#);
        let host = host();
        let mut script = Script::new(dir.path(), "early").unwrap();
        for _ in 0..3 {
            script.run(&host);
        }
        assert!(script.last_fault().is_none());
        assert!(!logs_contain("WARN"));
    }

    #[test]
    #[traced_test]
    fn deleted_file_is_a_gated_fault() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "gone", "1");
        let host = host();
        let mut script = Script::new(dir.path(), "gone").unwrap();
        script.run(&host);
        fs::remove_file(&path).unwrap();
        for _ in 0..5 {
            script.run(&host);
        }
        assert!(matches!(script.last_fault(), Some(ScriptError::Io { .. })));
        logs_assert(|lines: &[&str]| match count_warnings(lines, "Cannot read") {
            1 => Ok(()),
            n => Err(format!("expected one warning, got {}", n)),
        });
    }

    #[test]
    fn catalog_lists_rhai_files_sorted() {
        let dir = TempDir::new().unwrap();
        write(&dir, "zeta", "");
        write(&dir, "alpha", "");
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert_eq!(list_scripts(dir.path()), vec!["alpha", "zeta"]);
        assert!(list_scripts(&dir.path().join("missing")).is_empty());
    }
}
