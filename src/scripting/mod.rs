//! Embedded Rhai scripting
//!
//! [`ScriptHost`] owns the engine and the API scripts see; [`Script`] is
//! one hot-reloadable file run against it once per tick.

pub mod api;
pub mod error;
pub mod host;
pub mod modulo;
pub mod script;

pub use api::{ScriptDevice, ScriptDevices, ScriptState, SharedRegistry};
pub use error::{classify, Fault, ScriptError, SkipTick};
pub use host::ScriptHost;
pub use modulo::modulo;
pub use script::{list_scripts, Script, SCRIPT_EXTENSION};
