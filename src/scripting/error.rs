//! Script errors and classification of faults raised by Rhai

use crate::devices::DeviceError;
use rhai::EvalAltResult;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("{0} not found")]
    NotFound(String),

    /// Logged inside the script's span, so the name isn't repeated
    #[error("compilation failed with {message}")]
    Compile { script: String, message: String },

    #[error("{message}")]
    Runtime { script: String, message: String },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Thrown by `skip()` to end the current tick's run early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipTick;

/// What a failed run boils down to
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Device(DeviceError),
    /// Normal early exit, not reported
    Skip,
    Runtime,
}

/// Unwraps nested call and module errors down to the thrown value
pub fn classify(err: &EvalAltResult) -> Fault {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => classify(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => classify(inner),
        EvalAltResult::ErrorRuntime(value, _) if value.is::<SkipTick>() => Fault::Skip,
        EvalAltResult::ErrorRuntime(value, _) => match value.clone().try_cast::<DeviceError>() {
            Some(device) => Fault::Device(device),
            None => Fault::Runtime,
        },
        _ => Fault::Runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::{Dynamic, Position};

    fn thrown<T: Clone + Send + Sync + 'static>(value: T) -> EvalAltResult {
        EvalAltResult::ErrorRuntime(Dynamic::from(value), Position::NONE)
    }

    #[test]
    fn device_errors_are_found_through_nested_calls() {
        let root = thrown(DeviceError::Unavailable("Saitek X52".into()));
        let nested = EvalAltResult::ErrorInFunctionCall(
            "remap".into(),
            String::new(),
            Box::new(root),
            Position::NONE,
        );
        assert_eq!(
            classify(&nested),
            Fault::Device(DeviceError::Unavailable("Saitek X52".into()))
        );
    }

    #[test]
    fn skip_is_not_a_fault() {
        assert_eq!(classify(&thrown(SkipTick)), Fault::Skip);
    }

    #[test]
    fn anything_else_is_a_runtime_fault() {
        assert_eq!(classify(&thrown("boom".to_string())), Fault::Runtime);
        let missing = EvalAltResult::ErrorVariableNotFound("x".into(), Position::NONE);
        assert_eq!(classify(&missing), Fault::Runtime);
    }
}
