//! Error definitions for the device layer

use thiserror::Error;

/// Faults raised to the calling script on every occurrence
///
/// Devices can disappear or be seized by another process at any tick,
/// so none of these are rate limited. The scripting host hands them to
/// the script as the thrown value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// Native open/acquire failed or the device is absent
    #[error("devices.get('{0}') is not available")]
    Unavailable(String),

    /// Virtual device owned by another process
    #[error("devices.get('{0}') is not a free virtual joystick")]
    Busy(String),

    #[error("devices.get('{device}') doesn't have axis {axis}")]
    InvalidAxis { device: String, axis: i64 },

    #[error("devices.get('{device}') doesn't have button {button}")]
    InvalidButton { device: String, button: i64 },

    #[error("devices.get('{device}') value for axis {axis} not {min} <= {value} <= {max}")]
    AxisOutOfRange {
        device: String,
        axis: usize,
        value: f64,
        min: i32,
        max: i32,
    },

    /// Write attempted on an input-only device
    #[error("devices.get('{0}') is a physical device and can't be written")]
    ReadOnly(String),
}

/// Failures while binding a native subsystem at startup
///
/// These never abort the process; the affected subsystem degrades to an
/// empty device set.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Failed to load library {path}: {source}")]
    LibraryLoad {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("Library {path} lacks symbol {symbol}: {source}")]
    MissingSymbol {
        path: String,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("Failed to initialize gamepad backend: {0}")]
    Gilrs(String),
}
