//! Device abstraction layer for physical and virtual joysticks
//!
//! Unifies read-only physical controllers and writable virtual controllers
//! behind one capability surface, with lazy and idempotent acquisition:
//!
//! 1. [`port`] - narrow interfaces to the two native subsystems
//! 2. [`handle`] - the capability surface and its two variants
//! 3. [`registry`] - enumeration and lookup by name or index
//!
//! # Architecture
//!
//! ```text
//! Script ──► DeviceRegistry::get ──► DeviceHandle ──► PhysicalInputPort (gilrs)
//!                                         └─────────► VirtualOutputPort (vJoy)
//! ```
//!
//! Everything here is called from the scheduler thread only; the registry
//! carries no locks.

pub mod error;
pub mod gilrs_port;
pub mod handle;
pub mod mock;
pub mod port;
pub mod registry;
pub mod vjoy;

pub use error::{DeviceError, PortError};
pub use handle::{AcquisitionState, DeviceHandle, PhysicalDevice, VirtualAxis, VirtualDevice};
pub use port::{AxisUsage, PhysicalInputPort, Ports, PositionReport, VirtualOutputPort, VirtualStatus};
pub use registry::{ButtonAddress, Device, DeviceKey, DeviceRegistry, VIRTUAL_DEVICE_NAME};
