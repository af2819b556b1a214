//! simscript - fixed-rate scripting for physical and virtual joysticks
//!
//! Scripts written in Rhai read physical controllers through gilrs and
//! drive vJoy virtual controllers, re-run once per scheduler tick and
//! recompiled whenever their file changes.

pub mod cli;
pub mod config;
pub mod devices;
pub mod logging;
pub mod persistence;
pub mod scheduler;
pub mod scripting;
