//! Virtual output through the vJoy interface library
//!
//! The library is loaded at runtime with libloading; every entry point used
//! is resolved once in [`VJoyLibrary::load`] and kept as a plain function
//! pointer next to the library that owns it.

use super::error::PortError;
use super::port::{AxisUsage, PositionReport, VirtualOutputPort, VirtualStatus};
use libloading::Library;
use std::path::Path;
use tracing::{debug, info};

type EnabledFn = unsafe extern "C" fn() -> i32;
type StatusFn = unsafe extern "C" fn(u32) -> i32;
type AcquireFn = unsafe extern "C" fn(u32) -> i32;
type RelinquishFn = unsafe extern "C" fn(u32);
type ButtonNumberFn = unsafe extern "C" fn(u32) -> i32;
type AxisExistFn = unsafe extern "C" fn(u32, u32) -> i32;
type AxisBoundFn = unsafe extern "C" fn(u32, u32, *mut i32) -> i32;
type UpdateFn = unsafe extern "C" fn(u32, *const PositionReport) -> i32;

pub struct VJoyLibrary {
    enabled: EnabledFn,
    status: StatusFn,
    acquire: AcquireFn,
    relinquish: RelinquishFn,
    button_number: ButtonNumberFn,
    axis_exist: AxisExistFn,
    axis_min: AxisBoundFn,
    axis_max: AxisBoundFn,
    update: UpdateFn,
    // declared last so it is dropped after the pointers into it
    _library: Library,
}

impl VJoyLibrary {
    pub fn load(path: &Path) -> Result<Self, PortError> {
        let shown = path.display().to_string();
        debug!("Loading virtual joystick interface from {}", shown);

        // SAFETY: loading runs the library's initializers; vJoyInterface has
        // no initialization side effects beyond its own state.
        let library = unsafe { Library::new(path) }.map_err(|source| PortError::LibraryLoad {
            path: shown.clone(),
            source,
        })?;

        let vjoy = Self {
            enabled: symbol(&library, &shown, "vJoyEnabled")?,
            status: symbol(&library, &shown, "GetVJDStatus")?,
            acquire: symbol(&library, &shown, "AcquireVJD")?,
            relinquish: symbol(&library, &shown, "RelinquishVJD")?,
            button_number: symbol(&library, &shown, "GetVJDButtonNumber")?,
            axis_exist: symbol(&library, &shown, "GetVJDAxisExist")?,
            axis_min: symbol(&library, &shown, "GetVJDAxisMin")?,
            axis_max: symbol(&library, &shown, "GetVJDAxisMax")?,
            update: symbol(&library, &shown, "UpdateVJD")?,
            _library: library,
        };
        info!("Loaded virtual joystick interface {}", shown);
        Ok(vjoy)
    }

    fn bound(&self, query: AxisBoundFn, device: u8, usage: AxisUsage) -> Option<i32> {
        let mut value: i32 = 0;
        // SAFETY: `value` outlives the call and the driver writes one LONG.
        let ok = unsafe { query(u32::from(device), usage.code(), &mut value) };
        (ok != 0).then_some(value)
    }
}

fn symbol<T: Copy>(library: &Library, path: &str, name: &'static str) -> Result<T, PortError> {
    // SAFETY: every `T` requested above matches the exported C signature.
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|symbol| *symbol)
        .map_err(|source| PortError::MissingSymbol {
            path: path.to_string(),
            symbol: name,
            source,
        })
}

// SAFETY (all blocks below): the pointers were resolved from the loaded
// library, which lives as long as `self`, and take plain integers or a
// pointer to a value that outlives the call.
impl VirtualOutputPort for VJoyLibrary {
    fn enabled(&self) -> bool {
        unsafe { (self.enabled)() != 0 }
    }

    fn status(&self, device: u8) -> VirtualStatus {
        VirtualStatus::from_code(unsafe { (self.status)(u32::from(device)) })
    }

    fn acquire(&self, device: u8) -> bool {
        unsafe { (self.acquire)(u32::from(device)) != 0 }
    }

    fn relinquish(&self, device: u8) {
        unsafe { (self.relinquish)(u32::from(device)) }
    }

    fn button_count(&self, device: u8) -> usize {
        let count = unsafe { (self.button_number)(u32::from(device)) };
        usize::try_from(count).unwrap_or(0)
    }

    fn axis_exists(&self, device: u8, usage: AxisUsage) -> bool {
        unsafe { (self.axis_exist)(u32::from(device), usage.code()) != 0 }
    }

    fn axis_min(&self, device: u8, usage: AxisUsage) -> Option<i32> {
        self.bound(self.axis_min, device, usage)
    }

    fn axis_max(&self, device: u8, usage: AxisUsage) -> Option<i32> {
        self.bound(self.axis_max, device, usage)
    }

    fn update(&self, device: u8, report: &PositionReport) -> bool {
        unsafe { (self.update)(u32::from(device), report) != 0 }
    }
}
