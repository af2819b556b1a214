//! Port interfaces for the two native subsystems
//!
//! Each native library is reached only through one of these traits, so the
//! unsafe boundary stays inside the concrete adapters ([`GilrsPort`],
//! [`VJoyLibrary`]) and tests can substitute the mocks.
//!
//! [`GilrsPort`]: super::gilrs_port::GilrsPort
//! [`VJoyLibrary`]: super::vjoy::VJoyLibrary

use std::fmt;

/// Read-only access to physical controllers
pub trait PhysicalInputPort {
    /// Number of devices currently known to the library
    fn device_count(&self) -> usize;

    /// Driver-reported display name of the device at `index`
    fn device_name(&self, index: usize) -> Option<String>;

    /// Opens the OS handle for `index`, returns false when that fails
    fn open(&self, index: usize) -> bool;

    /// Whether the device at `index` is still plugged in
    fn connected(&self, index: usize) -> bool;

    fn axis_count(&self, index: usize) -> usize;

    /// Raw axis reading in the signed 16-bit native range
    fn axis(&self, index: usize, axis: usize) -> i16;

    fn button_count(&self, index: usize) -> usize;

    fn button(&self, index: usize, button: usize) -> bool;

    /// Refreshes all device states
    fn update(&mut self);
}

/// Ownership state of one virtual device as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualStatus {
    /// Owned by this process
    Own,
    /// Not owned by any process
    Free,
    /// Owned by another process
    Busy,
    /// Does not exist or the driver is down
    Missing,
    Unknown,
}

impl VirtualStatus {
    /// Maps the driver's numeric status code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => VirtualStatus::Own,
            1 => VirtualStatus::Free,
            2 => VirtualStatus::Busy,
            3 => VirtualStatus::Missing,
            _ => VirtualStatus::Unknown,
        }
    }
}

/// HID usage identifiers of the axes a virtual device may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AxisUsage {
    X = 0x30,
    Y = 0x31,
    Z = 0x32,
    RX = 0x33,
    RY = 0x34,
    RZ = 0x35,
    Slider0 = 0x36,
    Slider1 = 0x37,
    Wheel = 0x38,
}

impl AxisUsage {
    /// Probe order used when constructing a virtual device
    pub const ALL: [AxisUsage; 9] = [
        AxisUsage::X,
        AxisUsage::Y,
        AxisUsage::Z,
        AxisUsage::RX,
        AxisUsage::RY,
        AxisUsage::RZ,
        AxisUsage::Slider0,
        AxisUsage::Slider1,
        AxisUsage::Wheel,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for AxisUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AxisUsage::X => "X",
            AxisUsage::Y => "Y",
            AxisUsage::Z => "Z",
            AxisUsage::RX => "RX",
            AxisUsage::RY => "RY",
            AxisUsage::RZ => "RZ",
            AxisUsage::Slider0 => "SL0",
            AxisUsage::Slider1 => "SL1",
            AxisUsage::Wheel => "WHL",
        };
        write!(f, "{}", name)
    }
}

/// Fixed-layout report submitted to the virtual driver in one update call
///
/// The driver has no partial updates: every axis and button write is staged
/// here and the whole structure is submitted.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionReport {
    /// 1-based virtual device id
    pub device: u8,
    pub throttle: i32,
    pub rudder: i32,
    pub aileron: i32,
    pub axis_x: i32,
    pub axis_y: i32,
    pub axis_z: i32,
    pub axis_x_rot: i32,
    pub axis_y_rot: i32,
    pub axis_z_rot: i32,
    pub slider: i32,
    pub dial: i32,
    pub wheel: i32,
    pub axis_vx: i32,
    pub axis_vy: i32,
    pub axis_vz: i32,
    pub axis_vbrx: i32,
    pub axis_vbry: i32,
    pub axis_vbrz: i32,
    /// 32 buttons, bit 0 is button 0
    pub buttons: i32,
    pub hats: i32,
    pub hats_ex1: i32,
    pub hats_ex2: i32,
    pub hats_ex3: i32,
}

impl PositionReport {
    pub fn new(device: u8) -> Self {
        Self {
            device,
            ..Default::default()
        }
    }

    /// Report field backing the given axis usage
    pub fn axis_mut(&mut self, usage: AxisUsage) -> &mut i32 {
        match usage {
            AxisUsage::X => &mut self.axis_x,
            AxisUsage::Y => &mut self.axis_y,
            AxisUsage::Z => &mut self.axis_z,
            AxisUsage::RX => &mut self.axis_x_rot,
            AxisUsage::RY => &mut self.axis_y_rot,
            AxisUsage::RZ => &mut self.axis_z_rot,
            AxisUsage::Slider0 => &mut self.slider,
            AxisUsage::Slider1 => &mut self.dial,
            AxisUsage::Wheel => &mut self.wheel,
        }
    }

    pub fn axis(&self, usage: AxisUsage) -> i32 {
        match usage {
            AxisUsage::X => self.axis_x,
            AxisUsage::Y => self.axis_y,
            AxisUsage::Z => self.axis_z,
            AxisUsage::RX => self.axis_x_rot,
            AxisUsage::RY => self.axis_y_rot,
            AxisUsage::RZ => self.axis_z_rot,
            AxisUsage::Slider0 => self.slider,
            AxisUsage::Slider1 => self.dial,
            AxisUsage::Wheel => self.wheel,
        }
    }

    pub fn set_button(&mut self, button: usize, pressed: bool) {
        let mask = 1u32 << button;
        let bits = self.buttons as u32;
        let bits = if pressed { bits | mask } else { bits & !mask };
        self.buttons = bits as i32;
    }

    pub fn button(&self, button: usize) -> bool {
        (self.buttons as u32) & (1u32 << button) != 0
    }
}

/// Write access to virtual controllers through the virtual-joystick driver
pub trait VirtualOutputPort {
    /// Whether the driver is installed and active
    fn enabled(&self) -> bool;

    fn status(&self, device: u8) -> VirtualStatus;

    /// Claims the device for this process
    fn acquire(&self, device: u8) -> bool;

    fn relinquish(&self, device: u8);

    fn button_count(&self, device: u8) -> usize;

    fn axis_exists(&self, device: u8, usage: AxisUsage) -> bool;

    fn axis_min(&self, device: u8, usage: AxisUsage) -> Option<i32>;

    fn axis_max(&self, device: u8, usage: AxisUsage) -> Option<i32>;

    /// Submits a complete report, returns false when the driver refuses it
    fn update(&self, device: u8, report: &PositionReport) -> bool;
}

/// The set of native bindings loaded for this process, each at most once
///
/// Either side may be absent when its library failed to load.
#[derive(Default)]
pub struct Ports {
    pub physical: Option<Box<dyn PhysicalInputPort>>,
    pub virtual_out: Option<Box<dyn VirtualOutputPort>>,
}

impl Ports {
    pub fn new(
        physical: Option<Box<dyn PhysicalInputPort>>,
        virtual_out: Option<Box<dyn VirtualOutputPort>>,
    ) -> Self {
        Self {
            physical,
            virtual_out,
        }
    }

    pub fn physical(&self) -> Option<&dyn PhysicalInputPort> {
        self.physical.as_deref()
    }

    pub fn virtual_out(&self) -> Option<&dyn VirtualOutputPort> {
        self.virtual_out.as_deref()
    }
}
