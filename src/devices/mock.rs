//! In-memory ports for tests and dry runs
//!
//! Both mocks are cheap to clone and share their state, so a test can hand
//! one clone to the registry and keep another to drive inputs and inspect
//! what the registry did.

use super::port::{AxisUsage, PhysicalInputPort, PositionReport, VirtualOutputPort, VirtualStatus};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Default, Clone)]
struct MockJoystick {
    name: String,
    axes: Vec<i16>,
    buttons: Vec<bool>,
    openable: bool,
    unplugged: bool,
    opens: usize,
}

#[derive(Debug, Default)]
struct PhysicalState {
    devices: Vec<MockJoystick>,
    updates: usize,
}

/// Scriptable stand-in for the physical-input library
#[derive(Debug, Clone, Default)]
pub struct MockPhysicalPort {
    state: Rc<RefCell<PhysicalState>>,
}

impl MockPhysicalPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device and returns its index
    pub fn add_device(&self, name: &str, axes: usize, buttons: usize) -> usize {
        let mut state = self.state.borrow_mut();
        state.devices.push(MockJoystick {
            name: name.to_string(),
            axes: vec![0; axes],
            buttons: vec![false; buttons],
            openable: true,
            unplugged: false,
            opens: 0,
        });
        state.devices.len() - 1
    }

    pub fn set_axis(&self, index: usize, axis: usize, raw: i16) {
        if let Some(slot) = self
            .state
            .borrow_mut()
            .devices
            .get_mut(index)
            .and_then(|d| d.axes.get_mut(axis))
        {
            *slot = raw;
        }
    }

    pub fn set_button(&self, index: usize, button: usize, pressed: bool) {
        if let Some(slot) = self
            .state
            .borrow_mut()
            .devices
            .get_mut(index)
            .and_then(|d| d.buttons.get_mut(button))
        {
            *slot = pressed;
        }
    }

    pub fn set_openable(&self, index: usize, openable: bool) {
        if let Some(device) = self.state.borrow_mut().devices.get_mut(index) {
            device.openable = openable;
        }
    }

    /// Simulates the device being unplugged or plugged back in
    pub fn set_connected(&self, index: usize, connected: bool) {
        if let Some(device) = self.state.borrow_mut().devices.get_mut(index) {
            device.unplugged = !connected;
        }
    }

    pub fn open_count(&self, index: usize) -> usize {
        self.state
            .borrow()
            .devices
            .get(index)
            .map_or(0, |d| d.opens)
    }

    pub fn update_count(&self) -> usize {
        self.state.borrow().updates
    }
}

impl PhysicalInputPort for MockPhysicalPort {
    fn device_count(&self) -> usize {
        self.state.borrow().devices.len()
    }

    fn device_name(&self, index: usize) -> Option<String> {
        self.state.borrow().devices.get(index).map(|d| d.name.clone())
    }

    fn open(&self, index: usize) -> bool {
        let mut state = self.state.borrow_mut();
        match state.devices.get_mut(index) {
            Some(device) => {
                device.opens += 1;
                device.openable && !device.unplugged
            }
            None => false,
        }
    }

    fn connected(&self, index: usize) -> bool {
        self.state
            .borrow()
            .devices
            .get(index)
            .is_some_and(|d| !d.unplugged)
    }

    fn axis_count(&self, index: usize) -> usize {
        self.state
            .borrow()
            .devices
            .get(index)
            .map_or(0, |d| d.axes.len())
    }

    fn axis(&self, index: usize, axis: usize) -> i16 {
        self.state
            .borrow()
            .devices
            .get(index)
            .and_then(|d| d.axes.get(axis).copied())
            .unwrap_or(0)
    }

    fn button_count(&self, index: usize) -> usize {
        self.state
            .borrow()
            .devices
            .get(index)
            .map_or(0, |d| d.buttons.len())
    }

    fn button(&self, index: usize, button: usize) -> bool {
        self.state
            .borrow()
            .devices
            .get(index)
            .and_then(|d| d.buttons.get(button).copied())
            .unwrap_or(false)
    }

    fn update(&mut self) {
        self.state.borrow_mut().updates += 1;
    }
}

#[derive(Debug, Clone)]
struct MockVJoy {
    status: VirtualStatus,
    axes: HashMap<AxisUsage, (i32, i32)>,
    buttons: usize,
    acquires: usize,
    relinquished: bool,
    reports: Vec<PositionReport>,
}

#[derive(Debug)]
struct VirtualState {
    enabled: bool,
    refuse_updates: bool,
    devices: HashMap<u8, MockVJoy>,
}

impl Default for VirtualState {
    fn default() -> Self {
        Self {
            enabled: true,
            refuse_updates: false,
            devices: HashMap::new(),
        }
    }
}

/// Scriptable stand-in for the virtual-joystick driver
#[derive(Debug, Clone, Default)]
pub struct MockVirtualPort {
    state: Rc<RefCell<VirtualState>>,
}

impl MockVirtualPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.borrow_mut().enabled = enabled;
    }

    /// Declares virtual device `id` with `(usage, min, max)` axes, initially free
    pub fn add_device(&self, id: u8, axes: &[(AxisUsage, i32, i32)], buttons: usize) {
        let axes = axes
            .iter()
            .map(|(usage, min, max)| (*usage, (*min, *max)))
            .collect();
        self.state.borrow_mut().devices.insert(
            id,
            MockVJoy {
                status: VirtualStatus::Free,
                axes,
                buttons,
                acquires: 0,
                relinquished: false,
                reports: Vec::new(),
            },
        );
    }

    pub fn set_status(&self, id: u8, status: VirtualStatus) {
        if let Some(device) = self.state.borrow_mut().devices.get_mut(&id) {
            device.status = status;
        }
    }

    pub fn refuse_updates(&self, refuse: bool) {
        self.state.borrow_mut().refuse_updates = refuse;
    }

    pub fn acquire_count(&self, id: u8) -> usize {
        self.state.borrow().devices.get(&id).map_or(0, |d| d.acquires)
    }

    pub fn was_relinquished(&self, id: u8) -> bool {
        self.state
            .borrow()
            .devices
            .get(&id)
            .is_some_and(|d| d.relinquished)
    }

    pub fn update_count(&self, id: u8) -> usize {
        self.state
            .borrow()
            .devices
            .get(&id)
            .map_or(0, |d| d.reports.len())
    }

    pub fn last_report(&self, id: u8) -> Option<PositionReport> {
        self.state
            .borrow()
            .devices
            .get(&id)
            .and_then(|d| d.reports.last().copied())
    }
}

impl VirtualOutputPort for MockVirtualPort {
    fn enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    fn status(&self, device: u8) -> VirtualStatus {
        self.state
            .borrow()
            .devices
            .get(&device)
            .map_or(VirtualStatus::Missing, |d| d.status)
    }

    fn acquire(&self, device: u8) -> bool {
        let mut state = self.state.borrow_mut();
        match state.devices.get_mut(&device) {
            Some(d) if d.status == VirtualStatus::Free => {
                d.acquires += 1;
                d.status = VirtualStatus::Own;
                true
            }
            _ => false,
        }
    }

    fn relinquish(&self, device: u8) {
        if let Some(d) = self.state.borrow_mut().devices.get_mut(&device) {
            d.relinquished = true;
            d.status = VirtualStatus::Free;
        }
    }

    fn button_count(&self, device: u8) -> usize {
        self.state
            .borrow()
            .devices
            .get(&device)
            .map_or(0, |d| d.buttons)
    }

    fn axis_exists(&self, device: u8, usage: AxisUsage) -> bool {
        self.state
            .borrow()
            .devices
            .get(&device)
            .is_some_and(|d| d.axes.contains_key(&usage))
    }

    fn axis_min(&self, device: u8, usage: AxisUsage) -> Option<i32> {
        self.state
            .borrow()
            .devices
            .get(&device)
            .and_then(|d| d.axes.get(&usage).map(|(min, _)| *min))
    }

    fn axis_max(&self, device: u8, usage: AxisUsage) -> Option<i32> {
        self.state
            .borrow()
            .devices
            .get(&device)
            .and_then(|d| d.axes.get(&usage).map(|(_, max)| *max))
    }

    fn update(&self, device: u8, report: &PositionReport) -> bool {
        let mut state = self.state.borrow_mut();
        if state.refuse_updates {
            return false;
        }
        match state.devices.get_mut(&device) {
            Some(d) if d.status == VirtualStatus::Own => {
                d.reports.push(*report);
                true
            }
            _ => false,
        }
    }
}
