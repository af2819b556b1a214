//! Device handles - one capability surface over physical and virtual devices
//!
//! ```text
//! DeviceHandle ──► Physical ──► PhysicalInputPort (read-only)
//!              └─► Virtual  ──► VirtualOutputPort (staged report)
//! ```
//!
//! Handles never own a native binding. Every operation receives the
//! registry's [`Ports`], which keeps the handles cheap to store and lets
//! both keys of the registry point at the same handle.

use super::error::DeviceError;
use super::port::{AxisUsage, PhysicalInputPort, Ports, PositionReport, VirtualOutputPort, VirtualStatus};
use std::fmt;
use tracing::debug;

/// Largest magnitude of a native 16-bit axis reading
const AXIS_MAGNITUDE: f64 = 32767.0;

/// Width of the button mask in a [`PositionReport`]
const MAX_VIRTUAL_BUTTONS: usize = 32;

/// Whether the underlying OS handle has been opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Unacquired,
    Acquired,
    /// Last attempt failed; the next call retries
    Failed,
}

/// Physical controller, read-only
#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    index: usize,
    name: String,
    state: AcquisitionState,
}

impl PhysicalDevice {
    pub fn new(index: usize, name: String) -> Self {
        Self {
            index,
            name,
            state: AcquisitionState::Unacquired,
        }
    }

    pub fn acquire(&mut self, port: &dyn PhysicalInputPort) -> Result<(), DeviceError> {
        if self.state == AcquisitionState::Acquired {
            return Ok(());
        }
        if port.open(self.index) {
            debug!("Opened physical device {} ({})", self.index, self.name);
            self.state = AcquisitionState::Acquired;
            Ok(())
        } else {
            self.state = AcquisitionState::Failed;
            Err(DeviceError::Unavailable(self.index.to_string()))
        }
    }

    fn acquired(&self) -> bool {
        self.state == AcquisitionState::Acquired
    }

    /// An acquired device that has since been unplugged is unavailable
    fn ensure_connected(&self, port: &dyn PhysicalInputPort) -> Result<(), DeviceError> {
        if port.connected(self.index) {
            Ok(())
        } else {
            Err(DeviceError::Unavailable(self.index.to_string()))
        }
    }

    pub fn num_axis(&self, port: &dyn PhysicalInputPort) -> usize {
        if self.acquired() {
            port.axis_count(self.index)
        } else {
            0
        }
    }

    /// Axis reading normalized to `[-1, 1]`, 0 when unacquired
    pub fn get_axis(&self, port: &dyn PhysicalInputPort, axis: i64) -> Result<f64, DeviceError> {
        if !self.acquired() {
            return Ok(0.0);
        }
        self.ensure_connected(port)?;
        let axis = checked_index(axis, port.axis_count(self.index)).ok_or_else(|| {
            DeviceError::InvalidAxis {
                device: self.name.clone(),
                axis,
            }
        })?;
        Ok(f64::from(port.axis(self.index, axis)) / AXIS_MAGNITUDE)
    }

    pub fn num_buttons(&self, port: &dyn PhysicalInputPort) -> usize {
        if self.acquired() {
            port.button_count(self.index)
        } else {
            0
        }
    }

    pub fn get_button(
        &self,
        port: &dyn PhysicalInputPort,
        button: i64,
    ) -> Result<bool, DeviceError> {
        if !self.acquired() {
            return Ok(false);
        }
        self.ensure_connected(port)?;
        let button = checked_index(button, port.button_count(self.index)).ok_or_else(|| {
            DeviceError::InvalidButton {
                device: self.name.clone(),
                button,
            }
        })?;
        Ok(port.button(self.index, button))
    }
}

/// One axis of a virtual device with its driver-declared bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAxis {
    pub usage: AxisUsage,
    pub min: i32,
    pub max: i32,
}

/// Software-emulated output controller
///
/// Axis bounds are fixed when the device is probed. All writes are staged
/// into one [`PositionReport`] and submitted together.
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    index: usize,
    name: String,
    id: u8,
    axes: Vec<VirtualAxis>,
    buttons: usize,
    report: PositionReport,
    state: AcquisitionState,
}

impl VirtualDevice {
    /// Queries the driver for the axes and buttons of virtual device `id`
    pub fn probe(
        port: &dyn VirtualOutputPort,
        index: usize,
        name: String,
        id: u8,
    ) -> Result<Self, DeviceError> {
        let mut axes = Vec::new();
        for usage in AxisUsage::ALL {
            if !port.axis_exists(id, usage) {
                continue;
            }
            match (port.axis_min(id, usage), port.axis_max(id, usage)) {
                (Some(min), Some(max)) => axes.push(VirtualAxis { usage, min, max }),
                _ => {
                    debug!("Virtual device {} reports axis {} without bounds", id, usage);
                    return Err(DeviceError::Unavailable(index.to_string()));
                }
            }
        }
        let buttons = port.button_count(id).min(MAX_VIRTUAL_BUTTONS);

        Ok(Self {
            index,
            name,
            id,
            axes,
            buttons,
            report: PositionReport::new(id),
            state: AcquisitionState::Unacquired,
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn axes(&self) -> &[VirtualAxis] {
        &self.axes
    }

    pub fn report(&self) -> &PositionReport {
        &self.report
    }

    pub fn is_acquired(&self) -> bool {
        self.state == AcquisitionState::Acquired
    }

    pub fn acquire(&mut self, port: &dyn VirtualOutputPort) -> Result<(), DeviceError> {
        if self.state == AcquisitionState::Acquired {
            return Ok(());
        }
        let result = match port.status(self.id) {
            VirtualStatus::Own => Ok(()),
            VirtualStatus::Free if port.acquire(self.id) => Ok(()),
            VirtualStatus::Free => Err(DeviceError::Unavailable(self.index.to_string())),
            VirtualStatus::Busy => Err(DeviceError::Busy(self.index.to_string())),
            VirtualStatus::Missing | VirtualStatus::Unknown => {
                Err(DeviceError::Unavailable(self.index.to_string()))
            }
        };
        match result {
            Ok(()) => {
                debug!("Acquired virtual joystick {} ({})", self.id, self.name);
                self.state = AcquisitionState::Acquired;
                Ok(())
            }
            Err(e) => {
                self.state = AcquisitionState::Failed;
                Err(e)
            }
        }
    }

    pub fn num_axis(&self) -> usize {
        self.axes.len()
    }

    pub fn num_buttons(&self) -> usize {
        self.buttons
    }

    /// Value currently staged for `axis`
    pub fn get_axis(&self, axis: i64) -> Result<f64, DeviceError> {
        let slot = self.axis_slot(axis)?;
        Ok(f64::from(self.report.axis(slot.usage)))
    }

    /// State currently staged for `button`
    pub fn get_button(&self, button: i64) -> Result<bool, DeviceError> {
        let button = self.button_slot(button)?;
        Ok(self.report.button(button))
    }

    /// Stages `value` for `axis` and submits the whole report
    ///
    /// A value the driver refuses stays staged and goes out with the next
    /// successful submission.
    pub fn set_axis(
        &mut self,
        port: &dyn VirtualOutputPort,
        axis: i64,
        value: f64,
    ) -> Result<(), DeviceError> {
        let slot = self.axis_slot(axis)?;
        if !value.is_finite() || value < f64::from(slot.min) || value > f64::from(slot.max) {
            return Err(DeviceError::AxisOutOfRange {
                device: self.index.to_string(),
                axis: axis as usize,
                value,
                min: slot.min,
                max: slot.max,
            });
        }
        self.acquire(port)?;
        *self.report.axis_mut(slot.usage) = value.round() as i32;
        self.submit(port)
    }

    /// Stages `pressed` for `button` and submits the whole report
    pub fn set_button(
        &mut self,
        port: &dyn VirtualOutputPort,
        button: i64,
        pressed: bool,
    ) -> Result<(), DeviceError> {
        let slot = self.button_slot(button)?;
        self.acquire(port)?;
        self.report.set_button(slot, pressed);
        self.submit(port)
    }

    fn submit(&self, port: &dyn VirtualOutputPort) -> Result<(), DeviceError> {
        if port.update(self.id, &self.report) {
            Ok(())
        } else {
            Err(DeviceError::Unavailable(self.index.to_string()))
        }
    }

    fn axis_slot(&self, axis: i64) -> Result<VirtualAxis, DeviceError> {
        checked_index(axis, self.axes.len())
            .map(|i| self.axes[i])
            .ok_or_else(|| DeviceError::InvalidAxis {
                device: self.index.to_string(),
                axis,
            })
    }

    fn button_slot(&self, button: i64) -> Result<usize, DeviceError> {
        checked_index(button, self.buttons).ok_or_else(|| DeviceError::InvalidButton {
            device: self.index.to_string(),
            button,
        })
    }
}

/// Either kind of device behind the one capability surface
#[derive(Debug, Clone)]
pub enum DeviceHandle {
    Physical(PhysicalDevice),
    Virtual(VirtualDevice),
}

impl DeviceHandle {
    pub fn index(&self) -> usize {
        match self {
            DeviceHandle::Physical(d) => d.index,
            DeviceHandle::Virtual(d) => d.index,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DeviceHandle::Physical(d) => &d.name,
            DeviceHandle::Virtual(d) => &d.name,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, DeviceHandle::Virtual(_))
    }

    pub fn state(&self) -> AcquisitionState {
        match self {
            DeviceHandle::Physical(d) => d.state,
            DeviceHandle::Virtual(d) => d.state,
        }
    }

    /// Opens the OS handle; a no-op when already acquired
    pub fn acquire(&mut self, ports: &Ports) -> Result<(), DeviceError> {
        match self {
            DeviceHandle::Physical(d) => match ports.physical() {
                Some(port) => d.acquire(port),
                None => Err(DeviceError::Unavailable(d.index.to_string())),
            },
            DeviceHandle::Virtual(d) => match ports.virtual_out() {
                Some(port) => d.acquire(port),
                None => Err(DeviceError::Unavailable(d.index.to_string())),
            },
        }
    }

    pub fn num_axis(&self, ports: &Ports) -> usize {
        match self {
            DeviceHandle::Physical(d) => ports.physical().map_or(0, |p| d.num_axis(p)),
            DeviceHandle::Virtual(d) => d.num_axis(),
        }
    }

    pub fn get_axis(&self, ports: &Ports, axis: i64) -> Result<f64, DeviceError> {
        match self {
            DeviceHandle::Physical(d) => match ports.physical() {
                Some(port) => d.get_axis(port, axis),
                None => Ok(0.0),
            },
            DeviceHandle::Virtual(d) => d.get_axis(axis),
        }
    }

    pub fn num_buttons(&self, ports: &Ports) -> usize {
        match self {
            DeviceHandle::Physical(d) => ports.physical().map_or(0, |p| d.num_buttons(p)),
            DeviceHandle::Virtual(d) => d.num_buttons(),
        }
    }

    pub fn get_button(&self, ports: &Ports, button: i64) -> Result<bool, DeviceError> {
        match self {
            DeviceHandle::Physical(d) => match ports.physical() {
                Some(port) => d.get_button(port, button),
                None => Ok(false),
            },
            DeviceHandle::Virtual(d) => d.get_button(button),
        }
    }

    pub fn set_axis(&mut self, ports: &Ports, axis: i64, value: f64) -> Result<(), DeviceError> {
        match self {
            DeviceHandle::Physical(d) => Err(DeviceError::ReadOnly(d.name.clone())),
            DeviceHandle::Virtual(d) => match ports.virtual_out() {
                Some(port) => d.set_axis(port, axis, value),
                None => Err(DeviceError::Unavailable(d.index.to_string())),
            },
        }
    }

    pub fn set_button(
        &mut self,
        ports: &Ports,
        button: i64,
        pressed: bool,
    ) -> Result<(), DeviceError> {
        match self {
            DeviceHandle::Physical(d) => Err(DeviceError::ReadOnly(d.name.clone())),
            DeviceHandle::Virtual(d) => match ports.virtual_out() {
                Some(port) => d.set_button(port, button, pressed),
                None => Err(DeviceError::Unavailable(d.index.to_string())),
            },
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // button/axis counts aren't available before acquisition
            DeviceHandle::Physical(d) => write!(f, "devices.get('{}') # index {}", d.name, d.index),
            DeviceHandle::Virtual(d) => write!(
                f,
                "devices.get('{}') # virtual index {} ({} axes, {} buttons)",
                d.name,
                d.index,
                d.axes.len(),
                d.buttons
            ),
        }
    }
}

fn checked_index(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|i| *i < len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::{MockPhysicalPort, MockVirtualPort};

    fn vjoy() -> (MockVirtualPort, VirtualDevice) {
        let port = MockVirtualPort::new();
        port.add_device(1, &[(AxisUsage::X, 1, 32768), (AxisUsage::Slider0, 0, 100)], 8);
        let device = VirtualDevice::probe(&port, 3, "vJoy Device".into(), 1).unwrap();
        (port, device)
    }

    #[test]
    fn probe_keeps_only_existing_axes_in_probe_order() {
        let (_, device) = vjoy();
        let usages: Vec<_> = device.axes().iter().map(|a| a.usage).collect();
        assert_eq!(usages, vec![AxisUsage::X, AxisUsage::Slider0]);
        assert_eq!(device.num_buttons(), 8);
    }

    #[test]
    fn set_axis_accepts_inclusive_bounds() {
        let (port, mut device) = vjoy();
        assert!(device.set_axis(&port, 0, 1.0).is_ok());
        assert!(device.set_axis(&port, 0, 32768.0).is_ok());
        assert!(matches!(
            device.set_axis(&port, 0, 0.0),
            Err(DeviceError::AxisOutOfRange { .. })
        ));
        assert!(matches!(
            device.set_axis(&port, 0, 32769.0),
            Err(DeviceError::AxisOutOfRange { .. })
        ));
        assert!(matches!(
            device.set_axis(&port, 0, f64::NAN),
            Err(DeviceError::AxisOutOfRange { .. })
        ));
    }

    #[test]
    fn set_axis_rejects_unknown_axis() {
        let (port, mut device) = vjoy();
        assert!(matches!(
            device.set_axis(&port, 2, 1.0),
            Err(DeviceError::InvalidAxis { axis: 2, .. })
        ));
        assert!(matches!(
            device.set_axis(&port, -1, 1.0),
            Err(DeviceError::InvalidAxis { axis: -1, .. })
        ));
    }

    #[test]
    fn writes_are_coalesced_into_one_report() {
        let (port, mut device) = vjoy();
        device.set_axis(&port, 0, 1000.4).unwrap();
        device.set_button(&port, 2, true).unwrap();
        device.set_axis(&port, 1, 55.0).unwrap();

        let last = port.last_report(1).unwrap();
        assert_eq!(last.axis_x, 1000);
        assert_eq!(last.slider, 55);
        assert!(last.button(2));
        assert_eq!(port.update_count(1), 3);
        assert_eq!(device.get_axis(0).unwrap(), 1000.0);
        assert!(device.get_button(2).unwrap());
    }

    #[test]
    fn refused_update_is_unavailable_and_stays_staged() {
        let (port, mut device) = vjoy();
        port.refuse_updates(true);
        assert!(matches!(
            device.set_axis(&port, 0, 50.0),
            Err(DeviceError::Unavailable(_))
        ));
        assert_eq!(device.get_axis(0).unwrap(), 50.0);
        assert_eq!(port.update_count(1), 0);

        port.refuse_updates(false);
        device.set_button(&port, 1, true).unwrap();
        let last = port.last_report(1).unwrap();
        assert_eq!(last.axis_x, 50);
        assert!(last.button(1));
    }

    #[test]
    fn set_button_validates_index() {
        let (port, mut device) = vjoy();
        assert!(matches!(
            device.set_button(&port, 8, true),
            Err(DeviceError::InvalidButton { button: 8, .. })
        ));
        assert_eq!(port.update_count(1), 0);
    }

    #[test]
    fn busy_device_is_not_acquired() {
        let (port, mut device) = vjoy();
        port.set_status(1, VirtualStatus::Busy);
        assert!(matches!(device.acquire(&port), Err(DeviceError::Busy(_))));
        assert!(!device.is_acquired());

        port.set_status(1, VirtualStatus::Free);
        assert!(device.acquire(&port).is_ok());
        assert!(device.acquire(&port).is_ok());
        assert_eq!(port.acquire_count(1), 1);
    }

    #[test]
    fn missing_device_is_unavailable() {
        let (port, mut device) = vjoy();
        port.set_status(1, VirtualStatus::Missing);
        assert!(matches!(
            device.acquire(&port),
            Err(DeviceError::Unavailable(_))
        ));
    }

    #[test]
    fn physical_reads_are_zero_until_acquired() {
        let port = MockPhysicalPort::new();
        port.add_device("Saitek X52", 3, 4);
        port.set_axis(0, 0, 32767);
        let mut device = PhysicalDevice::new(0, "Saitek X52".into());

        assert_eq!(device.num_axis(&port), 0);
        assert_eq!(device.get_axis(&port, 0).unwrap(), 0.0);
        assert!(!device.get_button(&port, 0).unwrap());

        device.acquire(&port).unwrap();
        assert_eq!(device.num_axis(&port), 3);
        assert_eq!(device.num_buttons(&port), 4);
        assert_eq!(device.get_axis(&port, 0).unwrap(), 1.0);
    }

    #[test]
    fn unplugged_physical_device_is_unavailable() {
        let port = MockPhysicalPort::new();
        port.add_device("Saitek X52", 3, 4);
        let mut device = PhysicalDevice::new(0, "Saitek X52".into());
        device.acquire(&port).unwrap();

        port.set_connected(0, false);
        assert!(matches!(
            device.get_axis(&port, 0),
            Err(DeviceError::Unavailable(_))
        ));
        assert!(matches!(
            device.get_button(&port, 0),
            Err(DeviceError::Unavailable(_))
        ));

        port.set_connected(0, true);
        assert_eq!(device.get_axis(&port, 0).unwrap(), 0.0);
    }

    #[test]
    fn physical_acquire_failure_is_retried() {
        let port = MockPhysicalPort::new();
        port.add_device("Pedals", 3, 0);
        port.set_openable(0, false);
        let mut device = PhysicalDevice::new(0, "Pedals".into());

        assert!(matches!(
            device.acquire(&port),
            Err(DeviceError::Unavailable(_))
        ));
        port.set_openable(0, true);
        assert!(device.acquire(&port).is_ok());
        assert_eq!(port.open_count(0), 2);
    }

    #[test]
    fn physical_handles_are_read_only() {
        let ports = Ports::default();
        let mut handle = DeviceHandle::Physical(PhysicalDevice::new(0, "Saitek X52".into()));
        assert!(matches!(
            handle.set_axis(&ports, 0, 0.0),
            Err(DeviceError::ReadOnly(_))
        ));
        assert_eq!(handle.to_string(), "devices.get('Saitek X52') # index 0");
    }
}
