//! Device registry - enumeration and O(1) lookup by name or index
//!
//! The registry is built once per process. Physical devices are enumerated
//! first; entries carrying the reserved virtual-device name are then
//! replaced by virtual handles probed from the virtual-joystick driver.
//! Failure of either subsystem is logged and leaves the other intact.

use super::error::{DeviceError, PortError};
use super::gilrs_port::GilrsPort;
use super::handle::{AcquisitionState, DeviceHandle, PhysicalDevice, VirtualDevice};
use super::port::{PhysicalInputPort, Ports, VirtualOutputPort};
use super::vjoy::VJoyLibrary;
use crate::config::Settings;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Name under which virtual joysticks present themselves to the physical library
pub const VIRTUAL_DEVICE_NAME: &str = "vJoy Device";

/// Address of a device as given by a script
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    Name(String),
    Index(usize),
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKey::Name(name) => write!(f, "{}", name),
            DeviceKey::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for DeviceKey {
    fn from(name: &str) -> Self {
        DeviceKey::Name(name.to_string())
    }
}

impl From<usize> for DeviceKey {
    fn from(index: usize) -> Self {
        DeviceKey::Index(index)
    }
}

/// `"<device-name-or-index>.<button-index>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonAddress {
    pub device: DeviceKey,
    pub button: i64,
}

impl FromStr for ButtonAddress {
    type Err = DeviceError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        let (device, button) = address
            .rsplit_once('.')
            .ok_or_else(|| DeviceError::Unavailable(address.to_string()))?;
        let button = button
            .trim()
            .parse::<i64>()
            .map_err(|_| DeviceError::Unavailable(address.to_string()))?;
        let device = match device.parse::<usize>() {
            Ok(index) => DeviceKey::Index(index),
            Err(_) => DeviceKey::Name(device.to_string()),
        };
        Ok(Self { device, button })
    }
}

/// A handle borrowed together with the ports it needs
pub struct Device<'a> {
    handle: &'a mut DeviceHandle,
    ports: &'a Ports,
}

impl Device<'_> {
    pub fn handle(&self) -> &DeviceHandle {
        self.handle
    }

    pub fn index(&self) -> usize {
        self.handle.index()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn is_virtual(&self) -> bool {
        self.handle.is_virtual()
    }

    pub fn state(&self) -> AcquisitionState {
        self.handle.state()
    }

    pub fn num_axis(&self) -> usize {
        self.handle.num_axis(self.ports)
    }

    pub fn get_axis(&self, axis: i64) -> Result<f64, DeviceError> {
        self.handle.get_axis(self.ports, axis)
    }

    pub fn num_buttons(&self) -> usize {
        self.handle.num_buttons(self.ports)
    }

    pub fn get_button(&self, button: i64) -> Result<bool, DeviceError> {
        self.handle.get_button(self.ports, button)
    }

    pub fn set_axis(&mut self, axis: i64, value: f64) -> Result<(), DeviceError> {
        self.handle.set_axis(self.ports, axis, value)
    }

    pub fn set_button(&mut self, button: i64, pressed: bool) -> Result<(), DeviceError> {
        self.handle.set_button(self.ports, button, pressed)
    }
}

/// Owns every device handle and the native bindings behind them
pub struct DeviceRegistry {
    ports: Ports,
    handles: BTreeMap<usize, DeviceHandle>,
    names: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Loads the native adapters named in `settings` and enumerates
    pub fn from_system(settings: &Settings) -> Self {
        let physical = match GilrsPort::new() {
            Ok(port) => Some(Box::new(port) as Box<dyn PhysicalInputPort>),
            Err(e) => {
                warn!("Cannot initialize support for physical joysticks");
                debug!("{}", e);
                None
            }
        };

        let virtual_out = match VJoyLibrary::load(&settings.vjoy_library) {
            Ok(library) => Some(Box::new(library) as Box<dyn VirtualOutputPort>),
            Err(e) => {
                log_virtual_failure(&e);
                None
            }
        };

        Self::enumerate_named(physical, virtual_out, &settings.virtual_device_name)
    }

    /// Enumerates with the default reserved virtual-device name
    pub fn enumerate(
        physical: Option<Box<dyn PhysicalInputPort>>,
        virtual_out: Option<Box<dyn VirtualOutputPort>>,
    ) -> Self {
        Self::enumerate_named(physical, virtual_out, VIRTUAL_DEVICE_NAME)
    }

    pub fn enumerate_named(
        physical: Option<Box<dyn PhysicalInputPort>>,
        virtual_out: Option<Box<dyn VirtualOutputPort>>,
        virtual_name: &str,
    ) -> Self {
        let ports = Ports::new(physical, virtual_out);

        let mut found: Vec<DeviceHandle> = match ports.physical() {
            Some(port) => (0..port.device_count())
                .map(|index| {
                    let name = port.device_name(index).unwrap_or_default();
                    DeviceHandle::Physical(PhysicalDevice::new(index, name))
                })
                .collect(),
            None => Vec::new(),
        };

        if let Some(port) = ports.virtual_out() {
            if port.enabled() {
                wrap_virtual(port, &mut found, virtual_name);
            } else {
                info!("No virtual joystick driver active");
            }
        }

        let mut registry = Self {
            ports,
            handles: BTreeMap::new(),
            names: HashMap::new(),
        };
        for handle in found {
            info!("{}", handle);
            registry.insert(handle);
        }
        registry
    }

    fn insert(&mut self, handle: DeviceHandle) -> usize {
        let index = handle.index();
        self.names.insert(handle.name().to_string(), index);
        self.handles.insert(index, handle);
        index
    }

    /// Number of devices the physical library reports right now
    pub fn num_devices(&self) -> usize {
        self.ports.physical().map_or(0, |p| p.device_count())
    }

    /// Number of handles currently indexed
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Resolves `key` to an acquired handle, constructing it on first use
    pub fn get(&mut self, key: &DeviceKey) -> Result<Device<'_>, DeviceError> {
        let index = match self.lookup(key) {
            Some(index) => index,
            None => self.discover(key)?,
        };
        let handle = self
            .handles
            .get_mut(&index)
            .ok_or_else(|| DeviceError::Unavailable(key.to_string()))?;
        handle.acquire(&self.ports)?;
        Ok(Device {
            handle,
            ports: &self.ports,
        })
    }

    /// Handle at `index` without acquiring it
    pub fn device(&mut self, index: usize) -> Option<Device<'_>> {
        let handle = self.handles.get_mut(&index)?;
        Some(Device {
            handle,
            ports: &self.ports,
        })
    }

    /// Reads a button addressed as `"<device>.<button>"`
    pub fn button(&mut self, address: &str) -> Result<bool, DeviceError> {
        let address: ButtonAddress = address.parse()?;
        self.get(&address.device)?.get_button(address.button)
    }

    /// Refreshes all physical device states once; call once per tick
    pub fn poll(&mut self) {
        if let Some(port) = self.ports.physical.as_mut() {
            port.update();
        }
    }

    fn lookup(&self, key: &DeviceKey) -> Option<usize> {
        match key {
            DeviceKey::Index(index) => self.handles.contains_key(index).then_some(*index),
            DeviceKey::Name(name) => self.names.get(name).copied(),
        }
    }

    /// Constructs a physical handle for a device not seen at enumeration
    fn discover(&mut self, key: &DeviceKey) -> Result<usize, DeviceError> {
        let unavailable = || DeviceError::Unavailable(key.to_string());
        let port = self.ports.physical().ok_or_else(unavailable)?;
        let index = match key {
            DeviceKey::Index(index) if *index < port.device_count() => *index,
            DeviceKey::Index(_) => return Err(unavailable()),
            DeviceKey::Name(name) => (0..port.device_count())
                .find(|i| port.device_name(*i).as_deref() == Some(name.as_str()))
                .ok_or_else(unavailable)?,
        };
        let name = port.device_name(index).unwrap_or_default();
        debug!("Discovered device {} ({}) after enumeration", index, name);
        Ok(self.insert(DeviceHandle::Physical(PhysicalDevice::new(index, name))))
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        let Some(port) = self.ports.virtual_out() else {
            return;
        };
        for handle in self.handles.values() {
            if let DeviceHandle::Virtual(device) = handle {
                if device.is_acquired() {
                    debug!("Relinquishing virtual joystick {}", device.id());
                    port.relinquish(device.id());
                }
            }
        }
    }
}

/// Replaces entries named `virtual_name` with probed virtual handles
fn wrap_virtual(port: &dyn VirtualOutputPort, found: &mut [DeviceHandle], virtual_name: &str) {
    let mut instance: u8 = 0;
    for slot in found.iter_mut() {
        if slot.name() != virtual_name {
            continue;
        }
        instance = instance.saturating_add(1);
        let (index, name) = (slot.index(), slot.name().to_string());
        match VirtualDevice::probe(port, index, name, instance) {
            Ok(device) => *slot = DeviceHandle::Virtual(device),
            Err(e) => {
                warn!("Cannot initialize support for virtual joystick {}", slot.name());
                warn!("{}", e);
            }
        }
    }
}

fn log_virtual_failure(e: &PortError) {
    match e {
        PortError::LibraryLoad { .. } => {
            warn!("Cannot initialize support for virtual joysticks");
            debug!("{}", e);
        }
        _ => {
            warn!("Cannot initialize support for virtual joysticks");
            warn!("{}", e);
        }
    }
}
