//! Values and functions scripts see
//!
//! `devices` and `state` are pushed into every run's scope; the free
//! functions (`modulo`, `clock`, `timestamp`, `tick`, `skip`) are
//! registered on the engine. Functions declared inside a script don't see
//! the scope, so helpers must take `devices` or `state` as parameters.

use super::error::SkipTick;
use super::modulo::modulo;
use crate::devices::{DeviceError, DeviceKey, DeviceRegistry};
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Map, Position, FLOAT, INT};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

pub type SharedRegistry = Rc<RefCell<DeviceRegistry>>;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Hands a device fault to the script as the thrown value
fn throw(err: DeviceError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(Dynamic::from(err), Position::NONE))
}

fn number(value: &Dynamic) -> ScriptResult<FLOAT> {
    if let Ok(f) = value.as_float() {
        return Ok(f);
    }
    if let Ok(i) = value.as_int() {
        return Ok(i as FLOAT);
    }
    Err(format!("expected a number, got {}", value.type_name()).into())
}

fn device_key(index: INT) -> ScriptResult<DeviceKey> {
    usize::try_from(index)
        .map(DeviceKey::Index)
        .map_err(|_| throw(DeviceError::Unavailable(index.to_string())))
}

/// The `devices` global
#[derive(Clone)]
pub struct ScriptDevices {
    registry: SharedRegistry,
}

impl ScriptDevices {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    fn get(&mut self, key: DeviceKey) -> ScriptResult<ScriptDevice> {
        let index = self.registry.borrow_mut().get(&key).map_err(throw)?.index();
        Ok(ScriptDevice {
            registry: self.registry.clone(),
            index,
        })
    }
}

/// A device handle as returned by `devices.get(..)`
#[derive(Clone)]
pub struct ScriptDevice {
    registry: SharedRegistry,
    index: usize,
}

impl ScriptDevice {
    fn with<T>(
        &self,
        f: impl FnOnce(&mut crate::devices::Device<'_>) -> Result<T, DeviceError>,
    ) -> ScriptResult<T> {
        let mut registry = self.registry.borrow_mut();
        let mut device = registry
            .device(self.index)
            .ok_or_else(|| throw(DeviceError::Unavailable(self.index.to_string())))?;
        f(&mut device).map_err(throw)
    }

    fn describe(&self) -> String {
        self.registry
            .borrow_mut()
            .device(self.index)
            .map(|d| d.handle().to_string())
            .unwrap_or_else(|| format!("devices.get({})", self.index))
    }
}

/// The `state` global: survives ticks and script switches
#[derive(Clone, Default)]
pub struct ScriptState {
    values: Rc<RefCell<Map>>,
}

impl ScriptState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Dynamic {
        self.values.borrow().get(key).cloned().unwrap_or(Dynamic::UNIT)
    }

    pub fn set(&self, key: &str, value: Dynamic) {
        self.values.borrow_mut().insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }
}

/// Registers every host type and function on `engine`
pub(super) fn register(engine: &mut Engine, tick: Rc<Cell<u64>>) {
    engine
        .register_type_with_name::<ScriptDevices>("Devices")
        .register_fn("get", |d: &mut ScriptDevices, name: &str| {
            d.get(DeviceKey::from(name))
        })
        .register_fn("get", |d: &mut ScriptDevices, index: INT| {
            let key = device_key(index)?;
            d.get(key)
        })
        .register_fn("poll", |d: &mut ScriptDevices| d.registry.borrow_mut().poll())
        .register_fn("button", |d: &mut ScriptDevices, address: &str| {
            d.registry.borrow_mut().button(address).map_err(throw)
        })
        .register_fn("len", |d: &mut ScriptDevices| d.registry.borrow().len() as INT)
        .register_fn("to_string", |d: &mut ScriptDevices| {
            format!("devices ({} known)", d.registry.borrow().len())
        });

    engine
        .register_type_with_name::<ScriptDevice>("Device")
        .register_fn("numAxis", |d: &mut ScriptDevice| {
            d.with(|dev| Ok(dev.num_axis() as INT))
        })
        .register_fn("getAxis", |d: &mut ScriptDevice, axis: INT| {
            d.with(|dev| dev.get_axis(axis))
        })
        .register_fn("numButtons", |d: &mut ScriptDevice| {
            d.with(|dev| Ok(dev.num_buttons() as INT))
        })
        .register_fn("getButton", |d: &mut ScriptDevice, button: INT| {
            d.with(|dev| dev.get_button(button))
        })
        .register_fn("setAxis", |d: &mut ScriptDevice, axis: INT, value: Dynamic| {
            let value = number(&value)?;
            d.with(|dev| dev.set_axis(axis, value))
        })
        .register_fn("setButton", |d: &mut ScriptDevice, button: INT, pressed: bool| {
            d.with(|dev| dev.set_button(button, pressed))
        })
        .register_fn("setButton", |d: &mut ScriptDevice, button: INT, pressed: INT| {
            d.with(|dev| dev.set_button(button, pressed != 0))
        })
        .register_fn("name", |d: &mut ScriptDevice| {
            d.with(|dev| Ok(dev.name().to_string()))
        })
        .register_fn("index", |d: &mut ScriptDevice| d.index as INT)
        .register_fn("isVirtual", |d: &mut ScriptDevice| {
            d.with(|dev| Ok(dev.is_virtual()))
        })
        .register_fn("to_string", |d: &mut ScriptDevice| d.describe())
        .register_fn("to_debug", |d: &mut ScriptDevice| d.describe());

    engine
        .register_type_with_name::<DeviceError>("DeviceError")
        .register_fn("to_string", |e: &mut DeviceError| e.to_string())
        .register_fn("to_debug", |e: &mut DeviceError| e.to_string());

    engine
        .register_type_with_name::<ScriptState>("State")
        .register_indexer_get(|s: &mut ScriptState, key: ImmutableString| s.get(&key))
        .register_indexer_set(|s: &mut ScriptState, key: ImmutableString, value: Dynamic| {
            s.set(&key, value)
        })
        .register_fn("contains", |s: &mut ScriptState, key: &str| {
            s.values.borrow().contains_key(key)
        })
        .register_fn("len", |s: &mut ScriptState| s.len() as INT);

    engine.register_fn(
        "modulo",
        |value: Dynamic, start: Dynamic, end: Dynamic| -> ScriptResult<FLOAT> {
            Ok(modulo(number(&value)?, number(&start)?, number(&end)?))
        },
    );

    let started = Instant::now();
    engine
        .register_fn("clock", move || started.elapsed().as_secs_f64())
        .register_fn("timestamp", || {
            chrono::Utc::now().timestamp_micros() as FLOAT / 1_000_000.0
        })
        .register_fn("tick", move || tick.get() as INT)
        .register_fn("skip", || -> ScriptResult<()> {
            Err(Box::new(EvalAltResult::ErrorRuntime(
                Dynamic::from(SkipTick),
                Position::NONE,
            )))
        });
}
