//! Physical input through gilrs
//!
//! gilrs identifies gamepads by opaque ids; this adapter assigns dense
//! indices in discovery order and never reorders them, so a script's
//! `devices.get(0)` stays the same controller for the process lifetime.
//! Controllers connected later are appended.

use super::error::PortError;
use super::port::PhysicalInputPort;
use gilrs::{Axis, Button, Gamepad, GamepadId, Gilrs};
use tracing::{debug, info, warn};

/// Axes in the order they are exposed to scripts, as far as a pad has them
const AXES: [Axis; 8] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::LeftZ,
    Axis::RightStickX,
    Axis::RightStickY,
    Axis::RightZ,
    Axis::DPadX,
    Axis::DPadY,
];

const BUTTONS: [Button; 19] = [
    Button::South,
    Button::East,
    Button::North,
    Button::West,
    Button::C,
    Button::Z,
    Button::LeftTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
];

pub struct GilrsPort {
    gilrs: Gilrs,
    ids: Vec<GamepadId>,
}

impl GilrsPort {
    pub fn new() -> Result<Self, PortError> {
        info!("Initializing gilrs controller interface");
        let gilrs = Gilrs::new().map_err(|e| PortError::Gilrs(e.to_string()))?;

        let mut ids: Vec<GamepadId> = gilrs.gamepads().map(|(id, _)| id).collect();
        ids.sort_by_key(|id| usize::from(*id));
        if ids.is_empty() {
            warn!("No joystick connected");
        } else {
            info!("Found {} joysticks", ids.len());
        }

        Ok(Self { gilrs, ids })
    }

    fn gamepad(&self, index: usize) -> Option<Gamepad<'_>> {
        let id = *self.ids.get(index)?;
        self.gilrs.connected_gamepad(id)
    }

    fn axes(gamepad: &Gamepad<'_>) -> Vec<Axis> {
        AXES.into_iter()
            .filter(|axis| gamepad.axis_code(*axis).is_some())
            .collect()
    }

    fn buttons(gamepad: &Gamepad<'_>) -> Vec<Button> {
        BUTTONS
            .into_iter()
            .filter(|button| gamepad.button_code(*button).is_some())
            .collect()
    }
}

impl PhysicalInputPort for GilrsPort {
    fn device_count(&self) -> usize {
        self.ids.len()
    }

    fn device_name(&self, index: usize) -> Option<String> {
        let id = *self.ids.get(index)?;
        Some(self.gilrs.gamepad(id).name().to_string())
    }

    fn open(&self, index: usize) -> bool {
        self.gamepad(index).is_some()
    }

    fn connected(&self, index: usize) -> bool {
        self.gamepad(index).is_some()
    }

    fn axis_count(&self, index: usize) -> usize {
        self.gamepad(index).map_or(0, |g| Self::axes(&g).len())
    }

    fn axis(&self, index: usize, axis: usize) -> i16 {
        let Some(gamepad) = self.gamepad(index) else {
            return 0;
        };
        let value = Self::axes(&gamepad)
            .get(axis)
            .map_or(0.0, |a| gamepad.value(*a));
        (value.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
    }

    fn button_count(&self, index: usize) -> usize {
        self.gamepad(index).map_or(0, |g| Self::buttons(&g).len())
    }

    fn button(&self, index: usize, button: usize) -> bool {
        let Some(gamepad) = self.gamepad(index) else {
            return false;
        };
        Self::buttons(&gamepad)
            .get(button)
            .is_some_and(|b| gamepad.is_pressed(*b))
    }

    fn update(&mut self) {
        // gilrs folds pending events into the cached gamepad state
        while let Some(event) = self.gilrs.next_event() {
            if !self.ids.contains(&event.id) {
                debug!("New joystick {} at index {}", event.id, self.ids.len());
                self.ids.push(event.id);
            }
        }
    }
}
