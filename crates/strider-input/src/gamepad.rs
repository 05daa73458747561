//! [`GamepadSource`] – gilrs-backed estop trigger on a teleoperation gamepad.
//!
//! The operator's stop button is an ordinary gamepad button; gilrs delivers
//! connect/disconnect and button events through a non-blocking event pump,
//! and the current button level is read off the active gamepad's state.

use async_trait::async_trait;
use gilrs::{Button, EventType, Gilrs};
use tracing::{debug, info, warn};

use crate::MonitorError;
use crate::source::SafetySource;

/// Safety source reading one button on the first connected gamepad.
pub struct GamepadSource {
    gilrs: Gilrs,
    button: Button,
    active: Option<gilrs::GamepadId>,
}

impl GamepadSource {
    /// Initialize gilrs and bind to `button` as the stop trigger.
    pub fn new(button: Button) -> Result<Self, MonitorError> {
        let gilrs = Gilrs::new().map_err(|e| MonitorError::Init(e.to_string()))?;

        let active = {
            let connected: Vec<_> = gilrs.gamepads().collect();
            if connected.is_empty() {
                warn!("no gamepad connected at startup; estop will be asserted until one appears");
            }
            for (id, pad) in &connected {
                info!(gamepad = %pad.name(), %id, "detected gamepad");
            }
            connected.first().map(|(id, _)| *id)
        };

        Ok(Self {
            gilrs,
            button,
            active,
        })
    }

    /// Initialize from a configuration button name (see [`button_from_name`]).
    pub fn from_button_name(name: &str) -> Result<Self, MonitorError> {
        let button = button_from_name(name)
            .ok_or_else(|| MonitorError::Init(format!("unknown estop button '{name}'")))?;
        Self::new(button)
    }

    /// Drain pending gilrs events, tracking connects and disconnects.
    fn pump_events(&mut self) {
        while let Some(event) = self.gilrs.next_event() {
            match event.event {
                EventType::Connected => {
                    if self.active.is_none() {
                        info!(id = %event.id, "gamepad connected; selecting as safety input");
                        self.active = Some(event.id);
                    }
                }
                EventType::Disconnected => {
                    if self.active == Some(event.id) {
                        warn!(id = %event.id, "active safety gamepad disconnected");
                        self.active = None;
                    }
                }
                other => debug!(?other, "gamepad event"),
            }
        }
    }
}

#[async_trait]
impl SafetySource for GamepadSource {
    async fn read(&mut self) -> Result<bool, MonitorError> {
        self.pump_events();

        if self.active.is_none() {
            self.active = self.gilrs.gamepads().next().map(|(id, _)| id);
        }
        let Some(id) = self.active else {
            return Err(MonitorError::Unreadable("no gamepad connected".into()));
        };

        match self.gilrs.connected_gamepad(id) {
            Some(pad) => Ok(pad.is_pressed(self.button)),
            None => {
                self.active = None;
                Err(MonitorError::Unreadable(format!(
                    "gamepad {id} no longer connected"
                )))
            }
        }
    }
}

/// Map a configuration name to a gilrs [`Button`].
///
/// Returns `None` for unknown names; the caller reports that as a
/// configuration error.
pub fn button_from_name(name: &str) -> Option<Button> {
    match name {
        "south" | "a" => Some(Button::South),
        "east" | "b" => Some(Button::East),
        "west" | "x" => Some(Button::West),
        "north" | "y" => Some(Button::North),
        "left_bumper" | "lb" => Some(Button::LeftTrigger),
        "right_bumper" | "rb" => Some(Button::RightTrigger),
        "left_trigger" | "lt" => Some(Button::LeftTrigger2),
        "right_trigger" | "rt" => Some(Button::RightTrigger2),
        "select" => Some(Button::Select),
        "start" => Some(Button::Start),
        "mode" | "guide" => Some(Button::Mode),
        _ => None,
    }
}
