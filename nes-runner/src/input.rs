//! Keyboard and gamepad mapping onto the NES pad.

use gilrs::{Axis, Button, GamepadId, Gilrs};
use machine_nes::controller::{buttons, PadHandle};
use winit::keyboard::KeyCode;

/// Default keyboard layout for controller 1.
pub fn map_keycode(keycode: KeyCode) -> Option<u8> {
    match keycode {
        KeyCode::KeyX => Some(buttons::A),
        KeyCode::KeyZ => Some(buttons::B),
        KeyCode::ShiftRight => Some(buttons::SELECT),
        KeyCode::Enter => Some(buttons::START),
        KeyCode::ArrowUp => Some(buttons::UP),
        KeyCode::ArrowDown => Some(buttons::DOWN),
        KeyCode::ArrowLeft => Some(buttons::LEFT),
        KeyCode::ArrowRight => Some(buttons::RIGHT),
        _ => None,
    }
}

/// Tracks the most recently active gamepad and mirrors it onto a pad
/// handle each poll.
pub struct GamepadInput {
    gilrs: Gilrs,
    active: Option<GamepadId>,
}

impl GamepadInput {
    pub fn new() -> Option<Self> {
        match Gilrs::new() {
            Ok(gilrs) => Some(Self {
                gilrs,
                active: None,
            }),
            Err(err) => {
                eprintln!("Gamepad support unavailable: {err}");
                None
            }
        }
    }

    /// Drain gamepad events and overlay the pad state. Keyboard bits are
    /// OR'd in by the caller, so this writes the full byte.
    pub fn poll(&mut self, pad: &PadHandle, keyboard_bits: u8) {
        while let Some(event) = self.gilrs.next_event() {
            self.active = Some(event.id);
        }

        let mut state = keyboard_bits;
        if let Some(id) = self.active {
            if let Some(gamepad) = self.gilrs.connected_gamepad(id) {
                const AXIS_THRESHOLD: f32 = 0.5;

                if gamepad.is_pressed(Button::South) {
                    state |= buttons::A;
                }
                if gamepad.is_pressed(Button::West) {
                    state |= buttons::B;
                }
                if gamepad.is_pressed(Button::Select) {
                    state |= buttons::SELECT;
                }
                if gamepad.is_pressed(Button::Start) {
                    state |= buttons::START;
                }
                if gamepad.is_pressed(Button::DPadUp) {
                    state |= buttons::UP;
                }
                if gamepad.is_pressed(Button::DPadDown) {
                    state |= buttons::DOWN;
                }
                if gamepad.is_pressed(Button::DPadLeft) {
                    state |= buttons::LEFT;
                }
                if gamepad.is_pressed(Button::DPadRight) {
                    state |= buttons::RIGHT;
                }

                if let Some(axis) = gamepad.axis_data(Axis::LeftStickX) {
                    if axis.value() > AXIS_THRESHOLD {
                        state |= buttons::RIGHT;
                    } else if axis.value() < -AXIS_THRESHOLD {
                        state |= buttons::LEFT;
                    }
                }
                if let Some(axis) = gamepad.axis_data(Axis::LeftStickY) {
                    if axis.value() > AXIS_THRESHOLD {
                        state |= buttons::UP;
                    } else if axis.value() < -AXIS_THRESHOLD {
                        state |= buttons::DOWN;
                    }
                }
            }
        }
        pad.set_state(state);
    }
}
