//! Controller and Zapper input.
//!
//! The standard pad is a serial shift register behind $4016/$4017: strobe
//! high latches the live button byte and reads return the A button; strobe
//! low shifts one bit out per read, padding with 1s after the eighth.
//!
//! Live button state crosses threads: the UI thread writes it through a
//! [`PadHandle`] / [`ZapperHandle`] and the emulation thread reads it when
//! the game strobes. Relaxed atomics are enough; a read stale by one input
//! poll is invisible at 60 Hz.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// Button bits, LSB first in shift order.
pub mod buttons {
    pub const A: u8 = 0x01;
    pub const B: u8 = 0x02;
    pub const SELECT: u8 = 0x04;
    pub const START: u8 = 0x08;
    pub const UP: u8 = 0x10;
    pub const DOWN: u8 = 0x20;
    pub const LEFT: u8 = 0x40;
    pub const RIGHT: u8 = 0x80;
}

/// UI-side handle to a controller's live button byte.
#[derive(Clone)]
pub struct PadHandle(Arc<AtomicU8>);

impl PadHandle {
    pub fn press(&self, button: u8) {
        self.0.fetch_or(button, Ordering::Relaxed);
    }

    pub fn release(&self, button: u8) {
        self.0.fetch_and(!button, Ordering::Relaxed);
    }

    pub fn set_state(&self, state: u8) {
        self.0.store(state, Ordering::Relaxed);
    }

    #[must_use]
    pub fn state(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }
}

/// One standard NES pad.
pub struct Controller {
    live: Arc<AtomicU8>,
    strobe: bool,
    shift: u8,
}

impl Controller {
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicU8::new(0)),
            strobe: false,
            shift: 0,
        }
    }

    /// Handle for the input thread.
    #[must_use]
    pub fn handle(&self) -> PadHandle {
        PadHandle(Arc::clone(&self.live))
    }

    pub fn reset(&mut self) {
        self.strobe = false;
        self.shift = 0;
    }

    fn latch(&mut self) {
        self.shift = self.live.load(Ordering::Relaxed);
    }

    /// $4016 write, bit 0. The falling edge latches the shift register.
    pub fn set_strobe(&mut self, on: bool) {
        if self.strobe && !on {
            self.latch();
        }
        self.strobe = on;
        if self.strobe {
            self.latch();
        }
    }

    /// Serial read: one bit per read, 1s after the register empties.
    pub fn read(&mut self) -> u8 {
        if self.strobe {
            self.latch();
            return self.shift & 0x01;
        }
        let bit = self.shift & 0x01;
        self.shift = (self.shift >> 1) | 0x80;
        bit
    }

    /// Side-effect-free read.
    #[must_use]
    pub fn peek(&self) -> u8 {
        if self.strobe {
            self.live.load(Ordering::Relaxed) & 0x01
        } else {
            self.shift & 0x01
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

/// Aim position packed into one atomic word; this sentinel means the
/// cursor is off screen.
const AIM_OFFSCREEN: u32 = 0xFFFF_FFFF;

struct ZapperShared {
    aim: AtomicU32,
    trigger: AtomicBool,
}

/// UI-side handle to the Zapper.
#[derive(Clone)]
pub struct ZapperHandle(Arc<ZapperShared>);

impl ZapperHandle {
    /// Aim at a framebuffer pixel. Out-of-range coordinates mean the gun
    /// points away from the screen.
    pub fn aim_at(&self, x: i32, y: i32) {
        let packed = if (0..256).contains(&x) && (0..240).contains(&y) {
            ((x as u32) << 16) | (y as u32)
        } else {
            AIM_OFFSCREEN
        };
        self.0.aim.store(packed, Ordering::Relaxed);
    }

    pub fn set_trigger(&self, pressed: bool) {
        self.0.trigger.store(pressed, Ordering::Relaxed);
    }
}

/// NES Zapper light gun on port 2.
///
/// Bit 3 of a $4017 read is the light sensor (0 = light detected), bit 4
/// the trigger (0 = pulled).
pub struct Zapper {
    shared: Arc<ZapperShared>,
}

/// Luminance threshold above which the sensor reports light.
const LIGHT_THRESHOLD: f64 = 180.0;

impl Zapper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ZapperShared {
                aim: AtomicU32::new(((128u32) << 16) | 120),
                trigger: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn handle(&self) -> ZapperHandle {
        ZapperHandle(Arc::clone(&self.shared))
    }

    pub fn reset(&mut self) {
        self.shared.trigger.store(false, Ordering::Relaxed);
        self.shared
            .aim
            .store(((128u32) << 16) | 120, Ordering::Relaxed);
    }

    /// Current aim point, if on screen.
    #[must_use]
    pub fn aim(&self) -> Option<(u16, u16)> {
        let packed = self.shared.aim.load(Ordering::Relaxed);
        if packed == AIM_OFFSCREEN {
            None
        } else {
            Some(((packed >> 16) as u16, (packed & 0xFFFF) as u16))
        }
    }

    /// Compose the $4017 contribution given the sampled pixel brightness.
    #[must_use]
    pub fn read_bits(&self, light_detected: bool) -> u8 {
        let mut data = 0;
        if !light_detected {
            data |= 0x08;
        }
        if !self.shared.trigger.load(Ordering::Relaxed) {
            data |= 0x10;
        }
        data
    }

    /// BT.601 luminance test for the aimed pixel.
    #[must_use]
    pub fn senses_light(&self, rgb: (u8, u8, u8)) -> bool {
        let (r, g, b) = rgb;
        let luminance = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        luminance >= LIGHT_THRESHOLD
    }
}

impl Default for Zapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strobe_pulse_latches_and_shifts() {
        let mut pad = Controller::new();
        let handle = pad.handle();
        handle.press(buttons::A);
        handle.press(buttons::START);

        pad.set_strobe(true);
        pad.set_strobe(false);

        let expected = [1, 0, 0, 1, 0, 0, 0, 0];
        for bit in expected {
            assert_eq!(pad.read(), bit);
        }
        // Ninth and later reads return 1.
        assert_eq!(pad.read(), 1);
        assert_eq!(pad.read(), 1);
    }

    #[test]
    fn strobe_high_repeats_a() {
        let mut pad = Controller::new();
        let handle = pad.handle();
        handle.press(buttons::A);
        pad.set_strobe(true);
        assert_eq!(pad.read(), 1);
        assert_eq!(pad.read(), 1);
        handle.release(buttons::A);
        assert_eq!(pad.read(), 0);
    }

    #[test]
    fn zapper_bits() {
        let zapper = Zapper::new();
        let handle = zapper.handle();

        // No light, trigger released: both bits set.
        assert_eq!(zapper.read_bits(false), 0x18);

        handle.set_trigger(true);
        assert_eq!(zapper.read_bits(false), 0x08);
        assert_eq!(zapper.read_bits(true), 0x00);
    }

    #[test]
    fn zapper_luminance_threshold() {
        let zapper = Zapper::new();
        assert!(zapper.senses_light((255, 255, 255)));
        assert!(!zapper.senses_light((0, 0, 0)));
        // 0.299*180 + 0.587*180 + 0.114*180 = 180: boundary counts as light.
        assert!(zapper.senses_light((180, 180, 180)));
    }

    #[test]
    fn zapper_offscreen_aim() {
        let zapper = Zapper::new();
        let handle = zapper.handle();
        assert_eq!(zapper.aim(), Some((128, 120)));
        handle.aim_at(-5, 10);
        assert_eq!(zapper.aim(), None);
        handle.aim_at(10, 20);
        assert_eq!(zapper.aim(), Some((10, 20)));
    }
}
