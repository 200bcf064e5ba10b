//! NTSC timing constants.
//!
//! The master crystal runs at 21,477,272 Hz; the CPU divides it by 12 and
//! the PPU by 4, giving the 3:1 PPU:CPU ratio the bus tick encodes.

use std::time::Duration;

/// CPU clock rate in Hz.
pub const CPU_HZ: f64 = 1_789_773.0;

/// Audio output sample rate in Hz.
pub const SAMPLE_HZ: f64 = 44_100.0;

/// CPU cycles between audio output samples.
pub const CPU_CYCLES_PER_SAMPLE: f64 = CPU_HZ / SAMPLE_HZ;

/// PPU dots per scanline.
pub const DOTS_PER_LINE: u16 = 341;

/// Scanlines per frame, pre-render line included.
pub const LINES_PER_FRAME: u16 = 262;

/// Wall-clock duration of one frame at 60.0988 Hz.
pub const FRAME_DURATION: Duration = Duration::from_nanos(16_666_667);
