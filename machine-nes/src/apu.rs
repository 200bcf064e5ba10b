//! NES APU: two pulse channels, triangle, noise, DMC, frame sequencer.
//!
//! Clocking, as seen from the bus: `tick()` once per CPU cycle. The
//! triangle and DMC timers run at CPU rate, pulse and noise at half rate.
//! The frame sequencer counts CPU cycles from the last $4017 write and
//! fires quarter-frame (envelopes, linear counter) and half-frame (length
//! counters, sweeps) events.
//!
//! The DMC does not read memory itself: when its sample buffer runs dry it
//! raises a DMA request that the bus services, stealing CPU cycles.

use emu_core::{StateReader, StateWriter, Stateful};

/// Length counter load values, indexed by the 5-bit field in the length
/// registers.
const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

/// The four pulse duty patterns.
const DUTY_SEQUENCES: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [1, 0, 0, 1, 1, 1, 1, 1],
];

/// The 32-step triangle output sequence.
const TRIANGLE_SEQUENCE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11,
    12, 13, 14, 15,
];

/// Noise channel timer periods (NTSC).
const NOISE_PERIODS: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

/// DMC timer periods (NTSC).
const DMC_RATES: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 85, 72, 54,
];

// ---------------------------------------------------------------------------
// Shared channel units
// ---------------------------------------------------------------------------

/// Envelope generator shared by the pulse and noise channels.
struct Envelope {
    loop_flag: bool,
    constant: bool,
    volume: u8,
    start: bool,
    divider: u8,
    decay: u8,
}

impl Envelope {
    fn new() -> Self {
        Self {
            loop_flag: false,
            constant: false,
            volume: 0,
            start: false,
            divider: 0,
            decay: 15,
        }
    }

    fn write(&mut self, value: u8) {
        self.loop_flag = value & 0x20 != 0;
        self.constant = value & 0x10 != 0;
        self.volume = value & 0x0F;
    }

    fn start(&mut self) {
        self.start = true;
    }

    fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.volume;
            return;
        }
        if self.divider == 0 {
            self.divider = self.volume;
            if self.decay == 0 {
                if self.loop_flag {
                    self.decay = 15;
                }
            } else {
                self.decay -= 1;
            }
        } else {
            self.divider -= 1;
        }
    }

    fn output(&self) -> u8 {
        if self.constant {
            self.volume
        } else {
            self.decay
        }
    }

    fn save_state(&self, out: &mut StateWriter) {
        out.put_bool(self.loop_flag);
        out.put_bool(self.constant);
        out.put_u8(self.volume);
        out.put_bool(self.start);
        out.put_u8(self.divider);
        out.put_u8(self.decay);
    }

    fn load_state(&mut self, r: &mut StateReader) {
        self.loop_flag = r.bool();
        self.constant = r.bool();
        self.volume = r.u8();
        self.start = r.bool();
        self.divider = r.u8();
        self.decay = r.u8();
    }
}

/// Length counter: silences a channel when it reaches zero.
#[derive(Default)]
struct LengthCounter {
    value: u8,
    halt: bool,
}

impl LengthCounter {
    fn load(&mut self, index: u8, enabled: bool) {
        if enabled {
            self.value = LENGTH_TABLE[usize::from(index & 0x1F)];
        }
    }

    fn clear(&mut self) {
        self.value = 0;
    }

    fn clock(&mut self, enabled: bool) {
        if !enabled {
            self.value = 0;
        } else if !self.halt && self.value > 0 {
            self.value -= 1;
        }
    }

    fn active(&self) -> bool {
        self.value > 0
    }

    fn save_state(&self, out: &mut StateWriter) {
        out.put_u8(self.value);
        out.put_bool(self.halt);
    }

    fn load_state(&mut self, r: &mut StateReader) {
        self.value = r.u8();
        self.halt = r.bool();
    }
}

/// Sweep unit. Pulse 1 negates in one's complement (subtracts one extra),
/// pulse 2 in two's complement.
struct Sweep {
    ones_complement: bool,
    enabled: bool,
    period: u8,
    negate: bool,
    shift: u8,
    divider: u8,
    reload: bool,
}

impl Sweep {
    fn new(ones_complement: bool) -> Self {
        Self {
            ones_complement,
            enabled: false,
            period: 0,
            negate: false,
            shift: 0,
            divider: 0,
            reload: false,
        }
    }

    fn write(&mut self, value: u8) {
        self.enabled = value & 0x80 != 0;
        self.period = (value >> 4) & 0x07;
        self.negate = value & 0x08 != 0;
        self.shift = value & 0x07;
        self.reload = true;
    }

    fn target(&self, timer: u16) -> i32 {
        let change = i32::from(timer >> self.shift);
        if self.negate {
            i32::from(timer) - change - i32::from(self.ones_complement)
        } else {
            i32::from(timer) + change
        }
    }

    /// The channel is silenced while the timer is ultrasonic or the sweep
    /// target would overflow, even when the sweep is disabled.
    fn mutes(&self, timer: u16) -> bool {
        timer < 8 || self.target(timer) > 0x7FF
    }

    fn clock(&mut self, timer_reload: &mut u16) {
        if self.divider == 0 && self.enabled && self.shift > 0 && *timer_reload >= 8 {
            let target = self.target(*timer_reload);
            if (0..0x800).contains(&target) {
                *timer_reload = target as u16;
            }
        }
        if self.divider == 0 || self.reload {
            self.divider = self.period;
            self.reload = false;
        } else {
            self.divider -= 1;
        }
    }

    fn save_state(&self, out: &mut StateWriter) {
        out.put_bool(self.enabled);
        out.put_u8(self.period);
        out.put_bool(self.negate);
        out.put_u8(self.shift);
        out.put_u8(self.divider);
        out.put_bool(self.reload);
    }

    fn load_state(&mut self, r: &mut StateReader) {
        self.enabled = r.bool();
        self.period = r.u8();
        self.negate = r.bool();
        self.shift = r.u8();
        self.divider = r.u8();
        self.reload = r.bool();
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

struct Pulse {
    envelope: Envelope,
    length: LengthCounter,
    sweep: Sweep,
    enabled: bool,
    duty_mode: u8,
    duty_step: u8,
    timer: u16,
    timer_reload: u16,
}

impl Pulse {
    fn new(ones_complement_sweep: bool) -> Self {
        Self {
            envelope: Envelope::new(),
            length: LengthCounter::default(),
            sweep: Sweep::new(ones_complement_sweep),
            enabled: false,
            duty_mode: 0,
            duty_step: 0,
            timer: 0,
            timer_reload: 0,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.duty_mode = (value >> 6) & 0x03;
        self.envelope.write(value);
        self.length.halt = self.envelope.loop_flag;
    }

    fn write_timer_lo(&mut self, value: u8) {
        self.timer_reload = (self.timer_reload & 0x0700) | u16::from(value);
    }

    fn write_timer_hi(&mut self, value: u8) {
        self.timer_reload = (self.timer_reload & 0x00FF) | (u16::from(value & 0x07) << 8);
        self.length.load(value >> 3, self.enabled);
        self.envelope.start();
        self.duty_step = 0;
        self.timer = self.timer_reload;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length.clear();
        }
    }

    /// Clocked every other CPU cycle.
    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_reload;
            self.duty_step = (self.duty_step + 1) & 0x07;
        } else {
            self.timer -= 1;
        }
    }

    fn quarter_frame(&mut self) {
        self.envelope.clock();
    }

    fn half_frame(&mut self) {
        self.length.clock(self.enabled);
        self.sweep.clock(&mut self.timer_reload);
    }

    fn output(&self) -> u8 {
        if !self.enabled || !self.length.active() || self.sweep.mutes(self.timer_reload) {
            return 0;
        }
        if DUTY_SEQUENCES[usize::from(self.duty_mode)][usize::from(self.duty_step)] == 0 {
            return 0;
        }
        self.envelope.output()
    }

    fn active(&self) -> bool {
        self.enabled && self.length.active()
    }

    fn save_state(&self, out: &mut StateWriter) {
        self.envelope.save_state(out);
        self.length.save_state(out);
        self.sweep.save_state(out);
        out.put_bool(self.enabled);
        out.put_u8(self.duty_mode);
        out.put_u8(self.duty_step);
        out.put_u16(self.timer);
        out.put_u16(self.timer_reload);
    }

    fn load_state(&mut self, r: &mut StateReader) {
        self.envelope.load_state(r);
        self.length.load_state(r);
        self.sweep.load_state(r);
        self.enabled = r.bool();
        self.duty_mode = r.u8();
        self.duty_step = r.u8();
        self.timer = r.u16();
        self.timer_reload = r.u16();
    }
}

struct Triangle {
    length: LengthCounter,
    enabled: bool,
    control_flag: bool,
    linear_reload_value: u8,
    linear_counter: u8,
    linear_reload: bool,
    timer: u16,
    timer_reload: u16,
    sequence_index: u8,
}

impl Triangle {
    fn new() -> Self {
        Self {
            length: LengthCounter::default(),
            enabled: false,
            control_flag: false,
            linear_reload_value: 0,
            linear_counter: 0,
            linear_reload: false,
            timer: 0,
            timer_reload: 0,
            sequence_index: 0,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.control_flag = value & 0x80 != 0;
        self.linear_reload_value = value & 0x7F;
        self.length.halt = self.control_flag;
    }

    fn write_timer_lo(&mut self, value: u8) {
        self.timer_reload = (self.timer_reload & 0x0700) | u16::from(value);
    }

    fn write_timer_hi(&mut self, value: u8) {
        self.timer_reload = (self.timer_reload & 0x00FF) | (u16::from(value & 0x07) << 8);
        self.length.load(value >> 3, self.enabled);
        self.timer = self.timer_reload;
        self.linear_reload = true;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length.clear();
            self.linear_counter = 0;
        }
    }

    /// Clocked every CPU cycle. The timer always runs; the sequencer only
    /// advances while both counters are live and the period is not
    /// ultrasonic.
    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_reload;
            if self.enabled
                && self.length.active()
                && self.linear_counter > 0
                && self.timer_reload >= 2
            {
                self.sequence_index = (self.sequence_index + 1) & 0x1F;
            }
        } else {
            self.timer -= 1;
        }
    }

    fn quarter_frame(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control_flag {
            self.linear_reload = false;
        }
    }

    fn half_frame(&mut self) {
        self.length.clock(self.enabled);
    }

    fn output(&self) -> u8 {
        if !self.enabled || !self.length.active() || self.linear_counter == 0 {
            return 0;
        }
        // Ultrasonic periods hold the mid-scale level instead of popping.
        if self.timer_reload < 2 {
            return 7;
        }
        TRIANGLE_SEQUENCE[usize::from(self.sequence_index)]
    }

    fn active(&self) -> bool {
        self.enabled && self.length.active()
    }

    fn save_state(&self, out: &mut StateWriter) {
        self.length.save_state(out);
        out.put_bool(self.enabled);
        out.put_bool(self.control_flag);
        out.put_u8(self.linear_reload_value);
        out.put_u8(self.linear_counter);
        out.put_bool(self.linear_reload);
        out.put_u16(self.timer);
        out.put_u16(self.timer_reload);
        out.put_u8(self.sequence_index);
    }

    fn load_state(&mut self, r: &mut StateReader) {
        self.length.load_state(r);
        self.enabled = r.bool();
        self.control_flag = r.bool();
        self.linear_reload_value = r.u8();
        self.linear_counter = r.u8();
        self.linear_reload = r.bool();
        self.timer = r.u16();
        self.timer_reload = r.u16();
        self.sequence_index = r.u8();
    }
}

struct Noise {
    envelope: Envelope,
    length: LengthCounter,
    enabled: bool,
    /// Tap bit 6 instead of bit 1 (short, tonal mode).
    short_mode: bool,
    timer_period: u16,
    timer: u16,
    /// 15-bit LFSR, seeded with 1.
    shift: u16,
}

impl Noise {
    fn new() -> Self {
        Self {
            envelope: Envelope::new(),
            length: LengthCounter::default(),
            enabled: false,
            short_mode: false,
            timer_period: NOISE_PERIODS[0],
            timer: 0,
            shift: 1,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.envelope.write(value);
        self.length.halt = self.envelope.loop_flag;
    }

    fn write_period(&mut self, value: u8) {
        self.short_mode = value & 0x80 != 0;
        self.timer_period = NOISE_PERIODS[usize::from(value & 0x0F)];
    }

    fn write_length(&mut self, value: u8) {
        self.length.load(value >> 3, self.enabled);
        self.envelope.start();
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length.clear();
        }
    }

    /// Clocked every other CPU cycle.
    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.clock_shift();
        } else {
            self.timer -= 1;
        }
    }

    fn clock_shift(&mut self) {
        let bit0 = self.shift & 0x01;
        let tap = if self.short_mode { 6 } else { 1 };
        let feedback = bit0 ^ ((self.shift >> tap) & 0x01);
        self.shift >>= 1;
        self.shift = (self.shift & 0x3FFF) | (feedback << 14);
    }

    fn quarter_frame(&mut self) {
        self.envelope.clock();
    }

    fn half_frame(&mut self) {
        self.length.clock(self.enabled);
    }

    fn output(&self) -> u8 {
        if !self.enabled || !self.length.active() || self.shift & 0x01 != 0 {
            return 0;
        }
        self.envelope.output()
    }

    fn active(&self) -> bool {
        self.enabled && self.length.active()
    }

    fn save_state(&self, out: &mut StateWriter) {
        self.envelope.save_state(out);
        self.length.save_state(out);
        out.put_bool(self.enabled);
        out.put_bool(self.short_mode);
        out.put_u16(self.timer_period);
        out.put_u16(self.timer);
        out.put_u16(self.shift);
    }

    fn load_state(&mut self, r: &mut StateReader) {
        self.envelope.load_state(r);
        self.length.load_state(r);
        self.enabled = r.bool();
        self.short_mode = r.bool();
        self.timer_period = r.u16();
        self.timer = r.u16();
        self.shift = r.u16();
    }
}

/// Delta modulation channel: a 7-bit level stepped up or down one bit at a
/// time from fetched sample bytes.
struct Dmc {
    enabled: bool,
    irq_enabled: bool,
    loop_flag: bool,
    rate_index: u8,
    timer_period: u16,
    timer: u16,
    output_level: u8,
    sample_address: u16,
    sample_length: u16,
    current_address: u16,
    bytes_remaining: u16,
    sample_buffer: Option<u8>,
    shift: u8,
    bits_remaining: u8,
    irq_pending: bool,
}

impl Dmc {
    fn new() -> Self {
        Self {
            enabled: false,
            irq_enabled: false,
            loop_flag: false,
            rate_index: 0,
            timer_period: DMC_RATES[0],
            timer: DMC_RATES[0],
            output_level: 0,
            sample_address: 0xC000,
            sample_length: 1,
            current_address: 0xC000,
            bytes_remaining: 0,
            sample_buffer: None,
            shift: 0,
            bits_remaining: 0,
            irq_pending: false,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.irq_enabled = value & 0x80 != 0;
        if !self.irq_enabled {
            self.irq_pending = false;
        }
        self.loop_flag = value & 0x40 != 0;
        self.rate_index = value & 0x0F;
        self.timer_period = DMC_RATES[usize::from(self.rate_index)];
    }

    fn write_direct_load(&mut self, value: u8) {
        self.output_level = value & 0x7F;
    }

    fn write_sample_address(&mut self, value: u8) {
        self.sample_address = 0xC000 | (u16::from(value) << 6);
    }

    fn write_sample_length(&mut self, value: u8) {
        self.sample_length = (u16::from(value) << 4) | 0x01;
    }

    fn set_enabled(&mut self, enabled: bool) {
        let was_disabled = !self.enabled && enabled;
        self.enabled = enabled;
        if !enabled {
            self.bytes_remaining = 0;
            self.sample_buffer = None;
            self.bits_remaining = 0;
            self.irq_pending = false;
        } else if was_disabled && self.bytes_remaining == 0 {
            self.restart_sample();
        }
    }

    fn restart_sample(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    /// Clocked every CPU cycle.
    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.step_output();
        } else {
            self.timer -= 1;
        }
    }

    fn step_output(&mut self) {
        if self.bits_remaining == 0 {
            if let Some(byte) = self.sample_buffer.take() {
                self.shift = byte;
                self.bits_remaining = 8;
            } else {
                return;
            }
        }
        if self.shift & 0x01 != 0 {
            if self.output_level <= 125 {
                self.output_level += 2;
            }
        } else if self.output_level >= 2 {
            self.output_level -= 2;
        }
        self.shift >>= 1;
        self.bits_remaining -= 1;
    }

    /// The bus steals CPU cycles and fetches a byte when this is set.
    fn needs_dma(&self) -> bool {
        self.enabled && self.sample_buffer.is_none() && self.bytes_remaining > 0
    }

    fn dma_address(&self) -> u16 {
        self.current_address
    }

    /// Deliver a fetched sample byte. Sample addresses wrap from $FFFF
    /// back into $8000.
    fn receive_dma_byte(&mut self, byte: u8) {
        self.sample_buffer = Some(byte);
        self.current_address = if self.current_address == 0xFFFF {
            0x8000
        } else {
            self.current_address + 1
        };
        self.bytes_remaining = self.bytes_remaining.saturating_sub(1);
        if self.bytes_remaining == 0 {
            if self.loop_flag {
                self.restart_sample();
            } else if self.irq_enabled {
                self.irq_pending = true;
            }
        }
    }

    fn output(&self) -> u8 {
        self.output_level
    }

    fn active(&self) -> bool {
        self.bytes_remaining > 0 || self.sample_buffer.is_some() || self.bits_remaining > 0
    }

    fn save_state(&self, out: &mut StateWriter) {
        out.put_bool(self.enabled);
        out.put_bool(self.irq_enabled);
        out.put_bool(self.loop_flag);
        out.put_u8(self.rate_index);
        out.put_u16(self.timer_period);
        out.put_u16(self.timer);
        out.put_u8(self.output_level);
        out.put_u16(self.sample_address);
        out.put_u16(self.sample_length);
        out.put_u16(self.current_address);
        out.put_u16(self.bytes_remaining);
        out.put_bool(self.sample_buffer.is_some());
        out.put_u8(self.sample_buffer.unwrap_or(0));
        out.put_u8(self.shift);
        out.put_u8(self.bits_remaining);
        out.put_bool(self.irq_pending);
    }

    fn load_state(&mut self, r: &mut StateReader) {
        self.enabled = r.bool();
        self.irq_enabled = r.bool();
        self.loop_flag = r.bool();
        self.rate_index = r.u8();
        self.timer_period = r.u16();
        self.timer = r.u16();
        self.output_level = r.u8();
        self.sample_address = r.u16();
        self.sample_length = r.u16();
        self.current_address = r.u16();
        self.bytes_remaining = r.u16();
        let has_buffer = r.bool();
        let buffer = r.u8();
        self.sample_buffer = has_buffer.then_some(buffer);
        self.shift = r.u8();
        self.bits_remaining = r.u8();
        self.irq_pending = r.bool();
    }
}

// ---------------------------------------------------------------------------
// Frame sequencer
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default)]
struct FrameEvent {
    quarter: bool,
    half: bool,
    irq: bool,
}

/// CPU-cycle counter producing quarter/half-frame events.
///
/// Four-step mode: Q at 7457 and 22371, Q+H at 14913 and 29829, IRQ on
/// 29828-29830; the count then restarts. Five-step mode: Q at 7457 and
/// 22371, Q+H at 14913 and 37281, wrap at 37282, no IRQ.
struct FrameSequencer {
    five_step: bool,
    cycle: u32,
}

impl FrameSequencer {
    fn new() -> Self {
        Self {
            five_step: false,
            cycle: 0,
        }
    }

    fn set_mode(&mut self, five_step: bool) {
        self.five_step = five_step;
        self.cycle = 0;
    }

    fn tick(&mut self) -> FrameEvent {
        self.cycle += 1;
        let mut event = FrameEvent::default();
        if self.five_step {
            match self.cycle {
                7457 | 22371 => event.quarter = true,
                14913 | 37281 => {
                    event.quarter = true;
                    event.half = true;
                }
                37282 => self.cycle = 0,
                _ => {}
            }
        } else {
            match self.cycle {
                7457 | 22371 => event.quarter = true,
                14913 => {
                    event.quarter = true;
                    event.half = true;
                }
                29828 => event.irq = true,
                29829 => {
                    event.quarter = true;
                    event.half = true;
                    event.irq = true;
                }
                29830 => {
                    event.irq = true;
                    self.cycle = 0;
                }
                _ => {}
            }
        }
        event
    }
}

// ---------------------------------------------------------------------------
// APU
// ---------------------------------------------------------------------------

/// The 2A03's audio unit.
pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,
    sequencer: FrameSequencer,
    irq_inhibit: bool,
    frame_irq: bool,
    cycle: u64,
}

impl Apu {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pulse1: Pulse::new(true),
            pulse2: Pulse::new(false),
            triangle: Triangle::new(),
            noise: Noise::new(),
            dmc: Dmc::new(),
            sequencer: FrameSequencer::new(),
            irq_inhibit: false,
            frame_irq: false,
            cycle: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// One CPU cycle.
    pub fn tick(&mut self) {
        self.cycle += 1;

        self.triangle.clock_timer();
        self.dmc.clock_timer();
        if self.cycle & 1 == 0 {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
            self.noise.clock_timer();
        }

        let event = self.sequencer.tick();
        if event.quarter {
            self.clock_quarter_frame();
        }
        if event.half {
            self.clock_half_frame();
        }
        if event.irq && !self.irq_inhibit {
            self.frame_irq = true;
        }
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.quarter_frame();
        self.pulse2.quarter_frame();
        self.triangle.quarter_frame();
        self.noise.quarter_frame();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.half_frame();
        self.pulse2.half_frame();
        self.triangle.half_frame();
        self.noise.half_frame();
    }

    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x4000 => self.pulse1.write_control(value),
            0x4001 => self.pulse1.sweep.write(value),
            0x4002 => self.pulse1.write_timer_lo(value),
            0x4003 => self.pulse1.write_timer_hi(value),
            0x4004 => self.pulse2.write_control(value),
            0x4005 => self.pulse2.sweep.write(value),
            0x4006 => self.pulse2.write_timer_lo(value),
            0x4007 => self.pulse2.write_timer_hi(value),
            0x4008 => self.triangle.write_control(value),
            0x400A => self.triangle.write_timer_lo(value),
            0x400B => self.triangle.write_timer_hi(value),
            0x400C => self.noise.write_control(value),
            0x400E => self.noise.write_period(value),
            0x400F => self.noise.write_length(value),
            0x4010 => self.dmc.write_control(value),
            0x4011 => self.dmc.write_direct_load(value),
            0x4012 => self.dmc.write_sample_address(value),
            0x4013 => self.dmc.write_sample_length(value),
            0x4015 => {
                self.pulse1.set_enabled(value & 0x01 != 0);
                self.pulse2.set_enabled(value & 0x02 != 0);
                self.triangle.set_enabled(value & 0x04 != 0);
                self.noise.set_enabled(value & 0x08 != 0);
                self.dmc.set_enabled(value & 0x10 != 0);
                self.dmc.irq_pending = false;
            }
            0x4017 => {
                self.irq_inhibit = value & 0x40 != 0;
                if self.irq_inhibit {
                    self.frame_irq = false;
                }
                let five_step = value & 0x80 != 0;
                self.sequencer.set_mode(five_step);
                // Entering five-step mode clocks the units immediately.
                if five_step {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                }
            }
            _ => {}
        }
    }

    /// Only $4015 reads back; the read clears the frame IRQ flag.
    pub fn cpu_read(&mut self, addr: u16, read_only: bool) -> u8 {
        if addr != 0x4015 {
            return 0;
        }
        let mut value = 0;
        if self.pulse1.active() {
            value |= 0x01;
        }
        if self.pulse2.active() {
            value |= 0x02;
        }
        if self.triangle.active() {
            value |= 0x04;
        }
        if self.noise.active() {
            value |= 0x08;
        }
        if self.dmc.active() {
            value |= 0x10;
        }
        if self.frame_irq && !self.irq_inhibit {
            value |= 0x40;
        }
        if self.dmc.irq_pending {
            value |= 0x80;
        }
        if !read_only {
            self.frame_irq = false;
        }
        value
    }

    /// Frame or DMC IRQ line; acknowledging clears the pending flags.
    pub fn poll_irq(&mut self) -> bool {
        let frame = self.frame_irq && !self.irq_inhibit;
        let dmc = self.dmc.irq_pending;
        if frame {
            self.frame_irq = false;
        }
        if dmc {
            self.dmc.irq_pending = false;
        }
        frame || dmc
    }

    /// Non-linear mix of the five channel outputs, 0.0 to ~1.0.
    #[must_use]
    pub fn sample(&self) -> f64 {
        let pulse_sum = u32::from(self.pulse1.output()) + u32::from(self.pulse2.output());
        let pulse_out = if pulse_sum > 0 {
            95.88 / (8128.0 / f64::from(pulse_sum) + 100.0)
        } else {
            0.0
        };

        let tnd_in = f64::from(self.triangle.output()) / 8227.0
            + f64::from(self.noise.output()) / 12241.0
            + f64::from(self.dmc.output()) / 22638.0;
        let tnd_out = if tnd_in > 0.0 {
            159.79 / (1.0 / tnd_in + 100.0)
        } else {
            0.0
        };

        pulse_out + tnd_out
    }

    // DMC DMA handshake, serviced by the bus.

    pub(crate) fn dmc_needs_dma(&self) -> bool {
        self.dmc.needs_dma()
    }

    pub(crate) fn dmc_dma_address(&self) -> u16 {
        self.dmc.dma_address()
    }

    pub(crate) fn dmc_receive_dma_byte(&mut self, byte: u8) {
        self.dmc.receive_dma_byte(byte);
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Stateful for Apu {
    fn save_state(&self, out: &mut StateWriter) {
        self.pulse1.save_state(out);
        self.pulse2.save_state(out);
        self.triangle.save_state(out);
        self.noise.save_state(out);
        self.dmc.save_state(out);
        out.put_bool(self.sequencer.five_step);
        out.put_u32(self.sequencer.cycle);
        out.put_bool(self.irq_inhibit);
        out.put_bool(self.frame_irq);
        out.put_u64(self.cycle);
    }

    fn load_state(&mut self, r: &mut StateReader) -> bool {
        self.pulse1.load_state(r);
        self.pulse2.load_state(r);
        self.triangle.load_state(r);
        self.noise.load_state(r);
        self.dmc.load_state(r);
        self.sequencer.five_step = r.bool();
        self.sequencer.cycle = r.u32();
        self.irq_inhibit = r.bool();
        self.frame_irq = r.bool();
        self.cycle = r.u64();
        r.is_ok()
    }
}
