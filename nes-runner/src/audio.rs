//! Audio output: cpal stream fed from the emulator's sample queue.
//!
//! The emulation thread blocks on the bounded [`SampleQueue`]; a bridge
//! thread drains it, applies the output filter chain and pushes f32
//! samples into a lock-free ring the cpal callback reads. The callback
//! never blocks; underruns emit the rest level.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use machine_nes::timing::SAMPLE_HZ;
use machine_nes::SampleQueue;
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};

/// Samples per video frame at 44.1 kHz / 60 Hz.
const SAMPLES_PER_FRAME: usize = 735;

/// First-order high-pass section.
struct HighPass {
    alpha: f64,
    prev_input: f64,
    prev_output: f64,
}

impl HighPass {
    fn new(cutoff_hz: f64) -> Self {
        let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
        let dt = 1.0 / SAMPLE_HZ;
        Self {
            alpha: rc / (rc + dt),
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }

    fn process(&mut self, input: f64) -> f64 {
        let output = self.alpha * (self.prev_output + input - self.prev_input);
        self.prev_input = input;
        self.prev_output = output;
        output
    }
}

/// First-order low-pass section.
struct LowPass {
    alpha: f64,
    prev_output: f64,
}

impl LowPass {
    fn new(cutoff_hz: f64) -> Self {
        let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
        let dt = 1.0 / SAMPLE_HZ;
        Self {
            alpha: dt / (rc + dt),
            prev_output: 0.0,
        }
    }

    fn process(&mut self, input: f64) -> f64 {
        let output = self.prev_output + self.alpha * (input - self.prev_output);
        self.prev_output = output;
        output
    }
}

/// The console's analog output stage: two high-pass poles and one
/// low-pass pole.
struct OutputFilter {
    hp90: HighPass,
    hp440: HighPass,
    lp14k: LowPass,
}

impl OutputFilter {
    fn new() -> Self {
        Self {
            hp90: HighPass::new(90.0),
            hp440: HighPass::new(440.0),
            lp14k: LowPass::new(14_000.0),
        }
    }

    fn process(&mut self, input: f64) -> f64 {
        self.lp14k
            .process(self.hp440.process(self.hp90.process(input)))
    }
}

/// Holds the cpal stream alive for the duration of the session.
pub struct AudioOutput {
    _stream: Stream,
}

impl AudioOutput {
    /// Open the default output device and spawn the bridge thread.
    ///
    /// Returns `None` when no device is available; the emulator then runs
    /// muted (the caller must still drain the sample queue).
    pub fn start(queue: Arc<SampleQueue>) -> Option<(Self, JoinHandle<()>)> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;

        let config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(SAMPLE_HZ as u32),
            buffer_size: cpal::BufferSize::Default,
        };

        let rest_level = 0.0f32;

        // ~8 frames of slack against scheduling jitter, half pre-filled
        // with silence so startup does not underrun.
        let ring = HeapRb::<f32>::new(SAMPLES_PER_FRAME * 8);
        let (mut producer, mut consumer) = ring.split();
        for _ in 0..SAMPLES_PER_FRAME * 4 {
            let _ = producer.try_push(rest_level);
        }

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = consumer.try_pop().unwrap_or(rest_level);
                    }
                },
                |err| eprintln!("Audio stream error: {err}"),
                None,
            )
            .ok()?;

        stream.play().ok()?;

        let bridge = thread::spawn(move || {
            let mut filter = OutputFilter::new();
            // pop() blocks until a sample arrives and returns None once
            // the queue shuts down.
            while let Some(sample) = queue.pop() {
                let filtered = filter.process(sample) as f32;
                // Back-pressure: wait for the callback to make room.
                let mut value = filtered;
                while let Err(rejected) = producer.try_push(value) {
                    value = rejected;
                    thread::yield_now();
                }
            }
        });

        Some((Self { _stream: stream }, bridge))
    }
}
