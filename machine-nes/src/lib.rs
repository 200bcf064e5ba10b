//! Nintendo Entertainment System (NES) emulator core.
//!
//! Cycle-accurate NTSC emulation: 2A03 CPU (via the `cpu-6502` crate),
//! dot-based 2C02 PPU, five-channel APU with DMC DMA, controllers and
//! Zapper, and save states with ROM-identity validation.
//!
//! # Supported mappers
//!
//! - Mapper 0 (NROM)
//! - Mapper 1 (MMC1)
//! - Mapper 2 (UxROM)
//! - Mapper 3 (CNROM)
//! - Mapper 4 (MMC3, scanline IRQ)
//! - Mapper 66 (GxROM)
//!
//! # ROMs
//!
//! Load iNES format (.nes) images via [`Cartridge::from_ines`].

mod apu;
mod audio;
mod bus;
pub mod capture;
mod cartridge;
pub mod controller;
mod mapper;
mod nes;
mod palette;
mod ppu;
mod state;
pub mod timing;

pub use apu::Apu;
pub use audio::{SampleQueue, AUDIO_QUEUE_CAPACITY};
pub use bus::NesBus;
pub use cartridge::{Cartridge, Mirroring, RomError, WriteOutcome};
pub use controller::{Controller, PadHandle, Zapper, ZapperHandle};
pub use mapper::{MapWrite, Mapper};
pub use nes::Nes;
pub use ppu::{Ppu, SCREEN_HEIGHT, SCREEN_WIDTH};
pub use state::StateError;
