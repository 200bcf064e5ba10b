//! Save-state container format.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! "jNES"  magic            4 bytes
//! version                  2 bytes (current 3)
//! CRC32 of payload         4 bytes
//! ROM fingerprint          4 bytes
//! payload:
//!   len + CPU state
//!   len + PPU state
//!   len + APU state
//!   len + CPU RAM (2048)
//!   len + cartridge state
//!   system clock counter   8 bytes
//! ```
//!
//! Blobs without the magic fall back to the legacy format: raw CPU RAM
//! followed by PRG RAM.

use thiserror::Error;

/// Save-state magic bytes.
pub const STATE_MAGIC: [u8; 4] = *b"jNES";
/// Current format version.
pub const STATE_VERSION: u16 = 3;
/// Bytes before the payload: magic + version + CRC + fingerprint.
pub const STATE_HEADER_SIZE: usize = 4 + 2 + 4 + 4;

/// Save-state loading errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Unrecognized or damaged data (bad magic with no legacy fallback,
    /// CRC mismatch, truncated section). The current emulator state is
    /// left alone.
    #[error("save state is corrupt")]
    Corrupt,
    /// The state is valid but was captured with a different ROM.
    #[error("save state belongs to a different game")]
    ForeignRom,
}
