//! NES cartridge and iNES ROM format.

use crate::mapper::{self, MapWrite, Mapper};
use emu_core::{StateReader, StateWriter, Stateful};
use thiserror::Error;

/// Nametable mirroring mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mirroring {
    /// Horizontal mirroring (vertical scrolling games).
    Horizontal,
    /// Vertical mirroring (horizontal scrolling games).
    Vertical,
    /// Single-screen, lower page.
    OneScreenLow,
    /// Single-screen, upper page.
    OneScreenHigh,
}

impl Mirroring {
    #[must_use]
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Horizontal => 0,
            Self::Vertical => 1,
            Self::OneScreenLow => 2,
            Self::OneScreenHigh => 3,
        }
    }

    #[must_use]
    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Horizontal),
            1 => Some(Self::Vertical),
            2 => Some(Self::OneScreenLow),
            3 => Some(Self::OneScreenHigh),
            _ => None,
        }
    }
}

/// ROM image loading errors.
#[derive(Debug, Error)]
pub enum RomError {
    /// Missing iNES magic or truncated image data.
    #[error("malformed iNES image")]
    Malformed,
    /// The image names a mapper this emulator does not implement.
    #[error("unsupported mapper {0}")]
    UnsupportedMapper(u8),
}

/// Result of presenting a CPU write to the cartridge.
pub struct WriteOutcome {
    /// The cartridge consumed the write.
    pub handled: bool,
    /// The mapper changed nametable mirroring; the bus forwards this to
    /// the PPU.
    pub mirror_changed: Option<Mirroring>,
}

/// PRG RAM window size ($6000-$7FFF).
const PRG_RAM_SIZE: usize = 8 * 1024;
/// CHR RAM size used when the header declares zero CHR banks.
const CHR_RAM_SIZE: usize = 8 * 1024;

/// A loaded cartridge: PRG/CHR memory plus the board's mapper.
pub struct Cartridge {
    mapper_id: u8,
    prg_banks: u8,
    chr_banks: u8,
    prg_rom: Vec<u8>,
    prg_ram: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    mapper: Box<dyn Mapper>,
    mirror: Mirroring,
    fingerprint: u32,
}

impl Cartridge {
    /// Parse an iNES image.
    pub fn from_ines(data: &[u8]) -> Result<Self, RomError> {
        if data.len() < 16 || &data[0..4] != b"NES\x1A" {
            return Err(RomError::Malformed);
        }

        let prg_banks = data[4];
        let chr_banks = data[5];
        let flags6 = data[6];
        let flags7 = data[7];

        let mapper_id = (flags7 & 0xF0) | (flags6 >> 4);
        let mirror = if flags6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        let has_trainer = flags6 & 0x04 != 0;

        let prg_size = usize::from(prg_banks) * 16 * 1024;
        let chr_size = usize::from(chr_banks) * 8 * 1024;
        let prg_start = if has_trainer { 16 + 512 } else { 16 };
        let chr_start = prg_start + prg_size;

        if data.len() < chr_start + chr_size {
            return Err(RomError::Malformed);
        }

        let prg_rom = data[prg_start..prg_start + prg_size].to_vec();
        let (chr, chr_is_ram) = if chr_banks > 0 {
            (data[chr_start..chr_start + chr_size].to_vec(), false)
        } else {
            (vec![0u8; CHR_RAM_SIZE], true)
        };

        let mapper = mapper::create(mapper_id, prg_banks, chr_banks)
            .map_err(RomError::UnsupportedMapper)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&prg_rom);
        if !chr_is_ram {
            hasher.update(&chr);
        }
        let fingerprint = hasher.finalize();

        Ok(Self {
            mapper_id,
            prg_banks,
            chr_banks,
            prg_rom,
            prg_ram: vec![0; PRG_RAM_SIZE],
            chr,
            chr_is_ram,
            mapper,
            mirror,
            fingerprint,
        })
    }

    #[must_use]
    pub fn mapper_id(&self) -> u8 {
        self.mapper_id
    }

    #[must_use]
    pub fn prg_banks(&self) -> u8 {
        self.prg_banks
    }

    #[must_use]
    pub fn chr_banks(&self) -> u8 {
        self.chr_banks
    }

    /// CRC32 over PRG ROM (and CHR ROM when present); identifies the game
    /// for save-state validation.
    #[must_use]
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    #[must_use]
    pub fn mirror(&self) -> Mirroring {
        self.mirror
    }

    pub fn reset(&mut self) {
        self.mapper.reset();
    }

    /// CPU read. `None` when the cartridge does not respond and the bus
    /// should fall through to its own devices.
    #[must_use]
    pub fn cpu_read(&self, addr: u16) -> Option<u8> {
        if let Some(offset) = self.mapper.cpu_map_read(addr) {
            let index = offset % self.prg_rom.len().max(1);
            return Some(self.prg_rom.get(index).copied().unwrap_or(0));
        }
        if (0x6000..=0x7FFF).contains(&addr) {
            return Some(self.prg_ram[usize::from(addr & 0x1FFF)]);
        }
        None
    }

    /// CPU write: mapper control, PRG poke, or PRG RAM.
    pub fn cpu_write(&mut self, addr: u16, value: u8) -> WriteOutcome {
        match self.mapper.cpu_map_write(addr, value) {
            MapWrite::Prg(offset) => {
                let index = offset % self.prg_rom.len().max(1);
                if let Some(slot) = self.prg_rom.get_mut(index) {
                    *slot = value;
                }
                WriteOutcome {
                    handled: true,
                    mirror_changed: None,
                }
            }
            MapWrite::Control(mirror) => {
                if let Some(mode) = mirror {
                    self.mirror = mode;
                }
                WriteOutcome {
                    handled: true,
                    mirror_changed: mirror,
                }
            }
            MapWrite::None => {
                if (0x6000..=0x7FFF).contains(&addr) {
                    self.prg_ram[usize::from(addr & 0x1FFF)] = value;
                    WriteOutcome {
                        handled: true,
                        mirror_changed: None,
                    }
                } else {
                    WriteOutcome {
                        handled: false,
                        mirror_changed: None,
                    }
                }
            }
        }
    }

    /// PPU pattern-table read ($0000-$1FFF).
    #[must_use]
    pub fn ppu_read(&self, addr: u16) -> Option<u8> {
        let offset = self.mapper.ppu_map_read(addr)?;
        self.chr.get(offset).copied()
    }

    /// PPU pattern-table write (CHR RAM boards).
    pub fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        if let Some(offset) = self.mapper.ppu_map_write(addr) {
            if let Some(slot) = self.chr.get_mut(offset) {
                *slot = value;
                return true;
            }
        }
        false
    }

    /// Per-visible-scanline hook for the MMC3 IRQ counter.
    pub fn scanline_tick(&mut self) {
        self.mapper.scanline_tick();
    }

    #[must_use]
    pub fn irq_asserted(&self) -> bool {
        self.mapper.irq_asserted()
    }

    pub fn clear_irq(&mut self) {
        self.mapper.clear_irq();
    }

    /// Load PRG RAM contents (legacy save-state path).
    pub fn load_prg_ram(&mut self, data: &[u8]) {
        let len = data.len().min(self.prg_ram.len());
        self.prg_ram[..len].copy_from_slice(&data[..len]);
    }

    #[must_use]
    pub fn prg_ram_len(&self) -> usize {
        self.prg_ram.len()
    }
}

impl Stateful for Cartridge {
    fn save_state(&self, out: &mut StateWriter) {
        let mut mapper_state = StateWriter::new();
        self.mapper.save_state(&mut mapper_state);
        let mapper_bytes = mapper_state.into_bytes();

        let chr_saved: &[u8] = if self.chr_is_ram { &self.chr } else { &[] };

        out.put_u32(self.prg_ram.len() as u32);
        out.put_u32(chr_saved.len() as u32);
        out.put_u32(mapper_bytes.len() as u32);
        out.put_u8(self.mirror.ordinal());
        out.put_bytes(&self.prg_ram);
        out.put_bytes(chr_saved);
        out.put_bytes(&mapper_bytes);
    }

    fn load_state(&mut self, r: &mut StateReader) -> bool {
        let prg_ram_len = r.u32() as usize;
        let chr_len = r.u32() as usize;
        let mapper_len = r.u32() as usize;
        let mirror_ordinal = r.u8();

        if prg_ram_len != self.prg_ram.len() {
            return false;
        }
        if chr_len != if self.chr_is_ram { self.chr.len() } else { 0 } {
            return false;
        }

        r.bytes(&mut self.prg_ram);
        if self.chr_is_ram {
            r.bytes(&mut self.chr);
        }

        let mapper_bytes = r.slice(mapper_len);
        if !r.is_ok() {
            return false;
        }
        let mut mapper_reader = StateReader::new(mapper_bytes);
        if !self.mapper.load_state(&mut mapper_reader) {
            return false;
        }

        match Mirroring::from_ordinal(mirror_ordinal) {
            Some(mirror) => self.mirror = mirror,
            None => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn make_test_rom(mapper: u8, prg_banks: u8, chr_banks: u8, flags6: u8) -> Vec<u8> {
        let prg_size = usize::from(prg_banks) * 16 * 1024;
        let chr_size = usize::from(chr_banks) * 8 * 1024;
        let mut rom = vec![0u8; 16 + prg_size + chr_size];
        rom[0..4].copy_from_slice(b"NES\x1A");
        rom[4] = prg_banks;
        rom[5] = chr_banks;
        rom[6] = (mapper << 4) | (flags6 & 0x0F);
        rom[7] = mapper & 0xF0;
        for i in 0..prg_size {
            rom[16 + i] = (i & 0xFF) as u8;
        }
        for i in 0..chr_size {
            rom[16 + prg_size + i] = (i & 0xFF) as u8;
        }
        rom
    }

    #[test]
    fn parse_nrom() {
        let cart = Cartridge::from_ines(&make_test_rom(0, 1, 1, 0)).unwrap();
        assert_eq!(cart.mapper_id(), 0);
        assert_eq!(cart.mirror(), Mirroring::Horizontal);
        assert_eq!(cart.cpu_read(0x8004), Some(0x04));
        // 16 KB PRG mirrors into $C000.
        assert_eq!(cart.cpu_read(0xC004), Some(0x04));
        assert_eq!(cart.ppu_read(0x0010), Some(0x10));
    }

    #[test]
    fn vertical_mirror_flag() {
        let cart = Cartridge::from_ines(&make_test_rom(0, 1, 1, 0x01)).unwrap();
        assert_eq!(cart.mirror(), Mirroring::Vertical);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut rom = make_test_rom(0, 1, 1, 0);
        rom[0] = b'X';
        assert!(matches!(
            Cartridge::from_ines(&rom),
            Err(RomError::Malformed)
        ));
    }

    #[test]
    fn rejects_truncated_image() {
        let rom = make_test_rom(0, 2, 1, 0);
        assert!(matches!(
            Cartridge::from_ines(&rom[..rom.len() - 1]),
            Err(RomError::Malformed)
        ));
    }

    #[test]
    fn rejects_unknown_mapper() {
        let rom = make_test_rom(7, 1, 1, 0);
        assert!(matches!(
            Cartridge::from_ines(&rom),
            Err(RomError::UnsupportedMapper(7))
        ));
    }

    #[test]
    fn trainer_is_skipped() {
        let prg_size = 16 * 1024;
        let mut rom = vec![0u8; 16 + 512 + prg_size + 8 * 1024];
        rom[0..4].copy_from_slice(b"NES\x1A");
        rom[4] = 1;
        rom[5] = 1;
        rom[6] = 0x04; // Trainer present
        rom[16 + 512] = 0xAB; // First PRG byte, after the trainer
        let cart = Cartridge::from_ines(&rom).unwrap();
        assert_eq!(cart.cpu_read(0x8000), Some(0xAB));
    }

    #[test]
    fn chr_ram_allocated_and_writable() {
        let mut cart = Cartridge::from_ines(&make_test_rom(0, 1, 0, 0)).unwrap();
        assert_eq!(cart.ppu_read(0x0123), Some(0));
        assert!(cart.ppu_write(0x0123, 0x77));
        assert_eq!(cart.ppu_read(0x0123), Some(0x77));
    }

    #[test]
    fn chr_rom_not_writable() {
        let mut cart = Cartridge::from_ines(&make_test_rom(0, 1, 1, 0)).unwrap();
        assert!(!cart.ppu_write(0x0123, 0x77));
    }

    #[test]
    fn prg_ram_window() {
        let mut cart = Cartridge::from_ines(&make_test_rom(0, 1, 1, 0)).unwrap();
        let outcome = cart.cpu_write(0x6000, 0x5A);
        assert!(outcome.handled);
        assert_eq!(cart.cpu_read(0x6000), Some(0x5A));
        // $7FFF aliases into the same 8 KB.
        assert_eq!(cart.cpu_read(0x7FFF), Some(0));
    }

    #[test]
    fn fingerprint_distinguishes_roms() {
        let a = Cartridge::from_ines(&make_test_rom(0, 1, 1, 0)).unwrap();
        let mut rom_b = make_test_rom(0, 1, 1, 0);
        rom_b[16] ^= 0xFF;
        let b = Cartridge::from_ines(&rom_b).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        // Deterministic.
        let a2 = Cartridge::from_ines(&make_test_rom(0, 1, 1, 0)).unwrap();
        assert_eq!(a.fingerprint(), a2.fingerprint());
    }

    #[test]
    fn state_round_trip_preserves_ram_and_mirror() {
        let mut cart = Cartridge::from_ines(&make_test_rom(1, 2, 0, 0)).unwrap();
        cart.cpu_write(0x6010, 0x42);
        cart.ppu_write(0x0040, 0x24);

        let mut w = StateWriter::new();
        cart.save_state(&mut w);
        let bytes = w.into_bytes();

        let mut other = Cartridge::from_ines(&make_test_rom(1, 2, 0, 0)).unwrap();
        let mut r = StateReader::new(&bytes);
        assert!(other.load_state(&mut r));
        assert_eq!(other.cpu_read(0x6010), Some(0x42));
        assert_eq!(other.ppu_read(0x0040), Some(0x24));
    }
}
