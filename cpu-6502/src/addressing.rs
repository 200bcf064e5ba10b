//! 6502 addressing modes.
//!
//! The 6502 has 13 addressing modes:
//! - Implied: No operand (e.g., CLC, RTS)
//! - Accumulator: Operates on A register (e.g., ASL A)
//! - Immediate: #$nn (literal value)
//! - Zero Page: $nn (8-bit address in page zero)
//! - Zero Page,X: $nn,X (8-bit address + X, wraps in page zero)
//! - Zero Page,Y: $nn,Y (8-bit address + Y, wraps in page zero)
//! - Absolute: $nnnn (16-bit address)
//! - Absolute,X: $nnnn,X (16-bit address + X, may cross page)
//! - Absolute,Y: $nnnn,Y (16-bit address + Y, may cross page)
//! - Indirect: ($nnnn) (JMP only, buggy page boundary behavior)
//! - Indexed Indirect: ($nn,X) (pointer in zero page indexed by X)
//! - Indirect Indexed: ($nn),Y (zero page pointer + Y)
//! - Relative: Branch offset (-128 to +127)

use crate::opcodes::Mode;
use crate::Mos6502;
use emu_core::Bus;

impl Mos6502 {
    /// Fetch the next byte at PC and increment PC.
    pub(crate) fn fetch(&mut self, bus: &mut impl Bus) -> u8 {
        let value = bus.read(self.pc, false);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    /// Fetch a 16-bit word (little-endian) at PC.
    pub(crate) fn fetch_word(&mut self, bus: &mut impl Bus) -> u16 {
        let low = self.fetch(bus);
        let high = self.fetch(bus);
        u16::from_le_bytes([low, high])
    }

    /// Read a 16-bit word from memory (little-endian).
    pub(crate) fn read_word(&self, bus: &mut impl Bus, addr: u16) -> u16 {
        let low = bus.read(addr, false);
        let high = bus.read(addr.wrapping_add(1), false);
        u16::from_le_bytes([low, high])
    }

    /// Read a 16-bit word with the 6502 page boundary bug (indirect JMP).
    /// If addr is $xxFF, the high byte comes from $xx00 instead of the
    /// next page.
    pub(crate) fn read_word_page_bug(&self, bus: &mut impl Bus, addr: u16) -> u16 {
        let low = bus.read(addr, false);
        let high_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let high = bus.read(high_addr, false);
        u16::from_le_bytes([low, high])
    }

    /// Push a byte onto the stack.
    pub(crate) fn push(&mut self, bus: &mut impl Bus, value: u8) {
        bus.write(0x0100 | u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
    }

    /// Pull a byte from the stack.
    pub(crate) fn pull(&mut self, bus: &mut impl Bus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x0100 | u16::from(self.sp), false)
    }

    /// Push a 16-bit word onto the stack (high byte first).
    pub(crate) fn push_word(&mut self, bus: &mut impl Bus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    /// Pull a 16-bit word from the stack (low byte first).
    pub(crate) fn pull_word(&mut self, bus: &mut impl Bus) -> u16 {
        let low = self.pull(bus);
        let high = self.pull(bus);
        u16::from_le_bytes([low, high])
    }

    /// Resolve the effective address for `mode`, leaving it in `self.addr`.
    ///
    /// Returns true when an indexed mode crossed a page boundary; the
    /// decode table decides whether that costs an extra cycle (reads pay,
    /// writes and read-modify-writes bake the penalty into their base
    /// count).
    pub(crate) fn resolve(&mut self, bus: &mut impl Bus, mode: Mode) -> bool {
        match mode {
            Mode::Imp | Mode::Acc => {
                self.addr = 0;
                false
            }
            Mode::Imm => {
                self.addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                false
            }
            Mode::Zp0 => {
                self.addr = u16::from(self.fetch(bus));
                false
            }
            Mode::Zpx => {
                let base = self.fetch(bus);
                self.addr = u16::from(base.wrapping_add(self.x));
                false
            }
            Mode::Zpy => {
                let base = self.fetch(bus);
                self.addr = u16::from(base.wrapping_add(self.y));
                false
            }
            Mode::Rel => {
                let offset = self.fetch(bus) as i8;
                self.addr = self.pc.wrapping_add(offset as u16);
                false
            }
            Mode::Abs => {
                self.addr = self.fetch_word(bus);
                false
            }
            Mode::Abx => {
                let base = self.fetch_word(bus);
                self.addr = base.wrapping_add(u16::from(self.x));
                (base ^ self.addr) & 0xFF00 != 0
            }
            Mode::Aby => {
                let base = self.fetch_word(bus);
                self.addr = base.wrapping_add(u16::from(self.y));
                (base ^ self.addr) & 0xFF00 != 0
            }
            Mode::Ind => {
                let ptr = self.fetch_word(bus);
                self.addr = self.read_word_page_bug(bus, ptr);
                false
            }
            Mode::Izx => {
                let ptr = self.fetch(bus).wrapping_add(self.x);
                let low = bus.read(u16::from(ptr), false);
                let high = bus.read(u16::from(ptr.wrapping_add(1)), false);
                self.addr = u16::from_le_bytes([low, high]);
                false
            }
            Mode::Izy => {
                let ptr = self.fetch(bus);
                let low = bus.read(u16::from(ptr), false);
                let high = bus.read(u16::from(ptr.wrapping_add(1)), false);
                let base = u16::from_le_bytes([low, high]);
                self.addr = base.wrapping_add(u16::from(self.y));
                (base ^ self.addr) & 0xFF00 != 0
            }
        }
    }
}
