//! MOS 6502 CPU core as found in the NES 2A03.
//!
//! The 2A03 is a 6502 with the BCD circuit disconnected: the D flag can be
//! set and cleared but never affects ADC/SBC. The core executes whole
//! instructions at once against the bus and then burns the instruction's
//! cycle count down one [`clock`](emu_core::Cpu::clock) call at a time, so
//! external observers (DMA, interrupts, save states) only ever see the CPU
//! at instruction boundaries.
//!
//! # Undocumented opcodes
//!
//! The undocumented operations exercised by nestest and by commercial
//! software are implemented (LAX, SAX, DCP, ISB, SLO, SRE, RLA, RRA, ANC,
//! ALR, ARR, SBX, the NOP family, and the $EB SBC alias). Every remaining
//! opcode decodes to a two-cycle NOP; nothing halts the machine.

use emu_core::{Bus, Cpu, StateReader, StateWriter, Stateful};

mod addressing;
mod flags;
mod opcodes;

use flags::*;
pub use opcodes::{Mode, Op, Opcode, OPCODES};

/// Interrupt vectors.
const VECTOR_NMI: u16 = 0xFFFA;
const VECTOR_RESET: u16 = 0xFFFC;
const VECTOR_IRQ: u16 = 0xFFFE;

/// The 2A03's 6502 core.
pub struct Mos6502 {
    /// Accumulator
    pub(crate) a: u8,
    /// X index register
    pub(crate) x: u8,
    /// Y index register
    pub(crate) y: u8,
    /// Stack pointer (stack lives at $0100-$01FF)
    pub(crate) sp: u8,
    /// Program counter
    pub(crate) pc: u16,
    /// Status register (NV-BDIZC)
    pub(crate) p: u8,

    /// Opcode of the instruction in flight.
    opcode: u8,
    /// Latched effective address of the instruction in flight.
    addr: u16,
    /// Cycles remaining before the next instruction may start.
    cycles: u32,
    /// Total cycles executed since reset.
    total_cycles: u64,

    nmi_pending: bool,
    irq_pending: bool,
}

impl Mos6502 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
            p: FLAG_U | FLAG_I,
            opcode: 0,
            addr: 0,
            cycles: 0,
            total_cycles: 0,
            nmi_pending: false,
            irq_pending: false,
        }
    }

    // =====================================================================
    // Register accessors
    // =====================================================================

    #[must_use]
    pub fn a(&self) -> u8 {
        self.a
    }

    #[must_use]
    pub fn x(&self) -> u8 {
        self.x
    }

    #[must_use]
    pub fn y(&self) -> u8 {
        self.y
    }

    #[must_use]
    pub fn sp(&self) -> u8 {
        self.sp
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        self.p
    }

    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// True when the CPU sits at an instruction boundary.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cycles == 0
    }

    #[must_use]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, value: u16) {
        self.pc = value;
    }

    /// Queue a non-maskable interrupt, honored at the next instruction
    /// boundary.
    pub fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Queue a maskable interrupt. Ignored while the I flag is set.
    pub fn irq(&mut self) {
        if !self.interrupt_disable() {
            self.irq_pending = true;
        }
    }

    /// Insert `cycles` cycles of dead time before the next instruction
    /// (DMA stalls).
    pub fn stall(&mut self, cycles: u32) {
        self.cycles += cycles;
    }

    // =====================================================================
    // Execution
    // =====================================================================

    /// Start the next unit of work: a pending interrupt sequence or the
    /// instruction at PC. Leaves `self.cycles` at the unit's cost.
    fn begin(&mut self, bus: &mut impl Bus) {
        if self.nmi_pending {
            self.nmi_pending = false;
            self.enter_interrupt(bus, VECTOR_NMI, 8);
            return;
        }
        if self.irq_pending {
            self.irq_pending = false;
            if !self.interrupt_disable() {
                self.enter_interrupt(bus, VECTOR_IRQ, 7);
                return;
            }
        }

        self.opcode = self.fetch(bus);
        let entry = OPCODES[self.opcode as usize];
        self.cycles = u32::from(entry.cycles);
        let crossed = self.resolve(bus, entry.mode);
        if entry.cross && crossed {
            self.cycles += 1;
        }
        self.execute(bus, entry.op, entry.mode);
        self.set_flag(FLAG_U, true);
    }

    /// Push PC and status, vector, disable interrupts.
    fn enter_interrupt(&mut self, bus: &mut impl Bus, vector: u16, cycles: u32) {
        self.push_word(bus, self.pc);
        self.push(bus, self.status_for_push(false));
        self.set_flag(FLAG_I, true);
        self.pc = self.read_word(bus, vector);
        self.cycles = cycles;
    }

    /// Read the instruction operand: accumulator or memory at the
    /// resolved address.
    fn operand(&mut self, bus: &mut impl Bus, mode: Mode) -> u8 {
        if mode == Mode::Acc {
            self.a
        } else {
            bus.read(self.addr, false)
        }
    }

    /// Read-modify-write against the accumulator or the resolved address.
    fn rmw(&mut self, bus: &mut impl Bus, mode: Mode, f: fn(&mut Self, u8) -> u8) -> u8 {
        if mode == Mode::Acc {
            self.a = f(self, self.a);
            self.a
        } else {
            let value = bus.read(self.addr, false);
            let result = f(self, value);
            bus.write(self.addr, result);
            result
        }
    }

    /// Taken branches cost one extra cycle, two when the target sits in a
    /// different page than the instruction following the branch.
    fn branch(&mut self, condition: bool) {
        if condition {
            self.cycles += 1;
            if (self.addr ^ self.pc) & 0xFF00 != 0 {
                self.cycles += 1;
            }
            self.pc = self.addr;
        }
    }

    fn execute(&mut self, bus: &mut impl Bus, op: Op, mode: Mode) {
        match op {
            // Loads / stores
            Op::Lda => {
                self.a = self.operand(bus, mode);
                self.set_zn(self.a);
            }
            Op::Ldx => {
                self.x = self.operand(bus, mode);
                self.set_zn(self.x);
            }
            Op::Ldy => {
                self.y = self.operand(bus, mode);
                self.set_zn(self.y);
            }
            Op::Sta => bus.write(self.addr, self.a),
            Op::Stx => bus.write(self.addr, self.x),
            Op::Sty => bus.write(self.addr, self.y),

            // Transfers
            Op::Tax => {
                self.x = self.a;
                self.set_zn(self.x);
            }
            Op::Tay => {
                self.y = self.a;
                self.set_zn(self.y);
            }
            Op::Txa => {
                self.a = self.x;
                self.set_zn(self.a);
            }
            Op::Tya => {
                self.a = self.y;
                self.set_zn(self.a);
            }
            Op::Tsx => {
                self.x = self.sp;
                self.set_zn(self.x);
            }
            Op::Txs => self.sp = self.x,

            // Stack
            Op::Pha => self.push(bus, self.a),
            Op::Php => {
                let value = self.status_for_push(true);
                self.push(bus, value);
            }
            Op::Pla => {
                self.a = self.pull(bus);
                self.set_zn(self.a);
            }
            Op::Plp => {
                let value = self.pull(bus);
                self.set_status_from_stack(value);
            }

            // Arithmetic
            Op::Adc => {
                let value = self.operand(bus, mode);
                self.adc(value);
            }
            Op::Sbc => {
                let value = self.operand(bus, mode);
                self.adc(value ^ 0xFF);
            }
            Op::Cmp => {
                let value = self.operand(bus, mode);
                self.compare(self.a, value);
            }
            Op::Cpx => {
                let value = self.operand(bus, mode);
                self.compare(self.x, value);
            }
            Op::Cpy => {
                let value = self.operand(bus, mode);
                self.compare(self.y, value);
            }

            // Increment / decrement
            Op::Inc => {
                self.rmw(bus, mode, |cpu, v| {
                    let r = v.wrapping_add(1);
                    cpu.set_zn(r);
                    r
                });
            }
            Op::Dec => {
                self.rmw(bus, mode, |cpu, v| {
                    let r = v.wrapping_sub(1);
                    cpu.set_zn(r);
                    r
                });
            }
            Op::Inx => {
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
            }
            Op::Iny => {
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
            }
            Op::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
            }
            Op::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
            }

            // Logic
            Op::And => {
                self.a &= self.operand(bus, mode);
                self.set_zn(self.a);
            }
            Op::Eor => {
                self.a ^= self.operand(bus, mode);
                self.set_zn(self.a);
            }
            Op::Ora => {
                self.a |= self.operand(bus, mode);
                self.set_zn(self.a);
            }
            Op::Bit => {
                let value = self.operand(bus, mode);
                self.set_flag(FLAG_Z, self.a & value == 0);
                self.set_flag(FLAG_N, value & 0x80 != 0);
                self.set_flag(FLAG_V, value & 0x40 != 0);
            }

            // Shifts / rotates
            Op::Asl => {
                self.rmw(bus, mode, Self::asl_value);
            }
            Op::Lsr => {
                self.rmw(bus, mode, Self::lsr_value);
            }
            Op::Rol => {
                self.rmw(bus, mode, Self::rol_value);
            }
            Op::Ror => {
                self.rmw(bus, mode, Self::ror_value);
            }

            // Jumps / calls
            Op::Jmp => self.pc = self.addr,
            Op::Jsr => {
                self.push_word(bus, self.pc.wrapping_sub(1));
                self.pc = self.addr;
            }
            Op::Rts => {
                self.pc = self.pull_word(bus).wrapping_add(1);
            }
            Op::Rti => {
                let status = self.pull(bus);
                self.set_status_from_stack(status);
                self.pc = self.pull_word(bus);
            }
            Op::Brk => {
                // Padding byte after BRK is skipped, not read.
                self.pc = self.pc.wrapping_add(1);
                self.push_word(bus, self.pc);
                let status = self.status_for_push(true);
                self.push(bus, status);
                self.set_flag(FLAG_I, true);
                self.pc = self.read_word(bus, VECTOR_IRQ);
            }

            // Branches
            Op::Bpl => self.branch(!self.negative()),
            Op::Bmi => self.branch(self.negative()),
            Op::Bvc => self.branch(!self.overflow()),
            Op::Bvs => self.branch(self.overflow()),
            Op::Bcc => self.branch(!self.carry()),
            Op::Bcs => self.branch(self.carry()),
            Op::Bne => self.branch(!self.zero()),
            Op::Beq => self.branch(self.zero()),

            // Flags
            Op::Clc => self.set_flag(FLAG_C, false),
            Op::Sec => self.set_flag(FLAG_C, true),
            Op::Cli => self.set_flag(FLAG_I, false),
            Op::Sei => self.set_flag(FLAG_I, true),
            Op::Cld => self.set_flag(FLAG_D, false),
            Op::Sed => self.set_flag(FLAG_D, true),
            Op::Clv => self.set_flag(FLAG_V, false),

            Op::Nop => {}

            // Undocumented
            Op::Lax => {
                let value = self.operand(bus, mode);
                self.a = value;
                self.x = value;
                self.set_zn(value);
            }
            Op::Sax => bus.write(self.addr, self.a & self.x),
            Op::Dcp => {
                let result = self.rmw(bus, mode, |_, v| v.wrapping_sub(1));
                self.compare(self.a, result);
            }
            Op::Isb => {
                let result = self.rmw(bus, mode, |_, v| v.wrapping_add(1));
                self.adc(result ^ 0xFF);
            }
            Op::Slo => {
                let result = self.rmw(bus, mode, Self::asl_value);
                self.a |= result;
                self.set_zn(self.a);
            }
            Op::Sre => {
                let result = self.rmw(bus, mode, Self::lsr_value);
                self.a ^= result;
                self.set_zn(self.a);
            }
            Op::Rla => {
                let result = self.rmw(bus, mode, Self::rol_value);
                self.a &= result;
                self.set_zn(self.a);
            }
            Op::Rra => {
                let result = self.rmw(bus, mode, Self::ror_value);
                self.adc(result);
            }
            Op::Anc => {
                self.a &= self.operand(bus, mode);
                self.set_zn(self.a);
                self.set_flag(FLAG_C, self.a & 0x80 != 0);
            }
            Op::Alr => {
                self.a &= self.operand(bus, mode);
                self.a = self.lsr_value(self.a);
            }
            Op::Arr => {
                self.a &= self.operand(bus, mode);
                self.a = self.ror_value(self.a);
                self.set_flag(FLAG_C, self.a & 0x40 != 0);
                self.set_flag(FLAG_V, (self.a & 0x40) ^ ((self.a & 0x20) << 1) != 0);
            }
            Op::Sbx => {
                let value = self.operand(bus, mode);
                let temp = u16::from(self.a & self.x).wrapping_sub(u16::from(value));
                self.set_flag(FLAG_C, temp < 0x100);
                self.x = temp as u8;
                self.set_zn(self.x);
            }
        }
    }

    // =====================================================================
    // ALU helpers
    // =====================================================================

    /// Binary add with carry. The 2A03 ignores the D flag, so this is the
    /// whole ADC; SBC is ADC of the one's complement.
    fn adc(&mut self, value: u8) {
        let sum = u16::from(self.a) + u16::from(value) + u16::from(self.carry());
        let result = sum as u8;
        self.set_flag(FLAG_C, sum > 0xFF);
        self.set_flag(FLAG_V, (self.a ^ result) & (value ^ result) & 0x80 != 0);
        self.set_zn(result);
        self.a = result;
    }

    fn compare(&mut self, reg: u8, value: u8) {
        let result = reg.wrapping_sub(value);
        self.set_flag(FLAG_C, reg >= value);
        self.set_zn(result);
    }

    fn asl_value(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_C, value & 0x80 != 0);
        let result = value << 1;
        self.set_zn(result);
        result
    }

    fn lsr_value(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_C, value & 0x01 != 0);
        let result = value >> 1;
        self.set_zn(result);
        result
    }

    fn rol_value(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.carry());
        self.set_flag(FLAG_C, value & 0x80 != 0);
        let result = (value << 1) | carry_in;
        self.set_zn(result);
        result
    }

    fn ror_value(&mut self, value: u8) -> u8 {
        let carry_in = if self.carry() { 0x80 } else { 0 };
        self.set_flag(FLAG_C, value & 0x01 != 0);
        let result = (value >> 1) | carry_in;
        self.set_zn(result);
        result
    }
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Bus> Cpu<B> for Mos6502 {
    fn reset(&mut self, bus: &mut B) {
        self.pc = self.read_word(bus, VECTOR_RESET);
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.p = FLAG_U | FLAG_I;
        self.opcode = 0;
        self.addr = 0;
        self.nmi_pending = false;
        self.irq_pending = false;
        self.total_cycles = 0;
        self.cycles = 7;
    }

    fn clock(&mut self, bus: &mut B) -> bool {
        if self.cycles == 0 {
            self.begin(bus);
        }
        self.total_cycles += 1;
        self.cycles -= 1;
        self.cycles == 0
    }
}

impl Stateful for Mos6502 {
    fn save_state(&self, out: &mut StateWriter) {
        out.put_u8(self.a);
        out.put_u8(self.x);
        out.put_u8(self.y);
        out.put_u8(self.sp);
        out.put_u16(self.pc);
        out.put_u8(self.p);
        out.put_u8(self.opcode);
        out.put_u16(self.addr);
        out.put_u32(self.cycles);
        out.put_u64(self.total_cycles);
        out.put_bool(self.nmi_pending);
        out.put_bool(self.irq_pending);
    }

    fn load_state(&mut self, r: &mut StateReader) -> bool {
        self.a = r.u8();
        self.x = r.u8();
        self.y = r.u8();
        self.sp = r.u8();
        self.pc = r.u16();
        self.p = r.u8() | FLAG_U;
        self.opcode = r.u8();
        self.addr = r.u16();
        self.cycles = r.u32();
        self.total_cycles = r.u64();
        self.nmi_pending = r.bool();
        self.irq_pending = r.bool();
        r.is_ok()
    }
}
