//! Opcode decode table.
//!
//! One entry per opcode byte carrying the operation, addressing mode, base
//! cycle count and whether an indexed page crossing adds a cycle. Undefined
//! opcodes decode to [`Op::Nop`] with their documented cycle costs; the
//! undocumented operations that real software (and nestest) rely on are
//! decoded for real.

/// Operation mnemonic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    // Official
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
    Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx,
    Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp,
    Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay,
    Tsx, Txa, Txs, Tya,
    // Undocumented, used by commercial software and test ROMs
    Lax, Sax, Dcp, Isb, Slo, Sre, Rla, Rra, Anc, Alr, Arr, Sbx,
}

/// Addressing mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Imp,
    Acc,
    Imm,
    Zp0,
    Zpx,
    Zpy,
    Rel,
    Abs,
    Abx,
    Aby,
    Ind,
    Izx,
    Izy,
}

/// One decode-table entry.
#[derive(Clone, Copy)]
pub struct Opcode {
    pub op: Op,
    pub mode: Mode,
    /// Base cycle count. Write and read-modify-write forms already include
    /// the indexing penalty.
    pub cycles: u8,
    /// Read forms add one cycle when the indexed address crossed a page.
    pub cross: bool,
}

const fn e(op: Op, mode: Mode, cycles: u8) -> Opcode {
    Opcode {
        op,
        mode,
        cycles,
        cross: false,
    }
}

const fn x(op: Op, mode: Mode, cycles: u8) -> Opcode {
    Opcode {
        op,
        mode,
        cycles,
        cross: true,
    }
}

use Mode::*;
use Op::*;

/// The 256-entry decode table, indexed by opcode byte.
#[rustfmt::skip]
pub const OPCODES: [Opcode; 256] = [
    // 0x00
    e(Brk, Imp, 7), e(Ora, Izx, 6), e(Nop, Imp, 2), e(Slo, Izx, 8),
    e(Nop, Zp0, 3), e(Ora, Zp0, 3), e(Asl, Zp0, 5), e(Slo, Zp0, 5),
    e(Php, Imp, 3), e(Ora, Imm, 2), e(Asl, Acc, 2), e(Anc, Imm, 2),
    e(Nop, Abs, 4), e(Ora, Abs, 4), e(Asl, Abs, 6), e(Slo, Abs, 6),
    // 0x10
    e(Bpl, Rel, 2), x(Ora, Izy, 5), e(Nop, Imp, 2), e(Slo, Izy, 8),
    e(Nop, Zpx, 4), e(Ora, Zpx, 4), e(Asl, Zpx, 6), e(Slo, Zpx, 6),
    e(Clc, Imp, 2), x(Ora, Aby, 4), e(Nop, Imp, 2), e(Slo, Aby, 7),
    x(Nop, Abx, 4), x(Ora, Abx, 4), e(Asl, Abx, 7), e(Slo, Abx, 7),
    // 0x20
    e(Jsr, Abs, 6), e(And, Izx, 6), e(Nop, Imp, 2), e(Rla, Izx, 8),
    e(Bit, Zp0, 3), e(And, Zp0, 3), e(Rol, Zp0, 5), e(Rla, Zp0, 5),
    e(Plp, Imp, 4), e(And, Imm, 2), e(Rol, Acc, 2), e(Anc, Imm, 2),
    e(Bit, Abs, 4), e(And, Abs, 4), e(Rol, Abs, 6), e(Rla, Abs, 6),
    // 0x30
    e(Bmi, Rel, 2), x(And, Izy, 5), e(Nop, Imp, 2), e(Rla, Izy, 8),
    e(Nop, Zpx, 4), e(And, Zpx, 4), e(Rol, Zpx, 6), e(Rla, Zpx, 6),
    e(Sec, Imp, 2), x(And, Aby, 4), e(Nop, Imp, 2), e(Rla, Aby, 7),
    x(Nop, Abx, 4), x(And, Abx, 4), e(Rol, Abx, 7), e(Rla, Abx, 7),
    // 0x40
    e(Rti, Imp, 6), e(Eor, Izx, 6), e(Nop, Imp, 2), e(Sre, Izx, 8),
    e(Nop, Zp0, 3), e(Eor, Zp0, 3), e(Lsr, Zp0, 5), e(Sre, Zp0, 5),
    e(Pha, Imp, 3), e(Eor, Imm, 2), e(Lsr, Acc, 2), e(Alr, Imm, 2),
    e(Jmp, Abs, 3), e(Eor, Abs, 4), e(Lsr, Abs, 6), e(Sre, Abs, 6),
    // 0x50
    e(Bvc, Rel, 2), x(Eor, Izy, 5), e(Nop, Imp, 2), e(Sre, Izy, 8),
    e(Nop, Zpx, 4), e(Eor, Zpx, 4), e(Lsr, Zpx, 6), e(Sre, Zpx, 6),
    e(Cli, Imp, 2), x(Eor, Aby, 4), e(Nop, Imp, 2), e(Sre, Aby, 7),
    x(Nop, Abx, 4), x(Eor, Abx, 4), e(Lsr, Abx, 7), e(Sre, Abx, 7),
    // 0x60
    e(Rts, Imp, 6), e(Adc, Izx, 6), e(Nop, Imp, 2), e(Rra, Izx, 8),
    e(Nop, Zp0, 3), e(Adc, Zp0, 3), e(Ror, Zp0, 5), e(Rra, Zp0, 5),
    e(Pla, Imp, 4), e(Adc, Imm, 2), e(Ror, Acc, 2), e(Arr, Imm, 2),
    e(Jmp, Ind, 5), e(Adc, Abs, 4), e(Ror, Abs, 6), e(Rra, Abs, 6),
    // 0x70
    e(Bvs, Rel, 2), x(Adc, Izy, 5), e(Nop, Imp, 2), e(Rra, Izy, 8),
    e(Nop, Zpx, 4), e(Adc, Zpx, 4), e(Ror, Zpx, 6), e(Rra, Zpx, 6),
    e(Sei, Imp, 2), x(Adc, Aby, 4), e(Nop, Imp, 2), e(Rra, Aby, 7),
    x(Nop, Abx, 4), x(Adc, Abx, 4), e(Ror, Abx, 7), e(Rra, Abx, 7),
    // 0x80
    e(Nop, Imm, 2), e(Sta, Izx, 6), e(Nop, Imm, 2), e(Sax, Izx, 6),
    e(Sty, Zp0, 3), e(Sta, Zp0, 3), e(Stx, Zp0, 3), e(Sax, Zp0, 3),
    e(Dey, Imp, 2), e(Nop, Imm, 2), e(Txa, Imp, 2), e(Nop, Imm, 2),
    e(Sty, Abs, 4), e(Sta, Abs, 4), e(Stx, Abs, 4), e(Sax, Abs, 4),
    // 0x90
    e(Bcc, Rel, 2), e(Sta, Izy, 6), e(Nop, Imp, 2), e(Nop, Izy, 6),
    e(Sty, Zpx, 4), e(Sta, Zpx, 4), e(Stx, Zpy, 4), e(Sax, Zpy, 4),
    e(Tya, Imp, 2), e(Sta, Aby, 5), e(Txs, Imp, 2), e(Nop, Aby, 5),
    e(Nop, Abx, 5), e(Sta, Abx, 5), e(Nop, Aby, 5), e(Nop, Aby, 5),
    // 0xA0
    e(Ldy, Imm, 2), e(Lda, Izx, 6), e(Ldx, Imm, 2), e(Lax, Izx, 6),
    e(Ldy, Zp0, 3), e(Lda, Zp0, 3), e(Ldx, Zp0, 3), e(Lax, Zp0, 3),
    e(Tay, Imp, 2), e(Lda, Imm, 2), e(Tax, Imp, 2), e(Nop, Imm, 2),
    e(Ldy, Abs, 4), e(Lda, Abs, 4), e(Ldx, Abs, 4), e(Lax, Abs, 4),
    // 0xB0
    e(Bcs, Rel, 2), x(Lda, Izy, 5), e(Nop, Imp, 2), x(Lax, Izy, 5),
    e(Ldy, Zpx, 4), e(Lda, Zpx, 4), e(Ldx, Zpy, 4), e(Lax, Zpy, 4),
    e(Clv, Imp, 2), x(Lda, Aby, 4), e(Tsx, Imp, 2), x(Nop, Aby, 4),
    x(Ldy, Abx, 4), x(Lda, Abx, 4), x(Ldx, Aby, 4), x(Lax, Aby, 4),
    // 0xC0
    e(Cpy, Imm, 2), e(Cmp, Izx, 6), e(Nop, Imm, 2), e(Dcp, Izx, 8),
    e(Cpy, Zp0, 3), e(Cmp, Zp0, 3), e(Dec, Zp0, 5), e(Dcp, Zp0, 5),
    e(Iny, Imp, 2), e(Cmp, Imm, 2), e(Dex, Imp, 2), e(Sbx, Imm, 2),
    e(Cpy, Abs, 4), e(Cmp, Abs, 4), e(Dec, Abs, 6), e(Dcp, Abs, 6),
    // 0xD0
    e(Bne, Rel, 2), x(Cmp, Izy, 5), e(Nop, Imp, 2), e(Dcp, Izy, 8),
    e(Nop, Zpx, 4), e(Cmp, Zpx, 4), e(Dec, Zpx, 6), e(Dcp, Zpx, 6),
    e(Cld, Imp, 2), x(Cmp, Aby, 4), e(Nop, Imp, 2), e(Dcp, Aby, 7),
    x(Nop, Abx, 4), x(Cmp, Abx, 4), e(Dec, Abx, 7), e(Dcp, Abx, 7),
    // 0xE0
    e(Cpx, Imm, 2), e(Sbc, Izx, 6), e(Nop, Imm, 2), e(Isb, Izx, 8),
    e(Cpx, Zp0, 3), e(Sbc, Zp0, 3), e(Inc, Zp0, 5), e(Isb, Zp0, 5),
    e(Inx, Imp, 2), e(Sbc, Imm, 2), e(Nop, Imp, 2), e(Sbc, Imm, 2),
    e(Cpx, Abs, 4), e(Sbc, Abs, 4), e(Inc, Abs, 6), e(Isb, Abs, 6),
    // 0xF0
    e(Beq, Rel, 2), x(Sbc, Izy, 5), e(Nop, Imp, 2), e(Isb, Izy, 8),
    e(Nop, Zpx, 4), e(Sbc, Zpx, 4), e(Inc, Zpx, 6), e(Isb, Zpx, 6),
    e(Sed, Imp, 2), x(Sbc, Aby, 4), e(Nop, Imp, 2), e(Isb, Aby, 7),
    x(Nop, Abx, 4), x(Sbc, Abx, 4), e(Inc, Abx, 7), e(Isb, Abx, 7),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_cycle_counts() {
        assert_eq!(OPCODES[0xA9].cycles, 2); // LDA #
        assert_eq!(OPCODES[0xBD].cycles, 4); // LDA abs,X
        assert!(OPCODES[0xBD].cross);
        assert_eq!(OPCODES[0x9D].cycles, 5); // STA abs,X
        assert!(!OPCODES[0x9D].cross);
        assert_eq!(OPCODES[0xFE].cycles, 7); // INC abs,X
        assert_eq!(OPCODES[0x00].cycles, 7); // BRK
    }

    #[test]
    fn unofficial_nops_decoded() {
        for op in [0x1Au8, 0x3A, 0x5A, 0x7A, 0xDA, 0xFA] {
            let entry = OPCODES[op as usize];
            assert_eq!(entry.op, Op::Nop);
            assert_eq!(entry.cycles, 2);
        }
        for op in [0x04u8, 0x44, 0x64] {
            assert_eq!(OPCODES[op as usize].cycles, 3);
        }
        for op in [0x1Cu8, 0x3C, 0x5C, 0x7C, 0xDC, 0xFC] {
            let entry = OPCODES[op as usize];
            assert_eq!(entry.op, Op::Nop);
            assert_eq!(entry.mode, Mode::Abx);
            assert!(entry.cross);
        }
        // SBC alias
        assert_eq!(OPCODES[0xEB].op, Op::Sbc);
    }
}
