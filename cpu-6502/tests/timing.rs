//! Cycle-timing and interrupt-boundary tests against a flat RAM bus.

use cpu_6502::Mos6502;
use emu_core::{Bus, Cpu};

struct RamBus {
    memory: Vec<u8>,
}

impl RamBus {
    fn new() -> Self {
        Self {
            memory: vec![0; 0x10000],
        }
    }

    fn load(&mut self, addr: u16, program: &[u8]) {
        let addr = addr as usize;
        self.memory[addr..addr + program.len()].copy_from_slice(program);
    }
}

impl Bus for RamBus {
    fn read(&mut self, address: u16, _read_only: bool) -> u8 {
        self.memory[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }
}

fn step(cpu: &mut Mos6502, bus: &mut RamBus) -> u32 {
    let mut cycles = 0;
    loop {
        cycles += 1;
        if cpu.clock(bus) {
            return cycles;
        }
    }
}

#[test]
fn countdown_loop_total_cycles() {
    // LDX #$05 ; loop: DEX ; BNE loop ; NOP
    let mut cpu = Mos6502::new();
    let mut bus = RamBus::new();
    bus.load(0x0200, &[0xA2, 0x05, 0xCA, 0xD0, 0xFD, 0xEA]);
    cpu.set_pc(0x0200);

    let mut total = step(&mut cpu, &mut bus); // LDX: 2
    for _ in 0..5 {
        total += step(&mut cpu, &mut bus); // DEX: 2
        total += step(&mut cpu, &mut bus); // BNE: 3 taken, 2 on exit
    }
    // 2 + 5*2 + 4*3 + 2 = 26
    assert_eq!(total, 26);
    assert_eq!(cpu.x(), 0);
    assert_eq!(cpu.pc(), 0x0205);
    assert_eq!(cpu.total_cycles(), 26);
}

#[test]
fn nmi_waits_for_instruction_boundary() {
    // A 6-cycle instruction is in flight when the NMI arrives; the
    // interrupt sequence must not start until it retires.
    let mut cpu = Mos6502::new();
    let mut bus = RamBus::new();
    bus.load(0x0200, &[0xEE, 0x50, 0x03]); // INC $0350 (6 cycles)
    bus.memory[0xFFFA] = 0x00;
    bus.memory[0xFFFB] = 0x90;
    bus.memory[0x9000] = 0xEA;
    cpu.set_pc(0x0200);

    // Burn two cycles into the INC, then raise NMI.
    assert!(!cpu.clock(&mut bus));
    assert!(!cpu.clock(&mut bus));
    cpu.nmi();

    // INC still finishes (4 more cycles) and commits its write.
    for _ in 0..3 {
        assert!(!cpu.clock(&mut bus));
    }
    assert!(cpu.clock(&mut bus));
    assert_eq!(bus.memory[0x0350], 1);
    assert_eq!(cpu.pc(), 0x0203);

    // Next unit is the 8-cycle NMI sequence.
    assert_eq!(step(&mut cpu, &mut bus), 8);
    assert_eq!(cpu.pc(), 0x9000);
}

#[test]
fn irq_serviced_after_cli() {
    let mut cpu = Mos6502::new();
    let mut bus = RamBus::new();
    bus.load(0x0200, &[0x58, 0xEA]); // CLI ; NOP
    bus.memory[0xFFFE] = 0x00;
    bus.memory[0xFFFF] = 0x95;
    cpu.set_pc(0x0200);

    cpu.irq(); // Swallowed: I still set.
    step(&mut cpu, &mut bus); // CLI
    cpu.irq(); // Accepted now.
    assert_eq!(step(&mut cpu, &mut bus), 7);
    assert_eq!(cpu.pc(), 0x9500);
}

#[test]
fn rmw_absolute_x_never_gets_cross_discount() {
    let mut cpu = Mos6502::new();
    let mut bus = RamBus::new();
    // ASL $0210,X with X = 0 (no cross): still 7 cycles.
    bus.load(0x0200, &[0x1E, 0x10, 0x02]);
    cpu.set_pc(0x0200);
    assert_eq!(step(&mut cpu, &mut bus), 7);
}
