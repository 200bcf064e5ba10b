//! CPU-visible address routing.
//!
//! Memory map:
//! - $0000-$07FF: 2 KB internal RAM ($0800-$1FFF mirrors)
//! - $2000-$2007: PPU registers ($2008-$3FFF mirrors)
//! - $4000-$4017: APU and I/O
//! - $4020-$FFFF: cartridge (consulted before everything below the
//!   PPU/APU/IO window)

use crate::apu::Apu;
use crate::cartridge::Cartridge;
use crate::controller::{Controller, Zapper};
use crate::ppu::Ppu;
use emu_core::Bus;

/// The NES bus: RAM, PPU, APU, cartridge and input devices.
pub struct NesBus {
    pub ram: [u8; 2048],
    pub ppu: Ppu,
    pub apu: Apu,
    pub cartridge: Option<Cartridge>,
    pub controllers: [Controller; 2],
    pub zapper: Zapper,
    /// Page latched by a $4014 write, serviced by the system tick.
    pub(crate) oam_dma_page: Option<u8>,
}

impl NesBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: [0; 2048],
            ppu: Ppu::new(),
            apu: Apu::new(),
            cartridge: None,
            controllers: [Controller::new(), Controller::new()],
            zapper: Zapper::new(),
            oam_dma_page: None,
        }
    }

    /// Advance the PPU one dot.
    pub(crate) fn tick_ppu(&mut self) {
        if let Some(cart) = self.cartridge.as_mut() {
            self.ppu.tick(cart);
        }
    }

    /// Read RAM without side effects.
    #[must_use]
    pub fn peek_ram(&self, addr: u16) -> u8 {
        self.ram[usize::from(addr & 0x07FF)]
    }

    fn read_controller(&mut self, port: usize, read_only: bool) -> u8 {
        let mut data = if read_only {
            self.controllers[port].peek()
        } else {
            self.controllers[port].read()
        } & 0x01;

        if port == 1 {
            let light = match self.zapper.aim() {
                Some((x, y)) => self.zapper.senses_light(self.ppu.sample_pixel(x, y)),
                None => false,
            };
            data |= self.zapper.read_bits(light);
        }
        data
    }
}

impl Default for NesBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for NesBus {
    fn read(&mut self, addr: u16, read_only: bool) -> u8 {
        // The cartridge answers first ($6000+ in practice).
        if let Some(cart) = self.cartridge.as_ref() {
            if let Some(value) = cart.cpu_read(addr) {
                return value;
            }
        }

        match addr {
            0x0000..=0x1FFF => self.ram[usize::from(addr & 0x07FF)],
            0x2000..=0x3FFF => match self.cartridge.as_mut() {
                Some(cart) => self.ppu.cpu_read(addr & 0x0007, cart, read_only),
                None => 0,
            },
            0x4015 => self.apu.cpu_read(addr, read_only),
            0x4016 => self.read_controller(0, read_only),
            0x4017 => self.read_controller(1, read_only),
            _ => 0x00,
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        if let Some(cart) = self.cartridge.as_mut() {
            let outcome = cart.cpu_write(addr, value);
            if let Some(mirror) = outcome.mirror_changed {
                self.ppu.set_mirror_mode(mirror);
            }
            if outcome.handled {
                return;
            }
        }

        match addr {
            0x0000..=0x1FFF => self.ram[usize::from(addr & 0x07FF)] = value,
            0x2000..=0x3FFF => {
                if let Some(cart) = self.cartridge.as_mut() {
                    self.ppu.cpu_write(addr & 0x0007, value, cart);
                }
            }
            0x4014 => self.oam_dma_page = Some(value),
            0x4016 => {
                let strobe = value & 0x01 != 0;
                for controller in &mut self.controllers {
                    controller.set_strobe(strobe);
                }
            }
            0x4000..=0x4013 | 0x4015 | 0x4017 => self.apu.cpu_write(addr, value),
            _ => {}
        }
    }
}
