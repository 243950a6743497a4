use crate::{
    apu::Apu, cartridge::Cartridge, hardware::ColorMode, input::Input, ppu::Ppu, serial::Serial,
    timer::Timer,
};

const WRAM_BANK_SIZE: usize = 0x1000;

/// Which physical bus an address lives on. OAM DMA monopolizes the bus it
/// reads from: CPU accesses on that bus observe the in-flight byte instead
/// of their target, while the other buses stay usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusTag {
    External,
    Video,
    Oam,
    Internal,
}

fn bus_tag(addr: u16) -> BusTag {
    match addr {
        0x0000..=0x7FFF | 0xA000..=0xFDFF => BusTag::External,
        0x8000..=0x9FFF => BusTag::Video,
        0xFE00..=0xFEFF => BusTag::Oam,
        0xFF00..=0xFFFF => BusTag::Internal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VramDmaMode {
    General,
    HBlank,
}

#[derive(Debug)]
struct HdmaState {
    /// Source pointer; only the upper 12 bits are writable.
    src: u16,
    /// Destination inside VRAM (0x8000 | offset & 0x1FF0).
    dst: u16,
    /// Remaining 16-byte blocks.
    blocks: u8,
    mode: VramDmaMode,
    active: bool,
    /// Set when an HBlank transfer was cancelled via FF55 bit 7.
    cancelled: bool,
}

/// The bus fabric. It owns every device and owns time: each `read_byte`,
/// `write_byte` or `idle` call is one M-cycle, split internally into
/// T-cycle sub-ticks for the PPU, timer, serial, APU and DMA engines.
pub struct Mmu {
    pub wram: [[u8; WRAM_BANK_SIZE]; 8],
    pub wram_bank: usize,
    pub hram: [u8; 0x7F],
    pub cart: Option<Cartridge>,
    pub boot_rom: Option<Vec<u8>>,
    pub boot_mapped: bool,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub serial: Serial,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub input: Input,
    pub key1: u8,
    cgb_mode: bool,

    // OAM DMA engine.
    dma_active: bool,
    dma_src: u16,
    /// Byte index; negative while the two-M-cycle start delay runs down.
    dma_count: i16,
    dma_bus: BusTag,
    /// Byte currently sitting on the DMA bus.
    dma_data: u8,

    hdma: HdmaState,
    /// M-cycles the CPU still owes for a general-purpose VRAM DMA.
    gdma_stall: u32,
}

impl Mmu {
    pub fn new(mode: ColorMode) -> Self {
        let cgb = mode.is_cgb();
        let mut timer = Timer::new();
        // Post-boot divider phase.
        timer.div = if cgb { 0x2678 } else { 0xABCC };
        Self {
            wram: [[0; WRAM_BANK_SIZE]; 8],
            wram_bank: 1,
            hram: [0; 0x7F],
            cart: None,
            boot_rom: None,
            boot_mapped: false,
            if_reg: 0x01,
            ie_reg: 0,
            serial: Serial::new(),
            ppu: Ppu::new(cgb),
            apu: Apu::new(cgb),
            timer,
            input: Input::new(),
            key1: 0,
            cgb_mode: cgb,
            dma_active: false,
            dma_src: 0,
            dma_count: 0,
            dma_bus: BusTag::Oam,
            dma_data: 0xFF,
            hdma: HdmaState {
                src: 0,
                dst: 0x8000,
                blocks: 0,
                mode: VramDmaMode::General,
                active: false,
                cancelled: false,
            },
            gdma_stall: 0,
        }
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb_mode
    }

    pub fn double_speed(&self) -> bool {
        self.key1 & 0x80 != 0
    }

    /// T-cycles per M-cycle at the current speed.
    fn dots_per_m(&self) -> u16 {
        if self.double_speed() { 2 } else { 4 }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        if self.cgb_mode && !cart.cgb {
            self.ppu.set_dmg_compat();
        }
        self.cart = Some(cart);
    }

    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.boot_rom = Some(data);
        self.boot_mapped = true;
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    /// One M-cycle with a bus read.
    pub fn read_byte(&mut self, addr: u16) -> u8 {
        self.apu.early_tick(self.dots_per_m());
        let transferring = self.dma_advance();
        let val = if transferring {
            match bus_tag(addr) {
                BusTag::Oam => 0xFF,
                tag if tag == self.dma_bus => self.dma_data,
                _ => self.read_raw(addr),
            }
        } else {
            self.read_raw(addr)
        };
        self.tick_devices();
        val
    }

    /// One M-cycle with a bus write.
    pub fn write_byte(&mut self, addr: u16, val: u8) {
        self.apu.early_tick(self.dots_per_m());
        let transferring = self.dma_advance();
        let blocked = transferring
            && match bus_tag(addr) {
                BusTag::Oam => true,
                tag => tag == self.dma_bus,
            };
        if !blocked {
            self.write_raw(addr, val);
        }
        self.tick_devices();
    }

    /// One M-cycle without a bus transaction.
    pub fn idle(&mut self) {
        self.apu.early_tick(self.dots_per_m());
        self.dma_advance();
        self.tick_devices();
    }

    /// Advance all clocked devices by one M-cycle worth of T-cycles.
    fn tick_devices(&mut self) {
        let double = self.double_speed();
        let dots = self.dots_per_m();

        // DIV runs on the CPU clock: four ticks per M-cycle at either speed.
        let prev_div = self.timer.div;
        self.timer.step(4, &mut self.if_reg);
        let curr_div = self.timer.div;

        self.serial.step(prev_div, curr_div, &mut self.if_reg);
        self.input.poll(&mut self.if_reg);
        if let Some(cart) = self.cart.as_mut() {
            cart.step_rtc(dots);
        }
        if self.ppu.step(dots, &mut self.if_reg) {
            self.hdma_hblank_transfer();
        }
        self.apu.cycle(dots, prev_div, curr_div, double);
    }

    /// Pure address decode, no time. Also the path DMA engines read through.
    fn read_raw(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x00FF if self.boot_mapped => self
                .boot_rom
                .as_ref()
                .and_then(|b| b.get(addr as usize).copied())
                .unwrap_or(0xFF),
            // The CGB boot ROM also overlays 0x0200-0x08FF, leaving the
            // header window visible.
            0x0200..=0x08FF if self.boot_mapped && self.cgb_mode => self
                .boot_rom
                .as_ref()
                .and_then(|b| b.get(addr as usize).copied())
                .unwrap_or(0xFF),
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_mut().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.read_vram(addr)
                } else {
                    0xFF
                }
            }
            0xC000..=0xCFFF | 0xE000..=0xEFFF => self.wram[0][(addr & 0x0FFF) as usize],
            0xD000..=0xDFFF | 0xF000..=0xFDFF => {
                self.wram[self.wram_bank][(addr & 0x0FFF) as usize]
            }
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize]
                } else {
                    0xFF
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF4B | 0xFF68..=0xFF6C => self.ppu.read_reg(addr),
            0xFF4D => {
                if self.cgb_mode {
                    (self.key1 & 0x81) | 0x7E
                } else {
                    0xFF
                }
            }
            0xFF4F => {
                if self.cgb_mode {
                    self.ppu.vram_bank as u8 | 0xFE
                } else {
                    0xFF
                }
            }
            0xFF51..=0xFF54 => {
                if !self.cgb_mode {
                    return 0xFF;
                }
                match addr {
                    0xFF51 => (self.hdma.src >> 8) as u8,
                    0xFF52 => self.hdma.src as u8,
                    0xFF53 => ((self.hdma.dst >> 8) & 0x1F) as u8,
                    _ => self.hdma.dst as u8,
                }
            }
            0xFF55 => {
                if !self.cgb_mode {
                    0xFF
                } else if self.hdma.active {
                    self.hdma.blocks.saturating_sub(1) & 0x7F
                } else if self.hdma.cancelled {
                    0x80
                } else {
                    0xFF
                }
            }
            0xFF70 => {
                if self.cgb_mode {
                    self.wram_bank as u8 | 0xF8
                } else {
                    0xFF
                }
            }
            0xFF76 | 0xFF77 => self.apu.read_pcm(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    fn write_raw(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.write_vram(addr, val);
                }
            }
            0xC000..=0xCFFF | 0xE000..=0xEFFF => {
                self.wram[0][(addr & 0x0FFF) as usize] = val;
            }
            0xD000..=0xDFFF | 0xF000..=0xFDFF => {
                self.wram[self.wram_bank][(addr & 0x0FFF) as usize] = val;
            }
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize] = val;
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04 => self.reset_div(),
            0xFF05..=0xFF07 => self.timer.write(addr, val, &mut self.if_reg),
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF40 => {
                let was_on = self.ppu.lcd_enabled();
                self.ppu.write_reg(addr, val, &mut self.if_reg);
                // HBlank DMA does not survive the LCD going dark.
                if was_on && !self.ppu.lcd_enabled() {
                    self.complete_active_hdma();
                }
            }
            0xFF41..=0xFF45 | 0xFF47..=0xFF4B | 0xFF68..=0xFF6C => {
                self.ppu.write_reg(addr, val, &mut self.if_reg);
            }
            0xFF46 => self.start_oam_dma(val),
            0xFF4D => {
                if self.cgb_mode {
                    self.key1 = (self.key1 & 0x80) | (val & 0x01);
                }
            }
            0xFF4F => {
                if self.cgb_mode {
                    self.ppu.vram_bank = (val & 0x01) as usize;
                }
            }
            0xFF50 => self.boot_mapped = false,
            0xFF51 => {
                if self.cgb_mode && !self.hdma.active {
                    self.hdma.src = ((val as u16) << 8) | (self.hdma.src & 0x00F0);
                }
            }
            0xFF52 => {
                if self.cgb_mode && !self.hdma.active {
                    self.hdma.src = (self.hdma.src & 0xFF00) | (val & 0xF0) as u16;
                }
            }
            0xFF53 => {
                if self.cgb_mode && !self.hdma.active {
                    self.hdma.dst = 0x8000 | (((val & 0x1F) as u16) << 8) | (self.hdma.dst & 0x00F0);
                }
            }
            0xFF54 => {
                if self.cgb_mode && !self.hdma.active {
                    self.hdma.dst = (self.hdma.dst & 0x9F00) | (val & 0xF0) as u16;
                }
            }
            0xFF55 => self.write_vram_dma_control(val),
            0xFF70 => {
                if self.cgb_mode {
                    let bank = (val & 0x07) as usize;
                    self.wram_bank = if bank == 0 { 1 } else { bank };
                }
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {}
        }
    }

    pub fn reset_div(&mut self) {
        let prev_div = self.timer.div;
        self.timer.reset_div(&mut self.if_reg);
        self.apu.on_div_reset(prev_div, self.double_speed());
    }

    /// STOP with KEY1 armed: toggle between normal and double speed. The
    /// caller resets DIV as part of the STOP sequence.
    pub fn switch_speed(&mut self) {
        self.key1 = (self.key1 ^ 0x80) & 0x80;
    }

    pub fn speed_switch_armed(&self) -> bool {
        self.cgb_mode && self.key1 & 0x01 != 0
    }

    // --- OAM DMA ---

    fn start_oam_dma(&mut self, val: u8) {
        self.ppu.dma = val;
        // Pages E0-FF fold down onto work RAM.
        let page = if val & 0xE0 == 0xE0 { val & 0xDF } else { val };
        self.dma_src = (page as u16) << 8;
        self.dma_bus = bus_tag(self.dma_src);
        // Two M-cycles of setup before the first byte moves; a restart
        // mid-transfer only takes one.
        self.dma_count = if self.dma_active { -1 } else { -2 };
        self.dma_active = true;
    }

    /// Move one byte if the engine is running. Called exactly once per
    /// M-cycle; returns true while bytes are actually on the bus.
    fn dma_advance(&mut self) -> bool {
        if !self.dma_active {
            return false;
        }
        self.dma_count += 1;
        if self.dma_count < 0 {
            return false;
        }
        let idx = self.dma_count as u16;
        let byte = self.read_raw(self.dma_src | idx);
        self.ppu.oam[idx as usize] = byte;
        self.dma_data = byte;
        if idx == 0x9F {
            self.dma_active = false;
        }
        true
    }

    pub fn oam_dma_running(&self) -> bool {
        self.dma_active
    }

    // --- CGB VRAM DMA (GDMA / HDMA) ---

    fn write_vram_dma_control(&mut self, val: u8) {
        if !self.cgb_mode {
            return;
        }
        if self.hdma.active && val & 0x80 == 0 {
            // Cancel a running HBlank transfer.
            self.hdma.active = false;
            self.hdma.blocks = 0;
            self.hdma.cancelled = true;
            return;
        }
        let blocks = (val & 0x7F) + 1;
        if val & 0x80 == 0 {
            self.run_gdma(blocks);
        } else {
            self.hdma.mode = VramDmaMode::HBlank;
            self.hdma.blocks = blocks;
            self.hdma.active = true;
            self.hdma.cancelled = false;
            if !self.ppu.lcd_enabled() || self.ppu.in_hblank() {
                self.hdma_hblank_transfer();
            }
        }
    }

    fn run_gdma(&mut self, blocks: u8) {
        self.hdma.mode = VramDmaMode::General;
        self.hdma.cancelled = false;
        for _ in 0..blocks {
            self.copy_hdma_block();
        }
        self.gdma_stall += blocks as u32 * self.vram_dma_block_cost();
    }

    /// One 16-byte burst at HBlank entry while an HBlank transfer is armed.
    pub fn hdma_hblank_transfer(&mut self) {
        if !(self.hdma.active && self.hdma.mode == VramDmaMode::HBlank) {
            return;
        }
        self.copy_hdma_block();
        self.hdma.blocks = self.hdma.blocks.saturating_sub(1);
        if self.hdma.blocks == 0 {
            self.hdma.active = false;
        }
        self.gdma_stall += self.vram_dma_block_cost();
    }

    fn copy_hdma_block(&mut self) {
        for _ in 0..0x10 {
            let byte = self.read_raw(self.hdma.src);
            // Straight into VRAM, ignoring mode-3 lockout; the CPU is
            // stalled while these bytes move.
            self.ppu.write_vram(self.hdma.dst, byte);
            self.hdma.src = self.hdma.src.wrapping_add(1);
            self.hdma.dst = 0x8000 | (self.hdma.dst.wrapping_add(1) & 0x1FFF);
        }
    }

    fn complete_active_hdma(&mut self) {
        while self.hdma.active && self.hdma.mode == VramDmaMode::HBlank {
            self.hdma_hblank_transfer();
        }
    }

    fn vram_dma_block_cost(&self) -> u32 {
        if self.double_speed() { 16 } else { 8 }
    }

    /// True while the CPU must stall for a VRAM DMA.
    pub fn vram_dma_stalled(&self) -> bool {
        self.gdma_stall > 0
    }

    pub fn vram_dma_stall_step(&mut self) {
        self.gdma_stall = self.gdma_stall.saturating_sub(1);
    }
}
