use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Errors surfaced while constructing a cartridge. Everything after
/// construction is emulated silently, quirks included.
#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("ROM image too small for a cartridge header ({0} bytes)")]
    RomTooSmall(usize),
    #[error("unsupported cartridge type byte {0:#04x}")]
    UnsupportedMapper(u8),
    #[error("ROM size byte promises {expected} bytes, image has {found}")]
    RomSizeMismatch { expected: usize, found: usize },
    #[error("save data is {found} bytes, cartridge expects {expected}")]
    SaveSizeMismatch { expected: usize, found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
    Mmm01,
}

/// Per-mapper banking state. Register widths follow the wiring of each
/// controller; writes mask off bits outside the documented fields.
#[derive(Debug)]
enum MbcState {
    RomOnly,
    Mbc1 {
        rom_lo: u8,
        rom_hi: u8,
        ram_enable: bool,
        mode: bool,
        multicart: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        bank_sel: u8,
        ram_enable: bool,
        latch_pending: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
    Mmm01 {
        mapped: bool,
        rom_lo: u8,
        rom_mid: u8,
        rom_hi: u8,
        ram_bank: u8,
        mode: bool,
        mode_lock: bool,
        multiplex: bool,
        /// Bank-number bits frozen at map time (over the 9-bit bank).
        rom_mask: u16,
        /// RAM-bank bits frozen at map time.
        ram_mask: u8,
        ram_enable: bool,
    },
}

const CYCLES_PER_SECOND: u32 = 4_194_304;
const RTC_TRAILER_LEN: usize = 48;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.seconds & 0x3F,
            0x09 => self.minutes & 0x3F,
            0x0A => self.hours & 0x1F,
            0x0B => self.days as u8,
            0x0C => {
                let mut out = ((self.days >> 8) as u8) & 0x01;
                if self.halt {
                    out |= 0x40;
                }
                if self.carry {
                    out |= 0x80;
                }
                out
            }
            _ => 0xFF,
        }
    }

    fn write(&mut self, reg: u8, val: u8) {
        match reg {
            0x08 => self.seconds = val & 0x3F,
            0x09 => self.minutes = val & 0x3F,
            0x0A => self.hours = val & 0x1F,
            0x0B => self.days = (self.days & 0x0100) | val as u16,
            0x0C => {
                self.days = (self.days & 0x00FF) | (((val & 0x01) as u16) << 8);
                self.halt = val & 0x40 != 0;
                self.carry = val & 0x80 != 0;
            }
            _ => {}
        }
    }
}

/// MBC3 real-time clock: live counters ticked by the emulated clock, a
/// latched copy for consistent multi-byte reads, and the wall-clock moment
/// the counters were last in sync with the outside world.
#[derive(Debug, Clone)]
struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    epoch: u64,
    subsecond: u32,
}

impl Rtc {
    fn new() -> Self {
        Self {
            regs: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            epoch: now_unix(),
            subsecond: 0,
        }
    }

    fn latch(&mut self) {
        self.latched = self.regs;
    }

    fn step(&mut self, cycles: u32) {
        if self.regs.halt {
            return;
        }
        self.subsecond += cycles;
        while self.subsecond >= CYCLES_PER_SECOND {
            self.subsecond -= CYCLES_PER_SECOND;
            self.advance_seconds(1);
        }
    }

    fn advance_seconds(&mut self, seconds: u64) {
        // Out-of-range values written by the program tick through their
        // 6/5-bit fields rather than snapping to a calendar.
        let mut left = seconds;
        while left > 0 {
            let sec = self.regs.seconds as u64;
            let until_minute = if sec <= 59 { 60 - sec } else { 64 - sec + 60 };
            if left < until_minute {
                self.regs.seconds = ((sec + left) & 0x3F) as u8;
                return;
            }
            left -= until_minute;
            self.regs.seconds = 0;
            self.tick_minute();
        }
    }

    fn tick_minute(&mut self) {
        let wrap = self.regs.minutes == 59;
        self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        if wrap {
            self.regs.minutes = 0;
            let wrap = self.regs.hours == 23;
            self.regs.hours = (self.regs.hours + 1) & 0x1F;
            if wrap {
                self.regs.hours = 0;
                if self.regs.days >= 0x01FF {
                    // 512-day overflow: counter wraps, carry is sticky.
                    self.regs.days = 0;
                    self.regs.carry = true;
                } else {
                    self.regs.days += 1;
                }
            }
        }
    }

    /// Catch up with wall time elapsed since the stored epoch.
    fn sync_from_epoch(&mut self) {
        let now = now_unix();
        let elapsed = now.saturating_sub(self.epoch);
        self.epoch = now;
        if !self.regs.halt && elapsed > 0 {
            // Anything past 512 days has already wrapped at least once.
            if elapsed >= 512 * 86_400 {
                self.regs.carry = true;
            }
            self.advance_seconds(elapsed);
        }
        self.latch();
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        for regs in [&self.regs, &self.latched] {
            for reg in 0x08..=0x0C {
                out.extend_from_slice(&(regs.read(reg) as u32).to_le_bytes());
            }
        }
        out.extend_from_slice(&self.epoch.to_le_bytes());
    }

    fn deserialize(data: &[u8]) -> Self {
        let mut rtc = Self::new();
        let word = |i: usize| u32::from_le_bytes(data[i * 4..i * 4 + 4].try_into().unwrap()) as u8;
        for (slot, regs) in [&mut rtc.regs, &mut rtc.latched].into_iter().enumerate() {
            for (i, reg) in (0x08..=0x0C).enumerate() {
                regs.write(reg, word(slot * 5 + i));
            }
        }
        rtc.epoch = u64::from_le_bytes(data[40..48].try_into().unwrap());
        rtc
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rtc: Option<Rtc>,
    mbc: MbcType,
    state: MbcState,
    cart_type: u8,
    has_battery: bool,
    /// CGB support flag from the header (0x80 dual, 0xC0 CGB-only).
    pub cgb: bool,
    pub title: String,
}

impl Cartridge {
    /// Parse the header and build the mapper. `save` restores
    /// battery-backed RAM (with the RTC trailer for MBC3+RTC carts) and must
    /// match the header-declared size exactly.
    pub fn new(rom: Vec<u8>, save: Option<&[u8]>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&rom)?;
        let mbc = header.mbc_type()?;
        let expected_rom = header.rom_size();
        if rom.len() != expected_rom {
            return Err(CartridgeError::RomSizeMismatch {
                expected: expected_rom,
                found: rom.len(),
            });
        }
        if !header.checksum_ok() {
            log::warn!("cartridge header checksum mismatch for {:?}", header.title());
        }

        let has_rtc = matches!(header.cart_type(), 0x0F | 0x10);
        let ram_size = header.ram_size();
        let state = match mbc {
            MbcType::RomOnly => MbcState::RomOnly,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_lo: 1,
                rom_hi: 0,
                ram_enable: false,
                mode: false,
                multicart: detect_mbc1_multicart(&rom),
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                bank_sel: 0,
                ram_enable: false,
                latch_pending: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
            MbcType::Mmm01 => MbcState::Mmm01 {
                mapped: false,
                rom_lo: 1,
                rom_mid: 0,
                rom_hi: 0,
                ram_bank: 0,
                mode: false,
                mode_lock: false,
                multiplex: false,
                rom_mask: 0x1C0,
                ram_mask: 0,
                ram_enable: false,
            },
        };

        let mut cart = Self {
            ram: vec![0; ram_size],
            rtc: has_rtc.then(Rtc::new),
            mbc,
            state,
            cart_type: header.cart_type(),
            has_battery: header.has_battery(),
            cgb: header.cgb_supported(),
            title: header.title(),
            rom,
        };
        if let Some(save) = save {
            cart.restore_save(save)?;
        }
        Ok(cart)
    }

    fn restore_save(&mut self, save: &[u8]) -> Result<(), CartridgeError> {
        let expected = self.ram.len() + if self.rtc.is_some() { RTC_TRAILER_LEN } else { 0 };
        if save.len() != expected {
            return Err(CartridgeError::SaveSizeMismatch {
                expected,
                found: save.len(),
            });
        }
        let ram_len = self.ram.len();
        self.ram.copy_from_slice(&save[..ram_len]);
        if self.rtc.is_some() {
            let mut rtc = Rtc::deserialize(&save[self.ram.len()..]);
            rtc.sync_from_epoch();
            self.rtc = Some(rtc);
        }
        Ok(())
    }

    /// Battery-backed state as a flat blob, or `None` for carts without a
    /// battery. MBC3+RTC appends the 48-byte clock trailer.
    pub fn save_data(&mut self) -> Option<Vec<u8>> {
        if !self.has_battery {
            return None;
        }
        let mut out = self.ram.clone();
        if let Some(rtc) = self.rtc.as_mut() {
            rtc.epoch = now_unix();
            rtc.serialize(&mut out);
        }
        Some(out)
    }

    /// Advance the RTC by emulated CPU clocks.
    pub fn step_rtc(&mut self, cycles: u16) {
        if let Some(rtc) = self.rtc.as_mut() {
            rtc.step(cycles as u32);
        }
    }

    pub fn mbc_type(&self) -> MbcType {
        self.mbc
    }

    pub fn cart_type_byte(&self) -> u8 {
        self.cart_type
    }

    fn rom_byte(&self, offset: usize) -> u8 {
        // ROM sizes are powers of two, so the mask keeps every bank
        // arithmetic result in range.
        self.rom[offset & (self.rom.len() - 1)]
    }

    fn ram_byte(&self, offset: usize) -> u8 {
        if self.ram.is_empty() {
            0xFF
        } else {
            self.ram[offset % self.ram.len()]
        }
    }

    fn ram_byte_set(&mut self, offset: usize, val: u8) {
        if !self.ram.is_empty() {
            let len = self.ram.len();
            self.ram[offset % len] = val;
        }
    }

    /// Composite MMM01 bank register (9 bits), after multiplex routing.
    fn mmm01_banks(
        rom_lo: u8,
        rom_mid: u8,
        rom_hi: u8,
        ram_bank: u8,
        multiplex: bool,
    ) -> (u16, u8) {
        let (mid, ram) = if multiplex {
            (ram_bank, rom_mid)
        } else {
            (rom_mid, ram_bank)
        };
        let bank = ((rom_hi as u16) << 7) | ((mid as u16) << 5) | rom_lo as u16;
        (bank, ram)
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.read_rom_low(addr),
            0x4000..=0x7FFF => self.read_rom_high(addr),
            0xA000..=0xBFFF => self.read_ram(addr),
            _ => 0xFF,
        }
    }

    fn read_rom_low(&self, addr: u16) -> u8 {
        let offset = addr as usize & 0x3FFF;
        match &self.state {
            MbcState::RomOnly
            | MbcState::Mbc2 { .. }
            | MbcState::Mbc3 { .. }
            | MbcState::Mbc5 { .. } => self.rom_byte(offset),
            MbcState::Mbc1 {
                rom_hi,
                mode,
                multicart,
                ..
            } => {
                // In mode 1 the high bank bits swing the fixed window too.
                let bank = if *mode {
                    let shift = if *multicart { 4 } else { 5 };
                    (*rom_hi as usize) << shift
                } else {
                    0
                };
                self.rom_byte(bank * 0x4000 + offset)
            }
            MbcState::Mmm01 {
                mapped,
                rom_lo,
                rom_mid,
                rom_hi,
                ram_bank,
                multiplex,
                rom_mask,
                ..
            } => {
                if !*mapped {
                    // Menu firmware: the top 32 KiB occupies the whole window.
                    return self.rom_byte(self.rom.len().saturating_sub(0x8000) + offset);
                }
                let (bank, _) = Self::mmm01_banks(*rom_lo, *rom_mid, *rom_hi, *ram_bank, *multiplex);
                // The fixed window shows the mapped game's base bank: only
                // the frozen bits survive.
                let bank = (bank & *rom_mask) as usize;
                self.rom_byte(bank * 0x4000 + offset)
            }
        }
    }

    fn read_rom_high(&self, addr: u16) -> u8 {
        let offset = addr as usize & 0x3FFF;
        let bank = match &self.state {
            MbcState::RomOnly => 1,
            MbcState::Mbc1 {
                rom_lo,
                rom_hi,
                multicart,
                ..
            } => {
                if *multicart {
                    ((*rom_hi as usize) << 4) | (*rom_lo as usize & 0x0F)
                } else {
                    ((*rom_hi as usize) << 5) | *rom_lo as usize
                }
            }
            MbcState::Mbc2 { rom_bank, .. } => *rom_bank as usize,
            MbcState::Mbc3 { rom_bank, .. } => *rom_bank as usize,
            MbcState::Mbc5 { rom_bank, .. } => *rom_bank as usize,
            MbcState::Mmm01 {
                mapped,
                rom_lo,
                rom_mid,
                rom_hi,
                ram_bank,
                multiplex,
                rom_mask,
                ..
            } => {
                if !*mapped {
                    return self.rom_byte(self.rom.len().saturating_sub(0x4000) + offset);
                }
                let (bank, _) = Self::mmm01_banks(*rom_lo, *rom_mid, *rom_hi, *ram_bank, *multiplex);
                bank as usize
            }
        };
        self.rom_byte(bank * 0x4000 + offset)
    }

    fn read_ram(&self, addr: u16) -> u8 {
        let offset = addr as usize & 0x1FFF;
        match &self.state {
            MbcState::RomOnly => self.ram_byte(offset),
            MbcState::Mbc1 {
                ram_enable,
                rom_hi,
                mode,
                ..
            } => {
                if !*ram_enable {
                    return 0xFF;
                }
                let bank = if *mode { *rom_hi as usize } else { 0 };
                self.ram_byte(bank * 0x2000 + offset)
            }
            MbcState::Mbc2 { ram_enable, .. } => {
                if !*ram_enable {
                    return 0xFF;
                }
                // 512 half-bytes, mirrored; upper nibble floats high.
                0xF0 | (self.ram_byte(offset & 0x01FF) & 0x0F)
            }
            MbcState::Mbc3 {
                ram_enable,
                bank_sel,
                ..
            } => {
                if !*ram_enable {
                    return 0xFF;
                }
                match *bank_sel {
                    0x00..=0x03 => self.ram_byte((*bank_sel as usize) * 0x2000 + offset),
                    0x08..=0x0C => self
                        .rtc
                        .as_ref()
                        .map(|r| r.latched.read(*bank_sel))
                        .unwrap_or(0xFF),
                    _ => 0xFF,
                }
            }
            MbcState::Mbc5 {
                ram_enable,
                ram_bank,
                ..
            } => {
                if !*ram_enable {
                    return 0xFF;
                }
                self.ram_byte((*ram_bank as usize) * 0x2000 + offset)
            }
            MbcState::Mmm01 {
                ram_enable,
                rom_mid,
                ram_bank,
                mode,
                multiplex,
                ram_mask,
                ..
            } => {
                if !*ram_enable {
                    return 0xFF;
                }
                let (_, ram) = Self::mmm01_banks(0, *rom_mid, 0, *ram_bank, *multiplex);
                let bank = if *mode { ram } else { ram & *ram_mask };
                self.ram_byte((bank as usize) * 0x2000 + offset)
            }
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.write_rom(addr, val),
            0xA000..=0xBFFF => self.write_ram(addr, val),
            _ => {}
        }
    }

    /// ROM-range writes are mapper control only; the ROM itself is immutable.
    fn write_rom(&mut self, addr: u16, val: u8) {
        match &mut self.state {
            MbcState::RomOnly => {}
            MbcState::Mbc1 {
                rom_lo,
                rom_hi,
                ram_enable,
                mode,
                ..
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    *rom_lo = val & 0x1F;
                    if *rom_lo == 0 {
                        *rom_lo = 1;
                    }
                }
                0x4000..=0x5FFF => *rom_hi = val & 0x03,
                _ => *mode = val & 0x01 != 0,
            },
            MbcState::Mbc2 {
                rom_bank,
                ram_enable,
            } => {
                if addr <= 0x3FFF {
                    // Address bit 8 picks the register, not the range.
                    if addr & 0x0100 == 0 {
                        *ram_enable = val & 0x0F == 0x0A;
                    } else {
                        *rom_bank = val & 0x0F;
                        if *rom_bank == 0 {
                            *rom_bank = 1;
                        }
                    }
                }
            }
            MbcState::Mbc3 {
                rom_bank,
                bank_sel,
                ram_enable,
                latch_pending,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    *rom_bank = val & 0x7F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
                0x4000..=0x5FFF => *bank_sel = val & 0x0F,
                _ => {
                    // 0 then 1 latches the clock for tear-free reads.
                    let latch_now = val == 1 && *latch_pending;
                    *latch_pending = val == 0;
                    if latch_now {
                        if let Some(rtc) = self.rtc.as_mut() {
                            rtc.latch();
                        }
                    }
                }
            },
            MbcState::Mbc5 {
                rom_bank,
                ram_bank,
                ram_enable,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x2FFF => *rom_bank = (*rom_bank & 0x100) | val as u16,
                0x3000..=0x3FFF => *rom_bank = (*rom_bank & 0x0FF) | (((val & 0x01) as u16) << 8),
                0x4000..=0x5FFF => *ram_bank = val & 0x0F,
                _ => {}
            },
            MbcState::Mmm01 {
                mapped,
                rom_lo,
                rom_mid,
                rom_hi,
                ram_bank,
                mode,
                mode_lock,
                multiplex,
                rom_mask,
                ram_mask,
                ram_enable,
            } => match addr {
                0x0000..=0x1FFF => {
                    if !*mapped {
                        *ram_mask = (val >> 4) & 0x03;
                        if val & 0x40 != 0 {
                            *mapped = true;
                        }
                    }
                    *ram_enable = val & 0x0F == 0x0A;
                }
                0x2000..=0x3FFF => {
                    if !*mapped {
                        // Pre-map writes seed the whole low/mid field.
                        *rom_lo = val & 0x1F;
                        *rom_mid = (val >> 5) & 0x03;
                        if *rom_lo == 0 {
                            *rom_lo = 1;
                        }
                    } else {
                        // Frozen bits keep the pre-map value; zero promotes
                        // before the merge.
                        let mut lo = val & 0x1F;
                        if lo == 0 {
                            lo = 1;
                        }
                        let frozen = (*rom_mask & 0x1F) as u8;
                        *rom_lo = (*rom_lo & frozen) | (lo & !frozen);
                    }
                }
                0x4000..=0x5FFF => {
                    if !*mapped {
                        *ram_bank = val & 0x03;
                        *rom_hi = (val >> 2) & 0x03;
                        *mode_lock = val & 0x40 != 0;
                    } else {
                        *ram_bank = val & 0x03;
                    }
                }
                _ => {
                    if !*mapped {
                        *rom_mask = 0x1C0 | (val as u16 & 0x3C);
                        *multiplex = val & 0x40 != 0;
                    }
                    if !*mode_lock {
                        *mode = val & 0x01 != 0;
                    }
                }
            },
        }
    }

    fn write_ram(&mut self, addr: u16, val: u8) {
        let offset = addr as usize & 0x1FFF;
        match &self.state {
            MbcState::RomOnly => self.ram_byte_set(offset, val),
            MbcState::Mbc1 {
                ram_enable,
                rom_hi,
                mode,
                ..
            } => {
                if *ram_enable {
                    let bank = if *mode { *rom_hi as usize } else { 0 };
                    self.ram_byte_set(bank * 0x2000 + offset, val);
                }
            }
            MbcState::Mbc2 { ram_enable, .. } => {
                if *ram_enable {
                    self.ram_byte_set(offset & 0x01FF, val & 0x0F);
                }
            }
            MbcState::Mbc3 {
                ram_enable,
                bank_sel,
                ..
            } => {
                if !*ram_enable {
                    return;
                }
                match *bank_sel {
                    0x00..=0x03 => {
                        let bank = *bank_sel as usize;
                        self.ram_byte_set(bank * 0x2000 + offset, val);
                    }
                    0x08..=0x0C => {
                        let reg = *bank_sel;
                        if let Some(rtc) = self.rtc.as_mut() {
                            rtc.regs.write(reg, val);
                            if reg == 0x08 {
                                rtc.subsecond = 0;
                            }
                            rtc.latch();
                        }
                    }
                    _ => {}
                }
            }
            MbcState::Mbc5 {
                ram_enable,
                ram_bank,
                ..
            } => {
                if *ram_enable {
                    let bank = *ram_bank as usize;
                    self.ram_byte_set(bank * 0x2000 + offset, val);
                }
            }
            MbcState::Mmm01 {
                ram_enable,
                rom_mid,
                ram_bank,
                mode,
                multiplex,
                ram_mask,
                ..
            } => {
                if *ram_enable {
                    let (_, ram) = Self::mmm01_banks(0, *rom_mid, 0, *ram_bank, *multiplex);
                    let bank = if *mode { ram } else { ram & *ram_mask };
                    self.ram_byte_set((bank as usize) * 0x2000 + offset, val);
                }
            }
        }
    }
}

/// MBC1 multicarts can't be told apart from the header; the practical tell
/// is the Nintendo logo duplicated at the start of the image's second half.
fn detect_mbc1_multicart(rom: &[u8]) -> bool {
    if rom.len() < 0x40000 {
        return false;
    }
    let half = rom.len() / 2;
    let logo = &rom[0x0104..0x0134];
    if logo.iter().all(|&b| b == 0) {
        return false;
    }
    rom.get(half + 0x0104..half + 0x0134) == Some(logo)
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, CartridgeError> {
        if data.len() < 0x0150 {
            return Err(CartridgeError::RomTooSmall(data.len()));
        }
        Ok(Self { data })
    }

    fn title(&self) -> String {
        let mut slice = &self.data[0x0134..0x0143];
        if let Some(end) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..end];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cgb_supported(&self) -> bool {
        self.data[0x0143] & 0x80 != 0
    }

    fn cart_type(&self) -> u8 {
        self.data[0x0147]
    }

    fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Ok(MbcType::RomOnly),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x05 | 0x06 => Ok(MbcType::Mbc2),
            0x0B..=0x0D => Ok(MbcType::Mmm01),
            0x0F..=0x13 => Ok(MbcType::Mbc3),
            0x19..=0x1E => Ok(MbcType::Mbc5),
            other => Err(CartridgeError::UnsupportedMapper(other)),
        }
    }

    fn has_battery(&self) -> bool {
        matches!(
            self.cart_type(),
            0x03 | 0x06 | 0x09 | 0x0D | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    fn rom_size(&self) -> usize {
        0x8000 << (self.data[0x0148] & 0x0F)
    }

    fn ram_size(&self) -> usize {
        // MBC2 carries its internal 512 half-bytes regardless of the header.
        if matches!(self.cart_type(), 0x05 | 0x06) {
            return 0x200;
        }
        match self.data[0x0149] {
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        }
    }

    fn checksum_ok(&self) -> bool {
        let mut sum = 0u8;
        for &byte in &self.data[0x0134..0x014D] {
            sum = sum.wrapping_sub(byte).wrapping_sub(1);
        }
        sum == self.data[0x014D]
    }
}

/// Build a header-valid ROM image for tests, each 16 KiB bank stamped with
/// its own number at offset 0.
#[cfg(test)]
pub(crate) fn build_test_rom(cart_type: u8, rom_size_code: u8, ram_size_code: u8) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000 << rom_size_code];
    rom[0x0147] = cart_type;
    rom[0x0148] = rom_size_code;
    rom[0x0149] = ram_size_code;
    for (bank, chunk) in rom.chunks_mut(0x4000).enumerate() {
        chunk[0] = bank as u8;
        chunk[1] = (bank >> 8) as u8;
    }
    let mut sum = 0u8;
    for i in 0x0134..0x014D {
        sum = sum.wrapping_sub(rom[i]).wrapping_sub(1);
    }
    rom[0x014D] = sum;
    rom
}
