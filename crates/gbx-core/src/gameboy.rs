use crate::{
    cartridge::{Cartridge, CartridgeError},
    cpu::Cpu,
    hardware::{Button, ColorMode},
    host::{AudioSink, VideoSink},
    input::ButtonState,
    mmu::Mmu,
};

/// A whole machine: CPU plus the bus that owns every other device. The
/// driver calls [`step`](System::step) in a loop and paces itself off
/// [`frames_completed`](System::frames_completed).
pub struct System {
    pub cpu: Cpu,
    pub mmu: Mmu,
    mode: ColorMode,
}

impl System {
    /// Build a machine around a ROM image. `save` restores battery-backed
    /// RAM (and the RTC for MBC3 carts); construction fails on a malformed
    /// header or a save blob of the wrong size.
    pub fn new(rom: &[u8], save: Option<&[u8]>, mode: ColorMode) -> Result<Self, CartridgeError> {
        let cart = Cartridge::new(rom.to_vec(), save)?;
        log::info!(
            "loaded {:?} ({:?}, cgb: {})",
            cart.title,
            cart.mbc_type(),
            cart.cgb
        );
        let mut mmu = Mmu::new(mode);
        mmu.load_cart(cart);
        Ok(Self {
            cpu: Cpu::new(mode.is_cgb()),
            mmu,
            mode,
        })
    }

    /// Install a boot ROM and rewind to the power-on state so it executes
    /// from 0x0000.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.mmu.load_boot_rom(data);
        self.cpu = Cpu::new_power_on();
    }

    /// Run one CPU instruction (a variable number of M-cycles; every other
    /// device advances in lockstep inside the bus).
    pub fn step(&mut self) {
        self.cpu.step(&mut self.mmu);
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.mmu.input.state().set(button, pressed);
    }

    /// Thread-safe handle the driver may update between steps.
    pub fn button_handle(&self) -> ButtonState {
        self.mmu.input.state()
    }

    pub fn connect_video(&mut self, sink: Box<dyn VideoSink>) {
        self.mmu.ppu.connect_sink(sink);
    }

    pub fn connect_audio(&mut self, sink: Box<dyn AudioSink>) {
        self.mmu.apu.connect_sink(sink);
    }

    /// Battery-backed RAM plus RTC trailer, or `None` for carts without a
    /// battery.
    pub fn save_ram(&mut self) -> Option<Vec<u8>> {
        self.mmu.cart.as_mut().and_then(|c| c.save_data())
    }

    pub fn frames_completed(&self) -> u64 {
        self.mmu.ppu.frames()
    }

    pub fn frame_ready(&self) -> bool {
        self.mmu.ppu.frame_ready()
    }

    pub fn clear_frame_flag(&mut self) {
        self.mmu.ppu.clear_frame_flag()
    }

    /// Drain the serial output captured since the last call.
    pub fn take_serial(&mut self) -> Vec<u8> {
        self.mmu.take_serial()
    }

    /// Power-cycle while keeping the cartridge and boot ROM.
    pub fn reset(&mut self) {
        let cart = self.mmu.cart.take();
        let boot = self.mmu.boot_rom.take();
        self.cpu = Cpu::new(self.mode.is_cgb());
        self.mmu = Mmu::new(self.mode);
        if let Some(cart) = cart {
            self.mmu.load_cart(cart);
        }
        if let Some(boot) = boot {
            self.load_boot_rom(boot);
        }
    }
}
