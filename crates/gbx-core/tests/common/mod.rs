use std::sync::{Arc, Mutex};

use gbx_core::host::VideoSink;

/// Route core logs through the test harness.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Minimal header-valid ROM (32 KiB, no MBC) with `program` placed at the
/// entry point 0x0100.
pub fn rom_with_program(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    let mut sum = 0u8;
    for i in 0x0134..0x014D {
        sum = sum.wrapping_sub(rom[i]).wrapping_sub(1);
    }
    rom[0x014D] = sum;
    rom
}

#[derive(Default)]
pub struct FrameStats {
    pub pixels: usize,
    pub begun: u32,
    pub ended: u32,
    /// Pixels seen between the most recent begin/end pair.
    pub in_flight: usize,
    pub per_frame: Vec<usize>,
}

pub struct CountingVideo(pub Arc<Mutex<FrameStats>>);

impl CountingVideo {
    pub fn new() -> (Self, Arc<Mutex<FrameStats>>) {
        let stats = Arc::new(Mutex::new(FrameStats::default()));
        (Self(stats.clone()), stats)
    }
}

impl VideoSink for CountingVideo {
    fn begin_frame(&mut self) {
        let mut stats = self.0.lock().unwrap();
        stats.begun += 1;
        stats.in_flight = 0;
    }

    fn draw_pixel(&mut self, _palette_index: u8, _row: u8, _col: u8) {
        let mut stats = self.0.lock().unwrap();
        stats.pixels += 1;
        stats.in_flight += 1;
    }

    fn set_palette_mono(&mut self, _slot: u8, _packed: u8) {}

    fn set_palette_rgb(&mut self, _slot: u8, _lo: u8, _hi: u8) {}

    fn end_frame(&mut self) {
        let mut stats = self.0.lock().unwrap();
        stats.ended += 1;
        let pixels = stats.in_flight;
        stats.per_frame.push(pixels);
    }
}
