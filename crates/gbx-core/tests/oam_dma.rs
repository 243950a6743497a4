//! OAM DMA engine corner cases: restart timing, write conflicts, source
//! redirection.

use gbx_core::{hardware::ColorMode, mmu::Mmu};

fn mmu_with_patterns() -> Mmu {
    let mut mmu = Mmu::new(ColorMode::Dmg);
    mmu.write_byte(0xFF40, 0x00);
    for i in 0..0x100u16 {
        mmu.write_byte(0xC000 + i, i as u8);
        mmu.write_byte(0xC100 + i, i as u8 ^ 0xFF);
    }
    mmu
}

#[test]
fn restart_mid_transfer_switches_source() {
    let mut mmu = mmu_with_patterns();
    mmu.write_byte(0xFF46, 0xC0);
    for _ in 0..10 {
        mmu.idle();
    }
    assert!(mmu.oam_dma_running());
    // Retarget while running; the replacement takes over the whole OAM.
    mmu.write_byte(0xFF46, 0xC1);
    for _ in 0..162 {
        mmu.idle();
    }
    assert!(!mmu.oam_dma_running());
    for i in 0..0xA0usize {
        assert_eq!(mmu.ppu.oam[i], (i as u8) ^ 0xFF);
    }
}

#[test]
fn cpu_writes_on_the_dma_bus_are_dropped() {
    let mut mmu = mmu_with_patterns();
    mmu.write_byte(0xFF46, 0xC0);
    mmu.idle();
    mmu.idle();
    mmu.idle();
    assert!(mmu.oam_dma_running());
    // This write targets the same external bus the engine is reading.
    mmu.write_byte(0xC080, 0x99);
    while mmu.oam_dma_running() {
        mmu.idle();
    }
    assert_eq!(mmu.read_byte(0xC080), 0x80, "conflicted write was lost");
}

#[test]
fn hram_stays_writable_during_transfer() {
    let mut mmu = mmu_with_patterns();
    mmu.write_byte(0xFF46, 0xC0);
    mmu.idle();
    mmu.idle();
    mmu.idle();
    mmu.write_byte(0xFF85, 0x5A);
    assert!(mmu.oam_dma_running());
    assert_eq!(mmu.read_byte(0xFF85), 0x5A);
}

#[test]
fn transfer_takes_160_cycles_after_setup() {
    let mut mmu = mmu_with_patterns();
    mmu.write_byte(0xFF46, 0xC0);
    // Setup delay: nothing lands during the first cycle.
    mmu.idle();
    assert_eq!(mmu.ppu.oam[1], 0x00);
    mmu.idle();
    mmu.idle();
    assert_eq!(mmu.ppu.oam[1], 0x01, "byte 1 lands on the fourth cycle");

    let mut cycles = 3;
    while mmu.oam_dma_running() {
        mmu.idle();
        cycles += 1;
    }
    assert_eq!(cycles, 161, "2 setup cycles + 160 byte cycles");
}
