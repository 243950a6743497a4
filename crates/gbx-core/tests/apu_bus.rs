//! APU behavior observed through the bus, with the frame sequencer clocked
//! by real divider edges.

use gbx_core::{hardware::ColorMode, mmu::Mmu};

fn mmu() -> Mmu {
    let mut mmu = Mmu::new(ColorMode::Dmg);
    mmu.write_byte(0xFF40, 0x00); // keep the PPU quiet
    mmu
}

#[test]
fn length_counter_expires_on_divider_schedule() {
    let mut mmu = mmu();
    mmu.write_byte(0xFF17, 0xF0); // ch2 DAC on
    mmu.write_byte(0xFF16, 0xC0 | (64 - 2)); // length 2
    mmu.write_byte(0xFF19, 0xC0); // trigger, counter enabled
    assert_eq!(mmu.read_byte(0xFF26) & 0x02, 0x02);

    // Two length ticks arrive within four sequencer periods: 4 * 8192 CPU
    // clocks is 8192 M-cycles.
    let mut cycles = 0u32;
    while mmu.read_byte(0xFF26) & 0x02 != 0 {
        mmu.idle();
        cycles += 1;
        assert!(cycles < 10_000, "length counter never expired");
    }
    assert!(cycles > 256, "expiry cannot beat the 512 Hz sequencer");
}

#[test]
fn div_reset_can_clock_the_sequencer() {
    let mut mmu = mmu();
    mmu.write_byte(0xFF17, 0xF0);
    mmu.write_byte(0xFF16, 0xC0 | (64 - 2)); // length 2
    mmu.write_byte(0xFF19, 0xC0);

    // Park the divider with the sequencer tap high, then let DIV writes
    // produce the falling edges instead of waiting out 8192 clocks.
    for _ in 0..4 {
        let mut guard = 0;
        while mmu.timer.div & 0x1000 == 0 {
            mmu.idle();
            guard += 1;
            assert!(guard < 2000);
        }
        mmu.write_byte(0xFF04, 0x00);
    }
    assert_eq!(
        mmu.read_byte(0xFF26) & 0x02,
        0x00,
        "four forced steps include two length ticks"
    );
}

#[test]
fn apu_registers_expose_unused_bits_high() {
    let mut mmu = mmu();
    assert_eq!(mmu.read_byte(0xFF10) & 0x80, 0x80, "NR10 bit 7");
    assert_eq!(mmu.read_byte(0xFF15), 0xFF, "hole below NR21");
    assert_eq!(mmu.read_byte(0xFF1F), 0xFF, "hole below NR41");
    assert_eq!(mmu.read_byte(0xFF26) & 0x70, 0x70, "NR52 middle bits");
    assert_eq!(mmu.read_byte(0xFF13), 0xFF, "write-only frequency low");
}

#[test]
fn wave_ram_round_trips_through_the_bus_when_idle() {
    let mut mmu = mmu();
    for i in 0..16u16 {
        mmu.write_byte(0xFF30 + i, (i as u8) << 4 | 0x0F - i as u8);
    }
    for i in 0..16u16 {
        assert_eq!(mmu.read_byte(0xFF30 + i), (i as u8) << 4 | 0x0F - i as u8);
    }
}
