mod common;

use common::{rom_with_program, CountingVideo};
use gbx_core::{Button, ColorMode, System};

#[test]
fn serial_output_is_captured() {
    common::init_logging();
    // Send one byte over the link, then spin.
    let rom = rom_with_program(&[
        0x3E, 0x5A, // LD A,0x5A
        0xE0, 0x01, // LDH (SB),A
        0x3E, 0x81, // LD A,0x81
        0xE0, 0x02, // LDH (SC),A -> start transfer
        0x18, 0xFE, // JR -2
    ]);
    let mut system = System::new(&rom, None, ColorMode::Dmg).unwrap();
    for _ in 0..10_000 {
        system.step();
    }
    assert_eq!(system.take_serial(), vec![0x5A]);
}

#[test]
fn frames_emit_full_screens() {
    let rom = rom_with_program(&[0x18, 0xFE]);
    let mut system = System::new(&rom, None, ColorMode::Dmg).unwrap();
    let (sink, stats) = CountingVideo::new();
    system.connect_video(Box::new(sink));

    while system.frames_completed() < 3 {
        system.step();
    }
    let stats = stats.lock().unwrap();
    assert_eq!(stats.ended, 3);
    assert!(stats.begun >= 3);
    for &pixels in &stats.per_frame {
        assert_eq!(pixels, 160 * 144);
    }
}

#[test]
fn frame_ready_flag_latches_until_cleared() {
    let rom = rom_with_program(&[0x18, 0xFE]);
    let mut system = System::new(&rom, None, ColorMode::Dmg).unwrap();
    while !system.frame_ready() {
        system.step();
    }
    assert_eq!(system.frames_completed(), 1);
    system.clear_frame_flag();
    assert!(!system.frame_ready());
}

#[test]
fn vblank_interrupt_reaches_the_vector() {
    // Enable the VBlank interrupt and count entries at 0x0040 in HRAM.
    let rom = rom_with_program(&[
        0x3E, 0x01, // LD A,1
        0xE0, 0xFF, // LDH (IE),A
        0xAF, 0x00, // XOR A (clear pending via IF below)
        0xE0, 0x0F, // LDH (IF),A
        0xFB, // EI
        0x18, 0xFE, // JR -2
    ]);
    let mut system = System::new(&rom, None, ColorMode::Dmg).unwrap();
    // Vector 0x0040 sits in ROM and reads as zeros (NOPs), so execution
    // falls through harmlessly; just watch PC hit the vector.
    let mut vectored = false;
    for _ in 0..40_000 {
        system.step();
        if system.cpu.pc == 0x0040 {
            vectored = true;
            break;
        }
    }
    assert!(vectored, "VBlank never dispatched");
}

#[test]
fn buttons_reach_the_joypad_register() {
    // Select the d-pad row and read P1 into HRAM forever.
    let rom = rom_with_program(&[
        0x3E, 0x20, // LD A,0x20 (select directions)
        0xE0, 0x00, // LDH (P1),A
        0xF0, 0x00, // LDH A,(P1)
        0xE0, 0x80, // LDH (0xFF80),A
        0x18, 0xFA, // JR -6 (back to the read)
    ]);
    let mut system = System::new(&rom, None, ColorMode::Dmg).unwrap();
    for _ in 0..100 {
        system.step();
    }
    system.set_button(Button::Right, true);
    for _ in 0..100 {
        system.step();
    }
    let p1 = system.mmu.read_byte(0xFF80);
    assert_eq!(p1 & 0x01, 0, "Right reads low while pressed");
    system.set_button(Button::Right, false);
    for _ in 0..100 {
        system.step();
    }
    let p1 = system.mmu.read_byte(0xFF80);
    assert_eq!(p1 & 0x0F, 0x0F);
}

#[test]
fn save_ram_round_trips_through_system() {
    // MBC1+RAM+battery cart: enable RAM, store a byte, pull the save.
    let mut rom = rom_with_program(&[
        0x3E, 0x0A, // LD A,0x0A
        0xEA, 0x00, 0x00, // LD (0x0000),A -> RAM enable
        0x3E, 0x77, // LD A,0x77
        0xEA, 0x34, 0xA2, // LD (0xA234),A
        0x18, 0xFE, // JR -2
    ]);
    rom[0x0147] = 0x03; // MBC1+RAM+BATTERY
    rom[0x0149] = 0x02; // 8 KiB
    let mut sum = 0u8;
    for i in 0x0134..0x014D {
        sum = sum.wrapping_sub(rom[i]).wrapping_sub(1);
    }
    rom[0x014D] = sum;

    let mut system = System::new(&rom, None, ColorMode::Dmg).unwrap();
    for _ in 0..100 {
        system.step();
    }
    let save = system.save_ram().expect("battery cart produces a save");
    assert_eq!(save.len(), 0x2000);
    assert_eq!(save[0x0234], 0x77);

    let mut reloaded = System::new(&rom, Some(&save), ColorMode::Dmg).unwrap();
    reloaded.mmu.write_byte(0x0000, 0x0A);
    assert_eq!(reloaded.mmu.read_byte(0xA234), 0x77);
}

#[test]
fn cycle_count_accumulates_per_instruction() {
    let rom = rom_with_program(&[0x18, 0xFE]);
    let mut system = System::new(&rom, None, ColorMode::Dmg).unwrap();
    system.step();
    assert_eq!(system.cpu.cycles, 3, "JR taken is 3 M-cycles");
    system.step();
    assert_eq!(system.cpu.cycles, 6);
}
