use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::hardware::Button;

/// Cloneable handle the driver uses to update button state between steps.
///
/// The byte layout matches [`Button::mask`]: a set bit means pressed. The
/// core snapshots it on every P1 read, so updates from another thread are
/// picked up at the next memory access.
#[derive(Clone, Default)]
pub struct ButtonState(Arc<AtomicU8>);

impl ButtonState {
    pub fn set(&self, button: Button, pressed: bool) {
        if pressed {
            self.0.fetch_or(button.mask(), Ordering::Relaxed);
        } else {
            self.0.fetch_and(!button.mask(), Ordering::Relaxed);
        }
    }

    pub fn pressed(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Joypad register (P1, 0xFF00).
///
/// Two output lines select which button row drives the low nibble; a low
/// select reads the row, inverted (0 = pressed). A high-to-low transition on
/// any selected input raises the joypad interrupt.
pub struct Input {
    buttons: ButtonState,
    /// Select lines as written (bits 4-5), bits 6-7 forced high.
    select: u8,
    /// Low nibble as last presented, for edge detection.
    last_lines: u8,
}

impl Input {
    pub fn new() -> Self {
        Self {
            buttons: ButtonState::default(),
            select: 0x30,
            last_lines: 0x0F,
        }
    }

    /// Handle the driver can clone and poke from anywhere.
    pub fn state(&self) -> ButtonState {
        self.buttons.clone()
    }

    fn lines(&self) -> u8 {
        let pressed = self.buttons.pressed();
        let mut out = 0;
        // Select lines are active-low: bit 4 is the d-pad, bit 5 the
        // action buttons.
        if self.select & 0x10 == 0 {
            out |= pressed >> 4;
        }
        if self.select & 0x20 == 0 {
            out |= pressed & 0x0F;
        }
        !out & 0x0F
    }

    pub fn read(&mut self) -> u8 {
        let lines = self.lines();
        self.last_lines = lines;
        0xC0 | (self.select & 0x30) | lines
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }

    /// Re-evaluate the selected inputs and raise the joypad interrupt on any
    /// high-to-low transition. Called once per M-cycle by the bus.
    pub fn poll(&mut self, if_reg: &mut u8) {
        let lines = self.lines();
        if self.last_lines & !lines & 0x0F != 0 {
            *if_reg |= 0x10;
        }
        self.last_lines = lines;
    }

    /// True if any button of the pressed snapshot is down, regardless of the
    /// select lines. STOP wake-up tests this, not the P1 register image.
    pub fn any_pressed(&self) -> bool {
        self.buttons.pressed() != 0
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_row_reads_inverted() {
        let mut input = Input::new();
        input.state().set(Button::A, true);
        input.write(0x10); // action row (bit 5 low)
        assert_eq!(input.read() & 0x0F, 0x0E);
        input.write(0x20); // direction row only
        assert_eq!(input.read() & 0x0F, 0x0F);
    }

    #[test]
    fn press_on_selected_row_raises_interrupt() {
        let mut input = Input::new();
        input.write(0x10); // action row selected
        let mut if_reg = 0;
        input.poll(&mut if_reg);
        assert_eq!(if_reg, 0);

        input.state().set(Button::Start, true);
        input.poll(&mut if_reg);
        assert_eq!(if_reg & 0x10, 0x10);
    }

    #[test]
    fn press_on_deselected_row_is_silent() {
        let mut input = Input::new();
        input.write(0x30); // nothing selected
        let mut if_reg = 0;
        input.state().set(Button::Left, true);
        input.poll(&mut if_reg);
        assert_eq!(if_reg, 0);
    }
}
