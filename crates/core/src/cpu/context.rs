use serde::{Deserialize, Serialize};

/// Status-register bit controlling accumulator width.
pub const FLAG_M: u8 = 0x20;
/// Status-register bit controlling index-register width.
pub const FLAG_X: u8 = 0x10;
pub const FLAG_C: u8 = 0x01;

/// Processor state that changes how bytes decode.
///
/// Passed by value into every decode; the decoder returns the successor
/// state instead of mutating anything shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessorContext {
    pub emulation: bool,
    /// Accumulator is 8 bits wide (M flag set).
    pub m8: bool,
    /// Index registers are 8 bits wide (X flag set).
    pub x8: bool,
    pub direct_page: u16,
    pub data_bank: u8,
    /// Carry flag when statically known; `XCE` swaps it with the emulation bit.
    #[serde(default)]
    pub carry: Option<bool>,
    /// Bank pushed by the most recent `PHK`/`PHB`, consumed by `PLB`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_bank: Option<u8>,
}

impl ProcessorContext {
    /// State after reset: emulation mode, 8-bit registers.
    pub fn reset() -> Self {
        Self {
            emulation: true,
            m8: true,
            x8: true,
            direct_page: 0,
            data_bank: 0,
            carry: None,
            pushed_bank: None,
        }
    }

    /// Native mode with the given register widths.
    pub fn native(m8: bool, x8: bool) -> Self {
        Self { emulation: false, m8, x8, ..Self::reset() }
    }

    pub fn accumulator_is_8bit(&self) -> bool {
        self.emulation || self.m8
    }

    pub fn index_is_8bit(&self) -> bool {
        self.emulation || self.x8
    }

    /// `REP #mask`: clear status bits. Width bits are pinned in emulation mode.
    pub fn rep(mut self, mask: u8) -> Self {
        if !self.emulation {
            if mask & FLAG_M != 0 {
                self.m8 = false;
            }
            if mask & FLAG_X != 0 {
                self.x8 = false;
            }
        }
        if mask & FLAG_C != 0 {
            self.carry = Some(false);
        }
        self
    }

    /// `SEP #mask`: set status bits.
    pub fn sep(mut self, mask: u8) -> Self {
        if mask & FLAG_M != 0 {
            self.m8 = true;
        }
        if mask & FLAG_X != 0 {
            self.x8 = true;
        }
        if mask & FLAG_C != 0 {
            self.carry = Some(true);
        }
        self
    }

    /// `XCE`: exchange carry and emulation. With unknown carry the mode is
    /// assumed to toggle, which is what boot code does in practice.
    pub fn xce(mut self) -> Self {
        let entering_emulation = self.carry.unwrap_or(!self.emulation);
        self.carry = Some(self.emulation);
        self.emulation = entering_emulation;
        if self.emulation {
            self.m8 = true;
            self.x8 = true;
        }
        self
    }

    /// Widths as they would appear in the status register.
    pub fn status_bits(&self) -> u8 {
        let mut bits = 0;
        if self.accumulator_is_8bit() {
            bits |= FLAG_M;
        }
        if self.index_is_8bit() {
            bits |= FLAG_X;
        }
        bits
    }
}

impl Default for ProcessorContext {
    fn default() -> Self {
        Self::reset()
    }
}
