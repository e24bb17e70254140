use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A console-space address: 8-bit bank plus 16-bit offset within the bank.
///
/// Ordering compares bank first, then offset. For the canonical addresses
/// produced by [`AddressMapper::to_address`] under LoROM and HiROM this is the
/// same order as the linear ROM offset.
///
/// [`AddressMapper::to_address`]: crate::mapping::AddressMapper::to_address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub bank: u8,
    pub offset: u16,
}

impl Address {
    pub const fn new(bank: u8, offset: u16) -> Self {
        Self { bank, offset }
    }

    /// Build from a packed 24-bit value (`$BBHHLL`). Bits above 24 are ignored.
    pub const fn from_u24(value: u32) -> Self {
        Self { bank: ((value >> 16) & 0xFF) as u8, offset: (value & 0xFFFF) as u16 }
    }

    pub const fn to_u24(self) -> u32 {
        ((self.bank as u32) << 16) | self.offset as u32
    }

    /// Same bank, offset moved by `delta` with 16-bit wrap-around.
    ///
    /// Program-counter arithmetic on the 65816 never carries into the bank.
    pub fn wrapping_add(self, delta: i32) -> Self {
        Self { bank: self.bank, offset: (self.offset as i32).wrapping_add(delta) as u16 }
    }

    pub const fn with_offset(self, offset: u16) -> Self {
        Self { bank: self.bank, offset }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:02X}:{:04X}", self.bank, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot parse '{0}' as a bank:offset address")]
pub struct AddressParseError(pub String);

impl FromStr for Address {
    type Err = AddressParseError;

    /// Accepts `$BB:HHLL`, `BB:HHLL`, `$BBHHLL`, `BBHHLL` and `0xBBHHLL`.
    /// Four hex digits alone are taken as bank `$00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddressParseError(s.to_string());
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix('$')
            .or_else(|| trimmed.strip_prefix("0x"))
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if let Some((bank, offset)) = body.split_once(':') {
            let bank = u8::from_str_radix(bank, 16).map_err(|_| err())?;
            let offset = u16::from_str_radix(offset, 16).map_err(|_| err())?;
            return Ok(Address::new(bank, offset));
        }

        match body.len() {
            1..=4 => u16::from_str_radix(body, 16).map(|o| Address::new(0, o)).map_err(|_| err()),
            5 | 6 => u32::from_str_radix(body, 16).map(Address::from_u24).map_err(|_| err()),
            _ => Err(err()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_supported_spellings() {
        let expected = Address::new(0xC0, 0x8000);
        for text in ["$C0:8000", "C0:8000", "$C08000", "C08000", "0xC08000"] {
            assert_eq!(text.parse::<Address>().unwrap(), expected, "{text}");
        }
        assert_eq!("$1234".parse::<Address>().unwrap(), Address::new(0, 0x1234));
        assert!("$C0:80000".parse::<Address>().is_err());
        assert!("nonsense".parse::<Address>().is_err());
    }

    #[test]
    fn display_and_u24_round_trip() {
        let addr = Address::from_u24(0x7E_1234);
        assert_eq!(addr.to_string(), "$7E:1234");
        assert_eq!(addr.to_u24(), 0x7E_1234);
    }

    #[test]
    fn wrapping_add_stays_in_bank() {
        let addr = Address::new(0x80, 0xFFFE);
        assert_eq!(addr.wrapping_add(4), Address::new(0x80, 0x0002));
        assert_eq!(Address::new(0x80, 0x0001).wrapping_add(-2), Address::new(0x80, 0xFFFF));
    }
}
