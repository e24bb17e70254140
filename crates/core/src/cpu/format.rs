use std::fmt;

use super::decoder::Instruction;
use super::opcodes::{AddressingMode, Mnemonic};
use crate::model::Address;

impl Instruction {
    /// Operand text in canonical 65816 syntax.
    ///
    /// `lookup` may name a control-transfer target; when it does, the label
    /// replaces the numeric operand.
    pub fn operand_text<F>(&self, lookup: F) -> String
    where
        F: Fn(Address) -> Option<String>,
    {
        if self.is_raw() {
            return self
                .encode()
                .iter()
                .map(|b| format!("${b:02X}"))
                .collect::<Vec<_>>()
                .join(",");
        }

        if let Some(target) = self.target() {
            if let Some(name) = lookup(target) {
                return name;
            }
        }

        let v = self.value.unwrap_or(0);
        let b = |n: usize| self.operand.get(n).copied().unwrap_or(0);
        match self.mode {
            AddressingMode::Implied => String::new(),
            AddressingMode::Accumulator => "A".to_string(),
            AddressingMode::ImmediateM | AddressingMode::ImmediateX | AddressingMode::Immediate8 => {
                if self.operand.len() == 2 {
                    format!("#${v:04X}")
                } else {
                    format!("#${v:02X}")
                }
            }
            AddressingMode::Direct => format!("${v:02X}"),
            AddressingMode::DirectX => format!("${v:02X},X"),
            AddressingMode::DirectY => format!("${v:02X},Y"),
            AddressingMode::DirectIndirect => format!("(${v:02X})"),
            AddressingMode::DirectIndexedIndirect => format!("(${v:02X},X)"),
            AddressingMode::DirectIndirectIndexed => format!("(${v:02X}),Y"),
            AddressingMode::DirectIndirectLong => format!("[${v:02X}]"),
            AddressingMode::DirectIndirectLongIndexed => format!("[${v:02X}],Y"),
            AddressingMode::Absolute => format!("${v:04X}"),
            AddressingMode::AbsoluteX => format!("${v:04X},X"),
            AddressingMode::AbsoluteY => format!("${v:04X},Y"),
            AddressingMode::AbsoluteLong => format!("${v:06X}"),
            AddressingMode::AbsoluteLongX => format!("${v:06X},X"),
            AddressingMode::AbsoluteIndirect => format!("(${v:04X})"),
            AddressingMode::AbsoluteIndexedIndirect => format!("(${v:04X},X)"),
            AddressingMode::AbsoluteIndirectLong => format!("[${v:04X}]"),
            AddressingMode::StackRelative => format!("${v:02X},S"),
            AddressingMode::StackRelativeIndirectIndexed => format!("(${v:02X},S),Y"),
            AddressingMode::Relative | AddressingMode::RelativeLong => match self.mnemonic {
                Mnemonic::PER => {
                    let target = self.next_address().wrapping_add(v as u16 as i16 as i32);
                    format!("${:04X}", target.offset)
                }
                _ => self.target().map(|t| format!("${:04X}", t.offset)).unwrap_or_default(),
            },
            AddressingMode::BlockMove => format!("${:02X},${:02X}", b(1), b(0)),
        }
    }

    /// Full assembly line with label substitution.
    pub fn render<F>(&self, lookup: F) -> String
    where
        F: Fn(Address) -> Option<String>,
    {
        let operand = self.operand_text(lookup);
        if operand.is_empty() {
            self.mnemonic.to_string()
        } else {
            format!("{} {}", self.mnemonic, operand)
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(|_| None))
    }
}
