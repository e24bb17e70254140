//! The 65816 opcode table: one entry per opcode byte.

use serde::{Deserialize, Serialize};

use super::context::ProcessorContext;

macro_rules! mnemonics {
    ($($name:ident),* $(,)?) => {
        /// Instruction mnemonics. `Db` is the raw-data pseudo-instruction.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Mnemonic {
            $($name,)*
            Db,
        }

        impl Mnemonic {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Mnemonic::$name => stringify!($name),)*
                    Mnemonic::Db => ".db",
                }
            }
        }
    };
}

mnemonics!(
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRA, BRK, BRL, BVC, BVS, CLC, CLD, CLI, CLV,
    CMP, COP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JML, JMP, JSL, JSR, LDA, LDX, LDY, LSR,
    MVN, MVP, NOP, ORA, PEA, PEI, PER, PHA, PHB, PHD, PHK, PHP, PHX, PHY, PLA, PLB, PLD, PLP, PLX,
    PLY, REP, ROL, ROR, RTI, RTL, RTS, SBC, SEC, SED, SEI, SEP, STA, STP, STX, STY, STZ, TAX, TAY,
    TCD, TCS, TDC, TRB, TSB, TSC, TSX, TXA, TXS, TXY, TYA, TYX, WAI, WDM, XBA, XCE,
);

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operand-fetching scheme of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    Implied,
    Accumulator,
    /// Immediate sized by the accumulator width (M flag).
    ImmediateM,
    /// Immediate sized by the index width (X flag).
    ImmediateX,
    /// Always one byte: REP/SEP masks, BRK/COP/WDM signatures.
    Immediate8,
    Direct,
    DirectX,
    DirectY,
    DirectIndirect,
    DirectIndexedIndirect,
    DirectIndirectIndexed,
    DirectIndirectLong,
    DirectIndirectLongIndexed,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    AbsoluteLong,
    AbsoluteLongX,
    AbsoluteIndirect,
    AbsoluteIndexedIndirect,
    AbsoluteIndirectLong,
    StackRelative,
    StackRelativeIndirectIndexed,
    Relative,
    RelativeLong,
    BlockMove,
}

impl AddressingMode {
    /// Operand byte count before width resolution; width-sensitive modes report their 8-bit size.
    pub const fn base_operand_size(self) -> usize {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::ImmediateM
            | AddressingMode::ImmediateX
            | AddressingMode::Immediate8
            | AddressingMode::Direct
            | AddressingMode::DirectX
            | AddressingMode::DirectY
            | AddressingMode::DirectIndirect
            | AddressingMode::DirectIndexedIndirect
            | AddressingMode::DirectIndirectIndexed
            | AddressingMode::DirectIndirectLong
            | AddressingMode::DirectIndirectLongIndexed
            | AddressingMode::StackRelative
            | AddressingMode::StackRelativeIndirectIndexed
            | AddressingMode::Relative => 1,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::AbsoluteIndirect
            | AddressingMode::AbsoluteIndexedIndirect
            | AddressingMode::AbsoluteIndirectLong
            | AddressingMode::RelativeLong
            | AddressingMode::BlockMove => 2,
            AddressingMode::AbsoluteLong | AddressingMode::AbsoluteLongX => 3,
        }
    }

    /// Operand byte count under `context`.
    pub fn operand_size(self, context: &ProcessorContext) -> usize {
        match self {
            AddressingMode::ImmediateM if !context.accumulator_is_8bit() => 2,
            AddressingMode::ImmediateX if !context.index_is_8bit() => 2,
            other => other.base_operand_size(),
        }
    }

    pub fn is_width_sensitive(self) -> bool {
        matches!(self, AddressingMode::ImmediateM | AddressingMode::ImmediateX)
    }
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    /// Base cycle count, before width and page-crossing adjustments.
    pub cycles: u8,
    /// Reserved opcodes decode as raw data.
    pub reserved: bool,
}

impl OpcodeInfo {
    pub const fn base_operand_size(&self) -> usize {
        self.mode.base_operand_size()
    }
}

const fn op(opcode: u8, mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> OpcodeInfo {
    OpcodeInfo { opcode, mnemonic, mode, cycles, reserved: false }
}

/// Look up an opcode byte.
pub fn opcode_info(opcode: u8) -> &'static OpcodeInfo {
    &OPCODES[opcode as usize]
}

use AddressingMode as M;
use Mnemonic::*;

/// Indexed by opcode byte.
pub static OPCODES: [OpcodeInfo; 256] = [
    op(0x00, BRK, M::Immediate8, 7),
    op(0x01, ORA, M::DirectIndexedIndirect, 6),
    op(0x02, COP, M::Immediate8, 7),
    op(0x03, ORA, M::StackRelative, 4),
    op(0x04, TSB, M::Direct, 5),
    op(0x05, ORA, M::Direct, 3),
    op(0x06, ASL, M::Direct, 5),
    op(0x07, ORA, M::DirectIndirectLong, 6),
    op(0x08, PHP, M::Implied, 3),
    op(0x09, ORA, M::ImmediateM, 2),
    op(0x0A, ASL, M::Accumulator, 2),
    op(0x0B, PHD, M::Implied, 4),
    op(0x0C, TSB, M::Absolute, 6),
    op(0x0D, ORA, M::Absolute, 4),
    op(0x0E, ASL, M::Absolute, 6),
    op(0x0F, ORA, M::AbsoluteLong, 5),
    op(0x10, BPL, M::Relative, 2),
    op(0x11, ORA, M::DirectIndirectIndexed, 5),
    op(0x12, ORA, M::DirectIndirect, 5),
    op(0x13, ORA, M::StackRelativeIndirectIndexed, 7),
    op(0x14, TRB, M::Direct, 5),
    op(0x15, ORA, M::DirectX, 4),
    op(0x16, ASL, M::DirectX, 6),
    op(0x17, ORA, M::DirectIndirectLongIndexed, 6),
    op(0x18, CLC, M::Implied, 2),
    op(0x19, ORA, M::AbsoluteY, 4),
    op(0x1A, INC, M::Accumulator, 2),
    op(0x1B, TCS, M::Implied, 2),
    op(0x1C, TRB, M::Absolute, 6),
    op(0x1D, ORA, M::AbsoluteX, 4),
    op(0x1E, ASL, M::AbsoluteX, 7),
    op(0x1F, ORA, M::AbsoluteLongX, 5),
    op(0x20, JSR, M::Absolute, 6),
    op(0x21, AND, M::DirectIndexedIndirect, 6),
    op(0x22, JSL, M::AbsoluteLong, 8),
    op(0x23, AND, M::StackRelative, 4),
    op(0x24, BIT, M::Direct, 3),
    op(0x25, AND, M::Direct, 3),
    op(0x26, ROL, M::Direct, 5),
    op(0x27, AND, M::DirectIndirectLong, 6),
    op(0x28, PLP, M::Implied, 4),
    op(0x29, AND, M::ImmediateM, 2),
    op(0x2A, ROL, M::Accumulator, 2),
    op(0x2B, PLD, M::Implied, 5),
    op(0x2C, BIT, M::Absolute, 4),
    op(0x2D, AND, M::Absolute, 4),
    op(0x2E, ROL, M::Absolute, 6),
    op(0x2F, AND, M::AbsoluteLong, 5),
    op(0x30, BMI, M::Relative, 2),
    op(0x31, AND, M::DirectIndirectIndexed, 5),
    op(0x32, AND, M::DirectIndirect, 5),
    op(0x33, AND, M::StackRelativeIndirectIndexed, 7),
    op(0x34, BIT, M::DirectX, 4),
    op(0x35, AND, M::DirectX, 4),
    op(0x36, ROL, M::DirectX, 6),
    op(0x37, AND, M::DirectIndirectLongIndexed, 6),
    op(0x38, SEC, M::Implied, 2),
    op(0x39, AND, M::AbsoluteY, 4),
    op(0x3A, DEC, M::Accumulator, 2),
    op(0x3B, TSC, M::Implied, 2),
    op(0x3C, BIT, M::AbsoluteX, 4),
    op(0x3D, AND, M::AbsoluteX, 4),
    op(0x3E, ROL, M::AbsoluteX, 7),
    op(0x3F, AND, M::AbsoluteLongX, 5),
    op(0x40, RTI, M::Implied, 6),
    op(0x41, EOR, M::DirectIndexedIndirect, 6),
    OpcodeInfo { opcode: 0x42, mnemonic: WDM, mode: M::Immediate8, cycles: 2, reserved: true },
    op(0x43, EOR, M::StackRelative, 4),
    op(0x44, MVP, M::BlockMove, 7),
    op(0x45, EOR, M::Direct, 3),
    op(0x46, LSR, M::Direct, 5),
    op(0x47, EOR, M::DirectIndirectLong, 6),
    op(0x48, PHA, M::Implied, 3),
    op(0x49, EOR, M::ImmediateM, 2),
    op(0x4A, LSR, M::Accumulator, 2),
    op(0x4B, PHK, M::Implied, 3),
    op(0x4C, JMP, M::Absolute, 3),
    op(0x4D, EOR, M::Absolute, 4),
    op(0x4E, LSR, M::Absolute, 6),
    op(0x4F, EOR, M::AbsoluteLong, 5),
    op(0x50, BVC, M::Relative, 2),
    op(0x51, EOR, M::DirectIndirectIndexed, 5),
    op(0x52, EOR, M::DirectIndirect, 5),
    op(0x53, EOR, M::StackRelativeIndirectIndexed, 7),
    op(0x54, MVN, M::BlockMove, 7),
    op(0x55, EOR, M::DirectX, 4),
    op(0x56, LSR, M::DirectX, 6),
    op(0x57, EOR, M::DirectIndirectLongIndexed, 6),
    op(0x58, CLI, M::Implied, 2),
    op(0x59, EOR, M::AbsoluteY, 4),
    op(0x5A, PHY, M::Implied, 3),
    op(0x5B, TCD, M::Implied, 2),
    op(0x5C, JML, M::AbsoluteLong, 4),
    op(0x5D, EOR, M::AbsoluteX, 4),
    op(0x5E, LSR, M::AbsoluteX, 7),
    op(0x5F, EOR, M::AbsoluteLongX, 5),
    op(0x60, RTS, M::Implied, 6),
    op(0x61, ADC, M::DirectIndexedIndirect, 6),
    op(0x62, PER, M::RelativeLong, 6),
    op(0x63, ADC, M::StackRelative, 4),
    op(0x64, STZ, M::Direct, 3),
    op(0x65, ADC, M::Direct, 3),
    op(0x66, ROR, M::Direct, 5),
    op(0x67, ADC, M::DirectIndirectLong, 6),
    op(0x68, PLA, M::Implied, 4),
    op(0x69, ADC, M::ImmediateM, 2),
    op(0x6A, ROR, M::Accumulator, 2),
    op(0x6B, RTL, M::Implied, 6),
    op(0x6C, JMP, M::AbsoluteIndirect, 5),
    op(0x6D, ADC, M::Absolute, 4),
    op(0x6E, ROR, M::Absolute, 6),
    op(0x6F, ADC, M::AbsoluteLong, 5),
    op(0x70, BVS, M::Relative, 2),
    op(0x71, ADC, M::DirectIndirectIndexed, 5),
    op(0x72, ADC, M::DirectIndirect, 5),
    op(0x73, ADC, M::StackRelativeIndirectIndexed, 7),
    op(0x74, STZ, M::DirectX, 4),
    op(0x75, ADC, M::DirectX, 4),
    op(0x76, ROR, M::DirectX, 6),
    op(0x77, ADC, M::DirectIndirectLongIndexed, 6),
    op(0x78, SEI, M::Implied, 2),
    op(0x79, ADC, M::AbsoluteY, 4),
    op(0x7A, PLY, M::Implied, 4),
    op(0x7B, TDC, M::Implied, 2),
    op(0x7C, JMP, M::AbsoluteIndexedIndirect, 6),
    op(0x7D, ADC, M::AbsoluteX, 4),
    op(0x7E, ROR, M::AbsoluteX, 7),
    op(0x7F, ADC, M::AbsoluteLongX, 5),
    op(0x80, BRA, M::Relative, 3),
    op(0x81, STA, M::DirectIndexedIndirect, 6),
    op(0x82, BRL, M::RelativeLong, 4),
    op(0x83, STA, M::StackRelative, 4),
    op(0x84, STY, M::Direct, 3),
    op(0x85, STA, M::Direct, 3),
    op(0x86, STX, M::Direct, 3),
    op(0x87, STA, M::DirectIndirectLong, 6),
    op(0x88, DEY, M::Implied, 2),
    op(0x89, BIT, M::ImmediateM, 2),
    op(0x8A, TXA, M::Implied, 2),
    op(0x8B, PHB, M::Implied, 3),
    op(0x8C, STY, M::Absolute, 4),
    op(0x8D, STA, M::Absolute, 4),
    op(0x8E, STX, M::Absolute, 4),
    op(0x8F, STA, M::AbsoluteLong, 5),
    op(0x90, BCC, M::Relative, 2),
    op(0x91, STA, M::DirectIndirectIndexed, 6),
    op(0x92, STA, M::DirectIndirect, 5),
    op(0x93, STA, M::StackRelativeIndirectIndexed, 7),
    op(0x94, STY, M::DirectX, 4),
    op(0x95, STA, M::DirectX, 4),
    op(0x96, STX, M::DirectY, 4),
    op(0x97, STA, M::DirectIndirectLongIndexed, 6),
    op(0x98, TYA, M::Implied, 2),
    op(0x99, STA, M::AbsoluteY, 5),
    op(0x9A, TXS, M::Implied, 2),
    op(0x9B, TXY, M::Implied, 2),
    op(0x9C, STZ, M::Absolute, 4),
    op(0x9D, STA, M::AbsoluteX, 5),
    op(0x9E, STZ, M::AbsoluteX, 5),
    op(0x9F, STA, M::AbsoluteLongX, 5),
    op(0xA0, LDY, M::ImmediateX, 2),
    op(0xA1, LDA, M::DirectIndexedIndirect, 6),
    op(0xA2, LDX, M::ImmediateX, 2),
    op(0xA3, LDA, M::StackRelative, 4),
    op(0xA4, LDY, M::Direct, 3),
    op(0xA5, LDA, M::Direct, 3),
    op(0xA6, LDX, M::Direct, 3),
    op(0xA7, LDA, M::DirectIndirectLong, 6),
    op(0xA8, TAY, M::Implied, 2),
    op(0xA9, LDA, M::ImmediateM, 2),
    op(0xAA, TAX, M::Implied, 2),
    op(0xAB, PLB, M::Implied, 4),
    op(0xAC, LDY, M::Absolute, 4),
    op(0xAD, LDA, M::Absolute, 4),
    op(0xAE, LDX, M::Absolute, 4),
    op(0xAF, LDA, M::AbsoluteLong, 5),
    op(0xB0, BCS, M::Relative, 2),
    op(0xB1, LDA, M::DirectIndirectIndexed, 5),
    op(0xB2, LDA, M::DirectIndirect, 5),
    op(0xB3, LDA, M::StackRelativeIndirectIndexed, 7),
    op(0xB4, LDY, M::DirectX, 4),
    op(0xB5, LDA, M::DirectX, 4),
    op(0xB6, LDX, M::DirectY, 4),
    op(0xB7, LDA, M::DirectIndirectLongIndexed, 6),
    op(0xB8, CLV, M::Implied, 2),
    op(0xB9, LDA, M::AbsoluteY, 4),
    op(0xBA, TSX, M::Implied, 2),
    op(0xBB, TYX, M::Implied, 2),
    op(0xBC, LDY, M::AbsoluteX, 4),
    op(0xBD, LDA, M::AbsoluteX, 4),
    op(0xBE, LDX, M::AbsoluteY, 4),
    op(0xBF, LDA, M::AbsoluteLongX, 5),
    op(0xC0, CPY, M::ImmediateX, 2),
    op(0xC1, CMP, M::DirectIndexedIndirect, 6),
    op(0xC2, REP, M::Immediate8, 3),
    op(0xC3, CMP, M::StackRelative, 4),
    op(0xC4, CPY, M::Direct, 3),
    op(0xC5, CMP, M::Direct, 3),
    op(0xC6, DEC, M::Direct, 5),
    op(0xC7, CMP, M::DirectIndirectLong, 6),
    op(0xC8, INY, M::Implied, 2),
    op(0xC9, CMP, M::ImmediateM, 2),
    op(0xCA, DEX, M::Implied, 2),
    op(0xCB, WAI, M::Implied, 3),
    op(0xCC, CPY, M::Absolute, 4),
    op(0xCD, CMP, M::Absolute, 4),
    op(0xCE, DEC, M::Absolute, 6),
    op(0xCF, CMP, M::AbsoluteLong, 5),
    op(0xD0, BNE, M::Relative, 2),
    op(0xD1, CMP, M::DirectIndirectIndexed, 5),
    op(0xD2, CMP, M::DirectIndirect, 5),
    op(0xD3, CMP, M::StackRelativeIndirectIndexed, 7),
    op(0xD4, PEI, M::DirectIndirect, 6),
    op(0xD5, CMP, M::DirectX, 4),
    op(0xD6, DEC, M::DirectX, 6),
    op(0xD7, CMP, M::DirectIndirectLongIndexed, 6),
    op(0xD8, CLD, M::Implied, 2),
    op(0xD9, CMP, M::AbsoluteY, 4),
    op(0xDA, PHX, M::Implied, 3),
    op(0xDB, STP, M::Implied, 3),
    op(0xDC, JML, M::AbsoluteIndirectLong, 6),
    op(0xDD, CMP, M::AbsoluteX, 4),
    op(0xDE, DEC, M::AbsoluteX, 7),
    op(0xDF, CMP, M::AbsoluteLongX, 5),
    op(0xE0, CPX, M::ImmediateX, 2),
    op(0xE1, SBC, M::DirectIndexedIndirect, 6),
    op(0xE2, SEP, M::Immediate8, 3),
    op(0xE3, SBC, M::StackRelative, 4),
    op(0xE4, CPX, M::Direct, 3),
    op(0xE5, SBC, M::Direct, 3),
    op(0xE6, INC, M::Direct, 5),
    op(0xE7, SBC, M::DirectIndirectLong, 6),
    op(0xE8, INX, M::Implied, 2),
    op(0xE9, SBC, M::ImmediateM, 2),
    op(0xEA, NOP, M::Implied, 2),
    op(0xEB, XBA, M::Implied, 3),
    op(0xEC, CPX, M::Absolute, 4),
    op(0xED, SBC, M::Absolute, 4),
    op(0xEE, INC, M::Absolute, 6),
    op(0xEF, SBC, M::AbsoluteLong, 5),
    op(0xF0, BEQ, M::Relative, 2),
    op(0xF1, SBC, M::DirectIndirectIndexed, 5),
    op(0xF2, SBC, M::DirectIndirect, 5),
    op(0xF3, SBC, M::StackRelativeIndirectIndexed, 7),
    op(0xF4, PEA, M::Absolute, 5),
    op(0xF5, SBC, M::DirectX, 4),
    op(0xF6, INC, M::DirectX, 6),
    op(0xF7, SBC, M::DirectIndirectLongIndexed, 6),
    op(0xF8, SED, M::Implied, 2),
    op(0xF9, SBC, M::AbsoluteY, 4),
    op(0xFA, PLX, M::Implied, 4),
    op(0xFB, XCE, M::Implied, 2),
    op(0xFC, JSR, M::AbsoluteIndexedIndirect, 8),
    op(0xFD, SBC, M::AbsoluteX, 4),
    op(0xFE, INC, M::AbsoluteX, 7),
    op(0xFF, SBC, M::AbsoluteLongX, 5),
];
