use serde::{Deserialize, Serialize};

use super::context::ProcessorContext;
use super::opcodes::{opcode_info, AddressingMode, Mnemonic};
use crate::error::DecodeError;
use crate::image::RomImage;
use crate::model::{Address, XrefKind};

/// Why an instruction decoded as raw data instead of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawReason {
    Reserved,
    /// Operand ran past the end of the image.
    Truncated,
}

/// One decoded instruction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub offset: usize,
    pub address: Address,
    pub opcode: u8,
    pub operand: Vec<u8>,
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    /// Little-endian operand value, `None` for operand-less and raw instructions.
    pub value: Option<u32>,
    pub cycles: u8,
    /// Context the instruction was decoded under.
    pub context: ProcessorContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawReason>,
}

/// How control leaves an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Sequential,
    /// Conditional branch: falls through or goes to the target.
    Branch(Address),
    /// Unconditional transfer to a known target.
    Jump(Address),
    Call(Address),
    IndirectJump,
    IndirectCall,
    Return,
    /// `STP`, `BRK` and raw data: nothing sensible follows.
    Halt,
}

impl Instruction {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        1 + self.operand.len()
    }

    pub fn end(&self) -> usize {
        self.offset + self.len()
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    /// Append the original bytes of this instruction.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode);
        out.extend_from_slice(&self.operand);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        self.encode_into(&mut out);
        out
    }

    /// Address of the next sequential instruction (same bank, 16-bit wrap).
    pub fn next_address(&self) -> Address {
        self.address.wrapping_add(self.len() as i32)
    }

    /// Destination of a direct branch, jump or call.
    pub fn target(&self) -> Option<Address> {
        if self.is_raw() {
            return None;
        }
        let value = self.value?;
        match (self.mnemonic, self.mode) {
            (_, AddressingMode::Relative) => {
                Some(self.next_address().wrapping_add(value as u8 as i8 as i32))
            }
            (_, AddressingMode::RelativeLong) if self.mnemonic == Mnemonic::BRL => {
                Some(self.next_address().wrapping_add(value as u16 as i16 as i32))
            }
            (Mnemonic::JMP | Mnemonic::JSR, AddressingMode::Absolute) => {
                Some(self.address.with_offset(value as u16))
            }
            (Mnemonic::JML | Mnemonic::JSL, AddressingMode::AbsoluteLong) => {
                Some(Address::from_u24(value))
            }
            _ => None,
        }
    }

    pub fn flow(&self) -> Flow {
        if self.is_raw() {
            return Flow::Halt;
        }
        use Mnemonic::*;
        match self.mnemonic {
            BPL | BMI | BVC | BVS | BCC | BCS | BNE | BEQ => {
                self.target().map(Flow::Branch).unwrap_or(Flow::Halt)
            }
            BRA | BRL => self.target().map(Flow::Jump).unwrap_or(Flow::Halt),
            JMP | JML => match self.target() {
                Some(target) => Flow::Jump(target),
                None => Flow::IndirectJump,
            },
            JSR | JSL => match self.target() {
                Some(target) => Flow::Call(target),
                None => Flow::IndirectCall,
            },
            RTS | RTL | RTI => Flow::Return,
            STP | BRK => Flow::Halt,
            _ => Flow::Sequential,
        }
    }

    /// Absolute or long memory operand touched by a load, store or
    /// read-modify-write instruction.
    pub fn data_reference(&self) -> Option<(Address, XrefKind)> {
        if self.is_raw() {
            return None;
        }
        let value = self.value?;
        let address = match self.mode {
            AddressingMode::Absolute | AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => {
                Address::new(self.context.data_bank, value as u16)
            }
            AddressingMode::AbsoluteLong | AddressingMode::AbsoluteLongX => Address::from_u24(value),
            _ => return None,
        };
        use Mnemonic::*;
        let kind = match self.mnemonic {
            LDA | LDX | LDY | CMP | CPX | CPY | ADC | SBC | AND | ORA | EOR | BIT => XrefKind::DataRead,
            STA | STX | STY | STZ | INC | DEC | ASL | LSR | ROL | ROR | TSB | TRB => XrefKind::DataWrite,
            _ => return None,
        };
        Some((address, kind))
    }

    /// Net bytes pushed (positive) or pulled (negative) by this instruction.
    pub fn stack_effect(&self) -> i32 {
        use Mnemonic::*;
        let a = if self.context.accumulator_is_8bit() { 1 } else { 2 };
        let x = if self.context.index_is_8bit() { 1 } else { 2 };
        match self.mnemonic {
            PHA => a,
            PLA => -a,
            PHX | PHY => x,
            PLX | PLY => -x,
            PHP | PHB | PHK => 1,
            PLP | PLB => -1,
            PHD | PEA | PEI | PER => 2,
            PLD => -2,
            _ => 0,
        }
    }
}

/// Decode one instruction at `offset` of `bytes`, located at console `address`.
///
/// Reserved opcodes and operands cut off by the end of `bytes` produce raw
/// pseudo-instructions rather than errors; the only failure is an `offset`
/// outside the buffer.
pub fn decode_at(
    bytes: &[u8],
    offset: usize,
    address: Address,
    context: ProcessorContext,
) -> Result<(Instruction, ProcessorContext), DecodeError> {
    let opcode = *bytes
        .get(offset)
        .ok_or(DecodeError::OutOfBounds { offset, size: bytes.len() })?;
    let info = opcode_info(opcode);

    if info.reserved {
        return Ok((raw(offset, address, opcode, Vec::new(), context, RawReason::Reserved), context));
    }

    let size = info.mode.operand_size(&context);
    let end = offset + 1 + size;
    if end > bytes.len() {
        let rest = bytes[offset + 1..].to_vec();
        return Ok((raw(offset, address, opcode, rest, context, RawReason::Truncated), context));
    }

    let operand = bytes[offset + 1..end].to_vec();
    let value = (!operand.is_empty()).then(|| {
        operand.iter().rev().fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte))
    });
    let wide_immediate = info.mode.is_width_sensitive() && size == 2;
    let instruction = Instruction {
        offset,
        address,
        opcode,
        operand,
        mnemonic: info.mnemonic,
        mode: info.mode,
        value,
        cycles: info.cycles + u8::from(wide_immediate),
        context,
        raw: None,
    };
    let next = next_context(&instruction, context);
    Ok((instruction, next))
}

/// Decode at a linear image offset, taking the address from the image's mapper.
pub fn decode(
    rom: &RomImage,
    offset: usize,
    context: ProcessorContext,
) -> Result<(Instruction, ProcessorContext), DecodeError> {
    let address = rom
        .mapper()
        .to_address(offset)
        .map_err(|_| DecodeError::OutOfBounds { offset, size: rom.len() })?;
    decode_at(rom.bytes(), offset, address, context)
}

/// Decode `bytes[start..end]` as one straight-line stream, threading the
/// context from each instruction into the next.
pub fn decode_linear(
    bytes: &[u8],
    start: usize,
    end: usize,
    base: Address,
    context: ProcessorContext,
) -> (Vec<Instruction>, ProcessorContext) {
    let end = end.min(bytes.len());
    let mut out = Vec::new();
    let mut ctx = context;
    let mut offset = start;
    while offset < end {
        let address = base.wrapping_add((offset - start) as i32);
        let Ok((insn, next)) = decode_at(&bytes[..end], offset, address, ctx) else {
            break;
        };
        offset = insn.end();
        out.push(insn);
        ctx = next;
    }
    (out, ctx)
}

fn raw(
    offset: usize,
    address: Address,
    opcode: u8,
    operand: Vec<u8>,
    context: ProcessorContext,
    reason: RawReason,
) -> Instruction {
    Instruction {
        offset,
        address,
        opcode,
        operand,
        mnemonic: Mnemonic::Db,
        mode: AddressingMode::Implied,
        value: None,
        cycles: 0,
        context,
        raw: Some(reason),
    }
}

fn next_context(insn: &Instruction, ctx: ProcessorContext) -> ProcessorContext {
    use Mnemonic::*;
    let mask = insn.value.unwrap_or(0) as u8;
    match insn.mnemonic {
        REP => ctx.rep(mask),
        SEP => ctx.sep(mask),
        XCE => ctx.xce(),
        CLC => ProcessorContext { carry: Some(false), ..ctx },
        SEC => ProcessorContext { carry: Some(true), ..ctx },
        PHK => ProcessorContext { pushed_bank: Some(insn.address.bank), ..ctx },
        PHB => ProcessorContext { pushed_bank: Some(ctx.data_bank), ..ctx },
        PLB => match ctx.pushed_bank {
            Some(bank) => ProcessorContext { data_bank: bank, pushed_bank: None, ..ctx },
            None => ctx,
        },
        ADC | SBC | CMP | CPX | CPY | ASL | LSR | ROL | ROR | PLP | RTI => {
            ProcessorContext { carry: None, ..ctx }
        }
        _ => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Address = Address::new(0x00, 0x8000);

    fn one(bytes: &[u8], ctx: ProcessorContext) -> (Instruction, ProcessorContext) {
        decode_at(bytes, 0, BASE, ctx).unwrap()
    }

    #[test]
    fn immediate_width_follows_context() {
        let native16 = ProcessorContext::native(false, false);
        let (insn, _) = one(&[0xA9, 0x34, 0x12], native16);
        assert_eq!(insn.len(), 3);
        assert_eq!(insn.value, Some(0x1234));

        let (insn, _) = one(&[0xA9, 0x34, 0x12], ProcessorContext::reset());
        assert_eq!(insn.len(), 2);
        assert_eq!(insn.value, Some(0x34));
    }

    #[test]
    fn rep_changes_the_next_decode() {
        let bytes = [0xC2, 0x30, 0xA2, 0x00, 0x10, 0xEA];
        let (insns, ctx) = decode_linear(&bytes, 0, bytes.len(), BASE, ProcessorContext::native(true, true));
        let lens: Vec<usize> = insns.iter().map(Instruction::len).collect();
        assert_eq!(lens, vec![2, 3, 1]);
        assert!(!ctx.m8 && !ctx.x8);
    }

    #[test]
    fn wdm_is_raw_single_byte() {
        let (insn, _) = one(&[0x42, 0x00], ProcessorContext::reset());
        assert_eq!(insn.mnemonic, Mnemonic::Db);
        assert_eq!(insn.raw, Some(RawReason::Reserved));
        assert_eq!(insn.len(), 1);
    }

    #[test]
    fn truncated_operand_becomes_raw_tail() {
        let (insn, _) = one(&[0x22, 0x00, 0x80], ProcessorContext::reset());
        assert_eq!(insn.raw, Some(RawReason::Truncated));
        assert_eq!(insn.encode(), vec![0x22, 0x00, 0x80]);
    }

    #[test]
    fn out_of_bounds_offset_is_an_error() {
        let err = decode_at(&[0xEA], 1, BASE, ProcessorContext::reset()).unwrap_err();
        assert_eq!(err, DecodeError::OutOfBounds { offset: 1, size: 1 });
    }

    #[test]
    fn relative_targets_wrap_within_bank() {
        let (insn, _) = one(&[0x80, 0xFE], ProcessorContext::reset());
        assert_eq!(insn.flow(), Flow::Jump(BASE));
        let (insn, _) = decode_at(&[0xD0, 0x7F], 0, Address::new(0x01, 0xFFF0), ProcessorContext::reset()).unwrap();
        assert_eq!(insn.target(), Some(Address::new(0x01, 0x0071)));
    }

    #[test]
    fn flow_classification() {
        let ctx = ProcessorContext::reset();
        assert_eq!(one(&[0x20, 0x34, 0x12], ctx).0.flow(), Flow::Call(Address::new(0, 0x1234)));
        assert_eq!(one(&[0x22, 0x00, 0x80, 0xC0], ctx).0.flow(), Flow::Call(Address::new(0xC0, 0x8000)));
        assert_eq!(one(&[0x6C, 0x00, 0x02], ctx).0.flow(), Flow::IndirectJump);
        assert_eq!(one(&[0xFC, 0x00, 0x90], ctx).0.flow(), Flow::IndirectCall);
        assert_eq!(one(&[0x6B], ctx).0.flow(), Flow::Return);
        assert_eq!(one(&[0xDB], ctx).0.flow(), Flow::Halt);
        assert_eq!(one(&[0xEA], ctx).0.flow(), Flow::Sequential);
    }

    #[test]
    fn phk_plb_propagates_program_bank() {
        let bytes = [0x4B, 0xAB, 0xAD, 0x00, 0x90];
        let base = Address::new(0x03, 0x8000);
        let (insns, ctx) = decode_linear(&bytes, 0, bytes.len(), base, ProcessorContext::reset());
        assert_eq!(ctx.data_bank, 0x03);
        assert_eq!(
            insns[2].data_reference(),
            Some((Address::new(0x03, 0x9000), XrefKind::DataRead))
        );
    }

    #[test]
    fn stores_are_data_writes() {
        let (insn, _) = one(&[0x8F, 0x00, 0x21, 0x7E], ProcessorContext::reset());
        assert_eq!(insn.data_reference(), Some((Address::new(0x7E, 0x2100), XrefKind::DataWrite)));
        let (insn, _) = one(&[0x4C, 0x00, 0x80], ProcessorContext::reset());
        assert_eq!(insn.data_reference(), None);
    }
}
