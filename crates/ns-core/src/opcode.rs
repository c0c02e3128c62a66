use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::NsError;
use crate::value::{BinaryOperator, UnaryOperator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    Null,
    Boolean(bool),
    Integer(i32),
    Float(f64),
    DeltaInteger(i32),
    DeltaFloat(f64),
    String(u16),
    Enum(u16),
    Constant(u16),
}

impl Immediate {
    fn tag(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(false) => 1,
            Self::Boolean(true) => 2,
            Self::Integer(_) => 3,
            Self::Float(_) => 4,
            Self::DeltaInteger(_) => 5,
            Self::DeltaFloat(_) => 6,
            Self::String(_) => 7,
            Self::Enum(_) => 8,
            Self::Constant(_) => 9,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Self::Null | Self::Boolean(_) => 0,
            Self::Integer(_) | Self::DeltaInteger(_) => 4,
            Self::Float(_) | Self::DeltaFloat(_) => 8,
            Self::String(_) | Self::Enum(_) | Self::Constant(_) => 2,
        }
    }
}

/// One instruction of the NSX stack machine. Jump offsets are relative to the
/// first byte of the following instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    LoadImm(Immediate),
    LoadArg(u16),
    LoadVar(u16),
    StoreArg(u16),
    StoreVar(u16),
    Binary(BinaryOperator),
    Unary(UnaryOperator),
    Jump(i16),
    JumpIfTrue(i16),
    JumpIfFalse(i16),
    Call(u16),
    CallFar { import: u16, subroutine: u16 },
    Dispatch { builtin: u16, argc: u8 },
    PresentText(u16),
    BeginDialogue(u16),
    SelectStart,
    IsPressed(u16),
    SelectEnd,
    Pop,
    Dup,
    Trap(u16),
    Return,
}

mod code {
    pub const LOAD_IMM: u8 = 0x01;
    pub const LOAD_ARG: u8 = 0x02;
    pub const LOAD_VAR: u8 = 0x03;
    pub const STORE_ARG: u8 = 0x04;
    pub const STORE_VAR: u8 = 0x05;
    pub const BINARY: u8 = 0x06;
    pub const UNARY: u8 = 0x07;
    pub const JUMP: u8 = 0x08;
    pub const JUMP_IF_TRUE: u8 = 0x09;
    pub const JUMP_IF_FALSE: u8 = 0x0a;
    pub const CALL: u8 = 0x0b;
    pub const CALL_FAR: u8 = 0x0c;
    pub const DISPATCH: u8 = 0x0d;
    pub const PRESENT_TEXT: u8 = 0x0e;
    pub const BEGIN_DIALOGUE: u8 = 0x0f;
    pub const SELECT_START: u8 = 0x10;
    pub const IS_PRESSED: u8 = 0x11;
    pub const SELECT_END: u8 = 0x12;
    pub const POP: u8 = 0x13;
    pub const DUP: u8 = 0x14;
    pub const TRAP: u8 = 0x15;
    pub const RETURN: u8 = 0x16;
}

impl Opcode {
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::LoadImm(imm) => 2 + imm.payload_len(),
            Self::LoadArg(_)
            | Self::LoadVar(_)
            | Self::StoreArg(_)
            | Self::StoreVar(_)
            | Self::Jump(_)
            | Self::JumpIfTrue(_)
            | Self::JumpIfFalse(_)
            | Self::Call(_)
            | Self::PresentText(_)
            | Self::BeginDialogue(_)
            | Self::IsPressed(_)
            | Self::Trap(_) => 3,
            Self::Binary(_) | Self::Unary(_) => 2,
            Self::CallFar { .. } => 5,
            Self::Dispatch { .. } => 4,
            Self::SelectStart | Self::SelectEnd | Self::Pop | Self::Dup | Self::Return => 1,
        }
    }

    pub fn is_jump(&self) -> bool {
        matches!(self, Self::Jump(_) | Self::JumpIfTrue(_) | Self::JumpIfFalse(_))
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let u16_operand = |out: &mut Vec<u8>, op: u8, value: u16| {
            out.push(op);
            out.extend_from_slice(&value.to_le_bytes());
        };
        match *self {
            Self::LoadImm(imm) => {
                out.push(code::LOAD_IMM);
                out.push(imm.tag());
                match imm {
                    Immediate::Null | Immediate::Boolean(_) => {}
                    Immediate::Integer(value) | Immediate::DeltaInteger(value) => {
                        out.extend_from_slice(&value.to_le_bytes())
                    }
                    Immediate::Float(value) | Immediate::DeltaFloat(value) => {
                        out.extend_from_slice(&value.to_le_bytes())
                    }
                    Immediate::String(value) | Immediate::Enum(value) | Immediate::Constant(value) => {
                        out.extend_from_slice(&value.to_le_bytes())
                    }
                }
            }
            Self::LoadArg(index) => u16_operand(out, code::LOAD_ARG, index),
            Self::LoadVar(token) => u16_operand(out, code::LOAD_VAR, token),
            Self::StoreArg(index) => u16_operand(out, code::STORE_ARG, index),
            Self::StoreVar(token) => u16_operand(out, code::STORE_VAR, token),
            Self::Binary(op) => {
                out.push(code::BINARY);
                out.push(op.id());
            }
            Self::Unary(op) => {
                out.push(code::UNARY);
                out.push(op.id());
            }
            Self::Jump(offset) => u16_operand(out, code::JUMP, offset as u16),
            Self::JumpIfTrue(offset) => u16_operand(out, code::JUMP_IF_TRUE, offset as u16),
            Self::JumpIfFalse(offset) => u16_operand(out, code::JUMP_IF_FALSE, offset as u16),
            Self::Call(subroutine) => u16_operand(out, code::CALL, subroutine),
            Self::CallFar { import, subroutine } => {
                u16_operand(out, code::CALL_FAR, import);
                out.extend_from_slice(&subroutine.to_le_bytes());
            }
            Self::Dispatch { builtin, argc } => {
                u16_operand(out, code::DISPATCH, builtin);
                out.push(argc);
            }
            Self::PresentText(token) => u16_operand(out, code::PRESENT_TEXT, token),
            Self::BeginDialogue(index) => u16_operand(out, code::BEGIN_DIALOGUE, index),
            Self::SelectStart => out.push(code::SELECT_START),
            Self::IsPressed(token) => u16_operand(out, code::IS_PRESSED, token),
            Self::SelectEnd => out.push(code::SELECT_END),
            Self::Pop => out.push(code::POP),
            Self::Dup => out.push(code::DUP),
            Self::Trap(token) => u16_operand(out, code::TRAP, token),
            Self::Return => out.push(code::RETURN),
        }
    }

    /// Decodes the instruction at `offset`, returning it with its encoded length.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<(Opcode, usize), NsError> {
        let truncated = || {
            NsError::new(
                "VM_TRUNCATED_INSTRUCTION",
                format!("Instruction at offset {} is truncated.", offset),
            )
        };
        let byte_at = |at: usize| bytes.get(at).copied().ok_or_else(truncated);
        let u16_at = |at: usize| {
            bytes
                .get(at..at + 2)
                .map(LittleEndian::read_u16)
                .ok_or_else(truncated)
        };

        let op = byte_at(offset)?;
        let decoded = match op {
            code::LOAD_IMM => {
                let tag = byte_at(offset + 1)?;
                let payload = offset + 2;
                let slice = |len: usize| bytes.get(payload..payload + len).ok_or_else(truncated);
                let imm = match tag {
                    0 => Immediate::Null,
                    1 => Immediate::Boolean(false),
                    2 => Immediate::Boolean(true),
                    3 => Immediate::Integer(LittleEndian::read_i32(slice(4)?)),
                    4 => Immediate::Float(LittleEndian::read_f64(slice(8)?)),
                    5 => Immediate::DeltaInteger(LittleEndian::read_i32(slice(4)?)),
                    6 => Immediate::DeltaFloat(LittleEndian::read_f64(slice(8)?)),
                    7 => Immediate::String(LittleEndian::read_u16(slice(2)?)),
                    8 => Immediate::Enum(LittleEndian::read_u16(slice(2)?)),
                    9 => Immediate::Constant(LittleEndian::read_u16(slice(2)?)),
                    other => {
                        return Err(NsError::new(
                            "VM_UNREACHABLE_OPCODE",
                            format!("Unknown immediate tag {:#04x} at offset {}.", other, offset),
                        ))
                    }
                };
                Opcode::LoadImm(imm)
            }
            code::LOAD_ARG => Opcode::LoadArg(u16_at(offset + 1)?),
            code::LOAD_VAR => Opcode::LoadVar(u16_at(offset + 1)?),
            code::STORE_ARG => Opcode::StoreArg(u16_at(offset + 1)?),
            code::STORE_VAR => Opcode::StoreVar(u16_at(offset + 1)?),
            code::BINARY => {
                let id = byte_at(offset + 1)?;
                Opcode::Binary(BinaryOperator::from_id(id).ok_or_else(|| {
                    NsError::new(
                        "VM_UNREACHABLE_OPCODE",
                        format!("Unknown binary operator {} at offset {}.", id, offset),
                    )
                })?)
            }
            code::UNARY => {
                let id = byte_at(offset + 1)?;
                Opcode::Unary(UnaryOperator::from_id(id).ok_or_else(|| {
                    NsError::new(
                        "VM_UNREACHABLE_OPCODE",
                        format!("Unknown unary operator {} at offset {}.", id, offset),
                    )
                })?)
            }
            code::JUMP => Opcode::Jump(u16_at(offset + 1)? as i16),
            code::JUMP_IF_TRUE => Opcode::JumpIfTrue(u16_at(offset + 1)? as i16),
            code::JUMP_IF_FALSE => Opcode::JumpIfFalse(u16_at(offset + 1)? as i16),
            code::CALL => Opcode::Call(u16_at(offset + 1)?),
            code::CALL_FAR => Opcode::CallFar {
                import: u16_at(offset + 1)?,
                subroutine: u16_at(offset + 3)?,
            },
            code::DISPATCH => Opcode::Dispatch {
                builtin: u16_at(offset + 1)?,
                argc: byte_at(offset + 3)?,
            },
            code::PRESENT_TEXT => Opcode::PresentText(u16_at(offset + 1)?),
            code::BEGIN_DIALOGUE => Opcode::BeginDialogue(u16_at(offset + 1)?),
            code::SELECT_START => Opcode::SelectStart,
            code::IS_PRESSED => Opcode::IsPressed(u16_at(offset + 1)?),
            code::SELECT_END => Opcode::SelectEnd,
            code::POP => Opcode::Pop,
            code::DUP => Opcode::Dup,
            code::TRAP => Opcode::Trap(u16_at(offset + 1)?),
            code::RETURN => Opcode::Return,
            other => {
                return Err(NsError::new(
                    "VM_UNREACHABLE_OPCODE",
                    format!("Unknown opcode {:#04x} at offset {}.", other, offset),
                ))
            }
        };
        Ok((decoded, decoded.encoded_len()))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadImm(imm) => match imm {
                Immediate::Null => write!(f, "LoadImm null"),
                Immediate::Boolean(value) => write!(f, "LoadImm {}", value),
                Immediate::Integer(value) => write!(f, "LoadImm {}", value),
                Immediate::Float(value) => write!(f, "LoadImm {:?}", value),
                Immediate::DeltaInteger(value) => write!(f, "LoadImm @{}", value),
                Immediate::DeltaFloat(value) => write!(f, "LoadImm @{:?}", value),
                Immediate::String(token) => write!(f, "LoadImm str#{}", token),
                Immediate::Enum(id) => write!(f, "LoadImm enum#{}", id),
                Immediate::Constant(id) => write!(f, "LoadImm const#{}", id),
            },
            Self::LoadArg(index) => write!(f, "LoadArg {}", index),
            Self::LoadVar(token) => write!(f, "LoadVar str#{}", token),
            Self::StoreArg(index) => write!(f, "StoreArg {}", index),
            Self::StoreVar(token) => write!(f, "StoreVar str#{}", token),
            Self::Binary(op) => write!(f, "Binary {}", op.symbol()),
            Self::Unary(op) => write!(f, "Unary {}", op.symbol()),
            Self::Jump(offset) => write!(f, "Jump {:+}", offset),
            Self::JumpIfTrue(offset) => write!(f, "JumpIfTrue {:+}", offset),
            Self::JumpIfFalse(offset) => write!(f, "JumpIfFalse {:+}", offset),
            Self::Call(index) => write!(f, "Call {}", index),
            Self::CallFar { import, subroutine } => write!(f, "CallFar {}:{}", import, subroutine),
            Self::Dispatch { builtin, argc } => write!(f, "Dispatch {}/{}", builtin, argc),
            Self::PresentText(token) => write!(f, "PresentText str#{}", token),
            Self::BeginDialogue(index) => write!(f, "BeginDialogue {}", index),
            Self::SelectStart => write!(f, "SelectStart"),
            Self::IsPressed(token) => write!(f, "IsPressed str#{}", token),
            Self::SelectEnd => write!(f, "SelectEnd"),
            Self::Pop => write!(f, "Pop"),
            Self::Dup => write!(f, "Dup"),
            Self::Trap(token) => write!(f, "Trap str#{}", token),
            Self::Return => write!(f, "Return"),
        }
    }
}

#[cfg(test)]
mod opcode_tests {
    use super::*;

    #[test]
    fn encoded_length_matches_written_bytes() {
        let ops = [
            Opcode::LoadImm(Immediate::Float(1.5)),
            Opcode::LoadImm(Immediate::Null),
            Opcode::LoadImm(Immediate::DeltaInteger(-20)),
            Opcode::CallFar {
                import: 1,
                subroutine: 2,
            },
            Opcode::Dispatch { builtin: 3, argc: 2 },
            Opcode::JumpIfFalse(-12),
            Opcode::Binary(BinaryOperator::GreaterThan),
            Opcode::Return,
        ];
        for op in ops {
            let mut bytes = Vec::new();
            op.encode(&mut bytes);
            assert_eq!(bytes.len(), op.encoded_len(), "{}", op);
            let (decoded, len) = Opcode::decode(&bytes, 0).expect("decode should pass");
            assert_eq!(decoded, op);
            assert_eq!(len, bytes.len());
        }
    }

    #[test]
    fn unknown_opcode_is_unreachable_error() {
        let error = Opcode::decode(&[0xee], 0).expect_err("unknown opcode should fail");
        assert_eq!(error.code, "VM_UNREACHABLE_OPCODE");
    }

    #[test]
    fn truncated_operand_is_reported() {
        let error = Opcode::decode(&[code::CALL_FAR, 1, 0, 2], 0).expect_err("truncated");
        assert_eq!(error.code, "VM_TRUNCATED_INSTRUCTION");
    }

    #[test]
    fn display_renders_signed_jumps() {
        assert_eq!(Opcode::Jump(-7).to_string(), "Jump -7");
        assert_eq!(Opcode::JumpIfTrue(4).to_string(), "JumpIfTrue +4");
    }
}
