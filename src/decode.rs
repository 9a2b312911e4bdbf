//! Instruction decode: turns a 32-bit word into a [`Decoded`] value
//! ready for execution, or a [`DecodeFault`] naming exactly which
//! dispatch level failed.

use thiserror::Error;

use crate::fields;

pub const OP_LUI: u32 = 0b0110111;
pub const OP_AUIPC: u32 = 0b0010111;
pub const OP_JAL: u32 = 0b1101111;
pub const OP_JALR: u32 = 0b1100111;
pub const OP_BRANCH: u32 = 0b1100011;
pub const OP_LOAD: u32 = 0b0000011;
pub const OP_STORE: u32 = 0b0100011;
pub const OP_IMM: u32 = 0b0010011;
pub const OP: u32 = 0b0110011;

const FUNCT3_BEQ: u32 = 0b000;
const FUNCT3_BNE: u32 = 0b001;
const FUNCT3_BLT: u32 = 0b100;
const FUNCT3_BGE: u32 = 0b101;
const FUNCT3_BLTU: u32 = 0b110;
const FUNCT3_BGEU: u32 = 0b111;

const FUNCT3_B: u32 = 0b000;
const FUNCT3_H: u32 = 0b001;
const FUNCT3_W: u32 = 0b010;
const FUNCT3_BU: u32 = 0b100;
const FUNCT3_HU: u32 = 0b101;

const FUNCT3_ADDI: u32 = 0b000;
const FUNCT3_SLTI: u32 = 0b010;
const FUNCT3_SLTIU: u32 = 0b011;
const FUNCT3_XORI: u32 = 0b100;
const FUNCT3_ORI: u32 = 0b110;
const FUNCT3_ANDI: u32 = 0b111;
const FUNCT3_SLLI: u32 = 0b001;
const FUNCT3_SRXI: u32 = 0b101;

const FUNCT3_ADD_SUB: u32 = 0b000;
const FUNCT3_SLL: u32 = 0b001;
const FUNCT3_SLT: u32 = 0b010;
const FUNCT3_SLTU: u32 = 0b011;
const FUNCT3_XOR: u32 = 0b100;
const FUNCT3_SRL_SRA: u32 = 0b101;
const FUNCT3_OR: u32 = 0b110;
const FUNCT3_AND: u32 = 0b111;

const FUNCT7_ALT: u32 = 0b0100000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeFault {
    #[error("instruction {word:#010x} uses unrecognized opcode {opcode:#09b}")]
    UnknownOpcode { word: u32, opcode: u32 },
    #[error("instruction {word:#010x} (opcode {opcode:#09b}) uses unrecognized funct3 {funct3:#05b}")]
    UnknownFunct3 { word: u32, opcode: u32, funct3: u32 },
    #[error(
        "instruction {word:#010x} (opcode {opcode:#09b}, funct3 {funct3:#05b}) uses unrecognized funct7 {funct7:#09b}"
    )]
    UnknownFunct7 {
        word: u32,
        opcode: u32,
        funct3: u32,
        funct7: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegImmOp {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegRegOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOp {
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadWidth {
    Byte,
    Half,
    Word,
    ByteUnsigned,
    HalfUnsigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWidth {
    Byte,
    Half,
    Word,
}

/// A fully decoded instruction, fields already extracted into their
/// semantic roles. `imm` is always sign-extended to 32 bits by decode
/// time (per spec: the CPU must not fix a single signedness for
/// registers, but immediates are sign-extended immediates by
/// definition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Lui { rd: u8, imm: u32 },
    Auipc { rd: u8, imm: u32 },
    Jal { rd: u8, imm: u32 },
    Jalr { rd: u8, rs1: u8, imm: u32 },
    Branch { op: BranchOp, rs1: u8, rs2: u8, imm: u32 },
    Load { width: LoadWidth, rd: u8, rs1: u8, imm: u32 },
    Store { width: StoreWidth, rs1: u8, rs2: u8, imm: u32 },
    RegImm { op: RegImmOp, rd: u8, rs1: u8, imm: u32 },
    RegReg { op: RegRegOp, rd: u8, rs1: u8, rs2: u8 },
}

pub fn decode(word: u32) -> Result<Decoded, DecodeFault> {
    let opcode = fields::opcode(word);
    let rd = fields::rd(word);
    let rs1 = fields::rs1(word);
    let rs2 = fields::rs2(word);
    let funct3 = fields::funct3(word);
    let funct7 = fields::funct7(word);

    match opcode {
        OP_LUI => Ok(Decoded::Lui {
            rd,
            imm: fields::decode_imm_u(word),
        }),
        OP_AUIPC => Ok(Decoded::Auipc {
            rd,
            imm: fields::decode_imm_u(word),
        }),
        OP_JAL => Ok(Decoded::Jal {
            rd,
            imm: fields::decode_imm_j(word),
        }),
        OP_JALR => {
            if funct3 != 0 {
                return Err(DecodeFault::UnknownFunct3 { word, opcode, funct3 });
            }
            Ok(Decoded::Jalr {
                rd,
                rs1,
                imm: fields::decode_imm_i(word),
            })
        }
        OP_BRANCH => {
            let op = match funct3 {
                FUNCT3_BEQ => BranchOp::Beq,
                FUNCT3_BNE => BranchOp::Bne,
                FUNCT3_BLT => BranchOp::Blt,
                FUNCT3_BGE => BranchOp::Bge,
                FUNCT3_BLTU => BranchOp::Bltu,
                FUNCT3_BGEU => BranchOp::Bgeu,
                _ => return Err(DecodeFault::UnknownFunct3 { word, opcode, funct3 }),
            };
            Ok(Decoded::Branch {
                op,
                rs1,
                rs2,
                imm: fields::decode_imm_b(word),
            })
        }
        OP_LOAD => {
            let width = match funct3 {
                FUNCT3_B => LoadWidth::Byte,
                FUNCT3_H => LoadWidth::Half,
                FUNCT3_W => LoadWidth::Word,
                FUNCT3_BU => LoadWidth::ByteUnsigned,
                FUNCT3_HU => LoadWidth::HalfUnsigned,
                _ => return Err(DecodeFault::UnknownFunct3 { word, opcode, funct3 }),
            };
            Ok(Decoded::Load {
                width,
                rd,
                rs1,
                imm: fields::decode_imm_i(word),
            })
        }
        OP_STORE => {
            let width = match funct3 {
                FUNCT3_B => StoreWidth::Byte,
                FUNCT3_H => StoreWidth::Half,
                FUNCT3_W => StoreWidth::Word,
                _ => return Err(DecodeFault::UnknownFunct3 { word, opcode, funct3 }),
            };
            Ok(Decoded::Store {
                width,
                rs1,
                rs2,
                imm: fields::decode_imm_s(word),
            })
        }
        OP_IMM => {
            let op = match funct3 {
                FUNCT3_ADDI => RegImmOp::Addi,
                FUNCT3_SLTI => RegImmOp::Slti,
                FUNCT3_SLTIU => RegImmOp::Sltiu,
                FUNCT3_XORI => RegImmOp::Xori,
                FUNCT3_ORI => RegImmOp::Ori,
                FUNCT3_ANDI => RegImmOp::Andi,
                FUNCT3_SLLI => {
                    if funct7 != 0 {
                        return Err(DecodeFault::UnknownFunct7 { word, opcode, funct3, funct7 });
                    }
                    RegImmOp::Slli
                }
                FUNCT3_SRXI => match funct7 {
                    0 => RegImmOp::Srli,
                    FUNCT7_ALT => RegImmOp::Srai,
                    _ => return Err(DecodeFault::UnknownFunct7 { word, opcode, funct3, funct7 }),
                },
                _ => return Err(DecodeFault::UnknownFunct3 { word, opcode, funct3 }),
            };
            // SLLI/SRLI/SRAI take their shift amount from the low 5
            // bits of what would otherwise be the I-immediate; ADDI
            // etc. take the full sign-extended 12-bit immediate.
            let imm = match op {
                RegImmOp::Slli | RegImmOp::Srli | RegImmOp::Srai => rs2 as u32,
                _ => fields::decode_imm_i(word),
            };
            Ok(Decoded::RegImm { op, rd, rs1, imm })
        }
        OP => {
            let op = match funct3 {
                FUNCT3_ADD_SUB => match funct7 {
                    0 => RegRegOp::Add,
                    FUNCT7_ALT => RegRegOp::Sub,
                    _ => return Err(DecodeFault::UnknownFunct7 { word, opcode, funct3, funct7 }),
                },
                FUNCT3_SRL_SRA => match funct7 {
                    0 => RegRegOp::Srl,
                    FUNCT7_ALT => RegRegOp::Sra,
                    _ => return Err(DecodeFault::UnknownFunct7 { word, opcode, funct3, funct7 }),
                },
                FUNCT3_SLL if funct7 == 0 => RegRegOp::Sll,
                FUNCT3_SLT if funct7 == 0 => RegRegOp::Slt,
                FUNCT3_SLTU if funct7 == 0 => RegRegOp::Sltu,
                FUNCT3_XOR if funct7 == 0 => RegRegOp::Xor,
                FUNCT3_OR if funct7 == 0 => RegRegOp::Or,
                FUNCT3_AND if funct7 == 0 => RegRegOp::And,
                FUNCT3_SLL | FUNCT3_SLT | FUNCT3_SLTU | FUNCT3_XOR | FUNCT3_OR | FUNCT3_AND => {
                    return Err(DecodeFault::UnknownFunct7 { word, opcode, funct3, funct7 })
                }
                _ => return Err(DecodeFault::UnknownFunct3 { word, opcode, funct3 }),
            };
            Ok(Decoded::RegReg { op, rd, rs1, rs2 })
        }
        _ => Err(DecodeFault::UnknownOpcode { word, opcode }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_addi() {
        // addi x10, x10, 0x678
        let decoded = decode(0x6785_0513).unwrap();
        assert_eq!(
            decoded,
            Decoded::RegImm {
                op: RegImmOp::Addi,
                rd: 10,
                rs1: 10,
                imm: 0x678,
            }
        );
    }

    #[test]
    fn distinguishes_srli_from_srai_by_funct7() {
        // srai x13, x13, 1
        let decoded = decode(0x4016_d693).unwrap();
        assert_eq!(
            decoded,
            Decoded::RegImm {
                op: RegImmOp::Srai,
                rd: 13,
                rs1: 13,
                imm: 1,
            }
        );
    }

    #[test]
    fn unknown_opcode_is_a_decode_fault() {
        let err = decode(0b1111111).unwrap_err();
        assert!(matches!(err, DecodeFault::UnknownOpcode { .. }));
    }

    #[test]
    fn unknown_funct3_within_branch_is_a_decode_fault() {
        // opcode BRANCH with funct3 = 0b010 (unused)
        let word = (0b010 << 12) | OP_BRANCH;
        let err = decode(word).unwrap_err();
        assert!(matches!(err, DecodeFault::UnknownFunct3 { .. }));
    }

    #[test]
    fn unknown_funct7_within_add_sub_is_a_decode_fault() {
        let word = (0b0000001 << 25) | OP;
        let err = decode(word).unwrap_err();
        assert!(matches!(err, DecodeFault::UnknownFunct7 { .. }));
    }
}
