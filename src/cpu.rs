//! The RV32I hart: architectural state plus the single-step
//! fetch/decode/execute/commit pipeline.

use crate::bus::{Bus, BusWidth};
use crate::decode::{self, BranchOp, Decoded, LoadWidth, RegImmOp, RegRegOp, StoreWidth};
use crate::fault::{Fault, LoadOp, StoreOp};

/// A 32-bit RISC-V hart implementing the RV32I base integer ISA. Pure
/// function of its own state plus whatever the bus returns; performs
/// no I/O of its own.
#[derive(Debug)]
pub struct Cpu<B: Bus> {
    bus: B,
    pc: u32,
    regs: [u32; 32],
}

impl<B: Bus> Cpu<B> {
    pub fn new(bus: B, initial_pc: u32) -> Self {
        Self {
            bus,
            pc: initial_pc,
            regs: [0; 32],
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Register `index`, reinterpreted as signed. `reg(0)` is always 0.
    pub fn reg(&self, index: u8) -> i32 {
        self.regs[index as usize] as i32
    }

    /// Give the bus back (e.g. to inspect its state after a run).
    pub fn into_bus(self) -> B {
        self.bus
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn set(&mut self, index: u8, value: u32) {
        if index != 0 {
            self.regs[index as usize] = value;
        }
    }

    fn get(&self, index: u8) -> u32 {
        self.regs[index as usize]
    }

    /// Execute exactly one instruction. On success, `pc` has advanced
    /// (sequentially or via a taken branch/jump) and registers are
    /// committed. On fault, neither changes: the caller can inspect
    /// `pc()` and re-fetch the offending word to diagnose.
    pub fn step(&mut self) -> Result<(), Fault> {
        let result = self.step_inner();
        if let Err(fault) = &result {
            log::debug!("fault at pc={:#010x} code={:#x}: {fault}", self.pc, fault.code());
        }
        result
    }

    fn step_inner(&mut self) -> Result<(), Fault> {
        self.regs[0] = 0;

        let word = self.bus.load(self.pc, BusWidth::Word).map_err(|source| Fault::Fetch {
            pc: self.pc,
            source,
        })?;
        log::trace!("pc={:#010x} instr={word:#010x}", self.pc);

        let decoded = decode::decode(word)?;

        let mut next_pc = self.pc.wrapping_add(4);
        let mut rd_write: Option<(u8, u32)> = None;

        match decoded {
            Decoded::Lui { rd, imm } => {
                rd_write = Some((rd, imm));
            }
            Decoded::Auipc { rd, imm } => {
                rd_write = Some((rd, self.pc.wrapping_add(imm)));
            }
            Decoded::Jal { rd, imm } => {
                rd_write = Some((rd, self.pc.wrapping_add(4)));
                next_pc = self.pc.wrapping_add(imm);
            }
            Decoded::Jalr { rd, rs1, imm } => {
                // Compute the target before writing rd: rd may equal rs1.
                let target = self.get(rs1).wrapping_add(imm) & !1;
                next_pc = target;
                rd_write = Some((rd, self.pc.wrapping_add(4)));
            }
            Decoded::Branch { op, rs1, rs2, imm } => {
                let a = self.get(rs1);
                let b = self.get(rs2);
                let taken = match op {
                    BranchOp::Beq => a == b,
                    BranchOp::Bne => a != b,
                    BranchOp::Blt => (a as i32) < (b as i32),
                    BranchOp::Bge => (a as i32) >= (b as i32),
                    BranchOp::Bltu => a < b,
                    BranchOp::Bgeu => a >= b,
                };
                if taken {
                    next_pc = self.pc.wrapping_add(imm);
                }
            }
            Decoded::Load { width, rd, rs1, imm } => {
                let address = self.get(rs1).wrapping_add(imm);
                let value = self.do_load(width, address)?;
                rd_write = Some((rd, value));
            }
            Decoded::Store { width, rs1, rs2, imm } => {
                let address = self.get(rs1).wrapping_add(imm);
                let value = self.get(rs2);
                self.do_store(width, address, value)?;
            }
            Decoded::RegImm { op, rd, rs1, imm } => {
                let src = self.get(rs1);
                let value = match op {
                    RegImmOp::Addi => src.wrapping_add(imm),
                    RegImmOp::Slti => ((src as i32) < (imm as i32)) as u32,
                    RegImmOp::Sltiu => (src < imm) as u32,
                    RegImmOp::Xori => src ^ imm,
                    RegImmOp::Ori => src | imm,
                    RegImmOp::Andi => src & imm,
                    RegImmOp::Slli => src << (imm & 0x1f),
                    RegImmOp::Srli => src >> (imm & 0x1f),
                    RegImmOp::Srai => ((src as i32) >> (imm & 0x1f)) as u32,
                };
                rd_write = Some((rd, value));
            }
            Decoded::RegReg { op, rd, rs1, rs2 } => {
                let a = self.get(rs1);
                let b = self.get(rs2);
                let value = match op {
                    RegRegOp::Add => a.wrapping_add(b),
                    RegRegOp::Sub => a.wrapping_sub(b),
                    RegRegOp::Sll => a << (b & 0x1f),
                    RegRegOp::Slt => ((a as i32) < (b as i32)) as u32,
                    RegRegOp::Sltu => (a < b) as u32,
                    RegRegOp::Xor => a ^ b,
                    RegRegOp::Srl => a >> (b & 0x1f),
                    RegRegOp::Sra => ((a as i32) >> (b & 0x1f)) as u32,
                    RegRegOp::Or => a | b,
                    RegRegOp::And => a & b,
                };
                rd_write = Some((rd, value));
            }
        }

        if let Some((rd, value)) = rd_write {
            self.set(rd, value);
        }
        self.pc = next_pc;
        Ok(())
    }

    fn do_load(&mut self, width: LoadWidth, address: u32) -> Result<u32, Fault> {
        let (bus_width, op) = match width {
            LoadWidth::Byte => (BusWidth::Byte, LoadOp::Lb),
            LoadWidth::Half => (BusWidth::Half, LoadOp::Lh),
            LoadWidth::Word => (BusWidth::Word, LoadOp::Lw),
            LoadWidth::ByteUnsigned => (BusWidth::Byte, LoadOp::Lbu),
            LoadWidth::HalfUnsigned => (BusWidth::Half, LoadOp::Lhu),
        };
        let raw = self
            .bus
            .load(address, bus_width)
            .map_err(|source| Fault::Load { op, address, source })?;
        Ok(match width {
            LoadWidth::Byte => crate::fields::sign_extend(raw, 8),
            LoadWidth::Half => crate::fields::sign_extend(raw, 16),
            LoadWidth::Word | LoadWidth::ByteUnsigned | LoadWidth::HalfUnsigned => raw,
        })
    }

    fn do_store(&mut self, width: StoreWidth, address: u32, value: u32) -> Result<(), Fault> {
        let (bus_width, op) = match width {
            StoreWidth::Byte => (BusWidth::Byte, StoreOp::Sb),
            StoreWidth::Half => (BusWidth::Half, StoreOp::Sh),
            StoreWidth::Word => (BusWidth::Word, StoreOp::Sw),
        };
        self.bus
            .store(address, bus_width, value)
            .map_err(|source| Fault::Store { op, address, source })?;
        log::trace!("store {op:?} addr={address:#010x} value={value:#010x}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusFault, BusOp};
    use std::collections::HashMap;

    /// A flat RAM bus for unit tests: little-endian, zero-initialized,
    /// never faults.
    #[derive(Default)]
    struct TestBus {
        data: HashMap<u32, u8>,
    }

    impl TestBus {
        fn write_word(&mut self, addr: u32, word: u32) {
            for (i, b) in word.to_le_bytes().iter().enumerate() {
                self.data.insert(addr + i as u32, *b);
            }
        }
    }

    impl Bus for TestBus {
        fn transact(
            &mut self,
            address: u32,
            width: BusWidth,
            op: BusOp,
            data: &mut u32,
        ) -> Result<(), BusFault> {
            let width = width.bytes();
            match op {
                BusOp::Load => {
                    let mut value = 0u32;
                    for i in 0..width {
                        let byte = *self.data.get(&address.wrapping_add(i)).unwrap_or(&0);
                        value |= (byte as u32) << (8 * i);
                    }
                    *data = value;
                }
                BusOp::Store => {
                    for i in 0..width {
                        let byte = ((*data) >> (8 * i)) as u8;
                        self.data.insert(address.wrapping_add(i), byte);
                    }
                }
            }
            Ok(())
        }
    }

    fn cpu_with_program(words: &[u32]) -> Cpu<TestBus> {
        let mut bus = TestBus::default();
        for (i, w) in words.iter().enumerate() {
            bus.write_word((i * 4) as u32, *w);
        }
        Cpu::new(bus, 0)
    }

    #[test]
    fn zero_register_is_always_zero() {
        let mut cpu = cpu_with_program(&[0x0010_0093]); // addi x1, x0, 1
        cpu.step().unwrap();
        assert_eq!(cpu.reg(0), 0);
        assert_eq!(cpu.reg(1), 1);
    }

    #[test]
    fn lui_then_addi_composes_a_32_bit_constant() {
        let mut cpu = cpu_with_program(&[0x1234_5537, 0x6785_0513]);
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.reg(10) as u32, 0x1234_5678);
        assert_eq!(cpu.pc(), 8);
    }

    #[test]
    fn slti_is_signed_sltiu_is_unsigned() {
        let mut cpu = cpu_with_program(&[0x0030_0593]); // addi x11, x0, 3
        cpu.step().unwrap();
        assert_eq!(cpu.reg(11), 3);

        let mut cpu = cpu_with_program(&[0x0030_0593, 0xfff5_a613]); // + slti x12, x11, -1
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.reg(12), 0);

        let mut cpu = cpu_with_program(&[0x0030_0593, 0xfff5_b613]); // + sltiu x12, x11, -1
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.reg(12), 1);
    }

    #[test]
    fn srai_preserves_sign() {
        let mut cpu = cpu_with_program(&[0x4016_d693]); // srai x13, x13, 1
        cpu.set(13, 0xFFFF_FFFD); // -3
        cpu.step().unwrap();
        assert_eq!(cpu.reg(13) as u32, 0xFFFF_FFFE); // -2
    }

    #[test]
    fn jal_and_jalr_round_trip_discards_x0_link() {
        let mut bus = TestBus::default();
        bus.write_word(0xA0, 0x3600_00ef); // jal x1, +0x360
        bus.write_word(0x400, 0x0000_8067); // jalr x0, 0(x1)
        let mut cpu = Cpu::new(bus, 0xA0);

        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0x400);
        assert_eq!(cpu.reg(1) as u32, 0xA4);

        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0xA4);
        assert_eq!(cpu.reg(0), 0);
    }

    #[test]
    fn auipc_adds_pc() {
        let mut bus = TestBus::default();
        bus.write_word(0x438, 0xffff_f117); // auipc x2, 0xFFFFF
        let mut cpu = Cpu::new(bus, 0x438);
        cpu.step().unwrap();
        assert_eq!(cpu.reg(2), -3016);
    }

    #[test]
    fn branch_taken_and_not_taken() {
        let mut bus = TestBus::default();
        bus.write_word(0xA4, 0x3650_0b63); // beq x22, x22, +0x364 wait computed below
        let mut cpu = Cpu::new(bus, 0xA4);
        cpu.set(22, 0x10000);
        cpu.set(21, 0xFFFF);
        // beq x22, x22, +0x364 -> target 0x408
        let instr = encode_btype(BranchOp::Beq, 22, 22, 0x364);
        cpu.bus_mut().write_word(0xA4, instr);
        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0x408);

        // beq x22, x21, +4 (not taken) at 0xBC -> pc advances by 4
        let instr = encode_btype(BranchOp::Beq, 22, 21, 0x100);
        cpu.bus_mut().write_word(0xBC, instr);
        cpu.pc = 0xBC;
        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0xC0);
    }

    #[test]
    fn byte_store_then_sign_extending_load() {
        let mut cpu = cpu_with_program(&[]);
        cpu.set(17, 0xFFFF_FFFF);
        cpu.set(20, 0x1000);
        let sb = encode_stype(StoreWidth::Byte, 20, 17, 7);
        let lb = encode_itype(0b0000011, 0, 7, 20, 21);
        cpu.bus_mut().write_word(0, sb);
        cpu.bus_mut().write_word(4, lb);
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.reg(21), -1);
    }

    #[test]
    fn fault_leaves_pc_unchanged() {
        let mut cpu = cpu_with_program(&[0x0000_0000]); // opcode 0 is not recognized
        let err = cpu.step().unwrap_err();
        assert!(matches!(err, Fault::Decode(_)));
        assert_eq!(cpu.pc(), 0);
    }

    // --- tiny local encoders, independent of src/encode.rs, just to
    // build branch/store/load words for the tests above ---

    fn encode_btype(op: BranchOp, rs1: u32, rs2: u32, imm: u32) -> u32 {
        let funct3 = match op {
            BranchOp::Beq => 0,
            BranchOp::Bne => 1,
            BranchOp::Blt => 4,
            BranchOp::Bge => 5,
            BranchOp::Bltu => 6,
            BranchOp::Bgeu => 7,
        };
        crate::fields::encode_imm_b(imm) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | decode::OP_BRANCH
    }

    fn encode_stype(width: StoreWidth, rs1: u32, rs2: u32, imm: u32) -> u32 {
        let funct3 = match width {
            StoreWidth::Byte => 0,
            StoreWidth::Half => 1,
            StoreWidth::Word => 2,
        };
        crate::fields::encode_imm_s(imm) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | decode::OP_STORE
    }

    fn encode_itype(opcode: u32, funct3: u32, imm: u32, rs1: u32, rd: u32) -> u32 {
        crate::fields::encode_imm_i(imm) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }
}
