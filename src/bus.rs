//! The bus contract coupling a [`crate::cpu::Cpu`] to its host platform.
//!
//! This replaces the raw function-pointer callback used by the
//! reference implementations (a `fn(addr, width, is_store, &mut data)
//! -> status`) with a trait: any type offering one method satisfies
//! the CPU's sole external dependency, injected at construction
//! rather than reached for as a global.

use thiserror::Error;

/// Width of a single bus transaction, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    Byte = 1,
    Half = 2,
    Word = 4,
}

impl BusWidth {
    pub fn bytes(self) -> u32 {
        self as u32
    }
}

/// Direction of a bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Load,
    Store,
}

/// A non-zero bus status, carrying the host's raw failure code for
/// diagnostics. The CPU never inspects this value's magnitude; it
/// only knows "zero" from "non-zero".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bus transaction failed with host status {0:#x}")]
pub struct BusFault(pub u32);

/// The CPU's sole external dependency: a byte-addressable transaction
/// endpoint. Implementors decide how addresses map to RAM, MMIO, or
/// nothing at all; the CPU does not distinguish memory from MMIO.
///
/// `data` is in/out: on [`BusOp::Load`] the implementor writes the
/// fetched value into it, zero-extended into the low `width` bytes;
/// on [`BusOp::Store`] the implementor reads only the low `width`
/// bytes of the value already present.
///
/// A single `step` issues zero or more transactions, each indivisible
/// from the CPU's perspective and observed in program order. A store
/// must be visible to any subsequent load from the same caller.
pub trait Bus {
    fn transact(
        &mut self,
        address: u32,
        width: BusWidth,
        op: BusOp,
        data: &mut u32,
    ) -> Result<(), BusFault>;

    /// Convenience wrapper for a load transaction.
    fn load(&mut self, address: u32, width: BusWidth) -> Result<u32, BusFault> {
        let mut data = 0;
        self.transact(address, width, BusOp::Load, &mut data)?;
        Ok(data)
    }

    /// Convenience wrapper for a store transaction.
    fn store(&mut self, address: u32, width: BusWidth, value: u32) -> Result<(), BusFault> {
        let mut data = value;
        self.transact(address, width, BusOp::Store, &mut data)
    }
}
