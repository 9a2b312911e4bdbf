//! Reference host: RAM plus the memory-mapped I/O fabric firmware
//! written for this platform expects (an LED register, a UART, and a
//! block-oriented SD-card device).
//!
//! Ported from the behaviour of the original bus callback
//! (`original_source/emulator/src/main.cpp`): RAM below
//! `IO_REGION_START`, eight fixed MMIO registers at or above it.
//! Actual SD-card persistence and POSIX terminal handling are kept
//! out of this module deliberately, since they're the host-process-level
//! concerns the core specification treats as external collaborators.

use queues::{IsQueue, Queue};

use crate::bus::{Bus, BusFault, BusOp, BusWidth};

pub const IO_REGION_START: u32 = 0xFFFF_FFE0;
pub const LED: u32 = 0xFFFF_FFFC;
pub const UART_OUT: u32 = 0xFFFF_FFF8;
pub const UART_IN: u32 = 0xFFFF_FFF4;
pub const SDCARD_BUSY: u32 = 0xFFFF_FFF0;
pub const SDCARD_READ_SECTOR: u32 = 0xFFFF_FFEC;
pub const SDCARD_NEXT_BYTE: u32 = 0xFFFF_FFE8;
pub const SDCARD_STATUS: u32 = 0xFFFF_FFE4;
pub const SDCARD_WRITE_SECTOR: u32 = 0xFFFF_FFE0;

const SECTOR_BYTES: usize = 512;
const IDLE: u32 = 0xFFFF_FFFF;

const DEFAULT_RAM_BYTES: usize = 2 * 1024 * 1024;
const DEFAULT_SECTORS: usize = 64;

/// A block-oriented storage device modeled as sectors held entirely
/// in memory. Spec names real SD-card file I/O as out of scope for
/// the core; this is the in-process stand-in a reference host needs
/// to actually exercise the `SDCARD_*` registers.
struct SdCard {
    sectors: Vec<[u8; SECTOR_BYTES]>,
    buffer: [u8; SECTOR_BYTES],
    index: usize,
}

impl SdCard {
    fn new(sector_count: usize) -> Self {
        Self {
            sectors: vec![[0u8; SECTOR_BYTES]; sector_count],
            buffer: [0u8; SECTOR_BYTES],
            index: 0,
        }
    }

    fn read_sector(&mut self, n: u32) -> Result<(), BusFault> {
        let sector = self
            .sectors
            .get(n as usize)
            .ok_or(BusFault(0x10))?;
        self.buffer.copy_from_slice(sector);
        self.index = 0;
        Ok(())
    }

    fn write_sector(&mut self, n: u32) -> Result<(), BusFault> {
        let sector = self
            .sectors
            .get_mut(n as usize)
            .ok_or(BusFault(0x11))?;
        sector.copy_from_slice(&self.buffer);
        Ok(())
    }

    fn next_byte_read(&mut self) -> u8 {
        let byte = self.buffer[self.index];
        self.index = (self.index + 1) % SECTOR_BYTES;
        byte
    }

    fn next_byte_write(&mut self, value: u8) {
        self.buffer[self.index] = value;
        self.index = (self.index + 1) % SECTOR_BYTES;
    }
}

/// The reference bus: RAM + the fixed MMIO register map in spec §6.3.
pub struct Platform {
    ram: Vec<u8>,
    led: u8,
    uart_in: Queue<u8>,
    uart_out: Queue<u8>,
    sdcard: SdCard,
}

impl Platform {
    pub fn new(ram_bytes: usize, sectors: usize) -> Self {
        Self {
            ram: vec![0xFF; ram_bytes],
            led: 0,
            uart_in: Queue::new(),
            uart_out: Queue::new(),
            sdcard: SdCard::new(sectors),
        }
    }

    /// Copy `image` into RAM starting at address 0, as the informative
    /// executable driver (spec §6.4) describes.
    pub fn load_image(&mut self, image: &[u8]) {
        let n = image.len().min(self.ram.len());
        self.ram[..n].copy_from_slice(&image[..n]);
    }

    /// Current LED value, for a host to render.
    pub fn led(&self) -> u8 {
        self.led
    }

    /// Queue a byte of terminal input for `UART_IN` to deliver,
    /// applying the host-side translation spec §6.3 requires
    /// (newline -> 0x0D, terminal backspace 0x08 -> serial 0x7F).
    pub fn feed_uart_in(&mut self, byte: u8) {
        let translated = match byte {
            b'\n' => 0x0D,
            0x08 => 0x7F,
            other => other,
        };
        self.uart_in.add(translated).expect("unbounded queue");
    }

    /// Drain everything written to `UART_OUT` so far, translating the
    /// 0x7F backspace convention into a terminal-renderable form.
    pub fn drain_uart_out(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(byte) = self.uart_out.remove() {
            if byte == 0x7F {
                out.extend_from_slice(b"\x08 \x08");
            } else {
                out.push(byte);
            }
        }
        out
    }

    fn mmio_load(&mut self, address: u32) -> Result<u32, BusFault> {
        match address {
            LED => Ok(0), // write-only; reads no-op to 0, matching the original host
            UART_OUT => Ok(IDLE),
            UART_IN => match self.uart_in.remove() {
                Ok(byte) => Ok(byte as u32),
                Err(_) => Ok(IDLE),
            },
            SDCARD_BUSY => Ok(0),
            SDCARD_READ_SECTOR | SDCARD_WRITE_SECTOR => Err(BusFault(0x21)), // write-only
            SDCARD_NEXT_BYTE => Ok(self.sdcard.next_byte_read() as u32),
            SDCARD_STATUS => Ok(0),
            _ => Err(BusFault(0x22)),
        }
    }

    fn mmio_store(&mut self, address: u32, value: u32) -> Result<(), BusFault> {
        match address {
            LED => {
                self.led = value as u8;
                Ok(())
            }
            UART_OUT => {
                self.uart_out.add(value as u8).expect("unbounded queue");
                Ok(())
            }
            UART_IN => Ok(()), // writes silently ignored
            SDCARD_BUSY | SDCARD_STATUS => Err(BusFault(0x23)), // read-only
            SDCARD_READ_SECTOR => self.sdcard.read_sector(value),
            SDCARD_WRITE_SECTOR => self.sdcard.write_sector(value),
            SDCARD_NEXT_BYTE => {
                self.sdcard.next_byte_write(value as u8);
                Ok(())
            }
            _ => Err(BusFault(0x24)),
        }
    }
}

impl Bus for Platform {
    fn transact(
        &mut self,
        address: u32,
        width: BusWidth,
        op: BusOp,
        data: &mut u32,
    ) -> Result<(), BusFault> {
        if address >= IO_REGION_START {
            log::trace!("mmio {op:?} addr={address:#010x} width={:?}", width);
            let result = match op {
                BusOp::Load => self.mmio_load(address).map(|v| *data = v),
                BusOp::Store => self.mmio_store(address, *data),
            };
            if let Err(fault) = &result {
                log::warn!("mmio {op:?} addr={address:#010x} faulted: {fault}");
            }
            return result;
        }

        let width = width.bytes();
        let end = address as u64 + width as u64;
        if end > self.ram.len() as u64 {
            log::warn!("out-of-range {op:?} at addr={address:#010x}");
            return Err(BusFault(0x01));
        }

        match op {
            BusOp::Load => {
                let mut value = 0u32;
                for i in 0..width {
                    value |= (self.ram[(address + i) as usize] as u32) << (8 * i);
                }
                *data = value;
            }
            BusOp::Store => {
                for i in 0..width {
                    self.ram[(address + i) as usize] = (*data >> (8 * i)) as u8;
                }
            }
        }
        Ok(())
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new(DEFAULT_RAM_BYTES, DEFAULT_SECTORS)
    }
}
