//! # Blockdev — block-device port
//!
//! The storage engine talks to non-volatile memory exclusively through the
//! [`BlockDevice`] trait. A device exposes three operations — `read`,
//! `program`, `erase` — plus the per-address granularity of each. All
//! addresses are absolute within the device.
//!
//! ## Granularity contract
//!
//! - `program` addresses and lengths must be multiples of
//!   [`program_size`](BlockDevice::program_size).
//! - `erase` addresses and lengths must be multiples of
//!   [`erase_size`](BlockDevice::erase_size), and erasing a single sector
//!   must be atomic: after a power loss the sector is either fully erased or
//!   unchanged.
//! - `read` must accept arbitrary lengths; [`read_size`](BlockDevice::read_size)
//!   only advises buffer sizing in the caller.
//! - The erased byte value must be `0x00` or `0xFF`.
//!
//! Two implementations ship with the workspace: [`RamBlockDevice`] for tests
//! and benches (with power-cut fault injection), and [`FileBlockDevice`]
//! backing the CLI with an image file.

use std::io;
use thiserror::Error;

mod file;
mod ram;

pub use file::FileBlockDevice;
pub use ram::RamBlockDevice;

/// Errors surfaced by block-device implementations.
#[derive(Debug, Error)]
pub enum BdError {
    /// An underlying I/O error (file-backed devices).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// An access touched addresses outside the device.
    #[error("access at {addr:#x}+{len} is outside the device")]
    OutOfBounds { addr: u32, len: u32 },

    /// A program or erase violated its granularity contract.
    #[error("address {addr:#x} / length {len} not aligned to {required}")]
    Misaligned { addr: u32, len: u32, required: u32 },

    /// Power was lost while a program operation was in flight; only a prefix
    /// of the data reached the medium.
    #[error("power was lost during a program operation")]
    PowerCut,
}

/// A block-addressed non-volatile memory.
///
/// `&mut self` plays the role of the opaque per-device context handle:
/// implementations carry whatever state they need and the store threads the
/// device through every call.
pub trait BlockDevice {
    /// Reads `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), BdError>;

    /// Programs `data` at `addr`. Both `addr` and `data.len()` must be
    /// multiples of [`program_size`](Self::program_size) at `addr`.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), BdError>;

    /// Erases `len` bytes starting at `addr`. Both must be multiples of
    /// [`erase_size`](Self::erase_size) at `addr`.
    fn erase(&mut self, addr: u32, len: u32) -> Result<(), BdError>;

    /// Preferred read granularity at `addr`.
    fn read_size(&self, addr: u32) -> u32;

    /// Program page size at `addr`.
    fn program_size(&self, addr: u32) -> u32;

    /// Erase sector size at `addr`.
    fn erase_size(&self, addr: u32) -> u32;
}

pub(crate) fn check_aligned(addr: u32, len: u32, required: u32) -> Result<(), BdError> {
    if addr % required != 0 || len % required != 0 {
        return Err(BdError::Misaligned {
            addr,
            len,
            required,
        });
    }
    Ok(())
}

pub(crate) fn check_bounds(addr: u32, len: usize, device_len: u32) -> Result<(), BdError> {
    let end = addr as u64 + len as u64;
    if end > device_len as u64 {
        return Err(BdError::OutOfBounds {
            addr,
            len: len as u32,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
