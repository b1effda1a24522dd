//! # Store - power-fail-safe key-value store
//!
//! The central orchestrator that ties together the [`blockdev`], [`record`],
//! and [`ramindex`] crates into a log-structured key-value store for
//! block-addressed non-volatile media (typically NOR flash).
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                    STORE                        │
//! │                                                 │
//! │ write.rs → find in RAM index → capacity checks  │
//! │              |                                  │
//! │              |  (append would overflow?)        │
//! │              |            yes                   │
//! │              v                                  │
//! │           gc.rs → compact live records into     │
//! │                   the swap area, commit by      │
//! │                   writing its area header       │
//! │              |                                  │
//! │              no                                 │
//! │              v                                  │
//! │           append record at free-space offset    │
//! │                                                 │
//! │ read.rs → RAM index → record codec (validate    │
//! │           key bytes, stream CRC, copy value)    │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage layout
//!
//! The caller-provided region is split into two equal halves ("areas"). One
//! is *active* and receives appends; the other is the *swap* target of the
//! next garbage collection. An active area starts with an area-header record
//! keyed `MTBAREAIDX` carrying a 16-bit version; of two valid headers, the
//! (wrap-aware) higher version wins at startup. Writing the swap area's
//! header is the single commit point of a GC — power loss anywhere before it
//! leaves the old area authoritative.
//!
//! ## Module responsibilities
//!
//! | Module      | Purpose                                               |
//! |-------------|-------------------------------------------------------|
//! | `lib.rs`    | `Store` struct, `open`, accessors, errors, `SharedStore` |
//! | `areas.rs`  | Half selection, version comparison, erase discipline  |
//! | `replay.rs` | Log replay building the RAM index at startup          |
//! | `read.rs`   | `read`/`get`/`value_size`/`contains`, hash-run lookup |
//! | `write.rs`  | `write`/`delete` mutation pipeline, `reset`           |
//! | `gc.rs`     | Compaction with optional folded in-flight mutation    |
//!
//! ## Crash safety
//!
//! A mutation commits through exactly one of two writes: a successful record
//! append in the active area, or a successful area-header write in the swap
//! area. A torn append leaves a trailing corrupt or erased record that replay
//! either stops at or compacts away; a torn GC leaves the old area's header
//! untouched and authoritative.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use blockdev::{BdError, BlockDevice};
use ramindex::{IndexError, RamIndex};
use record::RecordError;

mod areas;
mod gc;
mod read;
mod replay;
mod write;

pub use record::MAX_KEY_SIZE;

/// Lower bound on the transaction buffer size.
const MIN_BUFFER_SIZE: u32 = 128;
/// Version written into the first area header of a fresh medium.
const INITIAL_AREA_VERSION: u16 = 1;
/// Key of the area-header record identifying an active area.
const AREA_HEADER_KEY: &[u8] = b"MTBAREAIDX";
/// The area-header value: `{version: u16 LE, format_version: u16 LE}`.
const AREA_HEADER_VALUE_LEN: usize = 4;

/// Errors returned by the public store API.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An invalid argument (empty/oversized/non-ASCII key, zero length).
    #[error("invalid parameter")]
    BadParam,

    /// The region is not erase-sector aligned or not an even sector count.
    #[error("storage region is not erase-sector aligned or not an even sector count")]
    Alignment,

    /// A heap allocation failed (transaction buffer, index growth, `get`).
    #[error("memory allocation failed")]
    MemAlloc,

    /// A record or area header failed validation.
    #[error("record is corrupt")]
    InvalidData,

    /// The caller's buffer cannot hold the stored value; retry with
    /// `required` bytes.
    #[error("destination buffer too small, {required} bytes required")]
    BufferTooSmall { required: u32 },

    /// The key is not in the store.
    #[error("item not found")]
    ItemNotFound,

    /// The live data set does not fit one area.
    #[error("storage is full")]
    StorageFull,

    /// A thread panicked while holding the [`SharedStore`] lock.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Pass-through block-device error.
    #[error("block device error: {0}")]
    Device(#[from] BdError),
}

impl From<RecordError> for StoreError {
    fn from(err: RecordError) -> Self {
        match err {
            // Erased is an internal free-space sentinel; if it ever crosses
            // this boundary the record was expected to exist, so it is as
            // corrupt as a bad CRC.
            RecordError::Erased | RecordError::Invalid => StoreError::InvalidData,
            RecordError::KeyMismatch => StoreError::ItemNotFound,
            RecordError::BufferTooSmall { required } => StoreError::BufferTooSmall { required },
            RecordError::Device(e) => StoreError::Device(e),
        }
    }
}

impl From<IndexError> for StoreError {
    fn from(_: IndexError) -> Self {
        StoreError::MemAlloc
    }
}

/// A key-value store over one block device region.
///
/// All operations take `&mut self`: exclusive access is enforced at compile
/// time. Multi-threaded callers wrap the store in [`SharedStore`].
pub struct Store<B: BlockDevice> {
    pub(crate) bd: B,
    pub(crate) start_addr: u32,
    pub(crate) length: u32,

    pub(crate) index: RamIndex,
    /// Transaction buffer: `align_up(max(program, read, 128), program)`
    /// bytes, shared by buffered writes, streamed CRC reads and GC copies.
    pub(crate) buf: Vec<u8>,

    pub(crate) active_area_addr: u32,
    pub(crate) gc_area_addr: u32,
    /// Offset within the active area where the next append begins.
    pub(crate) free_space_offset: u32,
    pub(crate) active_area_version: u16,
    /// Bytes occupied by live records plus the area header.
    pub(crate) consumed_size: u32,
}

impl<B: BlockDevice> Store<B> {
    /// Opens a store over `[start_addr, start_addr + length)` of `bd`,
    /// scanning the medium and building the RAM index.
    ///
    /// # Constraints
    ///
    /// - `start_addr` and `start_addr + length` must be erase-sector aligned.
    /// - The region must span a positive, even number of erase sectors.
    /// - The region must have uniform read/program/erase characteristics.
    ///
    /// A fresh (fully erased) region is formatted on the spot: the lower
    /// half becomes the active area with version 1.
    pub fn open(bd: B, start_addr: u32, length: u32) -> Result<Self, StoreError> {
        if length == 0 {
            return Err(StoreError::BadParam);
        }
        let end = start_addr.checked_add(length).ok_or(StoreError::BadParam)?;

        let erase_size = bd.erase_size(start_addr);
        if start_addr % erase_size != 0 || end % erase_size != 0 {
            return Err(StoreError::Alignment);
        }
        let sectors = length / erase_size;
        if sectors == 0 || sectors % 2 != 0 {
            return Err(StoreError::Alignment);
        }

        let program_size = bd.program_size(start_addr);
        let read_size = bd.read_size(start_addr);
        let buffer_size = align_up(
            program_size.max(read_size).max(MIN_BUFFER_SIZE),
            program_size,
        ) as usize;

        let mut buf = Vec::new();
        buf.try_reserve_exact(buffer_size)
            .map_err(|_| StoreError::MemAlloc)?;
        buf.resize(buffer_size, 0);

        let index = RamIndex::new()?;

        let mut store = Self {
            bd,
            start_addr,
            length,
            index,
            buf,
            active_area_addr: start_addr,
            gc_area_addr: start_addr + length / 2,
            free_space_offset: 0,
            active_area_version: 0,
            consumed_size: 0,
        };
        store.setup_areas()?;
        store.build_ram_index()?;
        Ok(store)
    }

    /// Bytes consumed by live records (including the area header).
    #[must_use]
    pub fn size(&self) -> u32 {
        self.consumed_size
    }

    /// Bytes still available for live records.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.area_size() - self.consumed_size
    }

    /// Capacity of one area (half the region).
    #[must_use]
    pub fn area_size(&self) -> u32 {
        self.length / 2
    }

    /// Number of live keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    /// Base address of the area currently receiving appends. Changes on
    /// every garbage collection; diagnostic only.
    #[must_use]
    pub fn active_area_addr(&self) -> u32 {
        self.active_area_addr
    }

    /// Consumes the store, returning the block device. Dropping the store
    /// releases everything else; the on-medium state is always consistent.
    pub fn into_device(self) -> B {
        self.bd
    }
}

impl<B: BlockDevice> fmt::Debug for Store<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("start_addr", &self.start_addr)
            .field("length", &self.length)
            .field("active_area_addr", &self.active_area_addr)
            .field("active_area_version", &self.active_area_version)
            .field("free_space_offset", &self.free_space_offset)
            .field("consumed_size", &self.consumed_size)
            .field("key_count", &self.index.len())
            .field("buffer_size", &self.buf.len())
            .finish()
    }
}

/// Mutex-guarded store for multi-threaded callers.
///
/// Every operation acquires the lock for its full duration, so operations
/// are linearizable: a completed write is visible to all later reads from
/// any thread. A poisoned lock surfaces as [`StoreError::LockPoisoned`].
pub struct SharedStore<B: BlockDevice> {
    inner: Mutex<Store<B>>,
}

impl<B: BlockDevice> SharedStore<B> {
    pub fn new(store: Store<B>) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    /// Opens a store (see [`Store::open`]) and wraps it.
    pub fn open(bd: B, start_addr: u32, length: u32) -> Result<Self, StoreError> {
        Ok(Self::new(Store::open(bd, start_addr, length)?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store<B>>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.lock()?.write(key, data)
    }

    pub fn read(&self, key: &str, data: &mut [u8]) -> Result<u32, StoreError> {
        self.lock()?.read(key, data)
    }

    pub fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.lock()?.get(key)
    }

    pub fn value_size(&self, key: &str) -> Result<u32, StoreError> {
        self.lock()?.value_size(key)
    }

    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        self.lock()?.contains(key)
    }

    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.delete(key)
    }

    pub fn reset(&self) -> Result<(), StoreError> {
        self.lock()?.reset()
    }

    pub fn size(&self) -> Result<u32, StoreError> {
        Ok(self.lock()?.size())
    }

    pub fn remaining(&self) -> Result<u32, StoreError> {
        Ok(self.lock()?.remaining())
    }

    /// Unwraps the store, waiting for no one: consuming `self` proves no
    /// other thread still holds a reference.
    pub fn into_inner(self) -> Result<Store<B>, StoreError> {
        self.inner.into_inner().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Key validation shared by every public operation: non-empty ASCII shorter
/// than [`MAX_KEY_SIZE`].
pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.len() >= MAX_KEY_SIZE || !key.is_ascii() {
        return Err(StoreError::BadParam);
    }
    Ok(())
}

pub(crate) fn align_up(val: u32, to: u32) -> u32 {
    val.div_ceil(to) * to
}

#[cfg(test)]
mod tests;
