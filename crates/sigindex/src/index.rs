//! Per-byte-value position index over a static buffer
//!
//! For every byte value the index stores where it occurs in the buffer. The buffer
//! is cut into blocks of [`BLOCK_LEN`] bytes so each position fits in a `u16`
//! relative to its block. Every value gets one run per block, each closed by a
//! [`SENTINEL`], so walking a value's runs in order rebuilds absolute offsets
//! without any per-block table.
//!
//! ```text
//! value 0x48: [ 0 17 9001 FFFF | 3 FFFF | FFFF | ... ]
//!               block 0          block 1  block 2
//! ```

mod matcher;
mod plan;
mod storage;

use std::{array, fmt, iter::FusedIterator, mem, slice};

use tracing::debug;

use crate::Signature;

pub use self::{
    matcher::Matches,
    plan::QueryPlan,
    storage::{Heap, StorageProvider},
};
use self::storage::Storage;

/// Bytes per block. Block relative positions are `0..BLOCK_LEN`.
pub const BLOCK_LEN: usize = 0xFFFF;

/// Closes a value's run within one block
pub const SENTINEL: u16 = 0xFFFF;

/// The largest buffer that can be indexed.
///
/// Positions plus 256 sentinels per block must be addressable with a `u32`.
pub const MAX_BUFFER_LEN: usize = 4_278_255_103;

/// An error for the [index](crate::index) module
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// buffer needs more index storage than a u32 can address
    #[error("buffer is {len} bytes long, at most {max} bytes can be indexed")]
    TooLarge {
        /// rejected buffer length
        len: usize,
        /// largest supported buffer length
        max: usize,
    },
    /// storage provider refused the allocation
    #[error("failed to allocate {units} index units")]
    Alloc {
        /// number of u16 units requested
        units: usize,
    },
}

/// Number of `u16` units needed to index a buffer of `len` bytes
pub fn storage_len(len: usize) -> Result<u32, IndexError> {
    let blocks = len.div_ceil(BLOCK_LEN) as u64;
    let units = len as u64 + blocks * 256;

    u32::try_from(units).map_err(|_| IndexError::TooLarge {
        len,
        max: MAX_BUFFER_LEN,
    })
}

/// A position index over a borrowed byte buffer.
///
/// Built once in time linear to the buffer, then queried any number of times with
/// different [`Signature`]s. The index only reads the buffer; the caller must keep it
/// from changing while the index is alive.
///
/// # Example
///
/// ```
/// use sigindex::{ByteIndex, Signature};
///
/// let image = b"\x48\x8B\x05\x01\x02\x03\x04\xFF\xD0";
/// let index = ByteIndex::new(image).unwrap();
///
/// let sig = Signature::parse("48 8B 05 ?? ?? ?? ?? FF D0").unwrap();
/// assert_eq!(index.find_first(&sig), Some(0));
/// ```
pub struct ByteIndex<'a, P: StorageProvider = Heap> {
    buf: &'a [u8],
    // bounds[v]..bounds[v + 1] is the run span of value v
    bounds: [u32; 257],
    blocks: u32,
    runs: Storage<P>,
}

impl<'a> ByteIndex<'a, Heap> {
    /// Index `buf` using the global heap for storage
    pub fn new(buf: &'a [u8]) -> Result<Self, IndexError> {
        Self::new_in(buf, Heap)
    }
}

impl<'a, P: StorageProvider> ByteIndex<'a, P> {
    /// Index `buf`, taking storage from `provider`
    pub fn new_in(buf: &'a [u8], provider: P) -> Result<Self, IndexError> {
        let units = storage_len(buf.len())?;
        let blocks = buf.len().div_ceil(BLOCK_LEN) as u32;

        let mut counts = [0u32; 256];
        for &byte in buf {
            counts[byte as usize] += 1;
        }

        let mut bounds = [0u32; 257];
        for value in 0..256 {
            bounds[value + 1] = bounds[value] + counts[value] + blocks;
        }

        debug_assert_eq!(bounds[256], units);

        let mut runs = Storage::new(units as usize, provider)?;
        let mut cursors: [usize; 256] = array::from_fn(|value| bounds[value] as usize);

        for block in buf.chunks(BLOCK_LEN) {
            for (pos, &byte) in block.iter().enumerate() {
                let cursor = &mut cursors[byte as usize];
                runs[*cursor] = pos as u16;
                *cursor += 1;
            }

            for cursor in &mut cursors {
                runs[*cursor] = SENTINEL;
                *cursor += 1;
            }
        }

        let index = Self {
            buf,
            bounds,
            blocks,
            runs,
        };

        debug!(
            len = buf.len(),
            blocks,
            storage = index.storage_bytes(),
            "built byte index"
        );

        Ok(index)
    }

    /// How many times `value` occurs in the buffer
    pub fn count(&self, value: u8) -> u32 {
        let value = value as usize;
        self.bounds[value + 1] - self.bounds[value] - self.blocks
    }

    /// Ascending absolute offsets at which `value` occurs
    pub fn offsets(&self, value: u8) -> Offsets<'_> {
        Offsets::new(self.run(value))
    }

    fn run(&self, value: u8) -> &[u16] {
        let value = value as usize;
        let start = self.bounds[value] as usize;
        let end = self.bounds[value + 1] as usize;

        &self.runs[start..end]
    }

    /// Order the signature's concrete bytes rarest first
    pub fn plan(&self, sig: &Signature) -> QueryPlan {
        QueryPlan::new(self, sig)
    }

    /// Lazily yield every offset at which `sig` matches, in ascending order
    pub fn matches(&self, sig: &Signature) -> Matches<'_> {
        Matches::new(self, self.plan(sig), sig.len())
    }

    /// All offsets at which `sig` matches, in ascending order
    pub fn find_all(&self, sig: &Signature) -> Vec<usize> {
        self.matches(sig).collect()
    }

    /// The lowest offset at which `sig` matches
    pub fn find_first(&self, sig: &Signature) -> Option<usize> {
        self.matches(sig).next()
    }

    /// The indexed buffer
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    /// Number of blocks the buffer was split into
    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    /// Memory used by the index itself, not counting the buffer
    pub fn storage_bytes(&self) -> usize {
        mem::size_of::<Self>() + self.runs.len() * mem::size_of::<u16>()
    }

    /// The provider the index storage came from
    pub fn provider(&self) -> &P {
        self.runs.provider()
    }
}

impl<P: StorageProvider> fmt::Debug for ByteIndex<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteIndex")
            .field("len", &self.buf.len())
            .field("blocks", &self.blocks)
            .field("runs", &self.runs)
            .finish()
    }
}

/// Iterator over the absolute offsets of one byte value.
///
/// Decodes a value's block runs, stepping the block base forward at every sentinel.
#[derive(Debug, Clone)]
pub struct Offsets<'i> {
    run: slice::Iter<'i, u16>,
    base: usize,
}

impl<'i> Offsets<'i> {
    fn new(run: &'i [u16]) -> Self {
        Self {
            run: run.iter(),
            base: 0,
        }
    }
}

impl Iterator for Offsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        for &unit in self.run.by_ref() {
            if unit == SENTINEL {
                self.base += BLOCK_LEN;
                continue;
            }

            return Some(self.base + unit as usize);
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.run.len()))
    }
}

impl FusedIterator for Offsets<'_> {}
