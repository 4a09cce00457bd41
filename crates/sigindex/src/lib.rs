//! Indexed signature scanning over static memory images
//!
//! Scanning a large image once per signature gets slow quickly. Instead, build a
//! [`ByteIndex`] over the image once, then resolve any number of wildcard
//! [`Signature`]s against it. Each query only walks the occurrence lists of the
//! signature's two rarest bytes, and checks the rest of the signature directly.
//!
//! ```
//! use sigindex::{ByteIndex, Signature};
//!
//! let image = [0x90, 0x72, 0x10, 0x48, 0x8D, 0x4C, 0x24, 0x20, 0xE8];
//! let index = ByteIndex::new(&image).unwrap();
//!
//! let sig: Signature = "72 ?? 48 8D 4C 24 ??".parse().unwrap();
//! assert_eq!(index.find_all(&sig), vec![1]);
//! ```
//!
//! The index borrows the image and never writes to it. Keeping the image stable while
//! the index is alive is up to the caller.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(missing_copy_implementations, missing_debug_implementations)]

pub mod index;
pub mod signature;

pub use index::{
    storage_len, ByteIndex, Heap, IndexError, Matches, Offsets, QueryPlan, StorageProvider,
};
pub use signature::{ParseError, Signature};
