//! Backing storage for the index's position runs

use std::{
    alloc::{self, Layout},
    fmt,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
    slice,
};

use super::IndexError;

/// Supplies the memory a [`ByteIndex`](crate::ByteIndex) keeps its position runs in.
///
/// The index only ever asks for one contiguous run of `u16` units, and gives it back
/// through [`deallocate`](StorageProvider::deallocate) when it is dropped.
///
/// # Safety
/// - A pointer returned by `allocate(units)` must be aligned for `u16` and valid for
///   reads and writes of `units` elements until it is passed back to `deallocate`
/// - The memory must not be accessed by anyone else while the index holds it
pub unsafe trait StorageProvider {
    /// Allocate `units` `u16` elements. The contents may be uninitialized.
    ///
    /// Return `None` if the memory cannot be obtained.
    fn allocate(&self, units: usize) -> Option<NonNull<u16>>;

    /// Release memory previously returned by [`allocate`](StorageProvider::allocate)
    ///
    /// # Safety
    /// - `ptr` must come from `allocate` on this same provider with the same `units`
    unsafe fn deallocate(&self, ptr: NonNull<u16>, units: usize);
}

unsafe impl<P: StorageProvider + ?Sized> StorageProvider for &P {
    fn allocate(&self, units: usize) -> Option<NonNull<u16>> {
        (**self).allocate(units)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u16>, units: usize) {
        unsafe { (**self).deallocate(ptr, units) }
    }
}

/// The global heap
#[derive(Debug, Default, Copy, Clone)]
pub struct Heap;

unsafe impl StorageProvider for Heap {
    fn allocate(&self, units: usize) -> Option<NonNull<u16>> {
        let layout = Layout::array::<u16>(units).ok()?;
        if layout.size() == 0 {
            return Some(NonNull::dangling());
        }

        // SAFETY: layout has a non-zero size
        NonNull::new(unsafe { alloc::alloc(layout) }.cast())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u16>, units: usize) {
        let Ok(layout) = Layout::array::<u16>(units) else {
            return;
        };

        if layout.size() == 0 {
            return;
        }

        // SAFETY: caller guarantees ptr came from `allocate` with the same layout
        unsafe { alloc::dealloc(ptr.as_ptr().cast(), layout) }
    }
}

/// A zero-initialized run of `u16` owned through a [`StorageProvider`].
/// Returned to the provider on drop.
pub(crate) struct Storage<P: StorageProvider> {
    ptr: NonNull<u16>,
    units: usize,
    provider: P,
}

// SAFETY: Storage uniquely owns its allocation, like a Box<[u16]>
unsafe impl<P: StorageProvider + Send> Send for Storage<P> {}
unsafe impl<P: StorageProvider + Sync> Sync for Storage<P> {}

impl<P: StorageProvider> Storage<P> {
    pub(crate) fn new(units: usize, provider: P) -> Result<Self, IndexError> {
        let ptr = provider
            .allocate(units)
            .ok_or(IndexError::Alloc { units })?;

        // SAFETY: provider contract says ptr is valid for writes of `units` u16
        unsafe {
            ptr::write_bytes(ptr.as_ptr(), 0, units);
        }

        Ok(Self {
            ptr,
            units,
            provider,
        })
    }

    pub(crate) fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: StorageProvider> Deref for Storage<P> {
    type Target = [u16];

    fn deref(&self) -> &Self::Target {
        // SAFETY: ptr is valid and initialized for `units` elements for as long as we own it
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.units) }
    }
}

impl<P: StorageProvider> DerefMut for Storage<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: same as Deref, and &mut self guarantees exclusive access
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.units) }
    }
}

impl<P: StorageProvider> Drop for Storage<P> {
    fn drop(&mut self) {
        // SAFETY: ptr and units are exactly what `allocate` handed us
        unsafe { self.provider.deallocate(self.ptr, self.units) }
    }
}

impl<P: StorageProvider> fmt::Debug for Storage<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Storage({} units)", self.units)
    }
}
