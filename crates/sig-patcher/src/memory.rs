//! Writes into executable memory, and index storage outside the process heap

use std::{ffi::c_void, ptr, ptr::NonNull};

use sigindex::StorageProvider;
use windows::Win32::System::{
    Diagnostics::Debug::FlushInstructionCache,
    Memory::{
        VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
        PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS, PAGE_READWRITE,
    },
    Threading::GetCurrentProcess,
};

use crate::{image::Image, patch::Write};

/// An error for the [memory](crate::memory) module
#[derive(Debug, Clone, thiserror::Error)]
pub enum MemError {
    /// write does not fit in the image
    #[error("write of {len} bytes at offset {offset:#x} is outside the image")]
    OutOfBounds { offset: usize, len: usize },
    /// a windows error
    #[error(transparent)]
    Windows(#[from] windows::core::Error),
}

/// Change memory protection of a certain region of memory, returning the old protection
///
/// # Safety
/// - address must be valid for up to `size` bytes
/// - any safety requirements of VirtualProtect
unsafe fn prot(
    addr: *const c_void,
    size: usize,
    prot: PAGE_PROTECTION_FLAGS,
) -> Result<PAGE_PROTECTION_FLAGS, MemError> {
    let mut old_prot = PAGE_PROTECTION_FLAGS::default();

    unsafe {
        VirtualProtect(addr, size, prot, &mut old_prot)?;
    }

    Ok(old_prot)
}

/// Write `src` to `dst`, lifting page protection for the duration of the write
///
/// # Safety
/// - dst must be valid for up to src.len() bytes
/// - nothing else may access dst..dst+src.len() concurrently
pub unsafe fn write_protected(dst: *mut u8, src: &[u8]) -> Result<(), MemError> {
    let old = unsafe { prot(dst.cast(), src.len(), PAGE_EXECUTE_READWRITE)? };

    unsafe {
        ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
    }

    unsafe { prot(dst.cast(), src.len(), old)? };

    Ok(())
}

/// Apply every write to the image, then flush the instruction cache
///
/// # Safety
/// - no other thread may be executing or reading the written ranges
pub unsafe fn apply(image: &Image, writes: &[Write]) -> Result<(), MemError> {
    for write in writes {
        let len = write.bytes.len();

        if write
            .offset
            .checked_add(len)
            .map_or(true, |end| end > image.len())
        {
            return Err(MemError::OutOfBounds {
                offset: write.offset,
                len,
            });
        }

        // SAFETY: bounds checked against the image above
        unsafe { write_protected(image.base().add(write.offset), &write.bytes)? };
    }

    unsafe {
        FlushInstructionCache(GetCurrentProcess(), None, 0)?;
    }

    Ok(())
}

/// Index storage from `VirtualAlloc`, so building an index never takes the heap lock
#[derive(Debug, Default, Copy, Clone)]
pub struct VirtualStorage;

unsafe impl StorageProvider for VirtualStorage {
    fn allocate(&self, units: usize) -> Option<NonNull<u16>> {
        let size = units.checked_mul(2)?.max(1);

        // page aligned, so aligned for u16
        let alloc = unsafe { VirtualAlloc(None, size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };

        NonNull::new(alloc.cast())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u16>, _units: usize) {
        _ = unsafe { VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE) };
    }
}
