//! The host executable's mapped image

use std::{mem, slice};

use windows::{
    core::PCWSTR,
    Win32::System::{
        LibraryLoader::GetModuleHandleW,
        ProcessStatus::{GetModuleInformation, MODULEINFO},
        Threading::GetCurrentProcess,
    },
};

/// Address range of the process's main module
#[derive(Debug)]
pub struct Image {
    base: *mut u8,
    len: usize,
}

unsafe impl Send for Image {}
unsafe impl Sync for Image {}

impl Image {
    /// The image of the executable that started this process
    pub fn current() -> windows::core::Result<Self> {
        let module = unsafe { GetModuleHandleW(PCWSTR::null())? };

        let mut module_info = MODULEINFO::default();

        unsafe {
            GetModuleInformation(
                GetCurrentProcess(),
                module,
                &mut module_info,
                mem::size_of::<MODULEINFO>() as u32,
            )?;
        }

        Ok(Self {
            base: module_info.lpBaseOfDll.cast(),
            len: module_info.SizeOfImage as usize,
        })
    }

    #[cfg(test)]
    pub fn from_slice(buf: &mut [u8]) -> Self {
        Self {
            base: buf.as_mut_ptr(),
            len: buf.len(),
        }
    }

    pub fn base(&self) -> *mut u8 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// View the image as bytes
    ///
    /// # Safety
    /// - nothing may write to the image while the returned slice is alive
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: the loader maps SizeOfImage readable bytes at the module base
        unsafe { slice::from_raw_parts(self.base, self.len) }
    }
}
