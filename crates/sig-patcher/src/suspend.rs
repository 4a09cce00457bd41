//! Stop-the-world critical section over every other thread in the process

use std::{
    mem,
    sync::{Mutex, MutexGuard, PoisonError},
};

use windows::{
    core::{s, w},
    Win32::{
        Foundation::{CloseHandle, HANDLE, NTSTATUS},
        System::{
            LibraryLoader::{GetModuleHandleW, GetProcAddress},
            Threading::{
                GetCurrentProcess, GetCurrentThreadId, GetThreadId, ResumeThread, SuspendThread,
                THREAD_QUERY_LIMITED_INFORMATION, THREAD_SUSPEND_RESUME,
            },
        },
    },
};

type NtGetNextThreadFn = unsafe extern "system" fn(
    process: HANDLE,
    thread: HANDLE,
    desired_access: u32,
    handle_attributes: u32,
    flags: u32,
    new_thread: *mut HANDLE,
) -> NTSTATUS;

static SUSPEND_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, thiserror::Error)]
pub enum SuspendError {
    #[error(transparent)]
    Windows(#[from] windows::core::Error),
    #[error("could not find NtGetNextThread in ntdll.dll")]
    MissingExport,
}

/// Every other thread in the process stays suspended while this guard lives.
///
/// Only one guard exists at a time. Dropping it resumes the threads and closes
/// their handles.
#[derive(Debug)]
pub struct SuspendGuard {
    suspended: Vec<HANDLE>,
    _lock: MutexGuard<'static, ()>,
}

impl SuspendGuard {
    pub fn acquire() -> Result<Self, SuspendError> {
        Self::acquire_with_capacity(0x400)
    }

    /// Suspend with room for `capacity` handles, starting over with twice the room
    /// whenever the process has more threads than that
    fn acquire_with_capacity(mut capacity: usize) -> Result<Self, SuspendError> {
        let next_thread = nt_get_next_thread()?;

        let lock = SUSPEND_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            // reserve up front, a suspended thread may be holding the heap lock
            let mut suspended = Vec::with_capacity(capacity.max(1));

            if suspend_others(next_thread, &mut suspended) {
                return Ok(Self {
                    suspended,
                    _lock: lock,
                });
            }

            resume(&mut suspended);
            capacity = suspended.capacity() * 2;
        }
    }

    /// Number of threads this guard suspended
    pub fn len(&self) -> usize {
        self.suspended.len()
    }
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        resume(&mut self.suspended);
    }
}

/// Suspend every thread but this one into `suspended` without growing it.
///
/// Returns `false` if it ran out of room before the walk finished.
fn suspend_others(next_thread: NtGetNextThreadFn, suspended: &mut Vec<HANDLE>) -> bool {
    let process = unsafe { GetCurrentProcess() };
    let this_thread = unsafe { GetCurrentThreadId() };
    let access = (THREAD_QUERY_LIMITED_INFORMATION | THREAD_SUSPEND_RESUME).0;

    // (handle, whether we keep it open)
    let mut cursor: Option<(HANDLE, bool)> = None;

    loop {
        let previous = cursor.map(|(handle, _)| handle).unwrap_or_default();
        let mut next = HANDLE::default();

        let status = unsafe { next_thread(process, previous, access, 0, 0, &mut next) };

        if let Some((handle, false)) = cursor {
            _ = unsafe { CloseHandle(handle) };
        }

        if status.is_err() {
            return true;
        }

        if unsafe { GetThreadId(next) } == this_thread {
            cursor = Some((next, false));
            continue;
        }

        if suspended.len() == suspended.capacity() {
            _ = unsafe { CloseHandle(next) };
            return false;
        }

        let keep = unsafe { SuspendThread(next) } != u32::MAX;
        if keep {
            suspended.push(next);
        }

        cursor = Some((next, keep));
    }
}

fn resume(suspended: &mut Vec<HANDLE>) {
    for handle in suspended.drain(..) {
        unsafe {
            ResumeThread(handle);
            _ = CloseHandle(handle);
        }
    }
}

fn nt_get_next_thread() -> Result<NtGetNextThreadFn, SuspendError> {
    let ntdll = unsafe { GetModuleHandleW(w!("ntdll.dll"))? };
    let proc = unsafe { GetProcAddress(ntdll, s!("NtGetNextThread")) }
        .ok_or(SuspendError::MissingExport)?;

    // SAFETY: NtGetNextThread has had this signature since Vista
    Ok(unsafe { mem::transmute::<unsafe extern "system" fn() -> isize, NtGetNextThreadFn>(proc) })
}
