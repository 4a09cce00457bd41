//! Files that live next to the plugin dll

#[cfg(windows)]
use std::{ffi::OsString, os::windows::prelude::OsStringExt};
use std::path::{Path, PathBuf};

#[cfg(windows)]
use windows::Win32::{
    Foundation::{HINSTANCE, MAX_PATH},
    System::LibraryLoader::GetModuleFileNameW,
};

/// Longest path the loader can report, in wide chars
const LONGEST_PATH: usize = 0x8000;

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("{0} dir not found")]
    NotFound(String),
    #[error("module path is longer than {LONGEST_PATH} characters")]
    TooLong,
    #[cfg(windows)]
    #[error(transparent)]
    Windows(#[from] windows::core::Error),
}

/// Run a wide string query that truncates silently, growing the buffer until the
/// result fits.
///
/// `fill` returns how many chars it wrote. A result that fills the whole buffer
/// may have been cut short, so it is retried with twice the room.
fn read_wide(
    mut capacity: usize,
    mut fill: impl FnMut(&mut [u16]) -> Result<usize, PathError>,
) -> Result<Vec<u16>, PathError> {
    loop {
        let mut buf = vec![0; capacity];
        let written = fill(&mut buf)?;

        if written < buf.len() {
            buf.truncate(written);
            return Ok(buf);
        }

        if capacity >= LONGEST_PATH {
            return Err(PathError::TooLong);
        }

        capacity = (capacity * 2).min(LONGEST_PATH);
    }
}

/// Get path to dll `<dll_dir>\sig_patcher.dll`
#[cfg(windows)]
pub fn get_dll_path(module: HINSTANCE) -> Result<PathBuf, PathError> {
    let path = read_wide(MAX_PATH as usize, |buf| {
        let written = unsafe { GetModuleFileNameW(module, buf) };

        // last error is only meaningful when the call reports failure
        if written == 0 {
            return Err(windows::core::Error::from_win32().into());
        }

        Ok(written as usize)
    })?;

    Ok(PathBuf::from(OsString::from_wide(&path)))
}

/// Get path to dll's parent dir
#[cfg(windows)]
pub fn get_dll_dir(module: HINSTANCE) -> Result<PathBuf, PathError> {
    let dll_path = get_dll_path(module)?;
    parent_dir(&dll_path)
}

/// Get path to `<dll_dir>\<filename>`
#[cfg(windows)]
pub fn get_dll_dir_filepath<P: AsRef<Path>>(
    module: HINSTANCE,
    path: P,
) -> Result<PathBuf, PathError> {
    Ok(get_dll_dir(module)?.join(path))
}

fn parent_dir(path: &Path) -> Result<PathBuf, PathError> {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| PathError::NotFound("parent".into()))
}
