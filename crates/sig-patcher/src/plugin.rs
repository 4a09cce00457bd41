//! Dll entry and the patch run

use std::{ffi::c_void, panic, thread};

use eyre::{Context, Result};
use sigindex::{ByteIndex, IndexError};
use tracing::{error, info, warn};
use windows::Win32::Foundation::HINSTANCE;
use windows::Win32::System::SystemServices::DLL_PROCESS_ATTACH;

use crate::{
    config::Config,
    console,
    image::Image,
    logging::setup_logging,
    memory::{self, MemError, VirtualStorage},
    patch::{self, Patch, PatchError, Plan},
    paths::{get_dll_dir, get_dll_dir_filepath},
    suspend::SuspendGuard,
};

// Dll entry point
#[no_mangle]
extern "C-unwind" fn DllMain(
    module: HINSTANCE,
    fdw_reason: u32,
    _lpv_reserved: *const c_void,
) -> bool {
    #[allow(clippy::single_match)]
    match fdw_reason {
        DLL_PROCESS_ATTACH => {
            // IMPORTANT to run this code in another thread since we're not allowed to do much in dllmain
            thread::spawn(move || {
                // make sure we catch panics so they don't propagate up any further
                // we already handle panic logging, so we don't care about the return value
                _ = panic::catch_unwind(move || {
                    let config = match pre_init(module) {
                        Ok(config) => config,
                        Err(e) => {
                            // whether this prints or not depends on which point it failed
                            error!("\nError:{e:?}");
                            return;
                        }
                    };

                    if let Err(error) = init(&config) {
                        error!("\nError:{error:?}");
                    }
                });
            });
        }

        _ => (),
    }

    true
}

fn pre_init(module: HINSTANCE) -> Result<Config> {
    // always spawn debug console when in debug mode
    #[cfg(debug_assertions)]
    console::alloc_console().context("failed to alloc console")?;

    let config_path =
        get_dll_dir_filepath(module, "sig-patcher.toml").context("failed to get dir path")?;
    let config = Config::load(config_path).context("failed to load config")?;

    #[cfg(not(debug_assertions))]
    if config.dev.console {
        console::alloc_console().context("Failed to alloc console")?;
    }

    if cfg!(debug_assertions) || config.dev.console {
        console::print_intro(&config);
    }

    // set up our actual log file handling
    let dll_dir = get_dll_dir(module).context("dll dir error")?;
    setup_logging(&dll_dir, &config).context("failed to setup logging")?;

    Ok(config)
}

fn init(config: &Config) -> Result<()> {
    let patches = config
        .patches
        .iter()
        .map(Patch::try_from)
        .collect::<Result<Vec<_>, _>>()
        .context("invalid patch in config")?;

    let image = Image::current().context("failed to locate executable image")?;

    info!(
        base = ?image.base(),
        len = image.len(),
        patches = patches.len(),
        "patching executable image"
    );

    // no logging or reports until the guard is dropped, a suspended thread may hold
    // the log writer or a lock the report hooks take
    let (outcome, suspended) = {
        let guard = SuspendGuard::acquire().context("failed to suspend threads")?;
        let outcome = patch_image(&image, &patches);

        (outcome, guard.len())
    };

    let plan = outcome?;

    for (name, found) in plan.resolved() {
        if *found == 0 {
            warn!(patch = %name, "signature not found");
        } else {
            info!(patch = %name, matches = found, "patched");
        }
    }

    info!(
        writes = plan.writes().len(),
        suspended, "finished patching"
    );

    Ok(())
}

/// Everything that can go wrong while other threads are suspended
#[derive(Debug, thiserror::Error)]
enum SuspendedError {
    #[error("failed to index image")]
    Index(#[source] IndexError),
    #[error("failed to plan patches")]
    Plan(#[source] PatchError),
    #[error("failed to write patches")]
    Write(#[source] MemError),
}

/// Index the image, plan every patch, and write them.
///
/// Must only run while every other thread is suspended.
fn patch_image(image: &Image, patches: &[Patch]) -> Result<Plan, SuspendedError> {
    let plan = {
        // SAFETY: every other thread is suspended, and we only write after the index is gone
        let buf = unsafe { image.as_slice() };
        let index = ByteIndex::new_in(buf, VirtualStorage).map_err(SuspendedError::Index)?;

        patch::plan(&index, patches).map_err(SuspendedError::Plan)?
    };

    // SAFETY: writes were bounds checked against this image, and nothing else is running
    unsafe { memory::apply(image, plan.writes()).map_err(SuspendedError::Write)? };

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EditConfig, PatchConfig};

    fn patch(signature: &str, offset: usize, bytes: &[u8]) -> Patch {
        let config = PatchConfig {
            name: signature.to_owned(),
            signature: signature.to_owned(),
            edits: vec![EditConfig {
                offset,
                bytes: bytes.to_vec(),
            }],
        };

        Patch::try_from(&config).unwrap()
    }

    #[test]
    fn patches_image_in_place() {
        let mut buf = vec![0x90, 0x72, 0x05, 0x48, 0x8D, 0x4C, 0x24, 0x20, 0xC3];
        let image = Image::from_slice(&mut buf);

        let plan = patch_image(&image, &[patch("72 ?? 48 8D", 0, &[0xEB])]).unwrap();

        assert_eq!(plan.resolved(), &[("72 ?? 48 8D".to_owned(), 1)]);
        assert_eq!(buf, [0x90, 0xEB, 0x05, 0x48, 0x8D, 0x4C, 0x24, 0x20, 0xC3]);
    }

    #[test]
    fn failure_is_a_typed_error_and_writes_nothing() {
        let mut buf = vec![0x72, 0x05, 0x48, 0x8D, 0x90, 0xC3];
        let image = Image::from_slice(&mut buf);

        let err = patch_image(
            &image,
            &[
                patch("72 ?? 48 8D", 0, &[0xEB]),
                patch("90 C3", 1, &[0xCC, 0xCC]),
            ],
        )
        .unwrap_err();

        assert!(matches!(
            err,
            SuspendedError::Plan(PatchError::OutOfBounds { at: 4, .. })
        ));
        assert_eq!(buf, [0x72, 0x05, 0x48, 0x8D, 0x90, 0xC3]);
    }
}
