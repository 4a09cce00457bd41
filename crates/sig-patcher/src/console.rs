//! Developer console with a summary of what is about to be patched

use std::fmt::Write as _;

#[cfg(windows)]
use windows::{
    core::PCWSTR,
    Win32::System::Console::{
        AllocConsole, GetStdHandle, SetConsoleMode, SetConsoleTitleW, ENABLE_PROCESSED_OUTPUT,
        ENABLE_VIRTUAL_TERMINAL_PROCESSING, ENABLE_WRAP_AT_EOL_OUTPUT, STD_OUTPUT_HANDLE,
    },
};

use crate::config::Config;

const TITLE: &str = "Sig Patcher Debug Console";

/// Not meant to be run in production
#[cfg(windows)]
pub fn alloc_console() -> ::windows::core::Result<()> {
    unsafe {
        AllocConsole()?;
    }

    let handle = unsafe { GetStdHandle(STD_OUTPUT_HANDLE)? };

    unsafe {
        SetConsoleMode(
            handle,
            ENABLE_PROCESSED_OUTPUT
                | ENABLE_WRAP_AT_EOL_OUTPUT
                | ENABLE_VIRTUAL_TERMINAL_PROCESSING,
        )?;
    }

    let title = TITLE
        .encode_utf16()
        .chain(std::iter::once(0u16))
        .collect::<Vec<_>>();

    unsafe {
        SetConsoleTitleW(PCWSTR(title.as_ptr()))?;
    }

    Ok(())
}

pub fn print_intro(config: &Config) {
    println!("{}", intro(config));
}

/// Banner, build info, and every configured patch with its edit count and span
fn intro(config: &Config) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let built = env!("VERGEN_BUILD_DATE");
    let debug = cfg!(debug_assertions);

    let mut out = format!(
        r#"
********************************************************************************
*                                                                              *
*{TITLE:^78}*
*                                                                              *
********************************************************************************

Version {version} (debug: {debug}) built on {built}
Log level: {}
"#,
        config.log.level
    );

    _ = writeln!(out, "{} patch(es) configured:", config.patches.len());

    for patch in &config.patches {
        let bytes: usize = patch.edits.iter().map(|edit| edit.bytes.len()).sum();
        _ = writeln!(
            out,
            "  {:<32} {} edit(s), {bytes} byte(s)  [{}]",
            patch.name,
            patch.edits.len(),
            patch.signature
        );
    }

    out
}
