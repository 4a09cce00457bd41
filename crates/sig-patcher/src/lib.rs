//! Patches the host executable at signature matches when loaded into a process
//!
//! On load, the plugin reads `sig-patcher.toml` next to the dll, suspends every other
//! thread, indexes the executable image once, resolves every configured signature
//! against it, and writes each patch relative to its matches.

#![cfg_attr(not(windows), allow(dead_code))]

mod config;
mod console;
mod logging;
mod patch;
mod paths;

#[cfg(windows)]
mod image;
#[cfg(windows)]
mod memory;
#[cfg(windows)]
mod plugin;
#[cfg(windows)]
mod suspend;
