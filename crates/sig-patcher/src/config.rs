use std::path::Path;
use std::{fs, path::PathBuf};

use eyre::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    // This is not part of the config, but rather used for
    // at runtime to remember where to save to
    #[serde(skip)]
    path: PathBuf,

    #[serde(default)]
    pub dev: Dev,
    #[serde(default)]
    pub log: Log,
    #[serde(default, rename = "patch")]
    pub patches: Vec<PatchConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Dev {
    /// show the developer console
    pub console: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Log {
    /// configure logger level
    pub level: String,
    /// whether to display log targets
    pub targets: bool,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            targets: false,
        }
    }
}

/// A signature to find, and what to write at every place it is found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchConfig {
    pub name: String,
    /// IDA-style pattern, e.g. `72 ?? 48 8D`
    pub signature: String,
    pub edits: Vec<EditConfig>,
}

/// Bytes written at `offset` past the start of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditConfig {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl EditConfig {
    fn new(offset: usize, bytes: &[u8]) -> Self {
        Self {
            offset,
            bytes: bytes.to_vec(),
        }
    }
}

/// Timing checks that trip when a debugger pauses the process
fn default_patches() -> Vec<PatchConfig> {
    vec![
        PatchConfig {
            name: "timed check 1 (short jumps)".to_owned(),
            signature: "7A ?? 75 ?? B9 ?? ?? ?? ?? E8 ?? ?? ?? ?? F3 0F 11 05".to_owned(),
            edits: vec![EditConfig::new(1, &[0x02]), EditConfig::new(3, &[0x00])],
        },
        PatchConfig {
            name: "timed check 1 (near jumps)".to_owned(),
            signature: "0F 8A ?? ?? ?? ?? 0F 85 ?? ?? ?? ?? B9 ?? ?? ?? ?? E8 ?? ?? ?? ?? F3 0F 11 05"
                .to_owned(),
            edits: vec![
                EditConfig::new(2, &6i32.to_le_bytes()),
                EditConfig::new(8, &0i32.to_le_bytes()),
            ],
        },
        PatchConfig {
            name: "timed check 2".to_owned(),
            signature: "73 ?? 0F 2F ?? 76 ?? 48 8D 15".to_owned(),
            edits: vec![EditConfig::new(1, &[0x00])],
        },
        PatchConfig {
            // displacement can't be edited, so the conditional jump becomes unconditional
            name: "timed check 3".to_owned(),
            signature: "72 ?? 48 8D 4C 24 ?? E8 ?? ?? ?? ?? 90 48 8B 05 ?? ?? ?? ?? FF D0"
                .to_owned(),
            edits: vec![EditConfig::new(0, &[0xEB])],
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            dev: Dev::default(),
            log: Log::default(),
            patches: default_patches(),
        }
    }
}

impl Config {
    /// Load a config file
    /// If path doesn't exist, creates and saves default config
    /// otherwise loads what's already there
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // if path doesn't exist, create default config,
        // save it, and return it
        if !path.exists() {
            let config = Self {
                path: path.to_owned(),
                ..Default::default()
            };

            config.save()?;
            return Ok(config);
        }

        let data = fs::read_to_string(path)?;
        let mut config = toml::from_str::<Self>(&data)?;

        // set the plugin config path
        path.clone_into(&mut config.path);

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let serialized = toml::to_string_pretty(self)?;
        fs::write(&self.path, serialized)?;

        Ok(())
    }
}
