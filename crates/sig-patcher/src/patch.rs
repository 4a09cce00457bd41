//! Turns configured patches into concrete writes against an indexed image

use sigindex::{ByteIndex, ParseError, Signature, StorageProvider};

use crate::config::{EditConfig, PatchConfig};

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("patch `{name}` has an invalid signature")]
    Signature {
        name: String,
        #[source]
        source: ParseError,
    },
    #[error("patch `{name}` has an empty edit at offset {offset:#x}")]
    EmptyEdit { name: String, offset: usize },
    #[error("patch `{name}` writes {len} bytes at match {at:#x} + {offset:#x}, past the end of the image")]
    OutOfBounds {
        name: String,
        at: usize,
        offset: usize,
        len: usize,
    },
}

/// A validated patch
#[derive(Debug, Clone)]
pub struct Patch {
    name: String,
    signature: Signature,
    edits: Vec<EditConfig>,
}

impl TryFrom<&PatchConfig> for Patch {
    type Error = PatchError;

    fn try_from(config: &PatchConfig) -> Result<Self, Self::Error> {
        let signature =
            Signature::parse(&config.signature).map_err(|source| PatchError::Signature {
                name: config.name.clone(),
                source,
            })?;

        if let Some(edit) = config.edits.iter().find(|edit| edit.bytes.is_empty()) {
            return Err(PatchError::EmptyEdit {
                name: config.name.clone(),
                offset: edit.offset,
            });
        }

        Ok(Self {
            name: config.name.clone(),
            signature,
            edits: config.edits.clone(),
        })
    }
}

/// Bytes to put at an absolute image offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

/// Every write for a batch of patches, and how many matches each patch had
#[derive(Debug, Default)]
pub struct Plan {
    writes: Vec<Write>,
    resolved: Vec<(String, usize)>,
}

impl Plan {
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// `(patch name, match count)` in patch order
    pub fn resolved(&self) -> &[(String, usize)] {
        &self.resolved
    }
}

/// Resolve every patch against `index`.
///
/// Nothing is logged here, since the caller may have every other thread suspended.
/// Fails without producing any writes if a single edit would leave the image.
pub fn plan<P: StorageProvider>(
    index: &ByteIndex<'_, P>,
    patches: &[Patch],
) -> Result<Plan, PatchError> {
    let len = index.buffer().len();
    let mut plan = Plan::default();

    for patch in patches {
        let mut found = 0;

        for at in index.matches(&patch.signature) {
            found += 1;

            for edit in &patch.edits {
                let offset = at
                    .checked_add(edit.offset)
                    .filter(|offset| {
                        offset
                            .checked_add(edit.bytes.len())
                            .is_some_and(|end| end <= len)
                    })
                    .ok_or_else(|| PatchError::OutOfBounds {
                        name: patch.name.clone(),
                        at,
                        offset: edit.offset,
                        len: edit.bytes.len(),
                    })?;

                plan.writes.push(Write {
                    offset,
                    bytes: edit.bytes.clone(),
                });
            }
        }

        plan.resolved.push((patch.name.clone(), found));
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(name: &str, signature: &str, edits: &[(usize, &[u8])]) -> Patch {
        let config = PatchConfig {
            name: name.to_owned(),
            signature: signature.to_owned(),
            edits: edits
                .iter()
                .map(|&(offset, bytes)| EditConfig {
                    offset,
                    bytes: bytes.to_vec(),
                })
                .collect(),
        };

        Patch::try_from(&config).unwrap()
    }

    #[test]
    fn writes_follow_every_match() {
        let image = [
            0x90, 0x73, 0x05, 0x0F, 0x2F, 0xC1, 0x76, 0x10, 0x48, 0x8D, 0x15, 0x90, 0x73, 0x7F,
            0x0F, 0x2F, 0xC8, 0x76, 0x22, 0x48, 0x8D, 0x15,
        ];
        let index = ByteIndex::new(&image).unwrap();
        let patches = [patch(
            "timed check 2",
            "73 ?? 0F 2F ?? 76 ?? 48 8D 15",
            &[(1, &[0x00])],
        )];

        let plan = plan(&index, &patches).unwrap();

        assert_eq!(
            plan.writes(),
            &[
                Write {
                    offset: 2,
                    bytes: vec![0x00]
                },
                Write {
                    offset: 13,
                    bytes: vec![0x00]
                },
            ]
        );
        assert_eq!(plan.resolved(), &[("timed check 2".to_owned(), 2)]);
    }

    #[test]
    fn unmatched_patch_is_reported_with_zero() {
        let index = ByteIndex::new(b"nothing to see here").unwrap();
        let patches = [patch("absent", "FF D0", &[(0, &[0x90, 0x90])])];

        let plan = plan(&index, &patches).unwrap();

        assert!(plan.writes().is_empty());
        assert_eq!(plan.resolved(), &[("absent".to_owned(), 0)]);
    }

    #[test]
    fn edit_past_image_end_fails_whole_plan() {
        let image = [0xEB, 0xFE, 0x00, 0xEB, 0xFE];
        let index = ByteIndex::new(&image).unwrap();
        let patches = [
            patch("fine", "EB FE ?? EB", &[(0, &[0x90])]),
            patch("loop", "EB FE", &[(1, &[0x90, 0x90])]),
        ];

        let err = plan(&index, &patches).unwrap_err();

        assert!(matches!(
            err,
            PatchError::OutOfBounds { ref name, at: 3, offset: 1, len: 2 } if name == "loop"
        ));
    }

    #[test]
    fn invalid_signature_names_the_patch() {
        let config = PatchConfig {
            name: "broken".to_owned(),
            signature: "?? 01 ??".to_owned(),
            edits: vec![],
        };

        let err = Patch::try_from(&config).unwrap_err();

        assert!(matches!(
            err,
            PatchError::Signature { ref name, source: ParseError::TooFewBytes { found: 1 } } if name == "broken"
        ));
    }

    #[test]
    fn empty_edit_is_rejected() {
        let config = PatchConfig {
            name: "noop".to_owned(),
            signature: "01 02".to_owned(),
            edits: vec![EditConfig {
                offset: 4,
                bytes: vec![],
            }],
        };

        assert!(matches!(
            Patch::try_from(&config),
            Err(PatchError::EmptyEdit { offset: 4, .. })
        ));
    }
}
