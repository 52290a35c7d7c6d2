//! Deterministic variant selection.

use thiserror::Error;

use crate::{MediaKind, StreamVariant};

/// What the selector looks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub kind: MediaKind,
}

impl SelectionPolicy {
    pub fn new(kind: MediaKind) -> Self {
        Self { kind }
    }

    pub fn audio_only() -> Self {
        Self::new(MediaKind::AudioOnly)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("No {kind} variant among {available} available")]
    NoMatchingVariant { kind: MediaKind, available: usize },
}

/// Pick the lowest-bitrate variant of the requested kind.
///
/// Unknown bitrates sort first. The sort is stable, so equal bitrates keep
/// catalog order and identical inputs always yield the same variant.
pub fn select(
    variants: &[StreamVariant],
    policy: &SelectionPolicy,
) -> Result<StreamVariant, SelectError> {
    let mut matching: Vec<&StreamVariant> = variants
        .iter()
        .filter(|variant| policy.kind.matches(variant))
        .collect();

    matching.sort_by_key(|variant| variant.effective_bitrate());

    matching
        .first()
        .map(|variant| (*variant).clone())
        .ok_or(SelectError::NoMatchingVariant {
            kind: policy.kind,
            available: variants.len(),
        })
}
