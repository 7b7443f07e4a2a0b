//! Preset memories seeded for demo users.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::kinds::MemoryKind;
use crate::memory::core::record::kind_metadata;
use crate::memory::storage::memory_store::MemoryStore;

/// A memory to seed, tagged with its kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetMemory {
    /// Memory category.
    pub kind: MemoryKind,
    /// Memory text.
    pub content: String,
}

impl PresetMemory {
    /// Create a preset.
    #[must_use]
    pub fn new(kind: MemoryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

/// Demo memories: one preference, two interests, one piece of terminology.
pub const DEFAULT_PRESETS: [(MemoryKind, &str); 4] = [
    (
        MemoryKind::Preference,
        "User prefers to schedule meetings on Friday afternoons.",
    ),
    (MemoryKind::Interest, "User follows EV industry news."),
    (MemoryKind::Interest, "User follows AI chip news."),
    (
        MemoryKind::Terminology,
        "User refers to project X as 'that mess'.",
    ),
];

/// Outcome of a preset load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PresetLoadReport {
    /// Newly stored memories.
    pub inserted: usize,
    /// Presets already present for the user.
    pub skipped: usize,
}

/// The default demo presets.
#[must_use]
pub fn default_presets() -> Vec<PresetMemory> {
    DEFAULT_PRESETS
        .iter()
        .map(|(kind, content)| PresetMemory::new(*kind, *content))
        .collect()
}

/// Store each preset for `user_id` unless an equivalent memory exists.
///
/// Loading the same presets twice leaves the store unchanged.
///
/// # Errors
/// Returns the first embedding or storage error; presets stored before the
/// failure stay stored.
pub async fn load_preset_memories(
    store: &dyn MemoryStore,
    user_id: &str,
    presets: &[PresetMemory],
) -> MemoryResult<PresetLoadReport> {
    let mut report = PresetLoadReport::default();
    for preset in presets {
        let metadata = kind_metadata(preset.kind, "preset");
        match store.insert_if_absent(user_id, &preset.content, metadata).await? {
            Some(_) => report.inserted += 1,
            None => report.skipped += 1,
        }
    }
    info!(user_id, inserted = report.inserted, skipped = report.skipped, "preset memories loaded");
    Ok(report)
}

/// Load [`DEFAULT_PRESETS`] for `user_id`.
///
/// # Errors
/// See [`load_preset_memories`].
pub async fn load_default_presets(store: &dyn MemoryStore, user_id: &str) -> MemoryResult<PresetLoadReport> {
    load_preset_memories(store, user_id, &default_presets()).await
}
