//! Memory ingestion: presets, heuristic and model extraction, text normalization.

pub mod extractor;
pub mod extractor_llm;
pub mod normalize;
pub mod preset;

pub use extractor::{ExtractedMemory, HeuristicExtractor, store_extracted};
pub use extractor_llm::{LlmExtractor, MemoryExtractor};
pub use normalize::{normalize_text, same_memory};
pub use preset::{
    DEFAULT_PRESETS, PresetLoadReport, PresetMemory, default_presets, load_default_presets,
    load_preset_memories,
};
