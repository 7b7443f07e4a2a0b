//! Core memory types and identifiers.

pub mod errors;
pub mod ids;
pub mod kinds;
pub mod record;

pub use errors::{MemoryError, MemoryResult};
pub use ids::{BookingId, MemoryId, TurnId};
pub use kinds::{KIND_METADATA_KEY, MemoryKind, MemoryKindParseError};
pub use record::{
    MemoryMetadata, MemoryRecord, MetadataValue, RankedMemory, RetrievalCandidate, kind_metadata,
};
