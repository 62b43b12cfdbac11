//! Producer stream decoding.
//!
//! One parser per producer. Each exposes a framing callback for the
//! [`chunk::ChunkReassembler`] and owns its draft and completed tables.

pub mod chunk;
pub mod ffts;
pub mod freq;
pub mod ge;
pub mod hwts;
pub mod record;
pub mod rt;
pub mod stats;
pub mod ts;
pub mod wire;

pub use chunk::{ChunkReassembler, Frame};
pub use freq::FrequencyConverter;
pub use record::{OpFlag, OpKey, OpTimeRecord, OpTimeTable, NO_CONTEXT};
pub use stats::{AnalyzerStats, Counter, SourceKind};
pub use wire::DecodeError;
