//! Decodes accelerator profiling telemetry and correlates it into signed
//! per-operation descriptors.

pub mod analyzer;
pub mod config;
pub mod desc;
pub mod parser;
pub mod platform;
pub mod upload;

pub use analyzer::{Analyzer, Chunk};
pub use desc::{OpIndexTable, ProfOpDesc};
pub use platform::{ChipGeneration, FrequencyTable, PlatformContext, ProfilingMode};
pub use upload::{ChannelUploader, MemoryUploader, Uploader};
