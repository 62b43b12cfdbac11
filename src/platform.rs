use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::freq::FrequencyConverter;

/// Accelerator chip generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipGeneration {
    #[default]
    V1,
    V2,
    V3,
    V4,
}

impl ChipGeneration {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
            Self::V4 => "v4",
        }
    }
}

impl fmt::Display for ChipGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How completed device records are attributed before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilingMode {
    /// Keypoints split the run into steps; GE entries are step-indexed.
    StepTrace,
    /// Graphs with static shapes; GE entries are reused across steps.
    StaticShape,
    /// Single operator execution, no steps.
    SingleOp,
}

impl ProfilingMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StepTrace => "step_trace",
            Self::StaticShape => "static_shape",
            Self::SingleOp => "single_op",
        }
    }
}

impl fmt::Display for ProfilingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only platform flags for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformContext {
    #[serde(default)]
    pub chip: ChipGeneration,

    /// Global static-shape switch.
    #[serde(default)]
    pub static_shape: bool,

    /// Explicit mode; inferred from the data when absent.
    #[serde(default)]
    pub mode: Option<ProfilingMode>,
}

/// Counter frequencies per producer, in MHz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyTable {
    #[serde(default = "default_mhz")]
    pub hwts_mhz: f64,

    #[serde(default = "default_mhz")]
    pub ts_mhz: f64,

    #[serde(default = "default_mhz")]
    pub ffts_mhz: f64,
}

/// 1000 MHz is one cycle per nanosecond.
fn default_mhz() -> f64 {
    1000.0
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self {
            hwts_mhz: default_mhz(),
            ts_mhz: default_mhz(),
            ffts_mhz: default_mhz(),
        }
    }
}

impl FrequencyTable {
    pub fn hwts(&self) -> FrequencyConverter {
        FrequencyConverter::from_mhz(self.hwts_mhz)
    }

    pub fn ts(&self) -> FrequencyConverter {
        FrequencyConverter::from_mhz(self.ts_mhz)
    }

    pub fn ffts(&self) -> FrequencyConverter {
        FrequencyConverter::from_mhz(self.ffts_mhz)
    }
}
