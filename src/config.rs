//! Configuration for the scanner and its tools

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::logging::LogConfig;
use crate::simd::SimdLevel;

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which scanning kernel to use
    pub simd: SimdPreference,
    /// Bytes requested per read from the input source
    pub read_buffer_size: usize,
    /// Logging settings
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simd: SimdPreference::Auto,
            read_buffer_size: 64 * 1024,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file; missing fields keep their defaults
    pub fn load(path: &Path) -> ScanResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), simd = ?config.simd, "loaded config");
        Ok(config)
    }

    /// Reject settings the scanner cannot run with
    pub fn validate(&self) -> ScanResult<()> {
        if self.read_buffer_size == 0 {
            return Err(ScanError::InvalidConfig(
                "read_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Preferred scanning kernel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimdPreference {
    /// Best available on this CPU
    #[default]
    Auto,
    /// Never use vector instructions
    Scalar,
    /// At most SSE2
    Sse2,
    /// At most AVX2
    Avx2,
}

impl SimdPreference {
    /// The level to run with: the preference, capped by what the CPU has
    pub fn resolve(self) -> SimdLevel {
        match self {
            SimdPreference::Auto => SimdLevel::detect(),
            SimdPreference::Scalar => SimdLevel::Scalar,
            SimdPreference::Sse2 => SimdLevel::Sse2.clamp_to_cpu(),
            SimdPreference::Avx2 => SimdLevel::Avx2.clamp_to_cpu(),
        }
    }
}
