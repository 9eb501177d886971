//! Runtime configuration for the posing pipeline.
//!
//! Options serialize to/from TOML so embedding applications can ship
//! presets. All fields use `#[serde(default)]` so partial files work.

use serde::{Deserialize, Serialize};

use crate::error::AnimaError;

/// Tunables for figure providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PosingOptions {
    /// Number of staging buffers backing the main figure's CPU readback.
    /// Two gives one frame of latency; more trades memory for tolerance
    /// of slow readers.
    pub staging_buffer_count: usize,
}

impl Default for PosingOptions {
    fn default() -> Self {
        Self {
            staging_buffer_count: 2,
        }
    }
}

impl PosingOptions {
    /// Parse options from a TOML string. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// `AnimaError::OptionsParse` on malformed TOML or invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self, AnimaError> {
        let options: Self = toml::from_str(content)
            .map_err(|e| AnimaError::OptionsParse(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Check value constraints.
    ///
    /// # Errors
    ///
    /// `AnimaError::OptionsParse` when `staging_buffer_count < 2` (a single
    /// slot would force CPU/GPU synchronization).
    pub fn validate(&self) -> Result<(), AnimaError> {
        if self.staging_buffer_count < 2 {
            return Err(AnimaError::OptionsParse(format!(
                "staging_buffer_count must be at least 2, got {}",
                self.staging_buffer_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = PosingOptions::default();
        assert_eq!(options.staging_buffer_count, 2);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let options = PosingOptions::from_toml_str("");
        assert!(matches!(options, Ok(o) if o == PosingOptions::default()));
    }

    #[test]
    fn explicit_value_parses() {
        let options = PosingOptions::from_toml_str("staging_buffer_count = 3");
        assert!(matches!(options, Ok(o) if o.staging_buffer_count == 3));
    }

    #[test]
    fn single_slot_is_rejected() {
        let options = PosingOptions::from_toml_str("staging_buffer_count = 1");
        assert!(matches!(options, Err(AnimaError::OptionsParse(_))));
    }
}
