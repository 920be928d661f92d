//! # Container Configuration
//!
//! Sizing knobs shared by the maps and pools, loaded once at startup from TOML.
//!
//! ```toml
//! initial_capacity = 64
//! max_shard_bytes = 1048576
//! pool_preallocate = 8
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{StrataError, StrataResult};

/// Largest byte size a single shard column may address.
///
/// Matches a signed 32-bit length, the ceiling most native collection
/// backends enforce on one allocation.
pub const DEFAULT_MAX_SHARD_BYTES: usize = i32::MAX as usize;

/// Default number of slots a fresh container reserves.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Sizing configuration for containers and pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    /// Slots reserved when a container (or a new shard) is created.
    pub initial_capacity: usize,
    /// Byte ceiling of one shard column; shard capacity is derived from it.
    pub max_shard_bytes: usize,
    /// Instances a pool creates eagerly.
    pub pool_preallocate: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_shard_bytes: DEFAULT_MAX_SHARD_BYTES,
            pool_preallocate: 0,
        }
    }
}

impl ContainerConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidConfig`] on malformed TOML, unknown keys,
    /// or values rejected by [`ContainerConfig::validate`].
    pub fn from_toml_str(source: &str) -> StrataResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| StrataError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every sizing value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidConfig`] if `initial_capacity` or
    /// `max_shard_bytes` is zero.
    pub fn validate(&self) -> StrataResult<()> {
        if self.initial_capacity == 0 {
            return Err(StrataError::InvalidConfig(
                "initial_capacity must be greater than zero".into(),
            ));
        }
        if self.max_shard_bytes == 0 {
            return Err(StrataError::InvalidConfig(
                "max_shard_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Number of elements of `stride` bytes one shard may hold.
    ///
    /// Never less than one.
    #[must_use]
    pub fn shard_capacity(&self, stride: usize) -> usize {
        (self.max_shard_bytes / stride.max(1)).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::default();
        assert_eq!(config.initial_capacity, DEFAULT_INITIAL_CAPACITY);
        assert_eq!(config.max_shard_bytes, DEFAULT_MAX_SHARD_BYTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = ContainerConfig::from_toml_str("pool_preallocate = 4\n").unwrap();
        assert_eq!(config.pool_preallocate, 4);
        assert_eq!(config.initial_capacity, DEFAULT_INITIAL_CAPACITY);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = ContainerConfig::from_toml_str("initial_capacity = 0").unwrap_err();
        assert!(matches!(err, StrataError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_key() {
        let err = ContainerConfig::from_toml_str("shard_count = 3").unwrap_err();
        assert!(matches!(err, StrataError::InvalidConfig(_)));
    }

    #[test]
    fn test_shard_capacity() {
        let config = ContainerConfig {
            max_shard_bytes: 64,
            ..ContainerConfig::default()
        };
        assert_eq!(config.shard_capacity(16), 4);
        assert_eq!(config.shard_capacity(100), 1);
        assert_eq!(config.shard_capacity(0), 64);
    }
}
