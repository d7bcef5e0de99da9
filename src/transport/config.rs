//! Transport configuration.

use crate::core::{MAX_SOCKETS_DEFAULT, SAP_NUMBER, SERVICE_NAME_MAX_LEN};

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Number of socket slots.
    pub max_sockets: usize,

    /// Longest service name accepted by `bind` and `connect`.
    pub max_service_name_len: usize,

    /// Keep the SAP assigned to an advertised service name across rebinds.
    pub cache_service_names: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_sockets: MAX_SOCKETS_DEFAULT,
            max_service_name_len: SERVICE_NAME_MAX_LEN,
            cache_service_names: true,
        }
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug)]
pub struct TransportBuilder {
    config: TransportConfig,
}

impl TransportBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
        }
    }

    /// Set the number of socket slots (clamped to 1..=64).
    pub fn max_sockets(mut self, max: usize) -> Self {
        self.config.max_sockets = max.clamp(1, usize::from(SAP_NUMBER));
        self
    }

    /// Set the longest accepted service name (clamped to 255).
    pub fn max_service_name_len(mut self, len: usize) -> Self {
        self.config.max_service_name_len = len.min(SERVICE_NAME_MAX_LEN);
        self
    }

    /// Enable or disable the service-name SAP cache.
    pub fn cache_service_names(mut self, enabled: bool) -> Self {
        self.config.cache_service_names = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.max_sockets, 16);
        assert_eq!(config.max_service_name_len, 255);
        assert!(config.cache_service_names);
    }

    #[test]
    fn test_builder_clamps() {
        let config = TransportBuilder::new()
            .max_sockets(1000)
            .max_service_name_len(4096)
            .cache_service_names(false)
            .build();
        assert_eq!(config.max_sockets, 64);
        assert_eq!(config.max_service_name_len, 255);
        assert!(!config.cache_service_names);

        assert_eq!(TransportBuilder::new().max_sockets(0).build().max_sockets, 1);
    }
}
