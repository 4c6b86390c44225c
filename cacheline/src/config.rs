//! Client configuration.

use std::net::SocketAddr;

use mcproto::value::{DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_MIN_SAVINGS_PCT, ValuePipeline};

/// Wire protocol selection, fixed at client construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Line-oriented ASCII protocol.
    Text,
    /// Fixed-header binary protocol.
    Binary,
}

/// Configuration for a [`Client`](crate::Client).
///
/// Server order is load-bearing: a key maps to `hash(key) %
/// servers.len()`, so reordering or resizing the list remaps nearly all
/// keys. Treat the list as append-only between deployments, or accept
/// the cold cache.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ordered server addresses. Index in this list is server identity.
    pub servers: Vec<SocketAddr>,
    /// Which wire protocol to speak to every server.
    pub protocol: Protocol,
    /// Enable the compression half of the value pipeline.
    pub compression: bool,
    /// Payload size at or above which compression is attempted.
    pub compression_threshold: usize,
    /// Required savings percentage for compressed payloads to be kept.
    pub compression_min_savings_pct: u8,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            servers: Vec::new(),
            protocol: Protocol::Text,
            compression: true,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            compression_min_savings_pct: DEFAULT_MIN_SAVINGS_PCT,
        }
    }
}

impl ClientConfig {
    /// Config for `servers` with everything else defaulted.
    pub fn new(servers: Vec<SocketAddr>) -> Self {
        ClientConfig {
            servers,
            ..ClientConfig::default()
        }
    }

    /// The value pipeline described by the compression knobs.
    pub(crate) fn pipeline(&self) -> ValuePipeline {
        ValuePipeline {
            compression: self.compression,
            compression_threshold: self.compression_threshold,
            min_savings_pct: self.compression_min_savings_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert!(config.servers.is_empty());
        assert_eq!(config.protocol, Protocol::Text);
        assert!(config.compression);
        assert_eq!(config.compression_threshold, DEFAULT_COMPRESSION_THRESHOLD);
        assert_eq!(
            config.compression_min_savings_pct,
            DEFAULT_MIN_SAVINGS_PCT
        );
    }

    #[test]
    fn pipeline_reflects_knobs() {
        let mut config = ClientConfig::new(vec!["127.0.0.1:11211".parse().unwrap()]);
        config.compression = false;
        config.compression_threshold = 128;
        config.compression_min_savings_pct = 50;
        let pipeline = config.pipeline();
        assert!(!pipeline.compression);
        assert_eq!(pipeline.compression_threshold, 128);
        assert_eq!(pipeline.min_savings_pct, 50);
    }
}
