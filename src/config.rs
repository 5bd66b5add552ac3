use crate::deflate::DeflateParams;

/// Tunables for a `Receiver`. A pre-negotiated `extensions` value is
/// injected here rather than negotiated by this crate — handshake and
/// extension negotiation are an external collaborator's job.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Cumulative decoded payload cap per message, in bytes. `0` means
    /// unbounded.
    pub max_payload: u64,
    /// `Some` enables permessage-deflate with the given negotiated
    /// parameters; `None` means a frame with `rsv1` set is a protocol error.
    pub extensions: Option<DeflateParams>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            max_payload: 64 << 20,
            extensions: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_unbounded_by_extensions() {
        let config = ReceiverConfig::default();
        assert!(config.extensions.is_none());
        assert!(config.max_payload > 0);
    }
}
