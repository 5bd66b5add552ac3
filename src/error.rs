use std::string::FromUtf8Error;
use thiserror::Error;

/// Every failure the receiver can produce, tagged with the RFC 6455 close
/// code it maps to. The receiver never propagates these across the `add`
/// boundary — they are only ever handed to `on_error`.
#[derive(Error, Debug)]
pub enum Error {
    // Framing errors
    #[error("reserved bits set without a matching extension")]
    RSVNotZero,

    #[error("control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("control frame payload exceeds 125 bytes")]
    ControlFramePayloadSize,

    #[error("reserved opcode: `{0}`")]
    InvalidOpcode(u8),

    #[error("rsv1 set on a continuation frame")]
    CompressedContinuation,

    #[error("extended length's high bit must be zero")]
    InvalidExtendedLength,

    // Fragmentation errors
    #[error("data frame received while a fragmented message was already in progress")]
    FragmentedInProgress,

    #[error("continuation frame received with no fragmented message in progress")]
    InvalidContinuationFrame,

    #[error("close frame payload must be empty or at least 2 bytes")]
    InvalidCloseFrame,

    // Size errors
    #[error("message exceeds the configured max_payload")]
    MaxMessageSize,

    #[error("permessage-deflate output exceeds the configured max_payload")]
    ExtensionMaxMessageSize,

    // Data validity
    #[error("{source}")]
    Utf8 {
        #[from]
        source: FromUtf8Error,
    },

    // Extension errors
    #[error("permessage-deflate failure: {0}")]
    ExtensionError(String),

    /// Reserved for a future transport adapter. This crate performs no I/O of
    /// its own; the variant is kept so a collaborator that does wrap
    /// transport errors can fold them into the same taxonomy via `#[from]`.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// The RFC 6455 close code this error maps to, per the design's error
    /// taxonomy: 1002 protocol, 1007 invalid data, 1009 too big.
    pub fn close_code(&self) -> u16 {
        match self {
            Error::RSVNotZero
            | Error::ControlFramesFragmented
            | Error::ControlFramePayloadSize
            | Error::InvalidOpcode(_)
            | Error::CompressedContinuation
            | Error::FragmentedInProgress
            | Error::InvalidContinuationFrame
            | Error::InvalidExtendedLength
            | Error::InvalidCloseFrame
            | Error::Io { .. } => 1002,

            Error::Utf8 { .. } => 1007,

            Error::MaxMessageSize | Error::ExtensionMaxMessageSize => 1009,

            // The collaborator decides whether its failure is a data problem
            // or a size problem; absent more specific information we treat
            // it as a data problem.
            Error::ExtensionError(_) => 1007,
        }
    }
}
