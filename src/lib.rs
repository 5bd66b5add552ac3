//! A push-driven WebSocket frame receiver for the Tokio stack.
//!
//! This crate implements the receiving half of [RFC
//! 6455](https://datatracker.ietf.org/doc/html/rfc6455) framing and the
//! [permessage-deflate](https://datatracker.ietf.org/doc/html/rfc7692)
//! extension as a standalone state machine: it owns no socket and performs
//! no handshake. A caller feeds it raw bytes, from wherever they arrive,
//! through [`Receiver::add`], and receives completed messages and control
//! frames back through a set of re-assignable callbacks.
//!
//! Handshaking, extension negotiation, transport (TCP/TLS), and the send
//! path are all out of scope here; they are a collaborator's job. This
//! crate is the byte-exact parsing and reassembly core those collaborators
//! build on.

mod assembler;
mod codec;
pub mod config;
pub mod deflate;
pub mod error;
pub mod frame;
mod header;
mod queue;
pub mod receiver;

pub use config::ReceiverConfig;
pub use deflate::{DeflateExt, DeflateParams, PerMessageDeflate};
pub use error::Error;
pub use frame::{FrameHeader, OpCode};
pub use receiver::Receiver;
