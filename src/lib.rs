//! # nfc-llcp
//!
//! **L**ogical **L**ink **C**ontrol **P**rotocol, connection-oriented transport
//!
//! LLCP runs on top of an NFC peer-to-peer MAC link and multiplexes many
//! logical connections between service access points (SAPs) over it. This
//! crate implements the connection-oriented part:
//!
//! - **Sockets**: bind, listen, accept, reject, connect (by SAP or service
//!   name), send, recv, disconnect and close
//! - **Flow control**: modulo-16 sliding window with RR/RNR acknowledgements
//!   and FRMR on protocol violations
//! - **Single flight**: at most one frame is handed to the link at a time;
//!   queued work drains by priority and round-robin across sockets
//! - **Driver**: an optional tokio event loop and an in-memory link pair
//!
//! ## Feature Flags
//!
//! - `driver` (default): tokio-backed [`driver`] module
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types and the [`LinkSend`] seam (always included)
//! - [`transport`]: PDU codec, socket table and the [`Transport`] state machine
//! - [`driver`]: Async link driver (requires `driver` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use nfc_llcp::prelude::*;
//!
//! #[derive(Default)]
//! struct Wire(Vec<Vec<u8>>);
//!
//! impl LinkSend for Wire {
//!     fn send(&mut self, pdu: &Pdu) -> Result<SendStatus, LinkError> {
//!         self.0.push(pdu.to_bytes());
//!         Ok(SendStatus::Pending)
//!     }
//! }
//!
//! let mut transport = Transport::new(Wire::default());
//! let socket = transport
//!     .socket(SocketOptions::default(), vec![0; 256], |_| {})
//!     .unwrap();
//! transport.connect(socket, 0x10u8, |result| println!("{result:?}")).unwrap();
//!
//! // CONNECT(dsap=0x10, ssap=0x20) is now on the wire.
//! assert_eq!(transport.link().0, vec![vec![0x41, 0x20]]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Connection-oriented transport
pub mod transport;

// Async driver (feature-gated)
#[cfg(feature = "driver")]
#[cfg_attr(docsrs, doc(cfg(feature = "driver")))]
pub mod driver;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::transport::{
        Destination, DmReason, Header, PType, Pdu, Progress, SocketHandle, SocketNotice,
        SocketOptions, SocketState, Transport, TransportBuilder, TransportConfig,
    };

    #[cfg(feature = "driver")]
    pub use crate::driver::{ChannelLink, LinkDriver, LinkEvent, loopback_pair};
}

// Re-export commonly used items at crate root
pub use crate::core::{LinkError, LinkSend, LlcpError, LlcpResult, SendStatus};
pub use transport::{
    Pdu, Progress, SocketHandle, SocketNotice, SocketOptions, SocketState, Transport,
    TransportBuilder, TransportConfig,
};
