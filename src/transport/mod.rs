//! LLCP connection-oriented transport.
//!
//! This module implements the connection-oriented half of the Logical Link
//! Control Protocol: data link connections between SAPs, multiplexed over a
//! single NFC peer-to-peer link. It provides:
//!
//! - **PDU codec**: [`Pdu`], [`Header`], [`Sequence`], [`FrmrInfo`] and the
//!   connection TLVs in [`ConnectionParams`]
//! - **Sockets**: create, bind, listen, accept, reject, connect, disconnect,
//!   close, send and recv on [`Transport`]
//! - **Flow control**: modulo-16 sliding window ([`SequenceState`]) with
//!   RR/RNR acknowledgements
//! - **Link serialization**: exactly one frame in flight, with queued work
//!   drained by priority and round-robin across sockets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       Application (callbacks)           │
//! ├─────────────────────────────────────────┤
//! │   Transport: socket table, dispatch     │  ← This module
//! │   sequence state, link serializer       │
//! ├─────────────────────────────────────────┤
//! │       LinkSend / on_send_complete       │
//! ├─────────────────────────────────────────┤
//! │       MAC link (NFC-DEP)                │
//! └─────────────────────────────────────────┘
//! ```

mod buffer;
mod config;
mod connection;
mod dispatch;
mod engine;
mod frame;
mod sequence;
mod serializer;
mod socket;
mod table;
mod tlv;


pub use buffer::{BufferLayout, SocketBuffers};
pub use config::{TransportBuilder, TransportConfig};
pub use engine::Transport;
pub use frame::{DmReason, FrameError, FrmrFlags, FrmrInfo, Header, PType, Pdu, Sequence};
pub use sequence::{Seq, SequenceState};
pub use socket::{
    CompletionCallback, Destination, ListenCallback, NoticeCallback, Progress, RecvCallback,
    SAP_UNBOUND, SocketHandle, SocketNotice, SocketOptions, SocketState,
};
pub use tlv::{ConnectionParams, TlvError, TlvReader, encode_miux, encode_rw, encode_tlv};
