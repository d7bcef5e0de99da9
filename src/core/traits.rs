//! Core traits for the LLCP transport.
//!
//! The transport never touches the radio itself. It hands encoded PDUs to a
//! [`LinkSend`] implementation supplied by the link layer and is told about
//! transmission results through
//! [`Transport::on_send_complete`](crate::transport::Transport::on_send_complete).

use super::error::LinkError;
use crate::transport::Pdu;

/// Immediate status of a frame handed to the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The frame went out synchronously.
    Sent,
    /// The frame was queued by the link layer.
    Pending,
}

/// Link-layer send primitive consumed by the transport.
///
/// # Contract
///
/// - The transport calls `send` only while no other frame is in flight.
/// - `Ok(_)` means the link accepted the frame. The link MUST later report
///   the final result exactly once through
///   [`Transport::on_send_complete`](crate::transport::Transport::on_send_complete),
///   whether the status was [`SendStatus::Sent`] or [`SendStatus::Pending`].
/// - `Err(_)` means the frame was not accepted and no completion follows.
///
/// # Example
///
/// ```
/// use nfc_llcp::prelude::*;
///
/// struct Wire(Vec<Vec<u8>>);
///
/// impl LinkSend for Wire {
///     fn send(&mut self, pdu: &Pdu) -> Result<SendStatus, LinkError> {
///         self.0.push(pdu.to_bytes());
///         Ok(SendStatus::Pending)
///     }
/// }
/// ```
pub trait LinkSend {
    /// Transmit one PDU.
    fn send(&mut self, pdu: &Pdu) -> Result<SendStatus, LinkError>;
}

impl<L: LinkSend + ?Sized> LinkSend for Box<L> {
    fn send(&mut self, pdu: &Pdu) -> Result<SendStatus, LinkError> {
        (**self).send(pdu)
    }
}
