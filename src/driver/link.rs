//! In-memory link backed by tokio channels.

use tokio::sync::mpsc;

use crate::core::{LinkError, LinkSend, SendStatus};
use crate::transport::Pdu;

/// Event delivered to a [`LinkDriver`](super::LinkDriver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A PDU arrived from the peer.
    Received(Vec<u8>),
    /// The frame handed to the link has been transmitted (or lost).
    SendComplete(Result<(), LinkError>),
}

/// [`LinkSend`] that forwards every PDU to a peer channel and posts the
/// send completion back to its own driver.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    peer: mpsc::UnboundedSender<LinkEvent>,
    local: mpsc::UnboundedSender<LinkEvent>,
}

impl ChannelLink {
    /// Create a link delivering to `peer` and completing on `local`.
    pub fn new(
        peer: mpsc::UnboundedSender<LinkEvent>,
        local: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        Self { peer, local }
    }

    /// Check if the peer end has gone away.
    pub fn is_closed(&self) -> bool {
        self.peer.is_closed()
    }
}

impl LinkSend for ChannelLink {
    fn send(&mut self, pdu: &Pdu) -> Result<SendStatus, LinkError> {
        // A frame is only accepted when its completion can be posted.
        if self.local.is_closed() {
            return Err(LinkError::Closed);
        }
        self.peer
            .send(LinkEvent::Received(pdu.to_bytes()))
            .map_err(|_| LinkError::Closed)?;
        if self.local.send(LinkEvent::SendComplete(Ok(()))).is_err() {
            tracing::warn!("frame delivered but its completion was lost");
        }
        Ok(SendStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{DmReason, Pdu};

    #[test]
    fn test_forwards_and_completes() {
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
        let (local_tx, mut local_rx) = mpsc::unbounded_channel();
        let mut link = ChannelLink::new(peer_tx, local_tx);

        let status = link.send(&Pdu::dm(0x20, 0x10, DmReason::SapNotFound));
        assert_eq!(status, Ok(SendStatus::Pending));
        assert_eq!(
            peer_rx.try_recv().unwrap(),
            LinkEvent::Received(hex::decode("81d002").unwrap())
        );
        assert_eq!(local_rx.try_recv().unwrap(), LinkEvent::SendComplete(Ok(())));
    }

    #[test]
    fn test_closed_peer() {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (local_tx, mut local_rx) = mpsc::unbounded_channel();
        let mut link = ChannelLink::new(peer_tx, local_tx);
        drop(peer_rx);

        assert!(link.is_closed());
        assert_eq!(
            link.send(&Pdu::dm(0x20, 0x10, DmReason::SapNotFound)),
            Err(LinkError::Closed)
        );
        assert!(local_rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_local_end_refuses_before_delivery() {
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let mut link = ChannelLink::new(peer_tx, local_tx);
        drop(local_rx);

        assert_eq!(
            link.send(&Pdu::dm(0x20, 0x10, DmReason::SapNotFound)),
            Err(LinkError::Closed)
        );
        assert!(peer_rx.try_recv().is_err());
    }
}
