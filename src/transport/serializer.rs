//! Single-flight link transmission.
//!
//! At most one PDU is handed to the link at a time. The in-flight slot
//! records which socket (if any) owns the frame so the completion can be
//! routed back to it. Replies that belong to no socket operation (DM to an
//! unknown SAP, FRMR) wait in a control queue that drains first.

use std::collections::VecDeque;

use super::frame::{PType, Pdu};
use super::socket::SocketHandle;
use crate::core::{LinkError, LinkSend, SendStatus};

/// The frame currently owned by the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InFlight {
    /// Socket whose operation produced the frame.
    pub owner: Option<SocketHandle>,
    /// Type of the frame.
    pub ptype: PType,
}

#[derive(Debug)]
pub(crate) struct LinkSerializer<L> {
    link: L,
    in_flight: Option<InFlight>,
    control: VecDeque<Pdu>,
}

impl<L: LinkSend> LinkSerializer<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            in_flight: None,
            control: VecDeque::new(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }

    /// Hand `pdu` to the link. The caller must have checked the link is idle.
    ///
    /// On success the in-flight slot is held until [`complete`](Self::complete);
    /// on failure it stays clear.
    pub fn transmit(&mut self, pdu: &Pdu, owner: Option<SocketHandle>) -> Result<SendStatus, LinkError> {
        if self.in_flight.is_some() {
            return Err(LinkError::Busy);
        }

        let ptype = pdu.ptype();
        self.in_flight = Some(InFlight { owner, ptype });
        match self.link.send(pdu) {
            Ok(status) => {
                tracing::trace!(
                    ?ptype,
                    dsap = pdu.header.dsap,
                    ssap = pdu.header.ssap,
                    len = pdu.info.len(),
                    "pdu handed to link"
                );
                Ok(status)
            }
            Err(err) => {
                self.in_flight = None;
                tracing::warn!(?ptype, error = %err, "link rejected pdu");
                Err(err)
            }
        }
    }

    /// Release the in-flight slot.
    pub fn complete(&mut self) -> Option<InFlight> {
        self.in_flight.take()
    }

    /// Send a socket-independent control reply now, or queue it.
    pub fn send_control(&mut self, pdu: Pdu) {
        if self.is_busy() {
            tracing::debug!(ptype = ?pdu.ptype(), "link busy, control reply queued");
            self.control.push_back(pdu);
        } else if let Err(err) = self.transmit(&pdu, None) {
            tracing::warn!(ptype = ?pdu.ptype(), error = %err, "control reply dropped");
        }
    }

    /// Transmit the oldest queued control reply, if the link is idle.
    pub fn drain_control(&mut self) {
        while !self.is_busy() {
            let Some(pdu) = self.control.pop_front() else {
                return;
            };
            if let Err(err) = self.transmit(&pdu, None) {
                tracing::warn!(ptype = ?pdu.ptype(), error = %err, "control reply dropped");
            }
        }
    }

    /// Forget queued control replies and the in-flight frame.
    pub fn reset(&mut self) {
        self.control.clear();
        self.in_flight = None;
    }

    pub fn queued_control(&self) -> usize {
        self.control.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::frame::{DmReason, Header};

    struct Recorder {
        sent: Vec<Vec<u8>>,
        fail: bool,
    }

    impl LinkSend for Recorder {
        fn send(&mut self, pdu: &Pdu) -> Result<SendStatus, LinkError> {
            if self.fail {
                return Err(LinkError::Rejected("test".into()));
            }
            self.sent.push(pdu.to_bytes());
            Ok(SendStatus::Pending)
        }
    }

    fn serializer(fail: bool) -> LinkSerializer<Recorder> {
        LinkSerializer::new(Recorder {
            sent: Vec::new(),
            fail,
        })
    }

    fn symm() -> Pdu {
        Pdu::new(Header::new(0, PType::Symm, 0), Vec::new())
    }

    #[test]
    fn test_single_flight() {
        let mut s = serializer(false);
        assert!(s.transmit(&symm(), None).is_ok());
        assert!(s.is_busy());
        assert_eq!(s.transmit(&symm(), None), Err(LinkError::Busy));
        assert_eq!(s.link().sent.len(), 1);

        let done = s.complete().unwrap();
        assert_eq!(done.ptype, PType::Symm);
        assert!(!s.is_busy());
    }

    #[test]
    fn test_failure_releases_slot() {
        let mut s = serializer(true);
        assert!(s.transmit(&symm(), None).is_err());
        assert!(!s.is_busy());
    }

    #[test]
    fn test_control_queue_drains_in_order() {
        let mut s = serializer(false);
        s.send_control(Pdu::dm(0x20, 0x10, DmReason::SapNotFound));
        s.send_control(Pdu::dm(0x21, 0x10, DmReason::SocketNotAvailable));
        s.send_control(Pdu::dm(0x22, 0x10, DmReason::Disconnected));
        assert_eq!(s.queued_control(), 2);

        s.complete();
        s.drain_control();
        assert_eq!(s.queued_control(), 1);
        assert_eq!(hex::encode(&s.link().sent[1]), "85d021");
    }
}
