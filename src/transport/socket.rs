//! Connection-oriented socket records.
//!
//! A socket's pending work is held as typed state rather than as flags next
//! to callback pointers: the lifecycle operation (listen, accept, connect,
//! disconnect, reject) is a single enum, and the data-transfer operations are
//! `Option`s carrying their payload and callback. Taking the value out of the
//! socket is what clears it, so a callback cannot fire twice.

use std::fmt;

use super::buffer::SocketBuffers;
use super::frame::{Header, PType, Pdu};
use super::sequence::SequenceState;
use crate::core::{LlcpError, LlcpResult, MIU_DEFAULT, MIU_MAX, RW_DEFAULT, RW_MAX};

/// SAP value of a socket that is not bound to any SAP.
pub const SAP_UNBOUND: u8 = 0xFF;

/// Socket lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketState {
    /// Free slot.
    #[default]
    Default,
    /// Allocated, not bound to a SAP.
    Created,
    /// Bound to a local SAP (or claimed for an incoming connection).
    Bound,
    /// Listening for incoming connections.
    Registered,
    /// CONNECT sent, waiting for CC or DM.
    Connecting,
    /// CC sent, waiting for the link to confirm it.
    Accepted,
    /// Data link connection established.
    Connected,
    /// DISC sent, waiting for DM.
    Disconnecting,
    /// Peer tore the connection down.
    Disconnected,
    /// Incoming connection refused, DM in progress.
    Rejected,
}

/// Local or remote link parameters of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    /// Maximum information unit.
    pub miu: u16,
    /// Receive window.
    pub rw: u8,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            miu: MIU_DEFAULT,
            rw: RW_DEFAULT,
        }
    }
}

impl SocketOptions {
    /// Create options.
    pub fn new(miu: u16, rw: u8) -> Self {
        Self { miu, rw }
    }

    /// Check the options are expressible on the wire.
    pub fn validate(&self) -> LlcpResult<()> {
        if self.rw > RW_MAX {
            return Err(LlcpError::InvalidParameter("receive window above 15"));
        }
        if !(MIU_DEFAULT..=MIU_MAX).contains(&self.miu) {
            return Err(LlcpError::InvalidParameter("MIU outside 128..=2175"));
        }
        Ok(())
    }
}

/// Stable reference to a socket slot.
///
/// A handle stays valid until its slot is reused for another socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl SocketHandle {
    /// Slot index inside the socket table.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Asynchronous events reported through a socket's notification callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketNotice {
    /// The peer disconnected.
    Disconnected,
    /// A frame on this connection was rejected (FRMR sent or received).
    FrameRejected,
    /// The peer sent RNR.
    RemoteBusy,
    /// The peer sent RR after RNR.
    RemoteNotBusy,
}

/// Immediate outcome of a socket operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Completed; any callback has already run.
    Done,
    /// Deferred; the callback runs exactly once later.
    Pending,
}

/// Destination of a `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Explicit remote SAP.
    Sap(u8),
    /// Service name resolved by the peer's SDP SAP.
    ServiceName(Vec<u8>),
}

impl From<u8> for Destination {
    fn from(sap: u8) -> Self {
        Self::Sap(sap)
    }
}

impl From<&str> for Destination {
    fn from(name: &str) -> Self {
        Self::ServiceName(name.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Destination {
    fn from(name: &[u8]) -> Self {
        Self::ServiceName(name.to_vec())
    }
}

/// Completion of send, accept, connect, disconnect and reject.
pub type CompletionCallback = Box<dyn FnOnce(LlcpResult<()>)>;
/// Completion of recv, carrying the received bytes.
pub type RecvCallback = Box<dyn FnOnce(LlcpResult<Vec<u8>>)>;
/// Invoked for every incoming connection on a listening socket.
pub type ListenCallback = Box<dyn FnMut(LlcpResult<SocketHandle>)>;
/// Socket notification sink.
pub type NoticeCallback = Box<dyn FnMut(SocketNotice)>;

/// What happens when a DISC is acknowledged.
pub(crate) enum DisconnectCompletion {
    /// Application-initiated disconnect.
    User(CompletionCallback),
    /// Disconnect started by `close`: reset the socket.
    Close,
}

/// The single lifecycle operation a socket may have outstanding.
///
/// `queued` frames are waiting for the link; `None` means the frame was
/// handed to the link and the socket is waiting for the outcome.
#[derive(Default)]
pub(crate) enum Lifecycle {
    #[default]
    Idle,
    Listening(ListenCallback),
    Accepting {
        callback: CompletionCallback,
        queued: Option<Pdu>,
    },
    Connecting {
        callback: CompletionCallback,
        queued: Option<Pdu>,
    },
    Disconnecting {
        completion: DisconnectCompletion,
        queued: bool,
    },
    Rejecting {
        callback: CompletionCallback,
        queued: bool,
    },
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Listening(_) => "listening",
            Lifecycle::Accepting { .. } => "accepting",
            Lifecycle::Connecting { .. } => "connecting",
            Lifecycle::Disconnecting { .. } => "disconnecting",
            Lifecycle::Rejecting { .. } => "rejecting",
        }
    }

    /// Invoke the stored callback, if any, with `status`.
    pub(crate) fn fail(self, status: LlcpError) {
        match self {
            Lifecycle::Idle => {}
            Lifecycle::Listening(mut callback) => callback(Err(status)),
            Lifecycle::Accepting { callback, .. }
            | Lifecycle::Connecting { callback, .. }
            | Lifecycle::Rejecting { callback, .. } => callback(Err(status)),
            Lifecycle::Disconnecting { completion, .. } => {
                if let DisconnectCompletion::User(callback) = completion {
                    callback(Err(status));
                }
            }
        }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outbound I-frame payload awaiting transmission or link confirmation.
pub(crate) struct PendingSend {
    pub payload: Vec<u8>,
    pub callback: CompletionCallback,
    /// Not yet handed to the link.
    pub queued: bool,
}

/// Application read waiting for data.
pub(crate) struct PendingRecv {
    pub capacity: usize,
    pub callback: RecvCallback,
}

/// Callbacks removed from a socket, to be invoked once the socket is no
/// longer borrowed.
#[derive(Default)]
pub(crate) struct Teardown {
    send: Option<CompletionCallback>,
    recv: Option<RecvCallback>,
    lifecycle: Lifecycle,
}

impl Teardown {
    /// Invoke every collected callback with `status`.
    pub(crate) fn fire(self, status: LlcpError) {
        if let Some(callback) = self.send {
            callback(Err(status.clone()));
        }
        if let Some(callback) = self.recv {
            callback(Err(status.clone()));
        }
        self.lifecycle.fail(status);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.send.is_none() && self.recv.is_none() && matches!(self.lifecycle, Lifecycle::Idle)
    }
}

/// One slot of the socket table.
pub(crate) struct Socket {
    pub generation: u32,
    pub state: SocketState,
    pub local_sap: u8,
    pub remote_sap: u8,
    pub service_name: Option<Vec<u8>>,
    pub local: SocketOptions,
    pub remote: SocketOptions,
    pub seq: SequenceState,
    pub buffers: Option<SocketBuffers>,
    pub lifecycle: Lifecycle,
    pub send: Option<PendingSend>,
    pub recv: Option<PendingRecv>,
    pub rr_pending: bool,
    pub rnr_pending: bool,
    pub receiver_busy: bool,
    pub remote_busy: bool,
    pub notify: Option<NoticeCallback>,
}

impl Default for Socket {
    fn default() -> Self {
        Self {
            generation: 0,
            state: SocketState::Default,
            local_sap: SAP_UNBOUND,
            remote_sap: SAP_UNBOUND,
            service_name: None,
            local: SocketOptions::default(),
            remote: SocketOptions::default(),
            seq: SequenceState::default(),
            buffers: None,
            lifecycle: Lifecycle::Idle,
            send: None,
            recv: None,
            rr_pending: false,
            rnr_pending: false,
            receiver_busy: false,
            remote_busy: false,
            notify: None,
        }
    }
}

impl Socket {
    /// Check if the slot holds a live socket.
    pub fn is_live(&self) -> bool {
        self.state != SocketState::Default
    }

    /// Move to `to`, logging the transition.
    pub fn transition(&mut self, to: SocketState) {
        if self.state != to {
            tracing::debug!(
                local_sap = self.local_sap,
                remote_sap = self.remote_sap,
                from = ?self.state,
                ?to,
                "socket state"
            );
            self.state = to;
        }
    }

    /// Header for a frame on this connection.
    pub fn header(&self, ptype: PType) -> Header {
        Header::new(self.remote_sap, ptype, self.local_sap)
    }

    /// Check if the (local, remote) SAP pair matches.
    pub fn matches(&self, local: u8, remote: u8) -> bool {
        self.local_sap == local && self.remote_sap == remote
    }

    /// Check if the peer's window and busy state allow another I-frame.
    pub fn can_send(&self) -> bool {
        !self.remote_busy && self.seq.can_send(self.remote.rw)
    }

    /// Check if an I-frame is queued behind the link or the window.
    pub fn has_queued_send(&self) -> bool {
        self.send.as_ref().is_some_and(|send| send.queued)
    }

    /// Reset sequence state and busy flags for a new connection.
    pub fn reset_sequence(&mut self) {
        self.seq = SequenceState::default();
        self.receiver_busy = false;
        self.remote_busy = false;
        self.rr_pending = false;
        self.rnr_pending = false;
    }

    /// Deliver a notification.
    pub fn notify(&mut self, notice: SocketNotice) {
        if let Some(notify) = self.notify.as_mut() {
            notify(notice);
        }
    }

    /// Remove pending send and recv, e.g. before a DISC goes out.
    pub fn take_transfers(&mut self) -> Teardown {
        Teardown {
            send: self.send.take().map(|send| send.callback),
            recv: self.recv.take().map(|recv| recv.callback),
            lifecycle: Lifecycle::Idle,
        }
    }

    /// Return the slot to `Default`, collecting every pending callback.
    /// The generation is kept so the owning handle still resolves.
    pub fn reset(&mut self) -> Teardown {
        let mut teardown = self.take_transfers();
        teardown.lifecycle = std::mem::take(&mut self.lifecycle);
        let generation = self.generation;
        *self = Socket {
            generation,
            ..Socket::default()
        };
        teardown
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("state", &self.state)
            .field("local_sap", &self.local_sap)
            .field("remote_sap", &self.remote_sap)
            .field("seq", &self.seq)
            .field("lifecycle", &self.lifecycle)
            .field("send_pending", &self.send.is_some())
            .field("recv_pending", &self.recv.is_some())
            .field("receiver_busy", &self.receiver_busy)
            .field("remote_busy", &self.remote_busy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_options_validation() {
        assert!(SocketOptions::default().validate().is_ok());
        assert!(SocketOptions::new(MIU_MAX, RW_MAX).validate().is_ok());
        assert!(SocketOptions::new(127, 1).validate().is_err());
        assert!(SocketOptions::new(128, 16).validate().is_err());
        assert!(SocketOptions::new(MIU_MAX + 1, 1).validate().is_err());
    }

    #[test]
    fn test_reset_collects_every_callback() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut socket = Socket {
            generation: 7,
            state: SocketState::Connected,
            ..Socket::default()
        };

        let l = log.clone();
        socket.send = Some(PendingSend {
            payload: vec![1],
            callback: Box::new(move |r| l.borrow_mut().push(("send", r))),
            queued: true,
        });
        let l = log.clone();
        socket.recv = Some(PendingRecv {
            capacity: 10,
            callback: Box::new(move |r| l.borrow_mut().push(("recv", r.map(|_| ())))),
        });
        let l = log.clone();
        socket.lifecycle = Lifecycle::Disconnecting {
            completion: DisconnectCompletion::User(Box::new(move |r| {
                l.borrow_mut().push(("disconnect", r))
            })),
            queued: true,
        };
        socket.rr_pending = true;

        let teardown = socket.reset();
        assert_eq!(socket.state, SocketState::Default);
        assert_eq!(socket.generation, 7);
        assert!(!socket.rr_pending);
        assert!(socket.send.is_none());

        teardown.fire(LlcpError::Aborted);
        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|(_, r)| *r == Err(LlcpError::Aborted)));
    }

    #[test]
    fn test_reset_of_idle_socket_is_empty() {
        let mut socket = Socket::default();
        assert!(socket.reset().is_empty());
    }

    #[test]
    fn test_can_send_respects_remote_busy() {
        let mut socket = Socket::default();
        socket.remote.rw = 1;
        assert!(socket.can_send());
        socket.remote_busy = true;
        assert!(!socket.can_send());
    }

    #[test]
    fn test_destination_conversions() {
        assert_eq!(Destination::from(0x20), Destination::Sap(0x20));
        assert_eq!(
            Destination::from("urn:nfc:sn:snep"),
            Destination::ServiceName(b"urn:nfc:sn:snep".to_vec())
        );
    }
}
