//! The per-link transport: socket table, single-flight serializer and the
//! priority drain that runs whenever the link becomes free.

use super::config::TransportConfig;
use super::frame::{DmReason, FrmrFlags, FrmrInfo, Header, PType, Pdu, Sequence};
use super::sequence::Seq;
use super::serializer::LinkSerializer;
use super::socket::{
    DisconnectCompletion, Lifecycle, Socket, SocketHandle, SocketOptions, SocketState,
    Teardown,
};
use super::table::SocketTable;
use crate::core::{LinkError, LinkSend, LlcpError, LlcpResult};

/// Operations a socket can hand to the link, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ready {
    Info,
    ReceiveReady,
    ReceiveNotReady,
    Accept,
    Connect,
    Disconnect,
    Reject,
}

impl Ready {
    fn next(socket: &Socket) -> Option<Self> {
        if !socket.is_live() {
            return None;
        }
        if socket.has_queued_send() && socket.can_send() {
            return Some(Self::Info);
        }
        if socket.rr_pending {
            return Some(Self::ReceiveReady);
        }
        if socket.rnr_pending {
            return Some(Self::ReceiveNotReady);
        }
        match &socket.lifecycle {
            Lifecycle::Accepting { queued: Some(_), .. } => Some(Self::Accept),
            Lifecycle::Connecting { queued: Some(_), .. } => Some(Self::Connect),
            Lifecycle::Disconnecting { queued: true, .. } => Some(Self::Disconnect),
            Lifecycle::Rejecting { queued: true, .. } => Some(Self::Reject),
            _ => None,
        }
    }
}

/// LLCP connection-oriented transport bound to one link.
///
/// Created at link activation; [`close_all`](Self::close_all) tears every
/// socket down at deactivation.
///
/// Callbacks run synchronously from inside transport calls and must not call
/// back into the transport.
#[derive(Debug)]
pub struct Transport<L> {
    pub(crate) config: TransportConfig,
    pub(crate) table: SocketTable,
    pub(crate) serializer: LinkSerializer<L>,
}

impl<L: LinkSend> Transport<L> {
    /// Create a transport with the default configuration.
    pub fn new(link: L) -> Self {
        Self::with_config(link, TransportConfig::default())
    }

    /// Create a transport with `config`.
    pub fn with_config(link: L, config: TransportConfig) -> Self {
        Self {
            table: SocketTable::new(config.max_sockets),
            serializer: LinkSerializer::new(link),
            config,
        }
    }

    /// Transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The link-layer send primitive.
    pub fn link(&self) -> &L {
        self.serializer.link()
    }

    /// Mutable access to the link-layer send primitive.
    pub fn link_mut(&mut self) -> &mut L {
        self.serializer.link_mut()
    }

    /// Check if a frame is in flight.
    pub fn is_link_busy(&self) -> bool {
        self.serializer.is_busy()
    }

    /// Current state of a socket.
    pub fn state(&self, handle: SocketHandle) -> LlcpResult<SocketState> {
        Ok(self.table.get(handle)?.state)
    }

    /// Local link parameters of a socket.
    pub fn local_options(&self, handle: SocketHandle) -> LlcpResult<SocketOptions> {
        let socket = self.table.get(handle)?;
        if !socket.is_live() {
            return Err(LlcpError::InvalidState("local_options"));
        }
        Ok(socket.local)
    }

    /// Link parameters announced by the peer. Only available while connected.
    pub fn remote_options(&self, handle: SocketHandle) -> LlcpResult<SocketOptions> {
        let socket = self.table.get(handle)?;
        if socket.state != SocketState::Connected {
            return Err(LlcpError::InvalidState("remote_options"));
        }
        Ok(socket.remote)
    }

    /// Number of live sockets.
    pub fn socket_count(&self) -> usize {
        self.table.iter().filter(|s| s.is_live()).count()
    }

    /// Report the outcome of the frame in flight.
    ///
    /// Must be called exactly once for every frame the link accepted. Queued
    /// control replies go out first, then the owning socket's operation
    /// completes, then sockets are visited round-robin starting after the
    /// owner until the link is busy again.
    pub fn on_send_complete(&mut self, result: Result<(), LinkError>) {
        let Some(done) = self.serializer.complete() else {
            tracing::warn!("send completion without a frame in flight");
            return;
        };
        tracing::trace!(ptype = ?done.ptype, ok = result.is_ok(), "link send complete");

        self.serializer.drain_control();

        let start = match done.owner {
            Some(owner) => {
                self.finish(owner, done.ptype, result);
                owner.index + 1
            }
            None => 0,
        };
        self.drain_from(start);
    }

    /// Tear down every socket, aborting pending callbacks. Call at link
    /// deactivation.
    pub fn close_all(&mut self) {
        let mut teardowns = Vec::new();
        for index in 0..self.table.capacity() {
            if self.table.slot(index).is_live() {
                teardowns.push(self.table.slot_mut(index).reset());
                self.table.release(index);
            }
        }
        self.serializer.reset();
        tracing::info!(sockets = teardowns.len(), "transport closed");
        for teardown in teardowns {
            teardown.fire(LlcpError::Aborted);
        }
    }

    // ===== DRAIN =====

    /// Drain sockets round-robin from `start` while the link is idle.
    pub(crate) fn drain_from(&mut self, start: usize) {
        for index in self.table.round_robin(start) {
            if self.serializer.is_busy() {
                break;
            }
            self.drain_socket(index);
        }
    }

    /// Hand the socket's highest-priority ready operation to the link, if it
    /// is idle. Operations that fail are completed with `Failed` and the next
    /// one is tried.
    pub(crate) fn drain_socket(&mut self, index: usize) {
        while !self.serializer.is_busy() {
            let Some(ready) = Ready::next(self.table.slot(index)) else {
                break;
            };
            self.start(index, ready);
        }
    }

    fn start(&mut self, index: usize, ready: Ready) {
        let handle = self.table.handle(index);
        match ready {
            Ready::Info => self.start_info(index, handle),
            Ready::ReceiveReady | Ready::ReceiveNotReady => {
                let ptype = if ready == Ready::ReceiveReady {
                    PType::Rr
                } else {
                    PType::Rnr
                };
                let socket = self.table.slot_mut(index);
                socket.rr_pending &= ptype != PType::Rr;
                socket.rnr_pending &= ptype != PType::Rnr;
                let pdu = Pdu::sequenced(
                    socket.header(ptype),
                    Sequence::new(Seq::ZERO, socket.seq.vr),
                    Vec::new(),
                );
                if self.serializer.transmit(&pdu, Some(handle)).is_ok() {
                    socket.seq.acknowledge_received();
                }
            }
            Ready::Accept => {
                let socket = self.table.slot_mut(index);
                let Lifecycle::Accepting { queued, .. } = &mut socket.lifecycle else {
                    return;
                };
                let Some(pdu) = queued.take() else {
                    return;
                };
                socket.transition(SocketState::Accepted);
                if self.serializer.transmit(&pdu, Some(handle)).is_err() {
                    socket.transition(SocketState::Bound);
                    std::mem::take(&mut socket.lifecycle).fail(LlcpError::Failed);
                }
            }
            Ready::Connect => {
                let socket = self.table.slot_mut(index);
                let Lifecycle::Connecting { queued, .. } = &mut socket.lifecycle else {
                    return;
                };
                let Some(pdu) = queued.take() else {
                    return;
                };
                socket.transition(SocketState::Connecting);
                if self.serializer.transmit(&pdu, Some(handle)).is_err() {
                    socket.transition(SocketState::Bound);
                    std::mem::take(&mut socket.lifecycle).fail(LlcpError::Failed);
                }
            }
            Ready::Disconnect => {
                let socket = self.table.slot_mut(index);
                if let Lifecycle::Disconnecting { queued, .. } = &mut socket.lifecycle {
                    *queued = false;
                }
                socket.transition(SocketState::Disconnecting);
                let pdu = Pdu::new(socket.header(PType::Disc), Vec::new());
                if self.serializer.transmit(&pdu, Some(handle)).is_err() {
                    self.abandon_disconnect(index);
                }
            }
            Ready::Reject => {
                let socket = self.table.slot_mut(index);
                if let Lifecycle::Rejecting { queued, .. } = &mut socket.lifecycle {
                    *queued = false;
                }
                let pdu = Pdu::dm(
                    socket.remote_sap,
                    socket.local_sap,
                    DmReason::ConnectRejected,
                );
                if self.serializer.transmit(&pdu, Some(handle)).is_err() {
                    let lifecycle = std::mem::take(&mut self.table.slot_mut(index).lifecycle);
                    self.close_now(index, LlcpError::Aborted);
                    lifecycle.fail(LlcpError::Failed);
                }
            }
        }
    }

    /// Transmit the queued I-frame: N(S) = V(S), N(R) = V(R). The frame
    /// carries the acknowledgement, so a pending RR is dropped.
    fn start_info(&mut self, index: usize, handle: SocketHandle) {
        let socket = self.table.slot_mut(index);
        let header = socket.header(PType::I);
        let sequence = Sequence::new(socket.seq.vs, socket.seq.vr);
        let Some(send) = socket.send.as_mut() else {
            return;
        };
        let pdu = Pdu::sequenced(header, sequence, send.payload.clone());

        match self.serializer.transmit(&pdu, Some(handle)) {
            Ok(_) => {
                send.queued = false;
                socket.seq.acknowledge_received();
                socket.seq.vs = socket.seq.vs.next();
                socket.rr_pending = false;
            }
            Err(_) => {
                if let Some(send) = socket.send.take() {
                    (send.callback)(Err(LlcpError::Failed));
                }
            }
        }
    }

    fn abandon_disconnect(&mut self, index: usize) {
        let socket = self.table.slot_mut(index);
        match std::mem::take(&mut socket.lifecycle) {
            Lifecycle::Disconnecting {
                completion: DisconnectCompletion::User(callback),
                ..
            } => {
                socket.transition(SocketState::Disconnected);
                callback(Err(LlcpError::Failed));
            }
            Lifecycle::Disconnecting {
                completion: DisconnectCompletion::Close,
                ..
            } => self.close_now(index, LlcpError::Aborted),
            other => socket.lifecycle = other,
        }
    }

    // ===== COMPLETION =====

    /// Complete the socket operation that produced the finished frame.
    fn finish(&mut self, owner: SocketHandle, ptype: PType, result: Result<(), LinkError>) {
        let Ok(socket) = self.table.get_mut(owner) else {
            tracing::trace!(index = owner.index, "completion for a reused slot");
            return;
        };
        if !socket.is_live() {
            return;
        }
        let index = owner.index;

        match ptype {
            PType::I => {
                if let Some(send) = socket.send.take_if(|send| !send.queued) {
                    (send.callback)(result.map_err(|_| LlcpError::Failed));
                }
            }
            PType::Cc => {
                if !matches!(socket.lifecycle, Lifecycle::Accepting { queued: None, .. }) {
                    return;
                }
                let lifecycle = std::mem::take(&mut socket.lifecycle);
                let Lifecycle::Accepting { callback, .. } = lifecycle else {
                    return;
                };
                if result.is_ok() && socket.state == SocketState::Accepted {
                    socket.transition(SocketState::Connected);
                    tracing::info!(
                        local_sap = socket.local_sap,
                        remote_sap = socket.remote_sap,
                        "connection accepted"
                    );
                    callback(Ok(()));
                } else {
                    socket.transition(SocketState::Bound);
                    callback(Err(LlcpError::Failed));
                }
            }
            PType::Connect => {
                if result.is_err()
                    && matches!(socket.lifecycle, Lifecycle::Connecting { queued: None, .. })
                {
                    socket.transition(SocketState::Bound);
                    std::mem::take(&mut socket.lifecycle).fail(LlcpError::Failed);
                }
            }
            PType::Disc => {
                if result.is_err()
                    && matches!(socket.lifecycle, Lifecycle::Disconnecting { queued: false, .. })
                {
                    self.abandon_disconnect(index);
                }
            }
            PType::Dm => {
                if !matches!(socket.lifecycle, Lifecycle::Rejecting { queued: false, .. }) {
                    return;
                }
                let lifecycle = std::mem::take(&mut socket.lifecycle);
                self.close_now(index, LlcpError::Aborted);
                if let Lifecycle::Rejecting { callback, .. } = lifecycle {
                    callback(result.map_err(|_| LlcpError::Failed));
                }
            }
            _ => {
                if let Err(err) = result {
                    tracing::warn!(?ptype, error = %err, "acknowledgement frame lost");
                }
            }
        }
    }

    // ===== SHARED HELPERS =====

    /// Drain `index` if the link is idle.
    pub(crate) fn kick(&mut self, index: usize) {
        if !self.serializer.is_busy() {
            self.drain_socket(index);
        }
    }

    /// Ask for an RR (or RNR) carrying the current V(R).
    pub(crate) fn request_ack(&mut self, index: usize, ptype: PType) {
        let socket = self.table.slot_mut(index);
        if ptype == PType::Rnr {
            socket.rnr_pending = true;
            socket.rr_pending = false;
        } else {
            socket.rr_pending = true;
            socket.rnr_pending = false;
        }
        self.kick(index);
    }

    /// Acknowledge received data: piggyback on the queued I-frame when the
    /// window allows, otherwise send RR.
    pub(crate) fn acknowledge(&mut self, index: usize) {
        let socket = self.table.slot(index);
        if socket.has_queued_send() && socket.can_send() {
            self.kick(index);
        } else {
            self.request_ack(index, PType::Rr);
        }
    }

    /// Reset a socket synchronously and abort its callbacks with `status`.
    pub(crate) fn close_now(&mut self, index: usize, status: LlcpError) {
        let socket = self.table.slot_mut(index);
        tracing::debug!(
            local_sap = socket.local_sap,
            remote_sap = socket.remote_sap,
            "socket closed"
        );
        let teardown: Teardown = socket.reset();
        self.table.release(index);
        teardown.fire(status);
    }

    /// Reply to `header` with FRMR. The offending frame is discarded and the
    /// matching connection, if any, is left untouched; its sequence state is
    /// reported as-is.
    pub(crate) fn frame_reject(
        &mut self,
        header: Header,
        flags: FrmrFlags,
        sequence: Option<Sequence>,
    ) {
        let found = self.table.find_connection(
            header.dsap,
            header.ssap,
            &[
                SocketState::Connecting,
                SocketState::Accepted,
                SocketState::Connected,
                SocketState::Disconnecting,
            ],
        );
        let state = found.map(|i| self.table.slot(i).seq).unwrap_or_default();
        let info = FrmrInfo {
            flags,
            rejected: header.ptype,
            sequence: sequence.unwrap_or(Sequence::new(Seq::ZERO, Seq::ZERO)),
            state,
        };
        tracing::warn!(
            dsap = header.dsap,
            ssap = header.ssap,
            ptype = ?header.ptype,
            flags = info.flags.bits(),
            "frame rejected"
        );

        self.serializer
            .send_control(Pdu::new(header.reply(PType::Frmr), info.to_bytes().to_vec()));
    }
}
