//! Inbound frame dispatch.
//!
//! Each connection-oriented PDU type has a handler that locates the socket
//! it addresses and advances that socket's state. Frames addressed to no
//! socket are dropped; malformed frames and sequence violations are answered
//! with FRMR.

use super::engine::Transport;
use super::frame::{DmReason, FrameError, FrmrFlags, Header, PType, Pdu};
use super::socket::{
    DisconnectCompletion, Lifecycle, SAP_UNBOUND, SocketNotice, SocketOptions, SocketState,
};
use super::tlv::ConnectionParams;
use crate::core::{LinkSend, LlcpError, SAP_SDP};

impl<L: LinkSend> Transport<L> {
    /// Process one PDU received from the link.
    pub fn receive(&mut self, data: &[u8]) {
        match Pdu::from_bytes(data) {
            Ok(pdu) => self.dispatch(pdu),
            Err(FrameError::MissingSequence(ptype)) => {
                if let Ok(header) = Header::from_bytes(data) {
                    tracing::warn!(?ptype, "sequenced frame without sequence field");
                    self.frame_reject(header, FrmrFlags::I, None);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, len = data.len(), "undecodable frame dropped");
            }
        }
    }

    /// Route a decoded PDU to its handler.
    pub fn dispatch(&mut self, pdu: Pdu) {
        tracing::trace!(
            ptype = ?pdu.ptype(),
            dsap = pdu.header.dsap,
            ssap = pdu.header.ssap,
            len = pdu.info.len(),
            "pdu received"
        );

        match pdu.ptype() {
            PType::Connect => self.handle_connect(pdu),
            PType::Disc => self.handle_disc(pdu),
            PType::Cc => self.handle_cc(pdu),
            PType::Dm => self.handle_dm(pdu),
            PType::Frmr => self.handle_frmr(pdu),
            PType::I => self.handle_i(pdu),
            PType::Rr | PType::Rnr => self.handle_receive_ack(pdu),
            ptype if ptype.is_reserved() => {
                self.frame_reject(pdu.header, FrmrFlags::W, pdu.sequence);
            }
            ptype => {
                tracing::trace!(?ptype, "not a connection-oriented pdu, ignored");
            }
        }
    }

    fn handle_connect(&mut self, pdu: Pdu) {
        let header = pdu.header;
        let params = match ConnectionParams::parse(&pdu.info) {
            Ok(params) => params,
            Err(err) => {
                tracing::warn!(error = %err, "malformed CONNECT parameters");
                self.frame_reject(header, FrmrFlags::I, None);
                return;
            }
        };

        let listener = if header.dsap == SAP_SDP {
            params
                .service_name
                .as_deref()
                .and_then(|name| self.table.find_listener_by_name(name))
        } else {
            self.table.find_listener_by_sap(header.dsap)
        };
        let Some(listener) = listener else {
            tracing::debug!(dsap = header.dsap, ssap = header.ssap, "CONNECT to unbound SAP");
            self.serializer
                .send_control(Pdu::dm(header.ssap, header.dsap, DmReason::SapNotFound));
            return;
        };

        let local_sap = self.table.slot(listener).local_sap;
        let existing = self.table.find_connection(
            local_sap,
            header.ssap,
            &[
                SocketState::Bound,
                SocketState::Accepted,
                SocketState::Connected,
            ],
        );
        let handle = match existing {
            Some(_) => None,
            None => self.table.allocate(),
        };
        let Some(handle) = handle else {
            tracing::debug!(local_sap, ssap = header.ssap, "no socket available for CONNECT");
            self.serializer
                .send_control(Pdu::dm(header.ssap, header.dsap, DmReason::SocketNotAvailable));
            return;
        };

        let socket = self.table.slot_mut(handle.index);
        socket.local_sap = local_sap;
        socket.remote_sap = header.ssap;
        socket.remote = SocketOptions::new(params.miu, params.rw);
        socket.transition(SocketState::Bound);
        tracing::info!(
            local_sap,
            remote_sap = header.ssap,
            remote_miu = params.miu,
            remote_rw = params.rw,
            "incoming connection"
        );

        if let Lifecycle::Listening(callback) = &mut self.table.slot_mut(listener).lifecycle {
            callback(Ok(handle));
        }
    }

    fn handle_disc(&mut self, pdu: Pdu) {
        let header = pdu.header;
        let Some(index) =
            self.table
                .find_connection(header.dsap, header.ssap, &[SocketState::Connected])
        else {
            tracing::debug!(dsap = header.dsap, ssap = header.ssap, "DISC for no connection");
            return;
        };

        let socket = self.table.slot_mut(index);
        let teardown = socket.take_transfers();
        socket.rr_pending = false;
        socket.rnr_pending = false;
        socket.transition(SocketState::Disconnected);
        tracing::info!(
            local_sap = header.dsap,
            remote_sap = header.ssap,
            "peer disconnected"
        );
        teardown.fire(LlcpError::Failed);

        self.serializer
            .send_control(Pdu::dm(header.ssap, header.dsap, DmReason::Disconnected));
        self.table.slot_mut(index).notify(SocketNotice::Disconnected);
    }

    fn handle_cc(&mut self, pdu: Pdu) {
        let header = pdu.header;
        let params = match ConnectionParams::parse(&pdu.info) {
            Ok(params) => params,
            Err(err) => {
                tracing::warn!(error = %err, "malformed CC parameters");
                self.frame_reject(header, FrmrFlags::I, None);
                return;
            }
        };
        let Some(index) = self
            .table
            .find_by_local(header.dsap, &[SocketState::Connecting])
        else {
            tracing::debug!(dsap = header.dsap, "CC for no pending connect");
            return;
        };

        let socket = self.table.slot_mut(index);
        socket.remote_sap = header.ssap;
        socket.remote = SocketOptions::new(params.miu, params.rw);
        socket.reset_sequence();
        socket.transition(SocketState::Connected);
        tracing::info!(
            local_sap = header.dsap,
            remote_sap = header.ssap,
            remote_miu = params.miu,
            remote_rw = params.rw,
            "connection established"
        );
        if let Lifecycle::Connecting { callback, .. } = std::mem::take(&mut socket.lifecycle) {
            callback(Ok(()));
        }
    }

    fn handle_dm(&mut self, pdu: Pdu) {
        let header = pdu.header;
        let reason = match DmReason::from_info(&pdu.info) {
            Ok(reason) => reason,
            Err(FrameError::UnknownDmReason(code)) => {
                tracing::warn!(code, "DM with unknown reason dropped");
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "malformed DM");
                self.frame_reject(header, FrmrFlags::I, None);
                return;
            }
        };
        let Some(index) = self.table.find_by_local(
            header.dsap,
            &[SocketState::Disconnecting, SocketState::Connecting],
        ) else {
            tracing::debug!(dsap = header.dsap, ?reason, "DM for no pending operation");
            return;
        };

        let socket = self.table.slot_mut(index);
        let lifecycle = std::mem::take(&mut socket.lifecycle);
        socket.remote_sap = SAP_UNBOUND;
        socket.reset_sequence();
        socket.transition(SocketState::Created);

        match lifecycle {
            Lifecycle::Connecting { callback, .. } => {
                tracing::info!(local_sap = header.dsap, ?reason, "connection refused");
                callback(Err(LlcpError::ConnectRefused(reason)));
            }
            Lifecycle::Disconnecting {
                completion: DisconnectCompletion::User(callback),
                ..
            } => {
                tracing::info!(local_sap = header.dsap, "disconnected");
                callback(Ok(()));
            }
            Lifecycle::Disconnecting {
                completion: DisconnectCompletion::Close,
                ..
            } => self.close_now(index, LlcpError::Aborted),
            other => self.table.slot_mut(index).lifecycle = other,
        }
    }

    fn handle_frmr(&mut self, pdu: Pdu) {
        let header = pdu.header;
        let Some(index) = self.table.find_connection(
            header.dsap,
            header.ssap,
            &[
                SocketState::Connecting,
                SocketState::Accepted,
                SocketState::Connected,
                SocketState::Disconnecting,
            ],
        ) else {
            tracing::debug!(dsap = header.dsap, ssap = header.ssap, "FRMR for no connection");
            return;
        };

        tracing::warn!(
            local_sap = header.dsap,
            remote_sap = header.ssap,
            info = %hex_info(&pdu.info),
            "peer rejected a frame"
        );
        self.table.slot_mut(index).notify(SocketNotice::FrameRejected);
        self.close_now(index, LlcpError::FrameRejected);
    }

    fn handle_i(&mut self, pdu: Pdu) {
        let header = pdu.header;
        let Some(index) = self.table.find_connection(
            header.dsap,
            header.ssap,
            &[SocketState::Connected, SocketState::Accepted],
        ) else {
            tracing::debug!(dsap = header.dsap, ssap = header.ssap, "I-frame for no connection");
            return;
        };
        let Some(sequence) = pdu.sequence else {
            self.frame_reject(header, FrmrFlags::I, None);
            return;
        };

        let socket = self.table.slot(index);
        let mut flags = FrmrFlags::NONE;
        if socket.seq.receive_offset(sequence.ns) >= socket.local.rw {
            flags |= FrmrFlags::S;
        }
        if pdu.info.len() > usize::from(socket.local.miu) {
            flags |= FrmrFlags::I;
        }
        if !socket.seq.is_valid_nr(sequence.nr) {
            flags |= FrmrFlags::R;
        }
        if !flags.is_empty() {
            self.frame_reject(header, flags, Some(sequence));
            return;
        }

        let socket = self.table.slot_mut(index);
        socket.seq.vsa = sequence.nr;
        let Some(buffers) = socket.buffers.as_mut() else {
            tracing::warn!(local_sap = header.dsap, "I-frame before buffers were set up");
            return;
        };

        if !buffers.has_linear() {
            if buffers.ring_is_empty() && socket.recv.is_some() {
                socket.seq.vr = socket.seq.vr.next();
                if let Some(recv) = socket.recv.take() {
                    (recv.callback)(Ok(pdu.info));
                }
                self.acknowledge(index);
            } else if buffers.ring_push(&pdu.info) {
                self.receiver_busy(index);
            } else {
                self.frame_reject(header, FrmrFlags::S, Some(sequence));
            }
            return;
        }

        if buffers.ring_is_empty() && buffers.fifo_write(&pdu.info) {
            socket.seq.vr = socket.seq.vr.next();
            if let Some(recv) = socket.recv.take() {
                let data = buffers.fifo_read(recv.capacity);
                (recv.callback)(Ok(data));
            }
            self.acknowledge(index);
        } else if buffers.ring_push(&pdu.info) {
            self.receiver_busy(index);
        } else {
            self.frame_reject(header, FrmrFlags::S, Some(sequence));
        }
    }

    /// A frame was stored without being consumed: announce RNR once.
    fn receiver_busy(&mut self, index: usize) {
        let socket = self.table.slot_mut(index);
        if !socket.receiver_busy {
            socket.receiver_busy = true;
            self.request_ack(index, PType::Rnr);
        }
    }

    fn handle_receive_ack(&mut self, pdu: Pdu) {
        let header = pdu.header;
        let Some(index) = self.table.find_connection(
            header.dsap,
            header.ssap,
            &[SocketState::Connected, SocketState::Accepted],
        ) else {
            tracing::debug!(ptype = ?header.ptype, dsap = header.dsap, "ack for no connection");
            return;
        };
        let Some(sequence) = pdu.sequence else {
            self.frame_reject(header, FrmrFlags::I, None);
            return;
        };

        let socket = self.table.slot_mut(index);
        let mut flags = FrmrFlags::NONE;
        if !socket.seq.is_valid_nr(sequence.nr) {
            flags |= FrmrFlags::R;
        }
        if !pdu.info.is_empty() {
            flags |= FrmrFlags::W | FrmrFlags::I;
        }
        if !flags.is_empty() {
            self.frame_reject(header, flags, Some(sequence));
            return;
        }

        socket.seq.vsa = sequence.nr;
        if header.ptype == PType::Rnr {
            if !socket.remote_busy {
                socket.remote_busy = true;
                socket.notify(SocketNotice::RemoteBusy);
            }
        } else if socket.remote_busy {
            socket.remote_busy = false;
            socket.notify(SocketNotice::RemoteNotBusy);
        }

        self.kick(index);
    }
}

fn hex_info(info: &[u8]) -> String {
    info.iter().map(|b| format!("{b:02x}")).collect()
}
