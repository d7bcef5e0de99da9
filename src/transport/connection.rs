//! Application-facing socket operations.
//!
//! Every operation either completes inline (`Progress::Done`, callback
//! already invoked) or records its work on the socket and returns
//! `Progress::Pending`; the callback then fires exactly once from a later
//! link completion or inbound frame.

use super::buffer::SocketBuffers;
use super::engine::Transport;
use super::frame::{PType, Pdu};
use super::socket::{
    Destination, DisconnectCompletion, Lifecycle, PendingRecv, PendingSend, Progress,
    SAP_UNBOUND, SocketHandle, SocketNotice, SocketOptions, SocketState,
};
use super::tlv::ConnectionParams;
use crate::core::{
    LinkSend, LlcpError, LlcpResult, SAP_ADVERTISED_FIRST, SAP_CONNECT_MIN, SAP_NUMBER, SAP_SDP,
    SAP_UNADVERTISED_FIRST,
};

impl<L: LinkSend> Transport<L> {
    /// Create a connection-oriented socket.
    ///
    /// `working_buffer` is carved into RW receive slots, a send staging
    /// region and an optional linear receive FIFO according to `options`.
    pub fn socket(
        &mut self,
        options: SocketOptions,
        working_buffer: Vec<u8>,
        notify: impl FnMut(SocketNotice) + 'static,
    ) -> LlcpResult<SocketHandle> {
        options.validate()?;
        let buffers = SocketBuffers::carve(working_buffer, options.miu, options.rw)?;
        let handle = self
            .table
            .allocate()
            .ok_or(LlcpError::InsufficientResources)?;

        let socket = self.table.slot_mut(handle.index);
        socket.local = options;
        socket.buffers = Some(buffers);
        socket.notify = Some(Box::new(notify));
        tracing::debug!(index = handle.index, miu = options.miu, rw = options.rw, "socket created");
        Ok(handle)
    }

    /// Bind a socket to a local SAP, optionally advertising `service_name`.
    ///
    /// `sap == 0` picks a free SAP: from the advertised range when a service
    /// name is given, from the unadvertised range otherwise. Returns the
    /// bound SAP.
    pub fn bind(
        &mut self,
        handle: SocketHandle,
        sap: u8,
        service_name: Option<&[u8]>,
    ) -> LlcpResult<u8> {
        let index = handle.index;
        if self.table.get(handle)?.state != SocketState::Created {
            return Err(LlcpError::InvalidState("bind"));
        }
        if let Some(name) = service_name {
            if name.is_empty() || name.len() > self.config.max_service_name_len {
                return Err(LlcpError::InvalidParameter("service name length"));
            }
            if self.table.is_name_bound(name, index) {
                return Err(LlcpError::AlreadyRegistered);
            }
        }

        self.table.slot_mut(index).local_sap = SAP_UNBOUND;
        let sap = match (sap, service_name) {
            (0, Some(name)) => self
                .cached_name_sap(name)
                .or_else(|| self.table.free_sap(SAP_ADVERTISED_FIRST..SAP_UNADVERTISED_FIRST))
                .ok_or(LlcpError::InsufficientResources)?,
            (0, None) => self
                .table
                .free_sap(SAP_UNADVERTISED_FIRST..SAP_NUMBER)
                .ok_or(LlcpError::InsufficientResources)?,
            (sap, name) => {
                let in_range = match name {
                    Some(_) => sap < SAP_UNADVERTISED_FIRST,
                    None => sap < SAP_ADVERTISED_FIRST || (SAP_UNADVERTISED_FIRST..SAP_NUMBER).contains(&sap),
                };
                if !in_range || sap == SAP_SDP {
                    return Err(LlcpError::InvalidParameter("SAP outside the allowed range"));
                }
                if let Some(cached) = name.and_then(|n| self.cached_name_sap(n)) {
                    if cached != sap {
                        return Err(LlcpError::InvalidParameter("service name cached with another SAP"));
                    }
                }
                if self.config.cache_service_names && self.table.is_sap_reserved_for_other(sap, name) {
                    return Err(LlcpError::AlreadyRegistered);
                }
                sap
            }
        };
        if self.table.is_sap_used(sap) {
            return Err(LlcpError::AlreadyRegistered);
        }

        if let Some(name) = service_name {
            if self.config.cache_service_names && sap >= SAP_ADVERTISED_FIRST {
                self.table.cache_name(name, sap);
            }
        }

        let socket = self.table.slot_mut(index);
        socket.local_sap = sap;
        socket.service_name = service_name.map(<[u8]>::to_vec);
        socket.transition(SocketState::Bound);
        Ok(sap)
    }

    fn cached_name_sap(&self, name: &[u8]) -> Option<u8> {
        if self.config.cache_service_names {
            self.table.cached_sap(name)
        } else {
            None
        }
    }

    /// Listen for incoming connections on a bound socket.
    ///
    /// `callback` runs once per incoming CONNECT with the handle of the new
    /// socket, which must then be accepted or rejected. It receives
    /// `Err(Aborted)` when the listening socket is closed.
    pub fn listen(
        &mut self,
        handle: SocketHandle,
        callback: impl FnMut(LlcpResult<SocketHandle>) + 'static,
    ) -> LlcpResult<()> {
        let socket = self.table.get_mut(handle)?;
        if socket.state != SocketState::Bound
            || socket.remote_sap != SAP_UNBOUND
            || !matches!(socket.lifecycle, Lifecycle::Idle)
        {
            return Err(LlcpError::InvalidState("listen"));
        }
        socket.lifecycle = Lifecycle::Listening(Box::new(callback));
        socket.transition(SocketState::Registered);
        tracing::info!(sap = socket.local_sap, "listening");
        Ok(())
    }

    /// Accept an incoming connection handed out by a listen callback.
    ///
    /// Sends CC carrying MIUX and RW when they differ from the defaults.
    /// `callback` fires once the CC has left the link.
    pub fn accept(
        &mut self,
        handle: SocketHandle,
        options: SocketOptions,
        working_buffer: Vec<u8>,
        notify: impl FnMut(SocketNotice) + 'static,
        callback: impl FnOnce(LlcpResult<()>) + 'static,
    ) -> LlcpResult<Progress> {
        let index = handle.index;
        let socket = self.table.get_mut(handle)?;
        if socket.state != SocketState::Bound
            || socket.remote_sap == SAP_UNBOUND
            || !matches!(socket.lifecycle, Lifecycle::Idle)
        {
            return Err(LlcpError::InvalidState("accept"));
        }
        options.validate()?;
        let mut buffers = SocketBuffers::carve(working_buffer, options.miu, options.rw)?;

        let params = ConnectionParams {
            miu: options.miu,
            rw: options.rw,
            service_name: None,
        };
        let encoded = params
            .encode()
            .map_err(|_| LlcpError::InvalidParameter("connection parameters"))?;
        let info = buffers.stage_params(&encoded)?.to_vec();

        socket.local = options;
        socket.buffers = Some(buffers);
        socket.notify = Some(Box::new(notify));
        socket.reset_sequence();
        socket.lifecycle = Lifecycle::Accepting {
            callback: Box::new(callback),
            queued: Some(Pdu::new(socket.header(PType::Cc), info)),
        };

        self.kick(index);
        Ok(self.lifecycle_progress(index, |l| matches!(l, Lifecycle::Accepting { .. })))
    }

    /// Refuse an incoming connection with DM(connect rejected). The socket is
    /// closed once the DM has left the link, then `callback` fires.
    pub fn reject(
        &mut self,
        handle: SocketHandle,
        callback: impl FnOnce(LlcpResult<()>) + 'static,
    ) -> LlcpResult<Progress> {
        let index = handle.index;
        let socket = self.table.get_mut(handle)?;
        if socket.state != SocketState::Bound
            || socket.remote_sap == SAP_UNBOUND
            || !matches!(socket.lifecycle, Lifecycle::Idle)
        {
            return Err(LlcpError::InvalidState("reject"));
        }
        socket.transition(SocketState::Rejected);
        socket.lifecycle = Lifecycle::Rejecting {
            callback: Box::new(callback),
            queued: true,
        };

        self.kick(index);
        Ok(self.lifecycle_progress(index, |l| matches!(l, Lifecycle::Rejecting { .. })))
    }

    /// Connect to a remote SAP or service name.
    ///
    /// An unbound socket is bound to a free unadvertised SAP first. A service
    /// name is sent to the peer's SDP SAP in an SN parameter. `callback`
    /// fires with `Ok` on CC, or with the refusal carried by DM or FRMR.
    pub fn connect(
        &mut self,
        handle: SocketHandle,
        destination: impl Into<Destination>,
        callback: impl FnOnce(LlcpResult<()>) + 'static,
    ) -> LlcpResult<Progress> {
        let index = handle.index;
        let (dsap, service_name) = match destination.into() {
            Destination::Sap(sap) => {
                if !(SAP_CONNECT_MIN..SAP_NUMBER).contains(&sap) {
                    return Err(LlcpError::InvalidParameter("destination SAP outside 2..=63"));
                }
                (sap, None)
            }
            Destination::ServiceName(name) => {
                if name.is_empty() || name.len() > self.config.max_service_name_len {
                    return Err(LlcpError::InvalidParameter("service name length"));
                }
                (SAP_SDP, Some(name))
            }
        };

        let socket = self.table.get(handle)?;
        if !matches!(socket.state, SocketState::Created | SocketState::Bound)
            || socket.remote_sap != SAP_UNBOUND
            || !matches!(socket.lifecycle, Lifecycle::Idle)
            || socket.buffers.is_none()
        {
            return Err(LlcpError::InvalidState("connect"));
        }
        if socket.service_name.is_some() {
            return Err(LlcpError::InvalidState("connect on a socket bound to a service name"));
        }

        if socket.local_sap == SAP_UNBOUND {
            let sap = self
                .table
                .free_sap(SAP_UNADVERTISED_FIRST..SAP_NUMBER)
                .ok_or(LlcpError::InsufficientResources)?;
            let socket = self.table.slot_mut(index);
            socket.local_sap = sap;
            socket.transition(SocketState::Bound);
        }

        let socket = self.table.slot_mut(index);
        let params = ConnectionParams {
            miu: socket.local.miu,
            rw: socket.local.rw,
            service_name,
        };
        let encoded = params
            .encode()
            .map_err(|_| LlcpError::InvalidParameter("connection parameters"))?;
        let Some(buffers) = socket.buffers.as_mut() else {
            return Err(LlcpError::InvalidState("connect"));
        };
        let info = buffers.stage_params(&encoded)?.to_vec();

        socket.remote_sap = dsap;
        socket.reset_sequence();
        socket.lifecycle = Lifecycle::Connecting {
            callback: Box::new(callback),
            queued: Some(Pdu::new(socket.header(PType::Connect), info)),
        };
        tracing::debug!(local_sap = socket.local_sap, dsap, "connect requested");

        self.kick(index);
        let progress = self.lifecycle_progress(index, |l| matches!(l, Lifecycle::Connecting { .. }));
        if progress == Progress::Done {
            self.table.slot_mut(index).remote_sap = SAP_UNBOUND;
        }
        Ok(progress)
    }

    /// Disconnect a connected socket.
    ///
    /// Pending send and recv callbacks fail with `Failed` before the DISC is
    /// queued. `callback` fires when the peer answers with DM.
    pub fn disconnect(
        &mut self,
        handle: SocketHandle,
        callback: impl FnOnce(LlcpResult<()>) + 'static,
    ) -> LlcpResult<Progress> {
        let socket = self.table.get(handle)?;
        if socket.state != SocketState::Connected || !matches!(socket.lifecycle, Lifecycle::Idle) {
            return Err(LlcpError::InvalidState("disconnect"));
        }
        Ok(self.start_disconnect(handle.index, DisconnectCompletion::User(Box::new(callback))))
    }

    fn start_disconnect(&mut self, index: usize, completion: DisconnectCompletion) -> Progress {
        let socket = self.table.slot_mut(index);
        let teardown = socket.take_transfers();
        socket.rr_pending = false;
        socket.rnr_pending = false;
        socket.lifecycle = Lifecycle::Disconnecting {
            completion,
            queued: true,
        };
        teardown.fire(LlcpError::Failed);

        self.kick(index);
        let socket = self.table.slot(index);
        if socket.is_live() && matches!(socket.lifecycle, Lifecycle::Disconnecting { .. }) {
            Progress::Pending
        } else {
            Progress::Done
        }
    }

    /// Close a socket.
    ///
    /// A connected socket is disconnected first and reset when the peer
    /// answers. Any other socket is reset immediately and every pending
    /// callback receives `Aborted`. Closing an already closed socket is a
    /// no-op.
    pub fn close(&mut self, handle: SocketHandle) -> LlcpResult<Progress> {
        let socket = self.table.get(handle)?;
        match socket.state {
            SocketState::Default => Ok(Progress::Done),
            SocketState::Connected if matches!(socket.lifecycle, Lifecycle::Idle) => {
                Ok(self.start_disconnect(handle.index, DisconnectCompletion::Close))
            }
            _ => {
                self.close_now(handle.index, LlcpError::Aborted);
                Ok(Progress::Done)
            }
        }
    }

    /// Send one I-frame worth of data.
    ///
    /// The frame goes out when the link is idle and the peer's receive
    /// window has room; otherwise it waits. `callback` fires once the frame
    /// has left the link. Only one send may be outstanding per socket.
    pub fn send(
        &mut self,
        handle: SocketHandle,
        data: &[u8],
        callback: impl FnOnce(LlcpResult<()>) + 'static,
    ) -> LlcpResult<Progress> {
        let socket = self.table.get_mut(handle)?;
        if socket.state != SocketState::Connected || !matches!(socket.lifecycle, Lifecycle::Idle) {
            return Err(LlcpError::InvalidState("send"));
        }
        if data.len() > usize::from(socket.remote.miu) {
            return Err(LlcpError::InvalidParameter("payload exceeds remote MIU"));
        }
        if socket.send.is_some() {
            return Err(LlcpError::OperationPending);
        }

        socket.send = Some(PendingSend {
            payload: data.to_vec(),
            callback: Box::new(callback),
            queued: true,
        });
        if !socket.can_send() {
            tracing::debug!(
                local_sap = socket.local_sap,
                in_flight = socket.seq.in_flight(),
                remote_rw = socket.remote.rw,
                "send window closed, send queued"
            );
        }

        self.kick(handle.index);
        Ok(if self.table.slot(handle.index).send.is_some() {
            Progress::Pending
        } else {
            Progress::Done
        })
    }

    /// Receive data.
    ///
    /// Buffered data is returned inline. Without a linear FIFO one stored
    /// I-frame is returned whole; with one, up to `capacity` bytes are read.
    /// With nothing buffered on a connected socket the read waits for the
    /// next I-frame.
    pub fn recv(
        &mut self,
        handle: SocketHandle,
        capacity: usize,
        callback: impl FnOnce(LlcpResult<Vec<u8>>) + 'static,
    ) -> LlcpResult<Progress> {
        let index = handle.index;
        let socket = self.table.get_mut(handle)?;
        if capacity == 0 {
            return Err(LlcpError::InvalidParameter("zero receive capacity"));
        }
        if !socket.is_live() {
            return Err(LlcpError::InvalidState("recv"));
        }
        if socket.recv.is_some() {
            return Err(LlcpError::OperationPending);
        }
        let Some(buffers) = socket.buffers.as_mut() else {
            return Err(LlcpError::InvalidState("recv"));
        };

        let data = if buffers.has_linear() {
            if buffers.fifo_len() == 0 {
                None
            } else {
                let data = buffers.fifo_read(capacity);
                let moved = buffers.drain_ring_into_fifo();
                let ready = buffers.ring_is_empty()
                    && (buffers.fifo_len() == 0
                        || buffers.fifo_available() >= usize::from(socket.local.miu));
                for _ in 0..moved {
                    socket.seq.vr = socket.seq.vr.next();
                }
                if socket.receiver_busy && ready {
                    socket.receiver_busy = false;
                    self.request_ack(index, PType::Rr);
                }
                Some(data)
            }
        } else {
            let data = buffers.ring_pop();
            if data.is_some() {
                socket.seq.vr = socket.seq.vr.next();
                if socket.receiver_busy {
                    socket.receiver_busy = false;
                    self.request_ack(index, PType::Rr);
                }
            }
            data
        };

        if let Some(data) = data {
            callback(Ok(data));
            return Ok(Progress::Done);
        }

        let socket = self.table.slot_mut(index);
        if socket.state != SocketState::Connected {
            return Err(LlcpError::InvalidState("recv"));
        }
        socket.recv = Some(PendingRecv {
            capacity,
            callback: Box::new(callback),
        });
        Ok(Progress::Pending)
    }

    fn lifecycle_progress(&self, index: usize, pending: impl Fn(&Lifecycle) -> bool) -> Progress {
        let socket = self.table.slot(index);
        if socket.is_live() && pending(&socket.lifecycle) {
            Progress::Pending
        } else {
            Progress::Done
        }
    }
}
