//! Async link driver.
//!
//! The transport itself is synchronous: it is fed received PDUs and send
//! completions and calls back into the application inline. [`LinkDriver`]
//! pairs a [`Transport`] with a tokio channel of [`LinkEvent`]s and feeds
//! them in order, which is all a MAC layer integration needs.
//!
//! [`loopback_pair`] wires two drivers back to back through
//! [`ChannelLink`]s.

mod link;

pub use link::{ChannelLink, LinkEvent};

use tokio::sync::mpsc;

use crate::core::LinkSend;
use crate::transport::{Transport, TransportConfig};

/// Event loop feeding one transport.
#[derive(Debug)]
pub struct LinkDriver<L> {
    transport: Transport<L>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl<L: LinkSend> LinkDriver<L> {
    /// Drive `transport` from `events`.
    pub fn new(transport: Transport<L>, events: mpsc::UnboundedReceiver<LinkEvent>) -> Self {
        Self { transport, events }
    }

    /// The driven transport.
    pub fn transport(&self) -> &Transport<L> {
        &self.transport
    }

    /// Mutable access to the driven transport, for socket operations.
    pub fn transport_mut(&mut self) -> &mut Transport<L> {
        &mut self.transport
    }

    /// Feed one event to the transport.
    pub fn handle(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Received(data) => self.transport.receive(&data),
            LinkEvent::SendComplete(result) => self.transport.on_send_complete(result),
        }
    }

    /// Wait for the next event and process it. Returns `false` once every
    /// sender is gone.
    pub async fn step(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => {
                tracing::debug!("link event channel closed");
                false
            }
        }
    }

    /// Process every event already queued without waiting. Returns the number
    /// of events processed.
    pub fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle(event);
            processed += 1;
        }
        if processed > 0 {
            tracing::trace!(processed, "link events processed");
        }
        processed
    }

    /// Stop the driver, tearing every socket down.
    pub fn shutdown(mut self) -> Transport<L> {
        self.events.close();
        self.transport.close_all();
        self.transport
    }
}

/// Two transports joined by an in-memory link.
pub fn loopback_pair(config: TransportConfig) -> (LinkDriver<ChannelLink>, LinkDriver<ChannelLink>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let a = Transport::with_config(ChannelLink::new(b_tx.clone(), a_tx.clone()), config.clone());
    let b = Transport::with_config(ChannelLink::new(a_tx, b_tx), config);
    (LinkDriver::new(a, a_rx), LinkDriver::new(b, b_rx))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::core::LlcpError;
    use crate::transport::{Progress, SocketHandle, SocketOptions, SocketState};

    type Driver = LinkDriver<ChannelLink>;

    fn settle(a: &mut Driver, b: &mut Driver) {
        while a.run_until_idle() + b.run_until_idle() > 0 {}
    }

    fn socket(driver: &mut Driver) -> SocketHandle {
        driver
            .transport_mut()
            .socket(SocketOptions::default(), vec![0; 256], |_| {})
            .unwrap()
    }

    /// Connect `a` to a listener at SAP 0x30 on `b`.
    fn establish(a: &mut Driver, b: &mut Driver) -> (SocketHandle, SocketHandle) {
        let listener = socket(b);
        b.transport_mut().bind(listener, 0x30, None).unwrap();
        let incoming = Rc::new(RefCell::new(Vec::new()));
        let sink = incoming.clone();
        b.transport_mut()
            .listen(listener, move |r| sink.borrow_mut().push(r))
            .unwrap();

        let client = socket(a);
        a.transport_mut().connect(client, 0x30u8, |_| {}).unwrap();
        settle(a, b);

        let server = incoming.borrow_mut().pop().unwrap().unwrap();
        b.transport_mut()
            .accept(server, SocketOptions::default(), vec![0; 256], |_| {}, |_| {})
            .unwrap();
        settle(a, b);
        (client, server)
    }

    #[tokio::test]
    async fn test_loopback_exchange() {
        let (mut a, mut b) = loopback_pair(TransportConfig::default());
        let (client, server) = establish(&mut a, &mut b);
        assert_eq!(a.transport().state(client), Ok(SocketState::Connected));
        assert_eq!(b.transport().state(server), Ok(SocketState::Connected));

        let sent = Rc::new(RefCell::new(Vec::new()));
        let sink = sent.clone();
        a.transport_mut()
            .send(client, b"ping", move |r| sink.borrow_mut().push(r))
            .unwrap();
        settle(&mut a, &mut b);
        assert_eq!(*sent.borrow(), vec![Ok(())]);

        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        let progress = b
            .transport_mut()
            .recv(server, 128, move |r| sink.borrow_mut().push(r))
            .unwrap();
        assert_eq!(progress, Progress::Done);
        assert_eq!(*received.borrow(), vec![Ok(b"ping".to_vec())]);

        b.transport_mut().send(server, b"pong", |_| {}).unwrap();
        settle(&mut a, &mut b);
        let sink = received.clone();
        a.transport_mut()
            .recv(client, 128, move |r| sink.borrow_mut().push(r))
            .unwrap();
        assert_eq!(received.borrow()[1], Ok(b"pong".to_vec()));
    }

    #[tokio::test]
    async fn test_step_processes_one_event() {
        let (mut a, mut b) = loopback_pair(TransportConfig::default());
        let listener = socket(&mut b);
        b.transport_mut().bind(listener, 0x30, None).unwrap();
        let incoming = Rc::new(RefCell::new(0));
        let count = incoming.clone();
        b.transport_mut()
            .listen(listener, move |_| *count.borrow_mut() += 1)
            .unwrap();

        let client = socket(&mut a);
        a.transport_mut().connect(client, 0x30u8, |_| {}).unwrap();
        assert!(a.transport().is_link_busy());

        assert!(b.step().await);
        assert_eq!(*incoming.borrow(), 1);
        assert!(a.step().await);
        assert!(!a.transport().is_link_busy());
    }

    #[tokio::test]
    async fn test_disconnect_over_loopback() {
        let (mut a, mut b) = loopback_pair(TransportConfig::default());
        let (client, server) = establish(&mut a, &mut b);

        let done = Rc::new(RefCell::new(Vec::new()));
        let sink = done.clone();
        a.transport_mut()
            .disconnect(client, move |r| sink.borrow_mut().push(r))
            .unwrap();
        settle(&mut a, &mut b);

        assert_eq!(*done.borrow(), vec![Ok(())]);
        assert_eq!(a.transport().state(client), Ok(SocketState::Created));
        assert_eq!(b.transport().state(server), Ok(SocketState::Disconnected));
    }

    #[tokio::test]
    async fn test_peer_gone_fails_connect() {
        let (mut a, b) = loopback_pair(TransportConfig::default());
        drop(b);

        let result = Rc::new(RefCell::new(Vec::new()));
        let sink = result.clone();
        let client = socket(&mut a);
        let progress = a
            .transport_mut()
            .connect(client, 0x30u8, move |r| sink.borrow_mut().push(r))
            .unwrap();
        assert_eq!(progress, Progress::Done);
        assert_eq!(*result.borrow(), vec![Err(LlcpError::Failed)]);
        assert!(!a.transport().is_link_busy());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_sockets() {
        let (mut a, mut b) = loopback_pair(TransportConfig::default());
        let (client, _) = establish(&mut a, &mut b);

        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        a.transport_mut()
            .recv(client, 128, move |r| sink.borrow_mut().push(r))
            .unwrap();

        let transport = a.shutdown();
        assert_eq!(transport.socket_count(), 0);
        assert_eq!(*received.borrow(), vec![Err(LlcpError::Aborted)]);
    }
}
