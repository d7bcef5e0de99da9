//! Socket table: a fixed-capacity arena of socket slots with a free list.
//!
//! Lookups are linear scans (the table holds at most 64 slots) expressed as
//! pure functions returning the matching slot index.

use std::collections::VecDeque;
use std::ops::Range;

use super::socket::{Socket, SocketHandle, SocketState};
use crate::core::{LlcpError, LlcpResult, SAP_NUMBER, SDP_ADVERTISED_COUNT};

#[derive(Debug)]
pub(crate) struct SocketTable {
    slots: Vec<Socket>,
    free: VecDeque<usize>,
    names: Vec<(Vec<u8>, u8)>,
}

impl SocketTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Socket::default()).collect(),
            free: (0..capacity).collect(),
            names: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claim a free slot. The slot's generation is bumped so handles to its
    /// previous occupant stop resolving.
    pub fn allocate(&mut self) -> Option<SocketHandle> {
        let index = self.free.pop_front()?;
        let socket = &mut self.slots[index];
        socket.generation = socket.generation.wrapping_add(1);
        socket.state = SocketState::Created;
        Some(SocketHandle {
            index,
            generation: socket.generation,
        })
    }

    /// Return a reset slot to the free list.
    pub fn release(&mut self, index: usize) {
        if !self.slots[index].is_live() && !self.free.contains(&index) {
            self.free.push_back(index);
        }
    }

    pub fn handle(&self, index: usize) -> SocketHandle {
        SocketHandle {
            index,
            generation: self.slots[index].generation,
        }
    }

    pub fn get(&self, handle: SocketHandle) -> LlcpResult<&Socket> {
        match self.slots.get(handle.index) {
            Some(socket) if socket.generation == handle.generation => Ok(socket),
            _ => Err(LlcpError::InvalidParameter("stale socket handle")),
        }
    }

    pub fn get_mut(&mut self, handle: SocketHandle) -> LlcpResult<&mut Socket> {
        match self.slots.get_mut(handle.index) {
            Some(socket) if socket.generation == handle.generation => Ok(socket),
            _ => Err(LlcpError::InvalidParameter("stale socket handle")),
        }
    }

    pub fn slot(&self, index: usize) -> &Socket {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut Socket {
        &mut self.slots[index]
    }

    /// Slot indices in round-robin order starting at `start`.
    pub fn round_robin(&self, start: usize) -> impl Iterator<Item = usize> + use<> {
        let capacity = self.slots.len();
        (0..capacity).map(move |offset| (start + offset) % capacity)
    }

    fn position(&self, predicate: impl Fn(&Socket) -> bool) -> Option<usize> {
        self.slots.iter().position(predicate)
    }

    // ===== LOOKUPS =====

    /// Listening socket bound to `sap`.
    pub fn find_listener_by_sap(&self, sap: u8) -> Option<usize> {
        self.position(|s| s.state == SocketState::Registered && s.local_sap == sap)
    }

    /// Listening socket bound to service name `name`.
    pub fn find_listener_by_name(&self, name: &[u8]) -> Option<usize> {
        self.position(|s| {
            s.state == SocketState::Registered && s.service_name.as_deref() == Some(name)
        })
    }

    /// Socket with the given SAP pair in one of `states`.
    pub fn find_connection(&self, local: u8, remote: u8, states: &[SocketState]) -> Option<usize> {
        self.position(|s| states.contains(&s.state) && s.matches(local, remote))
    }

    /// Socket with the given local SAP in one of `states`.
    pub fn find_by_local(&self, local: u8, states: &[SocketState]) -> Option<usize> {
        self.position(|s| states.contains(&s.state) && s.local_sap == local)
    }

    /// Check if a live socket owns `sap` as its local SAP.
    pub fn is_sap_used(&self, sap: u8) -> bool {
        self.slots.iter().any(|s| s.is_live() && s.local_sap == sap)
    }

    /// Check if a bound or listening socket other than `except` uses `name`.
    pub fn is_name_bound(&self, name: &[u8], except: usize) -> bool {
        self.slots.iter().enumerate().any(|(index, s)| {
            index != except
                && matches!(s.state, SocketState::Bound | SocketState::Registered)
                && s.service_name.as_deref() == Some(name)
        })
    }

    /// Lowest unused SAP in `range`.
    pub fn free_sap(&self, range: Range<u8>) -> Option<u8> {
        let reserved: Vec<u8> = self.names.iter().map(|(_, sap)| *sap).collect();
        range
            .take_while(|sap| *sap < SAP_NUMBER)
            .find(|sap| !self.is_sap_used(*sap) && !reserved.contains(sap))
    }

    // ===== SERVICE NAME CACHE =====

    /// SAP previously assigned to `name`.
    pub fn cached_sap(&self, name: &[u8]) -> Option<u8> {
        self.names
            .iter()
            .find(|(cached, _)| cached.as_slice() == name)
            .map(|(_, sap)| *sap)
    }

    /// Remember the SAP assigned to `name`.
    pub fn cache_name(&mut self, name: &[u8], sap: u8) {
        if self.cached_sap(name).is_some() || self.names.len() >= SDP_ADVERTISED_COUNT {
            return;
        }
        self.names.push((name.to_vec(), sap));
    }

    /// Check if `sap` is reserved for a service name other than `name`.
    pub fn is_sap_reserved_for_other(&self, sap: u8, name: Option<&[u8]>) -> bool {
        self.names
            .iter()
            .any(|(cached, cached_sap)| *cached_sap == sap && Some(cached.as_slice()) != name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Socket> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SAP_ADVERTISED_FIRST, SAP_UNADVERTISED_FIRST};

    #[test]
    fn test_allocate_until_full() {
        let mut table = SocketTable::new(2);
        assert!(table.allocate().is_some());
        assert!(table.allocate().is_some());
        assert!(table.allocate().is_none());
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut table = SocketTable::new(1);
        let first = table.allocate().unwrap();
        let _ = table.slot_mut(first.index).reset();
        table.release(first.index);

        // Freed but not reused: the old handle still resolves
        assert!(table.get(first).is_ok());

        let second = table.allocate().unwrap();
        assert_eq!(second.index, first.index);
        assert!(table.get(first).is_err());
        assert!(table.get(second).is_ok());
    }

    #[test]
    fn test_release_ignores_live_and_duplicate() {
        let mut table = SocketTable::new(2);
        let handle = table.allocate().unwrap();
        table.release(handle.index);
        assert_eq!(table.free.len(), 1);

        let _ = table.slot_mut(handle.index).reset();
        table.release(handle.index);
        table.release(handle.index);
        assert_eq!(table.free.len(), 2);
    }

    #[test]
    fn test_lookups() {
        let mut table = SocketTable::new(4);
        let listener = table.allocate().unwrap();
        {
            let s = table.slot_mut(listener.index);
            s.state = SocketState::Registered;
            s.local_sap = 0x10;
            s.service_name = Some(b"urn:nfc:sn:snep".to_vec());
        }
        let conn = table.allocate().unwrap();
        {
            let s = table.slot_mut(conn.index);
            s.state = SocketState::Connected;
            s.local_sap = 0x10;
            s.remote_sap = 0x21;
        }

        assert_eq!(table.find_listener_by_sap(0x10), Some(listener.index));
        assert_eq!(table.find_listener_by_name(b"urn:nfc:sn:snep"), Some(listener.index));
        assert_eq!(table.find_listener_by_name(b"other"), None);
        assert_eq!(
            table.find_connection(0x10, 0x21, &[SocketState::Connected]),
            Some(conn.index)
        );
        assert_eq!(table.find_connection(0x10, 0x22, &[SocketState::Connected]), None);
        assert!(table.is_name_bound(b"urn:nfc:sn:snep", conn.index));
        assert!(!table.is_name_bound(b"urn:nfc:sn:snep", listener.index));
    }

    #[test]
    fn test_free_sap_skips_used_and_cached() {
        let mut table = SocketTable::new(4);
        let handle = table.allocate().unwrap();
        table.slot_mut(handle.index).local_sap = SAP_UNADVERTISED_FIRST;
        assert_eq!(
            table.free_sap(SAP_UNADVERTISED_FIRST..SAP_NUMBER),
            Some(SAP_UNADVERTISED_FIRST + 1)
        );

        table.cache_name(b"a", SAP_ADVERTISED_FIRST);
        assert_eq!(
            table.free_sap(SAP_ADVERTISED_FIRST..SAP_UNADVERTISED_FIRST),
            Some(SAP_ADVERTISED_FIRST + 1)
        );
        assert_eq!(table.cached_sap(b"a"), Some(SAP_ADVERTISED_FIRST));
        assert!(table.is_sap_reserved_for_other(SAP_ADVERTISED_FIRST, Some(b"b")));
        assert!(!table.is_sap_reserved_for_other(SAP_ADVERTISED_FIRST, Some(b"a")));
    }

    #[test]
    fn test_round_robin_wraps() {
        let table = SocketTable::new(4);
        let order: Vec<_> = table.round_robin(2).collect();
        assert_eq!(order, vec![2, 3, 0, 1]);
    }
}
