//! Modulo-16 sequence arithmetic.
//!
//! All LLCP sequence variables (V(S), V(S)A, V(R), V(R)A and the N(S)/N(R)
//! fields of received frames) live in a 4-bit space where 15 and 0 are
//! adjacent.

use crate::core::{SEQUENCE_MASK, SEQUENCE_MODULUS};

/// A 4-bit sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Seq(u8);

impl Seq {
    /// Sequence number zero.
    pub const ZERO: Self = Self(0);

    /// Create a sequence number, reducing modulo 16.
    pub fn new(value: u8) -> Self {
        Self(value & SEQUENCE_MASK)
    }

    /// Get the raw 4-bit value.
    pub fn value(self) -> u8 {
        self.0
    }

    /// The following sequence number.
    pub fn next(self) -> Self {
        Self::new(self.0.wrapping_add(1))
    }

    /// Forward distance from `earlier` to `self`, in `0..16`.
    pub fn distance_from(self, earlier: Seq) -> u8 {
        (self.0 + SEQUENCE_MODULUS - earlier.0) % SEQUENCE_MODULUS
    }
}

impl From<u8> for Seq {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

/// The four sequence state variables of a data link connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceState {
    /// V(S): sequence number of the next I-frame to send.
    pub vs: Seq,
    /// V(S)A: oldest sequence number not yet acknowledged by the peer.
    pub vsa: Seq,
    /// V(R): sequence number of the next I-frame expected.
    pub vr: Seq,
    /// V(R)A: last receive sequence number reported to the peer.
    pub vra: Seq,
}

impl SequenceState {
    /// Number of sent I-frames awaiting acknowledgement.
    pub fn in_flight(&self) -> u8 {
        self.vs.distance_from(self.vsa)
    }

    /// Whether another I-frame fits in the peer's receive window.
    pub fn can_send(&self, remote_rw: u8) -> bool {
        self.in_flight() < remote_rw
    }

    /// Receive-window offset of an incoming N(S), relative to V(R)A.
    pub fn receive_offset(&self, ns: Seq) -> u8 {
        ns.distance_from(self.vra)
    }

    /// Whether an incoming N(R) acknowledges a frame we actually sent, i.e.
    /// lies in `[V(S)A, V(S)]` in circular order.
    pub fn is_valid_nr(&self, nr: Seq) -> bool {
        nr.distance_from(self.vsa) <= self.vs.distance_from(self.vsa)
    }

    /// Record that V(R) was reported to the peer.
    pub fn acknowledge_received(&mut self) {
        self.vra = self.vr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(vs: u8, vsa: u8, vr: u8, vra: u8) -> SequenceState {
        SequenceState {
            vs: Seq::new(vs),
            vsa: Seq::new(vsa),
            vr: Seq::new(vr),
            vra: Seq::new(vra),
        }
    }

    /// Reference N(R) check: walk forward from N(R), accepting if V(S) is
    /// reached before V(S)A.
    fn walk_nr(nr: u8, vsa: u8, vs: u8) -> bool {
        let mut index = nr;
        loop {
            if index == vs {
                return true;
            }
            index = (index + 1) % 16;
            if index == vsa {
                return false;
            }
            if index == nr {
                return false;
            }
        }
    }

    #[test]
    fn test_seq_wraps() {
        assert_eq!(Seq::new(15).next(), Seq::ZERO);
        assert_eq!(Seq::new(0x1F), Seq::new(15));
        assert_eq!(Seq::new(1).distance_from(Seq::new(15)), 2);
    }

    #[test]
    fn test_in_flight_wraparound() {
        let s = state(2, 14, 0, 0);
        assert_eq!(s.in_flight(), 4);
        assert!(s.can_send(5));
        assert!(!s.can_send(4));
    }

    #[test]
    fn test_can_send_with_zero_window() {
        let s = state(0, 0, 0, 0);
        assert!(!s.can_send(0));
        assert!(s.can_send(1));
    }

    #[test]
    fn test_receive_offset() {
        let s = state(0, 0, 0, 15);
        assert_eq!(s.receive_offset(Seq::new(15)), 0);
        assert_eq!(s.receive_offset(Seq::new(0)), 1);
        assert_eq!(s.receive_offset(Seq::new(14)), 15);
    }

    #[test]
    fn test_nr_validation_matches_walk() {
        for vsa in 0..16u8 {
            for outstanding in 0..16u8 {
                let vs = (vsa + outstanding) % 16;
                let s = state(vs, vsa, 0, 0);
                for nr in 0..16u8 {
                    assert_eq!(
                        s.is_valid_nr(Seq::new(nr)),
                        walk_nr(nr, vsa, vs),
                        "nr={nr} vsa={vsa} vs={vs}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_nr_validation_across_wrap() {
        let s = state(2, 14, 0, 0);
        for nr in [14, 15, 0, 1, 2] {
            assert!(s.is_valid_nr(Seq::new(nr)));
        }
        for nr in [3, 8, 13] {
            assert!(!s.is_valid_nr(Seq::new(nr)));
        }
    }

    #[test]
    fn test_acknowledge_received() {
        let mut s = state(0, 0, 5, 2);
        s.acknowledge_received();
        assert_eq!(s.vra, Seq::new(5));
    }
}
