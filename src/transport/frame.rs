//! LLCP PDU encoding and decoding.
//!
//! Wire format:
//! ```text
//!  0                   1                   2
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
//! +-----------+-------+-----------+-------+-------+----
//! |   DSAP    | PTYPE |   SSAP    | N(S)  | N(R)  | information ...
//! +-----------+-------+-----------+-------+-------+----
//!                                  \ I, RR, RNR only /
//! ```

use thiserror::Error;

use super::sequence::{Seq, SequenceState};
use crate::core::{DM_INFO_SIZE, FRMR_INFO_SIZE, HEADER_SIZE, SAP_MASK, SEQUENCE_SIZE};

/// PDU types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PType {
    /// Symmetry.
    Symm = 0x0,
    /// Parameter exchange.
    Pax = 0x1,
    /// Aggregated frame.
    Agf = 0x2,
    /// Unnumbered information.
    Ui = 0x3,
    /// Connect.
    Connect = 0x4,
    /// Disconnect.
    Disc = 0x5,
    /// Connection complete.
    Cc = 0x6,
    /// Disconnected mode.
    Dm = 0x7,
    /// Frame reject.
    Frmr = 0x8,
    /// Service name lookup.
    Snl = 0x9,
    /// Reserved.
    ReservedA = 0xA,
    /// Reserved.
    ReservedB = 0xB,
    /// Information.
    I = 0xC,
    /// Receive ready.
    Rr = 0xD,
    /// Receive not ready.
    Rnr = 0xE,
    /// Reserved.
    ReservedF = 0xF,
}

impl PType {
    /// Parse a PDU type from its 4-bit field.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0x0 => Self::Symm,
            0x1 => Self::Pax,
            0x2 => Self::Agf,
            0x3 => Self::Ui,
            0x4 => Self::Connect,
            0x5 => Self::Disc,
            0x6 => Self::Cc,
            0x7 => Self::Dm,
            0x8 => Self::Frmr,
            0x9 => Self::Snl,
            0xA => Self::ReservedA,
            0xB => Self::ReservedB,
            0xC => Self::I,
            0xD => Self::Rr,
            0xE => Self::Rnr,
            _ => Self::ReservedF,
        }
    }

    /// Convert the PDU type to its 4-bit field.
    pub fn as_bits(self) -> u8 {
        self as u8
    }

    /// Check if this PDU type carries a sequence field.
    pub fn is_sequenced(self) -> bool {
        matches!(self, Self::I | Self::Rr | Self::Rnr)
    }

    /// Check if this PDU type is reserved.
    pub fn is_reserved(self) -> bool {
        matches!(self, Self::ReservedA | Self::ReservedB | Self::ReservedF)
    }
}

/// Frame decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer than two header bytes.
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    /// I, RR or RNR frame without its sequence byte.
    #[error("missing sequence field for {0:?}")]
    MissingSequence(PType),

    /// Information field of the wrong length.
    #[error("invalid information field length {actual} for {ptype:?}")]
    InvalidLength {
        /// PDU type being decoded.
        ptype: PType,
        /// Length found.
        actual: usize,
    },

    /// Unknown DM reason code.
    #[error("unknown DM reason: {0:#04x}")]
    UnknownDmReason(u8),
}

/// PDU header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Destination SAP.
    pub dsap: u8,
    /// PDU type.
    pub ptype: PType,
    /// Source SAP.
    pub ssap: u8,
}

impl Header {
    /// Create a header.
    pub fn new(dsap: u8, ptype: PType, ssap: u8) -> Self {
        Self {
            dsap: dsap & SAP_MASK,
            ptype,
            ssap: ssap & SAP_MASK,
        }
    }

    /// Encode to the 2-byte wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let word = (u16::from(self.dsap & SAP_MASK) << 10)
            | (u16::from(self.ptype.as_bits()) << 6)
            | u16::from(self.ssap & SAP_MASK);
        word.to_be_bytes()
    }

    /// Decode from the first two bytes of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < HEADER_SIZE {
            return Err(FrameError::TooShort(data.len()));
        }
        let word = u16::from_be_bytes([data[0], data[1]]);
        Ok(Self {
            dsap: ((word >> 10) as u8) & SAP_MASK,
            ptype: PType::from_bits((word >> 6) as u8),
            ssap: (word as u8) & SAP_MASK,
        })
    }

    /// Header for a reply: source and destination swapped.
    pub fn reply(&self, ptype: PType) -> Self {
        Self::new(self.ssap, ptype, self.dsap)
    }
}

/// N(S)/N(R) sequence field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    /// Send sequence number.
    pub ns: Seq,
    /// Receive sequence number.
    pub nr: Seq,
}

impl Sequence {
    /// Create a sequence field.
    pub fn new(ns: Seq, nr: Seq) -> Self {
        Self { ns, nr }
    }

    /// Encode to one byte.
    pub fn as_byte(self) -> u8 {
        (self.ns.value() << 4) | self.nr.value()
    }

    /// Decode from one byte.
    pub fn from_byte(byte: u8) -> Self {
        Self {
            ns: Seq::new(byte >> 4),
            nr: Seq::new(byte),
        }
    }
}

/// A complete LLCP PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    /// Header.
    pub header: Header,
    /// Sequence field (I, RR, RNR).
    pub sequence: Option<Sequence>,
    /// Information field.
    pub info: Vec<u8>,
}

impl Pdu {
    /// Create an unsequenced PDU.
    pub fn new(header: Header, info: Vec<u8>) -> Self {
        Self {
            header,
            sequence: None,
            info,
        }
    }

    /// Create a sequenced PDU (I, RR, RNR).
    pub fn sequenced(header: Header, sequence: Sequence, info: Vec<u8>) -> Self {
        Self {
            header,
            sequence: Some(sequence),
            info,
        }
    }

    /// PDU type.
    pub fn ptype(&self) -> PType {
        self.header.ptype
    }

    /// Build a DM frame.
    pub fn dm(dsap: u8, ssap: u8, reason: DmReason) -> Self {
        Self::new(Header::new(dsap, PType::Dm, ssap), vec![reason.as_byte()])
    }

    /// Encoded size.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.sequence.map_or(0, |_| SEQUENCE_SIZE) + self.info.len()
    }

    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.header.to_bytes());
        if let Some(sequence) = self.sequence {
            buf.push(sequence.as_byte());
        }
        buf.extend_from_slice(&self.info);
        buf
    }

    /// Decode from wire bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        let header = Header::from_bytes(data)?;
        let rest = &data[HEADER_SIZE..];

        if header.ptype.is_sequenced() {
            let Some((&byte, info)) = rest.split_first() else {
                return Err(FrameError::MissingSequence(header.ptype));
            };
            Ok(Self::sequenced(header, Sequence::from_byte(byte), info.to_vec()))
        } else {
            Ok(Self::new(header, rest.to_vec()))
        }
    }
}

/// DM reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DmReason {
    /// Disconnect acknowledged.
    Disconnected = 0x00,
    /// No active connection for the SAP pair.
    SapNotActive = 0x01,
    /// No service bound to the target SAP.
    SapNotFound = 0x02,
    /// The service rejected the connection.
    ConnectRejected = 0x03,
    /// Connection permanently not accepted at this SAP.
    ConnectNotAccepted = 0x20,
    /// No socket available to take the connection.
    SocketNotAvailable = 0x21,
}

impl DmReason {
    /// Parse a reason code.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Disconnected),
            0x01 => Some(Self::SapNotActive),
            0x02 => Some(Self::SapNotFound),
            0x03 => Some(Self::ConnectRejected),
            0x20 => Some(Self::ConnectNotAccepted),
            0x21 => Some(Self::SocketNotAvailable),
            _ => None,
        }
    }

    /// Convert to its byte value.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Decode the information field of a DM frame.
    pub fn from_info(info: &[u8]) -> Result<Self, FrameError> {
        if info.len() != DM_INFO_SIZE {
            return Err(FrameError::InvalidLength {
                ptype: PType::Dm,
                actual: info.len(),
            });
        }
        Self::from_byte(info[0]).ok_or(FrameError::UnknownDmReason(info[0]))
    }
}

/// FRMR condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrmrFlags(u8);

impl FrmrFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// W: unknown or malformed PDU type.
    pub const W: Self = Self(0x08);
    /// I: information field invalid or too long.
    pub const I: Self = Self(0x04);
    /// R: invalid N(R).
    pub const R: Self = Self(0x02);
    /// S: invalid N(S).
    pub const S: Self = Self(0x01);

    /// Create flags from the 4-bit field.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    /// Get the 4-bit field.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Check if no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Check if all flags in `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FrmrFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FrmrFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// FRMR information field.
///
/// Wire format (4 bytes):
/// ```text
/// +---+---+---+---+-------+------+------+------+------+------+------+
/// | W | I | R | S | PTYPE | N(S) | N(R) | V(S) | V(R) |V(S)A |V(R)A |
/// +---+---+---+---+-------+------+------+------+------+------+------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrmrInfo {
    /// Rejection conditions.
    pub flags: FrmrFlags,
    /// Type of the rejected PDU.
    pub rejected: PType,
    /// Sequence field of the rejected PDU (zero for unsequenced PDUs).
    pub sequence: Sequence,
    /// Local sequence state at the time of rejection.
    pub state: SequenceState,
}

impl FrmrInfo {
    /// Encode to the 4-byte information field.
    pub fn to_bytes(&self) -> [u8; FRMR_INFO_SIZE] {
        [
            (self.flags.bits() << 4) | self.rejected.as_bits(),
            self.sequence.as_byte(),
            (self.state.vs.value() << 4) | self.state.vr.value(),
            (self.state.vsa.value() << 4) | self.state.vra.value(),
        ]
    }

    /// Decode from an information field.
    pub fn from_bytes(info: &[u8]) -> Result<Self, FrameError> {
        if info.len() != FRMR_INFO_SIZE {
            return Err(FrameError::InvalidLength {
                ptype: PType::Frmr,
                actual: info.len(),
            });
        }
        Ok(Self {
            flags: FrmrFlags::from_bits(info[0] >> 4),
            rejected: PType::from_bits(info[0]),
            sequence: Sequence::from_byte(info[1]),
            state: SequenceState {
                vs: Seq::new(info[2] >> 4),
                vr: Seq::new(info[2]),
                vsa: Seq::new(info[3] >> 4),
                vra: Seq::new(info[3]),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        // CONNECT from SAP 0x20 to SAP 0x10
        let header = Header::new(0x10, PType::Connect, 0x20);
        assert_eq!(hex::encode(header.to_bytes()), "4120");

        let parsed = Header::from_bytes(&hex::decode("4120").unwrap()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_extremes() {
        let header = Header::new(0x3F, PType::ReservedF, 0x3F);
        assert_eq!(header.to_bytes(), [0xFF, 0xFF]);

        let header = Header::new(0, PType::Symm, 0);
        assert_eq!(header.to_bytes(), [0x00, 0x00]);
    }

    #[test]
    fn test_header_too_short() {
        assert_eq!(Header::from_bytes(&[0x41]), Err(FrameError::TooShort(1)));
    }

    #[test]
    fn test_reply_swaps_saps() {
        let header = Header::new(0x10, PType::Connect, 0x20);
        let reply = header.reply(PType::Cc);
        assert_eq!(reply.dsap, 0x20);
        assert_eq!(reply.ssap, 0x10);
        assert_eq!(reply.ptype, PType::Cc);
    }

    #[test]
    fn test_i_frame_bytes() {
        let pdu = Pdu::sequenced(
            Header::new(0x20, PType::I, 0x10),
            Sequence::new(Seq::new(3), Seq::new(5)),
            b"hi".to_vec(),
        );
        // 0x20<<10 | 0xC<<6 | 0x10 = 0x8310
        assert_eq!(hex::encode(pdu.to_bytes()), "8310356869");
        assert_eq!(pdu.encoded_len(), 5);

        let decoded = Pdu::from_bytes(&pdu.to_bytes()).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn test_sequenced_frame_requires_sequence() {
        let header = Header::new(0x20, PType::Rr, 0x10);
        assert_eq!(
            Pdu::from_bytes(&header.to_bytes()),
            Err(FrameError::MissingSequence(PType::Rr))
        );
    }

    #[test]
    fn test_dm_reason() {
        assert_eq!(DmReason::from_info(&[0x21]), Ok(DmReason::SocketNotAvailable));
        assert_eq!(
            DmReason::from_info(&[0x00, 0x00]),
            Err(FrameError::InvalidLength {
                ptype: PType::Dm,
                actual: 2
            })
        );
        assert_eq!(DmReason::from_info(&[0x42]), Err(FrameError::UnknownDmReason(0x42)));
    }

    #[test]
    fn test_frmr_info_layout() {
        let info = FrmrInfo {
            flags: FrmrFlags::W | FrmrFlags::I,
            rejected: PType::Rr,
            sequence: Sequence::new(Seq::new(0), Seq::new(7)),
            state: SequenceState {
                vs: Seq::new(1),
                vsa: Seq::new(0),
                vr: Seq::new(2),
                vra: Seq::new(2),
            },
        };
        assert_eq!(hex::encode(info.to_bytes()), "cd071202");
        assert_eq!(FrmrInfo::from_bytes(&info.to_bytes()), Ok(info));
    }

    #[test]
    fn test_ptype_classification() {
        assert!(PType::I.is_sequenced());
        assert!(!PType::Cc.is_sequenced());
        assert!(PType::from_bits(0xA).is_reserved());
        assert!(PType::from_bits(0xF).is_reserved());
        assert_eq!(PType::from_bits(0x7), PType::Dm);
    }
}
