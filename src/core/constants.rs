//! Protocol constants for the LLCP connection-oriented transport.
//!
//! These values are fixed by the NFC Forum LLCP specification and MUST NOT be
//! changed.

// =============================================================================
// SEQUENCE NUMBERS
// =============================================================================

/// Sequence numbers (N(S), N(R), V(S), V(R), ...) are taken modulo 16.
pub const SEQUENCE_MODULUS: u8 = 16;

/// Mask for a 4-bit sequence number.
pub const SEQUENCE_MASK: u8 = 0x0F;

// =============================================================================
// SERVICE ACCESS POINTS
// =============================================================================

/// Highest SAP value plus one (SAPs are 6 bits).
pub const SAP_NUMBER: u8 = 0x40;

/// Mask for a 6-bit SAP.
pub const SAP_MASK: u8 = 0x3F;

/// Service discovery protocol SAP. CONNECT frames carrying a service name
/// are addressed here.
pub const SAP_SDP: u8 = 0x01;

/// First SAP of the well-known range.
pub const SAP_WKS_FIRST: u8 = 0x00;

/// First SAP of the advertised (SDP-registered) range.
pub const SAP_ADVERTISED_FIRST: u8 = 0x10;

/// First SAP of the unadvertised range.
pub const SAP_UNADVERTISED_FIRST: u8 = 0x20;

/// Lowest SAP accepted as an explicit `connect` destination.
pub const SAP_CONNECT_MIN: u8 = 0x02;

/// Number of advertised SAPs (and service-name cache entries).
pub const SDP_ADVERTISED_COUNT: usize = (SAP_UNADVERTISED_FIRST - SAP_ADVERTISED_FIRST) as usize;

// =============================================================================
// LINK PARAMETERS
// =============================================================================

/// Default maximum information unit.
pub const MIU_DEFAULT: u16 = 128;

/// Mask for the 11-bit MIUX extension.
pub const MIUX_MASK: u16 = 0x07FF;

/// Largest MIU expressible through MIUX.
pub const MIU_MAX: u16 = MIU_DEFAULT + MIUX_MASK;

/// Default receive window.
pub const RW_DEFAULT: u8 = 1;

/// Largest receive window.
pub const RW_MAX: u8 = 15;

/// Mask for the 4-bit RW value.
pub const RW_MASK: u8 = 0x0F;

/// Smallest usable linear receive buffer. A non-empty linear region below
/// this size is rejected.
pub const LINEAR_BUFFER_MIN: usize = 128;

/// Default number of socket slots per transport.
pub const MAX_SOCKETS_DEFAULT: usize = 16;

/// Longest service name carried in an SN parameter.
pub const SERVICE_NAME_MAX_LEN: usize = 255;

// =============================================================================
// FRAME SIZES
// =============================================================================

/// PDU header size (DSAP, PTYPE, SSAP).
pub const HEADER_SIZE: usize = 2;

/// Sequence field size for I, RR and RNR frames.
pub const SEQUENCE_SIZE: usize = 1;

/// DM information field size (reason code).
pub const DM_INFO_SIZE: usize = 1;

/// FRMR information field size.
pub const FRMR_INFO_SIZE: usize = 4;

// =============================================================================
// PARAMETER TLVS
// =============================================================================

/// TLV header size (type + length).
pub const TLV_HEADER_SIZE: usize = 2;

/// Version number parameter.
pub const TLV_TYPE_VERSION: u8 = 0x01;

/// Maximum information unit extension parameter.
pub const TLV_TYPE_MIUX: u8 = 0x02;

/// Well-known service list parameter.
pub const TLV_TYPE_WKS: u8 = 0x03;

/// Link timeout parameter.
pub const TLV_TYPE_LTO: u8 = 0x04;

/// Receive window size parameter.
pub const TLV_TYPE_RW: u8 = 0x05;

/// Service name parameter.
pub const TLV_TYPE_SN: u8 = 0x06;

/// Option parameter.
pub const TLV_TYPE_OPT: u8 = 0x07;

/// MIUX value length.
pub const TLV_LENGTH_MIUX: usize = 2;

/// RW value length.
pub const TLV_LENGTH_RW: usize = 1;
