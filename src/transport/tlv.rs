//! Parameter TLVs carried in CONNECT and CC information fields.

use thiserror::Error;

use crate::core::{
    MIU_DEFAULT, MIUX_MASK, RW_DEFAULT, RW_MASK, TLV_HEADER_SIZE, TLV_LENGTH_MIUX, TLV_LENGTH_RW,
    TLV_TYPE_MIUX, TLV_TYPE_RW, TLV_TYPE_SN,
};

/// TLV decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TlvError {
    /// Buffer ends inside a TLV header.
    #[error("truncated TLV header at offset {0}")]
    TruncatedHeader(usize),

    /// Declared length runs past the end of the buffer.
    #[error("TLV at offset {offset} declares {length} bytes, {remaining} remain")]
    TruncatedValue {
        /// Offset of the TLV.
        offset: usize,
        /// Declared value length.
        length: usize,
        /// Bytes left after the header.
        remaining: usize,
    },

    /// Value longer than a one-byte length can express.
    #[error("TLV value too long: {0} bytes")]
    ValueTooLong(usize),
}

/// Append one TLV to `buf`.
pub fn encode_tlv(buf: &mut Vec<u8>, tlv_type: u8, value: &[u8]) -> Result<(), TlvError> {
    let length = u8::try_from(value.len()).map_err(|_| TlvError::ValueTooLong(value.len()))?;
    buf.reserve(TLV_HEADER_SIZE + value.len());
    buf.push(tlv_type);
    buf.push(length);
    buf.extend_from_slice(value);
    Ok(())
}

/// Pack an MIUX value.
pub fn encode_miux(miux: u16) -> [u8; TLV_LENGTH_MIUX] {
    (miux & MIUX_MASK).to_be_bytes()
}

/// Pack an RW value.
pub fn encode_rw(rw: u8) -> [u8; TLV_LENGTH_RW] {
    [rw & RW_MASK]
}

/// Iterator over the TLVs of an information field.
///
/// Yields `(type, value)` pairs; stops after the first error.
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> TlvReader<'a> {
    /// Create a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for TlvReader<'a> {
    type Item = Result<(u8, &'a [u8]), TlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let offset = self.offset;
        let remaining = &self.data[offset..];
        if remaining.len() < TLV_HEADER_SIZE {
            self.failed = true;
            return Some(Err(TlvError::TruncatedHeader(offset)));
        }

        let tlv_type = remaining[0];
        let length = usize::from(remaining[1]);
        let value = &remaining[TLV_HEADER_SIZE..];
        if value.len() < length {
            self.failed = true;
            return Some(Err(TlvError::TruncatedValue {
                offset,
                length,
                remaining: value.len(),
            }));
        }

        self.offset += TLV_HEADER_SIZE + length;
        Some(Ok((tlv_type, &value[..length])))
    }
}

/// Connection parameters negotiated through CONNECT and CC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Peer MIU (128 + MIUX).
    pub miu: u16,
    /// Peer receive window.
    pub rw: u8,
    /// Service name, if an SN parameter was present.
    pub service_name: Option<Vec<u8>>,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            miu: MIU_DEFAULT,
            rw: RW_DEFAULT,
            service_name: None,
        }
    }
}

impl ConnectionParams {
    /// Parse the information field of a CONNECT or CC frame.
    ///
    /// Parameters with an unexpected length and unknown parameter types are
    /// ignored. A truncated TLV stream is an error.
    pub fn parse(info: &[u8]) -> Result<Self, TlvError> {
        let mut params = Self::default();

        for tlv in TlvReader::new(info) {
            let (tlv_type, value) = tlv?;
            match tlv_type {
                TLV_TYPE_SN if !value.is_empty() => {
                    params.service_name = Some(value.to_vec());
                }
                TLV_TYPE_RW if value.len() == TLV_LENGTH_RW => {
                    params.rw = value[0] & RW_MASK;
                }
                TLV_TYPE_MIUX if value.len() == TLV_LENGTH_MIUX => {
                    let miux = u16::from_be_bytes([value[0], value[1]]) & MIUX_MASK;
                    params.miu = MIU_DEFAULT + miux;
                }
                _ => {}
            }
        }

        Ok(params)
    }

    /// Encode the parameters a local socket advertises: MIUX and RW only when
    /// they differ from the defaults, then SN when present.
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut buf = Vec::new();
        let miux = self.miu.saturating_sub(MIU_DEFAULT) & MIUX_MASK;
        if miux != 0 {
            encode_tlv(&mut buf, TLV_TYPE_MIUX, &encode_miux(miux))?;
        }
        if self.rw != RW_DEFAULT {
            encode_tlv(&mut buf, TLV_TYPE_RW, &encode_rw(self.rw))?;
        }
        if let Some(name) = &self.service_name {
            encode_tlv(&mut buf, TLV_TYPE_SN, name)?;
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_defaults_is_empty() {
        let params = ConnectionParams::default();
        assert!(params.encode().unwrap().is_empty());
    }

    #[test]
    fn test_encode_all_parameters() {
        let params = ConnectionParams {
            miu: 256,
            rw: 4,
            service_name: Some(b"urn:nfc:sn:snep".to_vec()),
        };
        let encoded = params.encode().unwrap();
        assert_eq!(
            hex::encode(&encoded[..7]),
            // MIUX = 128, RW = 4
            "02020080050104"
        );
        assert_eq!(encoded[7], TLV_TYPE_SN);
        assert_eq!(usize::from(encoded[8]), b"urn:nfc:sn:snep".len());

        assert_eq!(ConnectionParams::parse(&encoded), Ok(params));
    }

    #[test]
    fn test_parse_masks_values() {
        // MIUX 0xFFFF is masked to 0x7FF, RW 0xF3 masked to 3
        let info = hex::decode("0202ffff0501f3").unwrap();
        let params = ConnectionParams::parse(&info).unwrap();
        assert_eq!(params.miu, MIU_DEFAULT + 0x07FF);
        assert_eq!(params.rw, 3);
    }

    #[test]
    fn test_parse_ignores_bad_lengths_and_unknown_types() {
        // RW with length 2, MIUX with length 1, LTO, empty SN
        let mut info = hex::decode("05020102020101040132").unwrap();
        info.extend_from_slice(&[TLV_TYPE_SN, 0]);
        let params = ConnectionParams::parse(&info).unwrap();
        assert_eq!(params, ConnectionParams::default());
    }

    #[test]
    fn test_parse_truncated() {
        assert_eq!(
            ConnectionParams::parse(&[TLV_TYPE_RW]),
            Err(TlvError::TruncatedHeader(0))
        );
        assert_eq!(
            ConnectionParams::parse(&hex::decode("050104020200").unwrap()),
            Err(TlvError::TruncatedValue {
                offset: 3,
                length: 2,
                remaining: 1
            })
        );
    }

    #[test]
    fn test_reader_yields_in_order() {
        let mut buf = Vec::new();
        encode_tlv(&mut buf, 0x01, &[0x10]).unwrap();
        encode_tlv(&mut buf, 0x04, &[0x32]).unwrap();

        let items: Vec<_> = TlvReader::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(items, vec![(0x01, &[0x10][..]), (0x04, &[0x32][..])]);
    }

    #[test]
    fn test_value_too_long() {
        let mut buf = Vec::new();
        let value = vec![0u8; 256];
        assert_eq!(
            encode_tlv(&mut buf, TLV_TYPE_SN, &value),
            Err(TlvError::ValueTooLong(256))
        );
        assert!(buf.is_empty());
    }
}
