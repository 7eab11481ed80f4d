//! TN3270E data framing (RFC 2355)
//!
//! When TN3270E is negotiated, every record carries a 5-byte header:
//! data-type, request-flag, response-flag, and a 16-bit sequence number that
//! wraps modulo 65536. The header tells the session which pipeline a record
//! belongs to: display data, printer (SCS) data, negotiation artifacts like
//! BIND-IMAGE, or RESPONSE records correlated back to earlier REQUESTs.
//!
//! Records from hosts that never negotiated TN3270E have no header and are
//! treated wholesale as 3270 display data.

use std::collections::HashMap;

/// TN3270E data-type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 3270 display data stream
    Data3270 = 0x00,
    /// SCS printer character stream
    ScsData = 0x01,
    /// Response to a previous record
    Response = 0x02,
    /// SNA BIND parameters, including alternate screen dimensions
    BindImage = 0x03,
    /// SNA UNBIND
    Unbind = 0x04,
    /// NVT (line mode) data
    NvtData = 0x05,
    /// Request record
    Request = 0x06,
    /// SSCP-LU session data
    SscpLuData = 0x07,
    /// Printer end-of-job boundary
    PrintEoj = 0x08,
}

impl DataType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Data3270),
            0x01 => Some(Self::ScsData),
            0x02 => Some(Self::Response),
            0x03 => Some(Self::BindImage),
            0x04 => Some(Self::Unbind),
            0x05 => Some(Self::NvtData),
            0x06 => Some(Self::Request),
            0x07 => Some(Self::SscpLuData),
            0x08 => Some(Self::PrintEoj),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Response-flag values on DATA records
pub const RESPONSE_FLAG_NO_RESPONSE: u8 = 0x00;
pub const RESPONSE_FLAG_ERROR_RESPONSE: u8 = 0x01;
pub const RESPONSE_FLAG_ALWAYS_RESPONSE: u8 = 0x02;

/// Response-flag values on RESPONSE records
pub const RESPONSE_FLAG_POSITIVE: u8 = 0x00;
pub const RESPONSE_FLAG_NEGATIVE: u8 = 0x01;

/// The 5-byte TN3270E record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TN3270EHeader {
    pub data_type: DataType,
    pub request_flag: u8,
    pub response_flag: u8,
    pub sequence_number: u16,
}

impl TN3270EHeader {
    pub fn new(data_type: DataType, sequence_number: u16) -> Self {
        Self {
            data_type,
            request_flag: 0,
            response_flag: RESPONSE_FLAG_NO_RESPONSE,
            sequence_number,
        }
    }

    /// Parse a header from the front of a record. Returns None when the
    /// record is too short or the first byte is not a valid data type.
    pub fn parse(record: &[u8]) -> Option<Self> {
        if record.len() < 5 {
            return None;
        }
        let data_type = DataType::from_u8(record[0])?;
        Some(Self {
            data_type,
            request_flag: record[1],
            response_flag: record[2],
            sequence_number: u16::from_be_bytes([record[3], record[4]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; 5] {
        let seq = self.sequence_number.to_be_bytes();
        [
            self.data_type.to_u8(),
            self.request_flag,
            self.response_flag,
            seq[0],
            seq[1],
        ]
    }
}

/// One inbound record after header classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRecord<'a> {
    /// The header, when TN3270E framing applied
    pub header: Option<TN3270EHeader>,
    /// The record payload with any header stripped
    pub payload: &'a [u8],
}

impl<'a> ClassifiedRecord<'a> {
    /// The effective data type; headerless records are 3270 display data
    pub fn data_type(&self) -> DataType {
        self.header.map(|h| h.data_type).unwrap_or(DataType::Data3270)
    }
}

/// Split an inbound record into header and payload.
///
/// The header is stripped only when TN3270E is active, the record is at
/// least five bytes, and the first byte is a valid data-type code. Anything
/// else is display data in its entirety.
pub fn classify_record(record: &[u8], tn3270e_active: bool) -> ClassifiedRecord<'_> {
    if tn3270e_active {
        if let Some(header) = TN3270EHeader::parse(record) {
            return ClassifiedRecord { header: Some(header), payload: &record[5..] };
        }
    }
    ClassifiedRecord { header: None, payload: record }
}

/// Monotonic outbound sequence counter, wrapping modulo 65536
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: u16,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Return the next sequence number and advance
    pub fn next(&mut self) -> u16 {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }

    pub fn peek(&self) -> u16 {
        self.next
    }
}

/// Prepend a TN3270E header to an outbound payload
pub fn wrap_outbound(
    data_type: DataType,
    payload: &[u8],
    sequence: u16,
    request_response: bool,
) -> Vec<u8> {
    let mut header = TN3270EHeader::new(data_type, sequence);
    if request_response {
        header.request_flag = RESPONSE_FLAG_ALWAYS_RESPONSE;
    }
    let mut out = Vec::with_capacity(5 + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    out
}

/// The disposition of a correlated RESPONSE record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    Positive,
    Negative,
}

/// Correlates RESPONSE records with the REQUEST sequence numbers that
/// originated them
#[derive(Debug, Default)]
pub struct ResponseCorrelator {
    outstanding: HashMap<u16, DataType>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self { outstanding: HashMap::new() }
    }

    /// Record an outbound record that requested a response
    pub fn track(&mut self, sequence: u16, data_type: DataType) {
        self.outstanding.insert(sequence, data_type);
    }

    /// Correlate an inbound RESPONSE header with its originating record.
    /// Returns the originating data type and the disposition, or None for
    /// an unmatched sequence number.
    pub fn correlate(&mut self, header: &TN3270EHeader) -> Option<(DataType, ResponseDisposition)> {
        let origin = self.outstanding.remove(&header.sequence_number)?;
        let disposition = if header.response_flag == RESPONSE_FLAG_POSITIVE {
            ResponseDisposition::Positive
        } else {
            ResponseDisposition::Negative
        };
        Some((origin, disposition))
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }
}
