//! Error types for TN3270R
//!
//! Structured error types for robust operation against real hosts. Every
//! user-visible failure carries the operation name and, where known, the
//! remote endpoint, so callers never see a bare "connection failed".

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

/// Top-level error type for TN3270R operations
#[derive(Debug)]
pub enum TN3270Error {
    /// Transport setup failure or reset during the session
    Connection(ConnectionError),
    /// Option or subnegotiation failures
    Negotiation(NegotiationError),
    /// Telnet framing invariants violated
    Protocol(ProtocolError),
    /// A 3270 record could not be interpreted
    Parse(ParseError),
    /// API call that requires an active session
    NotConnected { operation: String },
    /// A bounded wait expired without mutating session state
    Timeout {
        host: String,
        port: u16,
        operation: String,
        timeout: Duration,
    },
}

/// Transport-level connection errors
#[derive(Debug)]
pub enum ConnectionError {
    /// Connection refused or unreachable during setup
    SetupFailed { host: String, port: u16, reason: String },
    /// Connection dropped mid-session
    ConnectionLost { host: String, port: u16, reason: String },
    /// The peer closed the stream (EOF)
    Closed { host: String, port: u16 },
}

/// Negotiation errors
#[derive(Debug)]
pub enum NegotiationError {
    /// Option negotiation reached a contradictory state
    ContradictoryState { option: u8, detail: String },
    /// The host rejected or we cannot serve the requested device type
    UnsupportedDeviceType { device_type: String },
    /// The device-type request was rejected by the server
    DeviceTypeRejected { reason_code: u8 },
    /// Function negotiation produced an empty intersection
    NoCommonFunctions { offered: u8, accepted: u8 },
    /// Negotiation did not finish within the allowed time
    NegotiationTimeout { operation: String, timeout: Duration },
    /// The configured mode forbids what the server insists on
    ModeForbidden { requested: String, forced: String },
}

/// Telnet protocol errors; these close the session
#[derive(Debug)]
pub enum ProtocolError {
    /// IAC without a following command byte
    DanglingIac { position: usize },
    /// Subnegotiation never terminated by IAC SE
    UnterminatedSubnegotiation { option: u8 },
    /// A TN3270E header could not be interpreted
    InvalidDataType { data_type: u8 },
}

/// 3270 data-stream parse errors; these invalidate only the current record
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// A command or order needed more bytes than the record holds
    ShortRecord {
        expected: usize,
        available: usize,
        context: &'static str,
    },
    /// A buffer address outside rows * cols
    BadAddress { address: u16, buffer_size: usize },
    /// An order byte the parser does not recognize (strict mode only)
    UnknownOrder { order: u8, position: usize },
    /// A record that opens with a byte that is not a 3270 command
    UnknownCommand { command: u8 },
}

impl fmt::Display for TN3270Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TN3270Error::Connection(err) => write!(f, "Connection error: {err}"),
            TN3270Error::Negotiation(err) => write!(f, "Negotiation error: {err}"),
            TN3270Error::Protocol(err) => write!(f, "Protocol error: {err}"),
            TN3270Error::Parse(err) => write!(f, "Parse error: {err}"),
            TN3270Error::NotConnected { operation } => {
                write!(f, "Operation '{operation}' requires an active session")
            }
            TN3270Error::Timeout { host, port, operation, timeout } => write!(
                f,
                "Operation '{operation}' to {host}:{port} timed out after {:.1}s",
                timeout.as_secs_f64()
            ),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::SetupFailed { host, port, reason } => {
                write!(f, "failed to connect to {host}:{port}: {reason}")
            }
            ConnectionError::ConnectionLost { host, port, reason } => {
                write!(f, "connection to {host}:{port} lost: {reason}")
            }
            ConnectionError::Closed { host, port } => {
                write!(f, "connection to {host}:{port} closed by peer")
            }
        }
    }
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationError::ContradictoryState { option, detail } => {
                write!(f, "option {option} reached a contradictory state: {detail}")
            }
            NegotiationError::UnsupportedDeviceType { device_type } => {
                write!(f, "unsupported device type '{device_type}'")
            }
            NegotiationError::DeviceTypeRejected { reason_code } => {
                write!(f, "server rejected device type (reason 0x{reason_code:02X})")
            }
            NegotiationError::NoCommonFunctions { offered, accepted } => write!(
                f,
                "no common TN3270E functions (offered 0x{offered:02X}, accepted 0x{accepted:02X})"
            ),
            NegotiationError::NegotiationTimeout { operation, timeout } => write!(
                f,
                "negotiation step '{operation}' timed out after {:.1}s",
                timeout.as_secs_f64()
            ),
            NegotiationError::ModeForbidden { requested, forced } => write!(
                f,
                "server requires {requested} but configuration forces {forced}"
            ),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::DanglingIac { position } => {
                write!(f, "IAC at offset {position} without a following command byte")
            }
            ProtocolError::UnterminatedSubnegotiation { option } => {
                write!(f, "subnegotiation for option {option} never terminated by IAC SE")
            }
            ProtocolError::InvalidDataType { data_type } => {
                write!(f, "invalid TN3270E data type 0x{data_type:02X}")
            }
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::ShortRecord { expected, available, context } => write!(
                f,
                "short record in {context}: needed {expected} more bytes, found {available}"
            ),
            ParseError::BadAddress { address, buffer_size } => {
                write!(f, "buffer address {address} exceeds buffer size {buffer_size}")
            }
            ParseError::UnknownOrder { order, position } => {
                write!(f, "unknown order 0x{order:02X} at offset {position}")
            }
            ParseError::UnknownCommand { command } => {
                write!(f, "unknown command code 0x{command:02X}")
            }
        }
    }
}

impl StdError for TN3270Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TN3270Error::Connection(err) => Some(err),
            TN3270Error::Negotiation(err) => Some(err),
            TN3270Error::Protocol(err) => Some(err),
            TN3270Error::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl StdError for ConnectionError {}
impl StdError for NegotiationError {}
impl StdError for ProtocolError {}
impl StdError for ParseError {}

impl From<ConnectionError> for TN3270Error {
    fn from(err: ConnectionError) -> Self {
        TN3270Error::Connection(err)
    }
}

impl From<NegotiationError> for TN3270Error {
    fn from(err: NegotiationError) -> Self {
        TN3270Error::Negotiation(err)
    }
}

impl From<ProtocolError> for TN3270Error {
    fn from(err: ProtocolError) -> Self {
        TN3270Error::Protocol(err)
    }
}

impl From<ParseError> for TN3270Error {
    fn from(err: ParseError) -> Self {
        TN3270Error::Parse(err)
    }
}

impl From<io::Error> for TN3270Error {
    fn from(err: io::Error) -> Self {
        TN3270Error::Connection(ConnectionError::ConnectionLost {
            host: "unknown".to_string(),
            port: 0,
            reason: err.to_string(),
        })
    }
}

/// Result type alias for TN3270R operations
pub type TN3270Result<T> = Result<T, TN3270Error>;

/// Specialized result types for individual layers
pub type ParseResult<T> = Result<T, ParseError>;
pub type ProtocolResult<T> = Result<T, ProtocolError>;
pub type NegotiationResult<T> = Result<T, NegotiationError>;
