//! tn3270r: a pure-Rust TN3270 / TN3270E client library
//!
//! Implements the IBM 3270 terminal family over Telnet per RFC 1576 and
//! RFC 2355, interoperable with real mainframe hosts and with s3270.
//! Applications get a programmable session: connect, negotiate, receive
//! server-painted screens, inspect fields, inject keystrokes and AID
//! actions, and transmit modified-field replies. 3287 printer sessions run
//! the parallel SCS pipeline.
//!
//! The crate does not render, authenticate, or speak TLS; the transport is
//! an opaque byte stream that is already secured when the session sees it.

/// EBCDIC CHARACTER TRANSLATION: CP037 codec with compatibility dial
pub mod ebcdic;

/// LIB3270: the 3270 data-stream engine
/// Screen buffer, field model, parser, and reply writer
pub mod lib3270;

/// TELNET: IAC escaping, option negotiation, record framing
pub mod telnet;

/// TN3270E: 5-byte header codec, data types, response correlation
pub mod tn3270e;

/// NEGOTIATION: device-type and functions state machine with readiness events
pub mod negotiation;

/// KEYBOARD: key actions mapped to AIDs and local buffer mutations
pub mod keyboard;

/// PRINTER: 3287 SCS session path and job management
pub mod printer;

/// ERROR HANDLING: classification, recovery strategies, circuit breaker
pub mod error_handling;

/// Structured error types and result aliases
pub mod error;

/// Session configuration and persistence
pub mod config;

/// Session management: transport ownership and record dispatch
pub mod session;

// Re-exports for the common entry points
pub use config::SessionConfig;
pub use error::{TN3270Error, TN3270Result};
pub use keyboard::KeyAction;
pub use lib3270::{AidKey, Display3270, ScreenSize};
pub use negotiation::{infer_tn3270e_from_trace, NegotiationStatus};
pub use session::{Session3270, TcpTransport, Transport};
