//! IBM 3270 data-stream engine
//!
//! The display-side heart of the crate: the screen buffer and field model,
//! and the byte-oriented parser/writer for the 3270 data stream (RFC 1576,
//! RFC 2355, GA23-0059).
//!
//! The 3270 protocol is block-oriented. The host paints whole screens with
//! Write commands carrying orders and field attributes; the terminal answers
//! read commands and operator AID actions with modified-field replies. This
//! module is transport-agnostic: framing, telnet negotiation, and TN3270E
//! headers live a level up.
//!
//! - [`codes`] - command codes, order codes, AID keys, attribute bits
//! - [`display`] - screen buffer, cursor, buffer addressing
//! - [`field`] - field attributes and the derived field list
//! - [`protocol`] - data-stream parser and reply writer

pub mod codes;
pub mod display;
pub mod field;
pub mod protocol;

pub use codes::{AidKey, CommandCode, OrderCode};
pub use display::{addressing, BufferCell, Display3270, ScreenSize};
pub use field::{ExtendedAttributes, FieldAttribute, FieldManager, ScreenField};
pub use protocol::{PendingRead, ProtocolProcessor3270};
