//! TN3270 / TN3270E negotiation state machine
//!
//! Drives option negotiation and the TN3270E device-type and functions
//! subnegotiations, records the agreed device type, LU name, and function
//! set, and publishes three readiness conditions the session layer awaits:
//! device-type-known, functions-known, and negotiation-complete.
//!
//! The negotiator is fed by inbound telnet events and by the session's
//! connect routine. Responses accumulate in an output buffer the caller
//! drains onto the wire, the same shape the parent codebase uses for its
//! negotiation engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::telnet::{
    build_subnegotiation, TelnetCommand, TelnetOption, TelnetOptions,
};

/// TN3270E subnegotiation message types
pub const TN3270E_DEVICE_TYPE: u8 = 0x02;
pub const TN3270E_FUNCTIONS: u8 = 0x03;

/// TN3270E subnegotiation sub-commands
pub const TN3270E_SEND: u8 = 0x01;
pub const TN3270E_IS: u8 = 0x02;
pub const TN3270E_REJECT: u8 = 0x03;
pub const TN3270E_REQUEST: u8 = 0x07;

/// Separator introducing an LU name inside a device-type payload
pub const TN3270E_CONNECT: u8 = 0x01;

/// Device-type rejection reason: invalid device type
pub const REJECT_INV_DEVICE_TYPE: u8 = 0x04;

/// Terminal-type subnegotiation sub-commands (RFC 1091)
pub const TTYPE_IS: u8 = 0x00;
pub const TTYPE_SEND: u8 = 0x01;

/// TN3270E function codes
pub const FUNC_BIND_IMAGE: u8 = 0x00;
pub const FUNC_DATA_STREAM_CTL: u8 = 0x01;
pub const FUNC_RESPONSES: u8 = 0x02;
pub const FUNC_SCS_CTL_CODES: u8 = 0x03;
pub const FUNC_SYSREQ: u8 = 0x04;

/// Fold a list of function code bytes into a bitmask
pub fn functions_to_bitmask(codes: &[u8]) -> u8 {
    codes
        .iter()
        .filter(|&&c| c <= FUNC_SYSREQ)
        .fold(0u8, |mask, &c| mask | (1 << c))
}

/// Expand a function bitmask into the code list sent on the wire
pub fn bitmask_to_functions(mask: u8) -> Vec<u8> {
    (FUNC_BIND_IMAGE..=FUNC_SYSREQ)
        .filter(|&c| mask & (1 << c) != 0)
        .collect()
}

/// Accepted device-type strings and their default screen dimensions
pub const DEVICE_TYPES: &[(&str, usize, usize)] = &[
    ("IBM-3278-2", 24, 80),
    ("IBM-3278-3", 32, 80),
    ("IBM-3278-4", 43, 80),
    ("IBM-3278-5", 27, 132),
    ("IBM-3279-2-E", 24, 80),
    ("IBM-3279-3-E", 32, 80),
    ("IBM-3279-4-E", 43, 80),
    ("IBM-3279-5-E", 27, 132),
    ("IBM-3287-1", 24, 80),
    ("IBM-DYNAMIC", 24, 80),
];

/// Default screen dimensions for an accepted device-type string
pub fn device_type_dimensions(device_type: &str) -> Option<(usize, usize)> {
    DEVICE_TYPES
        .iter()
        .find(|(name, _, _)| *name == device_type)
        .map(|&(_, rows, cols)| (rows, cols))
}

/// Whether a device type selects the printer (3287) session path
pub fn is_printer_device_type(device_type: &str) -> bool {
    device_type.starts_with("IBM-3287")
}

/// Completion policy for negotiation-complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationMode {
    /// Fire only when both device-type and functions are known
    #[default]
    Strict,
    /// Fire when either is known (servers that advertise only one)
    Flexible,
}

/// Mode ceiling from configuration: never negotiate past the stated mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceMode {
    #[default]
    Auto,
    Tn3270,
    Tn3270e,
}

/// A broadcast readiness condition: set once per connection attempt, seen
/// by any number of waiters, cleared only by an explicit reset
#[derive(Debug, Clone, Default)]
pub struct NegotiationEvent {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl NegotiationEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the event. Idempotent; all current and future waiters see it.
    pub fn set(&self) {
        let (lock, cvar) = &*self.inner;
        let mut fired = lock.lock().unwrap();
        if !*fired {
            *fired = true;
            cvar.notify_all();
        }
    }

    /// Clear for a new connection attempt
    pub fn clear(&self) {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap() = false;
    }

    pub fn is_set(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap()
    }

    /// Block until the event fires or the timeout lapses. Returns whether
    /// the event is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut fired = lock.lock().unwrap();
        while !*fired {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = cvar.wait_timeout(fired, deadline - now).unwrap();
            fired = guard;
            if result.timed_out() && !*fired {
                return false;
            }
        }
        true
    }
}

/// Snapshot of the negotiation state, exposed through the session API
#[derive(Debug, Clone)]
pub struct NegotiationStatus {
    pub telnet_options: std::collections::HashMap<u8, bool>,
    pub tn3270e_active: bool,
    pub negotiated_device_type: Option<String>,
    pub lu_name: Option<String>,
    pub negotiated_functions: u8,
    pub last_negotiated_functions: u8,
    pub is_printer_session: bool,
    pub device_type_known: bool,
    pub functions_known: bool,
    pub negotiation_complete: bool,
}

/// The TN3270 negotiator
#[derive(Debug)]
pub struct Negotiator {
    options: TelnetOptions,
    mode: NegotiationMode,
    force: ForceMode,
    /// Device type offered when the server asks
    preferred_device_type: String,
    /// LU name requested by configuration, carried on the device-type reply
    requested_lu: Option<String>,
    /// Function set we are willing to perform
    supported_functions: u8,

    tn3270e_active: Arc<AtomicBool>,
    negotiated_device_type: Option<String>,
    lu_name: Option<String>,
    negotiated_functions: u8,
    /// Preserved across resets; the last non-empty negotiated set
    last_negotiated_functions: u8,
    is_printer_session: bool,
    device_rejected: Option<u8>,

    device_type_known: NegotiationEvent,
    functions_known: NegotiationEvent,
    negotiation_complete: NegotiationEvent,

    /// Bytes queued for the wire; drained by the session layer
    output: Vec<u8>,
}

impl Negotiator {
    pub fn new(mode: NegotiationMode, force: ForceMode) -> Self {
        let include_tn3270e = force != ForceMode::Tn3270;
        Self {
            options: TelnetOptions::for_tn3270(include_tn3270e),
            mode,
            force,
            preferred_device_type: "IBM-3279-2-E".to_string(),
            requested_lu: None,
            supported_functions: functions_to_bitmask(&[
                FUNC_BIND_IMAGE,
                FUNC_DATA_STREAM_CTL,
                FUNC_RESPONSES,
                FUNC_SCS_CTL_CODES,
                FUNC_SYSREQ,
            ]),
            tn3270e_active: Arc::new(AtomicBool::new(false)),
            negotiated_device_type: None,
            lu_name: None,
            negotiated_functions: 0,
            last_negotiated_functions: 0,
            is_printer_session: false,
            device_rejected: None,
            device_type_known: NegotiationEvent::new(),
            functions_known: NegotiationEvent::new(),
            negotiation_complete: NegotiationEvent::new(),
            output: Vec::new(),
        }
    }

    /// Select the device type offered to the server
    pub fn set_preferred_device_type(&mut self, device_type: &str) {
        self.preferred_device_type = device_type.to_string();
    }

    /// Change the mode ceiling, rebuilding the option table. Used by the
    /// plain-TN3270 fallback retry.
    pub fn set_force_mode(&mut self, force: ForceMode) {
        self.force = force;
        self.options = TelnetOptions::for_tn3270(force != ForceMode::Tn3270);
    }

    /// Request a specific LU by name
    pub fn set_requested_lu(&mut self, lu: Option<String>) {
        self.requested_lu = lu;
    }

    /// Restrict the function set offered in functions negotiation
    pub fn set_supported_functions(&mut self, mask: u8) {
        self.supported_functions = mask;
    }

    /// Shared flag the session manager observes for routing decisions
    pub fn tn3270e_observer(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.tn3270e_active)
    }

    /// Idempotent mutator for the TN3270E-active flag; propagates to every
    /// observer handle
    pub fn set_negotiated_tn3270e(&self, active: bool) {
        self.tn3270e_active.store(active, Ordering::SeqCst);
    }

    pub fn is_tn3270e(&self) -> bool {
        self.tn3270e_active.load(Ordering::SeqCst)
    }

    pub fn is_printer_session(&self) -> bool {
        self.is_printer_session
    }

    pub fn negotiated_device_type(&self) -> Option<&str> {
        self.negotiated_device_type.as_deref()
    }

    pub fn lu_name(&self) -> Option<&str> {
        self.lu_name.as_deref()
    }

    pub fn negotiated_functions(&self) -> u8 {
        self.negotiated_functions
    }

    pub fn last_negotiated_functions(&self) -> u8 {
        self.last_negotiated_functions
    }

    /// Reason code of a device-type REJECT, if the server sent one
    pub fn device_rejected(&self) -> Option<u8> {
        self.device_rejected
    }

    /// Handle to the device-type-known event
    pub fn device_type_known(&self) -> &NegotiationEvent {
        &self.device_type_known
    }

    /// Handle to the functions-known event
    pub fn functions_known(&self) -> &NegotiationEvent {
        &self.functions_known
    }

    /// Handle to the negotiation-complete event
    pub fn negotiation_complete(&self) -> &NegotiationEvent {
        &self.negotiation_complete
    }

    /// Queue the opportunistic initial offers: WILL TTYPE, WILL EOR,
    /// WILL BINARY, and WILL TN3270E unless the mode ceiling forbids it
    pub fn start(&mut self) {
        let mut offers = vec![
            TelnetOption::TerminalType as u8,
            TelnetOption::EndOfRecord as u8,
            TelnetOption::Binary as u8,
        ];
        if self.force != ForceMode::Tn3270 {
            offers.push(TelnetOption::TN3270E as u8);
        }
        for option in offers {
            let bytes = self.options.offer_local(option);
            self.output.extend_from_slice(&bytes);
        }
    }

    /// Drain the bytes queued for the wire
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Apply an inbound WILL/WONT/DO/DONT
    pub fn handle_command(&mut self, command: TelnetCommand, option: u8) {
        let reply = self.options.handle_command(command, option);
        self.output.extend_from_slice(&reply);

        if option == TelnetOption::TN3270E as u8 {
            match command {
                TelnetCommand::DO => {
                    if self.force == ForceMode::Tn3270 {
                        // Refused above by the option table; nothing else
                        return;
                    }
                    if self.options.state(option).local {
                        self.set_negotiated_tn3270e(true);
                        println!("TN3270E: mode active");
                    }
                }
                TelnetCommand::DONT | TelnetCommand::WONT => {
                    self.set_negotiated_tn3270e(false);
                }
                _ => {}
            }
        }
    }

    /// Apply a whole subnegotiation payload (option byte plus data)
    pub fn handle_subnegotiation(&mut self, option: u8, data: &[u8]) {
        if option == TelnetOption::TerminalType as u8 {
            self.handle_ttype(data);
        } else if option == TelnetOption::TN3270E as u8 {
            self.handle_tn3270e(data);
        } else {
            eprintln!("TELNET: unhandled subnegotiation for option {option}");
        }
    }

    fn handle_ttype(&mut self, data: &[u8]) {
        if data.first() == Some(&TTYPE_SEND) {
            let mut reply = vec![TTYPE_IS];
            reply.extend_from_slice(self.preferred_device_type.as_bytes());
            let bytes = build_subnegotiation(TelnetOption::TerminalType as u8, &reply);
            self.output.extend_from_slice(&bytes);
        }
    }

    fn handle_tn3270e(&mut self, data: &[u8]) {
        let Some(&message) = data.first() else { return };
        match message {
            TN3270E_DEVICE_TYPE => self.handle_device_type(&data[1..]),
            TN3270E_FUNCTIONS => self.handle_functions(&data[1..]),
            other => {
                eprintln!("TN3270E: unknown subnegotiation message 0x{other:02X}");
            }
        }
    }

    fn handle_device_type(&mut self, data: &[u8]) {
        let Some(&subcmd) = data.first() else { return };
        match subcmd {
            TN3270E_SEND => {
                // First arrival wins: once a type is recorded, later SENDs
                // must not reopen the negotiation
                if self.negotiated_device_type.is_some() {
                    return;
                }
                self.send_device_type_is(self.preferred_device_type.clone());
            }
            TN3270E_IS => {
                if self.negotiated_device_type.is_some() {
                    return;
                }
                let (device, lu) = split_device_payload(&data[1..]);
                if device_type_dimensions(&device).is_none() {
                    eprintln!("TN3270E: server confirmed unknown device type '{device}'");
                }
                println!("TN3270E: device type {device}");
                self.lu_name = lu;
                self.is_printer_session = is_printer_device_type(&device);
                self.negotiated_device_type = Some(device);
                self.device_type_known.set();
                self.check_complete();
            }
            TN3270E_REQUEST => {
                let (device, lu) = split_device_payload(&data[1..]);
                if self.negotiated_device_type.is_some() {
                    // First arrival wins; acknowledge what we already have
                    let current = self.negotiated_device_type.clone().unwrap();
                    self.send_device_type_is(current);
                    return;
                }
                if device_type_dimensions(&device).is_some() {
                    self.lu_name = lu;
                    self.is_printer_session = is_printer_device_type(&device);
                    self.negotiated_device_type = Some(device.clone());
                    self.send_device_type_is(device);
                    self.device_type_known.set();
                    self.check_complete();
                } else {
                    let payload = vec![TN3270E_DEVICE_TYPE, TN3270E_REJECT, REJECT_INV_DEVICE_TYPE];
                    let bytes =
                        build_subnegotiation(TelnetOption::TN3270E as u8, &payload);
                    self.output.extend_from_slice(&bytes);
                }
            }
            TN3270E_REJECT => {
                let reason = data.get(1).copied().unwrap_or(0);
                eprintln!("TN3270E: device type rejected (reason 0x{reason:02X})");
                self.device_rejected = Some(reason);
            }
            other => {
                eprintln!("TN3270E: unknown device-type sub-command 0x{other:02X}");
            }
        }
    }

    fn send_device_type_is(&mut self, device: String) {
        let mut payload = vec![TN3270E_DEVICE_TYPE, TN3270E_IS];
        payload.extend_from_slice(device.as_bytes());
        if let Some(lu) = &self.requested_lu {
            payload.push(TN3270E_CONNECT);
            payload.extend_from_slice(lu.as_bytes());
        }
        let bytes = build_subnegotiation(TelnetOption::TN3270E as u8, &payload);
        self.output.extend_from_slice(&bytes);
    }

    fn handle_functions(&mut self, data: &[u8]) {
        let Some(&subcmd) = data.first() else { return };
        let offered = functions_to_bitmask(&data[1..]);
        match subcmd {
            TN3270E_REQUEST => {
                let agreed = offered & self.supported_functions;
                let payload_codes = bitmask_to_functions(agreed);
                let mut payload = vec![TN3270E_FUNCTIONS, TN3270E_IS];
                payload.extend_from_slice(&payload_codes);
                let bytes = build_subnegotiation(TelnetOption::TN3270E as u8, &payload);
                self.output.extend_from_slice(&bytes);
                self.record_functions(agreed);
            }
            TN3270E_IS => {
                let agreed = offered & self.supported_functions;
                self.record_functions(agreed);
            }
            other => {
                eprintln!("TN3270E: unknown functions sub-command 0x{other:02X}");
            }
        }
    }

    fn record_functions(&mut self, agreed: u8) {
        self.negotiated_functions = agreed;
        if agreed != 0 {
            self.last_negotiated_functions = agreed;
        }
        println!("TN3270E: functions 0x{agreed:02X}");
        self.functions_known.set();
        self.check_complete();
    }

    /// Send our own functions REQUEST, proposing the supported set
    pub fn request_functions(&mut self) {
        let mut payload = vec![TN3270E_FUNCTIONS, TN3270E_REQUEST];
        payload.extend_from_slice(&bitmask_to_functions(self.supported_functions));
        let bytes = build_subnegotiation(TelnetOption::TN3270E as u8, &payload);
        self.output.extend_from_slice(&bytes);
    }

    /// Completion for plain TN3270: no TN3270E means the terminal type we
    /// answered is the device type, and there are no functions to learn
    pub fn complete_plain_tn3270(&mut self) {
        if self.negotiated_device_type.is_none() {
            self.negotiated_device_type = Some(self.preferred_device_type.clone());
            self.is_printer_session = is_printer_device_type(&self.preferred_device_type);
        }
        self.device_type_known.set();
        self.negotiation_complete.set();
    }

    fn check_complete(&self) {
        let fire = match self.mode {
            NegotiationMode::Strict => {
                self.device_type_known.is_set() && self.functions_known.is_set()
            }
            NegotiationMode::Flexible => {
                self.device_type_known.is_set() || self.functions_known.is_set()
            }
        };
        if fire {
            self.negotiation_complete.set();
        }
    }

    /// Clear the current negotiation while preserving the last non-empty
    /// function set, for fallback retries within one connection
    pub fn reset_negotiation_state(&mut self) {
        self.negotiated_device_type = None;
        self.lu_name = None;
        self.negotiated_functions = 0;
        self.is_printer_session = false;
        self.device_rejected = None;
        self.set_negotiated_tn3270e(false);
        self.device_type_known.clear();
        self.functions_known.clear();
        self.negotiation_complete.clear();
        self.output.clear();
    }

    /// Snapshot for the session API
    pub fn status(&self) -> NegotiationStatus {
        NegotiationStatus {
            telnet_options: self.options.enabled_map(),
            tn3270e_active: self.is_tn3270e(),
            negotiated_device_type: self.negotiated_device_type.clone(),
            lu_name: self.lu_name.clone(),
            negotiated_functions: self.negotiated_functions,
            last_negotiated_functions: self.last_negotiated_functions,
            is_printer_session: self.is_printer_session,
            device_type_known: self.device_type_known.is_set(),
            functions_known: self.functions_known.is_set(),
            negotiation_complete: self.negotiation_complete.is_set(),
        }
    }

    /// Whether the basic TN3270 options (EOR and BINARY) are agreed
    pub fn basic_options_ready(&self) -> bool {
        self.options.is_enabled(TelnetOption::EndOfRecord as u8)
            && self.options.is_enabled(TelnetOption::Binary as u8)
    }
}

/// Split a device-type payload into the type string and optional LU name
fn split_device_payload(data: &[u8]) -> (String, Option<String>) {
    let mut parts = data.splitn(2, |&b| b == TN3270E_CONNECT);
    let device = String::from_utf8_lossy(parts.next().unwrap_or(&[])).to_string();
    let lu = parts
        .next()
        .filter(|bytes| !bytes.is_empty())
        .map(|bytes| String::from_utf8_lossy(bytes).to_string());
    (device, lu)
}

/// Decide whether a captured byte stream was a TN3270E session.
///
/// The heuristic used by offline tooling: the trace contains `IAC WILL EOR`
/// and no WONT/DONT for the TN3270E option. Total over arbitrary input,
/// including the empty stream.
pub fn infer_tn3270e_from_trace(bytes: &[u8]) -> bool {
    let will_eor = [0xFFu8, 0xFB, 0x19];
    let wont_tn3270e = [0xFFu8, 0xFC, 0x28];
    let dont_tn3270e = [0xFFu8, 0xFE, 0x28];

    let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);

    contains(&will_eor) && !contains(&wont_tn3270e) && !contains(&dont_tn3270e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_type_is_payload(device: &str) -> Vec<u8> {
        let mut data = vec![TN3270E_DEVICE_TYPE, TN3270E_IS];
        data.extend_from_slice(device.as_bytes());
        data
    }

    #[test]
    fn test_start_offers_options() {
        let mut negotiator = Negotiator::new(NegotiationMode::Strict, ForceMode::Auto);
        negotiator.start();
        let out = negotiator.take_output();
        // WILL TTYPE, WILL EOR, WILL BINARY, WILL TN3270E
        assert!(out.windows(3).any(|w| w == [0xFF, 0xFB, 0x18]));
        assert!(out.windows(3).any(|w| w == [0xFF, 0xFB, 0x19]));
        assert!(out.windows(3).any(|w| w == [0xFF, 0xFB, 0x00]));
        assert!(out.windows(3).any(|w| w == [0xFF, 0xFB, 0x28]));
    }

    #[test]
    fn test_force_tn3270_omits_tn3270e() {
        let mut negotiator = Negotiator::new(NegotiationMode::Strict, ForceMode::Tn3270);
        negotiator.start();
        let out = negotiator.take_output();
        assert!(!out.windows(3).any(|w| w == [0xFF, 0xFB, 0x28]));
    }

    #[test]
    fn test_do_tn3270e_activates() {
        let mut negotiator = Negotiator::new(NegotiationMode::Strict, ForceMode::Auto);
        negotiator.start();
        negotiator.take_output();
        negotiator.handle_command(TelnetCommand::DO, TelnetOption::TN3270E as u8);
        assert!(negotiator.is_tn3270e());
    }

    #[test]
    fn test_ttype_send_answered_with_device_type() {
        let mut negotiator = Negotiator::new(NegotiationMode::Strict, ForceMode::Auto);
        negotiator.set_preferred_device_type("IBM-3278-2");
        negotiator.handle_subnegotiation(0x18, &[TTYPE_SEND]);
        let out = negotiator.take_output();
        let mut expected = vec![0xFF, 0xFA, 0x18, TTYPE_IS];
        expected.extend_from_slice(b"IBM-3278-2");
        expected.extend_from_slice(&[0xFF, 0xF0]);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_device_type_is_recorded_and_signaled() {
        let mut negotiator = Negotiator::new(NegotiationMode::Flexible, ForceMode::Auto);
        negotiator.handle_subnegotiation(0x28, &device_type_is_payload("IBM-3278-2"));
        assert_eq!(negotiator.negotiated_device_type(), Some("IBM-3278-2"));
        assert!(negotiator.device_type_known().is_set());
        assert!(negotiator.negotiation_complete().is_set()); // flexible
        assert!(!negotiator.is_printer_session());
    }

    #[test]
    fn test_device_type_is_with_lu_name() {
        let mut negotiator = Negotiator::new(NegotiationMode::Flexible, ForceMode::Auto);
        let mut payload = device_type_is_payload("IBM-3279-2-E");
        payload.push(TN3270E_CONNECT);
        payload.extend_from_slice(b"LU0001");
        negotiator.handle_subnegotiation(0x28, &payload);
        assert_eq!(negotiator.lu_name(), Some("LU0001"));
    }

    #[test]
    fn test_printer_device_type_flags_session() {
        let mut negotiator = Negotiator::new(NegotiationMode::Flexible, ForceMode::Auto);
        negotiator.handle_subnegotiation(0x28, &device_type_is_payload("IBM-3287-1"));
        assert!(negotiator.is_printer_session());
    }

    #[test]
    fn test_first_arrival_wins_between_send_and_is() {
        let mut negotiator = Negotiator::new(NegotiationMode::Flexible, ForceMode::Auto);
        negotiator.handle_subnegotiation(0x28, &device_type_is_payload("IBM-3278-2"));
        // A later IS must not overwrite
        negotiator.handle_subnegotiation(0x28, &device_type_is_payload("IBM-3278-4"));
        assert_eq!(negotiator.negotiated_device_type(), Some("IBM-3278-2"));
    }

    #[test]
    fn test_device_type_request_accepted() {
        let mut negotiator = Negotiator::new(NegotiationMode::Flexible, ForceMode::Auto);
        let mut payload = vec![TN3270E_DEVICE_TYPE, TN3270E_REQUEST];
        payload.extend_from_slice(b"IBM-3278-3");
        negotiator.handle_subnegotiation(0x28, &payload);
        assert_eq!(negotiator.negotiated_device_type(), Some("IBM-3278-3"));
        // IS confirmation went out
        let out = negotiator.take_output();
        assert!(out.windows(2).any(|w| w == [TN3270E_DEVICE_TYPE, TN3270E_IS]));
    }

    #[test]
    fn test_device_type_request_unknown_rejected() {
        let mut negotiator = Negotiator::new(NegotiationMode::Flexible, ForceMode::Auto);
        let mut payload = vec![TN3270E_DEVICE_TYPE, TN3270E_REQUEST];
        payload.extend_from_slice(b"IBM-9999");
        negotiator.handle_subnegotiation(0x28, &payload);
        assert_eq!(negotiator.negotiated_device_type(), None);
        let out = negotiator.take_output();
        assert!(out
            .windows(3)
            .any(|w| w == [TN3270E_DEVICE_TYPE, TN3270E_REJECT, REJECT_INV_DEVICE_TYPE]));
    }

    #[test]
    fn test_functions_is_intersects_and_signals() {
        let mut negotiator = Negotiator::new(NegotiationMode::Strict, ForceMode::Auto);
        let payload = vec![
            TN3270E_FUNCTIONS,
            TN3270E_IS,
            FUNC_BIND_IMAGE,
            FUNC_DATA_STREAM_CTL,
            FUNC_RESPONSES,
        ];
        negotiator.handle_subnegotiation(0x28, &payload);
        let expected =
            functions_to_bitmask(&[FUNC_BIND_IMAGE, FUNC_DATA_STREAM_CTL, FUNC_RESPONSES]);
        assert_eq!(negotiator.negotiated_functions(), expected);
        assert_eq!(negotiator.last_negotiated_functions(), expected);
        assert!(negotiator.functions_known().is_set());
    }

    #[test]
    fn test_functions_request_countered_with_is() {
        let mut negotiator = Negotiator::new(NegotiationMode::Strict, ForceMode::Auto);
        negotiator.set_supported_functions(functions_to_bitmask(&[FUNC_RESPONSES]));
        let payload = vec![TN3270E_FUNCTIONS, TN3270E_REQUEST, FUNC_BIND_IMAGE, FUNC_RESPONSES];
        negotiator.handle_subnegotiation(0x28, &payload);

        assert_eq!(negotiator.negotiated_functions(), functions_to_bitmask(&[FUNC_RESPONSES]));
        let out = negotiator.take_output();
        // Counter-reply carries only the intersection
        let tail = [TN3270E_FUNCTIONS, TN3270E_IS, FUNC_RESPONSES];
        assert!(out.windows(3).any(|w| w == tail));
    }

    #[test]
    fn test_strict_completion_requires_both() {
        let mut negotiator = Negotiator::new(NegotiationMode::Strict, ForceMode::Auto);
        negotiator.handle_subnegotiation(0x28, &device_type_is_payload("IBM-3278-2"));
        assert!(!negotiator.negotiation_complete().is_set());
        negotiator.handle_subnegotiation(
            0x28,
            &[TN3270E_FUNCTIONS, TN3270E_IS, FUNC_RESPONSES],
        );
        assert!(negotiator.negotiation_complete().is_set());
    }

    #[test]
    fn test_reset_preserves_last_functions() {
        let mut negotiator = Negotiator::new(NegotiationMode::Strict, ForceMode::Auto);
        negotiator.handle_subnegotiation(
            0x28,
            &[TN3270E_FUNCTIONS, TN3270E_IS, FUNC_BIND_IMAGE, FUNC_RESPONSES],
        );
        let funcs = negotiator.negotiated_functions();
        assert_ne!(funcs, 0);

        negotiator.reset_negotiation_state();
        assert_eq!(negotiator.negotiated_functions(), 0);
        assert_eq!(negotiator.last_negotiated_functions(), funcs);
        assert!(!negotiator.functions_known().is_set());
        assert!(!negotiator.negotiation_complete().is_set());
    }

    #[test]
    fn test_complete_plain_tn3270() {
        let mut negotiator = Negotiator::new(NegotiationMode::Strict, ForceMode::Tn3270);
        negotiator.set_preferred_device_type("IBM-3278-2");
        negotiator.complete_plain_tn3270();
        assert!(negotiator.negotiation_complete().is_set());
        assert_eq!(negotiator.negotiated_device_type(), Some("IBM-3278-2"));
    }

    #[test]
    fn test_event_broadcast_and_wait() {
        let event = NegotiationEvent::new();
        assert!(!event.wait_timeout(Duration::from_millis(10)));

        let waiter = event.clone();
        let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        event.set();
        assert!(handle.join().unwrap());
        // Monotonic until cleared
        assert!(event.is_set());
        event.clear();
        assert!(!event.is_set());
    }

    #[test]
    fn test_functions_bitmask_round_trip() {
        let codes = vec![FUNC_BIND_IMAGE, FUNC_RESPONSES, FUNC_SYSREQ];
        let mask = functions_to_bitmask(&codes);
        assert_eq!(bitmask_to_functions(mask), codes);
        // Out-of-range codes are ignored
        assert_eq!(functions_to_bitmask(&[0x09]), 0);
    }

    #[test]
    fn test_infer_tn3270e_from_trace() {
        assert!(!infer_tn3270e_from_trace(&[]));
        assert!(infer_tn3270e_from_trace(&[0xFF, 0xFB, 0x19]));
        assert!(!infer_tn3270e_from_trace(&[0xFF, 0xFB, 0x19, 0xFF, 0xFE, 0x28]));
        assert!(!infer_tn3270e_from_trace(&[0xFF, 0xFB, 0x19, 0xFF, 0xFC, 0x28]));
        assert!(!infer_tn3270e_from_trace(&[0x01, 0x02, 0x03]));
        // Idempotent
        let trace = [0xFF, 0xFB, 0x19, 0x00];
        assert_eq!(infer_tn3270e_from_trace(&trace), infer_tn3270e_from_trace(&trace));
    }

    #[test]
    fn test_device_type_dimensions_table() {
        assert_eq!(device_type_dimensions("IBM-3278-2"), Some((24, 80)));
        assert_eq!(device_type_dimensions("IBM-3278-5"), Some((27, 132)));
        assert_eq!(device_type_dimensions("IBM-3279-4-E"), Some((43, 80)));
        assert_eq!(device_type_dimensions("IBM-5555"), None);
    }
}
