//! Telnet option layer for TN3270 sessions
//!
//! Three concerns live here, all byte-level and transport-agnostic:
//!
//! - IAC (0xFF) escaping: a data byte equal to IAC is doubled on send and a
//!   doubled IAC collapses to one on receive.
//! - Option negotiation bookkeeping: per-option {local, remote} enable
//!   state, the WILL/WONT/DO/DONT response rules, and loop suppression so an
//!   already-agreed state is never renegotiated.
//! - Record framing: inbound bytes accumulate until `IAC EOR`; each
//!   complete record is surfaced with escapes collapsed, and negotiation
//!   commands and subnegotiation payloads are surfaced as separate events.
//!   Partial trailing bytes are buffered across reads.

use std::collections::HashMap;

use crate::error::{ProtocolError, ProtocolResult};

/// Telnet command codes (RFC 854)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetCommand {
    /// Interpret As Command - 0xFF
    IAC = 0xFF,
    /// Don't - 0xFE
    DONT = 0xFE,
    /// Do - 0xFD
    DO = 0xFD,
    /// Won't - 0xFC
    WONT = 0xFC,
    /// Will - 0xFB
    WILL = 0xFB,
    /// Subnegotiation Begin - 0xFA
    SB = 0xFA,
    /// Go Ahead - 0xF9
    GA = 0xF9,
    /// No Operation - 0xF1
    NOP = 0xF1,
    /// Subnegotiation End - 0xF0
    SE = 0xF0,
    /// End of Record - 0xEF
    EOR = 0xEF,
}

impl TelnetCommand {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xFF => Some(Self::IAC),
            0xFE => Some(Self::DONT),
            0xFD => Some(Self::DO),
            0xFC => Some(Self::WONT),
            0xFB => Some(Self::WILL),
            0xFA => Some(Self::SB),
            0xF9 => Some(Self::GA),
            0xF1 => Some(Self::NOP),
            0xF0 => Some(Self::SE),
            0xEF => Some(Self::EOR),
            _ => None,
        }
    }
}

/// Telnet options of interest to TN3270
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    Binary = 0x00,
    Echo = 0x01,
    SuppressGoAhead = 0x03,
    TerminalType = 0x18,
    EndOfRecord = 0x19,
    TN3270E = 0x28,
}

impl TelnetOption {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Binary),
            0x01 => Some(Self::Echo),
            0x03 => Some(Self::SuppressGoAhead),
            0x18 => Some(Self::TerminalType),
            0x19 => Some(Self::EndOfRecord),
            0x28 => Some(Self::TN3270E),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Binary => "BINARY",
            Self::Echo => "ECHO",
            Self::SuppressGoAhead => "SUPPRESS-GO-AHEAD",
            Self::TerminalType => "TERMINAL-TYPE",
            Self::EndOfRecord => "END-OF-RECORD",
            Self::TN3270E => "TN3270E",
        }
    }
}

/// Double every IAC byte in a record body
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        out.push(byte);
        if byte == TelnetCommand::IAC as u8 {
            out.push(byte);
        }
    }
    out
}

/// Collapse doubled IAC bytes in a record body
pub fn unescape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        out.push(data[i]);
        if data[i] == TelnetCommand::IAC as u8
            && i + 1 < data.len()
            && data[i + 1] == TelnetCommand::IAC as u8
        {
            i += 2;
        } else {
            i += 1;
        }
    }
    out
}

/// Build `IAC <command> <option>`
pub fn build_negotiation(command: TelnetCommand, option: u8) -> Vec<u8> {
    vec![TelnetCommand::IAC as u8, command as u8, option]
}

/// Build `IAC SB <option> <data> IAC SE` with inner IACs doubled
pub fn build_subnegotiation(option: u8, data: &[u8]) -> Vec<u8> {
    let mut out = vec![TelnetCommand::IAC as u8, TelnetCommand::SB as u8, option];
    out.extend(escape_iac(data));
    out.push(TelnetCommand::IAC as u8);
    out.push(TelnetCommand::SE as u8);
    out
}

/// Build an outbound record: escaped body plus `IAC EOR`
pub fn frame_record(body: &[u8]) -> Vec<u8> {
    let mut out = escape_iac(body);
    out.push(TelnetCommand::IAC as u8);
    out.push(TelnetCommand::EOR as u8);
    out
}

/// Per-option negotiation state
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionState {
    /// We perform the option locally (WILL agreed)
    pub local: bool,
    /// The peer performs the option (DO agreed)
    pub remote: bool,
    /// We sent WILL and await DO/DONT
    local_pending: bool,
    /// We sent DO and await WILL/WONT
    remote_pending: bool,
    /// We already refused this option locally
    local_refused: bool,
    /// We already refused this option remotely
    remote_refused: bool,
}

/// Option negotiation bookkeeping with loop suppression
///
/// The rules: respond to WILL with DO iff we support the option remotely
/// (else DONT); respond to DO with WILL iff we support it locally (else
/// WONT); never renegotiate an already-agreed state.
#[derive(Debug)]
pub struct TelnetOptions {
    states: HashMap<u8, OptionState>,
    local_supported: Vec<u8>,
    remote_supported: Vec<u8>,
}

impl TelnetOptions {
    /// Create with the option sets we are willing to enable on each side
    pub fn new(local_supported: Vec<u8>, remote_supported: Vec<u8>) -> Self {
        Self {
            states: HashMap::new(),
            local_supported,
            remote_supported,
        }
    }

    /// The default TN3270 option sets: BINARY, EOR, TTYPE, TN3270E
    pub fn for_tn3270(include_tn3270e: bool) -> Self {
        let mut options = vec![
            TelnetOption::Binary as u8,
            TelnetOption::EndOfRecord as u8,
            TelnetOption::TerminalType as u8,
        ];
        if include_tn3270e {
            options.push(TelnetOption::TN3270E as u8);
        }
        Self::new(options.clone(), options)
    }

    fn state_mut(&mut self, option: u8) -> &mut OptionState {
        self.states.entry(option).or_default()
    }

    /// Snapshot of an option's {local, remote} state
    pub fn state(&self, option: u8) -> OptionState {
        self.states.get(&option).copied().unwrap_or_default()
    }

    /// True when the option is enabled in either direction
    pub fn is_enabled(&self, option: u8) -> bool {
        let state = self.state(option);
        state.local || state.remote
    }

    /// Mapping of option code to enabled state, for status snapshots
    pub fn enabled_map(&self) -> HashMap<u8, bool> {
        self.states
            .iter()
            .map(|(&opt, s)| (opt, s.local || s.remote))
            .collect()
    }

    /// Opportunistically offer WILL for an option. Returns the bytes to
    /// send, or nothing when the offer would renegotiate settled state.
    pub fn offer_local(&mut self, option: u8) -> Vec<u8> {
        let state = self.state_mut(option);
        if state.local || state.local_pending || state.local_refused {
            return Vec::new();
        }
        state.local_pending = true;
        build_negotiation(TelnetCommand::WILL, option)
    }

    /// Request DO for an option from the peer
    pub fn request_remote(&mut self, option: u8) -> Vec<u8> {
        let state = self.state_mut(option);
        if state.remote || state.remote_pending || state.remote_refused {
            return Vec::new();
        }
        state.remote_pending = true;
        build_negotiation(TelnetCommand::DO, option)
    }

    /// Apply one inbound WILL/WONT/DO/DONT and produce the response bytes
    pub fn handle_command(&mut self, command: TelnetCommand, option: u8) -> Vec<u8> {
        match command {
            TelnetCommand::WILL => {
                let supported = self.remote_supported.contains(&option);
                let state = self.state_mut(option);
                if state.remote {
                    return Vec::new(); // already agreed
                }
                if supported {
                    state.remote = true;
                    let pending = std::mem::replace(&mut state.remote_pending, false);
                    if pending {
                        // Our DO is already on the wire
                        Vec::new()
                    } else {
                        build_negotiation(TelnetCommand::DO, option)
                    }
                } else {
                    if state.remote_refused {
                        return Vec::new();
                    }
                    state.remote_refused = true;
                    build_negotiation(TelnetCommand::DONT, option)
                }
            }
            TelnetCommand::WONT => {
                let state = self.state_mut(option);
                state.remote_pending = false;
                if state.remote {
                    state.remote = false;
                    build_negotiation(TelnetCommand::DONT, option)
                } else {
                    state.remote_refused = true;
                    Vec::new()
                }
            }
            TelnetCommand::DO => {
                let supported = self.local_supported.contains(&option);
                let state = self.state_mut(option);
                if state.local {
                    return Vec::new();
                }
                if supported {
                    state.local = true;
                    let pending = std::mem::replace(&mut state.local_pending, false);
                    if pending {
                        Vec::new()
                    } else {
                        build_negotiation(TelnetCommand::WILL, option)
                    }
                } else {
                    if state.local_refused {
                        return Vec::new();
                    }
                    state.local_refused = true;
                    build_negotiation(TelnetCommand::WONT, option)
                }
            }
            TelnetCommand::DONT => {
                let state = self.state_mut(option);
                state.local_pending = false;
                if state.local {
                    state.local = false;
                    build_negotiation(TelnetCommand::WONT, option)
                } else {
                    state.local_refused = true;
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }
}

/// One decoded event from the inbound byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// A complete record (bytes preceding `IAC EOR`, escapes collapsed)
    Record(Vec<u8>),
    /// WILL/WONT/DO/DONT for an option
    Command { command: TelnetCommand, option: u8 },
    /// A whole subnegotiation payload (delivered once `IAC SE` is seen)
    Subnegotiation { option: u8, data: Vec<u8> },
}

#[derive(Debug)]
enum FramerState {
    /// Accumulating record data
    Data,
    /// Seen IAC, awaiting the command byte
    Iac,
    /// Seen IAC + WILL/WONT/DO/DONT, awaiting the option byte
    Negotiation(TelnetCommand),
    /// Inside IAC SB .. IAC SE
    Subnegotiation { option: Option<u8>, data: Vec<u8>, iac: bool },
}

/// Inbound record framer
///
/// Feed raw transport bytes; complete events come out in arrival order.
/// Nothing is dispatched for a record until its `IAC EOR` arrives; a record
/// may be preceded or followed by negotiation commands in the same read.
#[derive(Debug)]
pub struct RecordFramer {
    state: FramerState,
    record: Vec<u8>,
    consumed: usize,
}

impl RecordFramer {
    pub fn new() -> Self {
        Self {
            state: FramerState::Data,
            record: Vec::new(),
            consumed: 0,
        }
    }

    /// Bytes currently buffered for an incomplete record
    pub fn buffered_len(&self) -> usize {
        self.record.len()
    }

    /// Total bytes consumed over the framer's lifetime
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Consume transport bytes, producing every event completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> ProtocolResult<Vec<TelnetEvent>> {
        let mut events = Vec::new();
        for &byte in bytes {
            self.consumed += 1;
            self.step(byte, &mut events)?;
        }
        Ok(events)
    }

    fn step(&mut self, byte: u8, events: &mut Vec<TelnetEvent>) -> ProtocolResult<()> {
        match &mut self.state {
            FramerState::Data => {
                if byte == TelnetCommand::IAC as u8 {
                    self.state = FramerState::Iac;
                } else {
                    self.record.push(byte);
                }
            }
            FramerState::Iac => match TelnetCommand::from_u8(byte) {
                Some(TelnetCommand::IAC) => {
                    // Escaped data byte
                    self.record.push(TelnetCommand::IAC as u8);
                    self.state = FramerState::Data;
                }
                Some(TelnetCommand::EOR) => {
                    events.push(TelnetEvent::Record(std::mem::take(&mut self.record)));
                    self.state = FramerState::Data;
                }
                Some(
                    cmd @ (TelnetCommand::WILL
                    | TelnetCommand::WONT
                    | TelnetCommand::DO
                    | TelnetCommand::DONT),
                ) => {
                    self.state = FramerState::Negotiation(cmd);
                }
                Some(TelnetCommand::SB) => {
                    self.state = FramerState::Subnegotiation {
                        option: None,
                        data: Vec::new(),
                        iac: false,
                    };
                }
                Some(TelnetCommand::GA) | Some(TelnetCommand::NOP) => {
                    self.state = FramerState::Data;
                }
                Some(TelnetCommand::SE) => {
                    // SE outside a subnegotiation is tolerated
                    self.state = FramerState::Data;
                }
                None => {
                    return Err(ProtocolError::DanglingIac { position: self.consumed });
                }
            },
            FramerState::Negotiation(cmd) => {
                events.push(TelnetEvent::Command { command: *cmd, option: byte });
                self.state = FramerState::Data;
            }
            FramerState::Subnegotiation { option, data, iac } => {
                if *iac {
                    match TelnetCommand::from_u8(byte) {
                        Some(TelnetCommand::SE) => {
                            let option = option.unwrap_or(0);
                            let data = std::mem::take(data);
                            events.push(TelnetEvent::Subnegotiation { option, data });
                            self.state = FramerState::Data;
                            return Ok(());
                        }
                        Some(TelnetCommand::IAC) => {
                            data.push(TelnetCommand::IAC as u8);
                            *iac = false;
                        }
                        _ => {
                            // IAC followed by anything else inside SB is a
                            // framing violation
                            return Err(ProtocolError::UnterminatedSubnegotiation {
                                option: option.unwrap_or(0),
                            });
                        }
                    }
                } else if byte == TelnetCommand::IAC as u8 {
                    *iac = true;
                } else if option.is_none() {
                    *option = Some(byte);
                } else {
                    data.push(byte);
                }
            }
        }
        Ok(())
    }
}

impl Default for RecordFramer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_round_trip() {
        let data = vec![0xFF, 0x01, 0xFF, 0xFF, 0x02];
        let escaped = escape_iac(&data);
        assert_eq!(escaped, vec![0xFF, 0xFF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x02]);
        assert_eq!(unescape_iac(&escaped), data);
    }

    #[test]
    fn test_frame_record_appends_eor() {
        assert_eq!(frame_record(&[0xFF, 0x01]), vec![0xFF, 0xFF, 0x01, 0xFF, 0xEF]);
    }

    #[test]
    fn test_framer_dispatches_on_eor_only() {
        let mut framer = RecordFramer::new();
        let events = framer.feed(&[0x01, 0x02, 0x03]).unwrap();
        assert!(events.is_empty());
        assert_eq!(framer.buffered_len(), 3);

        let events = framer.feed(&[0xFF, 0xEF]).unwrap();
        assert_eq!(events, vec![TelnetEvent::Record(vec![0x01, 0x02, 0x03])]);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_framer_collapses_escaped_iac() {
        let mut framer = RecordFramer::new();
        let events = framer.feed(&[0xFF, 0xFF, 0x01, 0xFF, 0xEF]).unwrap();
        assert_eq!(events, vec![TelnetEvent::Record(vec![0xFF, 0x01])]);
    }

    #[test]
    fn test_framer_multiple_records_one_read() {
        let mut framer = RecordFramer::new();
        let events = framer
            .feed(&[0x01, 0xFF, 0xEF, 0x02, 0xFF, 0xEF])
            .unwrap();
        assert_eq!(
            events,
            vec![
                TelnetEvent::Record(vec![0x01]),
                TelnetEvent::Record(vec![0x02]),
            ]
        );
    }

    #[test]
    fn test_framer_negotiation_commands() {
        let mut framer = RecordFramer::new();
        let events = framer.feed(&[0xFF, 0xFB, 0x18, 0xFF, 0xFB, 0x19]).unwrap();
        assert_eq!(
            events,
            vec![
                TelnetEvent::Command { command: TelnetCommand::WILL, option: 0x18 },
                TelnetEvent::Command { command: TelnetCommand::WILL, option: 0x19 },
            ]
        );
    }

    #[test]
    fn test_framer_subnegotiation_whole_payload() {
        let mut framer = RecordFramer::new();
        // TTYPE SEND split across two reads
        let events = framer.feed(&[0xFF, 0xFA, 0x18, 0x01]).unwrap();
        assert!(events.is_empty());
        let events = framer.feed(&[0xFF, 0xF0]).unwrap();
        assert_eq!(
            events,
            vec![TelnetEvent::Subnegotiation { option: 0x18, data: vec![0x01] }]
        );
    }

    #[test]
    fn test_framer_subnegotiation_escaped_iac() {
        let mut framer = RecordFramer::new();
        let events = framer
            .feed(&[0xFF, 0xFA, 0x28, 0xFF, 0xFF, 0x02, 0xFF, 0xF0])
            .unwrap();
        assert_eq!(
            events,
            vec![TelnetEvent::Subnegotiation { option: 0x28, data: vec![0xFF, 0x02] }]
        );
    }

    #[test]
    fn test_framer_partial_iac_across_reads() {
        let mut framer = RecordFramer::new();
        assert!(framer.feed(&[0x01, 0xFF]).unwrap().is_empty());
        let events = framer.feed(&[0xEF]).unwrap();
        assert_eq!(events, vec![TelnetEvent::Record(vec![0x01])]);
    }

    #[test]
    fn test_framer_dangling_iac_is_protocol_error() {
        let mut framer = RecordFramer::new();
        assert!(framer.feed(&[0xFF, 0x42]).is_err());
    }

    #[test]
    fn test_option_rules_will_do() {
        let mut options = TelnetOptions::for_tn3270(true);
        let reply = options.handle_command(TelnetCommand::WILL, 0x19);
        assert_eq!(reply, build_negotiation(TelnetCommand::DO, 0x19));
        assert!(options.is_enabled(0x19));

        // Repeat must not renegotiate
        let reply = options.handle_command(TelnetCommand::WILL, 0x19);
        assert!(reply.is_empty());
    }

    #[test]
    fn test_option_rules_reject_unsupported() {
        let mut options = TelnetOptions::for_tn3270(true);
        let reply = options.handle_command(TelnetCommand::WILL, 0x01); // ECHO
        assert_eq!(reply, build_negotiation(TelnetCommand::DONT, 0x01));
        assert!(!options.is_enabled(0x01));
        // And only refuse once
        assert!(options.handle_command(TelnetCommand::WILL, 0x01).is_empty());
    }

    #[test]
    fn test_option_rules_do_will() {
        let mut options = TelnetOptions::for_tn3270(true);
        let reply = options.handle_command(TelnetCommand::DO, 0x00);
        assert_eq!(reply, build_negotiation(TelnetCommand::WILL, 0x00));
        assert!(options.state(0x00).local);
    }

    #[test]
    fn test_offer_suppresses_answer_loop() {
        let mut options = TelnetOptions::for_tn3270(true);
        let offer = options.offer_local(TelnetOption::TN3270E as u8);
        assert_eq!(offer, build_negotiation(TelnetCommand::WILL, 0x28));
        // A second offer is suppressed
        assert!(options.offer_local(TelnetOption::TN3270E as u8).is_empty());
        // DO in response enables without another WILL
        let reply = options.handle_command(TelnetCommand::DO, 0x28);
        assert!(reply.is_empty());
        assert!(options.state(0x28).local);
    }

    #[test]
    fn test_wont_disables() {
        let mut options = TelnetOptions::for_tn3270(true);
        options.handle_command(TelnetCommand::WILL, 0x19);
        assert!(options.is_enabled(0x19));
        let reply = options.handle_command(TelnetCommand::WONT, 0x19);
        assert_eq!(reply, build_negotiation(TelnetCommand::DONT, 0x19));
        assert!(!options.is_enabled(0x19));
    }

    #[test]
    fn test_build_subnegotiation_escapes() {
        let out = build_subnegotiation(0x28, &[0xFF]);
        assert_eq!(out, vec![0xFF, 0xFA, 0x28, 0xFF, 0xFF, 0xFF, 0xF0]);
    }
}
