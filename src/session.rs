//! Session management: the thin coordinator that owns everything
//!
//! A [`Session3270`] owns one transport, one screen buffer, one protocol
//! processor, one negotiator, and at most one printer path. The receive
//! side reads transport bytes into the telnet framer, splits on `IAC EOR`,
//! and dispatches each complete record by its TN3270E data type. The send
//! side is caller-driven: an AID or key action becomes a read-modified
//! reply, wrapped with a TN3270E header when negotiated, IAC-escaped, and
//! written through a single path.
//!
//! One session runs on one logical thread; multiple sessions are
//! independent. All blocking waits honor the configured timeouts and
//! surface `Timeout` with the host, port, and operation name.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SessionConfig;
use crate::ebcdic::Ebcdic;
use crate::error::{
    ConnectionError, NegotiationError, TN3270Error, TN3270Result,
};
use crate::keyboard::{Keyboard, KeyAction, KeyOutcome};
use crate::lib3270::codes::AidKey;
use crate::lib3270::display::Display3270;
use crate::lib3270::protocol::ProtocolProcessor3270;
use crate::negotiation::{
    device_type_dimensions, ForceMode, Negotiator, NegotiationStatus, FUNC_RESPONSES,
};
use crate::printer::{PrinterSession, DEFAULT_COMPLETED_RING};
use crate::telnet::{frame_record, RecordFramer, TelnetCommand, TelnetEvent, TelnetOption};
use crate::tn3270e::{
    classify_record, wrap_outbound, DataType, ResponseCorrelator, ResponseDisposition,
    SequenceCounter,
};

/// Poll interval for reads inside the negotiation loop
const NEGOTIATION_POLL: Duration = Duration::from_millis(250);

/// Opaque byte-stream transport
///
/// TLS, proxies, and test doubles all live behind this. An encrypted
/// transport has finished its handshake before the session sees a byte.
pub trait Transport: Send + fmt::Debug {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

/// Plain TCP transport
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Resolve and connect with a bounded setup time
    pub fn connect(host: &str, port: u16, timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    return Ok(Self { stream });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
        }))
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown(std::net::Shutdown::Both)
    }
}

/// A programmable 3270 session
#[derive(Debug)]
pub struct Session3270 {
    config: SessionConfig,
    host: String,
    port: u16,
    transport: Option<Box<dyn Transport>>,
    codec: Ebcdic,
    display: Display3270,
    processor: ProtocolProcessor3270,
    negotiator: Negotiator,
    tn3270e_active: Arc<AtomicBool>,
    framer: RecordFramer,
    sequence: SequenceCounter,
    correlator: ResponseCorrelator,
    printer: Option<PrinterSession>,
    keyboard: Keyboard,
    /// Complete inbound records not yet handed out by `receive`
    inbound: VecDeque<Vec<u8>>,
    /// The server explicitly refused TN3270E this attempt
    tn3270e_refused: bool,
    /// Our functions REQUEST has been sent this attempt
    functions_requested: bool,
    fallback_attempted: bool,
    connected: bool,
}

impl Session3270 {
    pub fn new(config: SessionConfig) -> Self {
        let codec = config.codec();
        let (rows, cols) = config.dimensions();
        let mut display = Display3270::with_dimensions(rows, cols);
        display.set_codec(codec);

        let mut negotiator =
            Negotiator::new(config.negotiation_mode.into(), config.force_mode.into());
        negotiator.set_preferred_device_type(&config.device_type);
        negotiator.set_requested_lu(config.lu_name.clone());
        let tn3270e_active = negotiator.tn3270e_observer();

        Self {
            config,
            host: String::new(),
            port: 0,
            transport: None,
            codec,
            display,
            processor: ProtocolProcessor3270::new(),
            negotiator,
            tn3270e_active,
            framer: RecordFramer::new(),
            sequence: SequenceCounter::new(),
            correlator: ResponseCorrelator::new(),
            printer: None,
            keyboard: Keyboard::new(),
            inbound: VecDeque::new(),
            tn3270e_refused: false,
            functions_requested: false,
            fallback_attempted: false,
            connected: false,
        }
    }

    /// Establish a connection and drive negotiation to completion.
    ///
    /// With `allow_fallback`, a TN3270E-specific negotiation failure is
    /// retried once in plain TN3270 mode, preserving the last negotiated
    /// function set.
    pub fn connect(&mut self, host: &str, port: u16) -> TN3270Result<()> {
        self.config.validate().map_err(|reason| {
            TN3270Error::Connection(ConnectionError::SetupFailed {
                host: host.to_string(),
                port,
                reason,
            })
        })?;
        self.host = host.to_string();
        self.port = port;

        match self.connect_once() {
            Ok(()) => Ok(()),
            Err(err @ TN3270Error::Negotiation(_))
                if self.config.allow_fallback && !self.fallback_attempted =>
            {
                eprintln!("TELNET: {err}; retrying in plain TN3270 mode");
                self.fallback_attempted = true;
                self.disconnect_transport();
                self.negotiator.reset_negotiation_state();
                self.negotiator.set_force_mode(ForceMode::Tn3270);
                self.framer = RecordFramer::new();
                self.tn3270e_refused = true;
                self.connect_once()
            }
            Err(err) => Err(err),
        }
    }

    /// Connect over an existing transport (tests and alternative stacks)
    pub fn connect_with_transport(
        &mut self,
        host: &str,
        port: u16,
        transport: Box<dyn Transport>,
    ) -> TN3270Result<()> {
        self.host = host.to_string();
        self.port = port;
        self.transport = Some(transport);
        self.negotiate()
    }

    fn connect_once(&mut self) -> TN3270Result<()> {
        let timeout = Duration::from_secs(self.config.connect_timeout);
        let transport = TcpTransport::connect(&self.host, self.port, timeout).map_err(|e| {
            TN3270Error::Connection(ConnectionError::SetupFailed {
                host: self.host.clone(),
                port: self.port,
                reason: e.to_string(),
            })
        })?;
        self.transport = Some(Box::new(transport));
        self.negotiate()
    }

    fn negotiate(&mut self) -> TN3270Result<()> {
        self.negotiator.start();
        self.flush_negotiator()?;

        let deadline = Instant::now() + Duration::from_secs(self.config.negotiation_timeout);
        self.set_transport_timeout(Some(NEGOTIATION_POLL))?;

        loop {
            if self.negotiator.negotiation_complete().is_set() {
                break;
            }
            if let Some(reason) = self.negotiator.device_rejected() {
                return Err(NegotiationError::DeviceTypeRejected { reason_code: reason }.into());
            }

            // Plain TN3270 settles as soon as the basics are agreed and
            // TN3270E is off the table
            if !self.negotiator.is_tn3270e()
                && self.tn3270e_refused
                && self.negotiator.basic_options_ready()
            {
                self.negotiator.complete_plain_tn3270();
                break;
            }

            if Instant::now() >= deadline {
                if self.negotiator.basic_options_ready() && !self.negotiator.is_tn3270e() {
                    // Server never spoke TN3270E; fall through to TN3270
                    self.negotiator.complete_plain_tn3270();
                    break;
                }
                return Err(NegotiationError::NegotiationTimeout {
                    operation: "option negotiation".to_string(),
                    timeout: Duration::from_secs(self.config.negotiation_timeout),
                }
                .into());
            }

            match self.pump_transport() {
                Ok(()) => {}
                Err(TN3270Error::Timeout { .. }) => continue,
                Err(other) => return Err(other),
            }

            // After the device type settles, propose our function set once
            if self.negotiator.is_tn3270e()
                && self.negotiator.device_type_known().is_set()
                && !self.negotiator.functions_known().is_set()
                && !self.functions_requested
            {
                self.functions_requested = true;
                self.negotiator.request_functions();
            }
            self.flush_negotiator()?;
        }

        self.apply_negotiated_settings();
        self.set_transport_timeout(Some(Duration::from_secs(self.config.read_timeout)))?;
        self.connected = true;
        println!(
            "TELNET: session ready ({} via {})",
            self.negotiator.negotiated_device_type().unwrap_or("unknown device"),
            if self.negotiator.is_tn3270e() { "TN3270E" } else { "TN3270" }
        );
        Ok(())
    }

    fn apply_negotiated_settings(&mut self) {
        if self.config.rows.is_none() && self.config.cols.is_none() {
            if let Some(device) = self.negotiator.negotiated_device_type() {
                if let Some((rows, cols)) = device_type_dimensions(device) {
                    if (rows, cols) != (self.display.rows(), self.display.cols()) {
                        let mut display = Display3270::with_dimensions(rows, cols);
                        display.set_codec(self.codec);
                        self.display = display;
                    }
                }
            }
        }
        if self.negotiator.is_printer_session() && self.printer.is_none() {
            self.printer = Some(PrinterSession::with_limits(
                self.codec,
                self.config.printer_buffer_limit,
                DEFAULT_COMPLETED_RING,
            ));
        }
    }

    /// Read once from the transport and process whatever arrived
    fn pump_transport(&mut self) -> TN3270Result<()> {
        let mut buf = [0u8; 4096];
        let transport = self.transport.as_mut().ok_or_else(|| TN3270Error::NotConnected {
            operation: "read".to_string(),
        })?;
        match transport.read(&mut buf) {
            Ok(0) => Err(TN3270Error::Connection(ConnectionError::Closed {
                host: self.host.clone(),
                port: self.port,
            })),
            Ok(n) => self.process_bytes(&buf[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(TN3270Error::Timeout {
                    host: self.host.clone(),
                    port: self.port,
                    operation: "read".to_string(),
                    timeout: Duration::ZERO,
                })
            }
            Err(e) => Err(TN3270Error::Connection(ConnectionError::ConnectionLost {
                host: self.host.clone(),
                port: self.port,
                reason: e.to_string(),
            })),
        }
    }

    /// Feed transport bytes through the framer and dispatch every event.
    /// Framing violations are fatal: the session closes.
    fn process_bytes(&mut self, bytes: &[u8]) -> TN3270Result<()> {
        let events = match self.framer.feed(bytes) {
            Ok(events) => events,
            Err(violation) => {
                eprintln!("PROTOCOL VIOLATION: {violation}; closing session");
                self.disconnect_transport();
                return Err(violation.into());
            }
        };
        for event in events {
            match event {
                TelnetEvent::Command { command, option } => {
                    if option == TelnetOption::TN3270E as u8
                        && matches!(command, TelnetCommand::DONT | TelnetCommand::WONT)
                    {
                        self.tn3270e_refused = true;
                    }
                    self.negotiator.handle_command(command, option);
                }
                TelnetEvent::Subnegotiation { option, data } => {
                    self.negotiator.handle_subnegotiation(option, &data);
                }
                TelnetEvent::Record(record) => {
                    self.dispatch_record(&record)?;
                    self.inbound.push_back(record);
                }
            }
        }
        self.flush_negotiator()?;
        Ok(())
    }

    /// Route one complete record by its TN3270E data type. Routing follows
    /// the observer handle the negotiator propagates its mode through.
    fn dispatch_record(&mut self, record: &[u8]) -> TN3270Result<()> {
        let classified = classify_record(record, self.tn3270e_active.load(Ordering::SeqCst));
        let payload = classified.payload;

        match classified.data_type() {
            DataType::Data3270 => {
                if self.negotiator.is_printer_session() {
                    // 3287 sessions never paint a screen; LU1-style data
                    // goes down the printer path
                    self.printer_mut().process_scs_data(payload);
                } else {
                    if let Err(e) = self.processor.process_record(payload, &mut self.display) {
                        // The record is invalidated; the session continues
                        eprintln!("PROTOCOL: discarding record: {e}");
                        return Ok(());
                    }
                    if let Some(reply) = self.processor.generate_response(&mut self.display) {
                        self.transmit(DataType::Data3270, &reply)?;
                    }
                    if let Some(reply) = self.processor.take_pending_reply() {
                        self.transmit(DataType::Data3270, &reply)?;
                    }
                }
            }
            DataType::ScsData => {
                self.printer_mut().process_scs_data(payload);
            }
            DataType::PrintEoj => {
                self.printer_mut().handle_print_eoj();
            }
            DataType::Response => {
                if let Some(header) = classified.header {
                    match self.correlator.correlate(&header) {
                        Some((origin, disposition)) => {
                            println!(
                                "TN3270E: {disposition:?} response for {origin:?} #{}",
                                header.sequence_number
                            );
                            if disposition == ResponseDisposition::Negative
                                && self.negotiator.is_printer_session()
                            {
                                self.printer_mut()
                                    .record_negative_response(header.sequence_number);
                            }
                        }
                        None => {
                            eprintln!(
                                "TN3270E: response for unknown sequence {}",
                                header.sequence_number
                            );
                        }
                    }
                }
            }
            DataType::BindImage => self.handle_bind_image(payload),
            DataType::Unbind => {
                println!("TN3270E: session unbound by host");
                self.display.lock_keyboard();
            }
            DataType::SscpLuData => {
                // Unformatted SSCP-LU text: write straight to the buffer
                for &byte in payload {
                    self.display.write_char(byte);
                }
            }
            DataType::NvtData => {
                eprintln!("TELNET: ignoring NVT data ({} bytes)", payload.len());
            }
            DataType::Request => {
                eprintln!("TN3270E: ignoring REQUEST record ({} bytes)", payload.len());
            }
        }
        Ok(())
    }

    /// BIND-IMAGE carries the SNA BIND RU; the presentation-services
    /// fields at offsets 20..24 declare default and alternate screen sizes
    fn handle_bind_image(&mut self, payload: &[u8]) {
        if payload.len() < 24 {
            return;
        }
        let default_rows = payload[20] as usize;
        let default_cols = payload[21] as usize;
        let alt_rows = payload[22] as usize;
        let alt_cols = payload[23] as usize;
        if alt_rows > 0 && alt_cols > 0 {
            println!("TN3270E: BIND alternate screen {alt_rows}x{alt_cols}");
            self.display.set_alternate_dimensions(alt_rows, alt_cols);
        }
        if default_rows > 0
            && default_cols > 0
            && self.config.rows.is_none()
            && self.config.cols.is_none()
            && (default_rows, default_cols) != (self.display.rows(), self.display.cols())
        {
            let alternate = self.display.alternate_dimensions();
            let mut display = Display3270::with_dimensions(default_rows, default_cols);
            display.set_codec(self.codec);
            if let Some((rows, cols)) = alternate {
                display.set_alternate_dimensions(rows, cols);
            }
            self.display = display;
        }
    }

    fn printer_mut(&mut self) -> &mut PrinterSession {
        if self.printer.is_none() {
            self.printer = Some(PrinterSession::with_limits(
                self.codec,
                self.config.printer_buffer_limit,
                DEFAULT_COMPLETED_RING,
            ));
        }
        self.printer.as_mut().unwrap()
    }

    fn flush_negotiator(&mut self) -> TN3270Result<()> {
        let output = self.negotiator.take_output();
        if output.is_empty() {
            return Ok(());
        }
        self.write_raw(&output)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> TN3270Result<()> {
        let host = self.host.clone();
        let port = self.port;
        let transport = self.transport.as_mut().ok_or_else(|| TN3270Error::NotConnected {
            operation: "write".to_string(),
        })?;
        let result = transport.write_all(bytes).and_then(|_| transport.flush());
        result.map_err(|e| {
            TN3270Error::Connection(ConnectionError::ConnectionLost {
                host,
                port,
                reason: e.to_string(),
            })
        })
    }

    /// Wrap a record body for the wire: TN3270E header when negotiated,
    /// IAC escaping, and the EOR terminator
    fn transmit(&mut self, data_type: DataType, body: &[u8]) -> TN3270Result<()> {
        let wire = if self.tn3270e_active.load(Ordering::SeqCst) {
            let sequence = self.sequence.next();
            let want_response = self.negotiator.negotiated_functions() & (1 << FUNC_RESPONSES) != 0;
            if want_response {
                self.correlator.track(sequence, data_type);
            }
            let framed = wrap_outbound(data_type, body, sequence, want_response);
            frame_record(&framed)
        } else {
            frame_record(body)
        };
        self.write_raw(&wire)
    }

    /// Issue a read-modified reply for an AID at the given cursor position
    pub fn send_aid(&mut self, aid: AidKey, cursor_row: usize, cursor_col: usize) -> TN3270Result<()> {
        self.require_connected("send_aid")?;
        self.display.set_position(cursor_row, cursor_col, false).ok();
        let reply = self
            .processor
            .build_read_modified_reply(&mut self.display, aid, false);
        self.transmit(DataType::Data3270, &reply)?;
        // The host owns the keyboard until it writes back
        self.display.lock_keyboard();
        Ok(())
    }

    /// Apply a key action: AID actions emit a reply at the current cursor;
    /// local actions mutate the buffer and raise MDT on touched fields
    pub fn send_key(&mut self, action: KeyAction) -> TN3270Result<()> {
        self.require_connected("send_key")?;
        match self.keyboard.apply(action, &mut self.display) {
            KeyOutcome::Aid(aid) => {
                let (row, col) = self.display.cursor_position();
                self.send_aid(aid, row, col)
            }
            KeyOutcome::Local => Ok(()),
        }
    }

    /// Type text into the current field without hitting the wire
    pub fn type_text(&mut self, text: &str) -> TN3270Result<usize> {
        self.require_connected("type_text")?;
        let codec = self.codec;
        Ok(self.keyboard.type_text(text, &codec, &mut self.display))
    }

    /// Return the next raw inbound record, pumping the transport as needed.
    /// The record has framing stripped but any TN3270E header intact.
    pub fn receive(&mut self, timeout: Duration) -> TN3270Result<Vec<u8>> {
        self.require_connected("receive")?;
        if let Some(record) = self.inbound.pop_front() {
            return Ok(record);
        }
        let deadline = Instant::now() + timeout;
        self.set_transport_timeout(Some(NEGOTIATION_POLL.min(timeout)))?;
        let result = loop {
            match self.pump_transport() {
                Ok(()) => {
                    if let Some(record) = self.inbound.pop_front() {
                        break Ok(record);
                    }
                }
                Err(TN3270Error::Timeout { .. }) => {}
                Err(other) => break Err(other),
            }
            if Instant::now() >= deadline {
                break Err(TN3270Error::Timeout {
                    host: self.host.clone(),
                    port: self.port,
                    operation: "receive".to_string(),
                    timeout,
                });
            }
        };
        self.set_transport_timeout(Some(Duration::from_secs(self.config.read_timeout)))?;
        result
    }

    /// Pump any bytes already available without blocking past one poll
    pub fn poll(&mut self) -> TN3270Result<()> {
        self.require_connected("poll")?;
        match self.pump_transport() {
            Ok(()) | Err(TN3270Error::Timeout { .. }) => Ok(()),
            Err(other) => Err(other),
        }
    }

    /// Terminate the session: flush pending writes and close the transport
    pub fn close(&mut self) -> TN3270Result<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.flush().ok();
            transport.close().ok();
        }
        self.connected = false;
        Ok(())
    }

    fn disconnect_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().ok();
        }
        self.connected = false;
    }

    fn set_transport_timeout(&mut self, timeout: Option<Duration>) -> TN3270Result<()> {
        let host = self.host.clone();
        let port = self.port;
        if let Some(transport) = self.transport.as_mut() {
            transport.set_read_timeout(timeout).map_err(|e| {
                TN3270Error::Connection(ConnectionError::ConnectionLost {
                    host,
                    port,
                    reason: e.to_string(),
                })
            })?;
        }
        Ok(())
    }

    fn require_connected(&self, operation: &str) -> TN3270Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(TN3270Error::NotConnected { operation: operation.to_string() })
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Immutable view of the screen for inspection
    pub fn screen(&self) -> &Display3270 {
        &self.display
    }

    /// Snapshot of the negotiation state
    pub fn negotiation_status(&self) -> NegotiationStatus {
        self.negotiator.status()
    }

    /// The printer path, when this is a 3287 session or SCS data arrived
    pub fn printer(&self) -> Option<&PrinterSession> {
        self.printer.as_ref()
    }
}
