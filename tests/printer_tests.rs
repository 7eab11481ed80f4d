//! Printer (SCS) path integration tests
//!
//! Runs a 3287 session end to end over a scripted transport: SCS data,
//! PRINT-EOJ boundaries, the bounded job ring, and the recovery envelope.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tn3270r::ebcdic::Ebcdic;
use tn3270r::error::{ConnectionError, TN3270Error};
use tn3270r::error_handling::{CircuitState, RecoveryStrategy};
use tn3270r::printer::{JobState, PrinterSession, SCS_FF, SCS_NL};
use tn3270r::session::{Session3270, Transport};
use tn3270r::SessionConfig;

#[derive(Debug)]
struct ScriptedTransport {
    inbound: VecDeque<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedTransport {
    fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self { inbound: chunks.into(), written: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl Transport for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inbound.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "script drained")),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// TN3270E negotiation selecting the 3287 printer device
fn printer_negotiation_script() -> Vec<Vec<u8>> {
    let mut device_is = vec![0xFF, 0xFA, 0x28, 0x02, 0x02];
    device_is.extend_from_slice(b"IBM-3287-1");
    device_is.extend_from_slice(&[0xFF, 0xF0]);
    vec![
        vec![0xFF, 0xFD, 0x18, 0xFF, 0xFD, 0x19, 0xFF, 0xFD, 0x00, 0xFF, 0xFD, 0x28],
        device_is,
        // FUNCTIONS IS {DATA-STREAM-CTL, RESPONSES, SCS-CTL-CODES}
        vec![0xFF, 0xFA, 0x28, 0x03, 0x02, 0x01, 0x02, 0x03, 0xFF, 0xF0],
    ]
}

fn printer_session(extra: Vec<Vec<u8>>) -> Session3270 {
    let mut chunks = printer_negotiation_script();
    chunks.extend(extra);
    let transport = ScriptedTransport::new(chunks);
    let mut session = Session3270::new(SessionConfig {
        negotiation_timeout: 1,
        allow_fallback: false,
        ..SessionConfig::default()
    });
    session
        .connect_with_transport("printhost", 23, Box::new(transport))
        .unwrap();
    session
}

/// "REPORT" in EBCDIC
const REPORT: [u8; 6] = [0xD9, 0xC5, 0xD7, 0xD6, 0xD9, 0xE3];

#[test]
fn test_printer_session_negotiated() {
    let session = printer_session(vec![]);
    let status = session.negotiation_status();
    assert!(status.is_printer_session);
    assert_eq!(status.negotiated_device_type.as_deref(), Some("IBM-3287-1"));
}

#[test]
fn test_scs_stream_to_completed_job() {
    // SCS-DATA: "REPORT" NL, then a page break, then PRINT-EOJ
    let mut scs = vec![0x01, 0x00, 0x00, 0x00, 0x01];
    scs.extend_from_slice(&REPORT);
    scs.push(SCS_NL);
    scs.push(SCS_FF);
    scs.extend_from_slice(&[0xFF, 0xEF]);
    let eoj = vec![0x08, 0x00, 0x00, 0x00, 0x02, 0xFF, 0xEF];

    let mut session = printer_session(vec![scs, eoj]);
    session.poll().unwrap();
    session.poll().unwrap();

    let printer = session.printer().unwrap();
    assert!(printer.current_job().is_none());
    let jobs: Vec<_> = printer.completed_jobs().collect();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, JobState::Completed);
    assert_eq!(jobs[0].line_count, 1);
    assert_eq!(jobs[0].page_count, 1);
    assert!(jobs[0].output().starts_with("REPORT\n"));
    assert!(jobs[0].started_at <= jobs[0].ended_at.unwrap());
}

#[test]
fn test_display_data_routed_to_printer_path() {
    // In a 3287 session, 3270-DATA goes down the SCS pipeline too
    let mut record = vec![0x00, 0x00, 0x00, 0x00, 0x01];
    record.extend_from_slice(&REPORT);
    record.push(SCS_NL);
    record.extend_from_slice(&[0xFF, 0xEF]);

    let mut session = printer_session(vec![record]);
    session.poll().unwrap();

    let printer = session.printer().unwrap();
    assert_eq!(printer.current_job().unwrap().output(), "REPORT\n");
    // The screen buffer stays untouched
    assert!(session.screen().ascii_buffer(false).trim().is_empty());
}

#[test]
fn test_multiple_jobs_in_ring_order() {
    let mut chunks = Vec::new();
    for (i, word) in [[0xC1u8], [0xC2], [0xC3]].iter().enumerate() {
        let mut scs = vec![0x01, 0x00, 0x00, 0x00, i as u8];
        scs.extend_from_slice(word);
        scs.push(SCS_NL);
        scs.extend_from_slice(&[0xFF, 0xEF]);
        chunks.push(scs);
        chunks.push(vec![0x08, 0x00, 0x00, 0x00, 0x10 + i as u8, 0xFF, 0xEF]);
    }
    let mut session = printer_session(chunks);
    for _ in 0..6 {
        session.poll().unwrap();
    }

    let printer = session.printer().unwrap();
    let outputs: Vec<String> = printer.completed_jobs().map(|j| j.output()).collect();
    assert_eq!(outputs, vec!["A\n", "B\n", "C\n"]);
}

#[test]
fn test_job_buffer_cap_slides() {
    let mut printer = PrinterSession::with_limits(Ebcdic::default(), 16, 4);
    for _ in 0..40 {
        printer.process_scs_data(&[0xC1, 0xC2, SCS_NL]);
    }
    let job = printer.current_job().unwrap();
    assert_eq!(job.buffer_len(), 16);
    assert!(job.overflowed());
    // Newest bytes win
    assert!(job.output().ends_with("AB\n"));
}

#[test]
fn test_recovery_envelope_through_printer() {
    let mut printer = PrinterSession::new(Ebcdic::default());
    printer.process_scs_data(&[0xC1]);

    let error = TN3270Error::Connection(ConnectionError::ConnectionLost {
        host: "printhost".to_string(),
        port: 23,
        reason: "broken pipe".to_string(),
    });

    let plan = printer.handle_failure(&error, "deliver");
    assert_eq!(plan.strategy, RecoveryStrategy::Reconnect);
    assert_eq!(printer.current_job().unwrap().state, JobState::Error);

    printer.record_success("deliver");
    assert_eq!(printer.current_job().unwrap().state, JobState::Active);
    assert_eq!(printer.envelope().breaker().state(), CircuitState::Closed);
}

#[test]
fn test_timeout_failures_retry_with_backoff() {
    let mut printer = PrinterSession::new(Ebcdic::default());
    let timeout = TN3270Error::Timeout {
        host: "printhost".to_string(),
        port: 23,
        operation: "deliver".to_string(),
        timeout: Duration::from_secs(5),
    };

    let first = printer.handle_failure(&timeout, "deliver");
    let second = printer.handle_failure(&timeout, "deliver");
    assert_eq!(first.strategy, RecoveryStrategy::Retry);
    assert_eq!(second.strategy, RecoveryStrategy::Retry);
    assert!(second.delay.unwrap() > first.delay.unwrap());
}
