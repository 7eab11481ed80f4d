//! Printer (3287 / SCS) session path
//!
//! A printer session receives SNA Character String data instead of 3270
//! orders: a stream of 8-bit control codes and EBCDIC text to put on paper.
//! The parser here feeds per-job buffers, tracks line and page counters,
//! and finalizes jobs on the PRINT-EOJ boundary the TN3270E header layer
//! signals. Completed jobs are retained in a bounded ring.
//!
//! Each job's retained buffer has a byte cap; on overflow the oldest bytes
//! are dropped in favor of the newest, and the event is logged once per job.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ebcdic::Ebcdic;
use crate::error::TN3270Error;
use crate::error_handling::{ErrorEnvelope, RecoveryPlan};

/// SCS control codes
pub const SCS_NUL: u8 = 0x00;
pub const SCS_HT: u8 = 0x05;   // Horizontal tab
pub const SCS_VT: u8 = 0x0B;   // Vertical tab
pub const SCS_FF: u8 = 0x0C;   // Form feed (page break)
pub const SCS_CR: u8 = 0x0D;   // Carriage return
pub const SCS_NL: u8 = 0x15;   // New line
pub const SCS_LF: u8 = 0x25;   // Line feed
pub const SCS_FMT: u8 = 0x2B;  // Format control: <function> <count> <params>

/// Horizontal tab stop interval, in columns
const TAB_STOP: usize = 8;

/// Cap on the per-job control-code history
const SCS_HISTORY_LIMIT: usize = 256;

/// Default cap on a job's retained buffer (1 MiB)
pub const DEFAULT_JOB_BUFFER_LIMIT: usize = 1024 * 1024;

/// Default size of the completed-job ring
pub const DEFAULT_COMPLETED_RING: usize = 16;

/// Lifecycle state of one print job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Active,
    Paused,
    Completed,
    Error,
}

/// One print job: accumulated output plus counters and metadata
#[derive(Debug, Clone)]
pub struct PrinterJob {
    pub job_id: String,
    pub state: JobState,
    /// Rendered output bytes (UTF-8), capped by `buffer_limit`
    buffer: VecDeque<u8>,
    buffer_limit: usize,
    overflow_logged: bool,
    pub line_count: u64,
    pub page_count: u64,
    /// Control codes observed, in order, capped
    pub scs_history: Vec<u8>,
    /// Format-control records parsed from the stream: (function, params)
    pub format_controls: Vec<(u8, Vec<u8>)>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PrinterJob {
    fn new(buffer_limit: usize) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            state: JobState::Active,
            buffer: VecDeque::new(),
            buffer_limit,
            overflow_logged: false,
            line_count: 0,
            page_count: 0,
            scs_history: Vec::new(),
            format_controls: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            last_error: None,
        }
    }

    /// Append bytes, evicting the oldest on overflow (sliding window)
    fn append(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.buffer.len() >= self.buffer_limit {
                self.buffer.pop_front();
                if !self.overflow_logged {
                    self.overflow_logged = true;
                    eprintln!(
                        "PRINTER: job {} buffer exceeded {} bytes, dropping oldest output",
                        self.job_id, self.buffer_limit
                    );
                }
            }
            self.buffer.push_back(byte);
        }
    }

    fn record_control(&mut self, code: u8) {
        if self.scs_history.len() < SCS_HISTORY_LIMIT {
            self.scs_history.push(code);
        }
    }

    /// Retained output as text
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.iter().copied().collect::<Vec<u8>>()).to_string()
    }

    /// Retained output length in bytes
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the sliding window dropped any output
    pub fn overflowed(&self) -> bool {
        self.overflow_logged
    }
}

/// The printer (SCS) session path
///
/// Parallel to the display parser but simpler: consume SCS-DATA payloads
/// into the active job, and finalize jobs when PRINT-EOJ arrives. The
/// session carries the hierarchical error envelope for its I/O operations.
#[derive(Debug)]
pub struct PrinterSession {
    codec: Ebcdic,
    current: Option<PrinterJob>,
    completed: VecDeque<PrinterJob>,
    max_completed: usize,
    buffer_limit: usize,
    /// Current output column, driven by CR/HT
    column: usize,
    /// The line being assembled, flushed on NL/LF/FF/VT
    line: Vec<u8>,
    envelope: ErrorEnvelope,
}

impl PrinterSession {
    pub fn new(codec: Ebcdic) -> Self {
        Self::with_limits(codec, DEFAULT_JOB_BUFFER_LIMIT, DEFAULT_COMPLETED_RING)
    }

    pub fn with_limits(codec: Ebcdic, buffer_limit: usize, max_completed: usize) -> Self {
        Self {
            codec,
            current: None,
            completed: VecDeque::new(),
            max_completed,
            buffer_limit,
            column: 0,
            line: Vec::new(),
            envelope: ErrorEnvelope::default(),
        }
    }

    /// The active job, if a stream is in progress
    pub fn current_job(&self) -> Option<&PrinterJob> {
        self.current.as_ref()
    }

    /// Completed jobs, oldest first
    pub fn completed_jobs(&self) -> impl Iterator<Item = &PrinterJob> {
        self.completed.iter()
    }

    /// Drop all but the newest `keep` completed jobs
    pub fn prune_completed(&mut self, keep: usize) {
        while self.completed.len() > keep {
            self.completed.pop_front();
        }
    }

    fn job_mut(&mut self) -> &mut PrinterJob {
        if self.current.is_none() {
            let job = PrinterJob::new(self.buffer_limit);
            println!("PRINTER: job {} started", job.job_id);
            self.current = Some(job);
        }
        self.current.as_mut().unwrap()
    }

    fn flush_line(&mut self) {
        let mut line = std::mem::take(&mut self.line);
        line.push(b'\n');
        self.column = 0;
        let job = self.job_mut();
        job.append(&line);
        job.line_count += 1;
    }

    /// Consume one SCS-DATA payload into the active job
    pub fn process_scs_data(&mut self, payload: &[u8]) {
        self.job_mut();
        let mut pos = 0;
        while pos < payload.len() {
            let byte = payload[pos];
            pos += 1;
            match byte {
                SCS_NUL => {}
                SCS_CR => {
                    // Reset the column; following text overwrites from the
                    // line start
                    self.job_mut().record_control(byte);
                    self.column = 0;
                    self.line.clear();
                }
                SCS_NL | SCS_LF => {
                    self.job_mut().record_control(byte);
                    self.flush_line();
                }
                SCS_FF => {
                    self.job_mut().record_control(byte);
                    if !self.line.is_empty() {
                        self.flush_line();
                    }
                    let job = self.job_mut();
                    job.page_count += 1;
                    job.append(b"\x0c");
                }
                SCS_HT => {
                    self.job_mut().record_control(byte);
                    let next_stop = ((self.column / TAB_STOP) + 1) * TAB_STOP;
                    while self.column < next_stop {
                        self.line.push(b' ');
                        self.column += 1;
                    }
                }
                SCS_VT => {
                    self.job_mut().record_control(byte);
                    self.flush_line();
                }
                SCS_FMT => {
                    // Format control: function byte, then a count byte that
                    // includes itself, then count-1 parameter bytes. Stored
                    // as job metadata; no display effect.
                    self.job_mut().record_control(byte);
                    if pos >= payload.len() {
                        break;
                    }
                    let function = payload[pos];
                    pos += 1;
                    if pos >= payload.len() {
                        break;
                    }
                    let count = payload[pos] as usize;
                    pos += 1;
                    let params_len = count.saturating_sub(1).min(payload.len() - pos);
                    let params = payload[pos..pos + params_len].to_vec();
                    pos += params_len;
                    self.job_mut().format_controls.push((function, params));
                }
                printable if printable >= 0x40 => {
                    let ch = self.codec.decode_byte(printable);
                    let mut encoded = [0u8; 4];
                    self.line.extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
                    self.column += 1;
                }
                other => {
                    // Unassigned control code: remember it, print nothing
                    self.job_mut().record_control(other);
                }
            }
        }
    }

    /// Finalize the active job on the PRINT-EOJ boundary: flush the open
    /// line, stamp the end time, and push into the completed ring
    pub fn handle_print_eoj(&mut self) {
        if !self.line.is_empty() {
            self.flush_line();
        }
        let Some(mut job) = self.current.take() else { return };
        job.state = JobState::Completed;
        job.ended_at = Some(Utc::now());
        println!(
            "PRINTER: job {} completed ({} lines, {} pages)",
            job.job_id, job.line_count, job.page_count
        );
        self.completed.push_back(job);
        while self.completed.len() > self.max_completed {
            self.completed.pop_front();
        }
        self.column = 0;
    }

    /// Record a negative RESPONSE from the host against the active job
    pub fn record_negative_response(&mut self, sequence: u16) {
        if let Some(job) = self.current.as_mut() {
            job.state = JobState::Error;
            job.last_error = Some(format!("host rejected record #{sequence}"));
        }
    }

    /// Record a failure against the active job and plan its recovery
    pub fn handle_failure(&mut self, error: &TN3270Error, operation: &str) -> RecoveryPlan {
        if let Some(job) = self.current.as_mut() {
            job.state = JobState::Error;
            job.last_error = Some(error.to_string());
        }
        self.envelope.plan_recovery(error, operation)
    }

    /// Mark an operation healthy again after recovery
    pub fn record_success(&mut self, operation: &str) {
        if let Some(job) = self.current.as_mut() {
            if job.state == JobState::Error {
                job.state = JobState::Active;
            }
        }
        self.envelope.record_success(operation);
    }

    /// The error envelope, for inspection
    pub fn envelope(&self) -> &ErrorEnvelope {
        &self.envelope
    }
}
