//! 3270 data-stream parsing and reply generation
//!
//! [`ProtocolProcessor3270`] consumes one inbound 3270 record at a time
//! (framing already stripped by the telnet layer), executes its command and
//! orders against a display buffer, and builds the outbound read replies.
//!
//! Parse failures invalidate only the offending record; the session carries
//! on. Short records, bad buffer addresses, and (in strict mode) unknown
//! orders are surfaced as typed errors. In lenient mode an unknown order is
//! written through as data and logged once per occurrence.

use super::codes::*;
use super::display::{addressing, addressing::AddressMode, Display3270};
use super::field::ExtendedAttributes;
use crate::error::{ParseError, ParseResult};

/// A read command the host issued, to be answered by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingRead {
    Buffer,
    Modified,
    ModifiedAll,
}

/// 3270 protocol processor: record parser plus reply writer
#[derive(Debug)]
pub struct ProtocolProcessor3270 {
    /// Fail on unknown orders instead of treating them as data
    strict_orders: bool,
    /// Address encoding convention, auto-detected from inbound addresses
    /// and mirrored on outbound replies
    address_mode: AddressMode,
    /// Reply mode recorded from the Set Reply Mode structured field
    reply_mode: Option<u8>,
    /// Read command awaiting a generated response
    pending_read: Option<PendingRead>,
    /// Deferred reply built by a structured field (e.g. Query)
    pending_reply: Option<Vec<u8>>,
    /// A WCC requested a print operation
    start_print: bool,
}

impl ProtocolProcessor3270 {
    pub fn new() -> Self {
        Self {
            strict_orders: false,
            address_mode: AddressMode::TwelveBit,
            reply_mode: None,
            pending_read: None,
            pending_reply: None,
            start_print: false,
        }
    }

    /// Enable strict order checking (unknown orders become errors)
    pub fn set_strict_orders(&mut self, strict: bool) {
        self.strict_orders = strict;
    }

    /// The address encoding in effect for outbound replies
    pub fn address_mode(&self) -> AddressMode {
        self.address_mode
    }

    /// Force the address encoding (normally auto-detected)
    pub fn set_address_mode(&mut self, mode: AddressMode) {
        self.address_mode = mode;
    }

    /// Reply mode recorded from Set Reply Mode, if any
    pub fn reply_mode(&self) -> Option<u8> {
        self.reply_mode
    }

    /// Take the read command the host is waiting on, if any
    pub fn take_pending_read(&mut self) -> Option<PendingRead> {
        self.pending_read.take()
    }

    /// Take a reply deferred by a structured field, if any
    pub fn take_pending_reply(&mut self) -> Option<Vec<u8>> {
        self.pending_reply.take()
    }

    /// Whether the last record's WCC requested a print operation
    pub fn take_start_print(&mut self) -> bool {
        std::mem::replace(&mut self.start_print, false)
    }

    /// Parse one 3270 record and apply it to the display.
    ///
    /// On success the whole record has been consumed. On error the display
    /// may be partially updated but the session remains usable.
    pub fn process_record(&mut self, data: &[u8], display: &mut Display3270) -> ParseResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut parser = RecordParser {
            data,
            pos: 0,
            processor: self,
        };
        parser.parse(display)
    }

    /// Build a read-modified reply for an AID at the current cursor.
    ///
    /// Short-read AIDs (Clear, PA1-PA3) carry only the AID and cursor
    /// address. `all` selects Read Modified All semantics: field data is
    /// included even for short-read AIDs.
    pub fn build_read_modified_reply(
        &self,
        display: &mut Display3270,
        aid: AidKey,
        all: bool,
    ) -> Vec<u8> {
        let mut reply = Vec::new();
        reply.push(aid.to_u8());
        let (b1, b2) = addressing::encode(display.cursor_address() as u16, self.address_mode);
        reply.push(b1);
        reply.push(b2);

        if aid.is_short_read() && !all {
            return reply;
        }

        for (content_start, content) in display.read_modified() {
            reply.push(ORDER_SBA);
            let (a1, a2) = addressing::encode(content_start as u16, self.address_mode);
            reply.push(a1);
            reply.push(a2);
            // NUL cells and trailing fill carry no information on the wire
            let mut trimmed: &[u8] = &content;
            while let Some((&last, rest)) = trimmed.split_last() {
                if last == EBCDIC_NUL || last == EBCDIC_SPACE {
                    trimmed = rest;
                } else {
                    break;
                }
            }
            reply.extend(trimmed.iter().copied().filter(|&b| b != EBCDIC_NUL));
        }
        reply
    }

    /// Build a read-buffer reply: AID, cursor address, then the entire
    /// buffer contents including attribute bytes
    pub fn build_read_buffer_reply(&self, display: &Display3270, aid: AidKey) -> Vec<u8> {
        let mut reply = Vec::new();
        reply.push(aid.to_u8());
        let (b1, b2) = addressing::encode(display.cursor_address() as u16, self.address_mode);
        reply.push(b1);
        reply.push(b2);
        reply.extend_from_slice(&display.buffer_data());
        reply
    }

    /// Answer the pending read command, if one is outstanding
    pub fn generate_response(&mut self, display: &mut Display3270) -> Option<Vec<u8>> {
        match self.pending_read.take()? {
            PendingRead::Buffer => Some(self.build_read_buffer_reply(display, AidKey::NoAid)),
            PendingRead::Modified => {
                Some(self.build_read_modified_reply(display, AidKey::NoAid, false))
            }
            PendingRead::ModifiedAll => {
                Some(self.build_read_modified_reply(display, AidKey::NoAid, true))
            }
        }
    }

    fn build_query_reply(&self, display: &Display3270) -> Vec<u8> {
        // AID, then one Query Reply structured field describing the usable
        // area as (rows, cols) 16-bit pairs.
        let mut reply = vec![AID_STRUCTURED_FIELD];
        let payload: [u8; 5] = [
            0x81, // usable area query code
            (display.rows() >> 8) as u8,
            (display.rows() & 0xFF) as u8,
            (display.cols() >> 8) as u8,
            (display.cols() & 0xFF) as u8,
        ];
        let length = (2 + 1 + payload.len()) as u16;
        reply.push((length >> 8) as u8);
        reply.push((length & 0xFF) as u8);
        reply.push(SF_QUERY_REPLY);
        reply.extend_from_slice(&payload);
        reply
    }
}

impl Default for ProtocolProcessor3270 {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over one inbound record
struct RecordParser<'a, 'p> {
    data: &'a [u8],
    pos: usize,
    processor: &'p mut ProtocolProcessor3270,
}

impl<'a, 'p> RecordParser<'a, 'p> {
    fn parse(&mut self, display: &mut Display3270) -> ParseResult<()> {
        while self.pos < self.data.len() {
            let cmd_byte = self.next_byte("command")?;
            let command = CommandCode::from_u8(cmd_byte)
                .ok_or(ParseError::UnknownCommand { command: cmd_byte })?;
            self.process_command(command, display)?;
        }
        Ok(())
    }

    fn process_command(
        &mut self,
        command: CommandCode,
        display: &mut Display3270,
    ) -> ParseResult<()> {
        match command {
            CommandCode::Write => self.process_write(display, false, false),
            CommandCode::EraseWrite => self.process_write(display, true, false),
            CommandCode::EraseWriteAlternate => self.process_write(display, true, true),
            CommandCode::ReadBuffer => {
                self.processor.pending_read = Some(PendingRead::Buffer);
                Ok(())
            }
            CommandCode::ReadModified => {
                self.processor.pending_read = Some(PendingRead::Modified);
                Ok(())
            }
            CommandCode::ReadModifiedAll => {
                self.processor.pending_read = Some(PendingRead::ModifiedAll);
                Ok(())
            }
            CommandCode::EraseAllUnprotected => {
                display.erase_all_unprotected();
                display.unlock_keyboard();
                Ok(())
            }
            CommandCode::WriteStructuredField => self.process_structured_fields(display),
        }
    }

    /// Write, Erase/Write, or Erase/Write Alternate: optional WCC byte,
    /// then orders and data
    fn process_write(
        &mut self,
        display: &mut Display3270,
        erase: bool,
        alternate: bool,
    ) -> ParseResult<()> {
        // The keyboard locks on every Write; WCC restore unlocks it
        display.lock_keyboard();

        if erase {
            if alternate {
                display.switch_to_alternate();
            } else {
                display.clear();
            }
        }

        // The WCC is optional on the wire: a leading order byte means the
        // host omitted it
        if let Some(&byte) = self.data.get(self.pos) {
            if OrderCode::from_u8(byte).is_none() {
                self.pos += 1;
                let wcc = byte;
                if (wcc & WCC_RESET_MDT) != 0 {
                    display.reset_all_mdt();
                }
                if (wcc & WCC_ALARM) != 0 {
                    display.set_alarm(true);
                }
                if (wcc & WCC_RESTORE) != 0 {
                    display.unlock_keyboard();
                }
                if (wcc & WCC_START_PRINT) != 0 {
                    self.processor.start_print = true;
                }
            }
        }

        let mut pending_cursor: Option<usize> = None;

        while self.pos < self.data.len() {
            let byte = self.data[self.pos];
            match OrderCode::from_u8(byte) {
                Some(order) => {
                    self.pos += 1;
                    self.process_order(order, display, &mut pending_cursor)?;
                }
                None => {
                    self.pos += 1;
                    display.write_char(byte);
                }
            }
        }

        if let Some(cursor) = pending_cursor {
            display.set_cursor(cursor);
        }
        Ok(())
    }

    fn process_order(
        &mut self,
        order: OrderCode,
        display: &mut Display3270,
        pending_cursor: &mut Option<usize>,
    ) -> ParseResult<()> {
        match order {
            OrderCode::StartField => {
                let attr = self.next_byte("SF attribute")?;
                display.set_attribute(attr);
                Ok(())
            }
            OrderCode::StartFieldExtended => self.process_start_field_extended(display),
            OrderCode::SetBufferAddress => {
                let address = self.read_address(display)?;
                display.set_cursor(address);
                Ok(())
            }
            OrderCode::SetAttribute => {
                let attr_type = self.next_byte("SA type")?;
                let value = self.next_byte("SA value")?;
                let (row, col) = display.cursor_position();
                // SA never creates a field; it decorates the current cell
                display.set_extended_attribute(row, col, attr_type, value)?;
                Ok(())
            }
            OrderCode::ModifyField => self.process_modify_field(display),
            OrderCode::InsertCursor => {
                *pending_cursor = Some(display.cursor_address());
                Ok(())
            }
            OrderCode::ProgramTab => {
                display.program_tab();
                Ok(())
            }
            OrderCode::RepeatToAddress => {
                let target = self.read_address(display)?;
                let byte = self.next_byte("RA character")?;
                display.repeat_to_address(byte, target)
            }
            OrderCode::EraseUnprotectedToAddress => {
                let target = self.read_address(display)?;
                display.erase_unprotected_to_address(target)
            }
            OrderCode::GraphicEscape => {
                let byte = self.next_byte("GE character")?;
                display.write_char_ge(byte, 0x01);
                Ok(())
            }
        }
    }

    fn process_start_field_extended(&mut self, display: &mut Display3270) -> ParseResult<()> {
        let count = self.next_byte("SFE count")? as usize;
        let needed = count * 2;
        if self.remaining() < needed {
            return Err(ParseError::ShortRecord {
                expected: needed,
                available: self.remaining(),
                context: "SFE pairs",
            });
        }

        let mut base_attr = 0u8;
        let mut extended = ExtendedAttributes::new();
        for _ in 0..count {
            let attr_type = self.data[self.pos];
            let value = self.data[self.pos + 1];
            self.pos += 2;
            if attr_type == XA_3270 {
                base_attr = value;
            } else if !extended.apply(attr_type, value) {
                eprintln!("PROTOCOL: unknown SFE attribute type 0x{attr_type:02X}");
            }
        }

        let start = display.cursor_address();
        display.set_attribute(base_attr);
        display.set_field_extended(start, extended);
        Ok(())
    }

    fn process_modify_field(&mut self, display: &mut Display3270) -> ParseResult<()> {
        let count = self.next_byte("MF count")? as usize;
        let needed = count * 2;
        if self.remaining() < needed {
            return Err(ParseError::ShortRecord {
                expected: needed,
                available: self.remaining(),
                context: "MF pairs",
            });
        }

        // MF updates the attributes of the field containing the current
        // position without writing new data
        display.detect_fields();
        let field_start = display
            .fields()
            .iter()
            .find(|f| !f.implicit && f.contains(display.cursor_address()))
            .map(|f| f.start);

        for _ in 0..count {
            let attr_type = self.data[self.pos];
            let value = self.data[self.pos + 1];
            self.pos += 2;
            if let Some(start) = field_start {
                if attr_type == XA_3270 {
                    let _ = display.set_attribute_at(start, value);
                } else {
                    let (row, col) = display.coords_of(start);
                    let _ = display.set_extended_attribute(row, col, attr_type, value);
                }
            }
        }
        Ok(())
    }

    fn process_structured_fields(&mut self, display: &mut Display3270) -> ParseResult<()> {
        let data = self.data;
        while self.pos < self.data.len() {
            if self.remaining() < 2 {
                return Err(ParseError::ShortRecord {
                    expected: 2,
                    available: self.remaining(),
                    context: "structured field length",
                });
            }
            let length =
                u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]) as usize;
            if length < 2 {
                return Err(ParseError::ShortRecord {
                    expected: 2,
                    available: length,
                    context: "structured field length",
                });
            }
            if length > self.remaining() {
                return Err(ParseError::ShortRecord {
                    expected: length,
                    available: self.remaining(),
                    context: "structured field body",
                });
            }
            let body = &data[self.pos + 2..self.pos + length];
            self.pos += length;

            // A length of exactly 2 carries no id and no payload
            if body.is_empty() {
                continue;
            }
            let (id, payload) = (body[0], &body[1..]);
            self.dispatch_structured_field(id, payload, display)?;
        }
        Ok(())
    }

    fn dispatch_structured_field(
        &mut self,
        id: u8,
        payload: &[u8],
        display: &mut Display3270,
    ) -> ParseResult<()> {
        match id {
            SF_SET_REPLY_MODE => {
                // partition byte, then the mode
                self.processor.reply_mode = payload.get(1).or_else(|| payload.first()).copied();
                Ok(())
            }
            SF_READ_PARTITION => {
                // partition byte, then the operation; 0x02 is Query
                if payload.get(1) == Some(&0x02) || payload.get(1) == Some(&0x03) {
                    let reply = self.processor.build_query_reply(display);
                    self.processor.pending_reply = Some(reply);
                }
                Ok(())
            }
            SF_ERASE_RESET => {
                display.clear();
                Ok(())
            }
            SF_OUTBOUND_3270DS => {
                // partition byte, then an embedded 3270 command stream
                if payload.len() > 1 {
                    let mut inner = RecordParser {
                        data: &payload[1..],
                        pos: 0,
                        processor: &mut *self.processor,
                    };
                    inner.parse(display)?;
                }
                Ok(())
            }
            SF_3270_IPDS => {
                // IPDS passthrough is out of scope for the display path
                Ok(())
            }
            SF_QUERY_REPLY => Ok(()),
            other => {
                if self.processor.strict_orders {
                    Err(ParseError::UnknownOrder { order: other, position: self.pos })
                } else {
                    eprintln!("PROTOCOL: ignoring unknown structured field 0x{other:02X}");
                    Ok(())
                }
            }
        }
    }

    /// Read a 2-byte buffer address, auto-detecting the encoding and
    /// validating it against the display dimensions
    fn read_address(&mut self, display: &Display3270) -> ParseResult<usize> {
        if self.remaining() < 2 {
            return Err(ParseError::ShortRecord {
                expected: 2,
                available: self.remaining(),
                context: "buffer address",
            });
        }
        let b1 = self.data[self.pos];
        let b2 = self.data[self.pos + 1];
        self.pos += 2;

        let (address, mode) = addressing::decode_auto(b1, b2);
        self.processor.address_mode = mode;

        let address = address as usize;
        if address >= display.buffer_size() {
            return Err(ParseError::BadAddress {
                address: address as u16,
                buffer_size: display.buffer_size(),
            });
        }
        Ok(address)
    }

    fn next_byte(&mut self, context: &'static str) -> ParseResult<u8> {
        if self.pos >= self.data.len() {
            return Err(ParseError::ShortRecord {
                expected: 1,
                available: 0,
                context,
            });
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_record(body: &[u8]) -> Vec<u8> {
        let mut record = vec![CMD_WRITE, 0x00];
        record.extend_from_slice(body);
        record
    }

    #[test]
    fn test_simple_write_with_field() {
        // Erase/Write, SBA(0,0), SF 0xF0, "HELLO"
        let record = vec![
            CMD_ERASE_WRITE_EBCDIC,
            0x00,
            ORDER_SBA, 0x40, 0x40,
            ORDER_SF, 0xF0,
            0xC8, 0xC5, 0xD3, 0xD3, 0xD6,
        ];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();

        assert!(display.cells()[0].is_field_attr);
        assert_eq!(display.char_at(1), Some(0xC8));
        assert_eq!(display.char_at(5), Some(0xD6));
        assert!(display.ascii_buffer(false).starts_with(" HELLO"));
    }

    #[test]
    fn test_erase_write_alternate_clears_and_resets_mdt() {
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();

        // Dirty the buffer with a modified field
        processor
            .process_record(&write_record(&[ORDER_SF, 0x00, 0xC1]), &mut display)
            .unwrap();
        display.set_mdt_at(1, true);
        assert_eq!(display.read_modified().len(), 1);

        // EWA with WCC 0xC3 (reset MDT + restore), then SBA 0 and "ABC"
        let record = vec![
            CMD_ERASE_WRITE_ALTERNATE_EBCDIC,
            0xC3,
            ORDER_SBA, 0x40, 0x40,
            0xC1, 0xC2, 0xC3,
        ];
        processor.process_record(&record, &mut display).unwrap();

        assert_eq!(display.char_at(0), Some(0xC1));
        assert_eq!(display.char_at(1), Some(0xC2));
        assert_eq!(display.char_at(2), Some(0xC3));
        assert_eq!(display.char_at(3), Some(EBCDIC_SPACE));
        assert!(display.read_modified().is_empty());
        assert!(!display.is_keyboard_locked());
    }

    #[test]
    fn test_repeat_to_address_order() {
        // SBA to 0, RA to 90 with EBCDIC '!'
        let record = write_record(&[ORDER_SBA, 0x40, 0x40, ORDER_RA, 0x41, 0x5A, 0x5A]);
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();

        for pos in 0..90 {
            assert_eq!(display.char_at(pos), Some(0x5A), "position {pos}");
        }
        assert_eq!(display.char_at(90), Some(EBCDIC_SPACE));
        assert_eq!(display.cursor_address(), 90);
    }

    #[test]
    fn test_insert_cursor_applies_after_write() {
        let record = write_record(&[
            ORDER_SBA, 0x40, 0xC5, // position 5
            ORDER_IC,
            0xC1, 0xC2,
        ]);
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
        assert_eq!(display.cursor_address(), 5);
        assert_eq!(display.char_at(5), Some(0xC1));
    }

    #[test]
    fn test_sfe_creates_field_with_extended_attrs() {
        let record = write_record(&[
            ORDER_SFE,
            0x02,
            XA_3270, ATTR_PROTECTED,
            XA_FOREGROUND, COLOR_RED,
        ]);
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();

        let fields = display.detect_fields();
        assert_eq!(fields.len(), 1);
        assert!(fields[0].attribute.is_protected());
        assert_eq!(fields[0].attribute.extended.foreground_color, Some(COLOR_RED));
    }

    #[test]
    fn test_sa_decorates_without_creating_field() {
        let record = write_record(&[ORDER_SA, XA_HIGHLIGHTING, HIGHLIGHT_REVERSE, 0xC1]);
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();

        assert_eq!(
            display.extended_attribute_at(0).unwrap().highlighting,
            Some(HIGHLIGHT_REVERSE)
        );
        let fields = display.detect_fields();
        assert!(fields[0].implicit);
    }

    #[test]
    fn test_short_record_sba() {
        let record = vec![CMD_WRITE, 0x00, ORDER_SBA, 0x40];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        let err = processor.process_record(&record, &mut display).unwrap_err();
        assert!(matches!(err, ParseError::ShortRecord { .. }));
    }

    #[test]
    fn test_bare_write_is_a_no_op() {
        let record = vec![CMD_WRITE];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
        assert_eq!(display.char_at(0), Some(EBCDIC_SPACE));
    }

    #[test]
    fn test_write_without_wcc_starts_at_order() {
        // The byte after Erase/Write is SBA, so no WCC was sent
        let record = vec![
            CMD_ERASE_WRITE_EBCDIC,
            ORDER_SBA, 0x40, 0x40,
            ORDER_SF, 0xF0,
            0xC8, 0xC5, 0xD3, 0xD3, 0xD6,
        ];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
        assert!(display.cells()[0].is_field_attr);
        assert!(display.ascii_buffer(false).starts_with(" HELLO"));
    }

    #[test]
    fn test_bad_address_rejected() {
        // 12-bit address 4000 on a 24x80 (1920-cell) screen
        let (b1, b2) = addressing::encode_12bit(4000);
        let record = write_record(&[ORDER_SBA, b1, b2]);
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        let err = processor.process_record(&record, &mut display).unwrap_err();
        assert_eq!(err, ParseError::BadAddress { address: 4000, buffer_size: 1920 });
    }

    #[test]
    fn test_unknown_command_rejected() {
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        let err = processor.process_record(&[0x42], &mut display).unwrap_err();
        assert_eq!(err, ParseError::UnknownCommand { command: 0x42 });
    }

    #[test]
    fn test_14bit_address_auto_detected() {
        let (b1, b2) = addressing::encode_14bit(100);
        let record = write_record(&[ORDER_SBA, b1, b2]);
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
        assert_eq!(display.cursor_address(), 100);
        assert_eq!(processor.address_mode(), AddressMode::FourteenBit);
    }

    #[test]
    fn test_read_commands_set_pending() {
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&[CMD_READ_BUFFER], &mut display).unwrap();
        assert_eq!(processor.take_pending_read(), Some(PendingRead::Buffer));

        processor.process_record(&[CMD_READ_MODIFIED_EBCDIC], &mut display).unwrap();
        assert_eq!(processor.take_pending_read(), Some(PendingRead::Modified));
    }

    #[test]
    fn test_structured_field_empty_length_two() {
        let record = vec![CMD_WRITE_STRUCTURED_FIELD_EBCDIC, 0x00, 0x02];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
    }

    #[test]
    fn test_structured_field_overlong_length() {
        let record = vec![CMD_WRITE_STRUCTURED_FIELD_EBCDIC, 0x00, 0x10, SF_QUERY_REPLY];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        let err = processor.process_record(&record, &mut display).unwrap_err();
        assert!(matches!(err, ParseError::ShortRecord { .. }));
    }

    #[test]
    fn test_set_reply_mode_recorded() {
        let record = vec![
            CMD_WRITE_STRUCTURED_FIELD_EBCDIC,
            0x00, 0x05, SF_SET_REPLY_MODE, 0x00, 0x01,
        ];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
        assert_eq!(processor.reply_mode(), Some(0x01));
    }

    #[test]
    fn test_read_partition_query_defers_reply() {
        let record = vec![
            CMD_WRITE_STRUCTURED_FIELD_EBCDIC,
            0x00, 0x05, SF_READ_PARTITION, 0xFF, 0x02,
        ];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
        let reply = processor.take_pending_reply().unwrap();
        assert_eq!(reply[0], AID_STRUCTURED_FIELD);
        assert_eq!(reply[3], SF_QUERY_REPLY);
    }

    #[test]
    fn test_outbound_3270ds_nested_stream() {
        // Structured field wrapping Write + data "AB"
        let record = vec![
            CMD_WRITE_STRUCTURED_FIELD_EBCDIC,
            0x00, 0x08, SF_OUTBOUND_3270DS, 0x00, CMD_WRITE, 0x00, 0xC1, 0xC2,
        ];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
        assert_eq!(display.char_at(0), Some(0xC1));
        assert_eq!(display.char_at(1), Some(0xC2));
    }

    #[test]
    fn test_read_modified_reply_shape() {
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();

        // Unprotected field at (1,0) = position 80, content "INPUT"
        display.set_cursor(80);
        display.set_attribute(0x00);
        for &b in &[0xC9, 0xD5, 0xD7, 0xE4, 0xE3] {
            display.write_char(b);
        }
        display.set_mdt_at(81, true);
        display.set_cursor(85);

        let reply = processor.build_read_modified_reply(&mut display, AidKey::Enter, false);

        let mut expected = vec![AID_ENTER];
        let (c1, c2) = addressing::encode_12bit(85);
        expected.extend_from_slice(&[c1, c2]);
        expected.push(ORDER_SBA);
        let (f1, f2) = addressing::encode_12bit(81);
        expected.extend_from_slice(&[f1, f2]);
        expected.extend_from_slice(&[0xC9, 0xD5, 0xD7, 0xE4, 0xE3]);
        assert_eq!(reply, expected);
    }

    #[test]
    fn test_enter_without_modifications_is_three_bytes() {
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        display.set_attribute(0x00);
        let reply = processor.build_read_modified_reply(&mut display, AidKey::Enter, false);
        assert_eq!(reply.len(), 3);
    }

    #[test]
    fn test_short_read_aid_omits_fields() {
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        display.set_attribute(0x00);
        display.write_char(0xC1);
        display.set_mdt_at(1, true);

        let reply = processor.build_read_modified_reply(&mut display, AidKey::Clear, false);
        assert_eq!(reply.len(), 3);
        assert_eq!(reply[0], AID_CLEAR);

        // Read Modified All includes the data regardless
        let all = processor.build_read_modified_reply(&mut display, AidKey::Clear, true);
        assert!(all.len() > 3);
    }

    #[test]
    fn test_read_buffer_reply_round_trip() {
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor
            .process_record(&write_record(&[0xC1, 0xC2, 0xC3]), &mut display)
            .unwrap();

        let reply = processor.build_read_buffer_reply(&display, AidKey::Enter);
        assert_eq!(reply[0], AID_ENTER);
        assert_eq!(reply.len(), 3 + display.buffer_size());
        assert_eq!(&reply[3..6], &[0xC1, 0xC2, 0xC3]);
    }

    #[test]
    fn test_lenient_mode_passes_unknown_bytes_as_data() {
        // 0x3F is not an order; in lenient mode it lands in the buffer
        let record = write_record(&[0x3F]);
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
        assert_eq!(display.char_at(0), Some(0x3F));
    }

    #[test]
    fn test_wcc_alarm_and_print() {
        let record = vec![CMD_WRITE, WCC_ALARM | WCC_START_PRINT];
        let mut processor = ProtocolProcessor3270::new();
        let mut display = Display3270::new();
        processor.process_record(&record, &mut display).unwrap();
        assert!(display.is_alarm());
        assert!(processor.take_start_print());
        assert!(!processor.take_start_print());
    }
}
