//! TN3270 display buffer management
//!
//! The screen buffer is a rectangular grid of character cells with basic and
//! extended attribute planes, a cursor, and the derived field list. Standard
//! model sizes are provided, but the grid is parametric: any positive
//! (rows, cols) works, and a BIND-IMAGE from the host can install alternate
//! dimensions that Erase/Write Alternate switches to.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::codes::{ATTR_MDT, EBCDIC_NUL, EBCDIC_SPACE};
use super::field::{ExtendedAttributes, FieldManager, ScreenField};
use crate::ebcdic::Ebcdic;
use crate::error::ParseError;

/// Glyph used for the cursor cell when rendering with the cursor shown
const CURSOR_GLYPH: char = '\u{2588}';

/// Standard 3270 screen sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenSize {
    /// Model 2: 24 rows x 80 columns
    Model2,
    /// Model 3: 32 rows x 80 columns
    Model3,
    /// Model 4: 43 rows x 80 columns
    Model4,
    /// Model 5: 27 rows x 132 columns
    Model5,
}

impl ScreenSize {
    pub fn rows(&self) -> usize {
        match self {
            Self::Model2 => 24,
            Self::Model3 => 32,
            Self::Model4 => 43,
            Self::Model5 => 27,
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            Self::Model2 => 80,
            Self::Model3 => 80,
            Self::Model4 => 80,
            Self::Model5 => 132,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.rows() * self.cols()
    }
}

/// One cell of the display buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCell {
    /// EBCDIC character data, or the raw attribute byte for field starts
    pub data: u8,
    /// Whether this cell holds a field-start attribute byte
    pub is_field_attr: bool,
}

impl BufferCell {
    /// A cell holding EBCDIC space
    pub fn space() -> Self {
        Self { data: EBCDIC_SPACE, is_field_attr: false }
    }

    /// A cell holding EBCDIC NUL (unset)
    pub fn nul() -> Self {
        Self { data: EBCDIC_NUL, is_field_attr: false }
    }

    /// A field-start cell carrying the given attribute byte
    pub fn field_attr(byte: u8) -> Self {
        Self { data: byte, is_field_attr: true }
    }
}

impl Default for BufferCell {
    fn default() -> Self {
        Self::space()
    }
}

/// 3270 display buffer
///
/// Owns the character grid, the sparse extended-attribute plane, the cursor,
/// the derived field list, and the keyboard-lock/alarm indicators the host
/// drives through WCC bits.
#[derive(Debug)]
pub struct Display3270 {
    rows: usize,
    cols: usize,
    cells: Vec<BufferCell>,
    /// Sparse per-cell extended attributes; absence inherits from the field
    extended: HashMap<usize, ExtendedAttributes>,
    /// Cursor as a linear buffer position, always < rows * cols
    cursor: usize,
    field_manager: FieldManager,
    /// Alternate dimensions declared by a BIND-IMAGE
    alternate: Option<(usize, usize)>,
    codec: Ebcdic,
    keyboard_locked: bool,
    alarm: bool,
}

impl Display3270 {
    /// Create a Model 2 (24x80) display with the default codec
    pub fn new() -> Self {
        Self::with_dimensions(24, 80)
    }

    /// Create a display for a standard model size
    pub fn with_size(size: ScreenSize) -> Self {
        Self::with_dimensions(size.rows(), size.cols())
    }

    /// Create a display with arbitrary positive dimensions
    pub fn with_dimensions(rows: usize, cols: usize) -> Self {
        assert!(rows > 0 && cols > 0, "display dimensions must be positive");
        Self {
            rows,
            cols,
            cells: vec![BufferCell::space(); rows * cols],
            extended: HashMap::new(),
            cursor: 0,
            field_manager: FieldManager::new(),
            alternate: None,
            codec: Ebcdic::default(),
            keyboard_locked: true,
            alarm: false,
        }
    }

    /// Replace the codec used for rendering
    pub fn set_codec(&mut self, codec: Ebcdic) {
        self.codec = codec;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn buffer_size(&self) -> usize {
        self.rows * self.cols
    }

    /// Raw cell plane, for field derivation and rendering
    pub fn cells(&self) -> &[BufferCell] {
        &self.cells
    }

    /// Linear position for (row, col)
    pub fn position_of(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// (row, col) for a linear position
    pub fn coords_of(&self, pos: usize) -> (usize, usize) {
        (pos / self.cols, pos % self.cols)
    }

    /// Reset every cell to EBCDIC space, clear attribute planes and fields,
    /// home the cursor
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = BufferCell::space();
        }
        self.extended.clear();
        self.field_manager.clear();
        self.cursor = 0;
    }

    /// Record alternate dimensions from a BIND-IMAGE
    pub fn set_alternate_dimensions(&mut self, rows: usize, cols: usize) {
        if rows > 0 && cols > 0 {
            self.alternate = Some((rows, cols));
        }
    }

    /// The alternate dimensions, if a BIND-IMAGE declared any
    pub fn alternate_dimensions(&self) -> Option<(usize, usize)> {
        self.alternate
    }

    /// Switch to the alternate dimensions (Erase/Write Alternate). Without a
    /// BIND-IMAGE the current dimensions are kept. Always clears.
    pub fn switch_to_alternate(&mut self) {
        if let Some((rows, cols)) = self.alternate {
            self.rows = rows;
            self.cols = cols;
            self.cells = vec![BufferCell::space(); rows * cols];
            self.extended.clear();
            self.field_manager.clear();
            self.cursor = 0;
        } else {
            self.clear();
        }
    }

    /// Current cursor as a linear position
    pub fn cursor_address(&self) -> usize {
        self.cursor
    }

    /// Current cursor as (row, col)
    pub fn cursor_position(&self) -> (usize, usize) {
        self.coords_of(self.cursor)
    }

    /// Move the cursor to a linear position, wrapping modulo the buffer
    pub fn set_cursor(&mut self, pos: usize) {
        self.cursor = pos % self.buffer_size();
    }

    /// Move the cursor to (row, col). In strict mode out-of-bounds
    /// coordinates fail; otherwise they are clamped to the edges.
    pub fn set_position(&mut self, row: usize, col: usize, strict: bool) -> Result<(), ParseError> {
        if row >= self.rows || col >= self.cols {
            if strict {
                return Err(ParseError::BadAddress {
                    address: (row * self.cols + col).min(u16::MAX as usize) as u16,
                    buffer_size: self.buffer_size(),
                });
            }
            let row = row.min(self.rows - 1);
            let col = col.min(self.cols - 1);
            self.cursor = self.position_of(row, col);
            return Ok(());
        }
        self.cursor = self.position_of(row, col);
        Ok(())
    }

    /// Write one byte at the cursor and advance with wrapping. The extended
    /// attribute plane is left alone; SA-set attributes cover data written
    /// at the decorated cell.
    pub fn write_char(&mut self, byte: u8) {
        let pos = self.cursor;
        self.cells[pos] = BufferCell { data: byte, is_field_attr: false };
        self.cursor = (pos + 1) % self.buffer_size();
    }

    /// Write one byte at an explicit (row, col) without moving the cursor
    pub fn write_char_at(&mut self, row: usize, col: usize, byte: u8) -> Result<(), ParseError> {
        if row >= self.rows || col >= self.cols {
            return Err(ParseError::BadAddress {
                address: (row * self.cols + col).min(u16::MAX as usize) as u16,
                buffer_size: self.buffer_size(),
            });
        }
        let pos = self.position_of(row, col);
        self.cells[pos] = BufferCell { data: byte, is_field_attr: false };
        Ok(())
    }

    /// Write a byte carrying an alternate character set (Graphic Escape);
    /// the set is recorded in the cell's extended attributes
    pub fn write_char_ge(&mut self, byte: u8, charset: u8) {
        let pos = self.cursor;
        self.cells[pos] = BufferCell { data: byte, is_field_attr: false };
        self.extended.entry(pos).or_default().charset = Some(charset);
        self.cursor = (pos + 1) % self.buffer_size();
    }

    /// Read the byte at a linear position
    pub fn char_at(&self, pos: usize) -> Option<u8> {
        self.cells.get(pos).map(|c| c.data)
    }

    /// Write a field-start attribute byte at the cursor and advance.
    /// This is what creates a field.
    pub fn set_attribute(&mut self, attr_byte: u8) {
        let pos = self.cursor;
        self.cells[pos] = BufferCell::field_attr(attr_byte);
        self.cursor = (pos + 1) % self.buffer_size();
    }

    /// Write a field-start attribute byte at an explicit position
    pub fn set_attribute_at(&mut self, pos: usize, attr_byte: u8) -> Result<(), ParseError> {
        if pos >= self.buffer_size() {
            return Err(ParseError::BadAddress {
                address: pos.min(u16::MAX as usize) as u16,
                buffer_size: self.buffer_size(),
            });
        }
        self.cells[pos] = BufferCell::field_attr(attr_byte);
        Ok(())
    }

    /// Update the sparse extended-attribute plane at (row, col)
    pub fn set_extended_attribute(
        &mut self,
        row: usize,
        col: usize,
        kind: u8,
        value: u8,
    ) -> Result<(), ParseError> {
        if row >= self.rows || col >= self.cols {
            return Err(ParseError::BadAddress {
                address: (row * self.cols + col).min(u16::MAX as usize) as u16,
                buffer_size: self.buffer_size(),
            });
        }
        let pos = self.position_of(row, col);
        self.extended.entry(pos).or_default().apply(kind, value);
        Ok(())
    }

    /// Extended attributes stored at a position, if any
    pub fn extended_attribute_at(&self, pos: usize) -> Option<&ExtendedAttributes> {
        self.extended.get(&pos)
    }

    /// Attach extended attributes to a field-start position (SFE order)
    pub fn set_field_extended(&mut self, pos: usize, attrs: ExtendedAttributes) {
        if !attrs.is_empty() {
            self.extended.insert(pos, attrs);
        }
    }

    /// Rescan the buffer and return the canonical ordered field list
    pub fn detect_fields(&mut self) -> &[ScreenField] {
        let extended = &self.extended;
        self.field_manager.rebuild(&self.cells, |pos| {
            extended.get(&pos).copied().unwrap_or_default()
        });
        self.field_manager.fields()
    }

    /// The field list as of the last detection pass
    pub fn fields(&self) -> &[ScreenField] {
        self.field_manager.fields()
    }

    /// (content-start, content-bytes) for every field whose MDT is set
    pub fn read_modified(&mut self) -> Vec<(usize, Vec<u8>)> {
        self.detect_fields();
        self.field_manager
            .modified_fields()
            .into_iter()
            .map(|f| (f.content_start, f.content.clone()))
            .collect()
    }

    /// Set or clear the MDT bit on the field containing a position.
    /// The bit lives in the attribute cell; unformatted buffers have
    /// nowhere to store it and are left unchanged.
    pub fn set_mdt_at(&mut self, pos: usize, modified: bool) {
        let pos = pos % self.buffer_size();
        // Walk backward (wrapping) to the owning attribute byte
        for offset in 0..self.buffer_size() {
            let probe = (pos + self.buffer_size() - offset) % self.buffer_size();
            if self.cells[probe].is_field_attr {
                if modified {
                    self.cells[probe].data |= ATTR_MDT;
                } else {
                    self.cells[probe].data &= !ATTR_MDT;
                }
                return;
            }
        }
    }

    /// Clear the MDT bit on every field-attribute cell
    pub fn reset_all_mdt(&mut self) {
        for cell in &mut self.cells {
            if cell.is_field_attr {
                cell.data &= !ATTR_MDT;
            }
        }
    }

    /// Whether the position lies in a protected field. The leading region of
    /// a formatted buffer (before the first attribute byte) is treated as
    /// protected; an unformatted buffer is unprotected everywhere.
    pub fn is_protected_at(&mut self, pos: usize) -> bool {
        self.detect_fields();
        match self.field_manager.field_at(pos) {
            Some(field) => field.attribute.is_protected(),
            None => !self.field_manager.fields().iter().all(|f| f.implicit),
        }
    }

    /// Erase All Unprotected: clear unprotected cells to NUL, reset their
    /// MDT bits, and home the cursor. Unformatted buffers clear entirely.
    pub fn erase_all_unprotected(&mut self) {
        self.detect_fields();
        let ranges: Vec<(usize, usize, bool)> = self
            .field_manager
            .fields()
            .iter()
            .filter(|f| !f.attribute.is_protected())
            .map(|f| (f.content_start, f.end, f.implicit))
            .collect();
        for (start, end, _) in &ranges {
            for pos in *start..*end {
                if !self.cells[pos].is_field_attr {
                    self.cells[pos].data = EBCDIC_NUL;
                }
            }
        }
        for (start, _, implicit) in &ranges {
            if !implicit {
                self.set_mdt_at(*start, false);
            }
        }
        self.cursor = 0;
    }

    /// Program Tab: advance to the first character position of the next
    /// unprotected field, clearing intervening unprotected cells to NUL
    pub fn program_tab(&mut self) {
        self.detect_fields();
        let target = match self.field_manager.next_unprotected_after(self.cursor) {
            Some(field) => field.content_start,
            None => return,
        };
        let mut pos = self.cursor;
        while pos != target {
            if !self.cells[pos].is_field_attr && !self.is_protected_cell(pos) {
                self.cells[pos].data = EBCDIC_NUL;
            }
            pos = (pos + 1) % self.buffer_size();
        }
        self.cursor = target;
    }

    fn is_protected_cell(&self, pos: usize) -> bool {
        match self.field_manager.field_at(pos) {
            Some(field) => field.attribute.is_protected(),
            None => false,
        }
    }

    /// Repeat to Address: fill from the cursor up to (not including) the
    /// target with one character, honoring buffer wrap. A target equal to
    /// the cursor fills the entire buffer. The cursor ends at the target.
    pub fn repeat_to_address(&mut self, byte: u8, target: usize) -> Result<(), ParseError> {
        let size = self.buffer_size();
        if target >= size {
            return Err(ParseError::BadAddress {
                address: target.min(u16::MAX as usize) as u16,
                buffer_size: size,
            });
        }
        let count = if target == self.cursor {
            size
        } else {
            (target + size - self.cursor) % size
        };
        let mut pos = self.cursor;
        for _ in 0..count {
            self.cells[pos] = BufferCell { data: byte, is_field_attr: false };
            pos = (pos + 1) % size;
        }
        self.cursor = target;
        Ok(())
    }

    /// Erase Unprotected to Address: clear unprotected, non-attribute cells
    /// from the cursor up to (not including) the target, honoring wrap
    pub fn erase_unprotected_to_address(&mut self, target: usize) -> Result<(), ParseError> {
        let size = self.buffer_size();
        if target >= size {
            return Err(ParseError::BadAddress {
                address: target.min(u16::MAX as usize) as u16,
                buffer_size: size,
            });
        }
        self.detect_fields();
        let count = if target == self.cursor {
            size
        } else {
            (target + size - self.cursor) % size
        };
        let mut pos = self.cursor;
        for _ in 0..count {
            if !self.cells[pos].is_field_attr && !self.is_protected_cell(pos) {
                self.cells[pos].data = EBCDIC_NUL;
            }
            pos = (pos + 1) % size;
        }
        self.cursor = target;
        Ok(())
    }

    /// The entire character plane as raw bytes (Read Buffer replies)
    pub fn buffer_data(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.data).collect()
    }

    /// Render the buffer as a newline-separated Unicode string. Attribute
    /// bytes render as spaces; NUL renders as space. The cursor cell renders
    /// as a block glyph only when `show_cursor` is set.
    pub fn ascii_buffer(&self, show_cursor: bool) -> String {
        let mut out = String::with_capacity(self.buffer_size() + self.rows);
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 && i % self.cols == 0 {
                out.push('\n');
            }
            if show_cursor && i == self.cursor {
                out.push(CURSOR_GLYPH);
            } else if cell.is_field_attr || cell.data == EBCDIC_NUL {
                out.push(' ');
            } else {
                out.push(self.codec.decode_byte(cell.data));
            }
        }
        out
    }

    /// One rendered row, if in range
    pub fn row_text(&self, row: usize) -> Option<String> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.cols;
        let mut out = String::with_capacity(self.cols);
        for cell in &self.cells[start..start + self.cols] {
            if cell.is_field_attr || cell.data == EBCDIC_NUL {
                out.push(' ');
            } else {
                out.push(self.codec.decode_byte(cell.data));
            }
        }
        Some(out)
    }

    pub fn lock_keyboard(&mut self) {
        self.keyboard_locked = true;
    }

    pub fn unlock_keyboard(&mut self) {
        self.keyboard_locked = false;
    }

    pub fn is_keyboard_locked(&self) -> bool {
        self.keyboard_locked
    }

    pub fn set_alarm(&mut self, alarm: bool) {
        self.alarm = alarm;
    }

    pub fn is_alarm(&self) -> bool {
        self.alarm
    }
}

impl Default for Display3270 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Display3270 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ascii_buffer(false))
    }
}

/// Buffer addressing for the 3270 data stream
///
/// The host chooses between two encodings and the client honors it. 12-bit
/// addresses split into two 6-bit values each or-ed with 0x40; 14-bit
/// addresses put the low 6 bits of the address's high byte in byte one and
/// the low byte verbatim in byte two. The top two bits of the first byte
/// distinguish the forms: 00 means 14-bit, anything else 12-bit.
pub mod addressing {
    /// Detected encoding of an inbound buffer address
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum AddressMode {
        #[default]
        TwelveBit,
        FourteenBit,
    }

    /// Decode a 12-bit buffer address from two bytes
    pub fn decode_12bit(byte1: u8, byte2: u8) -> u16 {
        (((byte1 & 0x3F) as u16) << 6) | ((byte2 & 0x3F) as u16)
    }

    /// Decode a 14-bit buffer address from two bytes
    pub fn decode_14bit(byte1: u8, byte2: u8) -> u16 {
        (((byte1 & 0x3F) as u16) << 8) | byte2 as u16
    }

    /// Encode a 12-bit buffer address into two bytes
    pub fn encode_12bit(address: u16) -> (u8, u8) {
        (0x40 | ((address >> 6) & 0x3F) as u8, 0x40 | (address & 0x3F) as u8)
    }

    /// Encode a 14-bit buffer address into two bytes
    pub fn encode_14bit(address: u16) -> (u8, u8) {
        (((address >> 8) & 0x3F) as u8, (address & 0xFF) as u8)
    }

    /// Decode an address, auto-detecting the encoding from the top two bits
    /// of the first byte
    pub fn decode_auto(byte1: u8, byte2: u8) -> (u16, AddressMode) {
        if byte1 & 0xC0 == 0 {
            (decode_14bit(byte1, byte2), AddressMode::FourteenBit)
        } else {
            (decode_12bit(byte1, byte2), AddressMode::TwelveBit)
        }
    }

    /// Encode with an explicit mode, matching the inbound convention
    pub fn encode(address: u16, mode: AddressMode) -> (u8, u8) {
        match mode {
            AddressMode::TwelveBit => encode_12bit(address),
            AddressMode::FourteenBit => encode_14bit(address),
        }
    }
}
