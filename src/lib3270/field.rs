//! Field attribute and field-list logic for 3270
//!
//! 3270 screens are carved into fields by field-attribute bytes the host
//! writes into the buffer. The field list here is derived, never
//! authoritative: [`FieldManager::rebuild`] rescans the cell grid and
//! produces the canonical ordered list, caching each field's content range
//! and bytes. The modified-data-tag lives in the attribute byte stored in
//! the cell, so the grid itself is always the source of truth.

use super::codes::*;
use super::display::BufferCell;

/// Decoded basic field attribute plus any extended attributes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldAttribute {
    /// Raw attribute byte (SF operand)
    pub base: u8,
    /// Extended attributes (from SFE), inherited by the field's cells
    pub extended: ExtendedAttributes,
}

impl FieldAttribute {
    /// Create from a bare attribute byte
    pub fn new(base: u8) -> Self {
        Self { base, extended: ExtendedAttributes::default() }
    }

    /// Create with extended attributes
    pub fn with_extended(base: u8, extended: ExtendedAttributes) -> Self {
        Self { base, extended }
    }

    /// Check if the field is protected
    pub fn is_protected(&self) -> bool {
        (self.base & ATTR_PROTECTED) != 0
    }

    /// Check if the field is numeric-only
    pub fn is_numeric(&self) -> bool {
        (self.base & ATTR_NUMERIC) != 0
    }

    /// Check if the field is non-display
    pub fn is_hidden(&self) -> bool {
        (self.base & ATTR_DISPLAY) == DISPLAY_HIDDEN
    }

    /// Check if the field is intensified
    pub fn is_intensified(&self) -> bool {
        (self.base & ATTR_DISPLAY) == DISPLAY_INTENSIFIED
    }

    /// Check if the Modified Data Tag is set
    pub fn is_modified(&self) -> bool {
        (self.base & ATTR_MDT) != 0
    }

    /// Set or clear the Modified Data Tag on the raw byte
    pub fn set_modified(&mut self, modified: bool) {
        if modified {
            self.base |= ATTR_MDT;
        } else {
            self.base &= !ATTR_MDT;
        }
    }

    /// Validate content bytes against the field's constraints
    pub fn validate_content(&self, content: &[u8], field_len: usize) -> Result<(), String> {
        if let Some(validation) = self.extended.validation {
            if (validation & VALIDATION_MANDATORY_FILL) != 0 {
                let filled = content.len() >= field_len
                    && content.iter().all(|&ch| ch != EBCDIC_NUL && ch != EBCDIC_SPACE);
                if !filled {
                    return Err("mandatory fill: field must be completely filled".to_string());
                }
            }
            if (validation & VALIDATION_MANDATORY_ENTRY) != 0 {
                let has_content = content
                    .iter()
                    .any(|&ch| ch != EBCDIC_NUL && ch != EBCDIC_SPACE);
                if !has_content {
                    return Err("mandatory entry: field requires at least one character".to_string());
                }
            }
        }
        if self.is_numeric() {
            for &ch in content {
                // EBCDIC digits are 0xF0-0xF9
                if ch != EBCDIC_NUL && ch != EBCDIC_SPACE && !(0xF0..=0xF9).contains(&ch) {
                    return Err("numeric field: only digits allowed".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Extended field attributes set by the SFE order or inherited per cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedAttributes {
    pub highlighting: Option<u8>,
    pub foreground_color: Option<u8>,
    pub background_color: Option<u8>,
    pub charset: Option<u8>,
    pub validation: Option<u8>,
    pub outlining: Option<u8>,
    pub transparency: Option<u8>,
}

impl ExtendedAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one (type, value) pair as carried by SFE and SA orders.
    /// Unknown types are ignored; returns whether the type was recognized.
    pub fn apply(&mut self, attr_type: u8, value: u8) -> bool {
        match attr_type {
            XA_HIGHLIGHTING => self.highlighting = Some(value),
            XA_FOREGROUND => self.foreground_color = Some(value),
            XA_BACKGROUND => self.background_color = Some(value),
            XA_CHARSET => self.charset = Some(value),
            XA_VALIDATION => self.validation = Some(value),
            XA_OUTLINING => self.outlining = Some(value),
            XA_TRANSPARENCY => self.transparency = Some(value),
            _ => return false,
        }
        true
    }

    /// True when no attribute is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_highlighting(mut self, highlighting: u8) -> Self {
        self.highlighting = Some(highlighting);
        self
    }

    pub fn with_foreground(mut self, color: u8) -> Self {
        self.foreground_color = Some(color);
        self
    }

    pub fn with_validation(mut self, validation: u8) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// One derived field: a half-open range on the linearized buffer
///
/// `start` addresses the attribute byte (which renders as a space); content
/// occupies `[content_start, end)`. For the implicit field of an unformatted
/// buffer, `start == content_start == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenField {
    /// Linear position of the field-start attribute byte
    pub start: usize,
    /// First content position (start + 1, or 0 for the implicit field)
    pub content_start: usize,
    /// Exclusive end: the next field start, or the buffer length
    pub end: usize,
    /// Whether this is the implicit field of an unformatted buffer
    pub implicit: bool,
    /// Decoded attributes at the field start
    pub attribute: FieldAttribute,
    /// Cached content bytes, `[content_start, end)`
    pub content: Vec<u8>,
}

impl ScreenField {
    /// Content length in cells
    pub fn content_len(&self) -> usize {
        self.end.saturating_sub(self.content_start)
    }

    /// Whether the linear position falls inside this field's range,
    /// attribute byte included
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end
    }
}

/// Derived field list over a screen buffer
#[derive(Debug, Default)]
pub struct FieldManager {
    fields: Vec<ScreenField>,
}

impl FieldManager {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Rescan the cell grid and rebuild the canonical field list.
    ///
    /// Walks positions 0..N-1; a cell flagged as a field attribute closes
    /// any open field and opens a new one. A buffer with no attribute bytes
    /// yields one implicit unprotected field spanning everything.
    pub fn rebuild(&mut self, cells: &[BufferCell], extended_at: impl Fn(usize) -> ExtendedAttributes) {
        self.fields.clear();
        let n = cells.len();

        let mut starts: Vec<usize> = Vec::new();
        for (pos, cell) in cells.iter().enumerate() {
            if cell.is_field_attr {
                starts.push(pos);
            }
        }

        if starts.is_empty() {
            if n > 0 {
                self.fields.push(ScreenField {
                    start: 0,
                    content_start: 0,
                    end: n,
                    implicit: true,
                    attribute: FieldAttribute::default(),
                    content: cells.iter().map(|c| c.data).collect(),
                });
            }
            return;
        }

        for (i, &start) in starts.iter().enumerate() {
            let end = if i + 1 < starts.len() { starts[i + 1] } else { n };
            let content_start = (start + 1).min(end);
            let content = cells[content_start..end].iter().map(|c| c.data).collect();
            self.fields.push(ScreenField {
                start,
                content_start,
                end,
                implicit: false,
                attribute: FieldAttribute::with_extended(cells[start].data, extended_at(start)),
                content,
            });
        }
    }

    /// Clear the field list
    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// The ordered field list
    pub fn fields(&self) -> &[ScreenField] {
        &self.fields
    }

    /// The field containing a linear position, if any
    pub fn field_at(&self, pos: usize) -> Option<&ScreenField> {
        self.fields.iter().find(|f| f.contains(pos))
    }

    /// The first unprotected field whose content starts strictly after the
    /// given position, wrapping past the end of the buffer
    pub fn next_unprotected_after(&self, pos: usize) -> Option<&ScreenField> {
        let candidates = || self.fields.iter().filter(|f| !f.implicit && !f.attribute.is_protected());
        candidates()
            .find(|f| f.content_start > pos)
            .or_else(|| candidates().next())
    }

    /// The last unprotected field whose content starts strictly before the
    /// given position, wrapping to the end of the buffer
    pub fn prev_unprotected_before(&self, pos: usize) -> Option<&ScreenField> {
        let candidates = || self.fields.iter().filter(|f| !f.implicit && !f.attribute.is_protected());
        candidates()
            .filter(|f| f.content_start < pos)
            .last()
            .or_else(|| candidates().last())
    }

    /// Fields with the Modified Data Tag set, in buffer order
    pub fn modified_fields(&self) -> Vec<&ScreenField> {
        self.fields
            .iter()
            .filter(|f| !f.implicit && f.attribute.is_modified())
            .collect()
    }
}

/// Parse a base field attribute byte into its components
pub fn parse_base_attribute(attr_byte: u8) -> FieldAttributeInfo {
    FieldAttributeInfo {
        protected: (attr_byte & ATTR_PROTECTED) != 0,
        numeric: (attr_byte & ATTR_NUMERIC) != 0,
        display: attr_byte & ATTR_DISPLAY,
        modified: (attr_byte & ATTR_MDT) != 0,
    }
}

/// Basic attribute bits unpacked for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAttributeInfo {
    pub protected: bool,
    pub numeric: bool,
    pub display: u8,
    pub modified: bool,
}

impl FieldAttributeInfo {
    pub fn is_hidden(&self) -> bool {
        self.display == DISPLAY_HIDDEN
    }

    pub fn is_intensified(&self) -> bool {
        self.display == DISPLAY_INTENSIFIED
    }
}
