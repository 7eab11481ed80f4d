//! Key actions for 3270 sessions
//!
//! Translates the closed set of operator action names into either an AID
//! (which the session turns into a read-modified reply) or a local buffer
//! mutation (cursor movement, character erasure, field tabbing). Local
//! mutations raise the MDT bit on the fields they touch.

use crate::ebcdic::Ebcdic;
use crate::lib3270::codes::{AidKey, EBCDIC_NUL};
use crate::lib3270::display::Display3270;

/// The closed set of key actions accepted by `send_key`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Enter,
    Clear,
    /// PF1..PF24
    PF(u8),
    /// PA1..PA3
    PA(u8),
    SysReq,
    Tab,
    BackTab,
    Home,
    NewLine,
    Up,
    Down,
    Left,
    Right,
    Erase,
    EraseEOF,
    EraseInput,
    Insert,
    Delete,
}

impl KeyAction {
    /// Parse an action name ("Enter", "PF7", "PA2", "EraseEOF", ...)
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(rest) = name.strip_prefix("PF") {
            let n: u8 = rest.parse().ok()?;
            return if (1..=24).contains(&n) { Some(Self::PF(n)) } else { None };
        }
        if let Some(rest) = name.strip_prefix("PA") {
            let n: u8 = rest.parse().ok()?;
            return if (1..=3).contains(&n) { Some(Self::PA(n)) } else { None };
        }
        match name {
            "Enter" => Some(Self::Enter),
            "Clear" => Some(Self::Clear),
            "SysReq" => Some(Self::SysReq),
            "Tab" => Some(Self::Tab),
            "BackTab" => Some(Self::BackTab),
            "Home" => Some(Self::Home),
            "NewLine" => Some(Self::NewLine),
            "Up" => Some(Self::Up),
            "Down" => Some(Self::Down),
            "Left" => Some(Self::Left),
            "Right" => Some(Self::Right),
            "Erase" => Some(Self::Erase),
            "EraseEOF" => Some(Self::EraseEOF),
            "EraseInput" => Some(Self::EraseInput),
            "Insert" => Some(Self::Insert),
            "Delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// The AID this action transmits, if it is an AID action
    pub fn aid(&self) -> Option<AidKey> {
        match self {
            Self::Enter => Some(AidKey::Enter),
            Self::Clear => Some(AidKey::Clear),
            Self::SysReq => Some(AidKey::SysReq),
            Self::PF(n) => AidKey::pf(*n),
            Self::PA(n) => match n {
                1 => Some(AidKey::PA1),
                2 => Some(AidKey::PA2),
                3 => Some(AidKey::PA3),
                _ => None,
            },
            _ => None,
        }
    }
}

/// The result of applying a key action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The action produces an outbound AID record
    Aid(AidKey),
    /// The action mutated the buffer locally
    Local,
}

/// Local keyboard state: insert mode plus the action dispatch
#[derive(Debug, Default)]
pub struct Keyboard {
    insert_mode: bool,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_mode(&self) -> bool {
        self.insert_mode
    }

    /// Apply one action to the display. AID actions do not touch the
    /// buffer; everything else mutates it locally.
    pub fn apply(&mut self, action: KeyAction, display: &mut Display3270) -> KeyOutcome {
        if let Some(aid) = action.aid() {
            return KeyOutcome::Aid(aid);
        }
        match action {
            KeyAction::Tab => self.tab(display),
            KeyAction::BackTab => self.back_tab(display),
            KeyAction::Home => self.home(display),
            KeyAction::NewLine => self.new_line(display),
            KeyAction::Up => self.move_cursor(display, -1, 0),
            KeyAction::Down => self.move_cursor(display, 1, 0),
            KeyAction::Left => self.move_cursor(display, 0, -1),
            KeyAction::Right => self.move_cursor(display, 0, 1),
            KeyAction::Erase => self.erase(display),
            KeyAction::EraseEOF => self.erase_eof(display),
            KeyAction::EraseInput => self.erase_input(display),
            KeyAction::Insert => {
                self.insert_mode = !self.insert_mode;
            }
            KeyAction::Delete => self.delete(display),
            _ => {}
        }
        KeyOutcome::Local
    }

    /// Type one character at the cursor. Protected cells refuse input;
    /// unprotected writes raise MDT and advance the cursor. Insert mode
    /// shifts the remainder of the field right first.
    pub fn type_char(&mut self, ch: char, codec: &Ebcdic, display: &mut Display3270) -> bool {
        let pos = display.cursor_address();
        if display.is_protected_at(pos) || display.cells()[pos].is_field_attr {
            return false;
        }
        if self.insert_mode {
            self.shift_field_right(display, pos);
        }
        display.write_char(codec.encode_char(ch));
        display.set_mdt_at(pos, true);
        true
    }

    /// Type a string; stops at the first refused character
    pub fn type_text(&mut self, text: &str, codec: &Ebcdic, display: &mut Display3270) -> usize {
        let mut typed = 0;
        for ch in text.chars() {
            if !self.type_char(ch, codec, display) {
                break;
            }
            typed += 1;
        }
        typed
    }

    fn tab(&self, display: &mut Display3270) {
        display.detect_fields();
        let target = display
            .fields()
            .iter()
            .filter(|f| !f.implicit && !f.attribute.is_protected())
            .map(|f| f.content_start)
            .find(|&start| start > display.cursor_address())
            .or_else(|| {
                display
                    .fields()
                    .iter()
                    .filter(|f| !f.implicit && !f.attribute.is_protected())
                    .map(|f| f.content_start)
                    .next()
            });
        if let Some(target) = target {
            display.set_cursor(target);
        }
    }

    fn back_tab(&self, display: &mut Display3270) {
        display.detect_fields();
        let cursor = display.cursor_address();
        let starts: Vec<usize> = display
            .fields()
            .iter()
            .filter(|f| !f.implicit && !f.attribute.is_protected())
            .map(|f| f.content_start)
            .collect();
        if starts.is_empty() {
            return;
        }
        let target = starts
            .iter()
            .rev()
            .find(|&&start| start < cursor)
            .or_else(|| starts.last())
            .copied();
        if let Some(target) = target {
            display.set_cursor(target);
        }
    }

    fn home(&self, display: &mut Display3270) {
        display.detect_fields();
        let target = display
            .fields()
            .iter()
            .find(|f| !f.implicit && !f.attribute.is_protected())
            .map(|f| f.content_start)
            .unwrap_or(0);
        display.set_cursor(target);
    }

    fn new_line(&self, display: &mut Display3270) {
        let (row, _) = display.cursor_position();
        let next_row = (row + 1) % display.rows();
        display.set_cursor(next_row * display.cols());
    }

    fn move_cursor(&self, display: &mut Display3270, drow: isize, dcol: isize) {
        let rows = display.rows() as isize;
        let cols = display.cols() as isize;
        let (row, col) = display.cursor_position();
        let row = (row as isize + drow).rem_euclid(rows) as usize;
        // Left past column 0 wraps to the end of the previous row
        let linear = row as isize * cols + col as isize + dcol;
        let size = rows * cols;
        display.set_cursor(linear.rem_euclid(size) as usize);
    }

    fn erase(&self, display: &mut Display3270) {
        let size = display.buffer_size();
        let pos = (display.cursor_address() + size - 1) % size;
        if display.is_protected_at(pos) || display.cells()[pos].is_field_attr {
            return;
        }
        display.set_cursor(pos);
        let (row, col) = display.coords_of(pos);
        let _ = display.write_char_at(row, col, EBCDIC_NUL);
        display.set_mdt_at(pos, true);
    }

    fn erase_eof(&self, display: &mut Display3270) {
        display.detect_fields();
        let cursor = display.cursor_address();
        let range = display
            .fields()
            .iter()
            .find(|f| f.contains(cursor) && !f.attribute.is_protected())
            .map(|f| (cursor.max(f.content_start), f.end));
        if let Some((start, end)) = range {
            for pos in start..end {
                let (row, col) = display.coords_of(pos);
                let _ = display.write_char_at(row, col, EBCDIC_NUL);
            }
            display.set_mdt_at(start, true);
        }
    }

    fn erase_input(&self, display: &mut Display3270) {
        // Clears every unprotected field and resets their MDT bits, then
        // homes the cursor to the first unprotected field
        display.erase_all_unprotected();
        self.home(display);
    }

    fn delete(&self, display: &mut Display3270) {
        display.detect_fields();
        let cursor = display.cursor_address();
        let range = display
            .fields()
            .iter()
            .find(|f| f.contains(cursor) && !f.attribute.is_protected())
            .map(|f| (f.content_start, f.end));
        let Some((_, end)) = range else { return };
        for pos in cursor..end.saturating_sub(1) {
            let next = display.char_at(pos + 1).unwrap_or(EBCDIC_NUL);
            let (row, col) = display.coords_of(pos);
            let _ = display.write_char_at(row, col, next);
        }
        if end > cursor {
            let (row, col) = display.coords_of(end - 1);
            let _ = display.write_char_at(row, col, EBCDIC_NUL);
        }
        display.set_mdt_at(cursor, true);
    }

    fn shift_field_right(&self, display: &mut Display3270, from: usize) {
        display.detect_fields();
        let range = display
            .fields()
            .iter()
            .find(|f| f.contains(from) && !f.attribute.is_protected())
            .map(|f| (f.content_start, f.end));
        let Some((_, end)) = range else { return };
        let mut pos = end.saturating_sub(1);
        while pos > from {
            let prev = display.char_at(pos - 1).unwrap_or(EBCDIC_NUL);
            let (row, col) = display.coords_of(pos);
            let _ = display.write_char_at(row, col, prev);
            pos -= 1;
        }
    }
}
