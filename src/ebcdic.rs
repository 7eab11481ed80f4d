//! EBCDIC character translation
//!
//! Bidirectional EBCDIC <-> Unicode translation for 3270 data streams. The
//! forward table implements CP037 (EBCDIC US/Canada), the code page IBM
//! mainframes default to; the inverse table is derived from it at first use
//! and shared process-wide.
//!
//! A compatibility dial selects the substitution byte for characters the
//! code page cannot express: the default profile substitutes EBCDIC space
//! (0x40), the p3270-compatible profile substitutes 0x7A, matching that
//! client's historical behavior. Encoding never fails; every unmappable
//! character becomes exactly one fallback byte.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// EBCDIC to Unicode translation table (CP037)
///
/// Maps all 256 EBCDIC code points to their Unicode equivalents per the IBM
/// Code Page 37 specification.
const EBCDIC_CP037: [char; 256] = [
    // 0x00-0x0F: control characters
    '\x00', '\x01', '\x02', '\x03', '\u{009C}', '\t', '\u{0086}', '\x7F',
    '\u{0097}', '\u{008D}', '\u{008E}', '\x0B', '\x0C', '\r', '\x0E', '\x0F',
    // 0x10-0x1F: control characters
    '\x10', '\x11', '\x12', '\x13', '\u{009D}', '\u{0085}', '\x08', '\u{0087}',
    '\x18', '\x19', '\u{0092}', '\u{008F}', '\x1C', '\x1D', '\x1E', '\x1F',
    // 0x20-0x2F: control characters
    '\u{0080}', '\u{0081}', '\u{0082}', '\u{0083}', '\u{0084}', '\n', '\x17', '\x1B',
    '\u{0088}', '\u{0089}', '\u{008A}', '\u{008B}', '\u{008C}', '\x05', '\x06', '\x07',
    // 0x30-0x3F: control characters
    '\u{0090}', '\u{0091}', '\x16', '\u{0093}', '\u{0094}', '\u{0095}', '\u{0096}', '\x04',
    '\u{0098}', '\u{0099}', '\u{009A}', '\u{009B}', '\x14', '\x15', '\u{009E}', '\x1A',
    // 0x40-0x4F: space and specials
    ' ', '\u{00A0}', '\u{00E2}', '\u{00E4}', '\u{00E0}', '\u{00E1}', '\u{00E3}', '\u{00E5}',
    '\u{00E7}', '\u{00F1}', '\u{00A2}', '.', '<', '(', '+', '|',
    // 0x50-0x5F
    '&', '\u{00E9}', '\u{00EA}', '\u{00EB}', '\u{00E8}', '\u{00ED}', '\u{00EE}', '\u{00EF}',
    '\u{00EC}', '\u{00DF}', '!', '$', '*', ')', ';', '\u{00AC}',
    // 0x60-0x6F
    '-', '/', '\u{00C2}', '\u{00C4}', '\u{00C0}', '\u{00C1}', '\u{00C3}', '\u{00C5}',
    '\u{00C7}', '\u{00D1}', '\u{00A6}', ',', '%', '_', '>', '?',
    // 0x70-0x7F
    '\u{00F8}', '\u{00C9}', '\u{00CA}', '\u{00CB}', '\u{00C8}', '\u{00CD}', '\u{00CE}', '\u{00CF}',
    '\u{00CC}', '`', ':', '#', '@', '\'', '=', '"',
    // 0x80-0x8F
    '\u{00D8}', 'a', 'b', 'c', 'd', 'e', 'f', 'g',
    'h', 'i', '\u{00AB}', '\u{00BB}', '\u{00F0}', '\u{00FD}', '\u{00FE}', '\u{00B1}',
    // 0x90-0x9F
    '\u{00B0}', 'j', 'k', 'l', 'm', 'n', 'o', 'p',
    'q', 'r', '\u{00AA}', '\u{00BA}', '\u{00E6}', '\u{00B8}', '\u{00C6}', '\u{00A4}',
    // 0xA0-0xAF
    '\u{00B5}', '~', 's', 't', 'u', 'v', 'w', 'x',
    'y', 'z', '\u{00A1}', '\u{00BF}', '\u{00D0}', '\u{00DD}', '\u{00DE}', '\u{00AE}',
    // 0xB0-0xBF
    '^', '\u{00A3}', '\u{00A5}', '\u{00B7}', '\u{00A9}', '\u{00A7}', '\u{00B6}', '\u{00BC}',
    '\u{00BD}', '\u{00BE}', '[', ']', '\u{00AF}', '\u{00A8}', '\u{00B4}', '\u{00D7}',
    // 0xC0-0xCF
    '{', 'A', 'B', 'C', 'D', 'E', 'F', 'G',
    'H', 'I', '\u{00AD}', '\u{00F4}', '\u{00F6}', '\u{00F2}', '\u{00F3}', '\u{00F5}',
    // 0xD0-0xDF
    '}', 'J', 'K', 'L', 'M', 'N', 'O', 'P',
    'Q', 'R', '\u{00B9}', '\u{00FB}', '\u{00FC}', '\u{00F9}', '\u{00FA}', '\u{00FF}',
    // 0xE0-0xEF
    '\\', '\u{00F7}', 'S', 'T', 'U', 'V', 'W', 'X',
    'Y', 'Z', '\u{00B2}', '\u{00D4}', '\u{00D6}', '\u{00D2}', '\u{00D3}', '\u{00D5}',
    // 0xF0-0xFF
    '0', '1', '2', '3', '4', '5', '6', '7',
    '8', '9', '\u{00B3}', '\u{00DB}', '\u{00DC}', '\u{00D9}', '\u{00DA}', '\u{009F}',
];

/// Inverse table built by scanning the forward table once. The forward table
/// is a bijection over CP037, so first-occurrence insertion is exact.
static CP037_INVERSE: Lazy<HashMap<char, u8>> = Lazy::new(|| {
    let mut inverse = HashMap::with_capacity(256);
    for (byte, &ch) in EBCDIC_CP037.iter().enumerate() {
        inverse.entry(ch).or_insert(byte as u8);
    }
    inverse
});

/// Supported EBCDIC code pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodePage {
    /// CP037, EBCDIC US/Canada (the mainframe default)
    #[default]
    Cp037,
}

impl CodePage {
    /// Parse a code page name as it appears in configuration
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cp037" | "037" | "ibm037" | "ibm-037" => Some(Self::Cp037),
            _ => None,
        }
    }

    fn forward_table(self) -> &'static [char; 256] {
        match self {
            Self::Cp037 => &EBCDIC_CP037,
        }
    }

    fn inverse_table(self) -> &'static HashMap<char, u8> {
        match self {
            Self::Cp037 => &CP037_INVERSE,
        }
    }
}

/// Compatibility profile selecting the fallback byte for unmappable input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EbcdicCompat {
    /// Unmappable characters encode to EBCDIC space (0x40)
    #[default]
    Default,
    /// Unmappable characters encode to 0x7A, matching p3270
    P3270,
}

impl EbcdicCompat {
    /// The substitution byte for this profile
    pub fn fallback_byte(self) -> u8 {
        match self {
            Self::Default => 0x40,
            Self::P3270 => 0x7A,
        }
    }
}

/// EBCDIC codec with a configured code page and compatibility profile
///
/// The codec is cheap to copy; sessions hold one and hand references to the
/// display and printer layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ebcdic {
    code_page: CodePage,
    compat: EbcdicCompat,
}

impl Ebcdic {
    /// Create a codec for the given code page and compatibility profile
    pub fn new(code_page: CodePage, compat: EbcdicCompat) -> Self {
        Self { code_page, compat }
    }

    /// The configured code page
    pub fn code_page(&self) -> CodePage {
        self.code_page
    }

    /// The configured compatibility profile
    pub fn compat(&self) -> EbcdicCompat {
        self.compat
    }

    /// Decode a single EBCDIC byte to a character
    pub fn decode_byte(&self, byte: u8) -> char {
        self.code_page.forward_table()[byte as usize]
    }

    /// Encode a single character to an EBCDIC byte, substituting the
    /// profile's fallback byte when the code page has no mapping
    pub fn encode_char(&self, ch: char) -> u8 {
        match self.code_page.inverse_table().get(&ch) {
            Some(&byte) => byte,
            None => self.compat.fallback_byte(),
        }
    }

    /// Bulk decode: EBCDIC bytes to a String, returning the string and the
    /// number of bytes consumed (always the full slice)
    pub fn decode(&self, bytes: &[u8]) -> (String, usize) {
        let decoded = bytes.iter().map(|&b| self.decode_byte(b)).collect();
        (decoded, bytes.len())
    }

    /// Bulk encode: string to EBCDIC bytes, returning the bytes and the
    /// number of characters consumed (always the full string)
    ///
    /// Never fails; each unmappable character yields one fallback byte.
    pub fn encode(&self, s: &str) -> (Vec<u8>, usize) {
        let mut consumed = 0;
        let mut out = Vec::with_capacity(s.len());
        for ch in s.chars() {
            out.push(self.encode_char(ch));
            consumed += 1;
        }
        (out, consumed)
    }
}

/// Decode a single EBCDIC byte with the default CP037 codec
pub fn ebcdic_to_ascii(byte: u8) -> char {
    EBCDIC_CP037[byte as usize]
}

/// Encode a single character with the default CP037 codec
pub fn ascii_to_ebcdic(ch: char) -> u8 {
    Ebcdic::default().encode_char(ch)
}
