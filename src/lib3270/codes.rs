//! TN3270 protocol constants and codes
//!
//! Command codes, order codes, AID (Attention Identifier) keys, write control
//! character bits, and field attributes as specified in RFC 1576, RFC 2355,
//! and the IBM 3270 Data Stream Programmer's Reference (GA23-0059).
//!
//! Every 3270 command has two encodings on the wire: the original value and
//! the EBCDIC-range alias some hosts emit. Both are accepted by
//! [`CommandCode::from_u8`].

/// 3270 Command Codes
///
/// Primary commands sent from the host to the terminal.
pub const CMD_WRITE: u8 = 0x01;                    // Write
pub const CMD_WRITE_EBCDIC: u8 = 0xF1;             // Write (EBCDIC alias)
pub const CMD_ERASE_WRITE: u8 = 0x05;              // Erase/Write
pub const CMD_ERASE_WRITE_EBCDIC: u8 = 0xF5;       // Erase/Write (EBCDIC alias)
pub const CMD_ERASE_WRITE_ALTERNATE: u8 = 0x0D;    // Erase/Write Alternate
pub const CMD_ERASE_WRITE_ALTERNATE_EBCDIC: u8 = 0x7E;
pub const CMD_READ_BUFFER: u8 = 0x02;              // Read Buffer
pub const CMD_READ_BUFFER_EBCDIC: u8 = 0xF2;
pub const CMD_READ_MODIFIED: u8 = 0x06;            // Read Modified
pub const CMD_READ_MODIFIED_EBCDIC: u8 = 0xF6;
pub const CMD_READ_MODIFIED_ALL: u8 = 0x0E;        // Read Modified All
pub const CMD_READ_MODIFIED_ALL_EBCDIC: u8 = 0x6E;
pub const CMD_ERASE_ALL_UNPROTECTED: u8 = 0x0F;    // Erase All Unprotected
pub const CMD_ERASE_ALL_UNPROTECTED_EBCDIC: u8 = 0x6F;
pub const CMD_WRITE_STRUCTURED_FIELD: u8 = 0x11;   // Write Structured Field
pub const CMD_WRITE_STRUCTURED_FIELD_EBCDIC: u8 = 0xF3;

/// 3270 Order Codes
/// Embedded in the data stream to control formatting.
pub const ORDER_SF: u8 = 0x1D;    // Start Field
pub const ORDER_SFE: u8 = 0x29;   // Start Field Extended
pub const ORDER_SBA: u8 = 0x11;   // Set Buffer Address
pub const ORDER_SA: u8 = 0x28;    // Set Attribute
pub const ORDER_MF: u8 = 0x2C;    // Modify Field
pub const ORDER_IC: u8 = 0x13;    // Insert Cursor
pub const ORDER_PT: u8 = 0x05;    // Program Tab
pub const ORDER_RA: u8 = 0x3C;    // Repeat to Address
pub const ORDER_EUA: u8 = 0x12;   // Erase Unprotected to Address
pub const ORDER_GE: u8 = 0x08;    // Graphic Escape

/// Write Control Character (WCC) bits
/// Applied before the orders that follow a Write command.
pub const WCC_RESET: u8 = 0x40;           // Reset partition/format state
pub const WCC_START_PRINT: u8 = 0x08;     // Start print operation
pub const WCC_ALARM: u8 = 0x04;           // Sound alarm
pub const WCC_RESTORE: u8 = 0x02;         // Restore (unlock) keyboard
pub const WCC_RESET_MDT: u8 = 0x01;       // Reset all MDT bits

/// AID (Attention Identifier) keys
/// Sent terminal-to-host to identify the operator action.
pub const AID_NO_AID: u8 = 0x60;
pub const AID_ENTER: u8 = 0x7D;
pub const AID_CLEAR: u8 = 0x6D;
pub const AID_SYSREQ: u8 = 0xF0;
pub const AID_STRUCTURED_FIELD: u8 = 0x88;

// Program attention keys
pub const AID_PA1: u8 = 0x6C;
pub const AID_PA2: u8 = 0x6E;
pub const AID_PA3: u8 = 0x6B;

// Program function keys: PF1-PF12 in 0xF1-0xFC, PF13-PF24 in 0xC1-0xCC
pub const AID_PF1: u8 = 0xF1;
pub const AID_PF2: u8 = 0xF2;
pub const AID_PF3: u8 = 0xF3;
pub const AID_PF4: u8 = 0xF4;
pub const AID_PF5: u8 = 0xF5;
pub const AID_PF6: u8 = 0xF6;
pub const AID_PF7: u8 = 0xF7;
pub const AID_PF8: u8 = 0xF8;
pub const AID_PF9: u8 = 0xF9;
pub const AID_PF10: u8 = 0xFA;
pub const AID_PF11: u8 = 0xFB;
pub const AID_PF12: u8 = 0xFC;
pub const AID_PF13: u8 = 0xC1;
pub const AID_PF14: u8 = 0xC2;
pub const AID_PF15: u8 = 0xC3;
pub const AID_PF16: u8 = 0xC4;
pub const AID_PF17: u8 = 0xC5;
pub const AID_PF18: u8 = 0xC6;
pub const AID_PF19: u8 = 0xC7;
pub const AID_PF20: u8 = 0xC8;
pub const AID_PF21: u8 = 0xC9;
pub const AID_PF22: u8 = 0xCA;
pub const AID_PF23: u8 = 0xCB;
pub const AID_PF24: u8 = 0xCC;

/// Field attribute byte bits (SF order operand)
pub const ATTR_PROTECTED: u8 = 0x20;      // Bit 5: protected field
pub const ATTR_NUMERIC: u8 = 0x10;        // Bit 4: numeric field
pub const ATTR_DISPLAY: u8 = 0x0C;        // Bits 2-3: display attributes
pub const ATTR_RESERVED: u8 = 0x02;       // Bit 1: reserved
pub const ATTR_MDT: u8 = 0x01;            // Bit 0: Modified Data Tag

/// Display attribute values (bits 2-3 of the field attribute)
pub const DISPLAY_NORMAL: u8 = 0x00;
pub const DISPLAY_INTENSIFIED: u8 = 0x08;
pub const DISPLAY_HIDDEN: u8 = 0x0C;      // Non-display

/// Extended field attribute types (SFE/SA orders)
pub const XA_ALL: u8 = 0x00;              // All character attributes
pub const XA_3270: u8 = 0xC0;             // 3270 field attribute
pub const XA_VALIDATION: u8 = 0xC1;       // Field validation
pub const XA_OUTLINING: u8 = 0xC2;        // Field outlining
pub const XA_HIGHLIGHTING: u8 = 0x41;     // Highlighting
pub const XA_FOREGROUND: u8 = 0x42;       // Foreground color
pub const XA_CHARSET: u8 = 0x43;          // Character set
pub const XA_BACKGROUND: u8 = 0x45;       // Background color
pub const XA_TRANSPARENCY: u8 = 0x46;     // Transparency

/// Color attribute values
pub const COLOR_DEFAULT: u8 = 0x00;
pub const COLOR_BLUE: u8 = 0xF1;
pub const COLOR_RED: u8 = 0xF2;
pub const COLOR_PINK: u8 = 0xF3;
pub const COLOR_GREEN: u8 = 0xF4;
pub const COLOR_TURQUOISE: u8 = 0xF5;
pub const COLOR_YELLOW: u8 = 0xF6;
pub const COLOR_WHITE: u8 = 0xF7;

/// Highlighting attribute values
pub const HIGHLIGHT_DEFAULT: u8 = 0x00;
pub const HIGHLIGHT_NORMAL: u8 = 0xF0;
pub const HIGHLIGHT_BLINK: u8 = 0xF1;
pub const HIGHLIGHT_REVERSE: u8 = 0xF2;
pub const HIGHLIGHT_UNDERSCORE: u8 = 0xF4;

/// Validation attribute values
pub const VALIDATION_MANDATORY_FILL: u8 = 0x04;
pub const VALIDATION_MANDATORY_ENTRY: u8 = 0x02;
pub const VALIDATION_TRIGGER: u8 = 0x01;

/// Structured field ids (1-byte form)
pub const SF_READ_PARTITION: u8 = 0x01;
pub const SF_ERASE_RESET: u8 = 0x03;
pub const SF_SET_REPLY_MODE: u8 = 0x09;
pub const SF_OUTBOUND_3270DS: u8 = 0x40;
pub const SF_3270_IPDS: u8 = 0x5A;
pub const SF_QUERY_REPLY: u8 = 0x81;

/// EBCDIC NUL and space, used throughout the buffer model
pub const EBCDIC_NUL: u8 = 0x00;
pub const EBCDIC_SPACE: u8 = 0x40;

/// Enum representation of 3270 command codes for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    Write,
    EraseWrite,
    EraseWriteAlternate,
    ReadBuffer,
    ReadModified,
    ReadModifiedAll,
    EraseAllUnprotected,
    WriteStructuredField,
}

impl CommandCode {
    /// Convert a byte value to a CommandCode, accepting both wire aliases
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            CMD_WRITE | CMD_WRITE_EBCDIC => Some(Self::Write),
            CMD_ERASE_WRITE | CMD_ERASE_WRITE_EBCDIC => Some(Self::EraseWrite),
            CMD_ERASE_WRITE_ALTERNATE | CMD_ERASE_WRITE_ALTERNATE_EBCDIC => {
                Some(Self::EraseWriteAlternate)
            }
            CMD_READ_BUFFER | CMD_READ_BUFFER_EBCDIC => Some(Self::ReadBuffer),
            CMD_READ_MODIFIED | CMD_READ_MODIFIED_EBCDIC => Some(Self::ReadModified),
            CMD_READ_MODIFIED_ALL | CMD_READ_MODIFIED_ALL_EBCDIC => Some(Self::ReadModifiedAll),
            CMD_ERASE_ALL_UNPROTECTED | CMD_ERASE_ALL_UNPROTECTED_EBCDIC => {
                Some(Self::EraseAllUnprotected)
            }
            CMD_WRITE_STRUCTURED_FIELD | CMD_WRITE_STRUCTURED_FIELD_EBCDIC => {
                Some(Self::WriteStructuredField)
            }
            _ => None,
        }
    }

    /// Canonical byte value for the command
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Write => CMD_WRITE,
            Self::EraseWrite => CMD_ERASE_WRITE,
            Self::EraseWriteAlternate => CMD_ERASE_WRITE_ALTERNATE,
            Self::ReadBuffer => CMD_READ_BUFFER,
            Self::ReadModified => CMD_READ_MODIFIED,
            Self::ReadModifiedAll => CMD_READ_MODIFIED_ALL,
            Self::EraseAllUnprotected => CMD_ERASE_ALL_UNPROTECTED,
            Self::WriteStructuredField => CMD_WRITE_STRUCTURED_FIELD,
        }
    }
}

/// Enum representation of 3270 order codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderCode {
    StartField,
    StartFieldExtended,
    SetBufferAddress,
    SetAttribute,
    ModifyField,
    InsertCursor,
    ProgramTab,
    RepeatToAddress,
    EraseUnprotectedToAddress,
    GraphicEscape,
}

impl OrderCode {
    /// Convert a byte value to an OrderCode
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            ORDER_SF => Some(Self::StartField),
            ORDER_SFE => Some(Self::StartFieldExtended),
            ORDER_SBA => Some(Self::SetBufferAddress),
            ORDER_SA => Some(Self::SetAttribute),
            ORDER_MF => Some(Self::ModifyField),
            ORDER_IC => Some(Self::InsertCursor),
            ORDER_PT => Some(Self::ProgramTab),
            ORDER_RA => Some(Self::RepeatToAddress),
            ORDER_EUA => Some(Self::EraseUnprotectedToAddress),
            ORDER_GE => Some(Self::GraphicEscape),
            _ => None,
        }
    }

    /// Convert OrderCode to its byte value
    pub fn to_u8(self) -> u8 {
        match self {
            Self::StartField => ORDER_SF,
            Self::StartFieldExtended => ORDER_SFE,
            Self::SetBufferAddress => ORDER_SBA,
            Self::SetAttribute => ORDER_SA,
            Self::ModifyField => ORDER_MF,
            Self::InsertCursor => ORDER_IC,
            Self::ProgramTab => ORDER_PT,
            Self::RepeatToAddress => ORDER_RA,
            Self::EraseUnprotectedToAddress => ORDER_EUA,
            Self::GraphicEscape => ORDER_GE,
        }
    }
}

/// Enum representation of AID keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AidKey {
    NoAid,
    Enter,
    Clear,
    SysReq,
    PA1,
    PA2,
    PA3,
    PF1, PF2, PF3, PF4, PF5, PF6,
    PF7, PF8, PF9, PF10, PF11, PF12,
    PF13, PF14, PF15, PF16, PF17, PF18,
    PF19, PF20, PF21, PF22, PF23, PF24,
    StructuredField,
}

impl AidKey {
    /// Convert a byte value to an AidKey
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            AID_NO_AID => Some(Self::NoAid),
            AID_ENTER => Some(Self::Enter),
            AID_CLEAR => Some(Self::Clear),
            AID_SYSREQ => Some(Self::SysReq),
            AID_PA1 => Some(Self::PA1),
            AID_PA2 => Some(Self::PA2),
            AID_PA3 => Some(Self::PA3),
            AID_PF1 => Some(Self::PF1),
            AID_PF2 => Some(Self::PF2),
            AID_PF3 => Some(Self::PF3),
            AID_PF4 => Some(Self::PF4),
            AID_PF5 => Some(Self::PF5),
            AID_PF6 => Some(Self::PF6),
            AID_PF7 => Some(Self::PF7),
            AID_PF8 => Some(Self::PF8),
            AID_PF9 => Some(Self::PF9),
            AID_PF10 => Some(Self::PF10),
            AID_PF11 => Some(Self::PF11),
            AID_PF12 => Some(Self::PF12),
            AID_PF13 => Some(Self::PF13),
            AID_PF14 => Some(Self::PF14),
            AID_PF15 => Some(Self::PF15),
            AID_PF16 => Some(Self::PF16),
            AID_PF17 => Some(Self::PF17),
            AID_PF18 => Some(Self::PF18),
            AID_PF19 => Some(Self::PF19),
            AID_PF20 => Some(Self::PF20),
            AID_PF21 => Some(Self::PF21),
            AID_PF22 => Some(Self::PF22),
            AID_PF23 => Some(Self::PF23),
            AID_PF24 => Some(Self::PF24),
            AID_STRUCTURED_FIELD => Some(Self::StructuredField),
            _ => None,
        }
    }

    /// Convert AidKey to its byte value
    pub fn to_u8(self) -> u8 {
        match self {
            Self::NoAid => AID_NO_AID,
            Self::Enter => AID_ENTER,
            Self::Clear => AID_CLEAR,
            Self::SysReq => AID_SYSREQ,
            Self::PA1 => AID_PA1,
            Self::PA2 => AID_PA2,
            Self::PA3 => AID_PA3,
            Self::PF1 => AID_PF1,
            Self::PF2 => AID_PF2,
            Self::PF3 => AID_PF3,
            Self::PF4 => AID_PF4,
            Self::PF5 => AID_PF5,
            Self::PF6 => AID_PF6,
            Self::PF7 => AID_PF7,
            Self::PF8 => AID_PF8,
            Self::PF9 => AID_PF9,
            Self::PF10 => AID_PF10,
            Self::PF11 => AID_PF11,
            Self::PF12 => AID_PF12,
            Self::PF13 => AID_PF13,
            Self::PF14 => AID_PF14,
            Self::PF15 => AID_PF15,
            Self::PF16 => AID_PF16,
            Self::PF17 => AID_PF17,
            Self::PF18 => AID_PF18,
            Self::PF19 => AID_PF19,
            Self::PF20 => AID_PF20,
            Self::PF21 => AID_PF21,
            Self::PF22 => AID_PF22,
            Self::PF23 => AID_PF23,
            Self::PF24 => AID_PF24,
            Self::StructuredField => AID_STRUCTURED_FIELD,
        }
    }

    /// Program function key for a 1-based index (PF1..PF24)
    pub fn pf(n: u8) -> Option<Self> {
        const PF_KEYS: [AidKey; 24] = [
            AidKey::PF1, AidKey::PF2, AidKey::PF3, AidKey::PF4,
            AidKey::PF5, AidKey::PF6, AidKey::PF7, AidKey::PF8,
            AidKey::PF9, AidKey::PF10, AidKey::PF11, AidKey::PF12,
            AidKey::PF13, AidKey::PF14, AidKey::PF15, AidKey::PF16,
            AidKey::PF17, AidKey::PF18, AidKey::PF19, AidKey::PF20,
            AidKey::PF21, AidKey::PF22, AidKey::PF23, AidKey::PF24,
        ];
        match n {
            1..=24 => Some(PF_KEYS[(n - 1) as usize]),
            _ => None,
        }
    }

    /// True for the short-read AIDs whose replies carry no field data
    pub fn is_short_read(self) -> bool {
        matches!(self, Self::Clear | Self::PA1 | Self::PA2 | Self::PA3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_conversion() {
        assert_eq!(CommandCode::from_u8(CMD_WRITE), Some(CommandCode::Write));
        assert_eq!(CommandCode::from_u8(CMD_WRITE_EBCDIC), Some(CommandCode::Write));
        assert_eq!(CommandCode::Write.to_u8(), CMD_WRITE);
        assert_eq!(CommandCode::from_u8(0x42), None);
    }

    #[test]
    fn test_command_code_ebcdic_aliases() {
        assert_eq!(
            CommandCode::from_u8(CMD_ERASE_WRITE_ALTERNATE_EBCDIC),
            Some(CommandCode::EraseWriteAlternate)
        );
        assert_eq!(
            CommandCode::from_u8(CMD_READ_MODIFIED_ALL_EBCDIC),
            Some(CommandCode::ReadModifiedAll)
        );
        assert_eq!(
            CommandCode::from_u8(CMD_WRITE_STRUCTURED_FIELD_EBCDIC),
            Some(CommandCode::WriteStructuredField)
        );
    }

    #[test]
    fn test_order_code_conversion() {
        assert_eq!(OrderCode::from_u8(ORDER_SF), Some(OrderCode::StartField));
        assert_eq!(OrderCode::StartField.to_u8(), ORDER_SF);
        assert_eq!(OrderCode::from_u8(0xFF), None);
    }

    #[test]
    fn test_aid_key_conversion() {
        assert_eq!(AidKey::from_u8(AID_ENTER), Some(AidKey::Enter));
        assert_eq!(AidKey::Enter.to_u8(), AID_ENTER);
        assert_eq!(AidKey::from_u8(AID_PF13), Some(AidKey::PF13));
        assert_eq!(AidKey::PF24.to_u8(), 0xCC);
    }

    #[test]
    fn test_aid_pf_lookup() {
        assert_eq!(AidKey::pf(1), Some(AidKey::PF1));
        assert_eq!(AidKey::pf(24), Some(AidKey::PF24));
        assert_eq!(AidKey::pf(0), None);
        assert_eq!(AidKey::pf(25), None);
    }

    #[test]
    fn test_short_read_aids() {
        assert!(AidKey::Clear.is_short_read());
        assert!(AidKey::PA2.is_short_read());
        assert!(!AidKey::Enter.is_short_read());
        assert!(!AidKey::PF3.is_short_read());
    }

    #[test]
    fn test_field_attribute_bits() {
        let protected_numeric = ATTR_PROTECTED | ATTR_NUMERIC;
        assert_eq!(protected_numeric & ATTR_PROTECTED, ATTR_PROTECTED);
        assert_eq!(protected_numeric & ATTR_NUMERIC, ATTR_NUMERIC);
    }
}
