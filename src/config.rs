//! Session configuration
//!
//! Recognized options, their defaults, and JSON persistence. The session
//! manager consumes a [`SessionConfig`] at connect time; everything here is
//! plain data with validation, no I/O besides explicit load/save.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ebcdic::{CodePage, Ebcdic, EbcdicCompat};
use crate::negotiation::{device_type_dimensions, ForceMode, NegotiationMode};

/// EBCDIC compatibility profile names as they appear in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompatProfile {
    #[default]
    Default,
    P3270,
}

impl From<CompatProfile> for EbcdicCompat {
    fn from(profile: CompatProfile) -> Self {
        match profile {
            CompatProfile::Default => EbcdicCompat::Default,
            CompatProfile::P3270 => EbcdicCompat::P3270,
        }
    }
}

/// Mode ceiling names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ForceModeSetting {
    #[default]
    Auto,
    Tn3270,
    Tn3270e,
}

impl From<ForceModeSetting> for ForceMode {
    fn from(setting: ForceModeSetting) -> Self {
        match setting {
            ForceModeSetting::Auto => ForceMode::Auto,
            ForceModeSetting::Tn3270 => ForceMode::Tn3270,
            ForceModeSetting::Tn3270e => ForceMode::Tn3270e,
        }
    }
}

/// Completion policy names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationModeSetting {
    #[default]
    Strict,
    Flexible,
}

impl From<NegotiationModeSetting> for NegotiationMode {
    fn from(setting: NegotiationModeSetting) -> Self {
        match setting {
            NegotiationModeSetting::Strict => NegotiationMode::Strict,
            NegotiationModeSetting::Flexible => NegotiationMode::Flexible,
        }
    }
}

/// Session configuration with the recognized option keys
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Override the negotiated default rows
    pub rows: Option<usize>,
    /// Override the negotiated default columns
    pub cols: Option<usize>,
    /// EBCDIC code page name (default CP037)
    pub code_page: String,
    /// Fallback byte selection for unmappable characters
    pub ebcdic_compat: CompatProfile,
    /// Device type offered during negotiation
    pub device_type: String,
    /// LU name to request, if any
    pub lu_name: Option<String>,
    /// Never negotiate past this mode
    pub force_mode: ForceModeSetting,
    /// Completion policy for negotiation-complete
    pub negotiation_mode: NegotiationModeSetting,
    /// Seconds allowed for the TCP connect
    pub connect_timeout: u64,
    /// Seconds allowed for option and subnegotiation to settle
    pub negotiation_timeout: u64,
    /// Seconds allowed for one blocking receive
    pub read_timeout: u64,
    /// Retry once in plain TN3270 when TN3270E negotiation fails
    pub allow_fallback: bool,
    /// Cap on a printer job's retained buffer, in bytes
    pub printer_buffer_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rows: None,
            cols: None,
            code_page: "cp037".to_string(),
            ebcdic_compat: CompatProfile::Default,
            device_type: "IBM-3279-2-E".to_string(),
            lu_name: None,
            force_mode: ForceModeSetting::Auto,
            negotiation_mode: NegotiationModeSetting::Strict,
            connect_timeout: 30,
            negotiation_timeout: 10,
            read_timeout: 30,
            allow_fallback: true,
            printer_buffer_limit: crate::printer::DEFAULT_JOB_BUFFER_LIMIT,
        }
    }
}

impl SessionConfig {
    /// Validate the option values against the recognized sets
    pub fn validate(&self) -> Result<(), String> {
        if CodePage::from_name(&self.code_page).is_none() {
            return Err(format!("unknown code page '{}'", self.code_page));
        }
        if device_type_dimensions(&self.device_type).is_none() {
            return Err(format!("unknown device type '{}'", self.device_type));
        }
        if let (Some(rows), Some(cols)) = (self.rows, self.cols) {
            if rows == 0 || cols == 0 {
                return Err("rows and cols overrides must be positive".to_string());
            }
        }
        if self.connect_timeout == 0 || self.read_timeout == 0 {
            return Err("timeouts must be positive".to_string());
        }
        Ok(())
    }

    /// The EBCDIC codec this configuration selects
    pub fn codec(&self) -> Ebcdic {
        let code_page = CodePage::from_name(&self.code_page).unwrap_or_default();
        Ebcdic::new(code_page, self.ebcdic_compat.into())
    }

    /// Screen dimensions: explicit overrides win over the device default
    pub fn dimensions(&self) -> (usize, usize) {
        let (default_rows, default_cols) =
            device_type_dimensions(&self.device_type).unwrap_or((24, 80));
        (self.rows.unwrap_or(default_rows), self.cols.unwrap_or(default_cols))
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| format!("cannot parse config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| format!("cannot serialize config: {e}"))?;
        fs::write(path, text)
            .map_err(|e| format!("cannot write config {}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dimensions(), (24, 80));
        assert_eq!(config.code_page, "cp037");
        assert!(config.allow_fallback);
    }

    #[test]
    fn test_dimension_overrides() {
        let config = SessionConfig {
            device_type: "IBM-3278-4".to_string(),
            ..SessionConfig::default()
        };
        assert_eq!(config.dimensions(), (43, 80));

        let config = SessionConfig {
            rows: Some(50),
            cols: Some(100),
            ..SessionConfig::default()
        };
        assert_eq!(config.dimensions(), (50, 100));
    }

    #[test]
    fn test_validation_rejects_unknowns() {
        let config = SessionConfig {
            code_page: "cp999".to_string(),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            device_type: "IBM-1234".to_string(),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            rows: Some(0),
            cols: Some(80),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = SessionConfig {
            device_type: "IBM-3278-2".to_string(),
            ebcdic_compat: CompatProfile::P3270,
            force_mode: ForceModeSetting::Tn3270,
            ..SessionConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        let parsed: SessionConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.device_type, "IBM-3278-2");
        assert_eq!(parsed.ebcdic_compat, CompatProfile::P3270);
        assert_eq!(parsed.force_mode, ForceModeSetting::Tn3270);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: SessionConfig =
            serde_json::from_str(r#"{"device_type": "IBM-3278-3"}"#).unwrap();
        assert_eq!(parsed.device_type, "IBM-3278-3");
        assert_eq!(parsed.connect_timeout, 30);
        assert_eq!(parsed.negotiation_mode, NegotiationModeSetting::Strict);
    }

    #[test]
    fn test_codec_selection() {
        let config = SessionConfig {
            ebcdic_compat: CompatProfile::P3270,
            ..SessionConfig::default()
        };
        let codec = config.codec();
        assert_eq!(codec.encode_char('\u{2603}'), 0x7A);
    }
}
