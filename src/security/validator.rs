//! Input Validation
//!
//! Untrusted strings from the UI (targets, BSSIDs, SSIDs, filenames) must pass
//! through here before they can take part in a command. Every function either
//! accepts and normalizes the whole value or rejects it with a reason; nothing
//! is ever partially accepted.
//!
//! The free functions are pure. [`Validator`] wraps them and records one
//! VALIDATION audit event per call.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::error::SecurityError;
use crate::metrics;

/// Maximum length of a network name (802.11 SSID limit).
pub const MAX_NAME_LEN: usize = 32;

/// Placeholder for names that are empty after sanitizing.
pub const HIDDEN_NAME: &str = "<HIDDEN>";

/// Characters removed from names. No shell is ever involved downstream, but
/// these have no place in a network name shown to, or passed on by, a tool.
pub const NAME_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '\'', '"',
];

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const MAX_FILENAME_LEN: usize = 255;
const MAX_INTERFACE_LEN: usize = 15;
const AUDIT_VALUE_LEN: usize = 64;

/// Result of validating one untrusted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    /// The value is safe to use, in its normalized form.
    Accepted(String),
    /// The value was refused; the string is a human-readable reason.
    Rejected(String),
}

impl ValidationOutcome {
    fn reject(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Accepted(v) => Some(v),
            Self::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(r) => Some(r),
        }
    }

    /// Convert into a `Result`, naming the field in the error.
    pub fn into_result(self, field: FieldKind) -> Result<String, SecurityError> {
        match self {
            Self::Accepted(v) => Ok(v),
            Self::Rejected(reason) => Err(SecurityError::ValidationRejected {
                field: field.to_string(),
                reason,
            }),
        }
    }
}

/// The closed set of free-form fields the UI may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Target,
    Mac,
    Name,
    Filename,
    PortRange,
    Interface,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Mac => "mac",
            Self::Name => "name",
            Self::Filename => "filename",
            Self::PortRange => "port_range",
            Self::Interface => "interface",
        }
    }

    /// Run the pure validator for this field.
    pub fn check(&self, input: &str) -> ValidationOutcome {
        match self {
            Self::Target => validate_target(input),
            Self::Mac => validate_mac(input),
            Self::Name => validate_name(input),
            Self::Filename => validate_filename(input),
            Self::PortRange => validate_port_range(input),
            Self::Interface => validate_interface(input),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "target" | "ip" | "host" => Ok(Self::Target),
            "mac" | "bssid" => Ok(Self::Mac),
            "name" | "ssid" => Ok(Self::Name),
            "filename" | "file" => Ok(Self::Filename),
            "port_range" | "ports" => Ok(Self::PortRange),
            "interface" | "iface" => Ok(Self::Interface),
            _ => Err(format!("Unknown field kind: {}", s)),
        }
    }
}

/// Validate a MAC address / BSSID.
///
/// Six hex byte groups separated uniformly by `:` or `-`, any case. The
/// accepted value is always uppercase and colon-separated.
pub fn validate_mac(input: &str) -> ValidationOutcome {
    let bytes = input.as_bytes();
    if bytes.len() != 17 {
        return ValidationOutcome::reject("MAC address must be six hex byte groups (AA:BB:CC:DD:EE:FF)");
    }

    let sep = bytes[2];
    if sep != b':' && sep != b'-' {
        return ValidationOutcome::reject("MAC address groups must be separated by ':' or '-'");
    }

    let mut normalized = String::with_capacity(17);
    for (i, &b) in bytes.iter().enumerate() {
        if i % 3 == 2 {
            if b != sep {
                return ValidationOutcome::reject("MAC address uses mixed or misplaced separators");
            }
            normalized.push(':');
        } else if b.is_ascii_hexdigit() {
            normalized.push(b.to_ascii_uppercase() as char);
        } else {
            return ValidationOutcome::reject("MAC address contains a non-hex character");
        }
    }

    ValidationOutcome::Accepted(normalized)
}

/// Validate a scan target: IPv4 address, IPv4 CIDR block, or hostname.
///
/// Range notation (`10.0.0.1-20`), whitespace, shell metacharacters and
/// anything that looks like an option (`-iL`) are rejected.
pub fn validate_target(input: &str) -> ValidationOutcome {
    if input.is_empty() {
        return ValidationOutcome::reject("target is empty");
    }
    if input.len() > MAX_HOSTNAME_LEN {
        return ValidationOutcome::reject("target is too long");
    }
    if let Some(c) = input
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/')))
    {
        return ValidationOutcome::reject(format!("target contains forbidden character {:?}", c));
    }

    if let Some((addr, prefix)) = input.split_once('/') {
        let Ok(addr) = addr.parse::<Ipv4Addr>() else {
            return ValidationOutcome::reject("CIDR target must start with a valid IPv4 address");
        };
        if prefix.is_empty() || prefix.len() > 2 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return ValidationOutcome::reject("CIDR prefix must be a number from 0 to 32");
        }
        let prefix: u8 = match prefix.parse() {
            Ok(p) if p <= 32 => p,
            _ => return ValidationOutcome::reject("CIDR prefix must be a number from 0 to 32"),
        };
        return ValidationOutcome::Accepted(format!("{}/{}", addr, prefix));
    }

    if input.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return match input.parse::<Ipv4Addr>() {
            Ok(addr) => ValidationOutcome::Accepted(addr.to_string()),
            Err(_) => ValidationOutcome::reject("invalid IPv4 address (each octet must be 0-255)"),
        };
    }

    if !input.bytes().any(|b| b.is_ascii_alphabetic()) {
        return ValidationOutcome::reject("address ranges are not accepted; use CIDR notation");
    }

    for label in input.split('.') {
        if label.is_empty() {
            return ValidationOutcome::reject("hostname contains an empty label");
        }
        if label.len() > MAX_LABEL_LEN {
            return ValidationOutcome::reject("hostname label is too long");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return ValidationOutcome::reject("hostname labels may not start or end with '-'");
        }
    }

    ValidationOutcome::Accepted(input.to_string())
}

/// Sanitize a network name (SSID).
///
/// Non-printable characters (controls, format characters such as
/// bidirectional overrides and zero-width spaces, and every separator other
/// than a plain space) and shell metacharacters are removed, surrounding
/// whitespace trimmed, and the result cut to [`MAX_NAME_LEN`] characters. A
/// name with nothing left becomes [`HIDDEN_NAME`]. This never rejects.
pub fn validate_name(input: &str) -> ValidationOutcome {
    let cleaned: String = input
        .chars()
        .filter(|c| is_printable(*c) && !NAME_METACHARACTERS.contains(c))
        .collect();
    let truncated: String = cleaned.trim().chars().take(MAX_NAME_LEN).collect();
    let truncated = truncated.trim_end();

    if truncated.is_empty() {
        ValidationOutcome::Accepted(HIDDEN_NAME.to_string())
    } else {
        ValidationOutcome::Accepted(truncated.to_string())
    }
}

/// Whether `c` renders as visible text. The ASCII space is the only
/// separator kept.
pub fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
            | GeneralCategory::SpaceSeparator
            | GeneralCategory::LineSeparator
            | GeneralCategory::ParagraphSeparator
    )
}

/// Reduce a filename to its final path component.
///
/// Every directory component is discarded, whatever it contains. The caller
/// picks the directory the file lives in; see [`crate::security::SafePaths`].
pub fn validate_filename(input: &str) -> ValidationOutcome {
    if input.chars().any(|c| c.is_control()) {
        return ValidationOutcome::reject("filename contains control characters");
    }

    let base = input.rsplit(['/', '\\']).next().unwrap_or("");
    match base {
        "" => ValidationOutcome::reject("filename is empty after removing directories"),
        "." | ".." => ValidationOutcome::reject("filename may not be '.' or '..'"),
        b if b.len() > MAX_FILENAME_LEN => ValidationOutcome::reject("filename is too long"),
        b => ValidationOutcome::Accepted(b.to_string()),
    }
}

/// Validate a port specification: `80`, `1-1024`, or `22,80,8000-8100`.
pub fn validate_port_range(input: &str) -> ValidationOutcome {
    if input.is_empty() {
        return ValidationOutcome::reject("port range is empty");
    }

    for part in input.split(',') {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (a, Some(b)),
            None => (part, None),
        };
        let Some(start) = parse_port(start) else {
            return ValidationOutcome::reject(format!("invalid port '{}' (must be 1-65535)", start));
        };
        if let Some(end) = end {
            let Some(end) = parse_port(end) else {
                return ValidationOutcome::reject(format!("invalid port '{}' (must be 1-65535)", end));
            };
            if start > end {
                return ValidationOutcome::reject(format!("port range {}-{} is reversed", start, end));
            }
        }
    }

    ValidationOutcome::Accepted(input.to_string())
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || s.len() > 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match s.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(p) => Some(p),
    }
}

/// Validate a network interface name such as `wlan0` or `wlan0mon`.
pub fn validate_interface(input: &str) -> ValidationOutcome {
    if input.is_empty() || input.len() > MAX_INTERFACE_LEN {
        return ValidationOutcome::reject("interface name must be 1-15 characters");
    }
    if !input.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return ValidationOutcome::reject("interface name must start with a letter or digit");
    }
    if !input
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return ValidationOutcome::reject("interface name contains forbidden characters");
    }
    ValidationOutcome::Accepted(input.to_string())
}

/// Audited front end to the validation functions.
#[derive(Clone)]
pub struct Validator {
    audit: Arc<dyn AuditSink>,
}

impl Validator {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    /// Validate `input` as `field`, recording exactly one audit event.
    pub fn validate(&self, field: FieldKind, input: &str) -> ValidationOutcome {
        let outcome = field.check(input);

        let mut event = AuditEvent::validation(field.as_str(), AuditOutcome::from(outcome.is_accepted()))
            .with_detail("field", field.as_str())
            .with_detail("input", audit_excerpt(input));
        match &outcome {
            ValidationOutcome::Accepted(value) => {
                event = event.with_detail("value", audit_excerpt(value));
                if field == FieldKind::Name && value == HIDDEN_NAME {
                    event = event.with_detail("reason", "no printable characters");
                }
                debug!("Validated {}: {}", field, value);
            }
            ValidationOutcome::Rejected(reason) => {
                event = event.with_detail("reason", reason);
                debug!("Rejected {}: {}", field, reason);
            }
        }
        self.audit.record(event);
        metrics::record_validation(field.as_str(), outcome.is_accepted());

        outcome
    }

    pub fn target(&self, input: &str) -> ValidationOutcome {
        self.validate(FieldKind::Target, input)
    }

    pub fn mac(&self, input: &str) -> ValidationOutcome {
        self.validate(FieldKind::Mac, input)
    }

    pub fn name(&self, input: &str) -> ValidationOutcome {
        self.validate(FieldKind::Name, input)
    }

    pub fn filename(&self, input: &str) -> ValidationOutcome {
        self.validate(FieldKind::Filename, input)
    }

    pub fn port_range(&self, input: &str) -> ValidationOutcome {
        self.validate(FieldKind::PortRange, input)
    }

    pub fn interface(&self, input: &str) -> ValidationOutcome {
        self.validate(FieldKind::Interface, input)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}

/// Printable, length-bounded copy of an untrusted value for the audit trail.
fn audit_excerpt(input: &str) -> String {
    let mut out: String = input
        .chars()
        .map(|c| if c.is_control() { '?' } else { c })
        .take(AUDIT_VALUE_LEN)
        .collect();
    if input.chars().count() > AUDIT_VALUE_LEN {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditCategory, MemoryAuditSink};
    use proptest::prelude::*;

    #[test]
    fn test_mac_accepts_colon_form_uppercase() {
        assert_eq!(
            validate_mac("AA:BB:CC:DD:EE:FF"),
            ValidationOutcome::Accepted("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert_eq!(
            validate_mac("aa:bb:cc:dd:ee:0f"),
            ValidationOutcome::Accepted("AA:BB:CC:DD:EE:0F".to_string())
        );
    }

    #[test]
    fn test_mac_normalizes_dash_form() {
        assert_eq!(
            validate_mac("00-11-22-33-44-55"),
            ValidationOutcome::Accepted("00:11:22:33:44:55".to_string())
        );
    }

    #[test]
    fn test_mac_rejects_malformed() {
        let bad = [
            "AA:BB:CC:DD:EE",
            "AA:BB:CC:DD:EE:FF:00",
            "AA:BB-CC:DD:EE:FF",
            "AA:BB:CC:DD:EE:GG",
            "AABBCCDDEEFF",
            " AA:BB:CC:DD:EE:F",
            "AA:BB:CC:DD:EE:FF;",
            "AA.BB.CC.DD.EE.FF",
            "",
        ];
        for input in bad {
            assert!(!validate_mac(input).is_accepted(), "should reject {:?}", input);
        }
    }

    #[test]
    fn test_target_ipv4() {
        assert_eq!(
            validate_target("192.168.1.10"),
            ValidationOutcome::Accepted("192.168.1.10".to_string())
        );
        assert!(!validate_target("256.1.1.1").is_accepted());
        assert!(!validate_target("1.2.3").is_accepted());
        assert!(!validate_target("1.2.3.4.5").is_accepted());
    }

    #[test]
    fn test_target_cidr() {
        assert_eq!(
            validate_target("192.168.1.0/24"),
            ValidationOutcome::Accepted("192.168.1.0/24".to_string())
        );
        assert!(validate_target("0.0.0.0/0").is_accepted());
        assert!(validate_target("10.0.0.1/32").is_accepted());
        assert!(!validate_target("10.0.0.0/33").is_accepted());
        assert!(!validate_target("10.0.0.0/").is_accepted());
        assert!(!validate_target("10.0.0.0/8/8").is_accepted());
        assert!(!validate_target("host.lan/24").is_accepted());
    }

    #[test]
    fn test_target_hostname() {
        assert!(validate_target("router.lan").is_accepted());
        assert!(validate_target("scanme.nmap.org").is_accepted());
        assert!(validate_target("host-1").is_accepted());
        assert!(!validate_target("-iL").is_accepted());
        assert!(!validate_target("host..lan").is_accepted());
        assert!(!validate_target("bad-.lan").is_accepted());
    }

    #[test]
    fn test_target_rejects_injection_and_ranges() {
        let bad = [
            "host; rm -rf /",
            "192.168.1.1 192.168.1.2",
            "192.168.1.1-20",
            "$(whoami)",
            "`id`",
            "a|b",
            "host\n",
            "",
        ];
        for input in bad {
            assert!(!validate_target(input).is_accepted(), "should reject {:?}", input);
        }
    }

    #[test]
    fn test_name_strips_and_truncates() {
        assert_eq!(
            validate_name("Normal Network"),
            ValidationOutcome::Accepted("Normal Network".to_string())
        );
        assert_eq!(
            validate_name("Network\x00Injection"),
            ValidationOutcome::Accepted("NetworkInjection".to_string())
        );
        assert_eq!(
            validate_name("evil;$(reboot)"),
            ValidationOutcome::Accepted("evilreboot".to_string())
        );
        let long = "x".repeat(40);
        assert_eq!(validate_name(&long).value().unwrap().chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn test_name_hidden_sentinel() {
        assert_eq!(validate_name("").value(), Some(HIDDEN_NAME));
        assert_eq!(validate_name("\x00\x01\t").value(), Some(HIDDEN_NAME));
        assert_eq!(validate_name("   ").value(), Some(HIDDEN_NAME));
        assert_eq!(validate_name("$()").value(), Some(HIDDEN_NAME));
    }

    #[test]
    fn test_name_strips_invisible_characters() {
        assert_eq!(validate_name("\u{200B}\u{200B}").value(), Some(HIDDEN_NAME));
        assert_eq!(validate_name("ab\u{202E}cd").value(), Some("abcd"));
        assert_eq!(validate_name("soft\u{00AD}hyphen").value(), Some("softhyphen"));
        assert_eq!(validate_name("\u{FEFF}Home\u{2028}Net").value(), Some("HomeNet"));
        assert_eq!(validate_name("Guest\u{00A0}WiFi").value(), Some("GuestWiFi"));
        assert_eq!(validate_name("\u{E000}\u{2066}").value(), Some(HIDDEN_NAME));
    }

    #[test]
    fn test_printable_classes() {
        assert!(is_printable(' '));
        assert!(is_printable('é'));
        assert!(is_printable('\u{0301}'));
        assert!(!is_printable('\t'));
        assert!(!is_printable('\u{202E}'));
        assert!(!is_printable('\u{3000}'));
    }

    #[test]
    fn test_name_keeps_unicode() {
        assert_eq!(validate_name("Café Wi-Fi").value(), Some("Café Wi-Fi"));
    }

    #[test]
    fn test_filename_basename_only() {
        assert_eq!(validate_filename("../../../etc/passwd").value(), Some("passwd"));
        assert_eq!(validate_filename("scan.log").value(), Some("scan.log"));
        assert_eq!(validate_filename("/abs/path/capture.pcap").value(), Some("capture.pcap"));
        assert_eq!(validate_filename("..\\..\\boot.ini").value(), Some("boot.ini"));
    }

    #[test]
    fn test_filename_rejects_empty_basename() {
        assert!(!validate_filename("").is_accepted());
        assert!(!validate_filename("logs/").is_accepted());
        assert!(!validate_filename("..").is_accepted());
        assert!(!validate_filename("a/.").is_accepted());
        assert!(!validate_filename("bad\nname").is_accepted());
    }

    #[test]
    fn test_port_ranges() {
        assert!(validate_port_range("80").is_accepted());
        assert!(validate_port_range("1-1024").is_accepted());
        assert!(validate_port_range("22,80,8000-8100").is_accepted());
        assert!(!validate_port_range("0").is_accepted());
        assert!(!validate_port_range("65536").is_accepted());
        assert!(!validate_port_range("100-1").is_accepted());
        assert!(!validate_port_range("80,").is_accepted());
        assert!(!validate_port_range("-80").is_accepted());
        assert!(!validate_port_range("80;id").is_accepted());
    }

    #[test]
    fn test_interfaces() {
        assert!(validate_interface("wlan0").is_accepted());
        assert!(validate_interface("wlan0mon").is_accepted());
        assert!(validate_interface("br-lan.10").is_accepted());
        assert!(!validate_interface("-i").is_accepted());
        assert!(!validate_interface("wlan0 up").is_accepted());
        assert!(!validate_interface("averyveryverylongname").is_accepted());
    }

    #[test]
    fn test_field_kind_parse() {
        assert_eq!("bssid".parse::<FieldKind>().unwrap(), FieldKind::Mac);
        assert_eq!("port-range".parse::<FieldKind>().unwrap(), FieldKind::PortRange);
        assert!("password".parse::<FieldKind>().is_err());
    }

    #[test]
    fn test_into_result() {
        assert_eq!(validate_mac("00-11-22-33-44-55").into_result(FieldKind::Mac).unwrap(), "00:11:22:33:44:55");
        let err = validate_mac("nope").into_result(FieldKind::Mac).unwrap_err();
        assert!(matches!(err, SecurityError::ValidationRejected { ref field, .. } if field == "mac"));
    }

    #[test]
    fn test_validator_audits_every_call() {
        let sink = Arc::new(MemoryAuditSink::new());
        let validator = Validator::new(sink.clone());

        assert!(validator.mac("AA:BB:CC:DD:EE:FF").is_accepted());
        assert!(!validator.mac("AA:BB:CC:DD:EE").is_accepted());
        assert!(validator.target("192.168.1.0/24").is_accepted());
        assert!(!validator.target("host; rm -rf /").is_accepted());
        assert!(validator.name("").is_accepted());
        assert!(validator.filename("../../x").is_accepted());

        assert_eq!(sink.len(), 6);
        assert_eq!(sink.count(AuditCategory::Validation), 6);

        let events = sink.events();
        assert_eq!(events[1].outcome, AuditOutcome::Failure);
        assert!(events[1].detail("reason").is_some());
        assert_eq!(events[0].detail("value"), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(events[4].detail("reason"), Some("no printable characters"));
    }

    #[test]
    fn test_audit_excerpt_is_bounded_and_printable() {
        let long = format!("{}\n", "a".repeat(100));
        let excerpt = audit_excerpt(&long);
        assert!(excerpt.ends_with("..."));
        assert!(!excerpt.contains('\n'));
        assert_eq!(excerpt.len(), AUDIT_VALUE_LEN + 3);
    }

    proptest! {
        #[test]
        fn prop_accepted_mac_is_canonical(bytes in prop::array::uniform6(any::<u8>()), dash in any::<bool>()) {
            let sep = if dash { "-" } else { ":" };
            let input = bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(sep);
            let outcome = validate_mac(&input);
            let value = outcome.value().unwrap();
            prop_assert_eq!(value.len(), 17);
            prop_assert_eq!(value.to_string(), value.to_uppercase());
            prop_assert_eq!(value.matches(':').count(), 5);
        }

        #[test]
        fn prop_target_never_accepts_metacharacters(prefix in "[a-z0-9.]{0,10}", meta in "[;&|`$(){}<> \\t\\n'\"]", suffix in "[a-z0-9.]{0,10}") {
            let input = format!("{}{}{}", prefix, meta, suffix);
            prop_assert!(!validate_target(&input).is_accepted());
        }

        #[test]
        fn prop_filename_has_no_separators(input in "\\PC{0,40}") {
            if let ValidationOutcome::Accepted(name) = validate_filename(&input) {
                prop_assert!(!name.contains('/'));
                prop_assert!(!name.contains('\\'));
                prop_assert!(name != ".." && name != ".");
            }
        }

        #[test]
        fn prop_name_is_bounded_and_clean(
            chars in prop::collection::vec(
                prop_oneof![
                    4 => any::<char>(),
                    1 => prop::sample::select(vec!['\u{200B}', '\u{202E}', '\u{00AD}', '\u{FEFF}', '\u{00A0}', '\u{2028}', '\n']),
                ],
                0..80,
            )
        ) {
            let input: String = chars.into_iter().collect();
            let value = validate_name(&input).value().unwrap().to_string();
            prop_assert!(value.chars().count() <= MAX_NAME_LEN.max(HIDDEN_NAME.len()));
            if value != HIDDEN_NAME {
                prop_assert!(value.chars().all(|c| is_printable(c) && !NAME_METACHARACTERS.contains(&c)));
            }
        }
    }
}
