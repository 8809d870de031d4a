use std::fmt;

/// Status reported by the native service-control tool.
///
/// Always derived from a fresh probe; never cache one across transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    NotInstalled,
    AlreadyInstalled,
    Stopped,
    Paused,
    Running,
    Started,
    UnexpectedlyStopped,
    Unknown(String),
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::NotInstalled => f.write_str("not installed"),
            ServiceStatus::AlreadyInstalled => f.write_str("already installed"),
            ServiceStatus::Stopped => f.write_str("stopped"),
            ServiceStatus::Paused => f.write_str("paused"),
            ServiceStatus::Running => f.write_str("running"),
            ServiceStatus::Started => f.write_str("started"),
            ServiceStatus::UnexpectedlyStopped => f.write_str("unexpectedly stopped"),
            ServiceStatus::Unknown(raw) => write!(f, "unknown ({raw})"),
        }
    }
}

// Order matters: longer phrases that contain shorter ones come first.
const PHRASES: &[(&str, ServiceStatus)] = &[
    ("unexpectedly stopped", ServiceStatus::UnexpectedlyStopped),
    ("stopped unexpectedly", ServiceStatus::UnexpectedlyStopped),
    ("not installed", ServiceStatus::NotInstalled),
    ("does not exist", ServiceStatus::NotInstalled),
    ("can't open service", ServiceStatus::NotInstalled),
    ("already installed", ServiceStatus::AlreadyInstalled),
    ("already exists", ServiceStatus::AlreadyInstalled),
    ("paused", ServiceStatus::Paused),
    ("not running", ServiceStatus::Stopped),
    ("running", ServiceStatus::Running),
    ("started", ServiceStatus::Started),
    ("stopped", ServiceStatus::Stopped),
];

/// Match decoded tool output against the known status phrases.
#[must_use]
pub fn classify(text: &str) -> ServiceStatus {
    let lowered = text.to_lowercase();
    PHRASES
        .iter()
        .find(|(phrase, _)| lowered.contains(phrase))
        .map_or_else(
            || ServiceStatus::Unknown(text.to_owned()),
            |(_, status)| status.clone(),
        )
}

/// Windows code page identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePage(pub u32);

impl CodePage {
    pub const UTF8: CodePage = CodePage(65001);

    #[must_use]
    pub fn is_utf8(self) -> bool {
        self == Self::UTF8
    }

    /// Parse the output of `chcp`, e.g. `Active code page: 437`.
    #[must_use]
    pub fn parse_chcp(text: &str) -> Option<CodePage> {
        text.split(|c: char| !c.is_ascii_digit())
            .filter(|s| !s.is_empty())
            .last()?
            .parse()
            .ok()
            .map(CodePage)
    }
}

fn looks_utf16le(bytes: &[u8]) -> bool {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return false;
    }
    let pairs = bytes.len() / 2;
    let high_zero = bytes.chunks_exact(2).filter(|pair| pair[1] == 0).count();
    high_zero * 2 > pairs
}

/// OEM pages (437, 850, 866...) first, then the Windows ANSI and
/// multi-byte pages known to `encoding_rs`.
fn decode_code_page(bytes: &[u8], code_page: CodePage) -> String {
    let Ok(page) = u16::try_from(code_page.0) else {
        return String::from_utf8_lossy(bytes).into_owned();
    };
    if let Some(table) = oem_cp::code_table::DECODING_TABLE_CP_MAP.get(&page) {
        return table.decode_string_lossy(bytes);
    }
    if let Some(encoding) = codepage::to_encoding(page) {
        return encoding.decode(bytes).0.into_owned();
    }
    tracing::debug!("No decoder for code page {page}, assuming UTF-8");
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode raw tool output using the active code page and strip the NUL
/// padding some service tools leave behind.
#[must_use]
pub fn decode(bytes: &[u8], code_page: CodePage) -> String {
    let text = if looks_utf16le(bytes) {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if code_page.is_utf8() {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        decode_code_page(bytes, code_page)
    };

    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .replace('\0', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_phrases() {
        let cases = [
            ("Service \"tandem-db\" is not installed", ServiceStatus::NotInstalled),
            ("Service tandem-db is already installed", ServiceStatus::AlreadyInstalled),
            ("tandem-db: stopped", ServiceStatus::Stopped),
            ("tandem-db is not running", ServiceStatus::Stopped),
            ("Service is PAUSED", ServiceStatus::Paused),
            ("tandem-db is running", ServiceStatus::Running),
            ("tandem-db started", ServiceStatus::Started),
            ("tandem-db unexpectedly stopped", ServiceStatus::UnexpectedlyStopped),
        ];
        for (text, expected) in cases {
            assert_eq!(classify(text), expected, "{text}");
        }
    }

    #[test]
    fn classify_unknown_keeps_raw_text() {
        assert_eq!(
            classify("Access is denied."),
            ServiceStatus::Unknown("Access is denied.".to_owned())
        );
        assert_eq!(classify(""), ServiceStatus::Unknown(String::new()));
    }

    #[test]
    fn decode_strips_null_padding() {
        let bytes = b"tandem-db is running\r\n\0\0\0";
        assert_eq!(decode(bytes, CodePage::UTF8), "tandem-db is running");
    }

    #[test]
    fn decode_utf16le_output() {
        let bytes: Vec<u8> = "SERVICE_STOPPED\r\n"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        assert_eq!(decode(&bytes, CodePage(437)), "SERVICE_STOPPED");
    }

    #[test]
    fn decode_single_byte_code_page() {
        let bytes = [b'c', b'a', b'f', 0xE9, b' ', b'r', b'u', b'n', b'n', b'i', b'n', b'g'];
        assert_eq!(decode(&bytes, CodePage(1252)), "café running");
    }

    #[test]
    fn decode_oem_code_pages() {
        // "Zugriff verweigert für tandem-db" as the German console prints it.
        let mut bytes = b"Zugriff verweigert f".to_vec();
        bytes.push(0x81);
        bytes.extend_from_slice(b"r tandem-db");
        assert_eq!(decode(&bytes, CodePage(850)), "Zugriff verweigert für tandem-db");
        assert_eq!(decode(&[b'c', b'a', b'f', 0x82], CodePage(437)), "café");
        // "Отказано" in cp866.
        let denied = [0x8E, 0xE2, 0xAA, 0xA0, 0xA7, 0xA0, 0xAD, 0xAE];
        assert_eq!(decode(&denied, CodePage(866)), "Отказано");
    }

    #[test]
    fn parse_chcp_output() {
        assert_eq!(
            CodePage::parse_chcp("Active code page: 437\r\n"),
            Some(CodePage(437))
        );
        assert_eq!(CodePage::parse_chcp("Aktive Codepage: 65001."), Some(CodePage::UTF8));
        assert_eq!(CodePage::parse_chcp("no digits"), None);
    }
}
