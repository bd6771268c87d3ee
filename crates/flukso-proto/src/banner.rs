//! Identity banner published on the tap topic.
//!
//! Gen3 devices answer with a short text block that contains, among other
//! lines, `# serial: <serial>` and `# firmware: <version>`.

use flukso_core::Identity;
use once_cell::sync::Lazy;
use regex::Regex;

static SERIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"# serial: (.*)").expect("valid regex"));
static FIRMWARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"# firmware: (.*)").expect("valid regex"));

/// Extract serial and firmware from a banner payload.
///
/// # Errors
///
/// Returns error if the payload is not UTF-8 or lacks either line.
pub fn parse_banner(payload: &[u8]) -> Result<Identity, BannerError> {
    let text = std::str::from_utf8(payload).map_err(|_| BannerError::NotText)?;

    let field = |re: &Regex, name: &'static str| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .ok_or(BannerError::MissingField(name))
    };

    Ok(Identity {
        serial: field(&SERIAL, "serial")?,
        firmware: field(&FIRMWARE, "firmware")?,
    })
}

/// Errors parsing the identity banner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BannerError {
    /// Payload is not UTF-8
    #[error("banner is not text")]
    NotText,
    /// A required line is missing
    #[error("banner has no {0} line")]
    MissingField(&'static str),
}
