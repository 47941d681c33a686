use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

/// Patterns tried in order against a Content-Disposition header:
/// RFC 5987 extended value, quoted value, bare value.
static FILENAME_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"filename\*=UTF-8''([^;\n]+)",
        r#"filename="([^"]+)""#,
        r"filename=([^;\n]+)",
    ]
    .map(|pattern| Regex::new(pattern).expect("filename pattern compiles"))
});

/// Extract the suggested save-as name from a Content-Disposition header.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    if header.is_empty() {
        return None;
    }

    for re in FILENAME_PATTERNS.iter() {
        if let Some(caps) = re.captures(header) {
            let token = &caps[1];
            if token.is_empty() {
                continue;
            }
            return Some(decode_component(token).unwrap_or_else(|| token.to_string()));
        }
    }
    None
}

/// Percent-decode a header token with `+` read as a space.
/// Returns `None` on a malformed escape or invalid UTF-8.
fn decode_component(token: &str) -> Option<String> {
    let spaced = token.replace('+', " ");

    let bytes = spaced.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
        }
    }

    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Human readable size for a format card.
pub fn nice_size(bytes: Option<u64>) -> String {
    let bytes = match bytes {
        Some(b) if b > 0 => b as f64,
        _ => return "Unknown".to_string(),
    };

    if bytes < MIB {
        format!("{} KB", to_fixed(bytes / KIB, 1))
    } else {
        format!("{} MB", to_fixed(bytes / MIB, 2))
    }
}

// Ties round away from zero rather than to even.
fn to_fixed(value: f64, digits: usize) -> String {
    let scale = 10f64.powi(digits as i32);
    format!("{:.*}", digits, (value * scale).round() / scale)
}

/// Whole percentage of `received` out of `total`, clamped to 100.
pub fn progress_percent(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (received as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}
