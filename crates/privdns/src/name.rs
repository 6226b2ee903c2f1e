//! DNS name helpers.

/// Maximum length of a full DNS name (without the trailing dot).
pub const MAX_NAME_LEN: usize = 253;

/// Maximum length of a single label.
pub const MAX_LABEL_LEN: usize = 63;

/// Normalize a name for comparison: trimmed, lowercase, no trailing dot.
pub fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Check whether a (normalized) name is a syntactically valid DNS name.
///
/// Underscores are accepted so service-style labels (`_sip._tcp`) work.
pub fn is_valid(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Split `name` into the part in front of `suffix`.
///
/// Returns `Some("")` when `name` is the suffix itself (the apex), the
/// leading labels when `name` sits below `suffix`, and `None` otherwise.
pub fn strip_suffix<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if name == suffix {
        return Some("");
    }

    name.strip_suffix(suffix)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|rest| !rest.is_empty())
}

/// Join a relative record name and a zone into a fully qualified name.
pub fn qualify(label: &str, zone: &str) -> String {
    if label.is_empty() || label == "@" {
        zone.to_string()
    } else {
        format!("{label}.{zone}")
    }
}
