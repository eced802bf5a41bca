//! Shared utility functions used across multiple modules.

use uuid::Uuid;

/// Prefix carried by every locally generated record ID.
///
/// Server-assigned IDs never start with this prefix, so the two ID spaces
/// cannot collide.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Generate a record ID for a locally created record.
///
/// Uses UUID v7 so IDs sort by creation time, with the `local-` prefix
/// marking the record as not-yet-confirmed by the server.
#[must_use]
pub fn local_record_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7())
}

/// Check whether an ID was generated locally (vs. assigned by the server).
#[must_use]
pub fn is_local_record_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Current Unix timestamp in milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
#[must_use]
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
#[must_use]
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
#[must_use]
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_record_ids_are_prefixed_and_unique() {
        let a = local_record_id();
        let b = local_record_id();
        assert!(is_local_record_id(&a));
        assert!(is_local_record_id(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn server_ids_are_not_local() {
        assert!(!is_local_record_id("0198c9f2-aaaa-7bbb-8ccc-000000000001"));
        assert!(!is_local_record_id(""));
    }

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://example.com ".to_string())),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }
}
