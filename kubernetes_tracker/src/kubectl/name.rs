//! Validation of the names Kubernetes accepts for objects and labels, see
//! https://kubernetes.io/docs/concepts/overview/working-with-objects/names/ and
//! https://kubernetes.io/docs/concepts/overview/working-with-objects/labels/#syntax-and-character-set.

use std::borrow::Cow;

pub const MAX_LABEL_LEN: usize = 63;

/// The number of random characters the API server appends to a `generateName`.
const GENERATED_SUFFIX_LEN: usize = 5;

fn is_ascii_lowercase_alphanumeric(byte: u8) -> bool {
    matches!(byte, b'a'..=b'z' | b'0'..=b'9')
}

fn is_ascii_lowercase_alphanumeric_or_dash(byte: u8) -> bool {
    matches!(byte, b'a'..=b'z' | b'0'..=b'9' | b'-')
}

fn is_label_value_inner(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.')
}

/// Returns true if all bytes satisfy `inner` and the first and last bytes satisfy `outer`.
fn is_delimited(value: &[u8], outer: fn(u8) -> bool, inner: fn(u8) -> bool) -> bool {
    match value {
        [] => false,
        [single] => outer(*single),
        [first, middle @ .., last] => {
            outer(*first) && outer(*last) && middle.iter().copied().all(inner)
        }
    }
}

/// Returns true if the input matches the regex `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$` and is at most 63 characters long.
/// Job names and namespaces must be RFC 1123 labels.
pub fn is_rfc_1123_label(value: &str) -> bool {
    value.len() <= MAX_LABEL_LEN
        && is_delimited(
            value.as_bytes(),
            is_ascii_lowercase_alphanumeric,
            is_ascii_lowercase_alphanumeric_or_dash,
        )
}

/// Returns true if the input matches `^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$` and is at
/// most 253 characters long.
pub fn is_rfc_1123_subdomain(value: &str) -> bool {
    value.len() <= 253 && value.split('.').all(is_rfc_1123_label)
}

/// Returns true if the input can be used as a label value: empty, or at most 63 characters that start and end with
/// an alphanumeric character and contain only alphanumerics, `-`, `_` and `.`.
pub fn is_label_value(value: &str) -> bool {
    value.is_empty()
        || value.len() <= MAX_LABEL_LEN
            && is_delimited(
                value.as_bytes(),
                |byte| byte.is_ascii_alphanumeric(),
                is_label_value_inner,
            )
}

/// Returns true if the input can be used as a label key: a non-empty label value, optionally prefixed by a DNS
/// subdomain and a `/`.
pub fn is_label_key(key: &str) -> bool {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    prefix.map_or(true, is_rfc_1123_subdomain) && !name.is_empty() && is_label_value(name)
}

/// Lossily converts the input into a label adhering to `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$` of at most `max_len`
/// characters. Uppercase characters are lowercased and runs of other characters are replaced by a single dash.
/// Returns `None` if the input has no alphanumeric characters.
pub fn to_rfc_1123_label_lossy(input: &str, max_len: usize) -> Option<Cow<str>> {
    if input.len() <= max_len && is_rfc_1123_label(input) {
        return Some(Cow::Borrowed(input));
    }

    let mut output = String::with_capacity(input.len().min(max_len));
    let mut pending_dash = false;
    for byte in input.bytes().map(|byte| byte.to_ascii_lowercase()) {
        if is_ascii_lowercase_alphanumeric(byte) {
            if pending_dash && !output.is_empty() {
                if output.len() + 2 > max_len {
                    break;
                }
                output.push('-');
            }
            if output.len() + 1 > max_len {
                break;
            }
            output.push(char::from(byte));
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }

    if output.is_empty() {
        return None;
    }

    debug_assert!(is_rfc_1123_label(&output));

    Some(Cow::Owned(output))
}

/// Returns a `generateName` for objects created on behalf of the given job session. The generated names are valid
/// RFC 1123 labels.
pub fn generate_name_for(session: &str) -> String {
    const FALLBACK: &str = "drmaa2";
    let max_prefix_len = MAX_LABEL_LEN - GENERATED_SUFFIX_LEN - 1;
    let prefix = to_rfc_1123_label_lossy(session, max_prefix_len);
    let mut name = prefix.as_deref().unwrap_or(FALLBACK).to_string();
    name.push('-');
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_1123_labels() {
        assert!(is_rfc_1123_label("a"));
        assert!(is_rfc_1123_label("0"));
        assert!(is_rfc_1123_label("sleep-10"));
        assert!(!is_rfc_1123_label(""));
        assert!(!is_rfc_1123_label("-a"));
        assert!(!is_rfc_1123_label("a-"));
        assert!(!is_rfc_1123_label("A"));
        assert!(!is_rfc_1123_label("a.b"));
        assert!(!is_rfc_1123_label(&"a".repeat(64)));
        assert!(is_rfc_1123_label(&"a".repeat(63)));
    }

    #[test]
    fn subdomains_and_label_keys() {
        assert!(is_rfc_1123_subdomain("example.com"));
        assert!(!is_rfc_1123_subdomain("example..com"));
        assert!(is_label_key("app"));
        assert!(is_label_key("app.kubernetes.io/name"));
        assert!(is_label_key("Team_Name"));
        assert!(!is_label_key("/name"));
        assert!(!is_label_key("example.com/"));
        assert!(!is_label_key("a b"));
    }

    #[test]
    fn label_values() {
        assert!(is_label_value(""));
        assert!(is_label_value("Session_1.a-b"));
        assert!(!is_label_value("_a"));
        assert!(!is_label_value("a."));
        assert!(!is_label_value("a/b"));
        assert!(!is_label_value(&"a".repeat(64)));
    }

    #[test]
    fn to_rfc_1123_label_lossy_works() {
        assert_eq!(to_rfc_1123_label_lossy("", 63), None);
        assert_eq!(to_rfc_1123_label_lossy("-._", 63), None);
        assert_eq!(to_rfc_1123_label_lossy("a", 63), Some(Cow::Borrowed("a")));
        assert_eq!(
            to_rfc_1123_label_lossy("My_Session", 63),
            Some(Cow::Owned("my-session".to_string()))
        );
        assert_eq!(
            to_rfc_1123_label_lossy("--a..b--", 63),
            Some(Cow::Owned("a-b".to_string()))
        );
        assert_eq!(
            to_rfc_1123_label_lossy("abc-def", 4),
            Some(Cow::Owned("abc".to_string()))
        );
    }

    #[test]
    fn generate_names_leave_room_for_the_suffix() {
        assert_eq!(generate_name_for("nightly"), "nightly-");
        assert_eq!(generate_name_for("..."), "drmaa2-");
        let long = generate_name_for(&"x".repeat(100));
        assert_eq!(long.len(), MAX_LABEL_LEN - GENERATED_SUFFIX_LEN);
        assert!(long.ends_with("x-"));
    }
}
