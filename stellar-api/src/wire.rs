//! Bracketed list encoding shared with already-deployed functions.
//!
//! Lists of chain IDs and timestamps travel as a single string: the elements separated by single
//! spaces and enclosed in square brackets, e.g. `[14 35 8]`. The format cannot represent elements
//! that contain spaces or brackets, so it is only used at the wire boundary. Callers should
//! convert into a proper list with [`decode_list`] or [`parse_ids`] right away.
//!
//! Decoding keeps one historic quirk: the empty list `[]` decodes to a single empty element
//! `[""]`. Use [`parse_ids`] to get a strict list without empty entries.

use std::fmt::Write;

/// Errors that can occur when decoding a bracketed list.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    /// The input does not contain an opening bracket.
    #[error("list {0:?} is missing an opening bracket")]
    MissingBracket(String),

    /// A timestamp element is not a valid epoch-millisecond integer.
    #[error("invalid timestamp {0:?} in chain")]
    InvalidTimestamp(String),
}

/// Encodes the given elements as `[a b c]`.
pub fn encode_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut encoded = String::from("[");
    for (index, item) in items.into_iter().enumerate() {
        if index > 0 {
            encoded.push(' ');
        }
        encoded.push_str(item.as_ref());
    }
    encoded.push(']');
    encoded
}

/// Encodes a list of integers as `[1 2 3]`.
pub fn encode_numbers<I>(items: I) -> String
where
    I: IntoIterator<Item = u64>,
{
    let mut encoded = String::from("[");
    for (index, item) in items.into_iter().enumerate() {
        if index > 0 {
            encoded.push(' ');
        }
        // Writing into a `String` cannot fail.
        let _ = write!(encoded, "{item}");
    }
    encoded.push(']');
    encoded
}

/// Decodes `[14 35 8]` into `["14", "35", "8"]`.
///
/// Everything after the first closing bracket is ignored. The empty list `[]` decodes to `[""]`.
pub fn decode_list(encoded: &str) -> Result<Vec<String>, WireError> {
    let before_close = encoded.split(']').next().unwrap_or_default();
    let inner = before_close
        .split('[')
        .nth(1)
        .ok_or_else(|| WireError::MissingBracket(encoded.to_owned()))?;

    Ok(inner.split(' ').map(str::to_owned).collect())
}

/// Decodes a list of chain IDs, dropping empty elements.
///
/// Unlike [`decode_list`], `[]` yields an empty list here.
pub fn parse_ids(encoded: &str) -> Result<Vec<String>, WireError> {
    let mut ids = decode_list(encoded)?;
    ids.retain(|id| !id.is_empty());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_numbers() {
        assert_eq!(decode_list("[14 35 8]").unwrap(), vec!["14", "35", "8"]);
    }

    #[test]
    fn empty_list_decodes_to_single_empty_element() {
        assert_eq!(decode_list("[]").unwrap(), vec![""]);
        assert!(parse_ids("[]").unwrap().is_empty());
    }

    #[test]
    fn ignores_trailing_content() {
        assert_eq!(decode_list("[a b] [c]").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn rejects_missing_bracket() {
        assert_eq!(
            decode_list("14 35"),
            Err(WireError::MissingBracket("14 35".into()))
        );
    }

    #[test]
    fn encodes_like_deployed_functions() {
        assert_eq!(encode_list(["a", "b"]), "[a b]");
        assert_eq!(encode_list(Vec::<String>::new()), "[]");
        assert_eq!(encode_numbers([1, 22, 333]), "[1 22 333]");
    }

    #[test]
    fn round_trips_non_empty_lists() {
        let ids = vec![
            "gateway-1".to_owned(),
            "gateway-2".to_owned(),
            "x".to_owned(),
        ];
        assert_eq!(decode_list(&encode_list(&ids)).unwrap(), ids);
        assert_eq!(parse_ids(&encode_list(&ids)).unwrap(), ids);
    }
}
