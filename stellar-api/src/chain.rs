//! The timestamp chain threaded through a producer-consumer invocation.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::wire::{self, WireError};

/// Ordered hop-completion timestamps in epoch milliseconds.
///
/// The first hop seeds the chain with a single timestamp and every further hop appends exactly one.
/// On the wire the chain is encoded as `[t0 t1 t2]`, see [`wire`](crate::wire).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimestampChain(Vec<u64>);

impl TimestampChain {
    /// Creates a chain seeded with the current time, as done by the first hop.
    pub fn seeded() -> Self {
        let mut chain = Self::default();
        chain.append_now();
        chain
    }

    /// Creates a chain from existing timestamps.
    pub fn from_millis(timestamps: Vec<u64>) -> Self {
        Self(timestamps)
    }

    /// Appends the current time to the chain.
    ///
    /// The appended timestamp is never smaller than the previous one, even if the wall clock steps
    /// backwards between two hops on the same host.
    pub fn append_now(&mut self) -> u64 {
        let now = now_millis();
        let timestamp = self.0.last().map_or(now, |&last| now.max(last));
        self.0.push(timestamp);
        timestamp
    }

    /// Parses a wire-encoded chain like `[1622812345678 1622812345999]`.
    pub fn decode(encoded: &str) -> Result<Self, WireError> {
        let elements = wire::decode_list(encoded)?;
        Self::from_strings(elements.iter().filter(|element| !element.is_empty()))
    }

    /// Parses timestamps given as decimal strings, as found in the JSON response body.
    pub fn from_strings<I, S>(elements: I) -> Result<Self, WireError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        elements
            .into_iter()
            .map(|element| {
                let element = element.as_ref();
                element
                    .parse()
                    .map_err(|_| WireError::InvalidTimestamp(element.to_owned()))
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }

    /// Returns the wire encoding of this chain.
    pub fn encode(&self) -> String {
        wire::encode_numbers(self.0.iter().copied())
    }

    /// Returns the timestamps as decimal strings.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(u64::to_string).collect()
    }

    /// Returns the timestamps in epoch milliseconds.
    pub fn as_millis(&self) -> &[u64] {
        &self.0
    }

    /// Returns the number of recorded hops.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no hop has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TimestampChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_chain_has_one_element() {
        assert_eq!(TimestampChain::seeded().len(), 1);
    }

    #[test]
    fn append_grows_by_one_and_never_decreases() {
        let mut chain = TimestampChain::seeded();
        for expected_len in 2..50 {
            chain.append_now();
            assert_eq!(chain.len(), expected_len);
        }
        assert!(chain.as_millis().windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn append_clamps_to_previous_timestamp() {
        let mut chain = TimestampChain::from_millis(vec![u64::MAX - 1]);
        assert_eq!(chain.append_now(), u64::MAX - 1);
    }

    #[test]
    fn decodes_and_encodes() {
        let chain = TimestampChain::decode("[100 200 300]").unwrap();
        assert_eq!(chain.as_millis(), &[100, 200, 300]);
        assert_eq!(chain.encode(), "[100 200 300]");
        assert_eq!(chain.to_string(), "[100 200 300]");
    }

    #[test]
    fn empty_wire_chain_is_empty() {
        assert!(TimestampChain::decode("[]").unwrap().is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            TimestampChain::decode("[1 two]"),
            Err(WireError::InvalidTimestamp("two".into()))
        );
    }
}
