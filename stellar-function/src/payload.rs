//! Payload generation for the first hop of a chain.

use std::fmt;

use rand::Rng;
use rand::distr::{Alphanumeric, SampleString};

/// Length of the random suffix of object storage keys.
const KEY_SUFFIX_LEN: usize = 20;

/// Cuts payloads of arbitrary length from a pre-generated alphanumeric buffer.
///
/// The buffer is generated once at startup. Payloads repeat or truncate it to the requested length.
pub struct PayloadGenerator {
    buffer: String,
}

impl PayloadGenerator {
    /// Creates a generator with a random buffer of `buffer_len` alphanumeric characters.
    ///
    /// The buffer holds at least one character.
    pub fn new<R: Rng + ?Sized>(buffer_len: usize, rng: &mut R) -> Self {
        Self {
            buffer: Alphanumeric.sample_string(rng, buffer_len.max(1)),
        }
    }

    /// Returns a payload of exactly `len` bytes.
    pub fn generate(&self, len: usize) -> String {
        let mut payload = String::with_capacity(len);
        while payload.len() < len {
            let take = (len - payload.len()).min(self.buffer.len());
            // The buffer is ASCII, so every byte offset is a character boundary.
            payload.push_str(&self.buffer[..take]);
        }
        payload
    }
}

impl fmt::Debug for PayloadGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadGenerator")
            .field("buffer_len", &self.buffer.len())
            .finish()
    }
}

/// Returns a fresh object key for a payload of `len` bytes.
///
/// Keys look like `transfer-payload-1024bytes-0aZ...`.
pub fn storage_key(len: usize) -> String {
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), KEY_SUFFIX_LEN);
    format!("transfer-payload-{len}bytes-{suffix}")
}
