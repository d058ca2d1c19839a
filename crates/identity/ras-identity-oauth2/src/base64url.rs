//! Unpadded URL-safe base64.

use base64::{
    DecodeError, Engine,
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};

pub fn encode<T: AsRef<[u8]>>(bytes: T) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Inverse of [`encode`]. Input is re-padded before decoding, so padded
/// input and the standard `+`/`/` alphabet are accepted too.
pub fn decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    let mut padded: String = input
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    URL_SAFE.decode(padded)
}
