//! Newline-delimited JSON framing.

use super::{buffer::Entry, error::TransportError};

/// Serialise an entry into one JSON object followed by `\n`.
pub fn serialise_entry(entry: &Entry) -> Result<Vec<u8>, TransportError> {
    let mut buf = Vec::with_capacity(128);
    serde_json::to_writer(&mut buf, entry)
        .map_err(|err| TransportError::Serialise(err.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;

    #[rstest]
    fn frames_with_single_trailing_newline() {
        let entry = Entry::default().with_field("msg", "line\nbreak");
        let bytes = serialise_entry(&entry).expect("entry serialises");
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
        let decoded: Value = serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(decoded, json!({"msg": "line\nbreak"}));
    }

    #[rstest]
    fn empty_entry_is_empty_object() {
        let bytes = serialise_entry(&Entry::default()).expect("entry serialises");
        assert_eq!(bytes, b"{}\n");
    }
}
