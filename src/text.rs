//! Immutable byte-string buffer used for every textual payload.
//!
//! Terminal text is a sequence of single-byte cells; all operations are byte
//! indexed and return a new buffer rather than mutating in place.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default padding byte.
pub const FILL: u8 = b' ';

#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Text(Vec<u8>);

impl Text {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Text(bytes.into())
    }

    pub fn empty() -> Self {
        Text(Vec::new())
    }

    /// `len` copies of `byte`.
    pub fn filled(len: usize, byte: u8) -> Self {
        Text(vec![byte; len])
    }

    pub fn spaces(len: usize) -> Self {
        Self::filled(len, FILL)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Bytes `[start, start + len)`, clipped to the buffer.
    pub fn slice(&self, start: usize, len: usize) -> Text {
        let start = start.min(self.0.len());
        let end = start.saturating_add(len).min(self.0.len());
        Text(self.0[start..end].to_vec())
    }

    /// Truncates or right-pads with `fill` to exactly `size` bytes.
    pub fn force_size(&self, size: usize, fill: u8) -> Text {
        let mut bytes = self.0.clone();
        bytes.resize(size, fill);
        Text(bytes)
    }

    /// Left-pads with `fill` to `size` bytes; longer buffers are truncated.
    pub fn force_size_right(&self, size: usize, fill: u8) -> Text {
        if self.0.len() >= size {
            return Text(self.0[..size].to_vec());
        }
        let mut bytes = vec![fill; size - self.0.len()];
        bytes.extend_from_slice(&self.0);
        Text(bytes)
    }

    pub fn append(&self, other: &Text) -> Text {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(&other.0);
        Text(bytes)
    }

    /// Overwrites the bytes at `pos` with `other`, growing with spaces when
    /// `other` runs past the end.
    pub fn replace(&self, pos: usize, other: &Text) -> Text {
        let mut bytes = self.0.clone();
        let end = pos + other.len();
        if bytes.len() < end {
            bytes.resize(end, FILL);
        }
        bytes[pos..end].copy_from_slice(&other.0);
        Text(bytes)
    }

    /// Strips leading and trailing fill bytes.
    pub fn trim(&self) -> Text {
        let start = self.0.iter().position(|&b| b != FILL);
        match start {
            None => Text::empty(),
            Some(start) => {
                let end = self.0.iter().rposition(|&b| b != FILL).map_or(start, |e| e + 1);
                Text(self.0[start..end].to_vec())
            }
        }
    }

    pub fn remove_last(&self) -> Text {
        let mut bytes = self.0.clone();
        bytes.pop();
        Text(bytes)
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text(s.as_bytes().to_vec())
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Text(s.into_bytes())
    }
}

impl From<&[u8]> for Text {
    fn from(b: &[u8]) -> Self {
        Text(b.to_vec())
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for Text {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Text::from)
    }
}
