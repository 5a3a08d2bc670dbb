use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use super::register::RegType;
use crate::text::Text;

/// A runtime register value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i32),
    Float(f32),
    Text(Text),
}

impl Value {
    pub fn zero(ty: RegType) -> Value {
        match ty {
            RegType::Text => Value::Text(Text::empty()),
            RegType::Int => Value::Int(0),
            RegType::Float => Value::Float(0.0),
        }
    }

    pub fn ty(&self) -> RegType {
        match self {
            Value::Int(_) => RegType::Int,
            Value::Float(_) => RegType::Float,
            Value::Text(_) => RegType::Text,
        }
    }

    /// Converts to `ty`. Text parses after trimming, falling back to zero.
    pub fn coerce(self, ty: RegType) -> Value {
        match (self, ty) {
            (v @ Value::Text(_), RegType::Text)
            | (v @ Value::Int(_), RegType::Int)
            | (v @ Value::Float(_), RegType::Float) => v,
            (v, RegType::Text) => Value::Text(v.to_text()),
            (Value::Text(t), RegType::Int) => Value::Int(t.trim().to_string_lossy().parse().unwrap_or(0)),
            (Value::Text(t), RegType::Float) => {
                Value::Float(t.trim().to_string_lossy().parse().unwrap_or(0.0))
            }
            (Value::Float(f), RegType::Int) => Value::Int(f as i32),
            (Value::Int(n), RegType::Float) => Value::Float(n as f32),
        }
    }

    pub fn to_text(&self) -> Text {
        match self {
            Value::Text(t) => t.clone(),
            other => Text::from(other.to_string()),
        }
    }

    /// Compares against `other` after coercing it to this value's type.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other.clone().coerce(self.ty())) {
            (Value::Int(a), Value::Int(b)) => a.cmp(&b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(&b),
            (Value::Text(a), Value::Text(b)) => a.cmp(&b),
            _ => unreachable!("coerce returns the requested type"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            // Whole floats keep one decimal so the text form still reads as a float.
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e7 => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(t) => write!(f, "{t}"),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Text::from(s))
    }
}

impl From<Text> for Value {
    fn from(t: Text) -> Self {
        Value::Text(t)
    }
}

// ── Keys ────────────────────────────────────────────────────────────

/// A key on the terminal's keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    #[serde(rename = "TRIGGER")]
    Trigger,
    Q1,
    Q2,
    #[serde(rename = "BS")]
    Backspace,
    #[serde(rename = "CLR")]
    Clear,
    #[serde(rename = "0")]
    Num0,
    #[serde(rename = "1")]
    Num1,
    #[serde(rename = "2")]
    Num2,
    #[serde(rename = "3")]
    Num3,
    #[serde(rename = "4")]
    Num4,
    #[serde(rename = "5")]
    Num5,
    #[serde(rename = "6")]
    Num6,
    #[serde(rename = "7")]
    Num7,
    #[serde(rename = "8")]
    Num8,
    #[serde(rename = "9")]
    Num9,
    #[serde(rename = "ENT")]
    Enter,
    #[serde(rename = "PERIOD")]
    Period,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
}

/// Most special keys a single input instruction can carry.
pub const SPECIAL_KEYS_PER_COMMAND: usize = 10;

static BY_CODE: LazyLock<HashMap<i32, Key>> =
    LazyLock::new(|| Key::ALL.iter().map(|&k| (k.code(), k)).collect());

impl Key {
    pub const ALL: &'static [Key] = &[
        Key::Trigger, Key::Q1, Key::Q2, Key::Backspace, Key::Clear,
        Key::Num0, Key::Num1, Key::Num2, Key::Num3, Key::Num4,
        Key::Num5, Key::Num6, Key::Num7, Key::Num8, Key::Num9,
        Key::Enter, Key::Period,
        Key::F1, Key::F2, Key::F3, Key::F4, Key::F5, Key::F6, Key::F7, Key::F8,
    ];

    pub fn code(self) -> i32 {
        match self {
            Key::Trigger => 225,
            Key::Q1 => 226,
            Key::Q2 => 227,
            Key::Backspace => 8,
            Key::Clear => 24,
            Key::Num0 => 48,
            Key::Num1 => 49,
            Key::Num2 => 50,
            Key::Num3 => 51,
            Key::Num4 => 52,
            Key::Num5 => 53,
            Key::Num6 => 54,
            Key::Num7 => 55,
            Key::Num8 => 56,
            Key::Num9 => 57,
            Key::Enter => 13,
            Key::Period => 46,
            Key::F1 => 241,
            Key::F2 => 242,
            Key::F3 => 243,
            Key::F4 => 244,
            Key::F5 => 245,
            Key::F6 => 246,
            Key::F7 => 247,
            Key::F8 => 248,
        }
    }

    pub fn from_code(code: i32) -> Option<Key> {
        BY_CODE.get(&code).copied()
    }

    /// Digit key for `n` in `0..=9`.
    pub fn digit(n: u8) -> Option<Key> {
        if n <= 9 { Key::from_code(48 + n as i32) } else { None }
    }

    /// Keys that type a visible character.
    pub fn has_glyph(self) -> bool {
        matches!(self.code(), 46 | 48..=57)
    }

    pub fn name(self) -> &'static str {
        match self {
            Key::Trigger => "TRIGGER",
            Key::Q1 => "Q1",
            Key::Q2 => "Q2",
            Key::Backspace => "BS",
            Key::Clear => "CLR",
            Key::Num0 => "0",
            Key::Num1 => "1",
            Key::Num2 => "2",
            Key::Num3 => "3",
            Key::Num4 => "4",
            Key::Num5 => "5",
            Key::Num6 => "6",
            Key::Num7 => "7",
            Key::Num8 => "8",
            Key::Num9 => "9",
            Key::Enter => "ENT",
            Key::Period => "PERIOD",
            Key::F1 => "F1",
            Key::F2 => "F2",
            Key::F3 => "F3",
            Key::F4 => "F4",
            Key::F5 => "F5",
            Key::F6 => "F6",
            Key::F7 => "F7",
            Key::F8 => "F8",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Key> for Value {
    fn from(k: Key) -> Self {
        Value::Int(k.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_numeric_to_text() {
        assert_eq!(Value::Int(42).coerce(RegType::Text), Value::from("42"));
        assert_eq!(Value::Float(1.5).coerce(RegType::Text), Value::from("1.5"));
        assert_eq!(Value::Float(3.0).coerce(RegType::Text), Value::from("3.0"));
    }

    #[test]
    fn coerce_text_to_numeric_defaults_to_zero() {
        assert_eq!(Value::from(" 12 ").coerce(RegType::Int), Value::Int(12));
        assert_eq!(Value::from("abc").coerce(RegType::Int), Value::Int(0));
        assert_eq!(Value::from("2.5").coerce(RegType::Float), Value::Float(2.5));
        assert_eq!(Value::from("").coerce(RegType::Float), Value::Float(0.0));
    }

    #[test]
    fn compare_coerces_right_side() {
        assert_eq!(Value::Int(5).compare(&Value::from("5")), Ordering::Equal);
        assert_eq!(Value::Int(3).compare(&Value::Int(5)), Ordering::Less);
        assert_eq!(Value::from("b").compare(&Value::from("a")), Ordering::Greater);
        assert_eq!(Value::Float(1.5).compare(&Value::Int(1)), Ordering::Greater);
    }

    #[test]
    fn key_codes() {
        assert_eq!(Key::Enter.code(), 13);
        assert_eq!(Key::from_code(241), Some(Key::F1));
        assert_eq!(Key::from_code(1000), None);
        assert_eq!(Key::digit(7), Some(Key::Num7));
        assert!(Key::Num3.has_glyph());
        assert!(!Key::F2.has_glyph());
        assert_eq!(Value::from(Key::Q1), Value::Int(226));
    }

    #[test]
    fn key_serde_uses_keytop_names() {
        assert_eq!(serde_json::to_string(&Key::Enter).unwrap(), "\"ENT\"");
        let k: Key = serde_json::from_str("\"3\"").unwrap();
        assert_eq!(k, Key::Num3);
    }
}
