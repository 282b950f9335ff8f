//! Namelist parameter values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single namelist parameter value.
///
/// Only [`ParamValue::Absent`] and empty strings are omitted from rendered
/// decks. Zero, `0.0` and `false` are real settings and are always written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Parameter is known but unset.
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Whether this value is written to the deck.
    pub fn is_emitted(&self) -> bool {
        match self {
            ParamValue::Absent => false,
            ParamValue::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Namelist literal for this value.
    ///
    /// Bare words are written as-is (`calculation = scf`). Strings with
    /// whitespace or namelist punctuation are single-quoted with embedded
    /// quotes doubled.
    pub fn literal(&self) -> String {
        match self {
            ParamValue::Absent => String::new(),
            ParamValue::Bool(true) => ".true.".to_string(),
            ParamValue::Bool(false) => ".false.".to_string(),
            ParamValue::Int(i) => i.to_string(),
            // Debug keeps the decimal point on integral floats ("-10.0").
            ParamValue::Float(f) => format!("{:?}", f),
            ParamValue::Str(s) if needs_quotes(s) => format!("'{}'", s.replace('\'', "''")),
            ParamValue::Str(s) => s.clone(),
        }
    }
}

fn needs_quotes(s: &str) -> bool {
    s.chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | ',' | '=' | '!' | '&' | '\''))
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal())
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Absent)
    }
}
