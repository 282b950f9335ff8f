//! Namelist input decks for the post-processing tools.
//!
//! A [`Deck`] is an ordered list of [`Section`]s, each an ordered list of
//! `(key, value)` parameters. Rendering follows the namelist layout:
//!
//! ```text
//! &BANDS
//!     outdir = './results/WS2',
//!     prefix = WS2,
//! /
//! ```
//!
//! Keys starting with [`DISABLED_PREFIX`] stay in the model but are never
//! written; unset values ([`ParamValue::Absent`], empty strings) are skipped.
//!
//! # Example
//!
//! ```
//! use espresso_forge::deck::{Deck, Section};
//!
//! let deck = Deck::new().with_section(
//!     Section::new("dos")
//!         .param("prefix", "WS2")
//!         .param("DeltaE", 0.1)
//!         .param("!emin", -10),
//! );
//! assert_eq!(deck.render(), "&DOS\n    prefix = WS2,\n    DeltaE = 0.1,\n/");
//! ```

pub mod value;

use std::fmt;
use std::path::Path;

use serde_yaml::Value;

use crate::error::DeckError;

pub use value::ParamValue;

/// Keys with this prefix are kept in the model but never emitted.
pub const DISABLED_PREFIX: char = '!';

/// One `&NAME ... /` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    name: String,
    params: Vec<(String, ParamValue)>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Builder form of [`Section::set`].
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets `key`, replacing an existing value in place or appending.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.params.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[(String, ParamValue)] {
        &self.params
    }

    /// Parameters that will be written.
    pub fn emitted(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params
            .iter()
            .filter(|(k, v)| !k.starts_with(DISABLED_PREFIX) && v.is_emitted())
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn render(&self) -> String {
        let mut out = format!("&{}\n", self.name.to_uppercase());
        for (key, value) in self.emitted() {
            out.push_str(&format!("    {} = {},\n", key, value));
        }
        out.push('/');
        out
    }
}

/// An ordered collection of sections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deck {
    sections: Vec<Section>,
}

impl Deck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn push(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Section by name, compared case-insensitively.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Renders every section in order, separated by newlines.
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(Section::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Writes the rendered deck to `path`, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> Result<(), DeckError> {
        std::fs::write(path, self.render())?;
        tracing::debug!(path = %path.display(), sections = self.sections.len(), "Wrote input deck");
        Ok(())
    }

    /// Parses a YAML description: a mapping of section names to mappings of
    /// parameters. Document order is preserved; `null` values become
    /// [`ParamValue::Absent`].
    ///
    /// ```yaml
    /// control:
    ///   calculation: scf
    ///   tstress: true
    ///   nstep: 0
    /// ```
    pub fn from_yaml_str(text: &str) -> Result<Self, DeckError> {
        let document: Value = serde_yaml::from_str(text)?;
        let Value::Mapping(root) = document else {
            return Err(DeckError::InvalidDocument(
                "top level must be a mapping of section names".to_string(),
            ));
        };

        let mut deck = Deck::new();
        for (name, params) in root {
            let name = scalar_key(&name).ok_or_else(|| {
                DeckError::InvalidDocument(format!("section name must be a string: {:?}", name))
            })?;

            let mut section = Section::new(name.clone());
            match params {
                Value::Mapping(params) => {
                    for (key, value) in params {
                        let key = scalar_key(&key).ok_or_else(|| {
                            DeckError::InvalidDocument(format!(
                                "parameter name in '{}' must be a string: {:?}",
                                name, key
                            ))
                        })?;
                        let value = param_from_yaml(&name, &key, value)?;
                        section.set(key, value);
                    }
                }
                Value::Null => {}
                _ => {
                    return Err(DeckError::InvalidDocument(format!(
                        "section '{}' must be a mapping",
                        name
                    )))
                }
            }
            deck.push(section);
        }

        Ok(deck)
    }

    /// Reads and parses a YAML description from disk.
    pub fn from_yaml_file(path: &Path) -> Result<Self, DeckError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

impl fmt::Display for Deck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn param_from_yaml(section: &str, key: &str, value: Value) -> Result<ParamValue, DeckError> {
    let unsupported = |reason: &str| DeckError::UnsupportedValue {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    };

    match value {
        Value::Null => Ok(ParamValue::Absent),
        Value::Bool(b) => Ok(ParamValue::Bool(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ParamValue::Int(i))
            } else if let Some(f) = n.as_f64().filter(|f| f.is_finite()) {
                Ok(ParamValue::Float(f))
            } else {
                Err(unsupported("number is out of range or not finite"))
            }
        }
        Value::String(s) => Ok(ParamValue::Str(s)),
        Value::Sequence(_) => Err(unsupported("sequences are not namelist scalars")),
        Value::Mapping(_) => Err(unsupported("nested mappings are not namelist scalars")),
        Value::Tagged(tagged) => param_from_yaml(section, key, tagged.value),
    }
}
