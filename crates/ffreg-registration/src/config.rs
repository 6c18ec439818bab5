//! Layered parameter lookup.
//!
//! Parameters are string lists keyed by name, as in a registration parameter
//! file. Per-level values are stored one entry per level; a read for level
//! `L` falls back to entry 0 when the list is shorter, and to a caller
//! default when the key is absent.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};

/// Raw keyed access to configuration entries.
pub trait Configuration: Send + Sync {
    /// All entries stored under `key`.
    fn entries(&self, key: &str) -> Option<&[String]>;

    fn has_parameter(&self, key: &str) -> bool {
        self.entries(key).is_some()
    }
}

/// Typed reads on top of [`Configuration`].
pub trait ConfigurationExt: Configuration {
    /// Read `prefix + key` at `entry`, falling back to `default_entry`.
    ///
    /// Returns `Ok(None)` when absent and not `required`, and
    /// [`RegistrationError::MissingParameter`] when absent and `required`.
    fn read_parameter<T>(&self, key: &str, prefix: &str, entry: usize, default_entry: usize, required: bool) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let full_key = format!("{}{}", prefix, key);
        let raw = self
            .entries(&full_key)
            .and_then(|values| values.get(entry).or_else(|| values.get(default_entry)));
        match raw {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| RegistrationError::invalid_configuration(full_key, format!("cannot parse '{}': {}", raw, e))),
            None if required => Err(RegistrationError::MissingParameter { key: full_key }),
            None => Ok(None),
        }
    }

    /// Per-level read with a default.
    fn read_or<T>(&self, key: &str, level: usize, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.read_parameter(key, "", level, 0, false)?.unwrap_or(default))
    }

    /// Every entry of `key` parsed, or an empty list when absent.
    fn read_all<T>(&self, key: &str) -> Result<Vec<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(values) = self.entries(key) else {
            return Ok(Vec::new());
        };
        values
            .iter()
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| RegistrationError::invalid_configuration(key, format!("cannot parse '{}': {}", raw, e)))
            })
            .collect()
    }
}

impl<C: Configuration + ?Sized> ConfigurationExt for C {}

/// In-memory parameter map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap {
    entries: BTreeMap<String, Vec<String>>,
}

/// TOML value accepted for a key: a scalar or a flat array of scalars.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    One(Scalar),
    Many(Vec<Scalar>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{}", v),
        }
    }
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Self::set`].
    pub fn with<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.set(key, values);
        self
    }

    /// Replace the entries of `key`.
    pub fn set<I, V>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.entries
            .insert(key.into(), values.into_iter().map(|v| v.to_string()).collect());
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a TOML document of `Key = value` or `Key = [values]` lines.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawEntry> =
            toml::from_str(text).map_err(|e| RegistrationError::invalid_configuration("<toml>", e.to_string()))?;
        let entries = raw
            .into_iter()
            .map(|(key, entry)| {
                let values = match entry {
                    RawEntry::One(scalar) => vec![scalar.to_string()],
                    RawEntry::Many(scalars) => scalars.iter().map(Scalar::to_string).collect(),
                };
                (key, values)
            })
            .collect();
        Ok(Self { entries })
    }

    /// Serialize as TOML with every entry as a string array.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| RegistrationError::invalid_configuration("<toml>", e.to_string()))
    }
}

impl Configuration for ParameterMap {
    fn entries(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_fallback_to_first_entry() {
        let config = ParameterMap::new().with("Weight", [0.5, 2.0]);
        assert_eq!(config.read_or("Weight", 0, 1.0).unwrap(), 0.5);
        assert_eq!(config.read_or("Weight", 1, 1.0).unwrap(), 2.0);
        assert_eq!(config.read_or("Weight", 4, 1.0).unwrap(), 0.5);
        assert_eq!(config.read_or("Missing", 4, 1.0).unwrap(), 1.0);
    }

    #[test]
    fn test_required_missing() {
        let config = ParameterMap::new();
        let result = config.read_parameter::<bool>("ErodeMask", "", 0, 0, true);
        assert!(matches!(result, Err(RegistrationError::MissingParameter { key }) if key == "ErodeMask"));
    }

    #[test]
    fn test_unparsable_value() {
        let config = ParameterMap::new().with("ErodeMask", ["maybe"]);
        let result = config.read_or("ErodeMask", 0, true);
        assert!(matches!(result, Err(RegistrationError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_prefix() {
        let config = ParameterMap::new().with("FixedSpacing", [2]);
        assert_eq!(config.read_parameter::<u32>("Spacing", "Fixed", 0, 0, false).unwrap(), Some(2));
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
            ErodeMask = false
            ErodeFixedMask = [true, false]
            GridSpacingSchedule = [4.0, 2.0, 1.0]
            MaskErosionBackend = "tensor"
            RigiditySampleSubdivision = 2
        "#;
        let config = ParameterMap::from_toml_str(text).unwrap();
        assert_eq!(config.read_or("ErodeMask", 0, true).unwrap(), false);
        assert_eq!(config.read_or("ErodeFixedMask", 1, true).unwrap(), false);
        assert_eq!(config.read_all::<f64>("GridSpacingSchedule").unwrap(), vec![4.0, 2.0, 1.0]);
        assert_eq!(config.read_or("MaskErosionBackend", 0, String::new()).unwrap(), "tensor");
        assert_eq!(config.read_or("RigiditySampleSubdivision", 0, 1usize).unwrap(), 2);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ParameterMap::new().with("A", [1, 2]).with("B", ["x"]);
        let text = config.to_toml_string().unwrap();
        assert_eq!(ParameterMap::from_toml_str(&text).unwrap(), config);
    }
}
