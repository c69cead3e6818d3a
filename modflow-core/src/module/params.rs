//! Typed factory parameters
//!
//! Factories declare an ordered list of [`ParamType`]s. Callers either pass
//! typed [`ParamValue`]s directly or a comma-separated string that is
//! converted position by position (management console syntax).

use super::ModuleUrn;
use crate::errors::ParamError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Bool,
    Int,
    Float,
    Decimal,
    Str,
    Path,
    Urn,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::Bool => "bool",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Decimal => "decimal",
            ParamType::Str => "string",
            ParamType::Path => "path",
            ParamType::Urn => "urn",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Str(String),
    Path(PathBuf),
    Urn(ModuleUrn),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Bool(_) => ParamType::Bool,
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Decimal(_) => ParamType::Decimal,
            ParamValue::Str(_) => ParamType::Str,
            ParamValue::Path(_) => ParamType::Path,
            ParamValue::Urn(_) => ParamType::Urn,
        }
    }

    /// Convert raw text to a value of the requested type
    ///
    /// Surrounding whitespace is ignored except for strings, which are kept verbatim.
    pub fn parse(expected: ParamType, raw: &str) -> Result<Self, ParamError> {
        let text = raw.trim();
        let fail = |reason: String| ParamError::Conversion {
            raw: raw.to_string(),
            expected,
            reason,
        };

        let value = match expected {
            ParamType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" => ParamValue::Bool(true),
                "false" => ParamValue::Bool(false),
                _ => return Err(fail("expected 'true' or 'false'".to_string())),
            },
            ParamType::Int => ParamValue::Int(text.parse().map_err(|e| fail(format!("{e}")))?),
            ParamType::Float => {
                ParamValue::Float(text.parse().map_err(|e| fail(format!("{e}")))?)
            }
            ParamType::Decimal => {
                ParamValue::Decimal(Decimal::from_str(text).map_err(|e| fail(format!("{e}")))?)
            }
            ParamType::Str => ParamValue::Str(raw.to_string()),
            ParamType::Path => {
                if text.is_empty() {
                    return Err(fail("path is empty".to_string()));
                }
                ParamValue::Path(PathBuf::from(text))
            }
            ParamType::Urn => {
                ParamValue::Urn(ModuleUrn::parse(text).map_err(|e| fail(e.to_string()))?)
            }
        };

        Ok(value)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            ParamValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            ParamValue::Path(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_urn(&self) -> Option<&ModuleUrn> {
        match self {
            ParamValue::Urn(v) => Some(v),
            _ => None,
        }
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

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<Decimal> for ParamValue {
    fn from(v: Decimal) -> Self {
        ParamValue::Decimal(v)
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

impl From<PathBuf> for ParamValue {
    fn from(v: PathBuf) -> Self {
        ParamValue::Path(v)
    }
}

impl From<ModuleUrn> for ParamValue {
    fn from(v: ModuleUrn) -> Self {
        ParamValue::Urn(v)
    }
}

/// Split a comma-separated parameter list
///
/// An empty (or all-whitespace) string yields no values.
pub fn split_param_list(raw: &str) -> Vec<&str> {
    if raw.trim().is_empty() {
        Vec::new()
    } else {
        raw.split(',').collect()
    }
}
