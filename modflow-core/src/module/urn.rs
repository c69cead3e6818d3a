//! Module URN - structured module address
//!
//! A URN is the triple `(provider, type, instance)` rendered as
//! `provider:type:instance`. Fewer components make a *prefix*:
//!
//! ```text
//! copier                   provider prefix
//! copier:list              provider URN (identifies a factory)
//! copier:list:instance-3   instance URN (identifies a live module)
//! ```
//!
//! Components are non-empty and limited to `[A-Za-z0-9_.-]`, so the
//! rendered form always parses back to the same URN.

use crate::errors::UrnError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = ':';
const MAX_COMPONENTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleUrn {
    provider: String,
    kind: String,
    instance: String,
}

impl ModuleUrn {
    /// Parse `provider[:type[:instance]]`
    pub fn parse(text: &str) -> Result<Self, UrnError> {
        if text.is_empty() {
            return Err(UrnError::Empty);
        }

        let parts: Vec<&str> = text.split(SEPARATOR).collect();
        if parts.len() > MAX_COMPONENTS {
            return Err(UrnError::TooManyComponents(text.to_string()));
        }

        for part in &parts {
            if part.is_empty() {
                return Err(UrnError::EmptyComponent(text.to_string()));
            }
            if let Some(ch) = part.chars().find(|c| !is_valid_char(*c)) {
                return Err(UrnError::InvalidCharacter {
                    urn: text.to_string(),
                    ch,
                });
            }
        }

        let mut parts = parts.into_iter().map(str::to_string);
        Ok(Self {
            provider: parts.next().unwrap_or_default(),
            kind: parts.next().unwrap_or_default(),
            instance: parts.next().unwrap_or_default(),
        })
    }

    /// Build a full instance URN from its three components
    pub fn new(provider: &str, kind: &str, instance: &str) -> Result<Self, UrnError> {
        Self::parse(&format!("{provider}{SEPARATOR}{kind}{SEPARATOR}{instance}"))
    }

    /// Build a provider URN (`provider:type`)
    pub fn provider(provider: &str, kind: &str) -> Result<Self, UrnError> {
        Self::parse(&format!("{provider}{SEPARATOR}{kind}"))
    }

    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    /// Type component, empty for a bare provider prefix
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Instance component, empty unless this is an instance URN
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Number of populated components (1..=3)
    pub fn depth(&self) -> usize {
        1 + usize::from(!self.kind.is_empty()) + usize::from(!self.instance.is_empty())
    }

    pub fn is_provider_urn(&self) -> bool {
        self.depth() == 2
    }

    pub fn is_instance_urn(&self) -> bool {
        self.depth() == MAX_COMPONENTS
    }

    /// The `provider:type` part of this URN
    ///
    /// For a bare provider prefix the prefix itself is returned.
    pub fn provider_urn(&self) -> ModuleUrn {
        Self {
            provider: self.provider.clone(),
            kind: self.kind.clone(),
            instance: String::new(),
        }
    }

    /// Derive an instance URN under this provider URN
    pub fn with_instance(&self, instance: &str) -> Result<ModuleUrn, UrnError> {
        if !self.is_provider_urn() {
            return Err(UrnError::NotProvider(self.to_string()));
        }
        Self::new(&self.provider, &self.kind, instance)
    }

    /// True when every populated component of `prefix` equals ours
    pub fn matches(&self, prefix: &ModuleUrn) -> bool {
        let same = |ours: &str, theirs: &str| theirs.is_empty() || ours == theirs;
        self.provider == prefix.provider
            && same(&self.kind, &prefix.kind)
            && same(&self.instance, &prefix.instance)
    }
}

fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

impl fmt::Display for ModuleUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.provider)?;
        if !self.kind.is_empty() {
            write!(f, "{SEPARATOR}{}", self.kind)?;
        }
        if !self.instance.is_empty() {
            write!(f, "{SEPARATOR}{}", self.instance)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleUrn {
    type Err = UrnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModuleUrn {
    type Error = UrnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModuleUrn> for String {
    fn from(urn: ModuleUrn) -> Self {
        urn.to_string()
    }
}
