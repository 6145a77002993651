//! Parsed media types (`type/subtype; name=value`).

use std::fmt;
use std::str::FromStr;

/// A media type such as `application/epub+zip` or
/// `application/atom+xml;profile=opds-catalog`.
///
/// Type, subtype and parameter names are lowercased on parse. The `charset`
/// parameter value is lowercased too; other values keep their case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    type_: String,
    subtype: String,
    parameters: Vec<(String, String)>,
}

impl MediaType {
    /// Parse a media type string. Returns `None` when there is no `/`
    /// separating a non-empty type and subtype.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let essence = parts.next()?.trim();
        let (type_, subtype) = essence.split_once('/')?;
        let type_ = type_.trim().to_ascii_lowercase();
        let subtype = subtype.trim().to_ascii_lowercase();
        if type_.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut parameters: Vec<(String, String)> = parts
            .filter_map(|param| {
                let (name, value) = param.split_once('=')?;
                let name = name.trim().to_ascii_lowercase();
                let mut value = value.trim().trim_matches('"').to_string();
                if name.is_empty() {
                    return None;
                }
                if name == "charset" {
                    value.make_ascii_lowercase();
                }
                Some((name, value))
            })
            .collect();
        parameters.sort();
        parameters.dedup_by(|a, b| a.0 == b.0);

        Some(Self {
            type_,
            subtype,
            parameters,
        })
    }

    #[inline]
    pub fn type_(&self) -> &str {
        &self.type_
    }

    #[inline]
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether `self` satisfies `pattern`: same type and subtype, and every
    /// parameter of `pattern` present on `self` with the same value.
    pub fn matches(&self, pattern: &MediaType) -> bool {
        self.type_ == pattern.type_
            && self.subtype == pattern.subtype
            && pattern
                .parameters
                .iter()
                .all(|(name, value)| self.parameter(name) == Some(value.as_str()))
    }

    /// Parse `pattern` and test it with [`MediaType::matches`].
    pub fn matches_str(&self, pattern: &str) -> bool {
        MediaType::parse(pattern).is_some_and(|p| self.matches(&p))
    }

    /// Structured syntax suffix, e.g. `zip` for `application/epub+zip`.
    pub fn structured_suffix(&self) -> Option<&str> {
        self.subtype.rsplit_once('+').map(|(_, suffix)| suffix)
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid media type: {s:?}"))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}
