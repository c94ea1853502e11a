//! Index and alias naming, identifier resolution

use crate::error::{AppError, Result};
use chrono::Utc;

/// Identifier used when `current` finds no existing index
pub const DEFAULT_IDENTIFIER: &str = "first";

/// Names derived from the base name and an index type.
///
/// With base `wiki` and type `content`: global alias `wiki`, specific alias
/// `wiki_content`, physical indexes `wiki_content_{identifier}`.
///
/// Other configured types can extend this type's name (`content_archive`
/// next to `content`); their indexes are excluded once registered with
/// [`IndexNames::with_other_types`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    base_name: String,
    index_type: String,
    /// Physical-index prefixes of other types that start with this type's prefix
    foreign_prefixes: Vec<String>,
}

impl IndexNames {
    pub fn new(base_name: impl Into<String>, index_type: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            index_type: index_type.into(),
            foreign_prefixes: Vec::new(),
        }
    }

    /// Register the other configured index types
    pub fn with_other_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let own = self.physical_index("");
        let foreign: Vec<String> = types
            .into_iter()
            .map(|other| other.as_ref().to_owned())
            .filter(|other| *other != self.index_type)
            .map(|other| format!("{}_{}_", self.base_name, other))
            .filter(|prefix| prefix.starts_with(own.as_str()))
            .collect();
        self.foreign_prefixes = foreign;
        self
    }

    pub fn index_type(&self) -> &str {
        &self.index_type
    }

    /// Alias shared by every index type
    pub fn global_alias(&self) -> &str {
        &self.base_name
    }

    /// Alias serving this index type
    pub fn specific_alias(&self) -> String {
        format!("{}_{}", self.base_name, self.index_type)
    }

    /// Physical index name for an identifier
    pub fn physical_index(&self, identifier: &str) -> String {
        format!("{}_{}", self.specific_alias(), identifier)
    }

    /// Identifier of a physical index of this type, if the name is one
    pub fn identifier_of<'a>(&self, index: &'a str) -> Option<&'a str> {
        let prefix = self.physical_index("");
        if self
            .foreign_prefixes
            .iter()
            .any(|foreign| index.starts_with(foreign.as_str()))
        {
            return None;
        }
        index.strip_prefix(prefix.as_str()).filter(|id| !id.is_empty())
    }

    /// Whether `index` is a physical index of this type
    pub fn owns(&self, index: &str) -> bool {
        self.identifier_of(index).is_some()
    }
}

/// How the operator asked for the index identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierOption {
    /// Current Unix time in seconds
    Now,
    /// Infer from the live indexes of this type
    Current,
    Literal(String),
}

impl IdentifierOption {
    pub fn parse(option: &str) -> Self {
        match option {
            "now" => IdentifierOption::Now,
            "current" => IdentifierOption::Current,
            other => IdentifierOption::Literal(other.to_string()),
        }
    }
}

/// Result of inferring the identifier from live index names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierResolution {
    Resolved(String),
    Ambiguous(Vec<String>),
    None,
}

/// Find the one physical index of this type among `live_indices`.
pub fn resolve_current<S: AsRef<str>>(names: &IndexNames, live_indices: &[S]) -> IdentifierResolution {
    let mut found: Vec<&str> = live_indices
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| names.identifier_of(name).is_some())
        .collect();
    found.sort_unstable();

    match found.as_slice() {
        [] => IdentifierResolution::None,
        [only] => IdentifierResolution::Resolved(
            names.identifier_of(only).unwrap_or(DEFAULT_IDENTIFIER).to_string(),
        ),
        many => IdentifierResolution::Ambiguous(many.iter().map(|s| s.to_string()).collect()),
    }
}

/// Turn an identifier option into a concrete identifier.
///
/// `live_indices` is only consulted for [`IdentifierOption::Current`].
pub fn pick_identifier<S: AsRef<str>>(
    option: &IdentifierOption,
    names: &IndexNames,
    live_indices: &[S],
) -> Result<String> {
    match option {
        IdentifierOption::Now => Ok(Utc::now().timestamp().to_string()),
        IdentifierOption::Literal(id) => Ok(id.clone()),
        IdentifierOption::Current => match resolve_current(names, live_indices) {
            IdentifierResolution::Resolved(id) => Ok(id),
            IdentifierResolution::None => Ok(DEFAULT_IDENTIFIER.to_string()),
            IdentifierResolution::Ambiguous(candidates) => {
                Err(AppError::AmbiguousIdentifier(candidates))
            }
        },
    }
}

/// Parse `"5%"` as `0.05` and `"0.05"` as `0.05`.
pub fn parse_potential_percent(value: &str) -> Result<f64> {
    let trimmed = value.trim();
    let (number, percent) = match trimmed.strip_suffix('%') {
        Some(number) => (number.trim(), true),
        None => (trimmed, false),
    };
    let parsed: f64 = number
        .parse()
        .map_err(|_| AppError::Validation(format!("not a number or percentage: {:?}", value)))?;
    Ok(if percent { parsed / 100.0 } else { parsed })
}
