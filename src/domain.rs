use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RvarError;

/// One data row of a source table, fields in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record(Vec<String>);

impl Record {
    pub fn new(fields: Vec<String>) -> Self {
        Self(fields)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_fields(self) -> Vec<String> {
        self.0
    }
}

impl From<&csv::StringRecord> for Record {
    fn from(row: &csv::StringRecord) -> Self {
        Self(row.iter().map(str::to_string).collect())
    }
}

impl<S: Into<String>> FromIterator<S> for Record {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UniquenessKey {
    Single(String),
    Composite(Vec<String>),
}

impl fmt::Display for UniquenessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniquenessKey::Single(value) => write!(f, "{value}"),
            UniquenessKey::Composite(values) => write!(f, "({})", values.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Literature reference with its source prefix already stripped (`pubmed/111` -> `111`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strips `prefix` from a raw token, or `None` when the token is not a reference.
    pub fn from_token(token: &str, prefix: &str) -> Option<Self> {
        let rest = token.trim().strip_prefix(prefix)?;
        if rest.is_empty() {
            return None;
        }
        Some(Self(rest.to_string()))
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last unit of a previous run, given on the command line as `entity,group`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumeKey {
    pub entity: EntityId,
    pub group: GroupId,
}

impl ResumeKey {
    pub fn matches(&self, unit: &EnrichmentUnit) -> bool {
        self.entity == unit.entity && self.group == unit.group
    }
}

impl fmt::Display for ResumeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.entity, self.group)
    }
}

impl FromStr for ResumeKey {
    type Err = RvarError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (entity, group) = value
            .split_once(',')
            .ok_or_else(|| RvarError::InvalidResumeKey(value.to_string()))?;
        let entity = entity.trim();
        let group = group.trim();
        if entity.is_empty() || group.is_empty() {
            return Err(RvarError::InvalidResumeKey(value.to_string()));
        }
        Ok(Self {
            entity: EntityId::new(entity),
            group: GroupId::new(group),
        })
    }
}

/// One (entity, group) pair and every reference attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentUnit {
    pub entity: EntityId,
    pub group: GroupId,
    pub references: BTreeSet<ReferenceId>,
}

impl EnrichmentUnit {
    pub fn new(entity: EntityId, group: GroupId) -> Self {
        Self {
            entity,
            group,
            references: BTreeSet::new(),
        }
    }
}
