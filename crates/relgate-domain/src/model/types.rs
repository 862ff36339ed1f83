//! Core value types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Which side of the graph a key belongs to.
///
/// Products have categories as parents; categories have groups as parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Product,
    Category,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Product => "product",
            RelationKind::Category => "category",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(RelationKind::Product),
            "category" => Ok(RelationKind::Category),
            other => Err(DomainError::InvalidChange {
                message: format!("unknown relationship type '{other}'"),
            }),
        }
    }
}

/// Whether a change adds or removes a parent edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Add,
    Delete,
}

impl FromStr for ChangeAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ChangeAction::Add),
            "delete" => Ok(ChangeAction::Delete),
            other => Err(DomainError::InvalidChange {
                message: format!("unknown action '{other}'"),
            }),
        }
    }
}

/// How an access rule's `allowed` keys are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// `allowed` lists groups directly.
    Group,
    /// `allowed` lists categories; their groups grant access.
    Category,
    /// `allowed` lists products; groups of their categories grant access.
    Product,
}

impl RuleType {
    /// The cache a rule of this type expands through, if any.
    pub fn relation_kind(&self) -> Option<RelationKind> {
        match self {
            RuleType::Group => None,
            RuleType::Category => Some(RelationKind::Category),
            RuleType::Product => Some(RelationKind::Product),
        }
    }
}

/// A caller whose group memberships were validated upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub groups: Vec<String>,
}

impl User {
    pub fn new<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// An access rule for one exact path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub allowed: Vec<String>,
}

impl AccessEntry {
    pub fn new<I, S>(path: impl Into<String>, rule_type: RuleType, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            rule_type,
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

/// A validated add/delete notification for one parent edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipChange {
    /// The child key (a product or a category).
    pub item: String,
    /// The parent key (a category or a group).
    pub parent: String,
    #[serde(rename = "type")]
    pub kind: RelationKind,
    pub action: ChangeAction,
}

impl RelationshipChange {
    pub fn new(
        kind: RelationKind,
        item: impl Into<String>,
        parent: impl Into<String>,
        action: ChangeAction,
    ) -> Self {
        Self {
            item: item.into(),
            parent: parent.into(),
            kind,
            action,
        }
    }

    pub fn add(kind: RelationKind, item: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::new(kind, item, parent, ChangeAction::Add)
    }

    pub fn delete(kind: RelationKind, item: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::new(kind, item, parent, ChangeAction::Delete)
    }
}

/// A change event as it arrives on the wire, before routing.
///
/// `type` and `action` are kept as strings so that unroutable events can
/// be observed and dropped instead of failing deserialization of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRelationshipChange {
    pub item: String,
    pub parent: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
}

impl TryFrom<RawRelationshipChange> for RelationshipChange {
    type Error = DomainError;

    fn try_from(raw: RawRelationshipChange) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: raw.kind.parse()?,
            action: raw.action.parse()?,
            item: raw.item,
            parent: raw.parent,
        })
    }
}

impl From<RelationshipChange> for RawRelationshipChange {
    fn from(change: RelationshipChange) -> Self {
        Self {
            kind: change.kind.as_str().to_string(),
            action: match change.action {
                ChangeAction::Add => "add".to_string(),
                ChangeAction::Delete => "delete".to_string(),
            },
            item: change.item,
            parent: change.parent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_entry_deserializes_from_json() {
        let entry: AccessEntry = serde_json::from_str(
            r#"{"path":"/categories/balls","type":"category","allowed":["balls"]}"#,
        )
        .unwrap();

        assert_eq!(
            entry,
            AccessEntry::new("/categories/balls", RuleType::Category, ["balls"])
        );
    }

    #[test]
    fn test_raw_change_with_unknown_type_fails_conversion() {
        let raw = RawRelationshipChange {
            item: "balls".to_string(),
            parent: "group-b".to_string(),
            kind: "brand".to_string(),
            action: "add".to_string(),
        };

        let err = RelationshipChange::try_from(raw).unwrap_err();
        assert!(matches!(err, DomainError::InvalidChange { .. }));
    }

    #[test]
    fn test_raw_change_with_unknown_action_fails_conversion() {
        let raw = RawRelationshipChange {
            item: "balls".to_string(),
            parent: "group-b".to_string(),
            kind: "category".to_string(),
            action: "rename".to_string(),
        };

        assert!(RelationshipChange::try_from(raw).is_err());
    }

    #[test]
    fn test_raw_change_converts_to_typed_change() {
        let raw: RawRelationshipChange = serde_json::from_str(
            r#"{"action":"delete","type":"product","item":"teddyBear","parent":"toys"}"#,
        )
        .unwrap();

        let change = RelationshipChange::try_from(raw).unwrap();
        assert_eq!(
            change,
            RelationshipChange::delete(RelationKind::Product, "teddyBear", "toys")
        );
    }

    #[test]
    fn test_rule_type_maps_to_relation_kind() {
        assert_eq!(RuleType::Group.relation_kind(), None);
        assert_eq!(
            RuleType::Category.relation_kind(),
            Some(RelationKind::Category)
        );
        assert_eq!(RuleType::Product.relation_kind(), Some(RelationKind::Product));
    }
}
