use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{LibError, Result};
use crate::validation::{self, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Hospital,
    ClinicianGroup,
}

impl GroupKind {
    pub const fn as_db_value(self) -> &'static str {
        match self {
            GroupKind::Hospital => "hospital",
            GroupKind::ClinicianGroup => "clinician_group",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "hospital" => Some(GroupKind::Hospital),
            "clinician_group" => Some(GroupKind::ClinicianGroup),
            _ => None,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_value())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        i64::from_str(s).map(Self)
    }
}

impl From<i64> for GroupId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub parent_id: Option<GroupId>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A group with its whole descendant subtree attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    #[serde(flatten)]
    pub group: Group,
    pub children: Vec<GroupNode>,
}

/// A group with only its immediate children attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupWithChildren {
    #[serde(flatten)]
    pub group: Group,
    pub children: Vec<Group>,
}

/// The parts of a row the integrity checks look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLink {
    pub id: GroupId,
    pub parent_id: Option<GroupId>,
    pub name: String,
}

impl From<&Group> for GroupLink {
    fn from(value: &Group) -> Self {
        Self {
            id: value.id,
            parent_id: value.parent_id,
            name: value.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateGroupPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub parent_id: Option<GroupId>,
}

/// Partial update. An outer `None` leaves the field alone; `Some(None)` is an explicit null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGroupPayload {
    #[serde(default, deserialize_with = "deserialize_present")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub description: Option<Option<String>>,
    #[serde(default, rename = "type", deserialize_with = "deserialize_present")]
    pub kind: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub parent_id: Option<Option<GroupId>>,
}

fn deserialize_present<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Fully validated attributes for a row about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDraft {
    pub name: String,
    pub description: Option<String>,
    pub kind: GroupKind,
    pub parent_id: Option<GroupId>,
}

/// Validated partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub kind: Option<GroupKind>,
    pub parent_id: Option<Option<GroupId>>,
}

impl GroupChanges {
    pub fn effective_parent(&self, existing: &Group) -> Option<GroupId> {
        self.parent_id.unwrap_or(existing.parent_id)
    }

    pub fn apply_to(&self, existing: &Group) -> GroupDraft {
        GroupDraft {
            name: self.name.clone().unwrap_or_else(|| existing.name.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| existing.description.clone()),
            kind: self.kind.unwrap_or(existing.kind),
            parent_id: self.effective_parent(existing),
        }
    }
}

impl CreateGroupPayload {
    pub fn normalize(self) -> Result<GroupDraft> {
        let mut errors = ValidationErrors::new();
        let name = errors.check(validation::validate_name(self.name));
        let kind = errors.check(validation::validate_kind(self.kind.as_deref()));

        match (name, kind) {
            (Some(name), Some(kind)) if errors.is_empty() => Ok(GroupDraft {
                name,
                description: validation::normalize_description(self.description),
                kind,
                parent_id: self.parent_id,
            }),
            _ => Err(LibError::validation(errors)),
        }
    }
}

impl UpdateGroupPayload {
    pub fn normalize(self) -> Result<GroupChanges> {
        let mut errors = ValidationErrors::new();
        let name = self
            .name
            .and_then(|name| errors.check(validation::validate_name(name)));
        let kind = self
            .kind
            .and_then(|kind| errors.check(validation::validate_kind(kind.as_deref())));

        if !errors.is_empty() {
            return Err(LibError::validation(errors));
        }

        Ok(GroupChanges {
            name,
            description: self.description.map(validation::normalize_description),
            kind,
            parent_id: self.parent_id,
        })
    }
}
