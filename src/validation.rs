//! Typed field validators for group payloads.
//!
//! Each validator checks one field and yields either the normalized value or a
//! [`FieldViolation`]. Payload normalization runs every validator and collects
//! the failures into a single [`ValidationErrors`] so callers see all of them at
//! once.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::GroupKind;

pub const NAME_MAX_CHARS: usize = 255;

pub const NAME_REQUIRED: &str = "The name field is required.";
pub const NAME_TOO_LONG: &str = "The name field must not be greater than 255 characters.";
pub const NAME_TAKEN: &str = "A group with this name already exists under the same parent.";
pub const TYPE_REQUIRED: &str = "The type field is required.";
pub const TYPE_INVALID: &str = "The selected type is invalid.";
pub const PARENT_INVALID: &str = "The selected parent id is invalid.";
pub const NAME_NOT_STRING: &str = "The name field must be a string.";
pub const DESCRIPTION_NOT_STRING: &str = "The description field must be a string.";
pub const PARENT_NOT_INTEGER: &str = "The parent id field must be an integer.";
pub const BODY_INVALID: &str = "The given data was invalid.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldViolation {
    pub const fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: &'static str) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, message)],
        }
    }

    pub fn push(&mut self, violation: FieldViolation) {
        self.violations.push(violation);
    }

    /// Unwraps a validator result, recording the violation on failure.
    pub fn check<T>(&mut self, result: Result<T, FieldViolation>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(violation) => {
                self.push(violation);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn first_message(&self) -> Option<&'static str> {
        self.violations.first().map(|violation| violation.message)
    }

    /// Messages grouped by field, in field order, for the `errors` response object.
    pub fn by_field(&self) -> BTreeMap<&'static str, Vec<&'static str>> {
        let mut grouped: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();
        for violation in &self.violations {
            grouped
                .entry(violation.field)
                .or_default()
                .push(violation.message);
        }
        grouped
    }
}

pub fn validate_name(name: Option<String>) -> Result<String, FieldViolation> {
    let name = name.map(|name| name.trim().to_string()).unwrap_or_default();
    if name.is_empty() {
        return Err(FieldViolation::new("name", NAME_REQUIRED));
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(FieldViolation::new("name", NAME_TOO_LONG));
    }
    Ok(name)
}

pub fn validate_kind(kind: Option<&str>) -> Result<GroupKind, FieldViolation> {
    let Some(kind) = kind.map(str::trim).filter(|kind| !kind.is_empty()) else {
        return Err(FieldViolation::new("type", TYPE_REQUIRED));
    };
    GroupKind::from_db_value(kind).ok_or(FieldViolation::new("type", TYPE_INVALID))
}

/// Blank descriptions are stored as null.
pub fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|description| description.trim().to_string())
        .filter(|description| !description.is_empty())
}
