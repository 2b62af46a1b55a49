pub mod algorithms;
#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod invariants;
pub mod models;
pub mod operations;
pub mod store;
pub mod validation;

pub mod prelude {
    pub use crate::algorithms::{build_forest, children_map, forest_size};
    #[cfg(feature = "api")]
    pub use crate::api::{AppError, GroupApp, GroupAppState, HasStore, StatusBody};
    #[cfg(feature = "sqlx")]
    pub use crate::db::{
        PgGroupStore, count_children, create_group, create_group_tables, delete_group, get_group,
        list_root_groups, update_group,
    };
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::invariants::{GroupIndex, TreeViolation};
    pub use crate::models::{
        CreateGroupPayload, Group, GroupChanges, GroupDraft, GroupId, GroupKind, GroupNode,
        GroupWithChildren, UpdateGroupPayload,
    };
    pub use crate::operations::GroupOperations;
    pub use crate::store::{GroupStore, MemoryGroupStore};
    pub use crate::validation::{FieldViolation, ValidationErrors};
}
