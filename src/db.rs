use std::sync::Arc;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::algorithms;
use crate::error::{LibError, Result};
use crate::invariants::{self, GroupIndex};
use crate::models::{
    Group, GroupChanges, GroupDraft, GroupId, GroupKind, GroupLink, GroupNode, GroupWithChildren,
};
use crate::store::{GroupStore, group_not_found};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

/// Key of the transaction-scoped advisory lock that serializes tree mutations.
const GROUP_TREE_LOCK_KEY: i64 = 0x6772_6f75_7073;

pub async fn create_group_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Debug, Clone, FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    description: Option<String>,
    #[sqlx(rename = "type")]
    kind: String,
    parent_id: Option<i64>,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
struct GroupLinkRow {
    id: i64,
    parent_id: Option<i64>,
    name: String,
}

impl TryFrom<GroupRow> for Group {
    type Error = LibError;

    fn try_from(value: GroupRow) -> Result<Self> {
        let kind = GroupKind::from_db_value(&value.kind).ok_or_else(|| {
            LibError::database(
                "Stored group is invalid",
                anyhow!("group {} has unknown type '{}'", value.id, value.kind),
            )
        })?;

        Ok(Self {
            id: GroupId(value.id),
            name: value.name,
            description: value.description,
            kind,
            parent_id: value.parent_id.map(GroupId),
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl From<GroupLinkRow> for GroupLink {
    fn from(value: GroupLinkRow) -> Self {
        Self {
            id: GroupId(value.id),
            parent_id: value.parent_id.map(GroupId),
            name: value.name,
        }
    }
}

fn hydrate_groups(rows: Vec<GroupRow>) -> Result<Vec<Group>> {
    rows.into_iter().map(Group::try_from).collect()
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::database(public, anyhow!(err))
}

/// Like `db_err`, but reports a unique-index hit as a duplicate sibling name.
fn write_err(public: &'static str, err: sqlx::Error) -> LibError {
    let unique_violation = matches!(
        &err,
        sqlx::Error::Database(db_error) if db_error.is_unique_violation()
    );
    if unique_violation {
        invariants::duplicate_name_error(anyhow!(err))
    } else {
        db_err(public, err)
    }
}

async fn begin_tree_mutation(pool: &PgPool) -> Result<Transaction<'static, Postgres>> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| db_err("Failed to start transaction", err))?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(GROUP_TREE_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .map_err(|err| db_err("Failed to lock group tree", err))?;

    Ok(tx)
}

async fn load_index(tx: &mut Transaction<'_, Postgres>) -> Result<GroupIndex> {
    let rows = sqlx::query_as::<_, GroupLinkRow>(
        r#"
        SELECT id, parent_id, name
        FROM groups
        "#,
    )
    .fetch_all(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to load group tree", err))?;

    Ok(GroupIndex::new(rows.into_iter().map(GroupLink::from)))
}

async fn load_group_for_update(
    tx: &mut Transaction<'_, Postgres>,
    group_id: GroupId,
) -> Result<Group> {
    let row = sqlx::query_as::<_, GroupRow>(
        r#"
        SELECT id, name, description, type, parent_id, created_at, updated_at
        FROM groups
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(group_id.0)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to query group", err))?;

    match row {
        Some(row) => Group::try_from(row),
        None => Err(group_not_found(group_id)),
    }
}

pub async fn list_root_groups(pool: &PgPool) -> Result<Vec<GroupNode>> {
    let rows = sqlx::query_as::<_, GroupRow>(
        r#"
        SELECT id, name, description, type, parent_id, created_at, updated_at
        FROM groups
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to list groups", err))?;

    Ok(algorithms::build_forest(hydrate_groups(rows)?))
}

pub async fn get_group(pool: &PgPool, group_id: GroupId) -> Result<GroupWithChildren> {
    let row = sqlx::query_as::<_, GroupRow>(
        r#"
        SELECT id, name, description, type, parent_id, created_at, updated_at
        FROM groups
        WHERE id = $1
        "#,
    )
    .bind(group_id.0)
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to query group", err))?;

    let Some(row) = row else {
        return Err(group_not_found(group_id));
    };

    let children = sqlx::query_as::<_, GroupRow>(
        r#"
        SELECT id, name, description, type, parent_id, created_at, updated_at
        FROM groups
        WHERE parent_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(group_id.0)
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to query group children", err))?;

    Ok(GroupWithChildren {
        group: Group::try_from(row)?,
        children: hydrate_groups(children)?,
    })
}

pub async fn create_group(pool: &PgPool, draft: GroupDraft) -> Result<Group> {
    let mut tx = begin_tree_mutation(pool).await?;
    load_index(&mut tx).await?.ensure_can_create(&draft)?;

    let row = sqlx::query_as::<_, GroupRow>(
        r#"
        INSERT INTO groups (name, description, type, parent_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, description, type, parent_id, created_at, updated_at
        "#,
    )
    .bind(&draft.name)
    .bind(&draft.description)
    .bind(draft.kind.as_db_value())
    .bind(draft.parent_id.map(|id| id.0))
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| write_err("Failed to create group", err))?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))?;

    Group::try_from(row)
}

pub async fn update_group(
    pool: &PgPool,
    group_id: GroupId,
    changes: GroupChanges,
) -> Result<Group> {
    let mut tx = begin_tree_mutation(pool).await?;
    let existing = load_group_for_update(&mut tx, group_id).await?;
    let draft = load_index(&mut tx)
        .await?
        .ensure_can_update(&existing, &changes)?;

    let row = sqlx::query_as::<_, GroupRow>(
        r#"
        UPDATE groups
        SET name = $1,
            description = $2,
            type = $3,
            parent_id = $4,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $5
        RETURNING id, name, description, type, parent_id, created_at, updated_at
        "#,
    )
    .bind(&draft.name)
    .bind(&draft.description)
    .bind(draft.kind.as_db_value())
    .bind(draft.parent_id.map(|id| id.0))
    .bind(group_id.0)
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| write_err("Failed to update group", err))?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))?;

    Group::try_from(row)
}

pub async fn delete_group(pool: &PgPool, group_id: GroupId) -> Result<()> {
    let mut tx = begin_tree_mutation(pool).await?;
    load_group_for_update(&mut tx, group_id).await?;

    let child_count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM groups
        WHERE parent_id = $1
        "#,
    )
    .bind(group_id.0)
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to count group children", err))?;
    invariants::ensure_no_children(group_id, child_count.0 as usize)?;

    sqlx::query(
        r#"
        DELETE FROM groups
        WHERE id = $1
        "#,
    )
    .bind(group_id.0)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to delete group", err))?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))?;

    Ok(())
}

pub async fn count_children(pool: &PgPool, group_id: GroupId) -> Result<i64> {
    let count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM groups
        WHERE parent_id = $1
        "#,
    )
    .bind(group_id.0)
    .fetch_one(pool)
    .await
    .map_err(|err| db_err("Failed to count group children", err))?;

    Ok(count.0)
}

/// [`GroupStore`] backed by the `groups` table.
#[derive(Debug, Clone)]
pub struct PgGroupStore {
    pool: Arc<PgPool>,
}

impl PgGroupStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn from_pool(pool: &PgPool) -> Self {
        Self {
            pool: Arc::new(pool.clone()),
        }
    }

    pub fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }
}

impl GroupStore for PgGroupStore {
    async fn list_roots(&self) -> Result<Vec<GroupNode>> {
        list_root_groups(&self.pool).await
    }

    async fn get_by_id(&self, group_id: GroupId) -> Result<GroupWithChildren> {
        get_group(&self.pool, group_id).await
    }

    async fn create(&self, draft: GroupDraft) -> Result<Group> {
        create_group(&self.pool, draft).await
    }

    async fn update(&self, group_id: GroupId, changes: GroupChanges) -> Result<Group> {
        update_group(&self.pool, group_id, changes).await
    }

    async fn delete(&self, group_id: GroupId) -> Result<()> {
        delete_group(&self.pool, group_id).await
    }

    async fn count_children(&self, group_id: GroupId) -> Result<i64> {
        count_children(&self.pool, group_id).await
    }
}
