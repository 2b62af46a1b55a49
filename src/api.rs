use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ErrorKind, LibError};
use crate::models::{CreateGroupPayload, GroupId, UpdateGroupPayload};
use crate::operations::GroupOperations;
use crate::store::{GROUP_NOT_FOUND, GroupStore};
use crate::validation::{
    BODY_INVALID, DESCRIPTION_NOT_STRING, FieldViolation, NAME_NOT_STRING, PARENT_NOT_INTEGER,
    TYPE_INVALID, ValidationErrors,
};

pub const GROUP_DELETED_MESSAGE: &str = "Group deleted successfully";

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

/// `{"status": ..., "message": ...}` with per-field `errors` on validation failures.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<&'static str, Vec<&'static str>>>,
}

impl StatusBody {
    pub fn success(message: &'static str) -> Self {
        Self {
            status: "success",
            message,
            errors: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
        };

        if status.is_server_error() {
            tracing::error!(
                kind = ?self.0.kind,
                code = self.0.code,
                error = %self.0.source,
                "group api request failed"
            );
        } else {
            tracing::warn!(
                kind = ?self.0.kind,
                code = self.0.code,
                error = %self.0.source,
                "group api request rejected"
            );
        }

        let body = StatusBody {
            status: "error",
            message: self.0.public,
            errors: self.0.details.as_ref().map(|details| details.by_field()),
        };
        (status, Json(body)).into_response()
    }
}

pub trait HasStore {
    type Store: GroupStore;

    fn store(&self) -> Arc<Self::Store>;
}

pub trait GroupApp: HasStore {
    fn operations(&self) -> GroupOperations<Self::Store> {
        GroupOperations::new(self.store())
    }
}

/// Router state holding just a store.
pub struct GroupAppState<St> {
    store: Arc<St>,
}

impl<St> GroupAppState<St> {
    pub fn new(store: Arc<St>) -> Self {
        Self { store }
    }
}

impl<St> Clone for GroupAppState<St> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<St: GroupStore> HasStore for GroupAppState<St> {
    type Store = St;

    fn store(&self) -> Arc<St> {
        Arc::clone(&self.store)
    }
}

impl<St: GroupStore> GroupApp for GroupAppState<St> {}

fn parse_group_id(raw: &str) -> Result<GroupId, AppError> {
    raw.parse::<GroupId>().map_err(|err| {
        AppError(LibError::not_found(
            GROUP_NOT_FOUND,
            anyhow!("invalid group id '{}': {}", raw, err),
        ))
    })
}

fn invalid_body(source: anyhow::Error) -> AppError {
    AppError(LibError::invalid_with_code("invalid_body", BODY_INVALID, source))
}

const STRING_FIELDS: [(&str, &str); 3] = [
    ("name", NAME_NOT_STRING),
    ("description", DESCRIPTION_NOT_STRING),
    ("type", TYPE_INVALID),
];

/// Wrongly typed payload fields, reported against the field like any other violation.
fn check_field_types(fields: &Map<String, Value>) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for (field, message) in STRING_FIELDS {
        if matches!(fields.get(field), Some(value) if !value.is_string() && !value.is_null()) {
            errors.push(FieldViolation::new(field, message));
        }
    }
    if matches!(fields.get("parent_id"), Some(value) if !value.is_i64() && !value.is_null()) {
        errors.push(FieldViolation::new("parent_id", PARENT_NOT_INTEGER));
    }
    errors
}

/// Decodes a JSON object body. A missing or blank body is an empty object.
fn decode_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    let fields = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(body).map_err(|err| invalid_body(anyhow!(err)))? {
            Value::Object(fields) => fields,
            other => {
                return Err(invalid_body(anyhow!(
                    "expected a JSON object body, got {}",
                    other
                )));
            }
        }
    };

    let errors = check_field_types(&fields);
    if !errors.is_empty() {
        return Err(AppError(LibError::validation(errors)));
    }

    serde_json::from_value(Value::Object(fields)).map_err(|err| invalid_body(anyhow!(err)))
}

async fn list_groups_handler<S>(State(app): State<S>) -> Result<impl IntoResponse, AppError>
where
    S: GroupApp + Clone + Send + Sync + 'static,
{
    let groups = app.operations().list_groups().await?;
    Ok(Json(groups))
}

async fn create_group_handler<S>(
    State(app): State<S>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    S: GroupApp + Clone + Send + Sync + 'static,
{
    let payload: CreateGroupPayload = decode_body(&body)?;
    let group = app.operations().create_group(payload).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn get_group_handler<S>(
    State(app): State<S>,
    Path(group_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: GroupApp + Clone + Send + Sync + 'static,
{
    let group_id = parse_group_id(&group_id)?;
    let group = app.operations().get_group(group_id).await?;
    Ok(Json(group))
}

async fn update_group_handler<S>(
    State(app): State<S>,
    Path(group_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    S: GroupApp + Clone + Send + Sync + 'static,
{
    let group_id = parse_group_id(&group_id)?;
    let payload: UpdateGroupPayload = decode_body(&body)?;
    let group = app.operations().update_group(group_id, payload).await?;
    Ok(Json(group))
}

async fn delete_group_handler<S>(
    State(app): State<S>,
    Path(group_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: GroupApp + Clone + Send + Sync + 'static,
{
    let group_id = parse_group_id(&group_id)?;
    app.operations().delete_group(group_id).await?;
    Ok(Json(StatusBody::success(GROUP_DELETED_MESSAGE)))
}

pub fn routes<S>() -> Router<S>
where
    S: GroupApp + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /groups [GET,POST]");
    tracing::info!("Registering route /groups/{{group_id}} [GET,PUT,PATCH,DELETE]");

    Router::new()
        .route(
            "/groups",
            get(list_groups_handler::<S>).post(create_group_handler::<S>),
        )
        .route(
            "/groups/{group_id}",
            get(get_group_handler::<S>)
                .put(update_group_handler::<S>)
                .patch(update_group_handler::<S>)
                .delete(delete_group_handler::<S>),
        )
}
