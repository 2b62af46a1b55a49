use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt; // for `collect`
use serde_json::{Value, json};
use tower::ServiceExt; // for `oneshot`

use group_tree::api::{GroupAppState, routes};
use group_tree::store::MemoryGroupStore;

fn app() -> Router {
    let state = GroupAppState::new(Arc::new(MemoryGroupStore::new()));
    routes::<GroupAppState<MemoryGroupStore>>().with_state(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create(app: &Router, body: Value) -> Value {
    let (status, group) = send(app, Method::POST, "/groups", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {group}");
    group
}

#[tokio::test]
async fn a_group_can_be_created_with_valid_data() {
    let app = app();
    let (status, group) = send(
        &app,
        Method::POST,
        "/groups",
        Some(json!({
            "name": "Surgery Ward",
            "description": "Group for all surgery clinicians.",
            "type": "hospital",
            "parent_id": null
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    for key in ["id", "name", "description", "type", "parent_id", "created_at", "updated_at"] {
        assert!(group.get(key).is_some(), "missing {key}");
    }
    assert_eq!(group["name"], "Surgery Ward");
    assert_eq!(group["parent_id"], Value::Null);

    let (_, roots) = send(&app, Method::GET, "/groups", None).await;
    assert_eq!(roots.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn a_child_group_can_be_created_under_a_valid_parent() {
    let app = app();
    let hospital = create(&app, json!({ "name": "Main Hospital", "type": "hospital" })).await;
    let child = create(
        &app,
        json!({
            "name": "Emergency Clinicians",
            "description": "Group for children's specialists.",
            "type": "clinician_group",
            "parent_id": hospital["id"]
        }),
    )
    .await;
    assert_eq!(child["parent_id"], hospital["id"]);

    let (status, fetched) =
        send(&app, Method::GET, &format!("/groups/{}", hospital["id"]), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["children"][0]["name"], "Emergency Clinicians");
}

#[tokio::test]
async fn group_creation_fails_if_parent_id_does_not_exist() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/groups",
        Some(json!({ "name": "Invalid Child", "type": "clinician_group", "parent_id": 999 })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");
    assert!(body["errors"]["parent_id"].is_array());

    let (_, roots) = send(&app, Method::GET, "/groups", None).await;
    assert_eq!(roots, json!([]));
}

#[tokio::test]
async fn missing_fields_are_reported_together() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/groups", Some(json!({}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "The name field is required.");
    assert_eq!(body["errors"]["name"], json!(["The name field is required."]));
    assert_eq!(body["errors"]["type"], json!(["The type field is required."]));
}

#[tokio::test]
async fn unknown_type_is_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/groups",
        Some(json!({ "name": "Ward 9", "type": "ward" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"]["type"], json!(["The selected type is invalid."]));
}

#[tokio::test]
async fn malformed_body_is_unprocessable() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/groups")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&app, Method::POST, "/groups", Some(json!(["Surgery"]))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body,
        json!({ "status": "error", "message": "The given data was invalid." })
    );
}

#[tokio::test]
async fn wrongly_typed_fields_are_reported_per_field() {
    let app = app();
    let hospital = create(&app, json!({ "name": "Hospital A", "type": "hospital" })).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/groups",
        Some(json!({ "name": "Dept 1", "type": "clinician_group", "parent_id": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "The parent id field must be an integer.");
    assert_eq!(
        body["errors"],
        json!({ "parent_id": ["The parent id field must be an integer."] })
    );

    let uri = format!("/groups/{}", hospital["id"]);
    let (status, body) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(json!({ "name": 42, "type": true })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"],
        json!({
            "name": ["The name field must be a string."],
            "type": ["The selected type is invalid."]
        })
    );

    let (_, fetched) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(fetched["name"], "Hospital A");
}

#[tokio::test]
async fn all_groups_are_retrieved_structured_by_top_level_parents() {
    let app = app();
    let hospital_a = create(&app, json!({ "name": "Hospital A", "type": "hospital" })).await;
    let dept = create(
        &app,
        json!({ "name": "Dept 1", "type": "clinician_group", "parent_id": hospital_a["id"] }),
    )
    .await;
    create(
        &app,
        json!({ "name": "Night Shift", "type": "clinician_group", "parent_id": dept["id"] }),
    )
    .await;
    create(&app, json!({ "name": "Hospital B", "type": "hospital" })).await;

    let (status, roots) = send(&app, Method::GET, "/groups", None).await;
    assert_eq!(status, StatusCode::OK);

    let roots = roots.as_array().unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0]["name"], "Hospital A");
    assert_eq!(roots[1]["name"], "Hospital B");
    assert_eq!(roots[0]["children"][0]["name"], "Dept 1");
    assert_eq!(roots[0]["children"][0]["children"][0]["name"], "Night Shift");
    assert_eq!(roots[1]["children"], json!([]));
}

#[tokio::test]
async fn retrieving_a_non_existent_group_returns_404() {
    let app = app();
    for uri in ["/groups/999", "/groups/not-a-number"] {
        let (status, body) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({ "status": "error", "message": "The requested group was not found." })
        );
    }
}

#[tokio::test]
async fn a_group_can_be_updated() {
    let app = app();
    let group = create(&app, json!({ "name": "Old Name", "type": "clinician_group" })).await;
    let uri = format!("/groups/{}", group["id"]);

    let (status, updated) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "name": "New Name for Group", "description": "Updated info." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "New Name for Group");
    assert_eq!(updated["type"], "clinician_group");

    let (_, fetched) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(fetched["name"], "New Name for Group");
    assert_eq!(fetched["description"], "Updated info.");
}

#[tokio::test]
async fn an_update_without_a_body_changes_nothing() {
    let app = app();
    let hospital = create(&app, json!({ "name": "Hospital A", "type": "hospital" })).await;
    let dept = create(
        &app,
        json!({
            "name": "Dept 1",
            "description": "Day staff",
            "type": "clinician_group",
            "parent_id": hospital["id"]
        }),
    )
    .await;
    let uri = format!("/groups/{}", dept["id"]);

    for method in [Method::PATCH, Method::PUT] {
        let (status, updated) = send(&app, method, &uri, None).await;
        assert_eq!(status, StatusCode::OK, "unexpected body: {updated}");
        assert_eq!(updated["id"], dept["id"]);
        assert_eq!(updated["name"], "Dept 1");
        assert_eq!(updated["description"], "Day staff");
        assert_eq!(updated["type"], "clinician_group");
        assert_eq!(updated["parent_id"], hospital["id"]);
    }

    let (status, _) = send(&app, Method::PATCH, "/groups/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn updating_a_missing_group_returns_404() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::PATCH,
        "/groups/12",
        Some(json!({ "name": "Nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "The requested group was not found.");
}

#[tokio::test]
async fn a_group_cannot_be_its_own_parent_when_updating() {
    let app = app();
    let group = create(&app, json!({ "name": "Cardiology", "type": "clinician_group" })).await;
    let uri = format!("/groups/{}", group["id"]);

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "parent_id": group["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body,
        json!({ "status": "error", "message": "A group cannot be its own parent." })
    );

    let (_, fetched) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(fetched["parent_id"], Value::Null);
    assert_eq!(fetched["updated_at"], group["updated_at"]);
}

#[tokio::test]
async fn a_group_cannot_move_beneath_its_descendant() {
    let app = app();
    let hospital = create(&app, json!({ "name": "Hospital A", "type": "hospital" })).await;
    let dept = create(
        &app,
        json!({ "name": "Dept 1", "type": "clinician_group", "parent_id": hospital["id"] }),
    )
    .await;
    let shift = create(
        &app,
        json!({ "name": "Night Shift", "type": "clinician_group", "parent_id": dept["id"] }),
    )
    .await;

    let uri = format!("/groups/{}", hospital["id"]);
    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "parent_id": shift["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");
    assert_eq!(
        body["message"],
        "A group cannot be moved beneath one of its own descendants."
    );

    let (_, roots) = send(&app, Method::GET, "/groups", None).await;
    assert_eq!(roots.as_array().unwrap().len(), 1);
    assert_eq!(roots[0]["id"], hospital["id"]);
}

#[tokio::test]
async fn a_group_can_be_moved_to_the_root_scope() {
    let app = app();
    let hospital = create(&app, json!({ "name": "Hospital A", "type": "hospital" })).await;
    let dept = create(
        &app,
        json!({ "name": "Dept 1", "type": "clinician_group", "parent_id": hospital["id"] }),
    )
    .await;

    let uri = format!("/groups/{}", dept["id"]);
    let (status, moved) =
        send(&app, Method::PATCH, &uri, Some(json!({ "parent_id": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["parent_id"], Value::Null);

    let (_, roots) = send(&app, Method::GET, "/groups", None).await;
    assert_eq!(roots.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn sibling_names_must_be_unique() {
    let app = app();
    let hospital = create(&app, json!({ "name": "Hospital A", "type": "hospital" })).await;
    let other = create(&app, json!({ "name": "Hospital B", "type": "hospital" })).await;
    create(
        &app,
        json!({ "name": "Cardiology", "type": "clinician_group", "parent_id": hospital["id"] }),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/groups",
        Some(json!({
            "name": "Cardiology",
            "type": "clinician_group",
            "parent_id": hospital["id"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["name"].is_array());

    let (status, _) = send(
        &app,
        Method::POST,
        "/groups",
        Some(json!({ "name": "Hospital A", "type": "hospital" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Same name under another parent is fine.
    let moved = create(
        &app,
        json!({ "name": "Cardiology", "type": "clinician_group", "parent_id": other["id"] }),
    )
    .await;

    // ...until it is moved next to its namesake.
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/groups/{}", moved["id"]),
        Some(json!({ "parent_id": hospital["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn a_group_can_be_deleted_if_it_has_no_children() {
    let app = app();
    let group = create(&app, json!({ "name": "Short Lived", "type": "clinician_group" })).await;
    let uri = format!("/groups/{}", group["id"]);

    let (status, body) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "success", "message": "Group deleted successfully" })
    );

    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, roots) = send(&app, Method::GET, "/groups", None).await;
    assert_eq!(roots, json!([]));
}

#[tokio::test]
async fn a_group_cannot_be_deleted_if_it_has_children_nodes() {
    let app = app();
    let parent = create(&app, json!({ "name": "Parent", "type": "hospital" })).await;
    let child = create(
        &app,
        json!({ "name": "Child", "type": "clinician_group", "parent_id": parent["id"] }),
    )
    .await;

    let uri = format!("/groups/{}", parent["id"]);
    let (status, body) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body,
        json!({ "status": "error", "message": "Cannot delete group with children." })
    );

    for group in [&parent, &child] {
        let (status, _) = send(&app, Method::GET, &format!("/groups/{}", group["id"]), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn deleting_a_missing_group_returns_404() {
    let app = app();
    let (status, _) = send(&app, Method::DELETE, "/groups/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
