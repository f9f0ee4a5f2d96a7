//! Integration tests for RestRemoteStore

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use fitsync_core::domain::{Collection, EntityRecord, RecordId};
use fitsync_core::ports::{IRemoteStore, RemoteFilter};

use crate::common;

#[tokio::test]
async fn test_select_sends_filters_and_credentials() {
    let (server, store) = common::setup_remote_mock().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/clients"))
        .and(query_param("select", "*"))
        .and(query_param("trainer_id", "eq.trainer-1"))
        .and(header("apikey", common::TEST_API_KEY))
        .and(header(
            "authorization",
            format!("Bearer {}", common::TEST_TOKEN).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "c-1", "name": "Ann", "trainer_id": "trainer-1"},
            {"id": "c-2", "name": "Bob", "trainer_id": "trainer-1"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = store
        .select(
            Collection::Clients,
            &RemoteFilter::new().eq("trainer_id", "trainer-1"),
        )
        .await
        .expect("select failed");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].id().unwrap().as_str(), "c-2");
}

#[tokio::test]
async fn test_insert_returns_server_row() {
    let (server, store) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/clients"))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!({"name": "Ann", "trainer_id": "trainer-1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {"id": "c-42", "name": "Ann", "trainer_id": "trainer-1",
             "created_at": "2026-03-01T10:00:00Z"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let record = EntityRecord::new()
        .with("name", "Ann")
        .with("trainer_id", "trainer-1");
    let stored = store
        .insert(Collection::Clients, &record)
        .await
        .expect("insert failed");

    assert_eq!(stored.id().unwrap().as_str(), "c-42");
    assert_eq!(stored.created_at(), Some("2026-03-01T10:00:00Z"));
}

#[tokio::test]
async fn test_insert_with_empty_representation_fails() {
    let (server, store) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/workouts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = store
        .insert(Collection::Workouts, &EntityRecord::new().with("name", "Legs"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_update_patches_by_id_without_id_in_body() {
    let (server, store) = common::setup_remote_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/clients"))
        .and(query_param("id", "eq.c-42"))
        .and(body_json(json!({"name": "Ann Smith"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let patch = EntityRecord::new()
        .with("id", "c-42")
        .with("name", "Ann Smith");
    store
        .update(Collection::Clients, &RecordId::new("c-42").unwrap(), &patch)
        .await
        .expect("update failed");
}

#[tokio::test]
async fn test_delete_by_id() {
    let (server, store) = common::setup_remote_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/progress_entries"))
        .and(query_param("id", "eq.p-9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store
        .delete(
            Collection::ProgressEntries,
            &RecordId::new("p-9").unwrap(),
        )
        .await
        .expect("delete failed");
}

#[tokio::test]
async fn test_error_status_is_surfaced() {
    let (server, store) = common::setup_remote_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/schedules"))
        .respond_with(
            ResponseTemplate::new(409).set_body_string("duplicate key value violates unique constraint"),
        )
        .mount(&server)
        .await;

    let err = store
        .update(
            Collection::Schedules,
            &RecordId::new("s-1").unwrap(),
            &EntityRecord::new().with("day", "mon"),
        )
        .await
        .unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("Conflict"), "unexpected error: {chain}");
}

#[tokio::test]
async fn test_unreachable_server_is_an_error() {
    let store = fitsync_remote::RestRemoteStore::with_base_url("http://127.0.0.1:9");
    let result = store
        .select(Collection::Exercises, &RemoteFilter::new())
        .await;
    assert!(result.is_err());
}
