use actix_web::{http::StatusCode, test, web, App};
use binkeeper::api;
use binkeeper::app_state::AppState;
use binkeeper::config::{AppConfig, StorageBackend};
use binkeeper::service::storage_service::UploadReceipt;
use std::path::Path;

fn local_state(root: &Path, block_size: usize) -> AppState {
    let mut config = AppConfig::default();
    config.storage.backend = StorageBackend::Local;
    config.storage.root = root.to_string_lossy().into_owned();
    config.reaper.enabled = false;
    config.streaming.block_size = block_size;
    AppState::from_config(config).unwrap()
}

fn object_uri(receipt: &UploadReceipt) -> String {
    format!("/objects/{}", receipt.storage_path)
}

#[actix_web::test]
async fn test_upload_download_delete() {
    let tmp = tempfile::tempdir().unwrap();
    let state = local_state(tmp.path(), 1024);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(api::configure),
    )
    .await;

    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let req = test::TestRequest::post()
        .uri("/objects")
        .insert_header(("User", "testuser1"))
        .insert_header(("Title", "samples.raw"))
        .insert_header(("Client-Path", "/data/samples.raw"))
        .insert_header(("X-Meta-Origin", "sensor-7"))
        .set_payload(payload.clone())
        .to_request();
    let receipt: UploadReceipt = test::call_and_read_body_json(&app, req).await;

    assert_eq!(receipt.size, payload.len() as u64);
    assert_eq!(receipt.title, "samples.raw");
    assert_eq!(receipt.client_path.as_deref(), Some("/data/samples.raw"));
    assert_eq!(receipt.metadata.get("origin").map(String::as_str), Some("sensor-7"));
    assert_eq!(receipt.storage_path.owner_id(), "testuser1");

    let owner_dir = tmp.path().join("testuser1");
    let names: Vec<String> = std::fs::read_dir(&owner_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![receipt.storage_path.file_name()]);

    let req = test::TestRequest::get()
        .uri(&object_uri(&receipt))
        .insert_header(("User", "testuser1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(test::read_body(resp).await.as_ref(), payload.as_slice());

    for _ in 0..2 {
        let req = test::TestRequest::delete()
            .uri(&object_uri(&receipt))
            .insert_header(("User", "testuser1"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    let req = test::TestRequest::get()
        .uri(&object_uri(&receipt))
        .insert_header(("User", "testuser1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    state.shutdown().await;
}

#[actix_web::test]
async fn test_empty_body_stores_empty_object() {
    let state = AppState::new_for_testing();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(api::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/objects")
        .insert_header(("User", "testuser1"))
        .insert_header(("Title", "empty"))
        .to_request();
    let receipt: UploadReceipt = test::call_and_read_body_json(&app, req).await;
    assert_eq!(receipt.size, 0);

    let req = test::TestRequest::get()
        .uri(&object_uri(&receipt))
        .insert_header(("User", "testuser1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(test::read_body(resp).await.is_empty());
}

#[actix_web::test]
async fn test_missing_headers_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let state = local_state(tmp.path(), 1024);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(api::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/objects")
        .insert_header(("Title", "no-owner"))
        .set_payload("data")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/objects")
        .insert_header(("User", "testuser1"))
        .set_payload("data")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/objects")
        .insert_header(("User", ".."))
        .insert_header(("Title", "escape"))
        .set_payload("data")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    // Nothing reached the filesystem
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[actix_web::test]
async fn test_objects_are_private_to_their_owner() {
    let state = AppState::new_for_testing();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(api::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/objects")
        .insert_header(("User", "alice"))
        .insert_header(("Title", "diary"))
        .set_payload("secret")
        .to_request();
    let receipt: UploadReceipt = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::get()
        .uri(&object_uri(&receipt))
        .insert_header(("User", "bob"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::delete()
        .uri(&object_uri(&receipt))
        .insert_header(("User", "bob"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri("/objects/alice/not-an-object.bin")
        .insert_header(("User", "alice"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&object_uri(&receipt))
        .insert_header(("User", "alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(test::read_body(resp).await.as_ref(), b"secret");
}

#[actix_web::test]
async fn test_oversized_upload_is_rejected_without_leftovers() {
    let tmp = tempfile::tempdir().unwrap();
    let mut state = local_state(tmp.path(), 1024);
    state.config.server.max_payload_size = 16;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(api::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/objects")
        .insert_header(("User", "testuser1"))
        .insert_header(("Title", "too-big"))
        .set_payload(vec![7u8; 1000])
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let owner_dir = tmp.path().join("testuser1");
    let leftovers = std::fs::read_dir(&owner_dir).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);

    // A body of exactly the limit still fits
    let req = test::TestRequest::post()
        .uri("/objects")
        .insert_header(("User", "testuser1"))
        .insert_header(("Title", "just-fits"))
        .set_payload(vec![7u8; 16])
        .to_request();
    let receipt: UploadReceipt = test::call_and_read_body_json(&app, req).await;
    assert_eq!(receipt.size, 16);
    assert_eq!(std::fs::read_dir(&owner_dir).unwrap().count(), 1);

    state.shutdown().await;
}
