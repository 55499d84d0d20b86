//! End-to-end tests for deleting, renaming and browsing library files

mod common;

use common::{TestClient, TestServer, DUPLICATE_A, DUPLICATE_B, LIBRARY_FOLDERS, UNIQUE_TRACK};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn test_delete_removes_file_and_index_entries() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    client.start_scan().await;
    client.wait_until_settled().await;

    let target = server.library_path(DUPLICATE_B);
    let target_str = target.to_string_lossy().to_string();
    let response = client.delete_files(&[target_str.clone()]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["deleted"], json!([target_str]));
    assert_eq!(body["failed"], json!([]));
    assert!(!target.exists());
    assert!(server.library_path(DUPLICATE_A).exists());

    let status: Value = client.get_status().await.json().await.unwrap();
    assert_eq!(status["files_count"], 2);

    let body: Value = client.get_candidates().await.json().await.unwrap();
    let groups = body["candidates"].as_array().unwrap();
    assert!(groups
        .iter()
        .flat_map(|group| group.as_array().unwrap())
        .all(|t| t["path"] != target_str.as_str()));

    let library: Value = client.get_library(10, 0).await.json().await.unwrap();
    assert_eq!(library["total"], 2);
}

#[tokio::test]
async fn test_delete_refuses_paths_outside_library() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let outside_dir = tempfile::TempDir::new().unwrap();
    let outside = outside_dir.path().join("keep.txt");
    std::fs::write(&outside, b"keep me").unwrap();

    let escape = format!("{}/../etc/passwd", server.music_dir().to_string_lossy());
    let root = server.music_dir().to_string_lossy().to_string();
    let paths = vec![
        outside.to_string_lossy().to_string(),
        escape.clone(),
        root.clone(),
        "relative/song.mp3".to_string(),
    ];

    let response = client.delete_files(&paths).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["deleted"], json!([]));
    assert_eq!(body["failed"].as_array().unwrap().len(), paths.len());
    assert!(outside.exists());
    assert!(server.music_dir().exists());
}

#[tokio::test]
async fn test_rename_uses_tags_and_pattern() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let original = server.library_path(UNIQUE_TRACK);
    let response = client
        .rename_files(
            &[original.to_string_lossy().to_string()],
            "{title} by {artist}",
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["renamed"], 1);
    assert!(!original.exists());
    assert!(server.music_dir().join("Waterloo by ABBA.mp3").exists());
}

#[tokio::test]
async fn test_rename_with_unknown_placeholder_renames_nothing() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let original = server.library_path(UNIQUE_TRACK);
    let response = client
        .rename_files(&[original.to_string_lossy().to_string()], "{year} - {title}")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["renamed"], 0);
    assert!(original.exists());
}

#[tokio::test]
async fn test_metadata_update_skips_missing_files() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let missing = server.music_dir().join("Nobody - Nothing.mp3");
    let response = client
        .update_metadata(json!({
            "paths": [missing.to_string_lossy()],
            "artist": "Somebody",
        }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["updated"], 0);
}

#[tokio::test]
async fn test_metadata_fix_requires_api_key() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client
        .fix_metadata(&server.library_path(UNIQUE_TRACK).to_string_lossy())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "API Key not set");
}

#[tokio::test]
async fn test_browse_dirs() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.browse_dirs(None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["is_root"], true);
    let names: Vec<&str> = body["subdirs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, LIBRARY_FOLDERS);

    let live = server.music_dir().join("Live");
    let body: Value = client
        .browse_dirs(Some(&live.to_string_lossy()))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["is_root"], false);
    assert_eq!(body["current_path"], live.to_string_lossy().to_string());
    assert_eq!(
        body["parent_path"],
        server.music_dir().to_string_lossy().to_string()
    );

    // outside the library falls back to the root
    let body: Value = client
        .browse_dirs(Some("/etc"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["is_root"], true);
}
