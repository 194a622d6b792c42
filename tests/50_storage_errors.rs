mod common;

use anyhow::Result;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use common::{permit_all, serve, RecordingStore};

#[tokio::test]
async fn storage_failures_surface_as_500() -> Result<()> {
    let server = serve(RecordingStore::failing("connection refused"), permit_all()).await?;

    let requests = [
        (Method::GET, "", Value::Null),
        (Method::GET, "/paginate/1/10", Value::Null),
        (Method::POST, "/create", json!({ "model": { "title": "x" } })),
        (Method::PUT, "", json!({ "model": { "_id": "42" } })),
        (Method::DELETE, "/42", Value::Null),
        (Method::POST, "/search", json!({ "query": {} })),
    ];

    for (method, path, body) in requests {
        let mut request = server.client.request(method.clone(), server.url(path));
        if !body.is_null() {
            request = request.json(&body);
        }
        let res = request.send().await?;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR, "{} {}", method, path);

        let body = res.json::<Value>().await?;
        assert_eq!(body["code"], "STORAGE_ERROR");
        let message = body["message"].as_str().unwrap_or_default();
        assert!(message.contains("connection refused"), "unexpected message: {}", message);
    }

    assert_eq!(server.store.calls().len(), 6);

    Ok(())
}

#[tokio::test]
async fn denial_wins_over_storage_failure() -> Result<()> {
    let server = serve(RecordingStore::failing("connection refused"), common::deny_all()).await?;

    let res = server.client.get(server.url("")).send().await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(res.json::<Value>().await?["code"], "NOT_AUTHORIZED");
    assert!(server.store.calls().is_empty());

    Ok(())
}
