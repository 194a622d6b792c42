mod common;

use anyhow::Result;
use axum::http::StatusCode as AxumStatus;
use axum::response::IntoResponse;
use axum::Json;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crud_gate::{CrudDomainLogic, Decision, OperationResult, RequestContext};

use common::{notes, permit_all, serve};

/// Replies with the result wrapped in a custom envelope.
fn enveloped() -> CrudDomainLogic {
    CrudDomainLogic::uniform(|_: &RequestContext| {
        Decision::permit().on_response(|result: OperationResult, ctx: &RequestContext| {
            Json(json!({ "ok": true, "method": ctx.method.as_str(), "result": result.to_value() })).into_response()
        })
    })
}

#[tokio::test]
async fn hook_replaces_list_envelope() -> Result<()> {
    let server = serve(notes(vec![json!({ "_id": "n1" })]), enveloped()).await?;

    let body = server.client.get(server.url("")).send().await?.json::<Value>().await?;
    assert_eq!(body["ok"], true);
    assert_eq!(body["method"], "GET");
    assert_eq!(body["result"], json!({ "data": [{ "_id": "n1" }], "count": 1 }));

    Ok(())
}

#[tokio::test]
async fn hook_receives_created_entity() -> Result<()> {
    let server = serve(notes(vec![]), enveloped()).await?;

    let body = server
        .client
        .post(server.url("/create"))
        .json(&json!({ "model": { "title": "hooked" } }))
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["result"]["title"], "hooked");

    Ok(())
}

#[tokio::test]
async fn hook_runs_for_delete() -> Result<()> {
    let server = serve(notes(vec![json!({ "_id": "42" })]), enveloped()).await?;

    let body = server.client.delete(server.url("/42")).send().await?.json::<Value>().await?;
    assert_eq!(body["method"], "DELETE");
    assert_eq!(body["result"], json!({ "deleted": 1 }));

    Ok(())
}

#[tokio::test]
async fn hook_controls_status() -> Result<()> {
    let logic = CrudDomainLogic::uniform(|_: &RequestContext| {
        Decision::permit().on_response(|_: OperationResult, _: &RequestContext| AxumStatus::ACCEPTED.into_response())
    });
    let server = serve(notes(vec![]), logic).await?;

    let res = server.client.post(server.url("/search")).json(&json!({})).send().await?;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert!(server.store.calls().len() == 1);

    Ok(())
}

#[tokio::test]
async fn default_reply_without_hook() -> Result<()> {
    let server = serve(notes(vec![json!({ "_id": "n1" })]), permit_all()).await?;

    let found = server.client.post(server.url("/search")).json(&json!({})).send().await?.json::<Value>().await?;
    assert_eq!(found, json!([{ "_id": "n1" }]));

    Ok(())
}
