mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crud_gate::query::SortOrder;
use crud_gate::storage::{MemoryStore, PageRequest, ReadOptions, StorageHandle};
use crud_gate::{CrudDomainLogic, Decision, RequestContext};
use std::sync::Arc;

use common::{criteria, notes, permit_all, scoped, serve, Call, RecordingStore, MAX_PAGE_LIMIT};

fn tenant_notes(count: usize) -> Vec<Value> {
    (0..count)
        .map(|n| {
            json!({
                "_id": format!("n{n}"),
                "tenant": if n % 2 == 0 { "A" } else { "B" },
                "createdAt": format!("2024-01-01T00:00:{:02}.000000Z", n),
            })
        })
        .collect()
}

#[tokio::test]
async fn list_returns_newest_first_envelope() -> Result<()> {
    let server = serve(notes(tenant_notes(3)), permit_all()).await?;

    let res = server.client.get(server.url("")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    let ids: Vec<&str> = body["data"].as_array().unwrap().iter().filter_map(|d| d["_id"].as_str()).collect();
    assert_eq!(ids, vec!["n2", "n1", "n0"]);
    assert_eq!(body["count"], 3);

    Ok(())
}

#[tokio::test]
async fn list_query_is_request_terms_and_criteria() -> Result<()> {
    let server = serve(notes(tenant_notes(6)), scoped(json!({ "tenant": "A" }))).await?;

    // Caller tries to widen the scope to tenant B; criteria wins
    let res = server.client.get(server.url("?tenant=B&status=open")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    match server.store.calls().as_slice() {
        [Call::Find(query, options)] => {
            assert_eq!(query, &criteria(json!({ "tenant": "A", "status": "open" })));
            assert_eq!(options.sort, Some(SortOrder::newest_first()));
        }
        other => panic!("unexpected storage calls: {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn list_only_returns_scoped_documents() -> Result<()> {
    let server = serve(notes(tenant_notes(6)), scoped(json!({ "tenant": "A" }))).await?;

    let body = server.client.get(server.url("?tenant=B")).send().await?.json::<Value>().await?;
    let data = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(data.len(), 3);
    assert!(data.iter().all(|d| d["tenant"] == "A"), "leaked documents: {}", body);

    Ok(())
}

#[tokio::test]
async fn paginate_counts_all_matches() -> Result<()> {
    let docs = (0..25)
        .map(|n| json!({ "_id": format!("n{n}"), "createdAt": format!("2024-01-01T00:00:{:02}.000000Z", n) }))
        .collect();
    let server = serve(notes(docs), permit_all()).await?;

    let res = server.client.get(server.url("/paginate/1/10")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["count"], 25);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 10);
    assert_eq!(data[0]["_id"], "n24");

    let last = server.client.get(server.url("/paginate/3/10")).send().await?.json::<Value>().await?;
    assert_eq!(last["count"], 25);
    assert_eq!(last["data"].as_array().unwrap().len(), 5);

    Ok(())
}

#[tokio::test]
async fn paginate_count_uses_the_scoped_query() -> Result<()> {
    let server = serve(notes(tenant_notes(6)), scoped(json!({ "tenant": "B" }))).await?;

    let body = server.client.get(server.url("/paginate/1/2")).send().await?.json::<Value>().await?;
    assert_eq!(body["count"], 3);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let calls = server.store.calls();
    assert_eq!(calls[0], Call::Count(criteria(json!({ "tenant": "B" }))));
    assert_eq!(
        calls[1],
        Call::Paginate(criteria(json!({ "tenant": "B" })), PageRequest { page: 1, limit: 2 })
    );

    Ok(())
}

#[tokio::test]
async fn paginate_rejects_malformed_parameters() -> Result<()> {
    let server = serve(notes(tenant_notes(3)), permit_all()).await?;

    for path in ["/paginate/zero/10", "/paginate/0/10", "/paginate/1/-5", "/paginate/1/0"] {
        let res = server.client.get(server.url(path)).send().await?;
        assert_eq!(res.status(), StatusCode::CONFLICT, "{} should be rejected", path);
        let body = res.json::<Value>().await?;
        assert_eq!(body["code"], "MALFORMED_INPUT");
    }
    assert!(server.store.calls().is_empty());

    Ok(())
}

#[tokio::test]
async fn paginate_limit_is_clamped() -> Result<()> {
    let server = serve(notes(vec![]), permit_all()).await?;

    let res = server.client.get(server.url("/paginate/1/100000")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(server
        .store
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Paginate(_, page) if page.limit == MAX_PAGE_LIMIT)));

    Ok(())
}

#[tokio::test]
async fn search_merges_body_query_with_criteria() -> Result<()> {
    let server = serve(notes(tenant_notes(6)), scoped(json!({ "tenant": "A" }))).await?;

    let res = server
        .client
        .post(server.url("/search"))
        .json(&json!({ "query": { "tenant": "B", "_id": { "$in": ["n0", "n1", "n2"] } } }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    let ids: Vec<&str> = body.as_array().unwrap().iter().filter_map(|d| d["_id"].as_str()).collect();
    assert_eq!(ids, vec!["n0", "n2"]);

    match server.store.calls().as_slice() {
        [Call::Find(query, _)] => {
            assert_eq!(query, &criteria(json!({ "tenant": "A", "_id": { "$in": ["n0", "n1", "n2"] } })));
        }
        other => panic!("unexpected storage calls: {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn search_rejects_non_object_query() -> Result<()> {
    let server = serve(notes(vec![]), permit_all()).await?;

    let res = server.client.post(server.url("/search")).json(&json!({ "query": "tenant = 'A'" })).send().await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert!(server.store.calls().is_empty());

    Ok(())
}

#[tokio::test]
async fn populate_and_exclude_apply_to_reads() -> Result<()> {
    let users: Arc<dyn StorageHandle> = Arc::new(
        MemoryStore::new("User").with_documents(vec![json!({ "_id": "u1", "name": "Ada" })]),
    );
    let inner = MemoryStore::new("Note")
        .with_relation("author", users)
        .with_documents(vec![json!({ "_id": "n1", "author": "u1", "internal": "x" })]);
    let logic = CrudDomainLogic::uniform(|_: &RequestContext| {
        Decision::permit().with_populate(["author"]).with_exclude(["internal"])
    });
    let server = serve(RecordingStore::new(inner), logic).await?;

    let body = server.client.get(server.url("")).send().await?.json::<Value>().await?;
    assert_eq!(body["data"], json!([{ "_id": "n1", "author": { "_id": "u1", "name": "Ada" } }]));

    let found = server.client.post(server.url("/search")).json(&json!({})).send().await?.json::<Value>().await?;
    assert_eq!(found, json!([{ "_id": "n1", "author": { "_id": "u1", "name": "Ada" } }]));

    match &server.store.calls()[0] {
        Call::Find(_, options) => assert_eq!(
            options,
            &ReadOptions {
                sort: Some(SortOrder::newest_first()),
                populate: vec!["author".into()],
                exclude: vec!["internal".into()],
            }
        ),
        other => panic!("unexpected storage call: {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn malformed_query_is_rejected_before_storage() -> Result<()> {
    for docs in [vec![], tenant_notes(3)] {
        let server = serve(notes(docs), permit_all()).await?;

        let bodies = [
            json!({ "query": { "a": { "$where": 1 } } }),
            json!({ "query": { "_id": { "$in": "n0" } } }),
            json!({ "query": { "$or": { "tenant": "A" } } }),
        ];
        for body in bodies {
            let res = server.client.post(server.url("/search")).json(&body).send().await?;
            assert_eq!(res.status(), StatusCode::CONFLICT, "{} should be rejected", body);
            assert_eq!(res.json::<Value>().await?["code"], "MALFORMED_INPUT");
        }

        for path in ["?$or=x", "/paginate/1/10?$where=1"] {
            let res = server.client.get(server.url(path)).send().await?;
            assert_eq!(res.status(), StatusCode::CONFLICT, "{} should be rejected", path);
            assert_eq!(res.json::<Value>().await?["code"], "MALFORMED_INPUT");
        }

        assert!(server.store.calls().is_empty());
    }

    Ok(())
}
