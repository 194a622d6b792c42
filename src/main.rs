use std::sync::Arc;

use axum::{http::HeaderValue, routing::get, Router};
use clap::Parser;
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crud_gate::acl::{self, ExistingPermissions, MemoryPermissionStore, PermissionStore, PgPermissionStore};
use crud_gate::config::AppConfig;
use crud_gate::storage::{postgres, MemoryStore, PgDocumentStore, StorageHandle};
use crud_gate::{Criteria, CrudDomainLogic, CrudService, Decision, RequestContext};

#[derive(Parser, Debug)]
#[command(name = "crud-gate")]
#[command(about = "Serve a permission-gated CRUD surface for one collection")]
#[command(version)]
struct Args {
    #[arg(long, help = "Port to listen on (overrides CRUD_GATE_PORT / PORT)")]
    port: Option<u16>,

    #[arg(long, default_value = "Item", help = "Entity (model) name of the collection")]
    collection: String,

    #[arg(long, default_value = "/api/items", help = "Mount point of the CRUD routes")]
    mount: String,

    #[arg(long, help = "Use the in-memory store even when DATABASE_URL is set")]
    memory: bool,

    #[arg(long, help = "Populate default permission records for every action")]
    register_acl: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = crud_gate::config::config();
    tracing::info!("Starting crud-gate in {:?} mode", config.environment);

    let (storage, permissions) = open_stores(&args, config).await?;

    if args.register_acl {
        let key = args.collection.to_lowercase();
        acl::register_action(&*permissions, &key, true, ExistingPermissions::Preserve).await?;
    }

    let service = CrudService::new(storage, tenant_scoped_logic()).with_config(config.dispatch.clone());
    let app = app(service, &args.mount, config);

    let port = args.port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("crud-gate listening on http://{}{}", bind_addr, args.mount);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn open_stores(
    args: &Args,
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn StorageHandle>, Arc<dyn PermissionStore>)> {
    if args.memory || config.database.url.is_none() {
        tracing::info!("Using in-memory store for {}", args.collection);
        return Ok((
            Arc::new(MemoryStore::new(&args.collection)),
            Arc::new(MemoryPermissionStore::new()),
        ));
    }

    let pool = postgres::connect(&config.database).await?;
    let store = PgDocumentStore::new(&args.collection, pool.clone())?;
    store.ensure_table().await?;
    let permissions = PgPermissionStore::new(pool);
    permissions.ensure_table().await?;
    Ok((Arc::new(store), Arc::new(permissions)))
}

/// Requests must name a tenant in `x-tenant`; every read and mutation is
/// scoped to it. Creates must carry the same tenant in `model.tenant`, so
/// new records stay visible to the tenant that wrote them.
fn tenant_scoped_logic() -> CrudDomainLogic {
    CrudDomainLogic::new(create_for_tenant, scoped_to_tenant, scoped_to_tenant, scoped_to_tenant, scoped_to_tenant)
}

fn scoped_to_tenant(ctx: &RequestContext) -> Decision {
    match tenant(ctx) {
        Some(tenant) => {
            let mut criteria = Criteria::new();
            criteria.insert("tenant".to_string(), Value::String(tenant.to_string()));
            Decision::permit().with_criteria(criteria)
        }
        None => Decision::deny(),
    }
}

fn create_for_tenant(ctx: &RequestContext) -> Decision {
    match (tenant(ctx), ctx.body.pointer("/model/tenant").and_then(Value::as_str)) {
        (Some(tenant), Some(owner)) if owner == tenant => Decision::permit(),
        _ => Decision::deny(),
    }
}

fn tenant(ctx: &RequestContext) -> Option<&str> {
    ctx.header("x-tenant").filter(|t| !t.is_empty())
}

fn app(service: CrudService, mount: &str, config: &AppConfig) -> Router {
    let routes = service.router();
    let router = Router::new().route("/health", get(health));
    // axum rejects nesting at the root
    let mut router = match mount.trim_end_matches('/') {
        "" => router.merge(routes),
        prefix => router.nest(prefix, routes),
    };

    if config.security.enable_cors {
        let origins = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect::<Vec<_>>();
        router = router.layer(CorsLayer::new().allow_origin(AllowOrigin::list(origins)));
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

async fn health() -> axum::response::Json<Value> {
    axum::response::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
    }))
}
