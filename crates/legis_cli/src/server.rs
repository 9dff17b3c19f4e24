//! HTTP front for the query service: `GET /api/{resource}`.

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use legis_core::db::Store;
use legis_core::error::QueryError;
use legis_core::query;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub database: Arc<PathBuf>,
}

impl AppState {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: Arc::new(database.into()),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/:resource", get(api))
        .with_state(state)
}

async fn api(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let database = state.database.clone();
    let outcome = tokio::task::spawn_blocking(move || -> Result<_, QueryError> {
        let store = Store::open_read_only(&database)?;
        query::handle(&store, &resource, &params)
    })
    .await;

    match outcome {
        Ok(Ok(answer)) => {
            let status = StatusCode::from_u16(answer.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if answer.body.is_empty() {
                status.into_response()
            } else {
                (status, [(header::CONTENT_TYPE, "application/json")], answer.body).into_response()
            }
        }
        Ok(Err(err)) => {
            error!(%err, "query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => {
            error!(%err, "query task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, database = %state.database.display(), "query service listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("query service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(%err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("received ctrl-c, shutting down");
}
