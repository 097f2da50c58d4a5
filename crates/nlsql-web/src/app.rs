//! Routes and server loop.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

use nlsql_core::{Completer, Embedder, Result, TrainingStore};
use nlsql_query::SqlAgent;

use crate::page::render_page;

/// Shared state: one agent, built before the server starts.
pub struct AppState<S, E, C> {
    pub agent: Arc<SqlAgent<S, E, C>>,
}

impl<S, E, C> AppState<S, E, C> {
    pub fn new(agent: SqlAgent<S, E, C>) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }
}

impl<S, E, C> Clone for AppState<S, E, C> {
    fn clone(&self) -> Self {
        Self {
            agent: self.agent.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    pub q: String,
}

/// Build the router: `GET /` shows the form, `POST /ask` answers it.
pub fn router<S, E, C>(state: AppState<S, E, C>) -> Router
where
    S: TrainingStore + 'static,
    E: Embedder + 'static,
    C: Completer + 'static,
{
    Router::new()
        .route("/", get(index))
        .route("/ask", post(ask::<S, E, C>))
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(render_page(None))
}

async fn ask<S, E, C>(State(state): State<AppState<S, E, C>>, Form(form): Form<AskForm>) -> Response
where
    S: TrainingStore + 'static,
    E: Embedder + 'static,
    C: Completer + 'static,
{
    let question = form.q.trim();
    if question.is_empty() {
        return Redirect::to("/").into_response();
    }

    let outcome = state.agent.ask(question).await;
    Html(render_page(Some(&outcome))).into_response()
}

/// Serve the form on `bind_address` until the process stops.
pub async fn serve<S, E, C>(bind_address: &str, state: AppState<S, E, C>) -> Result<()>
where
    S: TrainingStore + 'static,
    E: Embedder + 'static,
    C: Completer + 'static,
{
    let listener = TcpListener::bind(bind_address).await?;
    info!("Web form listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
