use crate::db_storage::LeadRepository;
use crate::errors::{AppError, ResultExt};
use crate::models::LeadForm;
use crate::templates::{render_leads_page, STATIC_FOLDER};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer,
};

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub leads: LeadRepository,
}

/// Routes of the CRUD service, without rate limiting.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/", get(list_leads))
        .route("/manage-lead", post(manage_lead))
        .route("/del-lead/:user_id", get(delete_lead))
        .nest_service("/static", ServeDir::new(STATIC_FOLDER))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // Form posts are tiny; 64KB is plenty.
                .layer(RequestBodyLimitLayer::new(64 * 1024)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// GET /health-check
pub async fn health_check() -> &'static str {
    "Ok"
}

/// GET /
///
/// Lists every lead, ordered by `user_id`: the CRM page for browsers, JSON
/// when the client asks for `application/json`.
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let leads = state.leads.list().await?;
    tracing::debug!("Listing {} leads", leads.len());

    if wants_json(&headers) {
        Ok(Json(leads).into_response())
    } else {
        Ok(Html(render_leads_page(&leads)).into_response())
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json") && !accept.contains("text/html"))
}

/// POST /manage-lead
///
/// Inserts a lead, or updates it when the form carries a `user_id`.
pub async fn manage_lead(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LeadForm>,
) -> Result<Redirect, AppError> {
    let fields = form.fields();

    match parse_user_id(form.user_id.as_deref())? {
        Some(user_id) => {
            tracing::info!("POST /manage-lead - updating lead {}", user_id);
            state
                .leads
                .update(user_id, &fields)
                .await
                .context(format!("Updating lead {}", user_id))?;
        }
        None => {
            tracing::info!("POST /manage-lead - creating lead");
            state.leads.insert(&fields).await.context("Creating lead")?;
        }
    }

    Ok(Redirect::to("/"))
}

/// GET /del-lead/:user_id
pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Redirect, AppError> {
    let user_id = parse_user_id(Some(&user_id))?
        .ok_or_else(|| AppError::BadRequest("user_id is required".to_string()))?;

    tracing::info!("GET /del-lead/{}", user_id);
    state
        .leads
        .delete(user_id)
        .await
        .context(format!("Deleting lead {}", user_id))?;

    Ok(Redirect::to("/"))
}

/// Blank means "no id"; anything else must be a number.
fn parse_user_id(raw: Option<&str>) -> Result<Option<i32>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse::<i32>()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Invalid user_id '{}'", value))),
    }
}
