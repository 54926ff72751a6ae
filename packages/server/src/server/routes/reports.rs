//! Report import surface and the prospect review queue.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use enrichment::{ContactStore, EnrichmentError, ProspectStore, ReportStore};

use crate::server::app::AppState;
use crate::server::routes::jobs::ErrorBody;

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub domain: String,
    pub company_name: Option<String>,
}

pub async fn create_report_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<CreateReportRequest>,
) -> Response {
    let domain = body.domain.trim();
    if domain.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody::new(422, "domain must not be empty")),
        )
            .into_response();
    }

    match create_report(&state, domain, body.company_name.as_deref()).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "report import failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(500, "internal error")),
            )
                .into_response()
        }
    }
}

async fn create_report(
    state: &AppState,
    domain: &str,
    company_name: Option<&str>,
) -> Result<Response, EnrichmentError> {
    let report = state.store.create_report(domain, company_name).await?;
    let prospect = state.store.create_prospect(report.id).await?;
    info!(report_id = %report.id, domain, "report imported");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "report": report, "prospect": prospect })),
    )
        .into_response())
}

pub async fn report_prospects_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.prospects_for_report(id).await {
        Ok(prospects) => Json(prospects).into_response(),
        Err(e) => {
            error!(error = %e, "failed to list prospects");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(500, "internal error")),
            )
                .into_response()
        }
    }
}

pub async fn prospect_contacts_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.contacts_for_prospect(id).await {
        Ok(contacts) => Json(contacts).into_response(),
        Err(e) => {
            error!(error = %e, "failed to list contacts");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(500, "internal error")),
            )
                .into_response()
        }
    }
}
