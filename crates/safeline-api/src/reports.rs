use anyhow::Context;
use axum::{
    Json,
    extract::{FromRequest, Multipart, Path, Request, State, rejection::JsonRejection, rejection::PathRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use safeline_db::Database;
use safeline_db::models::{NewReportRow, ReportRow};
use safeline_types::api::{CreateReportRequest, ReportListResponse, ReportResponse, UpdateCategoryRequest};
use safeline_types::models::{Category, Report, ReportStatus};

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::upload::{self, StoredImage};

/// Raw text fields of a submission, before validation.
#[derive(Debug, Default, Clone)]
pub struct ReportForm {
    pub location: String,
    pub description: String,
    pub category: String,
}

/// A submission whose fields have passed validation.
#[derive(Debug, Clone)]
pub struct ValidReport {
    pub location: String,
    pub description: String,
    pub category: Category,
}

impl ReportForm {
    pub fn validate(self) -> Result<ValidReport, ApiError> {
        if self.location.trim().is_empty()
            || self.description.trim().is_empty()
            || self.category.trim().is_empty()
        {
            return Err(ApiError::validation(
                "location, description, and category are required",
            ));
        }

        Ok(ValidReport {
            category: parse_category(&self.category)?,
            location: self.location,
            description: self.description,
        })
    }
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.parse().map_err(|_| ApiError::validation("invalid category"))
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

pub fn report_from_row(row: ReportRow) -> anyhow::Result<Report> {
    let id = row.id;
    Ok(Report {
        id,
        category: row
            .category
            .parse()
            .with_context(|| format!("corrupt category on report {}", id))?,
        status: row
            .status
            .parse()
            .with_context(|| format!("corrupt status on report {}", id))?,
        created_at: parse_timestamp(&row.created_at)
            .with_context(|| format!("corrupt created_at on report {}", id))?,
        updated_at: parse_timestamp(&row.updated_at)
            .with_context(|| format!("corrupt updated_at on report {}", id))?,
        location: row.location,
        description: row.description,
        image_url: row.image_url,
        reporter_id: row.reporter_id,
        reporter_username: row.reporter_username,
    })
}

// -- Workflow --

/// Persist a validated report as `Unhandled`. The reporter's username is
/// copied at this point; if the user row cannot be read the id is still
/// recorded and the name left blank.
pub fn submit_report(
    db: &Database,
    report: &ValidReport,
    image_url: Option<&str>,
    reporter: Option<Identity>,
) -> Result<Report, ApiError> {
    let reporter_id = reporter.map(|r| r.user_id);
    let reporter_username = match reporter_id {
        Some(id) => match db.get_user_by_id(id) {
            Ok(Some(user)) => user.username,
            Ok(None) => {
                warn!("Reporter {} not found, leaving name blank", id);
                String::new()
            }
            Err(e) => {
                warn!("Failed to look up reporter {}: {:#}", id, e);
                String::new()
            }
        },
        None => String::new(),
    };

    let row = db.insert_report(&NewReportRow {
        location: &report.location,
        description: &report.description,
        category: report.category.as_str(),
        image_url,
        reporter_id,
        reporter_username: &reporter_username,
        status: ReportStatus::Unhandled.as_str(),
    })?;

    info!("Report {} created ({})", row.id, report.category);
    Ok(report_from_row(row)?)
}

pub fn find_report(db: &Database, id: i64) -> Result<Report, ApiError> {
    let row = db.get_report(id)?.ok_or(ApiError::NotFound)?;
    Ok(report_from_row(row)?)
}

/// Newest first.
pub fn all_reports(db: &Database) -> Result<Vec<Report>, ApiError> {
    db.list_reports()?
        .into_iter()
        .map(|row| report_from_row(row).map_err(ApiError::from))
        .collect()
}

/// Mark a report handled. Re-applying to an already handled report is fine.
pub fn mark_handled(db: &Database, id: i64) -> Result<Report, ApiError> {
    let row = db
        .set_report_status(id, ReportStatus::Handled.as_str())?
        .ok_or(ApiError::NotFound)?;
    info!("Report {} marked handled", id);
    Ok(report_from_row(row)?)
}

pub fn change_category(db: &Database, id: i64, raw_category: &str) -> Result<Report, ApiError> {
    let category = parse_category(raw_category)?;
    let row = db
        .set_report_category(id, category.as_str())?
        .ok_or(ApiError::NotFound)?;
    info!("Report {} recategorised as {}", id, category);
    Ok(report_from_row(row)?)
}

// -- Handlers --

fn report_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::validation("invalid report id"))
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

/// POST /reports — JSON body, or multipart with an optional `image` file.
pub async fn create_report(State(state): State<AppState>, req: Request) -> Result<impl IntoResponse, ApiError> {
    let reporter = req.extensions().get::<Identity>().copied();

    let (form, image_url, image) = if is_multipart(&req) {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        let (form, image) = upload::read_report_form(multipart).await?;
        (form, None, image)
    } else {
        let body: Result<Json<CreateReportRequest>, JsonRejection> =
            Json::from_request(req, &state).await;
        let Json(body) = body.map_err(|e| ApiError::validation(e.body_text()))?;
        let form = ReportForm {
            location: body.location,
            description: body.description,
            category: body.category,
        };
        let image_url = body.image_url.filter(|url| !url.trim().is_empty());
        (form, image_url, None)
    };

    let report = form.validate()?;

    // Only touch the disk once the text fields are known to be good
    let stored: Option<StoredImage> = match &image {
        Some(image) => Some(upload::save_image(&state.upload_dir, image).await?),
        None => None,
    };
    let image_url = stored.as_ref().map(|s| s.url.clone()).or(image_url);

    let db = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        submit_report(&db.db, &report, image_url.as_deref(), reporter)
    })
    .await
    .map_err(ApiError::from)
    .and_then(|r| r);

    match result {
        Ok(report) => Ok((StatusCode::CREATED, Json(ReportResponse { report }))),
        Err(e) => {
            if let Some(stored) = &stored {
                upload::discard_image(stored).await;
            }
            Err(e)
        }
    }
}

/// GET /reports/{id} — public.
pub async fn get_report(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = report_id(path)?;
    let report = tokio::task::spawn_blocking(move || find_report(&state.db, id)).await??;
    Ok(Json(ReportResponse { report }))
}

/// GET /reports — admin only.
pub async fn list_reports(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let reports = tokio::task::spawn_blocking(move || all_reports(&state.db)).await??;
    Ok(Json(ReportListResponse { reports }))
}

/// PUT /reports/{id}/handle — admin only.
pub async fn handle_report(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = report_id(path)?;
    let report = tokio::task::spawn_blocking(move || mark_handled(&state.db, id)).await??;
    Ok(Json(ReportResponse { report }))
}

/// PUT /reports/{id}/category — admin only.
pub async fn update_report_category(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateCategoryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = report_id(path)?;
    let Json(req) = payload.map_err(|e| ApiError::validation(e.body_text()))?;

    let report =
        tokio::task::spawn_blocking(move || change_category(&state.db, id, &req.category)).await??;
    Ok(Json(ReportResponse { report }))
}
