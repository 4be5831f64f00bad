use crate::config::Config;
use crate::error::AppError;
use crate::model::attendance::AttendanceSummary;
use crate::recorder::{Recorder, Submission};
use crate::store::{AttendanceStore, SessionAction};
use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

/// Matches the `guard_name` column width.
const MAX_GUARD_NAME_CHARS: usize = 255;
const MAX_GUARD_NAME_BYTES: usize = MAX_GUARD_NAME_CHARS * 4;

/// Multipart body of `POST /upload`.
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(example = "Ravi")]
    pub guard_name: String,
    /// Geotagged photo
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    #[schema(example = "Checked in successfully")]
    pub message: String,
    #[schema(example = 1)]
    pub id: u64,
    pub action: SessionAction,
    #[schema(example = 13.0827, nullable = true)]
    pub latitude: Option<f64>,
    #[schema(example = 80.2707, nullable = true)]
    pub longitude: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct AdminRecord {
    #[serde(flatten)]
    pub record: AttendanceSummary,
    #[schema(example = "/image/1")]
    pub image_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct AdminResponse {
    pub records: Vec<AdminRecord>,
    #[schema(example = "2026-01-01T08:00:00Z", format = "date-time", value_type = Option<String>, nullable = true)]
    pub last_timestamp: Option<DateTime<Utc>>,
}

fn success_message(action: SessionAction) -> &'static str {
    match action {
        SessionAction::CheckIn => "Checked in successfully",
        SessionAction::CheckOut => "Checked out successfully",
        SessionAction::Recorded => "Attendance recorded successfully",
    }
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, AppError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Malformed upload: {e}")))?;
        if data.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge(limit));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn read_upload(mut payload: Multipart, max_upload_bytes: usize) -> Result<UploadForm, AppError> {
    let mut guard_name = None;
    let mut image = None;

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| AppError::BadRequest(format!("Malformed upload: {e}")))?;
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_owned();

        match name.as_str() {
            "guard_name" => {
                let raw = read_field(&mut field, MAX_GUARD_NAME_BYTES)
                    .await
                    .map_err(|e| match e {
                        AppError::PayloadTooLarge(_) => {
                            AppError::BadRequest("guard_name is too long".into())
                        }
                        other => other,
                    })?;
                let text = String::from_utf8(raw)
                    .map_err(|_| AppError::BadRequest("guard_name must be UTF-8 text".into()))?;
                guard_name = Some(text);
            }
            "image" => image = Some(read_field(&mut field, max_upload_bytes).await?),
            other => {
                debug!(field = other, "Ignoring unknown upload field");
                // The stream only advances once the field is drained.
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::BadRequest(format!("Malformed upload: {e}")))?;
                }
            }
        }
    }

    let guard_name = guard_name
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("guard_name is required".into()))?;
    if guard_name.chars().count() > MAX_GUARD_NAME_CHARS {
        return Err(AppError::BadRequest("guard_name is too long".into()));
    }

    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("image is required".into()))?;

    Ok(UploadForm { guard_name, image })
}

/// Upload a geotagged photo to check in or out
#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Attendance recorded", body = UploadResponse),
        (status = 400, description = "Missing guard name or image", body = Object, example = json!({
            "message": "guard_name is required"
        })),
        (status = 413, description = "Image too large"),
        (status = 422, description = "Photo has no geotag or was taken outside the boundary", body = Object, example = json!({
            "message": "Coordinates are outside the permitted boundary. Record rejected."
        })),
        (status = 429, description = "Too many uploads"),
        (status = 500, description = "Internal server error", body = Object, example = json!({
            "message": "Something went wrong, Contact with system admin"
        }))
    ),
    tag = "Attendance"
)]
#[instrument(name = "attendance_upload", skip(recorder, config, payload))]
pub async fn upload(
    recorder: web::Data<Recorder>,
    config: web::Data<Config>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let form = read_upload(payload, config.max_upload_bytes).await?;
    info!(guard_name = %form.guard_name, bytes = form.image.len(), "Upload received");

    let submission = recorder
        .submit(&form.guard_name, form.image)
        .await
        .map_err(|e| {
            error!(error = %e, guard_name = %form.guard_name, "Failed to record attendance");
            AppError::Internal
        })?;

    match submission {
        Submission::Accepted {
            transition,
            coordinates,
        } => Ok(HttpResponse::Ok().json(UploadResponse {
            message: success_message(transition.action).to_string(),
            id: transition.id,
            action: transition.action,
            latitude: coordinates.map(|c| c.latitude),
            longitude: coordinates.map(|c| c.longitude),
        })),
        Submission::Rejected(rejection) => Err(AppError::Rejected(rejection)),
    }
}

/// List every attendance record
#[utoipa::path(
    get,
    path = "/admin",
    responses(
        (status = 200, description = "All records, oldest first", body = AdminResponse)
    ),
    tag = "Admin"
)]
pub async fn admin(store: web::Data<dyn AttendanceStore>) -> HttpResponse {
    let listing = match store.list().await {
        Ok(records) => store.latest_start().await.map(|last| (records, last)),
        Err(e) => Err(e),
    };

    let (records, last_timestamp) = listing.unwrap_or_else(|e| {
        error!(error = %e, "Failed to fetch attendance records");
        (Vec::new(), None)
    });

    HttpResponse::Ok().json(AdminResponse {
        records: records
            .into_iter()
            .map(|record| AdminRecord {
                image_url: record.image_url(),
                record,
            })
            .collect(),
        last_timestamp,
    })
}

/// Stream a stored photo back
#[utoipa::path(
    get,
    path = "/image/{id}",
    params(
        ("id" = u64, Path, description = "Attendance record id")
    ),
    responses(
        (status = 200, description = "Raw image bytes"),
        (status = 404, description = "No record with this id", body = Object, example = json!({
            "message": "Image not found"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Admin"
)]
pub async fn image(
    store: web::Data<dyn AttendanceStore>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    match store.image(id).await {
        Ok(Some(bytes)) => Ok(HttpResponse::Ok()
            .content_type(image_content_type(&bytes))
            .body(bytes)),
        Ok(None) => Err(AppError::NotFound),
        Err(e) => {
            error!(error = %e, id, "Failed to fetch image");
            Err(AppError::Internal)
        }
    }
}

/// Sniff the container from magic bytes; JPEG when unknown.
fn image_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        "image/heic"
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        "image/tiff"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::geotag::fixtures::{jpeg_at, plain_jpeg};
    use crate::routes;
    use crate::store::memory::MemoryAttendanceStore;
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, test};
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::sync::Arc;

    const BOUNDARY: &str = "----attendance-test-boundary";

    fn multipart(guard_name: Option<&str>, image: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(name) = guard_name {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"guard_name\"\r\n\r\n{name}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn upload_request(guard_name: Option<&str>, image: Option<&[u8]>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/upload")
            .peer_addr(peer())
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart(guard_name, image))
    }

    fn get(uri: &str) -> test::TestRequest {
        test::TestRequest::get().uri(uri).peer_addr(peer())
    }

    macro_rules! app {
        ($store:expr, $config:expr) => {{
            let store: Arc<dyn AttendanceStore> = $store.clone();
            let config = $config;
            test::init_service(App::new().configure(|cfg| routes::configure(cfg, &config, store))).await
        }};
    }

    #[actix_web::test]
    async fn upload_inside_boundary_checks_in_then_out() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[]).unwrap());

        let resp = test::call_service(&app, upload_request(Some("Ravi"), Some(&jpeg_at(13.0, 80.2))).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["action"], "check_in");
        assert_eq!(body["message"], "Checked in successfully");
        assert_eq!(body["id"], 1);

        let resp = test::call_service(&app, upload_request(Some("Ravi"), Some(&jpeg_at(13.0, 80.2))).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["action"], "check_out");
        assert_eq!(body["id"], 1);

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].end_timestamp.is_some());
    }

    #[actix_web::test]
    async fn upload_outside_boundary_is_rejected() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[]).unwrap());

        let resp = test::call_service(&app, upload_request(Some("Ravi"), Some(&jpeg_at(0.0, 0.0))).to_request()).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body["message"],
            "Coordinates are outside the permitted boundary. Record rejected."
        );
        assert!(store.rows().is_empty());
    }

    #[actix_web::test]
    async fn upload_without_geotag_is_rejected() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[]).unwrap());

        let resp = test::call_service(&app, upload_request(Some("Ravi"), Some(&plain_jpeg())).to_request()).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(store.rows().is_empty());
    }

    #[actix_web::test]
    async fn upload_without_boundary_accepts_untagged_photo() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let config = Config::for_tests(&[("BOUNDARY_CHECK", "false"), ("SESSION_PAIRING", "false")]).unwrap();
        let app = app!(store, config);

        for _ in 0..2 {
            let resp = test::call_service(&app, upload_request(Some("Ravi"), Some(&plain_jpeg())).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["action"], "recorded");
            assert!(body["latitude"].is_null());
        }

        assert_eq!(store.rows().len(), 2);
    }

    #[actix_web::test]
    async fn upload_requires_guard_name_and_image() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[]).unwrap());
        let photo = jpeg_at(13.0, 80.2);

        let resp = test::call_service(&app, upload_request(None, Some(&photo)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, upload_request(Some("   "), Some(&photo)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, upload_request(Some("Ravi"), None).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "image is required");

        assert!(store.rows().is_empty());
    }

    #[actix_web::test]
    async fn oversized_upload_is_refused() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[("MAX_UPLOAD_BYTES", "16")]).unwrap());

        let resp = test::call_service(&app, upload_request(Some("Ravi"), Some(&jpeg_at(13.0, 80.2))).to_request()).await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(store.rows().is_empty());
    }

    #[actix_web::test]
    async fn long_guard_name_is_refused() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[]).unwrap());
        let name = "r".repeat(MAX_GUARD_NAME_BYTES + 1);

        let resp = test::call_service(&app, upload_request(Some(&name), Some(&jpeg_at(13.0, 80.2))).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "guard_name is too long");
        assert!(store.rows().is_empty());
    }

    #[actix_web::test]
    async fn truncated_guard_name_is_a_malformed_upload() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[]).unwrap());
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"guard_name\"\r\n\r\nRavi"
        );

        let req = upload_request(None, None).set_payload(body).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with("Malformed upload"), "{message}");
        assert!(store.rows().is_empty());
    }

    #[actix_web::test]
    async fn store_failure_is_a_generic_error() {
        let store = Arc::new(MemoryAttendanceStore::new());
        store.fail_all();
        let app = app!(store, Config::for_tests(&[]).unwrap());

        let resp = test::call_service(&app, upload_request(Some("Ravi"), Some(&jpeg_at(13.0, 80.2))).to_request()).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Something went wrong, Contact with system admin");
    }

    #[actix_web::test]
    async fn admin_lists_records_with_image_links() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[]).unwrap());

        test::call_service(&app, upload_request(Some("Ravi"), Some(&jpeg_at(13.0, 80.2))).to_request()).await;
        test::call_service(&app, upload_request(Some("Meena"), Some(&jpeg_at(13.1, 80.3))).to_request()).await;

        let resp = test::call_service(&app, get("/admin").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;

        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["guard_name"], "Ravi");
        assert_eq!(records[1]["image_url"], "/image/2");
        assert!(records[0]["end_timestamp"].is_null());
        assert!(records[0].get("image").is_none());
        assert!(body["last_timestamp"].is_string());
    }

    #[actix_web::test]
    async fn admin_degrades_to_empty_listing() {
        let store = Arc::new(MemoryAttendanceStore::new());
        store.fail_all();
        let app = app!(store, Config::for_tests(&[]).unwrap());

        let resp = test::call_service(&app, get("/admin").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["records"].as_array().unwrap().len(), 0);
        assert!(body["last_timestamp"].is_null());
    }

    #[actix_web::test]
    async fn image_is_served_back() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[]).unwrap());
        let photo = jpeg_at(13.0, 80.2);

        test::call_service(&app, upload_request(Some("Ravi"), Some(&photo)).to_request()).await;

        let resp = test::call_service(&app, get("/image/1").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/jpeg"
        );
        let body = test::read_body(resp).await;
        assert_eq!(body.as_ref(), photo.as_slice());
    }

    #[actix_web::test]
    async fn unknown_image_is_not_found() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let app = app!(store, Config::for_tests(&[]).unwrap());

        let resp = test::call_service(&app, get("/image/42").to_request()).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Image not found");
    }

    #[actix_web::test]
    async fn content_type_follows_magic_bytes() {
        assert_eq!(image_content_type(&plain_jpeg()), "image/jpeg");
        assert_eq!(image_content_type(b"\x89PNG\r\n\x1a\n...."), "image/png");
        assert_eq!(image_content_type(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(image_content_type(b"\0\0\0\x18ftypheic"), "image/heic");
        assert_eq!(image_content_type(b"II*\0\x08\0\0\0"), "image/tiff");
        assert_eq!(image_content_type(b"??"), "image/jpeg");
    }
}
