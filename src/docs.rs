use crate::api::attendance::{AdminRecord, AdminResponse, UploadForm, UploadResponse};
use crate::model::attendance::AttendanceSummary;
use crate::store::SessionAction;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Guard Attendance API",
        version = "0.1.0",
        description = r#"
## Guard Attendance

Security guards check in and out by uploading a geotagged photo.

### Flow
- The GPS position is read from the photo's EXIF block
- Photos without a position, or taken outside the configured boundary, are rejected
- The first accepted upload opens a session for the guard, the next one closes it

### Admin
- `GET /admin` lists every record
- `GET /image/{id}` returns the stored photo
"#,
    ),
    paths(
        crate::api::attendance::upload,
        crate::api::attendance::admin,
        crate::api::attendance::image
    ),
    components(
        schemas(
            UploadForm,
            UploadResponse,
            SessionAction,
            AttendanceSummary,
            AdminRecord,
            AdminResponse
        )
    ),
    tags(
        (name = "Attendance", description = "Photo check-in and check-out"),
        (name = "Admin", description = "Attendance records and stored photos"),
    )
)]
pub struct ApiDoc;
