use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, patch, post},
    Json, Router,
};
use base64::Engine as _;
use bytes::Bytes;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::dto::{
    AdminUpdateRequest, CreateIssueBase64, CreatedIssueResponse, IssueDetails, IssueListItem,
    IssueListQuery, NearbyQuery, UpvoteResponse,
};
use super::geo;
use super::repo::{self, AdminPatch, IssueCategory, IssueFilter, NewIssue};
use super::services::{create_issue_with_photos, photo_urls, CreatedIssue};
use crate::auth::{AdminUser, AuthUser, OptionalAuthUser};
use crate::notifications;
use crate::photos::services::UploadItem;
use crate::state::AppState;

const DETAIL_PRESIGN_TTL_SECS: u64 = 30 * 60;
const BBOX_SCAN_LIMIT: i64 = 500;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/issues", get(list_issues))
        .route("/issues/nearby", get(nearby_issues))
        .route("/issues/:id", get(get_issue))
        .route("/issues/:id/photo", get(get_presigned_photo))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/issues", post(create_issue_multipart))
        .route("/issues/base64", post(create_issue_base64))
        .route("/issues/:id/upvote", post(toggle_upvote))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20 MiB
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/issues", get(admin_list_issues))
        .route("/admin/issues/:id", patch(admin_update_issue))
}

// --- read side ---

/// `mine=true` scopes the list to the caller and also surfaces their own
/// hidden reports, matching the single-issue view.
fn list_filter(
    q: IssueListQuery,
    caller: Option<Uuid>,
) -> Result<IssueFilter, (StatusCode, String)> {
    let reporter_id = if q.mine {
        match caller {
            Some(id) => Some(id),
            None => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "mine=true requires authentication".into(),
                ))
            }
        }
    } else {
        None
    };

    Ok(IssueFilter {
        status: q.status,
        category: q.category,
        reporter_id,
        include_hidden: reporter_id.is_some(),
        limit: q.limit.clamp(1, 100),
        offset: q.offset.max(0),
    })
}

#[instrument(skip(state))]
pub async fn list_issues(
    State(state): State<AppState>,
    OptionalAuthUser(caller): OptionalAuthUser,
    Query(q): Query<IssueListQuery>,
) -> Result<Json<Vec<IssueListItem>>, (StatusCode, String)> {
    let filter = list_filter(q, caller)?;
    let issues = repo::list(&state.db, &filter).await.map_err(internal)?;
    Ok(Json(issues.into_iter().map(IssueListItem::from_issue).collect()))
}

#[instrument(skip(state))]
pub async fn nearby_issues(
    State(state): State<AppState>,
    Query(q): Query<NearbyQuery>,
) -> Result<Json<Vec<IssueListItem>>, (StatusCode, String)> {
    if !geo::valid_coords(q.lat, q.lng) {
        return Err((StatusCode::BAD_REQUEST, "Invalid coordinates".into()));
    }
    let radius = q.radius_m.clamp(1.0, geo::MAX_RADIUS_M);
    let limit = q.limit.clamp(1, 100) as usize;

    let bbox = geo::bounding_box(q.lat, q.lng, radius);
    let candidates = repo::list_in_bbox(&state.db, &bbox, BBOX_SCAN_LIMIT)
        .await
        .map_err(internal)?;

    let mut items: Vec<IssueListItem> = candidates
        .into_iter()
        .filter_map(|i| {
            let d = geo::haversine_m(q.lat, q.lng, i.lat, i.lng);
            (d <= radius).then(|| {
                let mut item = IssueListItem::from_issue(i);
                item.distance_m = Some(d);
                item
            })
        })
        .collect();
    items.sort_by(|a, b| {
        a.distance_m
            .partial_cmp(&b.distance_m)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    items.truncate(limit);
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn get_issue(
    State(state): State<AppState>,
    OptionalAuthUser(caller): OptionalAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<IssueDetails>, (StatusCode, String)> {
    let issue = repo::get(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Issue not found".to_string()))?;

    // Hidden reports stay visible to their reporter.
    if !issue.public_visible && caller != Some(issue.reporter_id) {
        return Err((StatusCode::NOT_FOUND, "Issue not found".into()));
    }

    let photos = photo_urls(&state, issue.id, DETAIL_PRESIGN_TTL_SECS)
        .await
        .map_err(internal)?;

    let upvoted_by_me = match caller {
        Some(user_id) => Some(
            repo::has_upvoted(&state.db, issue.id, user_id)
                .await
                .map_err(internal)?,
        ),
        None => None,
    };

    Ok(Json(IssueDetails {
        id: issue.id,
        reporter_id: issue.reporter_id,
        title: issue.title,
        description: issue.description,
        category: issue.category,
        status: issue.status,
        priority: issue.priority,
        lat: issue.lat,
        lng: issue.lng,
        address: issue.address,
        admin_notes: issue.admin_notes,
        assigned_department: issue.assigned_department,
        upvote_count: issue.upvote_count,
        sentiment_score: issue.sentiment_score,
        reported_at: issue.reported_at,
        updated_at: issue.updated_at,
        resolved_at: issue.resolved_at,
        photos,
        upvoted_by_me,
    }))
}

/// 302 to a presigned URL of the issue's first photo.
#[instrument(skip(state))]
pub async fn get_presigned_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let row = match crate::photos::repo::first_by_issue(&state.db, id).await {
        Ok(v) => v,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    let Some((_, key)) = row else {
        return (StatusCode::NOT_FOUND, "Photo not found").into_response();
    };

    let ttl = state.config.presign_ttl_secs;
    let Ok(url) = state.storage.presign_get(&key, ttl).await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "presign failed").into_response();
    };

    Redirect::temporary(&url).into_response()
}

// --- write side ---

fn parse_category(s: &str) -> Result<IssueCategory, (StatusCode, String)> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("Unknown category '{}'", s)))
}

fn created_response(
    created: CreatedIssue,
) -> (StatusCode, HeaderMap, Json<CreatedIssueResponse>) {
    let status = if created.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let mut headers = HeaderMap::new();
    if let Ok(loc) = format!("/api/v1/issues/{}", created.issue.id).parse() {
        headers.insert(axum::http::header::LOCATION, loc);
    }
    (
        status,
        headers,
        Json(CreatedIssueResponse {
            id: created.issue.id,
            reported_at: created.issue.reported_at,
            photo_ids: created.photo_ids,
        }),
    )
}

#[derive(Debug)]
struct SubmittedIssue {
    title: String,
    description: String,
    category: IssueCategory,
    lat: f64,
    lng: f64,
    address: Option<String>,
    client_ref: Option<Uuid>,
}

impl SubmittedIssue {
    fn validate(&self) -> Result<(), (StatusCode, String)> {
        if self.title.trim().is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Title is required".into()));
        }
        if self.description.trim().is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Description is required".into()));
        }
        if !geo::valid_coords(self.lat, self.lng) {
            return Err((StatusCode::BAD_REQUEST, "Invalid coordinates".into()));
        }
        Ok(())
    }
}

/// Drains the multipart stream into the submission fields. A malformed or
/// truncated stream is a 400, not a silently shorter submission.
async fn collect_submission(
    mut mp: Multipart,
) -> Result<(SubmittedIssue, Vec<UploadItem>), (StatusCode, String)> {
    let mut title = String::new();
    let mut description = String::new();
    let mut category = IssueCategory::Other;
    let mut lat: Option<f64> = None;
    let mut lng: Option<f64> = None;
    let mut address: Option<String> = None;
    let mut client_ref: Option<Uuid> = None;
    let mut files: Vec<UploadItem> = Vec::new();

    while let Some(field) = mp.next_field().await.map_err(bad_request)? {
        let name = field.name().map(|s| s.to_string()).unwrap_or_default();
        match name.as_str() {
            "files" | "files[]" => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let data = field.bytes().await.map_err(bad_request)?;
                files.push(UploadItem {
                    body: data,
                    content_type,
                });
            }
            "title" => title = field.text().await.map_err(bad_request)?,
            "description" => description = field.text().await.map_err(bad_request)?,
            "category" => category = parse_category(&field.text().await.map_err(bad_request)?)?,
            "lat" => {
                lat = Some(
                    field
                        .text()
                        .await
                        .map_err(bad_request)?
                        .parse()
                        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid lat".to_string()))?,
                )
            }
            "lng" => {
                lng = Some(
                    field
                        .text()
                        .await
                        .map_err(bad_request)?
                        .parse()
                        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid lng".to_string()))?,
                )
            }
            "address" => address = Some(field.text().await.map_err(bad_request)?),
            "client_ref" => {
                client_ref = Some(
                    field
                        .text()
                        .await
                        .map_err(bad_request)?
                        .parse()
                        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid client_ref".to_string()))?,
                )
            }
            other => warn!(field = %other, "ignoring unknown multipart field"),
        }
    }

    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Err((StatusCode::BAD_REQUEST, "lat and lng are required".into()));
    };

    Ok((
        SubmittedIssue {
            title,
            description,
            category,
            lat,
            lng,
            address,
            client_ref,
        },
        files,
    ))
}

/// POST /issues, multipart: text fields plus zero or more `files[]` parts.
#[instrument(skip(state, mp))]
pub async fn create_issue_multipart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<CreatedIssueResponse>), (StatusCode, String)> {
    let (submitted, files) = collect_submission(mp).await?;
    submitted.validate()?;

    let created = create_issue_with_photos(
        &state,
        NewIssue {
            reporter_id: user_id,
            title: &submitted.title,
            description: &submitted.description,
            category: submitted.category,
            lat: submitted.lat,
            lng: submitted.lng,
            address: submitted.address.as_deref(),
            client_ref: submitted.client_ref,
        },
        files,
    )
    .await
    .map_err(internal)?;

    Ok(created_response(created))
}

/// POST /issues/base64: JSON with inline images; requires at least one.
#[instrument(skip(state, body))]
pub async fn create_issue_base64(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateIssueBase64>,
) -> Result<(StatusCode, HeaderMap, Json<CreatedIssueResponse>), (StatusCode, String)> {
    if body.images_b64.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "images_b64 is required".into()));
    }
    let ct = body
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");

    let mut files = Vec::with_capacity(body.images_b64.len());
    for b64 in &body.images_b64 {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|_| (StatusCode::BAD_REQUEST, "invalid base64".to_string()))?;
        files.push(UploadItem {
            body: Bytes::from(bytes),
            content_type: ct.to_string(),
        });
    }

    let submitted = SubmittedIssue {
        title: body.title,
        description: body.description,
        category: body.category.unwrap_or(IssueCategory::Other),
        lat: body.lat,
        lng: body.lng,
        address: body.address,
        client_ref: body.client_ref,
    };
    submitted.validate()?;

    let created = create_issue_with_photos(
        &state,
        NewIssue {
            reporter_id: user_id,
            title: &submitted.title,
            description: &submitted.description,
            category: submitted.category,
            lat: submitted.lat,
            lng: submitted.lng,
            address: submitted.address.as_deref(),
            client_ref: submitted.client_ref,
        },
        files,
    )
    .await
    .map_err(internal)?;

    Ok(created_response(created))
}

#[instrument(skip(state))]
pub async fn toggle_upvote(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UpvoteResponse>, (StatusCode, String)> {
    match repo::toggle_upvote(&state.db, id, user_id).await {
        Ok(Some((upvoted, upvote_count))) => Ok(Json(UpvoteResponse {
            upvoted,
            upvote_count,
        })),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Issue not found".into())),
        Err(e) => {
            error!(error = %e, %id, %user_id, "toggle_upvote failed");
            Err(internal(e))
        }
    }
}

// --- admin side ---

#[instrument(skip(state))]
pub async fn admin_list_issues(
    State(state): State<AppState>,
    AdminUser(_admin_id): AdminUser,
    Query(q): Query<IssueListQuery>,
) -> Result<Json<Vec<IssueListItem>>, (StatusCode, String)> {
    let filter = IssueFilter {
        status: q.status,
        category: q.category,
        reporter_id: None,
        include_hidden: true,
        limit: q.limit.clamp(1, 100),
        offset: q.offset.max(0),
    };
    let issues = repo::list(&state.db, &filter).await.map_err(internal)?;
    Ok(Json(issues.into_iter().map(IssueListItem::from_issue).collect()))
}

#[instrument(skip(state, payload))]
pub async fn admin_update_issue(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateRequest>,
) -> Result<Json<IssueDetails>, (StatusCode, String)> {
    let patch = AdminPatch {
        status: payload.status,
        priority: payload.priority,
        assigned_department: payload.assigned_department.as_deref(),
        admin_notes: payload.admin_notes.as_deref(),
        public_visible: payload.public_visible,
    };

    let (issue, old_status) = repo::admin_update(&state.db, id, &patch)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Issue not found".to_string()))?;

    if issue.status != old_status {
        // Best-effort: the patch already committed.
        if let Err(e) = notifications::services::notify_status_change(&state, &issue).await {
            warn!(error = %e, issue_id = %issue.id, "status notification failed");
        }
    }

    let photos = photo_urls(&state, issue.id, DETAIL_PRESIGN_TTL_SECS)
        .await
        .map_err(internal)?;

    tracing::info!(%admin_id, issue_id = %issue.id, status = ?issue.status, "admin patch applied");
    Ok(Json(IssueDetails {
        id: issue.id,
        reporter_id: issue.reporter_id,
        title: issue.title,
        description: issue.description,
        category: issue.category,
        status: issue.status,
        priority: issue.priority,
        lat: issue.lat,
        lng: issue.lng,
        address: issue.address,
        admin_notes: issue.admin_notes,
        assigned_department: issue.assigned_department,
        upvote_count: issue.upvote_count,
        sentiment_score: issue.sentiment_score,
        reported_at: issue.reported_at,
        updated_at: issue.updated_at,
        resolved_at: issue.resolved_at,
        photos,
        upvoted_by_me: None,
    }))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn bad_request<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;

    fn query(mine: bool) -> IssueListQuery {
        IssueListQuery {
            limit: 20,
            offset: 0,
            status: None,
            category: None,
            mine,
        }
    }

    #[test]
    fn mine_listing_includes_callers_hidden_reports() {
        let caller = Uuid::new_v4();
        let filter = list_filter(query(true), Some(caller)).unwrap();
        assert_eq!(filter.reporter_id, Some(caller));
        assert!(filter.include_hidden);
    }

    #[test]
    fn public_listing_stays_visible_only() {
        let filter = list_filter(query(false), Some(Uuid::new_v4())).unwrap();
        assert_eq!(filter.reporter_id, None);
        assert!(!filter.include_hidden);

        let anon = list_filter(query(false), None).unwrap();
        assert!(!anon.include_hidden);
    }

    #[test]
    fn mine_without_auth_is_unauthorized() {
        let err = list_filter(query(true), None).unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    async fn multipart_from(body: &'static str) -> Multipart {
        let req = axum::http::Request::builder()
            .header("content-type", "multipart/form-data; boundary=X")
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(req, &()).await.unwrap()
    }

    #[tokio::test]
    async fn multipart_submission_parses_fields_and_files() {
        let body = concat!(
            "--X\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nBroken drain\r\n",
            "--X\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\nWater pooling\r\n",
            "--X\r\nContent-Disposition: form-data; name=\"category\"\r\n\r\ndrainage\r\n",
            "--X\r\nContent-Disposition: form-data; name=\"lat\"\r\n\r\n52.5\r\n",
            "--X\r\nContent-Disposition: form-data; name=\"lng\"\r\n\r\n13.4\r\n",
            "--X\r\nContent-Disposition: form-data; name=\"files\"; filename=\"a.jpg\"\r\n",
            "Content-Type: image/jpeg\r\n\r\nJPEGDATA\r\n",
            "--X--\r\n"
        );
        let (submitted, files) = collect_submission(multipart_from(body).await).await.unwrap();
        assert_eq!(submitted.title, "Broken drain");
        assert_eq!(submitted.category, IssueCategory::Drainage);
        assert_eq!(submitted.lat, 52.5);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content_type, "image/jpeg");
        assert_eq!(&files[0].body[..], b"JPEGDATA");
    }

    #[tokio::test]
    async fn malformed_multipart_is_rejected() {
        let body = "--X\r\nnot a header\r\n\r\nvalue\r\n--X--\r\n";
        let err = collect_submission(multipart_from(body).await)
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn multipart_without_coordinates_is_rejected() {
        let body = concat!(
            "--X\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nBroken drain\r\n",
            "--X--\r\n"
        );
        let err = collect_submission(multipart_from(body).await)
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
