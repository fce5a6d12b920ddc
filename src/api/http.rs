//! HTTP surface for the Task API
//!
//! Thin warp layer: routes deserialize, delegate to `TaskApi`, and map
//! `ApiError` to status codes. Also serves the local backend's `/objects/`
//! routes so presigned URLs issued by the local store are usable, plus the
//! health, readiness, liveness and metrics endpoints.

use super::{ApiError, CreateTaskRequest, TaskApi};
use crate::observability::metrics::metrics;
use crate::storage::{ObjectStore, StorageError};
use crate::upload::UploadError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::Filter;

/// Fallback user scope when the caller supplies none; real deployments put
/// an authenticating proxy in front and always set the header
const DEFAULT_USER: &str = "local";

pub struct ApiServer {
    api: Arc<TaskApi>,
    objects: Arc<dyn ObjectStore>,
    addr: SocketAddr,
    max_upload_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct UploadManifest {
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectQuery {
    expires: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ProbeResponse {
    ok: bool,
    timestamp: u64,
}

impl ApiServer {
    pub fn new(
        api: Arc<TaskApi>,
        objects: Arc<dyn ObjectStore>,
        addr: SocketAddr,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            api,
            objects,
            addr,
            max_upload_bytes,
        }
    }

    /// Start serving; runs until the process shuts down
    pub async fn start(self) {
        let api = self.api;
        let objects = self.objects;

        let user = warp::header::optional::<String>("x-user-id")
            .map(|user: Option<String>| user.unwrap_or_else(|| DEFAULT_USER.to_string()));

        let with_api = {
            let api = Arc::clone(&api);
            warp::any().map(move || Arc::clone(&api))
        };
        let with_objects = {
            let objects = Arc::clone(&objects);
            warp::any().map(move || -> Arc<dyn ObjectStore> { Arc::clone(&objects) })
        };

        // POST /tasks
        let create = warp::path!("tasks")
            .and(warp::post())
            .and(user.clone())
            .and(warp::body::json::<CreateTaskRequest>())
            .and(with_api.clone())
            .and_then(handle_create);

        // POST /tasks/:id/uploads
        let uploads = warp::path!("tasks" / Uuid / "uploads")
            .and(warp::post())
            .and(user.clone())
            .and(warp::body::json::<UploadManifest>())
            .and(with_api.clone())
            .and_then(handle_uploads);

        // POST /tasks/:id/process
        let trigger = warp::path!("tasks" / Uuid / "process")
            .and(warp::post())
            .and(user.clone())
            .and(with_api.clone())
            .and_then(handle_trigger);

        // POST /tasks/:id/retry
        let retry = warp::path!("tasks" / Uuid / "retry")
            .and(warp::post())
            .and(user.clone())
            .and(with_api.clone())
            .and_then(handle_retry);

        // GET /tasks/:id
        let get_task = warp::path!("tasks" / Uuid)
            .and(warp::get())
            .and(user.clone())
            .and(with_api.clone())
            .and_then(handle_get);

        // GET /tasks/:id/downloads
        let downloads = warp::path!("tasks" / Uuid / "downloads")
            .and(warp::get())
            .and(user)
            .and(with_api)
            .and_then(handle_downloads);

        // PUT /objects/<key> — target of locally presigned upload URLs
        let put_object = warp::path("objects")
            .and(warp::path::tail())
            .and(warp::put())
            .and(warp::query::<ObjectQuery>())
            .and(warp::body::content_length_limit(self.max_upload_bytes))
            .and(warp::body::bytes())
            .and(with_objects.clone())
            .and_then(handle_put_object)
            .boxed();

        // GET /objects/<key> — target of locally presigned download URLs
        let get_object = warp::path("objects")
            .and(warp::path::tail())
            .and(warp::get())
            .and(warp::query::<ObjectQuery>())
            .and(with_objects)
            .and_then(handle_get_object)
            .boxed();

        // Probes and metrics
        let health = warp::path!("health").and(warp::get()).and_then(handle_probe);
        let ready = warp::path!("ready").and(warp::get()).and_then(handle_probe);
        let live = warp::path!("live").and(warp::get()).and_then(handle_probe);
        let metrics_route = warp::path!("metrics").and(warp::get()).and_then(|| async {
            Ok::<_, Infallible>(warp::reply::json(&metrics().get_metrics()))
        });

        let routes = create
            .or(uploads)
            .or(trigger)
            .or(retry)
            .or(downloads)
            .or(get_task)
            .or(put_object)
            .or(get_object)
            .or(health)
            .or(ready)
            .or(live)
            .or(metrics_route)
            .with(warp::cors().allow_any_origin());

        tracing::info!(addr = %self.addr, "Starting task API server");
        warp::serve(routes).run(self.addr).await;
    }
}

type Reply = warp::reply::WithStatus<warp::reply::Json>;

fn json_reply<T: Serialize>(status: StatusCode, body: &T) -> Reply {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn error_reply(error: &ApiError) -> Reply {
    let (status, code) = classify(error);
    json_reply(
        status,
        &ErrorBody {
            error: code,
            message: error.to_string(),
        },
    )
}

fn classify(error: &ApiError) -> (StatusCode, &'static str) {
    match error {
        ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ApiError::UnknownTool(_) => (StatusCode::BAD_REQUEST, "unknown_tool"),
        ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        ApiError::WrongState { .. } => (StatusCode::CONFLICT, "wrong_state"),
        ApiError::MissingInputs(_) => (StatusCode::CONFLICT, "missing_inputs"),
        ApiError::Upload(upload) => match upload {
            UploadError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            UploadError::WrongState(_) => (StatusCode::CONFLICT, "wrong_state"),
            UploadError::UnknownTool(_)
            | UploadError::UnknownFile { .. }
            | UploadError::EmptyManifest => (StatusCode::BAD_REQUEST, "invalid_manifest"),
            UploadError::Storage(StorageError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
            }
            UploadError::Storage(StorageError::InvalidKey(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_manifest")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        },
        ApiError::Storage(StorageError::Unavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
        }
        ApiError::Storage(StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
        ApiError::Storage(_) | ApiError::Store(_) | ApiError::Process(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    }
}

async fn handle_create(
    user: String,
    request: CreateTaskRequest,
    api: Arc<TaskApi>,
) -> Result<Reply, Infallible> {
    if crate::storage::keys::validate_name(&user).is_err() {
        return Ok(json_reply(
            StatusCode::BAD_REQUEST,
            &ErrorBody {
                error: "invalid_request",
                message: "user id must match [a-zA-Z0-9._-]+".to_string(),
            },
        ));
    }
    Ok(match api.create_task(&user, request).await {
        Ok(view) => json_reply(StatusCode::CREATED, &view),
        Err(e) => error_reply(&e),
    })
}

async fn handle_uploads(
    task_id: Uuid,
    user: String,
    manifest: UploadManifest,
    api: Arc<TaskApi>,
) -> Result<Reply, Infallible> {
    Ok(
        match api
            .request_upload_urls(&user, task_id, &manifest.files)
            .await
        {
            Ok(issued) => json_reply(StatusCode::OK, &issued),
            Err(e) => error_reply(&e),
        },
    )
}

async fn handle_trigger(
    task_id: Uuid,
    user: String,
    api: Arc<TaskApi>,
) -> Result<Reply, Infallible> {
    Ok(match api.trigger_processing(&user, task_id).await {
        Ok(view) => json_reply(StatusCode::OK, &view),
        Err(e) => error_reply(&e),
    })
}

async fn handle_retry(
    task_id: Uuid,
    user: String,
    api: Arc<TaskApi>,
) -> Result<Reply, Infallible> {
    Ok(match api.retry(&user, task_id).await {
        Ok(view) => json_reply(StatusCode::OK, &view),
        Err(e) => error_reply(&e),
    })
}

async fn handle_get(task_id: Uuid, user: String, api: Arc<TaskApi>) -> Result<Reply, Infallible> {
    Ok(match api.get_task(&user, task_id).await {
        Ok(view) => json_reply(StatusCode::OK, &view),
        Err(e) => error_reply(&e),
    })
}

async fn handle_downloads(
    task_id: Uuid,
    user: String,
    api: Arc<TaskApi>,
) -> Result<Reply, Infallible> {
    Ok(match api.list_downloads(&user, task_id).await {
        Ok(entries) => json_reply(StatusCode::OK, &entries),
        Err(e) => error_reply(&e),
    })
}

/// Reject URLs whose embedded expiry has passed (or that carry none)
fn check_expiry(query: &ObjectQuery) -> Result<(), Reply> {
    match query.expires {
        Some(ts) if ts >= Utc::now().timestamp() => Ok(()),
        Some(_) => Err(json_reply(
            StatusCode::FORBIDDEN,
            &ErrorBody {
                error: "url_expired",
                message: "presigned URL has expired".to_string(),
            },
        )),
        None => Err(json_reply(
            StatusCode::FORBIDDEN,
            &ErrorBody {
                error: "url_expired",
                message: "missing expiry; use a presigned URL".to_string(),
            },
        )),
    }
}

async fn handle_put_object(
    tail: warp::path::Tail,
    query: ObjectQuery,
    body: bytes::Bytes,
    objects: Arc<dyn ObjectStore>,
) -> Result<Reply, Infallible> {
    if let Err(reply) = check_expiry(&query) {
        return Ok(reply);
    }
    Ok(match objects.put(tail.as_str(), body).await {
        Ok(()) => {
            metrics().object_written();
            json_reply(StatusCode::OK, &serde_json::json!({"stored": tail.as_str()}))
        }
        Err(e) => storage_error_reply(&e),
    })
}

async fn handle_get_object(
    tail: warp::path::Tail,
    query: ObjectQuery,
    objects: Arc<dyn ObjectStore>,
) -> Result<warp::reply::Response, Infallible> {
    use warp::Reply as _;

    if let Err(reply) = check_expiry(&query) {
        return Ok(reply.into_response());
    }
    Ok(match objects.get(tail.as_str()).await {
        Ok(bytes) => {
            metrics().object_read();
            warp::http::Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/octet-stream")
                .body(warp::hyper::Body::from(bytes))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => storage_error_reply(&e).into_response(),
    })
}

fn storage_error_reply(error: &StorageError) -> Reply {
    let (status, code) = match error {
        StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StorageError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "invalid_key"),
        StorageError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
        StorageError::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
    };
    json_reply(
        status,
        &ErrorBody {
            error: code,
            message: error.to_string(),
        },
    )
}

async fn handle_probe() -> Result<Reply, Infallible> {
    Ok(json_reply(
        StatusCode::OK,
        &ProbeResponse {
            ok: true,
            timestamp: current_timestamp(),
        },
    ))
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
