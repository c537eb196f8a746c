//! HTTP surface: health, user/group retrieval, file upload, static serving
//! of uploaded files, and the WebSocket upgrade route.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::Method,
    routing::{get, post},
    Json,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use courier_shared::types::{FileDescriptor, Group};
use courier_store::Database;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::files::FileStore;
use crate::gateway;
use crate::groups::GroupManager;
use crate::registry::Registry;
use crate::router::Router;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub router: Router,
    pub groups: Arc<GroupManager>,
    pub store: Arc<Mutex<Database>>,
    pub files: Arc<FileStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let uploads = ServeDir::new(state.files.base_path());

    axum::Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ws", get(gateway::ws_handler))
        .route("/users", get(list_users))
        .route("/user-groups/:email", get(user_groups))
        .route("/group-messages/:group_id", get(group_messages))
        .route("/fetch-data", get(fetch_data))
        .route("/upload", post(upload))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_size + 64 * 1024,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// `{email, name}` pair exposed for group-creation UIs; the stored
/// connection id stays internal.
#[derive(Serialize)]
struct UserSummary {
    email: String,
    name: String,
}

#[derive(Serialize)]
struct GroupMessagesResponse {
    success: bool,
    messages: Vec<courier_shared::types::MessageView>,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: &'static str,
    #[serde(flatten)]
    file: FileDescriptor,
}

async fn root() -> &'static str {
    "Server is running!"
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// All known users, for populating member pickers.
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserSummary>>, ServerError> {
    let db = state.store.lock().await;
    let users = db
        .list_users()?
        .into_iter()
        .map(|u| UserSummary {
            email: u.email,
            name: u.name,
        })
        .collect();
    Ok(Json(users))
}

/// Groups the given identity participates in.
async fn user_groups(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Vec<Group>>, ServerError> {
    let db = state.store.lock().await;
    let groups = db.groups_for_participant(&email)?;
    Ok(Json(groups))
}

/// Recent message history for a group; same shape as the socket path.
async fn group_messages(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupMessagesResponse>, ServerError> {
    let messages = state
        .groups
        .fetch_messages(group_id)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(Json(GroupMessagesResponse {
        success: true,
        messages,
    }))
}

/// Identity -> last-known connection id, from the durable store.
///
/// This is the historical retrieval path; live routing never reads it.
async fn fetch_data(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, String>>, ServerError> {
    let db = state.store.lock().await;
    let map = db.user_socket_map()?.into_iter().collect();
    Ok(Json(map))
}

/// Multipart file upload.  Requires `file`, `sender`, and `receiver`
/// fields; a stored file is removed again if the metadata is missing.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let mut stored: Option<FileDescriptor> = None;
    let mut stored_name: Option<String> = None;
    let mut sender: Option<String> = None;
    let mut receiver: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let original_name = field.file_name().unwrap_or("file").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;

                let name = state.files.store(&original_name, &data).await?;
                stored = Some(FileDescriptor {
                    url: format!("{}/uploads/{}", state.config.public_url, name),
                    original_name,
                    size: data.len() as u64,
                    mime_type,
                });
                stored_name = Some(name);
            }
            "sender" => {
                sender = Some(field.text().await.map_err(|e| {
                    ServerError::BadRequest(format!("Failed to read field: {}", e))
                })?);
            }
            "receiver" => {
                receiver = Some(field.text().await.map_err(|e| {
                    ServerError::BadRequest(format!("Failed to read field: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let (Some(file), Some(name)) = (stored, stored_name) else {
        return Err(ServerError::BadRequest("No file uploaded".to_string()));
    };

    if sender.as_deref().unwrap_or("").is_empty() || receiver.as_deref().unwrap_or("").is_empty() {
        // The file is already on disk at this point; remove it before
        // rejecting the request.
        if let Err(e) = state.files.delete(&name).await {
            warn!(name = %name, error = %e, "failed to clean up rejected upload");
        }
        return Err(ServerError::BadRequest(
            "Sender and receiver are required".to_string(),
        ));
    }

    info!(
        name = %name,
        original = %file.original_name,
        size = file.size,
        "File uploaded"
    );

    Ok(Json(UploadResponse {
        success: true,
        message: "File uploaded successfully",
        file,
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
