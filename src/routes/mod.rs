pub mod assets;
pub mod auth;
pub mod home;
pub mod layout;
pub mod moderate;
pub mod payment;
pub mod post;
pub mod user;

use std::collections::HashMap;

use axum::extract::Multipart;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::extractors::load_session;
use crate::flash::consume_flashes;
use crate::state::AppState;

/// Path of a user's profile page.
pub fn profile_url(username: &str) -> String {
    format!("/user/{}/", username)
}

/// Request body limit for routes that accept image uploads.
pub(crate) const UPLOAD_LIMIT: usize = 16 * 1024 * 1024;

/// `?page=` on paginated listings. Kept as text so a malformed value falls
/// back to the first page instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    /// The requested page number, or `None` when absent or not a number.
    pub fn number(&self) -> Option<i64> {
        self.page.as_deref().and_then(|p| p.trim().parse().ok())
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let uploads = state.config.uploads_path();

    Router::new()
        .merge(home::router())
        .merge(auth::router())
        .merge(user::router())
        .merge(post::router())
        .merge(moderate::router())
        .merge(payment::router())
        .nest("/api/v1", crate::api::router())
        .route("/assets/{*path}", get(assets::serve))
        .nest_service("/uploads", ServeDir::new(uploads))
        .layer(from_fn_with_state(state.clone(), load_session))
        .layer(from_fn(consume_flashes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// An uploaded file from a multipart form.
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// A multipart body split into text fields and non-empty file uploads.
#[derive(Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = MultipartForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Malformed form data: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Upload failed: {}", e)))?;
                    // Browsers send an empty part when no file was chosen.
                    if !file_name.is_empty() && !data.is_empty() {
                        form.files.insert(
                            name,
                            Upload {
                                file_name,
                                data: data.to_vec(),
                            },
                        );
                    }
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Malformed form data: {}", e)))?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn checked(&self, name: &str) -> bool {
        let value = self.text(name);
        !value.is_empty() && value != "false"
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}
