use askama::Template;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::routes::layout::Layout;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "main/home.html")]
pub struct HomeTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "main/about.html")]
pub struct AboutTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "main/pricing.html")]
pub struct PricingTemplate {
    pub layout: Layout,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/home/", get(home))
        .route("/about/", get(about))
        .route("/pricing/", get(pricing))
}

pub async fn home(layout: Layout) -> Html<HomeTemplate> {
    Html(HomeTemplate { layout })
}

pub async fn about(layout: Layout) -> Html<AboutTemplate> {
    Html(AboutTemplate { layout })
}

pub async fn pricing(layout: Layout) -> Html<PricingTemplate> {
    Html(PricingTemplate { layout })
}
