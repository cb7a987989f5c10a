//! One-shot messages carried across a redirect in a cookie.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::extractors::cookie_value;

pub const FLASH_COOKIE: &str = "emb_flash";

fn encode(messages: &[&str]) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for m in messages {
        ser.append_pair("m", m);
    }
    ser.finish()
}

fn decode(value: &str) -> Vec<String> {
    url::form_urlencoded::parse(value.as_bytes())
        .filter(|(k, _)| k == "m")
        .map(|(_, v)| v.into_owned())
        .collect()
}

fn set_cookie(value: &str, max_age: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        FLASH_COOKIE, value, max_age
    )
}

/// 303 redirect to `to` that shows `message` on the next rendered page.
pub fn redirect(to: &str, message: &str) -> Response {
    redirect_with(to, &[message])
}

pub fn redirect_with(to: &str, messages: &[&str]) -> Response {
    let mut response = (StatusCode::SEE_OTHER, [(header::LOCATION, to.to_string())]).into_response();
    if let Ok(value) = HeaderValue::from_str(&set_cookie(&encode(messages), 60)) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

/// Messages waiting to be shown on this request.
#[derive(Debug, Clone, Default)]
pub struct Flashes(pub Vec<String>);

impl Flashes {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Flashes(
            cookie_value(headers, FLASH_COOKIE)
                .map(decode)
                .unwrap_or_default(),
        )
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Flashes {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Flashes::from_headers(&parts.headers))
    }
}

/// Expire the flash cookie once a page that could display it has been
/// served. Redirects keep it so the message survives to the next page.
pub async fn consume_flashes(req: Request, next: Next) -> Response {
    let had_flash = cookie_value(req.headers(), FLASH_COOKIE).is_some();
    let mut response = next.run(req).await;

    let sets_flash = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|v| v.as_bytes().starts_with(FLASH_COOKIE.as_bytes()));
    if had_flash && !sets_flash && !response.status().is_redirection() {
        if let Ok(value) = HeaderValue::from_str(&set_cookie("", 0)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_survive_the_cookie() {
        let encoded = encode(&["Saved; really!", "Second, one"]);
        assert!(!encoded.contains(';'));
        assert!(!encoded.contains(' '));
        assert_eq!(decode(&encoded), vec!["Saved; really!", "Second, one"]);
    }

    #[test]
    fn redirect_sets_location_and_cookie() {
        let response = redirect("/auth/login/", "Welcome");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/auth/login/");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("emb_flash=m=Welcome;"));
    }

    #[test]
    fn flashes_read_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("emb_session=abc; emb_flash=m=Hello+there"),
        );
        assert_eq!(Flashes::from_headers(&headers).0, vec!["Hello there"]);
        assert!(Flashes::from_headers(&HeaderMap::new()).0.is_empty());
    }
}
