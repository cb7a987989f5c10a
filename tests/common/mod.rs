#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use emb::auth::password::hash_password;
use emb::config::Config;
use emb::db::models::User;
use emb::db::roles::{self, MODERATOR_ROLE};
use emb::db::users::{self, NewUser};
use emb::db;
use emb::mail::Mailer;
use emb::state::AppState;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "correct horse";

/// A full application backed by a throwaway database and upload directory.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = Some(dir.path().join("test.db"));
        config.storage.path = Some(dir.path().join("uploads"));
        config.auth.secret_key = Some("test-secret".to_string());
        config.auth.admin_email = Some(ADMIN_EMAIL.to_string());
        config.auth.bcrypt_cost = 4;
        adjust(&mut config);

        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");
        let mailer = Mailer::in_memory(&config.mail).unwrap();
        let state = AppState::with_mailer(pool, config, mailer);

        TestApp {
            app: emb::routes::router(state.clone()),
            state,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)], cookie: Option<&str>) -> Response {
        let body: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// POST a `multipart/form-data` body with text `fields` and an optional
    /// `(field, filename, bytes)` upload.
    pub async fn post_multipart(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, Vec<u8>)>,
        cookie: Option<&str>,
    ) -> Response {
        const BOUNDARY: &str = "emb-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((name, filename, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, name, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(&data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Insert a user directly. Passwords are always [`PASSWORD`].
    pub fn create_user(&self, username: &str, email: &str, confirmed: bool) -> User {
        let hash = hash_password(PASSWORD, 4).unwrap();
        let conn = self.state.db.get().unwrap();
        users::create_user(
            &conn,
            &NewUser {
                username,
                email,
                password_hash: &hash,
                confirmed,
            },
            self.state.config.is_admin_email(email),
        )
        .unwrap()
    }

    pub fn make_moderator(&self, user: &User) {
        let conn = self.state.db.get().unwrap();
        let role = roles::find_by_name(&conn, MODERATOR_ROLE).unwrap().unwrap();
        conn.execute(
            "UPDATE users SET role_id = ?1 WHERE id = ?2",
            rusqlite::params![role.id, user.id],
        )
        .unwrap();
    }

    pub fn reload(&self, user_id: i64) -> User {
        let conn = self.state.db.get().unwrap();
        users::find_by_id(&conn, user_id).unwrap().unwrap()
    }

    /// Log in through the form and return a `Cookie` header value.
    pub async fn login(&self, email: &str) -> String {
        let response = self
            .post_form(
                "/auth/login/",
                &[("email", email), ("password", PASSWORD)],
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        session_cookie(&response).expect("login should set a session cookie")
    }
}

/// `name=value` of the session cookie set by `response`.
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("emb_session=") && !v.starts_with("emb_session=;"))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// The flash messages carried by a redirect.
pub fn flash_messages(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.strip_prefix("emb_flash="))
        .filter_map(|v| v.split(';').next())
        .flat_map(|v| {
            url::form_urlencoded::parse(v.as_bytes())
                .map(|(_, m)| m.into_owned())
                .collect::<Vec<_>>()
        })
        .collect()
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// PNG bytes of a solid image.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 120, 200]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
