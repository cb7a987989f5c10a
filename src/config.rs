use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "emb", about = "A social blogging server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
    pub pagination: PaginationConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Absolute URL used when building links that leave the site (emails).
    pub base_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
    pub remember_days: u64,
    /// Key used to sign confirmation, reset and API tokens.
    pub secret_key: Option<String>,
    /// Registering with this address grants the Administrator role.
    pub admin_email: Option<String>,
    pub bcrypt_cost: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MailConfig {
    pub server: Option<String>,
    pub port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender: String,
    pub subject_prefix: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PaginationConfig {
    pub posts_per_page: u32,
    pub followers_per_page: u32,
    pub comments_per_page: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            base_url: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "emb_session".to_string(),
            session_hours: 24,
            remember_days: 180,
            secret_key: None,
            admin_email: None,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: 587,
            use_tls: true,
            username: None,
            password: None,
            sender: "EMB Admin <emb@example.com>".to_string(),
            subject_prefix: "[EMB]".to_string(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            posts_per_page: 20,
            followers_per_page: 50,
            comments_per_page: 30,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("emb.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }

        Ok(config)
    }

    /// Environment variables override the config file but lose to CLI flags.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("SECRET_KEY") {
            self.auth.secret_key = Some(key);
        }
        if let Some(email) = lookup("EMB_ADMIN_EMAIL") {
            self.auth.admin_email = Some(email);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            let path = url.strip_prefix("sqlite://").unwrap_or(&url);
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(server) = lookup("MAIL_SERVER") {
            self.mail.server = Some(server);
        }
        if let Some(port) = lookup("MAIL_PORT") {
            self.mail.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("MAIL_PORT is not a valid port: {}", port))?;
        }
        if let Some(tls) = lookup("MAIL_USE_TLS") {
            self.mail.use_tls = matches!(tls.to_ascii_lowercase().as_str(), "1" | "true" | "on");
        }
        if let Some(username) = lookup("MAIL_USERNAME") {
            self.mail.username = Some(username);
        }
        if let Some(password) = lookup("MAIL_PASSWORD") {
            self.mail.password = Some(password);
        }
        if let Some(sender) = lookup("EMB_MAIL_SENDER") {
            self.mail.sender = sender;
        }
        Ok(())
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".emb")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("emb.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("uploads"))
    }

    /// Prefix for absolute links, without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.server.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.server.port),
        }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.auth
            .admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cli_for(dir: &std::path::Path) -> Cli {
        Cli {
            config: None,
            host: None,
            port: None,
            data_dir: Some(dir.to_path_buf()),
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.cookie_name, "emb_session");
        assert_eq!(config.auth.session_hours, 24);
        assert_eq!(config.pagination.posts_per_page, 20);
        assert_eq!(config.pagination.followers_per_page, 50);
        assert_eq!(config.pagination.comments_per_page, 30);
        assert_eq!(config.mail.subject_prefix, "[EMB]");
        assert!(config.database.path.is_none());
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli_for(std::path::Path::new("/tmp/test-emb"));
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-emb"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli_for(tmp.path())).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.db_path(), tmp.path().join("emb.db"));
        assert_eq!(config.uploads_path(), tmp.path().join("uploads"));
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
port = 9000

[auth]
cookie_name = "my_cookie"
admin_email = "root@example.com"

[pagination]
posts_per_page = 5
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            ..cli_for(tmp.path())
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.cookie_name, "my_cookie");
        assert_eq!(config.pagination.posts_per_page, 5);
        assert_eq!(config.pagination.comments_per_page, 30);
        assert!(config.is_admin_email("ROOT@example.com"));
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[server]\nhost = \"192.168.1.1\"\nport = 9000\n").unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: Some("10.0.0.1".to_string()),
            port: Some(4000),
            data_dir: Some(tmp.path().to_path_buf()),
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("SECRET_KEY", "s3cret"),
            ("DATABASE_URL", "sqlite:///var/lib/emb/emb.db"),
            ("MAIL_SERVER", "smtp.example.com"),
            ("MAIL_PORT", "2525"),
            ("MAIL_USE_TLS", "false"),
            ("EMB_ADMIN_EMAIL", "admin@example.com"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.auth.secret_key.as_deref(), Some("s3cret"));
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/emb/emb.db"));
        assert_eq!(config.mail.server.as_deref(), Some("smtp.example.com"));
        assert_eq!(config.mail.port, 2525);
        assert!(!config.mail.use_tls);
        assert!(config.is_admin_email("admin@example.com"));
    }

    #[test]
    fn invalid_mail_port_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "MAIL_PORT").then(|| "abc".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let mut config = Config::default();
        assert_eq!(config.base_url(), "http://localhost:5000");
        config.server.base_url = Some("https://blog.example.com/".to_string());
        assert_eq!(config.base_url(), "https://blog.example.com");
    }
}
