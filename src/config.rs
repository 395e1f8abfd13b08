use anyhow::{bail, Context, Result};
use base64::Engine;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tower_sessions::cookie::Key;
use url::Url;

pub const DEFAULT_DISCORD_API_URL: &str = "https://discord.com/api";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/discord/callback";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub debug: bool,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub discord_api_url: String,
    pub crajy_url: String,
    pub api_token: String,
    pub session_secret: String,
    pub session_file: Option<PathBuf>,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            host: std::env::var("HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string())
                .parse()
                .context("Invalid HOST")?,

            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid PORT")?,

            debug: std::env::var("DEBUG")
                .map(|value| is_truthy(&value))
                .unwrap_or(false),

            client_id: std::env::var("CLIENT_ID").context("CLIENT_ID must be set")?,

            client_secret: std::env::var("CLIENT_SECRET").context("CLIENT_SECRET must be set")?,

            redirect_uri: std::env::var("REDIRECT_URI")
                .unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string()),

            discord_api_url: std::env::var("DISCORD_API_URL")
                .unwrap_or_else(|_| DEFAULT_DISCORD_API_URL.to_string()),

            crajy_url: std::env::var("CRAJY_URL").context("CRAJY_URL must be set")?,

            api_token: std::env::var("API_TOKEN").context("API_TOKEN must be set")?,

            session_secret: std::env::var("SESSION_SECRET").unwrap_or_else(|_| {
                // Generate a random secret if not provided
                use rand::Rng;
                let secret: Vec<u8> = (0..64).map(|_| rand::thread_rng().gen()).collect();
                base64::engine::general_purpose::STANDARD.encode(secret)
            }),

            session_file: std::env::var("SESSION_FILE")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    dirs::data_local_dir()
                        .map(|dir| dir.join("crajyminder").join("sessions.json"))
                }),

            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./static")),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks that every configured URL parses, so a typo fails at startup
    /// rather than on the first login.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.redirect_uri).context("Invalid REDIRECT_URI")?;
        Url::parse(&self.discord_api_url).context("Invalid DISCORD_API_URL")?;
        Url::parse(&self.crajy_url).context("Invalid CRAJY_URL")?;
        Ok(())
    }

    pub fn session_key(&self) -> Result<Key> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.session_secret.trim())
            .context("SESSION_SECRET must be base64")?;
        if bytes.len() < 64 {
            bail!("SESSION_SECRET must decode to at least 64 bytes");
        }
        Ok(Key::from(bytes.as_slice()))
    }

    pub fn server_address(&self) -> SocketAddr {
        (self.host, self.port).into()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    let secret: Vec<u8> = (0u8..64).collect();
    Config {
        host: IpAddr::from([127, 0, 0, 1]),
        port: 8000,
        debug: false,
        client_id: "1234".to_string(),
        client_secret: "shh".to_string(),
        redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        discord_api_url: "https://discord.test/api".to_string(),
        crajy_url: "https://crajy.test".to_string(),
        api_token: "crajy-token".to_string(),
        session_secret: base64::engine::general_purpose::STANDARD.encode(secret),
        session_file: None,
        static_dir: PathBuf::from("./static"),
    }
}
