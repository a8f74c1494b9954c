use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime settings: an optional TOML file, then env-var overrides on top.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub db_path: PathBuf,
    pub inbox_dir: PathBuf,
    pub addr: SocketAddr,
    /// UI origin allowed through CORS.
    pub allowed_origin: String,
    /// Whether the inbox watcher starts with the server.
    pub watch: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/teller.db"),
            inbox_dir: PathBuf::from("data/inbox"),
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            allowed_origin: "http://localhost:3000".to_string(),
            watch: true,
        }
    }
}

impl Settings {
    /// Reads the config file named by `TELLER_CONFIG` (or `teller.toml` in
    /// the working directory if present), then applies `TELLER_DB`,
    /// `TELLER_INBOX`, `TELLER_ADDR`, `TELLER_ALLOWED_ORIGIN` and
    /// `TELLER_WATCH` over it.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var_os("TELLER_CONFIG").map(PathBuf::from);
        let path = explicit.or_else(|| {
            let fallback = PathBuf::from("teller.toml");
            fallback.exists().then_some(fallback)
        });

        let mut settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Settings::from_toml(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Settings::default(),
        };

        settings.overlay_env()?;
        Ok(settings)
    }

    fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn overlay_env(&mut self) -> anyhow::Result<()> {
        if let Some(v) = std::env::var_os("TELLER_DB") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = std::env::var_os("TELLER_INBOX") {
            self.inbox_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TELLER_ADDR") {
            self.addr = v
                .parse()
                .with_context(|| format!("TELLER_ADDR '{v}' is not a socket address"))?;
        }
        if let Ok(v) = std::env::var("TELLER_ALLOWED_ORIGIN") {
            self.allowed_origin = v;
        }
        if let Ok(v) = std::env::var("TELLER_WATCH") {
            self.watch = watch_flag(&v);
        }
        Ok(())
    }
}

/// Anything except an explicit off-value turns the watcher on.
fn watch_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}
