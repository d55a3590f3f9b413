use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub server_url: String,
    pub username: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Where `save` writes back to.
    #[serde(skip)]
    path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        // Registration needs some name; the machine's is a sensible first guess.
        let username = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "parley-user".to_string());

        Self {
            server_url: "http://localhost:8080".to_string(),
            username,
            token: None,
            path: PathBuf::new(),
        }
    }
}

impl Config {
    /// `parley/config.json` under the platform config directory.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("no config directory on this platform")?;
        Ok(base.join("parley").join("config.json"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Read the config at `path`, writing the defaults there first if it
    /// does not exist yet. Later saves go back to the same file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self {
                path: path.to_path_buf(),
                ..Self::default()
            };
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("invalid config at {}", path.display()))?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn set_token(&mut self, token: String) -> Result<()> {
        self.token = Some(token);
        self.save()
    }
}
