//! Server configuration with optional `slipway.toml` overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Configuration for the slipway server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Dashboard listening port.
    pub port: u16,
    /// Directory that holds each project's cloned working directory.
    pub deployments_dir: PathBuf,
    /// Base URL used to derive each project's public URL. Defaults to the
    /// local dashboard address when unset.
    pub public_base_url: Option<String>,
    /// First port handed to deployed projects.
    pub base_port: u16,
    /// Dev mode: bind all interfaces and allow permissive CORS.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            deployments_dir: PathBuf::from("deployments"),
            public_base_url: None,
            base_port: 4000,
            dev_mode: false,
        }
    }
}

/// Raw TOML structure for `slipway.toml`
#[derive(Debug, Deserialize)]
struct SlipwayToml {
    server: Option<ServerSection>,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    port: Option<u16>,
    deployments_dir: Option<PathBuf>,
    public_base_url: Option<String>,
    base_port: Option<u16>,
}

impl ServerConfig {
    /// Load config from `slipway.toml`. Returns defaults if the file
    /// doesn't exist; unset fields keep their defaults.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let toml: SlipwayToml = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        let mut config = Self::default();
        if let Some(section) = toml.server {
            if let Some(port) = section.port {
                config.port = port;
            }
            if let Some(dir) = section.deployments_dir {
                config.deployments_dir = dir;
            }
            if let Some(url) = section.public_base_url {
                config.public_base_url = Some(url);
            }
            if let Some(base) = section.base_port {
                config.base_port = base;
            }
        }

        Ok(config)
    }

    /// Base URL for derived project URLs.
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.deployments_dir, PathBuf::from("deployments"));
        assert!(config.public_base_url.is_none());
        assert_eq!(config.base_port, 4000);
        assert!(!config.dev_mode);
    }

    #[test]
    fn test_config_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("slipway.toml")).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.base_port, 4000);
    }

    #[test]
    fn test_config_load_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slipway.toml");
        fs::write(
            &path,
            r#"
[server]
port = 8080
deployments_dir = "/srv/deployments"
public_base_url = "https://apps.example.com"
base_port = 5000
"#,
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.deployments_dir, PathBuf::from("/srv/deployments"));
        assert_eq!(
            config.public_base_url.as_deref(),
            Some("https://apps.example.com")
        );
        assert_eq!(config.base_port, 5000);
    }

    #[test]
    fn test_config_load_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slipway.toml");
        fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.deployments_dir, PathBuf::from("deployments")); // default
        assert_eq!(config.base_port, 4000); // default
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slipway.toml");
        fs::write(&path, "not valid toml {{{{").unwrap();

        assert!(ServerConfig::load(&path).is_err());
    }

    #[test]
    fn test_config_load_empty_server_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slipway.toml");
        fs::write(&path, "[server]\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 3001);
    }

    #[test]
    fn test_public_base_url_falls_back_to_local_dashboard() {
        let config = ServerConfig::default();
        assert_eq!(config.public_base_url(), "http://localhost:3001");

        let config = ServerConfig {
            public_base_url: Some("https://apps.example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(config.public_base_url(), "https://apps.example.com");
    }
}
