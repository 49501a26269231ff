//! Server configuration loaded from TOML.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;

pub const CONFIG_ENV: &str = "DUEL_2048_CONFIG";
pub const CONFIG_FILE: &str = "duel-2048.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the line-JSON listener binds to.
    pub listen: String,
    /// JSON Lines record log; records stay in memory when unset.
    pub records_path: Option<PathBuf>,
    pub agent: AgentConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { listen: "127.0.0.1:7048".to_string(), records_path: None, agent: AgentConfig::default() }
    }
}

/// Finds and parses [`ServerConfig`].
///
/// Search order:
/// 1) an explicit path (must exist)
/// 2) the file named by `DUEL_2048_CONFIG`
/// 3) `./duel-2048.toml`
///
/// With none of those present the defaults are used.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<ServerConfig> {
        match Self::resolve_path(explicit)? {
            Some(path) => Self::parse_from_file(&path),
            None => {
                tracing::debug!("no config file found, using defaults");
                Ok(ServerConfig::default())
            }
        }
    }

    pub fn parse_from_file(path: &Path) -> anyhow::Result<ServerConfig> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config at {}", path.display()))?;
        let cfg = Self::parse_from_str(&text).with_context(|| format!("Invalid config at {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    pub fn parse_from_str(text: &str) -> anyhow::Result<ServerConfig> {
        toml::from_str(text).context("Failed to parse TOML")
    }

    fn resolve_path(explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.is_file() {
                anyhow::bail!("Config file not found at {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }

        if let Some(path) = env::var_os(CONFIG_ENV) {
            let candidate = PathBuf::from(path);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
            tracing::warn!(path = %candidate.display(), "{CONFIG_ENV} points at a missing file");
        }

        let candidate = env::current_dir().context("Failed to read working directory")?.join(CONFIG_FILE);
        Ok(candidate.is_file().then_some(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn it_fills_missing_fields_with_defaults() {
        let cfg = ConfigLoader::parse_from_str("listen = \"0.0.0.0:9000\"\n").unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:9000");
        assert_eq!(cfg.records_path, None);
        assert_eq!(cfg.agent.depth, 2);
        assert_eq!(cfg.agent.empty_bonus, 1000.0);
    }

    #[test]
    fn it_reads_nested_agent_tables() {
        let text = "records_path = \"/tmp/records.jsonl\"\n[agent]\ndepth = 3\n";
        let cfg = ConfigLoader::parse_from_str(text).unwrap();
        assert_eq!(cfg.records_path, Some(PathBuf::from("/tmp/records.jsonl")));
        assert_eq!(cfg.agent.depth, 3);
        assert_eq!(cfg.listen, ServerConfig::default().listen);
    }

    #[test]
    fn it_loads_an_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen = \"127.0.0.1:1\"").unwrap();
        let cfg = ConfigLoader::load(Some(file.path())).unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:1");
    }

    #[test]
    fn it_rejects_missing_or_broken_files() {
        assert!(ConfigLoader::load(Some(Path::new("/definitely/not/here.toml"))).is_err());
        assert!(ConfigLoader::parse_from_str("listen = [").is_err());
    }
}
