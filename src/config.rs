//! Runtime configuration and reference-data seeding.
//!
//! Settings come from the environment (`.env` is loaded by `main`). Reference
//! data (organizations, main activities) is read from a JSON seed file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::planning::{MainActivity, Organization};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SEED_PATH: &str = "seed/planning.json";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Server settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub seed_path: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Read `BIND_ADDR`, `PLANNING_SEED_PATH` and `MAX_UPLOAD_BYTES`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be a socket address like 0.0.0.0:3000")?;

        let seed_path = lookup("PLANNING_SEED_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SEED_PATH));

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a byte count: {}", raw))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            bind_addr,
            seed_path,
            max_upload_bytes,
        })
    }
}

/// Reference data the importer resolves rows against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningSeed {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub main_activities: Vec<MainActivity>,
}

impl PlanningSeed {
    /// Load the seed file. A missing file is an error; the server is useless
    /// without reference data.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed: {:?}", path))?;

        let seed: PlanningSeed = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse seed: {:?}", path))?;

        info!(
            "Loaded seed from {:?}: {} organizations, {} main activities",
            path,
            seed.organizations.len(),
            seed.main_activities.len()
        );
        Ok(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.seed_path, PathBuf::from("seed/planning.json"));
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("MAX_UPLOAD_BYTES", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_upload_bytes, 1024);

        assert!(AppConfig::from_lookup(lookup_from(&[("MAX_UPLOAD_BYTES", "lots")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("BIND_ADDR", "nowhere")])).is_err());
    }

    #[test]
    fn test_load_seed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "organizations": [{{"id": 1, "name": "Ministry of Health", "type": "MINISTRY"}}],
                "main_activities": [{{"id": 7, "name": "Quality Assurance", "organization_id": 1}}]
            }}"#
        )
        .unwrap();

        let seed = PlanningSeed::load(file.path()).unwrap();
        assert_eq!(seed.organizations[0].org_type.as_deref(), Some("MINISTRY"));
        assert_eq!(seed.main_activities[0].organization_id, Some(1));
    }

    #[test]
    fn test_load_seed_missing_file() {
        assert!(PlanningSeed::load(Path::new("/nonexistent/planning.json")).is_err());
    }
}
