//! # Configuration
//!
//! Optional TOML file read before logging starts. A missing file yields the
//! defaults; command line flags override individual values afterwards.
//!
//! ```toml
//! [analysis]
//! workers = 0
//! known_collectors = ["ldap-collector", "localmachine-collector@1.4.0"]
//! max_traversal_depth = 99
//!
//! [logging]
//! format = "text"
//! filter = "acegraph=info"
//!
//! [output]
//! path = "graph.json"
//! pretty = true
//! ```

use acegraph_core::primitives::MAX_TRAVERSAL_DEPTH;
use acegraph_core::{AnalysisOptions, GraphError, KnownCollector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "acegraph.toml";

/// Filter used when neither `RUST_LOG` nor the file sets one.
pub const DEFAULT_LOG_FILTER: &str = "acegraph=info,acegraph_core=info";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Worker threads for parallel processors. 0 = available parallelism.
    pub workers: usize,
    /// Collector names accepted by the dataset check, optionally pinned to
    /// a tested version as `name@version`.
    pub known_collectors: Vec<String>,
    pub max_traversal_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            known_collectors: vec![
                "ldap-collector".to_string(),
                "localmachine-collector".to_string(),
            ],
            max_traversal_depth: MAX_TRAVERSAL_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives. `RUST_LOG` wins when set.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("graph.json"),
            pretty: true,
        }
    }
}

impl Config {
    /// Load `path`, or [`DEFAULT_CONFIG_FILE`] when `None`. A file that does
    /// not exist gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, GraphError> {
        let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            GraphError::IoError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text).map_err(|e| match e {
            GraphError::ConfigError(reason) => {
                GraphError::ConfigError(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, GraphError> {
        toml::from_str(text).map_err(|e| GraphError::ConfigError(e.to_string()))
    }

    #[must_use]
    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            workers: self.analysis.workers,
            max_traversal_depth: self.analysis.max_traversal_depth,
            ..AnalysisOptions::default()
        }
    }

    /// `known_collectors` grouped by name. A name listed both bare and
    /// pinned accepts any version.
    #[must_use]
    pub fn known_collectors(&self) -> Vec<KnownCollector> {
        let mut known: Vec<KnownCollector> = Vec::new();
        let mut unpinned: Vec<String> = Vec::new();
        for entry in &self.analysis.known_collectors {
            let (name, version) = match entry.split_once('@') {
                Some((name, version)) => (name.trim(), Some(version.trim())),
                None => (entry.trim(), None),
            };
            if version.is_none() {
                unpinned.push(name.to_lowercase());
            }
            match known.iter_mut().find(|k| k.name.eq_ignore_ascii_case(name)) {
                Some(collector) => collector.versions.extend(version.map(str::to_string)),
                None => {
                    let mut collector = KnownCollector::any_version(name);
                    collector.versions.extend(version.map(str::to_string));
                    known.push(collector);
                }
            }
        }
        for collector in &mut known {
            if unpinned.contains(&collector.name.to_lowercase()) {
                collector.versions.clear();
            }
        }
        known
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.analysis.max_traversal_depth, MAX_TRAVERSAL_DEPTH);
        assert!(config.output.pretty);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [analysis]
            workers = 4
            known_collectors = ["ldap-collector@2.0", "ldap-collector@2.1", "custom"]

            [logging]
            format = "json"
            "#,
        )
        .expect("parse");

        assert_eq!(config.analysis.workers, 4);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.output, OutputConfig::default());
        let known = config.known_collectors();
        assert_eq!(known.len(), 2);
        assert_eq!(known[0].versions, ["2.0", "2.1"]);
        assert!(known[1].versions.is_empty());
        assert_eq!(config.analysis_options().workers, 4);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = Config::from_toml("[analysis]\nthreads = 2\n");
        assert!(matches!(result, Err(GraphError::ConfigError(_))));
    }

    #[test]
    fn bare_name_wins_over_pins() {
        let config = Config::from_toml(
            "[analysis]\nknown_collectors = [\"ldap-collector@1\", \"LDAP-collector\"]\n",
        )
        .expect("parse");
        let known = config.known_collectors();
        assert_eq!(known.len(), 1);
        assert!(known[0].versions.is_empty());
    }
}
