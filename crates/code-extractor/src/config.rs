//! Configuration for code-extractor
//!
//! This module provides the command-line interface and the YAML extraction
//! configuration (`extractions.yml`) that drives a run.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use extractor_git::tree::normalize_path;

/// Default branch used for `upstream_branch` and `target_base_branch`
pub const DEFAULT_BRANCH: &str = "master";

/// Code Extractor - split a path subset out of a repository with its history
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "code-extractor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the extraction configuration file
    #[arg(env = "CODE_EXTRACTOR_CONFIG", default_value = "extractions.yml")]
    pub config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,

    /// Quiet mode - only warnings and errors are logged
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,

    /// Print the run report as JSON on stdout
    #[arg(long, default_value = "false")]
    pub json: bool,
}

impl Cli {
    /// Get the log level based on verbose/quiet flags
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        }
    }
}

/// Where re-injected history is spliced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReinsertTarget {
    /// Display name used in the synthesized root message
    pub name: String,
    /// URL or path of the target repository
    pub remote: String,
    /// Branch of the target the new commits are replayed onto
    pub base_branch: String,
}

/// A validated extraction configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionConfig {
    /// Name of the extraction, used for `extract_<name>`
    pub name: String,
    /// Absolute path of the working copy
    pub destination: PathBuf,
    /// URL or path of the source repository
    pub upstream: String,
    /// Identity written into transfer tags, e.g. `MyOrg/repo`
    pub upstream_name: String,
    /// Branch whose history is extracted
    pub upstream_branch: String,
    /// Paths to extract, normalized
    pub extractions: Vec<String>,
    /// Present when the run re-injects into a target
    pub target: Option<ReinsertTarget>,
    /// Shell commands run in the working copy after pruning
    pub extra_cmds: Vec<String>,
}

/// The file as written, before validation
///
/// Keys may also be written Ruby-symbol style (`:name:`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(alias = ":name")]
    name: Option<String>,
    #[serde(alias = ":destination")]
    destination: Option<PathBuf>,
    #[serde(alias = ":upstream")]
    upstream: Option<String>,
    #[serde(alias = ":upstream_name")]
    upstream_name: Option<String>,
    #[serde(alias = ":upstream_branch")]
    upstream_branch: Option<String>,
    #[serde(alias = ":extractions")]
    extractions: Option<Vec<String>>,
    #[serde(alias = ":reinsert")]
    reinsert: Option<bool>,
    #[serde(alias = ":target_name")]
    target_name: Option<String>,
    #[serde(alias = ":target_remote")]
    target_remote: Option<String>,
    #[serde(alias = ":target_base_branch")]
    target_base_branch: Option<String>,
    #[serde(alias = ":extra_cmds")]
    extra_cmds: Option<Vec<String>>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ExtractionConfig {
    /// Load and validate a configuration file
    ///
    /// Relative destinations resolve against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, is not valid YAML,
    /// or is missing required keys.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let base = std::path::absolute(&base).map_err(|source| ConfigError::Read {
            path: base.clone(),
            source,
        })?;
        Self::from_yaml(&text, &base)
    }

    /// Parse and validate configuration text
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for invalid YAML and
    /// `ConfigError::MissingKeys` listing every absent required key.
    pub fn from_yaml(text: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text)?;

        let name = present(raw.name);
        let destination = raw.destination.filter(|d| !d.as_os_str().is_empty());
        let upstream = present(raw.upstream);
        let upstream_name = present(raw.upstream_name);
        let extractions: Vec<String> = {
            let mut paths: Vec<String> = raw
                .extractions
                .unwrap_or_default()
                .iter()
                .map(|p| normalize_path(p))
                .filter(|p| !p.is_empty())
                .collect();
            paths.sort();
            paths.dedup();
            paths
        };
        let reinsert = raw.reinsert.unwrap_or(false);
        let target_name = present(raw.target_name);
        let target_remote = present(raw.target_remote);

        let mut missing = Vec::new();
        for (key, absent) in [
            ("name", name.is_none()),
            ("destination", destination.is_none()),
            ("upstream", upstream.is_none()),
            ("upstream_name", upstream_name.is_none()),
            ("extractions", extractions.is_empty()),
        ] {
            if absent {
                missing.push(key.to_string());
            }
        }
        if reinsert {
            if target_name.is_none() {
                missing.push("target_name".to_string());
            }
            if target_remote.is_none() {
                missing.push("target_remote".to_string());
            }
        }

        match (name, destination, upstream, upstream_name) {
            (Some(name), Some(destination), Some(upstream), Some(upstream_name))
                if missing.is_empty() =>
            {
                let target = match (reinsert, target_name, target_remote) {
                    (true, Some(name), Some(remote)) => Some(ReinsertTarget {
                        name,
                        remote,
                        base_branch: present(raw.target_base_branch)
                            .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
                    }),
                    _ => None,
                };
                Ok(Self {
                    name,
                    destination: base_dir.join(destination),
                    upstream,
                    upstream_name,
                    upstream_branch: present(raw.upstream_branch)
                        .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
                    extractions,
                    target,
                    extra_cmds: raw.extra_cmds.unwrap_or_default(),
                })
            }
            _ => Err(ConfigError::MissingKeys(missing)),
        }
    }

    /// Whether this run re-injects into a target
    #[must_use]
    pub fn is_reinsert(&self) -> bool {
        self.target.is_some()
    }

    /// Name of the branch holding the extraction-paths-removed history
    #[must_use]
    pub fn extract_branch(&self) -> String {
        format!("extract_{}", self.name)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        /// The file that was read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The configuration is not valid YAML
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Required keys are absent
    #[error("{} key(s) missing", .0.join(", "))]
    MissingKeys(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    const MINIMAL: &str = "\
name: my_extractions
destination: extracted
upstream: /tmp/repo
upstream_name: MyOrg/repo
extractions:
  - foo
";

    #[test]
    fn test_minimal_config_defaults() {
        let config = ExtractionConfig::from_yaml(MINIMAL, Path::new("/work")).expect("valid");
        assert_eq!(config.name, "my_extractions");
        assert_eq!(config.destination, PathBuf::from("/work/extracted"));
        assert_eq!(config.upstream_branch, "master");
        assert_eq!(config.extractions, vec!["foo".to_string()]);
        assert!(config.target.is_none());
        assert!(config.extra_cmds.is_empty());
        assert_eq!(config.extract_branch(), "extract_my_extractions");
    }

    #[test]
    fn test_absolute_destination_kept() {
        let text = MINIMAL.replace("destination: extracted", "destination: /abs/out");
        let config = ExtractionConfig::from_yaml(&text, Path::new("/work")).expect("valid");
        assert_eq!(config.destination, PathBuf::from("/abs/out"));
    }

    #[test]
    fn test_missing_keys_listed_together() {
        let text = "name: x\nextractions: []\n";
        match ExtractionConfig::from_yaml(text, Path::new("/work")) {
            Err(ConfigError::MissingKeys(keys)) => assert_eq!(
                keys,
                vec!["destination", "upstream", "upstream_name", "extractions"]
            ),
            other => panic!("Expected MissingKeys, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_keys_message() {
        let err = ConfigError::MissingKeys(vec!["name".into(), "upstream".into()]);
        assert_eq!(err.to_string(), "name, upstream key(s) missing");
    }

    #[test]
    fn test_reinsert_requires_target() {
        let text = format!("{MINIMAL}reinsert: true\n");
        match ExtractionConfig::from_yaml(&text, Path::new("/work")) {
            Err(ConfigError::MissingKeys(keys)) => {
                assert_eq!(keys, vec!["target_name", "target_remote"]);
            }
            other => panic!("Expected MissingKeys, got {other:?}"),
        }
    }

    #[test]
    fn test_reinsert_config() {
        let text = format!(
            "{MINIMAL}reinsert: true\ntarget_name: MyOrg/extracted_repo\ntarget_remote: /tmp/bare.git\nextra_cmds:\n  - mkdir lib\n  - mv foo lib\n"
        );
        let config = ExtractionConfig::from_yaml(&text, Path::new("/work")).expect("valid");
        let target = config.target.clone().expect("target");
        assert_eq!(target.name, "MyOrg/extracted_repo");
        assert_eq!(target.remote, "/tmp/bare.git");
        assert_eq!(target.base_branch, "master");
        assert_eq!(config.extra_cmds, vec!["mkdir lib", "mv foo lib"]);
        assert!(config.is_reinsert());
    }

    #[test]
    fn test_target_ignored_without_reinsert() {
        let text = format!("{MINIMAL}target_name: ignored\ntarget_remote: /tmp/x\n");
        let config = ExtractionConfig::from_yaml(&text, Path::new("/work")).expect("valid");
        assert!(!config.is_reinsert());
    }

    #[test]
    fn test_symbol_style_keys() {
        let text = "\
:name: my_extractions
:destination: /tmp/extracted
:upstream: /tmp/repo
:upstream_name: MyOrg/repo
:extractions:
- foo
- ./bar/
";
        let config = ExtractionConfig::from_yaml(text, Path::new("/work")).expect("valid");
        assert_eq!(config.name, "my_extractions");
        assert_eq!(config.extractions, vec!["bar".to_string(), "foo".to_string()]);
    }

    #[test]
    fn test_invalid_yaml() {
        let result = ExtractionConfig::from_yaml("name: [unclosed", Path::new("/work"));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExtractionConfig::load("/nonexistent/extractions.yml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_log_level() {
        let cli = Cli::default();
        assert_eq!(cli.log_level(), tracing::Level::INFO);
        let cli = Cli {
            verbose: true,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
        let cli = Cli {
            quiet: true,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::WARN);
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
