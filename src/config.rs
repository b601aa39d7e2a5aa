use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Token;
use crate::providers::{SourceKind, SourceSpec};

const CANDIDATES: [&str; 4] = ["ciwatch.toml", "ciwatch.json", "ciwatch.yaml", "ciwatch.yml"];

/// Configuration file structure for ciwatch.
///
/// Lists the CI sources to watch. Loaded from the given path, the current directory or
/// the user configuration directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    pub kind: SourceKind,

    /// Display name. `owner/repo` for GitHub, the project path for GitLab
    pub name: String,

    /// Access token, inline
    pub token: Option<String>,

    /// Name of an environment variable holding the access token
    pub token_env: Option<String>,

    /// API base URL, defaults to the public instance
    pub endpoint: Option<String>,

    pub poll_interval_secs: Option<u64>,

    /// Check reachability before the source is admitted
    #[serde(default)]
    pub validate: bool,
}

impl SourceConfig {
    fn to_spec(&self, lookup: &impl Fn(&str) -> Option<String>) -> SourceSpec {
        let token = self.token.clone().or_else(|| {
            let var = self.token_env.as_deref()?;
            let value = lookup(var);
            if value.is_none() {
                warn!("Token variable {var} for source {} is not set", self.name);
            }
            value
        });

        SourceSpec {
            kind: self.kind,
            name: self.name.clone(),
            token: token.filter(|t| !t.is_empty()).map(Token::from),
            endpoint: self.endpoint.clone(),
            poll_interval: self.poll_interval_secs.map(Duration::from_secs),
            validate: self.validate,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./ciwatch.toml, ./ciwatch.json, ./ciwatch.yaml, ./ciwatch.yml
    /// 3. `<config dir>/ciwatch/config.toml`
    ///
    /// Returns an empty configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let user_config = dirs::config_dir()
            .map(|dir| dir.join("ciwatch").join("config.toml"))
            .filter(|path| path.exists());

        match discover(Path::new(".")).or(user_config) {
            Some(path) => Self::load_from_path(&path),
            None => {
                debug!("No configuration file found");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let config: Self = match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
        };

        debug!(
            "Loaded {} source(s) from {}",
            config.sources.len(),
            path.display()
        );
        Ok(config)
    }

    /// Registrations for every configured source, tokens resolved through `lookup`.
    pub fn source_specs(&self, lookup: impl Fn(&str) -> Option<String>) -> Vec<SourceSpec> {
        self.sources
            .iter()
            .map(|source| source.to_spec(&lookup))
            .collect()
    }
}

/// First configuration file candidate present in `dir`.
pub fn discover(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.exists())
}

/// Sources declared through the environment alone.
///
/// `GITHUB_TOKEN` with `GITHUB_OWNER` and `GITHUB_REPO` registers a GitHub source,
/// `GITLAB_TOKEN` with `GITLAB_PROJECT` (and optionally `GITLAB_URL`) a GitLab one.
pub fn env_sources(lookup: impl Fn(&str) -> Option<String>) -> Vec<SourceSpec> {
    let var = |name: &str| lookup(name).filter(|value| !value.is_empty());
    let mut specs = Vec::new();

    if let (Some(token), Some(owner), Some(repo)) =
        (var("GITHUB_TOKEN"), var("GITHUB_OWNER"), var("GITHUB_REPO"))
    {
        let mut spec = SourceSpec::new(SourceKind::Github, format!("{owner}/{repo}"));
        spec.token = Some(Token::from(token));
        specs.push(spec);
    }

    if let (Some(token), Some(project)) = (var("GITLAB_TOKEN"), var("GITLAB_PROJECT")) {
        let mut spec = SourceSpec::new(SourceKind::Gitlab, project);
        spec.token = Some(Token::from(token));
        spec.endpoint = var("GITLAB_URL");
        specs.push(spec);
    }

    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config_has_no_sources() {
        assert!(Config::default().sources.is_empty());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[[sources]]
kind = "github"
name = "octo/widgets"
token-env = "WIDGETS_TOKEN"
poll-interval-secs = 30
validate = true

[[sources]]
kind = "gitlab"
name = "group/project"
token = "glpat-test-token"
endpoint = "https://gitlab.example.com"

[[sources]]
kind = "mock"
name = "demo"
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[0].kind, SourceKind::Github);
        assert_eq!(config.sources[0].token_env.as_deref(), Some("WIDGETS_TOKEN"));
        assert_eq!(config.sources[0].poll_interval_secs, Some(30));
        assert!(config.sources[0].validate);
        assert_eq!(
            config.sources[1].endpoint.as_deref(),
            Some("https://gitlab.example.com")
        );
        assert!(!config.sources[1].validate);
        assert_eq!(config.sources[2].kind, SourceKind::Simulator);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "sources": [
    { "kind": "gitlab", "name": "group/project", "token": "glpat-json-token" }
  ]
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].token.as_deref(), Some("glpat-json-token"));
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yml").unwrap();
        let yaml_content = r#"
sources:
  - kind: simulator
    name: demo
    poll-interval-secs: 1
"#;
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.sources[0].kind, SourceKind::Simulator);
        assert_eq!(config.sources[0].poll_interval_secs, Some(1));
    }

    #[tokio::test]
    async fn test_zero_poll_interval_source_is_refused() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[[sources]]
kind = "mock"
name = "demo"
poll-interval-secs = 0
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        let specs = config.source_specs(env(&[]));
        assert_eq!(specs[0].poll_interval(), Duration::ZERO);

        let result = crate::providers::build_backend(
            &specs[0],
            tokio_util::sync::CancellationToken::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_extension_falls_back_to_probing() {
        let mut temp_file = NamedTempFile::with_suffix(".conf").unwrap();
        write!(temp_file, r#"{{ "sources": [ {{ "kind": "mock", "name": "demo" }} ] }}"#).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.sources[0].name, "demo");
    }

    #[test]
    fn test_invalid_kind_is_rejected() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[[sources]]\nkind = \"jenkins\"\nname = \"x\"\n").unwrap();

        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("does-not-exist.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_discover_prefers_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(discover(temp_dir.path()), None);

        std::fs::write(temp_dir.path().join("ciwatch.yaml"), "sources: []\n").unwrap();
        std::fs::write(temp_dir.path().join("ciwatch.toml"), "sources = []\n").unwrap();

        assert_eq!(
            discover(temp_dir.path()),
            Some(temp_dir.path().join("ciwatch.toml"))
        );
    }

    #[test]
    fn test_source_specs_resolve_tokens() {
        let config = Config {
            sources: vec![
                SourceConfig {
                    kind: SourceKind::Github,
                    name: "octo/widgets".to_string(),
                    token: None,
                    token_env: Some("WIDGETS_TOKEN".to_string()),
                    endpoint: None,
                    poll_interval_secs: Some(30),
                    validate: false,
                },
                SourceConfig {
                    kind: SourceKind::Gitlab,
                    name: "group/project".to_string(),
                    token: None,
                    token_env: Some("UNSET".to_string()),
                    endpoint: None,
                    poll_interval_secs: None,
                    validate: true,
                },
            ],
        };

        let specs = config.source_specs(env(&[("WIDGETS_TOKEN", "ghp_secret")]));

        assert_eq!(specs[0].token.as_ref().map(Token::as_str), Some("ghp_secret"));
        assert_eq!(specs[0].poll_interval(), Duration::from_secs(30));
        assert!(specs[1].token.is_none());
        assert_eq!(specs[1].poll_interval(), Duration::from_secs(5));
        assert!(specs[1].validate);
    }

    #[test]
    fn test_env_sources() {
        let specs = env_sources(env(&[
            ("GITHUB_TOKEN", "ghp_x"),
            ("GITHUB_OWNER", "octo"),
            ("GITHUB_REPO", "widgets"),
            ("GITLAB_TOKEN", "glpat_y"),
            ("GITLAB_PROJECT", "group/project"),
            ("GITLAB_URL", "https://gitlab.example.com"),
        ]));

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].kind, SourceKind::Github);
        assert_eq!(specs[0].name, "octo/widgets");
        assert_eq!(specs[1].kind, SourceKind::Gitlab);
        assert_eq!(
            specs[1].endpoint.as_deref(),
            Some("https://gitlab.example.com")
        );
    }

    #[test]
    fn test_env_sources_need_every_variable() {
        let specs = env_sources(env(&[
            ("GITHUB_TOKEN", "ghp_x"),
            ("GITHUB_OWNER", "octo"),
            ("GITLAB_PROJECT", "group/project"),
        ]));
        assert!(specs.is_empty());
    }
}
