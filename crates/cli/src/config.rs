//! Deployment configuration for the `pipeline` binary.
//!
//! # Example
//!
//! ```toml
//! [deployment]
//! scope = "prod"
//! bucket_prefix = "fsa"
//! transition_policy = "monotonic"
//!
//! [registry.retry]
//! max_attempts = 3
//! initial_backoff_ms = 100
//!
//! [projects.farm-records]
//! grants = { "etl-role" = ["landing", "clean", "final"], "analyst" = ["final:read"] }
//!
//! [triggers.crawl-farm-records]
//! project = "farm-records"
//! crawler = "farm-records-final"
//! conditions = [{ unit = "farm-records-etl", state = "SUCCEEDED" }]
//! ```
//!
//! Every section is optional. A missing file means all defaults.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use pipeline_core::{
    Access, Condition, ProjectStages, RetryPolicy, Stage, TransitionPolicy, TriggerDefinition,
};

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub deployment: DeploymentSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    /// Per-project stage grants, keyed by project name.
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
    /// Crawl triggers, keyed by trigger name.
    #[serde(default)]
    pub triggers: BTreeMap<String, TriggerConfig>,
}

/// `[deployment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentSettings {
    /// Registry scope; every published name lives under `/{scope}/`.
    pub scope: String,
    /// Prefix of physical container names.
    pub bucket_prefix: String,
    pub transition_policy: TransitionPolicy,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        DeploymentSettings {
            scope: "default".to_string(),
            bucket_prefix: String::new(),
            transition_policy: TransitionPolicy::default(),
        }
    }
}

/// `[registry]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// `[projects.<name>]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Principal to grant list. An entry is a stage name (read-write) or
    /// `stage:read` / `stage:read-write`.
    #[serde(default)]
    pub grants: BTreeMap<String, Vec<String>>,
}

/// `[triggers.<name>]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub project: String,
    pub crawler: String,
    #[serde(default)]
    pub deduplicate: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Read `path`, or return the defaults if it does not exist.
pub fn read_config(path: &Path) -> Result<PipelineConfig, String> {
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

/// Parse one grant entry such as `clean` or `final:read`.
pub fn parse_grant(entry: &str) -> Result<(Stage, Access), String> {
    let (stage, access) = match entry.split_once(':') {
        Some((stage, "read")) => (stage, Access::Read),
        Some((stage, "read-write")) => (stage, Access::ReadWrite),
        Some((_, other)) => {
            return Err(format!(
                "unknown access '{}' in grant '{}' (expected read or read-write)",
                other, entry
            ))
        }
        None => (entry, Access::ReadWrite),
    };
    let stage = stage.parse::<Stage>().map_err(|e| e.to_string())?;
    Ok((stage, access))
}

/// Check the whole configuration, collecting every problem.
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    let scope = &config.deployment.scope;
    if scope.chars().any(char::is_whitespace) {
        errors.push(format!("deployment scope '{}' contains whitespace", scope));
    }

    for (project, project_config) in &config.projects {
        for (principal, grants) in &project_config.grants {
            for entry in grants {
                if let Err(e) = parse_grant(entry) {
                    errors.push(format!("projects.{}.grants.{}: {}", project, principal, e));
                }
            }
        }
    }

    for (name, trigger) in &config.triggers {
        if !config.projects.contains_key(&trigger.project) {
            errors.push(format!(
                "trigger '{}' references unknown project '{}' (add a [projects.{}] section)",
                name, trigger.project, trigger.project
            ));
        }
        if trigger.crawler.trim().is_empty() {
            errors.push(format!("trigger '{}' has an empty crawler name", name));
        }
        if trigger.conditions.is_empty() {
            errors.push(format!("trigger '{}' has no conditions", name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

impl PipelineConfig {
    /// Provision a project's stages and apply its configured grants. A
    /// project absent from the config gets containers and no grants.
    pub fn project_stages(&self, project: &str) -> Result<ProjectStages, String> {
        let mut stages = ProjectStages::provision(project, &self.deployment.bucket_prefix);
        if let Some(project_config) = self.projects.get(project) {
            for (principal, grants) in &project_config.grants {
                for entry in grants {
                    match parse_grant(entry)? {
                        (stage, Access::Read) => stages.grant_read(stage, principal),
                        (stage, Access::ReadWrite) => stages.grant_read_write(stage, principal),
                    };
                }
            }
        }
        Ok(stages)
    }

    pub fn trigger(&self, name: &str) -> Option<(TriggerDefinition, bool)> {
        self.triggers.get(name).map(|t| {
            (
                TriggerDefinition {
                    name: name.to_string(),
                    project: t.project.clone(),
                    crawler: t.crawler.clone(),
                    conditions: t.conditions.clone(),
                },
                t.deduplicate,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::ExecutionState;
    use std::io::Write;

    const SAMPLE: &str = r#"
[deployment]
scope = "prod"
bucket_prefix = "fsa"
transition_policy = "monotonic"

[registry.retry]
max_attempts = 5

[projects.farm-records]
grants = { "etl-role" = ["landing", "clean", "final"], "analyst" = ["final:read"] }

[triggers.crawl-farm-records]
project = "farm-records"
crawler = "farm-records-final"
deduplicate = true
conditions = [{ unit = "farm-records-etl", state = "SUCCEEDED" }]
"#;

    #[test]
    fn read_config_parses_every_section() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(SAMPLE.as_bytes()).unwrap();

        let config = read_config(tmp.path()).unwrap();
        assert_eq!(config.deployment.scope, "prod");
        assert_eq!(config.deployment.transition_policy, TransitionPolicy::Monotonic);
        assert_eq!(config.registry.retry.max_attempts, 5);
        assert_eq!(config.registry.retry.initial_backoff_ms, 100);
        assert_eq!(config.projects["farm-records"].grants["analyst"], vec!["final:read"]);

        let (def, dedup) = config.trigger("crawl-farm-records").unwrap();
        assert!(dedup);
        assert_eq!(def.conditions[0].state, ExecutionState::Succeeded);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.deployment.scope, "default");
        assert_eq!(config.deployment.transition_policy, TransitionPolicy::LastWriteWins);
        assert!(config.triggers.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"[deployment\nscope = ").unwrap();
        let err = read_config(tmp.path()).unwrap_err();
        assert!(err.contains("could not parse"), "{err}");
    }

    #[test]
    fn grant_entries() {
        assert_eq!(parse_grant("clean").unwrap(), (Stage::Clean, Access::ReadWrite));
        assert_eq!(parse_grant("final:read").unwrap(), (Stage::Final, Access::Read));
        assert!(parse_grant("archive").is_err());
        assert!(parse_grant("final:admin").is_err());
    }

    #[test]
    fn validate_collects_all_problems() {
        let mut config: PipelineConfig = toml::from_str(SAMPLE).unwrap();
        config
            .projects
            .get_mut("farm-records")
            .unwrap()
            .grants
            .insert("bad".to_string(), vec!["archive".to_string()]);
        config.triggers.insert(
            "orphan".to_string(),
            TriggerConfig {
                project: "nowhere".to_string(),
                crawler: " ".to_string(),
                deduplicate: false,
                conditions: vec![],
            },
        );

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("unknown project 'nowhere'")));
        assert!(errors.iter().any(|e| e.contains("empty crawler")));
        assert!(errors.iter().any(|e| e.contains("no conditions")));
        assert!(errors.iter().any(|e| e.contains("archive")));
    }

    #[test]
    fn project_stages_apply_grants() {
        let config: PipelineConfig = toml::from_str(SAMPLE).unwrap();
        let stages = config.project_stages("farm-records").unwrap();
        assert_eq!(stages.container(Stage::Final).container_name, "fsa-farm-records-final");
        assert!(stages.can_write("etl-role", Stage::Clean));
        assert!(stages.can_read("analyst", Stage::Final));
        assert!(!stages.can_write("analyst", Stage::Final));
        assert!(!stages.can_read("analyst", Stage::Clean));
    }
}
