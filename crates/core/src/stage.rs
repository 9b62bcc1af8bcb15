//! Stage store access-control model.
//!
//! Each project owns three storage containers, one per [`Stage`]. Data moves
//! landing → clean → final and never back. Grants are per container and are
//! made at provisioning time: access to one stage never implies access to
//! its neighbours.
//!
//! Object reads and writes are the object store's business; this module only
//! decides who may touch which container and in which direction data may
//! move.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, RegistryError};
use crate::registry::ResourceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Landing,
    Clean,
    Final,
}

impl Stage {
    /// All stages in data-flow order.
    pub const ALL: [Stage; 3] = [Stage::Landing, Stage::Clean, Stage::Final];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Landing => "landing",
            Stage::Clean => "clean",
            Stage::Final => "final",
        }
    }

    fn ordinal(self) -> usize {
        match self {
            Stage::Landing => 0,
            Stage::Clean => 1,
            Stage::Final => 2,
        }
    }

    /// The stage data flows into from this one.
    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.ordinal() + 1).copied()
    }

    pub fn previous(self) -> Option<Stage> {
        self.ordinal().checked_sub(1).map(|i| Stage::ALL[i])
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage '{0}' (expected landing, clean or final)")]
pub struct UnknownStageError(pub String);

impl FromStr for Stage {
    type Err = UnknownStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "landing" => Ok(Stage::Landing),
            "clean" => Ok(Stage::Clean),
            "final" => Ok(Stage::Final),
            _ => Err(UnknownStageError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    Read,
    ReadWrite,
}

impl Access {
    pub fn allows_write(self) -> bool {
        matches!(self, Access::ReadWrite)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::ReadWrite => "read-write",
        }
    }
}

/// What a grant call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The principal had no access before.
    Granted,
    /// Read access was raised to read-write.
    Widened,
    /// The principal already had at least this access.
    Unchanged,
}

/// One stage's container and its grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageContainer {
    pub stage: Stage,
    pub container_name: String,
    pub grants: BTreeMap<String, Access>,
}

impl StageContainer {
    fn grant(&mut self, principal: &str, access: Access) -> GrantOutcome {
        match self.grants.get(principal).copied() {
            None => {
                self.grants.insert(principal.to_string(), access);
                GrantOutcome::Granted
            }
            Some(existing) if existing >= access => GrantOutcome::Unchanged,
            Some(_) => {
                self.grants.insert(principal.to_string(), access);
                GrantOutcome::Widened
            }
        }
    }

    fn access_of(&self, principal: &str) -> Option<Access> {
        self.grants.get(principal).copied()
    }
}

/// Address of a stage container, handed to collaborators such as the
/// crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLocation {
    pub project: String,
    pub stage: Stage,
    pub container_name: String,
}

impl fmt::Display for StageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.container_name)
    }
}

/// Registry name under which a project's stage container is published.
pub fn stage_parameter(project: &str, stage: Stage) -> String {
    format!("{}/stage/{}", project, stage)
}

/// Physical container name for a project's stage.
pub fn container_name(prefix: &str, project: &str, stage: Stage) -> String {
    if prefix.is_empty() {
        format!("{}-{}", project, stage)
    } else {
        format!("{}-{}-{}", prefix, project, stage)
    }
}

/// The three stage containers of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStages {
    project: String,
    containers: Vec<StageContainer>,
}

impl ProjectStages {
    /// Lay out the three containers for `project`. No grants are made.
    pub fn provision(project: &str, prefix: &str) -> Self {
        let containers = Stage::ALL
            .iter()
            .map(|&stage| StageContainer {
                stage,
                container_name: container_name(prefix, project, stage),
                grants: BTreeMap::new(),
            })
            .collect();
        ProjectStages {
            project: project.to_string(),
            containers,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn containers(&self) -> &[StageContainer] {
        &self.containers
    }

    pub fn container(&self, stage: Stage) -> &StageContainer {
        &self.containers[stage.ordinal()]
    }

    /// Grant read and write on exactly one stage. Idempotent.
    pub fn grant_read_write(&mut self, stage: Stage, principal: &str) -> GrantOutcome {
        self.containers[stage.ordinal()].grant(principal, Access::ReadWrite)
    }

    /// Grant read on exactly one stage. Never narrows an existing
    /// read-write grant.
    pub fn grant_read(&mut self, stage: Stage, principal: &str) -> GrantOutcome {
        self.containers[stage.ordinal()].grant(principal, Access::Read)
    }

    pub fn can_read(&self, principal: &str, stage: Stage) -> bool {
        self.container(stage).access_of(principal).is_some()
    }

    pub fn can_write(&self, principal: &str, stage: Stage) -> bool {
        self.container(stage)
            .access_of(principal)
            .is_some_and(Access::allows_write)
    }

    /// Check that `principal` may move data from `from` into `to`.
    ///
    /// The move must go exactly one stage forward, the principal must be
    /// able to read the source and write the destination.
    pub fn authorize_transfer(
        &self,
        principal: &str,
        from: Stage,
        to: Stage,
    ) -> Result<(), AccessError> {
        if from == to {
            return Err(AccessError::SameStage { stage: from });
        }
        if to < from {
            return Err(AccessError::Backwards { from, to });
        }
        if from.next() != Some(to) {
            return Err(AccessError::SkipsStage { from, to });
        }
        if !self.can_read(principal, from) {
            return Err(AccessError::NotGranted {
                principal: principal.to_string(),
                stage: from,
                access: Access::Read.as_str(),
            });
        }
        if !self.can_write(principal, to) {
            return Err(AccessError::NotGranted {
                principal: principal.to_string(),
                stage: to,
                access: Access::ReadWrite.as_str(),
            });
        }
        Ok(())
    }

    /// Publish each container name under its well-known registry name.
    pub async fn publish_to(&self, registry: &ResourceRegistry) -> Result<(), RegistryError> {
        for c in &self.containers {
            registry
                .publish(&stage_parameter(&self.project, c.stage), &c.container_name)
                .await?;
        }
        tracing::info!(
            project = %self.project,
            scope = %registry.scope(),
            "stage containers published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_storage::MemoryStorage;
    use std::sync::Arc;

    fn stages() -> ProjectStages {
        ProjectStages::provision("farm-records", "fsa")
    }

    #[test]
    fn stage_order() {
        assert_eq!(Stage::Landing.next(), Some(Stage::Clean));
        assert_eq!(Stage::Clean.next(), Some(Stage::Final));
        assert_eq!(Stage::Final.next(), None);
        assert_eq!(Stage::Landing.previous(), None);
        assert_eq!(Stage::Final.previous(), Some(Stage::Clean));
    }

    #[test]
    fn provision_names_three_containers() {
        let s = stages();
        let names: Vec<&str> = s
            .containers()
            .iter()
            .map(|c| c.container_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "fsa-farm-records-landing",
                "fsa-farm-records-clean",
                "fsa-farm-records-final"
            ]
        );
        assert!(s.containers().iter().all(|c| c.grants.is_empty()));
    }

    #[test]
    fn grant_twice_is_a_noop() {
        let mut s = stages();
        assert_eq!(s.grant_read_write(Stage::Clean, "etl"), GrantOutcome::Granted);
        assert_eq!(s.grant_read_write(Stage::Clean, "etl"), GrantOutcome::Unchanged);
        assert_eq!(s.container(Stage::Clean).grants.len(), 1);
    }

    #[test]
    fn read_grant_never_narrows() {
        let mut s = stages();
        s.grant_read_write(Stage::Final, "etl");
        assert_eq!(s.grant_read(Stage::Final, "etl"), GrantOutcome::Unchanged);
        assert!(s.can_write("etl", Stage::Final));
    }

    #[test]
    fn read_then_read_write_widens() {
        let mut s = stages();
        s.grant_read(Stage::Final, "analyst");
        assert!(!s.can_write("analyst", Stage::Final));
        assert_eq!(
            s.grant_read_write(Stage::Final, "analyst"),
            GrantOutcome::Widened
        );
        assert!(s.can_write("analyst", Stage::Final));
    }

    #[test]
    fn no_implicit_cross_stage_access() {
        let mut s = stages();
        s.grant_read_write(Stage::Clean, "etl");
        assert!(s.can_write("etl", Stage::Clean));
        assert!(!s.can_read("etl", Stage::Landing));
        assert!(!s.can_read("etl", Stage::Final));
    }

    #[test]
    fn transfer_requires_forward_single_step() {
        let mut s = stages();
        for stage in Stage::ALL {
            s.grant_read_write(stage, "etl");
        }
        assert!(s.authorize_transfer("etl", Stage::Landing, Stage::Clean).is_ok());
        assert!(s.authorize_transfer("etl", Stage::Clean, Stage::Final).is_ok());
        assert_eq!(
            s.authorize_transfer("etl", Stage::Final, Stage::Landing),
            Err(AccessError::Backwards {
                from: Stage::Final,
                to: Stage::Landing
            })
        );
        assert_eq!(
            s.authorize_transfer("etl", Stage::Landing, Stage::Final),
            Err(AccessError::SkipsStage {
                from: Stage::Landing,
                to: Stage::Final
            })
        );
        assert_eq!(
            s.authorize_transfer("etl", Stage::Clean, Stage::Clean),
            Err(AccessError::SameStage {
                stage: Stage::Clean
            })
        );
    }

    #[test]
    fn transfer_requires_both_grants() {
        let mut s = stages();
        s.grant_read(Stage::Landing, "etl");
        match s.authorize_transfer("etl", Stage::Landing, Stage::Clean) {
            Err(AccessError::NotGranted { stage, access, .. }) => {
                assert_eq!(stage, Stage::Clean);
                assert_eq!(access, "read-write");
            }
            other => panic!("expected NotGranted on clean, got {:?}", other),
        }

        s.grant_read_write(Stage::Clean, "etl");
        assert!(s.authorize_transfer("etl", Stage::Landing, Stage::Clean).is_ok());
        // Writing clean does not confer reading final or writing final.
        assert!(s.authorize_transfer("etl", Stage::Clean, Stage::Final).is_err());
    }

    #[test]
    fn parse_stage_names() {
        assert_eq!("FINAL".parse::<Stage>().unwrap(), Stage::Final);
        assert!("archive".parse::<Stage>().is_err());
    }

    #[tokio::test]
    async fn publish_writes_well_known_names() {
        let registry = ResourceRegistry::new(Arc::new(MemoryStorage::new()), "prod");
        stages().publish_to(&registry).await.unwrap();
        assert_eq!(
            registry
                .resolve(&stage_parameter("farm-records", Stage::Final))
                .await
                .unwrap()
                .as_deref(),
            Some("fsa-farm-records-final")
        );
    }
}
