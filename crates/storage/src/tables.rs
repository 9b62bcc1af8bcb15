//! Table state shared by the in-memory and file backends.
//!
//! `Tables` holds the keyed maps and implements every storage operation
//! synchronously. The backends differ only in how they guard and persist it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{
    JobRecord, JobState, ParameterRecord, ReportRecord, TopicRecord, TriggerFiringRecord,
};

type PairKey = (String, String);

#[derive(Debug, Default)]
pub(crate) struct Tables {
    jobs: BTreeMap<PairKey, JobRecord>,
    reports: BTreeMap<PairKey, ReportRecord>,
    topics: BTreeMap<String, TopicRecord>,
    parameters: BTreeMap<String, String>,
    firings: BTreeMap<PairKey, TriggerFiringRecord>,
}

fn pair(a: &str, b: &str) -> PairKey {
    (a.to_string(), b.to_string())
}

impl Tables {
    pub(crate) fn put_job(&mut self, record: JobRecord) -> JobRecord {
        self.jobs
            .insert(pair(&record.job_id, &record.project), record.clone());
        record
    }

    pub(crate) fn get_job(&self, job_id: &str, project: &str) -> Option<JobRecord> {
        self.jobs.get(&pair(job_id, project)).cloned()
    }

    pub(crate) fn list_jobs(&self, project: &str, state: Option<JobState>) -> Vec<JobRecord> {
        self.jobs
            .values()
            .filter(|r| r.project == project)
            .filter(|r| state.map_or(true, |s| r.job_state == s))
            .cloned()
            .collect()
    }

    pub(crate) fn put_report(&mut self, record: ReportRecord) -> ReportRecord {
        self.reports.insert(
            pair(&record.correlation_id, &record.report_type),
            record.clone(),
        );
        record
    }

    pub(crate) fn get_report(&self, correlation_id: &str, report_type: &str) -> Option<ReportRecord> {
        self.reports.get(&pair(correlation_id, report_type)).cloned()
    }

    pub(crate) fn put_topic(&mut self, record: TopicRecord) {
        self.topics.insert(record.topic_id.clone(), record);
    }

    pub(crate) fn get_topic(&self, topic_id: &str) -> Option<TopicRecord> {
        self.topics.get(topic_id).cloned()
    }

    pub(crate) fn put_parameter(&mut self, name: &str, value: &str) {
        self.parameters.insert(name.to_string(), value.to_string());
    }

    pub(crate) fn get_parameter(&self, name: &str) -> Option<String> {
        self.parameters.get(name).cloned()
    }

    pub(crate) fn list_parameters(&self, prefix: &str) -> Vec<ParameterRecord> {
        self.parameters
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, value)| ParameterRecord {
                name: name.clone(),
                value: value.clone(),
            })
            .collect()
    }

    pub(crate) fn claim_trigger_firing(&mut self, record: TriggerFiringRecord) -> bool {
        let key = pair(&record.trigger, &record.upstream_run_id);
        if self.firings.contains_key(&key) {
            return false;
        }
        self.firings.insert(key, record);
        true
    }

    pub(crate) fn complete_trigger_firing(
        &mut self,
        trigger: &str,
        upstream_run_id: &str,
        crawl_run_id: &str,
    ) {
        if let Some(firing) = self.firings.get_mut(&pair(trigger, upstream_run_id)) {
            firing.crawl_run_id = Some(crawl_run_id.to_string());
        }
    }

    pub(crate) fn release_trigger_firing(&mut self, trigger: &str, upstream_run_id: &str) {
        self.firings.remove(&pair(trigger, upstream_run_id));
    }

    pub(crate) fn get_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
    ) -> Option<TriggerFiringRecord> {
        self.firings.get(&pair(trigger, upstream_run_id)).cloned()
    }
}

// ── On-disk form ─────────────────────────────────────────────────────────────

/// JSON document form of [`Tables`]. Composite keys are rebuilt from the
/// records themselves on load.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct TablesDocument {
    #[serde(default)]
    jobs: Vec<JobRecord>,
    #[serde(default)]
    reports: Vec<ReportRecord>,
    #[serde(default)]
    topics: Vec<TopicRecord>,
    #[serde(default)]
    parameters: Vec<ParameterRecord>,
    #[serde(default)]
    firings: Vec<TriggerFiringRecord>,
}

impl From<TablesDocument> for Tables {
    fn from(doc: TablesDocument) -> Self {
        let mut tables = Tables::default();
        for job in doc.jobs {
            tables.put_job(job);
        }
        for report in doc.reports {
            tables.put_report(report);
        }
        for topic in doc.topics {
            tables.put_topic(topic);
        }
        for p in doc.parameters {
            tables.put_parameter(&p.name, &p.value);
        }
        for firing in doc.firings {
            tables.claim_trigger_firing(firing);
        }
        tables
    }
}

impl From<&Tables> for TablesDocument {
    fn from(tables: &Tables) -> Self {
        TablesDocument {
            jobs: tables.jobs.values().cloned().collect(),
            reports: tables.reports.values().cloned().collect(),
            topics: tables.topics.values().cloned().collect(),
            parameters: tables.list_parameters(""),
            firings: tables.firings.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, project: &str, state: JobState) -> JobRecord {
        JobRecord {
            job_id: id.to_string(),
            project: project.to_string(),
            job_state: state,
            full_response: serde_json::json!({}),
        }
    }

    #[test]
    fn list_parameters_stops_at_prefix_boundary() {
        let mut t = Tables::default();
        t.put_parameter("/dev/a", "1");
        t.put_parameter("/prod/a", "2");
        t.put_parameter("/prod/b", "3");
        t.put_parameter("/prodx/c", "4");

        let names: Vec<String> = t
            .list_parameters("/prod/")
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["/prod/a", "/prod/b"]);
    }

    #[test]
    fn document_round_trip_keeps_composite_keys() {
        let mut t = Tables::default();
        t.put_job(job("J-1", "alpha", JobState::Running));
        t.put_job(job("J-1", "beta", JobState::Failed));

        let json = serde_json::to_string(&TablesDocument::from(&t)).unwrap();
        let doc: TablesDocument = serde_json::from_str(&json).unwrap();
        let restored = Tables::from(doc);

        assert_eq!(
            restored.get_job("J-1", "alpha").unwrap().job_state,
            JobState::Running
        );
        assert_eq!(
            restored.get_job("J-1", "beta").unwrap().job_state,
            JobState::Failed
        );
    }

    #[test]
    fn empty_document_parses() {
        let doc: TablesDocument = serde_json::from_str("{}").unwrap();
        let t = Tables::from(doc);
        assert!(t.list_jobs("any", None).is_empty());
    }
}
