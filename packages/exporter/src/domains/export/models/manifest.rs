//! Export manifest and derived statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Records fetched for one export run, grouped by category.
#[derive(Debug, Clone, Default)]
pub struct EvidenceBundle {
    pub controls: Vec<serde_json::Value>,
    pub evidence: Vec<serde_json::Value>,
    pub tasks: Vec<serde_json::Value>,
    pub policies: Vec<serde_json::Value>,
    pub automation_log: Vec<serde_json::Value>,
    pub score_history: Vec<serde_json::Value>,
}

/// Aggregate statistics over the fetched records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatistics {
    pub total_controls: usize,
    pub satisfied_controls: usize,
    pub total_evidence: usize,
    pub total_tasks: usize,
    pub total_policies: usize,
    pub automation_entries: usize,
    pub score_points: usize,
}

impl ExportStatistics {
    /// Derive statistics from fetched records. Pure; no side effects.
    pub fn from_bundle(bundle: &EvidenceBundle) -> Self {
        let satisfied = bundle.controls.iter().filter(|c| is_satisfied(c)).count();
        Self {
            total_controls: bundle.controls.len(),
            satisfied_controls: satisfied,
            total_evidence: bundle.evidence.len(),
            total_tasks: bundle.tasks.len(),
            total_policies: bundle.policies.len(),
            automation_entries: bundle.automation_log.len(),
            score_points: bundle.score_history.len(),
        }
    }

    /// Ratio of satisfied controls; 0.0 when no controls exist.
    pub fn satisfaction_ratio(&self) -> f64 {
        if self.total_controls == 0 {
            0.0
        } else {
            self.satisfied_controls as f64 / self.total_controls as f64
        }
    }
}

/// A control record counts as satisfied when its `status` field says so.
fn is_satisfied(control: &serde_json::Value) -> bool {
    control.get("status").and_then(|s| s.as_str()) == Some("satisfied")
}

/// Manifest describing a bundle's contents, included in the archive and
/// recorded in the job's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    pub job_id: Uuid,
    pub organization_id: Uuid,
    pub framework_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub statistics: ExportStatistics,
}

impl ExportManifest {
    pub fn new(
        job_id: Uuid,
        organization_id: Uuid,
        framework_id: Uuid,
        statistics: ExportStatistics,
    ) -> Self {
        Self {
            job_id,
            organization_id,
            framework_id,
            generated_at: Utc::now(),
            statistics,
        }
    }

    /// Plain-text summary included in the bundle for human reviewers.
    pub fn summary_text(&self) -> String {
        let stats = &self.statistics;
        format!(
            "Audit evidence bundle\n\
             =====================\n\
             Organization: {}\n\
             Framework:    {}\n\
             Generated:    {}\n\
             \n\
             Controls:       {} ({} satisfied, {:.0}%)\n\
             Evidence items: {}\n\
             Tasks:          {}\n\
             Policies:       {}\n\
             Automation log: {} entries\n\
             Score history:  {} points\n",
            self.organization_id,
            self.framework_id,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            stats.total_controls,
            stats.satisfied_controls,
            stats.satisfaction_ratio() * 100.0,
            stats.total_evidence,
            stats.total_tasks,
            stats.total_policies,
            stats.automation_entries,
            stats.score_points,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn controls(total: usize, satisfied: usize) -> Vec<serde_json::Value> {
        (0..total)
            .map(|i| {
                json!({
                    "id": i,
                    "status": if i < satisfied { "satisfied" } else { "unsatisfied" },
                })
            })
            .collect()
    }

    #[test]
    fn statistics_count_each_category() {
        let bundle = EvidenceBundle {
            controls: controls(10, 6),
            evidence: vec![json!({}); 4],
            tasks: vec![json!({}); 2],
            policies: vec![json!({}); 1],
            automation_log: vec![],
            score_history: vec![],
        };

        let stats = ExportStatistics::from_bundle(&bundle);
        assert_eq!(stats.total_controls, 10);
        assert_eq!(stats.satisfied_controls, 6);
        assert_eq!(stats.total_evidence, 4);
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.total_policies, 1);
    }

    #[test]
    fn controls_without_status_are_unsatisfied() {
        let bundle = EvidenceBundle {
            controls: vec![json!({"id": 1}), json!({"id": 2, "status": "satisfied"})],
            ..Default::default()
        };

        let stats = ExportStatistics::from_bundle(&bundle);
        assert_eq!(stats.satisfied_controls, 1);
    }

    #[test]
    fn satisfaction_ratio_handles_empty_frameworks() {
        let stats = ExportStatistics::from_bundle(&EvidenceBundle::default());
        assert_eq!(stats.satisfaction_ratio(), 0.0);
    }

    #[test]
    fn statistics_serialize_with_camel_case_keys() {
        let bundle = EvidenceBundle {
            controls: controls(2, 1),
            ..Default::default()
        };
        let json = serde_json::to_value(ExportStatistics::from_bundle(&bundle)).unwrap();

        assert_eq!(json["totalControls"], 2);
        assert_eq!(json["satisfiedControls"], 1);
    }

    #[test]
    fn summary_text_mentions_the_counts() {
        let manifest = ExportManifest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            ExportStatistics::from_bundle(&EvidenceBundle {
                controls: controls(10, 6),
                ..Default::default()
            }),
        );

        let text = manifest.summary_text();
        assert!(text.contains("10 (6 satisfied, 60%)"));
    }
}
