//! Read-only status queries over the job registry.

use crate::registry::{JobRegistry, JobStatus};
use serde::Serialize;
use std::sync::Arc;

/// One playable link with its display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledLink {
    /// `"Quality N"`, 1-based in link order.
    pub label: String,
    pub title: String,
    #[serde(rename = "playbackURI")]
    pub playback_uri: String,
}

/// Externally visible job status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// No job exists for the id.
    Unknown,
    /// The job is pending or running.
    InProgress,
    Failed,
    Ready {
        title: String,
        links: Vec<LabeledLink>,
    },
}

/// Translates registry state into [`PollResult`]s. Has no side effects.
#[derive(Clone)]
pub struct StatusPoller {
    registry: Arc<JobRegistry>,
}

impl StatusPoller {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    pub fn poll(&self, id: u64) -> PollResult {
        let Some(job) = self.registry.get(id) else {
            return PollResult::Unknown;
        };
        match (job.status, job.result) {
            (JobStatus::Pending | JobStatus::Running, _) => PollResult::InProgress,
            (JobStatus::Completed, Some(result)) => PollResult::Ready {
                links: label_links(&result.title, &result.links),
                title: result.title,
            },
            // Completed always carries a result; treat a missing one as failure.
            (JobStatus::Completed, None) | (JobStatus::Failed, _) => PollResult::Failed,
        }
    }
}

/// Pair each link with a 1-based `"Quality N"` label.
pub fn label_links(title: &str, links: &[String]) -> Vec<LabeledLink> {
    links
        .iter()
        .enumerate()
        .map(|(i, link)| LabeledLink {
            label: format!("Quality {}", i + 1),
            title: title.to_string(),
            playback_uri: link.clone(),
        })
        .collect()
}
