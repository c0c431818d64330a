//! Job registry — the search-result table and the parse-job table.
//!
//! Both tables live behind one mutex. Every operation is a short critical
//! section with no `.await` inside, so readers and the scheduler never wait
//! on browser work. `reset_all` bumps a generation counter; writers hold a
//! [`JobTicket`] stamped with the generation they were scheduled under, and a
//! ticket from an older generation can no longer touch the tables.

use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// One row produced by the search step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultEntry {
    pub id: u64,
    #[serde(rename = "url")]
    pub source_url: String,
}

/// Lifecycle state of a parse job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Forward-only state machine. `Pending -> Failed` covers tasks that
    /// fault before they start running.
    fn can_advance_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// Output of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub title: String,
    /// Ordered, duplicate-free manifest URLs.
    pub links: Vec<String>,
}

/// Tracked state of the extraction job for one item id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseJob {
    pub id: u64,
    pub source_url: String,
    pub status: JobStatus,
    /// Present iff `status == Completed`.
    pub result: Option<JobResult>,
    pub created_at: DateTime<Utc>,
    pub generation: u64,
}

/// Write capability for one job, valid only within its generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTicket {
    pub id: u64,
    pub generation: u64,
}

/// Outcome of [`JobRegistry::try_schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub started: bool,
    pub ticket: JobTicket,
}

/// Snapshot counters for the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub generation: u64,
    pub search_results: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Tables {
    generation: u64,
    search: HashMap<u64, SearchResultEntry>,
    /// Insertion order of the current search, for listing.
    search_order: Vec<u64>,
    jobs: HashMap<u64, ParseJob>,
}

/// Concurrency-safe owner of the search and job tables.
#[derive(Default)]
pub struct JobRegistry {
    tables: Mutex<Tables>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave the maps half-updated:
        // every mutation is a single insert/remove/assign.
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Atomically create a `Pending` job for `id` unless one already exists.
    pub fn try_schedule(&self, id: u64, source_url: &str) -> Schedule {
        let mut tables = self.lock();
        Self::schedule_locked(&mut tables, id, source_url)
    }

    /// Look up `id` in the search table and schedule it, as one atomic step.
    ///
    /// Returns `None` when the id is not part of the current search.
    pub fn try_schedule_search_result(&self, id: u64) -> Option<(Schedule, String)> {
        let mut tables = self.lock();
        let source_url = tables.search.get(&id)?.source_url.clone();
        let schedule = Self::schedule_locked(&mut tables, id, &source_url);
        Some((schedule, source_url))
    }

    fn schedule_locked(tables: &mut Tables, id: u64, source_url: &str) -> Schedule {
        let generation = tables.generation;
        let ticket = JobTicket { id, generation };

        if tables.jobs.contains_key(&id) {
            return Schedule {
                started: false,
                ticket,
            };
        }

        tables.jobs.insert(
            id,
            ParseJob {
                id,
                source_url: source_url.to_string(),
                status: JobStatus::Pending,
                result: None,
                created_at: Utc::now(),
                generation,
            },
        );
        Schedule {
            started: true,
            ticket,
        }
    }

    pub fn mark_running(&self, ticket: JobTicket) -> Result<(), RegistryError> {
        self.transition(ticket, JobStatus::Running, None)
    }

    pub fn mark_completed(
        &self,
        ticket: JobTicket,
        result: JobResult,
    ) -> Result<(), RegistryError> {
        self.transition(ticket, JobStatus::Completed, Some(result))
    }

    pub fn mark_failed(&self, ticket: JobTicket) -> Result<(), RegistryError> {
        self.transition(ticket, JobStatus::Failed, None)
    }

    fn transition(
        &self,
        ticket: JobTicket,
        next: JobStatus,
        result: Option<JobResult>,
    ) -> Result<(), RegistryError> {
        let mut tables = self.lock();
        if ticket.generation != tables.generation {
            return Err(RegistryError::Superseded {
                id: ticket.id,
                generation: ticket.generation,
            });
        }

        let job = tables
            .jobs
            .get_mut(&ticket.id)
            .ok_or(RegistryError::UnknownJob(ticket.id))?;

        if !job.status.can_advance_to(next) {
            return Err(RegistryError::InvalidTransition {
                id: ticket.id,
                from: job.status,
                to: next,
            });
        }

        job.status = next;
        job.result = result;
        Ok(())
    }

    /// Snapshot of the job for `id`, if any.
    pub fn get(&self, id: u64) -> Option<ParseJob> {
        self.lock().jobs.get(&id).cloned()
    }

    /// Clear both tables and start a new generation.
    pub fn reset_all(&self) -> u64 {
        let mut tables = self.lock();
        Self::reset_locked(&mut tables)
    }

    fn reset_locked(tables: &mut Tables) -> u64 {
        tables.generation += 1;
        tables.search.clear();
        tables.search_order.clear();
        tables.jobs.clear();
        tables.generation
    }

    /// Replace the search table with the results of a new search.
    ///
    /// Invalidates every job from the previous search. Later duplicates of
    /// an id are ignored. Returns the new generation.
    pub fn install_search_results(&self, entries: Vec<SearchResultEntry>) -> u64 {
        let mut tables = self.lock();
        let generation = Self::reset_locked(&mut tables);
        for entry in entries {
            if tables.search.contains_key(&entry.id) {
                continue;
            }
            tables.search_order.push(entry.id);
            tables.search.insert(entry.id, entry);
        }
        generation
    }

    /// Source page URL for a search result id.
    pub fn source_url(&self, id: u64) -> Option<String> {
        self.lock().search.get(&id).map(|e| e.source_url.clone())
    }

    /// Current search results in the order they were installed.
    pub fn search_results(&self) -> Vec<SearchResultEntry> {
        let tables = self.lock();
        tables
            .search_order
            .iter()
            .filter_map(|id| tables.search.get(id).cloned())
            .collect()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn stats(&self) -> RegistryStats {
        let tables = self.lock();
        let mut stats = RegistryStats {
            generation: tables.generation,
            search_results: tables.search.len(),
            ..Default::default()
        };
        for job in tables.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}
