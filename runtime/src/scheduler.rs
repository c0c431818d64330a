//! Background extraction jobs.
//!
//! `trigger` returns as soon as the job row exists. The browser work runs in
//! a detached task wrapped by a supervisor: whatever happens inside the
//! pipeline (session error, empty extraction, panic), the supervisor writes
//! exactly one terminal state for the job.

use crate::config::ProbeConfig;
use crate::error::{JobFailure, RegistryError, SessionError};
use crate::events::{EventBus, JobEvent};
use crate::extractor;
use crate::registry::{JobRegistry, JobResult, JobTicket};
use crate::renderer::BrowserSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of the implicit trigger performed by status requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A new job was created and its task spawned.
    Started,
    /// A job already exists for this id.
    AlreadyKnown,
    /// The id is not part of the current search.
    UnknownId,
}

/// Launches one extraction job per item id.
pub struct JobScheduler {
    registry: Arc<JobRegistry>,
    session: Arc<dyn BrowserSession>,
    events: Arc<EventBus>,
    permits: Arc<Semaphore>,
    navigation_timeout: Duration,
    job_deadline: Duration,
}

impl JobScheduler {
    pub fn new(
        registry: Arc<JobRegistry>,
        session: Arc<dyn BrowserSession>,
        events: Arc<EventBus>,
        config: &ProbeConfig,
    ) -> Self {
        Self {
            registry,
            session,
            events,
            permits: Arc::new(Semaphore::new(config.max_sessions)),
            navigation_timeout: config.navigation_timeout,
            job_deadline: config.job_deadline(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &Arc<dyn BrowserSession> {
        &self.session
    }

    /// Schedule extraction for `id` unless a job already exists.
    ///
    /// Returns whether a new job was started. Must be called from within a
    /// Tokio runtime.
    pub fn trigger(&self, id: u64, source_url: &str) -> bool {
        let schedule = self.registry.try_schedule(id, source_url);
        if !schedule.started {
            debug!(id, "duplicate trigger ignored");
            return false;
        }
        self.spawn_job(schedule.ticket, source_url.to_string());
        true
    }

    /// Trigger the job for a search result id if none exists yet.
    pub fn ensure_started(&self, id: u64) -> Trigger {
        match self.registry.try_schedule_search_result(id) {
            None => Trigger::UnknownId,
            Some((schedule, _)) if !schedule.started => Trigger::AlreadyKnown,
            Some((schedule, source_url)) => {
                self.spawn_job(schedule.ticket, source_url);
                Trigger::Started
            }
        }
    }

    fn spawn_job(&self, ticket: JobTicket, source_url: String) {
        info!(id = ticket.id, url = %source_url, "job scheduled");
        self.events.emit(JobEvent::JobScheduled {
            id: ticket.id,
            source_url: source_url.clone(),
            generation: ticket.generation,
        });

        let job = Job {
            deadline: Instant::now() + self.job_deadline,
            ticket,
            source_url,
            registry: Arc::clone(&self.registry),
            session: Arc::clone(&self.session),
            events: Arc::clone(&self.events),
            permits: Arc::clone(&self.permits),
            navigation_timeout: self.navigation_timeout,
        };
        tokio::spawn(job.supervise());
    }
}

/// Everything one background job needs, owned by its task.
#[derive(Clone)]
struct Job {
    ticket: JobTicket,
    source_url: String,
    registry: Arc<JobRegistry>,
    session: Arc<dyn BrowserSession>,
    events: Arc<EventBus>,
    permits: Arc<Semaphore>,
    navigation_timeout: Duration,
    /// Fixed when the job is scheduled; covers the permit wait and the run.
    deadline: Instant,
}

impl Job {
    /// Task boundary: run the pipeline in its own task so a panic surfaces
    /// as a `JoinError` here instead of escaping.
    async fn supervise(self) {
        let started = Instant::now();
        let outcome = match tokio::spawn(self.clone().execute()).await {
            Ok(outcome) => outcome,
            Err(e) => Err(JobFailure::Panicked(e.to_string())),
        };
        self.finish(outcome, started.elapsed());
    }

    async fn execute(self) -> Result<JobResult, JobFailure> {
        let timed_out = || -> JobFailure {
            SessionError::Timeout {
                timeout_ms: self.navigation_timeout.as_millis() as u64,
            }
            .into()
        };

        let _permit = match tokio::time::timeout_at(
            self.deadline,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(JobFailure::SchedulerClosed),
            Err(_) => {
                debug!(id = self.ticket.id, "no session permit before the deadline");
                return Err(timed_out());
            }
        };

        if let Err(e) = self.registry.mark_running(self.ticket) {
            self.report(&e);
            return Err(JobFailure::Superseded);
        }
        self.events.emit(JobEvent::JobStarted {
            id: self.ticket.id,
            generation: self.ticket.generation,
        });
        debug!(id = self.ticket.id, "browser session starting");

        let run = self.session.run(&self.source_url, self.navigation_timeout);
        let capture = match tokio::time::timeout_at(self.deadline, run).await {
            Ok(capture) => capture?,
            Err(_) => return Err(timed_out()),
        };

        let links = extractor::extract(&capture.candidate_urls, &capture.dom_urls);
        if links.is_empty() {
            return Err(JobFailure::ExtractionEmpty);
        }

        let title = capture
            .title
            .unwrap_or_else(|| format!("Item {}", self.ticket.id));
        Ok(JobResult { title, links })
    }

    fn finish(&self, outcome: Result<JobResult, JobFailure>, elapsed: Duration) {
        let id = self.ticket.id;
        let generation = self.ticket.generation;
        let elapsed_ms = elapsed.as_millis() as u64;

        match outcome {
            Ok(result) => {
                let link_count = result.links.len();
                match self.registry.mark_completed(self.ticket, result) {
                    Ok(()) => {
                        info!(id, link_count, elapsed_ms, "job completed");
                        self.events.emit(JobEvent::JobCompleted {
                            id,
                            generation,
                            link_count,
                            elapsed_ms,
                        });
                    }
                    Err(e) => self.report(&e),
                }
            }
            Err(JobFailure::Superseded) => {
                debug!(id, generation, "job superseded before it ran");
            }
            Err(failure) => {
                warn!(id, reason = failure.reason(), elapsed_ms, "job failed: {failure}");
                match self.registry.mark_failed(self.ticket) {
                    Ok(()) => self.events.emit(JobEvent::JobFailed {
                        id,
                        generation,
                        reason: failure.reason().to_string(),
                        elapsed_ms,
                    }),
                    Err(e) => self.report(&e),
                }
            }
        }
    }

    fn report(&self, e: &RegistryError) {
        if e.is_inconsistency() {
            error!(id = self.ticket.id, "job registry inconsistency: {e}");
        } else {
            debug!(id = self.ticket.id, "discarding write: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::JobStatus;
    use crate::renderer::SessionCapture;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSession {
        capture: SessionCapture,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl BrowserSession for StaticSession {
        async fn run(
            &self,
            _url: &str,
            _timeout: Duration,
        ) -> Result<SessionCapture, SessionError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(self.capture.clone())
        }

        fn live_browsers(&self) -> usize {
            0
        }
    }

    fn scheduler(capture: SessionCapture) -> (JobScheduler, Arc<StaticSession>) {
        let session = Arc::new(StaticSession {
            capture,
            runs: AtomicUsize::new(0),
        });
        let scheduler = JobScheduler::new(
            Arc::new(JobRegistry::new()),
            session.clone(),
            Arc::new(EventBus::new(16)),
            &ProbeConfig::default(),
        );
        (scheduler, session)
    }

    async fn wait_terminal(registry: &JobRegistry, id: u64) -> JobStatus {
        for _ in 0..200 {
            if let Some(job) = registry.get(id) {
                if job.status.is_terminal() {
                    return job.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never settled");
    }

    #[tokio::test]
    async fn test_missing_title_falls_back_to_item_label() {
        let (scheduler, _) = scheduler(SessionCapture {
            title: None,
            candidate_urls: vec!["https://cdn/master.m3u8".into()],
            dom_urls: vec![],
        });
        assert!(scheduler.trigger(3, "https://site/3"));
        assert_eq!(wait_terminal(scheduler.registry(), 3).await, JobStatus::Completed);

        let result = scheduler.registry().get(3).unwrap().result.unwrap();
        assert_eq!(result.title, "Item 3");
        assert_eq!(result.links, vec!["https://cdn/master.m3u8"]);
    }

    #[tokio::test]
    async fn test_ensure_started_uses_search_table() {
        let (scheduler, session) = scheduler(SessionCapture::default());
        assert_eq!(scheduler.ensure_started(1), Trigger::UnknownId);

        scheduler
            .registry()
            .install_search_results(vec![crate::registry::SearchResultEntry {
                id: 1,
                source_url: "https://site/1".into(),
            }]);
        assert_eq!(scheduler.ensure_started(1), Trigger::Started);
        assert_eq!(scheduler.ensure_started(1), Trigger::AlreadyKnown);

        // Empty capture settles as Failed.
        assert_eq!(wait_terminal(scheduler.registry(), 1).await, JobStatus::Failed);
        assert_eq!(session.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let (scheduler, _) = scheduler(SessionCapture {
            title: Some("T".into()),
            candidate_urls: vec![],
            dom_urls: vec!["https://cdn/720p.m3u8".into()],
        });
        let mut rx = scheduler.events.subscribe();
        scheduler.trigger(9, "https://site/9");
        wait_terminal(scheduler.registry(), 9).await;

        assert!(matches!(rx.recv().await.unwrap(), JobEvent::JobScheduled { id: 9, .. }));
        assert!(matches!(rx.recv().await.unwrap(), JobEvent::JobStarted { id: 9, .. }));
        assert!(matches!(
            rx.recv().await.unwrap(),
            JobEvent::JobCompleted { id: 9, link_count: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_closed_permits_fail_with_own_reason() {
        let (scheduler, session) = scheduler(SessionCapture::default());
        let mut rx = scheduler.events.subscribe();
        scheduler.permits.close();

        assert!(scheduler.trigger(4, "https://site/4"));
        assert_eq!(wait_terminal(scheduler.registry(), 4).await, JobStatus::Failed);
        assert_eq!(session.runs.load(Ordering::SeqCst), 0);

        loop {
            if let JobEvent::JobFailed { id, reason, .. } = rx.recv().await.unwrap() {
                assert_eq!(id, 4);
                assert_eq!(reason, "scheduler_closed");
                break;
            }
        }
    }
}
