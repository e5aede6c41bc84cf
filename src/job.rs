//! Remote job polling
//!
//! Asynchronous remote work (package import, validate, translation export) is
//! tracked by a job id and polled to a terminal status. The poll loop is a
//! bounded state machine: a fixed interval, a fixed attempt cap, and timeout
//! as a terminal failure rather than an open-ended wait. The sleep itself goes
//! through the [`Clock`] trait so tests never block.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::gateway::{ApiRequest, Gateway};

/// Default poll interval between job-status checks
pub const POLL_INTERVAL: Duration = Duration::from_secs(12);

/// Default attempt cap (~12 minutes at the default interval)
pub const MAX_POLL_ATTEMPTS: u32 = 60;

/// Remote job status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl JobStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// A result link attached to job details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLink {
    pub rel: String,
    pub href: String,
}

/// Terminal details of a successfully completed job
#[derive(Debug, Clone)]
pub struct JobDetails {
    pub id: String,
    pub status: JobStatus,
    pub links: Vec<JobLink>,
    /// Full `data` object, for fields the typed view doesn't carry
    pub raw: Value,
}

impl JobDetails {
    fn from_data(id: &str, status: JobStatus, data: &Value) -> Self {
        let links = data
            .get("links")
            .and_then(Value::as_array)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| {
                        Some(JobLink {
                            rel: link.get("rel")?.as_str()?.to_string(),
                            href: link.get("href")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: id.to_string(),
            status,
            links,
            raw: data.clone(),
        }
    }

    /// First link with the given relation
    pub fn link(&self, rel: &str) -> Option<&JobLink> {
        self.links.iter().find(|l| l.rel == rel)
    }

    /// String field from the raw details
    pub fn field(&self, name: &str) -> Option<&str> {
        self.raw.get(name).and_then(Value::as_str)
    }
}

/// Injectable sleep, so poll tests run instantly
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

static SYSTEM_CLOCK: SystemClock = SystemClock;

/// Bounded job-status poll loop
pub struct JobPoller<'a> {
    gateway: &'a dyn Gateway,
    clock: &'a dyn Clock,
    interval: Duration,
    max_attempts: u32,
}

impl<'a> JobPoller<'a> {
    pub fn new(gateway: &'a dyn Gateway) -> Self {
        Self {
            gateway,
            clock: &SYSTEM_CLOCK,
            interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }

    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_schedule(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.interval = interval;
        self.max_attempts = max_attempts;
        self
    }

    /// Poll until the job reaches a terminal status or the attempt cap.
    ///
    /// SUCCESS yields the job details. FAILURE and CANCELLED surface as
    /// [`SyncError::JobFailed`]; exhausting the cap is [`SyncError::JobTimeout`].
    /// Transient status-check failures are logged and count as attempts.
    pub fn wait(&self, job_id: &str) -> SyncResult<JobDetails> {
        let endpoint = self.gateway.api_path(&format!("services/jobs/{}", job_id));
        tracing::info!(job_id, "monitoring remote job");

        for attempt in 1..=self.max_attempts {
            match self.gateway.request(&ApiRequest::get(&endpoint)) {
                Ok(response) if response.is_success() => {
                    let data = response.data().cloned().unwrap_or(Value::Null);
                    let status = data
                        .get("status")
                        .and_then(Value::as_str)
                        .and_then(JobStatus::parse);
                    match status {
                        Some(JobStatus::Success) => {
                            tracing::info!(job_id, "job completed successfully");
                            return Ok(JobDetails::from_data(job_id, JobStatus::Success, &data));
                        }
                        Some(status) if status.is_terminal() => {
                            return Err(SyncError::JobFailed {
                                job_id: job_id.to_string(),
                                status: status.to_string(),
                            });
                        }
                        Some(status) => {
                            tracing::debug!(job_id, %status, attempt, "job still in progress");
                        }
                        None => {
                            tracing::warn!(job_id, attempt, "job status missing from response");
                        }
                    }
                }
                Ok(response) => {
                    tracing::warn!(
                        job_id,
                        status = response.status,
                        attempt,
                        "job status check failed, will retry"
                    );
                }
                Err(e) => {
                    tracing::warn!(job_id, attempt, error = %e, "job status check errored, will retry");
                }
            }
            self.clock.sleep(self.interval);
        }

        Err(SyncError::JobTimeout {
            job_id: job_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}
