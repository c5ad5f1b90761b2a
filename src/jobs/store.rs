//! Job persistence seam and the default in-memory store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{Job, JobId, JobStatus};
use crate::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),
}

/// Persistence seam for job records.
///
/// Mutations stamp `updated_at`; purge eligibility is measured from the
/// last update so a job's retention clock starts at its terminal transition.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<(), StoreError>;

    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    async fn set_running(&self, id: JobId) -> Result<(), StoreError>;

    async fn set_progress(&self, id: JobId, progress: u8) -> Result<(), StoreError>;

    /// Terminal success: stores the document path and pins progress at 100
    async fn complete(&self, id: JobId, result: PathBuf) -> Result<(), StoreError>;

    /// Terminal failure: stores the taxonomy kind and the cause
    async fn fail(&self, id: JobId, kind: ErrorKind, message: String) -> Result<(), StoreError>;

    /// Remove terminal jobs older than `retention`, returning how many
    async fn purge_expired(&self, retention: Duration) -> usize;
}

/// Default store backed by a shared map
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    async fn update(&self, id: JobId, apply: impl FnOnce(&mut Job)) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn set_running(&self, id: JobId) -> Result<(), StoreError> {
        self.update(id, |job| job.status = JobStatus::Running).await
    }

    async fn set_progress(&self, id: JobId, progress: u8) -> Result<(), StoreError> {
        self.update(id, |job| job.progress = progress.min(100)).await
    }

    async fn complete(&self, id: JobId, result: PathBuf) -> Result<(), StoreError> {
        self.update(id, |job| {
            job.status = JobStatus::Succeeded;
            job.progress = 100;
            job.result = Some(result);
        })
        .await
    }

    async fn fail(&self, id: JobId, kind: ErrorKind, message: String) -> Result<(), StoreError> {
        self.update(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(message);
            job.error_kind = Some(kind);
        })
        .await
    }

    async fn purge_expired(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.updated_at < cutoff));
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle_queued_running_succeeded() {
        let store = InMemoryJobStore::new();
        let job = Job::new("video.mp4");
        let id = job.id;
        store.insert(job).await.unwrap();

        store.set_running(id).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().status, JobStatus::Running);

        store.set_progress(id, 50).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().progress, 50);

        store.complete(id, PathBuf::from("output/doc.md")).await.unwrap();
        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result, Some(PathBuf::from("output/doc.md")));
    }

    #[tokio::test]
    async fn test_failed_job_carries_kind_and_cause() {
        let store = InMemoryJobStore::new();
        let job = Job::new("video.mp4");
        let id = job.id;
        store.insert(job).await.unwrap();

        store
            .fail(id, ErrorKind::Timeout, "exceeded the 1800s job time limit".to_string())
            .await
            .unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_kind, Some(ErrorKind::Timeout));
        assert!(job.error.unwrap().contains("1800"));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        assert!(matches!(
            store.get(JobId::new()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_terminal_jobs() {
        let store = InMemoryJobStore::new();

        let running = Job::new("a.mp4");
        let running_id = running.id;
        store.insert(running).await.unwrap();
        store.set_running(running_id).await.unwrap();

        let mut old_done = Job::new("b.mp4");
        old_done.status = JobStatus::Succeeded;
        old_done.updated_at = Utc::now() - chrono::Duration::hours(2);
        let old_done_id = old_done.id;
        store.insert(old_done).await.unwrap();

        let mut fresh_done = Job::new("c.mp4");
        fresh_done.status = JobStatus::Succeeded;
        let fresh_done_id = fresh_done.id;
        store.insert(fresh_done).await.unwrap();

        let purged = store.purge_expired(Duration::from_secs(3600)).await;
        assert_eq!(purged, 1);
        assert!(store.get(old_done_id).await.is_err());
        assert!(store.get(running_id).await.is_ok());
        assert!(store.get(fresh_done_id).await.is_ok());
    }
}
