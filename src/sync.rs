use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::activity;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::models::{RemotePayload, StudentInput, StudentRecord, StudentUpdate, SyncRun};
use crate::pacing::{FixedDelay, Pacer};
use crate::remote::{CodeforcesClient, HttpTransport};
use crate::repository::StudentRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    /// Another sync for the same student was already running.
    AlreadyInFlight,
    /// The fetch finished but the record was deleted or its handle changed meanwhile.
    Discarded,
}

#[derive(Clone)]
pub struct RosterService {
    inner: Arc<Inner>,
}

struct Inner {
    repo: Arc<StudentRepository>,
    client: Arc<CodeforcesClient>,
    clock: Arc<dyn Clock>,
    pacer: Arc<dyn Pacer>,
    config: SyncConfig,
    in_flight: Mutex<HashSet<Uuid>>,
    history: Mutex<VecDeque<SyncRun>>,
}

/// Clears the syncing flag and in-flight entry however the sync ends.
struct InFlightGuard<'a> {
    inner: &'a Inner,
    id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        // The record may have been deleted mid-flight; that is fine.
        self.inner
            .repo
            .modify(self.id, |record| record.is_data_syncing = false);
        self.inner.in_flight.lock().remove(&self.id);
    }
}

impl RosterService {
    pub fn new(
        repo: Arc<StudentRepository>,
        client: Arc<CodeforcesClient>,
        clock: Arc<dyn Clock>,
        pacer: Arc<dyn Pacer>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                client,
                clock,
                pacer,
                config,
                in_flight: Mutex::new(HashSet::new()),
                history: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Production wiring: HTTP transport, wall clock, fixed pacing, seeded roster.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let transport = HttpTransport::new(&config.base_url, config.request_timeout)?;
        let client = CodeforcesClient::new(Arc::new(transport), clock.clone(), config.cache_ttl);
        let pacer = FixedDelay::new(config.pacing_delay);
        let repo = StudentRepository::seeded()?;

        Ok(Self::new(
            Arc::new(repo),
            Arc::new(client),
            clock,
            Arc::new(pacer),
            config,
        ))
    }

    pub fn repository(&self) -> &StudentRepository {
        &self.inner.repo
    }

    pub fn list_students(&self) -> Vec<StudentRecord> {
        self.inner.repo.list()
    }

    pub fn get_student(&self, id: Uuid) -> Result<StudentRecord> {
        self.inner.repo.get(id).ok_or(SyncError::NotFound(id))
    }

    pub fn active_students(&self) -> Vec<StudentRecord> {
        self.inner.repo.active()
    }

    pub fn inactive_students(&self) -> Vec<StudentRecord> {
        self.inner.repo.inactive()
    }

    pub fn average_rating(&self) -> i32 {
        self.inner.repo.average_rating()
    }

    pub fn students_in_rating_range(&self, min: i32, max: i32) -> Vec<StudentRecord> {
        self.inner.repo.by_rating_range(min, max)
    }

    /// Enrolls a student and schedules the first sync in the background.
    pub fn add_student(&self, input: StudentInput) -> Result<StudentRecord> {
        let input = input.validated()?;
        let record = self.inner.repo.add(input);
        tracing::info!(student_id = %record.id, handle = %record.handle, "Student added");
        self.schedule_sync(record.id);
        Ok(record)
    }

    /// Merges the given fields. A changed handle schedules a re-sync.
    pub fn update_student(&self, id: Uuid, update: StudentUpdate) -> Result<StudentRecord> {
        let update = update.validated()?;
        let new_handle = update.handle.clone();
        let (previous_handle, updated) = self
            .inner
            .repo
            .modify(id, |record| {
                let previous = record.handle.clone();
                update.apply_to(record);
                (previous, record.clone())
            })
            .ok_or(SyncError::NotFound(id))?;

        if new_handle.is_some_and(|handle| handle != previous_handle) {
            tracing::info!(
                student_id = %id,
                from = %previous_handle,
                to = %updated.handle,
                "Handle changed, scheduling re-sync"
            );
            self.schedule_sync(id);
        }

        Ok(updated)
    }

    /// Removes the student. A sync still running for it has its result dropped.
    pub fn delete_student(&self, id: Uuid) -> bool {
        let removed = self.inner.repo.remove(id);
        if removed {
            tracing::info!(student_id = %id, "Student deleted");
        }
        removed
    }

    pub async fn sync_student(&self, id: Uuid) -> Result<SyncOutcome> {
        self.sync_one(id).await
    }

    pub fn clear_cache(&self) {
        self.inner.client.clear_cache();
    }

    pub fn is_syncing(&self, id: Uuid) -> bool {
        self.inner.in_flight.lock().contains(&id)
    }

    /// Completed roster syncs, oldest first.
    pub fn sync_history(&self) -> Vec<SyncRun> {
        self.inner.history.lock().iter().cloned().collect()
    }

    pub fn last_sync_run(&self) -> Option<SyncRun> {
        self.inner.history.lock().back().cloned()
    }

    pub async fn sync_one(&self, id: Uuid) -> Result<SyncOutcome> {
        let inner = &*self.inner;
        if !inner.in_flight.lock().insert(id) {
            tracing::debug!(student_id = %id, "Sync already in flight, skipping");
            return Ok(SyncOutcome::AlreadyInFlight);
        }
        let guard = InFlightGuard { inner, id };

        let handle = inner
            .repo
            .modify(id, |record| {
                record.is_data_syncing = true;
                record.handle.clone()
            })
            .ok_or(SyncError::NotFound(id))?;

        tracing::debug!(student_id = %id, handle = %handle, "Syncing student");
        let payload = match inner.fetch_remote(&handle).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(student_id = %id, handle = %handle, error = %err, "Student sync failed");
                return Err(err);
            }
        };

        let now = inner.clock.now();
        let window_days = inner.config.inactivity_days;
        let applied = inner.repo.modify(id, |record| {
            if record.handle != handle {
                return false;
            }
            apply_payload(record, payload, now, window_days);
            true
        });

        match applied {
            Some(true) => {
                tracing::info!(student_id = %id, handle = %handle, "Student synced");
                Ok(SyncOutcome::Synced)
            }
            Some(false) => {
                tracing::info!(student_id = %id, handle = %handle, "Handle changed during sync, result discarded");
                // A re-sync requested meanwhile collapsed into this one; run it now.
                drop(guard);
                self.schedule_sync(id);
                Ok(SyncOutcome::Discarded)
            }
            None => {
                tracing::info!(student_id = %id, "Student deleted during sync, result discarded");
                Ok(SyncOutcome::Discarded)
            }
        }
    }

    /// Syncs every student in roster order, one at a time.
    ///
    /// Failures are logged and do not stop the loop. The run is appended to
    /// [`RosterService::sync_history`].
    pub async fn sync_all(&self) {
        self.run_roster_sync(None).await;
    }

    /// Like [`RosterService::sync_all`], but stops before the next student once `cancel` fires.
    pub async fn sync_all_until(&self, cancel: &CancellationToken) {
        self.run_roster_sync(Some(cancel)).await;
    }

    /// Runs a roster sync now and then every `interval` until `cancel` fires.
    pub fn spawn_auto_sync(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let service = self.clone();
        let interval = interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!("Automatic sync every {:?}", interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => service.sync_all_until(&cancel).await,
                }
            }

            tracing::info!("Automatic sync stopped");
        })
    }

    fn schedule_sync(&self, id: Uuid) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!(student_id = %id, "No async runtime, sync not scheduled");
                return;
            }
        };

        let service = self.clone();
        runtime.spawn(async move {
            if let Err(err) = service.sync_one(id).await {
                tracing::warn!(student_id = %id, error = %err, "Background sync failed");
            }
        });
    }

    async fn run_roster_sync(&self, cancel: Option<&CancellationToken>) -> SyncRun {
        let inner = &*self.inner;
        let started_at = inner.clock.now();
        let roster = inner.repo.list();
        let mut run = SyncRun {
            started_at,
            finished_at: started_at,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        };

        tracing::info!(students = roster.len(), "Starting roster sync");

        for (index, student) in roster.iter().enumerate() {
            if index > 0 {
                match cancel {
                    Some(cancel) => tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = inner.pacer.pause() => {}
                    },
                    None => inner.pacer.pause().await,
                }
            }
            if cancel.is_some_and(|c| c.is_cancelled()) {
                tracing::info!("Roster sync cancelled");
                break;
            }

            run.attempted += 1;
            match self.sync_one(student.id).await {
                Ok(SyncOutcome::Synced) => run.succeeded += 1,
                Ok(_) | Err(SyncError::NotFound(_)) => run.skipped += 1,
                Err(err) => {
                    run.failed += 1;
                    tracing::warn!(
                        student_id = %student.id,
                        name = %student.name,
                        error = %err,
                        "Failed to sync student, continuing"
                    );
                }
            }
        }

        run.finished_at = inner.clock.now();
        tracing::info!(
            attempted = run.attempted,
            succeeded = run.succeeded,
            failed = run.failed,
            skipped = run.skipped,
            cached_responses = inner.client.cached_entries(),
            "Roster sync finished"
        );

        let mut history = inner.history.lock();
        history.push_back(run.clone());
        while history.len() > inner.config.history_limit.max(1) {
            history.pop_front();
        }
        run
    }
}

impl Inner {
    /// Profile, submissions, rating history, in that order. The first failure aborts the rest.
    async fn fetch_remote(&self, handle: &str) -> Result<RemotePayload> {
        let profile = self
            .client
            .fetch_profiles(&[handle.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::RemoteService(format!("no profile returned for {handle}")))?;

        let submissions = self
            .client
            .fetch_submissions(
                handle,
                Some(self.config.submissions_from),
                Some(self.config.submissions_count),
            )
            .await?;

        let rating_history = self.client.fetch_rating_history(handle).await?;

        Ok(RemotePayload {
            profile,
            submissions,
            rating_history,
        })
    }
}

fn apply_payload(
    record: &mut StudentRecord,
    payload: RemotePayload,
    now: chrono::DateTime<chrono::Utc>,
    window_days: i64,
) {
    record.current_rating = payload.profile.rating;
    record.max_rating = payload.profile.max_rating;

    if let Some(last) = activity::last_submission_at(&payload.submissions) {
        record.last_submission_at = Some(last);
    }

    let status = activity::evaluate(
        &payload.submissions,
        now,
        window_days,
        record.inactivity_detected_at,
    );
    record.is_inactive = status.is_inactive;
    record.inactivity_detected_at = status.inactivity_detected_at;
    record.last_data_sync = Some(now);
    record.remote_data = Some(payload);
}
