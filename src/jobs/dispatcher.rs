//! Job dispatcher
//!
//! Jobs are submitted, then `run` hands every created job to a pool of
//! worker threads. Workers only compute: they report back over a channel
//! and the dispatching thread is the single publisher into the result
//! slots. Subprocess output goes through the same publish path as
//! in-process results.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use lens_protocol::JobResponse;

use super::state::JobRecord;
use super::{ExecutionMode, Job, JobCommand, JobError, JobId, JobState};
use crate::config::EffectiveConfig;

/// Published results keyed by job id
#[derive(Debug)]
pub struct ResultSlots<T> {
    slots: HashMap<JobId, Result<T, JobError>>,
}

impl<T> Default for ResultSlots<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<T> ResultSlots<T> {
    fn insert(&mut self, id: JobId, result: Result<T, JobError>) -> Result<(), JobError> {
        if self.slots.contains_key(&id) {
            return Err(JobError::AlreadyCompleted(id));
        }
        self.slots.insert(id, result);
        Ok(())
    }

    pub fn take(&mut self, id: &JobId) -> Option<Result<T, JobError>> {
        self.slots.remove(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

struct Entry<J> {
    job: Arc<J>,
    record: JobRecord,
}

enum Message<T> {
    Started(JobId, ExecutionMode),
    Finished(JobId, Result<T, JobError>),
}

pub struct Dispatcher<J: Job> {
    preference: ExecutionMode,
    workers: usize,
    order: Vec<JobId>,
    jobs: HashMap<JobId, Entry<J>>,
    slots: ResultSlots<J::Output>,
}

impl<J: Job> Dispatcher<J> {
    pub fn new(preference: ExecutionMode, workers: usize) -> Self {
        Self {
            preference,
            workers: workers.max(1),
            order: Vec::new(),
            jobs: HashMap::new(),
            slots: ResultSlots::default(),
        }
    }

    pub fn from_config(config: &EffectiveConfig) -> Self {
        Self::new(config.settings.jobs.mode, config.settings.jobs.workers)
    }

    pub fn submit(&mut self, job: J) -> JobId {
        let id = JobId::new();
        self.order.push(id.clone());
        self.jobs.insert(
            id.clone(),
            Entry {
                job: Arc::new(job),
                record: JobRecord::new(id.clone()),
            },
        );
        id
    }

    pub fn state(&self, id: &JobId) -> Option<JobState> {
        self.jobs.get(id).map(|entry| entry.record.state)
    }

    pub fn record(&self, id: &JobId) -> Option<&JobRecord> {
        self.jobs.get(id).map(|entry| &entry.record)
    }

    /// Preferred mode if the job supports it, otherwise the other one.
    pub fn select_mode(&self, job: &J) -> Result<ExecutionMode, JobError> {
        let capabilities = job.capabilities();
        [self.preference, self.preference.other()]
            .into_iter()
            .find(|mode| capabilities.supports(mode.capability()))
            .ok_or(JobError::NoExecutionMode)
    }

    /// Publish the outcome of a job. A second publish for the same job is
    /// rejected with `AlreadyCompleted`.
    pub fn publish(&mut self, id: &JobId, result: Result<J::Output, JobError>) -> Result<(), JobError> {
        let entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobError::UnknownJob(id.clone()))?;
        if entry.record.is_terminal() {
            return Err(JobError::AlreadyCompleted(id.clone()));
        }

        let target = if result.is_ok() {
            JobState::Completed
        } else {
            JobState::Failed
        };
        entry.record.transition(target)?;
        self.slots.insert(id.clone(), result)
    }

    /// Remove and return a published result.
    pub fn take_result(&mut self, id: &JobId) -> Option<Result<J::Output, JobError>> {
        self.slots.take(id)
    }

    /// Run every created job to completion.
    pub fn run(&mut self) -> Result<(), JobError> {
        let mut queue = VecDeque::new();

        let created: Vec<JobId> = self
            .order
            .iter()
            .filter(|id| self.state(id) == Some(JobState::Created))
            .cloned()
            .collect();

        for id in created {
            let Some(entry) = self.jobs.get_mut(&id) else {
                continue;
            };
            entry.record.transition(JobState::Dispatched)?;
            let job = Arc::clone(&entry.job);

            match self.select_mode(&job) {
                Ok(mode) => {
                    tracing::debug!(job_id = %id, %mode, "dispatching job");
                    queue.push_back((id, job, mode));
                }
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "job cannot be executed");
                    self.publish(&id, Err(e))?;
                }
            }
        }

        if queue.is_empty() {
            return Ok(());
        }

        let worker_count = self.workers.min(queue.len());
        let queue = Mutex::new(queue);
        let (tx, rx) = mpsc::channel::<Message<J::Output>>();

        thread::scope(|scope| -> Result<(), JobError> {
            for _ in 0..worker_count {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || loop {
                    let next = match queue.lock() {
                        Ok(mut guard) => guard.pop_front(),
                        Err(poisoned) => poisoned.into_inner().pop_front(),
                    };
                    let Some((id, job, mode)) = next else {
                        break;
                    };
                    if tx.send(Message::Started(id.clone(), mode)).is_err() {
                        break;
                    }
                    let result = execute(job.as_ref(), mode);
                    if tx.send(Message::Finished(id, result)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for message in rx {
                match message {
                    Message::Started(id, mode) => {
                        if let Some(entry) = self.jobs.get_mut(&id) {
                            entry.record.transition(JobState::Running(mode))?;
                        }
                    }
                    Message::Finished(id, result) => {
                        if let Err(e) = &result {
                            tracing::warn!(job_id = %id, error = %e, "job failed");
                        }
                        self.publish(&id, result)?;
                    }
                }
            }
            Ok(())
        })
    }
}

fn execute<J: Job>(job: &J, mode: ExecutionMode) -> Result<J::Output, JobError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match mode {
        ExecutionMode::InProcess => job.start(),
        ExecutionMode::Subprocess => job.command().and_then(|command| run_subprocess::<J::Output>(&command)),
    }));

    outcome.unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(JobError::Panicked(message))
    })
}

/// Run a job command and decode its envelope.
fn run_subprocess<T: serde::de::DeserializeOwned>(command: &JobCommand) -> Result<T, JobError> {
    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &command.working_dir {
        process.current_dir(dir);
    }

    let output = process.output().map_err(|source| JobError::Spawn {
        program: command.program.clone(),
        source,
    })?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    let envelope = JobResponse::from_output(&stdout);
    if !output.status.success() {
        if let Ok(response) = envelope {
            if let Ok(Err(remote)) = response.into_result::<T>() {
                return Err(JobError::Remote(remote));
            }
        }
        return Err(JobError::ExitStatus {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    match envelope?.into_result::<T>()? {
        Ok(payload) => Ok(payload),
        Err(remote) => Err(JobError::Remote(remote)),
    }
}
