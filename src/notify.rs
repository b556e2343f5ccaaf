//! Per-job notification lifecycle.
//!
//! [`NotificationManager`] keeps at most one live handle per job. Progress
//! updates replace the previous handle; a terminal outcome shows exactly one
//! final notification and seals the job so later updates are no-ops.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NotificationHandle(Uuid);

impl NotificationHandle {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationLevel {
    Progress,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub job_id: String,
    pub level: NotificationLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    Succeeded(String),
    Failed(String),
    Cancelled(String),
}

impl TerminalOutcome {
    fn into_notification(self, job_id: &str) -> Notification {
        let (level, message) = match self {
            TerminalOutcome::Succeeded(msg) => (NotificationLevel::Success, msg),
            TerminalOutcome::Failed(msg) => (NotificationLevel::Failure, msg),
            TerminalOutcome::Cancelled(msg) => (NotificationLevel::Failure, msg),
        };
        Notification {
            job_id: job_id.to_string(),
            level,
            message,
        }
    }
}

/// Display surface for notifications.
pub trait Notifier: Send + Sync {
    fn show(&self, handle: NotificationHandle, notification: &Notification);
    fn dismiss(&self, handle: NotificationHandle);
}

/// Renders notifications as log lines.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, _handle: NotificationHandle, notification: &Notification) {
        match notification.level {
            NotificationLevel::Progress => {
                tracing::info!(job_id = %notification.job_id, "{}", notification.message)
            }
            NotificationLevel::Success => {
                tracing::info!(job_id = %notification.job_id, "✔ {}", notification.message)
            }
            NotificationLevel::Failure => {
                tracing::warn!(job_id = %notification.job_id, "✘ {}", notification.message)
            }
        }
    }

    fn dismiss(&self, _handle: NotificationHandle) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifierCall {
    Show(NotificationHandle, Notification),
    Dismiss(NotificationHandle),
}

/// Notifier that records every call, for assertions in tests.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<NotifierCall>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Notifications shown for `job_id`, in order.
    pub fn shown_for(&self, job_id: &str) -> Vec<Notification> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                NotifierCall::Show(_, n) if n.job_id == job_id => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn terminal_count(&self, job_id: &str) -> usize {
        self.shown_for(job_id)
            .iter()
            .filter(|n| n.level != NotificationLevel::Progress)
            .count()
    }

    /// The largest number of simultaneously live handles for `job_id` seen
    /// over the recorded history.
    pub fn max_live(&self, job_id: &str) -> usize {
        let mut live: HashSet<NotificationHandle> = HashSet::new();
        let mut owned: HashSet<NotificationHandle> = HashSet::new();
        let mut max = 0;
        for call in self.calls() {
            match call {
                NotifierCall::Show(handle, n) if n.job_id == job_id => {
                    owned.insert(handle);
                    live.insert(handle);
                }
                NotifierCall::Dismiss(handle) if owned.contains(&handle) => {
                    live.remove(&handle);
                }
                _ => {}
            }
            max = max.max(live.len());
        }
        max
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, handle: NotificationHandle, notification: &Notification) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(NotifierCall::Show(handle, notification.clone()));
    }

    fn dismiss(&self, handle: NotificationHandle) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(NotifierCall::Dismiss(handle));
    }
}

#[derive(Default)]
struct NotifyState {
    live: HashMap<String, NotificationHandle>,
    finished: HashSet<String>,
}

pub struct NotificationManager {
    notifier: Arc<dyn Notifier>,
    state: Mutex<NotifyState>,
}

impl NotificationManager {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            state: Mutex::new(NotifyState::default()),
        }
    }

    /// Open the first notification for a job.
    pub fn open(&self, job_id: &str, message: &str) -> Option<NotificationHandle> {
        self.update(job_id, message)
    }

    /// Replace the job's live notification. Returns `None` once the job has
    /// been sealed by [`finish`](NotificationManager::finish).
    pub fn update(&self, job_id: &str, message: &str) -> Option<NotificationHandle> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.finished.contains(job_id) {
            return None;
        }
        if let Some(previous) = state.live.remove(job_id) {
            self.notifier.dismiss(previous);
        }
        let handle = NotificationHandle::new();
        self.notifier.show(
            handle,
            &Notification {
                job_id: job_id.to_string(),
                level: NotificationLevel::Progress,
                message: message.to_string(),
            },
        );
        state.live.insert(job_id.to_string(), handle);
        Some(handle)
    }

    /// Show the single final notification and seal the job. Returns false if
    /// the job was already sealed.
    pub fn finish(&self, job_id: &str, outcome: TerminalOutcome) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.finished.insert(job_id.to_string()) {
            return false;
        }
        if let Some(previous) = state.live.remove(job_id) {
            self.notifier.dismiss(previous);
        }
        self.notifier
            .show(NotificationHandle::new(), &outcome.into_notification(job_id));
        true
    }

    /// Dismiss the live handle without a final notification.
    pub fn retire(&self, job_id: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.live.remove(job_id) {
            Some(handle) => {
                self.notifier.dismiss(handle);
                true
            }
            None => false,
        }
    }

    /// Dismiss every live handle and forget sealed jobs.
    pub fn retire_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in state.live.drain() {
            self.notifier.dismiss(handle);
        }
        state.finished.clear();
    }

    pub fn live_handle(&self, job_id: &str) -> Option<NotificationHandle> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.live.get(job_id).copied()
    }

    pub fn is_finished(&self, job_id: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.finished.contains(job_id)
    }
}
