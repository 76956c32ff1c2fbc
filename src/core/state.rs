use std::sync::Arc;

use tokio::sync::watch;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::store::{ExamStore, QuestionBank};
use crate::services::violations::ViolationRecorder;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn ExamStore>,
    bank: Arc<dyn QuestionBank>,
    redis: RedisHandle,
    violations: ViolationRecorder,
    shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn ExamStore>,
        bank: Arc<dyn QuestionBank>,
        redis: RedisHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let violations = ViolationRecorder::new(
            store.clone(),
            redis.clone(),
            settings.integrity().left_page_guard_ttl_seconds,
        );
        Self { inner: Arc::new(InnerState { settings, store, bank, redis, violations, shutdown }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn ExamStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn bank(&self) -> &dyn QuestionBank {
        self.inner.bank.as_ref()
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn violations(&self) -> &ViolationRecorder {
        &self.inner.violations
    }

    /// Flips to `true` once the process starts shutting down.
    pub(crate) fn shutdown(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.clone()
    }
}
