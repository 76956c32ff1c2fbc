use std::sync::Arc;

use crate::core::redis::RedisHandle;
use crate::core::time::from_unix_millis;
use crate::db::models::ViolationRecord;
use crate::db::types::ViolationType;
use crate::schemas::result::ViolationResponse;
use crate::services::error::EngineError;
use crate::services::integrity::DetectedViolation;
use crate::services::store::{AttemptKey, ExamStore, NewViolation};

/// Append-only sink for integrity violations.
///
/// Rows go to storage first; the Redis stream feed and metrics follow and may
/// fail without affecting the attempt.
#[derive(Clone)]
pub(crate) struct ViolationRecorder {
    store: Arc<dyn ExamStore>,
    redis: RedisHandle,
    left_page_guard_ttl_seconds: u64,
}

impl ViolationRecorder {
    pub(crate) fn new(
        store: Arc<dyn ExamStore>,
        redis: RedisHandle,
        left_page_guard_ttl_seconds: u64,
    ) -> Self {
        Self { store, redis, left_page_guard_ttl_seconds }
    }

    /// Records one violation. `left-page` violations carrying a page id are
    /// claimed first so the live channel and the page-hide beacon never count
    /// the same page twice; a lost claim returns `None`.
    pub(crate) async fn record(
        &self,
        key: AttemptKey,
        detected: &DetectedViolation,
        page_id: Option<&str>,
    ) -> Result<Option<ViolationRecord>, EngineError> {
        if detected.violation_type == ViolationType::LeftPage {
            if let Some(page_id) = page_id {
                if !self.claim_page(key, page_id).await {
                    tracing::debug!(
                        exam_id = key.exam_id,
                        student_id = key.student_id,
                        page_id,
                        "Left-page violation already recorded for this page"
                    );
                    return Ok(None);
                }
            }
        }

        let record = self
            .store
            .append_violation(NewViolation {
                exam_id: key.exam_id,
                student_id: key.student_id,
                violation_type: detected.violation_type,
                source: detected.source.map(|source| source.as_str().to_string()),
                occurred_at: from_unix_millis(detected.occurred_at_ms),
                duration_ms: detected.duration_ms,
            })
            .await?;

        metrics::counter!(
            "integrity_violations_total",
            "type" => detected.violation_type.as_str()
        )
        .increment(1);
        tracing::info!(
            exam_id = key.exam_id,
            student_id = key.student_id,
            violation_type = detected.violation_type.as_str(),
            duration_ms = detected.duration_ms,
            "Integrity violation recorded"
        );

        self.publish(&record).await;

        Ok(Some(record))
    }

    async fn claim_page(&self, key: AttemptKey, page_id: &str) -> bool {
        let guard_key = format!("integrity:left:{}:{}:{}", key.exam_id, key.student_id, page_id);
        match self.redis.claim_once(&guard_key, self.left_page_guard_ttl_seconds).await {
            Ok(claimed) => claimed,
            Err(err) => {
                tracing::warn!(error = %err, "Left-page guard unavailable; recording anyway");
                true
            }
        }
    }

    async fn publish(&self, record: &ViolationRecord) {
        let payload = match serde_json::to_string(&ViolationResponse::from_db(record.clone())) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to encode violation event");
                return;
            }
        };

        if let Err(err) = self.redis.append_violation_event(&payload).await {
            tracing::warn!(error = %err, "Failed to publish violation event");
        }
    }
}
