use std::fmt::Display;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::services::integrity::IntegrityConfig;
use crate::services::live_sync::{
    parse_client_message, LiveContext, LiveSession, ServerMessage, StatusMessage,
};

/// Upgrades into the live sync channel. The attempt is loaded before the
/// upgrade so finished or missing attempts get a regular HTTP error.
pub(super) async fn live_channel(
    Path(exam_id): Path<i64>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let integrity = IntegrityConfig::from(state.settings().integrity());
    let session =
        LiveSession::open(state.store(), exam_id, student.id, integrity, primitive_now_utc())
            .await?;

    let key = session.key();
    let span = tracing::info_span!(
        "live",
        connection_id = %Uuid::new_v4(),
        exam_id = key.exam_id,
        student_id = key.student_id
    );

    Ok(ws.on_upgrade(move |socket| run_channel(socket, state, session).instrument(span)))
}

async fn run_channel(socket: WebSocket, state: AppState, session: LiveSession) {
    let (sender, receiver) = socket.split();

    metrics::gauge!("live_connections").increment(1.0);
    tracing::info!("Live channel opened");

    let reason = serve_session(receiver, sender, &state, session).await;

    metrics::gauge!("live_connections").decrement(1.0);
    tracing::info!(reason, "Live channel closed");
}

/// Drives one live session until the client leaves, the heartbeat grace runs
/// out, the server shuts down or the attempt is finished. Returns the reason.
/// The attempt row is only touched by submit or expiry, never by teardown.
async fn serve_session<R, W>(
    mut receiver: R,
    mut sender: W,
    state: &AppState,
    mut session: LiveSession,
) -> &'static str
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let ctx = LiveContext { store: state.store(), violations: state.violations() };
    let live = state.settings().live();
    let grace = Duration::from_secs(live.heartbeat_grace_seconds);
    let mut ticker = interval(Duration::from_millis(live.tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = state.shutdown();
    let mut last_seen = Instant::now();

    let reason = loop {
        let replies = tokio::select! {
            _ = ticker.tick() => {
                if last_seen.elapsed() > grace {
                    break "heartbeat timeout";
                }
                session.tick(&ctx, primitive_now_utc()).await
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    last_seen = Instant::now();
                    match parse_client_message(&text) {
                        Ok(message) => session.handle(&ctx, message, primitive_now_utc()).await,
                        Err(err) => {
                            tracing::debug!(error = %err, "Unreadable live message");
                            vec![StatusMessage::error(format!("invalid message: {err}")).into()]
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    vec![StatusMessage::error("binary frames are not supported").into()]
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    last_seen = Instant::now();
                    Vec::new()
                }
                Some(Ok(Message::Close(_))) | None => break "client closed",
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "Live transport error");
                    break "transport error";
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break "server shutdown";
                }
                Vec::new()
            }
        };

        if let Err(err) = send_all(&mut sender, &replies).await {
            tracing::debug!(error = %err, "Live channel send failed");
            break "send failed";
        }
        if session.is_finished() {
            break "attempt finished";
        }
    };

    session.close(&ctx, primitive_now_utc()).await;
    if let Err(err) = sender.send(Message::Close(None)).await {
        tracing::debug!(error = %err, "Live channel close frame not delivered");
    }

    reason
}

async fn send_all<W>(sender: &mut W, replies: &[ServerMessage]) -> Result<(), W::Error>
where
    W: Sink<Message> + Unpin,
{
    for reply in replies {
        match serde_json::to_string(reply) {
            Ok(text) => sender.send(Message::Text(text)).await?,
            Err(err) => tracing::warn!(error = %err, "Failed to encode live message"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::channel::mpsc;
    use serde_json::{json, Value};
    use tokio::sync::{watch, OwnedMutexGuard};

    use super::*;
    use crate::core::config::{Settings, ShortfallPolicy};
    use crate::db::types::AttemptStatus;
    use crate::services::session_machine::start_or_resume;
    use crate::services::store::ExamStore;
    use crate::test_support::{self, MemoryStore};

    type Incoming = mpsc::UnboundedSender<Result<Message, axum::Error>>;

    struct Channel {
        state: AppState,
        store: Arc<MemoryStore>,
        shutdown: watch::Sender<bool>,
        exam_id: i64,
        _guard: OwnedMutexGuard<()>,
    }

    impl Channel {
        /// Student 9 with a fresh 60 minute attempt, clocked from the wall clock
        /// the session itself reads.
        async fn started() -> Self {
            let guard = test_support::env_lock().await;
            test_support::set_test_env();
            let settings = Settings::load().expect("settings");
            let (state, store, shutdown) = test_support::build_state(settings);

            let now = primitive_now_utc();
            let exam = store.add_exam(test_support::exam(
                1,
                1,
                now - time::Duration::minutes(1),
                now + time::Duration::hours(2),
                60,
            ));
            start_or_resume(
                store.as_ref(),
                store.as_ref(),
                ShortfallPolicy::Fail,
                exam.id,
                &test_support::student(9),
                now,
            )
            .await
            .expect("start");

            Self { state, store, shutdown, exam_id: exam.id, _guard: guard }
        }

        async fn serve(&self, client: Vec<Message>) -> (&'static str, Vec<Message>, Incoming) {
            let session = LiveSession::open(
                self.store.as_ref(),
                self.exam_id,
                9,
                test_support::integrity(),
                primitive_now_utc(),
            )
            .await
            .expect("open");

            let (incoming_tx, incoming) = mpsc::unbounded::<Result<Message, axum::Error>>();
            for message in client {
                incoming_tx.unbounded_send(Ok(message)).expect("queue client frame");
            }
            let (outgoing, frames) = mpsc::unbounded::<Message>();

            let reason = serve_session(incoming, outgoing, &self.state, session).await;
            (reason, frames.collect().await, incoming_tx)
        }

        async fn status(&self) -> AttemptStatus {
            self.store.find_attempt(self.exam_id, 9).await.unwrap().expect("attempt").status
        }
    }

    fn json_frames(frames: &[Message]) -> Vec<Value> {
        frames
            .iter()
            .filter_map(|frame| match frame {
                Message::Text(text) => serde_json::from_str(text).ok(),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_is_dropped_after_grace_and_attempt_survives() {
        let channel = Channel::started().await;

        let (reason, frames, _client) = channel.serve(Vec::new()).await;

        assert_eq!(reason, "heartbeat timeout");
        let ticks = json_frames(&frames).iter().filter(|value| value.is_i64()).count();
        let grace = channel.state.settings().live().heartbeat_grace_seconds as usize;
        assert!(ticks >= grace, "expected a tick per second, got {ticks}");
        assert!(matches!(frames.last(), Some(Message::Close(None))));
        assert_eq!(channel.status().await, AttemptStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_exam_acknowledges_and_ends_the_channel() {
        let channel = Channel::started().await;
        let submit = Message::Text(r#"{"Action":"SubmitExam"}"#.to_string());

        let (reason, frames, _client) = channel.serve(vec![submit]).await;

        assert_eq!(reason, "attempt finished");
        assert!(json_frames(&frames).contains(&json!({"status": "submitted"})));
        assert!(matches!(frames.last(), Some(Message::Close(None))));
        assert_eq!(channel.status().await, AttemptStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn server_shutdown_closes_without_finishing_the_attempt() {
        let channel = Channel::started().await;
        channel.shutdown.send_replace(true);

        let (reason, frames, _client) = channel.serve(Vec::new()).await;

        assert_eq!(reason, "server shutdown");
        assert!(matches!(frames.last(), Some(Message::Close(None))));
        assert_eq!(channel.status().await, AttemptStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn client_close_leaves_the_attempt_in_progress() {
        let channel = Channel::started().await;

        let (reason, _frames, _client) = channel.serve(vec![Message::Close(None)]).await;

        assert_eq!(reason, "client closed");
        assert_eq!(channel.status().await, AttemptStatus::InProgress);
    }
}
