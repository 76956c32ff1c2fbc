//! Per-connection integrity state driven by client focus, fullscreen and
//! page-lifecycle signals.
//!
//! The monitor never blocks the exam. It only reports what to record, which
//! alert to display and whether the fullscreen gate is open. Every qualifying
//! violation is recorded even when its alert is suppressed by the cooldown or
//! queued behind the gate. Timestamps are server milliseconds.

use std::collections::VecDeque;

use serde::Deserialize;

use crate::core::config::IntegritySettings;
use crate::db::types::ViolationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub(crate) enum IntegritySignal {
    FocusLost,
    FocusRegained,
    FullscreenEntered,
    FullscreenExited,
    PageHidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FocusSource {
    Visibility,
    Window,
}

impl FocusSource {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Visibility => "visibility",
            Self::Window => "window",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IntegrityConfig {
    pub(crate) focus_loss_threshold_ms: i64,
    pub(crate) alert_cooldown_ms: i64,
    pub(crate) fullscreen_required: bool,
}

impl From<&IntegritySettings> for IntegrityConfig {
    fn from(settings: &IntegritySettings) -> Self {
        Self {
            focus_loss_threshold_ms: settings.focus_loss_threshold_ms,
            alert_cooldown_ms: settings.alert_cooldown_ms,
            fullscreen_required: settings.fullscreen_required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DetectedViolation {
    pub(crate) violation_type: ViolationType,
    pub(crate) source: Option<FocusSource>,
    pub(crate) occurred_at_ms: i64,
    pub(crate) duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IntegrityEvent {
    Violation(DetectedViolation),
    Alert(ViolationType),
    Gate { open: bool },
}

#[derive(Debug, Clone, Copy)]
struct FocusEpisode {
    started_ms: i64,
    source: FocusSource,
    alerted: bool,
}

#[derive(Debug)]
pub(crate) struct IntegrityMonitor {
    config: IntegrityConfig,
    focus_episode: Option<FocusEpisode>,
    in_fullscreen: bool,
    gated: bool,
    page_left: bool,
    last_alert_ms: Option<i64>,
    queued_alerts: VecDeque<ViolationType>,
}

impl IntegrityMonitor {
    pub(crate) fn new(config: IntegrityConfig) -> Self {
        Self {
            config,
            focus_episode: None,
            in_fullscreen: false,
            gated: false,
            page_left: false,
            last_alert_ms: None,
            queued_alerts: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_gated(&self) -> bool {
        self.gated
    }

    pub(crate) fn observe(
        &mut self,
        signal: IntegritySignal,
        source: Option<FocusSource>,
        now_ms: i64,
    ) -> Vec<IntegrityEvent> {
        let mut events = Vec::new();

        match signal {
            IntegritySignal::FocusLost => {
                // One episode at a time; blur after hide is the same absence.
                if self.focus_episode.is_none() {
                    self.focus_episode = Some(FocusEpisode {
                        started_ms: now_ms,
                        source: source.unwrap_or(FocusSource::Visibility),
                        alerted: false,
                    });
                }
            }
            IntegritySignal::FocusRegained => {
                if let Some(episode) = self.focus_episode.take() {
                    if let Some(violation) = self.close_episode(episode, now_ms) {
                        events.push(IntegrityEvent::Violation(violation));
                        if !episode.alerted {
                            self.alert(ViolationType::FocusLoss, now_ms, &mut events);
                        }
                    }
                }
            }
            IntegritySignal::FullscreenEntered => {
                self.in_fullscreen = true;
                if self.gated {
                    self.gated = false;
                    events.push(IntegrityEvent::Gate { open: true });
                    while let Some(queued) = self.queued_alerts.pop_front() {
                        events.push(IntegrityEvent::Alert(queued));
                        self.last_alert_ms = Some(now_ms);
                    }
                }
            }
            IntegritySignal::FullscreenExited => {
                let was_fullscreen = std::mem::replace(&mut self.in_fullscreen, false);
                if self.config.fullscreen_required && was_fullscreen {
                    events.push(IntegrityEvent::Violation(DetectedViolation {
                        violation_type: ViolationType::FullscreenExit,
                        source: None,
                        occurred_at_ms: now_ms,
                        duration_ms: None,
                    }));
                    if !self.gated {
                        self.gated = true;
                        events.push(IntegrityEvent::Gate { open: false });
                    }
                }
            }
            IntegritySignal::PageHidden => {
                if !self.page_left {
                    self.page_left = true;
                    events.push(IntegrityEvent::Violation(DetectedViolation {
                        violation_type: ViolationType::LeftPage,
                        source: None,
                        occurred_at_ms: now_ms,
                        duration_ms: None,
                    }));
                    self.alert(ViolationType::LeftPage, now_ms, &mut events);
                }
            }
        }

        events
    }

    /// Called on every timer tick. Alerts as soon as an open focus episode
    /// crosses the threshold; the violation itself is recorded when the
    /// episode ends so it carries the full duration.
    pub(crate) fn poll(&mut self, now_ms: i64) -> Vec<IntegrityEvent> {
        let mut events = Vec::new();

        let crossed = match self.focus_episode.as_mut() {
            Some(episode) if !episode.alerted => {
                let away_ms = now_ms - episode.started_ms;
                if away_ms > self.config.focus_loss_threshold_ms {
                    episode.alerted = true;
                    true
                } else {
                    false
                }
            }
            _ => false,
        };

        if crossed {
            self.alert(ViolationType::FocusLoss, now_ms, &mut events);
        }

        events
    }

    /// Flushes an episode still open when the connection goes away.
    pub(crate) fn finish(&mut self, now_ms: i64) -> Vec<IntegrityEvent> {
        self.focus_episode
            .take()
            .and_then(|episode| self.close_episode(episode, now_ms))
            .map(IntegrityEvent::Violation)
            .into_iter()
            .collect()
    }

    fn close_episode(&self, episode: FocusEpisode, now_ms: i64) -> Option<DetectedViolation> {
        let duration_ms = now_ms - episode.started_ms;
        if duration_ms <= self.config.focus_loss_threshold_ms {
            return None;
        }

        Some(DetectedViolation {
            violation_type: ViolationType::FocusLoss,
            source: Some(episode.source),
            occurred_at_ms: episode.started_ms,
            duration_ms: Some(duration_ms),
        })
    }

    fn alert(
        &mut self,
        violation_type: ViolationType,
        now_ms: i64,
        events: &mut Vec<IntegrityEvent>,
    ) {
        if self.gated {
            self.queued_alerts.push_back(violation_type);
            return;
        }

        if let Some(last) = self.last_alert_ms {
            if now_ms - last < self.config.alert_cooldown_ms {
                tracing::debug!(
                    violation_type = violation_type.as_str(),
                    "Integrity alert suppressed by cooldown"
                );
                return;
            }
        }

        self.last_alert_ms = Some(now_ms);
        events.push(IntegrityEvent::Alert(violation_type));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> IntegrityMonitor {
        IntegrityMonitor::new(IntegrityConfig {
            focus_loss_threshold_ms: 5000,
            alert_cooldown_ms: 2000,
            fullscreen_required: true,
        })
    }

    fn violations(events: &[IntegrityEvent]) -> Vec<&DetectedViolation> {
        events
            .iter()
            .filter_map(|event| match event {
                IntegrityEvent::Violation(violation) => Some(violation),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn long_focus_loss_records_one_violation_with_duration() {
        let mut monitor = monitor();
        let mut events = monitor.observe(IntegritySignal::FocusLost, Some(FocusSource::Window), 0);
        let second_blur = Some(FocusSource::Visibility);
        events.extend(monitor.observe(IntegritySignal::FocusLost, second_blur, 500));
        events.extend(monitor.poll(5500));
        events.extend(monitor.poll(5800));
        events.extend(monitor.observe(IntegritySignal::FocusRegained, None, 6000));

        let recorded = violations(&events);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].violation_type, ViolationType::FocusLoss);
        assert_eq!(recorded[0].duration_ms, Some(6000));
        assert_eq!(recorded[0].source, Some(FocusSource::Window));
        assert_eq!(
            events.iter().filter(|e| matches!(e, IntegrityEvent::Alert(_))).count(),
            1
        );
    }

    #[test]
    fn short_focus_loss_records_nothing() {
        let mut monitor = monitor();
        let mut events = monitor.observe(IntegritySignal::FocusLost, None, 10_000);
        events.extend(monitor.poll(11_000));
        events.extend(monitor.observe(IntegritySignal::FocusRegained, None, 12_000));

        assert!(events.is_empty());
    }

    #[test]
    fn tick_past_threshold_alerts_without_recording() {
        let mut monitor = monitor();
        monitor.observe(IntegritySignal::FocusLost, None, 0);

        let ticked = monitor.poll(5_500);

        assert_eq!(ticked, vec![IntegrityEvent::Alert(ViolationType::FocusLoss)]);
        assert!(violations(&ticked).is_empty());
    }

    #[test]
    fn open_episode_is_recorded_when_the_connection_ends() {
        let mut monitor = monitor();
        monitor.observe(IntegritySignal::FocusLost, Some(FocusSource::Visibility), 0);

        let events = monitor.finish(7_500);

        assert_eq!(violations(&events)[0].duration_ms, Some(7_500));
        assert!(monitor.finish(9_000).is_empty());
    }

    #[test]
    fn cooldown_suppresses_alerts_but_not_recording() {
        let mut monitor = monitor();
        let mut events = monitor.observe(IntegritySignal::FocusLost, None, 0);
        events.extend(monitor.observe(IntegritySignal::FocusRegained, None, 6000));
        events.extend(monitor.observe(IntegritySignal::PageHidden, None, 6500));

        assert_eq!(violations(&events).len(), 2);
        let alerts = events
            .iter()
            .filter(|e| matches!(e, IntegrityEvent::Alert(_)))
            .collect::<Vec<_>>();
        assert_eq!(alerts, vec![&IntegrityEvent::Alert(ViolationType::FocusLoss)]);
    }

    #[test]
    fn page_hidden_counts_once_per_page() {
        let mut monitor = monitor();
        let mut events = monitor.observe(IntegritySignal::PageHidden, None, 0);
        events.extend(monitor.observe(IntegritySignal::PageHidden, None, 10));
        events.extend(monitor.observe(IntegritySignal::PageHidden, None, 5000));

        assert_eq!(violations(&events).len(), 1);
    }

    #[test]
    fn fullscreen_exit_gates_and_flushes_queued_alerts_in_order() {
        let mut monitor = monitor();
        assert!(monitor.observe(IntegritySignal::FullscreenEntered, None, 0).is_empty());

        let exit = monitor.observe(IntegritySignal::FullscreenExited, None, 1000);
        assert_eq!(violations(&exit)[0].violation_type, ViolationType::FullscreenExit);
        assert!(exit.contains(&IntegrityEvent::Gate { open: false }));
        assert!(monitor.is_gated());

        assert!(monitor.observe(IntegritySignal::FullscreenExited, None, 1100).is_empty());

        monitor.observe(IntegritySignal::FocusLost, None, 1200);
        let focus = monitor.observe(IntegritySignal::FocusRegained, None, 7300);
        let page = monitor.observe(IntegritySignal::PageHidden, None, 7400);
        assert_eq!(violations(&focus).len(), 1);
        assert_eq!(violations(&page).len(), 1);
        assert!(!focus.iter().chain(page.iter()).any(|e| matches!(e, IntegrityEvent::Alert(_))));

        let reenter = monitor.observe(IntegritySignal::FullscreenEntered, None, 8000);
        assert_eq!(
            reenter,
            vec![
                IntegrityEvent::Gate { open: true },
                IntegrityEvent::Alert(ViolationType::FocusLoss),
                IntegrityEvent::Alert(ViolationType::LeftPage),
            ]
        );
        assert!(!monitor.is_gated());
    }

    #[test]
    fn fullscreen_rules_apply_only_when_required_and_previously_entered() {
        let mut monitor = monitor();
        assert!(monitor.observe(IntegritySignal::FullscreenExited, None, 0).is_empty());

        let mut relaxed = IntegrityMonitor::new(IntegrityConfig {
            focus_loss_threshold_ms: 5000,
            alert_cooldown_ms: 2000,
            fullscreen_required: false,
        });
        relaxed.observe(IntegritySignal::FullscreenEntered, None, 0);
        assert!(relaxed.observe(IntegritySignal::FullscreenExited, None, 10).is_empty());
        assert!(!relaxed.is_gated());
    }
}
