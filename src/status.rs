//! User-facing status notifications.
//!
//! Every camera and offline operation reports its outcome as a single
//! [`StatusNotification`]. The [`StatusBoard`] keeps the most recent one and
//! hides it once [`DEFAULT_STATUS_TIMEOUT`] has elapsed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a notification stays visible (5 seconds).
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_millis(5000);

/// Severity of a status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A status message shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusNotification {
    pub message: String,
    pub severity: Severity,
    /// When the notification was shown
    pub shown_at: Instant,
}

impl StatusNotification {
    /// Whether the notification is still visible at `now`.
    pub fn is_visible_at(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.shown_at) < timeout
    }
}

/// Receives status notifications.
pub trait StatusSink: Send + Sync {
    fn show_status(&self, message: &str, severity: Severity);
}

/// Notifications kept for inspection; older ones are dropped.
pub const HISTORY_LIMIT: usize = 32;

/// Holds the latest notification plus a bounded history for inspection.
#[derive(Debug)]
pub struct StatusBoard {
    timeout: Duration,
    history: Mutex<VecDeque<StatusNotification>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Create a board with the default 5 second timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_STATUS_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The notification visible at `now`, if it has not expired yet.
    pub fn visible_at(&self, now: Instant) -> Option<StatusNotification> {
        self.latest()
            .filter(|n| n.is_visible_at(now, self.timeout))
    }

    /// The notification visible right now.
    pub fn current(&self) -> Option<StatusNotification> {
        self.visible_at(Instant::now())
    }

    /// The most recent notification, expired or not.
    pub fn latest(&self) -> Option<StatusNotification> {
        self.history.lock().ok()?.back().cloned()
    }

    /// The last [`HISTORY_LIMIT`] notifications, oldest first.
    pub fn history(&self) -> Vec<StatusNotification> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatusSink for StatusBoard {
    fn show_status(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => log::warn!("[status:{}] {}", severity, message),
            _ => log::info!("[status:{}] {}", severity, message),
        }
        if let Ok(mut history) = self.history.lock() {
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(StatusNotification {
                message: message.to_string(),
                severity,
                shown_at: Instant::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_is_five_seconds() {
        assert_eq!(DEFAULT_STATUS_TIMEOUT, Duration::from_secs(5));
        assert_eq!(StatusBoard::new().timeout(), DEFAULT_STATUS_TIMEOUT);
    }

    #[test]
    fn test_show_status_records_latest() {
        let board = StatusBoard::new();
        assert!(board.is_empty());

        board.show_status("first", Severity::Info);
        board.show_status("second", Severity::Error);

        let latest = board.latest().unwrap();
        assert_eq!(latest.message, "second");
        assert_eq!(latest.severity, Severity::Error);
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn test_notification_expires_after_timeout() {
        let board = StatusBoard::new();
        board.show_status("hello", Severity::Success);
        let shown_at = board.latest().unwrap().shown_at;

        assert!(board.visible_at(shown_at).is_some());
        assert!(board
            .visible_at(shown_at + Duration::from_millis(4999))
            .is_some());
        assert!(board
            .visible_at(shown_at + Duration::from_millis(5000))
            .is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let board = StatusBoard::new();
        for i in 0..HISTORY_LIMIT + 5 {
            board.show_status(&format!("message {}", i), Severity::Info);
        }

        assert_eq!(board.len(), HISTORY_LIMIT);
        let history = board.history();
        assert_eq!(history[0].message, "message 5");
        assert_eq!(
            board.latest().unwrap().message,
            format!("message {}", HISTORY_LIMIT + 4)
        );
    }

    #[test]
    fn test_severity_names() {
        assert_eq!(Severity::Info.to_string(), "info");
        assert_eq!(Severity::Success.to_string(), "success");
        assert_eq!(Severity::Error.to_string(), "error");
    }
}
