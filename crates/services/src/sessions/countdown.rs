//! Cancellable per-question countdown.
//!
//! One scheduled task at a time: arming replaces (never stacks) the
//! previous task, and confirming cancels it. Exactly-once expiry is
//! guaranteed by cancellation here plus the state machine's phase check:
//! a fire that loses the race against a confirm carries a question index
//! the controller discards as stale.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Event sent when a countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownFired {
    pub question_index: usize,
}

/// Owns the single scheduled expiry task for the active question.
#[derive(Debug, Default)]
pub struct QuestionCountdown {
    handle: Option<JoinHandle<()>>,
}

impl QuestionCountdown {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an expiry for `question_index` after `budget`, replacing
    /// any pending countdown.
    pub fn arm(
        &mut self,
        question_index: usize,
        budget: Duration,
        events: UnboundedSender<CountdownFired>,
    ) {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            let _ = events.send(CountdownFired { question_index });
        }));
    }

    /// Abort the pending countdown, if any. Mandatory on confirm.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// True while an expiry is scheduled.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for QuestionCountdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
