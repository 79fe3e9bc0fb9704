mod countdown;
mod machine;
mod plan;
mod progress;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use countdown::{CountdownFired, QuestionCountdown};
pub use machine::{AdvanceOutcome, QuizPhase, QuizSession};
pub use plan::{WorkingSet, WorkingSetBuilder};
pub use progress::SessionProgress;
pub use workflow::{
    AdvanceResult, ExplanationAccess, QuizLoopService, SessionResume, SessionStart,
};
