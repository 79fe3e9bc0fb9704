#![forbid(unsafe_code)]

pub mod entitlement;
pub mod error;
pub mod progress_service;
pub mod sessions;

pub use quiz_core::Clock;
pub use sessions as session;

pub use entitlement::{EntitlementAdmin, EntitlementResolver};
pub use error::{AdminError, SessionError};
pub use progress_service::ProgressService;

pub use sessions::{
    AdvanceOutcome, AdvanceResult, CountdownFired, ExplanationAccess, QuestionCountdown,
    QuizLoopService, QuizPhase, QuizSession, SessionProgress, SessionResume, SessionStart,
    WorkingSet, WorkingSetBuilder,
};
