mod answer;
mod entitlement;
mod filter;
mod ids;
mod plan;
mod question;
mod snapshot;
mod summary;

pub use answer::{AnswerRecord, Selection};
pub use entitlement::{AccountStatus, EntitlementState, ExamGrant};
pub use filter::QuestionFilter;
pub use ids::{ExamId, ParseIdError, QuestionId, UserId};
pub use plan::{PlanError, PlanLimits, PlanTier, QuotaRemaining};
pub use question::{OPTION_COUNT, Question, QuestionError};
pub use snapshot::{SessionSnapshot, SnapshotError};
pub use summary::{QuizSummary, SubjectStat, SummaryError};
