pub mod answer_key;
pub mod assessment;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod report;
pub mod roster;
pub mod session;

pub use error::{GradeError, Result};
pub use models::{
    AnswerKey, Application, AssessmentRow, Config, RosterRecord, SectionId, StudentInfo,
};
pub use session::{GradingOutcome, GradingSession, Upload};
