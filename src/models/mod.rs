pub mod answer;
pub mod feedback;
pub mod question;
pub mod session;
pub mod status;

pub use answer::{is_blank, DraftAnswer, Origin, SubmittedAnswer};
pub use feedback::{FeedbackItem, QuestionFeedback};
pub use question::{Question, QuestionKind};
pub use session::SessionCtx;
pub use status::{FeedbackStatus, SubmissionStatus, SubmitTestResponse};
