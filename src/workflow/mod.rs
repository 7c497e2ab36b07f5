pub mod feedback_poll;
pub mod prefill_flow;
pub mod submit_flow;

pub use feedback_poll::{FeedbackPoller, PollHandle, PollOutcome};
pub use prefill_flow::{PrefillPreview, PrefillReconciler, PrefillReport, PreviousAttempt};
pub use submit_flow::{
    NextStep, SubmissionOrchestrator, SubmissionOutcome, SubmitAttempt, SubmitCheck,
    UnansweredQuestion,
};
