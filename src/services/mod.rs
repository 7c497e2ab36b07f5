pub mod attempt_manager;
pub mod draft_store;
pub mod feedback_board;
pub mod persistence;

pub use attempt_manager::{AttemptManager, AttemptPhase, AttemptTransition};
pub use draft_store::{DraftChange, DraftSnapshot, DraftStore};
pub use feedback_board::{FeedbackBoard, FeedbackSnapshot, PollPhase};
pub use persistence::{PersistenceScheduler, SaveStatus};
