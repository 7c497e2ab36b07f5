pub mod backend;
pub mod http_backend;

pub use backend::{Backend, SaveAnswerRequest};
pub use http_backend::HttpBackend;
