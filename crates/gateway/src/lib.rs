pub mod api;
pub mod cli;
pub mod error;
pub mod state;
pub mod ws;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
