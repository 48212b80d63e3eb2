//! HTTP API for controlling the recognition session
//!
//! - POST /session/start - Start streaming
//! - POST /session/stop - Stop streaming
//! - GET /session/status - Query session status
//! - GET /session/transcript - Get accumulated transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
