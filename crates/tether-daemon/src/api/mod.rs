mod handlers;
mod middleware;
mod responses;
mod server;
mod state;

pub use handlers::StreamParams;
pub use middleware::{ApiAuthenticator, AuthResult};
pub use responses::{ApiError, ApiResult, ErrorBody, ProcessActionResponse, VersionResponse};
pub use server::{create_router, ApiServer};
pub use state::ApiState;
