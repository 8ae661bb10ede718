//! External control API: Start/Status/Cancel/Accept-and-background endpoints, served
//! with axum and a tower-http trace layer.

mod error;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
