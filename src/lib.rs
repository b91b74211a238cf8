mod auth;
pub mod config;
mod courses;
mod error;
mod input;
mod policy;
mod routes;
mod storage;
mod types;

pub use auth::*;
pub use courses::*;
pub use error::*;
pub use input::*;
pub use policy::*;
pub use routes::*;
pub use storage::{JsonCourseStore, JsonUserStore};
pub use types::*;
