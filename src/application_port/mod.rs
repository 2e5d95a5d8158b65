mod error;
mod judge_service;
mod profile_service;
mod session_service;

pub use error::*;
pub use judge_service::*;
pub use profile_service::*;
pub use session_service::*;
