mod judge_service_impl;
mod profile_service_impl;
mod session_service_impl;

pub use judge_service_impl::*;
pub use profile_service_impl::*;
pub use session_service_impl::*;
