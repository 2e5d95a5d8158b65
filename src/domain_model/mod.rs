mod credential;
mod draft;
mod endpoints;
mod profile;
mod request;
mod submission;

pub use credential::*;
pub use draft::*;
pub use endpoints::*;
pub use profile::*;
pub use request::*;
pub use submission::*;
