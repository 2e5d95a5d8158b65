// store

mod credential_store;
mod draft_store;
mod local_storage;

pub use credential_store::*;
pub use draft_store::*;
pub use local_storage::*;

// transport

mod transport;

pub use transport::*;
