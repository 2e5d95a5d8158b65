mod credential_store_impl;
mod draft_store_impl;
mod json_file_storage;
mod memory_storage;

pub use credential_store_impl::*;
pub use draft_store_impl::*;
pub use json_file_storage::*;
pub use memory_storage::*;
