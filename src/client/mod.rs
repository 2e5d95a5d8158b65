mod authorizer;
mod client;
mod pipeline;
mod renewal;
mod tracker;

pub use authorizer::*;
pub use client::*;
pub use pipeline::*;
pub use renewal::*;
pub use tracker::*;
