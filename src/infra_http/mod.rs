mod fake_judge_server;
mod reqwest_transport;

pub use fake_judge_server::*;
pub use reqwest_transport::*;
