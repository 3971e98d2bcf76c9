mod base;
mod controller;
mod endpoint;
mod orchestrator;
mod tool;

pub use base::*;
pub use controller::*;
pub use endpoint::*;
pub use orchestrator::*;
pub use tool::*;
