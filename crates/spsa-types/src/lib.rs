pub mod config;
pub mod errors;
pub mod parameter;

pub use config::*;
pub use errors::*;
pub use parameter::*;
