pub mod config;
pub mod filter;
pub mod location;
pub mod metadata;
pub mod task;

pub use config::*;
pub use filter::*;
pub use location::*;
pub use metadata::*;
pub use task::*;
