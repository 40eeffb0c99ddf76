pub mod config;
pub mod error;
pub mod exchange;
pub mod layout;
pub mod oracle;
pub mod replica;
pub mod summary;
pub mod surrogate;

pub use config::RunConfig;
pub use error::{ConfigErr, Result, RunErr};
pub use exchange::{RunData, run};
pub use summary::RunSummary;
