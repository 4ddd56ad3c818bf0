//! CLI commands implementation

pub mod decision;
pub mod discover;
pub mod ingest;
pub mod init;
pub mod process;
pub mod query;
pub mod queue;
pub mod reweight;
pub mod status;

pub use decision::*;
pub use discover::*;
pub use ingest::*;
pub use init::*;
pub use process::*;
pub use query::*;
pub use queue::*;
pub use reweight::*;
pub use status::*;
