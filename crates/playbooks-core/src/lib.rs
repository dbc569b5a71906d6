pub mod checklist;
pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod id;
pub mod io;
pub mod mutation;
pub mod normalize;
pub mod paths;
pub mod playbook;
pub mod run;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod task_action;
pub mod types;

pub use error::{ErrorKind, PlaybooksError, Result};
