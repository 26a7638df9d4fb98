pub mod config;
pub mod error;
pub mod types;

pub use config::NotesConfig;
pub use error::{NotesError, Result};
pub use types::*;
