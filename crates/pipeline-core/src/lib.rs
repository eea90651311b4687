pub mod document;
pub mod error;
pub mod inheritance;
pub mod io;
pub mod paths;
pub mod project;
pub mod schema;
pub mod service;
pub mod settings;
pub mod stages;
pub mod store;

pub use error::{PipelineError, Result};
