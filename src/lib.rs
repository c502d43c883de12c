pub mod archive;
pub mod descriptor;
pub mod error;
pub mod repo;
pub mod runtime;
pub mod version;
