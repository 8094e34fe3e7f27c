//! Pass-through FUSE filesystem that exposes one directory at another
//! location while keeping every access confined beneath it.

pub mod config;
pub mod error;
pub mod fs;
pub mod fuse;

pub use error::{BindError, BindResult};
pub use fs::BindFs;
