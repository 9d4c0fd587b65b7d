//! Pieces shared by every engine crate: the file store seam and model
//! tree visitors.

pub mod filesystem;
pub mod visitor;

pub use filesystem::*;
pub use visitor::*;
