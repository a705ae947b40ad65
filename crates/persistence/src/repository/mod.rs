//! Repository implementations for database operations

pub mod audit;
pub mod basket;
pub mod universe;

pub use audit::*;
pub use basket::*;
pub use universe::*;
