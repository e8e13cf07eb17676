//! Configuration constants for the engine. Import values from here rather
//! than redefining them locally; interdependent constants are documented and
//! asserted together in [`constants`].

pub mod constants;

pub use constants::*;
