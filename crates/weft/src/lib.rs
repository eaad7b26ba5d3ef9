#![forbid(unsafe_code)]

//! Weft public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use weft_compiler as compiler;
    pub use weft_reactive as reactive;
}
