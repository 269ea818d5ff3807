//! Skript Core - Fundamental types shared by the loader crates

mod error;
mod types;
mod idgen;

pub use error::*;
pub use types::*;
pub use idgen::*;
