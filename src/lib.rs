//! Reactive exp-6 pair interactions for coarse-grained particles whose species
//! composition evolves, together with the respa neighbor lists that feed them.

pub mod core;
pub mod engine;
pub mod neighbor;

pub use crate::core::error::{FailScope, Result, RxError};
