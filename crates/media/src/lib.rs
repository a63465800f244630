//! SimpleOBS media contracts.
//!
//! This crate contains the frame data carriers and the capability traits
//! every pluggable component implements. The compositor and the engine only
//! ever see components through these traits, never a concrete type.

pub mod component;
pub mod frame;

pub use component::*;
pub use frame::*;
