//! SimpleOBS Compositor
//!
//! A [`Scene`] owns an ordered list of sources and renders them into one
//! video canvas and one audio bus per call.
//!
//! # Render Order
//!
//! ```text
//! sources (insertion order)      canvas (Rgba8, fixed size)
//!   [0] camera  ──fit──┐
//!   [1] overlay ──fit──┼── source-over, bottom to top ──► VideoFrame
//!   [2] logo    ──fit──┘
//!
//!   [0] mic   ──× gain──┐
//!   [1] music ──× gain──┼── sum ── clip [-1, 1] ──► AudioFrame
//!   [2] alert ──× gain──┘
//! ```

pub mod audio;
pub mod scene;
pub mod video;

pub use scene::*;
