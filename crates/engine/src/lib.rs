//! SimpleOBS Engine
//!
//! Owns the scenes, the component registry, and the processing chain, and
//! drives them from one dedicated pipeline thread at a fixed tick rate.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Engine                            │
//! │  ┌───────────────────┐   ┌──────────────────────────────┐ │
//! │  │ ComponentRegistry │   │ scenes: name → Scene         │ │
//! │  │ type id → factory │   │ active scene                 │ │
//! │  └───────────────────┘   └──────────────┬───────────────┘ │
//! │                                         │ every tick      │
//! │                                         ▼                 │
//! │  render ──► filters ──► encoders ──► active outputs       │
//! │                    (pipeline thread)                      │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod health;
mod pipeline;
pub mod registry;

pub use engine::Engine;
pub use health::{HealthCallback, HealthEvent, PipelineStats};
pub use registry::{ComponentKind, ComponentRegistry};
