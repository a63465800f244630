//! Capability contracts implemented by pluggable components.
//!
//! All methods take `&self`: a single shared handle is driven both from
//! caller threads (start/stop, configuration) and from the pipeline thread
//! (frame production), so implementations keep their mutable state behind
//! their own locks or atomics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use simpleobs_common::error::ObsResult;

use crate::frame::{AudioFrame, EncodedPacket, VideoFrame};

/// Shared handle to a source. Identity is the allocation, not the name.
pub type SourceRef = Arc<dyn Source>;
/// Shared handle to an encoder.
pub type EncoderRef = Arc<dyn Encoder>;
/// Shared handle to an output.
pub type OutputRef = Arc<dyn Output>;
/// Shared handle to a filter.
pub type FilterRef = Arc<dyn Filter>;

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a component instance.
///
/// Allocated once at construction and never reused, so it stays distinct
/// from any instance created after this one is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Default for ComponentId {
    /// A fresh identifier, same as [`ComponentId::next`].
    fn default() -> Self {
        Self::next()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component-{}", self.0)
    }
}

/// Base contract shared by every pluggable component.
pub trait Component: Send + Sync {
    /// Identifier allocated when the instance was built.
    fn id(&self) -> ComponentId;

    /// Human-readable instance name.
    fn name(&self) -> &str;

    /// Registry type identifier this instance was built for.
    fn component_type(&self) -> &str;

    /// Prepare the component for use.
    fn initialize(&self) -> ObsResult<()> {
        Ok(())
    }

    /// Release resources. Must be idempotent.
    fn shutdown(&self) {}
}

/// A producer of video and/or audio frames.
pub trait Source: Component {
    /// Fill `frame` with the next video frame.
    ///
    /// The frame may arrive with a stale layout from a previous call;
    /// implementations reshape it as needed.
    fn video_frame(&self, frame: &mut VideoFrame) -> ObsResult<()>;

    /// Fill `frame` with the next audio frame.
    fn audio_frame(&self, frame: &mut AudioFrame) -> ObsResult<()>;

    /// Begin producing frames.
    fn start(&self);

    /// Stop producing frames.
    fn stop(&self);

    /// Whether the source is currently producing frames.
    fn is_active(&self) -> bool;
}

/// Converts raw frames into packets.
///
/// An encoder may buffer internally and return no packets for a given frame.
pub trait Encoder: Component {
    fn encode_video(&self, frame: &VideoFrame) -> ObsResult<Vec<EncodedPacket>>;

    fn encode_audio(&self, frame: &AudioFrame) -> ObsResult<Vec<EncodedPacket>>;
}

/// Transmits or persists encoded packets.
pub trait Output: Component {
    /// Open the destination.
    fn start(&self) -> ObsResult<()>;

    /// Close the destination, flushing anything pending.
    fn stop(&self);

    /// Whether the output currently accepts packets.
    fn is_active(&self) -> bool;

    /// Deliver one packet.
    fn send(&self, packet: &EncodedPacket) -> ObsResult<()>;
}

/// In-place frame transform applied before encoding.
pub trait Filter: Component {
    fn process_video(&self, frame: &mut VideoFrame) -> ObsResult<()>;

    fn process_audio(&self, frame: &mut AudioFrame) -> ObsResult<()>;
}

/// Whether two shared handles point at the same component instance.
///
/// Compares data pointers only; vtable pointers are ignored.
pub fn same_component<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
