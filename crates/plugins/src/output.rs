//! Packet sinks: a counting null output and an append-only file output.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_media::component::{Component, ComponentId, Output};
use simpleobs_media::frame::EncodedPacket;

use crate::{FILE_OUTPUT, NULL_OUTPUT};

/// Accepts and discards packets, keeping counts.
#[derive(Debug)]
pub struct NullOutput {
    id: ComponentId,
    name: String,
    active: AtomicBool,
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl NullOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ComponentId::next(),
            name: name.into(),
            active: AtomicBool::new(false),
            packets: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl Component for NullOutput {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> &str {
        NULL_OUTPUT
    }
}

impl Output for NullOutput {
    fn start(&self) -> ObsResult<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::debug!(
                output = %self.name,
                packets = self.packets(),
                bytes = self.bytes(),
                "Null output stopped"
            );
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn send(&self, packet: &EncodedPacket) -> ObsResult<()> {
        if !self.is_active() {
            return Err(ObsError::output(format!("{} is not started", self.name)));
        }
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(packet.data.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Appends every packet payload to a file, video and audio interleaved in
/// arrival order.
#[derive(Debug)]
pub struct FileOutput {
    id: ComponentId,
    name: String,
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    bytes: AtomicU64,
}

impl FileOutput {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: ComponentId::next(),
            name: name.into(),
            path: path.into(),
            writer: Mutex::new(None),
            bytes: AtomicU64::new(0),
        }
    }

    /// Registry constructor: the instance name is the destination path.
    pub fn from_name(name: &str) -> ObsResult<Self> {
        if name.trim().is_empty() {
            return Err(ObsError::invalid_argument(
                "file output needs a destination path as its name",
            ));
        }
        Ok(Self::new(name, name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Payload bytes written since creation.
    pub fn bytes_written(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn writer(&self) -> MutexGuard<'_, Option<BufWriter<File>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Component for FileOutput {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> &str {
        FILE_OUTPUT
    }

    fn shutdown(&self) {
        self.stop();
    }
}

impl Output for FileOutput {
    fn start(&self) -> ObsResult<()> {
        let mut writer = self.writer();
        if writer.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        *writer = Some(BufWriter::new(file));

        tracing::info!(output = %self.name, path = %self.path.display(), "File output opened");
        Ok(())
    }

    fn stop(&self) {
        let Some(mut writer) = self.writer().take() else {
            return;
        };
        if let Err(e) = writer.flush() {
            tracing::warn!(output = %self.name, error = %e, "Failed to flush file output");
        }
        tracing::info!(
            output = %self.name,
            bytes = self.bytes_written(),
            "File output closed"
        );
    }

    fn is_active(&self) -> bool {
        self.writer().is_some()
    }

    fn send(&self, packet: &EncodedPacket) -> ObsResult<()> {
        let mut guard = self.writer();
        let writer = guard
            .as_mut()
            .ok_or_else(|| ObsError::output(format!("{} is not started", self.name)))?;
        writer.write_all(&packet.data)?;
        self.bytes
            .fetch_add(packet.data.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}
