//! The engine: scene ownership, processing chain, and streaming lifecycle.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle, ThreadId};

use simpleobs_common::config::AppConfig;
use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_compositor::{Scene, SceneConfig};
use simpleobs_media::component::{same_component, EncoderRef, FilterRef, OutputRef, SourceRef};

use crate::health::{HealthCallback, HealthEvent, PipelineStats, StatsCounters};
use crate::pipeline::PipelineWorker;
use crate::registry::{ComponentKind, ComponentRegistry};

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered processing stages applied after rendering.
#[derive(Clone, Default)]
pub(crate) struct ProcessingChain {
    pub filters: Vec<FilterRef>,
    pub encoders: Vec<EncoderRef>,
    pub outputs: Vec<OutputRef>,
}

/// State shared between the engine handle and the pipeline thread.
pub(crate) struct EngineShared {
    pub config: AppConfig,
    pub registry: ComponentRegistry,
    pub scenes: RwLock<BTreeMap<String, Arc<Scene>>>,
    pub active_scene: RwLock<Option<Arc<Scene>>>,
    pub chain: RwLock<ProcessingChain>,
    pub streaming: AtomicBool,
    pub initialized: AtomicBool,
    pub stats: StatsCounters,
    pub health_callback: RwLock<Option<HealthCallback>>,
    pub pipeline_thread: RwLock<Option<ThreadId>>,
}

impl EngineShared {
    pub fn active_scene(&self) -> Option<Arc<Scene>> {
        read(&self.active_scene).clone()
    }

    pub fn chain_snapshot(&self) -> ProcessingChain {
        read(&self.chain).clone()
    }

    /// Whether the caller is this engine's pipeline thread, i.e. a health
    /// callback.
    pub fn on_pipeline_thread(&self) -> bool {
        *read(&self.pipeline_thread) == Some(thread::current().id())
    }

    pub fn emit_health(&self, event: HealthEvent) {
        match &event {
            HealthEvent::SustainedOverrun {
                consecutive_ticks,
                last_tick_behind,
            } => tracing::warn!(
                consecutive_ticks,
                behind_ms = last_tick_behind.as_secs_f64() * 1000.0,
                "Pipeline is falling behind its tick rate"
            ),
            HealthEvent::OutputInactive { output, ticks } => {
                tracing::warn!(output = %output, ticks, "Output has stayed inactive")
            }
        }

        // Cloned out so the callback can replace or clear itself.
        let Some(callback) = read(&self.health_callback).clone() else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
            tracing::error!(event = ?event, "Health callback panicked");
        }
    }
}

/// Central orchestrator.
///
/// Owns the scenes and the processing chain (filters, encoders, outputs),
/// and runs the streaming loop on its own thread between
/// [`start_streaming`](Self::start_streaming) and
/// [`stop_streaming`](Self::stop_streaming). Every method takes `&self`, so
/// an `Engine` can be shared behind an `Arc` and driven from several threads.
pub struct Engine {
    shared: Arc<EngineShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Create an engine for a validated configuration.
    pub fn new(config: AppConfig) -> ObsResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create an engine with the default configuration.
    pub fn with_defaults() -> Self {
        Self::build(AppConfig::default())
    }

    fn build(config: AppConfig) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                config,
                registry: ComponentRegistry::new(),
                scenes: RwLock::new(BTreeMap::new()),
                active_scene: RwLock::new(None),
                chain: RwLock::new(ProcessingChain::default()),
                streaming: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                stats: StatsCounters::default(),
                health_callback: RwLock::new(None),
                pipeline_thread: RwLock::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.shared.config
    }

    /// Factory registry used by the `create_*` methods.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.shared.registry
    }

    /// Mark the engine ready. Idempotent.
    pub fn initialize(&self) -> ObsResult<()> {
        if !self.shared.initialized.swap(true, Ordering::SeqCst) {
            tracing::info!(
                width = self.shared.config.video.width,
                height = self.shared.config.video.height,
                fps = self.shared.config.video.fps,
                "Engine initialized"
            );
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    /// Stop streaming, shut down every scene and chain component, and
    /// release them. Idempotent.
    pub fn shutdown(&self) {
        self.stop_streaming();

        let scenes = std::mem::take(&mut *write(&self.shared.scenes));
        *write(&self.shared.active_scene) = None;
        for scene in scenes.values() {
            scene.shutdown();
        }

        let chain = std::mem::take(&mut *write(&self.shared.chain));
        for filter in &chain.filters {
            filter.shutdown();
        }
        for encoder in &chain.encoders {
            encoder.shutdown();
        }
        for output in &chain.outputs {
            output.shutdown();
        }

        if self.shared.initialized.swap(false, Ordering::SeqCst) {
            tracing::info!(scenes = scenes.len(), "Engine shut down");
        }
    }

    /// Create and initialize a scene sized from the engine configuration.
    ///
    /// If a scene with this name already exists it is returned unchanged.
    /// The first scene created becomes the active scene.
    pub fn create_scene(&self, name: &str) -> ObsResult<Arc<Scene>> {
        let mut scenes = write(&self.shared.scenes);
        if let Some(existing) = scenes.get(name) {
            tracing::debug!(scene = name, "Scene already exists");
            return Ok(existing.clone());
        }

        let scene = Arc::new(Scene::new(
            name,
            SceneConfig::from_app_config(&self.shared.config),
        ));
        scene.initialize()?;
        scenes.insert(name.to_string(), scene.clone());
        drop(scenes);

        let mut active = write(&self.shared.active_scene);
        if active.is_none() {
            *active = Some(scene.clone());
        }
        tracing::info!(scene = name, id = scene.id(), "Created scene");
        Ok(scene)
    }

    pub fn scene(&self, name: &str) -> Option<Arc<Scene>> {
        read(&self.shared.scenes).get(name).cloned()
    }

    /// Scene names in sorted order.
    pub fn scene_names(&self) -> Vec<String> {
        read(&self.shared.scenes).keys().cloned().collect()
    }

    /// Detach and shut down a scene. Clears the active scene if it was this one.
    pub fn remove_scene(&self, name: &str) -> Option<Arc<Scene>> {
        let scene = write(&self.shared.scenes).remove(name)?;
        {
            let mut active = write(&self.shared.active_scene);
            if active.as_ref().is_some_and(|a| Arc::ptr_eq(a, &scene)) {
                *active = None;
            }
        }
        scene.shutdown();
        tracing::info!(scene = name, "Removed scene");
        Some(scene)
    }

    /// Select the scene the pipeline renders.
    pub fn set_active_scene(&self, name: &str) -> ObsResult<()> {
        let scene = self.scene(name).ok_or_else(|| ObsError::SceneNotFound {
            name: name.to_string(),
        })?;
        *write(&self.shared.active_scene) = Some(scene);
        tracing::info!(scene = name, "Active scene changed");
        Ok(())
    }

    pub fn active_scene(&self) -> Option<Arc<Scene>> {
        self.shared.active_scene()
    }

    /// Build a source through the registry and initialize it.
    pub fn create_source(&self, type_id: &str, name: &str) -> ObsResult<SourceRef> {
        let source = self.shared.registry.create_source(type_id, name)?;
        initialize_component(ComponentKind::Source, type_id, name, source.initialize())?;
        Ok(source)
    }

    /// Build an encoder through the registry and initialize it.
    pub fn create_encoder(&self, type_id: &str, name: &str) -> ObsResult<EncoderRef> {
        let encoder = self.shared.registry.create_encoder(type_id, name)?;
        initialize_component(ComponentKind::Encoder, type_id, name, encoder.initialize())?;
        Ok(encoder)
    }

    /// Build an output through the registry and initialize it.
    pub fn create_output(&self, type_id: &str, name: &str) -> ObsResult<OutputRef> {
        let output = self.shared.registry.create_output(type_id, name)?;
        initialize_component(ComponentKind::Output, type_id, name, output.initialize())?;
        Ok(output)
    }

    /// Build a filter through the registry and initialize it.
    pub fn create_filter(&self, type_id: &str, name: &str) -> ObsResult<FilterRef> {
        let filter = self.shared.registry.create_filter(type_id, name)?;
        initialize_component(ComponentKind::Filter, type_id, name, filter.initialize())?;
        Ok(filter)
    }

    /// Append a filter to the chain. Filters run in insertion order.
    pub fn add_filter(&self, filter: FilterRef) {
        tracing::debug!(filter = filter.name(), id = %filter.id(), "Added filter");
        write(&self.shared.chain).filters.push(filter);
    }

    pub fn add_encoder(&self, encoder: EncoderRef) {
        tracing::debug!(encoder = encoder.name(), id = %encoder.id(), "Added encoder");
        write(&self.shared.chain).encoders.push(encoder);
    }

    /// Register an output. Outputs added while streaming are started on
    /// the next [`start_streaming`](Self::start_streaming), not immediately.
    pub fn add_output(&self, output: OutputRef) {
        tracing::debug!(output = output.name(), id = %output.id(), "Added output");
        write(&self.shared.chain).outputs.push(output);
    }

    /// Detach a filter by identity. Returns false if it was not in the chain.
    pub fn remove_filter(&self, filter: &FilterRef) -> bool {
        remove_by_identity(&mut write(&self.shared.chain).filters, filter)
    }

    pub fn remove_encoder(&self, encoder: &EncoderRef) -> bool {
        remove_by_identity(&mut write(&self.shared.chain).encoders, encoder)
    }

    pub fn remove_output(&self, output: &OutputRef) -> bool {
        remove_by_identity(&mut write(&self.shared.chain).outputs, output)
    }

    pub fn filters(&self) -> Vec<FilterRef> {
        read(&self.shared.chain).filters.clone()
    }

    pub fn encoders(&self) -> Vec<EncoderRef> {
        read(&self.shared.chain).encoders.clone()
    }

    pub fn outputs(&self) -> Vec<OutputRef> {
        read(&self.shared.chain).outputs.clone()
    }

    /// Start the streaming loop.
    ///
    /// Starts every inactive output first. An output that fails to start is
    /// logged and stays in the chain; it simply receives nothing while
    /// inactive.
    pub fn start_streaming(&self) -> ObsResult<()> {
        if !self.is_initialized() {
            return Err(ObsError::not_initialized("engine"));
        }
        if self.shared.on_pipeline_thread() {
            return Err(ObsError::invalid_argument(
                "streaming cannot be started from a health callback",
            ));
        }

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.streaming.load(Ordering::SeqCst) {
            return Err(ObsError::AlreadyStreaming);
        }
        // Left behind by a stop issued from the pipeline thread itself.
        if let Some(stale) = worker.take() {
            let _ = stale.join();
        }

        for output in self.outputs() {
            if output.is_active() {
                continue;
            }
            if let Err(e) = output.start() {
                tracing::warn!(output = output.name(), error = %e, "Output failed to start");
            }
        }

        self.shared.stats.reset();
        self.shared.streaming.store(true, Ordering::SeqCst);

        let pipeline = PipelineWorker::new(self.shared.clone());
        let handle = thread::Builder::new()
            .name("simpleobs-pipeline".to_string())
            .spawn(move || pipeline.run())
            .map_err(|e| {
                self.shared.streaming.store(false, Ordering::SeqCst);
                ObsError::Io(e)
            })?;
        *worker = Some(handle);

        tracing::info!(fps = self.shared.config.video.fps, "Streaming started");
        Ok(())
    }

    /// Stop the streaming loop and every active output.
    ///
    /// Blocks until the pipeline thread has exited, so no stage is invoked
    /// after this returns. A no-op when not streaming. From inside a health
    /// callback it returns without waiting; the loop exits once the callback
    /// returns.
    pub fn stop_streaming(&self) {
        if self.shared.on_pipeline_thread() {
            // The loop exits once the callback returns; the next start or
            // stop joins it.
            if self.shared.streaming.swap(false, Ordering::SeqCst) {
                self.stop_outputs();
            }
            return;
        }

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let was_streaming = self.shared.streaming.swap(false, Ordering::SeqCst);

        if let Some(handle) = worker.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::error!("Pipeline thread panicked");
            }
        }

        if was_streaming {
            self.stop_outputs();
        }
    }

    fn stop_outputs(&self) {
        for output in self.outputs() {
            if output.is_active() {
                output.stop();
            }
        }

        let stats = self.stats();
        tracing::info!(
            ticks = stats.ticks,
            packets = stats.packets_delivered,
            drop_rate_pct = stats.drop_rate(),
            "Streaming stopped"
        );
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::SeqCst)
    }

    /// Counters for the current or most recent streaming session.
    pub fn stats(&self) -> PipelineStats {
        self.shared.stats.snapshot()
    }

    /// Install a callback for [`HealthEvent`]s. It runs on the pipeline
    /// thread and must return quickly; see [`HealthCallback`].
    pub fn set_health_callback<F>(&self, callback: F)
    where
        F: Fn(&HealthEvent) + Send + Sync + 'static,
    {
        *write(&self.shared.health_callback) = Some(Arc::new(callback));
    }

    pub fn clear_health_callback(&self) {
        *write(&self.shared.health_callback) = None;
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain = read(&self.shared.chain);
        f.debug_struct("Engine")
            .field("initialized", &self.is_initialized())
            .field("streaming", &self.is_streaming())
            .field("scenes", &self.scene_names())
            .field("filters", &chain.filters.len())
            .field("encoders", &chain.encoders.len())
            .field("outputs", &chain.outputs.len())
            .finish()
    }
}

fn initialize_component(
    kind: ComponentKind,
    type_id: &str,
    name: &str,
    result: ObsResult<()>,
) -> ObsResult<()> {
    result.map_err(|e| {
        tracing::warn!(kind = %kind, type_id, name, error = %e, "Component failed to initialize");
        ObsError::factory(type_id, format!("initialize failed: {e}"))
    })
}

fn remove_by_identity<T: ?Sized>(items: &mut Vec<Arc<T>>, target: &Arc<T>) -> bool {
    match items.iter().position(|item| same_component(item, target)) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}
