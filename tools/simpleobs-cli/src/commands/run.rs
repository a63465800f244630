//! Stream the demo scene: a color card with a tone on top.

use std::path::PathBuf;
use std::time::Duration;

use simpleobs_common::config::AppConfig;
use simpleobs_engine::Engine;
use simpleobs_plugins::{
    register_builtins, COLOR_SOURCE, FILE_OUTPUT, NULL_OUTPUT, RAW_ENCODER, TONE_SOURCE,
};

const SCENE_NAME: &str = "Main Scene";

pub async fn run(config: AppConfig, duration: f64, output: Option<PathBuf>) -> anyhow::Result<()> {
    if !duration.is_finite() || duration < 0.0 {
        anyhow::bail!("duration must be a non-negative number of seconds");
    }

    let engine = Engine::new(config).map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
    register_builtins(engine.registry(), engine.config());
    engine.initialize()?;

    let scene = engine.create_scene(SCENE_NAME)?;
    scene.add_source(engine.create_source(COLOR_SOURCE, "Color Card")?)?;
    scene.add_source(engine.create_source(TONE_SOURCE, "Tone")?)?;

    engine.add_encoder(engine.create_encoder(RAW_ENCODER, "Raw")?);
    let sink = match &output {
        Some(path) => engine.create_output(FILE_OUTPUT, &path.to_string_lossy())?,
        None => engine.create_output(NULL_OUTPUT, "Null")?,
    };
    engine.add_output(sink);

    let video = &engine.config().video;
    println!("Streaming scene: {SCENE_NAME}");
    println!("  Canvas: {}x{} @ {}fps", video.width, video.height, video.fps);
    match &output {
        Some(path) => println!("  Output: {}", path.display()),
        None => println!("  Output: discarded"),
    }
    if duration > 0.0 {
        println!("  Duration: {duration}s (Ctrl+C to stop early)");
    } else {
        println!("  Press Ctrl+C to stop...");
    }
    println!();

    engine.start_streaming()?;

    if duration > 0.0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(duration)) => {}
            result = tokio::signal::ctrl_c() => result?,
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    engine.stop_streaming();
    let stats = engine.stats();
    tracing::debug!(?stats, "Final pipeline stats");
    engine.shutdown();

    println!("Stream finished:");
    println!("  Ticks: {} ({} idle, {} overrun)", stats.ticks, stats.idle_ticks, stats.overruns);
    println!(
        "  Video frames: {} ({} dropped)",
        stats.video_frames, stats.video_frames_dropped
    );
    println!(
        "  Audio frames: {} ({} dropped)",
        stats.audio_frames, stats.audio_frames_dropped
    );
    println!(
        "  Packets delivered: {} ({} output failures, {} encoder failures)",
        stats.packets_delivered, stats.output_failures, stats.encoder_failures
    );
    println!("  Drop rate: {:.2}%", stats.drop_rate());

    Ok(())
}
