use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_compositor::{Scene, SceneConfig};
use simpleobs_media::component::{Component, ComponentId, Source, SourceRef};
use simpleobs_media::frame::{AudioFrame, PixelFormat, VideoFrame};

/// Source that replays a fixed video frame and a constant audio level.
struct FixedSource {
    id: ComponentId,
    name: String,
    active: AtomicBool,
    video: Mutex<Option<VideoFrame>>,
    audio_level: f32,
    sample_rate: u32,
    channels: u16,
}

impl FixedSource {
    fn video(name: &str, frame: VideoFrame) -> Arc<Self> {
        Arc::new(Self {
            id: ComponentId::next(),
            name: name.to_string(),
            active: AtomicBool::new(true),
            video: Mutex::new(Some(frame)),
            audio_level: 0.0,
            sample_rate: 48000,
            channels: 2,
        })
    }

    fn audio(name: &str, level: f32, sample_rate: u32, channels: u16) -> Arc<Self> {
        Arc::new(Self {
            id: ComponentId::next(),
            name: name.to_string(),
            active: AtomicBool::new(true),
            video: Mutex::new(None),
            audio_level: level,
            sample_rate,
            channels,
        })
    }
}

impl Component for FixedSource {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> &str {
        "fixed"
    }
}

impl Source for FixedSource {
    fn video_frame(&self, frame: &mut VideoFrame) -> ObsResult<()> {
        match self.video.lock().unwrap().as_ref() {
            Some(video) => {
                frame.clone_from(video);
                Ok(())
            }
            None => Err(ObsError::source("audio-only source")),
        }
    }

    fn audio_frame(&self, frame: &mut AudioFrame) -> ObsResult<()> {
        frame.reshape(self.sample_rate, self.channels, 8);
        for channel in &mut frame.channels {
            channel.fill(self.audio_level);
        }
        Ok(())
    }

    fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn config(width: u32, height: u32) -> SceneConfig {
    SceneConfig {
        width,
        height,
        sample_rate: 48000,
        channels: 2,
        samples_per_frame: 8,
    }
}

fn ready_scene(width: u32, height: u32) -> Scene {
    let scene = Scene::new("test", config(width, height));
    scene.initialize().unwrap();
    scene
}

#[test]
fn last_added_source_paints_on_top() {
    let scene = ready_scene(8, 8);
    scene
        .add_source(FixedSource::video("red", VideoFrame::solid(8, 8, RED)))
        .unwrap();
    scene
        .add_source(FixedSource::video("blue", VideoFrame::solid(8, 8, BLUE)))
        .unwrap();

    let mut frame = VideoFrame::default();
    assert_eq!(scene.render_video(&mut frame).unwrap(), 2);
    for y in 0..8 {
        for x in 0..8 {
            assert_eq!(frame.pixel(x, y), Some(BLUE));
        }
    }
}

#[test]
fn lower_layer_shows_through_letterbox_band() {
    let scene = ready_scene(8, 4);
    scene
        .add_source(FixedSource::video("red", VideoFrame::solid(8, 4, RED)))
        .unwrap();
    // Square source: scaled to 4x4 and centered, columns 2..6.
    scene
        .add_source(FixedSource::video("blue", VideoFrame::solid(2, 2, BLUE)))
        .unwrap();

    let mut frame = VideoFrame::default();
    scene.render_video(&mut frame).unwrap();
    assert_eq!(frame.pixel(0, 0), Some(RED));
    assert_eq!(frame.pixel(1, 3), Some(RED));
    assert_eq!(frame.pixel(2, 0), Some(BLUE));
    assert_eq!(frame.pixel(5, 3), Some(BLUE));
    assert_eq!(frame.pixel(6, 2), Some(RED));
}

#[test]
fn mismatched_resolution_is_padded_transparent() {
    let scene = ready_scene(8, 4);
    scene
        .add_source(FixedSource::video("blue", VideoFrame::solid(4, 4, BLUE)))
        .unwrap();

    let mut frame = VideoFrame::default();
    scene.render_video(&mut frame).unwrap();
    assert_eq!(frame.width, 8);
    assert_eq!(frame.height, 4);
    assert_eq!(frame.format, PixelFormat::Rgba8);
    assert_eq!(frame.pixel(0, 0), Some([0, 0, 0, 0]));
    assert_eq!(frame.pixel(4, 2), Some(BLUE));
    assert_eq!(frame.pixel(7, 3), Some([0, 0, 0, 0]));
}

#[test]
fn translucent_layer_blends_over_lower_layer() {
    let scene = ready_scene(2, 2);
    scene
        .add_source(FixedSource::video("red", VideoFrame::solid(2, 2, RED)))
        .unwrap();
    scene
        .add_source(FixedSource::video(
            "blue",
            VideoFrame::solid(2, 2, [0, 0, 255, 51]),
        ))
        .unwrap();

    let mut frame = VideoFrame::default();
    scene.render_video(&mut frame).unwrap();
    // 255 * 0.8 = 204 red left, 255 * 0.2 = 51 blue added.
    assert_eq!(frame.pixel(1, 1), Some([204, 0, 51, 255]));
}

#[test]
fn repeated_renders_are_byte_identical() {
    let scene = ready_scene(16, 9);
    scene
        .add_source(FixedSource::video("a", VideoFrame::solid(4, 3, [10, 200, 30, 255])))
        .unwrap();
    scene
        .add_source(FixedSource::video("b", VideoFrame::solid(3, 5, [90, 20, 250, 100])))
        .unwrap();

    let mut first = VideoFrame::default();
    let mut second = VideoFrame::default();
    scene.render_video(&mut first).unwrap();
    scene.render_video(&mut second).unwrap();
    assert_eq!(first, second);
}

#[test]
fn hot_sources_clip_at_unity() {
    let scene = ready_scene(2, 2);
    scene
        .add_source(FixedSource::audio("a", 0.9, 48000, 2))
        .unwrap();
    scene
        .add_source(FixedSource::audio("b", 0.9, 48000, 2))
        .unwrap();

    let mut frame = AudioFrame::default();
    assert_eq!(scene.render_audio(&mut frame).unwrap(), 2);
    assert_eq!(frame.samples, 8);
    assert_eq!(frame.channel_count(), 2);
    assert!(frame.channels.iter().flatten().all(|s| *s == 1.0));
}

#[test]
fn source_gain_applies_to_mix() {
    let scene = ready_scene(2, 2);
    let quiet: SourceRef = FixedSource::audio("quiet", 0.8, 48000, 2);
    scene.add_source(quiet.clone()).unwrap();
    scene.set_source_gain(&quiet, 0.5).unwrap();

    let mut frame = AudioFrame::default();
    scene.render_audio(&mut frame).unwrap();
    assert!((frame.channels[0][0] - 0.4).abs() < 1e-6);
}

#[test]
fn mismatched_audio_format_is_excluded() {
    let scene = ready_scene(2, 2);
    scene
        .add_source(FixedSource::audio("good", 0.3, 48000, 2))
        .unwrap();
    scene
        .add_source(FixedSource::audio("wrong_rate", 0.5, 44100, 2))
        .unwrap();
    scene
        .add_source(FixedSource::audio("mono", 0.5, 48000, 1))
        .unwrap();

    let mut frame = AudioFrame::default();
    assert_eq!(scene.render_audio(&mut frame).unwrap(), 1);
    assert!((frame.channels[1][7] - 0.3).abs() < 1e-6);
}

#[test]
fn only_mismatched_audio_is_no_frames() {
    let scene = ready_scene(2, 2);
    scene
        .add_source(FixedSource::audio("wrong_rate", 0.5, 44100, 2))
        .unwrap();
    let mut frame = AudioFrame::default();
    assert!(matches!(
        scene.render_audio(&mut frame),
        Err(ObsError::NoFrames { .. })
    ));
}

#[test]
fn empty_scene_leaves_output_untouched() {
    let scene = ready_scene(4, 4);
    let mut video = VideoFrame::solid(1, 1, RED);
    let mut audio = AudioFrame::silence(48000, 1, 3);

    assert!(matches!(
        scene.render_video(&mut video),
        Err(ObsError::EmptyScene { .. })
    ));
    assert!(matches!(
        scene.render_audio(&mut audio),
        Err(ObsError::EmptyScene { .. })
    ));
    assert_eq!(video, VideoFrame::solid(1, 1, RED));
    assert_eq!(audio, AudioFrame::silence(48000, 1, 3));
}

#[test]
fn all_inactive_sources_leave_output_untouched() {
    let scene = ready_scene(4, 4);
    let source = FixedSource::video("red", VideoFrame::solid(4, 4, RED));
    source.stop();
    scene.add_source(source).unwrap();

    let mut video = VideoFrame::solid(1, 1, BLUE);
    let mut audio = AudioFrame::silence(48000, 1, 3);
    assert!(scene.render_video(&mut video).is_err());
    assert!(scene.render_audio(&mut audio).is_err());
    assert_eq!(video, VideoFrame::solid(1, 1, BLUE));
    assert_eq!(audio, AudioFrame::silence(48000, 1, 3));
}

#[test]
fn render_is_safe_while_sources_churn() {
    let scene = Arc::new(ready_scene(8, 8));
    scene
        .add_source(FixedSource::video("base", VideoFrame::solid(8, 8, RED)))
        .unwrap();

    let writer = {
        let scene = scene.clone();
        thread::spawn(move || {
            for i in 0..200 {
                let source: SourceRef =
                    FixedSource::video(&format!("s{i}"), VideoFrame::solid(8, 8, BLUE));
                scene.add_source(source.clone()).unwrap();
                assert!(scene.remove_source(&source));
            }
        })
    };

    let mut frame = VideoFrame::default();
    for _ in 0..200 {
        let contributed = scene.render_video(&mut frame).unwrap();
        assert!(contributed == 1 || contributed == 2);
        let px = frame.pixel(0, 0).unwrap();
        assert!(px == RED || px == BLUE);
    }

    writer.join().unwrap();
    assert_eq!(scene.source_count(), 1);
}
