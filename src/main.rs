//! Lyricwave - audio-reactive lyric visualizer
//!
//! Timed phrases surface in 3D space, driven by live frequency analysis of
//! the track, and pass through a feedback/glitch compositing chain that
//! leaves trailing, distorted video texture behind them.

mod animator;
mod assets;
mod atlas;
mod audio;
mod camera;
mod cli;
mod compositor;
mod cue;
mod layout;
mod params;
mod script;
mod spectrum;
mod timeline;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Parser;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use animator::TransformAnimator;
use atlas::AtlasImage;
use audio::{AudioSystem, PlaybackClock};
use camera::CameraSystem;
use compositor::{Compositor, StageSources};
use params::*;
use spectrum::SpectrumSampler;
use timeline::{CueTimeline, LayoutContext};

/// Main application state
struct App {
    // Window and rendering
    window: Option<Arc<Window>>,
    compositor: Option<Compositor>,

    // Startup payloads consumed when the window appears
    pending_atlas: Option<AtlasImage>,
    pending_sources: Option<StageSources>,
    compositor_config: CompositorConfig,

    // Simulation systems
    timeline: CueTimeline,
    animator: TransformAnimator,
    sampler: SpectrumSampler,
    camera: CameraSystem,
    audio: Option<AudioSystem>,

    // Analysis handoff (written by the FFT thread)
    magnitudes: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,

    /// FFT analysis thread handle (kept for the process lifetime)
    _analysis_thread: Option<std::thread::JoinHandle<()>>,

    // Playback
    clock: PlaybackClock,
    autoplay: bool,

    // Configuration
    layout_config: LayoutConfig,
    render_config: RenderConfig,

    // Time tracking
    start_time: Instant,
    fatal: Option<String>,
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        let window_attributes = Window::default_attributes()
            .with_title("Lyricwave")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.render_config.window_width,
                self.render_config.window_height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fatal = Some(format!("Failed to create window: {}", e));
                event_loop.exit();
                return;
            }
        };

        let atlas = self
            .pending_atlas
            .take()
            .unwrap_or_else(AtlasImage::placeholder_atlas);
        let sources = self
            .pending_sources
            .take()
            .unwrap_or_else(|| assets::load_stage_sources(None));

        // No compositor without its stages: this failure halts startup
        let compositor = match pollster::block_on(Compositor::new(
            Arc::clone(&window),
            atlas,
            sources,
            self.compositor_config.clone(),
        )) {
            Ok(compositor) => compositor,
            Err(e) => {
                self.fatal = Some(format!("Failed to initialize rendering: {}", e));
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        self.camera.resize(size.width, size.height);

        log::info!("Lyricwave is running (Space: play/pause, Esc: quit)");

        self.window = Some(window);
        self.compositor = Some(compositor);

        if self.autoplay {
            self.clock.play();
            self.sync_audio();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(code),
                        repeat: false,
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape => event_loop.exit(),
                KeyCode::Space => {
                    self.clock.toggle();
                    self.sync_audio();
                }
                _ => {}
            },
            WindowEvent::Resized(size) => {
                self.camera.resize(size.width, size.height);
                if let Some(compositor) = &mut self.compositor {
                    compositor.resize(size.width, size.height);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.pointer_moved(position.x, position.y);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                ..
            } => {
                // A press re-arms the interaction window at the last
                // pointer position
                self.camera.set_pointer_refresh(self.app_ms());
            }
            WindowEvent::Touch(touch) => match touch.phase {
                TouchPhase::Started | TouchPhase::Moved => {
                    self.pointer_moved(touch.location.x, touch.location.y);
                }
                TouchPhase::Ended | TouchPhase::Cancelled => {}
            },
            WindowEvent::RedrawRequested => {
                self.render_frame();
            }
            _ => {}
        }
    }
}

impl App {
    fn app_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Bring the audio stream in line with the playback clock
    fn sync_audio(&self) {
        let on = self.clock.playing();
        if let Some(audio) = &self.audio {
            audio.set_playing(on);
        }
        log::info!(
            "{} at {:.1}s",
            if on { "Playing" } else { "Paused" },
            self.clock.position_ms() as f64 / 1000.0
        );
    }

    fn pointer_moved(&mut self, x: f64, y: f64) {
        let Some(window) = &self.window else {
            return;
        };
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return;
        }
        let nx = (x / size.width as f64) as f32;
        let ny = (y / size.height as f64) as f32;
        self.camera.set_pointer(nx, ny, self.app_ms());
    }

    /// One render tick: spectrum -> timeline -> camera -> animator ->
    /// compositor, strictly in that order
    fn render_frame(&mut self) {
        let Some(ref compositor) = self.compositor else {
            return;
        };

        let app_ms = self.start_time.elapsed().as_millis() as u64;
        let time_s = self.start_time.elapsed().as_secs_f32();
        let now_ms = self.clock.position_ms();

        // Spectrum snapshot
        let mags = self.magnitudes.lock().unwrap().clone();
        let playing = self.clock.playing() && self.audio.is_some();
        let frame = self
            .sampler
            .sample(Some(&mags), self.sample_rate, playing, time_s);

        // Cue timeline advance
        let depth_range = self.timeline.config().target_depth.clone();
        let focus_depth = (depth_range.start + depth_range.end) * 0.5;
        let viewport_width = self.camera.viewport_world_width(focus_depth);
        {
            let ctx = LayoutContext {
                metrics: compositor.atlas_image(),
                layout: &self.layout_config,
                viewport_world_width: viewport_width,
            };
            let mut rng = rand::rng();
            self.timeline.advance(now_ms, &ctx, &mut rng);
        }

        // Camera pose and the pointer beam target
        let pose = self.camera.update(time_s, frame.level, app_ms);
        let pointer_world = if self.camera.interaction_active(app_ms) {
            let plane = self
                .timeline
                .average_active_depth()
                .unwrap_or(focus_depth);
            Some(self.camera.world_point_on_plane(plane))
        } else {
            None
        };

        // Animate, then hand the populated scene to the compositor
        self.animator
            .update(self.timeline.cues_mut(), &frame, pointer_world, time_s);

        let timeline_config = self.timeline.config().clone();
        let result = compositor.composite(
            self.timeline.cues_mut(),
            &timeline_config,
            &self.layout_config,
            now_ms,
            &pose,
            &frame,
            time_s,
        );

        if let Err(e) = result {
            match e {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    log::warn!("Surface lost, reconfiguring");
                    if let (Some(window), Some(compositor)) =
                        (&self.window, &mut self.compositor)
                    {
                        let size = window.inner_size();
                        compositor.resize(size.width, size.height);
                    }
                }
                other => log::error!("Render error: {:?}", other),
            }
        }
    }
}

fn main() {
    env_logger::init();
    let args = cli::Args::parse();

    let spectrum_config = SpectrumConfig::default();
    if let Err(e) = spectrum_config.validate() {
        log::error!("{}", e);
        std::process::exit(1);
    }

    let layout_config = LayoutConfig::default();

    log::info!("Loading assets...");
    let loaded = assets::load_assets(&args.asset_paths());

    // Cue script: non-fatal, zero cues keeps the composition running
    let entries = match &loaded.script {
        Ok(content) => {
            let parsed = script::parse_script(content, &layout_config);
            if parsed.malformed_blocks > 0 {
                log::warn!("Skipped {} malformed script blocks", parsed.malformed_blocks);
            }
            log::info!("Cue script: {} lines", parsed.entries.len());
            parsed.entries
        }
        Err(e) => {
            log::warn!("Cue script unavailable ({}), continuing with zero cues", e);
            Vec::new()
        }
    };

    // Font: non-fatal, placeholder glyphs as the last resort
    let atlas_image = match loaded.font {
        Ok(bytes) => AtlasImage::rasterize(bytes, 48.0).unwrap_or_else(|e| {
            log::warn!("Font rasterization failed ({}), using placeholder", e);
            AtlasImage::placeholder_atlas()
        }),
        Err(e) => {
            log::warn!("No font available ({}), using placeholder glyphs", e);
            AtlasImage::placeholder_atlas()
        }
    };

    // Audio: non-fatal, the sampler synthesizes a level when absent
    let (audio, sample_rate) = match loaded.track {
        Ok(track) => {
            let sample_rate = track.sample_rate;
            match AudioSystem::new(track) {
                Ok(audio) => (Some(audio), sample_rate),
                Err(e) => {
                    log::warn!("Audio unavailable ({}), using synthetic levels", e);
                    (None, 44100)
                }
            }
        }
        Err(e) => {
            log::warn!("Track failed to load ({}), using synthetic levels", e);
            (None, 44100)
        }
    };

    let magnitudes = Arc::new(Mutex::new(Vec::new()));
    let analysis_thread = audio.as_ref().map(|audio| {
        spectrum::spawn_analysis_thread(
            spectrum_config.clone(),
            audio.tap(),
            Arc::clone(&magnitudes),
        )
    });

    let render_config = RenderConfig::default();
    let mut app = App {
        window: None,
        compositor: None,
        pending_atlas: Some(atlas_image),
        pending_sources: Some(loaded.shaders),
        compositor_config: args.compositor_config(),
        timeline: CueTimeline::new(entries, TimelineConfig::default()),
        animator: TransformAnimator::new(
            AnimatorConfig::default(),
            InteractionConfig::default(),
        ),
        sampler: SpectrumSampler::new(spectrum_config),
        camera: CameraSystem::new(render_config.clone(), InteractionConfig::default()),
        audio,
        magnitudes,
        sample_rate,
        _analysis_thread: analysis_thread,
        clock: PlaybackClock::new(),
        autoplay: args.autoplay,
        layout_config,
        render_config,
        start_time: Instant::now(),
        fatal: None,
    };

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    let _ = event_loop.run_app(&mut app);

    if let Some(e) = app.fatal {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
