//! Audio playback: WAV decode at startup, cpal output, and the playback
//! clock that drives the cue timeline.
//!
//! The output callback also feeds a mono sample tap consumed by the FFT
//! analysis thread (see `spectrum`).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Cap on buffered tap samples; the analysis thread normally drains faster
const TAP_LIMIT: usize = 1 << 16;

/// Playback position as an explicit offset + start-instant pair, recomputed
/// on every play/pause transition. This clock, not the sample cursor, is the
/// authority for cue timing.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    offset_ms: f64,
    started_at: Option<Instant>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn play(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.offset_ms += started.elapsed().as_secs_f64() * 1000.0;
        }
    }

    pub fn toggle(&mut self) {
        if self.playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn position_ms(&self) -> u64 {
        let running = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        (self.offset_ms + running) as u64
    }
}

/// A track decoded once at startup
pub struct DecodedTrack {
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedTrack {
    pub fn duration_ms(&self) -> u64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Decode a WAV file into interleaved f32 samples
pub fn decode_wav(path: &Path) -> Result<DecodedTrack, String> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| format!("Failed to decode samples: {}", e))?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(|e| format!("Failed to decode samples: {}", e))?
        }
    };

    Ok(DecodedTrack {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

/// Audio system: owns the output stream and the analysis tap
pub struct AudioSystem {
    playing: Arc<AtomicBool>,
    tap: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,

    /// Output stream (kept alive)
    _stream: cpal::Stream,
}

impl AudioSystem {
    /// Build the output stream for a decoded track. The stream starts
    /// running but outputs silence until `set_playing(true)`.
    pub fn new(track: DecodedTrack) -> Result<Self, String> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("No audio output device found")?;

        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(track.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        log::info!(
            "Audio: {} @ {}Hz, {:.1}s track",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            track.sample_rate,
            track.duration_ms() as f64 / 1000.0
        );

        let playing = Arc::new(AtomicBool::new(false));
        let playing_cb = Arc::clone(&playing);

        let tap = Arc::new(Mutex::new(Vec::new()));
        let tap_cb = Arc::clone(&tap);

        let sample_rate = track.sample_rate;
        let channels = track.channels.max(1) as usize;
        let samples = track.samples;
        let mut cursor = 0usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !playing_cb.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }

                    let mut tap_buf = tap_cb.lock().unwrap();
                    for frame in data.chunks_mut(2) {
                        let base = cursor * channels;
                        let (left, right) = if base + channels <= samples.len() {
                            let l = samples[base];
                            let r = if channels > 1 { samples[base + 1] } else { l };
                            cursor += 1;
                            (l, r)
                        } else {
                            // Past the end of the track: silence
                            (0.0, 0.0)
                        };

                        frame[0] = left;
                        if frame.len() > 1 {
                            frame[1] = right;
                        }
                        if tap_buf.len() < TAP_LIMIT {
                            tap_buf.push(left);
                        }
                    }
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| format!("Failed to build audio stream: {}", e))?;

        stream
            .play()
            .map_err(|e| format!("Failed to start audio stream: {}", e))?;

        Ok(Self {
            playing,
            tap,
            sample_rate,
            _stream: stream,
        })
    }

    pub fn set_playing(&self, on: bool) {
        self.playing.store(on, Ordering::Relaxed);
    }

    /// Mono sample tap for the FFT analysis thread
    pub fn tap(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.tap)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_clock_starts_paused_at_zero() {
        let clock = PlaybackClock::new();
        assert!(!clock.playing());
        assert_eq!(clock.position_ms(), 0);
    }

    #[test]
    fn test_clock_advances_only_while_playing() {
        let mut clock = PlaybackClock::new();
        clock.play();
        assert!(clock.playing());
        thread::sleep(Duration::from_millis(30));
        clock.pause();

        let at_pause = clock.position_ms();
        assert!(at_pause >= 25, "clock barely advanced: {}ms", at_pause);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(clock.position_ms(), at_pause);
    }

    #[test]
    fn test_clock_resumes_from_offset() {
        let mut clock = PlaybackClock::new();
        clock.play();
        thread::sleep(Duration::from_millis(20));
        clock.pause();
        let first = clock.position_ms();

        clock.play();
        thread::sleep(Duration::from_millis(20));
        assert!(clock.position_ms() >= first + 15);
    }

    #[test]
    fn test_toggle_flips_state() {
        let mut clock = PlaybackClock::new();
        clock.toggle();
        assert!(clock.playing());
        clock.toggle();
        assert!(!clock.playing());
    }

    #[test]
    fn test_track_duration() {
        let track = DecodedTrack {
            samples: vec![0.0; 44100 * 2],
            channels: 2,
            sample_rate: 44100,
        };
        assert_eq!(track.duration_ms(), 1000);
    }

    #[test]
    fn test_decode_missing_file_is_an_error() {
        let err = decode_wav(Path::new("/nonexistent/track.wav"));
        assert!(err.is_err());
    }
}
