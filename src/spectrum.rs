//! Spectrum sampling: FFT analysis thread plus the per-frame reduction of
//! the magnitude snapshot to `{bass, mid, treble, level}` scalars.
//!
//! While the track is paused a smooth synthetic oscillation stands in for
//! the analysis so preview mode stays animated.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::params::SpectrumConfig;

/// Per-frame band energies, all in [0, 1]
#[derive(Clone, Copy, Debug, Default)]
pub struct SpectrumFrame {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    /// Overall loudness: weighted mix of the peak band and the full-spectrum
    /// average
    pub level: f32,
}

/// Spawn the FFT analysis thread: drains the playback tap and publishes a
/// normalized magnitude snapshot (first `fft_size / 2` bins)
pub fn spawn_analysis_thread(
    config: SpectrumConfig,
    tap: Arc<Mutex<Vec<f32>>>,
    magnitudes: Arc<Mutex<Vec<f32>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let mut fft_input = vec![Complex::new(0.0, 0.0); config.fft_size];
        let mut fft_output = vec![Complex::new(0.0, 0.0); config.fft_size];
        let norm = 2.0 / config.fft_size as f32;

        loop {
            thread::sleep(Duration::from_millis(config.update_interval_ms));

            let mut tap_buf = tap.lock().unwrap();
            if tap_buf.len() < config.fft_size {
                continue;
            }

            // Apply Hann window
            for i in 0..config.fft_size {
                let window = hann_window(i, config.fft_size);
                fft_input[i] = Complex::new(tap_buf[i] * window, 0.0);
            }

            // 50% overlap (drain half the buffer)
            tap_buf.drain(0..config.fft_size / 2);
            drop(tap_buf);

            fft_output.copy_from_slice(&fft_input);
            fft.process(&mut fft_output);

            let mut mags = magnitudes.lock().unwrap();
            mags.clear();
            mags.extend(
                fft_output[..config.fft_size / 2]
                    .iter()
                    .map(|c| c.norm() * norm),
            );
        }
    })
}

/// Hann window function for FFT analysis
pub fn hann_window(index: usize, size: usize) -> f32 {
    0.5 * (1.0 - ((2.0 * PI * index as f32) / (size as f32 - 1.0)).cos())
}

/// Reduces magnitude snapshots to band scalars once per render tick
pub struct SpectrumSampler {
    config: SpectrumConfig,
}

impl SpectrumSampler {
    pub fn new(config: SpectrumConfig) -> Self {
        Self { config }
    }

    /// Reduce the current snapshot, or synthesize a preview level when the
    /// track is not playing (or analysis has produced nothing yet)
    pub fn sample(
        &self,
        magnitudes: Option<&[f32]>,
        sample_rate_hz: u32,
        playing: bool,
        time_s: f32,
    ) -> SpectrumFrame {
        match magnitudes {
            Some(mags) if playing && !mags.is_empty() => {
                self.reduce(mags, sample_rate_hz)
            }
            _ => self.preview(time_s),
        }
    }

    /// Band-average the magnitude snapshot and mix the overall level
    fn reduce(&self, mags: &[f32], sample_rate_hz: u32) -> SpectrumFrame {
        let c = &self.config;
        let bass = self.band_energy(mags, c.bass_range_hz, sample_rate_hz);
        let mid = self.band_energy(mags, c.mid_range_hz, sample_rate_hz);
        let treble = self.band_energy(mags, c.treble_range_hz, sample_rate_hz);

        let average =
            (mags.iter().sum::<f32>() / mags.len() as f32 * c.boost).clamp(0.0, 1.0);
        let peak = bass.max(mid).max(treble);
        let level = (peak * c.peak_weight + average * c.avg_weight).clamp(0.0, 1.0);

        SpectrumFrame {
            bass,
            mid,
            treble,
            level,
        }
    }

    fn band_energy(&self, mags: &[f32], range_hz: (f32, f32), sample_rate_hz: u32) -> f32 {
        let bins = self.config.band_bins(range_hz, sample_rate_hz, mags.len());
        if bins.is_empty() {
            return 0.0;
        }
        let len = bins.len() as f32;
        let sum: f32 = mags[bins].iter().sum();
        (sum / len * self.config.boost).clamp(0.0, 1.0)
    }

    /// Smooth synthetic oscillation for preview mode
    fn preview(&self, time_s: f32) -> SpectrumFrame {
        let level = ((time_s * self.config.preview_speed).sin() * 0.5 + 0.5).clamp(0.0, 1.0);
        SpectrumFrame {
            bass: level,
            mid: level * 0.8,
            treble: level * 0.6,
            level,
        }
    }
}
