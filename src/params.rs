//! Parameter definitions with physical units and documented semantics.
//!
//! All tuning constants live here with:
//! - Units (milliseconds, world units, Hz)
//! - Documented ranges and meanings
//! - `Default` impls carrying the canonical values

use std::ops::Range;

/// Cue lifecycle timing parameters (milliseconds of playback time)
#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Fade-in window before a cue's start time (ms)
    pub fade_in_ms: u64,

    /// Fade-out window after a cue's end time (ms)
    pub fade_out_ms: u64,

    /// Delay between a cue going inactive and its disposal (ms)
    pub disposal_delay_ms: u64,

    /// Cue target region half-extent on X (world units, centered on origin)
    pub target_spread_x: f32,

    /// Cue target region half-extent on Y (world units)
    pub target_spread_y: f32,

    /// Cue target depth range (world units, in front of the camera)
    pub target_depth: Range<f32>,

    /// Offset applied to the current position when a target is assigned,
    /// so the first frame after activation visibly interpolates (world units)
    pub entrance_jolt: f32,

    /// Letter scatter half-extent on X/Y at entrance (world units)
    pub scatter_spread: f32,

    /// Letter scatter depth range at entrance (world units)
    pub scatter_depth: Range<f32>,

    /// Per-letter interpolation rate range (fraction per frame)
    pub letter_rate: Range<f32>,

    /// Per-letter bob amplitude range, assigned at materialization
    /// (world units at audio level 1.0)
    pub letter_bob_amplitude: Range<f32>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            fade_in_ms: 150,
            fade_out_ms: 150,
            disposal_delay_ms: 5000,
            target_spread_x: 150.0,
            target_spread_y: 100.0,
            target_depth: -250.0..-50.0,
            entrance_jolt: 40.0,
            scatter_spread: 300.0,
            scatter_depth: -400.0..-200.0,
            letter_rate: 0.05..0.1,
            letter_bob_amplitude: 5.0..15.0,
        }
    }
}

/// Glyph layout parameters
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Base letter size (world units per em)
    pub letter_size: f32,

    /// Inter-letter spacing as a fraction of letter size
    pub spacing_fraction: f32,

    /// Width of a collapsed space run as a fraction of letter size
    pub space_fraction: f32,

    /// Maximum fraction of the viewport width a line may occupy
    pub max_line_fraction: f32,

    /// Maximum characters per line before word-wrapping into sibling cues
    pub max_line_chars: usize,

    /// Vertical distance between stacked sibling lines (world units)
    pub line_stack_spacing: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            letter_size: 55.0,
            spacing_fraction: 0.15,
            space_fraction: 0.6,
            max_line_fraction: 0.95,
            max_line_chars: 18,
            line_stack_spacing: 60.0,
        }
    }
}

/// Per-frame interpolation rates for the transform animator
#[derive(Debug, Clone)]
pub struct AnimatorConfig {
    /// Cue-group position lerp rate (fraction per frame)
    pub group_rate: f32,

    /// Cue-group orientation slerp rate (fraction per frame)
    pub group_spin_rate: f32,

    /// Multiplier applied to each letter's own rate (letters settle faster
    /// than the group)
    pub letter_rate_scale: f32,

    /// Letter rotation slerp rate toward identity (fraction per frame)
    pub letter_untumble_rate: f32,

    /// Letter visible-scale lerp rate (fraction per frame)
    pub scale_rate: f32,

    /// Letter bob angular speed (radians per second)
    pub bob_speed: f32,

    /// Phase advance between adjacent letters in the bob wave (radians)
    pub bob_letter_phase: f32,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            group_rate: 0.05,
            group_spin_rate: 0.01,
            letter_rate_scale: 2.0,
            letter_untumble_rate: 0.1,
            scale_rate: 0.15,
            bob_speed: 3.0,
            bob_letter_phase: 0.2,
        }
    }
}

/// Pointer-proximity scale effect parameters
#[derive(Debug, Clone)]
pub struct InteractionConfig {
    /// Effective radius of the pointer beam in world units
    pub radius: f32,

    /// Scale applied to letters outside the radius
    pub min_scale: f32,

    /// Scale applied at zero distance (before the audio boost)
    pub max_scale: f32,

    /// Extra max-scale headroom per unit of overall audio level
    pub level_boost: f32,

    /// Pointer-influence smoothing rate (fraction per frame)
    pub influence_rate: f32,

    /// How long pointer influence persists after the last event (ms)
    pub timeout_ms: u64,

    /// Depth attenuation: letters at the far end of this range are affected
    /// at `depth_floor`, letters at the near end at full strength
    pub depth_range: Range<f32>,

    /// Minimum depth attenuation factor
    pub depth_floor: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            radius: 120.0,
            min_scale: 1.0,
            max_scale: 4.5,
            level_boost: 0.8,
            influence_rate: 0.05,
            timeout_ms: 2000,
            depth_range: -500.0..100.0,
            depth_floor: 0.2,
        }
    }
}

/// FFT analysis and band-reduction configuration
#[derive(Debug, Clone)]
pub struct SpectrumConfig {
    /// FFT window size (must be a power of 2)
    pub fft_size: usize,

    /// Analysis thread update interval (ms)
    pub update_interval_ms: u64,

    /// Bass band (Hz)
    pub bass_range_hz: (f32, f32),

    /// Mid band (Hz)
    pub mid_range_hz: (f32, f32),

    /// Treble band (Hz)
    pub treble_range_hz: (f32, f32),

    /// Gain applied to averaged band magnitudes before clamping to [0, 1].
    /// Band averages of a normalized spectrum are small; this lifts a loud
    /// mix to roughly full scale
    pub boost: f32,

    /// Weight of the loudest band in the overall level
    pub peak_weight: f32,

    /// Weight of the full-spectrum average in the overall level
    pub avg_weight: f32,

    /// Synthetic oscillation angular speed while paused (radians per second)
    pub preview_speed: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            update_interval_ms: 16,
            bass_range_hz: (0.0, 150.0),
            mid_range_hz: (150.0, 1500.0),
            treble_range_hz: (1500.0, 5000.0),
            boost: 6.0,
            peak_weight: 0.7,
            avg_weight: 0.3,
            preview_speed: 1.0,
        }
    }
}

impl SpectrumConfig {
    /// Convert a frequency (Hz) to an FFT bin index for the given sample rate
    pub fn hz_to_bin(&self, hz: f32, sample_rate_hz: u32) -> usize {
        ((hz * self.fft_size as f32) / sample_rate_hz as f32) as usize
    }

    /// Bin range for a band, clipped to the available magnitude bins
    pub fn band_bins(
        &self,
        range_hz: (f32, f32),
        sample_rate_hz: u32,
        bins: usize,
    ) -> Range<usize> {
        let start = self.hz_to_bin(range_hz.0, sample_rate_hz).min(bins);
        let end = self.hz_to_bin(range_hz.1, sample_rate_hz).min(bins);
        start..end.max(start)
    }

    /// Validate configuration (FFT size must be power of 2)
    pub fn validate(&self) -> Result<(), String> {
        if !self.fft_size.is_power_of_two() {
            return Err(format!(
                "FFT size must be power of 2, got {}",
                self.fft_size
            ));
        }
        Ok(())
    }
}

/// Post-processing pipeline parameters
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Offscreen surface resolution as a fraction of the window size (0, 1]
    pub resolution_scale: f32,

    /// Feedback blend range: amount = lerp(range, audio level).
    /// Higher energy keeps more of the previous frame (longer trails)
    pub feedback_range: (f32, f32),

    /// Base glitch intensity multiplier
    pub glitch_intensity: f32,

    /// Extra glitch emphasis per unit of bass energy
    pub glitch_bass_emphasis: f32,

    /// Final gain on the glitch intensity
    pub glitch_gain: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            resolution_scale: 1.0,
            feedback_range: (0.92, 0.99),
            glitch_intensity: 2.5,
            glitch_bass_emphasis: 2.5,
            glitch_gain: 0.6,
        }
    }
}

impl CompositorConfig {
    /// Feedback blend amount for a given overall audio level
    pub fn feedback_amount(&self, level: f32) -> f32 {
        let (lo, hi) = self.feedback_range;
        lo + (hi - lo) * level.clamp(0.0, 1.0)
    }

    /// Glitch intensity for given overall level and bass energy
    pub fn glitch_amount(&self, level: f32, bass: f32) -> f32 {
        let strength = 1.0 + level * bass * self.glitch_bass_emphasis;
        level * level * self.glitch_intensity * strength * self.glitch_gain
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.resolution_scale > 0.0 && self.resolution_scale <= 1.0) {
            return Err(format!(
                "resolution scale must be in (0, 1], got {}",
                self.resolution_scale
            ));
        }
        Ok(())
    }
}

/// Camera and window configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Window width (logical pixels)
    pub window_width: u32,

    /// Window height (logical pixels)
    pub window_height: u32,

    /// Field of view (degrees)
    pub fov_degrees: f32,

    /// Near clipping plane (world units)
    pub near_plane: f32,

    /// Far clipping plane (world units)
    pub far_plane: f32,

    /// Camera rest distance from the origin (world units)
    pub camera_distance: f32,

    /// Pointer influence on the camera eye (world units at full deflection)
    pub eye_influence: f32,

    /// Pointer influence on the look-at point (world units at full deflection)
    pub look_influence: f32,

    /// Audio sway amplitudes per axis (world units at level 1.0)
    pub sway_amplitude: [f32; 3],

    /// Audio sway angular speeds per axis (radians per second)
    pub sway_speed: [f32; 3],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            fov_degrees: 60.0,
            near_plane: 10.0,
            far_plane: 2000.0,
            camera_distance: 250.0,
            eye_influence: 500.0,
            look_influence: 20.0,
            sway_amplitude: [5.0, 3.0, 17.0],
            sway_speed: [0.6, 0.9, 0.42],
        }
    }
}

impl RenderConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.window_width as f32 / self.window_height as f32
    }
}
