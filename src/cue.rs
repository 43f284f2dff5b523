//! Cue and letter data model.
//!
//! A `LyricCue` is one timed line of text; it exclusively owns its letters
//! (arena style, letters refer back by index) and its GPU instance buffer.
//! The activation state is a single enum so a cue cannot be simultaneously
//! disposed and displayable, or inactive without a defined disposal status.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};

/// Lifecycle state, advanced monotonically against the playback clock.
/// `Inactive { since_ms: Some(_) }` is a cue waiting out the disposal delay;
/// `Inactive { since_ms: None }` has not been shown since (re)creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Inactive { since_ms: Option<u64> },
    FadingIn,
    Active,
    FadingOut,
    Disposed,
}

impl ActivationState {
    /// Whether the cue should be drawn and animated this frame
    pub fn is_displayable(&self) -> bool {
        matches!(
            self,
            ActivationState::FadingIn | ActivationState::Active | ActivationState::FadingOut
        )
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, ActivationState::Disposed)
    }
}

/// One visible glyph of a cue. Slot offset is fixed at layout time; the
/// animator moves `position`/`rotation`/`scale` toward their targets.
#[derive(Debug, Clone)]
pub struct LetterElement {
    pub ch: char,

    /// Index of the owning cue in the timeline's arena
    pub cue_index: usize,

    /// Fixed slot offset within the cue group (set by the layout engine)
    pub slot: Vec3,

    /// Current interpolated offset within the cue group
    pub position: Vec3,

    /// Current interpolated rotation (slerped toward identity)
    pub rotation: Quat,

    /// Current visible scale (layout scale x interaction scale)
    pub scale: f32,

    /// Per-letter interpolation rate (fraction per frame)
    pub rate: f32,

    /// Per-letter bob amplitude (world units at audio level 1.0)
    pub bob_amp: f32,
}

/// GPU-side representation of a materialized cue: one instance buffer
/// holding a `LetterInstance` per visible letter. Dropped at disposal.
pub struct CueGpu {
    pub instances: wgpu::Buffer,
    pub capacity: u32,
}

/// Per-letter instance data consumed by the scene pipeline
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LetterInstance {
    pub model: [[f32; 4]; 4],
    /// Atlas sub-region: (u0, v0, u1, v1)
    pub uv_rect: [f32; 4],
    /// RGB + fade alpha
    pub color: [f32; 4],
}

/// A timed phrase line. Owned exclusively by the cue timeline.
pub struct LyricCue {
    pub id: usize,
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub color: [f32; 3],

    /// Parse-time vertical offset for sibling lines of a wrapped phrase;
    /// never re-randomized on activation
    pub stack_offset: Option<f32>,

    pub state: ActivationState,

    pub position: Vec3,
    pub target: Vec3,
    pub orientation: Quat,
    pub orientation_target: Quat,

    /// Line-fit scale computed once per (re)materialization
    pub layout_scale: f32,

    pub letters: Vec<LetterElement>,

    pub gpu: Option<CueGpu>,
}

impl LyricCue {
    /// Fade alpha for the current playback time: ramps up across the fade-in
    /// window, holds at 1 while active, ramps down across the fade-out window
    pub fn fade_alpha(&self, now_ms: u64, fade_in_ms: u64, fade_out_ms: u64) -> f32 {
        if now_ms + fade_in_ms >= self.start_ms && now_ms < self.start_ms {
            let into = now_ms + fade_in_ms - self.start_ms;
            return into as f32 / fade_in_ms.max(1) as f32;
        }
        if now_ms >= self.start_ms && now_ms <= self.end_ms {
            return 1.0;
        }
        if now_ms > self.end_ms && now_ms <= self.end_ms + fade_out_ms {
            let out = now_ms - self.end_ms;
            return 1.0 - out as f32 / fade_out_ms.max(1) as f32;
        }
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start_ms: u64, end_ms: u64) -> LyricCue {
        LyricCue {
            id: 0,
            text: "HELLO".to_string(),
            start_ms,
            end_ms,
            color: [1.0, 1.0, 1.0],
            stack_offset: None,
            state: ActivationState::Inactive { since_ms: None },
            position: Vec3::ZERO,
            target: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            orientation_target: Quat::IDENTITY,
            layout_scale: 1.0,
            letters: Vec::new(),
            gpu: None,
        }
    }

    #[test]
    fn test_displayable_states() {
        assert!(!ActivationState::Inactive { since_ms: None }.is_displayable());
        assert!(ActivationState::FadingIn.is_displayable());
        assert!(ActivationState::Active.is_displayable());
        assert!(ActivationState::FadingOut.is_displayable());
        assert!(!ActivationState::Disposed.is_displayable());
    }

    #[test]
    fn test_fade_alpha_envelope() {
        let cue = cue(1000, 2000);

        assert_eq!(cue.fade_alpha(800, 150, 150), 0.0);
        assert!(cue.fade_alpha(925, 150, 150) < 1.0);
        assert!(cue.fade_alpha(925, 150, 150) > 0.0);
        assert_eq!(cue.fade_alpha(1000, 150, 150), 1.0);
        assert_eq!(cue.fade_alpha(2000, 150, 150), 1.0);
        let fading = cue.fade_alpha(2100, 150, 150);
        assert!(fading > 0.0 && fading < 1.0);
        assert_eq!(cue.fade_alpha(2200, 150, 150), 0.0);
    }
}
