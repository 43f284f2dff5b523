//! Transform animator: per-frame interpolation of cue groups and letters
//! plus the pointer-proximity scale effect.
//!
//! Pure computation over the cue arena; runs after the timeline advance and
//! before scene submission, never touching the GPU.

use glam::{Quat, Vec3};

use crate::cue::LyricCue;
use crate::params::{AnimatorConfig, InteractionConfig};
use crate::spectrum::SpectrumFrame;

pub struct TransformAnimator {
    config: AnimatorConfig,
    interaction: InteractionConfig,
}

impl TransformAnimator {
    pub fn new(config: AnimatorConfig, interaction: InteractionConfig) -> Self {
        Self {
            config,
            interaction,
        }
    }

    /// Advance every materialized, displayable cue by one frame
    pub fn update(
        &self,
        cues: &mut [LyricCue],
        frame: &SpectrumFrame,
        pointer_world: Option<Vec3>,
        time_s: f32,
    ) {
        for cue in cues.iter_mut() {
            if !cue.state.is_displayable() || cue.letters.is_empty() {
                continue;
            }

            cue.position = cue.position.lerp(cue.target, self.config.group_rate);
            cue.orientation = cue
                .orientation
                .slerp(cue.orientation_target, self.config.group_spin_rate);

            let group_pos = cue.position;
            let group_rot = cue.orientation;
            let layout_scale = cue.layout_scale;

            for (i, letter) in cue.letters.iter_mut().enumerate() {
                // Non-accumulating bob around the fixed slot
                let bob = (time_s * self.config.bob_speed
                    + i as f32 * self.config.bob_letter_phase)
                    .sin()
                    * letter.bob_amp
                    * frame.level
                    * 0.5;
                let slot_target = letter.slot + Vec3::new(0.0, bob, 0.0);

                let rate = (letter.rate * self.config.letter_rate_scale).min(1.0);
                letter.position = letter.position.lerp(slot_target, rate);
                letter.rotation = letter
                    .rotation
                    .slerp(Quat::IDENTITY, self.config.letter_untumble_rate);

                let world = group_pos + group_rot * letter.position;
                let proximity = match pointer_world {
                    Some(p) => self.proximity_scale(
                        (world.truncate() - p.truncate()).length(),
                        world.z,
                        frame.level,
                    ),
                    None => self.interaction.min_scale,
                };

                let target_scale = proximity * layout_scale;
                letter.scale += (target_scale - letter.scale) * self.config.scale_rate;
            }
        }
    }

    /// Pointer-proximity scale: inverse-quadratic smooth falloff inside the
    /// radius, attenuated by depth, max boosted by the audio level
    pub fn proximity_scale(&self, distance: f32, depth_z: f32, level: f32) -> f32 {
        let c = &self.interaction;
        let max_scale = c.max_scale + level.clamp(0.0, 1.0) * c.level_boost;
        if distance >= c.radius {
            return c.min_scale;
        }

        let depth_span = c.depth_range.end - c.depth_range.start;
        let depth_factor = if depth_span.abs() < f32::EPSILON {
            1.0
        } else {
            let t = (depth_z - c.depth_range.start) / depth_span;
            (c.depth_floor + (1.0 - c.depth_floor) * t.clamp(0.0, 1.0)).clamp(c.depth_floor, 1.0)
        };

        let influence = (1.0 - distance / c.radius) * depth_factor;
        let eased = influence * influence * (3.0 - 2.0 * influence);
        (c.min_scale + (max_scale - c.min_scale) * eased).clamp(c.min_scale, max_scale)
    }
}
