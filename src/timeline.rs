//! Cue timeline: the lyric-cue lifecycle state machine.
//!
//! Owns every `LyricCue` and its GPU-backed representation. `advance` moves
//! each cue through `inactive -> fading-in -> active -> fading-out ->
//! inactive` against the playback clock, re-materializing cues as their
//! windows arrive and disposing them once they have sat inactive for the
//! configured delay. Disposal is permanent: a disposed cue is skipped by all
//! future advances, even if its window recurs after a backward seek.

use glam::{EulerRot, Quat, Vec3};
use rand::Rng;

use crate::cue::{ActivationState, LetterElement, LyricCue};
use crate::layout::{layout_line, GlyphMetrics};
use crate::params::{LayoutConfig, TimelineConfig};
use crate::script::ScriptEntry;

/// Everything materialization needs besides the clock: atlas metrics and the
/// current world-space viewport width for line fitting
pub struct LayoutContext<'a> {
    pub metrics: &'a dyn GlyphMetrics,
    pub layout: &'a LayoutConfig,
    pub viewport_world_width: f32,
}

pub struct CueTimeline {
    cues: Vec<LyricCue>,
    config: TimelineConfig,
    disposals: usize,
}

impl CueTimeline {
    /// Build the timeline from parsed script entries
    pub fn new(entries: Vec<ScriptEntry>, config: TimelineConfig) -> Self {
        let cues = entries
            .into_iter()
            .enumerate()
            .map(|(id, entry)| LyricCue {
                id,
                text: entry.text,
                start_ms: entry.start_ms,
                end_ms: entry.end_ms,
                color: entry.color,
                stack_offset: entry.stack_offset,
                state: ActivationState::Inactive { since_ms: None },
                position: Vec3::ZERO,
                target: Vec3::ZERO,
                orientation: Quat::IDENTITY,
                orientation_target: Quat::IDENTITY,
                layout_scale: 1.0,
                letters: Vec::new(),
                gpu: None,
            })
            .collect();

        Self {
            cues,
            config,
            disposals: 0,
        }
    }

    pub fn cues(&self) -> &[LyricCue] {
        &self.cues
    }

    pub fn cues_mut(&mut self) -> &mut [LyricCue] {
        &mut self.cues
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Total disposal events since creation
    pub fn disposal_count(&self) -> usize {
        self.disposals
    }

    /// Average depth (Z) of displayable cues, if any are on screen.
    /// Used as the interaction plane for the pointer beam.
    pub fn average_active_depth(&self) -> Option<f32> {
        let mut sum = 0.0;
        let mut count = 0;
        for cue in &self.cues {
            if cue.state.is_displayable() {
                sum += cue.position.z;
                count += 1;
            }
        }
        (count > 0).then(|| sum / count as f32)
    }

    /// Advance every cue's activation state to the given playback time
    pub fn advance<R: Rng>(&mut self, now_ms: u64, ctx: &LayoutContext, rng: &mut R) {
        for i in 0..self.cues.len() {
            let cue = &mut self.cues[i];
            if cue.state.is_disposed() {
                continue;
            }

            let displayable = now_ms + self.config.fade_in_ms >= cue.start_ms
                && now_ms <= cue.end_ms + self.config.fade_out_ms;

            if displayable {
                let phase = if now_ms < cue.start_ms {
                    ActivationState::FadingIn
                } else if now_ms <= cue.end_ms {
                    ActivationState::Active
                } else {
                    ActivationState::FadingOut
                };

                if let ActivationState::Inactive { .. } = cue.state {
                    Self::materialize(cue, i, &self.config, ctx, rng);
                }
                cue.state = phase;
            } else {
                match cue.state {
                    ActivationState::Inactive { since_ms: Some(since) } => {
                        if now_ms >= since + self.config.disposal_delay_ms {
                            if Self::dispose(cue) {
                                self.disposals += 1;
                                log::debug!("disposed cue {} ({:?})", cue.id, cue.text);
                            }
                        }
                    }
                    ActivationState::Inactive { since_ms: None } => {}
                    // Just left its window
                    _ => {
                        cue.state = ActivationState::Inactive {
                            since_ms: Some(now_ms),
                        };
                    }
                }
            }
        }
    }

    /// Release a cue's letters and GPU buffer and mark it disposed.
    /// Returns false (and does nothing) when already disposed.
    pub fn dispose(cue: &mut LyricCue) -> bool {
        if cue.state.is_disposed() {
            return false;
        }
        cue.letters.clear();
        cue.gpu = None;
        cue.state = ActivationState::Disposed;
        true
    }

    /// Give a newly displayable cue a fresh target, scattered letters, and a
    /// recomputed layout
    fn materialize<R: Rng>(
        cue: &mut LyricCue,
        cue_index: usize,
        config: &TimelineConfig,
        ctx: &LayoutContext,
        rng: &mut R,
    ) {
        let x = rng.random_range(-config.target_spread_x..config.target_spread_x);
        // Sibling lines of a wrapped phrase keep their parse-time stack
        // offset so the lines stay vertically ordered
        let y = cue.stack_offset.unwrap_or_else(|| {
            rng.random_range(-config.target_spread_y..config.target_spread_y)
        });
        let z = rng.random_range(config.target_depth.clone());
        cue.target = Vec3::new(x, y, z);

        // Offset the current position so the first frames visibly glide in
        let jolt = config.entrance_jolt;
        cue.position = cue.target
            + Vec3::new(
                rng.random_range(-jolt..jolt),
                rng.random_range(-jolt..jolt),
                rng.random_range(-jolt..jolt),
            );

        cue.orientation = Quat::IDENTITY;
        cue.orientation_target = Quat::from_euler(
            EulerRot::XYZ,
            rng.random_range(-0.2..0.2),
            rng.random_range(-0.2..0.2),
            rng.random_range(-0.2..0.2),
        );

        let line = layout_line(&cue.text, ctx.metrics, ctx.layout, ctx.viewport_world_width);
        cue.layout_scale = line.scale;

        let spread = config.scatter_spread;
        cue.letters = line
            .slots
            .into_iter()
            .map(|(ch, slot)| LetterElement {
                ch,
                cue_index,
                slot,
                position: Vec3::new(
                    rng.random_range(-spread..spread),
                    rng.random_range(-spread..spread),
                    rng.random_range(config.scatter_depth.clone()),
                ),
                rotation: Quat::from_euler(
                    EulerRot::XYZ,
                    rng.random_range(0.0..std::f32::consts::TAU),
                    rng.random_range(0.0..std::f32::consts::TAU),
                    rng.random_range(0.0..std::f32::consts::TAU),
                ),
                scale: 0.0,
                rate: rng.random_range(config.letter_rate.clone()),
                bob_amp: rng.random_range(config.letter_bob_amplitude.clone()),
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::MonospaceMetrics;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn entry(text: &str, start_ms: u64, end_ms: u64) -> ScriptEntry {
        ScriptEntry {
            text: text.to_string(),
            start_ms,
            end_ms,
            color: [1.0, 1.0, 1.0],
            stack_offset: None,
        }
    }

    fn timeline(entries: Vec<ScriptEntry>) -> CueTimeline {
        CueTimeline::new(entries, TimelineConfig::default())
    }

    fn advance(tl: &mut CueTimeline, now_ms: u64) {
        let metrics = MonospaceMetrics(0.6);
        let layout = LayoutConfig::default();
        let ctx = LayoutContext {
            metrics: &metrics,
            layout: &layout,
            viewport_world_width: 800.0,
        };
        let mut rng = StdRng::seed_from_u64(42);
        tl.advance(now_ms, &ctx, &mut rng);
    }

    #[test]
    fn test_activation_windows() {
        let mut tl = timeline(vec![entry("HELLO", 1000, 2000)]);

        advance(&mut tl, 900);
        assert_eq!(tl.cues()[0].state, ActivationState::FadingIn);

        advance(&mut tl, 1999);
        assert_eq!(tl.cues()[0].state, ActivationState::Active);

        advance(&mut tl, 2100);
        assert_eq!(tl.cues()[0].state, ActivationState::FadingOut);

        advance(&mut tl, 2151);
        assert_eq!(
            tl.cues()[0].state,
            ActivationState::Inactive {
                since_ms: Some(2151)
            }
        );
    }

    #[test]
    fn test_not_displayable_before_fade_in() {
        let mut tl = timeline(vec![entry("HELLO", 1000, 2000)]);
        advance(&mut tl, 849);
        assert_eq!(
            tl.cues()[0].state,
            ActivationState::Inactive { since_ms: None }
        );
        assert!(tl.cues()[0].letters.is_empty());
    }

    #[test]
    fn test_materialization_populates_letters_and_target() {
        let mut tl = timeline(vec![entry("HELLO", 1000, 2000)]);
        advance(&mut tl, 1000);

        let cue = &tl.cues()[0];
        assert_eq!(cue.letters.len(), 5);
        assert_ne!(cue.position, cue.target);
        assert!(cue.layout_scale > 0.0 && cue.layout_scale <= 1.0);
        for letter in &cue.letters {
            assert_eq!(letter.cue_index, 0);
            // Letters start scattered, away from their slots
            assert_ne!(letter.position, letter.slot);
        }
    }

    #[test]
    fn test_stacked_sibling_keeps_parse_time_offset() {
        let mut first = entry("ONE", 1000, 2000);
        first.stack_offset = Some(30.0);
        let mut second = entry("TWO", 1000, 2000);
        second.stack_offset = Some(-30.0);

        let mut tl = timeline(vec![first, second]);
        advance(&mut tl, 1000);
        assert_eq!(tl.cues()[0].target.y, 30.0);
        assert_eq!(tl.cues()[1].target.y, -30.0);

        // Deactivate, wait, reactivate: Y is still the stack offset
        advance(&mut tl, 2200);
        advance(&mut tl, 2300);
        // (window recurrence simulated by a backward seek)
        advance(&mut tl, 1500);
        assert_eq!(tl.cues()[0].target.y, 30.0);
        assert_eq!(tl.cues()[1].target.y, -30.0);
    }

    #[test]
    fn test_disposal_fires_exactly_once_after_delay() {
        let mut tl = timeline(vec![entry("HELLO", 1000, 2000)]);
        advance(&mut tl, 1500);
        advance(&mut tl, 2200); // inactive since 2200

        advance(&mut tl, 2200 + 4999);
        assert_eq!(tl.disposal_count(), 0);
        assert!(!tl.cues()[0].state.is_disposed());

        advance(&mut tl, 2200 + 5000);
        assert_eq!(tl.disposal_count(), 1);
        assert!(tl.cues()[0].state.is_disposed());
        assert!(tl.cues()[0].letters.is_empty());
        assert!(tl.cues()[0].gpu.is_none());

        // Later ticks never dispose again
        advance(&mut tl, 2200 + 60_000);
        assert_eq!(tl.disposal_count(), 1);
    }

    #[test]
    fn test_dispose_twice_is_noop() {
        let mut tl = timeline(vec![entry("HELLO", 1000, 2000)]);
        advance(&mut tl, 1500);

        assert!(CueTimeline::dispose(&mut tl.cues_mut()[0]));
        assert!(!CueTimeline::dispose(&mut tl.cues_mut()[0]));
    }

    #[test]
    fn test_reactivation_from_inactive_before_disposal() {
        let mut tl = timeline(vec![entry("HELLO", 1000, 2000)]);
        advance(&mut tl, 1500);
        advance(&mut tl, 2200); // inactive, disposal pending

        // Seek back into the window before the delay elapses
        advance(&mut tl, 1500);
        assert_eq!(tl.cues()[0].state, ActivationState::Active);
        assert_eq!(tl.cues()[0].letters.len(), 5);

        // The pending disposal timestamp was discarded by reactivation
        advance(&mut tl, 2200 + 5000 - 1);
        advance(&mut tl, 2200 + 5000);
        // Inactive again since 2200+4999; not yet disposed
        assert_eq!(tl.disposal_count(), 0);
    }

    #[test]
    fn test_disposed_cue_never_rematerializes() {
        let mut tl = timeline(vec![entry("HELLO", 1000, 2000)]);
        advance(&mut tl, 1500);
        advance(&mut tl, 2200);
        advance(&mut tl, 2200 + 5000);
        assert!(tl.cues()[0].state.is_disposed());

        // Its window recurs after a backward seek; the cue stays dead
        advance(&mut tl, 1500);
        assert!(tl.cues()[0].state.is_disposed());
        assert!(tl.cues()[0].letters.is_empty());
        assert_eq!(tl.disposal_count(), 1);
    }

    #[test]
    fn test_average_active_depth() {
        let mut tl = timeline(vec![entry("A", 1000, 2000), entry("B", 5000, 6000)]);
        assert_eq!(tl.average_active_depth(), None);

        advance(&mut tl, 1500);
        let depth = tl.average_active_depth().unwrap();
        let range = TimelineConfig::default().target_depth;
        // Position starts near the target, which sits inside the depth range
        let jolt = TimelineConfig::default().entrance_jolt;
        assert!(depth > range.start - jolt && depth < range.end + jolt);
    }

    #[test]
    fn test_end_to_end_single_cue_disposal() {
        // One cue {HELLO, 1000, 3000}: displayable until 3150, so the first
        // tick past that records inactivity and disposal lands >= 3150+5000
        let mut tl = timeline(vec![entry("HELLO", 1000, 3000)]);

        let mut disposal_times = Vec::new();
        let mut t = 0;
        while t <= 12_000 {
            let before = tl.disposal_count();
            advance(&mut tl, t);
            if tl.disposal_count() > before {
                disposal_times.push(t);
            }
            t += 100;
        }

        assert_eq!(disposal_times.len(), 1);
        assert!(
            disposal_times[0] >= 3150 + 5000,
            "disposed too early at {}",
            disposal_times[0]
        );
    }
}
