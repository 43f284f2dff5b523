//! Interaction-driven camera: pointer/touch influence with timed decay,
//! audio-level sway, and the projection helpers the layout engine and
//! animator need (world viewport width, pointer ray onto a depth plane).

use glam::{Mat4, Vec2, Vec3};

use crate::params::{InteractionConfig, RenderConfig};

/// Camera pose for one frame
#[derive(Debug, Clone, Copy)]
pub struct CameraPose {
    pub eye: Vec3,
    pub look_at: Vec3,
    pub view_proj: Mat4,
}

pub struct CameraSystem {
    render: RenderConfig,
    interaction: InteractionConfig,

    /// Smoothed pointer influence, window convention, each axis in [-1, 1]
    influence: Vec2,
    target_influence: Vec2,
    last_interaction_ms: Option<u64>,

    pose: CameraPose,
}

impl CameraSystem {
    pub fn new(render: RenderConfig, interaction: InteractionConfig) -> Self {
        let eye = Vec3::new(0.0, 0.0, render.camera_distance);
        let pose = CameraPose {
            eye,
            look_at: Vec3::ZERO,
            view_proj: Mat4::IDENTITY,
        };
        let mut camera = Self {
            render,
            interaction,
            influence: Vec2::ZERO,
            target_influence: Vec2::ZERO,
            last_interaction_ms: None,
            pose,
        };
        camera.update(0.0, 0.0, 0);
        camera
    }

    /// Feed a pointer/touch position in normalized window coordinates
    /// (0..1, origin top-left)
    pub fn set_pointer(&mut self, norm_x: f32, norm_y: f32, now_ms: u64) {
        self.target_influence = Vec2::new(norm_x * 2.0 - 1.0, norm_y * 2.0 - 1.0);
        self.last_interaction_ms = Some(now_ms);
    }

    /// Re-arm the interaction window without moving the control target
    /// (pointer press, touch tap)
    pub fn set_pointer_refresh(&mut self, now_ms: u64) {
        self.last_interaction_ms = Some(now_ms);
    }

    /// Feed a device-orientation sample (degrees): gamma tilts map to X,
    /// beta tilts to Y, onto the same control target as the pointer
    pub fn set_orientation(&mut self, beta_deg: f32, gamma_deg: f32, now_ms: u64) {
        let x = (gamma_deg / 45.0).clamp(-1.0, 1.0);
        let y = (beta_deg / 45.0).clamp(-1.0, 1.0);
        self.target_influence = Vec2::new(x, y);
        self.last_interaction_ms = Some(now_ms);
    }

    /// Update the projection for a new window size
    pub fn resize(&mut self, width: u32, height: u32) {
        self.render.window_width = width.max(1);
        self.render.window_height = height.max(1);
    }

    /// Advance the pose for this frame. `now_ms` is app wall time, used for
    /// the interaction decay; `level` sways the eye with the music.
    pub fn update(&mut self, time_s: f32, level: f32, now_ms: u64) -> CameraPose {
        // Interaction strength: full while events arrive, fading to zero
        // across the timeout after the last one
        let strength = match self.last_interaction_ms {
            Some(last) => {
                let elapsed = now_ms.saturating_sub(last) as f32;
                (1.0 - elapsed / self.interaction.timeout_ms as f32).max(0.0)
            }
            None => 0.0,
        };

        let rate = self.interaction.influence_rate;
        self.influence = self.influence.lerp(self.target_influence, rate);

        let r = &self.render;
        let sway = Vec3::new(
            (time_s * r.sway_speed[0]).sin() * r.sway_amplitude[0] * level,
            (time_s * r.sway_speed[1]).cos() * r.sway_amplitude[1] * level,
            (time_s * r.sway_speed[2]).sin() * r.sway_amplitude[2] * level,
        );

        let eye = Vec3::new(
            self.influence.x * r.eye_influence * strength,
            self.influence.y * r.eye_influence * strength,
            r.camera_distance,
        ) + sway;

        let look_at = Vec3::new(
            self.influence.x * r.look_influence * strength,
            self.influence.y * r.look_influence * strength * 0.75,
            0.0,
        );

        let view = Mat4::look_at_rh(eye, look_at, Vec3::Y);
        let proj = Mat4::perspective_rh(
            r.fov_degrees.to_radians(),
            r.aspect_ratio(),
            r.near_plane,
            r.far_plane,
        );

        self.pose = CameraPose {
            eye,
            look_at,
            view_proj: proj * view,
        };
        self.pose
    }

    pub fn pose(&self) -> CameraPose {
        self.pose
    }

    /// Whether pointer influence is still in effect (an event arrived within
    /// the timeout)
    pub fn interaction_active(&self, now_ms: u64) -> bool {
        self.last_interaction_ms
            .is_some_and(|last| now_ms.saturating_sub(last) <= self.interaction.timeout_ms)
    }

    /// Intersect the pointer ray with the plane `z = plane_z` (world space).
    /// Falls back to the plane center when the ray runs parallel to it.
    pub fn world_point_on_plane(&self, plane_z: f32) -> Vec3 {
        // Window convention Y points down, NDC Y points up
        let ndc = Vec2::new(self.influence.x, -self.influence.y);

        let inv = self.pose.view_proj.inverse();
        let far = inv.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
        let dir = (far - self.pose.eye).normalize_or_zero();

        if dir.z.abs() < 1e-5 {
            return Vec3::new(0.0, 0.0, plane_z);
        }
        let t = (plane_z - self.pose.eye.z) / dir.z;
        self.pose.eye + dir * t
    }

    /// World-space width visible at the given depth plane
    pub fn viewport_world_width(&self, plane_z: f32) -> f32 {
        let distance = (self.render.camera_distance - plane_z).abs();
        2.0 * distance * (self.render.fov_degrees.to_radians() / 2.0).tan()
            * self.render.aspect_ratio()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraSystem {
        CameraSystem::new(RenderConfig::default(), InteractionConfig::default())
    }

    #[test]
    fn test_rest_pose_sits_on_axis() {
        let mut camera = camera();
        let pose = camera.update(0.0, 0.0, 0);
        assert_eq!(pose.eye.x, 0.0);
        assert_eq!(pose.eye.y, 0.0);
        assert_eq!(pose.eye.z, RenderConfig::default().camera_distance);
        assert_ne!(pose.view_proj, Mat4::IDENTITY);
    }

    #[test]
    fn test_pointer_influence_pulls_eye() {
        let mut camera = camera();
        camera.set_pointer(1.0, 0.5, 0);
        // Influence smooths in over several frames
        let mut pose = camera.pose();
        for _ in 0..60 {
            pose = camera.update(0.0, 0.0, 0);
        }
        assert!(pose.eye.x > 10.0);
        assert!(pose.eye.y.abs() < 1.0);
    }

    #[test]
    fn test_influence_decays_after_timeout() {
        let mut camera = camera();
        camera.set_pointer(1.0, 1.0, 0);
        for _ in 0..60 {
            camera.update(0.0, 0.0, 0);
        }

        // Past the timeout the strength term zeroes the deflection even
        // though the smoothed influence is still nonzero
        let timeout = InteractionConfig::default().timeout_ms;
        let pose = camera.update(0.0, 0.0, timeout + 1);
        assert_eq!(pose.eye.x, 0.0);
        assert_eq!(pose.eye.y, 0.0);
    }

    #[test]
    fn test_audio_sway_moves_eye() {
        let mut camera = camera();
        let still = camera.update(1.0, 0.0, 0);
        let swaying = camera.update(1.0, 1.0, 0);
        assert_ne!(still.eye, swaying.eye);
    }

    #[test]
    fn test_world_point_lands_on_plane() {
        let mut camera = camera();
        camera.update(0.0, 0.0, 0);
        let point = camera.world_point_on_plane(-150.0);
        assert!((point.z - -150.0).abs() < 1e-3);
    }

    #[test]
    fn test_world_point_follows_pointer_direction() {
        let mut camera = camera();
        camera.set_pointer(1.0, 0.5, 0);
        for _ in 0..60 {
            camera.update(0.0, 0.0, 0);
        }
        let right = camera.world_point_on_plane(-150.0);

        camera.set_pointer(0.0, 0.5, 1);
        for _ in 0..120 {
            camera.update(0.0, 0.0, 1);
        }
        let left = camera.world_point_on_plane(-150.0);
        assert!(right.x > left.x);
    }

    #[test]
    fn test_viewport_width_grows_with_depth() {
        let camera = camera();
        let near = camera.viewport_world_width(0.0);
        let far = camera.viewport_world_width(-200.0);
        assert!(far > near);
        assert!(near > 0.0);
    }

    #[test]
    fn test_resize_updates_aspect() {
        let mut camera = camera();
        let wide = camera.viewport_world_width(-100.0);
        camera.resize(640, 640);
        let square = camera.viewport_world_width(-100.0);
        assert!(wide > square);
    }

    #[test]
    fn test_interaction_active_window() {
        let mut camera = camera();
        assert!(!camera.interaction_active(0));

        camera.set_pointer(0.5, 0.5, 100);
        let timeout = InteractionConfig::default().timeout_ms;
        assert!(camera.interaction_active(100));
        assert!(camera.interaction_active(100 + timeout));
        assert!(!camera.interaction_active(101 + timeout));
    }

    #[test]
    fn test_orientation_maps_to_same_target() {
        let mut camera = camera();
        camera.set_orientation(0.0, 45.0, 0);
        for _ in 0..60 {
            camera.update(0.0, 0.0, 0);
        }
        assert!(camera.pose().eye.x > 10.0);
    }
}
