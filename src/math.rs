//! Math types for TagSonic

pub use glam::{Quat, Vec3};

/// Position and orientation of a listener.
///
/// Uses a right-handed, Y-up frame where the default forward direction is -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Turn to face `target`, keeping the current position.
    pub fn look_at(&mut self, target: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward != Vec3::ZERO {
            self.rotation = Quat::from_rotation_arc(-Vec3::Z, forward);
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Position and velocity of something that emits sound.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Kinematics {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Kinematics {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self { position, velocity }
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
        }
    }

    /// Move along the current velocity for `elapsed_ms`.
    pub fn step(&mut self, elapsed_ms: u32) {
        self.position += self.velocity * (elapsed_ms as f32 / 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_axes() {
        let pose = Pose::identity();
        assert_eq!(pose.forward(), -Vec3::Z);
        assert_eq!(pose.up(), Vec3::Y);
        assert_eq!(pose.right(), Vec3::X);
    }

    #[test]
    fn test_look_at_turns_forward() {
        let mut pose = Pose::from_position(Vec3::ZERO);
        pose.look_at(Vec3::new(10.0, 0.0, 0.0));
        assert!(pose.forward().abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn test_kinematics_step() {
        let mut body = Kinematics::new(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0));
        body.step(500);
        assert!(body.position.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
    }
}
