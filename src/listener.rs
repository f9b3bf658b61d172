//! The camera the mix is heard from, synced to the device once per tick.

use crate::device::{AudioDevice, ListenerParams};
use crate::math::{Pose, Vec3};
use std::sync::{Arc, Mutex, RwLock};

/// Camera-like source of the listener's placement.
pub trait Listener {
    fn global_position(&self) -> Vec3;
    /// Direction the listener faces
    fn forward(&self) -> Vec3;
    fn up(&self) -> Vec3;
}

impl Listener for Pose {
    fn global_position(&self) -> Vec3 {
        self.position
    }

    fn forward(&self) -> Vec3 {
        Pose::forward(self)
    }

    fn up(&self) -> Vec3 {
        Pose::up(self)
    }
}

impl Listener for Mutex<Pose> {
    fn global_position(&self) -> Vec3 {
        self.lock().map(|p| p.position).unwrap_or_else(|e| e.into_inner().position)
    }

    fn forward(&self) -> Vec3 {
        self.lock().map(|p| p.forward()).unwrap_or_else(|e| e.into_inner().forward())
    }

    fn up(&self) -> Vec3 {
        self.lock().map(|p| p.up()).unwrap_or_else(|e| e.into_inner().up())
    }
}

impl Listener for RwLock<Pose> {
    fn global_position(&self) -> Vec3 {
        self.read().map(|p| p.position).unwrap_or_else(|e| e.into_inner().position)
    }

    fn forward(&self) -> Vec3 {
        self.read().map(|p| p.forward()).unwrap_or_else(|e| e.into_inner().forward())
    }

    fn up(&self) -> Vec3 {
        self.read().map(|p| p.up()).unwrap_or_else(|e| e.into_inner().up())
    }
}

/// Holds the listener reference and the global 3D factors.
pub struct ListenerSync {
    listener: Option<Arc<dyn Listener>>,
    distance_factor: f32,
    rolloff_factor: f32,
    doppler_factor: f32,
}

impl ListenerSync {
    pub fn new(distance_factor: f32, rolloff_factor: f32, doppler_factor: f32) -> Self {
        Self {
            listener: None,
            distance_factor,
            rolloff_factor,
            doppler_factor,
        }
    }

    pub fn set_listener(&mut self, listener: Option<Arc<dyn Listener>>) {
        self.listener = listener;
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    pub fn set_factors(&mut self, distance: f32, rolloff: f32, doppler: f32) {
        self.distance_factor = distance;
        self.rolloff_factor = rolloff;
        self.doppler_factor = doppler;
    }

    /// Listener block for the current placement; the camera carries no velocity.
    pub fn params(&self) -> Option<ListenerParams> {
        self.listener.as_ref().map(|listener| ListenerParams {
            position: listener.global_position(),
            velocity: Vec3::ZERO,
            front: listener.forward(),
            top: listener.up(),
            distance_factor: self.distance_factor,
            rolloff_factor: self.rolloff_factor,
            doppler_factor: self.doppler_factor,
        })
    }

    /// Stage the listener block, then apply everything deferred this tick in one commit.
    pub fn sync(&self, device: &mut dyn AudioDevice) {
        if let Some(params) = self.params() {
            device.set_listener(&params);
        }
        device.commit_deferred_settings();
    }
}

impl std::fmt::Debug for ListenerSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSync")
            .field("has_listener", &self.listener.is_some())
            .field("distance_factor", &self.distance_factor)
            .field("rolloff_factor", &self.rolloff_factor)
            .field("doppler_factor", &self.doppler_factor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::VirtualDevice;

    #[test]
    fn test_sync_without_listener_still_commits() {
        let device = VirtualDevice::new();
        let mut handle = device.clone();
        let sync = ListenerSync::new(1.0, 1.0, 1.0);
        sync.sync(&mut handle);

        let snapshot = device.listener();
        assert_eq!(snapshot.commits, 1);
        assert_eq!(snapshot.params, ListenerParams::default());
    }

    #[test]
    fn test_sync_pushes_pose_and_factors() {
        let device = VirtualDevice::new();
        let mut handle = device.clone();
        let camera = Arc::new(Mutex::new(Pose::from_position(Vec3::new(1.0, 2.0, 3.0))));
        let mut sync = ListenerSync::new(1.0, 1.0, 1.0);
        sync.set_listener(Some(camera.clone() as Arc<dyn Listener>));
        sync.set_factors(0.5, 2.0, 0.0);
        sync.sync(&mut handle);

        let params = device.listener().params;
        assert_eq!(params.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(params.front, -Vec3::Z);
        assert_eq!(params.top, Vec3::Y);
        assert_eq!(params.velocity, Vec3::ZERO);
        assert_eq!(params.rolloff_factor, 2.0);

        if let Ok(mut pose) = camera.lock() {
            pose.look_at(Vec3::new(10.0, 2.0, 3.0));
        }
        sync.sync(&mut handle);
        assert!((device.listener().params.front - Vec3::X).length() < 1e-5);
        assert_eq!(device.listener().commits, 2);
    }
}
