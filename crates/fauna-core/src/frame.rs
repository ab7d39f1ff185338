//! Render/frame driver: the fallback preview loop and the XR frame loop,
//! never both at once

use bevy_math::Mat4;
use std::f32::consts::TAU;
use tracing::debug;

use crate::model::ModelGroup;
use crate::port::{FrameLoop, XrDevice, XrFrame};

/// Where the camera pose for a rendered frame comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraSource {
    /// Fixed preview camera from the config
    Fallback,
    /// Viewer pose reported by the device
    Device(Mat4),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// The tick belongs to a loop that is not the active one
    Inactive,
    /// No usable device frame; nothing is rendered
    Skipped,
    Render(CameraSource),
}

#[derive(Debug, Clone)]
pub struct FrameDriver {
    mode: FrameLoop,
    spin_per_frame: f32,
}

impl FrameDriver {
    /// Driver in the `Stopped` state; call [`FrameDriver::switch_to`] to
    /// register the first loop.
    pub fn new(spin_per_frame: f32) -> Self {
        Self {
            mode: FrameLoop::Stopped,
            spin_per_frame,
        }
    }

    pub fn mode(&self) -> FrameLoop {
        self.mode
    }

    /// Stop the current loop, then start `mode`. Switching to the current
    /// mode does nothing.
    pub fn switch_to(&mut self, mode: FrameLoop, device: &mut impl XrDevice) {
        if self.mode == mode {
            return;
        }
        if self.mode != FrameLoop::Stopped {
            device.stop_frame_loop();
        }
        if mode != FrameLoop::Stopped {
            device.start_frame_loop(mode);
        }
        debug!("Frame loop {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
    }

    pub fn stop(&mut self, device: &mut impl XrDevice) {
        self.switch_to(FrameLoop::Stopped, device);
    }

    /// One preview tick: spin the prefab and render from the fallback camera
    pub fn fallback_tick(&self, prefab: &mut ModelGroup) -> FrameOutcome {
        if self.mode != FrameLoop::Fallback {
            return FrameOutcome::Inactive;
        }
        let transform = &mut prefab.transform;
        transform.yaw = (transform.yaw + self.spin_per_frame).rem_euclid(TAU);
        FrameOutcome::Render(CameraSource::Fallback)
    }

    /// One device tick. `update` runs the per-frame placement work when a
    /// frame is present; rendering also needs a viewer pose.
    pub fn xr_tick<F: XrFrame>(&self, frame: Option<&F>, update: impl FnOnce(&F)) -> FrameOutcome {
        if self.mode != FrameLoop::Xr {
            return FrameOutcome::Inactive;
        }
        let Some(frame) = frame else {
            return FrameOutcome::Skipped;
        };
        update(frame);
        match frame.viewer_pose() {
            Some(pose) => FrameOutcome::Render(CameraSource::Device(pose)),
            None => FrameOutcome::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRegistry;
    use crate::port::FrameSample;
    use crate::testing::{DeviceCall, RecordingDevice};
    use bevy_math::Vec3;

    #[test]
    fn test_switching_never_overlaps_loops() {
        let mut device = RecordingDevice::new();
        let mut driver = FrameDriver::new(0.01);

        driver.switch_to(FrameLoop::Fallback, &mut device);
        driver.switch_to(FrameLoop::Fallback, &mut device);
        driver.switch_to(FrameLoop::Xr, &mut device);
        driver.stop(&mut device);
        driver.stop(&mut device);
        driver.switch_to(FrameLoop::Fallback, &mut device);

        assert_eq!(
            device.calls,
            vec![
                DeviceCall::StartFrameLoop(FrameLoop::Fallback),
                DeviceCall::StopFrameLoop,
                DeviceCall::StartFrameLoop(FrameLoop::Xr),
                DeviceCall::StopFrameLoop,
                DeviceCall::StartFrameLoop(FrameLoop::Fallback),
            ]
        );

        // Replay the calls: at most one loop registered at any point
        let mut running = 0i32;
        for call in &device.calls {
            match call {
                DeviceCall::StartFrameLoop(_) => running += 1,
                DeviceCall::StopFrameLoop => running -= 1,
                _ => {}
            }
            assert!((0..=1).contains(&running));
        }
    }

    #[test]
    fn test_fallback_tick_spins_prefab() {
        let mut device = RecordingDevice::new();
        let mut driver = FrameDriver::new(0.5);
        let mut prefab = ModelRegistry::default().prefab(Vec3::ZERO);

        assert_eq!(driver.fallback_tick(&mut prefab), FrameOutcome::Inactive);
        assert_eq!(prefab.transform.yaw, 0.0);

        driver.switch_to(FrameLoop::Fallback, &mut device);
        for _ in 0..3 {
            assert_eq!(driver.fallback_tick(&mut prefab), FrameOutcome::Render(CameraSource::Fallback));
        }
        assert!((prefab.transform.yaw - 1.5).abs() < 1e-6);

        for _ in 0..20 {
            driver.fallback_tick(&mut prefab);
        }
        assert!(prefab.transform.yaw < TAU);
    }

    #[test]
    fn test_xr_tick_without_frame_is_skipped() {
        let mut device = RecordingDevice::new();
        let mut driver = FrameDriver::new(0.01);
        driver.switch_to(FrameLoop::Xr, &mut device);

        let mut updated = false;
        let outcome = driver.xr_tick(None::<&FrameSample>, |_| updated = true);
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert!(!updated);

        let frame = FrameSample {
            viewer: Some(Mat4::from_translation(Vec3::Y)),
            ..Default::default()
        };
        let outcome = driver.xr_tick(Some(&frame), |_| updated = true);
        assert!(updated);
        assert_eq!(
            outcome,
            FrameOutcome::Render(CameraSource::Device(Mat4::from_translation(Vec3::Y)))
        );

        let blind = FrameSample::default();
        assert_eq!(driver.xr_tick(Some(&blind), |_| {}), FrameOutcome::Skipped);
    }

    #[test]
    fn test_xr_tick_inactive_in_fallback() {
        let mut device = RecordingDevice::new();
        let mut driver = FrameDriver::new(0.01);
        driver.switch_to(FrameLoop::Fallback, &mut device);

        let frame = FrameSample::default();
        assert_eq!(driver.xr_tick(Some(&frame), |_| {}), FrameOutcome::Inactive);
    }
}
