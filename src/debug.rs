//! Software stand-ins for headset hardware. A session falls back to `DebugDevice` when no headset
//! is detected, so applications can be developed and exercised without a device attached.

use std::time::Instant;

use log::debug;

use crate::device::{CameraFrustum, EyeRenderDesc, FrameTiming, HmdCaps, HmdDescription, HmdType,
                    LayerEyeFov, MirrorTexture, Runtime, StatusFlags, SubmitStatus,
                    SwapTextureSet, TextureFormat, TrackingCaps, TrackingDevice, TrackingState,
                    ViewScaleDesc};
use crate::math::{FovPort, Pose, Size, Vector3, Viewport};
use crate::target::TextureId;
use crate::{Eye, HmdError, HmdResult};

const DK2_REFRESH_RATE: f64 = 75.0;
const DK2_PIXELS_PER_TAN_ANGLE: f32 = 549.618;
const DK2_IPD: f32 = 0.064;
const SWAP_CHAIN_LENGTH: u32 = 3;

/// Latency samples (in seconds) reported under the "DK2Latency" property.
const DEBUG_LATENCIES: [f32; 3] = [0.0135, 0.0042, 0.0];

fn description_for(hmd_type: HmdType) -> HmdDescription {
    let left_fov = FovPort::new(1.3292, 1.3292, 1.0586, 1.0924);
    let (resolution, product_name) = match hmd_type {
        HmdType::Dk1 => (Size::new(1280, 800), "Oculus Rift DK1 (debug)"),
        _ => (Size::new(1920, 1080), "Oculus Rift DK2 (debug)"),
    };
    HmdDescription {
        hmd_type,
        product_name: product_name.to_string(),
        resolution,
        default_eye_fov: [left_fov, left_fov.mirrored()],
        max_eye_fov: [left_fov, left_fov.mirrored()],
        eye_render_order: [Eye::Left, Eye::Right],
        camera_frustum: CameraFrustum {
            h_fov: 1.292,
            v_fov: 0.942,
            near_z: 0.4,
            far_z: 2.5,
        },
        extended_desktop: false,
    }
}

/// A software headset with a fixed head pose. Nothing is displayed; submitted frames are counted.
pub struct DebugDevice {
    description: HmdDescription,
    caps: HmdCaps,
    tracking_caps: TrackingCaps,
    head_pose: Pose,
    status: StatusFlags,
    clock: Instant,
    next_texture: u32,
    next_set: u64,
    frames_submitted: u64,
    destroyed: bool,
}

impl DebugDevice {
    pub fn new(hmd_type: HmdType) -> DebugDevice {
        DebugDevice {
            description: description_for(hmd_type),
            caps: HmdCaps::DEBUG_DEVICE,
            tracking_caps: TrackingCaps::empty(),
            head_pose: Pose::identity(),
            status: StatusFlags::HMD_CONNECTED | StatusFlags::ORIENTATION_TRACKED,
            clock: Instant::now(),
            next_texture: 1,
            next_set: 1,
            frames_submitted: 0,
            destroyed: false,
        }
    }

    /// Report `pose` as the predicted head pose from now on.
    pub fn set_head_pose(&mut self, pose: Pose) {
        self.head_pose = pose;
    }

    pub fn set_status(&mut self, status: StatusFlags) {
        self.status = status;
    }

    pub fn tracking_caps(&self) -> TrackingCaps {
        self.tracking_caps
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn allocate_texture(&mut self) -> TextureId {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        id
    }
}

impl Default for DebugDevice {
    fn default() -> DebugDevice {
        DebugDevice::new(HmdType::Dk2)
    }
}

impl TrackingDevice for DebugDevice {
    fn description(&self) -> &HmdDescription {
        &self.description
    }

    fn enabled_caps(&self) -> HmdCaps {
        self.caps
    }

    fn set_enabled_caps(&mut self, caps: HmdCaps) {
        // the debug flag is reported by the runtime and can't be cleared
        self.caps = caps | HmdCaps::DEBUG_DEVICE;
    }

    fn configure_tracking(&mut self, supported: TrackingCaps, required: TrackingCaps) -> HmdResult<()> {
        if required.contains(TrackingCaps::POSITION) {
            return Err(HmdError::SdkError("positional tracking is not available on a debug device".to_string()));
        }
        self.tracking_caps = supported;
        Ok(())
    }

    fn render_desc(&self, eye: Eye, fov: FovPort) -> EyeRenderDesc {
        let half_width = self.description.resolution.width / 2;
        let x = match eye {
            Eye::Left => 0,
            Eye::Right => half_width as i32,
        };
        let offset = match eye {
            Eye::Left => -DK2_IPD / 2.0,
            Eye::Right => DK2_IPD / 2.0,
        };
        EyeRenderDesc {
            eye,
            fov,
            distorted_viewport: Viewport::new(x, 0, half_width, self.description.resolution.height),
            pixels_per_tan_angle: [DK2_PIXELS_PER_TAN_ANGLE, DK2_PIXELS_PER_TAN_ANGLE],
            hmd_to_eye_offset: Vector3::new(offset, 0.0, 0.0),
        }
    }

    fn fov_texture_size(&self, _eye: Eye, fov: FovPort, pixels_per_display_pixel: f32) -> Size {
        let density = DK2_PIXELS_PER_TAN_ANGLE * pixels_per_display_pixel;
        let width = ((fov.left_tan + fov.right_tan) * density).ceil();
        let height = ((fov.up_tan + fov.down_tan) * density).ceil();
        Size::new(width.max(1.0) as u32, height.max(1.0) as u32)
    }

    fn frame_timing(&self, frame_index: u64) -> FrameTiming {
        let interval = 1.0 / DK2_REFRESH_RATE;
        let now = self.clock.elapsed().as_secs_f64();
        FrameTiming {
            frame_interval_seconds: interval,
            display_midpoint_seconds: now.max(frame_index as f64 * interval) + interval * 0.5,
        }
    }

    fn tracking_state(&self, abs_time: f64) -> TrackingState {
        TrackingState {
            head_pose: self.head_pose,
            time_in_seconds: abs_time,
            status: self.status,
        }
    }

    fn submit_frame(&mut self,
                    frame_index: u64,
                    _view_scale: &ViewScaleDesc,
                    layer: &LayerEyeFov) -> HmdResult<SubmitStatus> {
        self.frames_submitted += 1;
        debug!("debug device accepted frame {} from texture set {}", frame_index, layer.color_texture);
        Ok(SubmitStatus::Presented)
    }

    fn float_array(&self, name: &str, out: &mut [f32]) -> usize {
        if name != "DK2Latency" {
            return 0;
        }
        let count = out.len().min(DEBUG_LATENCIES.len());
        out[..count].copy_from_slice(&DEBUG_LATENCIES[..count]);
        count
    }

    fn recenter_pose(&mut self) {
        self.head_pose = Pose::identity();
    }

    fn create_swap_texture_set(&mut self, _format: TextureFormat, _size: Size) -> HmdResult<SwapTextureSet> {
        let textures = (0..SWAP_CHAIN_LENGTH).map(|_| self.allocate_texture()).collect();
        let set = SwapTextureSet::new(self.next_set, textures);
        self.next_set += 1;
        Ok(set)
    }

    fn destroy_swap_texture_set(&mut self, _set: SwapTextureSet) {}

    fn create_mirror_texture(&mut self, _format: TextureFormat, size: Size) -> HmdResult<MirrorTexture> {
        Ok(MirrorTexture {
            texture: self.allocate_texture(),
            size,
        })
    }

    fn destroy_mirror_texture(&mut self, _texture: MirrorTexture) {}

    fn destroy(&mut self) {
        self.destroyed = true;
    }
}

/// A runtime with no hardware behind it. Detection always fails, so sessions built from it use
/// a `DebugDevice`.
pub struct SoftwareRuntime {
    clock: Instant,
}

impl SoftwareRuntime {
    pub fn new() -> SoftwareRuntime {
        SoftwareRuntime { clock: Instant::now() }
    }
}

impl Default for SoftwareRuntime {
    fn default() -> SoftwareRuntime {
        SoftwareRuntime::new()
    }
}

impl Runtime for SoftwareRuntime {
    fn initialize(&self) -> HmdResult<()> {
        Ok(())
    }

    fn shutdown(&self) {}

    fn detect(&self) -> HmdResult<bool> {
        Ok(false)
    }

    fn create_device(&self, _index: u32) -> HmdResult<Box<dyn TrackingDevice>> {
        Err(HmdError::SdkError("no headset hardware is available".to_string()))
    }

    fn time_in_seconds(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }
}
