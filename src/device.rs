//! The vendor side of a stereo session: the tracking runtime and the headset it exposes. More or
//! less directly mirrors the Oculus "way" of interfacing with an HMD, expressed as traits so a
//! session can be driven by a real runtime, the software `DebugDevice`, or a test double.

use bitflags::bitflags;

use crate::math::{calc_eye_poses, fov_projection, FovPort, Matrix4, Pose, Size, Vector3, Viewport};
use crate::target::TextureId;
use crate::{Eye, HmdResult};

bitflags! {
    /// Headset display capabilities.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HmdCaps: u32 {
        /// The headset is a software debug device rather than real hardware.
        const DEBUG_DEVICE = 0x0010;
        /// Low persistence display mode.
        const LOW_PERSISTENCE = 0x0080;
        /// Adjust tracking prediction based on internally measured latency.
        const DYNAMIC_PREDICTION = 0x0200;
        /// Present frames without waiting for vertical sync.
        const NO_VSYNC = 0x1000;
    }
}

bitflags! {
    /// Tracking capabilities requested from the headset.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TrackingCaps: u32 {
        const ORIENTATION = 0x0010;
        const MAG_YAW_CORRECTION = 0x0020;
        const POSITION = 0x0040;
    }
}

bitflags! {
    /// Live tracking status reported with each tracking state sample.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u32 {
        const ORIENTATION_TRACKED = 0x0001;
        const POSITION_TRACKED = 0x0002;
        const CAMERA_POSE_TRACKED = 0x0004;
        const POSITION_CONNECTED = 0x0020;
        const HMD_CONNECTED = 0x0080;
    }
}

/// Headset models known to the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HmdType {
    Dk1,
    Dk2,
    Other,
}

/// Frustum of the positional tracking camera, in radians and meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraFrustum {
    pub h_fov: f32,
    pub v_fov: f32,
    pub near_z: f32,
    pub far_z: f32,
}

/// Static metadata about a headset.
#[derive(Clone, Debug, PartialEq)]
pub struct HmdDescription {
    pub hmd_type: HmdType,
    pub product_name: String,

    /// Native resolution of the full headset display.
    pub resolution: Size,

    /// Recommended field of view per eye, indexed by `Eye::index()`.
    pub default_eye_fov: [FovPort; 2],

    /// Widest field of view per eye the optics support.
    pub max_eye_fov: [FovPort; 2],

    /// Order in which the eyes should be rendered.
    pub eye_render_order: [Eye; 2],

    pub camera_frustum: CameraFrustum,

    /// True if the headset is driven as an extension of the desktop rather than in direct mode.
    pub extended_desktop: bool,
}

/// Rendering parameters for one eye at a given field of view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyeRenderDesc {
    pub eye: Eye,
    pub fov: FovPort,
    pub distorted_viewport: Viewport,
    pub pixels_per_tan_angle: [f32; 2],

    /// Translation from the head center to this eye, in head space.
    pub hmd_to_eye_offset: Vector3,
}

/// Timing predictions for a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTiming {
    pub frame_interval_seconds: f64,

    /// Absolute time at which the middle of the frame will be visible on the display.
    pub display_midpoint_seconds: f64,
}

/// Tracked head state at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackingState {
    pub head_pose: Pose,
    pub time_in_seconds: f64,
    pub status: StatusFlags,
}

impl TrackingState {
    /// True when the tracking camera is connected and currently sees the headset.
    pub fn is_position_tracked(&self) -> bool {
        self.status.contains(StatusFlags::POSITION_CONNECTED | StatusFlags::POSITION_TRACKED)
    }
}

/// A ring of color textures owned by the runtime, cycled once per frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapTextureSet {
    pub id: u64,
    pub textures: Vec<TextureId>,
    pub current_index: usize,
}

impl SwapTextureSet {
    pub fn new(id: u64, textures: Vec<TextureId>) -> SwapTextureSet {
        SwapTextureSet {
            id,
            textures,
            current_index: 0,
        }
    }

    /// Step to the next texture in the ring and return it.
    pub fn advance(&mut self) -> TextureId {
        if !self.textures.is_empty() {
            self.current_index = (self.current_index + 1) % self.textures.len();
        }
        self.current()
    }

    pub fn current(&self) -> TextureId {
        self.textures.get(self.current_index).cloned().unwrap_or(TextureId(0))
    }
}

/// Pixel format for runtime-allocated textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Srgba8,
}

/// Texture the runtime fills with a copy of the distorted output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MirrorTexture {
    pub texture: TextureId,
    pub size: Size,
}

/// Describes how tracked space maps to world units at submission.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewScaleDesc {
    pub hmd_space_to_world_scale_in_meters: f32,
    pub hmd_to_eye_offset: [Vector3; 2],
}

/// A stereo layer with a field-of-view projection, submitted once per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerEyeFov {
    pub high_quality: bool,
    pub color_texture: u64,
    pub color_index: usize,
    pub viewport: [Viewport; 2],
    pub fov: [FovPort; 2],
    pub render_pose: [Pose; 2],
}

/// Non-failing outcomes of a frame submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitStatus {
    /// The frame was accepted for display.
    Presented,

    /// The frame was accepted but is not currently visible, e.g. because the application has
    /// lost focus. Rendering should continue.
    NotVisible,
}

/// Process-wide tracking runtime. A `Context` initializes it once and shuts it down when the
/// last handle is dropped.
pub trait Runtime {
    fn initialize(&self) -> HmdResult<()>;

    fn shutdown(&self);

    /// True if a headset is connected and the runtime service is available.
    fn detect(&self) -> HmdResult<bool>;

    /// Open the headset at `index`.
    fn create_device(&self, index: u32) -> HmdResult<Box<dyn TrackingDevice>>;

    /// Create a fake headset of the given type, used when no hardware is present.
    fn create_debug_device(&self, hmd_type: HmdType) -> HmdResult<Box<dyn TrackingDevice>> {
        Ok(Box::new(crate::debug::DebugDevice::new(hmd_type)))
    }

    /// Absolute runtime clock, in seconds.
    fn time_in_seconds(&self) -> f64;
}

/// An opened headset. Query calls never block; they report whatever the runtime currently knows.
pub trait TrackingDevice {
    fn description(&self) -> &HmdDescription;

    fn enabled_caps(&self) -> HmdCaps;

    fn set_enabled_caps(&mut self, caps: HmdCaps);

    /// Start tracking with `supported` capabilities, failing unless `required` are available.
    fn configure_tracking(&mut self, supported: TrackingCaps, required: TrackingCaps) -> HmdResult<()>;

    fn render_desc(&self, eye: Eye, fov: FovPort) -> EyeRenderDesc;

    /// Recommended texture size for rendering `eye` at `fov`. `pixels_per_display_pixel` scales
    /// the result for super- or sub-sampling.
    fn fov_texture_size(&self, eye: Eye, fov: FovPort, pixels_per_display_pixel: f32) -> Size;

    fn frame_timing(&self, frame_index: u64) -> FrameTiming;

    /// Predicted tracking state at the absolute time `abs_time`.
    fn tracking_state(&self, abs_time: f64) -> TrackingState;

    fn calc_eye_poses(&self, head: &Pose, offsets: &[Vector3; 2]) -> [Pose; 2] {
        calc_eye_poses(head, offsets)
    }

    /// Right-handed projection for an eye's field of view.
    fn projection(&self, fov: &FovPort, near_z: f32, far_z: f32) -> Matrix4 {
        fov_projection(fov, near_z, far_z)
    }

    fn submit_frame(&mut self,
                    frame_index: u64,
                    view_scale: &ViewScaleDesc,
                    layer: &LayerEyeFov) -> HmdResult<SubmitStatus>;

    /// Read a named float array property into `out`, returning the number of values written.
    fn float_array(&self, name: &str, out: &mut [f32]) -> usize;

    /// Use the current orientation and position as the tracking origin.
    fn recenter_pose(&mut self);

    fn create_swap_texture_set(&mut self, format: TextureFormat, size: Size) -> HmdResult<SwapTextureSet>;

    fn destroy_swap_texture_set(&mut self, set: SwapTextureSet);

    fn create_mirror_texture(&mut self, format: TextureFormat, size: Size) -> HmdResult<MirrorTexture>;

    fn destroy_mirror_texture(&mut self, texture: MirrorTexture);

    /// Release the headset. No other call is made on the device afterwards.
    fn destroy(&mut self);
}
