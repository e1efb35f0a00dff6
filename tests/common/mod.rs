#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};

use rift_stereo::device::{CameraFrustum, EyeRenderDesc, FrameTiming, HmdCaps, HmdDescription,
                          HmdType, LayerEyeFov, MirrorTexture, Runtime, StatusFlags,
                          SubmitStatus, SwapTextureSet, TextureFormat, TrackingCaps,
                          TrackingDevice, TrackingState, ViewScaleDesc};
use rift_stereo::math::{FovPort, Matrix4, Pose, Size, Vector3, Viewport};
use rift_stereo::target::{DepthBufferId, FramebufferId, HostRenderer, TextureId};
use rift_stereo::{Eye, HmdError, HmdResult};

static SERIAL: Mutex<()> = Mutex::new(());

/// Only one tracking runtime may be live per process, so tests that create a `Context` run one
/// at a time.
pub fn serial() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub const LEFT_FOV: FovPort = FovPort { up_tan: 1.3, down_tan: 1.3, left_tan: 1.0, right_tan: 1.1 };
pub const RIGHT_FOV: FovPort = FovPort { up_tan: 1.3, down_tan: 1.3, left_tan: 1.1, right_tan: 1.0 };
pub const IPD: f32 = 0.064;

/// Everything the fake device is told to do or has been asked to do.
pub struct DeviceState {
    pub detected: bool,
    pub fail_initialize: bool,
    pub runtime_shutdowns: u32,

    pub description: HmdDescription,
    pub head_pose: Pose,
    pub status: StatusFlags,
    pub submit_result: HmdResult<SubmitStatus>,
    pub latencies: Vec<f32>,

    pub enabled_caps: HmdCaps,
    pub caps_updates: Vec<HmdCaps>,
    pub tracking_configured: Option<TrackingCaps>,
    pub texture_size_requests: Vec<f32>,
    pub timing_requests: Vec<u64>,
    pub swap_sets_created: Vec<Size>,
    pub swap_sets_destroyed: u32,
    pub mirrors_created: Vec<Size>,
    pub mirrors_destroyed: u32,
    pub submitted: Vec<(u64, ViewScaleDesc, LayerEyeFov)>,
    pub recenters: u32,
    pub destroyed: u32,
    next_id: u32,
}

impl DeviceState {
    pub fn new() -> DeviceState {
        DeviceState {
            detected: true,
            fail_initialize: false,
            runtime_shutdowns: 0,
            description: HmdDescription {
                hmd_type: HmdType::Dk2,
                product_name: "Fake HMD".to_string(),
                resolution: Size::new(1920, 1080),
                default_eye_fov: [LEFT_FOV, RIGHT_FOV],
                max_eye_fov: [LEFT_FOV, RIGHT_FOV],
                eye_render_order: [Eye::Left, Eye::Right],
                camera_frustum: CameraFrustum { h_fov: 1.292, v_fov: 0.942, near_z: 0.4, far_z: 2.5 },
                extended_desktop: false,
            },
            head_pose: Pose::identity(),
            status: StatusFlags::HMD_CONNECTED | StatusFlags::ORIENTATION_TRACKED,
            submit_result: Ok(SubmitStatus::Presented),
            latencies: vec![0.010, 0.002, 0.0],
            enabled_caps: HmdCaps::empty(),
            caps_updates: Vec::new(),
            tracking_configured: None,
            texture_size_requests: Vec::new(),
            timing_requests: Vec::new(),
            swap_sets_created: Vec::new(),
            swap_sets_destroyed: 0,
            mirrors_created: Vec::new(),
            mirrors_destroyed: 0,
            submitted: Vec::new(),
            recenters: 0,
            destroyed: 0,
            next_id: 100,
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

pub type SharedDevice = Rc<RefCell<DeviceState>>;

pub fn shared_device() -> SharedDevice {
    Rc::new(RefCell::new(DeviceState::new()))
}

pub struct FakeRuntime {
    pub state: SharedDevice,
}

impl Runtime for FakeRuntime {
    fn initialize(&self) -> HmdResult<()> {
        if self.state.borrow().fail_initialize {
            return Err(HmdError::SdkError("service unavailable".to_string()));
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.state.borrow_mut().runtime_shutdowns += 1;
    }

    fn detect(&self) -> HmdResult<bool> {
        Ok(self.state.borrow().detected)
    }

    fn create_device(&self, _index: u32) -> HmdResult<Box<dyn TrackingDevice>> {
        let description = self.state.borrow().description.clone();
        Ok(Box::new(FakeDevice {
            state: self.state.clone(),
            description,
        }))
    }

    fn time_in_seconds(&self) -> f64 {
        0.0
    }
}

pub struct FakeDevice {
    state: SharedDevice,
    description: HmdDescription,
}

impl TrackingDevice for FakeDevice {
    fn description(&self) -> &HmdDescription {
        &self.description
    }

    fn enabled_caps(&self) -> HmdCaps {
        self.state.borrow().enabled_caps
    }

    fn set_enabled_caps(&mut self, caps: HmdCaps) {
        let mut state = self.state.borrow_mut();
        state.enabled_caps = caps;
        state.caps_updates.push(caps);
    }

    fn configure_tracking(&mut self, supported: TrackingCaps, _required: TrackingCaps) -> HmdResult<()> {
        self.state.borrow_mut().tracking_configured = Some(supported);
        Ok(())
    }

    fn render_desc(&self, eye: Eye, fov: FovPort) -> EyeRenderDesc {
        let x = match eye {
            Eye::Left => -IPD / 2.0,
            Eye::Right => IPD / 2.0,
        };
        EyeRenderDesc {
            eye,
            fov,
            distorted_viewport: Viewport::new(0, 0, 960, 1080),
            pixels_per_tan_angle: [500.0, 500.0],
            hmd_to_eye_offset: Vector3::new(x, 0.0, 0.0),
        }
    }

    fn fov_texture_size(&self, _eye: Eye, fov: FovPort, pixels_per_display_pixel: f32) -> Size {
        self.state.borrow_mut().texture_size_requests.push(pixels_per_display_pixel);
        let density = 500.0 * pixels_per_display_pixel;
        Size::new(((fov.left_tan + fov.right_tan) * density).round() as u32,
                  ((fov.up_tan + fov.down_tan) * density).round() as u32)
    }

    fn frame_timing(&self, frame_index: u64) -> FrameTiming {
        self.state.borrow_mut().timing_requests.push(frame_index);
        FrameTiming {
            frame_interval_seconds: 1.0 / 75.0,
            display_midpoint_seconds: frame_index as f64 / 75.0,
        }
    }

    fn tracking_state(&self, abs_time: f64) -> TrackingState {
        let state = self.state.borrow();
        TrackingState {
            head_pose: state.head_pose,
            time_in_seconds: abs_time,
            status: state.status,
        }
    }

    fn submit_frame(&mut self,
                    frame_index: u64,
                    view_scale: &ViewScaleDesc,
                    layer: &LayerEyeFov) -> HmdResult<SubmitStatus> {
        let mut state = self.state.borrow_mut();
        state.submitted.push((frame_index, *view_scale, layer.clone()));
        state.submit_result.clone()
    }

    fn float_array(&self, name: &str, out: &mut [f32]) -> usize {
        let state = self.state.borrow();
        if name != "DK2Latency" {
            return 0;
        }
        let count = out.len().min(state.latencies.len());
        out[..count].copy_from_slice(&state.latencies[..count]);
        count
    }

    fn recenter_pose(&mut self) {
        self.state.borrow_mut().recenters += 1;
    }

    fn create_swap_texture_set(&mut self, _format: TextureFormat, size: Size) -> HmdResult<SwapTextureSet> {
        let mut state = self.state.borrow_mut();
        state.swap_sets_created.push(size);
        let id = state.next_id();
        let textures = vec![TextureId(state.next_id()), TextureId(state.next_id()), TextureId(state.next_id())];
        Ok(SwapTextureSet::new(id as u64, textures))
    }

    fn destroy_swap_texture_set(&mut self, _set: SwapTextureSet) {
        self.state.borrow_mut().swap_sets_destroyed += 1;
    }

    fn create_mirror_texture(&mut self, _format: TextureFormat, size: Size) -> HmdResult<MirrorTexture> {
        let mut state = self.state.borrow_mut();
        state.mirrors_created.push(size);
        Ok(MirrorTexture { texture: TextureId(state.next_id()), size })
    }

    fn destroy_mirror_texture(&mut self, _texture: MirrorTexture) {
        self.state.borrow_mut().mirrors_destroyed += 1;
    }

    fn destroy(&mut self) {
        self.state.borrow_mut().destroyed += 1;
    }
}

/// A window whose renderer records what the session asks of it.
pub struct FakeHost {
    pub valid: Cell<bool>,
    pub stereo_capable: bool,
    pub hooks_registered: Cell<bool>,
    pub hook_registrations: Cell<u32>,
    pub bound: RefCell<Vec<TextureId>>,
    pub unbinds: Cell<u32>,
    pub depth_created: RefCell<Vec<Size>>,
    pub depth_released: Cell<u32>,
    pub framebuffers_released: Cell<u32>,
    pub blits: Cell<u32>,
    pub viewports: RefCell<Vec<Viewport>>,
    pub view_matrices: RefCell<Vec<Matrix4>>,
    pub projection_matrices: RefCell<Vec<Matrix4>>,
    next_id: Cell<u32>,
}

impl FakeHost {
    pub fn new() -> Rc<FakeHost> {
        Rc::new(FakeHost::with_stereo(true))
    }

    pub fn with_stereo(stereo_capable: bool) -> FakeHost {
        FakeHost {
            valid: Cell::new(true),
            stereo_capable,
            hooks_registered: Cell::new(false),
            hook_registrations: Cell::new(0),
            bound: RefCell::new(Vec::new()),
            unbinds: Cell::new(0),
            depth_created: RefCell::new(Vec::new()),
            depth_released: Cell::new(0),
            framebuffers_released: Cell::new(0),
            blits: Cell::new(0),
            viewports: RefCell::new(Vec::new()),
            view_matrices: RefCell::new(Vec::new()),
            projection_matrices: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

impl HostRenderer for FakeHost {
    fn is_valid(&self) -> bool {
        self.valid.get()
    }

    fn supports_stereo_hooks(&self) -> bool {
        self.stereo_capable
    }

    fn register_draw_hooks(&self) {
        self.hooks_registered.set(true);
        self.hook_registrations.set(self.hook_registrations.get() + 1);
    }

    fn unregister_draw_hooks(&self) {
        self.hooks_registered.set(false);
    }

    fn make_current(&self) {}

    fn window_viewport(&self) -> Viewport {
        Viewport::new(0, 0, 1920, 1080)
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.viewports.borrow_mut().push(viewport);
    }

    fn set_model_matrix(&self, _matrix: &Matrix4) {}

    fn set_view_matrix(&self, matrix: &Matrix4) {
        self.view_matrices.borrow_mut().push(*matrix);
    }

    fn set_projection_matrix(&self, matrix: &Matrix4) {
        self.projection_matrices.borrow_mut().push(*matrix);
    }

    fn create_depth_buffer(&self, size: Size) -> DepthBufferId {
        self.depth_created.borrow_mut().push(size);
        DepthBufferId(self.next_id())
    }

    fn release_depth_buffer(&self, _depth: DepthBufferId) {
        self.depth_released.set(self.depth_released.get() + 1);
    }

    fn bind_and_clear(&self, color: TextureId, _depth: DepthBufferId, _size: Size) {
        self.bound.borrow_mut().push(color);
    }

    fn unbind(&self) {
        self.unbinds.set(self.unbinds.get() + 1);
    }

    fn create_framebuffer(&self, _color: TextureId, _size: Size) -> FramebufferId {
        FramebufferId(self.next_id())
    }

    fn release_framebuffer(&self, _framebuffer: FramebufferId) {
        self.framebuffers_released.set(self.framebuffers_released.get() + 1);
    }

    fn blit_to_screen(&self, _framebuffer: FramebufferId, _source: Viewport, _destination: Viewport) {
        self.blits.set(self.blits.get() + 1);
    }
}

/// Build a session on a fake runtime and attach it to a fresh fake window.
pub fn attached_session(device: &SharedDevice) -> (rift_stereo::Context, rift_stereo::StereoSession, Rc<FakeHost>) {
    let context = rift_stereo::Context::initialize(FakeRuntime { state: device.clone() })
        .expect("runtime initializes");
    let mut session = context.build_session().build().expect("session builds");
    let host = FakeHost::new();
    session.attach(host.clone()).expect("attach succeeds");
    (context, session, host)
}

pub fn assert_matrix_eq(a: &Matrix4, b: &Matrix4) {
    let a: &[[f32; 4]; 4] = a.as_ref();
    let b: &[[f32; 4]; 4] = b.as_ref();
    for c in 0..4 {
        for r in 0..4 {
            assert!((a[c][r] - b[c][r]).abs() < 1e-4,
                    "mismatch at column {} row {}: {:?} != {:?}", c, r, a, b);
        }
    }
}

/// Bind and unbind without drawing, then submit. For tests that only look at the posed frame.
pub fn finish_posed_frame(session: &mut rift_stereo::StereoSession) -> rift_stereo::FrameStatus {
    session.bind().expect("bind succeeds");
    session.unbind().expect("unbind succeeds");
    session.end_frame().expect("end_frame succeeds")
}
