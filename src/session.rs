//! The stereo session: owns the headset, the shared render target and the per-frame pose cache,
//! and binds them to a host window.

use std::rc::Rc;

use log::{error, info, warn};

use crate::device::{EyeRenderDesc, HmdCaps, TrackingCaps, TrackingDevice};
use crate::math::{look_at_orientation, FovPort, Point3, Pose, Quaternion, Size, Vector3};
use crate::render::{FramePhase, ViewState};
use crate::target::{HostRenderer, MirrorSurface, RenderTarget};
use crate::{Context, Eye, HmdError, HmdResult};

const LATENCY_PROPERTY: &'static str = "DK2Latency";

/// User-adjustable rendering settings. Changes are committed to the headset at the start of the
/// next frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionSettings {
    /// Divides tracked distances, so the world can be rendered at a different perceived size.
    pub head_scale: f32,

    /// Render target supersampling factor.
    pub screen_percentage: f32,

    /// Desktop mirror size relative to the headset's native resolution.
    pub mirror_percentage: f32,

    pub monoscopic: bool,
    pub mirrored: bool,
    pub positional_tracking: bool,
}

impl SessionSettings {
    pub fn validate(&self) -> HmdResult<()> {
        if !(self.head_scale > 0.0) {
            return Err(HmdError::InvalidSetting("head scale must be greater than zero"));
        }
        if !(self.screen_percentage > 0.0) {
            return Err(HmdError::InvalidSetting("screen percentage must be greater than zero"));
        }
        if !(self.mirror_percentage > 0.0) {
            return Err(HmdError::InvalidSetting("mirror percentage must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for SessionSettings {
    fn default() -> SessionSettings {
        SessionSettings {
            head_scale: 1.0,
            screen_percentage: 1.0,
            mirror_percentage: 0.5,
            monoscopic: false,
            mirrored: true,
            positional_tracking: true,
        }
    }
}

/// Position and orientation of the viewer's body in the world. Tracked eye poses are composed
/// with it to produce the final view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HostCamera {
    pub eye_point: Point3,
    pub orientation: Quaternion,
}

impl HostCamera {
    pub fn new(eye_point: Point3, orientation: Quaternion) -> HostCamera {
        HostCamera {
            eye_point,
            orientation,
        }
    }

    /// A host camera at `eye_point` facing `target`.
    pub fn looking_at(eye_point: Point3, target: Point3, up: Vector3) -> HostCamera {
        HostCamera::new(eye_point, look_at_orientation(eye_point, target, up))
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.orientation, Vector3::new(self.eye_point.x, self.eye_point.y, self.eye_point.z))
    }
}

impl Default for HostCamera {
    /// At the origin, looking down `+Z`.
    fn default() -> HostCamera {
        HostCamera::looking_at(Point3::new(0.0, 0.0, 0.0),
                               Point3::new(0.0, 0.0, 1.0),
                               Vector3::unit_y())
    }
}

/// Camera for the eye currently being rendered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyeCamera {
    pub pose: Pose,
    pub fov: FovPort,
    pub near_z: f32,
    pub far_z: f32,
}

impl Default for EyeCamera {
    fn default() -> EyeCamera {
        EyeCamera {
            pose: Pose::identity(),
            fov: FovPort::default(),
            near_z: 0.1,
            far_z: 1000.0,
        }
    }
}

/// The positional tracking camera's frustum, placed at the current eye pose. Useful for drawing
/// the tracking volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackingCamera {
    pub fov_y_degrees: f32,
    pub aspect_ratio: f32,
    pub near_z: f32,
    pub far_z: f32,
    pub pose: Pose,
}

/// A headset bound to a host window for stereo rendering.
///
/// Each displayed frame runs `begin_frame`, `bind`, `enable_eye` for each entry of `eyes()`,
/// `unbind`, then `end_frame`. The begin and end steps normally run as the host renderer's
/// draw hooks; see `render::DrawHooks`.
pub struct StereoSession {
    pub(crate) context: Context,
    pub(crate) device: Option<Box<dyn TrackingDevice>>,
    pub(crate) window: Option<Rc<dyn HostRenderer>>,

    pub(crate) settings: SessionSettings,
    pub(crate) hmd_caps: HmdCaps,
    pub(crate) tracking_caps: TrackingCaps,
    pub(crate) settings_changed: bool,

    pub(crate) eye_render_desc: [EyeRenderDesc; 2],
    pub(crate) render_target: Option<RenderTarget>,
    pub(crate) mirror: Option<MirrorSurface>,

    pub(crate) eye_view_offsets: [Vector3; 2],
    pub(crate) eye_poses: [Pose; 2],
    pub(crate) phase: FramePhase,
    pub(crate) frame_index: u64,
    pub(crate) active_eye: Option<Eye>,

    pub(crate) eye_camera: EyeCamera,
    pub(crate) host_camera: HostCamera,
    pub(crate) view_state: ViewState,
}

impl StereoSession {
    pub(crate) fn new(context: Context,
                      mut device: Box<dyn TrackingDevice>,
                      settings: SessionSettings,
                      hmd_caps: HmdCaps,
                      tracking_caps: TrackingCaps) -> StereoSession {
        let caps = device.enabled_caps() | hmd_caps;
        device.set_enabled_caps(caps);

        let fovs = device.description().default_eye_fov;
        let eye_render_desc = [device.render_desc(Eye::Left, fovs[0]),
                               device.render_desc(Eye::Right, fovs[1])];
        info!("opened {}", device.description().product_name);

        StereoSession {
            context,
            device: Some(device),
            window: None,
            settings,
            hmd_caps: caps,
            tracking_caps,
            settings_changed: true,
            eye_render_desc,
            render_target: None,
            mirror: None,
            eye_view_offsets: [Vector3::new(0.0, 0.0, 0.0); 2],
            eye_poses: [Pose::identity(); 2],
            phase: FramePhase::Idle,
            frame_index: 0,
            active_eye: None,
            eye_camera: EyeCamera::default(),
            host_camera: HostCamera::default(),
            view_state: ViewState::default(),
        }
    }

    /// Bind the session to `window`: prepare the render target and register the stereo draw
    /// hooks with the window's renderer.
    ///
    /// # Failure
    ///
    /// Fails with `HmdError::UnsupportedRenderer` if the renderer can't run stereo draw hooks.
    /// This is a configuration error; callers should abort setup.
    pub fn attach(&mut self, window: Rc<dyn HostRenderer>) -> HmdResult<()> {
        if self.device.is_none() {
            return Err(HmdError::Detached);
        }
        if self.phase != FramePhase::Idle {
            return Err(HmdError::FramePhase { action: "attach a window", phase: self.phase });
        }
        if !window.is_valid() {
            return Err(HmdError::InvalidWindow);
        }
        if !window.supports_stereo_hooks() {
            error!("stereo rendering can only be used with a renderer that supports stereo draw hooks");
            return Err(HmdError::UnsupportedRenderer);
        }

        if let Some(previous) = self.window.take() {
            self.release_surfaces(Some(&*previous));
            if previous.is_valid() {
                previous.unregister_draw_hooks();
            }
        }

        window.make_current();
        self.update_render_target(&*window)?;
        self.commit_settings();
        window.register_draw_hooks();

        if let Some(ref mut device) = self.device {
            if let Err(e) = device.configure_tracking(self.tracking_caps, TrackingCaps::empty()) {
                warn!("failed to configure tracking: {}", e);
            }
        }

        info!("attached to window");
        self.window = Some(window);
        Ok(())
    }

    /// Unregister the draw hooks, release the render target and mirror, and destroy the headset.
    /// Safe to call any number of times; the session is unusable afterwards.
    pub fn detach(&mut self) {
        let window = self.window.take();
        let host = window.as_deref().filter(|w| w.is_valid());
        if let Some(host) = host {
            if self.phase == FramePhase::Bound {
                host.unbind();
            }
            host.unregister_draw_hooks();
        }

        self.release_surfaces(host);
        if let Some(mut device) = self.device.take() {
            device.destroy();
            info!("detached and released headset");
        }

        self.phase = FramePhase::Idle;
        self.active_eye = None;
        self.view_state.invalidate();
    }

    /// Notify the session that its window closed.
    pub fn window_closed(&mut self) {
        self.detach();
    }

    fn release_surfaces(&mut self, host: Option<&dyn HostRenderer>) {
        if let Some(ref mut device) = self.device {
            if let Some(target) = self.render_target.take() {
                target.release(&mut **device, host);
            }
            if let Some(mirror) = self.mirror.take() {
                mirror.release(&mut **device, host);
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.device.is_some() && self.window.as_ref().map_or(false, |w| w.is_valid())
    }

    pub fn is_detached(&self) -> bool {
        self.device.is_none()
    }

    pub fn has_window(&self, window: &Rc<dyn HostRenderer>) -> bool {
        self.window.as_ref().map_or(false, |w| Rc::ptr_eq(w, window))
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn device(&self) -> Option<&dyn TrackingDevice> {
        self.device.as_deref()
    }

    /// Eyes in the order the headset wants them rendered. Empty unless attached to a window.
    pub fn eyes(&self) -> Vec<Eye> {
        match self.device {
            Some(ref device) if self.is_attached() => device.description().eye_render_order.to_vec(),
            _ => Vec::new(),
        }
    }

    /// Returns the native resolution of the full headset display.
    pub fn native_window_resolution(&self) -> Size {
        self.device.as_ref().map_or(Size::default(), |d| d.description().resolution)
    }

    /// True if the headset is driven as an extension of the desktop rather than in direct mode.
    pub fn is_desktop_extended(&self) -> bool {
        self.device.as_ref().map_or(false, |d| d.description().extended_desktop)
    }

    /// Recenter the headset, using the current orientation and position as the origin.
    pub fn recenter_pose(&mut self) {
        if let Some(ref mut device) = self.device {
            device.recenter_pose();
        }
    }

    /// True if positional tracking is enabled and the tracking camera currently sees the headset.
    /// Polled from the device on every call.
    pub fn is_tracked(&self) -> bool {
        match self.device {
            Some(ref device) if self.settings.positional_tracking => {
                device.tracking_state(self.context.time_in_seconds()).is_position_tracked()
            }
            _ => false,
        }
    }

    /// Motion-to-photon latency samples in milliseconds, or zeros if the headset doesn't report
    /// them.
    pub fn latencies(&self) -> [f32; 3] {
        let mut latencies = [0.0f32; 3];
        let count = self.device.as_ref().map_or(0, |d| d.float_array(LATENCY_PROPERTY, &mut latencies));
        if count == latencies.len() {
            [latencies[0] * 1000.0, latencies[1] * 1000.0, latencies[2] * 1000.0]
        } else {
            [0.0; 3]
        }
    }

    /// The positional tracking camera, if the headset is currently tracked.
    pub fn positional_tracking_camera(&self) -> Option<TrackingCamera> {
        if !self.is_tracked() {
            return None;
        }
        let frustum = self.device.as_ref()?.description().camera_frustum;
        let aspect_ratio = ((0.5 * frustum.h_fov).tan() / (0.5 * frustum.v_fov).tan()).abs();
        let eye = self.active_eye.unwrap_or(Eye::Left);
        Some(TrackingCamera {
            fov_y_degrees: frustum.v_fov.to_degrees(),
            aspect_ratio,
            near_z: frustum.near_z,
            far_z: frustum.far_z,
            pose: self.eye_poses[eye.index()],
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn set_screen_percentage(&mut self, percentage: f32) -> HmdResult<()> {
        if !(percentage > 0.0) {
            return Err(HmdError::InvalidSetting("screen percentage must be greater than zero"));
        }
        self.settings.screen_percentage = percentage;
        self.settings_changed = true;
        Ok(())
    }

    pub fn set_mirror_percentage(&mut self, percentage: f32) -> HmdResult<()> {
        if !(percentage > 0.0) {
            return Err(HmdError::InvalidSetting("mirror percentage must be greater than zero"));
        }
        self.settings.mirror_percentage = percentage;
        self.settings_changed = true;
        Ok(())
    }

    /// Takes effect at the next `enable_eye`.
    pub fn set_head_scale(&mut self, scale: f32) -> HmdResult<()> {
        if !(scale > 0.0) {
            return Err(HmdError::InvalidSetting("head scale must be greater than zero"));
        }
        self.settings.head_scale = scale;
        Ok(())
    }

    pub fn head_scale(&self) -> f32 {
        self.settings.head_scale
    }

    pub fn enable_monoscopic(&mut self, enabled: bool) {
        if self.settings.monoscopic != enabled {
            self.settings.monoscopic = enabled;
            self.settings_changed = true;
        }
    }

    pub fn is_monoscopic(&self) -> bool {
        self.settings.monoscopic
    }

    pub fn enable_positional_tracking(&mut self, enabled: bool) {
        if self.settings.positional_tracking != enabled {
            self.settings.positional_tracking = enabled;
            self.settings_changed = true;
        }
    }

    pub fn is_positional_tracking_enabled(&self) -> bool {
        self.settings.positional_tracking
    }

    pub fn enable_mirrored(&mut self, enabled: bool) {
        if self.settings.mirrored != enabled {
            self.settings.mirrored = enabled;
            self.settings_changed = true;
        }
    }

    pub fn is_mirrored(&self) -> bool {
        self.settings.mirrored
    }

    pub fn enable_low_persistence(&mut self, enabled: bool) {
        self.set_cap(HmdCaps::LOW_PERSISTENCE, enabled);
    }

    pub fn enable_dynamic_prediction(&mut self, enabled: bool) {
        self.set_cap(HmdCaps::DYNAMIC_PREDICTION, enabled);
    }

    fn set_cap(&mut self, cap: HmdCaps, enabled: bool) {
        if self.hmd_caps.contains(cap) != enabled {
            self.hmd_caps.set(cap, enabled);
            self.settings_changed = true;
        }
    }

    /// Capabilities that will be committed to the headset at the next frame.
    pub fn hmd_caps(&self) -> HmdCaps {
        self.hmd_caps
    }

    /// Push pending capability changes to the headset.
    pub(crate) fn commit_settings(&mut self) {
        if let Some(ref mut device) = self.device {
            device.set_enabled_caps(self.hmd_caps);
        }
        self.settings_changed = false;
    }

    pub fn has_pending_settings(&self) -> bool {
        self.settings_changed
    }

    /// Takes effect at the next `enable_eye`.
    pub fn set_host_camera(&mut self, camera: HostCamera) {
        self.host_camera = camera;
    }

    pub fn host_camera(&self) -> &HostCamera {
        &self.host_camera
    }

    /// Near and far clip planes for the eye projection. Takes effect at the next `enable_eye`.
    pub fn set_clip_planes(&mut self, near_z: f32, far_z: f32) -> HmdResult<()> {
        if !(near_z > 0.0) || !(far_z > near_z) {
            return Err(HmdError::InvalidSetting("clip planes must satisfy 0 < near < far"));
        }
        self.eye_camera.near_z = near_z;
        self.eye_camera.far_z = far_z;
        Ok(())
    }

    pub fn eye_camera(&self) -> &EyeCamera {
        &self.eye_camera
    }
}

impl Drop for StereoSession {
    fn drop(&mut self) {
        self.detach();
    }
}
