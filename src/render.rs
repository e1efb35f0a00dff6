//! Methods for directly working with rendering.
//!
//! # Example
//!
//! End-to-end rendering looks something like this:
//!
//! ```no_run
//! # use std::rc::Rc;
//! # use rift_stereo::{Context, TrackingOptions, HostRenderer};
//! # use rift_stereo::debug::SoftwareRuntime;
//! # fn window() -> Rc<dyn HostRenderer> { unimplemented!() }
//! # fn main() -> rift_stereo::HmdResult<()> {
//! let context = Context::initialize(SoftwareRuntime::new())?;
//! let mut session = context.build_session()
//!     .track(&TrackingOptions::with_all())
//!     .screen_percentage(1.25)
//!     .build()?;
//!
//! // <create a window with a graphics context sized to session.native_window_resolution()>
//!
//! session.attach(window())?;
//! loop {
//!     rift_stereo::render::draw_frame(&mut session, |session| {
//!         for eye in session.eyes() {
//!             session.enable_eye(eye, true)?;
//!             // draw the scene with session.view_matrix() and session.projection_matrix()
//!         }
//!         Ok(())
//!     })?;
//! }
//! # }
//! ```

use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use cgmath::SquareMatrix;

use log::{debug, trace, warn};

use crate::device::{LayerEyeFov, SubmitStatus, ViewScaleDesc};
use crate::math::{self, Matrix4, Size, Viewport};
use crate::session::StereoSession;
use crate::target::{HostRenderer, MirrorSurface, RenderTarget};
use crate::{Eye, HmdError, HmdResult};

/// Where a session is within the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames. Settings and render target size may change.
    Idle,

    /// Eye poses have been predicted for the frame.
    Posed,

    /// The render target is bound and eyes may be drawn.
    Bound,

    /// Drawing has finished and the frame is waiting to be submitted.
    Drawn,
}

/// Outcome of submitting a frame to the headset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,

    /// The compositor accepted the frame but isn't showing it (lost focus, minimized window).
    NotVisible,

    /// The runtime rejected the frame. Rendering continues with the next frame.
    Dropped,
}

/// Matrices derived for the active eye, computed on first use and cleared when another eye is
/// enabled.
#[derive(Default)]
pub(crate) struct ViewState {
    view: Cell<Option<Matrix4>>,
    inverse_view: Cell<Option<Matrix4>>,
    projection: Cell<Option<Matrix4>>,
}

impl ViewState {
    pub(crate) fn invalidate(&self) {
        self.view.set(None);
        self.inverse_view.set(None);
        self.projection.set(None);
    }
}

fn cached<F: FnOnce() -> Matrix4>(cell: &Cell<Option<Matrix4>>, compute: F) -> Matrix4 {
    match cell.get() {
        Some(m) => m,
        None => {
            let m = compute();
            cell.set(Some(m));
            m
        }
    }
}

/// Pre- and post-draw hooks a host renderer runs around its draw pass once they are registered.
pub trait DrawHooks {
    fn start_draw(&mut self) -> HmdResult<()>;

    fn finish_draw(&mut self) -> HmdResult<FrameStatus>;
}

impl DrawHooks for StereoSession {
    fn start_draw(&mut self) -> HmdResult<()> {
        self.begin_frame()
    }

    fn finish_draw(&mut self) -> HmdResult<FrameStatus> {
        self.end_frame()
    }
}

/// Run a complete frame: start hook, `draw` with the render target bound, finish hook. The frame
/// is submitted even if `draw` fails; the draw error is returned afterwards.
pub fn draw_frame<F>(session: &mut StereoSession, draw: F) -> HmdResult<FrameStatus>
    where F: FnOnce(&mut StereoSession) -> HmdResult<()>
{
    session.start_draw()?;
    let drawn = ScopedBind::new(session).and_then(|mut bound| draw(&mut *bound));
    let status = session.finish_draw();
    drawn.and(status)
}

impl StereoSession {
    fn host(&self) -> HmdResult<Rc<dyn HostRenderer>> {
        if self.device.is_none() {
            return Err(HmdError::Detached);
        }
        self.window.clone().ok_or(HmdError::InvalidWindow)
    }

    /// The attached window, if it is still open. A closed window detaches the session.
    fn live_host(&mut self) -> HmdResult<Rc<dyn HostRenderer>> {
        let host = self.host()?;
        if !host.is_valid() {
            debug!("window closed during {:?} frame, detaching", self.phase);
            self.detach();
            return Err(HmdError::InvalidWindow);
        }
        Ok(host)
    }

    fn expect_phase(&self, expected: FramePhase, action: &'static str) -> HmdResult<()> {
        if self.phase != expected {
            return Err(HmdError::FramePhase { action, phase: self.phase });
        }
        Ok(())
    }

    /// Start a frame: resize the render target if its settings changed, commit pending settings,
    /// and predict both eyes' poses for the frame's display time.
    ///
    /// If the window has closed, the session detaches itself and `HmdError::InvalidWindow` is
    /// returned. The same holds for every later step of the frame.
    pub fn begin_frame(&mut self) -> HmdResult<()> {
        self.expect_phase(FramePhase::Idle, "begin a frame")?;
        let host = self.live_host()?;

        host.make_current();
        self.update_render_target(&*host)?;
        if self.settings_changed {
            self.commit_settings();
        }
        self.update_mirror(&*host);

        let device = self.device.as_deref().ok_or(HmdError::Detached)?;
        self.eye_view_offsets = [self.eye_render_desc[0].hmd_to_eye_offset,
                                 self.eye_render_desc[1].hmd_to_eye_offset];
        if self.settings.monoscopic {
            // normally half the interpupillary distance
            self.eye_view_offsets[0].x = 0.0;
            self.eye_view_offsets[1].x = 0.0;
        }

        let timing = device.frame_timing(self.frame_index);
        let state = device.tracking_state(timing.display_midpoint_seconds);
        self.eye_poses = device.calc_eye_poses(&state.head_pose, &self.eye_view_offsets);

        trace!("began frame {} for display at {:.4}s", self.frame_index, timing.display_midpoint_seconds);
        self.active_eye = None;
        self.phase = FramePhase::Posed;
        Ok(())
    }

    /// Create or resize the render target to match the current screen percentage. Only called
    /// between frames.
    pub(crate) fn update_render_target(&mut self, host: &dyn HostRenderer) -> HmdResult<()> {
        let device = self.device.as_deref_mut().ok_or(HmdError::Detached)?;
        let screen_percentage = self.settings.screen_percentage;
        let fovs = device.description().default_eye_fov;
        let left = device.fov_texture_size(Eye::Left, fovs[0], screen_percentage);
        let right = device.fov_texture_size(Eye::Right, fovs[1], screen_percentage);
        let size = Size::new(left.width + right.width, left.height.max(right.height));

        if self.render_target.as_ref().map_or(false, |t| t.matches(size, screen_percentage)) {
            return Ok(());
        }
        if let Some(previous) = self.render_target.take() {
            previous.release(device, Some(host));
        }
        self.render_target = Some(RenderTarget::create(device, host, size, screen_percentage)?);
        self.eye_render_desc = [device.render_desc(Eye::Left, fovs[0]),
                                device.render_desc(Eye::Right, fovs[1])];
        Ok(())
    }

    fn update_mirror(&mut self, host: &dyn HostRenderer) {
        let device = match self.device.as_deref_mut() {
            Some(device) => device,
            None => return,
        };
        let stale = self.mirror.as_ref().map_or(false, |m| {
            !self.settings.mirrored || m.mirror_percentage() != self.settings.mirror_percentage
        });
        if stale {
            if let Some(mirror) = self.mirror.take() {
                mirror.release(device, Some(host));
            }
        }
        if self.settings.mirrored && self.mirror.is_none() {
            let resolution = device.description().resolution;
            match MirrorSurface::create(device, host, resolution, self.settings.mirror_percentage) {
                Ok(mirror) => self.mirror = Some(mirror),
                Err(e) => warn!("failed to create mirror surface: {}", e),
            }
        }
    }

    /// Advance the render target to its next buffer, bind it and clear it. Must follow
    /// `begin_frame` and precede any eye being drawn.
    pub fn bind(&mut self) -> HmdResult<()> {
        self.expect_phase(FramePhase::Posed, "bind the render target")?;
        let host = self.live_host()?;
        let target = self.render_target.as_mut().ok_or(HmdError::InvalidWindow)?;
        target.bind(&*host);
        self.phase = FramePhase::Bound;
        Ok(())
    }

    pub fn unbind(&mut self) -> HmdResult<()> {
        self.expect_phase(FramePhase::Bound, "unbind the render target")?;
        let host = self.live_host()?;
        if let Some(ref target) = self.render_target {
            target.unbind(&*host);
        }
        self.phase = FramePhase::Drawn;
        Ok(())
    }

    /// Make `eye` the active eye: clear the cached matrices and place the eye camera at the
    /// frame's pose for that eye. With `apply_matrices`, the eye's viewport and matrices are also
    /// pushed to the host renderer.
    ///
    /// Draw calls for one eye must be issued before the next eye is enabled.
    pub fn enable_eye(&mut self, eye: Eye, apply_matrices: bool) -> HmdResult<()> {
        self.expect_phase(FramePhase::Bound, "enable an eye")?;
        let host = self.live_host()?;

        self.view_state.invalidate();
        self.active_eye = Some(eye);
        self.eye_camera.pose = self.eye_poses[eye.index()];
        self.eye_camera.fov = self.eye_render_desc[eye.index()].fov;

        if apply_matrices {
            host.set_viewport(self.eye_viewport());
            host.set_model_matrix(&Matrix4::identity());
            host.set_view_matrix(&self.view_matrix());
            host.set_projection_matrix(&self.projection_matrix());
        }
        Ok(())
    }

    pub fn current_eye(&self) -> Option<Eye> {
        self.active_eye
    }

    /// Viewport of the active eye within the render target.
    pub fn eye_viewport(&self) -> Viewport {
        match (self.active_eye, self.render_target.as_ref()) {
            (Some(eye), Some(target)) => target.eye_viewports()[eye.index()],
            _ => Viewport::default(),
        }
    }

    /// World-to-eye matrix for the active eye.
    pub fn view_matrix(&self) -> Matrix4 {
        cached(&self.view_state.view, || {
            math::view_matrix(&self.host_camera.pose(),
                              &self.eye_camera.pose,
                              self.is_tracked(),
                              self.settings.head_scale)
        })
    }

    pub fn inverse_view_matrix(&self) -> Matrix4 {
        cached(&self.view_state.inverse_view, || math::inverse_or_identity(&self.view_matrix()))
    }

    /// Projection for the active eye's field of view and the eye camera's clip planes.
    pub fn projection_matrix(&self) -> Matrix4 {
        let camera = &self.eye_camera;
        cached(&self.view_state.projection, || match self.device {
            Some(ref device) => device.projection(&camera.fov, camera.near_z, camera.far_z),
            None => math::fov_projection(&camera.fov, camera.near_z, camera.far_z),
        })
    }

    /// Finish the frame and submit both eyes to the headset. A frame the compositor doesn't show,
    /// or rejects, is not an error; the status is reported and the next frame proceeds normally.
    ///
    /// The render target must have been bound this frame, so that a fresh buffer from the ring is
    /// submitted. Ending a frame that is still bound unbinds it first.
    pub fn end_frame(&mut self) -> HmdResult<FrameStatus> {
        match self.phase {
            FramePhase::Idle | FramePhase::Posed => {
                return Err(HmdError::FramePhase { action: "end a frame", phase: self.phase });
            }
            FramePhase::Bound => {
                warn!("frame ended with the render target still bound");
                self.unbind()?;
            }
            FramePhase::Drawn => {}
        }
        let host = self.live_host()?;

        let target = self.render_target.as_ref().ok_or(HmdError::InvalidWindow)?;
        let layer = LayerEyeFov {
            high_quality: true,
            color_texture: target.textures().id,
            color_index: target.textures().current_index,
            viewport: target.eye_viewports(),
            fov: [self.eye_render_desc[0].fov, self.eye_render_desc[1].fov],
            render_pose: self.eye_poses,
        };
        let view_scale = ViewScaleDesc {
            hmd_space_to_world_scale_in_meters: 1.0,
            hmd_to_eye_offset: self.eye_view_offsets,
        };

        let device = self.device.as_deref_mut().ok_or(HmdError::Detached)?;
        let status = match device.submit_frame(self.frame_index, &view_scale, &layer) {
            Ok(SubmitStatus::Presented) => FrameStatus::Presented,
            Ok(SubmitStatus::NotVisible) => {
                debug!("frame {} is not visible", self.frame_index);
                FrameStatus::NotVisible
            }
            Err(e) => {
                warn!("frame {} was rejected: {}", self.frame_index, e);
                FrameStatus::Dropped
            }
        };

        if self.settings.mirrored {
            if let Some(ref mirror) = self.mirror {
                mirror.blit(&*host);
            }
        }

        trace!("ended frame {}: {:?}", self.frame_index, status);
        self.frame_index += 1;
        self.phase = FramePhase::Idle;
        Ok(status)
    }

    pub fn frame_phase(&self) -> FramePhase {
        self.phase
    }

    /// Number of frames submitted so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// This frame's predicted pose for `eye`.
    pub fn eye_pose(&self, eye: Eye) -> math::Pose {
        self.eye_poses[eye.index()]
    }

    /// Head-to-eye offsets used for this frame's poses.
    pub fn eye_view_offsets(&self) -> &[math::Vector3; 2] {
        &self.eye_view_offsets
    }

    pub fn render_target_size(&self) -> Option<Size> {
        self.render_target.as_ref().map(|t| t.size())
    }
}

/// Binds a session's render target for the lifetime of the guard. The target is unbound when
/// the guard goes out of scope, even if drawing fails part way through.
pub struct ScopedBind<'a> {
    session: &'a mut StereoSession,
}

impl<'a> ScopedBind<'a> {
    pub fn new(session: &'a mut StereoSession) -> HmdResult<ScopedBind<'a>> {
        session.bind()?;
        Ok(ScopedBind { session })
    }
}

impl<'a> Deref for ScopedBind<'a> {
    type Target = StereoSession;

    fn deref(&self) -> &StereoSession {
        self.session
    }
}

impl<'a> DerefMut for ScopedBind<'a> {
    fn deref_mut(&mut self) -> &mut StereoSession {
        self.session
    }
}

impl<'a> Drop for ScopedBind<'a> {
    fn drop(&mut self) {
        // a closed window already detached the session
        if self.session.phase != FramePhase::Bound {
            return;
        }
        if let Err(e) = self.session.unbind() {
            warn!("failed to unbind render target: {}", e);
        }
    }
}
