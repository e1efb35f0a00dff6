//! Drives a few frames through a debug headset with a renderer that only logs what it is asked
//! to do. Run with `RUST_LOG=trace` to see the whole frame protocol.

use std::cell::Cell;
use std::rc::Rc;

use log::{debug, info};

use rift_stereo::debug::SoftwareRuntime;
use rift_stereo::math::{Matrix4, Point3, Size, Vector3, Viewport};
use rift_stereo::render::draw_frame;
use rift_stereo::target::{DepthBufferId, FramebufferId, HostRenderer, TextureId};
use rift_stereo::{Context, HostCamera, TrackingOptions};

struct LoggingRenderer {
    size: Size,
    next_id: Cell<u32>,
}

impl LoggingRenderer {
    fn allocate(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

impl HostRenderer for LoggingRenderer {
    fn is_valid(&self) -> bool {
        true
    }

    fn supports_stereo_hooks(&self) -> bool {
        true
    }

    fn register_draw_hooks(&self) {
        debug!("draw hooks registered");
    }

    fn unregister_draw_hooks(&self) {
        debug!("draw hooks unregistered");
    }

    fn make_current(&self) {}

    fn window_viewport(&self) -> Viewport {
        Viewport::from_size(self.size)
    }

    fn set_viewport(&self, viewport: Viewport) {
        debug!("viewport {:?}", viewport);
    }

    fn set_model_matrix(&self, _matrix: &Matrix4) {}

    fn set_view_matrix(&self, matrix: &Matrix4) {
        debug!("view translation {:?}", matrix.w);
    }

    fn set_projection_matrix(&self, _matrix: &Matrix4) {}

    fn create_depth_buffer(&self, size: Size) -> DepthBufferId {
        debug!("depth buffer {}x{}", size.width, size.height);
        DepthBufferId(self.allocate())
    }

    fn release_depth_buffer(&self, _depth: DepthBufferId) {}

    fn bind_and_clear(&self, color: TextureId, _depth: DepthBufferId, _size: Size) {
        debug!("bound {:?}", color);
    }

    fn unbind(&self) {}

    fn create_framebuffer(&self, _color: TextureId, _size: Size) -> FramebufferId {
        FramebufferId(self.allocate())
    }

    fn release_framebuffer(&self, _framebuffer: FramebufferId) {}

    fn blit_to_screen(&self, _framebuffer: FramebufferId, _source: Viewport, _destination: Viewport) {}
}

fn main() -> rift_stereo::HmdResult<()> {
    env_logger::init();

    let context = Context::initialize(SoftwareRuntime::new())?;
    let mut session = context.build_session()
        .track(&TrackingOptions::with_all())
        .screen_percentage(1.25)
        .build()?;

    let window = Rc::new(LoggingRenderer {
        size: session.native_window_resolution(),
        next_id: Cell::new(1),
    });
    session.attach(window)?;
    session.set_host_camera(HostCamera::looking_at(Point3::new(0.0, 1.0, 2.0),
                                                   Point3::new(0.0, 0.0, 0.0),
                                                   Vector3::unit_y()));

    for _ in 0..5 {
        let status = draw_frame(&mut session, |session| {
            for eye in session.eyes() {
                session.enable_eye(eye, true)?;
            }
            Ok(())
        })?;
        info!("frame {} {:?}", session.frame_index(), status);
    }

    let latencies = session.latencies();
    println!("rendered {} frames at {:?}, latencies {:?} ms",
             session.frame_index(),
             session.render_target_size(),
             latencies);
    Ok(())
}
