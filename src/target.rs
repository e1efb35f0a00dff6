//! The host side of a stereo session: the window and renderer that frames are drawn with, and the
//! render surfaces the session keeps on the host's behalf.

use log::{debug, info};

use crate::device::{MirrorTexture, SwapTextureSet, TextureFormat, TrackingDevice};
use crate::math::{Matrix4, Size, Viewport};
use crate::HmdResult;

/// Identifier of a color texture, as understood by the host renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Identifier of a depth buffer created by the host renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthBufferId(pub u32);

/// Identifier of a framebuffer object created by the host renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// A window with a graphics context to bind headset rendering to.
///
/// All calls happen on the thread that owns the graphics context, from inside the host's render
/// loop. Methods take `&self` because the underlying context is itself a shared, implicitly
/// current object.
pub trait HostRenderer {
    /// False once the window has been closed.
    fn is_valid(&self) -> bool;

    /// True if the renderer can run the stereo start/finish draw hooks around its draw call.
    fn supports_stereo_hooks(&self) -> bool;

    /// Route this window's draw pass through the session's `DrawHooks`.
    fn register_draw_hooks(&self);

    fn unregister_draw_hooks(&self);

    fn make_current(&self);

    fn window_viewport(&self) -> Viewport;

    fn set_viewport(&self, viewport: Viewport);

    fn set_model_matrix(&self, matrix: &Matrix4);

    fn set_view_matrix(&self, matrix: &Matrix4);

    fn set_projection_matrix(&self, matrix: &Matrix4);

    fn create_depth_buffer(&self, size: Size) -> DepthBufferId;

    fn release_depth_buffer(&self, depth: DepthBufferId);

    /// Make `color` and `depth` the active render surface and clear both.
    fn bind_and_clear(&self, color: TextureId, depth: DepthBufferId, size: Size);

    fn unbind(&self);

    fn create_framebuffer(&self, color: TextureId, size: Size) -> FramebufferId;

    fn release_framebuffer(&self, framebuffer: FramebufferId);

    fn blit_to_screen(&self, framebuffer: FramebufferId, source: Viewport, destination: Viewport);
}

/// Shared color and depth surface both eyes render into, side by side. The color side is a
/// runtime-owned swap ring; the depth side belongs to the host.
pub struct RenderTarget {
    textures: SwapTextureSet,
    depth: DepthBufferId,
    size: Size,
    screen_percentage: f32,
}

impl RenderTarget {
    pub fn create(device: &mut dyn TrackingDevice,
                  host: &dyn HostRenderer,
                  size: Size,
                  screen_percentage: f32) -> HmdResult<RenderTarget> {
        let textures = device.create_swap_texture_set(TextureFormat::Srgba8, size)?;
        let depth = host.create_depth_buffer(size);
        info!("created {}x{} render target with {} buffers",
              size.width, size.height, textures.textures.len());
        Ok(RenderTarget {
            textures,
            depth,
            size,
            screen_percentage,
        })
    }

    pub fn release(self, device: &mut dyn TrackingDevice, host: Option<&dyn HostRenderer>) {
        debug!("releasing {}x{} render target", self.size.width, self.size.height);
        if let Some(host) = host {
            host.release_depth_buffer(self.depth);
        }
        device.destroy_swap_texture_set(self.textures);
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn matches(&self, size: Size, screen_percentage: f32) -> bool {
        self.size == size && self.screen_percentage == screen_percentage
    }

    /// Viewports of the left and right eye within the target.
    pub fn eye_viewports(&self) -> [Viewport; 2] {
        let half = self.size.width / 2;
        [Viewport::new(0, 0, half, self.size.height),
         Viewport::new(half as i32, 0, half, self.size.height)]
    }

    pub fn textures(&self) -> &SwapTextureSet {
        &self.textures
    }

    /// Advance to the next buffer in the ring, bind it and clear it.
    pub fn bind(&mut self, host: &dyn HostRenderer) {
        let color = self.textures.advance();
        host.bind_and_clear(color, self.depth, self.size);
    }

    pub fn unbind(&self, host: &dyn HostRenderer) {
        host.unbind();
    }
}

/// Desktop copy of the headset output, read back through a framebuffer.
pub struct MirrorSurface {
    texture: MirrorTexture,
    framebuffer: FramebufferId,
    mirror_percentage: f32,
}

impl MirrorSurface {
    pub fn create(device: &mut dyn TrackingDevice,
                  host: &dyn HostRenderer,
                  resolution: Size,
                  mirror_percentage: f32) -> HmdResult<MirrorSurface> {
        let size = resolution.scaled(mirror_percentage);
        let texture = device.create_mirror_texture(TextureFormat::Rgba8, size)?;
        let framebuffer = host.create_framebuffer(texture.texture, size);
        info!("created {}x{} mirror surface", size.width, size.height);
        Ok(MirrorSurface {
            texture,
            framebuffer,
            mirror_percentage,
        })
    }

    pub fn release(self, device: &mut dyn TrackingDevice, host: Option<&dyn HostRenderer>) {
        if let Some(host) = host {
            host.release_framebuffer(self.framebuffer);
        }
        device.destroy_mirror_texture(self.texture);
    }

    pub fn mirror_percentage(&self) -> f32 {
        self.mirror_percentage
    }

    pub fn blit(&self, host: &dyn HostRenderer) {
        host.blit_to_screen(self.framebuffer,
                            Viewport::from_size(self.texture.size),
                            host.window_viewport());
    }
}
