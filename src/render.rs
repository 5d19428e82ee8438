// render.rs — collaborator interfaces: renderer, video source, platform capabilities

use crate::error::RenderError;
use glam::Vec3;

/// One decoded RGBA8 frame borrowed from a video source.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

pub trait VideoSource {
    /// True when a frame newer than the last one handed out is available.
    fn is_ready(&mut self) -> bool;

    /// The newest frame, if any has been decoded yet. Marks it as seen.
    fn current_frame(&mut self) -> Option<VideoFrame<'_>>;
}

/// The 3D engine the core drives. Scene and camera live inside the
/// implementation; the core only pushes parameters.
pub trait Renderer {
    type Mesh;
    type Texture;

    fn create_mesh(
        &mut self,
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
        uvs: &[[f32; 2]],
        indices: &[u32],
    ) -> Result<Self::Mesh, RenderError>;

    /// Creates the texture the sphere samples. Seeded from the source's
    /// current frame when one exists.
    fn create_texture_from_video(
        &mut self,
        video: &mut dyn VideoSource,
    ) -> Result<Self::Texture, RenderError>;

    /// Stages `frame` for upload; the texture is refreshed before the next render.
    fn mark_texture_dirty(&mut self, texture: &Self::Texture, frame: VideoFrame<'_>);

    fn set_camera_projection(&mut self, fov_degrees: f32, aspect: f32, near: f32, far: f32);
    fn set_camera_position(&mut self, position: Vec3);
    fn set_camera_look_at(&mut self, target: Vec3);

    /// Shows the instructions billboard at the given opacity, creating it if needed.
    fn show_overlay(&mut self, opacity: f32);
    fn hide_overlay(&mut self);

    fn render_frame(&mut self, mesh: &Self::Mesh, texture: &Self::Texture)
        -> Result<(), RenderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderContext {
    Available { adapter: String, backend: String },
    Unavailable { reason: String },
}

/// Probed once at startup and handed to the frame driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub render_context: RenderContext,
    pub max_texture_dimension: u32,
}

impl PlatformCapabilities {
    pub fn available(adapter: impl Into<String>, backend: impl Into<String>, max_texture_dimension: u32) -> Self {
        Self {
            render_context: RenderContext::Available {
                adapter: adapter.into(),
                backend: backend.into(),
            },
            max_texture_dimension,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            render_context: RenderContext::Unavailable {
                reason: reason.into(),
            },
            max_texture_dimension: 0,
        }
    }

    pub fn has_render_context(&self) -> bool {
        matches!(self.render_context, RenderContext::Available { .. })
    }
}
