// driver.rs — per-frame orchestration: video refresh, view update, one render
//
// The host calls `tick()` once per display refresh and only schedules the next
// refresh while `is_running()` holds. Everything that touches the renderer
// happens inside `tick()`.

use crate::config::UnwarpConfig;
use crate::error::{Result, UnwarpError};
use crate::input::SharedInput;
use crate::mesh::SphereMesh;
use crate::render::{PlatformCapabilities, RenderContext, Renderer, VideoSource};
use crate::view::{OverlayUpdate, TickEffects, ViewStateMachine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was rendered and another should be scheduled.
    Continue,
    /// The driver is stopped; schedule nothing.
    Stopped,
}

/// Stops the tick loop from anywhere, including from inside a tick.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        if self.0.swap(false, Ordering::SeqCst) {
            log::info!("frame loop stopped");
        }
    }
}

pub struct FrameDriver<R: Renderer, V: VideoSource> {
    config: UnwarpConfig,
    capabilities: PlatformCapabilities,
    renderer: R,
    video: V,
    input: SharedInput,
    machine: ViewStateMachine,
    mesh: R::Mesh,
    texture: R::Texture,
    running: Arc<AtomicBool>,
    viewport: (u32, u32),
    frames: u64,
}

impl<R: Renderer, V: VideoSource> FrameDriver<R, V> {
    /// Validates the config, builds the sphere once and hands it to the renderer.
    pub fn new(
        config: UnwarpConfig,
        capabilities: PlatformCapabilities,
        mut renderer: R,
        mut video: V,
    ) -> Result<Self> {
        let geometry = SphereMesh::from_config(&config)?;
        log::info!(
            "unwarp sphere: {} vertices, {} triangles, bands {:?}",
            geometry.vertex_count(),
            geometry.triangle_count(),
            geometry.bands
        );
        let mesh = renderer.create_mesh(
            &geometry.positions,
            &geometry.normals,
            &geometry.uvs,
            &geometry.indices,
        )?;
        let texture = renderer.create_texture_from_video(&mut video)?;

        let machine = ViewStateMachine::new(&config);
        let input = SharedInput::new(config.input.zoom_degrees_per_line);

        let mut driver = Self {
            config,
            capabilities,
            renderer,
            video,
            input,
            machine,
            mesh,
            texture,
            running: Arc::new(AtomicBool::new(false)),
            viewport: (1, 1),
            frames: 0,
        };
        driver.apply_projection();
        driver.apply_camera();
        Ok(driver)
    }

    /// Handle for the host's event callbacks.
    pub fn input(&self) -> SharedInput {
        self.input.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    /// Begins ticking. Fails without starting when no render context exists.
    pub fn start(&mut self) -> Result<()> {
        if let RenderContext::Unavailable { reason } = &self.capabilities.render_context {
            log::error!("cannot start frame loop: {reason}");
            return Err(UnwarpError::RenderContextUnavailable(reason.clone()));
        }
        if !self.running.swap(true, Ordering::SeqCst) {
            log::info!("frame loop started");
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = (width, height);
        self.apply_projection();
    }

    pub fn tick(&mut self) -> Result<TickOutcome> {
        if !self.is_running() {
            return Ok(TickOutcome::Stopped);
        }

        if self.video.is_ready() {
            if let Some(frame) = self.video.current_frame() {
                self.renderer.mark_texture_dirty(&self.texture, frame);
            }
        }

        let delta = self.input.consume();
        let effects = self.machine.tick(&delta);
        self.apply(effects);
        self.input
            .set_degrees_per_pixel(self.machine.drag_degrees_per_pixel(self.viewport.1 as f32));

        self.renderer.render_frame(&self.mesh, &self.texture)?;
        self.frames += 1;

        Ok(if self.is_running() {
            TickOutcome::Continue
        } else {
            TickOutcome::Stopped
        })
    }

    fn apply(&mut self, effects: TickEffects) {
        if let Some(listeners) = effects.listeners {
            self.input.set_listeners(listeners);
        }
        if effects.fov_changed {
            self.apply_projection();
        }
        if effects.camera_moved {
            self.apply_camera();
        }
        match effects.overlay {
            Some(OverlayUpdate::Show { opacity }) => self.renderer.show_overlay(opacity),
            Some(OverlayUpdate::Remove) => self.renderer.hide_overlay(),
            None => {}
        }
    }

    fn apply_projection(&mut self) {
        let (width, height) = self.viewport;
        self.renderer.set_camera_projection(
            self.machine.view().fov,
            width as f32 / height as f32,
            self.config.near_plane,
            self.config.far_plane(),
        );
    }

    fn apply_camera(&mut self) {
        let camera = self.machine.camera();
        self.renderer.set_camera_position(camera.position);
        self.renderer.set_camera_look_at(camera.target);
    }

    pub fn machine(&self) -> &ViewStateMachine {
        &self.machine
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::input::{InputEvent, ListenerSet};
    use crate::render::VideoFrame;
    use crate::view::{InstructionsState, InteractionPhase};
    use glam::Vec3;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        CreateMesh { vertices: usize, indices: usize },
        CreateTexture { seeded: bool },
        Dirty { width: u32 },
        Projection { fov: f32, aspect: f32, near: f32, far: f32 },
        Position(Vec3),
        LookAt(Vec3),
        ShowOverlay(f32),
        HideOverlay,
        Render,
    }

    #[derive(Default)]
    struct RecordingRenderer {
        calls: Vec<Call>,
        fail_render: bool,
        stop_on_render: Option<StopHandle>,
    }

    impl RecordingRenderer {
        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(*c)).count()
        }
    }

    impl Renderer for RecordingRenderer {
        type Mesh = usize;
        type Texture = u32;

        fn create_mesh(
            &mut self,
            positions: &[[f32; 3]],
            _normals: &[[f32; 3]],
            _uvs: &[[f32; 2]],
            indices: &[u32],
        ) -> Result<usize, RenderError> {
            self.calls.push(Call::CreateMesh {
                vertices: positions.len(),
                indices: indices.len(),
            });
            Ok(1)
        }

        fn create_texture_from_video(
            &mut self,
            video: &mut dyn VideoSource,
        ) -> Result<u32, RenderError> {
            let seeded = video.current_frame().is_some();
            self.calls.push(Call::CreateTexture { seeded });
            Ok(7)
        }

        fn mark_texture_dirty(&mut self, texture: &u32, frame: VideoFrame<'_>) {
            assert_eq!(*texture, 7);
            self.calls.push(Call::Dirty { width: frame.width });
        }

        fn set_camera_projection(&mut self, fov: f32, aspect: f32, near: f32, far: f32) {
            self.calls.push(Call::Projection { fov, aspect, near, far });
        }

        fn set_camera_position(&mut self, position: Vec3) {
            self.calls.push(Call::Position(position));
        }

        fn set_camera_look_at(&mut self, target: Vec3) {
            self.calls.push(Call::LookAt(target));
        }

        fn show_overlay(&mut self, opacity: f32) {
            self.calls.push(Call::ShowOverlay(opacity));
        }

        fn hide_overlay(&mut self) {
            self.calls.push(Call::HideOverlay);
        }

        fn render_frame(&mut self, mesh: &usize, texture: &u32) -> Result<(), RenderError> {
            assert_eq!((*mesh, *texture), (1, 7));
            if self.fail_render {
                return Err(RenderError::new("surface lost"));
            }
            self.calls.push(Call::Render);
            if let Some(handle) = &self.stop_on_render {
                handle.stop();
            }
            Ok(())
        }
    }

    /// Yields a new frame on every `ready_every`-th poll.
    struct ScriptedVideo {
        pixels: Vec<u8>,
        polls: u32,
        ready_every: u32,
        fresh: bool,
    }

    impl ScriptedVideo {
        fn new(ready_every: u32) -> Self {
            Self {
                pixels: vec![0; 4 * 4 * 2],
                polls: 0,
                ready_every,
                fresh: false,
            }
        }
    }

    impl VideoSource for ScriptedVideo {
        fn is_ready(&mut self) -> bool {
            self.polls += 1;
            if self.ready_every > 0 && self.polls % self.ready_every == 0 {
                self.fresh = true;
            }
            self.fresh
        }

        fn current_frame(&mut self) -> Option<VideoFrame<'_>> {
            if self.polls == 0 {
                return None;
            }
            self.fresh = false;
            Some(VideoFrame {
                width: 4,
                height: 2,
                pixels: &self.pixels,
            })
        }
    }

    fn driver(ready_every: u32) -> FrameDriver<RecordingRenderer, ScriptedVideo> {
        FrameDriver::new(
            UnwarpConfig::default(),
            PlatformCapabilities::available("test adapter", "Vulkan", 8192),
            RecordingRenderer::default(),
            ScriptedVideo::new(ready_every),
        )
        .unwrap()
    }

    #[test]
    fn construction_uploads_mesh_and_initial_camera() {
        let driver = driver(0);
        let calls = &driver.renderer().calls;
        assert_eq!(
            calls[0],
            Call::CreateMesh {
                vertices: 5096,
                indices: 29700
            }
        );
        assert_eq!(calls[1], Call::CreateTexture { seeded: false });
        assert_eq!(
            calls[2],
            Call::Projection {
                fov: 75.0,
                aspect: 1.0,
                near: 1.0,
                far: UnwarpConfig::default().far_plane()
            }
        );
        assert_eq!(calls[3], Call::Position(Vec3::new(0.0, 0.0, 900.0)));
        assert_eq!(calls[4], Call::LookAt(Vec3::ZERO));
        assert!(!driver.is_running());
    }

    #[test]
    fn invalid_config_is_fatal() {
        let mut config = UnwarpConfig::default();
        config.warped_image.radius = [0.0, 0.45];
        let result = FrameDriver::new(
            config,
            PlatformCapabilities::available("test adapter", "Vulkan", 8192),
            RecordingRenderer::default(),
            ScriptedVideo::new(0),
        );
        assert!(matches!(result, Err(UnwarpError::Configuration(_))));
    }

    #[test]
    fn missing_render_context_does_not_start() {
        let mut driver = FrameDriver::new(
            UnwarpConfig::default(),
            PlatformCapabilities::unavailable("no adapter"),
            RecordingRenderer::default(),
            ScriptedVideo::new(0),
        )
        .unwrap();
        assert!(matches!(
            driver.start(),
            Err(UnwarpError::RenderContextUnavailable(_))
        ));
        assert!(!driver.is_running());
        assert_eq!(driver.tick().unwrap(), TickOutcome::Stopped);
        assert_eq!(driver.frames_rendered(), 0);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut driver = driver(0);
        assert_eq!(driver.tick().unwrap(), TickOutcome::Stopped);

        driver.start().unwrap();
        driver.start().unwrap();
        assert_eq!(driver.tick().unwrap(), TickOutcome::Continue);
        assert_eq!(driver.tick().unwrap(), TickOutcome::Continue);
        assert_eq!(driver.frames_rendered(), 2);

        driver.stop();
        driver.stop();
        assert_eq!(driver.tick().unwrap(), TickOutcome::Stopped);
        assert_eq!(driver.frames_rendered(), 2);
    }

    #[test]
    fn stop_handle_halts_from_outside() {
        let mut driver = driver(0);
        driver.start().unwrap();
        let handle = driver.stop_handle();
        std::thread::spawn(move || handle.stop()).join().unwrap();
        assert!(!driver.is_running());
        assert_eq!(driver.tick().unwrap(), TickOutcome::Stopped);
    }

    #[test]
    fn stop_inside_tick_prevents_further_ticks() {
        let mut driver = driver(0);
        driver.start().unwrap();
        let handle = driver.stop_handle();
        driver.renderer_mut().stop_on_render = Some(handle);

        assert_eq!(driver.tick().unwrap(), TickOutcome::Stopped);
        assert!(!driver.is_running());
        assert_eq!(driver.frames_rendered(), 1);

        assert_eq!(driver.tick().unwrap(), TickOutcome::Stopped);
        assert_eq!(driver.renderer().count(|c| *c == Call::Render), 1);
        assert_eq!(driver.frames_rendered(), 1);
    }

    #[test]
    fn each_tick_renders_once_and_refreshes_ready_video() {
        let mut driver = driver(2);
        driver.start().unwrap();
        for _ in 0..6 {
            driver.tick().unwrap();
        }
        let renderer = driver.renderer();
        assert_eq!(renderer.count(|c| *c == Call::Render), 6);
        assert_eq!(renderer.count(|c| matches!(c, Call::Dirty { width: 4 })), 3);
    }

    #[test]
    fn render_failure_is_reported_not_retried() {
        let mut driver = driver(0);
        driver.start().unwrap();
        driver.renderer_mut().fail_render = true;
        assert!(matches!(driver.tick(), Err(UnwarpError::Renderer(_))));
        assert_eq!(driver.frames_rendered(), 0);
        // still running; the host decides what to do
        assert!(driver.is_running());
    }

    #[test]
    fn resize_updates_aspect() {
        let mut driver = driver(0);
        driver.resize(1600, 900);
        driver.resize(0, 900);
        let projections: Vec<_> = driver
            .renderer()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Projection { aspect, .. } => Some(*aspect),
                _ => None,
            })
            .collect();
        assert_eq!(projections, vec![1.0, 1600.0 / 900.0]);
    }

    #[test]
    fn full_interaction_sequence() {
        let mut driver = driver(0);
        driver.resize(800, 600);
        driver.start().unwrap();
        let input = driver.input();

        driver.tick().unwrap();
        assert_eq!(driver.machine().phase(), InteractionPhase::Orbiting);

        input.handle(InputEvent::PointerDown { x: 5.0, y: 5.0 });
        driver.tick().unwrap();
        assert_eq!(driver.machine().phase(), InteractionPhase::Transitioning);
        assert_eq!(input.listeners(), ListenerSet::Detached);

        for _ in 0..90 {
            driver.tick().unwrap();
        }
        assert_eq!(
            driver.machine().phase(),
            InteractionPhase::ShowingInstructions(InstructionsState::Invisible)
        );
        assert_eq!(input.listeners(), ListenerSet::Interactive);

        for _ in 0..31 {
            driver.tick().unwrap();
        }
        assert_eq!(
            driver.machine().phase(),
            InteractionPhase::ShowingInstructions(InstructionsState::Visible)
        );
        assert_eq!(
            driver.renderer().count(|c| matches!(c, Call::ShowOverlay(_))),
            31
        );

        input.handle(InputEvent::Wheel { lines: 1.0 });
        driver.tick().unwrap();
        assert_eq!(driver.machine().phase(), InteractionPhase::FreeInteraction);
        assert_eq!(driver.renderer().calls.last(), Some(&Call::Render));
        assert_eq!(driver.renderer().count(|c| *c == Call::HideOverlay), 1);

        input.handle(InputEvent::Wheel { lines: 1.0 });
        driver.tick().unwrap();
        assert_eq!(driver.machine().view().fov, 69.0);

        // drag right by 100px at 69 / 600 degrees per pixel
        let pan = driver.machine().view().pan;
        input.handle(InputEvent::PointerDown { x: 100.0, y: 100.0 });
        input.handle(InputEvent::PointerMove { x: 200.0, y: 100.0 });
        driver.tick().unwrap();
        let expected = (pan + 100.0 * 69.0 / 600.0).rem_euclid(360.0);
        assert!((driver.machine().view().pan - expected).abs() < 1e-3);
    }
}
