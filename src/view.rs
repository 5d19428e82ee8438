// view.rs — camera pan/tilt/zoom and the interaction phase sequence
//
// Phases only move forward:
//   Orbiting -> Transitioning -> ShowingInstructions -> FreeInteraction

use crate::config::UnwarpConfig;
use crate::input::{InputDelta, ListenerSet};
use glam::Vec3;

/// Pan/tilt/FOV in degrees. `tilt_down_limit <= tilt <= tilt_up_limit`
/// holds after every update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub pan: f32,
    pub tilt: f32,
    pub fov: f32,
    pub tilt_up_limit: f32,
    pub tilt_down_limit: f32,
    pub min_fov: f32,
    pub max_fov: f32,
    mirror_lower: f32,
    mirror_upper: f32,
}

impl ViewState {
    pub fn new(config: &UnwarpConfig) -> Self {
        let mut view = Self {
            pan: 0.0,
            tilt: 0.0,
            fov: config.view.initial_fov,
            tilt_up_limit: 0.0,
            tilt_down_limit: 0.0,
            min_fov: config.view.min_fov,
            max_fov: config.max_fov(),
            mirror_lower: config.mirror.lower_limit,
            mirror_upper: config.mirror.upper_limit(),
        };
        view.update_tilt_limits();
        view.tilt = view.clamp_tilt(view.tilt);
        view
    }

    /// Max tilt up/down that keeps the whole view inside the mirror's range.
    fn update_tilt_limits(&mut self) {
        let half_fov = self.fov / 2.0;
        self.tilt_up_limit = self.mirror_upper - half_fov;
        self.tilt_down_limit = self.mirror_lower + half_fov;
        log::debug!(
            "tilt limits for fov {:.1}: up {:.1}, down {:.1}",
            self.fov,
            self.tilt_up_limit,
            self.tilt_down_limit
        );
    }

    fn clamp_tilt(&self, tilt: f32) -> f32 {
        tilt.max(self.tilt_down_limit).min(self.tilt_up_limit)
    }

    /// Changes the FOV and re-clamps tilt. Returns whether tilt moved.
    pub fn zoom(&mut self, delta_fov: f32) -> bool {
        self.fov = (self.fov + delta_fov).clamp(self.min_fov, self.max_fov);
        self.update_tilt_limits();
        let old_tilt = self.tilt;
        self.tilt = self.clamp_tilt(old_tilt);
        self.tilt != old_tilt
    }

    pub fn drag(&mut self, delta_pan: f32, delta_tilt: f32) {
        self.tilt = self.clamp_tilt(self.tilt + delta_tilt);
        let pan = (self.pan + delta_pan).rem_euclid(360.0);
        // rem_euclid rounds tiny negatives up to exactly 360
        self.pan = if pan >= 360.0 { 0.0 } else { pan };
    }

    /// Point on a sphere of `radius` the camera at the origin looks at.
    pub fn look_target(&self, radius: f32) -> Vec3 {
        let phi = (90.0 - self.tilt).to_radians();
        let theta = self.pan.to_radians();
        Vec3::new(
            radius * phi.sin() * theta.cos(),
            radius * phi.cos(),
            radius * phi.sin() * theta.sin(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionsState {
    Invisible,
    FadingIn { frames: u32 },
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionPhase {
    Orbiting,
    Transitioning,
    ShowingInstructions(InstructionsState),
    FreeInteraction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayUpdate {
    Show { opacity: f32 },
    Remove,
}

/// What a tick changed, for the driver to forward to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickEffects {
    pub camera_moved: bool,
    pub fov_changed: bool,
    pub overlay: Option<OverlayUpdate>,
    pub listeners: Option<ListenerSet>,
}

#[derive(Debug, Clone)]
pub struct ViewStateMachine {
    phase: InteractionPhase,
    view: ViewState,
    camera: CameraPose,
    sphere_radius: f32,
    orbit_angle: f32,
    orbit_radius: f32,
    orbit_speed: f32,
    approach_step: f32,
    fade_frames: u32,
    overlay_opacity: Option<f32>,
    drag_degrees_per_pixel: Option<f32>,
}

impl ViewStateMachine {
    /// Starts orbiting with the camera on +z outside the sphere.
    pub fn new(config: &UnwarpConfig) -> Self {
        Self {
            phase: InteractionPhase::Orbiting,
            view: ViewState::new(config),
            camera: CameraPose {
                position: Vec3::new(0.0, 0.0, config.orbit.radius),
                target: Vec3::ZERO,
            },
            sphere_radius: config.sphere.radius,
            orbit_angle: 0.0,
            orbit_radius: config.orbit.radius,
            orbit_speed: config.orbit.speed,
            approach_step: config.orbit.approach_step,
            fade_frames: config.instructions.fade_frames.max(1),
            overlay_opacity: None,
            drag_degrees_per_pixel: config.input.drag_degrees_per_pixel,
        }
    }

    pub fn phase(&self) -> InteractionPhase {
        self.phase
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn camera(&self) -> CameraPose {
        self.camera
    }

    pub fn orbit_angle(&self) -> f32 {
        self.orbit_angle
    }

    pub fn orbit_radius(&self) -> f32 {
        self.orbit_radius
    }

    pub fn overlay_opacity(&self) -> Option<f32> {
        self.overlay_opacity
    }

    /// Drag sensitivity: fixed if configured, else one viewport height per FOV.
    pub fn drag_degrees_per_pixel(&self, viewport_height: f32) -> f32 {
        match self.drag_degrees_per_pixel {
            Some(fixed) => fixed,
            None if viewport_height > 0.0 => self.view.fov / viewport_height,
            None => 0.0,
        }
    }

    pub fn tick(&mut self, input: &InputDelta) -> TickEffects {
        match self.phase {
            InteractionPhase::Orbiting => self.tick_orbiting(input),
            InteractionPhase::Transitioning => self.tick_transitioning(),
            InteractionPhase::ShowingInstructions(state) => self.tick_instructions(state, input),
            InteractionPhase::FreeInteraction => self.tick_free(input),
        }
    }

    fn enter(&mut self, phase: InteractionPhase) {
        log::info!("interaction phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn orbit_position(&self) -> Vec3 {
        let angle = self.orbit_angle.to_radians();
        Vec3::new(
            angle.cos() * self.orbit_radius,
            0.0,
            angle.sin() * self.orbit_radius,
        )
    }

    fn tick_orbiting(&mut self, input: &InputDelta) -> TickEffects {
        if input.contact {
            self.enter(InteractionPhase::Transitioning);
            return TickEffects {
                listeners: Some(ListenerSet::Detached),
                ..TickEffects::default()
            };
        }

        self.orbit_angle = (self.orbit_angle + self.orbit_speed).rem_euclid(360.0);
        self.camera.position = self.orbit_position();
        TickEffects {
            camera_moved: true,
            ..TickEffects::default()
        }
    }

    fn tick_transitioning(&mut self) -> TickEffects {
        self.orbit_radius = (self.orbit_radius - self.approach_step).max(0.0);
        let mut effects = TickEffects {
            camera_moved: true,
            ..TickEffects::default()
        };

        if self.orbit_radius > 0.0 {
            self.camera.position = self.orbit_position();
            return effects;
        }

        // now inside the sphere looking out; keep facing the same way
        self.camera.position = Vec3::ZERO;
        self.view.pan = (180.0 + self.orbit_angle).rem_euclid(360.0);
        self.camera.target = self.view.look_target(self.sphere_radius);
        self.enter(InteractionPhase::ShowingInstructions(InstructionsState::Invisible));
        effects.listeners = Some(ListenerSet::Interactive);
        effects
    }

    fn tick_instructions(&mut self, state: InstructionsState, input: &InputDelta) -> TickEffects {
        let mut effects = TickEffects::default();
        match state {
            InstructionsState::Invisible => {
                self.overlay_opacity = Some(0.0);
                effects.overlay = Some(OverlayUpdate::Show { opacity: 0.0 });
                self.phase =
                    InteractionPhase::ShowingInstructions(InstructionsState::FadingIn { frames: 0 });
            }
            InstructionsState::FadingIn { frames } => {
                let frames = (frames + 1).min(self.fade_frames);
                let opacity = frames as f32 / self.fade_frames as f32;
                self.overlay_opacity = Some(opacity);
                effects.overlay = Some(OverlayUpdate::Show { opacity });
                self.phase = if frames == self.fade_frames {
                    InteractionPhase::ShowingInstructions(InstructionsState::Visible)
                } else {
                    InteractionPhase::ShowingInstructions(InstructionsState::FadingIn { frames })
                };
            }
            InstructionsState::Visible => {
                if input.dragging || input.has_zoom() {
                    self.overlay_opacity = None;
                    effects.overlay = Some(OverlayUpdate::Remove);
                    self.enter(InteractionPhase::FreeInteraction);
                }
            }
        }
        effects
    }

    fn tick_free(&mut self, input: &InputDelta) -> TickEffects {
        let mut effects = TickEffects::default();
        if input.has_zoom() {
            effects.fov_changed = true;
            if self.view.zoom(input.delta_zoom) {
                // full target, not just its height, so elevation stays equal to tilt
                self.camera.target = self.view.look_target(self.sphere_radius);
                effects.camera_moved = true;
            }
        } else if input.dragging {
            self.view.drag(input.delta_pan, input.delta_tilt);
            self.camera.target = self.view.look_target(self.sphere_radius);
            effects.camera_moved = true;
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn contact() -> InputDelta {
        InputDelta {
            contact: true,
            ..InputDelta::default()
        }
    }

    fn drag(delta_pan: f32, delta_tilt: f32) -> InputDelta {
        InputDelta {
            delta_pan,
            delta_tilt,
            dragging: true,
            ..InputDelta::default()
        }
    }

    fn zoom(delta_zoom: f32) -> InputDelta {
        InputDelta {
            delta_zoom,
            ..InputDelta::default()
        }
    }

    /// Runs the intro sequence and returns a machine in `FreeInteraction`.
    fn free_machine(config: &UnwarpConfig) -> ViewStateMachine {
        let mut machine = ViewStateMachine::new(config);
        machine.tick(&contact());
        while machine.phase() != InteractionPhase::ShowingInstructions(InstructionsState::Visible) {
            machine.tick(&InputDelta::default());
        }
        machine.tick(&drag(0.0, 0.0));
        assert_eq!(machine.phase(), InteractionPhase::FreeInteraction);
        machine
    }

    #[test]
    fn initial_view_matches_config() {
        let view = ViewState::new(&UnwarpConfig::default());
        assert_eq!(view.fov, 75.0);
        assert_eq!(view.tilt, 0.0);
        assert!((view.tilt_up_limit - 14.5).abs() < EPSILON);
        assert!((view.tilt_down_limit + 20.5).abs() < EPSILON);
        assert_eq!(view.max_fov, 104.0);
    }

    #[test]
    fn pan_wraps_around() {
        let mut view = ViewState::new(&UnwarpConfig::default());
        view.pan = 350.0;
        view.drag(20.0, 0.0);
        assert!((view.pan - 10.0).abs() < EPSILON);

        view.drag(-30.0, 0.0);
        assert!((view.pan - 340.0).abs() < EPSILON);
    }

    #[test]
    fn zoom_reclamps_tilt() {
        let mut view = ViewState::new(&UnwarpConfig::default());
        view.drag(0.0, 100.0);
        assert!((view.tilt - 14.5).abs() < EPSILON);

        assert!(view.zoom(500.0));
        assert_eq!(view.fov, 104.0);
        assert!(view.tilt.abs() < EPSILON);

        assert!(!view.zoom(-500.0));
        assert_eq!(view.fov, 10.0);
    }

    #[test]
    fn orbiting_advances_angle() {
        let config = UnwarpConfig::default();
        let mut machine = ViewStateMachine::new(&config);
        assert_eq!(machine.camera().position, Vec3::new(0.0, 0.0, 900.0));

        for _ in 0..4 {
            let effects = machine.tick(&InputDelta::default());
            assert!(effects.camera_moved);
        }
        assert_eq!(machine.phase(), InteractionPhase::Orbiting);
        assert!((machine.orbit_angle() - 2.0).abs() < EPSILON);
        assert_eq!(machine.camera().target, Vec3::ZERO);
        assert!((machine.camera().position.length() - 900.0).abs() < 1e-2);
    }

    #[test]
    fn orbit_angle_wraps() {
        let mut config = UnwarpConfig::default();
        config.orbit.speed = 100.0;
        let mut machine = ViewStateMachine::new(&config);
        for _ in 0..4 {
            machine.tick(&InputDelta::default());
        }
        assert!((machine.orbit_angle() - 40.0).abs() < EPSILON);
    }

    #[test]
    fn contact_starts_transition_and_detaches_input() {
        let mut machine = ViewStateMachine::new(&UnwarpConfig::default());
        let effects = machine.tick(&contact());
        assert_eq!(machine.phase(), InteractionPhase::Transitioning);
        assert_eq!(effects.listeners, Some(ListenerSet::Detached));
        assert_eq!(machine.orbit_radius(), 900.0);
    }

    #[test]
    fn transition_reaches_center_after_radius_over_step_ticks() {
        let mut machine = ViewStateMachine::new(&UnwarpConfig::default());
        for _ in 0..20 {
            machine.tick(&InputDelta::default());
        }
        let angle = machine.orbit_angle();
        machine.tick(&contact());

        for tick in 1..90 {
            let effects = machine.tick(&contact());
            assert_eq!(machine.phase(), InteractionPhase::Transitioning, "tick {tick}");
            assert!(effects.listeners.is_none());
        }
        assert!((machine.orbit_radius() - 10.0).abs() < EPSILON);

        let effects = machine.tick(&InputDelta::default());
        assert_eq!(
            machine.phase(),
            InteractionPhase::ShowingInstructions(InstructionsState::Invisible)
        );
        assert_eq!(effects.listeners, Some(ListenerSet::Interactive));
        assert_eq!(machine.camera().position, Vec3::ZERO);
        assert!((machine.view().pan - (180.0 + angle)).abs() < EPSILON);

        let target = machine.camera().target;
        let expected = (180.0 + angle).to_radians();
        assert!((target.x - 500.0 * expected.cos()).abs() < 1e-2);
        assert!(target.y.abs() < 1e-2);
        assert!((target.z - 500.0 * expected.sin()).abs() < 1e-2);
    }

    #[test]
    fn instructions_fade_in_then_wait_for_input() {
        let config = UnwarpConfig::default();
        let mut machine = ViewStateMachine::new(&config);
        machine.tick(&contact());
        while machine.phase() == InteractionPhase::Transitioning {
            machine.tick(&InputDelta::default());
        }

        let effects = machine.tick(&InputDelta::default());
        assert_eq!(effects.overlay, Some(OverlayUpdate::Show { opacity: 0.0 }));
        assert_eq!(
            machine.phase(),
            InteractionPhase::ShowingInstructions(InstructionsState::FadingIn { frames: 0 })
        );

        for _ in 0..29 {
            machine.tick(&InputDelta::default());
        }
        assert!(matches!(
            machine.phase(),
            InteractionPhase::ShowingInstructions(InstructionsState::FadingIn { frames: 29 })
        ));

        machine.tick(&InputDelta::default());
        assert_eq!(
            machine.phase(),
            InteractionPhase::ShowingInstructions(InstructionsState::Visible)
        );
        assert!((machine.overlay_opacity().unwrap() - 1.0).abs() < EPSILON);

        // idle ticks leave the overlay up
        let effects = machine.tick(&InputDelta::default());
        assert_eq!(effects.overlay, None);

        let effects = machine.tick(&zoom(-3.0));
        assert_eq!(effects.overlay, Some(OverlayUpdate::Remove));
        assert_eq!(machine.phase(), InteractionPhase::FreeInteraction);
        assert_eq!(machine.overlay_opacity(), None);
        // the dismissing zoom is not applied
        assert_eq!(machine.view().fov, 75.0);
    }

    #[test]
    fn zoom_wins_over_drag_in_same_tick() {
        let config = UnwarpConfig::default();
        let mut machine = free_machine(&config);
        let pan = machine.view().pan;

        let effects = machine.tick(&InputDelta {
            delta_pan: 15.0,
            delta_tilt: 5.0,
            delta_zoom: -10.0,
            dragging: true,
            contact: false,
        });
        assert!(effects.fov_changed);
        assert_eq!(machine.view().fov, 65.0);
        assert_eq!(machine.view().pan, pan);
        assert_eq!(machine.view().tilt, 0.0);
    }

    #[test]
    fn drag_updates_look_target() {
        let config = UnwarpConfig::default();
        let mut machine = free_machine(&config);
        let pan = machine.view().pan;

        let effects = machine.tick(&drag(10.0, 5.0));
        assert!(effects.camera_moved);
        assert!(!effects.fov_changed);
        let view = *machine.view();
        assert!((view.pan - (pan + 10.0).rem_euclid(360.0)).abs() < EPSILON);
        assert!((view.tilt - 5.0).abs() < EPSILON);

        let target = machine.camera().target;
        assert!((target.length() - 500.0).abs() < 1e-2);
        assert!((target.y - 500.0 * 5.0f32.to_radians().sin()).abs() < 1e-2);
    }

    #[test]
    fn zoom_out_at_tilt_limit_moves_target_down() {
        let config = UnwarpConfig::default();
        let mut machine = free_machine(&config);
        machine.tick(&drag(0.0, 100.0));
        assert!((machine.view().tilt - 14.5).abs() < EPSILON);

        let effects = machine.tick(&zoom(20.0));
        assert!(effects.fov_changed);
        assert!(effects.camera_moved);
        let view = *machine.view();
        assert_eq!(view.fov, 95.0);
        assert!((view.tilt - 4.5).abs() < EPSILON);

        let target = machine.camera().target;
        assert!((target.y - 500.0 * view.tilt.to_radians().sin()).abs() < 1e-2);
        assert!((target.length() - 500.0).abs() < 1e-2);
    }

    #[test]
    fn free_interaction_keeps_invariants() {
        let config = UnwarpConfig::default();
        let mut machine = free_machine(&config);
        let script = [
            drag(40.0, 30.0),
            zoom(25.0),
            drag(-400.0, -80.0),
            zoom(-90.0),
            drag(725.0, 12.5),
            zoom(60.0),
            zoom(60.0),
            drag(-0.5, 200.0),
            zoom(-7.0),
        ];
        for delta in script.iter().cycle().take(90) {
            machine.tick(delta);
            let view = machine.view();
            assert!(view.tilt_down_limit <= view.tilt && view.tilt <= view.tilt_up_limit);
            assert!(view.min_fov <= view.fov && view.fov <= view.max_fov);
            assert!((0.0..360.0).contains(&view.pan));
        }
    }

    #[test]
    fn idle_free_tick_changes_nothing() {
        let config = UnwarpConfig::default();
        let mut machine = free_machine(&config);
        let before = *machine.view();
        let effects = machine.tick(&InputDelta::default());
        assert_eq!(effects, TickEffects::default());
        assert_eq!(*machine.view(), before);
    }

    #[test]
    fn drag_sensitivity_follows_fov() {
        let mut config = UnwarpConfig::default();
        let machine = ViewStateMachine::new(&config);
        assert!((machine.drag_degrees_per_pixel(750.0) - 0.1).abs() < EPSILON);
        assert_eq!(machine.drag_degrees_per_pixel(0.0), 0.0);

        config.input.drag_degrees_per_pixel = Some(0.25);
        let machine = ViewStateMachine::new(&config);
        assert_eq!(machine.drag_degrees_per_pixel(750.0), 0.25);
    }
}
