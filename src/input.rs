// input.rs — pointer/wheel accumulator consumed once per tick
//
// Event handlers only ever write here. The tick takes a snapshot with
// `consume()` which resets the deltas in the same lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    /// Wheel motion in lines, positive when scrolling up / away from the user.
    Wheel { lines: f32 },
}

/// Which handlers are attached to the input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerSet {
    /// Any event only reports that the viewer was touched.
    #[default]
    FirstContact,
    /// Nothing is listening.
    Detached,
    /// Drag pans/tilts, wheel zooms.
    Interactive,
}

/// Input gathered since the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputDelta {
    pub delta_pan: f32,
    pub delta_tilt: f32,
    pub delta_zoom: f32,
    /// Pointer button held; survives `consume()`.
    pub dragging: bool,
    /// At least one event arrived while `FirstContact` was attached.
    pub contact: bool,
}

impl InputDelta {
    pub fn has_zoom(&self) -> bool {
        self.delta_zoom != 0.0
    }
}

#[derive(Debug)]
pub struct InputAccumulator {
    listeners: ListenerSet,
    pending: InputDelta,
    last_pointer: Option<(f32, f32)>,
    degrees_per_pixel: f32,
    zoom_degrees_per_line: f32,
}

impl InputAccumulator {
    pub fn new(zoom_degrees_per_line: f32) -> Self {
        Self {
            listeners: ListenerSet::default(),
            pending: InputDelta::default(),
            last_pointer: None,
            degrees_per_pixel: 0.1,
            zoom_degrees_per_line,
        }
    }

    pub fn listeners(&self) -> ListenerSet {
        self.listeners
    }

    /// Swaps the attached handler set. Attaching `Interactive` starts from a
    /// released pointer with no pending motion.
    pub fn set_listeners(&mut self, listeners: ListenerSet) {
        if self.listeners == listeners {
            return;
        }
        log::debug!("input listeners {:?} -> {:?}", self.listeners, listeners);
        self.listeners = listeners;
        self.pending = InputDelta::default();
        self.last_pointer = None;
    }

    pub fn set_degrees_per_pixel(&mut self, degrees_per_pixel: f32) {
        if degrees_per_pixel.is_finite() && degrees_per_pixel > 0.0 {
            self.degrees_per_pixel = degrees_per_pixel;
        }
    }

    pub fn handle(&mut self, event: InputEvent) {
        match self.listeners {
            ListenerSet::Detached => {}
            ListenerSet::FirstContact => self.pending.contact = true,
            ListenerSet::Interactive => self.handle_interactive(event),
        }
    }

    fn handle_interactive(&mut self, event: InputEvent) {
        match event {
            InputEvent::PointerDown { x, y } => {
                self.pending.dragging = true;
                self.last_pointer = Some((x, y));
            }
            InputEvent::PointerMove { x, y } => {
                if !self.pending.dragging {
                    return;
                }
                if let Some((px, py)) = self.last_pointer {
                    // dragging right turns the view right, dragging down tilts up
                    self.pending.delta_pan += (x - px) * self.degrees_per_pixel;
                    self.pending.delta_tilt += (y - py) * self.degrees_per_pixel;
                }
                self.last_pointer = Some((x, y));
            }
            InputEvent::PointerUp => {
                self.pending.dragging = false;
                self.last_pointer = None;
            }
            InputEvent::Wheel { lines } => {
                if lines.is_finite() {
                    self.pending.delta_zoom -= lines * self.zoom_degrees_per_line;
                }
            }
        }
    }

    /// Returns everything gathered since the last call and resets it.
    pub fn consume(&mut self) -> InputDelta {
        let snapshot = self.pending;
        self.pending = InputDelta {
            dragging: snapshot.dragging,
            ..InputDelta::default()
        };
        snapshot
    }
}

/// Cloneable handle so the host's event callbacks and the frame driver share
/// one accumulator.
#[derive(Debug, Clone)]
pub struct SharedInput(Arc<Mutex<InputAccumulator>>);

impl SharedInput {
    pub fn new(zoom_degrees_per_line: f32) -> Self {
        Self(Arc::new(Mutex::new(InputAccumulator::new(zoom_degrees_per_line))))
    }

    fn lock(&self) -> MutexGuard<'_, InputAccumulator> {
        // accumulator state stays consistent even if a holder panicked
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handle(&self, event: InputEvent) {
        self.lock().handle(event);
    }

    pub fn set_degrees_per_pixel(&self, degrees_per_pixel: f32) {
        self.lock().set_degrees_per_pixel(degrees_per_pixel);
    }

    pub fn set_listeners(&self, listeners: ListenerSet) {
        self.lock().set_listeners(listeners);
    }

    pub fn listeners(&self) -> ListenerSet {
        self.lock().listeners()
    }

    pub fn consume(&self) -> InputDelta {
        self.lock().consume()
    }
}
