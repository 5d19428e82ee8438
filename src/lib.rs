//! Live viewer for video shot through an equiangular panoramic mirror.
//!
//! [`mesh`] builds the partial sphere whose UVs sample the warped frame,
//! [`view`] turns input into camera state each tick and [`driver`] runs the
//! per-frame loop against any [`render::Renderer`]. [`gpu`] is the wgpu
//! implementation used by the binary.

pub mod config;
pub mod driver;
pub mod error;
pub mod gpu;
pub mod i18n;
pub mod input;
pub mod mesh;
pub mod render;
pub mod video;
pub mod view;

pub use config::UnwarpConfig;
pub use driver::{FrameDriver, StopHandle, TickOutcome};
pub use error::{ConfigError, RenderError, Result, UnwarpError};
pub use mesh::SphereMesh;
pub use view::{InteractionPhase, ViewStateMachine};
