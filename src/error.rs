// error.rs — error taxonomy for configuration, render context and renderer failures

use thiserror::Error;

/// Invalid configuration. Fatal at construction: nothing is built from a
/// config that fails validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mirror vertical range must be > 0 degrees (got {0})")]
    MirrorRange(f32),
    #[error("mirror limits must stay within [-90, 90] degrees (got {lower}..{upper})")]
    MirrorLimits { lower: f32, upper: f32 },
    #[error("warped image radius must be > 0 on both axes (got {x}, {y})")]
    WarpedRadius { x: f32, y: f32 },
    #[error("warped image center must lie in [0, 1] on both axes (got {x}, {y})")]
    WarpedCenter { x: f32, y: f32 },
    #[error("invalid field of view: {0}")]
    FieldOfView(String),
    #[error("invalid sphere tessellation: {0}")]
    Tessellation(String),
    #[error("invalid orbit parameters: {0}")]
    Orbit(String),
    #[error("instruction fade must last at least one frame")]
    FadeFrames,
    #[error("horizontal scale must be 1.0 or -1.0 (got {0})")]
    HorizontalScale(f32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Opaque failure reported by the renderer collaborator. Not retried here.
#[derive(Debug, Error)]
#[error("renderer failure: {0}")]
pub struct RenderError(pub String);

impl RenderError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum UnwarpError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("render context unavailable: {0}")]
    RenderContextUnavailable(String),
    #[error(transparent)]
    Renderer(#[from] RenderError),
}

pub type Result<T, E = UnwarpError> = std::result::Result<T, E>;
