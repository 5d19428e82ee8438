// mesh.rs — partial sphere whose UVs sample the warped mirror image
//
// Only the latitude bands the mirror can see are generated, so the sphere has
// its polar caps cut off. Each vertex's UV points at the spot on the source
// frame where the mirror recorded that direction.

use crate::config::{MirrorConfig, UnwarpConfig, WarpedImageConfig};
use crate::error::ConfigError;
use std::f32::consts::{FRAC_PI_2, PI};

/// Below this the (x, z) direction of a vertex is undefined (sphere pole).
const POLE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct SphereMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    /// Inclusive latitude band range, counted from the north pole.
    pub bands: (u32, u32),
}

impl SphereMesh {
    /// Validates `config` and builds the mesh it describes.
    pub fn from_config(config: &UnwarpConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(build_unwarp_sphere(
            &config.mirror,
            &config.warped_image,
            config.sphere.radius,
            config.sphere.latitude_bands,
            config.sphere.longitude_bands,
            config.horizontal_scale,
        ))
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// First and last latitude band (inclusive) inside the mirror's vertical field of view.
pub fn latitude_band_range(mirror: &MirrorConfig, lat_bands: u32) -> (u32, u32) {
    let per_degree = lat_bands as f64 / 180.0;
    let first = ((90.0 - mirror.upper_limit() as f64) * per_degree).ceil();
    let last = ((90.0 - mirror.lower_limit as f64) * per_degree).floor();
    (
        first.clamp(0.0, lat_bands as f64) as u32,
        last.clamp(0.0, lat_bands as f64) as u32,
    )
}

/// Maps a unit direction on the sphere to a sample point on the source frame.
///
/// Elevation maps linearly to distance from the warped image center: straight
/// down lands on the center, the mirror's upper limit on the rim.
/// `meridian` is the longitude direction used when the vertex sits on a pole.
pub fn warped_uv(
    direction: [f32; 3],
    meridian: [f32; 2],
    mirror: &MirrorConfig,
    warped: &WarpedImageConfig,
) -> [f32; 2] {
    let [x, y, z] = direction;
    let span = mirror.range.to_radians() + FRAC_PI_2 + mirror.lower_limit.to_radians();
    let r = (FRAC_PI_2 + y.clamp(-1.0, 1.0).asin()) / span;

    let hyp = (x * x + z * z).sqrt();
    let (dx, dz) = if hyp < POLE_EPSILON {
        (meridian[0], meridian[1])
    } else {
        (x / hyp, z / hyp)
    };

    [
        dx * r * warped.radius[0] + warped.center[0],
        dz * r * warped.radius[1] + warped.center[1],
    ]
}

/// Builds the unwarp sphere. `config` must already be validated.
///
/// Longitude runs `0..=lon_bands`; the last column repeats the first to close
/// the seam. A negative `horizontal_scale` mirrors x and flips the winding so
/// triangles keep facing the sphere center.
pub fn build_unwarp_sphere(
    mirror: &MirrorConfig,
    warped: &WarpedImageConfig,
    radius: f32,
    lat_bands: u32,
    lon_bands: u32,
    horizontal_scale: f32,
) -> SphereMesh {
    let (first_band, last_band) = latitude_band_range(mirror, lat_bands);
    if last_band <= first_band {
        log::warn!("mirror covers less than one latitude band; sphere is empty");
        return SphereMesh {
            positions: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            indices: Vec::new(),
            bands: (first_band, last_band),
        };
    }
    let rows = (last_band - first_band) as usize;
    let cols = lon_bands as usize;
    let vertex_count = (rows + 1) * (cols + 1);

    let mut positions = Vec::with_capacity(vertex_count);
    let mut normals = Vec::with_capacity(vertex_count);
    let mut uvs = Vec::with_capacity(vertex_count);
    let mut indices = Vec::with_capacity(rows * cols * 6);

    for i in first_band..=last_band {
        let theta = PI * (i as f32) / (lat_bands as f32);
        let (sin_t, cos_t) = theta.sin_cos();

        for j in 0..=lon_bands {
            let phi = 2.0 * PI * (j as f32) / (lon_bands as f32);
            let (sin_p, cos_p) = phi.sin_cos();

            let x = cos_p * sin_t;
            let y = cos_t;
            let z = sin_p * sin_t;

            uvs.push(warped_uv([x, y, z], [cos_p, sin_p], mirror, warped));
            normals.push([x * horizontal_scale, y, z]);
            positions.push([radius * x * horizontal_scale, radius * y, radius * z]);
        }
    }

    let mirrored = horizontal_scale < 0.0;
    for i in 0..rows {
        for j in 0..cols {
            let a = (i * (cols + 1) + j) as u32;
            let b = a + (cols + 1) as u32;

            if mirrored {
                indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
            } else {
                indices.extend_from_slice(&[a, b, a + 1, b, b + 1, a + 1]);
            }
        }
    }

    log::debug!(
        "unwarp sphere: bands {}..={}, {} vertices, {} triangles",
        first_band,
        last_band,
        positions.len(),
        indices.len() / 3
    );

    SphereMesh {
        positions,
        normals,
        uvs,
        indices,
        bands: (first_band, last_band),
    }
}
