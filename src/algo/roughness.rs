//! Seeded random surface roughness.
//!
//! Vertices are displaced along their normals by a uniformly random amount.
//! The amplitude depends on the distance to a center point: vertices inside
//! the stable core barely move, vertices on the soma get a moderate amplitude
//! and vertices out on the arbors get the full one.

use log::debug;
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SomaError};
use crate::mesh::HalfEdgeMesh;

/// Options for [`add_surface_roughness`].
#[derive(Debug, Clone)]
pub struct RoughnessOptions {
    /// Center of the regimes, usually the soma centroid.
    pub center: Point3<f64>,
    /// Radius of the stable core.
    pub stable_radius: f64,
    /// Radius of the soma region.
    pub soma_radius: f64,
    /// Amplitude inside the stable core.
    pub core_amplitude: f64,
    /// Amplitude between the core and the soma radius.
    pub soma_amplitude: f64,
    /// Amplitude outside the soma radius.
    pub arbor_amplitude: f64,
}

impl Default for RoughnessOptions {
    fn default() -> Self {
        Self {
            center: Point3::origin(),
            stable_radius: 1.0,
            soma_radius: 2.0,
            core_amplitude: 0.01,
            soma_amplitude: 0.05,
            arbor_amplitude: 0.1,
        }
    }
}

impl RoughnessOptions {
    /// Regimes around `center`.
    pub fn new(center: Point3<f64>, stable_radius: f64, soma_radius: f64) -> Self {
        Self {
            center,
            stable_radius,
            soma_radius,
            ..Self::default()
        }
    }

    /// Set the three amplitudes, innermost first.
    pub fn with_amplitudes(mut self, core: f64, soma: f64, arbor: f64) -> Self {
        self.core_amplitude = core;
        self.soma_amplitude = soma;
        self.arbor_amplitude = arbor;
        self
    }

    /// Check radii and amplitudes.
    pub fn validate(&self) -> Result<()> {
        if !(self.stable_radius >= 0.0) {
            return Err(SomaError::invalid_param(
                "stable_radius",
                self.stable_radius,
                "must be non-negative",
            ));
        }
        if !(self.soma_radius >= self.stable_radius) {
            return Err(SomaError::invalid_param(
                "soma_radius",
                self.soma_radius,
                "must not be smaller than stable_radius",
            ));
        }
        for (name, value) in [
            ("core_amplitude", self.core_amplitude),
            ("soma_amplitude", self.soma_amplitude),
            ("arbor_amplitude", self.arbor_amplitude),
        ] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(SomaError::invalid_param(name, value, "must be non-negative"));
            }
        }
        Ok(())
    }

    /// Amplitude for a vertex at `point`.
    pub fn amplitude_at(&self, point: &Point3<f64>) -> f64 {
        let d = (point - self.center).norm();
        if d < self.stable_radius {
            self.core_amplitude
        } else if d < self.soma_radius {
            self.soma_amplitude
        } else {
            self.arbor_amplitude
        }
    }
}

/// Displace every vertex along its normal by a seeded random offset.
///
/// The same mesh, options and seed always give the same result.
pub fn add_surface_roughness(mesh: &mut HalfEdgeMesh, options: &RoughnessOptions, seed: u64) -> Result<()> {
    options.validate()?;

    let mut rng = StdRng::seed_from_u64(seed);
    let displaced: Vec<Point3<f64>> = mesh
        .vertex_ids()
        .map(|v| {
            let p = *mesh.position(v);
            let amplitude = options.amplitude_at(&p);
            let offset = if amplitude > 0.0 {
                rng.gen_range(-amplitude..=amplitude)
            } else {
                0.0
            };
            p + mesh.vertex_normal(v) * offset
        })
        .collect();

    mesh.set_positions(&displaced);
    debug!("roughened {} vertices (seed {})", displaced.len(), seed);
    Ok(())
}
