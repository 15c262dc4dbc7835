//! Dendritic spine placement.
//!
//! Spines are instances of a few template meshes modelled along +Z with their
//! base at the origin. Each placement picks a template, a scale and a roll
//! about the spine axis from a seeded generator, so the same inputs always give
//! the same spines.

use std::f64::consts::{PI, TAU};

use nalgebra::{Point3, Rotation3, Unit, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::algo::create_icosphere;
use crate::algo::primitives::any_perpendicular;
use crate::error::{Result, SomaError};
use crate::mesh::HalfEdgeMesh;
use crate::morphology::Section;

/// Golden angle, used to spread spines around the dendrite.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// A spine shape.
#[derive(Debug, Clone)]
pub struct SpineTemplate {
    /// Template name.
    pub name: String,
    /// Geometry along +Z, base at the origin.
    pub mesh: HalfEdgeMesh,
}

impl SpineTemplate {
    /// Wrap a mesh as a template.
    pub fn new(name: impl Into<String>, mesh: HalfEdgeMesh) -> Self {
        Self { name: name.into(), mesh }
    }

    /// An ellipsoidal stubby spine of the given length and head radius.
    pub fn stubby(length: f64, radius: f64) -> Result<Self> {
        if !(length > 0.0) || !(radius > 0.0) {
            return Err(SomaError::invalid_param("length", length, "spine size must be positive"));
        }

        let mut mesh = create_icosphere(1.0, 2)?;
        let stretched: Vec<Point3<f64>> = mesh
            .positions()
            .iter()
            .map(|p| Point3::new(p.x * radius, p.y * radius, (p.z + 1.0) * 0.5 * length))
            .collect();
        mesh.set_positions(&stretched);
        Ok(Self::new("stubby", mesh))
    }
}

/// Where a spine sits and which way it points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinePlacement {
    /// Base of the spine, on the dendrite surface.
    pub position: Point3<f64>,
    /// Unit direction from base to head.
    pub direction: Vector3<f64>,
}

/// Random ranges of [`place_spines`].
#[derive(Debug, Clone)]
pub struct SpineOptions {
    /// Smallest uniform scale applied to a template.
    pub min_scale: f64,
    /// Largest uniform scale applied to a template.
    pub max_scale: f64,
}

impl Default for SpineOptions {
    fn default() -> Self {
        Self {
            min_scale: 0.75,
            max_scale: 1.25,
        }
    }
}

impl SpineOptions {
    /// Set the scale range.
    pub fn with_scale_range(mut self, min_scale: f64, max_scale: f64) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    /// Check the scale range.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_scale > 0.0) {
            return Err(SomaError::invalid_param("min_scale", self.min_scale, "must be positive"));
        }
        if !(self.max_scale >= self.min_scale) || !self.max_scale.is_finite() {
            return Err(SomaError::invalid_param(
                "max_scale",
                self.max_scale,
                "must be finite and not below min_scale",
            ));
        }
        Ok(())
    }
}

/// Evenly spaced placements on the surface of a section.
///
/// Placements start half a spacing in from the first sample and wind around
/// the section by the golden angle.
pub fn section_placements(section: &Section, spacing: f64) -> Result<Vec<SpinePlacement>> {
    if !(spacing > 0.0) {
        return Err(SomaError::invalid_param("spacing", spacing, "must be positive"));
    }

    let samples = section.samples();
    let mut placements = Vec::new();
    let mut next = spacing * 0.5;
    let mut walked = 0.0;
    let mut turn = 0.0_f64;

    for pair in samples.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let axis = b.point - a.point;
        let length = axis.norm();
        if length <= f64::EPSILON {
            continue;
        }
        let tangent = axis / length;
        let side = any_perpendicular(&tangent);

        while next <= walked + length {
            let t = (next - walked) / length;
            let center = a.point + axis * t;
            let radius = a.radius + (b.radius - a.radius) * t;
            let direction = Rotation3::from_axis_angle(&Unit::new_normalize(tangent), turn) * side;
            placements.push(SpinePlacement {
                position: center + direction * radius,
                direction,
            });
            turn = (turn + GOLDEN_ANGLE) % TAU;
            next += spacing;
        }
        walked += length;
    }

    Ok(placements)
}

/// Instantiate one spine mesh per placement.
pub fn place_spines(
    templates: &[SpineTemplate],
    placements: &[SpinePlacement],
    options: &SpineOptions,
    seed: u64,
) -> Result<Vec<HalfEdgeMesh>> {
    options.validate()?;
    if templates.is_empty() {
        return Err(SomaError::invalid_param("templates", 0, "at least one spine template is needed"));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut spines = Vec::with_capacity(placements.len());

    for placement in placements {
        let Some(direction) = placement.direction.try_normalize(f64::EPSILON) else {
            log::debug!("skipping spine at {:?} without direction", placement.position);
            continue;
        };

        let template = &templates[rng.gen_range(0..templates.len())];
        let scale = if options.max_scale > options.min_scale {
            rng.gen_range(options.min_scale..=options.max_scale)
        } else {
            options.min_scale
        };
        let roll = rng.gen_range(0.0..TAU);

        let align = Rotation3::rotation_between(&Vector3::z(), &direction)
            .unwrap_or_else(|| Rotation3::from_axis_angle(&Vector3::x_axis(), PI));
        let rotation = Rotation3::from_axis_angle(&Unit::new_unchecked(direction), roll) * align;

        let mut mesh = template.mesh.clone();
        let moved: Vec<Point3<f64>> = mesh
            .positions()
            .iter()
            .map(|p| placement.position + rotation * (p.coords * scale))
            .collect();
        mesh.set_positions(&moved);
        spines.push(mesh);
    }

    log::debug!("placed {} spines (seed {})", spines.len(), seed);
    Ok(spines)
}
