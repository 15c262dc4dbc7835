//! The soma (cell body) description.

use nalgebra::{Point3, Vector3};

use crate::error::{Result, SomaError};

/// The neuron's cell body as traced in the source morphology.
///
/// The soma owns no mesh; its surface is produced by [`crate::soma::SomaBuilder`].
#[derive(Debug, Clone)]
pub struct Soma {
    /// Center of the soma.
    pub centroid: Point3<f64>,
    /// Mean distance from the centroid to the profile points.
    pub mean_radius: f64,
    /// Digitized contour samples of the soma tracing.
    pub profile_points: Vec<Point3<f64>>,
    /// First samples of every soma-connected arbor.
    pub arbor_profile_points: Vec<Point3<f64>>,
}

impl Soma {
    /// Create a soma around a known centroid.
    ///
    /// # Errors
    /// Returns [`SomaError::InvalidMorphology`] if the profile is empty, contains
    /// non-finite coordinates, or collapses onto the centroid.
    pub fn new(centroid: Point3<f64>, profile_points: Vec<Point3<f64>>) -> Result<Self> {
        let mean_radius = mean_radius(&centroid, &profile_points)?;
        Ok(Self {
            centroid,
            mean_radius,
            profile_points,
            arbor_profile_points: Vec::new(),
        })
    }

    /// Create a soma whose centroid is the mean of its profile points.
    pub fn from_profile_points(profile_points: Vec<Point3<f64>>) -> Result<Self> {
        if profile_points.is_empty() {
            return Err(SomaError::invalid_morphology("soma", "soma has no profile points"));
        }
        let sum: Vector3<f64> = profile_points.iter().map(|p| p.coords).sum();
        let centroid = Point3::from(sum / profile_points.len() as f64);
        Self::new(centroid, profile_points)
    }

    /// Distance from `point` to the soma surface along the radial direction.
    ///
    /// Negative inside the mean-radius sphere.
    pub fn radial_gap(&self, point: &Point3<f64>) -> f64 {
        (point - self.centroid).norm() - self.mean_radius
    }
}

fn mean_radius(centroid: &Point3<f64>, profile_points: &[Point3<f64>]) -> Result<f64> {
    if profile_points.is_empty() {
        return Err(SomaError::invalid_morphology("soma", "soma has no profile points"));
    }
    if !centroid.coords.iter().all(|c| c.is_finite())
        || profile_points.iter().any(|p| !p.coords.iter().all(|c| c.is_finite()))
    {
        return Err(SomaError::invalid_morphology("soma", "non-finite soma coordinates"));
    }

    let radius = profile_points
        .iter()
        .map(|p| (p - centroid).norm())
        .sum::<f64>()
        / profile_points.len() as f64;

    if radius <= f64::EPSILON {
        return Err(SomaError::invalid_morphology("soma", "soma profile has zero radius"));
    }
    Ok(radius)
}
