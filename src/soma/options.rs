//! Soma reconstruction parameters.

use crate::error::{Result, SomaError};

/// Version of the [`SomaOptions`] layout. Bumped whenever a field changes meaning.
pub const SOMA_OPTIONS_VERSION: u32 = 1;

/// Icosphere level used when connection topology must be preserved.
const PRESERVED_TOPOLOGY_LEVEL: u32 = 6;

/// Which soma features get a connection face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SomaProfile {
    /// One face per soma-connected arbor.
    #[default]
    ArborsOnly,
    /// Arbor faces plus one face per unclaimed soma profile point.
    ArborsAndProfilePoints,
}

/// Keyframe steps of a branch hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookSchedule {
    /// Step at which the face has been pushed slightly outward.
    pub stretch_step: u32,
    /// Step at which the face reaches the arbor's first sample.
    pub reach_step: u32,
    /// Step at which the face has shrunk to the arbor radius.
    pub taper_step: u32,
}

impl Default for HookSchedule {
    fn default() -> Self {
        Self {
            stretch_step: 1,
            reach_step: 50,
            taper_step: 60,
        }
    }
}

/// Options for soma reconstruction.
///
/// # Example
///
/// ```
/// use somamesh::soma::{SomaOptions, SomaProfile};
///
/// let options = SomaOptions::default()
///     .with_subdivision_level(4)
///     .with_stiffness(0.5)
///     .with_profile(SomaProfile::ArborsAndProfilePoints);
/// assert!(options.validate().is_ok());
/// assert_eq!(options.effective_subdivision_level(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct SomaOptions {
    /// Layout version, always [`SOMA_OPTIONS_VERSION`] for options built here.
    pub version: u32,
    /// Icosphere level of the initial soma surface (2 to 10).
    pub subdivision_level: u32,
    /// Subdivide candidate connection faces once before selecting.
    pub irregular_subdivisions: bool,
    /// Force level 6 and skip the extra subdivision so connections keep a
    /// regular topology.
    pub preserve_topology_at_connections: bool,
    /// Pull connection faces all the way to the arbor's first sample.
    pub full_arbor_extrusion: bool,
    /// Distance to stop short of the arbor's first sample when
    /// `full_arbor_extrusion` is off.
    pub extrusion_delta: f64,
    /// Soma radius is the profile mean radius divided by this factor.
    pub radius_factor: f64,
    /// First simulated step.
    pub min_step: u32,
    /// Last simulated step.
    pub max_step: u32,
    /// Keyframe steps of branch hooks.
    pub schedule: HookSchedule,
    /// Spring stiffness per solver pass (0.001 to 0.999).
    pub stiffness: f64,
    /// Gauss-Seidel passes per step.
    pub solver_iterations: u32,
    /// Velocity damping of free vertices (0 to 1).
    pub damping: f64,
    /// Outward push along the face normal at the stretch keyframe.
    pub pre_stretch: f64,
    /// Roots farther than this many soma radii from the centroid are skipped.
    pub max_connection_distance: f64,
    /// Recompute every root's `connected_to_soma` flag from
    /// `max_connection_distance` before planning. Off by default, so the
    /// flags set by the caller are used as given.
    pub refresh_connectivity: bool,
    /// Which features get connection faces.
    pub profile: SomaProfile,
    /// Angle (radians) within which an arbor claims a profile point.
    pub profile_claim_angle: f64,
    /// Mark the extracted mesh for smooth shading.
    pub smooth_shading: bool,
    /// Log a warning if the extracted mesh is not closed and manifold.
    pub check_manifold: bool,
}

impl Default for SomaOptions {
    fn default() -> Self {
        Self {
            version: SOMA_OPTIONS_VERSION,
            subdivision_level: 5,
            irregular_subdivisions: true,
            preserve_topology_at_connections: false,
            full_arbor_extrusion: true,
            extrusion_delta: 0.1,
            radius_factor: 1.0,
            min_step: 1,
            max_step: 100,
            schedule: HookSchedule::default(),
            stiffness: 0.25,
            solver_iterations: 8,
            damping: 0.1,
            pre_stretch: 0.01,
            max_connection_distance: 4.0,
            refresh_connectivity: false,
            profile: SomaProfile::ArborsOnly,
            profile_claim_angle: 0.35,
            smooth_shading: true,
            check_manifold: true,
        }
    }
}

impl SomaOptions {
    /// Set the icosphere level.
    pub fn with_subdivision_level(mut self, level: u32) -> Self {
        self.subdivision_level = level;
        self
    }

    /// Enable or disable the extra candidate subdivision.
    pub fn with_irregular_subdivisions(mut self, enabled: bool) -> Self {
        self.irregular_subdivisions = enabled;
        self
    }

    /// Enable or disable topology preservation at connections.
    pub fn with_preserve_topology(mut self, enabled: bool) -> Self {
        self.preserve_topology_at_connections = enabled;
        self
    }

    /// Set whether faces reach the arbor's first sample.
    pub fn with_full_arbor_extrusion(mut self, enabled: bool) -> Self {
        self.full_arbor_extrusion = enabled;
        self
    }

    /// Set the pull-back distance.
    pub fn with_extrusion_delta(mut self, delta: f64) -> Self {
        self.extrusion_delta = delta;
        self
    }

    /// Set the radius factor.
    pub fn with_radius_factor(mut self, factor: f64) -> Self {
        self.radius_factor = factor;
        self
    }

    /// Set the simulated step range.
    pub fn with_steps(mut self, min_step: u32, max_step: u32) -> Self {
        self.min_step = min_step;
        self.max_step = max_step;
        self
    }

    /// Set the hook keyframe schedule.
    pub fn with_schedule(mut self, schedule: HookSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set the spring stiffness.
    pub fn with_stiffness(mut self, stiffness: f64) -> Self {
        self.stiffness = stiffness;
        self
    }

    /// Set the solver passes per step.
    pub fn with_solver_iterations(mut self, iterations: u32) -> Self {
        self.solver_iterations = iterations;
        self
    }

    /// Set velocity damping.
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Set the pre-stretch distance.
    pub fn with_pre_stretch(mut self, pre_stretch: f64) -> Self {
        self.pre_stretch = pre_stretch;
        self
    }

    /// Set the reach limit in soma radii.
    pub fn with_max_connection_distance(mut self, distance: f64) -> Self {
        self.max_connection_distance = distance;
        self
    }

    /// Recompute soma connectivity flags before planning.
    pub fn with_refresh_connectivity(mut self, enabled: bool) -> Self {
        self.refresh_connectivity = enabled;
        self
    }

    /// Set the connection profile.
    pub fn with_profile(mut self, profile: SomaProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the profile claim angle.
    pub fn with_profile_claim_angle(mut self, angle: f64) -> Self {
        self.profile_claim_angle = angle;
        self
    }

    /// Set smooth shading on the extracted mesh.
    pub fn with_smooth_shading(mut self, enabled: bool) -> Self {
        self.smooth_shading = enabled;
        self
    }

    /// Enable or disable the post-extraction manifold check.
    pub fn with_check_manifold(mut self, enabled: bool) -> Self {
        self.check_manifold = enabled;
        self
    }

    /// Icosphere level after the topology-preservation override.
    pub fn effective_subdivision_level(&self) -> u32 {
        if self.preserve_topology_at_connections {
            PRESERVED_TOPOLOGY_LEVEL
        } else {
            self.subdivision_level
        }
    }

    /// Whether candidate faces get the extra subdivision pass.
    pub fn uses_extra_subdivision(&self) -> bool {
        self.irregular_subdivisions && !self.preserve_topology_at_connections
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.version != SOMA_OPTIONS_VERSION {
            return Err(SomaError::invalid_param("version", self.version, "unsupported options version"));
        }
        if !(2..=10).contains(&self.subdivision_level) {
            return Err(SomaError::invalid_param(
                "subdivision_level",
                self.subdivision_level,
                "must be between 2 and 10",
            ));
        }
        if !(self.extrusion_delta >= 0.0) {
            return Err(SomaError::invalid_param(
                "extrusion_delta",
                self.extrusion_delta,
                "must be non-negative",
            ));
        }
        if !(self.radius_factor > 0.0) || !self.radius_factor.is_finite() {
            return Err(SomaError::invalid_param("radius_factor", self.radius_factor, "must be positive"));
        }
        if self.min_step >= self.max_step {
            return Err(SomaError::invalid_param("max_step", self.max_step, "must exceed min_step"));
        }
        let s = self.schedule;
        if !(s.stretch_step < s.reach_step && s.reach_step < s.taper_step) {
            return Err(SomaError::invalid_param(
                "schedule",
                format!("{}/{}/{}", s.stretch_step, s.reach_step, s.taper_step),
                "steps must be strictly increasing",
            ));
        }
        if !(0.001..=0.999).contains(&self.stiffness) {
            return Err(SomaError::invalid_param("stiffness", self.stiffness, "must be between 0.001 and 0.999"));
        }
        if self.solver_iterations == 0 {
            return Err(SomaError::invalid_param("solver_iterations", 0, "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(SomaError::invalid_param("damping", self.damping, "must be between 0 and 1"));
        }
        if !(self.pre_stretch >= 0.0) {
            return Err(SomaError::invalid_param("pre_stretch", self.pre_stretch, "must be non-negative"));
        }
        if !(self.max_connection_distance > 1.0) {
            return Err(SomaError::invalid_param(
                "max_connection_distance",
                self.max_connection_distance,
                "must exceed one soma radius",
            ));
        }
        if !(self.profile_claim_angle > 0.0) {
            return Err(SomaError::invalid_param(
                "profile_claim_angle",
                self.profile_claim_angle,
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = SomaOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.subdivision_level, 5);
        assert_eq!(options.schedule.reach_step, 50);
        assert!((options.stiffness - 0.25).abs() < 1e-12);
        assert!(options.uses_extra_subdivision());
        assert!(!options.refresh_connectivity);
    }

    #[test]
    fn test_preserve_topology_override() {
        let options = SomaOptions::default()
            .with_subdivision_level(3)
            .with_preserve_topology(true);
        assert_eq!(options.effective_subdivision_level(), 6);
        assert!(!options.uses_extra_subdivision());
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(SomaOptions::default().with_subdivision_level(1).validate().is_err());
        assert!(SomaOptions::default().with_subdivision_level(11).validate().is_err());
        assert!(SomaOptions::default().with_stiffness(1.0).validate().is_err());
        assert!(SomaOptions::default().with_steps(10, 10).validate().is_err());
        assert!(SomaOptions::default().with_radius_factor(0.0).validate().is_err());
        assert!(SomaOptions::default().with_max_connection_distance(1.0).validate().is_err());
        assert!(SomaOptions::default().with_solver_iterations(0).validate().is_err());

        let schedule = HookSchedule {
            stretch_step: 1,
            reach_step: 60,
            taper_step: 50,
        };
        assert!(SomaOptions::default().with_schedule(schedule).validate().is_err());
    }

    #[test]
    fn test_version_checked() {
        let mut options = SomaOptions::default();
        options.version = SOMA_OPTIONS_VERSION + 1;
        assert!(options.validate().is_err());
    }
}
