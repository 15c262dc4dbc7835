//! Soma reconstruction.
//!
//! A soma is grown from an icosphere sized to the traced profile:
//!
//! 1. **Plan**: one connection face per soma-connected arbor is merged out of
//!    the faces around the arbor's root and reshaped into a circle
//!    ([`planner`]).
//! 2. **Hook**: each connection face gets a keyframed hook that stretches it,
//!    pulls it to the root and tapers it to the root radius ([`hook`]).
//! 3. **Relax**: a mass-spring engine drags the rest of the surface along
//!    ([`relax`]).
//! 4. **Extract**: the relaxed surface is baked into a static mesh in
//!    morphology coordinates ([`extract`]).
//!
//! [`SomaBuilder`] runs all four stages; [`ReconstructionContext`] exposes them
//! one by one.
//!
//! # Example
//!
//! ```
//! use somamesh::morphology::{Arbor, Morphology, Section, SectionType, Soma, SOMA_PARENT_ID};
//! use somamesh::soma::{SomaBuilder, SomaOptions};
//! use nalgebra::Point3;
//!
//! let profile = (0..8)
//!     .map(|i| {
//!         let t = i as f64 / 8.0 * std::f64::consts::TAU;
//!         Point3::new(5.0 * t.cos(), 5.0 * t.sin(), 0.0)
//!     })
//!     .collect();
//! let soma = Soma::new(Point3::origin(), profile).unwrap();
//! let root = Section::from_points(
//!     1,
//!     SOMA_PARENT_ID,
//!     SectionType::Axon,
//!     &[(Point3::new(6.0, 0.0, 0.0), 0.5), (Point3::new(20.0, 0.0, 0.0), 0.4)],
//! )
//! .unwrap();
//! let mut morphology = Morphology::new("cell", soma).with_axon(Arbor::from_root(root));
//! morphology.update_soma_connectivity(2.0);
//!
//! let options = SomaOptions::default().with_subdivision_level(3);
//! let soma_mesh = SomaBuilder::new(options).build(&mut morphology).unwrap();
//!
//! assert_eq!(soma_mesh.name, "cell_soma");
//! assert_eq!(soma_mesh.mesh.euler_characteristic(), 2);
//! ```

pub mod extract;
pub mod hook;
pub mod options;
pub mod planner;
pub mod relax;

pub use extract::StaticMesh;
pub use hook::{Hook, Keyframe};
pub use options::{HookSchedule, SomaOptions, SomaProfile, SOMA_OPTIONS_VERSION};
pub use planner::{extrusion_scale, plan_connections, ConnectionFace, ConnectionKind, SectionRef};
pub use relax::{Checkpoint, RelaxationEngine, RelaxationState};

use nalgebra::Point3;
use rayon::prelude::*;

use crate::algo::{create_icosphere, CancelToken, Progress};
use crate::error::{Result, SomaError};
use crate::mesh::HalfEdgeMesh;
use crate::morphology::Morphology;

/// Per-morphology working state of one reconstruction.
///
/// Owns the soma-local surface, the planned connections and the relaxation
/// engine. Nothing is shared between contexts, so independent morphologies can
/// be reconstructed in parallel.
#[derive(Debug, Clone)]
pub struct ReconstructionContext {
    label: String,
    centroid: Point3<f64>,
    soma_radius: f64,
    options: SomaOptions,
    surface: HalfEdgeMesh,
    connections: Vec<ConnectionFace>,
    engine: RelaxationEngine,
}

impl ReconstructionContext {
    /// Validate the inputs and create the initial icosphere.
    ///
    /// # Errors
    /// Invalid options or an unusable morphology abort here, before any
    /// geometry is touched.
    pub fn new(morphology: &Morphology, options: &SomaOptions) -> Result<Self> {
        options.validate()?;
        morphology.validate()?;

        let soma_radius = morphology.soma.mean_radius / options.radius_factor;
        let level = options.effective_subdivision_level();
        let surface = create_icosphere(soma_radius, level)?;
        log::debug!(
            "soma of '{}': radius {:.4}, icosphere level {} ({} faces)",
            morphology.label,
            soma_radius,
            level,
            surface.num_faces()
        );

        Ok(Self {
            label: morphology.label.clone(),
            centroid: morphology.soma.centroid,
            soma_radius,
            options: options.clone(),
            surface,
            connections: Vec::new(),
            engine: RelaxationEngine::new(options),
        })
    }

    /// Soma radius used for the surface.
    pub fn soma_radius(&self) -> f64 {
        self.soma_radius
    }

    /// The soma-local surface as planned so far.
    pub fn surface(&self) -> &HalfEdgeMesh {
        &self.surface
    }

    /// Planned connection faces.
    pub fn connections(&self) -> &[ConnectionFace] {
        &self.connections
    }

    /// The relaxation engine.
    pub fn engine(&self) -> &RelaxationEngine {
        &self.engine
    }

    /// Options this context was created with.
    pub fn options(&self) -> &SomaOptions {
        &self.options
    }

    /// Plan connection faces and hand the hooked surface to the engine.
    ///
    /// Roots are planned according to their `connected_to_soma` flags, which
    /// are recomputed first only when `refresh_connectivity` is set. The chosen
    /// face is recorded on every planned root section.
    pub fn plan(&mut self, morphology: &mut Morphology) -> Result<&[ConnectionFace]> {
        if self.engine.state() != RelaxationState::Idle {
            return Err(SomaError::InvalidState(format!("'{}' is already planned", self.label)));
        }

        morphology.clear_soma_connections();
        if self.options.refresh_connectivity {
            let reach = self.options.max_connection_distance * self.soma_radius - morphology.soma.mean_radius;
            morphology.update_soma_connectivity(reach);
        }

        self.connections = plan_connections(&mut self.surface, morphology, self.soma_radius, &self.options)?;

        let hooks = self
            .connections
            .iter()
            .map(|c| Hook::for_connection(&self.surface, c, &self.options))
            .collect::<Result<Vec<_>>>()?;
        self.engine.plan(self.surface.clone(), hooks)?;

        Ok(&self.connections)
    }

    /// Run the relaxation to completion or until cancelled.
    pub fn relax(&mut self, progress: &Progress, cancel: Option<&CancelToken>) -> Result<RelaxationState> {
        self.engine.run(progress, cancel)
    }

    /// Bake the relaxed surface into a static mesh around the soma centroid.
    pub fn extract(&mut self) -> Result<StaticMesh> {
        let surface = self.engine.extract()?;
        Ok(extract::bake(
            format!("{}_soma", self.label),
            surface,
            self.centroid,
            self.options.smooth_shading,
            self.options.check_manifold,
        ))
    }
}

/// Reconstructs soma meshes with a fixed set of options.
#[derive(Debug, Clone, Default)]
pub struct SomaBuilder {
    options: SomaOptions,
}

impl SomaBuilder {
    /// Create a builder.
    pub fn new(options: SomaOptions) -> Self {
        Self { options }
    }

    /// The builder's options.
    pub fn options(&self) -> &SomaOptions {
        &self.options
    }

    /// Reconstruct the soma of `morphology`.
    ///
    /// Root sections of `morphology` get their connection face recorded.
    pub fn build(&self, morphology: &mut Morphology) -> Result<StaticMesh> {
        self.build_with_progress(morphology, &Progress::none(), None)
    }

    /// Reconstruct with progress reporting and optional cancellation.
    ///
    /// Cancelling stops the relaxation early; the mesh is still extracted.
    pub fn build_with_progress(
        &self,
        morphology: &mut Morphology,
        progress: &Progress,
        cancel: Option<&CancelToken>,
    ) -> Result<StaticMesh> {
        let mut context = ReconstructionContext::new(morphology, &self.options)?;
        context.plan(morphology)?;
        log::info!(
            "relaxing soma of '{}' with {} hooks over steps {}..={}",
            morphology.label,
            context.engine().hooks().len(),
            self.options.min_step,
            self.options.max_step
        );
        context.relax(progress, cancel)?;
        context.extract()
    }
}

/// Reconstruct many somata in parallel.
///
/// Returns one result per morphology, in input order; a failing morphology
/// does not affect the others.
pub fn reconstruct_batch(morphologies: &mut [Morphology], options: &SomaOptions) -> Vec<Result<StaticMesh>> {
    let builder = SomaBuilder::new(options.clone());
    let results: Vec<Result<StaticMesh>> = morphologies.par_iter_mut().map(|m| builder.build(m)).collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    log::info!(
        "reconstructed {} of {} somata",
        results.len() - failed,
        results.len()
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::{Arbor, Section, SectionType, Soma, SOMA_PARENT_ID};

    fn soma(center: Point3<f64>, radius: f64) -> Soma {
        let points = (0..16)
            .map(|i| {
                let t = i as f64 / 16.0 * std::f64::consts::TAU;
                center + nalgebra::Vector3::new(radius * t.cos(), radius * t.sin(), 0.0)
            })
            .collect();
        Soma::new(center, points).unwrap()
    }

    fn basal(id: usize, start: Point3<f64>, direction: nalgebra::Vector3<f64>, radius: f64) -> Arbor {
        let section = Section::from_points(
            id,
            SOMA_PARENT_ID,
            SectionType::BasalDendrite,
            &[(start, radius), (start + direction * 10.0, radius * 0.5)],
        )
        .unwrap();
        Arbor::from_root(section)
    }

    fn three_branch(center: Point3<f64>) -> Morphology {
        let dirs = [
            nalgebra::Vector3::x(),
            -nalgebra::Vector3::x(),
            nalgebra::Vector3::y(),
        ];
        let mut morphology = Morphology::new("three", soma(center, 5.0));
        for (i, d) in dirs.iter().enumerate() {
            morphology = morphology.with_basal_dendrite(basal(i + 1, center + d * 6.0, *d, 0.8));
        }
        morphology.update_soma_connectivity(2.0);
        morphology
    }

    fn options() -> SomaOptions {
        SomaOptions::default().with_subdivision_level(3).with_steps(1, 80)
    }

    #[test]
    fn test_euler_characteristic_preserved() {
        let mut morphology = three_branch(Point3::origin());
        let mut context = ReconstructionContext::new(&morphology, &options()).unwrap();
        assert_eq!(context.surface().euler_characteristic(), 2);

        context.plan(&mut morphology).unwrap();
        assert_eq!(context.surface().euler_characteristic(), 2);

        context.relax(&Progress::none(), None).unwrap();
        let mesh = context.extract().unwrap();
        assert_eq!(mesh.mesh.euler_characteristic(), 2);
        assert!(mesh.mesh.is_closed());
    }

    #[test]
    fn test_one_hook_per_connection() {
        let mut morphology = three_branch(Point3::origin());
        let mut context = ReconstructionContext::new(&morphology, &options()).unwrap();
        let planned = context.plan(&mut morphology).unwrap().len();

        assert_eq!(planned, 3);
        assert_eq!(context.engine().hooks().len(), morphology.connected_arbor_count());
        assert!(context.plan(&mut morphology).is_err());
    }

    #[test]
    fn test_three_branches_reach_their_roots() {
        let center = Point3::new(100.0, -20.0, 5.0);
        let mut morphology = three_branch(center);
        let mesh = SomaBuilder::new(options()).build(&mut morphology).unwrap();

        let scale = extrusion_scale(0.8, 5.0, 6.0);
        for arbor in morphology.arbors() {
            let root = arbor.root_section();
            assert!(root.soma_face_index.is_some());
            let target = root.first_sample().point;
            let nearest = mesh
                .mesh
                .vertex_ids()
                .map(|v| (mesh.mesh.position(v) - target).norm())
                .fold(f64::INFINITY, f64::min);
            assert!(nearest <= scale + 1e-9);
        }
    }

    #[test]
    fn test_reconstruction_is_deterministic() {
        let mut a = three_branch(Point3::origin());
        let mut b = three_branch(Point3::origin());
        let builder = SomaBuilder::new(options());
        let ma = builder.build(&mut a).unwrap();
        let mb = builder.build(&mut b).unwrap();
        assert_eq!(ma.mesh.positions(), mb.mesh.positions());
    }

    #[test]
    fn test_extract_twice_gives_same_mesh() {
        let mut morphology = three_branch(Point3::origin());
        let mut context = ReconstructionContext::new(&morphology, &options()).unwrap();
        context.plan(&mut morphology).unwrap();
        context.relax(&Progress::none(), None).unwrap();

        let first = context.extract().unwrap();
        let second = context.extract().unwrap();
        assert_eq!(first.mesh.positions(), second.mesh.positions());
        assert_eq!(context.engine().state(), RelaxationState::Extracted);
    }

    #[test]
    fn test_empty_profile_rejected() {
        let mut morphology = three_branch(Point3::origin());
        morphology.soma.profile_points.clear();
        let err = SomaBuilder::new(options()).build(&mut morphology).unwrap_err();
        assert!(matches!(err, SomaError::InvalidMorphology { .. }));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let mut bad = three_branch(Point3::origin());
        bad.soma.mean_radius = 0.0;
        let mut morphologies = vec![three_branch(Point3::origin()), bad, three_branch(Point3::new(1.0, 2.0, 3.0))];

        let results = reconstruct_batch(&mut morphologies, &options());
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_caller_connectivity_flags_respected() {
        let mut morphology = three_branch(Point3::origin());
        morphology.basal_dendrites[1].root_section_mut().connected_to_soma = false;

        let mut context = ReconstructionContext::new(&morphology, &options()).unwrap();
        assert_eq!(context.plan(&mut morphology).unwrap().len(), 2);
        assert!(!morphology.basal_dendrites[1].is_connected_to_soma());
        assert!(morphology.basal_dendrites[1].root_section().soma_face_index.is_none());

        for arbor in morphology.arbors_mut() {
            arbor.root_section_mut().connected_to_soma = false;
        }
        let mut context = ReconstructionContext::new(&morphology, &options()).unwrap();
        assert!(context.plan(&mut morphology).unwrap().is_empty());
        assert!(context.engine().hooks().is_empty());
    }

    #[test]
    fn test_refresh_connectivity_is_opt_in() {
        let mut morphology = three_branch(Point3::origin());
        for arbor in morphology.arbors_mut() {
            arbor.root_section_mut().connected_to_soma = false;
        }

        let refreshing = options().with_refresh_connectivity(true);
        let mut context = ReconstructionContext::new(&morphology, &refreshing).unwrap();
        assert_eq!(context.plan(&mut morphology).unwrap().len(), 3);
        assert_eq!(morphology.connected_arbor_count(), 3);
    }

    #[test]
    fn test_root_inside_soma_gets_a_hook() {
        let mut morphology = Morphology::new("inside", soma(Point3::origin(), 5.0)).with_basal_dendrite(basal(
            1,
            Point3::new(0.0, 0.0, 0.98 * 5.0),
            nalgebra::Vector3::z(),
            0.8,
        ));
        morphology.update_soma_connectivity(2.0);

        let mut context = ReconstructionContext::new(&morphology, &options()).unwrap();
        context.plan(&mut morphology).unwrap();
        assert_eq!(morphology.connected_arbor_count(), 1);
        assert_eq!(context.engine().hooks().len(), morphology.connected_arbor_count());

        context.relax(&Progress::none(), None).unwrap();
        let mesh = context.extract().unwrap();
        assert!(mesh.mesh.is_closed());
        assert_eq!(mesh.mesh.euler_characteristic(), 2);
    }

    #[test]
    fn test_three_tapered_protrusions_at_default_level() {
        let roots = [
            (Point3::new(10.0, 0.0, 0.0), 1.0),
            (Point3::new(0.0, 10.0, 0.0), 1.5),
            (Point3::new(0.0, 0.0, -10.0), 0.5),
        ];
        let mut morphology = Morphology::new("example", soma(Point3::origin(), 5.0));
        for (i, &(start, radius)) in roots.iter().enumerate() {
            morphology = morphology.with_basal_dendrite(basal(i + 1, start, start.coords / 10.0, radius));
        }
        for arbor in morphology.arbors_mut() {
            arbor.root_section_mut().connected_to_soma = true;
        }

        let options = SomaOptions::default();
        assert_eq!(options.subdivision_level, 5);
        let mut context = ReconstructionContext::new(&morphology, &options).unwrap();
        assert_eq!(context.plan(&mut morphology).unwrap().len(), 3);
        assert_eq!(context.engine().hooks().len(), 3);

        context.relax(&Progress::none(), None).unwrap();
        let hooks = context.engine().hooks().to_vec();
        let mesh = context.extract().unwrap();
        assert!(mesh.mesh.is_closed());
        assert_eq!(mesh.mesh.euler_characteristic(), 2);

        // Each tip ring sits on its root with the root radius scaled by 5 / 10.
        for (hook, &(start, radius)) in hooks.iter().zip(&roots) {
            let tip = radius * 5.0 / 10.0;
            for &v in &hook.vertex_indices {
                assert!(((mesh.mesh.position(v) - start).norm() - tip).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_cancelled_build_still_extracts() {
        let mut morphology = three_branch(Point3::origin());
        let token = CancelToken::new();
        token.cancel();
        let mesh = SomaBuilder::new(options())
            .build_with_progress(&mut morphology, &Progress::none(), Some(&token))
            .unwrap();
        assert_eq!(mesh.mesh.euler_characteristic(), 2);
    }
}
