//! Piecewise neuron meshes.
//!
//! A full neuron mesh is the soma mesh plus one tube per section plus optional
//! spines on the dendrites. The pieces are concatenated as they are: there is
//! no boolean union and the soma is not relaxed again.
//!
//! # Example
//!
//! ```
//! use somamesh::assembly::{AssemblyOptions, NeuronAssembler, PolylineTubeBuilder};
//! use somamesh::morphology::{Arbor, Morphology, Section, SectionType, Soma, SOMA_PARENT_ID};
//! use somamesh::soma::{SomaBuilder, SomaOptions};
//! use nalgebra::Point3;
//!
//! let soma = Soma::from_profile_points(vec![
//!     Point3::new(4.0, 0.0, 0.0),
//!     Point3::new(-4.0, 0.0, 0.0),
//!     Point3::new(0.0, 4.0, 0.0),
//!     Point3::new(0.0, -4.0, 0.0),
//! ])
//! .unwrap();
//! let dendrite = Section::from_points(
//!     1,
//!     SOMA_PARENT_ID,
//!     SectionType::BasalDendrite,
//!     &[(Point3::new(0.0, 5.0, 0.0), 0.6), (Point3::new(0.0, 15.0, 0.0), 0.3)],
//! )
//! .unwrap();
//! let mut morphology = Morphology::new("cell", soma).with_basal_dendrite(Arbor::from_root(dendrite));
//! morphology.update_soma_connectivity(2.0);
//!
//! let soma_mesh = SomaBuilder::new(SomaOptions::default().with_subdivision_level(3))
//!     .build(&mut morphology)
//!     .unwrap();
//! let assembler = NeuronAssembler::new(PolylineTubeBuilder::default(), AssemblyOptions::default());
//! let neuron = assembler.assemble(&morphology, &soma_mesh).unwrap();
//! assert!(neuron.mesh.num_faces() > soma_mesh.mesh.num_faces());
//! ```

pub mod spines;
pub mod tube;

pub use spines::{place_spines, section_placements, SpineOptions, SpinePlacement, SpineTemplate};
pub use tube::{PolylineTubeBuilder, TubeBuilder};

use rayon::prelude::*;

use crate::error::{Result, SomaError};
use crate::mesh::{build_from_polygons, to_polygons, HalfEdgeMesh};
use crate::morphology::{Morphology, SectionType};
use crate::soma::StaticMesh;

/// Options for [`NeuronAssembler`].
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Vertices per tube cross-section.
    pub sides: usize,
    /// Distance between spines along dendrites; `None` places no spines.
    pub spine_spacing: Option<f64>,
    /// Spine randomization.
    pub spine_options: SpineOptions,
    /// Seed of the spine generator.
    pub seed: u64,
    /// Mark the assembled mesh for smooth shading.
    pub smooth_shading: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            sides: 8,
            spine_spacing: None,
            spine_options: SpineOptions::default(),
            seed: 0,
            smooth_shading: true,
        }
    }
}

impl AssemblyOptions {
    /// Set the cross-section resolution.
    pub fn with_sides(mut self, sides: usize) -> Self {
        self.sides = sides;
        self
    }

    /// Place spines every `spacing` along dendrites.
    pub fn with_spines(mut self, spacing: f64, seed: u64) -> Self {
        self.spine_spacing = Some(spacing);
        self.seed = seed;
        self
    }
}

/// Joins a soma mesh, arbor tubes and spines into one neuron mesh.
pub struct NeuronAssembler<T: TubeBuilder = PolylineTubeBuilder> {
    tube_builder: T,
    templates: Vec<SpineTemplate>,
    options: AssemblyOptions,
}

impl<T: TubeBuilder> NeuronAssembler<T> {
    /// Create an assembler without spine templates.
    pub fn new(tube_builder: T, options: AssemblyOptions) -> Self {
        Self {
            tube_builder,
            templates: Vec::new(),
            options,
        }
    }

    /// Set the spine templates.
    pub fn with_spine_templates(mut self, templates: Vec<SpineTemplate>) -> Self {
        self.templates = templates;
        self
    }

    /// Build the neuron mesh of `morphology` around an already built soma.
    pub fn assemble(&self, morphology: &Morphology, soma: &StaticMesh) -> Result<StaticMesh> {
        let arbors: Vec<_> = morphology.arbors().collect();
        let tubes: Vec<Vec<HalfEdgeMesh>> = arbors
            .par_iter()
            .map(|arbor| self.tube_builder.build_arbor(arbor, self.options.sides))
            .collect::<Result<_>>()?;

        let mut parts = vec![soma.mesh.clone()];
        parts.extend(tubes.into_iter().flatten());

        if let Some(spacing) = self.options.spine_spacing {
            if self.templates.is_empty() {
                log::warn!("spine spacing set for '{}' but no templates given", morphology.label);
            } else {
                let mut placements = Vec::new();
                for arbor in arbors.iter().filter(|a| a.kind != SectionType::Axon) {
                    for section in arbor.iter_depth_first() {
                        placements.extend(section_placements(section, spacing)?);
                    }
                }
                let spines = place_spines(&self.templates, &placements, &self.options.spine_options, self.options.seed)?;
                parts.extend(spines);
            }
        }

        log::info!("assembled '{}' from {} pieces", morphology.label, parts.len());
        let mesh = join_meshes(&parts)?;
        Ok(StaticMesh::new(
            format!("{}_neuron", morphology.label),
            mesh,
            self.options.smooth_shading,
        ))
    }
}

/// Concatenate meshes into one, keeping every piece's faces and vertices.
pub fn join_meshes(parts: &[HalfEdgeMesh]) -> Result<HalfEdgeMesh> {
    if parts.is_empty() {
        return Err(SomaError::EmptyMesh);
    }

    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    for part in parts {
        let (part_vertices, part_faces) = to_polygons(part);
        let offset = vertices.len();
        vertices.extend(part_vertices);
        faces.extend(
            part_faces
                .into_iter()
                .map(|face| face.into_iter().map(|i| i + offset).collect::<Vec<_>>()),
        );
    }

    build_from_polygons(&vertices, &faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::create_icosphere;
    use crate::morphology::{Arbor, Section, Soma, SOMA_PARENT_ID};
    use nalgebra::Point3;

    fn morphology() -> Morphology {
        let soma = Soma::from_profile_points(vec![
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(-3.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
            Point3::new(0.0, -3.0, 0.0),
        ])
        .unwrap();
        let dendrite = Section::from_points(
            1,
            SOMA_PARENT_ID,
            SectionType::BasalDendrite,
            &[(Point3::new(3.5, 0.0, 0.0), 0.5), (Point3::new(13.5, 0.0, 0.0), 0.5)],
        )
        .unwrap();
        let axon = Section::from_points(
            2,
            SOMA_PARENT_ID,
            SectionType::Axon,
            &[(Point3::new(-3.5, 0.0, 0.0), 0.5), (Point3::new(-13.5, 0.0, 0.0), 0.5)],
        )
        .unwrap();
        Morphology::new("m", soma)
            .with_axon(Arbor::from_root(axon))
            .with_basal_dendrite(Arbor::from_root(dendrite))
    }

    fn soma_mesh() -> StaticMesh {
        StaticMesh::new("m_soma", create_icosphere(3.0, 2).unwrap(), true)
    }

    #[test]
    fn test_join_keeps_all_pieces() {
        let a = create_icosphere(1.0, 1).unwrap();
        let b = create_icosphere(1.0, 2).unwrap();
        let joined = join_meshes(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(joined.num_vertices(), a.num_vertices() + b.num_vertices());
        assert_eq!(joined.num_faces(), a.num_faces() + b.num_faces());
        assert_eq!(joined.euler_characteristic(), 4);
        assert!(join_meshes(&[]).is_err());
    }

    #[test]
    fn test_assemble_tubes() {
        let assembler = NeuronAssembler::new(PolylineTubeBuilder::default(), AssemblyOptions::default().with_sides(6));
        let neuron = assembler.assemble(&morphology(), &soma_mesh()).unwrap();
        assert_eq!(neuron.name, "m_neuron");
        // soma (80 faces) plus two capped tubes of 6 quads and 2 caps
        assert_eq!(neuron.mesh.num_faces(), 80 + 2 * 8);
    }

    #[test]
    fn test_spines_only_on_dendrites() {
        let options = AssemblyOptions::default().with_sides(6).with_spines(2.0, 5);
        let template = SpineTemplate::stubby(1.0, 0.2).unwrap();
        let per_spine = template.mesh.num_faces();
        let assembler = NeuronAssembler::new(PolylineTubeBuilder::default(), options).with_spine_templates(vec![template]);

        let neuron = assembler.assemble(&morphology(), &soma_mesh()).unwrap();
        assert_eq!(neuron.mesh.num_faces(), 80 + 2 * 8 + 5 * per_spine);
    }
}
