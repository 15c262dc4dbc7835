//! Static meshes baked out of a relaxed soma.

use nalgebra::{Point3, Vector3};

use crate::mesh::HalfEdgeMesh;

/// A named, immutable output mesh.
#[derive(Debug, Clone)]
pub struct StaticMesh {
    /// Object name, usually the morphology label with a suffix.
    pub name: String,
    /// The geometry, in morphology coordinates.
    pub mesh: HalfEdgeMesh,
    /// Shade with interpolated vertex normals instead of face normals.
    pub smooth_shading: bool,
}

impl StaticMesh {
    /// Wrap a mesh.
    pub fn new(name: impl Into<String>, mesh: HalfEdgeMesh, smooth_shading: bool) -> Self {
        Self {
            name: name.into(),
            mesh,
            smooth_shading,
        }
    }

    /// One shading normal per vertex, in vertex order.
    ///
    /// With smooth shading off every entry is zero; renderers are expected to
    /// fall back to face normals.
    pub fn vertex_normals(&self) -> Vec<Vector3<f64>> {
        if !self.smooth_shading {
            return vec![Vector3::zeros(); self.mesh.num_vertices()];
        }
        self.mesh.vertex_ids().map(|v| self.mesh.vertex_normal(v)).collect()
    }

    /// Number of faces.
    pub fn num_faces(&self) -> usize {
        self.mesh.num_faces()
    }
}

/// Move a soma-local surface back to `centroid` and wrap it.
///
/// With `check_manifold` set, a surface that is not closed and manifold is
/// reported with a warning; it is returned either way.
pub(crate) fn bake(
    name: String,
    mut surface: HalfEdgeMesh,
    centroid: Point3<f64>,
    smooth_shading: bool,
    check_manifold: bool,
) -> StaticMesh {
    let moved: Vec<Point3<f64>> = surface.positions().iter().map(|p| p + centroid.coords).collect();
    surface.set_positions(&moved);

    if check_manifold && !(surface.is_closed() && surface.is_manifold()) {
        log::warn!(
            "soma mesh '{}' is not a closed manifold (euler characteristic {})",
            name,
            surface.euler_characteristic()
        );
    }

    StaticMesh::new(name, surface, smooth_shading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::create_icosphere;

    #[test]
    fn test_bake_translates_to_centroid() {
        let surface = create_icosphere(2.0, 2).unwrap();
        let centroid = Point3::new(10.0, -4.0, 1.0);
        let baked = bake("cell_soma".to_string(), surface, centroid, true, true);

        assert_eq!(baked.name, "cell_soma");
        for v in baked.mesh.vertex_ids() {
            let r = (baked.mesh.position(v) - centroid).norm();
            assert!((r - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_vertex_normals_follow_shading() {
        let mesh = create_icosphere(1.0, 2).unwrap();
        let smooth = StaticMesh::new("s", mesh.clone(), true);
        for (v, n) in smooth.mesh.vertex_ids().zip(smooth.vertex_normals()) {
            assert!(n.dot(&smooth.mesh.position(v).coords) > 0.9);
        }

        let flat = StaticMesh::new("f", mesh, false);
        assert!(flat.vertex_normals().iter().all(|n| n.norm() == 0.0));
    }
}
