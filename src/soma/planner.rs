//! Connection planning: choosing and shaping one soma face per arbor.
//!
//! Everything here works in soma-local coordinates: the surface is centered at
//! the origin and morphology points are translated by minus the soma centroid.

use std::collections::HashSet;

use nalgebra::{Point3, Vector3};

use super::options::{SomaOptions, SomaProfile};
use crate::algo::{
    convert_face_to_circle, faces_intersecting_sphere, merge_faces_into_one_face, nearest_face_index,
    subdivide_faces, SphereSelection,
};
use crate::error::{Result, SomaError};
use crate::mesh::{FaceId, HalfEdgeMesh, VertexId};
use crate::morphology::Morphology;

/// One-cut subdivision passes applied to the nearest face when the region
/// around a root cannot be merged.
const FALLBACK_PASSES: usize = 2;

/// Location of a section inside a [`Morphology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRef {
    /// Arbor index in [`Morphology::arbors`] order.
    pub arbor: usize,
    /// Section index inside the arbor's arena.
    pub section: usize,
}

/// What a connection face attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// The root of an arbor.
    Arbor,
    /// An unclaimed soma profile point.
    ProfilePoint,
}

/// A planned connection face on the soma surface.
#[derive(Debug, Clone)]
pub struct ConnectionFace {
    /// Root section served by this face; `None` for profile points.
    pub section: Option<SectionRef>,
    /// Face on the planned surface.
    pub face: FaceId,
    /// Face centroid, soma-local.
    pub centroid: Point3<f64>,
    /// Unit face normal.
    pub normal: Vector3<f64>,
    /// Radius the face tapers to.
    pub extrusion_scale: f64,
    /// Where the face is pulled, soma-local.
    pub target: Point3<f64>,
    /// What the face attaches to.
    pub kind: ConnectionKind,
}

/// Radius of the connection circle for an arbor root of radius `radius` at
/// distance `distance` from the soma centroid.
///
/// The root radius is scaled back onto the soma surface, so the result is
/// positive for positive inputs and vanishes with the radius.
#[inline]
pub fn extrusion_scale(radius: f64, soma_radius: f64, distance: f64) -> f64 {
    radius * soma_radius / distance
}

/// Choose, merge and reshape one connection face per soma-connected arbor.
///
/// `surface` is the soma-local icosphere and is edited in place. Every planned
/// root section gets its `soma_face_index` and `soma_face_centroid` set. Roots
/// that start inside the soma are planned like any other and their hook pulls
/// the face inward. Arbors that cannot be reached are logged and skipped.
pub fn plan_connections(
    surface: &mut HalfEdgeMesh,
    morphology: &mut Morphology,
    soma_radius: f64,
    options: &SomaOptions,
) -> Result<Vec<ConnectionFace>> {
    let soma_center = morphology.soma.centroid;
    let mut connections: Vec<ConnectionFace> = Vec::new();
    let mut directions: Vec<Vector3<f64>> = Vec::new();

    for (ai, arbor) in morphology.arbors().enumerate() {
        let root = arbor.root_section();
        if !root.connected_to_soma {
            log::debug!("{} root {} is not connected to the soma", root.kind, root.id);
            continue;
        }

        let sample = root.first_sample();
        let local = sample.point - soma_center;
        let distance = local.norm();

        if distance <= f64::EPSILON {
            log::warn!("{} root {} starts at the soma centroid, skipping", root.kind, root.id);
            continue;
        }
        if !(sample.radius > 0.0) {
            log::warn!("{} root {} has radius {}, skipping", root.kind, root.id, sample.radius);
            continue;
        }
        if distance > options.max_connection_distance * soma_radius {
            log::warn!(
                "{} root {} is {:.3} from the soma centroid, beyond reach {:.3}",
                root.kind,
                root.id,
                distance,
                options.max_connection_distance * soma_radius
            );
            continue;
        }
        if distance < soma_radius {
            log::debug!("{} root {} starts inside the soma", root.kind, root.id);
        }

        let direction = local / distance;
        let connection_point = Point3::from(direction * soma_radius);
        let scale = extrusion_scale(sample.radius, soma_radius, distance);

        let claimed = resolve_faces(surface, &connections);
        let face = select_connection_face(surface, &connection_point, scale, &claimed, options)?;

        let centroid = surface.face_centroid(face);
        convert_face_to_circle(surface, face, &centroid, scale)?;

        let target = if options.full_arbor_extrusion {
            Point3::from(local)
        } else {
            Point3::from(local - direction * options.extrusion_delta.min((distance - soma_radius).max(0.0)))
        };

        directions.push(direction);
        connections.push(ConnectionFace {
            section: Some(SectionRef {
                arbor: ai,
                section: arbor.root,
            }),
            face,
            centroid: surface.face_centroid(face),
            normal: surface.face_normal(face),
            extrusion_scale: scale,
            target,
            kind: ConnectionKind::Arbor,
        });
    }

    // Later merges compact face ids, so re-resolve from the recorded centroids.
    let resolved = resolve_faces(surface, &connections);
    for (connection, face) in connections.iter_mut().zip(resolved) {
        connection.face = face;
        connection.normal = surface.face_normal(face);
    }

    if options.profile == SomaProfile::ArborsAndProfilePoints {
        let extra = plan_profile_points(surface, morphology, soma_radius, &directions, &connections, options);
        connections.extend(extra);
    }

    record_on_sections(morphology, &connections, soma_center);
    log::info!(
        "planned {} connection faces on the soma of '{}'",
        connections.len(),
        morphology.label
    );
    Ok(connections)
}

/// Current face id of every connection, looked up by centroid.
fn resolve_faces(surface: &HalfEdgeMesh, connections: &[ConnectionFace]) -> Vec<FaceId> {
    connections
        .iter()
        .map(|c| nearest_face_index(surface, &c.centroid).unwrap_or(c.face))
        .collect()
}

/// Pick the faces around `point`, merge them and return the merged face.
///
/// Faces sharing a vertex with a claimed face are never edited, so earlier
/// connection circles keep their shape.
fn select_connection_face(
    surface: &mut HalfEdgeMesh,
    point: &Point3<f64>,
    radius: f64,
    claimed: &[FaceId],
    options: &SomaOptions,
) -> Result<FaceId> {
    let candidates = clear_of_claimed(
        surface,
        faces_intersecting_sphere(surface, point, radius, SphereSelection::AnyVertex),
        claimed,
    );
    if options.uses_extra_subdivision() && !candidates.is_empty() {
        subdivide_faces(surface, &candidates, 1)?;
    }

    // Subdivision keeps existing face slots, so claimed ids stay valid.
    let mut refined = clear_of_claimed(
        surface,
        faces_intersecting_sphere(surface, point, radius, SphereSelection::AllVertices),
        claimed,
    );
    if !refined.is_empty() {
        // Merge the component closest to the connection point
        if let Some(nearest) = nearest_of(surface, &refined, point) {
            refined.retain(|&f| f != nearest);
            refined.insert(0, nearest);
        }
        match merge_faces_into_one_face(surface, &refined) {
            Ok(face) => return Ok(face),
            Err(SomaError::NonManifold { details }) => {
                log::debug!("connection region not mergeable ({}), using nearest face", details);
            }
            Err(e) => return Err(e),
        }
    }

    let nearest = nearest_clear(surface, point, claimed).ok_or(SomaError::EmptyMesh)?;
    log::debug!("subdividing nearest face {} for connection", nearest.index());
    let mut children = vec![nearest];
    for _ in 0..FALLBACK_PASSES {
        children = subdivide_faces(surface, &children, 1)?;
    }
    merge_faces_into_one_face(surface, &children)
}

/// Vertices on the boundary of claimed faces.
fn claimed_vertices(surface: &HalfEdgeMesh, claimed: &[FaceId]) -> HashSet<VertexId> {
    claimed.iter().flat_map(|&f| surface.face_vertices(f)).collect()
}

/// Keep the faces that share no vertex with a claimed face.
fn clear_of_claimed(surface: &HalfEdgeMesh, faces: Vec<FaceId>, claimed: &[FaceId]) -> Vec<FaceId> {
    let taken = claimed_vertices(surface, claimed);
    faces
        .into_iter()
        .filter(|&f| !surface.face_vertices(f).any(|v| taken.contains(&v)))
        .collect()
}

fn nearest_of(surface: &HalfEdgeMesh, faces: &[FaceId], point: &Point3<f64>) -> Option<FaceId> {
    faces.iter().copied().min_by(|&a, &b| {
        let da = (surface.face_centroid(a) - point).norm_squared();
        let db = (surface.face_centroid(b) - point).norm_squared();
        da.total_cmp(&db).then(a.cmp(&b))
    })
}

/// Nearest face clear of claimed vertices, or the nearest unclaimed face when
/// every face touches a claimed one.
fn nearest_clear(surface: &HalfEdgeMesh, point: &Point3<f64>, claimed: &[FaceId]) -> Option<FaceId> {
    let clear = clear_of_claimed(surface, surface.face_ids().collect(), claimed);
    nearest_of(surface, &clear, point).or_else(|| {
        let free: Vec<FaceId> = surface.face_ids().filter(|f| !claimed.contains(f)).collect();
        nearest_of(surface, &free, point)
    })
}

/// One face per soma profile point not already covered by an arbor.
fn plan_profile_points(
    surface: &HalfEdgeMesh,
    morphology: &Morphology,
    soma_radius: f64,
    arbor_directions: &[Vector3<f64>],
    arbor_connections: &[ConnectionFace],
    options: &SomaOptions,
) -> Vec<ConnectionFace> {
    let center = morphology.soma.centroid;
    let cos_claim = options.profile_claim_angle.cos();
    let mut taken: Vec<FaceId> = arbor_connections.iter().map(|c| c.face).collect();
    let mut result = Vec::new();

    for point in &morphology.soma.profile_points {
        let local = point - center;
        let Some(direction) = local.try_normalize(f64::EPSILON) else {
            continue;
        };
        if arbor_directions.iter().any(|d| d.dot(&direction) >= cos_claim) {
            continue;
        }

        let Some(face) = nearest_face_index(surface, &Point3::from(direction * soma_radius)) else {
            continue;
        };
        if taken.contains(&face) {
            log::debug!("profile point {:?} shares face {}, dropped", point, face.index());
            continue;
        }
        taken.push(face);

        let centroid = surface.face_centroid(face);
        let bind_radius = surface
            .face_vertices(face)
            .map(|v| (surface.position(v) - centroid).norm())
            .sum::<f64>()
            / surface.face_vertex_count(face).max(1) as f64;

        result.push(ConnectionFace {
            section: None,
            face,
            centroid,
            normal: surface.face_normal(face),
            extrusion_scale: bind_radius,
            target: Point3::from(local),
            kind: ConnectionKind::ProfilePoint,
        });
    }
    result
}

fn record_on_sections(morphology: &mut Morphology, connections: &[ConnectionFace], soma_center: Point3<f64>) {
    let mut arbors: Vec<_> = morphology.arbors_mut().collect();
    for connection in connections {
        let Some(r) = connection.section else { continue };
        if let Some(section) = arbors.get_mut(r.arbor).and_then(|a| a.sections.get_mut(r.section)) {
            section.soma_face_index = Some(connection.face.index());
            section.soma_face_centroid = Some(connection.centroid + soma_center.coords);
        }
    }
}
