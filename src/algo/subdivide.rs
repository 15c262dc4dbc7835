//! Local subdivision of selected faces.
//!
//! Every edge of a target face is split into `cuts + 1` segments. Target
//! triangles are gridded into `(cuts + 1)^2` triangles and larger target
//! polygons are fanned from their centroid. Faces sharing a split edge receive
//! the inserted vertices in their loop, so a closed manifold input stays closed
//! and manifold. Non-target neighbours may therefore become n-gons.

use std::collections::HashMap;

use nalgebra::Point3;

use super::check_face_ids;
use crate::error::{Result, SomaError};
use crate::mesh::{build_from_polygons, to_polygons, FaceId, HalfEdgeMesh};

/// Subdivide the given faces in place.
///
/// Returns the ids of every face that replaced a target. Each target's first
/// child keeps the target's slot and the remaining children are appended after
/// the existing faces, so ids of untouched faces stay valid.
///
/// # Errors
/// - [`SomaError::EmptySelection`] if `faces` is empty
/// - [`SomaError::InvalidParameter`] for `cuts == 0` or out-of-range face ids
///
/// # Example
/// ```
/// use somamesh::algo::{create_icosphere, subdivide_faces};
/// use somamesh::mesh::FaceId;
///
/// let mut sphere = create_icosphere(1.0, 1).unwrap();
/// let children = subdivide_faces(&mut sphere, &[FaceId::new(0)], 2).unwrap();
/// assert_eq!(children.len(), 9);
/// assert!(sphere.is_closed());
/// ```
pub fn subdivide_faces(mesh: &mut HalfEdgeMesh, faces: &[FaceId], cuts: usize) -> Result<Vec<FaceId>> {
    if faces.is_empty() {
        return Err(SomaError::EmptySelection);
    }
    if cuts == 0 {
        return Err(SomaError::invalid_param("cuts", cuts, "must be at least 1"));
    }
    check_face_ids(mesh, faces)?;

    let (mut vertices, polygons) = to_polygons(mesh);

    let mut targets: Vec<usize> = faces.iter().map(|f| f.index()).collect();
    targets.sort_unstable();
    targets.dedup();

    let mut is_target = vec![false; polygons.len()];
    for &t in &targets {
        is_target[t] = true;
    }

    let splits = EdgeSplits::build(&mut vertices, &polygons, &targets, cuts);

    let mut new_faces: Vec<Vec<usize>> = Vec::with_capacity(polygons.len() + targets.len() * (cuts + 1) * (cuts + 1));
    let mut appended: Vec<Vec<usize>> = Vec::new();
    let mut children = Vec::new();

    for (fi, face) in polygons.iter().enumerate() {
        if !is_target[fi] {
            new_faces.push(splits.expand_loop(face));
            continue;
        }

        let pieces = if face.len() == 3 {
            grid_triangle(&mut vertices, &splits, [face[0], face[1], face[2]], cuts + 1)
        } else {
            fan_polygon(&mut vertices, &splits, face)
        };

        let mut pieces = pieces.into_iter();
        if let Some(first) = pieces.next() {
            children.push(FaceId::new(fi));
            new_faces.push(first);
        }
        appended.extend(pieces);
    }

    let first_appended = new_faces.len();
    children.extend((0..appended.len()).map(|i| FaceId::new(first_appended + i)));
    new_faces.extend(appended);

    *mesh = build_from_polygons(&vertices, &new_faces)?;
    Ok(children)
}

/// Inserted vertices for every split edge, keyed by `(min, max)` and stored
/// in min-to-max order.
struct EdgeSplits {
    edges: HashMap<(usize, usize), Vec<usize>>,
}

impl EdgeSplits {
    fn build(
        vertices: &mut Vec<Point3<f64>>,
        polygons: &[Vec<usize>],
        targets: &[usize],
        cuts: usize,
    ) -> Self {
        let mut edges = HashMap::new();
        for &t in targets {
            let face = &polygons[t];
            let n = face.len();
            for i in 0..n {
                let (a, b) = (face[i], face[(i + 1) % n]);
                let key = if a < b { (a, b) } else { (b, a) };
                edges.entry(key).or_insert_with(|| {
                    let (p0, p1) = (vertices[key.0], vertices[key.1]);
                    (1..=cuts)
                        .map(|k| {
                            let t = k as f64 / (cuts + 1) as f64;
                            vertices.push(p0 + (p1 - p0) * t);
                            vertices.len() - 1
                        })
                        .collect()
                });
            }
        }
        Self { edges }
    }

    /// Inserted vertices on edge `a -> b`, ordered from `a` to `b`.
    fn between(&self, a: usize, b: usize) -> Vec<usize> {
        let key = if a < b { (a, b) } else { (b, a) };
        match self.edges.get(&key) {
            Some(points) if a < b => points.clone(),
            Some(points) => points.iter().rev().copied().collect(),
            None => Vec::new(),
        }
    }

    /// The face loop with inserted vertices spliced into every split edge.
    fn expand_loop(&self, face: &[usize]) -> Vec<usize> {
        let n = face.len();
        let mut result = Vec::with_capacity(n);
        for i in 0..n {
            result.push(face[i]);
            result.extend(self.between(face[i], face[(i + 1) % n]));
        }
        result
    }
}

/// Grid a triangle `abc` into `n * n` triangles.
///
/// Grid point `(i, j)` sits at `a + (b - a) i / n + (c - a) j / n`.
fn grid_triangle(
    vertices: &mut Vec<Point3<f64>>,
    splits: &EdgeSplits,
    [a, b, c]: [usize; 3],
    n: usize,
) -> Vec<Vec<usize>> {
    let ab = splits.between(a, b);
    let ac = splits.between(a, c);
    let bc = splits.between(b, c);
    let (pa, pb, pc) = (vertices[a], vertices[b], vertices[c]);

    // grid[j][i] for i + j <= n
    let mut grid: Vec<Vec<usize>> = Vec::with_capacity(n + 1);
    for j in 0..=n {
        let mut row = Vec::with_capacity(n + 1 - j);
        for i in 0..=(n - j) {
            let index = match (i, j) {
                (0, 0) => a,
                (_, 0) if i == n => b,
                (0, _) if j == n => c,
                (_, 0) => ab[i - 1],
                (0, _) => ac[j - 1],
                _ if i + j == n => bc[j - 1],
                _ => {
                    let p = pa
                        + (pb - pa) * (i as f64 / n as f64)
                        + (pc - pa) * (j as f64 / n as f64);
                    vertices.push(p);
                    vertices.len() - 1
                }
            };
            row.push(index);
        }
        grid.push(row);
    }

    let mut triangles = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..(n - j) {
            triangles.push(vec![grid[j][i], grid[j][i + 1], grid[j + 1][i]]);
            if i + j + 1 < n {
                triangles.push(vec![grid[j][i + 1], grid[j + 1][i + 1], grid[j + 1][i]]);
            }
        }
    }
    triangles
}

/// Fan a polygon with split edges from a new centroid vertex.
fn fan_polygon(vertices: &mut Vec<Point3<f64>>, splits: &EdgeSplits, face: &[usize]) -> Vec<Vec<usize>> {
    let sum = face
        .iter()
        .fold(nalgebra::Vector3::zeros(), |acc, &v| acc + vertices[v].coords);
    vertices.push(Point3::from(sum / face.len() as f64));
    let center = vertices.len() - 1;

    let ring = splits.expand_loop(face);
    let n = ring.len();
    (0..n)
        .map(|i| vec![ring[i], ring[(i + 1) % n], center])
        .collect()
}
