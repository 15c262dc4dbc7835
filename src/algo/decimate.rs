//! Quadric error metric decimation.
//!
//! Polygon faces are triangulated first; the result is always a triangle
//! mesh. Each vertex carries the sum of the plane quadrics of its incident
//! triangles and edges are collapsed cheapest-first (Garland & Heckbert, 1997).
//!
//! Collapses are rejected when they would break the link condition or flip an
//! incident triangle, so a closed manifold input stays closed and manifold.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use log::debug;
use nalgebra::{Matrix4, Point3, Vector3, Vector4};

use crate::error::{Result, SomaError};
use crate::mesh::{build_from_triangles, to_polygons, triangulate, HalfEdgeMesh};

/// Options for [`decimate`].
#[derive(Debug, Clone)]
pub struct DecimateOptions {
    /// Fraction of triangles to keep, in `(0, 1]`. Ignored if `target_faces` is set.
    pub target_ratio: f64,
    /// Absolute triangle budget.
    pub target_faces: Option<usize>,
    /// Never collapse edges on an open boundary.
    pub preserve_boundary: bool,
    /// Stop once the cheapest collapse costs more than this.
    pub max_error: Option<f64>,
}

impl Default for DecimateOptions {
    fn default() -> Self {
        Self {
            target_ratio: 0.5,
            target_faces: None,
            preserve_boundary: true,
            max_error: None,
        }
    }
}

impl DecimateOptions {
    /// Keep `ratio` of the triangles.
    pub fn with_target_ratio(ratio: f64) -> Self {
        Self {
            target_ratio: ratio,
            ..Self::default()
        }
    }

    /// Keep at most `target` triangles.
    pub fn with_target_faces(target: usize) -> Self {
        Self {
            target_faces: Some(target),
            ..Self::default()
        }
    }

    /// Set whether boundary edges may be collapsed.
    pub fn with_preserve_boundary(mut self, preserve: bool) -> Self {
        self.preserve_boundary = preserve;
        self
    }

    /// Set the error threshold.
    pub fn with_max_error(mut self, max_error: f64) -> Self {
        self.max_error = Some(max_error);
        self
    }

    /// Check that the options are usable.
    pub fn validate(&self) -> Result<()> {
        if self.target_faces.is_none() && !(self.target_ratio > 0.0 && self.target_ratio <= 1.0) {
            return Err(SomaError::invalid_param(
                "target_ratio",
                self.target_ratio,
                "must be in (0, 1]",
            ));
        }
        if let Some(e) = self.max_error {
            if !(e >= 0.0) {
                return Err(SomaError::invalid_param("max_error", e, "must be non-negative"));
            }
        }
        Ok(())
    }

    /// Triangle budget for a mesh with `triangles` triangles.
    pub fn compute_target(&self, triangles: usize) -> usize {
        match self.target_faces {
            Some(target) => target.min(triangles),
            None => ((triangles as f64) * self.target_ratio).round() as usize,
        }
    }
}

/// Decimate a mesh in place.
///
/// Returns the number of triangles removed. The mesh is left untouched when
/// nothing needs to be removed or the result cannot be rebuilt.
///
/// # Example
/// ```
/// use somamesh::algo::{create_icosphere, decimate, DecimateOptions};
///
/// let mut sphere = create_icosphere(1.0, 4).unwrap();
/// let removed = decimate(&mut sphere, &DecimateOptions::with_target_ratio(0.25)).unwrap();
/// assert!(removed > 0);
/// assert_eq!(sphere.euler_characteristic(), 2);
/// ```
pub fn decimate(mesh: &mut HalfEdgeMesh, options: &DecimateOptions) -> Result<usize> {
    options.validate()?;

    let (mut vertices, polygons) = to_polygons(mesh);
    let triangles = triangulate(&mut vertices, &polygons);
    let target = options.compute_target(triangles.len());
    if target >= triangles.len() {
        return Ok(0);
    }

    let before = triangles.len();
    let mut collapser = Collapser::new(vertices, triangles, options.preserve_boundary);
    collapser.run(target, options.max_error);
    let (vertices, triangles) = collapser.finish();

    *mesh = build_from_triangles(&vertices, &triangles)?;
    debug!("decimated {} -> {} triangles", before, triangles.len());
    Ok(before - triangles.len())
}

/// Plane quadric `Q` such that `v^T Q v` is the summed squared plane distance.
#[derive(Debug, Clone, Copy)]
struct Quadric(Matrix4<f64>);

impl Quadric {
    fn zero() -> Self {
        Quadric(Matrix4::zeros())
    }

    /// Quadric of the plane `n . x + d = 0` with unit `n`.
    fn from_plane(n: &Vector3<f64>, d: f64) -> Self {
        let p = Vector4::new(n.x, n.y, n.z, d);
        Quadric(p * p.transpose())
    }

    fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let v = p.to_homogeneous();
        (v.transpose() * self.0 * v)[(0, 0)]
    }

    /// Point minimizing the error, if the system is well conditioned.
    fn optimal_point(&self) -> Option<Point3<f64>> {
        let mut m = self.0;
        m.set_row(3, &Vector4::new(0.0, 0.0, 0.0, 1.0).transpose());
        let v = m.try_inverse()? * Vector4::w();
        Some(Point3::new(v.x, v.y, v.z))
    }
}

impl std::ops::Add for Quadric {
    type Output = Quadric;

    fn add(self, other: Quadric) -> Quadric {
        Quadric(self.0 + other.0)
    }
}

/// Heap entry for a candidate collapse of `v1` into `v0`.
#[derive(Debug, Clone)]
struct Candidate {
    v0: usize,
    v1: usize,
    versions: (u32, u32),
    position: Point3<f64>,
    error: f64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed for a min-heap; ties broken by vertex ids for determinism
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .error
            .total_cmp(&self.error)
            .then_with(|| other.v0.cmp(&self.v0))
            .then_with(|| other.v1.cmp(&self.v1))
    }
}

struct Collapser {
    positions: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    vertex_alive: Vec<bool>,
    incident: Vec<Vec<usize>>,
    quadrics: Vec<Quadric>,
    versions: Vec<u32>,
    boundary: BTreeSet<(usize, usize)>,
    preserve_boundary: bool,
    live_faces: usize,
}

impl Collapser {
    fn new(positions: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>, preserve_boundary: bool) -> Self {
        let n = positions.len();
        let mut incident = vec![Vec::new(); n];
        let mut quadrics = vec![Quadric::zero(); n];
        let mut edge_use: HashMap<(usize, usize), usize> = HashMap::new();

        for (fi, tri) in triangles.iter().enumerate() {
            let [a, b, c] = *tri;
            let normal = (positions[b] - positions[a]).cross(&(positions[c] - positions[a]));
            if let Some(n) = normal.try_normalize(1e-12) {
                let q = Quadric::from_plane(&n, -n.dot(&positions[a].coords));
                for &v in tri {
                    quadrics[v] = quadrics[v] + q;
                }
            }
            for i in 0..3 {
                incident[tri[i]].push(fi);
                *edge_use.entry(edge_key(tri[i], tri[(i + 1) % 3])).or_insert(0) += 1;
            }
        }

        let boundary = edge_use
            .into_iter()
            .filter(|&(_, count)| count == 1)
            .map(|(e, _)| e)
            .collect();

        Self {
            positions,
            live_faces: triangles.len(),
            face_alive: vec![true; triangles.len()],
            triangles,
            vertex_alive: vec![true; n],
            incident,
            quadrics,
            versions: vec![0; n],
            boundary,
            preserve_boundary,
        }
    }

    fn run(&mut self, target: usize, max_error: Option<f64>) {
        let mut heap = BinaryHeap::new();
        let mut edges = BTreeSet::new();
        for tri in &self.triangles {
            for i in 0..3 {
                edges.insert(edge_key(tri[i], tri[(i + 1) % 3]));
            }
        }
        for (a, b) in edges {
            if let Some(c) = self.candidate(a, b) {
                heap.push(c);
            }
        }

        while self.live_faces > target {
            let Some(c) = heap.pop() else { break };
            if !self.vertex_alive[c.v0]
                || !self.vertex_alive[c.v1]
                || c.versions != (self.versions[c.v0], self.versions[c.v1])
            {
                continue;
            }
            if max_error.is_some_and(|m| c.error > m) {
                break;
            }
            if !self.can_collapse(c.v0, c.v1, &c.position) {
                continue;
            }

            self.collapse(c.v0, c.v1, c.position);
            for n in self.neighbours(c.v0) {
                if let Some(next) = self.candidate(c.v0, n) {
                    heap.push(next);
                }
            }
        }
    }

    fn candidate(&self, a: usize, b: usize) -> Option<Candidate> {
        let (v0, v1) = edge_key(a, b);
        if self.preserve_boundary && self.boundary.contains(&(v0, v1)) {
            return None;
        }

        let q = self.quadrics[v0] + self.quadrics[v1];
        let (p0, p1) = (self.positions[v0], self.positions[v1]);
        let mid = Point3::from((p0.coords + p1.coords) * 0.5);
        let edge_len = (p1 - p0).norm();

        let position = match q.optimal_point() {
            Some(p) if (p - mid).norm() < edge_len * 2.0 => p,
            _ => [p0, p1, mid]
                .into_iter()
                .min_by(|x, y| q.evaluate(x).total_cmp(&q.evaluate(y)))
                .unwrap_or(mid),
        };

        Some(Candidate {
            v0,
            v1,
            versions: (self.versions[v0], self.versions[v1]),
            error: q.evaluate(&position),
            position,
        })
    }

    fn live_incident(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.incident[v].iter().copied().filter(|&f| self.face_alive[f])
    }

    fn neighbours(&self, v: usize) -> BTreeSet<usize> {
        self.live_incident(v)
            .flat_map(|f| self.triangles[f])
            .filter(|&u| u != v)
            .collect()
    }

    fn can_collapse(&self, v0: usize, v1: usize, position: &Point3<f64>) -> bool {
        let shared = self
            .live_incident(v0)
            .filter(|&f| self.triangles[f].contains(&v1))
            .count();
        if shared == 0 || shared > 2 {
            return false;
        }

        let n0 = self.neighbours(v0);
        let n1 = self.neighbours(v1);
        if n0.intersection(&n1).count() != shared {
            return false;
        }
        if shared == 2 && (self.live_faces <= 4 || (self.on_boundary(v0) && self.on_boundary(v1))) {
            return false;
        }

        // No incident triangle may flip
        for v in [v0, v1] {
            for f in self.live_incident(v) {
                let tri = self.triangles[f];
                if tri.contains(&v0) && tri.contains(&v1) {
                    continue;
                }
                let before = triangle_normal(&tri.map(|u| self.positions[u]));
                let after = triangle_normal(&tri.map(|u| {
                    if u == v0 || u == v1 {
                        *position
                    } else {
                        self.positions[u]
                    }
                }));
                if before.dot(&after) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    fn on_boundary(&self, v: usize) -> bool {
        self.boundary.iter().any(|&(a, b)| a == v || b == v)
    }

    fn collapse(&mut self, keep: usize, remove: usize, position: Point3<f64>) {
        self.positions[keep] = position;
        self.quadrics[keep] = self.quadrics[keep] + self.quadrics[remove];
        self.vertex_alive[remove] = false;
        self.versions[keep] += 1;
        self.versions[remove] += 1;

        let moved = std::mem::take(&mut self.incident[remove]);
        for f in moved {
            if !self.face_alive[f] {
                continue;
            }
            if self.triangles[f].contains(&keep) {
                self.face_alive[f] = false;
                self.live_faces -= 1;
                continue;
            }
            for v in self.triangles[f].iter_mut() {
                if *v == remove {
                    *v = keep;
                }
            }
            self.incident[keep].push(f);
        }

        let alive = &self.face_alive;
        self.incident[keep].retain(|&f| alive[f]);

        if self.boundary.remove(&edge_key(keep, remove)) {
            let moved: Vec<_> = self
                .boundary
                .iter()
                .copied()
                .filter(|&(a, b)| a == remove || b == remove)
                .collect();
            for (a, b) in moved {
                self.boundary.remove(&(a, b));
                let other = if a == remove { b } else { a };
                self.boundary.insert(edge_key(keep, other));
            }
        }
    }

    fn finish(self) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let mut remap = vec![usize::MAX; self.positions.len()];
        let mut vertices = Vec::new();
        for (i, p) in self.positions.iter().enumerate() {
            if self.vertex_alive[i] {
                remap[i] = vertices.len();
                vertices.push(*p);
            }
        }

        let triangles = self
            .triangles
            .iter()
            .zip(&self.face_alive)
            .filter(|(_, &alive)| alive)
            .map(|(tri, _)| tri.map(|v| remap[v]))
            .collect();
        (vertices, triangles)
    }
}

#[inline]
fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn triangle_normal(p: &[Point3<f64>; 3]) -> Vector3<f64> {
    (p[1] - p[0]).cross(&(p[2] - p[0]))
}
