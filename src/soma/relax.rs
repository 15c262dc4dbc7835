//! Position-based mass-spring relaxation of the soma surface.
//!
//! The engine owns a copy of the planned surface. Hooked vertices follow their
//! keyframes exactly; every other vertex keeps damped Verlet inertia and is
//! pulled back toward its planned edge lengths by Gauss-Seidel spring
//! projection. There is no randomness and the iteration order is fixed, so a
//! run is bit-for-bit reproducible.
//!
//! # Example
//!
//! ```
//! use somamesh::algo::{create_icosphere, Progress};
//! use somamesh::soma::{RelaxationEngine, RelaxationState, SomaOptions};
//!
//! let surface = create_icosphere(1.0, 2).unwrap();
//! let options = SomaOptions::default().with_steps(1, 10);
//!
//! let mut engine = RelaxationEngine::new(&options);
//! engine.plan(surface, Vec::new()).unwrap();
//! engine.run(&Progress::none(), None).unwrap();
//! assert_eq!(engine.state(), RelaxationState::Settled);
//!
//! let relaxed = engine.extract().unwrap();
//! assert_eq!(relaxed.euler_characteristic(), 2);
//! ```

use std::collections::HashSet;

use log::{debug, info};
use nalgebra::Point3;

use super::hook::Hook;
use super::options::SomaOptions;
use crate::algo::{CancelToken, Progress};
use crate::error::{Result, SomaError};
use crate::mesh::HalfEdgeMesh;

/// Lifecycle of a [`RelaxationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxationState {
    /// Nothing planned yet.
    Idle,
    /// Surface, springs and hooks are in place, no step taken.
    Planned,
    /// At least one step taken.
    Simulating,
    /// Clock ran past the last step or the run was stopped early.
    Settled,
    /// The static mesh has been taken out; hooks are gone.
    Extracted,
}

#[derive(Debug, Clone, Copy)]
struct Spring {
    a: usize,
    b: usize,
    rest: f64,
}

/// Full vertex state of an engine between two steps.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    clock: u32,
    state: RelaxationState,
    positions: Vec<Point3<f64>>,
    previous: Vec<Point3<f64>>,
}

impl Checkpoint {
    /// Step the engine will take next after restoring.
    pub fn clock(&self) -> u32 {
        self.clock
    }
}

/// Mass-spring relaxation driven by keyframed hooks.
#[derive(Debug, Clone)]
pub struct RelaxationEngine {
    stiffness: f64,
    solver_iterations: u32,
    damping: f64,
    min_step: u32,
    max_step: u32,

    state: RelaxationState,
    clock: u32,
    surface: HalfEdgeMesh,
    positions: Vec<Point3<f64>>,
    previous: Vec<Point3<f64>>,
    springs: Vec<Spring>,
    hooks: Vec<Hook>,
    pinned: Vec<bool>,
}

impl RelaxationEngine {
    /// Create an idle engine with the solver settings of `options`.
    pub fn new(options: &SomaOptions) -> Self {
        Self {
            stiffness: options.stiffness,
            solver_iterations: options.solver_iterations,
            damping: options.damping,
            min_step: options.min_step,
            max_step: options.max_step,
            state: RelaxationState::Idle,
            clock: options.min_step,
            surface: HalfEdgeMesh::new(),
            positions: Vec::new(),
            previous: Vec::new(),
            springs: Vec::new(),
            hooks: Vec::new(),
            pinned: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> RelaxationState {
        self.state
    }

    /// Step the next call to [`step`](Self::step) simulates.
    pub fn clock(&self) -> u32 {
        self.clock
    }

    /// Current vertex positions.
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Hooks driving the surface. Empty after extraction.
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Number of structural and bend springs.
    pub fn spring_count(&self) -> usize {
        self.springs.len()
    }

    /// Number of vertices constrained by a hook.
    pub fn pinned_count(&self) -> usize {
        self.pinned.iter().filter(|&&p| p).count()
    }

    /// Take ownership of the planned surface and its hooks.
    ///
    /// Rest lengths are measured on `surface` as given.
    ///
    /// # Errors
    /// [`SomaError::InvalidState`] unless idle, [`SomaError::InvalidParameter`]
    /// if a hook binds a vertex the surface does not have.
    pub fn plan(&mut self, surface: HalfEdgeMesh, hooks: Vec<Hook>) -> Result<()> {
        if self.state != RelaxationState::Idle {
            return Err(SomaError::InvalidState(format!("cannot plan while {:?}", self.state)));
        }

        let n = surface.num_vertices();
        let mut pinned = vec![false; n];
        for hook in &hooks {
            for v in &hook.vertex_indices {
                if !v.is_valid() || v.index() >= n {
                    return Err(SomaError::invalid_param("hook vertex", v.index(), "no such vertex"));
                }
                pinned[v.index()] = true;
            }
        }

        self.springs = build_springs(&surface);
        self.positions = surface.positions();
        self.previous = self.positions.clone();
        self.pinned = pinned;
        self.hooks = hooks;
        self.surface = surface;
        self.clock = self.min_step;
        self.state = RelaxationState::Planned;

        debug!(
            "planned relaxation: {} vertices, {} springs, {} hooks",
            n,
            self.springs.len(),
            self.hooks.len()
        );
        Ok(())
    }

    /// Simulate one step and advance the clock.
    ///
    /// Stepping a settled engine does nothing.
    pub fn step(&mut self) -> Result<RelaxationState> {
        match self.state {
            RelaxationState::Planned | RelaxationState::Simulating => {}
            RelaxationState::Settled => return Ok(self.state),
            state => return Err(SomaError::InvalidState(format!("cannot step while {:?}", state))),
        }

        let keep = 1.0 - self.damping;
        for i in 0..self.positions.len() {
            let current = self.positions[i];
            if !self.pinned[i] {
                self.positions[i] = current + (current - self.previous[i]) * keep;
            }
            self.previous[i] = current;
        }

        for hook in &self.hooks {
            for (v, target) in hook.targets(self.clock) {
                self.positions[v.index()] = target;
            }
        }

        for _ in 0..self.solver_iterations {
            self.project_springs();
        }

        self.clock += 1;
        self.state = if self.clock > self.max_step {
            RelaxationState::Settled
        } else {
            RelaxationState::Simulating
        };
        Ok(self.state)
    }

    fn project_springs(&mut self) {
        for spring in &self.springs {
            let wa = if self.pinned[spring.a] { 0.0 } else { 1.0 };
            let wb = if self.pinned[spring.b] { 0.0 } else { 1.0 };
            let w = wa + wb;
            if w == 0.0 {
                continue;
            }

            let delta = self.positions[spring.b] - self.positions[spring.a];
            let length = delta.norm();
            if length <= f64::EPSILON {
                continue;
            }

            let correction = delta * ((length - spring.rest) / length * self.stiffness / w);
            self.positions[spring.a] += correction * wa;
            self.positions[spring.b] -= correction * wb;
        }
    }

    /// Step until settled, reporting each step.
    ///
    /// A raised `cancel` token settles the engine with its current shape.
    pub fn run(&mut self, progress: &Progress, cancel: Option<&CancelToken>) -> Result<RelaxationState> {
        let total = (self.max_step.saturating_sub(self.min_step) + 1) as usize;

        while self.state != RelaxationState::Settled {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                info!("relaxation cancelled at step {}", self.clock);
                return self.settle();
            }
            self.step()?;
            progress.report(self.clock.saturating_sub(self.min_step) as usize, total, "relaxing soma");
        }
        Ok(self.state)
    }

    /// Stop simulating and keep the current shape.
    pub fn settle(&mut self) -> Result<RelaxationState> {
        match self.state {
            RelaxationState::Planned | RelaxationState::Simulating | RelaxationState::Settled => {
                self.state = RelaxationState::Settled;
                Ok(self.state)
            }
            state => Err(SomaError::InvalidState(format!("cannot settle while {:?}", state))),
        }
    }

    /// Snapshot the vertex state.
    pub fn checkpoint(&self) -> Result<Checkpoint> {
        match self.state {
            RelaxationState::Idle | RelaxationState::Extracted => Err(SomaError::InvalidState(format!(
                "nothing to checkpoint while {:?}",
                self.state
            ))),
            state => Ok(Checkpoint {
                clock: self.clock,
                state,
                positions: self.positions.clone(),
                previous: self.previous.clone(),
            }),
        }
    }

    /// Return to a snapshot taken from this engine.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if matches!(self.state, RelaxationState::Idle | RelaxationState::Extracted) {
            return Err(SomaError::InvalidState(format!("cannot restore while {:?}", self.state)));
        }
        if checkpoint.positions.len() != self.positions.len() {
            return Err(SomaError::invalid_param(
                "checkpoint",
                checkpoint.positions.len(),
                "vertex count does not match the planned surface",
            ));
        }

        self.clock = checkpoint.clock;
        self.state = checkpoint.state;
        self.positions.clone_from(&checkpoint.positions);
        self.previous.clone_from(&checkpoint.previous);
        Ok(())
    }

    /// Bake the current shape into a static mesh.
    ///
    /// Drops the hooks and the constrained-vertex group. Calling it again
    /// returns the same mesh.
    pub fn extract(&mut self) -> Result<HalfEdgeMesh> {
        match self.state {
            RelaxationState::Settled | RelaxationState::Extracted => {}
            state => return Err(SomaError::InvalidState(format!("cannot extract while {:?}", state))),
        }

        if self.state == RelaxationState::Settled {
            self.hooks.clear();
            self.pinned.iter_mut().for_each(|p| *p = false);
            self.state = RelaxationState::Extracted;
        }

        let mut mesh = self.surface.clone();
        mesh.set_positions(&self.positions);
        Ok(mesh)
    }
}

/// Structural springs on every edge plus bend springs across interior edges.
fn build_springs(surface: &HalfEdgeMesh) -> Vec<Spring> {
    let positions = surface.positions();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut springs = Vec::new();

    let mut add = |a: usize, b: usize, springs: &mut Vec<Spring>| {
        if a == b || !seen.insert((a.min(b), a.max(b))) {
            return;
        }
        let rest = (positions[b] - positions[a]).norm();
        if rest > f64::EPSILON {
            springs.push(Spring { a, b, rest });
        }
    };

    for he in surface.halfedge_ids() {
        add(surface.origin(he).index(), surface.dest(he).index(), &mut springs);
    }

    for he in surface.halfedge_ids() {
        let twin = surface.twin(he);
        if surface.is_boundary_halfedge(he) || surface.is_boundary_halfedge(twin) {
            continue;
        }
        let c = surface.dest(surface.next(he));
        let d = surface.dest(surface.next(twin));
        add(c.index(), d.index(), &mut springs);
    }

    springs
}
