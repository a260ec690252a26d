//! Parallel element assembly.
//!
//! The element range is cut into fixed-size contiguous chunks and Rayon maps
//! chunks to worker threads. Each chunk owns one [`ElementWorkItem`] (shape
//! values, interpolated fields, property arrays and dense local blocks) that
//! is reused for every element in the chunk, so gathering, interpolation and
//! local accumulation allocate nothing once the buffers have grown. Seeded
//! dual numbers keep their derivative storage between elements too; only the
//! arithmetic inside AD objects builds temporary derivative vectors.
//!
//! Every element goes through the same phases:
//!
//! ```text
//! Idle -> PerElementSetup -> QpEvaluate -> LocalAccumulate -> GlobalScatter -> Idle
//! ```
//!
//! Scattering into the global system follows the configured
//! [`ScatterStrategy`]. With [`ScatterStrategy::Ordered`] every chunk keeps
//! its own residual entries and triplets, and chunk results are joined in
//! chunk order after the parallel pass, so the assembled system is bitwise
//! identical for any thread count. [`ScatterStrategy::Locked`] writes into
//! `Mutex`-guarded global backends as soon as an element is done; summation
//! order then depends on scheduling and results agree only to round-off.

use crate::element::{create_element, GaussPoint};
use crate::error::{Error, Result};
use crate::fe::FeValues;
use crate::fields::{ElementFields, FieldSources, Qp};
use crate::kernel::{ElementContext, JacobianContributor, LocalBlocks};
use crate::material::MaterialQp;
use crate::mesh::{ElementConnectivity, ElementType, Mesh};
use crate::postprocessor::IntegralPartial;
use crate::property::{MaterialData, PropertyTable, PropertyWarehouse, StatefulColumns, StatefulStore};
use crate::reduction::{join_ordered, Concat, Join, Sum, Union};
use crate::sparse::{CsrMatrix, GlobalVector, MatrixBackend, TripletMatrix, VectorBackend};
use crate::types::{ElementId, Point3, SubdomainId, TimeContext};
use crate::variables::{DofMap, PostprocessorId, SolutionHistory};
use crate::warehouse::Warehouse;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How element contributions reach the global system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScatterStrategy {
    /// Chunk-local buffers joined in chunk order; thread-count invariant.
    #[default]
    Ordered,
    /// Direct scatter into shared backends under a lock.
    Locked,
}

/// Assembly options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    /// Number of worker threads (0 = Rayon's global pool).
    pub n_threads: usize,
    pub scatter: ScatterStrategy,
    /// Elements per partition. Partitions depend only on this value and the
    /// element count.
    pub chunk_size: usize,
    /// Polynomial degree integrated exactly by the volume and side rules.
    pub quadrature_order: usize,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            n_threads: 0,
            scatter: ScatterStrategy::Ordered,
            chunk_size: 64,
            quadrature_order: 3,
        }
    }
}

impl AssemblyOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if self.quadrature_order == 0 {
            return Err(Error::Config("quadrature_order must be at least 1".into()));
        }
        Ok(())
    }

    /// Parse and validate options from JSON; missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(format!("assembly options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Dedicated pool for `n_threads > 0`.
    pub fn build_pool(&self) -> Result<Option<rayon::ThreadPool>> {
        if self.n_threads == 0 {
            return Ok(None);
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_threads)
            .build()
            .map(Some)
            .map_err(|e| Error::Config(format!("thread pool: {e}")))
    }
}

/// What a pass computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyMode {
    Residual,
    Jacobian,
    ResidualAndJacobian,
}

impl AssemblyMode {
    pub fn residual(self) -> bool {
        !matches!(self, AssemblyMode::Jacobian)
    }

    pub fn jacobian(self) -> bool {
        !matches!(self, AssemblyMode::Residual)
    }
}

/// Phase of an element work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    PerElementSetup,
    QpEvaluate,
    LocalAccumulate,
    GlobalScatter,
}

impl LoopPhase {
    pub fn next(self) -> Self {
        match self {
            LoopPhase::Idle => LoopPhase::PerElementSetup,
            LoopPhase::PerElementSetup => LoopPhase::QpEvaluate,
            LoopPhase::QpEvaluate => LoopPhase::LocalAccumulate,
            LoopPhase::LocalAccumulate => LoopPhase::GlobalScatter,
            LoopPhase::GlobalScatter => LoopPhase::Idle,
        }
    }

    /// Passes that skip the later phases return to `Idle` early.
    pub fn can_advance_to(self, to: LoopPhase) -> bool {
        to == self.next() || (to == LoopPhase::Idle && self != LoopPhase::Idle)
    }
}

/// Everything a pass reads. Nothing here is written during the pass.
pub struct AssemblyInput<'a> {
    pub mesh: &'a Mesh,
    pub dofs: &'a DofMap,
    pub solution: &'a SolutionHistory,
    pub aux_dofs: &'a DofMap,
    pub aux_solution: &'a SolutionHistory,
    pub warehouse: &'a Warehouse,
    pub properties: &'a PropertyWarehouse,
    pub stateful: &'a StatefulStore,
    pub postprocessor_values: &'a [f64],
    pub time: &'a TimeContext,
    pub options: &'a AssemblyOptions,
    pub pool: Option<&'a rayon::ThreadPool>,
}

impl<'a> AssemblyInput<'a> {
    fn field_sources(&self) -> FieldSources<'a> {
        FieldSources {
            dofs: self.dofs,
            solution: self.solution,
            aux_dofs: self.aux_dofs,
            aux_solution: self.aux_solution,
            dt: self.time.dt,
        }
    }
}

/// Counters of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyStats {
    pub elements: usize,
    pub subdomains: BTreeSet<SubdomainId>,
    pub constrained_rows: usize,
}

/// Result of a residual and/or Jacobian pass.
pub struct AssembledSystem {
    /// Global residual (zeros in Jacobian-only passes).
    pub residual: Vec<f64>,
    pub jacobian: Option<CsrMatrix>,
    pub n_dofs: usize,
    pub stats: AssemblyStats,
    /// Freshly computed stateful property values, in element order.
    pub stateful_updates: Vec<(ElementId, StatefulColumns)>,
}

/// Reusable per-chunk scratch space.
pub struct ElementWorkItem {
    phase: LoopPhase,
    coords: Vec<Point3>,
    dof_indices: Vec<usize>,
    fe: FeValues,
    side_fe: FeValues,
    fields: ElementFields,
    side_fields: ElementFields,
    material: MaterialData,
    local: LocalBlocks,
    qrules: Vec<(ElementType, Vec<GaussPoint>)>,
}

impl ElementWorkItem {
    pub fn new(table: &PropertyTable) -> Self {
        Self {
            phase: LoopPhase::Idle,
            coords: Vec::new(),
            dof_indices: Vec::new(),
            fe: FeValues::new(),
            side_fe: FeValues::new(),
            fields: ElementFields::new(),
            side_fields: ElementFields::new(),
            material: MaterialData::new(table),
            local: LocalBlocks::default(),
            qrules: Vec::new(),
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    fn advance(&mut self, to: LoopPhase) {
        debug_assert!(
            self.phase.can_advance_to(to),
            "invalid phase transition {:?} -> {:?}",
            self.phase,
            to
        );
        self.phase = to;
    }

    fn qrule_index(&mut self, ty: ElementType, order: usize) -> usize {
        if let Some(pos) = self.qrules.iter().position(|(t, _)| *t == ty) {
            return pos;
        }
        self.qrules.push((ty, create_element(ty).quadrature(order)));
        self.qrules.len() - 1
    }

    /// Geometry, shape functions and DOF indices.
    fn setup<'a>(&mut self, input: &AssemblyInput<'a>, elem: ElementId) -> Result<&'a ElementConnectivity> {
        self.advance(LoopPhase::PerElementSetup);
        let conn = input
            .mesh
            .element(elem)
            .ok_or_else(|| Error::Mesh(format!("element {elem} out of range")))?;
        input
            .mesh
            .element_coords_into(elem, &mut self.coords)
            .ok_or_else(|| Error::Mesh(format!("element {elem} references a missing node")))?;
        let pos = self.qrule_index(conn.element_type, input.options.quadrature_order);
        self.fe
            .reinit(create_element(conn.element_type), &self.coords, &self.qrules[pos].1)?;
        input.dofs.element_dofs_into(&conn.nodes, &mut self.dof_indices);
        Ok(conn)
    }

    /// Interpolate fields and run the subdomain's producers in order.
    fn evaluate(
        &mut self,
        input: &AssemblyInput<'_>,
        elem: ElementId,
        conn: &ElementConnectivity,
        seed: bool,
        init_stateful: bool,
    ) {
        self.advance(LoopPhase::QpEvaluate);
        self.fields.compute(&self.fe, &conn.nodes, input.field_sources(), seed);
        self.material.resize(self.fe.n_qp());
        if input.properties.has_stateful() {
            self.material.load_stateful(input.stateful, elem);
        }
        let warehouse = input.warehouse;
        for &m in warehouse.materials_on(conn.subdomain) {
            let producer = warehouse.material(m);
            for qp in 0..self.fe.n_qp() {
                let q = MaterialQp {
                    real: Qp::new(
                        qp,
                        &self.fe,
                        self.fields.real(),
                        &self.fields,
                        input.postprocessor_values,
                        input.time,
                    ),
                    dual: Qp::new(
                        qp,
                        &self.fe,
                        self.fields.dual(),
                        &self.fields,
                        input.postprocessor_values,
                        input.time,
                    ),
                };
                if init_stateful {
                    producer.init_qp_stateful_properties(&q, &mut self.material);
                } else {
                    producer.compute_qp_properties(&q, &mut self.material);
                }
            }
        }
    }

    /// Run kernels and integrated boundary conditions into the local blocks.
    fn accumulate(
        &mut self,
        input: &AssemblyInput<'_>,
        elem: ElementId,
        conn: &ElementConnectivity,
        mode: AssemblyMode,
        seed: bool,
    ) -> Result<()> {
        self.advance(LoopPhase::LocalAccumulate);
        let warehouse = input.warehouse;
        self.local.reset(conn.nodes.len(), input.dofs.n_vars());

        let ctx = ElementContext {
            fe: &self.fe,
            fields: &self.fields,
            props: &self.material,
            postprocessors: input.postprocessor_values,
            time: input.time,
        };
        for &k in warehouse.kernels_on(conn.subdomain) {
            contribute(&*warehouse.kernels()[k], &ctx, &mut self.local, mode);
        }

        let sides = warehouse.sides_of(elem);
        if sides.is_empty() {
            return Ok(());
        }
        let reference = create_element(conn.element_type);
        let mut current_side = None;
        for &(side, b) in sides {
            let bc = &*warehouse.integrated_bcs()[b];
            if !bc.info().is_active_on(conn.subdomain) {
                continue;
            }
            if current_side != Some(side) {
                let points = reference.side_quadrature(side, input.options.quadrature_order);
                self.side_fe.reinit_side(reference, &self.coords, &points)?;
                self.side_fields
                    .compute(&self.side_fe, &conn.nodes, input.field_sources(), seed);
                current_side = Some(side);
            }
            let ctx = ElementContext {
                fe: &self.side_fe,
                fields: &self.side_fields,
                props: &self.material,
                postprocessors: input.postprocessor_values,
                time: input.time,
            };
            contribute(bc, &ctx, &mut self.local, mode);
        }
        Ok(())
    }

    fn scatter<V: VectorBackend, M: MatrixBackend>(
        &mut self,
        mode: AssemblyMode,
        residual: &mut V,
        jacobian: &mut M,
    ) {
        self.advance(LoopPhase::GlobalScatter);
        if mode.residual() {
            residual.add_block(&self.dof_indices, self.local.residual().as_slice());
        }
        if mode.jacobian() {
            jacobian.add_block(&self.dof_indices, &self.dof_indices, self.local.jacobian());
        }
        self.advance(LoopPhase::Idle);
    }

    /// Snapshot stateful properties of the subdomain, if any.
    fn stateful_snapshot(&self, properties: &PropertyWarehouse, sub: SubdomainId) -> Option<StatefulColumns> {
        let ids = properties.stateful_on(sub);
        (!ids.is_empty()).then(|| self.material.snapshot(ids))
    }
}

fn contribute(
    object: &dyn JacobianContributor,
    ctx: &ElementContext<'_>,
    local: &mut LocalBlocks,
    mode: AssemblyMode,
) {
    match mode {
        AssemblyMode::Residual => object.add_residual(ctx, local),
        AssemblyMode::Jacobian => object.add_jacobian(ctx, local),
        AssemblyMode::ResidualAndJacobian => object.add_residual_and_jacobian(ctx, local),
    }
}

impl VectorBackend for Concat<(usize, f64)> {
    fn add(&mut self, row: usize, value: f64) {
        self.push((row, value));
    }
}

/// A backend shared between workers.
struct Shared<'m, T>(&'m Mutex<T>);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: VectorBackend> VectorBackend for Shared<'_, T> {
    fn add(&mut self, row: usize, value: f64) {
        lock(self.0).add(row, value);
    }

    fn add_block(&mut self, rows: &[usize], values: &[f64]) {
        lock(self.0).add_block(rows, values);
    }
}

impl<T: MatrixBackend> MatrixBackend for Shared<'_, T> {
    fn add(&mut self, row: usize, col: usize, value: f64) {
        lock(self.0).add(row, col, value);
    }

    fn add_block(&mut self, rows: &[usize], cols: &[usize], block: &nalgebra::DMatrix<f64>) {
        lock(self.0).add_block(rows, cols, block);
    }
}

/// Partial result of one chunk.
struct ChunkOutput {
    residual: Concat<(usize, f64)>,
    jacobian: TripletMatrix,
    subdomains: Union<SubdomainId>,
    stateful: Concat<(ElementId, StatefulColumns)>,
    elements: Sum<usize>,
}

impl ChunkOutput {
    fn new(n_dofs: usize) -> Self {
        Self {
            residual: Concat::default(),
            jacobian: TripletMatrix::new(n_dofs, n_dofs),
            subdomains: Union::default(),
            stateful: Concat::default(),
            elements: Sum(0),
        }
    }
}

impl Join for ChunkOutput {
    fn join(mut self, other: Self) -> Self {
        self.jacobian.append(&other.jacobian);
        Self {
            residual: self.residual.join(other.residual),
            jacobian: self.jacobian,
            subdomains: self.subdomains.join(other.subdomains),
            stateful: self.stateful.join(other.stateful),
            elements: self.elements.join(other.elements),
        }
    }
}

fn chunks(n: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..n).step_by(size).map(|s| s..(s + size).min(n)).collect()
}

/// Map `body` over the element partitions, keeping partition order.
fn run_chunks<T, F>(input: &AssemblyInput<'_>, body: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(Range<usize>) -> Result<T> + Sync,
{
    let ranges = chunks(input.mesh.n_elements(), input.options.chunk_size);
    let work = || {
        ranges
            .par_iter()
            .map(|r| body(r.clone()))
            .collect::<Result<Vec<T>>>()
    };
    match input.pool {
        Some(pool) => pool.install(work),
        None => work(),
    }
}

/// Assemble the global residual and/or Jacobian.
pub fn assemble(input: &AssemblyInput<'_>, mode: AssemblyMode) -> Result<AssembledSystem> {
    let n_dofs = input.dofs.n_dofs();
    if input.solution.len() != n_dofs {
        return Err(Error::Assembly(format!(
            "solution has {} entries, DOF map expects {}",
            input.solution.len(),
            n_dofs
        )));
    }
    let seed = mode.jacobian() && input.warehouse.any_ad();
    let table = input.properties.table();

    let shared = match input.options.scatter {
        ScatterStrategy::Ordered => None,
        ScatterStrategy::Locked => Some((
            Mutex::new(GlobalVector::zeros(n_dofs)),
            Mutex::new(TripletMatrix::new(n_dofs, n_dofs)),
        )),
    };

    let outputs = run_chunks(input, |range| {
        let mut work = ElementWorkItem::new(table);
        let mut out = ChunkOutput::new(n_dofs);
        for elem in range {
            let conn = work.setup(input, elem)?;
            work.evaluate(input, elem, conn, seed, false);
            work.accumulate(input, elem, conn, mode, seed)?;
            match &shared {
                None => work.scatter(mode, &mut out.residual, &mut out.jacobian),
                Some((r, j)) => work.scatter(mode, &mut Shared(r), &mut Shared(j)),
            }
            if let Some(columns) = work.stateful_snapshot(input.properties, conn.subdomain) {
                out.stateful.push((elem, columns));
            }
            out.subdomains.insert(conn.subdomain);
            out.elements.0 += 1;
        }
        Ok(out)
    })?;

    let total = outputs
        .into_iter()
        .fold(ChunkOutput::new(n_dofs), |acc, part| acc.join(part));

    let (mut residual, mut jacobian) = match shared {
        None => {
            let mut residual = GlobalVector::zeros(n_dofs);
            for &(row, value) in &total.residual.0 {
                residual.add(row, value);
            }
            (residual, total.jacobian)
        }
        Some((r, j)) => (
            r.into_inner().unwrap_or_else(PoisonError::into_inner),
            j.into_inner().unwrap_or_else(PoisonError::into_inner),
        ),
    };

    let constrained_rows = apply_nodal_bcs(input, mode, &mut residual, &mut jacobian);

    let stats = AssemblyStats {
        elements: total.elements.0,
        subdomains: total.subdomains.0,
        constrained_rows,
    };
    log::debug!(
        "{:?} pass: {} elements on {} subdomains, {} constrained rows",
        mode,
        stats.elements,
        stats.subdomains.len(),
        stats.constrained_rows
    );

    Ok(AssembledSystem {
        residual: residual.into_vec(),
        jacobian: mode.jacobian().then(|| jacobian.to_csr()),
        n_dofs,
        stats,
        stateful_updates: total.stateful.0,
    })
}

/// Replace constrained rows: residual `u - g`, Jacobian row the identity.
///
/// When several conditions constrain the same row, the last one added wins.
fn apply_nodal_bcs(
    input: &AssemblyInput<'_>,
    mode: AssemblyMode,
    residual: &mut GlobalVector,
    jacobian: &mut TripletMatrix,
) -> usize {
    let mut rows: BTreeMap<usize, f64> = BTreeMap::new();
    let nodes = input.mesh.nodes();
    for bc in input.warehouse.nodal_bcs() {
        for &b in bc.boundaries() {
            for &node in input.mesh.node_set(b) {
                let row = input.dofs.dof(node, bc.variable());
                rows.insert(row, bc.value(&nodes[node], input.time.time));
            }
        }
    }
    if rows.is_empty() {
        return 0;
    }

    if mode.residual() {
        let u = input.solution.current();
        let r = residual.as_mut_slice();
        for (&row, &g) in &rows {
            r[row] = u[row] - g;
        }
    }
    if mode.jacobian() {
        let set: HashSet<usize> = rows.keys().copied().collect();
        jacobian.zero_rows(&set);
        for &row in rows.keys() {
            jacobian.add(row, row, 1.0);
        }
    }
    rows.len()
}

/// Evaluate every element-integral postprocessor.
///
/// Returns `(slot, value)` pairs in registration order.
pub fn integrate_postprocessors(input: &AssemblyInput<'_>) -> Result<Vec<(PostprocessorId, f64)>> {
    let pps = input.warehouse.postprocessors();
    if pps.is_empty() {
        return Ok(Vec::new());
    }
    let table = input.properties.table();

    let partials = run_chunks(input, |range| {
        let mut work = ElementWorkItem::new(table);
        let mut acc = vec![IntegralPartial::default(); pps.len()];
        for elem in range {
            let conn = work.setup(input, elem)?;
            if !pps.iter().any(|(_, p)| p.is_active_on(conn.subdomain)) {
                work.advance(LoopPhase::Idle);
                continue;
            }
            work.evaluate(input, elem, conn, false, false);
            for (partial, (_, pp)) in acc.iter_mut().zip(pps) {
                if !pp.is_active_on(conn.subdomain) {
                    continue;
                }
                for qp in 0..work.fe.n_qp() {
                    let q = Qp::new(
                        qp,
                        &work.fe,
                        work.fields.real(),
                        &work.fields,
                        input.postprocessor_values,
                        input.time,
                    );
                    let jxw = q.jxw();
                    partial.add(jxw * pp.qp_integrand(&q, &work.material), jxw);
                }
            }
            work.advance(LoopPhase::Idle);
        }
        Ok(acc)
    })?;

    let total: Vec<IntegralPartial> = join_ordered(partials);
    Ok(pps
        .iter()
        .zip(total)
        .map(|((id, pp), part)| (*id, pp.finalize(part.integral.0, part.volume.0)))
        .collect())
}

/// Initial values of every stateful property, per element.
pub fn initial_stateful_values(input: &AssemblyInput<'_>) -> Result<Vec<(ElementId, StatefulColumns)>> {
    if !input.properties.has_stateful() {
        return Ok(Vec::new());
    }
    let table = input.properties.table();
    let parts = run_chunks(input, |range| {
        let mut work = ElementWorkItem::new(table);
        let mut out = Concat::default();
        for elem in range {
            let conn = work.setup(input, elem)?;
            work.evaluate(input, elem, conn, false, true);
            if let Some(columns) = work.stateful_snapshot(input.properties, conn.subdomain) {
                out.push((elem, columns));
            }
            work.advance(LoopPhase::Idle);
        }
        Ok(out)
    })?;
    Ok(join_ordered(parts).0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_phase_cycle() {
        let mut phase = LoopPhase::Idle;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(phase);
            phase = phase.next();
        }
        assert_eq!(phase, LoopPhase::Idle);
        assert_eq!(seen.len(), 5);
        assert!(LoopPhase::QpEvaluate.can_advance_to(LoopPhase::Idle));
        assert!(!LoopPhase::Idle.can_advance_to(LoopPhase::QpEvaluate));
        assert!(!LoopPhase::Idle.can_advance_to(LoopPhase::Idle));
    }

    #[test]
    fn test_chunks_depend_only_on_size() {
        let c = chunks(10, 4);
        assert_eq!(c, vec![0..4, 4..8, 8..10]);
        assert!(chunks(0, 4).is_empty());
        assert_eq!(chunks(3, 0), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_options_from_json() {
        let opts = AssemblyOptions::from_json(r#"{"n_threads": 4, "scatter": "locked"}"#).unwrap();
        assert_eq!(opts.n_threads, 4);
        assert_eq!(opts.scatter, ScatterStrategy::Locked);
        assert_eq!(opts.chunk_size, AssemblyOptions::default().chunk_size);

        let err = AssemblyOptions::from_json(r#"{"chunk_size": 0}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let err = AssemblyOptions::from_json("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_mode_flags() {
        assert!(AssemblyMode::Residual.residual());
        assert!(!AssemblyMode::Residual.jacobian());
        assert!(!AssemblyMode::Jacobian.residual());
        assert!(AssemblyMode::ResidualAndJacobian.residual());
        assert!(AssemblyMode::ResidualAndJacobian.jacobian());
    }

    #[test]
    fn test_chunk_outputs_join_in_order() {
        let mut a = ChunkOutput::new(3);
        a.residual.add(0, 1.0);
        a.jacobian.add(0, 0, 2.0);
        a.subdomains.insert(1);
        a.elements.0 = 2;
        let mut b = ChunkOutput::new(3);
        b.residual.add(2, 3.0);
        b.jacobian.add(2, 1, 4.0);
        b.subdomains.insert(0);
        b.elements.0 = 1;

        let total = a.join(b);
        assert_eq!(total.residual.0, vec![(0, 1.0), (2, 3.0)]);
        assert_eq!(total.jacobian.nnz(), 2);
        assert_eq!(total.elements.0, 3);
        assert_eq!(total.subdomains.0, BTreeSet::from([0, 1]));
    }
}
