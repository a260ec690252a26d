//! Material properties: declaration, dependency ordering and storage.
//!
//! Properties are per-quadrature-point arrays identified by name. During
//! object construction producers *declare* properties and consumers *get*
//! them; both go through the [`PropertyRegistry`], which assigns a
//! [`PropertyId`] on first mention and pins the value type. Once every object
//! is built, [`PropertyRegistry::finalize`] checks producers and consumers per
//! subdomain and sorts producers so each runs after the producers it reads
//! from. The result is an immutable [`PropertyWarehouse`].
//!
//! At evaluation time each worker owns a [`MaterialData`] with one column per
//! property. Properties read in their old or older state are *stateful*: their
//! per-element history lives in a [`StatefulStore`] that is only mutated
//! between element passes.

use crate::error::{Error, Result};
use crate::types::{ElementId, SubdomainId, TimeState};
use std::any::{Any, TypeId};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

/// Values that can be stored as a property.
pub trait PropertyValue: Clone + Default + Send + Sync + 'static {}

impl<T: Clone + Default + Send + Sync + 'static> PropertyValue for T {}

/// Dense property identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub usize);

/// Typed read handle for one property in one time state.
pub struct PropertyHandle<T> {
    id: PropertyId,
    state: TimeState,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PropertyHandle<T> {
    fn new(id: PropertyId, state: TimeState) -> Self {
        Self {
            id,
            state,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    pub fn state(&self) -> TimeState {
        self.state
    }
}

impl<T> Clone for PropertyHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PropertyHandle<T> {}

impl<T> fmt::Debug for PropertyHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

/// Write handle returned to the producer that declared a property.
///
/// Only the current state is writable; old and older values are never
/// reachable for writing.
pub struct DeclaredProperty<T> {
    handle: PropertyHandle<T>,
}

impl<T> DeclaredProperty<T> {
    /// Read handle for the current value.
    pub fn handle(&self) -> PropertyHandle<T> {
        self.handle
    }

    pub fn id(&self) -> PropertyId {
        self.handle.id
    }
}

impl<T> fmt::Debug for DeclaredProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeclaredProperty").field(&self.handle.id).finish()
    }
}

/// Handle to a property that may or may not exist.
///
/// Resolved once by [`PropertyRegistry::resolve_optional_properties`]; until
/// then (and forever, if nobody produces it) it reads as absent.
pub struct OptionalProperty<T> {
    slot: Arc<OnceLock<Option<PropertyHandle<T>>>>,
}

impl<T> OptionalProperty<T> {
    pub fn get(&self) -> Option<PropertyHandle<T>> {
        self.slot.get().copied().flatten()
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<T> Clone for OptionalProperty<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for OptionalProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionalProperty")
            .field("resolved", &self.slot.get().map(|h| h.map(|h| h.id)))
            .finish()
    }
}

trait OptionalSlot: Send + Sync {
    fn fill(&self, id: Option<PropertyId>, state: TimeState);
}

impl<T> OptionalSlot for OnceLock<Option<PropertyHandle<T>>> {
    fn fill(&self, id: Option<PropertyId>, state: TimeState) {
        // a second resolution keeps the first answer
        let _ = self.set(id.map(|id| PropertyHandle::new(id, state)));
    }
}

/// Type-erased per-qp array.
pub trait PropertyColumn: Send + Sync {
    fn resize_column(&mut self, n: usize);

    fn column_len(&self) -> usize;

    fn clone_column(&self) -> Box<dyn PropertyColumn>;

    /// Overwrite with the contents of `other`, reusing the allocation.
    fn copy_from(&mut self, other: &dyn PropertyColumn);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: PropertyValue> PropertyColumn for Vec<T> {
    fn resize_column(&mut self, n: usize) {
        self.resize(n, T::default());
    }

    fn column_len(&self) -> usize {
        self.len()
    }

    fn clone_column(&self) -> Box<dyn PropertyColumn> {
        Box::new(self.clone())
    }

    fn copy_from(&mut self, other: &dyn PropertyColumn) {
        if let Some(src) = other.as_any().downcast_ref::<Vec<T>>() {
            self.clone_from(src);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn new_column<T: PropertyValue>() -> Box<dyn PropertyColumn> {
    Box::new(Vec::<T>::new())
}

/// Name and type of one property.
#[derive(Clone)]
pub struct PropertyInfo {
    pub name: String,
    type_id: TypeId,
    pub type_name: &'static str,
    make_column: fn() -> Box<dyn PropertyColumn>,
}

impl fmt::Debug for PropertyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyInfo")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// The object on whose behalf a property is declared or requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// Global registration index; also the tie-breaker when sorting.
    pub index: usize,
    pub name: String,
    /// Subdomains the object is active on; empty means all.
    pub blocks: Vec<SubdomainId>,
}

impl ObjectRef {
    pub fn is_active_on(&self, subdomain: SubdomainId) -> bool {
        self.blocks.is_empty() || self.blocks.contains(&subdomain)
    }
}

#[derive(Debug, Clone)]
struct Declaration {
    object: ObjectRef,
    property: PropertyId,
}

#[derive(Debug, Clone)]
struct Request {
    object: ObjectRef,
    property: PropertyId,
    state: TimeState,
}

struct PendingOptional {
    object: ObjectRef,
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    make_column: fn() -> Box<dyn PropertyColumn>,
    state: TimeState,
    slot: Arc<dyn OptionalSlot>,
}

/// Setup-time bookkeeping of every declared and requested property.
#[derive(Default)]
pub struct PropertyRegistry {
    properties: Vec<PropertyInfo>,
    by_name: HashMap<String, PropertyId>,
    declarations: Vec<Declaration>,
    requests: Vec<Request>,
    optional: Vec<PendingOptional>,
    optional_resolved: bool,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_properties(&self) -> usize {
        self.properties.len()
    }

    pub fn info(&self, id: PropertyId) -> &PropertyInfo {
        &self.properties[id.0]
    }

    pub fn lookup(&self, name: &str) -> Option<PropertyId> {
        self.by_name.get(name).copied()
    }

    fn id_for(
        &mut self,
        name: &str,
        type_id: TypeId,
        type_name: &'static str,
        make_column: fn() -> Box<dyn PropertyColumn>,
    ) -> Result<PropertyId> {
        if let Some(&id) = self.by_name.get(name) {
            let info = &self.properties[id.0];
            if info.type_id != type_id {
                return Err(Error::TypeMismatch {
                    name: name.to_string(),
                    expected: info.type_name.to_string(),
                    found: type_name.to_string(),
                });
            }
            return Ok(id);
        }
        let id = PropertyId(self.properties.len());
        self.properties.push(PropertyInfo {
            name: name.to_string(),
            type_id,
            type_name,
            make_column,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    fn typed_id<T: PropertyValue>(&mut self, name: &str) -> Result<PropertyId> {
        self.id_for(
            name,
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            new_column::<T>,
        )
    }

    /// Declare `name` as produced by `object`.
    pub fn declare<T: PropertyValue>(
        &mut self,
        object: &ObjectRef,
        name: &str,
    ) -> Result<DeclaredProperty<T>> {
        let id = self.typed_id::<T>(name)?;
        self.declarations.push(Declaration {
            object: object.clone(),
            property: id,
        });
        Ok(DeclaredProperty {
            handle: PropertyHandle::new(id, TimeState::Current),
        })
    }

    /// Request `name` in `state` on behalf of `object`.
    pub fn get<T: PropertyValue>(
        &mut self,
        object: &ObjectRef,
        name: &str,
        state: TimeState,
    ) -> Result<PropertyHandle<T>> {
        let id = self.typed_id::<T>(name)?;
        self.requests.push(Request {
            object: object.clone(),
            property: id,
            state,
        });
        Ok(PropertyHandle::new(id, state))
    }

    /// Request `name` if some producer declares it.
    pub fn get_optional<T: PropertyValue>(
        &mut self,
        object: &ObjectRef,
        name: &str,
        state: TimeState,
    ) -> Result<OptionalProperty<T>> {
        let slot: Arc<OnceLock<Option<PropertyHandle<T>>>> = Arc::new(OnceLock::new());
        let erased: Arc<dyn OptionalSlot> = slot.clone();
        self.optional.push(PendingOptional {
            object: object.clone(),
            name: name.to_string(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            make_column: new_column::<T>,
            state,
            slot: erased,
        });
        Ok(OptionalProperty { slot })
    }

    /// Whether `object` requested any property.
    pub fn has_requests_from(&self, object: usize) -> bool {
        self.requests.iter().any(|r| r.object.index == object)
            || self.optional.iter().any(|o| o.object.index == object)
    }

    /// Whether `object` declared any property.
    pub fn has_declarations_from(&self, object: usize) -> bool {
        self.declarations.iter().any(|d| d.object.index == object)
    }

    /// Forget everything recorded for `object` (its construction failed).
    pub fn discard_object(&mut self, object: usize) {
        self.declarations.retain(|d| d.object.index != object);
        self.requests.retain(|r| r.object.index != object);
        self.optional.retain(|o| o.object.index != object);
    }

    fn produced_on(&self, property: PropertyId, subdomain: SubdomainId) -> bool {
        self.declarations
            .iter()
            .any(|d| d.property == property && d.object.is_active_on(subdomain))
    }

    /// Bind every optional request to a real property or to "absent".
    ///
    /// A request resolves to the property when it is declared on every
    /// subdomain the requesting object is active on. Runs once; later calls
    /// are no-ops.
    pub fn resolve_optional_properties(
        &mut self,
        subdomains: &BTreeSet<SubdomainId>,
    ) -> Result<()> {
        if self.optional_resolved {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.optional);
        for p in &pending {
            let existing = self.lookup(&p.name);
            let resolved = match existing {
                Some(id) => {
                    let id = self.id_for(&p.name, p.type_id, p.type_name, p.make_column)?;
                    let everywhere = subdomains
                        .iter()
                        .filter(|&&s| p.object.is_active_on(s))
                        .all(|&s| self.produced_on(id, s));
                    everywhere.then_some(id)
                }
                None => None,
            };
            if let Some(id) = resolved {
                self.requests.push(Request {
                    object: p.object.clone(),
                    property: id,
                    state: p.state,
                });
            }
            log::debug!(
                "optional property '{}' for '{}' resolved as {}",
                p.name,
                p.object.name,
                if resolved.is_some() { "present" } else { "absent" }
            );
            p.slot.fill(resolved, p.state);
        }
        self.optional_resolved = true;
        Ok(())
    }

    /// Check producers and consumers on every subdomain and sort producers.
    pub fn finalize(&mut self, subdomains: &BTreeSet<SubdomainId>) -> Result<PropertyWarehouse> {
        self.resolve_optional_properties(subdomains)?;

        let stateful: BTreeSet<PropertyId> = self
            .requests
            .iter()
            .filter(|r| r.state != TimeState::Current)
            .map(|r| r.property)
            .collect();

        let mut order = BTreeMap::new();
        let mut stateful_on = BTreeMap::new();
        for &sub in subdomains {
            let producer_of = self.producers_on(sub)?;
            self.check_consumers(sub, &producer_of)?;
            order.insert(sub, self.sort_producers(sub, &producer_of)?);
            stateful_on.insert(
                sub,
                producer_of
                    .keys()
                    .filter(|id| stateful.contains(id))
                    .copied()
                    .collect::<Vec<_>>(),
            );
        }

        let table = PropertyTable {
            properties: self.properties.clone(),
            stateful: (0..self.properties.len())
                .map(|i| stateful.contains(&PropertyId(i)))
                .collect(),
        };
        log::info!(
            "material properties: {} declared, {} stateful",
            self.properties.len(),
            stateful.len()
        );
        Ok(PropertyWarehouse {
            table: Arc::new(table),
            order,
            stateful_on,
        })
    }

    fn producers_on(&self, sub: SubdomainId) -> Result<BTreeMap<PropertyId, &ObjectRef>> {
        let mut producer_of: BTreeMap<PropertyId, &ObjectRef> = BTreeMap::new();
        for d in self.declarations.iter().filter(|d| d.object.is_active_on(sub)) {
            if let Some(first) = producer_of.get(&d.property) {
                if first.index != d.object.index {
                    return Err(Error::DuplicateProperty {
                        property: self.properties[d.property.0].name.clone(),
                        first: first.name.clone(),
                        second: d.object.name.clone(),
                        subdomain: sub,
                    });
                }
            }
            producer_of.entry(d.property).or_insert(&d.object);
        }
        Ok(producer_of)
    }

    fn check_consumers(
        &self,
        sub: SubdomainId,
        producer_of: &BTreeMap<PropertyId, &ObjectRef>,
    ) -> Result<()> {
        for r in self.requests.iter().filter(|r| r.object.is_active_on(sub)) {
            if !producer_of.contains_key(&r.property) {
                return Err(Error::MissingProperty {
                    property: self.properties[r.property.0].name.clone(),
                    consumer: r.object.name.clone(),
                    subdomain: sub,
                });
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over producers active on `sub`; ties go to the
    /// earlier-registered producer.
    fn sort_producers(
        &self,
        sub: SubdomainId,
        producer_of: &BTreeMap<PropertyId, &ObjectRef>,
    ) -> Result<Vec<usize>> {
        let nodes: BTreeSet<usize> = producer_of.values().map(|o| o.index).collect();

        // (from, to) -> property carrying the dependency
        let mut edges: BTreeMap<(usize, usize), PropertyId> = BTreeMap::new();
        for r in self.requests.iter() {
            if r.state != TimeState::Current || !nodes.contains(&r.object.index) {
                continue;
            }
            if !r.object.is_active_on(sub) {
                continue;
            }
            if let Some(from) = producer_of.get(&r.property) {
                edges.entry((from.index, r.object.index)).or_insert(r.property);
            }
        }

        let mut in_degree: BTreeMap<usize, usize> = nodes.iter().map(|&n| (n, 0)).collect();
        for &(_, to) in edges.keys() {
            *in_degree.entry(to).or_default() += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(&n, _)| Reverse(n))
            .collect();
        let mut sorted = Vec::with_capacity(nodes.len());
        while let Some(Reverse(n)) = ready.pop() {
            sorted.push(n);
            for (&(from, to), _) in edges.range((n, 0)..=(n, usize::MAX)) {
                debug_assert_eq!(from, n);
                if let Some(d) = in_degree.get_mut(&to) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(Reverse(to));
                    }
                }
            }
        }

        if sorted.len() < nodes.len() {
            let placed: BTreeSet<usize> = sorted.iter().copied().collect();
            let remaining: BTreeSet<usize> = nodes.difference(&placed).copied().collect();
            return Err(Error::DependencyCycle {
                subdomain: sub,
                chain: self.cycle_chain(&remaining, &edges),
            });
        }
        Ok(sorted)
    }

    /// Property names along one cycle among `remaining`, first name repeated
    /// at the end.
    fn cycle_chain(
        &self,
        remaining: &BTreeSet<usize>,
        edges: &BTreeMap<(usize, usize), PropertyId>,
    ) -> Vec<String> {
        // Every remaining node has a remaining predecessor, so walking
        // predecessors must revisit a node.
        let predecessor = |n: usize| {
            edges
                .iter()
                .find(|(edge, _)| edge.1 == n && remaining.contains(&edge.0))
                .map(|(&(from, _), &prop)| (from, prop))
        };

        let Some(&start) = remaining.iter().next() else {
            return Vec::new();
        };
        let mut path: Vec<(usize, PropertyId)> = Vec::new();
        let mut seen: HashMap<usize, usize> = HashMap::new();
        let mut node = start;
        while !seen.contains_key(&node) {
            seen.insert(node, path.len());
            match predecessor(node) {
                Some((from, prop)) => {
                    path.push((node, prop));
                    node = from;
                }
                None => break,
            }
        }
        let begin = seen.get(&node).copied().unwrap_or(0);
        let mut chain: Vec<String> = path[begin..]
            .iter()
            .rev()
            .map(|&(_, prop)| self.properties[prop.0].name.clone())
            .collect();
        if let Some(first) = chain.first().cloned() {
            chain.push(first);
        }
        chain
    }
}

/// Names, types and stateful flags of all properties; shared read-only.
#[derive(Debug, Clone)]
pub struct PropertyTable {
    properties: Vec<PropertyInfo>,
    stateful: Vec<bool>,
}

impl PropertyTable {
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn is_stateful(&self, id: PropertyId) -> bool {
        self.stateful[id.0]
    }

    pub fn name(&self, id: PropertyId) -> &str {
        &self.properties[id.0].name
    }
}

/// Validated, sorted property layout for a run.
#[derive(Debug, Clone)]
pub struct PropertyWarehouse {
    table: Arc<PropertyTable>,
    order: BTreeMap<SubdomainId, Vec<usize>>,
    stateful_on: BTreeMap<SubdomainId, Vec<PropertyId>>,
}

impl PropertyWarehouse {
    pub fn table(&self) -> &Arc<PropertyTable> {
        &self.table
    }

    /// Producer object indices in evaluation order for `sub`.
    pub fn evaluation_order(&self, sub: SubdomainId) -> &[usize] {
        self.order.get(&sub).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stateful properties produced on `sub`.
    pub fn stateful_on(&self, sub: SubdomainId) -> &[PropertyId] {
        self.stateful_on.get(&sub).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_stateful(&self) -> bool {
        self.stateful_on.values().any(|v| !v.is_empty())
    }
}

/// Stateful columns of one element, keyed by property.
pub type StatefulColumns = Vec<(PropertyId, Box<dyn PropertyColumn>)>;

/// Per-thread property arrays for the element being evaluated.
pub struct MaterialData {
    n_qp: usize,
    current: Vec<Box<dyn PropertyColumn>>,
    old: Vec<Box<dyn PropertyColumn>>,
    older: Vec<Box<dyn PropertyColumn>>,
}

impl MaterialData {
    pub fn new(table: &PropertyTable) -> Self {
        let make = || -> Vec<Box<dyn PropertyColumn>> {
            table.properties.iter().map(|p| (p.make_column)()).collect()
        };
        Self {
            n_qp: 0,
            current: make(),
            old: make(),
            older: make(),
        }
    }

    pub fn n_qp(&self) -> usize {
        self.n_qp
    }

    /// Size current columns for `n_qp` points.
    pub fn resize(&mut self, n_qp: usize) {
        self.n_qp = n_qp;
        for col in &mut self.current {
            col.resize_column(n_qp);
        }
    }

    fn column(&self, id: PropertyId, state: TimeState) -> &dyn PropertyColumn {
        match state {
            TimeState::Current => &*self.current[id.0],
            TimeState::Old => &*self.old[id.0],
            TimeState::Older => &*self.older[id.0],
        }
    }

    /// All qp values of a property.
    pub fn values<T: PropertyValue>(&self, handle: &PropertyHandle<T>) -> &[T] {
        self.column(handle.id, handle.state)
            .as_any()
            .downcast_ref::<Vec<T>>()
            .expect("property type checked at declaration")
    }

    #[inline]
    pub fn get<T: PropertyValue>(&self, handle: &PropertyHandle<T>, qp: usize) -> &T {
        &self.values(handle)[qp]
    }

    /// Mutable current values of a declared property.
    pub fn values_mut<T: PropertyValue>(&mut self, prop: &DeclaredProperty<T>) -> &mut [T] {
        self.current[prop.id().0]
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .expect("property type checked at declaration")
    }

    #[inline]
    pub fn set<T: PropertyValue>(&mut self, prop: &DeclaredProperty<T>, qp: usize, value: T) {
        self.values_mut(prop)[qp] = value;
    }

    /// Copy the stored old/older history of `elem` into this work area.
    pub fn load_stateful(&mut self, store: &StatefulStore, elem: ElementId) {
        let (Some(old), Some(older)) = (store.old.get(elem), store.older.get(elem)) else {
            return;
        };
        for ((id, o), (_, oo)) in old.iter().zip(older.iter()) {
            self.old[id.0].copy_from(&**o);
            self.older[id.0].copy_from(&**oo);
        }
    }

    /// Snapshot the current values of `ids`.
    pub fn snapshot(&self, ids: &[PropertyId]) -> StatefulColumns {
        ids.iter()
            .map(|&id| (id, self.current[id.0].clone_column()))
            .collect()
    }
}

/// Old/older history of stateful properties, per element.
#[derive(Default)]
pub struct StatefulStore {
    current: Vec<StatefulColumns>,
    old: Vec<StatefulColumns>,
    older: Vec<StatefulColumns>,
    computed_since_shift: bool,
}

impl StatefulStore {
    pub fn new(n_elements: usize) -> Self {
        Self {
            current: (0..n_elements).map(|_| Vec::new()).collect(),
            old: (0..n_elements).map(|_| Vec::new()).collect(),
            older: (0..n_elements).map(|_| Vec::new()).collect(),
            computed_since_shift: false,
        }
    }

    /// Seed all three states of `elem` with its initial values.
    pub fn initialize(&mut self, elem: ElementId, columns: StatefulColumns) {
        let dup = |c: &StatefulColumns| -> StatefulColumns {
            c.iter().map(|(id, col)| (*id, col.clone_column())).collect()
        };
        self.old[elem] = dup(&columns);
        self.older[elem] = dup(&columns);
        self.current[elem] = columns;
    }

    /// Record freshly computed current values of `elem`.
    pub fn install(&mut self, elem: ElementId, columns: StatefulColumns) {
        self.current[elem] = columns;
        self.computed_since_shift = true;
    }

    /// `older ← old`, `old ← current`.
    ///
    /// Buffers are rotated, not reallocated. Returns `false` (and changes
    /// nothing) when no values were installed since the last shift.
    pub fn shift(&mut self) -> bool {
        if !self.computed_since_shift {
            return false;
        }
        std::mem::swap(&mut self.older, &mut self.old);
        std::mem::swap(&mut self.old, &mut self.current);
        // current now holds stale older buffers; refill from old
        for (cur, old) in self.current.iter_mut().zip(self.old.iter()) {
            if cur.len() != old.len() {
                *cur = old.iter().map(|(id, c)| (*id, c.clone_column())).collect();
                continue;
            }
            for ((_, c), (_, o)) in cur.iter_mut().zip(old.iter()) {
                c.copy_from(&**o);
            }
        }
        self.computed_since_shift = false;
        true
    }

    /// Typed view of one stored state, for inspection and tests.
    pub fn values<T: PropertyValue>(
        &self,
        elem: ElementId,
        id: PropertyId,
        state: TimeState,
    ) -> Option<&[T]> {
        let states = match state {
            TimeState::Current => &self.current,
            TimeState::Old => &self.old,
            TimeState::Older => &self.older,
        };
        states
            .get(elem)?
            .iter()
            .find(|(pid, _)| *pid == id)
            .and_then(|(_, col)| col.as_any().downcast_ref::<Vec<T>>())
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn obj(index: usize, name: &str) -> ObjectRef {
        ObjectRef {
            index,
            name: name.to_string(),
            blocks: Vec::new(),
        }
    }

    fn one_block() -> BTreeSet<SubdomainId> {
        BTreeSet::from([0])
    }

    #[test]
    fn test_type_is_pinned_on_first_mention() {
        let mut reg = PropertyRegistry::new();
        reg.declare::<f64>(&obj(0, "m"), "k").unwrap();
        let err = reg
            .get::<Vec<f64>>(&obj(1, "kern"), "k", TimeState::Current)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_missing_and_duplicate_producers() {
        let mut reg = PropertyRegistry::new();
        reg.get::<f64>(&obj(0, "kern"), "k", TimeState::Current).unwrap();
        let err = reg.finalize(&one_block()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingProperty);

        let mut reg = PropertyRegistry::new();
        reg.declare::<f64>(&obj(0, "a"), "k").unwrap();
        reg.declare::<f64>(&obj(1, "b"), "k").unwrap();
        let err = reg.finalize(&one_block()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateProperty);
    }

    #[test]
    fn test_block_restricted_producers_do_not_clash() {
        let mut reg = PropertyRegistry::new();
        let mut a = obj(0, "a");
        a.blocks = vec![0];
        let mut b = obj(1, "b");
        b.blocks = vec![1];
        reg.declare::<f64>(&a, "k").unwrap();
        reg.declare::<f64>(&b, "k").unwrap();
        reg.get::<f64>(&obj(2, "kern"), "k", TimeState::Current).unwrap();
        let wh = reg.finalize(&BTreeSet::from([0, 1])).unwrap();
        assert_eq!(wh.evaluation_order(0), &[0]);
        assert_eq!(wh.evaluation_order(1), &[1]);
    }

    #[test]
    fn test_cycle_names_properties() {
        let mut reg = PropertyRegistry::new();
        reg.declare::<f64>(&obj(0, "A"), "a").unwrap();
        reg.get::<f64>(&obj(0, "A"), "b", TimeState::Current).unwrap();
        reg.declare::<f64>(&obj(1, "B"), "b").unwrap();
        reg.get::<f64>(&obj(1, "B"), "a", TimeState::Current).unwrap();

        match reg.finalize(&one_block()).unwrap_err() {
            Error::DependencyCycle { chain, .. } => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain.first(), chain.last());
                assert!(chain.contains(&"a".to_string()));
                assert!(chain.contains(&"b".to_string()));
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_old_state_reads_do_not_create_edges() {
        let mut reg = PropertyRegistry::new();
        reg.declare::<f64>(&obj(0, "acc"), "q").unwrap();
        reg.get::<f64>(&obj(0, "acc"), "q", TimeState::Old).unwrap();
        let wh = reg.finalize(&one_block()).unwrap();
        assert_eq!(wh.evaluation_order(0), &[0]);
        assert!(wh.table().is_stateful(PropertyId(0)));
        assert_eq!(wh.stateful_on(0), &[PropertyId(0)]);
    }

    #[test]
    fn test_random_dags_sort_topologically() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let n = rng.gen_range(2..12);
            // Random DAG over a shuffled rank so registration order is not
            // already topological.
            let mut rank: Vec<usize> = (0..n).collect();
            for i in (1..n).rev() {
                let j = rng.gen_range(0..=i);
                rank.swap(i, j);
            }
            let mut reg = PropertyRegistry::new();
            let mut deps = Vec::new();
            for i in 0..n {
                reg.declare::<f64>(&obj(i, &format!("m{i}")), &format!("p{i}")).unwrap();
            }
            for i in 0..n {
                for j in 0..n {
                    if rank[j] < rank[i] && rng.gen_bool(0.3) {
                        reg.get::<f64>(&obj(i, &format!("m{i}")), &format!("p{j}"), TimeState::Current)
                            .unwrap();
                        deps.push((j, i));
                    }
                }
            }
            let wh = reg.finalize(&one_block()).unwrap();
            let order = wh.evaluation_order(0);
            assert_eq!(order.len(), n);
            let pos = |x: usize| order.iter().position(|&o| o == x).unwrap();
            for (from, to) in deps {
                assert!(pos(from) < pos(to), "{from} must run before {to}");
            }
        }
    }

    #[test]
    fn test_random_cycles_are_detected() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let n = rng.gen_range(2..8);
            let mut reg = PropertyRegistry::new();
            for i in 0..n {
                reg.declare::<f64>(&obj(i, &format!("m{i}")), &format!("p{i}")).unwrap();
            }
            // ring i -> i+1 -> ... -> i
            for i in 0..n {
                let prev = (i + n - 1) % n;
                reg.get::<f64>(&obj(i, &format!("m{i}")), &format!("p{prev}"), TimeState::Current)
                    .unwrap();
            }
            let err = reg.finalize(&one_block()).unwrap_err();
            match err {
                Error::DependencyCycle { chain, .. } => assert_eq!(chain.len(), n + 1),
                other => panic!("expected cycle, got {other}"),
            }
        }
    }

    #[test]
    fn test_optional_property_resolution() {
        let mut reg = PropertyRegistry::new();
        reg.declare::<f64>(&obj(0, "m"), "present").unwrap();
        let there = reg.get_optional::<f64>(&obj(1, "k"), "present", TimeState::Current).unwrap();
        let gone = reg.get_optional::<f64>(&obj(1, "k"), "absent", TimeState::Current).unwrap();
        assert!(!there.is_resolved());

        reg.resolve_optional_properties(&one_block()).unwrap();
        assert_eq!(there.get().map(|h| h.id()), reg.lookup("present"));
        assert!(gone.is_resolved());
        assert!(gone.get().is_none());

        // declaring later does not revive an absent handle
        reg.declare::<f64>(&obj(2, "late"), "absent").unwrap();
        reg.resolve_optional_properties(&one_block()).unwrap();
        assert!(gone.get().is_none());
    }

    #[test]
    fn test_material_data_and_stateful_shift() {
        let mut reg = PropertyRegistry::new();
        let o = obj(0, "m");
        let q = reg.declare::<f64>(&o, "q").unwrap();
        let q_old = reg.get::<f64>(&o, "q", TimeState::Old).unwrap();
        let wh = reg.finalize(&one_block()).unwrap();

        let mut data = MaterialData::new(wh.table());
        data.resize(2);
        data.set(&q, 0, 1.0);
        data.set(&q, 1, 2.0);

        let mut store = StatefulStore::new(1);
        store.initialize(0, data.snapshot(wh.stateful_on(0)));

        data.set(&q, 0, 5.0);
        store.install(0, data.snapshot(wh.stateful_on(0)));
        assert!(store.shift());
        assert_eq!(store.values::<f64>(0, q.id(), TimeState::Old).unwrap(), &[5.0, 2.0]);
        assert_eq!(store.values::<f64>(0, q.id(), TimeState::Older).unwrap(), &[1.0, 2.0]);

        // nothing computed since: second shift is a no-op
        assert!(!store.shift());
        assert_eq!(store.values::<f64>(0, q.id(), TimeState::Old).unwrap(), &[5.0, 2.0]);
        assert_eq!(store.values::<f64>(0, q.id(), TimeState::Older).unwrap(), &[1.0, 2.0]);

        data.load_stateful(&store, 0);
        assert_eq!(data.values(&q_old), &[5.0, 2.0]);
    }
}
