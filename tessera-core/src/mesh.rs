//! Mesh data structure for assembly.
//!
//! Stores nodal coordinates, element connectivity with subdomain ids, and
//! boundary node sets / side sets. The assembly core only consumes element
//! ranges, coordinates, subdomain ids and boundary lookups from here; mesh
//! generation and I/O live elsewhere. The two `uniform_*` builders exist for
//! tests and small demos.

use crate::element::create_element;
use crate::error::{Error, Result};
use crate::types::{BoundaryId, ElementId, Point3, SubdomainId};
use nalgebra::Vector3;
use std::collections::{BTreeMap, BTreeSet};

/// Element connectivity - node indices for an element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementConnectivity {
    /// Element type identifier.
    pub element_type: ElementType,
    /// Node indices (0-based).
    pub nodes: Vec<usize>,
    /// Subdomain (block) the element belongs to.
    pub subdomain: SubdomainId,
}

/// Supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 2-node line.
    Edge2,
    /// 4-node bilinear quadrilateral.
    Quad4,
}

impl ElementType {
    /// Number of nodes for this element type.
    pub fn n_nodes(self) -> usize {
        match self {
            ElementType::Edge2 => 2,
            ElementType::Quad4 => 4,
        }
    }

    /// Spatial dimension.
    pub fn dimension(self) -> usize {
        match self {
            ElementType::Edge2 => 1,
            ElementType::Quad4 => 2,
        }
    }
}

/// Finite element mesh.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Nodal coordinates.
    nodes: Vec<Point3>,
    /// Element connectivity.
    elements: Vec<ElementConnectivity>,
    node_sets: BTreeMap<BoundaryId, Vec<usize>>,
    side_sets: BTreeMap<BoundaryId, Vec<(ElementId, usize)>>,
}

impl Mesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(n_nodes: usize, n_elements: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(n_nodes),
            elements: Vec::with_capacity(n_elements),
            ..Self::default()
        }
    }

    /// Add a node to the mesh, returning its index.
    pub fn add_node(&mut self, point: Point3) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(point);
        idx
    }

    /// Add multiple nodes at once.
    pub fn add_nodes(&mut self, points: impl IntoIterator<Item = Point3>) {
        self.nodes.extend(points);
    }

    /// Add an element on subdomain 0.
    pub fn add_element(&mut self, element_type: ElementType, nodes: Vec<usize>) -> Result<usize> {
        self.add_element_in(element_type, nodes, 0)
    }

    /// Add an element on a given subdomain.
    pub fn add_element_in(
        &mut self,
        element_type: ElementType,
        nodes: Vec<usize>,
        subdomain: SubdomainId,
    ) -> Result<usize> {
        if nodes.len() != element_type.n_nodes() {
            return Err(Error::Mesh(format!(
                "Element type {:?} requires {} nodes, got {}",
                element_type,
                element_type.n_nodes(),
                nodes.len()
            )));
        }

        for &node_idx in &nodes {
            if node_idx >= self.nodes.len() {
                return Err(Error::Mesh(format!(
                    "Node index {} out of bounds (mesh has {} nodes)",
                    node_idx,
                    self.nodes.len()
                )));
            }
        }

        let idx = self.elements.len();
        self.elements.push(ElementConnectivity {
            element_type,
            nodes,
            subdomain,
        });
        Ok(idx)
    }

    /// Move an element to another subdomain.
    pub fn set_subdomain(&mut self, elem: ElementId, subdomain: SubdomainId) -> Result<()> {
        let e = self
            .elements
            .get_mut(elem)
            .ok_or_else(|| Error::Mesh(format!("Element index {} out of bounds", elem)))?;
        e.subdomain = subdomain;
        Ok(())
    }

    /// Append nodes to a boundary node set.
    pub fn add_node_set(&mut self, boundary: BoundaryId, nodes: &[usize]) -> Result<()> {
        if let Some(&bad) = nodes.iter().find(|&&n| n >= self.nodes.len()) {
            return Err(Error::Mesh(format!(
                "Node index {} out of bounds in node set {}",
                bad, boundary
            )));
        }
        let set = self.node_sets.entry(boundary).or_default();
        for &n in nodes {
            if !set.contains(&n) {
                set.push(n);
            }
        }
        Ok(())
    }

    /// Append an element side to a boundary side set.
    pub fn add_side(&mut self, boundary: BoundaryId, elem: ElementId, side: usize) -> Result<()> {
        let e = self
            .elements
            .get(elem)
            .ok_or_else(|| Error::Mesh(format!("Element index {} out of bounds", elem)))?;
        let n_sides = create_element(e.element_type).n_sides();
        if side >= n_sides {
            return Err(Error::Mesh(format!(
                "Side {} out of range for {:?} ({} sides)",
                side, e.element_type, n_sides
            )));
        }
        self.side_sets.entry(boundary).or_default().push((elem, side));
        Ok(())
    }

    /// Number of nodes in the mesh.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of elements in the mesh.
    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    /// Get nodal coordinates.
    pub fn nodes(&self) -> &[Point3] {
        &self.nodes
    }

    /// Get a specific node's coordinates.
    pub fn node(&self, idx: usize) -> Option<&Point3> {
        self.nodes.get(idx)
    }

    /// Get element connectivity.
    pub fn elements(&self) -> &[ElementConnectivity] {
        &self.elements
    }

    /// Get a specific element's connectivity.
    pub fn element(&self, idx: usize) -> Option<&ElementConnectivity> {
        self.elements.get(idx)
    }

    /// Copy an element's nodal coordinates into `out`, reusing its allocation.
    pub fn element_coords_into(&self, elem_idx: usize, out: &mut Vec<Point3>) -> Option<()> {
        let elem = self.elements.get(elem_idx)?;
        out.clear();
        out.extend(elem.nodes.iter().map(|&i| self.nodes[i]));
        Some(())
    }

    /// Get coordinates for an element's nodes.
    pub fn element_coords(&self, elem_idx: usize) -> Option<Vec<Point3>> {
        let mut out = Vec::new();
        self.element_coords_into(elem_idx, &mut out)?;
        Some(out)
    }

    /// Subdomain ids present in the mesh.
    pub fn subdomains(&self) -> BTreeSet<SubdomainId> {
        self.elements.iter().map(|e| e.subdomain).collect()
    }

    /// Largest element dimension.
    pub fn dimension(&self) -> usize {
        self.elements
            .iter()
            .map(|e| e.element_type.dimension())
            .max()
            .unwrap_or(0)
    }

    pub fn node_set(&self, boundary: BoundaryId) -> &[usize] {
        self.node_sets.get(&boundary).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn side_set(&self, boundary: BoundaryId) -> &[(ElementId, usize)] {
        self.side_sets.get(&boundary).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn boundary_ids(&self) -> BTreeSet<BoundaryId> {
        self.node_sets.keys().chain(self.side_sets.keys()).copied().collect()
    }

    /// For each element, the (side, boundary) pairs it contributes to.
    pub fn boundary_sides_by_element(&self) -> Vec<Vec<(usize, BoundaryId)>> {
        let mut out = vec![Vec::new(); self.elements.len()];
        for (&bid, sides) in &self.side_sets {
            for &(elem, side) in sides {
                out[elem].push((side, bid));
            }
        }
        out
    }

    /// Compute mesh bounding box.
    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let first = *self.nodes.first()?;
        let mut min = first;
        let mut max = first;

        for node in &self.nodes[1..] {
            for i in 0..3 {
                min[i] = min[i].min(node[i]);
                max[i] = max[i].max(node[i]);
            }
        }

        Some((min, max))
    }

    /// Uniform 1D mesh of `n` Edge2 elements on [x0, x1].
    ///
    /// Boundary 0 is the left end, boundary 1 the right end (node and side sets).
    pub fn uniform_line(n: usize, x0: f64, x1: f64) -> Result<Self> {
        if n == 0 || x1 <= x0 {
            return Err(Error::Mesh(format!(
                "uniform_line needs n > 0 and x1 > x0, got n={}, [{}, {}]",
                n, x0, x1
            )));
        }
        let mut mesh = Mesh::with_capacity(n + 1, n);
        let h = (x1 - x0) / n as f64;
        mesh.add_nodes((0..=n).map(|i| Vector3::new(x0 + h * i as f64, 0.0, 0.0)));
        for e in 0..n {
            mesh.add_element(ElementType::Edge2, vec![e, e + 1])?;
        }
        mesh.add_node_set(0, &[0])?;
        mesh.add_node_set(1, &[n])?;
        mesh.add_side(0, 0, 0)?;
        mesh.add_side(1, n - 1, 1)?;
        Ok(mesh)
    }

    /// Uniform `nx × ny` Quad4 mesh of [0, lx] × [0, ly].
    ///
    /// Boundaries: 0 bottom, 1 right, 2 top, 3 left.
    pub fn uniform_rectangle(nx: usize, ny: usize, lx: f64, ly: f64) -> Result<Self> {
        if nx == 0 || ny == 0 || lx <= 0.0 || ly <= 0.0 {
            return Err(Error::Mesh("uniform_rectangle needs positive sizes".into()));
        }
        let mut mesh = Mesh::with_capacity((nx + 1) * (ny + 1), nx * ny);
        let node = |i: usize, j: usize| j * (nx + 1) + i;
        for j in 0..=ny {
            for i in 0..=nx {
                mesh.add_node(Vector3::new(
                    lx * i as f64 / nx as f64,
                    ly * j as f64 / ny as f64,
                    0.0,
                ));
            }
        }
        for j in 0..ny {
            for i in 0..nx {
                let e = mesh.add_element(
                    ElementType::Quad4,
                    vec![node(i, j), node(i + 1, j), node(i + 1, j + 1), node(i, j + 1)],
                )?;
                if j == 0 {
                    mesh.add_side(0, e, 0)?;
                }
                if i == nx - 1 {
                    mesh.add_side(1, e, 1)?;
                }
                if j == ny - 1 {
                    mesh.add_side(2, e, 2)?;
                }
                if i == 0 {
                    mesh.add_side(3, e, 3)?;
                }
            }
        }
        let bottom: Vec<usize> = (0..=nx).map(|i| node(i, 0)).collect();
        let right: Vec<usize> = (0..=ny).map(|j| node(nx, j)).collect();
        let top: Vec<usize> = (0..=nx).map(|i| node(i, ny)).collect();
        let left: Vec<usize> = (0..=ny).map(|j| node(0, j)).collect();
        mesh.add_node_set(0, &bottom)?;
        mesh.add_node_set(1, &right)?;
        mesh.add_node_set(2, &top)?;
        mesh.add_node_set(3, &left)?;
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_creation() {
        let mut mesh = Mesh::new();
        mesh.add_node(Vector3::new(0.0, 0.0, 0.0));
        mesh.add_node(Vector3::new(1.0, 0.0, 0.0));
        mesh.add_node(Vector3::new(1.0, 1.0, 0.0));
        mesh.add_node(Vector3::new(0.0, 1.0, 0.0));

        assert_eq!(mesh.n_nodes(), 4);

        mesh.add_element_in(ElementType::Quad4, vec![0, 1, 2, 3], 3)
            .unwrap();
        assert_eq!(mesh.n_elements(), 1);
        assert_eq!(mesh.subdomains().into_iter().collect::<Vec<_>>(), vec![3]);
        assert_eq!(mesh.dimension(), 2);
    }

    #[test]
    fn test_invalid_element_node_count() {
        let mut mesh = Mesh::new();
        mesh.add_node(Vector3::new(0.0, 0.0, 0.0));
        mesh.add_node(Vector3::new(1.0, 0.0, 0.0));
        mesh.add_node(Vector3::new(0.0, 1.0, 0.0));

        let result = mesh.add_element(ElementType::Quad4, vec![0, 1, 2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_node_index() {
        let mut mesh = Mesh::new();
        mesh.add_node(Vector3::new(0.0, 0.0, 0.0));

        let result = mesh.add_element(ElementType::Edge2, vec![0, 3]);
        assert!(result.is_err());
        assert!(mesh.add_node_set(0, &[4]).is_err());
    }

    #[test]
    fn test_uniform_line_boundaries() {
        let mesh = Mesh::uniform_line(4, 0.0, 2.0).unwrap();
        assert_eq!(mesh.n_nodes(), 5);
        assert_eq!(mesh.n_elements(), 4);
        assert_eq!(mesh.node_set(0), &[0]);
        assert_eq!(mesh.node_set(1), &[4]);
        assert_eq!(mesh.side_set(1), &[(3, 1)]);
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min.x, 0.0);
        assert_eq!(max.x, 2.0);
    }

    #[test]
    fn test_uniform_rectangle_sides() {
        let mut mesh = Mesh::uniform_rectangle(3, 2, 3.0, 2.0).unwrap();
        assert_eq!(mesh.n_elements(), 6);
        assert_eq!(mesh.side_set(0).len(), 3);
        assert_eq!(mesh.side_set(1).len(), 2);
        assert_eq!(mesh.node_set(3).len(), 3);
        let by_elem = mesh.boundary_sides_by_element();
        // corner element touches bottom and left
        assert_eq!(by_elem[0].len(), 2);
        assert!(mesh.add_side(0, 0, 7).is_err());
    }
}
