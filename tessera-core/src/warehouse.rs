//! Storage of built objects and their per-subdomain activity.

use crate::bc::NodalBc;
use crate::error::{Error, Result};
use crate::kernel::JacobianContributor;
use crate::material::PropertyProducer;
use crate::mesh::Mesh;
use crate::postprocessor::ElementPostprocessor;
use crate::property::PropertyWarehouse;
use crate::registry::SimObject;
use crate::types::SubdomainId;
use crate::variables::PostprocessorId;
use std::collections::BTreeMap;

/// All objects of a problem, grouped by capability.
#[derive(Default)]
pub struct Warehouse {
    kernels: Vec<Box<dyn JacobianContributor>>,
    integrated_bcs: Vec<Box<dyn JacobianContributor>>,
    nodal_bcs: Vec<Box<dyn NodalBc>>,
    /// Producers with their global registration index.
    materials: Vec<(usize, Box<dyn PropertyProducer>)>,
    postprocessors: Vec<(PostprocessorId, Box<dyn ElementPostprocessor>)>,

    kernels_on: BTreeMap<SubdomainId, Vec<usize>>,
    materials_on: BTreeMap<SubdomainId, Vec<usize>>,
    /// Per element: (side, integrated bc index).
    sides_of: Vec<Vec<(usize, usize)>>,
    any_ad: bool,
}

impl Warehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a built object. Postprocessors need their value slot.
    pub fn insert(
        &mut self,
        index: usize,
        object: SimObject,
        postprocessor: Option<PostprocessorId>,
    ) -> Result<()> {
        match object {
            SimObject::Kernel(k) => self.kernels.push(k),
            SimObject::IntegratedBc(b) => {
                if b.info().boundaries.is_empty() {
                    return Err(Error::InvalidParameter {
                        param: "boundary".into(),
                        reason: format!("'{}' names no boundary", b.info().name),
                    });
                }
                self.integrated_bcs.push(b)
            }
            SimObject::Material(m) => self.materials.push((index, m)),
            SimObject::NodalBc(b) => self.nodal_bcs.push(b),
            SimObject::Postprocessor(p) => {
                let id = postprocessor.ok_or_else(|| {
                    Error::Assembly(format!("postprocessor '{}' has no value slot", p.name()))
                })?;
                self.postprocessors.push((id, p));
            }
        }
        Ok(())
    }

    /// Compute which objects run on which subdomain and side.
    pub fn setup(&mut self, mesh: &Mesh, properties: &PropertyWarehouse) -> Result<()> {
        self.kernels_on.clear();
        self.materials_on.clear();
        for sub in mesh.subdomains() {
            let kernels = self
                .kernels
                .iter()
                .enumerate()
                .filter(|(_, k)| k.info().is_active_on(sub))
                .map(|(i, _)| i)
                .collect();
            self.kernels_on.insert(sub, kernels);

            let mut order: Vec<usize> = properties
                .evaluation_order(sub)
                .iter()
                .filter_map(|&obj| self.materials.iter().position(|(idx, _)| *idx == obj))
                .collect();
            // producers that declare nothing still run, after the sorted ones
            for (pos, (_, m)) in self.materials.iter().enumerate() {
                let active = m.blocks().is_empty() || m.blocks().contains(&sub);
                if active && !order.contains(&pos) {
                    order.push(pos);
                }
            }
            self.materials_on.insert(sub, order);
        }

        self.sides_of = vec![Vec::new(); mesh.n_elements()];
        for (i, bc) in self.integrated_bcs.iter().enumerate() {
            for &bid in &bc.info().boundaries {
                let sides = mesh.side_set(bid);
                if sides.is_empty() {
                    log::warn!("boundary {} of '{}' has no sides", bid, bc.info().name);
                }
                for &(elem, side) in sides {
                    self.sides_of[elem].push((side, i));
                }
            }
        }
        for sides in &mut self.sides_of {
            sides.sort_unstable();
        }

        self.any_ad = self
            .kernels
            .iter()
            .chain(self.integrated_bcs.iter())
            .any(|k| k.is_ad());

        log::info!(
            "warehouse: {} kernels, {} integrated bcs, {} nodal bcs, {} materials, {} postprocessors",
            self.kernels.len(),
            self.integrated_bcs.len(),
            self.nodal_bcs.len(),
            self.materials.len(),
            self.postprocessors.len()
        );
        Ok(())
    }

    pub fn kernels(&self) -> &[Box<dyn JacobianContributor>] {
        &self.kernels
    }

    pub fn integrated_bcs(&self) -> &[Box<dyn JacobianContributor>] {
        &self.integrated_bcs
    }

    pub fn nodal_bcs(&self) -> &[Box<dyn NodalBc>] {
        &self.nodal_bcs
    }

    pub fn postprocessors(&self) -> &[(PostprocessorId, Box<dyn ElementPostprocessor>)] {
        &self.postprocessors
    }

    pub fn material(&self, pos: usize) -> &dyn PropertyProducer {
        &*self.materials[pos].1
    }

    pub fn kernels_on(&self, sub: SubdomainId) -> &[usize] {
        self.kernels_on.get(&sub).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn materials_on(&self, sub: SubdomainId) -> &[usize] {
        self.materials_on.get(&sub).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sides_of(&self, elem: usize) -> &[(usize, usize)] {
        self.sides_of.get(elem).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any contributor needs seeded dual numbers for its Jacobian.
    pub fn any_ad(&self) -> bool {
        self.any_ad
    }
}
