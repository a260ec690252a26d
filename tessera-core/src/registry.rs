//! Object factory: building physics objects by type name.
//!
//! Applications register each object type under a name with a function
//! describing its parameters and a constructor. Types can later be renamed
//! (the old name becomes an alias) or deprecated (still buildable, with a
//! warning). The factory is filled once at startup and only read afterwards;
//! the only interior mutability is the set of deprecation warnings already
//! emitted.
//!
//! Constructors receive the merged, checked [`ParameterSet`] and a
//! [`BuildContext`] through which they resolve couplings and declare or
//! request material properties. They return a [`SimObject`], a tagged union
//! over the capability traits the element loop knows how to drive.

use crate::bc::NodalBc;
use crate::coupling::CouplingResolver;
use crate::error::{Error, ErrorKind, Result};
use crate::kernel::{ContributorInfo, JacobianContributor};
use crate::material::PropertyProducer;
use crate::params::ParameterSet;
use crate::postprocessor::ElementPostprocessor;
use crate::property::{
    DeclaredProperty, ObjectRef, OptionalProperty, PropertyHandle, PropertyRegistry, PropertyValue,
};
use crate::types::{BoundaryId, SubdomainId, TimeState, VarId};
use crate::variables::{FieldKind, PostprocessorId, VariableSystem};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::{Arc, Mutex};

/// A built physics object, tagged by capability.
pub enum SimObject {
    Kernel(Box<dyn JacobianContributor>),
    IntegratedBc(Box<dyn JacobianContributor>),
    Material(Box<dyn PropertyProducer>),
    NodalBc(Box<dyn NodalBc>),
    Postprocessor(Box<dyn ElementPostprocessor>),
}

impl SimObject {
    pub fn capability(&self) -> &'static str {
        match self {
            SimObject::Kernel(_) => "kernel",
            SimObject::IntegratedBc(_) => "integrated boundary condition",
            SimObject::Material(_) => "material",
            SimObject::NodalBc(_) => "nodal boundary condition",
            SimObject::Postprocessor(_) => "postprocessor",
        }
    }
}

impl fmt::Debug for SimObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimObject::Kernel(k) | SimObject::IntegratedBc(k) => k.info().name.as_str(),
            SimObject::Material(m) => m.name(),
            SimObject::NodalBc(b) => b.name(),
            SimObject::Postprocessor(p) => p.name(),
        };
        f.debug_struct("SimObject")
            .field("capability", &self.capability())
            .field("name", &name)
            .finish()
    }
}

/// Parameters a type understands, with defaults.
pub type ValidParams = fn() -> ParameterSet;

/// Builds an object from checked parameters.
pub type Constructor =
    Arc<dyn Fn(&ParameterSet, &mut BuildContext<'_>) -> Result<SimObject> + Send + Sync>;

struct Registration {
    valid_params: ValidParams,
    ctor: Constructor,
    /// Removal date when deprecated.
    deprecated: Option<String>,
}

enum Entry {
    Type(Registration),
    Renamed { new_name: String, removal_date: String },
}

/// Registry of buildable object types, grouped by application.
#[derive(Default)]
pub struct Factory {
    apps: Vec<String>,
    entries: HashMap<(String, String), Entry>,
    warned: Mutex<HashSet<(String, &'static Location<'static>)>>,
}

/// Outcome of following aliases.
struct Resolved<'a> {
    app: &'a str,
    name: String,
    registration: &'a Registration,
    warnings: Vec<String>,
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    fn note_app(&mut self, app: &str) {
        if !self.apps.iter().any(|a| a == app) {
            self.apps.push(app.to_string());
        }
    }

    /// Register `name` in `app`. Fails if `name` is already taken by a type
    /// or a rename alias.
    pub fn register_type(
        &mut self,
        name: &str,
        app: &str,
        valid_params: ValidParams,
        ctor: Constructor,
    ) -> Result<()> {
        let key = (app.to_string(), name.to_string());
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateRegistration {
                name: name.to_string(),
                app: app.to_string(),
            });
        }
        self.note_app(app);
        self.entries.insert(
            key,
            Entry::Type(Registration {
                valid_params,
                ctor,
                deprecated: None,
            }),
        );
        log::debug!("registered '{}' in application '{}'", name, app);
        Ok(())
    }

    /// Make `old` an alias of `new`, replacing any registration of `old`.
    pub fn register_renamed(&mut self, old: &str, new: &str, app: &str, removal_date: &str) {
        self.note_app(app);
        self.entries.insert(
            (app.to_string(), old.to_string()),
            Entry::Renamed {
                new_name: new.to_string(),
                removal_date: removal_date.to_string(),
            },
        );
    }

    /// Mark an already registered type as deprecated.
    pub fn register_deprecated(&mut self, name: &str, app: &str, removal_date: &str) -> Result<()> {
        match self.entries.get_mut(&(app.to_string(), name.to_string())) {
            Some(Entry::Type(reg)) => {
                reg.deprecated = Some(removal_date.to_string());
                Ok(())
            }
            _ => Err(Error::UnknownType(format!("{app}/{name}"))),
        }
    }

    /// Whether `name` (bare or `app/Name`) resolves to a constructor.
    pub fn is_registered(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Registered names (types and aliases) as `app/Name`, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .keys()
            .map(|(app, name)| format!("{app}/{name}"))
            .collect();
        names.sort();
        names
    }

    fn lookup(&self, name: &str, prefer_app: Option<&str>) -> Option<(&str, &Entry)> {
        if let Some((app, bare)) = name.split_once('/') {
            return self
                .entries
                .get_key_value(&(app.to_string(), bare.to_string()))
                .map(|((a, _), e)| (a.as_str(), e));
        }
        let preferred = prefer_app.into_iter().map(str::to_string);
        let ordered = preferred.chain(self.apps.iter().cloned());
        for app in ordered {
            if let Some(((a, _), e)) = self.entries.get_key_value(&(app, name.to_string())) {
                return Some((a.as_str(), e));
            }
        }
        None
    }

    fn resolve(&self, type_name: &str) -> Result<Resolved<'_>> {
        let mut warnings = Vec::new();
        let mut current = type_name.to_string();
        let mut app_hint: Option<&str> = None;
        for _ in 0..=self.entries.len() {
            let (app, entry) = self
                .lookup(&current, app_hint)
                .ok_or_else(|| Error::UnknownType(type_name.to_string()))?;
            let bare = current.rsplit('/').next().unwrap_or(current.as_str()).to_string();
            match entry {
                Entry::Renamed {
                    new_name,
                    removal_date,
                } => {
                    warnings.push(format!(
                        "'{}' has been renamed to '{}' and will be removed after {}",
                        bare, new_name, removal_date
                    ));
                    app_hint = Some(app);
                    current = new_name.clone();
                }
                Entry::Type(registration) => {
                    if let Some(date) = &registration.deprecated {
                        warnings.push(format!(
                            "'{}' is deprecated and will be removed after {}",
                            bare, date
                        ));
                    }
                    return Ok(Resolved {
                        app,
                        name: bare,
                        registration,
                        warnings,
                    });
                }
            }
        }
        Err(Error::UnknownType(format!("{type_name} (alias loop)")))
    }

    /// Parameter set a type accepts, ready to be filled in.
    pub fn params(&self, type_name: &str) -> Result<ParameterSet> {
        let resolved = self.resolve(type_name)?;
        Ok((resolved.registration.valid_params)())
    }

    /// Build an object of `type_name`.
    ///
    /// Aliases are followed to the final registration. The caller's values
    /// are merged over the type's parameter declarations and required
    /// parameters are checked before the constructor runs. Constructor errors
    /// outside the parameter/coupling taxonomy, and constructor panics, come
    /// back as [`Error::ConstructionFailure`].
    #[track_caller]
    pub fn build(
        &self,
        type_name: &str,
        object_name: &str,
        params: &ParameterSet,
        ctx: &mut BuildContext<'_>,
    ) -> Result<SimObject> {
        let call_site = Location::caller();
        let resolved = self.resolve(type_name)?;
        for message in &resolved.warnings {
            self.warn_once(type_name, call_site, message);
        }

        let mut merged = params.clone();
        merged.merge(&(resolved.registration.valid_params)());
        merged.set_owner(object_name);
        merged.check_required()?;

        ctx.object.name = object_name.to_string();
        ctx.object.blocks = merged
            .get_optional::<Vec<SubdomainId>>("block")?
            .unwrap_or_default();

        log::debug!(
            "building '{}' as {}/{}",
            object_name,
            resolved.app,
            resolved.name
        );
        let ctor = Arc::clone(&resolved.registration.ctor);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctor(&merged, ctx)));
        let failure = |message: String| Error::ConstructionFailure {
            type_name: resolved.name.clone(),
            object: object_name.to_string(),
            message,
        };
        match outcome {
            Ok(Ok(object)) => Ok(object),
            Ok(Err(err)) if passes_through(&err) => Err(err),
            Ok(Err(err)) => Err(failure(err.to_string())),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "constructor panicked".to_string());
                Err(failure(format!("panic: {message}")))
            }
        }
    }

    fn warn_once(&self, type_name: &str, site: &'static Location<'static>, message: &str) {
        let key = (type_name.to_string(), site);
        let first = match self.warned.lock() {
            Ok(mut seen) => seen.insert(key),
            Err(poisoned) => poisoned.into_inner().insert(key),
        };
        if first {
            log::warn!("{} ({})", message, site);
        }
    }

    /// Number of distinct (type name, call site) pairs warned about so far.
    pub fn warnings_emitted(&self) -> usize {
        match self.warned.lock() {
            Ok(seen) => seen.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Errors a constructor raises about its own inputs keep their kind.
fn passes_through(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::MissingParameter
            | ErrorKind::TypeMismatch
            | ErrorKind::MissingCoupling
            | ErrorKind::InvalidParameter
            | ErrorKind::ConstructionFailure
    )
}

/// Services available to a constructor.
pub struct BuildContext<'a> {
    vars: &'a VariableSystem,
    props: &'a mut PropertyRegistry,
    object: ObjectRef,
}

impl<'a> BuildContext<'a> {
    /// Context for the object with global registration index `index`.
    pub fn new(vars: &'a VariableSystem, props: &'a mut PropertyRegistry, index: usize) -> Self {
        Self {
            vars,
            props,
            object: ObjectRef {
                index,
                name: String::new(),
                blocks: Vec::new(),
            },
        }
    }

    pub fn object_name(&self) -> &str {
        &self.object.name
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn blocks(&self) -> &[SubdomainId] {
        &self.object.blocks
    }

    pub fn variables(&self) -> &VariableSystem {
        self.vars
    }

    pub fn couplings(&self) -> CouplingResolver<'_> {
        CouplingResolver::new(self.vars, &self.object.name)
    }

    /// Nonlinear variable named by the string parameter `param`.
    pub fn variable(&self, params: &ParameterSet, param: &str) -> Result<VarId> {
        let name: String = params.get(param)?;
        match self.vars.find(&name) {
            Some(info) if info.kind == FieldKind::Nonlinear => Ok(info.id),
            Some(_) => Err(Error::InvalidParameter {
                param: param.to_string(),
                reason: format!("'{}' is an auxiliary variable", name),
            }),
            None => Err(Error::InvalidParameter {
                param: param.to_string(),
                reason: format!("no nonlinear variable named '{}'", name),
            }),
        }
    }

    /// Postprocessor named by the string parameter `param`.
    pub fn postprocessor(&self, params: &ParameterSet, param: &str) -> Result<PostprocessorId> {
        let name: String = params.get(param)?;
        self.vars
            .postprocessor(&name)
            .ok_or_else(|| Error::InvalidParameter {
                param: param.to_string(),
                reason: format!("no postprocessor named '{}'", name),
            })
    }

    /// Name, variable, blocks and boundaries of a residual object.
    pub fn contributor_info(&self, params: &ParameterSet) -> Result<ContributorInfo> {
        Ok(ContributorInfo {
            name: self.object.name.clone(),
            variable: self.variable(params, "variable")?,
            blocks: self.object.blocks.clone(),
            boundaries: params
                .get_optional::<Vec<BoundaryId>>("boundary")?
                .unwrap_or_default(),
        })
    }

    pub fn declare_property<T: PropertyValue>(&mut self, name: &str) -> Result<DeclaredProperty<T>> {
        self.props.declare(&self.object, name)
    }

    pub fn get_property<T: PropertyValue>(&mut self, name: &str) -> Result<PropertyHandle<T>> {
        self.props.get(&self.object, name, TimeState::Current)
    }

    pub fn get_property_old<T: PropertyValue>(&mut self, name: &str) -> Result<PropertyHandle<T>> {
        self.props.get(&self.object, name, TimeState::Old)
    }

    pub fn get_property_older<T: PropertyValue>(&mut self, name: &str) -> Result<PropertyHandle<T>> {
        self.props.get(&self.object, name, TimeState::Older)
    }

    pub fn get_optional_property<T: PropertyValue>(
        &mut self,
        name: &str,
    ) -> Result<OptionalProperty<T>> {
        self.props.get_optional(&self.object, name, TimeState::Current)
    }
}

/// Parameters shared by every object: block restriction.
pub fn object_params() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param::<Vec<SubdomainId>>("block", Vec::new(), "Subdomains this object acts on (empty: all)");
    p
}

/// Parameters shared by kernels: block restriction and the variable.
pub fn kernel_params() -> ParameterSet {
    let mut p = object_params();
    p.add_required_param::<String>("variable", "Variable whose residual this object fills");
    p
}

/// Parameters shared by boundary conditions.
pub fn bc_params() -> ParameterSet {
    let mut p = kernel_params();
    p.add_required_param::<Vec<BoundaryId>>("boundary", "Boundary ids this condition applies to");
    p
}
