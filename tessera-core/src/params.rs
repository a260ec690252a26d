//! Typed, named parameter sets.
//!
//! Every buildable object type publishes a [`ParameterSet`] describing the
//! parameters it understands. Callers fetch that set from the factory, fill in
//! values with [`ParameterSet::set`] and hand it back to `build`. Coupled
//! variables are ordinary string-vector parameters with an extra coupling
//! annotation, so `v = "temp"` and `v = "c0 c1 c2"` use the same slot.

use crate::error::{Error, Result};
use crate::types::SubdomainId;
use std::collections::BTreeMap;

/// Stored parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    String(String),
    RealVec(Vec<f64>),
    StringVec(Vec<String>),
    SubdomainVec(Vec<SubdomainId>),
}

impl ParamValue {
    /// Kind tag of this value.
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Real(_) => ParamKind::Real,
            ParamValue::String(_) => ParamKind::String,
            ParamValue::RealVec(_) => ParamKind::RealVec,
            ParamValue::StringVec(_) => ParamKind::StringVec,
            ParamValue::SubdomainVec(_) => ParamKind::SubdomainVec,
        }
    }
}

/// Declared kind of a parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Bool,
    Int,
    Real,
    String,
    RealVec,
    StringVec,
    SubdomainVec,
}

impl ParamKind {
    pub fn name(self) -> &'static str {
        match self {
            ParamKind::Bool => "bool",
            ParamKind::Int => "integer",
            ParamKind::Real => "real",
            ParamKind::String => "string",
            ParamKind::RealVec => "real vector",
            ParamKind::StringVec => "string vector",
            ParamKind::SubdomainVec => "subdomain vector",
        }
    }
}

/// Rust types that can live in a parameter slot.
pub trait ParamType: Sized + Clone {
    const KIND: ParamKind;

    fn into_value(self) -> ParamValue;

    fn from_value(value: &ParamValue) -> Option<Self>;
}

macro_rules! impl_param_type {
    ($ty:ty, $kind:ident) => {
        impl ParamType for $ty {
            const KIND: ParamKind = ParamKind::$kind;

            fn into_value(self) -> ParamValue {
                ParamValue::$kind(self)
            }

            fn from_value(value: &ParamValue) -> Option<Self> {
                match value {
                    ParamValue::$kind(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_param_type!(bool, Bool);
impl_param_type!(i64, Int);
impl_param_type!(f64, Real);
impl_param_type!(String, String);
impl_param_type!(Vec<f64>, RealVec);
impl_param_type!(Vec<String>, StringVec);
impl_param_type!(Vec<SubdomainId>, SubdomainVec);

impl ParamType for usize {
    const KIND: ParamKind = ParamKind::Int;

    fn into_value(self) -> ParamValue {
        ParamValue::Int(self as i64)
    }

    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(v) if *v >= 0 => Some(*v as usize),
            _ => None,
        }
    }
}

/// Coupling annotation on a string-vector slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CouplingDecl {
    /// Constant used when nothing is coupled.
    pub default: Option<f64>,
    /// Whether leaving the coupling empty is a setup error.
    pub required: bool,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSlot {
    pub kind: ParamKind,
    pub value: Option<ParamValue>,
    pub required: bool,
    pub private: bool,
    pub set_by_user: bool,
    pub doc: String,
    pub coupling: Option<CouplingDecl>,
}

impl ParamSlot {
    fn new(kind: ParamKind, value: Option<ParamValue>, doc: &str) -> Self {
        Self {
            kind,
            value,
            required: false,
            private: false,
            set_by_user: false,
            doc: doc.to_string(),
            coupling: None,
        }
    }
}

/// Named, typed parameter bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    owner: String,
    slots: BTreeMap<String, ParamSlot>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the object these parameters describe, used in error messages.
    pub fn owner(&self) -> &str {
        if self.owner.is_empty() {
            "<unnamed>"
        } else {
            &self.owner
        }
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = owner.into();
    }

    /// Low-level declaration used by the typed helpers below.
    ///
    /// Redeclaring a name replaces the earlier slot.
    pub fn declare(
        &mut self,
        name: &str,
        kind: ParamKind,
        default: Option<ParamValue>,
        required: bool,
        doc: &str,
    ) {
        let mut slot = ParamSlot::new(kind, default, doc);
        slot.required = required;
        self.slots.insert(name.to_string(), slot);
    }

    /// Optional parameter with a default value.
    pub fn add_param<T: ParamType>(&mut self, name: &str, default: T, doc: &str) {
        self.declare(name, T::KIND, Some(default.into_value()), false, doc);
    }

    /// Optional parameter without a default.
    pub fn add_optional_param<T: ParamType>(&mut self, name: &str, doc: &str) {
        self.declare(name, T::KIND, None, false, doc);
    }

    /// Parameter that must be set before construction.
    pub fn add_required_param<T: ParamType>(&mut self, name: &str, doc: &str) {
        self.declare(name, T::KIND, None, true, doc);
    }

    /// Parameter hidden from users, normally set by the framework.
    pub fn add_private_param<T: ParamType>(&mut self, name: &str, default: T) {
        self.declare(name, T::KIND, Some(default.into_value()), false, "");
        if let Some(slot) = self.slots.get_mut(name) {
            slot.private = true;
        }
    }

    /// Optional coupling; resolves to zero when left empty.
    pub fn add_coupled_var(&mut self, name: &str, doc: &str) {
        self.declare_coupling(name, None, false, doc);
    }

    /// Coupling that must name at least one field.
    pub fn add_required_coupled_var(&mut self, name: &str, doc: &str) {
        self.declare_coupling(name, None, true, doc);
    }

    /// Optional coupling that resolves to `default` when left empty.
    pub fn add_coupled_var_with_default(&mut self, name: &str, default: f64, doc: &str) {
        self.declare_coupling(name, Some(default), false, doc);
    }

    fn declare_coupling(&mut self, name: &str, default: Option<f64>, required: bool, doc: &str) {
        let mut slot = ParamSlot::new(ParamKind::StringVec, None, doc);
        slot.coupling = Some(CouplingDecl { default, required });
        self.slots.insert(name.to_string(), slot);
    }

    /// Store a value, marking it as set by the user.
    pub fn set<T: ParamType>(&mut self, name: &str, value: T) -> Result<&mut Self> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| Error::InvalidParameter {
                param: name.to_string(),
                reason: "parameter is not declared".into(),
            })?;
        if slot.kind != T::KIND {
            return Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: slot.kind.name().into(),
                found: T::KIND.name().into(),
            });
        }
        slot.value = Some(value.into_value());
        slot.set_by_user = true;
        Ok(self)
    }

    /// Couple a list of field names (or numeric literals) to `name`.
    pub fn set_coupled(&mut self, name: &str, fields: &[&str]) -> Result<&mut Self> {
        self.ensure_coupling(name)?;
        self.set(name, fields.iter().map(|f| f.to_string()).collect::<Vec<_>>())
    }

    /// Couple `n` fields named `base0 .. base{n-1}` to `name`.
    pub fn set_coupled_components(&mut self, name: &str, base: &str, n: usize) -> Result<&mut Self> {
        self.ensure_coupling(name)?;
        self.set(name, (0..n).map(|i| format!("{base}{i}")).collect::<Vec<_>>())
    }

    fn ensure_coupling(&self, name: &str) -> Result<()> {
        match self.slots.get(name) {
            Some(slot) if slot.coupling.is_some() => Ok(()),
            _ => Err(Error::InvalidParameter {
                param: name.to_string(),
                reason: "not declared as a coupled variable".into(),
            }),
        }
    }

    /// Typed read.
    pub fn get<T: ParamType>(&self, name: &str) -> Result<T> {
        let slot = self.slots.get(name).ok_or_else(|| self.missing(name))?;
        let value = slot.value.as_ref().ok_or_else(|| self.missing(name))?;
        T::from_value(value).ok_or_else(|| Error::TypeMismatch {
            name: name.to_string(),
            expected: T::KIND.name().into(),
            found: value.kind().name().into(),
        })
    }

    /// Typed read that treats an unset optional parameter as `None`.
    pub fn get_optional<T: ParamType>(&self, name: &str) -> Result<Option<T>> {
        if self.is_param_valid(name) {
            self.get(name).map(Some)
        } else {
            Ok(None)
        }
    }

    fn missing(&self, name: &str) -> Error {
        Error::MissingParameter {
            object: self.owner().to_string(),
            param: name.to_string(),
        }
    }

    /// Whether `name` is declared.
    pub fn has(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Whether `name` holds a value (default or user supplied).
    pub fn is_param_valid(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|s| s.value.is_some())
    }

    pub fn is_param_set_by_user(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|s| s.set_by_user)
    }

    pub fn is_private(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|s| s.private)
    }

    pub fn doc(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(|s| s.doc.as_str())
    }

    pub fn slot(&self, name: &str) -> Option<&ParamSlot> {
        self.slots.get(name)
    }

    /// Declared names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Whether `name` is a coupled-variable slot.
    pub fn is_coupling(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|s| s.coupling.is_some())
    }

    /// Names coupled to `name`; empty when nothing was supplied.
    pub fn coupled_names(&self, name: &str) -> &[String] {
        match self.slots.get(name).and_then(|s| s.value.as_ref()) {
            Some(ParamValue::StringVec(v)) => v,
            _ => &[],
        }
    }

    pub fn coupling_decl(&self, name: &str) -> Option<&CouplingDecl> {
        self.slots.get(name).and_then(|s| s.coupling.as_ref())
    }

    /// Union of two sets.
    ///
    /// Keys only on the right are copied over. For keys on both sides the
    /// left's annotations (required, private, doc, coupling) are kept, and a
    /// right-hand value only fills a left slot that has none.
    pub fn merge(&mut self, other: &ParameterSet) {
        for (name, theirs) in &other.slots {
            match self.slots.get_mut(name) {
                None => {
                    self.slots.insert(name.clone(), theirs.clone());
                }
                Some(ours) => {
                    if ours.value.is_none() && ours.kind == theirs.kind {
                        if let Some(v) = &theirs.value {
                            ours.value = Some(v.clone());
                            ours.set_by_user = theirs.set_by_user;
                        }
                    }
                }
            }
        }
        if self.owner.is_empty() {
            self.owner = other.owner.clone();
        }
    }

    /// Fail with the first required parameter or coupling that has no value.
    pub fn check_required(&self) -> Result<()> {
        for (name, slot) in &self.slots {
            let unset = match &slot.value {
                None => true,
                Some(ParamValue::StringVec(v)) if slot.coupling.is_some() => v.is_empty(),
                Some(_) => false,
            };
            let required = slot.required || slot.coupling.as_ref().is_some_and(|c| c.required);
            if required && unset {
                return Err(self.missing(name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn diffusion_like() -> ParameterSet {
        let mut p = ParameterSet::new();
        p.set_owner("diff");
        p.add_required_param::<String>("variable", "Variable this kernel acts on");
        p.add_param("coef", 1.0, "Diffusion coefficient");
        p.add_optional_param::<f64>("scale", "Optional scaling");
        p.add_coupled_var_with_default("v", 2.5, "Coupled field");
        p
    }

    #[test]
    fn test_default_and_user_values() {
        let mut p = diffusion_like();
        assert_eq!(p.get::<f64>("coef").unwrap(), 1.0);
        assert!(!p.is_param_set_by_user("coef"));

        p.set("coef", 3.0).unwrap();
        assert_eq!(p.get::<f64>("coef").unwrap(), 3.0);
        assert!(p.is_param_set_by_user("coef"));
    }

    #[test]
    fn test_missing_and_mismatch() {
        let p = diffusion_like();
        let err = p.get::<String>("variable").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingParameter);
        assert!(err.to_string().contains("diff"));

        let err = p.get::<bool>("coef").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        assert_eq!(p.get_optional::<f64>("scale").unwrap(), None);
    }

    #[test]
    fn test_set_rejects_undeclared_and_wrong_kind() {
        let mut p = diffusion_like();
        assert_eq!(
            p.set("nope", 1.0).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            p.set("coef", "two".to_string()).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn test_check_required() {
        let mut p = diffusion_like();
        assert_eq!(
            p.check_required().unwrap_err().kind(),
            ErrorKind::MissingParameter
        );
        p.set("variable", "u".to_string()).unwrap();
        assert!(p.check_required().is_ok());

        p.add_required_coupled_var("w", "Required coupling");
        assert!(p.check_required().is_err());
        p.set_coupled("w", &["c"]).unwrap();
        assert!(p.check_required().is_ok());
    }

    #[test]
    fn test_coupled_components_preserve_order() {
        let mut p = diffusion_like();
        p.set_coupled_components("v", "c", 3).unwrap();
        assert_eq!(p.coupled_names("v"), &["c0", "c1", "c2"]);
        assert_eq!(p.coupling_decl("v").unwrap().default, Some(2.5));
        assert!(p.set_coupled("coef", &["x"]).is_err());
    }

    #[test]
    fn test_merge_left_priority() {
        let mut left = ParameterSet::new();
        left.add_required_param::<f64>("a", "left doc");
        left.add_param("b", 1.0, "left b");

        let mut right = ParameterSet::new();
        right.add_param("a", 5.0, "right doc");
        right.add_param("b", 9.0, "right b");
        right.add_param("c", true, "only right");
        right.add_private_param("_hidden", 3_i64);

        left.merge(&right);
        // annotations from the left win
        assert_eq!(left.doc("a"), Some("left doc"));
        assert!(left.slot("a").unwrap().required);
        // unset left slot takes the right value, set left slot keeps its own
        assert_eq!(left.get::<f64>("a").unwrap(), 5.0);
        assert_eq!(left.get::<f64>("b").unwrap(), 1.0);
        assert!(left.get::<bool>("c").unwrap());
        assert!(left.is_private("_hidden"));
    }

    #[test]
    fn test_usize_round_trip_through_int() {
        let mut p = ParameterSet::new();
        p.add_param("n", 4_usize, "count");
        assert_eq!(p.get::<usize>("n").unwrap(), 4);
        assert_eq!(p.get::<i64>("n").unwrap(), 4);
    }
}
