//! Error types for Tessera operations.
//!
//! Setup errors (parameters, registration, couplings, property dependencies) are
//! fatal and surface before any element loop runs. Numerical trouble during the
//! loop is never trapped there; only the Newton driver reports
//! [`Error::NumericalDivergence`].

use thiserror::Error;

/// Result type alias using Tessera Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during setup, assembly and solve.
#[derive(Error, Debug)]
pub enum Error {
    /// A required parameter (or coupling declared as required) was never set.
    #[error("missing required parameter '{param}' for '{object}'")]
    MissingParameter { object: String, param: String },

    /// A parameter or property was accessed with a different type than stored.
    #[error("type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// A type name is already registered within the same application.
    #[error("type '{name}' is already registered by application '{app}'")]
    DuplicateRegistration { name: String, app: String },

    /// No constructor is registered under the requested type name.
    #[error("unknown object type '{0}'")]
    UnknownType(String),

    /// The constructor rejected its parameters or panicked.
    #[error("failed to construct '{object}' of type '{type_name}': {message}")]
    ConstructionFailure {
        type_name: String,
        object: String,
        message: String,
    },

    /// Property producers depend on each other in a loop.
    #[error("material property dependency cycle on subdomain {subdomain}: {}", .chain.join(" -> "))]
    DependencyCycle { subdomain: u16, chain: Vec<String> },

    /// A required field coupling was not supplied or names an unknown field.
    #[error("'{object}' cannot resolve coupling '{coupling}': {reason}")]
    MissingCoupling {
        object: String,
        coupling: String,
        reason: String,
    },

    /// A consumed property has no producer on a subdomain where it is needed.
    #[error("material property '{property}' requested by '{consumer}' is not declared on subdomain {subdomain}")]
    MissingProperty {
        property: String,
        consumer: String,
        subdomain: u16,
    },

    /// Two producers declare the same property on one subdomain.
    #[error("material property '{property}' declared by both '{first}' and '{second}' on subdomain {subdomain}")]
    DuplicateProperty {
        property: String,
        first: String,
        second: String,
        subdomain: u16,
    },

    /// A parameter value is out of range or an undeclared name was set.
    #[error("invalid parameter '{param}': {reason}")]
    InvalidParameter { param: String, reason: String },

    /// Mesh-related errors.
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Assembly errors (setup ordering, inconsistent sizes).
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Solver errors.
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or conditioning issues.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Non-finite residual seen by the nonlinear convergence check.
    #[error("nonlinear solve diverged: {0}")]
    NumericalDivergence(String),
}

/// Fieldless view of [`Error`] for matching on the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingParameter,
    TypeMismatch,
    DuplicateRegistration,
    UnknownType,
    ConstructionFailure,
    DependencyCycle,
    MissingCoupling,
    MissingProperty,
    DuplicateProperty,
    InvalidParameter,
    Mesh,
    Assembly,
    Solver,
    SingularMatrix,
    Config,
    NumericalDivergence,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingParameter { .. } => ErrorKind::MissingParameter,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::DuplicateRegistration { .. } => ErrorKind::DuplicateRegistration,
            Error::UnknownType(_) => ErrorKind::UnknownType,
            Error::ConstructionFailure { .. } => ErrorKind::ConstructionFailure,
            Error::DependencyCycle { .. } => ErrorKind::DependencyCycle,
            Error::MissingCoupling { .. } => ErrorKind::MissingCoupling,
            Error::MissingProperty { .. } => ErrorKind::MissingProperty,
            Error::DuplicateProperty { .. } => ErrorKind::DuplicateProperty,
            Error::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Error::Mesh(_) => ErrorKind::Mesh,
            Error::Assembly(_) => ErrorKind::Assembly,
            Error::Solver(_) => ErrorKind::Solver,
            Error::SingularMatrix(_) => ErrorKind::SingularMatrix,
            Error::Config(_) => ErrorKind::Config,
            Error::NumericalDivergence(_) => ErrorKind::NumericalDivergence,
        }
    }

    /// Whether this error belongs to the fatal setup taxonomy.
    pub fn is_setup_error(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Solver | ErrorKind::SingularMatrix | ErrorKind::NumericalDivergence
        )
    }
}
