//! `steps` crate: the `StepHandler` contract, the handler registry and the
//! built-in step types.
//!
//! Every step type, built-in or custom, implements [`StepHandler`].
//! The engine crate dispatches execution through this trait object, looked up
//! by [`StepKind`] in a [`StepRegistry`].

pub mod builtin;
pub mod collaborators;
pub mod dry_run;
pub mod error;
pub mod expression;
pub mod kind;
pub mod mock;
pub mod registry;
pub mod resolver;
pub mod traits;

pub use error::StepError;
pub use kind::StepKind;
pub use registry::StepRegistry;
pub use traits::{ExecutionContext, RunResults, StepHandler};
