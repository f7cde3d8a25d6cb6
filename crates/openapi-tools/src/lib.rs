//! Compile `OpenAPI` 3.x documents into MCP tools and execute them.
//!
//! Pipeline: [`source`] loads the document, [`parser`] extracts operations, [`compiler`] turns
//! each into a [`ToolSchema`], [`binder`] validates call arguments, an [`executor`] runs the
//! request (canned mocks or the real API) and [`shaper`] wraps the outcome.
//!
//! [`OpenApiToolset`] ties the stages together for embedders.

pub mod binder;
pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod semantics;
pub mod shaper;
pub mod source;
pub mod toolset;

pub use binder::BoundRequest;
pub use compiler::ToolSchema;
pub use config::{AuthConfig, ConfigLayer, HashPolicy, LayeredConfig, StartupConfig};
pub use error::{InvocationError, LoadError};
pub use executor::{ExecutionMode, ExecutionOutput, Executor};
pub use model::{HttpMethod, Operation, OperationRegistry};
pub use shaper::ResponseEnvelope;
pub use source::{SpecFormat, SpecReference};
pub use toolset::OpenApiToolset;
