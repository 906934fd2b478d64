//! Agent-invoked functions: registry, argument schemas, dispatch and
//! webhook-backed handlers.

mod dispatcher;
mod handler;
pub mod schema;
mod webhook;

pub use dispatcher::{FunctionDispatcher, FunctionRegistry, RegisteredFunction};
pub use handler::{FnHandler, FunctionError, FunctionHandler, TypedFunction, handler_fn, typed};
pub use schema::{ParamType, ParameterSchema, PropertySchema, SchemaError};
pub use webhook::{DEFAULT_WEBHOOK_TIMEOUT, WebhookFunction};
