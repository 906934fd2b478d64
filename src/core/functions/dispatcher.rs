use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use super::handler::{FunctionError, FunctionHandler};
use super::schema::ParameterSchema;
use crate::core::agent::{FunctionCallRequest, FunctionCallResponse};

/// A function known to the dispatcher.
#[derive(Clone)]
pub struct RegisteredFunction {
    pub name: String,
    pub description: Option<String>,
    pub schema: ParameterSchema,
    handler: Arc<dyn FunctionHandler>,
}

impl std::fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`FunctionDispatcher`].
///
/// ```ignore
/// let dispatcher = FunctionRegistry::new()
///     .register("get_menu", ParameterSchema::new(), handler_fn(|_| async { Ok(menu()) }))
///     .with_call_timeout(Duration::from_secs(5))
///     .build();
/// ```
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, RegisteredFunction>,
    call_timeout: Option<Duration>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later registration under the same name wins.
    pub fn register<H>(self, name: impl Into<String>, schema: ParameterSchema, handler: H) -> Self
    where
        H: FunctionHandler + 'static,
    {
        self.register_arc(name, None, schema, Arc::new(handler))
    }

    /// Register a shared handler with an optional description.
    pub fn register_arc(
        mut self,
        name: impl Into<String>,
        description: Option<String>,
        schema: ParameterSchema,
        handler: Arc<dyn FunctionHandler>,
    ) -> Self {
        let name = name.into();
        if self.functions.contains_key(&name) {
            warn!(function = %name, "Replacing previously registered function");
        }
        self.functions.insert(
            name.clone(),
            RegisteredFunction {
                name,
                description,
                schema,
                handler,
            },
        );
        self
    }

    /// Bound every call by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> FunctionDispatcher {
        FunctionDispatcher {
            functions: self.functions,
            call_timeout: self.call_timeout,
        }
    }
}

/// Maps function names to handlers and produces response content.
///
/// The registry is fixed once built and shared read-only across calls.
pub struct FunctionDispatcher {
    functions: HashMap<String, RegisteredFunction>,
    call_timeout: Option<Duration>,
}

impl FunctionDispatcher {
    /// A dispatcher with no functions; every call answers "Unknown function".
    pub fn empty() -> Self {
        FunctionRegistry::new().build()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Function definitions in the form the agent settings expect.
    pub fn definitions(&self) -> Vec<Value> {
        let mut functions: Vec<&RegisteredFunction> = self.functions.values().collect();
        functions.sort_by(|a, b| a.name.cmp(&b.name));
        functions
            .into_iter()
            .map(|function| {
                let mut definition = json!({
                    "name": function.name,
                    "parameters": function.schema.to_json(),
                });
                if let Some(description) = &function.description {
                    definition["description"] = Value::String(description.clone());
                }
                definition
            })
            .collect()
    }

    /// Run `name` with `arguments`.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, FunctionError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| FunctionError::Unknown(name.to_string()))?;

        function
            .schema
            .validate(&arguments)
            .map_err(|e| FunctionError::InvalidArguments {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let call = AssertUnwindSafe(function.handler.call(arguments)).catch_unwind();
        let outcome = match self.call_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, call)
                    .await
                    .map_err(|_| FunctionError::Timeout {
                        name: name.to_string(),
                        seconds: limit.as_secs(),
                    })?
            }
            None => call.await,
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(FunctionError::ArgumentDecode(reason))) => Err(FunctionError::InvalidArguments {
                name: name.to_string(),
                reason,
            }),
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(function = %name, message = %message, "Function handler panicked");
                Err(FunctionError::Panicked {
                    name: name.to_string(),
                    message,
                })
            }
        }
    }

    /// Run `name` and turn any failure into `{"error": ...}` content.
    pub async fn dispatch(&self, name: &str, arguments: Map<String, Value>) -> Value {
        match self.invoke(name, arguments).await {
            Ok(value) => value,
            Err(e) => {
                warn!(function = %name, error = %e, "Function call failed");
                e.to_content()
            }
        }
    }

    /// Answer one agent request. Always yields a response carrying the
    /// request's id and name.
    pub async fn respond(&self, request: &FunctionCallRequest) -> FunctionCallResponse {
        info!(
            function = %request.name,
            call_id = %request.id,
            "Function call requested"
        );

        let content = if let Some(problem) = &request.problem {
            warn!(function = %request.name, problem = %problem, "Malformed function call");
            FunctionError::failed(format!("Function call failed with: {problem}")).to_content()
        } else {
            match request.parse_arguments() {
                Ok(arguments) => self.dispatch(&request.name, arguments).await,
                Err(reason) => {
                    let e = FunctionError::InvalidArguments {
                        name: request.name.clone(),
                        reason,
                    };
                    warn!(function = %request.name, error = %e, "Function call failed");
                    e.to_content()
                }
            }
        };

        debug!(function = %request.name, call_id = %request.id, "Function call answered");
        FunctionCallResponse::new(request.id.clone(), request.name.clone(), &content)
    }
}

impl std::fmt::Debug for FunctionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDispatcher")
            .field("functions", &self.names())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
