use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Failure of a single function call.
///
/// Always call-local: the error becomes `{"error": "<message>"}` content in
/// the response sent back to the agent and the call continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FunctionError {
    #[error("Unknown function: {0}")]
    Unknown(String),

    #[error("Invalid arguments for {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    /// Raised by handlers that decode their own arguments; the dispatcher
    /// turns it into [`FunctionError::InvalidArguments`].
    #[error("Invalid arguments: {0}")]
    ArgumentDecode(String),

    #[error("{0}")]
    Failed(String),

    #[error("Function {name} panicked: {message}")]
    Panicked { name: String, message: String },

    #[error("Function {name} timed out after {seconds}s")]
    Timeout { name: String, seconds: u64 },
}

impl FunctionError {
    pub fn failed(message: impl Into<String>) -> Self {
        FunctionError::Failed(message.into())
    }

    /// Response content for this error.
    pub fn to_content(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

/// A callable the agent can invoke by name.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, FunctionError>;
}

/// Handler built from an async closure over raw JSON arguments.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure taking the raw argument map.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FunctionError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> FunctionHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FunctionError>> + Send + 'static,
{
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, FunctionError> {
        (self.f)(arguments).await
    }
}

/// Handler with typed arguments and result.
///
/// Arguments are deserialized into `A` before the closure runs; the result
/// is serialized back to JSON.
pub struct TypedFunction<A, R, F> {
    f: F,
    _marker: PhantomData<fn(A) -> R>,
}

/// Wrap an async closure with typed arguments.
pub fn typed<A, R, F, Fut>(f: F) -> TypedFunction<A, R, F>
where
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, FunctionError>> + Send + 'static,
{
    TypedFunction {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<A, R, F, Fut> FunctionHandler for TypedFunction<A, R, F>
where
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, FunctionError>> + Send + 'static,
{
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, FunctionError> {
        let arguments: A = serde_json::from_value(Value::Object(arguments))
            .map_err(|e| FunctionError::ArgumentDecode(e.to_string()))?;
        let result = (self.f)(arguments).await?;
        serde_json::to_value(result)
            .map_err(|e| FunctionError::failed(format!("Failed to serialize result: {e}")))
    }
}
