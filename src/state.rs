//! Shared application state
//!
//! Built once at startup and shared by every request through `Arc<AppState>`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::core::agent::{AgentConnector, WebSocketAgentConnector};
use crate::core::functions::{FunctionDispatcher, FunctionRegistry, WebhookFunction};
use crate::core::session::{CallSession, SessionConfig};

/// Why a new call was refused
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CallLimitError {
    #[error("Concurrent call limit of {0} reached")]
    LimitReached(usize),
}

/// Application state shared by all handlers
pub struct AppState {
    pub config: ServerConfig,
    pub dispatcher: Arc<FunctionDispatcher>,
    pub connector: Arc<dyn AgentConnector>,
    pub agent_settings: Arc<Value>,
    active_calls: AtomicUsize,
}

impl AppState {
    /// Assemble state from already-built parts
    pub fn new(
        config: ServerConfig,
        dispatcher: Arc<FunctionDispatcher>,
        connector: Arc<dyn AgentConnector>,
        agent_settings: Value,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            dispatcher,
            connector,
            agent_settings: Arc::new(agent_settings),
            active_calls: AtomicUsize::new(0),
        })
    }

    /// Build state from configuration
    ///
    /// Loads the agent settings document, registers the configured webhook
    /// functions and prepares the agent connector. Fails when no agent API
    /// key is configured.
    pub fn from_config(config: ServerConfig) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let api_key = config
            .agent_api_key()
            .ok_or("DEEPGRAM_API_KEY (or agent.api_key) must be set to serve calls")?
            .to_string();

        let mut agent_settings = config.load_agent_settings()?;
        let dispatcher = build_dispatcher(&config);
        let advertised = advertise_functions(&mut agent_settings, &dispatcher)?;
        info!(
            functions = ?dispatcher.names(),
            advertised,
            settings = %config.agent.settings_path.display(),
            "Loaded agent configuration"
        );

        let connector = WebSocketAgentConnector::new(config.agent.url.clone(), api_key);

        Ok(Self::new(
            config,
            Arc::new(dispatcher),
            Arc::new(connector),
            agent_settings,
        ))
    }

    pub fn session_config(&self) -> SessionConfig {
        self.config.session_config()
    }

    /// New call session wired to this state's connector and functions
    pub fn new_session(&self) -> CallSession {
        CallSession::new(
            self.connector.clone(),
            self.dispatcher.clone(),
            self.agent_settings.clone(),
            self.session_config(),
        )
    }

    /// Reserve a call slot
    ///
    /// The slot is released when the returned guard (and every clone of it)
    /// is dropped.
    pub fn try_acquire_call(self: &Arc<Self>) -> Result<CallSlot, CallLimitError> {
        match self.config.max_concurrent_calls {
            Some(limit) => {
                self.active_calls
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                        (current < limit).then_some(current + 1)
                    })
                    .map_err(|_| CallLimitError::LimitReached(limit))?;
            }
            None => {
                self.active_calls.fetch_add(1, Ordering::SeqCst);
            }
        }

        Ok(CallSlot {
            inner: Arc::new(SlotGuard {
                state: Arc::clone(self),
            }),
        })
    }

    /// Calls currently holding a slot
    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::SeqCst)
    }
}

/// Build the function dispatcher from configured webhook definitions
pub fn build_dispatcher(config: &ServerConfig) -> FunctionDispatcher {
    let client = reqwest::Client::new();
    let mut registry = FunctionRegistry::new();

    for definition in &config.functions {
        let mut webhook = WebhookFunction::new(definition.name.clone(), definition.url.clone())
            .with_headers(definition.headers.clone())
            .with_client(client.clone());
        if let Some(seconds) = definition.timeout_secs {
            webhook = webhook.with_timeout(std::time::Duration::from_secs(seconds));
        }

        registry = registry.register_arc(
            definition.name.clone(),
            definition.description.clone(),
            definition.parameters.clone(),
            Arc::new(webhook),
        );
    }

    if let Some(timeout) = config.function_call_timeout() {
        registry = registry.with_call_timeout(timeout);
    }

    registry.build()
}

/// Declare the dispatcher's functions in the agent settings document
///
/// Definitions are appended to `agent.think.functions`, creating the path
/// when it is missing. Functions the document already declares by name are
/// left as written. Returns how many definitions were added.
pub fn advertise_functions(
    settings: &mut Value,
    dispatcher: &FunctionDispatcher,
) -> Result<usize, String> {
    if dispatcher.is_empty() {
        return Ok(0);
    }

    let root = settings
        .as_object_mut()
        .ok_or("Agent settings must be a JSON object")?;
    let agent = object_field(root, "agent", "agent")?;
    let think = object_field(agent, "think", "agent.think")?;
    let declared = think
        .entry("functions")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or("Agent settings field agent.think.functions must be a JSON array")?;

    let mut added = 0;
    for definition in dispatcher.definitions() {
        let name = definition["name"].as_str().unwrap_or_default();
        let exists = declared
            .iter()
            .any(|existing| existing.get("name").and_then(Value::as_str) == Some(name));
        if exists {
            debug!(function = name, "Function already declared in agent settings");
            continue;
        }
        declared.push(definition);
        added += 1;
    }

    Ok(added)
}

fn object_field<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a mut Map<String, Value>, String> {
    map.entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| format!("Agent settings field {path} must be a JSON object"))
}

/// A reserved call slot
///
/// Inserted into the request extensions by the call-limit middleware and
/// carried by the session for its lifetime.
#[derive(Clone)]
pub struct CallSlot {
    inner: Arc<SlotGuard>,
}

struct SlotGuard {
    state: Arc<AppState>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.active_calls.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for CallSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSlot")
            .field("active_calls", &self.inner.state.active_calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::SessionError;
    use crate::core::transport::{BoxedSink, BoxedSource};
    use async_trait::async_trait;
    use serde_json::json;
    use serial_test::serial;

    struct NoAgent;

    #[async_trait]
    impl AgentConnector for NoAgent {
        async fn connect(&self) -> Result<(BoxedSink, BoxedSource), SessionError> {
            Err(SessionError::AgentConnect("no agent in tests".into()))
        }

        fn endpoint(&self) -> &str {
            "test://none"
        }
    }

    fn state_with_limit(limit: Option<usize>) -> Arc<AppState> {
        let mut config = ServerConfig::from_env().unwrap();
        config.max_concurrent_calls = limit;
        AppState::new(
            config,
            Arc::new(FunctionDispatcher::empty()),
            Arc::new(NoAgent),
            json!({"type": "Settings"}),
        )
    }

    #[test]
    #[serial]
    fn test_call_slots_respect_limit() {
        let state = state_with_limit(Some(2));

        let first = state.try_acquire_call().unwrap();
        let second = state.try_acquire_call().unwrap();
        assert_eq!(state.active_calls(), 2);
        assert_eq!(
            state.try_acquire_call().unwrap_err(),
            CallLimitError::LimitReached(2)
        );

        drop(first);
        assert_eq!(state.active_calls(), 1);
        let third = state.try_acquire_call().unwrap();
        assert_eq!(state.active_calls(), 2);

        drop(second);
        drop(third);
        assert_eq!(state.active_calls(), 0);
    }

    #[test]
    #[serial]
    fn test_slot_released_after_last_clone() {
        let state = state_with_limit(None);

        let slot = state.try_acquire_call().unwrap();
        let copy = slot.clone();
        drop(slot);
        assert_eq!(state.active_calls(), 1);
        drop(copy);
        assert_eq!(state.active_calls(), 0);
    }

    #[test]
    #[serial]
    fn test_from_config_requires_api_key() {
        let config = ServerConfig::from_env().unwrap();
        if config.agent_api_key().is_some() {
            return;
        }
        let err = AppState::from_config(config).err().unwrap();
        assert!(err.to_string().contains("DEEPGRAM_API_KEY"));
    }

    #[test]
    #[serial]
    fn test_build_dispatcher_from_definitions() {
        use crate::config::FunctionConfig;
        use crate::core::functions::ParameterSchema;
        use std::collections::HashMap;

        let mut config = ServerConfig::from_env().unwrap();
        config.functions = vec![FunctionConfig {
            name: "place_order".to_string(),
            url: "https://orders.example.com".to_string(),
            description: Some("Place an order".to_string()),
            parameters: ParameterSchema::default(),
            headers: HashMap::new(),
            timeout_secs: Some(2),
        }];
        config.function_call_timeout_secs = Some(5);

        let dispatcher = build_dispatcher(&config);
        assert_eq!(dispatcher.names(), vec!["place_order"]);
        assert_eq!(
            dispatcher.call_timeout(),
            Some(std::time::Duration::from_secs(5))
        );
        assert_eq!(dispatcher.definitions()[0]["description"], "Place an order");
    }

    fn menu_dispatcher() -> FunctionDispatcher {
        use crate::core::functions::{FunctionError, FunctionRegistry, ParameterSchema, handler_fn};

        FunctionRegistry::new()
            .register(
                "get_menu",
                ParameterSchema::new(),
                handler_fn(|_| async { Ok::<_, FunctionError>(json!([])) }),
            )
            .register(
                "place_order",
                ParameterSchema::new(),
                handler_fn(|_| async { Ok::<_, FunctionError>(json!({})) }),
            )
            .build()
    }

    #[test]
    fn test_advertise_functions_creates_path() {
        let mut settings = json!({"type": "Settings", "audio": {}});

        let added = advertise_functions(&mut settings, &menu_dispatcher()).unwrap();
        assert_eq!(added, 2);

        let functions = settings["agent"]["think"]["functions"].as_array().unwrap();
        assert_eq!(functions[0]["name"], "get_menu");
        assert_eq!(functions[0]["parameters"]["type"], "object");
        assert_eq!(functions[1]["name"], "place_order");
        assert_eq!(settings["audio"], json!({}));
    }

    #[test]
    fn test_advertise_functions_keeps_declared_entries() {
        let mut settings = json!({
            "type": "Settings",
            "agent": {"think": {
                "provider": {"type": "open_ai"},
                "functions": [{"name": "get_menu", "description": "Hand-written"}]
            }}
        });

        let added = advertise_functions(&mut settings, &menu_dispatcher()).unwrap();
        assert_eq!(added, 1);

        let functions = settings["agent"]["think"]["functions"].as_array().unwrap();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0]["description"], "Hand-written");
        assert_eq!(functions[1]["name"], "place_order");
        assert_eq!(settings["agent"]["think"]["provider"]["type"], "open_ai");
    }

    #[test]
    fn test_advertise_functions_rejects_wrong_shapes() {
        let mut settings = json!({"agent": {"think": "fast"}});
        let err = advertise_functions(&mut settings, &menu_dispatcher()).unwrap_err();
        assert!(err.contains("agent.think must be a JSON object"));

        let mut settings = json!({"agent": {"think": {"functions": {}}}});
        assert!(advertise_functions(&mut settings, &menu_dispatcher()).is_err());
    }

    #[test]
    fn test_advertise_nothing_leaves_settings_alone() {
        let mut settings = json!({"type": "Settings"});
        let added = advertise_functions(&mut settings, &FunctionDispatcher::empty()).unwrap();
        assert_eq!(added, 0);
        assert_eq!(settings, json!({"type": "Settings"}));
    }
}
