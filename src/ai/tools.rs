//! Host tool registry and round execution
//!
//! Tools are host-exposed functions the model can invoke mid-conversation.
//! The registry is populated once at startup and read-only afterwards. A
//! round's calls are independent: they run concurrently and results pair
//! back by call id, so execution order is unobservable. Failures become
//! per-call error strings in the conversation; they never unwind the
//! engine.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

use super::protocol::ToolSpec;
use crate::types::{ToolCall, ToolCallResult};

/// Per-call metadata handed to a tool execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub call_id: String,
}

/// One host-exposed tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// JSON schema of the arguments object
    fn parameters(&self) -> JsonValue {
        serde_json::json!({ "type": "object" })
    }

    /// Execute the tool; a rejection is stringified into the tool result
    async fn execute(&self, args: JsonValue, ctx: &ToolContext) -> Result<JsonValue, String>;
}

/// Named tools available to a run; populated at load time
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn spec(&self, name: &str) -> Option<ToolSpec> {
        self.tools.get(name).map(|tool| ToolSpec {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
        })
    }

    /// Execute one round's calls concurrently, pairing results by call id
    pub async fn execute_round(&self, calls: &[ToolCall]) -> Vec<ToolCallResult> {
        let mut join_set = JoinSet::new();
        let mut results: Vec<ToolCallResult> = Vec::with_capacity(calls.len());

        for call in calls {
            match self.tools.get(&call.name) {
                Some(tool) => {
                    let tool = Arc::clone(tool);
                    let call = call.clone();
                    join_set.spawn(async move {
                        let ctx = ToolContext {
                            call_id: call.id.clone(),
                        };
                        match tool.execute(call.arguments.clone(), &ctx).await {
                            Ok(value) => ToolCallResult::ok(call.id, value),
                            Err(message) => ToolCallResult::err(call.id, message),
                        }
                    });
                }
                // Unknown tool: fold the failure back to the model
                None => results.push(ToolCallResult::err(
                    call.id.clone(),
                    format!("tool not found: {}", call.name),
                )),
            }
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => debug!("tool task panicked: {}", e),
            }
        }

        // Stable order for logs; consumers pair by id anyway
        results.sort_by(|a, b| a.call_id.cmp(&b.call_id));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, args: JsonValue, _ctx: &ToolContext) -> Result<JsonValue, String> {
            Ok(args)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Tool for AlwaysFails {
        fn name(&self) -> &str {
            "boom"
        }

        async fn execute(&self, _args: JsonValue, _ctx: &ToolContext) -> Result<JsonValue, String> {
            Err("exploded".to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(AlwaysFails));
        registry
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({"id": id}),
        }
    }

    #[test]
    fn results_pair_by_call_id() {
        let results = tokio_test::block_on(
            registry().execute_round(&[call("c2", "echo"), call("c1", "echo")]),
        );

        assert_eq!(results.len(), 2);
        for result in &results {
            let echoed = result.value.as_ref().unwrap()["id"].as_str().unwrap();
            assert_eq!(echoed, result.call_id);
        }
    }

    #[tokio::test]
    async fn failures_and_unknown_tools_become_error_results() {
        let results = registry()
            .execute_round(&[call("c1", "boom"), call("c2", "missing")])
            .await;

        let by_id: HashMap<_, _> = results
            .iter()
            .map(|r| (r.call_id.as_str(), r))
            .collect();
        assert_eq!(by_id["c1"].error.as_deref(), Some("exploded"));
        assert_eq!(
            by_id["c2"].error.as_deref(),
            Some("tool not found: missing")
        );
    }
}
