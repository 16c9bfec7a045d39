/// Built-in node capabilities
///
/// Reference implementations registered by `NodeRegistry::with_builtins`:
/// - `manual-trigger` / `webhook-trigger`: entry points, pass input through
/// - `set-variable`: assign values onto the input
/// - `if-condition`: compare two values and select the "true"/"false" port
/// - `http-request`: outbound HTTP call via reqwest

use crate::nodes::{Node, NodeContext, NodeExecutionResult, NodeRegistry};
use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub fn register_builtins(registry: &NodeRegistry) {
    registry.register("manual-trigger", || TriggerNode);
    registry.register("webhook-trigger", || TriggerNode);
    registry.register("set-variable", || SetVariableNode);
    registry.register("if-condition", || IfConditionNode);
    registry.register("http-request", || HttpRequestNode);
}

/// Entry point: the workflow input becomes the node output
pub struct TriggerNode;

#[async_trait]
impl Node for TriggerNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeExecutionResult> {
        tracing::debug!("🎯 Trigger '{}' passing {} input fields", ctx.node_id, ctx.input.len());
        Ok(NodeExecutionResult::success(ctx.input))
    }
}

/// Assigns values onto the incoming data
///
/// Params: `{ "values": { "k": v, ... } }` or `{ "name": "k", "value": v }`
pub struct SetVariableNode;

#[async_trait]
impl Node for SetVariableNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeExecutionResult> {
        let mut output = ctx.input;

        if let Some(values) = ctx.parameters.get("values") {
            let values = values
                .as_object()
                .context("set-variable 'values' parameter must be an object")?;
            for (key, value) in values {
                output.insert(key.clone(), value.clone());
            }
        } else if let Some(name) = ctx.parameters.get("name").and_then(Value::as_str) {
            let value = ctx.parameters.get("value").cloned().unwrap_or(Value::Null);
            output.insert(name.to_string(), value);
        } else {
            bail!("set-variable requires either 'values' or 'name' parameter");
        }

        Ok(NodeExecutionResult::success(output))
    }
}

/// Compares `left` against `right` and selects an output port
///
/// Params: `{ "left": ..., "operator": "equals", "right": ... }`
pub struct IfConditionNode;

#[async_trait]
impl Node for IfConditionNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeExecutionResult> {
        let left = ctx.parameters.get("left").cloned().unwrap_or(Value::Null);
        let right = ctx.parameters.get("right").cloned().unwrap_or(Value::Null);
        let operator = ctx
            .parameters
            .get("operator")
            .and_then(Value::as_str)
            .unwrap_or("equals");

        let outcome = evaluate_condition(&left, operator, &right)?;
        tracing::debug!("🔀 Condition '{}': {} {} {} => {}", ctx.node_id, left, operator, right, outcome);

        let mut data = ctx.input;
        data.insert("result".to_string(), Value::Bool(outcome));
        let port = if outcome { "true" } else { "false" };
        Ok(NodeExecutionResult::success(data).with_selected_output(port))
    }
}

fn evaluate_condition(left: &Value, operator: &str, right: &Value) -> Result<bool> {
    match operator {
        "equals" => Ok(loosely_equal(left, right)),
        "notEquals" => Ok(!loosely_equal(left, right)),
        "greaterThan" => Ok(as_number(left)? > as_number(right)?),
        "lessThan" => Ok(as_number(left)? < as_number(right)?),
        "contains" => Ok(match left {
            Value::String(s) => s.contains(&display(right)),
            Value::Array(items) => items.iter().any(|item| loosely_equal(item, right)),
            Value::Object(map) => right.as_str().is_some_and(|key| map.contains_key(key)),
            _ => false,
        }),
        "isTrue" => Ok(truthy(left)),
        "isEmpty" => Ok(match left {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }),
        other => bail!("unsupported condition operator: {}", other),
    }
}

/// Numbers compare numerically, everything else by value or text form
fn loosely_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (as_number(left), as_number(right)) {
        (Ok(a), Ok(b)) => a == b,
        _ => display(left) == display(right),
    }
}

fn as_number(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64().context("number out of range"),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("'{}' is not a number", s)),
        other => bail!("{} is not a number", other),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// HTTP client for external API calls
///
/// Params: `{ "url": "...", "method": "POST", "headers": {...}, "body": ... }`
/// Non-2xx responses are failures so the executor's retry policy applies.
pub struct HttpRequestNode;

#[async_trait]
impl Node for HttpRequestNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeExecutionResult> {
        let url = ctx
            .parameters
            .get("url")
            .and_then(Value::as_str)
            .context("http-request missing 'url' parameter")?;
        let method = ctx
            .parameters
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();

        tracing::debug!("🌍 HTTP Request: {} {}", method, url);

        let client = &ctx.services.http;
        let mut request = match method.as_str() {
            "GET" => client.get(url),
            "POST" => client.post(url),
            "PUT" => client.put(url),
            "DELETE" => client.delete(url),
            "PATCH" => client.patch(url),
            other => bail!("Unsupported HTTP method: {}", other),
        };

        if let Some(headers) = ctx.parameters.get("headers").and_then(Value::as_object) {
            for (key, value) in headers {
                request = request.header(key.as_str(), display(value));
            }
        }

        if let Some(body) = ctx.parameters.get("body") {
            request = match body {
                Value::String(text) => request.body(text.clone()),
                Value::Null => request,
                other => request.json(other),
            };
        }

        let response = request.send().await.context("HTTP request failed")?;
        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let text = response.text().await.context("Failed to read response body")?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        tracing::info!("📡 HTTP request completed: {} {} (status: {})", method, url, status);

        let mut data = Map::new();
        data.insert("status".to_string(), json!(status.as_u16()));
        data.insert("headers".to_string(), json!(headers));
        data.insert("body".to_string(), body);

        if status.is_success() {
            Ok(NodeExecutionResult::success(data))
        } else {
            let mut result = NodeExecutionResult::failure(format!("HTTP {} returned {}", method, status));
            result.data = data;
            Ok(result)
        }
    }
}
