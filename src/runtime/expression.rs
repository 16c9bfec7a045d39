/// Template expression evaluation
///
/// Parameters and node input may reference the live workflow context with
/// `{{ ... }}` templates. A reference is a root key (`$input`, `$execution`
/// or `$node.<id>`) followed by an optional JSONPath tail:
///
/// - `{{ $input.user.email }}`
/// - `{{ $node.fetch.data.body.items[0].name }}`
/// - `Hello {{ $input.name }}!` (interpolated as text)
///
/// A string that is exactly one template keeps the referenced value's JSON
/// type; mixed strings are rendered as text.

use crate::runtime::context::{EXECUTION_KEY, INPUT_KEY, NODE_KEY_PREFIX};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ExpressionError(pub String);

/// Pluggable evaluator consulted by the node executor before every node runs
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate_parameters(
        &self,
        params: &Map<String, Value>,
        context: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ExpressionError>;
}

/// Default `{{ ... }}` evaluator backed by jsonpath_lib
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateEvaluator;

impl ExpressionEvaluator for TemplateEvaluator {
    fn evaluate_parameters(
        &self,
        params: &Map<String, Value>,
        context: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ExpressionError> {
        params
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.evaluate_value(value, context)?)))
            .collect()
    }
}

impl TemplateEvaluator {
    /// Resolve templates anywhere inside a JSON value
    pub fn evaluate_value(&self, value: &Value, context: &Map<String, Value>) -> Result<Value, ExpressionError> {
        match value {
            Value::String(s) => self.evaluate_string(s, context),
            Value::Array(items) => items
                .iter()
                .map(|item| self.evaluate_value(item, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => self.evaluate_parameters(map, context).map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn evaluate_string(&self, s: &str, context: &Map<String, Value>) -> Result<Value, ExpressionError> {
        if !s.contains("{{") {
            return Ok(Value::String(s.to_string()));
        }

        let mut parts = Vec::new();
        let mut rest = s;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                return Err(ExpressionError(format!("Unterminated template in '{}'", s)));
            };
            if open > 0 {
                parts.push(Part::Text(&rest[..open]));
            }
            parts.push(Part::Expr(rest[open + 2..open + 2 + close].trim()));
            rest = &rest[open + 2 + close + 2..];
        }
        if !rest.is_empty() {
            parts.push(Part::Text(rest));
        }

        if let [Part::Expr(expr)] = parts.as_slice() {
            return self.resolve(expr, context);
        }

        let mut rendered = String::new();
        for part in parts {
            match part {
                Part::Text(text) => rendered.push_str(text),
                Part::Expr(expr) => match self.resolve(expr, context)? {
                    Value::String(text) => rendered.push_str(&text),
                    Value::Null => {}
                    other => rendered.push_str(&other.to_string()),
                },
            }
        }
        Ok(Value::String(rendered))
    }

    /// Resolve a single reference against the context
    fn resolve(&self, expr: &str, context: &Map<String, Value>) -> Result<Value, ExpressionError> {
        if expr.is_empty() {
            return Err(ExpressionError("Empty template expression".to_string()));
        }

        let root_key = root_key(expr, context)
            .ok_or_else(|| ExpressionError(format!("Unknown reference '{}'", expr)))?;
        let root = context
            .get(root_key)
            .ok_or_else(|| ExpressionError(format!("Unknown reference '{}'", expr)))?;

        let tail = &expr[root_key.len()..];
        if tail.is_empty() {
            return Ok(root.clone());
        }

        let path = format!("${}", tail);
        let matches = jsonpath_lib::select(root, &path)
            .map_err(|e| ExpressionError(format!("Invalid path '{}' in '{}': {:?}", tail, expr, e)))?;

        Ok(match matches.as_slice() {
            [] => Value::Null,
            [single] => (*single).clone(),
            many => Value::Array(many.iter().map(|v| (*v).clone()).collect()),
        })
    }
}

enum Part<'a> {
    Text(&'a str),
    Expr(&'a str),
}

/// Longest context key the expression starts with, on a path boundary
fn root_key<'a>(expr: &str, context: &'a Map<String, Value>) -> Option<&'a str> {
    let on_boundary = |key: &str| {
        expr.starts_with(key) && matches!(expr[key.len()..].chars().next(), None | Some('.') | Some('['))
    };

    if expr.starts_with(NODE_KEY_PREFIX) {
        return context
            .keys()
            .filter(|key| key.starts_with(NODE_KEY_PREFIX) && on_boundary(key.as_str()))
            .max_by_key(|key| key.len())
            .map(String::as_str);
    }

    [INPUT_KEY, EXECUTION_KEY]
        .into_iter()
        .find(|&key| on_boundary(key))
        .and_then(|key| context.get_key_value(key))
        .map(|(key, _)| key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Map<String, Value> {
        json!({
            "$execution": {"executionId": "exec-9"},
            "$input": {"name": "Ada", "age": 36, "tags": ["a", "b"]},
            "$node.fetch": {"success": true, "data": {"body": {"items": [{"id": 1}, {"id": 2}]}}},
            "$node.fetch-2": {"success": true, "data": {"status": 404}},
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn eval(value: Value) -> Result<Value, ExpressionError> {
        TemplateEvaluator.evaluate_value(&value, &context())
    }

    #[test]
    fn single_template_keeps_type() {
        assert_eq!(eval(json!("{{ $input.age }}")).unwrap(), json!(36));
        assert_eq!(eval(json!("{{$input.tags}}")).unwrap(), json!(["a", "b"]));
        assert_eq!(eval(json!("{{ $input }}")).unwrap()["name"], json!("Ada"));
    }

    #[test]
    fn mixed_strings_interpolate() {
        assert_eq!(
            eval(json!("Hi {{ $input.name }} ({{ $input.age }}) run {{ $execution.executionId }}")).unwrap(),
            json!("Hi Ada (36) run exec-9")
        );
    }

    #[test]
    fn node_references_pick_longest_id() {
        assert_eq!(eval(json!("{{ $node.fetch-2.data.status }}")).unwrap(), json!(404));
        assert_eq!(eval(json!("{{ $node.fetch.data.body.items[1].id }}")).unwrap(), json!(2));
    }

    #[test]
    fn nested_structures_are_walked() {
        let out = eval(json!({"user": {"who": "{{ $input.name }}"}, "list": ["{{ $input.age }}", 3]})).unwrap();
        assert_eq!(out, json!({"user": {"who": "Ada"}, "list": [36, 3]}));
    }

    #[test]
    fn missing_path_is_null() {
        assert_eq!(eval(json!("{{ $input.nope }}")).unwrap(), Value::Null);
    }

    #[test]
    fn failures() {
        assert!(eval(json!("{{ $input.name")).is_err());
        assert!(eval(json!("{{ $secrets.key }}")).is_err());
        assert!(eval(json!("{{ $node.unknown.data }}")).is_err());
        assert!(eval(json!("{{ }}")).is_err());
    }

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(eval(json!("no templates")).unwrap(), json!("no templates"));
        assert_eq!(eval(json!(true)).unwrap(), json!(true));
    }
}
