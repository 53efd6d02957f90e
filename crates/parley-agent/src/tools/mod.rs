use crate::{ExecutionBackend, SchemaError, ToolError};
use futures::FutureExt;
use parley_realtime::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

mod catalog;
mod history;
mod python;
mod registry;
mod weather;

pub use catalog::{BuiltinToolSource, ToolCatalog, ToolSource};
pub use history::{ToolInvocationRecord, render_history};
pub use python::python_tool;
pub use registry::{RejectedTool, ToolRegistry};
pub use weather::{WeatherClient, geocode_tool, weather_tool};

/// Name of the code-execution tool, which gets lenient argument handling.
pub const CODE_TOOL: &str = "python";
/// Parameter name reserved for backend injection. Never exposed in a schema.
pub const BACKEND_PARAM: &str = "kernel";

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;
pub type PlainToolFn = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;
pub type BackendToolFn = Arc<dyn Fn(Value, Arc<dyn ExecutionBackend>) -> ToolFuture + Send + Sync>;

/// Callable behind a tool. Backend-bound tools receive the session's execution
/// backend at registration time; the remote model never sees that parameter.
#[derive(Clone)]
pub enum Tool {
    Plain(PlainToolFn),
    BackendBound(BackendToolFn),
}

impl Tool {
    pub fn plain<F, Fut>(call: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self::Plain(Arc::new(move |args| call(args).boxed()))
    }

    pub fn plain_sync<F>(call: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self::Plain(Arc::new(move |args| futures::future::ready(call(args)).boxed()))
    }

    pub fn backend_bound<F, Fut>(call: F) -> Self
    where
        F: Fn(Value, Arc<dyn ExecutionBackend>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self::BackendBound(Arc::new(move |args, backend| call(args, backend).boxed()))
    }

    pub fn needs_backend(&self) -> bool {
        matches!(self, Self::BackendBound(_))
    }

    /// Pointer identity of the underlying callable.
    pub fn same_callable(&self, other: &Tool) -> bool {
        match (self, other) {
            (Self::Plain(a), Self::Plain(b)) => Arc::ptr_eq(a, b),
            (Self::BackendBound(a), Self::BackendBound(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Tool::Plain"),
            Self::BackendBound(_) => f.write_str("Tool::BackendBound"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    /// No declared type. Described as a string.
    Untyped,
}

impl ParamKind {
    pub fn schema_type(&self) -> &'static str {
        match self {
            Self::String | Self::Untyped => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Untyped => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: Option<String>,
    /// Present means optional.
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind, default: Value) -> Self {
        Self {
            default: Some(default),
            ..Self::required(name, kind)
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Declarative tool definition handed to the registry.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub schema_override: Option<Value>,
    pub tool: Tool,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, tool: Tool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            schema_override: None,
            tool,
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema_override = Some(schema);
        self
    }

    pub fn same_tool(&self, other: &ToolSpec) -> bool {
        self.tool.same_callable(&other.tool)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name.clone(),
            self.description.clone(),
            self.parameters.clone(),
        )
    }
}

fn valid_tool_name(name: &str) -> bool {
    name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Builds the wire descriptor for a spec. A schema override wins over the
/// declared parameters.
pub fn describe(spec: &ToolSpec) -> Result<ToolDescriptor, SchemaError> {
    if spec.name.is_empty() {
        return Err(SchemaError::EmptyToolName);
    }
    if !valid_tool_name(&spec.name) {
        return Err(SchemaError::InvalidToolName(spec.name.clone()));
    }

    if let Some(schema) = &spec.schema_override {
        let is_object_schema = schema.is_object()
            && schema.get("type").and_then(Value::as_str) == Some("object");
        if !is_object_schema {
            return Err(SchemaError::InvalidSchemaOverride {
                tool: spec.name.clone(),
            });
        }
        return Ok(ToolDescriptor {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: schema.clone(),
        });
    }

    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut seen = HashSet::new();
    for param in &spec.params {
        if param.name.is_empty() {
            return Err(SchemaError::EmptyParameterName {
                tool: spec.name.clone(),
            });
        }
        if !seen.insert(param.name.as_str()) {
            return Err(SchemaError::DuplicateParameter {
                tool: spec.name.clone(),
                parameter: param.name.clone(),
            });
        }
        if param.name == BACKEND_PARAM {
            continue;
        }

        let mut property = Map::new();
        property.insert("type".to_string(), json!(param.kind.schema_type()));
        if let Some(description) = &param.description {
            property.insert("description".to_string(), json!(description));
        }
        match &param.default {
            Some(default) => {
                if !param.kind.accepts(default) {
                    return Err(SchemaError::DefaultTypeMismatch {
                        tool: spec.name.clone(),
                        parameter: param.name.clone(),
                        expected: param.kind.schema_type(),
                    });
                }
                property.insert("default".to_string(), default.clone());
            }
            None => required.push(json!(param.name)),
        }
        properties.insert(param.name.clone(), Value::Object(property));
    }

    Ok(ToolDescriptor {
        name: spec.name.clone(),
        description: spec.description.clone(),
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    })
}

/// Reads a required string argument.
pub(crate) fn required_string_argument(args: &Value, key: &str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::Execution(format!("missing required argument '{key}'")))
}

pub(crate) fn required_f64_argument(args: &Value, key: &str) -> Result<f64, ToolError> {
    let value = args
        .get(key)
        .ok_or_else(|| ToolError::Execution(format!("missing required argument '{key}'")))?;
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ToolError::Execution(format!("argument '{key}' must be a number")))
}
