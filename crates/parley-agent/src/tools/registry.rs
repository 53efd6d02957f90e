use super::python::coerce_code_arguments;
use super::{
    CODE_TOOL, PlainToolFn, Tool, ToolDescriptor, ToolInvocationRecord, ToolSpec, describe,
    render_history,
};
use crate::{ExecutionBackend, SchemaError, ToolError};
use chrono::Utc;
use parley_realtime::{ToolChoice, ToolDefinition};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// A tool that could not be registered, and why.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedTool {
    pub name: String,
    pub error: SchemaError,
}

/// Active tool set for one session plus its invocation history.
///
/// `register` replaces the set wholesale; bound names and descriptors always
/// cover the same tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    bound: HashMap<String, PlainToolFn>,
    descriptors: Vec<ToolDescriptor>,
    tool_choice: ToolChoice,
    history: Vec<ToolInvocationRecord>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        specs: &[ToolSpec],
        backend: Option<Arc<dyn ExecutionBackend>>,
    ) -> Vec<RejectedTool> {
        let mut bound = HashMap::new();
        let mut descriptors = Vec::new();
        let mut rejected = Vec::new();

        for spec in specs {
            match bind(spec, backend.as_ref(), &bound) {
                Ok((descriptor, call)) => {
                    bound.insert(descriptor.name.clone(), call);
                    descriptors.push(descriptor);
                }
                Err(error) => {
                    tracing::warn!(tool = %spec.name, error = %error, "tool rejected");
                    rejected.push(RejectedTool {
                        name: spec.name.clone(),
                        error,
                    });
                }
            }
        }

        self.bound = bound;
        self.descriptors = descriptors;
        self.tool_choice = if self.descriptors.is_empty() {
            ToolChoice::None
        } else {
            ToolChoice::Auto
        };
        tracing::info!(
            tools = ?self.names(),
            tool_choice = self.tool_choice.as_str(),
            "tool set registered"
        );
        rejected
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.descriptors
            .iter()
            .map(ToolDescriptor::to_definition)
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bound.contains_key(name)
    }

    pub fn tool_choice(&self) -> ToolChoice {
        self.tool_choice
    }

    pub fn history(&self) -> &[ToolInvocationRecord] {
        &self.history
    }

    pub fn render_history(&self) -> String {
        render_history(&self.history)
    }

    /// Parses a raw argument string. The code tool never fails here: anything
    /// that is not a JSON object is treated as the code itself.
    pub fn parse_arguments(&self, name: &str, raw: &str) -> Result<Value, ToolError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) if name == CODE_TOOL && !value.is_object() => Ok(json!({ "code": raw })),
            Ok(value) => Ok(value),
            Err(_) if name == CODE_TOOL => Ok(json!({ "code": raw })),
            Err(error) => Err(ToolError::InvalidArguments {
                tool: name.to_string(),
                message: error.to_string(),
            }),
        }
    }

    /// Runs a tool and records exactly one history entry. Failures come back as
    /// `{"error": message}` instead of an `Err`.
    pub async fn invoke(&mut self, name: &str, arguments: Value) -> Value {
        let started_at = Utc::now();
        let clock = Instant::now();

        let Some(call) = self.bound.get(name).cloned() else {
            let result = error_payload(&ToolError::NotFound(name.to_string()));
            self.record(name, arguments, result.clone(), started_at, clock, false);
            return result;
        };

        let arguments = if name == CODE_TOOL {
            coerce_code_arguments(arguments)
        } else {
            arguments
        };

        let (result, success) = match call(arguments.clone()).await {
            Ok(value) => (value, true),
            Err(error) => {
                tracing::warn!(tool = name, error = %error, "tool call failed");
                (error_payload(&error), false)
            }
        };
        self.record(name, arguments, result.clone(), started_at, clock, success);
        result
    }

    fn record(
        &mut self,
        name: &str,
        arguments: Value,
        result: Value,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        success: bool,
    ) {
        self.history.push(ToolInvocationRecord {
            tool: name.to_string(),
            arguments,
            result,
            started_at,
            duration: clock.elapsed(),
            success,
        });
    }
}

fn error_payload(error: &ToolError) -> Value {
    json!({ "error": error.to_string() })
}

fn bind(
    spec: &ToolSpec,
    backend: Option<&Arc<dyn ExecutionBackend>>,
    already_bound: &HashMap<String, PlainToolFn>,
) -> Result<(ToolDescriptor, PlainToolFn), SchemaError> {
    if already_bound.contains_key(&spec.name) {
        return Err(SchemaError::DuplicateTool(spec.name.clone()));
    }
    let call: PlainToolFn = match &spec.tool {
        Tool::Plain(call) => call.clone(),
        Tool::BackendBound(call) => {
            let Some(backend) = backend else {
                return Err(SchemaError::MissingBackend(spec.name.clone()));
            };
            let call = call.clone();
            let backend = backend.clone();
            Arc::new(move |args| call(args, backend.clone()))
        }
    };
    Ok((describe(spec)?, call))
}
