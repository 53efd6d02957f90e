use super::{CODE_TOOL, Tool, ToolSpec, required_string_argument};
use crate::ToolError;
use serde_json::{Map, Value, json};

pub fn python_tool() -> ToolSpec {
    ToolSpec::new(
        CODE_TOOL,
        "Return result of executing `code` using python. Use this to run any kinds of complex calculations, computation, data analysis, etc.",
        Tool::backend_bound(|args, backend| async move {
            let code = required_string_argument(&args, "code")?;
            let outcome = backend.execute(&code).await?;
            if let Some(traceback) = outcome.error {
                return Err(ToolError::Execution(traceback));
            }

            let mut result = Map::new();
            result.insert("result".to_string(), outcome.result);
            if !outcome.output.is_empty() {
                result.insert("output".to_string(), Value::String(outcome.output));
            }
            Ok(Value::Object(result))
        }),
    )
    .schema(json!({
        "type": "object",
        "properties": {
            "code": {
                "type": "string",
                "description": "The Python code to execute"
            }
        },
        "required": ["code"]
    }))
}

/// Shapes whatever the model sent into `{"code": ...}`.
pub(crate) fn coerce_code_arguments(args: Value) -> Value {
    match args {
        Value::Object(object) if object.get("code").is_some_and(Value::is_string) => {
            Value::Object(object)
        }
        Value::Object(mut object) => match object.remove("args") {
            Some(Value::String(code)) => json!({ "code": code }),
            Some(other) => json!({ "code": other.to_string() }),
            None => json!({ "code": Value::Object(object).to_string() }),
        },
        Value::String(code) => json!({ "code": code }),
        other => json!({ "code": other.to_string() }),
    }
}
