//! Dry-run surface tools.
//!
//! These log what they would do and succeed. They make every macro and
//! autonomous plan runnable from the command line without a browser, and
//! they define the default tool vocabulary.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use stepwise_core::{Params, PermissionScope, default_effect_class};
use tracing::info;

use crate::registry::{Tool, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Int,
}

/// A named action with a fixed parameter list.
pub struct SurfaceTool {
    name: &'static str,
    description: &'static str,
    required: &'static [(&'static str, Kind)],
    optional: &'static [(&'static str, Kind)],
}

impl SurfaceTool {
    fn property((key, kind): &(&'static str, Kind)) -> (String, Value) {
        let ty = match kind {
            Kind::Str => "string",
            Kind::Int => "integer",
        };
        (key.to_string(), json!({ "type": ty }))
    }
}

#[async_trait]
impl Tool for SurfaceTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .required
            .iter()
            .chain(self.optional)
            .map(Self::property)
            .collect();
        let required: Vec<&str> = self.required.iter().map(|(k, _)| *k).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    fn effect_class(&self) -> PermissionScope {
        default_effect_class(self.name)
    }

    async fn execute(&self, params: &Params) -> Result<String, ToolError> {
        if self.name == "wait" {
            let ms = params
                .get("ms")
                .and_then(Value::as_u64)
                .ok_or_else(|| ToolError::InvalidArguments("'ms' must be a non-negative integer".into()))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        let args = params
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(" ");
        info!(tool = self.name, "dry-run {} {}", self.name, args);
        Ok(format!("{} done", self.name))
    }
}

const SELECTOR: (&str, Kind) = ("selector", Kind::Str);

/// The default vocabulary.
pub fn builtin_tools() -> Vec<SurfaceTool> {
    vec![
        SurfaceTool {
            name: "navigate",
            description: "Open a URL",
            required: &[("url", Kind::Str)],
            optional: &[],
        },
        SurfaceTool {
            name: "click",
            description: "Click the element matching a selector",
            required: &[SELECTOR],
            optional: &[],
        },
        SurfaceTool {
            name: "type",
            description: "Type text into the element matching a selector",
            required: &[SELECTOR, ("text", Kind::Str)],
            optional: &[],
        },
        SurfaceTool {
            name: "select",
            description: "Choose an option in a dropdown",
            required: &[SELECTOR, ("value", Kind::Str)],
            optional: &[],
        },
        SurfaceTool {
            name: "hover",
            description: "Move the pointer over an element",
            required: &[SELECTOR],
            optional: &[],
        },
        SurfaceTool {
            name: "scroll",
            description: "Scroll the page, or an element into view",
            required: &[],
            optional: &[SELECTOR, ("dy", Kind::Int)],
        },
        SurfaceTool {
            name: "wait",
            description: "Pause for a number of milliseconds",
            required: &[("ms", Kind::Int)],
            optional: &[],
        },
        SurfaceTool {
            name: "read_text",
            description: "Read the text content of an element",
            required: &[SELECTOR],
            optional: &[],
        },
        SurfaceTool {
            name: "submit",
            description: "Submit the form containing an element",
            required: &[SELECTOR],
            optional: &[],
        },
        SurfaceTool {
            name: "checkout",
            description: "Complete a purchase",
            required: &[],
            optional: &[SELECTOR],
        },
    ]
}
