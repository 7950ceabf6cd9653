//! The `authenticate` tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use spg_domain::envelope::{ResponseEnvelope, ResponseMetadata};

use crate::core::Core;
use crate::registry::Tool;

pub struct AuthenticateTool;

#[async_trait]
impl Tool for AuthenticateTool {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn description(&self) -> &'static str {
        "Obtain a session token. Every other tool requires it."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, core: &Core, _args: &Value) -> ResponseEnvelope {
        let token = core.sessions.authenticate();
        let marketplace = core
            .marketplace(None)
            .map(|m| m.id)
            .unwrap_or("unknown");
        ResponseEnvelope::ok(
            json!({"token": token}),
            ResponseMetadata::new(marketplace, super::local_request_id()),
        )
    }
}
