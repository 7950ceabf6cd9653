//! Tool registry: discovery and dispatch by name.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use spg_domain::envelope::ResponseEnvelope;
use spg_domain::error::ErrorKind;

use crate::core::Core;
use crate::protocol::ToolDefinition;

/// One named operation exposed over the protocol.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema of the accepted arguments.
    fn input_schema(&self) -> Value;
    /// Run the operation. Tools never fail at the protocol level: every
    /// outcome is an envelope.
    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope;
}

/// Registry of all exposed tools.
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the full operation surface registered.
    pub fn new() -> Self {
        let mut registry = Self {
            tools: BTreeMap::new(),
        };

        registry.register(Box::new(crate::tools::auth::AuthenticateTool));
        registry.register(Box::new(crate::tools::filters::ListFiltersTool));
        registry.register(Box::new(crate::tools::orders::ListOrdersTool));
        registry.register(Box::new(crate::tools::orders::GetOrderTool));
        registry.register(Box::new(crate::tools::orders::GetOrderItemsTool));
        registry.register(Box::new(crate::tools::inventory::InventoryInStockTool));
        registry.register(Box::new(crate::tools::listings::GetListingTool));
        registry.register(Box::new(crate::tools::listings::UpdateListingTool));
        registry.register(Box::new(crate::tools::listings::UpdatePriceTool));
        registry.register(Box::new(crate::tools::listings::UpdateFbmInventoryTool));
        registry.register(Box::new(crate::tools::listings::BulkUpdateFbmInventoryTool));
        registry.register(Box::new(crate::tools::feeds::SubmitFeedTool));
        registry.register(Box::new(crate::tools::feeds::FeedStatusTool));
        registry.register(Box::new(crate::tools::reports::RequestReportTool));
        registry.register(Box::new(crate::tools::reports::GetReportTool));

        tracing::debug!(tools = registry.tools.len(), "tool registry built");
        registry
    }

    fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Run a tool by name; an unknown name is an envelope-level error.
    pub async fn call(&self, core: &Core, name: &str, args: &Value) -> ResponseEnvelope {
        match self.tools.get(name) {
            Some(tool) => tool.execute(core, args).await,
            None => ResponseEnvelope::err(ErrorKind::InvalidInput(format!(
                "unknown tool '{name}'"
            ))),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_surface_is_registered() {
        let registry = ToolRegistry::new();
        for name in [
            "authenticate",
            "listOrders",
            "getOrder",
            "getOrderItems",
            "inventoryInStock",
            "getListing",
            "updateListing",
            "updatePrice",
            "updateFbmInventory",
            "bulkUpdateFbmInventory",
            "submitFeed",
            "feedStatus",
            "requestReport",
            "getReport",
            "listFilters",
        ] {
            assert!(registry.has(name), "missing tool {name}");
        }
        assert_eq!(registry.list().len(), 15);
    }

    #[test]
    fn definitions_carry_schemas() {
        let registry = ToolRegistry::new();
        for def in registry.list() {
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
        }
    }
}
