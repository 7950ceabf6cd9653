//! Order tools: `listOrders`, `getOrder`, `getOrderItems`.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use spg_client::paginate::{self, Page};
use spg_client::RequestContext;
use spg_domain::envelope::{iso, ResponseEnvelope, ResponseMetadata};
use spg_domain::error::{ErrorKind, Result};

use crate::core::Core;
use crate::postprocess::{self, FilterInvocation};
use crate::registry::Tool;

/// Record cap for paginated order listings.
const MAX_ORDERS: usize = 100;

const VALID_STATUSES: &[&str] = &[
    "Pending",
    "PendingAvailability",
    "Unshipped",
    "PartiallyShipped",
    "Shipped",
    "Canceled",
    "Unfulfillable",
    "InvoiceUnconfirmed",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// listOrders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ListOrdersTool;

#[async_trait]
impl Tool for ListOrdersTool {
    fn name(&self) -> &'static str {
        "listOrders"
    }

    fn description(&self) -> &'static str {
        "List orders in a date range, optionally filtered by status."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "marketplaceIds": {"type": "array", "items": {"type": "string"}},
                "createdAfter": {"type": "string", "format": "date-time"},
                "createdBefore": {"type": "string", "format": "date-time"},
                "statuses": {"type": "array", "items": {"type": "string"}},
                "maxResults": {"type": "integer", "minimum": 1, "maximum": 100},
                "filterId": {"type": "string"},
                "filterChain": {"type": "string"},
                "customFilter": {"type": "string"},
                "filterParams": {"type": "object"},
                "reduceResponse": {"type": "boolean"}
            },
            "required": ["token"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(list_orders(core, args).await)
    }
}

async fn list_orders(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;

    let ids = super::string_list(args, "marketplaceIds")?;
    let marketplace = core.marketplace(ids.as_deref())?;
    let invocation = FilterInvocation::from_args(args)?;

    let created_after = super::optional_date(args, "createdAfter")?
        .unwrap_or_else(|| iso(Utc::now() - Duration::days(30)));
    let created_before = super::optional_date(args, "createdBefore")?;
    if let Some(before) = &created_before {
        if *before < created_after {
            return Err(ErrorKind::InvalidInput(
                "createdBefore precedes createdAfter".into(),
            ));
        }
    }

    let statuses = super::string_list(args, "statuses")?;
    if let Some(statuses) = &statuses {
        for status in statuses {
            if !VALID_STATUSES.contains(&status.as_str()) {
                return Err(ErrorKind::InvalidInput(format!(
                    "unknown order status '{status}'"
                )));
            }
        }
    }

    let cap = super::optional_u32(args, "maxResults")?
        .map(|n| n.clamp(1, MAX_ORDERS as u32) as usize)
        .unwrap_or(MAX_ORDERS);

    let mut ctx = RequestContext::new("listOrders", "GET", "/orders/v0/orders", marketplace)
        .with_query("MarketplaceIds", marketplace.id)
        .with_query("CreatedAfter", created_after.clone());
    if let Some(before) = &created_before {
        ctx = ctx.with_query("CreatedBefore", before.clone());
    }
    if let Some(statuses) = &statuses {
        ctx = ctx.with_query("OrderStatuses", statuses.join(","));
    }

    let (orders, request_id) =
        paginate::fetch_pages(&core.dispatcher, &ctx, "NextToken", cap, orders_page).await?;

    let mut metadata = ResponseMetadata::new(marketplace.id, request_id);
    let data = postprocess::apply(
        &core.catalog,
        "listOrders",
        Value::Array(orders),
        &invocation,
        &mut metadata,
    )?;
    Ok((data, metadata))
}

fn orders_page(payload: &Value) -> Page {
    let body = payload.get("payload").unwrap_or(payload);
    Page {
        records: body
            .get("Orders")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        next_token: body
            .get("NextToken")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// getOrder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GetOrderTool;

#[async_trait]
impl Tool for GetOrderTool {
    fn name(&self) -> &'static str {
        "getOrder"
    }

    fn description(&self) -> &'static str {
        "Fetch one order by its order id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "orderId": {"type": "string"}
            },
            "required": ["token", "orderId"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(get_order(core, args).await)
    }
}

async fn get_order(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let order_id = validated_order_id(args)?;
    let marketplace = core.marketplace(None)?;

    let ctx = RequestContext::new(
        "getOrder",
        "GET",
        format!("/orders/v0/orders/{order_id}"),
        marketplace,
    );
    let response = core.dispatcher.dispatch(&ctx).await?;
    let data = response
        .payload
        .get("payload")
        .cloned()
        .unwrap_or(response.payload);

    Ok((data, ResponseMetadata::new(marketplace.id, response.request_id)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// getOrderItems
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GetOrderItemsTool;

#[async_trait]
impl Tool for GetOrderItemsTool {
    fn name(&self) -> &'static str {
        "getOrderItems"
    }

    fn description(&self) -> &'static str {
        "List the line items of one order."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "orderId": {"type": "string"},
                "filterId": {"type": "string"},
                "filterChain": {"type": "string"},
                "customFilter": {"type": "string"},
                "filterParams": {"type": "object"},
                "reduceResponse": {"type": "boolean"}
            },
            "required": ["token", "orderId"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(get_order_items(core, args).await)
    }
}

async fn get_order_items(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let order_id = validated_order_id(args)?;
    let marketplace = core.marketplace(None)?;
    let invocation = FilterInvocation::from_args(args)?;

    let ctx = RequestContext::new(
        "getOrderItems",
        "GET",
        format!("/orders/v0/orders/{order_id}/orderItems"),
        marketplace,
    );
    let (items, request_id) =
        paginate::fetch_pages(&core.dispatcher, &ctx, "NextToken", MAX_ORDERS, items_page).await?;

    let mut metadata = ResponseMetadata::new(marketplace.id, request_id);
    let data = postprocess::apply(
        &core.catalog,
        "getOrderItems",
        Value::Array(items),
        &invocation,
        &mut metadata,
    )?;
    Ok((data, metadata))
}

fn items_page(payload: &Value) -> Page {
    let body = payload.get("payload").unwrap_or(payload);
    Page {
        records: body
            .get("OrderItems")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        next_token: body
            .get("NextToken")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

// ── Shared validation ────────────────────────────────────────────────

/// Order ids have the 3-7-7 digit shape (`123-1234567-1234567`).
fn validated_order_id(args: &Value) -> Result<String> {
    let order_id = super::required_str(args, "orderId")?;
    let parts: Vec<&str> = order_id.split('-').collect();
    let well_formed = parts.len() == 3
        && parts[0].len() == 3
        && parts[1].len() == 7
        && parts[2].len() == 7
        && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        return Err(ErrorKind::InvalidInput(format!(
            "orderId '{order_id}' is not a well-formed order id"
        )));
    }
    Ok(order_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_shape_is_enforced() {
        let ok = json!({"orderId": "123-1234567-1234567"});
        assert!(validated_order_id(&ok).is_ok());

        for bad in [
            "123-1234567",
            "1234-123456-1234567",
            "abc-1234567-1234567",
            "123-1234567-12345678",
            "",
        ] {
            let args = json!({ "orderId": bad });
            assert!(validated_order_id(&args).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn pages_extract_records_and_token() {
        let page = orders_page(&json!({
            "payload": {"Orders": [{"AmazonOrderId": "1"}], "NextToken": "t"}
        }));
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.next_token.as_deref(), Some("t"));

        let last = orders_page(&json!({"payload": {"Orders": []}}));
        assert!(last.records.is_empty());
        assert!(last.next_token.is_none());
    }
}
