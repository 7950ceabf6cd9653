//! The `inventoryInStock` tool.
//!
//! The fulfillment-network path reads the inventory summaries endpoint.
//! There is no equivalent for merchant-fulfilled stock, so the FBM view is
//! assembled from the listings endpoint instead and flagged with a
//! caller-visible warning. It is best-effort, not authoritative.

use async_trait::async_trait;
use serde_json::{json, Value};

use spg_client::paginate::{self, Page};
use spg_client::RequestContext;
use spg_domain::envelope::{ResponseEnvelope, ResponseMetadata};
use spg_domain::error::{ErrorKind, Result};
use spg_domain::marketplace::Marketplace;

use crate::core::Core;
use crate::postprocess::{self, FilterInvocation};
use crate::registry::Tool;

const MAX_SUMMARIES: usize = 100;

const FBM_WARNING: &str = "FBM quantities are assembled from listings data and may lag the \
     authoritative inventory; treat them as best-effort";

pub struct InventoryInStockTool;

#[async_trait]
impl Tool for InventoryInStockTool {
    fn name(&self) -> &'static str {
        "inventoryInStock"
    }

    fn description(&self) -> &'static str {
        "In-stock inventory summaries, sorted by quantity descending."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "marketplaceIds": {"type": "array", "items": {"type": "string"}},
                "fulfillmentType": {"type": "string", "enum": ["FBA", "FBM", "ALL"]},
                "sellerId": {"type": "string"},
                "details": {"type": "boolean"},
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
        super::envelope_from(run(core, args).await)
    }
}

async fn run(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;

    let ids = super::string_list(args, "marketplaceIds")?;
    let marketplace = core.marketplace(ids.as_deref())?;
    let invocation = FilterInvocation::from_args(args)?;
    let details = super::optional_bool(args, "details")?;
    let cap = super::optional_u32(args, "maxResults")?
        .map(|n| n.clamp(1, MAX_SUMMARIES as u32) as usize)
        .unwrap_or(MAX_SUMMARIES);

    let fulfillment = super::optional_str(args, "fulfillmentType")?
        .unwrap_or_else(|| "FBA".to_string());
    let seller_id = super::optional_str(args, "sellerId")?;

    let mut warning: Option<String> = None;
    let (mut summaries, request_id) = match fulfillment.as_str() {
        "FBA" => fba_summaries(core, marketplace, details, cap).await?,
        "FBM" => {
            let seller_id = seller_id.ok_or_else(|| {
                ErrorKind::InvalidInput("fulfillmentType=FBM requires sellerId".into())
            })?;
            warning = Some(FBM_WARNING.to_string());
            fbm_view(core, marketplace, &seller_id, cap).await?
        }
        "ALL" => {
            let (mut fba, request_id) = fba_summaries(core, marketplace, details, cap).await?;
            match &seller_id {
                Some(seller_id) => {
                    warning = Some(FBM_WARNING.to_string());
                    let (fbm, _) = fbm_view(core, marketplace, seller_id, cap).await?;
                    fba.extend(fbm);
                }
                None => {
                    warning = Some(
                        "fulfillmentType=ALL without sellerId covers FBA stock only".to_string(),
                    );
                }
            }
            (fba, request_id)
        }
        other => {
            return Err(ErrorKind::InvalidInput(format!(
                "fulfillmentType must be FBA, FBM or ALL; got {other:?}"
            )))
        }
    };

    // In-stock only, largest quantities first.
    summaries.retain(|s| quantity_of(s) > 0);
    summaries.sort_by(|a, b| quantity_of(b).cmp(&quantity_of(a)));
    summaries.truncate(cap);

    let mut metadata = ResponseMetadata::new(marketplace.id, request_id);
    metadata.warning = warning;
    let data = postprocess::apply(
        &core.catalog,
        "inventoryInStock",
        Value::Array(summaries),
        &invocation,
        &mut metadata,
    )?;
    Ok((data, metadata))
}

fn quantity_of(summary: &Value) -> i64 {
    summary
        .get("totalQuantity")
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

async fn fba_summaries(
    core: &Core,
    marketplace: &'static Marketplace,
    details: bool,
    cap: usize,
) -> Result<(Vec<Value>, String)> {
    let ctx = RequestContext::new(
        "inventoryInStock",
        "GET",
        "/fba/inventory/v1/summaries",
        marketplace,
    )
    .with_query("granularityType", "Marketplace")
    .with_query("granularityId", marketplace.id)
    .with_query("marketplaceIds", marketplace.id)
    .with_query("details", if details { "true" } else { "false" });

    paginate::fetch_pages(&core.dispatcher, &ctx, "nextToken", cap, summaries_page).await
}

fn summaries_page(payload: &Value) -> Page {
    // This endpoint answers either bare or payload-wrapped.
    let body = payload.get("payload").unwrap_or(payload);
    Page {
        records: body
            .get("inventorySummaries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        next_token: body
            .get("pagination")
            .and_then(|p| p.get("nextToken"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Best-effort merchant-fulfilled view assembled from listings.
async fn fbm_view(
    core: &Core,
    marketplace: &'static Marketplace,
    seller_id: &str,
    cap: usize,
) -> Result<(Vec<Value>, String)> {
    let ctx = RequestContext::new(
        "inventoryInStock",
        "GET",
        format!("/listings/2021-08-01/items/{seller_id}"),
        marketplace,
    )
    .with_query("marketplaceIds", marketplace.id)
    .with_query("includedData", "summaries,fulfillmentAvailability")
    .with_query("pageSize", "20");

    let (items, request_id) =
        paginate::fetch_pages(&core.dispatcher, &ctx, "pageToken", cap, listings_page).await?;

    let summaries = items
        .iter()
        .map(|item| {
            let quantity = item
                .get("fulfillmentAvailability")
                .and_then(Value::as_array)
                .map(|slots| {
                    slots
                        .iter()
                        .filter_map(|s| s.get("quantity").and_then(Value::as_i64))
                        .sum::<i64>()
                })
                .unwrap_or(0);
            let asin = item
                .get("summaries")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(|s| s.get("asin"))
                .cloned()
                .unwrap_or(Value::Null);
            json!({
                "sellerSku": item.get("sku").cloned().unwrap_or(Value::Null),
                "asin": asin,
                "totalQuantity": quantity,
                "fulfillmentType": "FBM",
            })
        })
        .collect();

    Ok((summaries, request_id))
}

fn listings_page(payload: &Value) -> Page {
    Page {
        records: payload
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        next_token: payload
            .get("pagination")
            .and_then(|p| p.get("nextToken"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_page_handles_both_envelopes() {
        let wrapped = summaries_page(&json!({
            "payload": {"inventorySummaries": [{"sellerSku": "A"}],
                        "pagination": {"nextToken": "n"}}
        }));
        assert_eq!(wrapped.records.len(), 1);
        assert_eq!(wrapped.next_token.as_deref(), Some("n"));

        let bare = summaries_page(&json!({
            "inventorySummaries": [{"sellerSku": "A"}, {"sellerSku": "B"}]
        }));
        assert_eq!(bare.records.len(), 2);
        assert!(bare.next_token.is_none());
    }

    #[test]
    fn quantities_default_to_zero() {
        assert_eq!(quantity_of(&json!({"totalQuantity": 7})), 7);
        assert_eq!(quantity_of(&json!({"sellerSku": "A"})), 0);
    }
}
