//! Listing tools: fetch, partial update, price, and FBM inventory.
//!
//! Mutating calls return a `listing_update` advisory describing which
//! fields changed and the typical propagation delay. That is an
//! observation about the upstream, not a guarantee.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use spg_client::RequestContext;
use spg_domain::envelope::{ResponseEnvelope, ResponseMetadata};
use spg_domain::error::{ErrorKind, Result};
use spg_domain::marketplace::Marketplace;

use crate::core::Core;
use crate::registry::Tool;

const LISTINGS_BASE: &str = "/listings/2021-08-01/items";

const PROPAGATION_NOTE: &str =
    "listing changes typically take 5 to 30 minutes to propagate; verify afterwards";

/// Most attribute lists (bullets, search terms) cap at five entries.
const MAX_LIST_ENTRIES: usize = 5;

const MAX_BULK_UPDATES: usize = 50;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// getListing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GetListingTool;

#[async_trait]
impl Tool for GetListingTool {
    fn name(&self) -> &'static str {
        "getListing"
    }

    fn description(&self) -> &'static str {
        "Fetch one listing by seller id and SKU."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "sellerId": {"type": "string"},
                "sku": {"type": "string"},
                "marketplaceIds": {"type": "array", "items": {"type": "string"}},
                "includedData": {"type": "string"}
            },
            "required": ["token", "sellerId", "sku"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(get_listing(core, args).await)
    }
}

async fn get_listing(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let seller_id = super::required_str(args, "sellerId")?;
    let sku = super::required_str(args, "sku")?;
    let ids = super::string_list(args, "marketplaceIds")?;
    let marketplace = core.marketplace(ids.as_deref())?;
    let included = super::optional_str(args, "includedData")?
        .unwrap_or_else(|| "summaries,attributes,issues,offers".to_string());

    let ctx = RequestContext::new(
        "getListing",
        "GET",
        format!("{LISTINGS_BASE}/{seller_id}/{sku}"),
        marketplace,
    )
    .with_query("marketplaceIds", marketplace.id)
    .with_query("includedData", included);

    let response = core.dispatcher.dispatch(&ctx).await?;
    Ok((
        response.payload,
        ResponseMetadata::new(marketplace.id, response.request_id),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// updateListing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UpdateListingTool;

#[async_trait]
impl Tool for UpdateListingTool {
    fn name(&self) -> &'static str {
        "updateListing"
    }

    fn description(&self) -> &'static str {
        "Partially update listing content (title, bullets, description, search terms, brand, manufacturer)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "sellerId": {"type": "string"},
                "sku": {"type": "string"},
                "title": {"type": "string"},
                "bulletPoints": {"type": "array", "items": {"type": "string"}, "maxItems": 5},
                "description": {"type": "string"},
                "searchTerms": {"type": "array", "items": {"type": "string"}, "maxItems": 5},
                "brand": {"type": "string"},
                "manufacturer": {"type": "string"},
                "marketplaceIds": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["token", "sellerId", "sku"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(update_listing(core, args).await)
    }
}

async fn update_listing(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let seller_id = super::required_str(args, "sellerId")?;
    let sku = super::required_str(args, "sku")?;
    let ids = super::string_list(args, "marketplaceIds")?;
    let marketplace = core.marketplace(ids.as_deref())?;

    let mut patches = Vec::new();
    let mut changed = Vec::new();

    if let Some(title) = super::optional_str(args, "title")? {
        patches.push(replace_attr("item_name", single_value(&title, marketplace)));
        changed.push("title");
    }
    if let Some(bullets) = capped_list(args, "bulletPoints")? {
        patches.push(replace_attr("bullet_point", multi_value(&bullets, marketplace)));
        changed.push("bulletPoints");
    }
    if let Some(description) = super::optional_str(args, "description")? {
        patches.push(replace_attr(
            "product_description",
            single_value(&description, marketplace),
        ));
        changed.push("description");
    }
    if let Some(terms) = capped_list(args, "searchTerms")? {
        patches.push(replace_attr("generic_keyword", multi_value(&terms, marketplace)));
        changed.push("searchTerms");
    }
    if let Some(brand) = super::optional_str(args, "brand")? {
        patches.push(replace_attr("brand", single_value(&brand, marketplace)));
        changed.push("brand");
    }
    if let Some(manufacturer) = super::optional_str(args, "manufacturer")? {
        patches.push(replace_attr(
            "manufacturer",
            single_value(&manufacturer, marketplace),
        ));
        changed.push("manufacturer");
    }

    if patches.is_empty() {
        return Err(ErrorKind::InvalidInput(
            "no listing fields supplied; nothing to update".into(),
        ));
    }

    let response = patch_listing(core, marketplace, &seller_id, &sku, "updateListing", patches)
        .await?;
    let data = json!({
        "submission": response.payload,
        "listing_update": advisory(&changed),
    });
    Ok((data, ResponseMetadata::new(marketplace.id, response.request_id)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// updatePrice
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UpdatePriceTool;

#[async_trait]
impl Tool for UpdatePriceTool {
    fn name(&self) -> &'static str {
        "updatePrice"
    }

    fn description(&self) -> &'static str {
        "Replace a listing's price."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "sellerId": {"type": "string"},
                "sku": {"type": "string"},
                "newPrice": {"type": "string"},
                "currency": {"type": "string"},
                "marketplaceIds": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["token", "sellerId", "sku", "newPrice"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(update_price(core, args).await)
    }
}

async fn update_price(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let seller_id = super::required_str(args, "sellerId")?;
    let sku = super::required_str(args, "sku")?;
    let ids = super::string_list(args, "marketplaceIds")?;
    let marketplace = core.marketplace(ids.as_deref())?;

    let price = validated_price(&super::required_str(args, "newPrice")?)?;
    let currency = match super::optional_str(args, "currency")? {
        Some(code) => validated_currency(&code)?,
        None => marketplace.currency.to_string(),
    };

    let offer = json!([{
        "marketplace_id": marketplace.id,
        "currency": currency,
        "our_price": [{
            "schedule": [{"value_with_tax": price}]
        }]
    }]);
    let patches = vec![replace_attr("purchasable_offer", offer)];

    let response =
        patch_listing(core, marketplace, &seller_id, &sku, "updatePrice", patches).await?;
    let data = json!({
        "submission": response.payload,
        "listing_update": {
            "changedFields": ["price"],
            "newPrice": price,
            "currency": currency,
            "note": PROPAGATION_NOTE,
        },
    });
    Ok((data, ResponseMetadata::new(marketplace.id, response.request_id)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// updateFbmInventory / bulkUpdateFbmInventory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UpdateFbmInventoryTool;

#[async_trait]
impl Tool for UpdateFbmInventoryTool {
    fn name(&self) -> &'static str {
        "updateFbmInventory"
    }

    fn description(&self) -> &'static str {
        "Set the merchant-fulfilled quantity for one SKU."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "sellerId": {"type": "string"},
                "sku": {"type": "string"},
                "quantity": {"type": "integer", "minimum": 0},
                "handlingTime": {"type": "integer", "minimum": 1, "maximum": 30},
                "restockDate": {"type": "string", "format": "date-time"},
                "marketplaceIds": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["token", "sellerId", "sku", "quantity"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(update_fbm_inventory(core, args).await)
    }
}

async fn update_fbm_inventory(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let seller_id = super::required_str(args, "sellerId")?;
    let sku = super::required_str(args, "sku")?;
    let ids = super::string_list(args, "marketplaceIds")?;
    let marketplace = core.marketplace(ids.as_deref())?;

    let update = FbmUpdate::from_args(args, &sku)?;
    let patches = vec![update.patch()];

    let response = patch_listing(
        core,
        marketplace,
        &seller_id,
        &sku,
        "updateFbmInventory",
        patches,
    )
    .await?;
    let data = json!({
        "submission": response.payload,
        "listing_update": {
            "changedFields": ["fulfillmentAvailability"],
            "quantity": update.quantity,
            "note": PROPAGATION_NOTE,
        },
    });
    Ok((data, ResponseMetadata::new(marketplace.id, response.request_id)))
}

pub struct BulkUpdateFbmInventoryTool;

#[async_trait]
impl Tool for BulkUpdateFbmInventoryTool {
    fn name(&self) -> &'static str {
        "bulkUpdateFbmInventory"
    }

    fn description(&self) -> &'static str {
        "Set merchant-fulfilled quantities for up to 50 SKUs in one call."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "sellerId": {"type": "string"},
                "updatesJsonArray": {
                    "description": "JSON array (or its string form) of {sku, quantity, handlingTime?}",
                },
                "marketplaceId": {"type": "string"}
            },
            "required": ["token", "sellerId", "updatesJsonArray"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(bulk_update(core, args).await)
    }
}

async fn bulk_update(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let seller_id = super::required_str(args, "sellerId")?;
    let ids = super::optional_str(args, "marketplaceId")?.map(|id| vec![id]);
    let marketplace = core.marketplace(ids.as_deref())?;

    // The whole batch is validated before anything is dispatched.
    let updates = parse_bulk_updates(args)?;

    let mut results = Vec::with_capacity(updates.len());
    let mut succeeded = 0usize;
    for update in &updates {
        let patches = vec![update.patch()];
        let outcome = patch_listing(
            core,
            marketplace,
            &seller_id,
            &update.sku,
            "bulkUpdateFbmInventory",
            patches,
        )
        .await;
        match outcome {
            Ok(_) => {
                succeeded += 1;
                results.push(json!({"sku": update.sku, "status": "ok"}));
            }
            Err(err) => {
                results.push(json!({
                    "sku": update.sku,
                    "status": "error",
                    "error": err.to_string(),
                }));
            }
        }
    }

    let data = json!({
        "total": updates.len(),
        "succeeded": succeeded,
        "failed": updates.len() - succeeded,
        "results": results,
    });
    Ok((
        data,
        ResponseMetadata::new(marketplace.id, super::local_request_id()),
    ))
}

struct FbmUpdate {
    sku: String,
    quantity: i64,
    handling_time: Option<i64>,
    restock_date: Option<String>,
}

impl FbmUpdate {
    fn from_args(args: &Value, sku: &str) -> Result<Self> {
        let quantity = args
            .get("quantity")
            .and_then(Value::as_i64)
            .ok_or_else(|| ErrorKind::InvalidInput("quantity must be an integer".into()))?;
        if quantity < 0 {
            return Err(ErrorKind::InvalidInput(format!(
                "quantity for '{sku}' must be zero or positive"
            )));
        }

        let handling_time = match args.get("handlingTime") {
            None | Some(Value::Null) => None,
            Some(v) => {
                let days = v.as_i64().ok_or_else(|| {
                    ErrorKind::InvalidInput("handlingTime must be an integer".into())
                })?;
                if !(1..=30).contains(&days) {
                    return Err(ErrorKind::InvalidInput(
                        "handlingTime must be between 1 and 30 days".into(),
                    ));
                }
                Some(days)
            }
        };

        let restock_date = match super::optional_str(args, "restockDate")? {
            None => None,
            Some(raw) => {
                let parsed = raw.parse::<DateTime<Utc>>().map_err(|_| {
                    ErrorKind::InvalidInput(format!("restockDate is not ISO-8601: {raw:?}"))
                })?;
                if parsed <= Utc::now() {
                    return Err(ErrorKind::InvalidInput(
                        "restockDate must be in the future".into(),
                    ));
                }
                Some(spg_domain::envelope::iso(parsed))
            }
        };

        Ok(Self {
            sku: sku.to_string(),
            quantity,
            handling_time,
            restock_date,
        })
    }

    fn patch(&self) -> Value {
        let mut slot = json!({
            "fulfillment_channel_code": "DEFAULT",
            "quantity": self.quantity,
        });
        if let Some(days) = self.handling_time {
            slot["lead_time_to_ship_max_days"] = json!(days);
        }
        if let Some(date) = &self.restock_date {
            slot["restock_date"] = json!(date);
        }
        replace_attr("fulfillment_availability", json!([slot]))
    }
}

fn parse_bulk_updates(args: &Value) -> Result<Vec<FbmUpdate>> {
    let raw = match args.get("updatesJsonArray") {
        Some(Value::String(s)) => serde_json::from_str::<Value>(s).map_err(|e| {
            ErrorKind::InvalidInput(format!("updatesJsonArray is not valid JSON: {e}"))
        })?,
        Some(v @ Value::Array(_)) => v.clone(),
        _ => {
            return Err(ErrorKind::InvalidInput(
                "updatesJsonArray is required (a JSON array or its string form)".into(),
            ))
        }
    };
    let entries = raw.as_array().ok_or_else(|| {
        ErrorKind::InvalidInput("updatesJsonArray must be a JSON array".into())
    })?;
    if entries.is_empty() {
        return Err(ErrorKind::InvalidInput("updatesJsonArray is empty".into()));
    }
    if entries.len() > MAX_BULK_UPDATES {
        return Err(ErrorKind::InvalidInput(format!(
            "updatesJsonArray holds {} entries; the limit is {MAX_BULK_UPDATES}",
            entries.len()
        )));
    }

    entries
        .iter()
        .map(|entry| {
            let sku = entry
                .get("sku")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    ErrorKind::InvalidInput("every bulk entry needs a non-empty sku".into())
                })?;
            FbmUpdate::from_args(entry, sku)
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared pieces
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn patch_listing(
    core: &Core,
    marketplace: &'static Marketplace,
    seller_id: &str,
    sku: &str,
    operation: &str,
    patches: Vec<Value>,
) -> Result<spg_client::UpstreamResponse> {
    let body = json!({
        "productType": "PRODUCT",
        "patches": patches,
    });
    let ctx = RequestContext::new(
        operation,
        "PATCH",
        format!("{LISTINGS_BASE}/{seller_id}/{sku}"),
        marketplace,
    )
    .with_query("marketplaceIds", marketplace.id)
    .with_body(body);
    core.dispatcher.dispatch(&ctx).await
}

fn replace_attr(attribute: &str, value: Value) -> Value {
    json!({
        "op": "replace",
        "path": format!("/attributes/{attribute}"),
        "value": value,
    })
}

fn single_value(text: &str, marketplace: &Marketplace) -> Value {
    json!([{"value": text, "marketplace_id": marketplace.id}])
}

fn multi_value(entries: &[String], marketplace: &Marketplace) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|e| json!({"value": e, "marketplace_id": marketplace.id}))
            .collect(),
    )
}

fn advisory(changed: &[&str]) -> Value {
    json!({
        "changedFields": changed,
        "note": PROPAGATION_NOTE,
    })
}

/// Lists like bullets and search terms cap at five entries.
fn capped_list(args: &Value, name: &str) -> Result<Option<Vec<String>>> {
    match super::string_list(args, name)? {
        None => Ok(None),
        Some(entries) if entries.len() > MAX_LIST_ENTRIES => Err(ErrorKind::InvalidInput(
            format!("'{name}' accepts at most {MAX_LIST_ENTRIES} entries"),
        )),
        Some(entries) => Ok(Some(entries)),
    }
}

/// Prices travel as positive decimal strings with at most two places.
fn validated_price(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next();
    let shape_ok = !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && frac.map_or(true, |f| {
            !f.is_empty() && f.len() <= 2 && f.chars().all(|c| c.is_ascii_digit())
        });
    let positive = trimmed.parse::<f64>().map(|v| v > 0.0).unwrap_or(false);
    if !shape_ok || !positive {
        return Err(ErrorKind::InvalidInput(format!(
            "newPrice must be a positive decimal string like \"69.98\", got {raw:?}"
        )));
    }
    Ok(trimmed.to_string())
}

fn validated_currency(code: &str) -> Result<String> {
    let ok = code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase());
    if !ok {
        return Err(ErrorKind::InvalidInput(format!(
            "currency must be a three-letter ISO 4217 code, got {code:?}"
        )));
    }
    Ok(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_validation_accepts_decimal_strings() {
        assert_eq!(validated_price("69.98").unwrap(), "69.98");
        assert_eq!(validated_price("5").unwrap(), "5");
        for bad in ["0", "0.00", "-3", "69.999", "12,50", "abc", ".99", "9."] {
            assert!(validated_price(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn currency_must_be_iso_4217_shaped() {
        assert!(validated_currency("GBP").is_ok());
        for bad in ["gbp", "POUND", "G8P", ""] {
            assert!(validated_currency(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn bulk_updates_validate_before_dispatch() {
        let args = json!({"updatesJsonArray": r#"[{"sku": "A", "quantity": 3}]"#});
        let updates = parse_bulk_updates(&args).unwrap();
        assert_eq!(updates[0].sku, "A");
        assert_eq!(updates[0].quantity, 3);

        // A single bad entry poisons the whole batch.
        let mixed = json!({"updatesJsonArray": [
            {"sku": "A", "quantity": 3},
            {"sku": "B", "quantity": -1}
        ]});
        assert!(parse_bulk_updates(&mixed).is_err());

        let oversized: Vec<Value> = (0..51)
            .map(|i| json!({"sku": format!("S{i}"), "quantity": 1}))
            .collect();
        let too_many = json!({ "updatesJsonArray": oversized });
        assert!(parse_bulk_updates(&too_many).is_err());

        assert!(parse_bulk_updates(&json!({"updatesJsonArray": "not json"})).is_err());
        assert!(parse_bulk_updates(&json!({"updatesJsonArray": []})).is_err());
    }

    #[test]
    fn fbm_update_bounds() {
        let ok = json!({"quantity": 0});
        assert!(FbmUpdate::from_args(&ok, "S").is_ok());

        assert!(FbmUpdate::from_args(&json!({"quantity": -1}), "S").is_err());
        assert!(FbmUpdate::from_args(&json!({"quantity": 1, "handlingTime": 0}), "S").is_err());
        assert!(FbmUpdate::from_args(&json!({"quantity": 1, "handlingTime": 31}), "S").is_err());
        assert!(FbmUpdate::from_args(&json!({"quantity": 1, "handlingTime": 30}), "S").is_ok());

        let past = json!({"quantity": 1, "restockDate": "2020-01-01T00:00:00Z"});
        assert!(FbmUpdate::from_args(&past, "S").is_err());
    }

    #[test]
    fn patches_take_the_replace_shape() {
        let update = FbmUpdate {
            sku: "S".into(),
            quantity: 4,
            handling_time: Some(2),
            restock_date: None,
        };
        let patch = update.patch();
        assert_eq!(patch["op"], "replace");
        assert_eq!(patch["path"], "/attributes/fulfillment_availability");
        assert_eq!(patch["value"][0]["quantity"], 4);
        assert_eq!(patch["value"][0]["lead_time_to_ship_max_days"], 2);
    }
}
