//! Report tools: `requestReport` and `getReport`.

use async_trait::async_trait;
use serde_json::{json, Value};

use spg_client::RequestContext;
use spg_domain::envelope::{ResponseEnvelope, ResponseMetadata};
use spg_domain::error::{ErrorKind, Result};

use crate::core::Core;
use crate::registry::Tool;

const REPORTS_BASE: &str = "/reports/2021-06-30";

pub struct RequestReportTool;

#[async_trait]
impl Tool for RequestReportTool {
    fn name(&self) -> &'static str {
        "requestReport"
    }

    fn description(&self) -> &'static str {
        "Request a report; returns the report id to poll."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "reportType": {"type": "string"},
                "marketplaceIds": {"type": "array", "items": {"type": "string"}},
                "startDate": {"type": "string", "format": "date-time"},
                "endDate": {"type": "string", "format": "date-time"}
            },
            "required": ["token", "reportType"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(request_report(core, args).await)
    }
}

async fn request_report(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let report_type = validated_report_type(&super::required_str(args, "reportType")?)?;
    let ids = super::string_list(args, "marketplaceIds")?;
    let marketplace = core.marketplace(ids.as_deref())?;

    let start = super::optional_date(args, "startDate")?;
    let end = super::optional_date(args, "endDate")?;
    if let (Some(start), Some(end)) = (&start, &end) {
        if end < start {
            return Err(ErrorKind::InvalidInput("endDate precedes startDate".into()));
        }
    }

    let mut body = json!({
        "reportType": report_type,
        "marketplaceIds": [marketplace.id],
    });
    if let Some(start) = start {
        body["dataStartTime"] = json!(start);
    }
    if let Some(end) = end {
        body["dataEndTime"] = json!(end);
    }

    let ctx = RequestContext::new(
        "requestReport",
        "POST",
        format!("{REPORTS_BASE}/reports"),
        marketplace,
    )
    .with_body(body);
    let response = core.dispatcher.dispatch(&ctx).await?;

    let data = json!({
        "reportId": response.payload.get("reportId").cloned().unwrap_or(Value::Null),
        "reportType": report_type,
    });
    Ok((data, ResponseMetadata::new(marketplace.id, response.request_id)))
}

pub struct GetReportTool;

#[async_trait]
impl Tool for GetReportTool {
    fn name(&self) -> &'static str {
        "getReport"
    }

    fn description(&self) -> &'static str {
        "Status and document reference of a requested report."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "reportId": {"type": "string"}
            },
            "required": ["token", "reportId"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(get_report(core, args).await)
    }
}

async fn get_report(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let report_id = super::required_str(args, "reportId")?;
    let marketplace = core.marketplace(None)?;

    let ctx = RequestContext::new(
        "getReport",
        "GET",
        format!("{REPORTS_BASE}/reports/{report_id}"),
        marketplace,
    );
    let response = core.dispatcher.dispatch(&ctx).await?;
    Ok((
        response.payload,
        ResponseMetadata::new(marketplace.id, response.request_id),
    ))
}

/// Report type identifiers share the uppercase-with-underscores shape.
fn validated_report_type(raw: &str) -> Result<String> {
    let ok = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !ok {
        return Err(ErrorKind::InvalidInput(format!(
            "reportType {raw:?} does not look like a report type identifier"
        )));
    }
    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_type_shape() {
        assert!(validated_report_type("GET_FLAT_FILE_OPEN_LISTINGS_DATA").is_ok());
        assert!(validated_report_type("").is_err());
        assert!(validated_report_type("bad type").is_err());
    }
}
