//! Feed tools: `submitFeed` and `feedStatus`.
//!
//! Submission is a three-step exchange: create a feed document (which
//! yields a pre-signed upload URL), upload the raw content to that URL
//! unsigned, then create the feed referencing the document.

use async_trait::async_trait;
use serde_json::{json, Value};

use spg_client::{HttpRequest, RequestContext};
use spg_domain::envelope::{ResponseEnvelope, ResponseMetadata};
use spg_domain::error::{ErrorKind, Result};

use crate::core::Core;
use crate::registry::Tool;

const FEEDS_BASE: &str = "/feeds/2021-06-30";

/// Upload cap for raw feed content.
const MAX_CONTENT_BYTES: usize = 10 * 1024 * 1024;

pub struct SubmitFeedTool;

#[async_trait]
impl Tool for SubmitFeedTool {
    fn name(&self) -> &'static str {
        "submitFeed"
    }

    fn description(&self) -> &'static str {
        "Submit feed content (TSV/CSV/XML) and return the feed id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "feedType": {"type": "string"},
                "content": {"type": "string"},
                "marketplaceIds": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["token", "feedType", "content"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(submit_feed(core, args).await)
    }
}

async fn submit_feed(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let feed_type = validated_feed_type(&super::required_str(args, "feedType")?)?;
    let content = super::required_str(args, "content")?;
    if content.len() > MAX_CONTENT_BYTES {
        return Err(ErrorKind::InvalidInput(format!(
            "feed content is {} bytes; the limit is {MAX_CONTENT_BYTES}",
            content.len()
        )));
    }
    let ids = super::string_list(args, "marketplaceIds")?;
    let marketplace = core.marketplace(ids.as_deref())?;
    let content_type = detect_content_type(&content);

    // (i) Create the feed document.
    let create_doc = RequestContext::new(
        "submitFeed",
        "POST",
        format!("{FEEDS_BASE}/documents"),
        marketplace,
    )
    .with_body(json!({"contentType": content_type}));
    let doc = core.dispatcher.dispatch(&create_doc).await?;

    let document_id = doc
        .payload
        .get("feedDocumentId")
        .and_then(Value::as_str)
        .ok_or_else(|| ErrorKind::UpstreamError {
            status_code: doc.status,
            message: "feed document response missing feedDocumentId".into(),
            details: None,
        })?
        .to_string();
    let upload_url = doc
        .payload
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| ErrorKind::UpstreamError {
            status_code: doc.status,
            message: "feed document response missing upload url".into(),
            details: None,
        })?
        .to_string();

    // (ii) Upload the raw content. The URL is pre-signed; this is the one
    // unsigned call in the gateway.
    let upload = HttpRequest {
        method: "PUT".into(),
        url: upload_url,
        headers: vec![("content-type".into(), content_type.to_string())],
        body: Some(content.into_bytes()),
        timeout: std::time::Duration::from_secs(120),
    };
    let uploaded = core.transport.send(upload).await?;
    if !(200..300).contains(&uploaded.status) {
        return Err(ErrorKind::UpstreamError {
            status_code: uploaded.status,
            message: "feed content upload failed".into(),
            details: None,
        });
    }

    // (iii) Create the feed itself.
    let create_feed = RequestContext::new(
        "submitFeed",
        "POST",
        format!("{FEEDS_BASE}/feeds"),
        marketplace,
    )
    .with_body(json!({
        "feedType": feed_type,
        "marketplaceIds": [marketplace.id],
        "inputFeedDocumentId": document_id,
    }));
    let created = core.dispatcher.dispatch(&create_feed).await?;

    let feed_id = created
        .payload
        .get("feedId")
        .cloned()
        .unwrap_or(Value::Null);
    let data = json!({
        "feedId": feed_id,
        "feedDocumentId": document_id,
        "feedType": feed_type,
        "contentType": content_type,
    });
    Ok((data, ResponseMetadata::new(marketplace.id, created.request_id)))
}

pub struct FeedStatusTool;

#[async_trait]
impl Tool for FeedStatusTool {
    fn name(&self) -> &'static str {
        "feedStatus"
    }

    fn description(&self) -> &'static str {
        "Processing status of a submitted feed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "feedId": {"type": "string"}
            },
            "required": ["token", "feedId"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(feed_status(core, args).await)
    }
}

async fn feed_status(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;
    let feed_id = super::required_str(args, "feedId")?;
    let marketplace = core.marketplace(None)?;

    let ctx = RequestContext::new(
        "feedStatus",
        "GET",
        format!("{FEEDS_BASE}/feeds/{feed_id}"),
        marketplace,
    );
    let response = core.dispatcher.dispatch(&ctx).await?;
    Ok((
        response.payload,
        ResponseMetadata::new(marketplace.id, response.request_id),
    ))
}

/// Feed type identifiers are uppercase with underscores.
fn validated_feed_type(raw: &str) -> Result<String> {
    let ok = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !ok {
        return Err(ErrorKind::InvalidInput(format!(
            "feedType {raw:?} does not look like a feed type identifier"
        )));
    }
    Ok(raw.to_string())
}

fn detect_content_type(content: &str) -> &'static str {
    let head = content.trim_start();
    if head.starts_with("<?xml") || head.starts_with('<') {
        "text/xml; charset=UTF-8"
    } else if content.contains('\t') {
        "text/tab-separated-values; charset=UTF-8"
    } else {
        "text/csv; charset=UTF-8"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_type_shape() {
        assert!(validated_feed_type("POST_FLAT_FILE_INVLOADER_DATA").is_ok());
        assert!(validated_feed_type("JSON_LISTINGS_FEED").is_ok());
        for bad in ["", "lowercase", "HAS SPACE", "semi;colon"] {
            assert!(validated_feed_type(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn content_type_detection() {
        assert_eq!(
            detect_content_type("<?xml version=\"1.0\"?><Envelope/>"),
            "text/xml; charset=UTF-8"
        );
        assert_eq!(
            detect_content_type("sku\tqty\nA\t5"),
            "text/tab-separated-values; charset=UTF-8"
        );
        assert_eq!(detect_content_type("sku,qty\nA,5"), "text/csv; charset=UTF-8");
    }
}
