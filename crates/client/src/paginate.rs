//! Pagination driver for `NextToken`-style list operations.

use std::time::Instant;

use serde_json::Value;

use spg_domain::error::{ErrorKind, Result};

use crate::dispatcher::{Dispatcher, RequestContext};

/// Hard stop against a server that keeps handing out tokens.
const MAX_PAGES: usize = 50;

/// What an operation extracts from one page payload.
pub struct Page {
    pub records: Vec<Value>,
    pub next_token: Option<String>,
}

/// Fetch pages sequentially until the server stops returning a token, the
/// record cap is reached, or the operation deadline elapses. Records are
/// concatenated in server order; the last page's request id is returned
/// for the envelope metadata.
pub async fn fetch_pages(
    dispatcher: &Dispatcher,
    base: &RequestContext,
    token_param: &str,
    cap: usize,
    extract: impl Fn(&Value) -> Page,
) -> Result<(Vec<Value>, String)> {
    let started = Instant::now();
    let mut records: Vec<Value> = Vec::new();
    let mut next_token: Option<String> = None;
    let mut last_request_id = String::new();

    for _ in 0..MAX_PAGES {
        let mut ctx = base.clone();
        ctx.deadline = base
            .deadline
            .checked_sub(started.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                ErrorKind::Timeout(format!(
                    "operation '{}' exceeded its deadline while paginating",
                    base.operation
                ))
            })?;
        if let Some(token) = &next_token {
            ctx.query.push((token_param.to_string(), token.clone()));
        }

        let response = dispatcher.dispatch(&ctx).await?;
        last_request_id = response.request_id;

        let page = extract(&response.payload);
        records.extend(page.records);
        if records.len() >= cap {
            records.truncate(cap);
            break;
        }
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    Ok((records, last_request_id))
}
