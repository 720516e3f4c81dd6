//! Paginated Fetcher
//!
//! Requests fixed-size pages until a short or empty page comes back. There is
//! no page cap: termination relies on the endpoint returning a short final
//! page, as REST listings do.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::api::{check_error_payload, ApiTransport};
use crate::error::ApiError;

/// Page size used when none is configured
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Aggregates every page of a listing endpoint
pub struct Paginator<'a> {
    api: &'a dyn ApiTransport,
    per_page: u32,
}

impl<'a> Paginator<'a> {
    pub fn new(api: &'a dyn ApiTransport, per_page: u32) -> Self {
        Self {
            api,
            per_page: per_page.max(1),
        }
    }

    /// Fetch all items of `endpoint`, in listing order.
    ///
    /// An error object on any page aborts the whole listing.
    pub async fn fetch_all<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let query = [
                ("page", page.to_string()),
                ("per_page", self.per_page.to_string()),
            ];
            let value = check_error_payload(self.api.get(endpoint, &query).await?)?;

            let batch = match value {
                Value::Array(batch) => batch,
                other => {
                    return Err(ApiError::new(format!(
                        "expected a list from {} page {}, got {}",
                        endpoint,
                        page,
                        kind_of(&other)
                    )))
                }
            };

            let count = batch.len();
            for item in batch {
                let item = serde_json::from_value(item).map_err(|e| {
                    ApiError::new(format!("unexpected item from {}: {}", endpoint, e))
                })?;
                items.push(item);
            }

            debug!("{} page {}: {} items", endpoint, page, count);

            if count < self.per_page as usize {
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
