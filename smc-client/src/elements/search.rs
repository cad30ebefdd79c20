//! Element search helpers.
//!
//! Thin wrappers over the `/elements` search endpoint. Missing results map
//! to `None` or an empty list, never to an error.

use anyhow::Result;
use serde_json::Value;

use crate::rest::SmcClient;

/// Href of the element named `name`, if it exists
pub async fn element_href(client: &SmcClient, name: &str) -> Result<Option<String>> {
    let results = search(client, &format!("/elements?filter={name}&exact_match=true")).await?;
    Ok(results
        .first()
        .and_then(|element| element.get("href"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

/// Full JSON body of the element named `name`, if it exists
pub async fn element_as_json(client: &SmcClient, name: &str) -> Result<Option<Value>> {
    match element_href(client, name).await? {
        Some(href) => element_by_href(client, &href).await,
        None => Ok(None),
    }
}

/// Fetch an element directly by href
pub async fn element_by_href(client: &SmcClient, href: &str) -> Result<Option<Value>> {
    Ok(client.get(href).await?.json)
}

/// Summaries of all elements matching `name` (substring match)
pub async fn elements_matching(client: &SmcClient, name: &str) -> Result<Vec<Value>> {
    search(client, &format!("/elements?filter={name}")).await
}

/// Summaries of all elements of `element_type` (e.g. `host`, `single_fw`)
pub async fn elements_by_type(client: &SmcClient, element_type: &str) -> Result<Vec<Value>> {
    search(client, &format!("/elements?filter_context={element_type}")).await
}

async fn search(client: &SmcClient, path: &str) -> Result<Vec<Value>> {
    let response = client.get(path).await?;
    match response.json {
        Some(Value::Array(results)) => Ok(results),
        Some(other) => Ok(vec![other]),
        None => Ok(Vec::new()),
    }
}
