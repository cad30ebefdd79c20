//! Administrator accounts on the SMC.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::elements::search;
use crate::rest::SmcClient;

/// An administrator account definition.
///
/// ```no_run
/// # async fn example(client: &smc_client::rest::SmcClient) -> anyhow::Result<()> {
/// use smc_client::elements::AdminUser;
///
/// let href = AdminUser::new("dlepage")
///     .with_superuser(true)
///     .create(client)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    /// Account name
    pub name: String,
    /// Whether the account starts out enabled
    pub enabled: bool,
    /// Allow sudo on the target engines
    pub allow_sudo: bool,
    /// Hrefs of engines the account may log into locally
    pub engine_target: Vec<String>,
    /// Local admin on the target engines
    pub local_admin: bool,
    /// Unrestricted administrator on the SMC itself
    pub superuser: bool,
}

impl AdminUser {
    /// New enabled account with no privileges granted
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            allow_sudo: false,
            engine_target: Vec::new(),
            local_admin: false,
            superuser: false,
        }
    }

    /// Grant unrestricted SMC administration
    #[must_use]
    pub fn with_superuser(mut self, superuser: bool) -> Self {
        self.superuser = superuser;
        self
    }

    /// Grant local admin on the target engines
    #[must_use]
    pub fn with_local_admin(mut self, local_admin: bool) -> Self {
        self.local_admin = local_admin;
        self
    }

    /// Allow sudo on the target engines
    #[must_use]
    pub fn with_allow_sudo(mut self, allow_sudo: bool) -> Self {
        self.allow_sudo = allow_sudo;
        self
    }

    /// Set the engines the account may log into locally
    #[must_use]
    pub fn with_engine_targets(mut self, hrefs: Vec<String>) -> Self {
        self.engine_target = hrefs;
        self
    }

    /// Create the account. Returns the href of the new element.
    pub async fn create(&self, client: &SmcClient) -> Result<String> {
        let body = serde_json::to_value(self).context("Failed to serialize admin user")?;
        let response = client
            .post("/elements/admin_user", &body)
            .await
            .with_context(|| format!("Failed to create admin user {}", self.name))?;

        let href = response
            .location
            .ok_or_else(|| anyhow!("SMC returned no location for admin user {}", self.name))?;
        info!("Created admin user {} at {href}", self.name);
        Ok(href)
    }
}

/// Change the password of the admin account named `name`
pub async fn change_password(client: &SmcClient, name: &str, password: &str) -> Result<()> {
    let (element, etag) = fetch_admin(client, name).await?;
    let link = find_link(&element, "change_password")?;
    client
        .put(&format!("{link}?password={password}"), &json!({}), &etag)
        .await
        .with_context(|| format!("Failed to change password for {name}"))?;
    Ok(())
}

/// Toggle the enabled state of the admin account named `name`
pub async fn enable_disable(client: &SmcClient, name: &str) -> Result<()> {
    let (element, etag) = fetch_admin(client, name).await?;
    let link = find_link(&element, "enable_disable")?;
    client
        .put(&link, &json!({}), &etag)
        .await
        .with_context(|| format!("Failed to toggle enabled state of {name}"))?;
    Ok(())
}

async fn fetch_admin(client: &SmcClient, name: &str) -> Result<(Value, String)> {
    let href = search::element_href(client, name)
        .await?
        .ok_or_else(|| anyhow!("No admin user named {name}"))?;

    let response = client.get(&href).await?;
    let etag = response
        .etag
        .ok_or_else(|| anyhow!("SMC returned no ETag for {name}"))?;
    let element = response
        .json
        .ok_or_else(|| anyhow!("Empty element body for {name}"))?;
    Ok((element, etag))
}

/// Resolve a `rel` link from an element body
fn find_link(element: &Value, rel: &str) -> Result<String> {
    element
        .get("link")
        .and_then(Value::as_array)
        .and_then(|links| {
            links
                .iter()
                .find(|link| link.get("rel").and_then(Value::as_str) == Some(rel))
        })
        .and_then(|link| link.get("href").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Element has no {rel} link"))
}
