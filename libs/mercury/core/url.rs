//! Connection-URL construction
//!
//! Builds the per-attempt socket URL from the base URL, the feature flags,
//! and the device's ephemeral flag. Defaults are applied first and
//! flag-specific overrides second, so the shared-socket flag can remove
//! the otherwise-default buffer-state parameter.

use crate::traits::{MercuryError, Result};
use url::Url;

/// Ephemeral per-attempt inputs for URL construction
///
/// `base` is the explicit caller URL or the device default, already
/// resolved through the priority host when high availability is enabled.
#[derive(Debug, Clone)]
pub struct ConnectionUrlContext<'a> {
    pub base: &'a str,
    pub shared_socket: bool,
    pub ephemeral_device: bool,
    /// Consumer-supplied query parameters, appended last
    pub overrides: &'a [(String, String)],
}

/// Query parameters owned by the URL builder; stripped from the incoming
/// URL before recomposition so reconnecting with an already-composed URL
/// never duplicates them.
const MANAGED_PARAMS: [&str; 6] = [
    "outboundWireFormat",
    "aliasHttpStatus",
    "bufferStates",
    "mercuryRegistrationStatus",
    "isRegistrationRefreshEnabled",
    "multipleConnections",
];

/// Compose the connection URL for one attempt
///
/// Defaults are applied first and flag-specific overrides second;
/// consumer overrides replace any same-named parameter. Idempotent: the
/// output of a previous composition is a valid base.
pub fn build_connection_url(ctx: &ConnectionUrlContext<'_>) -> Result<String> {
    let mut url = Url::parse(ctx.base)
        .map_err(|e| MercuryError::Configuration(format!("invalid socket URL '{}': {}", ctx.base, e)))?;

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !MANAGED_PARAMS.contains(&name.as_ref()))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    fn push(params: &mut Vec<(String, String)>, name: &str, value: &str) {
        params.push((name.to_string(), value.to_string()));
    }

    push(&mut params, "outboundWireFormat", "text");
    push(&mut params, "aliasHttpStatus", "true");
    push(&mut params, "bufferStates", "true");

    if ctx.shared_socket {
        // Registration sharing replaces buffered-state delivery
        params.retain(|(name, _)| name != "bufferStates");
        push(&mut params, "mercuryRegistrationStatus", "true");
        push(&mut params, "isRegistrationRefreshEnabled", "true");
    }

    if ctx.ephemeral_device {
        push(&mut params, "multipleConnections", "true");
    }

    for (name, value) in ctx.overrides {
        params.retain(|(existing, _)| existing != name);
        params.push((name.clone(), value.clone()));
    }

    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (name, value) in &params {
            query.append_pair(name, value);
        }
    }

    Ok(url.to_string())
}
