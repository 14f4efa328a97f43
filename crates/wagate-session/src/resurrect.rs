// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bootstrap resurrection of persisted sessions.
//!
//! On process start every session with credential material in the KV
//! store is re-established, so tenants survive restarts without
//! re-pairing. Individual failures are logged and skipped; one broken
//! session must not block the rest of the fleet.

use tracing::{error, info};
use wagate_core::GatewayError;
use wagate_store::AuthStore;

use crate::registry::SessionRegistry;

/// Discover persisted sessions and start a supervisor for each.
/// Returns how many sessions were resurrected.
pub async fn resurrect_sessions(
    registry: &SessionRegistry,
    store: &AuthStore,
) -> Result<usize, GatewayError> {
    let ids = store.session_ids().await?;
    if ids.is_empty() {
        info!("no persisted sessions to resurrect");
        return Ok(0);
    }

    info!(count = ids.len(), "resurrecting persisted sessions");
    let mut resurrected = 0;
    for id in ids {
        match registry.ensure(&id).await {
            Ok(_) => resurrected += 1,
            Err(err) => {
                error!(session_id = %id, error = %err, "failed to resurrect session");
            }
        }
    }
    info!(resurrected, "session resurrection complete");
    Ok(resurrected)
}
