//! Process-wide provider slot.
//!
//! Callers that pass the provider explicitly can ignore this module and
//! build a [`SecurityProvider`] themselves.

use std::sync::Arc;

use tokio::sync::OnceCell;

use super::provider::SecurityProvider;
use crate::domain::config::SecurityConfig;
use crate::domain::errors::{SecurityError, SecurityResult};

static PROVIDER: OnceCell<Arc<SecurityProvider>> = OnceCell::const_new();

/// Build the process provider on first call and return it.
///
/// Later calls return the first provider and ignore their arguments. A
/// failed first call leaves the slot empty, so a corrected call can retry.
pub async fn init(caller_id: &str, config: &SecurityConfig) -> SecurityResult<Arc<SecurityProvider>> {
    let provider = PROVIDER
        .get_or_try_init(|| async {
            tracing::info!(caller = caller_id, mode = ?config.mode, "Choosing security model");
            SecurityProvider::from_config(caller_id, config)
                .await
                .map(Arc::new)
        })
        .await?;
    Ok(Arc::clone(provider))
}

/// The provider built by [`init`].
///
/// # Errors
///
/// `NotInitialized` before the first successful [`init`].
pub fn get() -> SecurityResult<Arc<SecurityProvider>> {
    PROVIDER.get().cloned().ok_or(SecurityError::NotInitialized)
}
