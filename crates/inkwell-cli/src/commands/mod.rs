//! Command handlers

pub mod config;
pub mod edit;
pub mod snapshot;
pub mod watch;

use std::sync::Arc;

use anyhow::{bail, Result};

use inkwell_core::sync::SessionConfig;
use inkwell_core::{Config, DocumentApi, DocumentId, HttpDocumentApi, Identity, UserId};

/// Acting user, falling back to a fresh anonymous identity
///
/// Every unconfigured client gets its own id.
pub fn user_id(config: &Config) -> UserId {
    config
        .user_id
        .as_deref()
        .map(UserId::from)
        .unwrap_or_else(|| Identity::anonymous().user_id().clone())
}

/// Session settings for `document_id` built from the configuration
pub fn session_config(config: &Config, document_id: DocumentId) -> Result<SessionConfig> {
    let Some(ref server_url) = config.server_url else {
        bail!(
            "Server URL not configured. Set it with:\n  \
             inkwell config set server_url ws://your-server:8080/ws"
        );
    };

    Ok(SessionConfig::new(server_url.clone(), document_id, user_id(config))
        .with_policy(config.reconnect_policy())
        .with_handshake_timeout(config.handshake_timeout()))
}

/// Document API client built from the configuration
pub fn document_api(config: &Config) -> Result<Arc<dyn DocumentApi>> {
    let Some(ref api_url) = config.api_url else {
        bail!(
            "API URL not configured. Set it with:\n  \
             inkwell config set api_url http://your-server:8080/api"
        );
    };

    Ok(Arc::new(
        HttpDocumentApi::new(api_url.clone()).with_token(config.api_token.clone()),
    ))
}
