//! Auth challenge handling shared by the handshake and the send path.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use relaymcp_transport_traits::{
    AuthContext, AuthOutcome, CredentialProvider, TransportError, TransportResult,
};
use tracing::{debug, info, warn};

/// Which operation hit the challenge. Decides the error surfaced when re-auth fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthPhase {
    Handshake,
    Request,
}

impl AuthPhase {
    fn denied(self, reason: &str) -> TransportError {
        match self {
            Self::Handshake => TransportError::AuthRequired(reason.to_string()),
            Self::Request => TransportError::Unauthorized(reason.to_string()),
        }
    }
}

/// Run `op`, and on an auth challenge refresh credentials once and run it again.
///
/// Without a provider the challenge is returned unchanged. A second challenge, or a
/// provider that denies, ends in the phase's auth error. There is never a third attempt.
pub(crate) async fn with_challenge_retry<T, F, Fut>(
    provider: Option<&Arc<dyn CredentialProvider>>,
    context: &AuthContext,
    phase: AuthPhase,
    mut op: F,
    on_challenge: impl FnOnce(),
) -> TransportResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TransportResult<T>>,
{
    let err = match op().await {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    if !err.is_auth_challenge() {
        return Err(err);
    }
    let Some(provider) = provider else {
        return Err(match phase {
            // the handshake has nobody to ask for credentials
            AuthPhase::Handshake => TransportError::AuthRequired(err.to_string()),
            AuthPhase::Request => err,
        });
    };

    info!("Auth challenge during {:?}, re-authorizing", phase);
    on_challenge();

    match provider.authorize(context).await? {
        AuthOutcome::Authorized => {}
        AuthOutcome::Denied => {
            warn!("Credential provider denied re-authorization");
            return Err(phase.denied("authorization was denied"));
        }
    }

    debug!("Re-authorized, retrying {:?} once", phase);
    match op().await {
        Err(retry_err) if retry_err.is_auth_challenge() => {
            warn!("Server rejected refreshed credentials");
            Err(phase.denied(&retry_err.to_string()))
        }
        other => other,
    }
}

/// A fixed bearer token. It can never be refreshed, so every authorization
/// attempt is denied.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl StaticTokenProvider {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn current_token(&self) -> Option<String> {
        Some(self.token.clone())
    }

    async fn authorize(&self, _context: &AuthContext) -> TransportResult<AuthOutcome> {
        Ok(AuthOutcome::Denied)
    }

    async fn exchange_authorization_code(
        &self,
        _context: &AuthContext,
        _code: &str,
    ) -> TransportResult<AuthOutcome> {
        Ok(AuthOutcome::Denied)
    }
}
