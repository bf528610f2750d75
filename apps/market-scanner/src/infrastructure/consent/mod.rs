//! Consent Prompts
//!
//! Interactive authorization channels for the credential manager.
//! [`StdinConsentPrompt`] asks the operator to open the authorization URL
//! and paste back the URL the browser was redirected to.
//! [`DisabledConsentPrompt`] is used when no operator is attached.

use std::io::BufRead;

use async_trait::async_trait;
use reqwest::Url;

use crate::application::ports::{ConsentPrompt, CredentialError};

/// Reads the redirect URL from standard input.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConsentPrompt;

impl StdinConsentPrompt {
    /// Create the prompt.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConsentPrompt for StdinConsentPrompt {
    async fn authorization_code(&self, authorization_url: &str) -> Result<String, CredentialError> {
        tracing::warn!(
            url = authorization_url,
            "Authorization required: open the URL, log in, then paste the redirected URL on stdin"
        );

        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|read| (read, line))
        })
        .await
        .map_err(|e| CredentialError::ConsentUnavailable {
            reason: format!("stdin reader failed: {e}"),
        })?
        .map_err(|e| CredentialError::ConsentUnavailable {
            reason: format!("stdin unreadable: {e}"),
        })?;

        match line {
            (0, _) => Err(CredentialError::ConsentUnavailable {
                reason: "stdin closed".to_string(),
            }),
            (_, text) => extract_code(&text),
        }
    }
}

/// Always reports the channel as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledConsentPrompt;

#[async_trait]
impl ConsentPrompt for DisabledConsentPrompt {
    async fn authorization_code(&self, authorization_url: &str) -> Result<String, CredentialError> {
        tracing::error!(
            url = authorization_url,
            "Authorization required but interactive authorization is disabled"
        );
        Err(CredentialError::ConsentUnavailable {
            reason: "interactive authorization disabled".to_string(),
        })
    }
}

/// `code` query parameter of a pasted redirect URL.
///
/// # Errors
///
/// Returns [`CredentialError::AuthorizationRejected`] when the input is not
/// a URL or carries no code.
pub fn extract_code(redirect_url: &str) -> Result<String, CredentialError> {
    let rejected = |message: String| CredentialError::AuthorizationRejected {
        status: 0,
        message,
    };

    let url = Url::parse(redirect_url.trim())
        .map_err(|e| rejected(format!("not a redirect URL: {e}")))?;

    if let Some((_, error)) = url.query_pairs().find(|(key, _)| key == "error") {
        return Err(rejected(format!("authorization denied: {error}")));
    }

    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, code)| code.into_owned())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| rejected("redirect URL has no code parameter".to_string()))
}
