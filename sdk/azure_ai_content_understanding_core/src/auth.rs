//! Credentials for the Content Understanding service.
//!
//! The service accepts either a resource subscription key, sent in the
//! `Ocp-Apim-Subscription-Key` header, or a Microsoft Entra ID bearer token
//! for the Cognitive Services scope.

use crate::error::{CuError, CuResult};
use azure_core::credentials::TokenCredential;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Header carrying a resource subscription key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Header carrying a bearer token.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// OAuth scope requested for Entra ID tokens.
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// Environment variable holding a subscription key.
pub const API_KEY_ENV: &str = "AZURE_AI_API_KEY";

/// Credential types supported by the Content Understanding SDK.
#[derive(Clone)]
pub enum CuCredential {
    /// Resource subscription key.
    SubscriptionKey(SecretString),

    /// Microsoft Entra ID token credential from `azure_identity` (or any other
    /// [`TokenCredential`] implementation).
    TokenCredential(Arc<dyn TokenCredential>),
}

impl CuCredential {
    /// Create a credential from the `AZURE_AI_API_KEY` environment variable.
    /// Falls back to developer tools credentials if the variable is unset or empty.
    pub fn from_env() -> CuResult<Self> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(Self::subscription_key(key)),
            _ => Self::developer_tools(),
        }
    }

    /// Create a subscription key credential.
    pub fn subscription_key(key: impl Into<String>) -> Self {
        Self::SubscriptionKey(SecretString::from(key.into()))
    }

    /// Wrap an existing token credential.
    pub fn token_credential(credential: Arc<dyn TokenCredential>) -> Self {
        Self::TokenCredential(credential)
    }

    /// Use the developer tools credential chain (Azure CLI, Azure Developer CLI).
    pub fn developer_tools() -> CuResult<Self> {
        let credential = azure_identity::DeveloperToolsCredential::new(None)
            .map_err(|e| CuError::Auth(format!("failed to create developer tools credential: {e}")))?;
        Ok(Self::TokenCredential(credential))
    }

    /// Use the Azure CLI credential.
    pub fn azure_cli() -> CuResult<Self> {
        let credential = azure_identity::AzureCliCredential::new(None)
            .map_err(|e| CuError::Auth(format!("failed to create Azure CLI credential: {e}")))?;
        Ok(Self::TokenCredential(credential))
    }

    /// Resolve the credential to an authentication header name and value.
    pub async fn resolve(&self) -> CuResult<(&'static str, String)> {
        match self {
            Self::SubscriptionKey(key) => {
                Ok((SUBSCRIPTION_KEY_HEADER, key.expose_secret().to_string()))
            }
            Self::TokenCredential(credential) => {
                let token = credential
                    .get_token(&[COGNITIVE_SERVICES_SCOPE], None)
                    .await
                    .map_err(|e| CuError::Auth(format!("failed to acquire token: {e}")))?;
                Ok((
                    AUTHORIZATION_HEADER,
                    format!("Bearer {}", token.token.secret()),
                ))
            }
        }
    }
}

impl std::fmt::Debug for CuCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubscriptionKey(_) => write!(f, "CuCredential::SubscriptionKey(****)"),
            Self::TokenCredential(_) => write!(f, "CuCredential::TokenCredential"),
        }
    }
}
