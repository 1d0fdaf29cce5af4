//! Delegated authentication result assembly.
//!
//! Flow Overview: an upstream identity provider has already authenticated the
//! user and produced a profile. This module turns that profile into a local
//! principal, choosing either the typed identifier (`<ProfileType>#<id>`) or the
//! raw provider identifier, as configured once at startup.
//!
//! There are two failure outcomes, both surfaced as [`AuthenticationError`]:
//! no profile at all, or a profile without a usable identifier.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};
use utoipa::ToSchema;

/// Separator between profile type and identifier in a typed identifier.
pub const TYPED_ID_SEPARATOR: &str = "#";

const DEFAULT_HANDLER_NAME: &str = "DelegatedAuthenticationHandler";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticationError {
    #[error("authentication did not produce a user profile for: {credential}")]
    NoProfile { credential: String },
    #[error("no identifier found for this user profile: {profile}")]
    NoIdentifier { profile: String },
}

/// Which profile identifier becomes the principal id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdentifierMode {
    /// `<ProfileType>#<id>`, unique across providers.
    #[default]
    Typed,
    /// The provider-local identifier as is.
    Raw,
}

impl IdentifierMode {
    #[must_use]
    pub fn from_typed_id_used(typed_id_used: bool) -> Self {
        if typed_id_used {
            Self::Typed
        } else {
            Self::Raw
        }
    }

    fn identifier(self, profile: &UserProfile) -> String {
        match self {
            Self::Typed => profile.typed_id(),
            Self::Raw => profile.id.clone(),
        }
    }
}

/// Profile produced by an upstream identity provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub profile_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub attributes: BTreeMap<String, Value>,
}

impl UserProfile {
    /// Typed identifier, or an empty string when the raw identifier is blank.
    #[must_use]
    pub fn typed_id(&self) -> String {
        if self.id.trim().is_empty() {
            String::new()
        } else {
            format!("{}{TYPED_ID_SEPARATOR}{}", self.profile_type, self.id)
        }
    }
}

impl fmt::Display for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}> | id: {} | attributes: {:?}",
            self.profile_type,
            self.id,
            self.attributes.keys().collect::<Vec<_>>()
        )
    }
}

/// Credential presented by the delegated client, before resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClientCredential {
    pub client_name: String,
}

impl fmt::Display for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientCredential({})", self.client_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CredentialMetaData {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Principal {
    pub id: String,
    #[schema(value_type = Object)]
    pub attributes: BTreeMap<String, Value>,
}

/// Successful authentication outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HandlerResult {
    pub handler: String,
    pub credential: CredentialMetaData,
    pub principal: Principal,
}

#[derive(Clone, Debug)]
pub struct DelegatedAuthenticationHandler {
    name: String,
    mode: IdentifierMode,
}

impl DelegatedAuthenticationHandler {
    #[must_use]
    pub fn new(mode: IdentifierMode) -> Self {
        Self {
            name: DEFAULT_HANDLER_NAME.to_string(),
            mode,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mode(&self) -> IdentifierMode {
        self.mode
    }

    /// Build the authentication result for a delegated login.
    ///
    /// # Errors
    /// Returns `AuthenticationError::NoProfile` if the provider produced no
    /// profile, or `AuthenticationError::NoIdentifier` if the selected
    /// identifier is blank.
    pub fn create_result(
        &self,
        credential: &ClientCredential,
        profile: Option<UserProfile>,
    ) -> Result<HandlerResult, AuthenticationError> {
        let Some(profile) = profile else {
            debug!(client = %credential.client_name, "No user profile produced");
            return Err(AuthenticationError::NoProfile {
                credential: credential.to_string(),
            });
        };

        let id = self.mode.identifier(&profile);
        if id.trim().is_empty() {
            debug!(client = %credential.client_name, "No identifier in user profile");
            return Err(AuthenticationError::NoIdentifier {
                profile: profile.to_string(),
            });
        }

        info!(client = %credential.client_name, principal = %id, "Delegated authentication succeeded");

        Ok(HandlerResult {
            handler: self.name.clone(),
            credential: CredentialMetaData {
                id: credential.client_name.clone(),
            },
            principal: Principal {
                id,
                attributes: profile.attributes,
            },
        })
    }
}

impl Default for DelegatedAuthenticationHandler {
    fn default() -> Self {
        Self::new(IdentifierMode::default())
    }
}
