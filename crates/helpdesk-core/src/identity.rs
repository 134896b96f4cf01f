//! Claims carried in the platform-injected client principal header.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::TicketError;

pub const CLIENT_PRINCIPAL_HEADER: &str = "x-ms-client-principal";
pub const AGENT_ROLE: &str = "Agent";

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Principal {
    pub upn: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClientPrincipal {
    #[serde(default)]
    claims: Vec<Claim>,
}

#[derive(Debug, Deserialize)]
struct Claim {
    typ: String,
    val: String,
}

impl Principal {
    /// Decodes a base64 JSON claims payload. A missing, malformed, or
    /// undecodable header yields the anonymous principal.
    #[must_use]
    pub fn from_client_principal(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };
        let Ok(bytes) = STANDARD.decode(raw) else {
            return Self::default();
        };
        let Ok(decoded) = serde_json::from_slice::<ClientPrincipal>(&bytes) else {
            return Self::default();
        };

        let upn = decoded
            .claims
            .iter()
            .find(|claim| claim.typ.ends_with("/name") || claim.typ.ends_with("/upn"))
            .map(|claim| claim.val.clone());
        let roles = decoded
            .claims
            .into_iter()
            .filter(|claim| claim.typ == "roles" || claim.typ.ends_with("/role"))
            .map(|claim| claim.val)
            .collect();

        Self { upn, roles }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.upn.is_none() && self.roles.is_empty()
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|candidate| candidate == role)
    }

    /// # Errors
    /// Returns [`TicketError::Forbidden`] when the principal lacks `role`.
    pub fn require_role(&self, role: &str) -> Result<(), TicketError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(TicketError::Forbidden(format!("role {role} is required")))
        }
    }

    /// # Errors
    /// Returns [`TicketError::Forbidden`] unless the principal holds [`AGENT_ROLE`].
    pub fn require_agent(&self) -> Result<(), TicketError> {
        self.require_role(AGENT_ROLE)
    }
}
