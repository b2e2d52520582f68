//! Session events from the identity provider

use serde::{Deserialize, Serialize};

/// Signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// Session restored at startup; always processed
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub identity: Option<Identity>,
}

impl SessionEvent {
    pub fn initial(identity: Option<Identity>) -> Self {
        Self {
            kind: SessionEventKind::InitialSession,
            identity,
        }
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            identity: Some(identity),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            identity: None,
        }
    }

    pub fn token_refreshed(identity: Identity) -> Self {
        Self {
            kind: SessionEventKind::TokenRefreshed,
            identity: Some(identity),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user_id.as_str())
    }
}
