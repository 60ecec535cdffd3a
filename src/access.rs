//! # Access Gate Module
//!
//! Role lookup and the permission table consulted before any state mutation.

use std::sync::Arc;

use tracing::{error, warn};

use crate::services::{Directory, Role};

/// Feature area guarded by the gate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessModule {
    Orders,
    Contact,
    Referrals,
    Reviews,
    ManageOrders,
    Staff,
    Stats,
}

impl AccessModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessModule::Orders => "orders",
            AccessModule::Contact => "contact",
            AccessModule::Referrals => "referrals",
            AccessModule::Reviews => "reviews",
            AccessModule::ManageOrders => "manage_orders",
            AccessModule::Staff => "staff",
            AccessModule::Stats => "stats",
        }
    }
}

/// The permission table; drivers and loaders have no module access
pub fn role_allows(role: Role, module: AccessModule) -> bool {
    use AccessModule::*;

    match module {
        Orders | Contact | Referrals | Reviews => matches!(
            role,
            Role::Client | Role::Operator | Role::MainOperator | Role::Owner
        ),
        ManageOrders => matches!(role, Role::Operator | Role::MainOperator | Role::Owner),
        Staff => matches!(role, Role::MainOperator | Role::Owner),
        Stats => matches!(role, Role::Owner),
    }
}

/// Result of a directory lookup for one chat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Standing {
    Active(Role),
    Blocked,
    /// The directory could not be consulted
    Unknown,
}

/// Side-effect free permission checks backed by the user directory
#[derive(Clone)]
pub struct AccessGate {
    directory: Arc<dyn Directory>,
}

impl AccessGate {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Look up a chat; users without a directory record are clients
    pub async fn standing(&self, chat_id: i64) -> Standing {
        match self.directory.find_by_chat(chat_id).await {
            Ok(Some(user)) if user.is_blocked => Standing::Blocked,
            Ok(Some(user)) => Standing::Active(user.role),
            Ok(None) => Standing::Active(Role::Client),
            Err(e) => {
                error!(chat_id, error = %e, "Role lookup failed");
                Standing::Unknown
            }
        }
    }

    /// Role used to render menus; falls back to client when the lookup fails
    pub async fn role(&self, chat_id: i64) -> Role {
        match self.standing(chat_id).await {
            Standing::Active(role) => role,
            Standing::Blocked | Standing::Unknown => Role::Client,
        }
    }

    pub async fn has_access(&self, chat_id: i64, module: AccessModule) -> bool {
        self.admit(chat_id, Some(module)).await.is_some()
    }

    /// Role of an active chat allowed into `module`; `None` only checks that the chat is not blocked
    pub async fn admit(&self, chat_id: i64, module: Option<AccessModule>) -> Option<Role> {
        match self.standing(chat_id).await {
            Standing::Active(role) if module.map_or(true, |m| role_allows(role, m)) => Some(role),
            standing => {
                warn!(chat_id, ?standing, ?module, "Access denied");
                None
            }
        }
    }
}
