//! Callback Handler module for processing inline keyboard callback queries
//!
//! Callback payloads are `_`-delimited tokens. The first token is looked up in a
//! registered prefix table that names the handler and the access module it needs.

use std::collections::HashSet;

use tracing::{debug, warn};

// Import localization
use crate::localization::t_lang;

// Import core types
use crate::access::AccessModule;
use crate::errors::{CallbackError, RegistryError};

use super::router::{BotContext, Caller, HandlerResult, Sender};
use super::{contact, dialogue_manager, manage_orders, referrals, review_dialogue, staff_dialogue, stats};

pub const DELIMITER: char = '_';

/// A parsed callback payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackToken {
    prefix: String,
    args: Vec<String>,
}

impl CallbackToken {
    pub fn parse(data: &str) -> Result<Self, CallbackError> {
        let data = data.trim();
        if data.is_empty() {
            return Err(CallbackError::Empty);
        }

        let mut parts = data.split(DELIMITER).map(str::to_string);
        let prefix = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.collect();

        if prefix.is_empty() || args.iter().any(String::is_empty) {
            return Err(CallbackError::Malformed(data.to_string()));
        }

        Ok(Self { prefix, args })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Argument at `index`, or a malformed-payload error
    pub fn arg(&self, index: usize) -> Result<&str, CallbackError> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| self.malformed())
    }

    /// Numeric id argument at `index`
    pub fn id_arg(&self, index: usize) -> Result<i64, CallbackError> {
        self.arg(index)?.parse().map_err(|_| self.malformed())
    }

    /// Fail unless the token has exactly `count` arguments
    pub fn expect_args(&self, count: usize) -> Result<(), CallbackError> {
        if self.args.len() != count {
            return Err(self.malformed());
        }
        Ok(())
    }

    pub fn malformed(&self) -> CallbackError {
        CallbackError::Malformed(self.to_string())
    }
}

impl std::fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix)?;
        for arg in &self.args {
            write!(f, "{DELIMITER}{arg}")?;
        }
        Ok(())
    }
}

/// Handler a callback prefix routes to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackTarget {
    OrderStart,
    OrderFlow,
    Staff,
    Contact,
    Referrals,
    Reviews,
    Stats,
    ManageOrders,
    Menu,
}

impl CallbackTarget {
    pub const ALL: [CallbackTarget; 9] = [
        CallbackTarget::OrderStart,
        CallbackTarget::OrderFlow,
        CallbackTarget::Staff,
        CallbackTarget::Contact,
        CallbackTarget::Referrals,
        CallbackTarget::Reviews,
        CallbackTarget::Stats,
        CallbackTarget::ManageOrders,
        CallbackTarget::Menu,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackRoute {
    pub target: CallbackTarget,
    /// `None` requires only that the sender is not blocked
    pub module: Option<AccessModule>,
}

/// Registered prefix table
#[derive(Clone, Debug, Default)]
pub struct CallbackRegistry {
    routes: Vec<(String, CallbackRoute)>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        prefix: &str,
        target: CallbackTarget,
        module: Option<AccessModule>,
    ) -> Self {
        self.routes
            .push((prefix.to_string(), CallbackRoute { target, module }));
        self
    }

    /// The prefix table of the bot
    pub fn standard() -> Self {
        use AccessModule as M;
        use CallbackTarget as T;

        Self::new()
            .register("category", T::OrderStart, Some(M::Orders))
            .register("subcategory", T::OrderFlow, Some(M::Orders))
            .register("media", T::OrderFlow, Some(M::Orders))
            .register("date", T::OrderFlow, Some(M::Orders))
            .register("time", T::OrderFlow, Some(M::Orders))
            .register("pay", T::OrderFlow, Some(M::Orders))
            .register("order", T::OrderFlow, Some(M::Orders))
            .register("staff", T::Staff, Some(M::Staff))
            .register("edit", T::Staff, Some(M::Staff))
            .register("role", T::Staff, Some(M::Staff))
            .register("contact", T::Contact, Some(M::Contact))
            .register("referral", T::Referrals, Some(M::Referrals))
            .register("review", T::Reviews, Some(M::Reviews))
            .register("rate", T::Reviews, Some(M::Reviews))
            .register("stats", T::Stats, Some(M::Stats))
            .register("manage", T::ManageOrders, Some(M::ManageOrders))
            .register("menu", T::Menu, None)
    }

    /// Startup check of the table
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for (prefix, _) in &self.routes {
            if prefix.is_empty() || prefix.contains(DELIMITER) {
                return Err(RegistryError::InvalidPrefix(prefix.clone()));
            }
            if !seen.insert(prefix.as_str()) {
                return Err(RegistryError::DuplicatePrefix(prefix.clone()));
            }
        }

        for target in CallbackTarget::ALL {
            if !self.routes.iter().any(|(_, route)| route.target == target) {
                return Err(RegistryError::UnroutedTarget(format!("{target:?}")));
            }
        }

        Ok(())
    }

    pub fn resolve(&self, token: &CallbackToken) -> Result<CallbackRoute, CallbackError> {
        self.routes
            .iter()
            .find(|(prefix, _)| prefix == token.prefix())
            .map(|(_, route)| *route)
            .ok_or_else(|| CallbackError::UnknownPrefix(token.prefix().to_string()))
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(prefix, _)| prefix.as_str())
    }
}

/// Handle callback queries from inline keyboards
pub async fn handle_callback(
    ctx: &BotContext,
    sender: &Sender,
    callback_id: &str,
    data: Option<&str>,
) -> HandlerResult {
    debug!(chat_id = sender.chat_id, data = ?data, "Received callback query");

    // Acknowledge first so the client stops its spinner, whatever happens next
    if let Err(e) = ctx.services.notifier.answer_callback(callback_id).await {
        warn!(chat_id = sender.chat_id, error = %e, "Failed to answer callback query");
    }

    let token = CallbackToken::parse(data.unwrap_or_default())?;
    let route = ctx.registry.resolve(&token)?;

    let Some(caller) = ctx.authorize(sender, route.module).await else {
        ctx.deny(sender).await;
        return Ok(());
    };

    match route.target {
        CallbackTarget::OrderStart => dialogue_manager::start_order(ctx, &caller, &token).await,
        CallbackTarget::OrderFlow => dialogue_manager::handle_order_callback(ctx, &caller, &token).await,
        CallbackTarget::Staff => staff_dialogue::handle_staff_callback(ctx, &caller, &token).await,
        CallbackTarget::Contact => contact::handle_contact_callback(ctx, &caller, &token).await,
        CallbackTarget::Referrals => referrals::handle_referral_callback(ctx, &caller, &token).await,
        CallbackTarget::Reviews => review_dialogue::handle_review_callback(ctx, &caller, &token).await,
        CallbackTarget::Stats => stats::handle_stats_callback(ctx, &caller, &token).await,
        CallbackTarget::ManageOrders => manage_orders::handle_manage_callback(ctx, &caller, &token).await,
        CallbackTarget::Menu => handle_menu_callback(ctx, &caller, &token).await,
    }
}

/// `menu_main` and `menu_order`
async fn handle_menu_callback(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    token.expect_args(1)?;

    match token.arg(0)? {
        "main" => {
            ctx.sessions.clear(caller.chat_id());
            ctx.reply_with_menu(caller, t_lang("main-menu", caller.lang()))
                .await;
        }
        "order" => {
            if !caller.can(AccessModule::Orders) {
                ctx.deny(caller.sender).await;
                return Ok(());
            }
            ctx.sessions.clear(caller.chat_id());
            dialogue_manager::show_categories(ctx, caller).await;
        }
        _ => return Err(token.malformed().into()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parsing() {
        let token = CallbackToken::parse("rate_42_3").unwrap();
        assert_eq!(token.prefix(), "rate");
        assert_eq!(token.id_arg(0).unwrap(), 42);
        assert_eq!(token.id_arg(1).unwrap(), 3);
        assert_eq!(token.to_string(), "rate_42_3");

        assert_eq!(CallbackToken::parse(""), Err(CallbackError::Empty));
        assert!(matches!(
            CallbackToken::parse("rate__3"),
            Err(CallbackError::Malformed(_))
        ));
        assert!(CallbackToken::parse("manage_view_abc").unwrap().id_arg(1).is_err());
    }

    #[test]
    fn test_standard_registry_is_valid() {
        let registry = CallbackRegistry::standard();
        assert_eq!(registry.validate(), Ok(()));
        let route = registry
            .resolve(&CallbackToken::parse("stats_day").unwrap())
            .unwrap();
        assert_eq!(route.module, Some(AccessModule::Stats));
    }

    #[test]
    fn test_registry_rejects_bad_tables() {
        let duplicate = CallbackRegistry::standard().register("menu", CallbackTarget::Menu, None);
        assert_eq!(
            duplicate.validate(),
            Err(RegistryError::DuplicatePrefix("menu".to_string()))
        );

        let invalid = CallbackRegistry::standard().register("bad_prefix", CallbackTarget::Menu, None);
        assert!(matches!(invalid.validate(), Err(RegistryError::InvalidPrefix(_))));

        let missing = CallbackRegistry::new().register("menu", CallbackTarget::Menu, None);
        assert!(matches!(missing.validate(), Err(RegistryError::UnroutedTarget(_))));
    }

    #[test]
    fn test_unknown_prefix() {
        let registry = CallbackRegistry::standard();
        let token = CallbackToken::parse("bogus_1").unwrap();
        assert_eq!(
            registry.resolve(&token),
            Err(CallbackError::UnknownPrefix("bogus".to_string()))
        );
    }
}
