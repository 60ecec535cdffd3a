//! Update Router module, the single entry point for inbound events
//!
//! Every event takes its chat's lock first, so events of one chat are handled
//! strictly in arrival order while other chats run in parallel.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use tracing::{debug, error, warn};

// Import localization
use crate::localization::t_lang;

// Import core types
use crate::access::{role_allows, AccessGate, AccessModule};
use crate::config::BotConfig;
use crate::dialogue::Module;
use crate::errors::CallbackError;
use crate::services::{
    Directory, Notifier, OrderStore, Outbound, ReferralStore, ReviewStore, Role, StatsStore,
};
use crate::session_store::SessionStore;

// Import handlers
use super::callback_handler::{handle_callback, CallbackRegistry};
use super::message_handler::handle_message;
use super::ui_builder::main_menu;

/// Who sent an event
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sender {
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl Sender {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            ..Default::default()
        }
    }

    pub fn lang(&self) -> Option<&str> {
        self.language_code.as_deref()
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.username) {
            (Some(first), _) => match &self.last_name {
                Some(last) => format!("{first} {last}"),
                None => first.clone(),
            },
            (None, Some(username)) => format!("@{username}"),
            (None, None) => format!("#{}", self.chat_id),
        }
    }
}

/// Content of an inbound message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Text(String),
    /// Telegram file id of the largest photo size
    Photo(String),
    Video(String),
    Contact { phone: String },
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Message {
        sender: Sender,
        input: Input,
    },
    Callback {
        sender: Sender,
        callback_id: String,
        data: Option<String>,
    },
}

impl Event {
    pub fn sender(&self) -> &Sender {
        match self {
            Event::Message { sender, .. } | Event::Callback { sender, .. } => sender,
        }
    }
}

/// A sender that passed the access gate
#[derive(Clone, Copy, Debug)]
pub struct Caller<'a> {
    pub sender: &'a Sender,
    pub role: Role,
}

impl Caller<'_> {
    pub fn chat_id(&self) -> i64 {
        self.sender.chat_id
    }

    pub fn lang(&self) -> Option<&str> {
        self.sender.lang()
    }

    pub fn can(&self, module: AccessModule) -> bool {
        role_allows(self.role, module)
    }
}

/// The external collaborators the core talks to
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn Directory>,
    pub orders: Arc<dyn OrderStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub referrals: Arc<dyn ReferralStore>,
    pub stats: Arc<dyn StatsStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Shared state handed to every handler
pub struct BotContext {
    pub sessions: Arc<SessionStore>,
    pub gate: AccessGate,
    pub registry: CallbackRegistry,
    pub services: Collaborators,
    pub config: BotConfig,
}

impl BotContext {
    pub fn new(sessions: Arc<SessionStore>, services: Collaborators, config: BotConfig) -> Self {
        Self {
            sessions,
            gate: AccessGate::new(Arc::clone(&services.directory)),
            registry: CallbackRegistry::standard(),
            services,
            config,
        }
    }

    pub fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    /// Send once; a failed delivery is logged and dropped
    pub async fn reply(&self, chat_id: i64, message: Outbound) {
        if let Err(e) = self.services.notifier.send(chat_id, message).await {
            error!(chat_id, error = %e, "Failed to send message");
        }
    }

    pub async fn reply_text(&self, chat_id: i64, text: String) {
        self.reply(chat_id, Outbound::text(text)).await;
    }

    /// Reply with the role's main menu keyboard
    pub async fn reply_with_menu(&self, caller: &Caller<'_>, text: String) {
        self.reply(
            caller.chat_id(),
            Outbound::with_markup(text, main_menu(caller.role, caller.lang())),
        )
        .await;
    }

    pub async fn deny(&self, sender: &Sender) {
        self.reply_text(sender.chat_id, t_lang("access-denied", sender.lang()))
            .await;
    }

    /// Send a text to every linked, unblocked user holding one of `roles`
    pub async fn notify_roles(&self, roles: &[Role], text: &str) -> usize {
        let mut delivered = 0;
        for role in roles {
            let users = match self.services.directory.list_by_role(*role).await {
                Ok(users) => users,
                Err(e) => {
                    error!(role = role.as_str(), error = %e, "Failed to list staff for notification");
                    continue;
                }
            };
            for user in users.iter().filter(|u| !u.is_blocked) {
                if let Some(chat_id) = user.chat_id {
                    self.reply_text(chat_id, text.to_string()).await;
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Gate a sender for an optional module; `None` means only "not blocked" is required
    pub async fn authorize<'a>(
        &self,
        sender: &'a Sender,
        module: Option<AccessModule>,
    ) -> Option<Caller<'a>> {
        self.gate
            .admit(sender.chat_id, module)
            .await
            .map(|role| Caller { sender, role })
    }
}

/// Access module guarding input to an active flow
pub fn module_access(module: Module) -> Option<AccessModule> {
    match module {
        Module::None => None,
        Module::CreateOrder => Some(AccessModule::Orders),
        Module::AddStaff | Module::EditStaff => Some(AccessModule::Staff),
        Module::Review => Some(AccessModule::Reviews),
        Module::Chat => Some(AccessModule::Contact),
    }
}

pub struct UpdateRouter {
    ctx: BotContext,
}

impl UpdateRouter {
    pub fn new(ctx: BotContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    /// Handle one inbound event end to end
    pub async fn handle(&self, event: Event) {
        let chat_id = event.sender().chat_id;
        let _chat_guard = self.ctx.sessions.lock_chat(chat_id).await;
        debug!(chat_id, "Handling event");

        let (sender, result) = match &event {
            Event::Message { sender, input } => (sender, handle_message(&self.ctx, sender, input).await),
            Event::Callback {
                sender,
                callback_id,
                data,
            } => (
                sender,
                handle_callback(&self.ctx, sender, callback_id, data.as_deref()).await,
            ),
        };

        if let Err(e) = result {
            self.report_failure(sender, e).await;
        }
    }

    async fn report_failure(&self, sender: &Sender, error: anyhow::Error) {
        let key = if let Some(e) = error.downcast_ref::<CallbackError>() {
            warn!(chat_id = sender.chat_id, error = %e, "Rejected callback");
            "error-unknown-command"
        } else {
            error!(chat_id = sender.chat_id, error = %error, "Event handling failed");
            "error-generic"
        };
        self.ctx
            .reply_text(sender.chat_id, t_lang(key, sender.lang()))
            .await;
    }
}

/// Result type of every handler
pub type HandlerResult = Result<()>;
