//! Contact module: company phone, call-back requests and the operator chat

use tracing::{debug, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::dialogue::{normalize_phone, validate_text, ChatDraft, Draft, Session, MAX_LONG_TEXT_LEN};
use crate::errors::InputError;
use crate::services::{Outbound, Role, UserRecord};

use super::callback_handler::CallbackToken;
use super::router::{BotContext, Caller, HandlerResult, Input};
use super::ui_builder::{create_contact_keyboard, create_main_menu_keyboard, create_phone_keyboard};

/// Roles tried in order when a client message needs an operator
pub const OPERATOR_PRIORITY: [Role; 3] = [Role::Operator, Role::MainOperator, Role::Owner];

pub fn create_contact_menu(ctx: &BotContext, language_code: Option<&str>) -> Outbound {
    Outbound::with_markup(
        t_args_lang("contact-menu", &[("phone", &ctx.config.company_phone)], language_code),
        create_contact_keyboard(language_code),
    )
}

/// `contact_call`, `contact_callme` and `contact_chat`
pub async fn handle_contact_callback(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    token.expect_args(1)?;
    let lang = caller.lang();

    match token.arg(0)? {
        "call" => {
            ctx.reply_text(
                caller.chat_id(),
                t_args_lang("contact-call-us", &[("phone", &ctx.config.company_phone)], lang),
            )
            .await;
        }
        "callme" => {
            let session = Session::start(Draft::Chat(ChatDraft { awaiting_phone: true }), 1);
            ctx.sessions.set(caller.chat_id(), session);
            ctx.reply(
                caller.chat_id(),
                Outbound::with_markup(t_lang("contact-callme-prompt", lang), create_phone_keyboard(lang)),
            )
            .await;
        }
        "chat" => {
            let session = Session::start(Draft::Chat(ChatDraft::default()), 1);
            ctx.sessions.set(caller.chat_id(), session);
            ctx.reply(
                caller.chat_id(),
                Outbound::with_markup(t_lang("contact-chat-prompt", lang), create_main_menu_keyboard(lang)),
            )
            .await;
        }
        _ => return Err(token.malformed().into()),
    }

    Ok(())
}

/// Message input while a chat session is active
pub async fn handle_chat_input(
    ctx: &BotContext,
    caller: &Caller<'_>,
    session: Session,
    input: &Input,
) -> HandlerResult {
    let awaiting_phone = matches!(session.draft(), Draft::Chat(ChatDraft { awaiting_phone: true }));

    if awaiting_phone {
        let phone = match input {
            Input::Contact { phone } => Ok(normalize_phone(phone).unwrap_or_else(|_| phone.clone())),
            Input::Text(text) => normalize_phone(text),
            _ => Err(InputError::InvalidPhone),
        };
        match phone {
            Ok(phone) => request_call_back(ctx, caller, &phone).await?,
            Err(e) => {
                ctx.reply(
                    caller.chat_id(),
                    Outbound::with_markup(
                        t_lang(e.message_key(), caller.lang()),
                        create_phone_keyboard(caller.lang()),
                    ),
                )
                .await;
            }
        }
        return Ok(());
    }

    let text = match input {
        Input::Text(text) => validate_text(text, MAX_LONG_TEXT_LEN),
        // A shared contact card in chat is a call-back request
        Input::Contact { phone } => {
            let phone = normalize_phone(phone).unwrap_or_else(|_| phone.clone());
            return request_call_back(ctx, caller, &phone).await;
        }
        _ => Err(InputError::Unexpected),
    };
    match text {
        Ok(text) => forward_to_operator(ctx, caller, &text).await?,
        Err(e) => {
            ctx.reply_text(caller.chat_id(), t_lang(e.message_key(), caller.lang()))
                .await;
        }
    }

    Ok(())
}

/// First linked, unblocked user in operator priority order
pub async fn find_operator(ctx: &BotContext) -> anyhow::Result<Option<UserRecord>> {
    for role in OPERATOR_PRIORITY {
        let users = ctx.services.directory.list_by_role(role).await?;
        if let Some(user) = users
            .into_iter()
            .find(|user| !user.is_blocked && user.chat_id.is_some())
        {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

async fn forward_to_operator(ctx: &BotContext, caller: &Caller<'_>, text: &str) -> HandlerResult {
    let lang = caller.lang();

    let Some((operator, operator_chat)) = find_operator(ctx)
        .await?
        .and_then(|user| user.chat_id.map(|chat_id| (user, chat_id)))
    else {
        warn!(chat_id = caller.chat_id(), "No operator available for chat message");
        ctx.reply_text(
            caller.chat_id(),
            t_args_lang("contact-no-operator", &[("phone", &ctx.config.company_phone)], lang),
        )
        .await;
        return Ok(());
    };

    let forwarded = t_args_lang(
        "contact-forwarded",
        &[
            ("name", &caller.sender.display_name()),
            ("chat", &caller.chat_id().to_string()),
            ("text", text),
        ],
        None,
    );
    ctx.reply_text(operator_chat, forwarded).await;
    debug!(chat_id = caller.chat_id(), operator_id = operator.id, "Chat message forwarded");

    ctx.reply(
        caller.chat_id(),
        Outbound::with_markup(t_lang("contact-message-sent", lang), create_main_menu_keyboard(lang)),
    )
    .await;
    Ok(())
}

async fn request_call_back(ctx: &BotContext, caller: &Caller<'_>, phone: &str) -> HandlerResult {
    let lang = caller.lang();
    let operator_chat = find_operator(ctx).await?.and_then(|user| user.chat_id);
    ctx.sessions.clear(caller.chat_id());

    match operator_chat {
        Some(operator_chat) => {
            let request = t_args_lang(
                "contact-callback-request",
                &[("name", &caller.sender.display_name()), ("phone", phone)],
                None,
            );
            ctx.reply_text(operator_chat, request).await;
            info!(chat_id = caller.chat_id(), "Call-back request forwarded");
            ctx.reply_with_menu(caller, t_lang("contact-callback-sent", lang))
                .await;
        }
        None => {
            warn!(chat_id = caller.chat_id(), "No operator available for call-back request");
            ctx.reply_with_menu(
                caller,
                t_args_lang("contact-no-operator", &[("phone", &ctx.config.company_phone)], lang),
            )
            .await;
        }
    }

    Ok(())
}
