//! Message Handler module for processing incoming chat messages
//!
//! Commands and main-menu texts are handled first. Anything else is input for
//! the active dialogue of the chat, gated by that dialogue's access module.

use tracing::{debug, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import core types
use crate::dialogue::{Module, Session};
use crate::services::{ClientProfile, Outbound, Role, UserRecord};

// Import handlers
use super::contact::{create_contact_menu, handle_chat_input};
use super::dialogue_manager::{cancel_order, go_back, handle_order_input, show_categories};
use super::manage_orders::show_new_orders;
use super::review_dialogue::{handle_review_input, prompt_review_step};
use super::router::{module_access, BotContext, Caller, HandlerResult, Input, Sender};
use super::staff_dialogue::{handle_staff_input, is_staff_module, prompt_staff_step, show_staff_menu};
use super::stats::show_stats_menu;
use super::ui_builder::{create_referral_keyboard, MenuAction};

/// Payload prefix of referral deep links (`/start ref_<inviter>`)
pub const REFERRAL_PAYLOAD_PREFIX: &str = "ref_";

/// Inviter chat id carried by a `/start` payload
pub fn referral_inviter(payload: &str) -> Option<i64> {
    payload
        .trim()
        .strip_prefix(REFERRAL_PAYLOAD_PREFIX)?
        .parse()
        .ok()
}

/// Handle incoming messages
pub async fn handle_message(ctx: &BotContext, sender: &Sender, input: &Input) -> HandlerResult {
    debug!(chat_id = sender.chat_id, input = ?input, "Received message");

    if let Input::Text(text) = input {
        let text = text.trim();

        if text == "/start" || text.starts_with("/start ") {
            let payload = text.strip_prefix("/start").unwrap_or_default().trim();
            return handle_start(ctx, sender, payload).await;
        }
        if text == "/cancel" {
            return handle_cancel_command(ctx, sender).await;
        }
        if text == "/help" {
            return handle_help_command(ctx, sender).await;
        }
        if let Some(action) = MenuAction::from_text(text, sender.lang()) {
            return handle_menu_action(ctx, sender, action).await;
        }
    }

    let session = ctx.sessions.get(sender.chat_id);
    if session.is_idle() {
        return handle_idle_input(ctx, sender).await;
    }

    let Some(caller) = ctx.authorize(sender, module_access(session.module())).await else {
        ctx.deny(sender).await;
        return Ok(());
    };

    if let Input::Text(text) = input {
        let text = text.trim();
        if text == t_lang("button-cancel", caller.lang()) {
            return cancel_flow(ctx, &caller, &session).await;
        }
        if text == t_lang("button-back", caller.lang()) {
            return back_flow(ctx, &caller, &session).await;
        }
    }

    match session.module() {
        Module::CreateOrder => handle_order_input(ctx, &caller, session, input).await,
        Module::AddStaff | Module::EditStaff => handle_staff_input(ctx, &caller, session, input).await,
        Module::Review => handle_review_input(ctx, &caller, session, input).await,
        Module::Chat => handle_chat_input(ctx, &caller, session, input).await,
        Module::None => Ok(()),
    }
}

/// Look up the sender, linking a pre-created staff record or registering a new client
async fn resolve_user(ctx: &BotContext, sender: &Sender, payload: &str) -> anyhow::Result<UserRecord> {
    let directory = &ctx.services.directory;
    let existing = directory.find_by_chat(sender.chat_id).await?;

    if existing.as_ref().map_or(true, |user| user.role == Role::Client) {
        if let Some(username) = &sender.username {
            if let Some(staff) = directory.claim_staff(sender.chat_id, username).await? {
                info!(chat_id = sender.chat_id, role = staff.role.as_str(), "Staff record claimed");
                return Ok(staff);
            }
        }
    }

    if let Some(user) = existing {
        return Ok(user);
    }

    let profile = ClientProfile {
        first_name: sender.first_name.clone(),
        last_name: sender.last_name.clone(),
    };
    let client = directory.register_client(sender.chat_id, &profile).await?;
    info!(chat_id = sender.chat_id, "New client registered");

    if let Some(inviter) = referral_inviter(payload).filter(|inviter| *inviter != sender.chat_id) {
        match ctx.services.referrals.register(inviter, sender.chat_id).await {
            Ok(true) => info!(chat_id = sender.chat_id, inviter, "Referral registered"),
            Ok(false) => debug!(chat_id = sender.chat_id, inviter, "Invitee already referred"),
            Err(e) => warn!(chat_id = sender.chat_id, inviter, error = %e, "Failed to register referral"),
        }
    }

    Ok(client)
}

async fn handle_start(ctx: &BotContext, sender: &Sender, payload: &str) -> HandlerResult {
    let user = resolve_user(ctx, sender, payload).await?;
    if user.is_blocked {
        ctx.deny(sender).await;
        return Ok(());
    }

    ctx.sessions.clear(sender.chat_id);
    let caller = Caller {
        sender,
        role: user.role,
    };
    let welcome = t_args_lang("welcome", &[("name", &sender.display_name())], sender.lang());
    ctx.reply_with_menu(&caller, welcome).await;
    Ok(())
}

async fn handle_cancel_command(ctx: &BotContext, sender: &Sender) -> HandlerResult {
    let Some(caller) = ctx.authorize(sender, None).await else {
        ctx.deny(sender).await;
        return Ok(());
    };
    ctx.sessions.clear(sender.chat_id);
    ctx.reply_with_menu(&caller, t_lang("cancelled", caller.lang()))
        .await;
    Ok(())
}

async fn handle_help_command(ctx: &BotContext, sender: &Sender) -> HandlerResult {
    let Some(caller) = ctx.authorize(sender, None).await else {
        ctx.deny(sender).await;
        return Ok(());
    };
    ctx.reply_with_menu(&caller, t_lang("help", caller.lang()))
        .await;
    Ok(())
}

/// Main-menu entries always leave the active flow
async fn handle_menu_action(ctx: &BotContext, sender: &Sender, action: MenuAction) -> HandlerResult {
    let Some(caller) = ctx.authorize(sender, action.module()).await else {
        ctx.deny(sender).await;
        return Ok(());
    };
    ctx.sessions.clear(sender.chat_id);
    let lang = caller.lang();

    match action {
        MenuAction::Order => show_categories(ctx, &caller).await,
        MenuAction::Contact => {
            ctx.reply(caller.chat_id(), create_contact_menu(ctx, lang)).await;
        }
        MenuAction::Referrals => {
            ctx.reply(
                caller.chat_id(),
                Outbound::with_markup(t_lang("referral-menu", lang), create_referral_keyboard(lang)),
            )
            .await;
        }
        MenuAction::ManageOrders => show_new_orders(ctx, &caller).await?,
        MenuAction::Staff => show_staff_menu(ctx, &caller).await,
        MenuAction::Stats => show_stats_menu(ctx, &caller).await,
        MenuAction::Main => {
            ctx.reply_with_menu(&caller, t_lang("main-menu", lang)).await;
        }
    }

    Ok(())
}

async fn handle_idle_input(ctx: &BotContext, sender: &Sender) -> HandlerResult {
    let Some(caller) = ctx.authorize(sender, None).await else {
        ctx.deny(sender).await;
        return Ok(());
    };
    ctx.reply_with_menu(&caller, t_lang("use-menu", caller.lang()))
        .await;
    Ok(())
}

async fn cancel_flow(ctx: &BotContext, caller: &Caller<'_>, session: &Session) -> HandlerResult {
    if session.module() == Module::CreateOrder {
        return cancel_order(ctx, caller).await;
    }
    ctx.sessions.clear(caller.chat_id());
    info!(chat_id = caller.chat_id(), module = session.module().as_str(), "Flow cancelled");
    ctx.reply_with_menu(caller, t_lang("cancelled", caller.lang()))
        .await;
    Ok(())
}

async fn back_flow(ctx: &BotContext, caller: &Caller<'_>, session: &Session) -> HandlerResult {
    match session.module() {
        Module::CreateOrder => go_back(ctx, caller).await,
        module if is_staff_module(module) => {
            let session = ctx.sessions.back(caller.chat_id());
            prompt_staff_step(ctx, caller, &session).await;
            Ok(())
        }
        Module::Review => {
            let session = ctx.sessions.back(caller.chat_id());
            prompt_review_step(ctx, caller, &session).await;
            Ok(())
        }
        // The chat has a single step; leaving it is the only way back
        _ => cancel_flow(ctx, caller, session).await,
    }
}
