//! Referral link and payout requests

use tracing::info;

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::services::{Outbound, Role};

use super::callback_handler::CallbackToken;
use super::router::{BotContext, Caller, HandlerResult};
use super::ui_builder::create_payout_keyboard;

/// `referral_link` and `referral_payout_<invitee>`
pub async fn handle_referral_callback(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    match token.arg(0)? {
        "link" => {
            token.expect_args(1)?;
            show_referral_link(ctx, caller).await
        }
        "payout" => {
            token.expect_args(2)?;
            request_payout(ctx, caller, token.id_arg(1)?).await
        }
        _ => Err(token.malformed().into()),
    }
}

async fn show_referral_link(ctx: &BotContext, caller: &Caller<'_>) -> HandlerResult {
    let lang = caller.lang();
    let invitees = ctx.services.referrals.list_invitees(caller.chat_id()).await?;
    let pending = invitees.iter().filter(|r| !r.payout_requested).count();

    let text = t_args_lang(
        "referral-link",
        &[
            ("link", &ctx.config.referral_link(caller.chat_id())),
            ("count", &invitees.len().to_string()),
            ("pending", &pending.to_string()),
        ],
        lang,
    );
    ctx.reply(
        caller.chat_id(),
        Outbound::with_markup(text, create_payout_keyboard(&invitees, lang)),
    )
    .await;
    Ok(())
}

async fn request_payout(ctx: &BotContext, caller: &Caller<'_>, invitee: i64) -> HandlerResult {
    let lang = caller.lang();

    if !ctx
        .services
        .referrals
        .request_payout(caller.chat_id(), invitee)
        .await?
    {
        ctx.reply_text(caller.chat_id(), t_lang("referral-payout-unavailable", lang))
            .await;
        return Ok(());
    }

    info!(chat_id = caller.chat_id(), invitee, "Referral payout requested");
    let notice = t_args_lang(
        "referral-payout-notice",
        &[
            ("name", &caller.sender.display_name()),
            ("chat", &caller.chat_id().to_string()),
            ("invitee", &invitee.to_string()),
        ],
        None,
    );
    ctx.notify_roles(&[Role::MainOperator, Role::Owner], &notice)
        .await;

    ctx.reply_with_menu(caller, t_lang("referral-payout-requested", lang))
        .await;
    Ok(())
}
