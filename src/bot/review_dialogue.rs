//! Review dialogue: a star rating, then an optional comment

use teloxide::types::InlineKeyboardMarkup;
use tracing::{debug, error, info};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::dialogue::{validate_text, Draft, Module, ReviewDraft, Session, MAX_LONG_TEXT_LEN};
use crate::errors::InputError;
use crate::services::{NewReview, OrderStatus, Outbound};

use super::callback_handler::CallbackToken;
use super::router::{BotContext, Caller, HandlerResult, Input};
use super::ui_builder::{create_rating_keyboard, create_review_comment_keyboard};

pub const REVIEW_STEPS: u8 = 2;

/// `review_rate_<order>`, `review_skip` and `rate_<order>_<n>`
pub async fn handle_review_callback(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    match (token.prefix(), token.arg(0)?) {
        ("review", "rate") => {
            token.expect_args(2)?;
            start_review(ctx, caller, token.id_arg(1)?).await
        }
        ("review", "skip") => {
            token.expect_args(1)?;
            let session = ctx.sessions.get(caller.chat_id());
            if !session.is_at(Module::Review, 2) {
                debug!(chat_id = caller.chat_id(), "Stale review skip ignored");
                return Ok(());
            }
            submit_review(ctx, caller, &session, None).await;
            Ok(())
        }
        ("rate", _) => {
            token.expect_args(2)?;
            let order_id = token.id_arg(0)?;
            let rating = token.id_arg(1)?;
            apply_rating(ctx, caller, order_id, rating).await
        }
        _ => Err(token.malformed().into()),
    }
}

/// Start the flow for a completed order of the caller
async fn start_review(ctx: &BotContext, caller: &Caller<'_>, order_id: i64) -> HandlerResult {
    let eligible = ctx
        .services
        .orders
        .find(order_id)
        .await?
        .is_some_and(|record| {
            record.order.client_chat_id == caller.chat_id() && record.status == OrderStatus::Completed
        });

    if !eligible {
        ctx.reply_text(caller.chat_id(), t_lang("review-unavailable", caller.lang()))
            .await;
        return Ok(());
    }

    if ctx.services.reviews.has_review(order_id).await? {
        debug!(chat_id = caller.chat_id(), order_id, "Order already reviewed");
        ctx.reply_text(caller.chat_id(), t_lang("review-already-left", caller.lang()))
            .await;
        return Ok(());
    }

    let session = Session::start(
        Draft::Review(ReviewDraft {
            order_id,
            rating: None,
        }),
        REVIEW_STEPS,
    );
    ctx.sessions.set(caller.chat_id(), session.clone());
    info!(chat_id = caller.chat_id(), order_id, "Review flow started");
    prompt_review_step(ctx, caller, &session).await;
    Ok(())
}

/// The rating only applies on the rating step of a review for the same order
async fn apply_rating(
    ctx: &BotContext,
    caller: &Caller<'_>,
    order_id: i64,
    rating: i64,
) -> HandlerResult {
    let session = ctx.sessions.get(caller.chat_id());

    let matches_order = match session.draft() {
        Draft::Review(review) => review.order_id == order_id,
        _ => false,
    };
    if !session.is_at(Module::Review, 1) || !matches_order {
        debug!(chat_id = caller.chat_id(), order_id, "Stale rating callback ignored");
        return Ok(());
    }

    record_rating(ctx, caller, session, rating).await;
    Ok(())
}

async fn record_rating(ctx: &BotContext, caller: &Caller<'_>, mut session: Session, rating: i64) {
    let rating = match u8::try_from(rating) {
        Ok(rating) if (1..=5).contains(&rating) => rating,
        _ => {
            reject_input(ctx, caller, &session, InputError::RatingOutOfRange).await;
            return;
        }
    };

    session.advance(2, |draft| {
        if let Draft::Review(review) = draft {
            review.rating = Some(rating);
        }
    });
    ctx.sessions.set(caller.chat_id(), session.clone());
    prompt_review_step(ctx, caller, &session).await;
}

/// Message input while the review flow is active
pub async fn handle_review_input(
    ctx: &BotContext,
    caller: &Caller<'_>,
    session: Session,
    input: &Input,
) -> HandlerResult {
    let Input::Text(text) = input else {
        reject_input(ctx, caller, &session, InputError::Unexpected).await;
        return Ok(());
    };

    match session.step() {
        1 => match text.trim().parse::<i64>() {
            Ok(rating) => record_rating(ctx, caller, session, rating).await,
            Err(_) => reject_input(ctx, caller, &session, InputError::RatingOutOfRange).await,
        },
        _ => match validate_text(text, MAX_LONG_TEXT_LEN) {
            Ok(comment) => submit_review(ctx, caller, &session, Some(comment)).await,
            Err(e) => reject_input(ctx, caller, &session, e).await,
        },
    }

    Ok(())
}

/// Persist the review; the session is kept when that fails
async fn submit_review(
    ctx: &BotContext,
    caller: &Caller<'_>,
    session: &Session,
    comment: Option<String>,
) {
    let Draft::Review(ReviewDraft {
        order_id,
        rating: Some(rating),
    }) = session.draft().clone()
    else {
        return;
    };

    let review = NewReview {
        order_id,
        client_chat_id: caller.chat_id(),
        rating,
        comment,
    };

    match ctx.services.reviews.submit(&review).await {
        Ok(review_id) => {
            ctx.sessions.clear(caller.chat_id());
            info!(chat_id = caller.chat_id(), order_id, review_id, rating, "Review submitted");
            ctx.reply_with_menu(caller, t_lang("review-thanks", caller.lang()))
                .await;
        }
        Err(e) => {
            error!(chat_id = caller.chat_id(), order_id, error = %e, "Failed to submit review");
            ctx.reply_text(caller.chat_id(), t_lang("review-failed", caller.lang()))
                .await;
            prompt_review_step(ctx, caller, session).await;
        }
    }
}

async fn reject_input(ctx: &BotContext, caller: &Caller<'_>, session: &Session, e: InputError) {
    ctx.reply_text(caller.chat_id(), t_lang(e.message_key(), caller.lang()))
        .await;
    prompt_review_step(ctx, caller, session).await;
}

pub async fn prompt_review_step(ctx: &BotContext, caller: &Caller<'_>, session: &Session) {
    let Draft::Review(review) = session.draft() else {
        return;
    };
    let lang = caller.lang();

    let (text, markup): (String, InlineKeyboardMarkup) = match session.step() {
        1 => (
            t_args_lang("review-rate-prompt", &[("id", &review.order_id.to_string())], lang),
            create_rating_keyboard(review.order_id, lang),
        ),
        _ => (
            t_lang("review-comment-prompt", lang),
            create_review_comment_keyboard(lang),
        ),
    };

    ctx.reply(caller.chat_id(), Outbound::with_markup(text, markup))
        .await;
}
