//! Dialogue Manager module for the order creation flow
//!
//! The step sequence is fixed by the category chosen at flow start. Invalid input
//! never advances: the error is explained and the same step is prompted again.

use chrono::NaiveDate;
use teloxide::types::ReplyMarkup;
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import dialogue types
use crate::dialogue::{
    normalize_phone, parse_order_date, parse_time_slot, subcategory_label_key, validate_text,
    Category, Draft, Module, OrderDraft, OrderStep, PaymentMethod, ScheduledDate, Session,
    MAX_LONG_TEXT_LEN, MAX_PHOTOS, MAX_TEXT_LEN,
};
use crate::errors::InputError;
use crate::services::{NewOrder, Outbound, Role};

use super::callback_handler::CallbackToken;
use super::router::{BotContext, Caller, HandlerResult, Input};

// Import UI builder functions
use super::ui_builder::{
    create_category_keyboard, create_date_keyboard, create_description_keyboard, create_media_keyboard,
    create_order_nav_keyboard, create_payment_keyboard, create_phone_keyboard,
    create_subcategory_keyboard, create_text_nav_keyboard, create_time_keyboard,
    format_order_details, format_order_summary,
};

/// Input for one order step, from a button or a message
#[derive(Clone, Debug, PartialEq)]
enum StepInput {
    Text(String),
    Subcategory(String),
    Photo(String),
    Video(String),
    MediaDone,
    Date(NaiveDate),
    Urgent,
    Time(chrono::NaiveTime),
    Contact(String),
    Skip,
    Payment(PaymentMethod),
}

/// What a valid input does to the flow
enum StepOutcome {
    /// Record the draft and move on
    Advance(OrderDraft),
    /// Record the draft and stay on the step, with a notice
    Stay(OrderDraft, String),
    /// Terminal step completed
    Submit(OrderDraft),
}

/// Category picker that leads into the order flow
pub async fn show_categories(ctx: &BotContext, caller: &Caller<'_>) {
    ctx.reply(
        caller.chat_id(),
        Outbound::with_markup(
            t_lang("choose-category", caller.lang()),
            create_category_keyboard(caller.lang()),
        ),
    )
    .await;
}

/// Start the order flow for `category_<token>`
pub async fn start_order(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    token.expect_args(1)?;
    let category = Category::from_token(token.arg(0)?).ok_or_else(|| token.malformed())?;

    let plan = category.plan();
    let session = Session::start(
        Draft::CreateOrder(OrderDraft::new(category)),
        plan.total_steps(),
    );
    ctx.sessions.set(caller.chat_id(), session.clone());

    info!(
        chat_id = caller.chat_id(),
        category = category.as_str(),
        total_steps = plan.total_steps(),
        "Order flow started"
    );

    prompt_order_step(ctx, caller, &session).await;
    Ok(())
}

/// Order-flow buttons: `subcategory_*`, `media_done`, `date_*`, `time_*`, `pay_*`, `order_*`
pub async fn handle_order_callback(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    let session = ctx.sessions.get(caller.chat_id());

    if session.module() != Module::CreateOrder {
        debug!(chat_id = caller.chat_id(), token = %token, "Order callback without an order flow ignored");
        return Ok(());
    }

    token.expect_args(1)?;
    let arg = token.arg(0)?;

    let (expected, input) = match token.prefix() {
        "order" => match arg {
            "back" => return go_back(ctx, caller).await,
            "cancel" => return cancel_order(ctx, caller).await,
            "skip" => (OrderStep::Description, StepInput::Skip),
            _ => return Err(token.malformed().into()),
        },
        "subcategory" => (OrderStep::Subcategory, StepInput::Subcategory(arg.to_string())),
        "media" if arg == "done" => (OrderStep::Media, StepInput::MediaDone),
        "date" if arg == "urgent" => (OrderStep::Date, StepInput::Urgent),
        "date" => {
            let date = NaiveDate::parse_from_str(arg, "%Y-%m-%d").map_err(|_| token.malformed())?;
            (OrderStep::Date, StepInput::Date(date))
        }
        "time" => {
            let time = parse_time_slot(arg).map_err(|_| token.malformed())?;
            (OrderStep::Time, StepInput::Time(time))
        }
        "pay" => {
            let method = PaymentMethod::from_token(arg).ok_or_else(|| token.malformed())?;
            (OrderStep::Payment, StepInput::Payment(method))
        }
        _ => return Err(token.malformed().into()),
    };

    // Buttons of an earlier step are silent no-ops
    if session.order_step() != Some(expected) {
        debug!(
            chat_id = caller.chat_id(),
            token = %token,
            step = session.step(),
            "Stale order callback ignored"
        );
        return Ok(());
    }

    apply_step(ctx, caller, session, input).await
}

/// Message input while the order flow is active
pub async fn handle_order_input(
    ctx: &BotContext,
    caller: &Caller<'_>,
    session: Session,
    input: &Input,
) -> HandlerResult {
    let step_input = match input {
        Input::Text(text) => StepInput::Text(text.clone()),
        Input::Photo(file_id) => StepInput::Photo(file_id.clone()),
        Input::Video(file_id) => StepInput::Video(file_id.clone()),
        Input::Contact { phone } => StepInput::Contact(phone.clone()),
        Input::Unsupported => {
            reject_input(ctx, caller, &session, InputError::Unexpected).await;
            return Ok(());
        }
    };

    apply_step(ctx, caller, session, step_input).await
}

fn resolve_subcategory(
    category: Category,
    input: &str,
    language_code: Option<&str>,
) -> Result<String, InputError> {
    let input = input.trim();
    category
        .subcategories()
        .iter()
        .find(|key| **key == input || t_lang(&subcategory_label_key(key), language_code) == input)
        .map(|key| key.to_string())
        .ok_or(InputError::UnknownSubcategory)
}

fn resolve_payment(input: &str, language_code: Option<&str>) -> Result<PaymentMethod, InputError> {
    let input = input.trim();
    PaymentMethod::ALL
        .into_iter()
        .find(|method| t_lang(method.label_key(), language_code) == input)
        .ok_or(InputError::Unexpected)
}

/// Validate `input` against the current step
fn evaluate_step(
    step: OrderStep,
    order: &OrderDraft,
    input: StepInput,
    today: NaiveDate,
    language_code: Option<&str>,
) -> Result<StepOutcome, InputError> {
    let mut updated = order.clone();

    match (step, input) {
        (OrderStep::Subcategory, StepInput::Subcategory(key) | StepInput::Text(key)) => {
            updated.subcategory = Some(resolve_subcategory(order.category, &key, language_code)?);
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Name, StepInput::Text(text)) => {
            updated.name = Some(validate_text(&text, MAX_TEXT_LEN)?);
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Media, StepInput::Photo(file_id)) => {
            let count = updated.add_photo(file_id)?;
            let notice = t_args_lang(
                "media-photo-received",
                &[("count", &count.to_string()), ("max", &MAX_PHOTOS.to_string())],
                language_code,
            );
            Ok(StepOutcome::Stay(updated, notice))
        }
        (OrderStep::Media, StepInput::Video(file_id)) => {
            updated.video = Some(file_id);
            Ok(StepOutcome::Stay(updated, t_lang("media-video-received", language_code)))
        }
        (OrderStep::Media, StepInput::MediaDone) => Ok(StepOutcome::Advance(updated)),
        (OrderStep::Date, StepInput::Urgent) => {
            updated.date = Some(ScheduledDate::Urgent);
            updated.time = None;
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Date, StepInput::Date(date)) => {
            if date < today {
                return Err(InputError::PastDate);
            }
            updated.date = Some(ScheduledDate::On(date));
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Date, StepInput::Text(text)) => {
            updated.date = Some(ScheduledDate::On(parse_order_date(&text, today)?));
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Time, StepInput::Time(time)) => {
            updated.time = Some(time);
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Time, StepInput::Text(text)) => {
            updated.time = Some(parse_time_slot(&text)?);
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Phone, StepInput::Text(text)) => {
            updated.phone = Some(normalize_phone(&text)?);
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Phone, StepInput::Contact(raw)) => {
            // Shared contacts are trusted; keep the raw number when it has an unusual format
            updated.phone = Some(normalize_phone(&raw).unwrap_or(raw));
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Address, StepInput::Text(text)) => {
            updated.address = Some(validate_text(&text, MAX_TEXT_LEN)?);
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Description, StepInput::Text(text)) => {
            updated.description = Some(validate_text(&text, MAX_LONG_TEXT_LEN)?);
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Description, StepInput::Skip) => {
            updated.description = None;
            Ok(StepOutcome::Advance(updated))
        }
        (OrderStep::Payment, StepInput::Payment(method)) => {
            updated.payment = Some(method);
            Ok(StepOutcome::Submit(updated))
        }
        (OrderStep::Payment, StepInput::Text(text)) => {
            updated.payment = Some(resolve_payment(&text, language_code)?);
            Ok(StepOutcome::Submit(updated))
        }
        _ => Err(InputError::Unexpected),
    }
}

/// Step that follows `current`; an urgent date has no time slot
pub fn next_order_step(order: &OrderDraft, current: u8) -> u8 {
    let plan = order.plan;
    if plan.step_at(current) == Some(OrderStep::Date) && order.date == Some(ScheduledDate::Urgent)
    {
        if let Some(phone_step) = plan.position_of(OrderStep::Phone) {
            return phone_step;
        }
    }
    current.saturating_add(1)
}

async fn apply_step(
    ctx: &BotContext,
    caller: &Caller<'_>,
    mut session: Session,
    input: StepInput,
) -> HandlerResult {
    let (Some(order), Some(step)) = (session.order().cloned(), session.order_step()) else {
        return Ok(());
    };

    match evaluate_step(step, &order, input, ctx.today(), caller.lang()) {
        Ok(StepOutcome::Advance(updated)) => {
            let next = next_order_step(&updated, session.step());
            session.advance(next, |draft| *draft = Draft::CreateOrder(updated));
            ctx.sessions.set(caller.chat_id(), session.clone());
            debug!(chat_id = caller.chat_id(), step = session.step(), "Order step advanced");
            prompt_order_step(ctx, caller, &session).await;
        }
        Ok(StepOutcome::Stay(updated, notice)) => {
            *session.draft_mut() = Draft::CreateOrder(updated);
            ctx.sessions.set(caller.chat_id(), session.clone());
            ctx.reply(
                caller.chat_id(),
                Outbound::with_markup(notice, create_media_keyboard(session.step(), caller.lang())),
            )
            .await;
        }
        Ok(StepOutcome::Submit(updated)) => submit_order(ctx, caller, &session, updated).await,
        Err(e) => {
            debug!(chat_id = caller.chat_id(), step = ?step, error = %e, "Order input rejected");
            reject_input(ctx, caller, &session, e).await;
        }
    }

    Ok(())
}

/// Explain the error and prompt the same step again
async fn reject_input(ctx: &BotContext, caller: &Caller<'_>, session: &Session, e: InputError) {
    let message = match e {
        InputError::PhotoLimit(max) => {
            t_args_lang(e.message_key(), &[("max", &max.to_string())], caller.lang())
        }
        _ => t_lang(e.message_key(), caller.lang()),
    };
    ctx.reply_text(caller.chat_id(), message).await;
    prompt_order_step(ctx, caller, session).await;
}

/// Persist the finished order exactly once; the session is kept when that fails
async fn submit_order(ctx: &BotContext, caller: &Caller<'_>, session: &Session, order: OrderDraft) {
    let chat_id = caller.chat_id();
    let lang = caller.lang();

    let Some(new_order) = NewOrder::from_draft(chat_id, &order) else {
        warn!(chat_id, "Order draft incomplete at confirmation");
        ctx.reply_text(chat_id, t_lang("error-generic", lang)).await;
        prompt_order_step(ctx, caller, session).await;
        return;
    };

    match ctx.services.orders.create(&new_order).await {
        Ok(order_id) => {
            ctx.sessions.clear(chat_id);
            info!(chat_id, order_id, "Order submitted");

            ctx.reply_with_menu(
                caller,
                t_args_lang("order-created", &[("id", &order_id.to_string())], lang),
            )
            .await;

            let notice = format!(
                "{}\n\n{}",
                t_lang("order-staff-notice", None),
                format_order_details(order_id, &new_order, None)
            );
            ctx.notify_roles(&[Role::Operator, Role::MainOperator], &notice)
                .await;
        }
        Err(e) => {
            error!(chat_id, error = %e, "Failed to create order");
            ctx.reply(
                chat_id,
                Outbound::with_markup(
                    t_lang("order-create-failed", lang),
                    create_payment_keyboard(session.step(), lang),
                ),
            )
            .await;
        }
    }
}

/// Restore the previous step and prompt it
pub async fn go_back(ctx: &BotContext, caller: &Caller<'_>) -> HandlerResult {
    let session = ctx.sessions.back(caller.chat_id());
    if session.module() == Module::CreateOrder {
        prompt_order_step(ctx, caller, &session).await;
    }
    Ok(())
}

pub async fn cancel_order(ctx: &BotContext, caller: &Caller<'_>) -> HandlerResult {
    ctx.sessions.clear(caller.chat_id());
    info!(chat_id = caller.chat_id(), "Order flow cancelled");
    ctx.reply_with_menu(caller, t_lang("order-cancelled", caller.lang()))
        .await;
    Ok(())
}

/// Send the prompt and keyboard of the session's current step
pub async fn prompt_order_step(ctx: &BotContext, caller: &Caller<'_>, session: &Session) {
    let (Some(order), Some(step)) = (session.order(), session.order_step()) else {
        return;
    };
    let lang = caller.lang();
    let n = session.step();

    let header = t_args_lang(
        "order-step-progress",
        &[
            ("step", &n.to_string()),
            ("total", &session.total_steps().to_string()),
        ],
        lang,
    );

    let (body, markup): (String, ReplyMarkup) = match step {
        OrderStep::Subcategory => (
            t_lang("order-step-subcategory", lang),
            create_subcategory_keyboard(order.category, n, lang).into(),
        ),
        OrderStep::Name => (
            t_lang("order-step-name", lang),
            create_order_nav_keyboard(n, lang).into(),
        ),
        OrderStep::Media => (
            t_args_lang("order-step-media", &[("max", &MAX_PHOTOS.to_string())], lang),
            create_media_keyboard(n, lang).into(),
        ),
        OrderStep::Date => (
            t_lang("order-step-date", lang),
            create_date_keyboard(ctx.today(), n, lang).into(),
        ),
        OrderStep::Time => (
            t_lang("order-step-time", lang),
            create_time_keyboard(n, lang).into(),
        ),
        OrderStep::Phone => (t_lang("order-step-phone", lang), create_phone_keyboard(lang)),
        OrderStep::Address => (
            t_lang("order-step-address", lang),
            create_text_nav_keyboard(lang),
        ),
        OrderStep::Description => (
            t_lang("order-step-description", lang),
            create_description_keyboard(n, lang).into(),
        ),
        OrderStep::Payment => (
            format!(
                "{}\n{}",
                format_order_summary(order, lang),
                t_lang("order-step-payment", lang)
            ),
            create_payment_keyboard(n, lang).into(),
        ),
    };

    ctx.reply(
        caller.chat_id(),
        Outbound {
            text: format!("{header}\n{body}"),
            markup: Some(markup),
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 17).unwrap()
    }

    fn advanced(outcome: Result<StepOutcome, InputError>) -> OrderDraft {
        match outcome {
            Ok(StepOutcome::Advance(order)) => order,
            _ => panic!("expected the step to advance"),
        }
    }

    #[test]
    fn test_urgent_date_skips_time_step() {
        let order = OrderDraft::new(Category::WasteRemoval);
        let order = advanced(evaluate_step(OrderStep::Date, &order, StepInput::Urgent, today(), None));

        assert_eq!(order.date, Some(ScheduledDate::Urgent));
        // Date is step 4 of the full plan, phone is step 6
        assert_eq!(next_order_step(&order, 4), 6);
    }

    #[test]
    fn test_concrete_date_keeps_time_step() {
        let order = OrderDraft::new(Category::WasteRemoval);
        let order = advanced(evaluate_step(
            OrderStep::Date,
            &order,
            StepInput::Text("18.04.2025".to_string()),
            today(),
            None,
        ));
        assert_eq!(next_order_step(&order, 4), 5);
    }

    #[test]
    fn test_demolition_has_no_time_after_date() {
        let mut order = OrderDraft::new(Category::Demolition);
        order.date = Some(ScheduledDate::Urgent);
        // Compact plan: date is step 4 and phone step 5 either way
        assert_eq!(next_order_step(&order, 4), 5);
    }

    #[test]
    fn test_subcategory_must_belong_to_category() {
        let order = OrderDraft::new(Category::ConstructionMaterials);
        let result = evaluate_step(
            OrderStep::Subcategory,
            &order,
            StepInput::Subcategory("walls".to_string()),
            today(),
            None,
        );
        assert!(matches!(result, Err(InputError::UnknownSubcategory)));

        let order = advanced(evaluate_step(
            OrderStep::Subcategory,
            &order,
            StepInput::Subcategory("sand".to_string()),
            today(),
            None,
        ));
        assert_eq!(order.subcategory.as_deref(), Some("sand"));
    }

    #[test]
    fn test_media_does_not_advance() {
        let order = OrderDraft::new(Category::WasteRemoval);
        let result = evaluate_step(
            OrderStep::Media,
            &order,
            StepInput::Photo("file-1".to_string()),
            today(),
            None,
        );
        match result {
            Ok(StepOutcome::Stay(order, _)) => assert_eq!(order.photos, vec!["file-1".to_string()]),
            _ => panic!("photo should keep the media step"),
        }
    }

    #[test]
    fn test_contact_phone_kept_raw_when_unparseable() {
        let order = OrderDraft::new(Category::WasteRemoval);
        let order = advanced(evaluate_step(
            OrderStep::Phone,
            &order,
            StepInput::Contact("+44 20 7946 0958".to_string()),
            today(),
            None,
        ));
        assert_eq!(order.phone.as_deref(), Some("+44 20 7946 0958"));
    }

    #[test]
    fn test_wrong_input_kind_is_rejected() {
        let order = OrderDraft::new(Category::WasteRemoval);
        let result = evaluate_step(
            OrderStep::Name,
            &order,
            StepInput::Photo("file".to_string()),
            today(),
            None,
        );
        assert!(matches!(result, Err(InputError::Unexpected)));
    }
}
