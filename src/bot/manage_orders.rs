//! Operator order management: list, view and status changes

use tracing::{info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::services::{OrderRecord, OrderStatus, Outbound};

use super::callback_handler::CallbackToken;
use super::router::{BotContext, Caller, HandlerResult};
use super::ui_builder::{
    create_manage_list_keyboard, create_manage_order_keyboard, create_review_invite_keyboard,
    format_order_details,
};

/// Status an action moves an order to, if the current status allows it
pub fn transition(current: OrderStatus, action: &str) -> Option<OrderStatus> {
    match (current, action) {
        (OrderStatus::New, "accept") => Some(OrderStatus::Accepted),
        (OrderStatus::New, "reject") => Some(OrderStatus::Rejected),
        (OrderStatus::Accepted, "done") => Some(OrderStatus::Completed),
        _ => None,
    }
}

pub async fn show_new_orders(ctx: &BotContext, caller: &Caller<'_>) -> HandlerResult {
    let lang = caller.lang();
    let orders = ctx.services.orders.list_by_status(OrderStatus::New).await?;

    let text = if orders.is_empty() {
        t_lang("manage-empty", lang)
    } else {
        t_args_lang("manage-list-title", &[("count", &orders.len().to_string())], lang)
    };
    ctx.reply(
        caller.chat_id(),
        Outbound::with_markup(text, create_manage_list_keyboard(&orders, lang)),
    )
    .await;
    Ok(())
}

/// `manage_list`, `manage_view_<id>` and `manage_<accept|reject|done>_<id>`
pub async fn handle_manage_callback(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    match token.arg(0)? {
        "list" => {
            token.expect_args(1)?;
            show_new_orders(ctx, caller).await
        }
        "view" => {
            token.expect_args(2)?;
            if let Some(record) = find_order(ctx, caller, token.id_arg(1)?).await? {
                show_order(ctx, caller, &record).await;
            }
            Ok(())
        }
        action @ ("accept" | "reject" | "done") => {
            token.expect_args(2)?;
            change_status(ctx, caller, token.id_arg(1)?, action).await
        }
        _ => Err(token.malformed().into()),
    }
}

async fn find_order(
    ctx: &BotContext,
    caller: &Caller<'_>,
    order_id: i64,
) -> anyhow::Result<Option<OrderRecord>> {
    let record = ctx.services.orders.find(order_id).await?;
    if record.is_none() {
        ctx.reply_text(caller.chat_id(), t_lang("manage-order-not-found", caller.lang()))
            .await;
    }
    Ok(record)
}

async fn show_order(ctx: &BotContext, caller: &Caller<'_>, record: &OrderRecord) {
    let lang = caller.lang();
    let text = format!(
        "{}\n{}",
        format_order_details(record.id, &record.order, lang),
        t_lang(record.status.label_key(), lang)
    );
    ctx.reply(
        caller.chat_id(),
        Outbound::with_markup(text, create_manage_order_keyboard(record, lang)),
    )
    .await;
}

async fn change_status(
    ctx: &BotContext,
    caller: &Caller<'_>,
    order_id: i64,
    action: &str,
) -> HandlerResult {
    let Some(mut record) = find_order(ctx, caller, order_id).await? else {
        return Ok(());
    };

    let Some(next) = transition(record.status, action) else {
        warn!(
            chat_id = caller.chat_id(),
            order_id,
            status = record.status.as_str(),
            action,
            "Order status change rejected"
        );
        ctx.reply_text(caller.chat_id(), t_lang("order-status-conflict", caller.lang()))
            .await;
        return Ok(());
    };

    if !ctx.services.orders.set_status(order_id, record.status, next).await? {
        warn!(
            chat_id = caller.chat_id(),
            order_id,
            action,
            "Order status changed concurrently"
        );
        ctx.reply_text(caller.chat_id(), t_lang("order-status-conflict", caller.lang()))
            .await;
        return Ok(());
    }
    info!(chat_id = caller.chat_id(), order_id, status = next.as_str(), "Order status changed");
    record.status = next;

    notify_client(ctx, &record).await;
    show_order(ctx, caller, &record).await;
    Ok(())
}

/// Tell the client about the new status; completed orders get a review invitation
async fn notify_client(ctx: &BotContext, record: &OrderRecord) {
    let client = record.order.client_chat_id;
    let id = record.id.to_string();

    let message = match record.status {
        OrderStatus::Accepted => Outbound::text(t_args_lang("order-accepted-client", &[("id", &id)], None)),
        OrderStatus::Rejected => Outbound::text(t_args_lang("order-rejected-client", &[("id", &id)], None)),
        OrderStatus::Completed => Outbound::with_markup(
            t_args_lang("order-completed-client", &[("id", &id)], None),
            create_review_invite_keyboard(record.id, None),
        ),
        OrderStatus::New => return,
    };
    ctx.reply(client, message).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert_eq!(transition(OrderStatus::New, "accept"), Some(OrderStatus::Accepted));
        assert_eq!(transition(OrderStatus::New, "reject"), Some(OrderStatus::Rejected));
        assert_eq!(transition(OrderStatus::Accepted, "done"), Some(OrderStatus::Completed));
        assert_eq!(transition(OrderStatus::New, "done"), None);
        assert_eq!(transition(OrderStatus::Rejected, "accept"), None);
        assert_eq!(transition(OrderStatus::Completed, "done"), None);
    }
}
