//! Order statistics for owners

use tracing::debug;

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::services::{OrderStats, Outbound, StatsPeriod};

use super::callback_handler::CallbackToken;
use super::router::{BotContext, Caller, HandlerResult};
use super::ui_builder::{
    create_stats_menu_keyboard, create_stats_months_keyboard, create_stats_weeks_keyboard,
};

pub async fn show_stats_menu(ctx: &BotContext, caller: &Caller<'_>) {
    ctx.reply(
        caller.chat_id(),
        Outbound::with_markup(
            t_lang("stats-menu", caller.lang()),
            create_stats_menu_keyboard(caller.lang()),
        ),
    )
    .await;
}

/// Map a `stats_*` token to the period it asks for
pub fn parse_period(token: &CallbackToken) -> Option<StatsPeriod> {
    let args: Vec<&str> = token.args().iter().map(String::as_str).collect();
    match args.as_slice() {
        ["day"] => Some(StatsPeriod::Day),
        ["week"] => Some(StatsPeriod::Week),
        ["month"] => Some(StatsPeriod::Month),
        ["year"] => Some(StatsPeriod::Year),
        ["all"] => Some(StatsPeriod::All),
        ["month", month] => month.parse().ok().map(StatsPeriod::CalendarMonth),
        ["week", month, week] => Some(StatsPeriod::MonthWeek {
            month: month.parse().ok()?,
            week: week.parse().ok()?,
        }),
        _ => None,
    }
}

/// `stats_menu`, `stats_months` and the period tokens
pub async fn handle_stats_callback(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    let lang = caller.lang();

    match token.args() {
        [menu] if menu == "menu" => {
            show_stats_menu(ctx, caller).await;
            return Ok(());
        }
        [months] if months == "months" => {
            ctx.reply(
                caller.chat_id(),
                Outbound::with_markup(t_lang("stats-choose-month", lang), create_stats_months_keyboard(lang)),
            )
            .await;
            return Ok(());
        }
        _ => {}
    }

    let today = ctx.today();
    let period = parse_period(token).ok_or_else(|| token.malformed())?;
    // Only "all" has no range; any other period without one is an impossible date
    if period != StatsPeriod::All && period.range(today).is_none() {
        return Err(token.malformed().into());
    }

    let stats = ctx.services.stats.stats(period).await?;
    debug!(chat_id = caller.chat_id(), period = ?period, total = stats.total_orders, "Stats requested");

    let report = format_stats(period, &stats, lang);
    let message = match period {
        StatsPeriod::CalendarMonth(month) => {
            Outbound::with_markup(report, create_stats_weeks_keyboard(month, lang))
        }
        _ => Outbound::with_markup(report, create_stats_menu_keyboard(lang)),
    };
    ctx.reply(caller.chat_id(), message).await;
    Ok(())
}

fn period_label(period: StatsPeriod, language_code: Option<&str>) -> String {
    match period {
        StatsPeriod::CalendarMonth(month) => t_lang(&format!("month-{month}"), language_code),
        StatsPeriod::MonthWeek { month, week } => t_args_lang(
            period.label_key(),
            &[
                ("month", &t_lang(&format!("month-{month}"), language_code)),
                ("week", &week.to_string()),
            ],
            language_code,
        ),
        _ => t_lang(period.label_key(), language_code),
    }
}

pub fn format_stats(period: StatsPeriod, stats: &OrderStats, language_code: Option<&str>) -> String {
    let rating = stats
        .average_rating
        .map(|avg| format!("{avg:.1}"))
        .unwrap_or_else(|| "-".to_string());

    t_args_lang(
        "stats-report",
        &[
            ("period", &period_label(period, language_code)),
            ("total", &stats.total_orders.to_string()),
            ("waste", &stats.waste_removal.to_string()),
            ("demolition", &stats.demolition.to_string()),
            ("materials", &stats.construction_materials.to_string()),
            ("completed", &stats.completed.to_string()),
            ("reviews", &stats.reviews.to_string()),
            ("rating", &rating),
        ],
        language_code,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(data: &str) -> Option<StatsPeriod> {
        parse_period(&CallbackToken::parse(data).unwrap())
    }

    #[test]
    fn test_parse_period_tokens() {
        assert_eq!(period("stats_day"), Some(StatsPeriod::Day));
        assert_eq!(period("stats_all"), Some(StatsPeriod::All));
        assert_eq!(period("stats_month"), Some(StatsPeriod::Month));
        assert_eq!(period("stats_month_03"), Some(StatsPeriod::CalendarMonth(3)));
        assert_eq!(
            period("stats_week_11_2"),
            Some(StatsPeriod::MonthWeek { month: 11, week: 2 })
        );
        assert_eq!(period("stats_month_xx"), None);
        assert_eq!(period("stats_decade"), None);
    }

    #[test]
    fn test_format_stats_without_reviews() {
        let stats = OrderStats {
            total_orders: 4,
            waste_removal: 2,
            demolition: 1,
            construction_materials: 1,
            ..Default::default()
        };
        let report = format_stats(StatsPeriod::Day, &stats, Some("en"));
        assert!(report.contains('4'));
        assert!(report.contains('-'));
    }
}
