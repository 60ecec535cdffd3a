//! UI Builder module for creating keyboards and formatting messages

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
    ReplyMarkup,
};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import access and domain types
use crate::access::{role_allows, AccessModule};
use crate::dialogue::{
    subcategory_label_key, Category, OrderDraft, PaymentMethod, ScheduledDate, StaffField,
};
use crate::services::{NewOrder, OrderRecord, OrderStatus, ReferralRecord, Role, UserRecord};

/// First and last hourly time slot offered on the time step
const FIRST_SLOT_HOUR: u32 = 9;
const LAST_SLOT_HOUR: u32 = 18;
/// Days offered on the date keyboard, after "urgent"
const DATE_CHOICES: i64 = 7;

/// Entries of the main reply keyboard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    Order,
    Contact,
    Referrals,
    ManageOrders,
    Staff,
    Stats,
    Main,
}

impl MenuAction {
    pub const ALL: [MenuAction; 7] = [
        MenuAction::Order,
        MenuAction::Contact,
        MenuAction::Referrals,
        MenuAction::ManageOrders,
        MenuAction::Staff,
        MenuAction::Stats,
        MenuAction::Main,
    ];

    pub fn label_key(&self) -> &'static str {
        match self {
            MenuAction::Order => "menu-order",
            MenuAction::Contact => "menu-contact",
            MenuAction::Referrals => "menu-referrals",
            MenuAction::ManageOrders => "menu-manage-orders",
            MenuAction::Staff => "menu-staff",
            MenuAction::Stats => "menu-stats",
            MenuAction::Main => "menu-main",
        }
    }

    /// Module the entry requires; the main-menu entry is open to everyone
    pub fn module(&self) -> Option<AccessModule> {
        match self {
            MenuAction::Order => Some(AccessModule::Orders),
            MenuAction::Contact => Some(AccessModule::Contact),
            MenuAction::Referrals => Some(AccessModule::Referrals),
            MenuAction::ManageOrders => Some(AccessModule::ManageOrders),
            MenuAction::Staff => Some(AccessModule::Staff),
            MenuAction::Stats => Some(AccessModule::Stats),
            MenuAction::Main => None,
        }
    }

    /// Match a typed or pressed menu label in the user's language
    pub fn from_text(text: &str, language_code: Option<&str>) -> Option<Self> {
        let text = text.trim();
        Self::ALL
            .into_iter()
            .find(|action| t_lang(action.label_key(), language_code) == text)
    }
}

/// Main reply keyboard for a role; only entries the role may open are shown
pub fn main_menu(role: Role, language_code: Option<&str>) -> ReplyMarkup {
    let rows: Vec<Vec<KeyboardButton>> = MenuAction::ALL
        .into_iter()
        .filter(|action| *action != MenuAction::Main)
        .filter(|action| action.module().is_some_and(|m| role_allows(role, m)))
        .map(|action| vec![KeyboardButton::new(t_lang(action.label_key(), language_code))])
        .collect();

    if rows.is_empty() {
        return ReplyMarkup::kb_remove();
    }

    KeyboardMarkup::new(rows).resize_keyboard().into()
}

fn button(label: String, data: impl Into<String>) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, data.into())
}

/// Inline button back to the main menu
pub fn main_menu_button(language_code: Option<&str>) -> InlineKeyboardButton {
    button(t_lang("menu-main", language_code), "menu_main")
}

pub fn create_main_menu_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![main_menu_button(language_code)]])
}

/// Back/cancel row shown under every order step
fn order_nav_row(step: u8, language_code: Option<&str>) -> Vec<InlineKeyboardButton> {
    let mut row = Vec::new();
    if step > 1 {
        row.push(button(t_lang("button-back", language_code), "order_back"));
    }
    row.push(button(t_lang("button-cancel", language_code), "order_cancel"));
    row
}

pub fn create_category_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Category::ALL
        .into_iter()
        .map(|category| {
            vec![button(
                t_lang(category.label_key(), language_code),
                format!("category_{}", category.token()),
            )]
        })
        .collect();
    rows.push(vec![main_menu_button(language_code)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn create_subcategory_keyboard(
    category: Category,
    step: u8,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = category
        .subcategories()
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|key| {
                    button(
                        t_lang(&subcategory_label_key(key), language_code),
                        format!("subcategory_{key}"),
                    )
                })
                .collect()
        })
        .collect();
    rows.push(order_nav_row(step, language_code));
    InlineKeyboardMarkup::new(rows)
}

/// Keyboard with only the navigation row
pub fn create_order_nav_keyboard(step: u8, language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![order_nav_row(step, language_code)])
}

pub fn create_media_keyboard(step: u8, language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(t_lang("button-media-done", language_code), "media_done")],
        order_nav_row(step, language_code),
    ])
}

/// "Urgent" plus the next days, weekends marked
pub fn create_date_keyboard(
    today: NaiveDate,
    step: u8,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![button(
        t_lang("button-date-urgent", language_code),
        "date_urgent",
    )]];

    let days: Vec<InlineKeyboardButton> = (1..=DATE_CHOICES)
        .map(|offset| today + Duration::days(offset))
        .map(|date| {
            let label = date.format("%d.%m").to_string();
            let label = match date.weekday() {
                Weekday::Sat | Weekday::Sun => format!("🔴 {label}"),
                _ => label,
            };
            button(label, format!("date_{}", date.format("%Y-%m-%d")))
        })
        .collect();

    rows.extend(days.chunks(4).map(|chunk| chunk.to_vec()));
    rows.push(order_nav_row(step, language_code));
    InlineKeyboardMarkup::new(rows)
}

pub fn create_time_keyboard(step: u8, language_code: Option<&str>) -> InlineKeyboardMarkup {
    let slots: Vec<InlineKeyboardButton> = (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
        .map(|hour| {
            let slot = format!("{hour:02}:00");
            button(slot.clone(), format!("time_{slot}"))
        })
        .collect();

    let mut rows: Vec<Vec<InlineKeyboardButton>> =
        slots.chunks(5).map(|chunk| chunk.to_vec()).collect();
    rows.push(order_nav_row(step, language_code));
    InlineKeyboardMarkup::new(rows)
}

/// Reply keyboard with a share-contact button and text navigation
pub fn create_phone_keyboard(language_code: Option<&str>) -> ReplyMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(t_lang("button-share-phone", language_code))
            .request(ButtonRequest::Contact)],
        vec![
            KeyboardButton::new(t_lang("button-back", language_code)),
            KeyboardButton::new(t_lang("button-cancel", language_code)),
        ],
    ])
    .resize_keyboard()
    .into()
}

/// Reply keyboard with text navigation only
pub fn create_text_nav_keyboard(language_code: Option<&str>) -> ReplyMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(t_lang("button-back", language_code)),
        KeyboardButton::new(t_lang("button-cancel", language_code)),
    ]])
    .resize_keyboard()
    .into()
}

pub fn create_description_keyboard(step: u8, language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(t_lang("button-skip", language_code), "order_skip")],
        order_nav_row(step, language_code),
    ])
}

pub fn create_payment_keyboard(step: u8, language_code: Option<&str>) -> InlineKeyboardMarkup {
    let methods = PaymentMethod::ALL
        .into_iter()
        .map(|method| {
            button(
                t_lang(method.label_key(), language_code),
                format!("pay_{}", method.as_str()),
            )
        })
        .collect();
    InlineKeyboardMarkup::new(vec![methods, order_nav_row(step, language_code)])
}

fn format_date(date: &ScheduledDate, language_code: Option<&str>) -> String {
    match date {
        ScheduledDate::Urgent => t_lang("date-urgent", language_code),
        ScheduledDate::On(date) => date.format("%d.%m.%Y").to_string(),
    }
}

fn push_line(out: &mut String, key: &str, value: &str, language_code: Option<&str>) {
    out.push_str(&t_args_lang(key, &[("value", value)], language_code));
    out.push('\n');
}

/// Order summary shown on the confirmation step
pub fn format_order_summary(order: &OrderDraft, language_code: Option<&str>) -> String {
    let mut summary = format!("{}\n\n", t_lang("summary-title", language_code));

    push_line(
        &mut summary,
        "summary-category",
        &t_lang(order.category.label_key(), language_code),
        language_code,
    );
    if let Some(subcategory) = &order.subcategory {
        push_line(
            &mut summary,
            "summary-subcategory",
            &t_lang(&subcategory_label_key(subcategory), language_code),
            language_code,
        );
    }
    if let Some(name) = &order.name {
        push_line(&mut summary, "summary-name", name, language_code);
    }
    summary.push_str(&t_args_lang(
        "summary-media",
        &[
            ("photos", &order.photos.len().to_string()),
            ("videos", if order.video.is_some() { "1" } else { "0" }),
        ],
        language_code,
    ));
    summary.push('\n');
    if let Some(date) = &order.date {
        push_line(&mut summary, "summary-date", &format_date(date, language_code), language_code);
    }
    if let Some(time) = &order.time {
        push_line(
            &mut summary,
            "summary-time",
            &time.format("%H:%M").to_string(),
            language_code,
        );
    }
    if let Some(phone) = &order.phone {
        push_line(&mut summary, "summary-phone", phone, language_code);
    }
    if let Some(address) = &order.address {
        push_line(&mut summary, "summary-address", address, language_code);
    }
    if let Some(description) = &order.description {
        push_line(&mut summary, "summary-description", description, language_code);
    }

    summary
}

/// Order card shown to staff
pub fn format_order_details(id: i64, order: &NewOrder, language_code: Option<&str>) -> String {
    let mut details = format!(
        "{}\n\n",
        t_args_lang("order-card-title", &[("id", &id.to_string())], language_code)
    );

    push_line(
        &mut details,
        "summary-category",
        &t_lang(order.category.label_key(), language_code),
        language_code,
    );
    push_line(
        &mut details,
        "summary-subcategory",
        &t_lang(&subcategory_label_key(&order.subcategory), language_code),
        language_code,
    );
    push_line(&mut details, "summary-name", &order.name, language_code);
    push_line(
        &mut details,
        "summary-date",
        &format_date(&order.date, language_code),
        language_code,
    );
    if let Some(time) = &order.time {
        push_line(
            &mut details,
            "summary-time",
            &time.format("%H:%M").to_string(),
            language_code,
        );
    }
    push_line(&mut details, "summary-phone", &order.phone, language_code);
    push_line(&mut details, "summary-address", &order.address, language_code);
    if let Some(description) = &order.description {
        push_line(&mut details, "summary-description", description, language_code);
    }
    push_line(
        &mut details,
        "summary-payment",
        &t_lang(order.payment.label_key(), language_code),
        language_code,
    );
    details.push_str(&t_args_lang(
        "summary-media",
        &[
            ("photos", &order.photos.len().to_string()),
            ("videos", if order.video.is_some() { "1" } else { "0" }),
        ],
        language_code,
    ));

    details
}

pub fn create_contact_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(t_lang("contact-call", language_code), "contact_call")],
        vec![button(t_lang("contact-callme", language_code), "contact_callme")],
        vec![button(t_lang("contact-chat", language_code), "contact_chat")],
        vec![main_menu_button(language_code)],
    ])
}

pub fn create_referral_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(t_lang("referral-get-link", language_code), "referral_link")],
        vec![main_menu_button(language_code)],
    ])
}

/// One payout button per invitee that has not been paid out yet
pub fn create_payout_keyboard(
    invitees: &[ReferralRecord],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = invitees
        .iter()
        .filter(|referral| !referral.payout_requested)
        .map(|referral| {
            vec![button(
                t_args_lang(
                    "referral-payout-button",
                    &[("invitee", &referral.invitee_chat_id.to_string())],
                    language_code,
                ),
                format!("referral_payout_{}", referral.invitee_chat_id),
            )]
        })
        .collect();
    rows.push(vec![main_menu_button(language_code)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn create_rating_keyboard(order_id: i64, language_code: Option<&str>) -> InlineKeyboardMarkup {
    let stars = (1..=5)
        .map(|n| button("⭐".repeat(n), format!("rate_{order_id}_{n}")))
        .collect();
    InlineKeyboardMarkup::new(vec![stars, vec![main_menu_button(language_code)]])
}

pub fn create_review_comment_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(t_lang("button-skip", language_code), "review_skip")],
        vec![main_menu_button(language_code)],
    ])
}

/// Invitation sent to the client when an order is completed
pub fn create_review_invite_keyboard(
    order_id: i64,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button(
        t_lang("review-leave", language_code),
        format!("review_rate_{order_id}"),
    )]])
}

/// Roles that can be assigned by the acting user
pub fn assignable_roles(actor: Role) -> Vec<Role> {
    Role::STAFF
        .into_iter()
        .filter(|role| *role != Role::MainOperator || actor == Role::Owner)
        .collect()
}

pub fn create_role_keyboard(actor: Role, language_code: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = assignable_roles(actor)
        .into_iter()
        .map(|role| {
            vec![button(
                t_lang(role.label_key(), language_code),
                format!("role_{}", role.token()),
            )]
        })
        .collect();
    rows.push(vec![main_menu_button(language_code)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn create_staff_menu_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(t_lang("staff-add", language_code), "staff_add")],
        vec![button(t_lang("staff-list", language_code), "staff_list")],
        vec![main_menu_button(language_code)],
    ])
}

pub fn create_staff_roles_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Role::STAFF
        .into_iter()
        .map(|role| {
            vec![button(
                t_lang(role.label_key(), language_code),
                format!("staff_list_{}", role.token()),
            )]
        })
        .collect();
    rows.push(vec![button(t_lang("button-back", language_code), "staff_menu")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn create_staff_list_keyboard(
    role: Role,
    users: &[UserRecord],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = users
        .iter()
        .map(|user| {
            let label = if user.is_blocked {
                format!("🚫 {}", user.display_name())
            } else {
                user.display_name()
            };
            vec![button(label, format!("staff_select_{}_{}", role.token(), user.id))]
        })
        .collect();
    rows.push(vec![button(t_lang("button-back", language_code), "staff_list")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn create_staff_actions_keyboard(
    role: Role,
    user: &UserRecord,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let block_key = if user.is_blocked {
        "staff-unblock"
    } else {
        "staff-block"
    };
    InlineKeyboardMarkup::new(vec![
        vec![button(
            t_lang("staff-edit", language_code),
            format!("staff_action_edit_{}", user.id),
        )],
        vec![
            button(
                t_lang(block_key, language_code),
                format!("staff_action_block_{}", user.id),
            ),
            button(
                t_lang("staff-delete", language_code),
                format!("staff_action_delete_{}", user.id),
            ),
        ],
        vec![button(
            t_lang("button-back", language_code),
            format!("staff_list_{}", role.token()),
        )],
    ])
}

pub fn create_staff_field_keyboard(
    target_user_id: i64,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = StaffField::ALL
        .into_iter()
        .map(|field| {
            vec![button(
                t_lang(field.label_key(), language_code),
                format!("edit_field_{}_{}", field.token(), target_user_id),
            )]
        })
        .collect();
    rows.push(vec![main_menu_button(language_code)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn format_staff_card(user: &UserRecord, language_code: Option<&str>) -> String {
    let mut card = format!("{}\n\n", user.display_name());
    push_line(
        &mut card,
        "staff-card-role",
        &t_lang(user.role.label_key(), language_code),
        language_code,
    );
    if let Some(nickname) = &user.nickname {
        push_line(&mut card, "staff-card-nickname", &format!("@{nickname}"), language_code);
    }
    if let Some(phone) = &user.phone {
        push_line(&mut card, "staff-card-phone", phone, language_code);
    }
    let status_key = match (user.is_blocked, user.chat_id.is_some()) {
        (true, _) => "staff-status-blocked",
        (false, true) => "staff-status-active",
        (false, false) => "staff-status-pending",
    };
    card.push_str(&t_lang(status_key, language_code));
    card
}

pub fn create_stats_menu_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    let periods = [
        ("stats-period-day", "stats_day"),
        ("stats-period-week", "stats_week"),
        ("stats-period-month", "stats_month"),
        ("stats-period-year", "stats_year"),
        ("stats-period-all", "stats_all"),
    ];
    let mut rows: Vec<Vec<InlineKeyboardButton>> = periods
        .chunks(2)
        .map(|chunk| {
            chunk
                .iter()
                .map(|(key, data)| button(t_lang(key, language_code), *data))
                .collect()
        })
        .collect();
    rows.push(vec![button(t_lang("stats-by-month", language_code), "stats_months")]);
    rows.push(vec![main_menu_button(language_code)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn create_stats_months_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    let months: Vec<InlineKeyboardButton> = (1..=12)
        .map(|month: u32| {
            button(
                t_lang(&format!("month-{month}"), language_code),
                format!("stats_month_{month:02}"),
            )
        })
        .collect();
    let mut rows: Vec<Vec<InlineKeyboardButton>> =
        months.chunks(3).map(|chunk| chunk.to_vec()).collect();
    rows.push(vec![button(t_lang("button-back", language_code), "stats_menu")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn create_stats_weeks_keyboard(month: u32, language_code: Option<&str>) -> InlineKeyboardMarkup {
    let weeks = (1..=5)
        .map(|week| {
            button(
                t_args_lang("stats-week-button", &[("week", &week.to_string())], language_code),
                format!("stats_week_{month:02}_{week}"),
            )
        })
        .collect();
    InlineKeyboardMarkup::new(vec![
        weeks,
        vec![button(t_lang("button-back", language_code), "stats_months")],
    ])
}

pub fn create_manage_list_keyboard(
    orders: &[OrderRecord],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = orders
        .iter()
        .map(|record| {
            vec![button(
                t_args_lang(
                    "manage-order-button",
                    &[
                        ("id", &record.id.to_string()),
                        ("category", &t_lang(record.order.category.label_key(), language_code)),
                    ],
                    language_code,
                ),
                format!("manage_view_{}", record.id),
            )]
        })
        .collect();
    rows.push(vec![main_menu_button(language_code)]);
    InlineKeyboardMarkup::new(rows)
}

/// Status actions available for an order
pub fn create_manage_order_keyboard(
    record: &OrderRecord,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    match record.status {
        OrderStatus::New => rows.push(vec![
            button(
                t_lang("manage-accept", language_code),
                format!("manage_accept_{}", record.id),
            ),
            button(
                t_lang("manage-reject", language_code),
                format!("manage_reject_{}", record.id),
            ),
        ]),
        OrderStatus::Accepted => rows.push(vec![button(
            t_lang("manage-done", language_code),
            format!("manage_done_{}", record.id),
        )]),
        OrderStatus::Rejected | OrderStatus::Completed => {}
    }
    rows.push(vec![button(t_lang("button-back", language_code), "manage_list")]);
    InlineKeyboardMarkup::new(rows)
}
