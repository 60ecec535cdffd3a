//! # Collaborator Interfaces
//!
//! Record types and the narrow async traits the dialogue core talks to. The
//! Postgres implementations live in [`crate::db`]; the Telegram notifier lives in
//! [`crate::bot::telegram`].

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use teloxide::types::ReplyMarkup;

use crate::dialogue::{Category, OrderDraft, PaymentMethod, ScheduledDate};
use crate::errors::{NotifyError, StoreError};

/// User role, as stored in the directory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Client,
    Operator,
    MainOperator,
    Driver,
    Loader,
    Owner,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Client,
        Role::Operator,
        Role::MainOperator,
        Role::Driver,
        Role::Loader,
        Role::Owner,
    ];

    /// Roles a staff member can be given
    pub const STAFF: [Role; 4] = [Role::Operator, Role::MainOperator, Role::Driver, Role::Loader];

    /// Database value
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Operator => "operator",
            Role::MainOperator => "main_operator",
            Role::Driver => "driver",
            Role::Loader => "loader",
            Role::Owner => "owner",
        }
    }

    /// Callback argument; never contains the `_` delimiter
    pub fn token(&self) -> &'static str {
        match self {
            Role::MainOperator => "mainoperator",
            other => other.as_str(),
        }
    }

    pub fn from_str_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == value)
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.token() == token)
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            Role::Client => "role-client",
            Role::Operator => "role-operator",
            Role::MainOperator => "role-main-operator",
            Role::Driver => "role-driver",
            Role::Loader => "role-loader",
            Role::Owner => "role-owner",
        }
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Client)
    }
}

/// A directory entry; staff records stay unlinked (`chat_id == None`) until claimed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub chat_id: Option<i64>,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub phone: Option<String>,
    pub is_blocked: bool,
}

impl UserRecord {
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        match (full.is_empty(), &self.nickname) {
            (false, _) => full,
            (true, Some(nickname)) => format!("@{nickname}"),
            (true, None) => format!("#{}", self.id),
        }
    }
}

/// Profile of a user seen for the first time
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewStaff {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub phone: String,
    pub role: Role,
}

/// A single-field change of a staff record
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StaffUpdate {
    FirstName(String),
    LastName(String),
    Phone(String),
    Role(Role),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Accepted,
    Rejected,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::New,
        OrderStatus::Accepted,
        OrderStatus::Rejected,
        OrderStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Completed => "completed",
        }
    }

    pub fn from_str_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            OrderStatus::New => "order-status-new",
            OrderStatus::Accepted => "order-status-accepted",
            OrderStatus::Rejected => "order-status-rejected",
            OrderStatus::Completed => "order-status-completed",
        }
    }
}

/// A complete order, ready to be persisted
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub client_chat_id: i64,
    pub category: Category,
    pub subcategory: String,
    pub name: String,
    pub photos: Vec<String>,
    pub video: Option<String>,
    pub date: ScheduledDate,
    pub time: Option<NaiveTime>,
    pub phone: String,
    pub address: String,
    pub description: Option<String>,
    pub payment: PaymentMethod,
}

impl NewOrder {
    /// Build the order from a finished draft; `None` when a required field is missing
    pub fn from_draft(client_chat_id: i64, draft: &OrderDraft) -> Option<Self> {
        Some(Self {
            client_chat_id,
            category: draft.category,
            subcategory: draft.subcategory.clone()?,
            name: draft.name.clone()?,
            photos: draft.photos.clone(),
            video: draft.video.clone(),
            date: draft.date?,
            time: draft.time,
            phone: draft.phone.clone()?,
            address: draft.address.clone()?,
            description: draft.description.clone(),
            payment: draft.payment?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderRecord {
    pub id: i64,
    pub status: OrderStatus,
    pub order: NewOrder,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewReview {
    pub order_id: i64,
    pub client_chat_id: i64,
    pub rating: u8,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferralRecord {
    pub inviter_chat_id: i64,
    pub invitee_chat_id: i64,
    pub payout_requested: bool,
}

/// Reporting window for statistics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsPeriod {
    Day,
    Week,
    Month,
    Year,
    All,
    /// Calendar month of the current year
    CalendarMonth(u32),
    /// Week 1..=5 of a calendar month of the current year
    MonthWeek { month: u32, week: u32 },
}

impl StatsPeriod {
    /// Inclusive date range of the period, `None` for all time
    pub fn range(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            StatsPeriod::Day => Some((today, today)),
            StatsPeriod::Week => Some((today - Duration::days(6), today)),
            StatsPeriod::Month => Some((today - Duration::days(29), today)),
            StatsPeriod::Year => Some((today - Duration::days(364), today)),
            StatsPeriod::All => None,
            StatsPeriod::CalendarMonth(month) => {
                let start = NaiveDate::from_ymd_opt(today.year(), month, 1)?;
                Some((start, last_day_of_month(start)?))
            }
            StatsPeriod::MonthWeek { month, week } => {
                if !(1..=5).contains(&week) {
                    return None;
                }
                let first = NaiveDate::from_ymd_opt(today.year(), month, 1)?;
                let last = last_day_of_month(first)?;
                let start = first + Duration::days(i64::from(week - 1) * 7);
                if start > last {
                    return None;
                }
                Some((start, (start + Duration::days(6)).min(last)))
            }
        }
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            StatsPeriod::Day => "stats-period-day",
            StatsPeriod::Week => "stats-period-week",
            StatsPeriod::Month => "stats-period-month",
            StatsPeriod::Year => "stats-period-year",
            StatsPeriod::All => "stats-period-all",
            StatsPeriod::CalendarMonth(_) => "stats-period-calendar-month",
            StatsPeriod::MonthWeek { .. } => "stats-period-month-week",
        }
    }
}

fn last_day_of_month(first: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = match first.month() {
        12 => (first.year() + 1, 1),
        m => (first.year(), m + 1),
    };
    NaiveDate::from_ymd_opt(year, month, 1).and_then(|next| next.pred_opt())
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderStats {
    pub total_orders: i64,
    pub waste_removal: i64,
    pub demolition: i64,
    pub construction_materials: i64,
    pub completed: i64,
    pub reviews: i64,
    pub average_rating: Option<f64>,
}

/// An outbound chat message
#[derive(Clone, Debug)]
pub struct Outbound {
    pub text: String,
    pub markup: Option<ReplyMarkup>,
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: None,
        }
    }

    pub fn with_markup(text: impl Into<String>, markup: impl Into<ReplyMarkup>) -> Self {
        Self {
            text: text.into(),
            markup: Some(markup.into()),
        }
    }
}

/// User directory: roles, staff records and blocking
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_by_chat(&self, chat_id: i64) -> Result<Option<UserRecord>, StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError>;
    /// Register a chat as a client; an existing record is returned unchanged
    async fn register_client(
        &self,
        chat_id: i64,
        profile: &ClientProfile,
    ) -> Result<UserRecord, StoreError>;
    /// Link an unlinked staff record whose nickname matches `username` to the chat
    async fn claim_staff(
        &self,
        chat_id: i64,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError>;
    async fn nickname_taken(&self, nickname: &str) -> Result<bool, StoreError>;
    async fn create_staff(&self, staff: &NewStaff) -> Result<UserRecord, StoreError>;
    async fn update_staff(&self, id: i64, update: &StaffUpdate) -> Result<(), StoreError>;
    async fn list_by_role(&self, role: Role) -> Result<Vec<UserRecord>, StoreError>;
    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;
    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: &NewOrder) -> Result<i64, StoreError>;
    async fn find(&self, id: i64) -> Result<Option<OrderRecord>, StoreError>;
    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<OrderRecord>, StoreError>;
    /// Move the order from `from` to `to`; `false` when its status is no longer `from`
    async fn set_status(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn submit(&self, review: &NewReview) -> Result<i64, StoreError>;
    async fn has_review(&self, order_id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Record an invitation; `false` when the invitee was already referred
    async fn register(&self, inviter_chat_id: i64, invitee_chat_id: i64)
        -> Result<bool, StoreError>;
    async fn list_invitees(&self, inviter_chat_id: i64) -> Result<Vec<ReferralRecord>, StoreError>;
    /// Flag a payout request; `false` when there is no such pending referral
    async fn request_payout(
        &self,
        inviter_chat_id: i64,
        invitee_chat_id: i64,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn stats(&self, period: StatsPeriod) -> Result<OrderStats, StoreError>;
}

/// Outbound message delivery; send once, failures are reported, never retried
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, message: Outbound) -> Result<(), NotifyError>;
    async fn answer_callback(&self, callback_id: &str) -> Result<(), NotifyError>;
}
