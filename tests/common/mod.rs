//! Shared fixtures: in-memory collaborators and a router wired to them

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use teloxide::types::{InlineKeyboardButtonKind, ReplyMarkup};

use order_intake::bot::{BotContext, Collaborators, Event, Input, Sender, UpdateRouter};
use order_intake::config::BotConfig;
use order_intake::dialogue::{Category, PaymentMethod, ScheduledDate, Session};
use order_intake::errors::{NotifyError, StoreError};
use order_intake::localization::t_lang;
use order_intake::services::{
    ClientProfile, Directory, NewOrder, NewReview, NewStaff, Notifier, OrderRecord, OrderStats,
    OrderStatus, OrderStore, Outbound, ReferralRecord, ReferralStore, ReviewStore, Role,
    StaffUpdate, StatsPeriod, StatsStore, UserRecord,
};
use order_intake::session_store::SessionStore;

pub const LANG: Option<&str> = Some("en");

/// Localized English text, as the test users see it
pub fn en(key: &str) -> String {
    t_lang(key, LANG)
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i64, Outbound)>>,
    answered: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, message)| message.text.clone())
            .collect()
    }

    pub fn last_to(&self, chat_id: i64) -> Option<Outbound> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(chat, _)| *chat == chat_id)
            .map(|(_, message)| message.clone())
    }

    pub fn received(&self, chat_id: i64, text: &str) -> bool {
        self.texts_to(chat_id).iter().any(|t| t.contains(text))
    }

    pub fn answered_count(&self) -> usize {
        self.answered.lock().unwrap().len()
    }

    pub fn reset(&self) {
        self.sent.lock().unwrap().clear();
        self.answered.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat_id: i64, message: Outbound) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((chat_id, message));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), NotifyError> {
        self.answered.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}

/// Callback data of every inline button in a message
pub fn callback_data(message: &Outbound) -> Vec<String> {
    match &message.markup {
        Some(ReplyMarkup::InlineKeyboard(markup)) => markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|button| match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    users: Mutex<Vec<UserRecord>>,
    next_id: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeDirectory {
    fn check(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("directory offline".to_string()));
        }
        Ok(())
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1
    }

    pub fn insert(&self, chat_id: Option<i64>, role: Role, nickname: Option<&str>) -> i64 {
        let id = self.allocate_id();
        self.users.lock().unwrap().push(UserRecord {
            id,
            chat_id,
            role,
            first_name: Some(format!("User{id}")),
            last_name: None,
            nickname: nickname.map(str::to_string),
            phone: None,
            is_blocked: false,
        });
        id
    }

    pub fn get(&self, id: i64) -> Option<UserRecord> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    pub fn by_chat(&self, chat_id: i64) -> Option<UserRecord> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.chat_id == Some(chat_id))
            .cloned()
    }

    pub fn block(&self, id: i64) {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            user.is_blocked = true;
        }
    }

    pub fn count(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn find_by_chat(&self, chat_id: i64) -> Result<Option<UserRecord>, StoreError> {
        self.check()?;
        Ok(self.by_chat(chat_id))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        self.check()?;
        Ok(self.get(id))
    }

    async fn register_client(
        &self,
        chat_id: i64,
        profile: &ClientProfile,
    ) -> Result<UserRecord, StoreError> {
        self.check()?;
        if let Some(existing) = self.by_chat(chat_id) {
            return Ok(existing);
        }
        let user = UserRecord {
            id: self.allocate_id(),
            chat_id: Some(chat_id),
            role: Role::Client,
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            nickname: None,
            phone: None,
            is_blocked: false,
        };
        self.users.lock().unwrap().push(user.clone());
        Ok(user)
    }

    async fn claim_staff(
        &self,
        chat_id: i64,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        let Some(staff_id) = users
            .iter()
            .find(|u| {
                u.chat_id.is_none()
                    && u.nickname.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(username))
            })
            .map(|u| u.id)
        else {
            return Ok(None);
        };
        users.retain(|u| !(u.chat_id == Some(chat_id) && u.role == Role::Client));
        let staff = users.iter_mut().find(|u| u.id == staff_id).map(|u| {
            u.chat_id = Some(chat_id);
            u.clone()
        });
        Ok(staff)
    }

    async fn nickname_taken(&self, nickname: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .any(|u| u.nickname.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(nickname))))
    }

    async fn create_staff(&self, staff: &NewStaff) -> Result<UserRecord, StoreError> {
        self.check()?;
        let user = UserRecord {
            id: self.allocate_id(),
            chat_id: None,
            role: staff.role,
            first_name: Some(staff.first_name.clone()),
            last_name: Some(staff.last_name.clone()),
            nickname: Some(staff.nickname.clone()),
            phone: Some(staff.phone.clone()),
            is_blocked: false,
        };
        self.users.lock().unwrap().push(user.clone());
        Ok(user)
    }

    async fn update_staff(&self, id: i64, update: &StaffUpdate) -> Result<(), StoreError> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        let user = users.iter_mut().find(|u| u.id == id).ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        match update {
            StaffUpdate::FirstName(value) => user.first_name = Some(value.clone()),
            StaffUpdate::LastName(value) => user.last_name = Some(value.clone()),
            StaffUpdate::Phone(value) => user.phone = Some(value.clone()),
            StaffUpdate::Role(role) => user.role = *role,
        }
        Ok(())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<UserRecord>, StoreError> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.role == role)
            .cloned()
            .collect())
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        self.check()?;
        self.users.lock().unwrap().retain(|u| u.id != id);
        Ok(())
    }

    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<(), StoreError> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        let user = users.iter_mut().find(|u| u.id == id).ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.is_blocked = blocked;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOrders {
    orders: Mutex<HashMap<i64, OrderRecord>>,
    pub create_calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Status another operator writes between our read and our write
    pub interleaved: Mutex<Option<OrderStatus>>,
}

impl FakeOrders {
    pub fn insert(&self, id: i64, status: OrderStatus, order: NewOrder) {
        self.orders
            .lock()
            .unwrap()
            .insert(id, OrderRecord { id, status, order });
    }

    pub fn get(&self, id: i64) -> Option<OrderRecord> {
        self.orders.lock().unwrap().get(&id).cloned()
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for FakeOrders {
    async fn create(&self, order: &NewOrder) -> Result<i64, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("orders offline".to_string()));
        }
        let mut orders = self.orders.lock().unwrap();
        let id = orders.keys().max().copied().unwrap_or(0) + 1;
        orders.insert(
            id,
            OrderRecord {
                id,
                status: OrderStatus::New,
                order: order.clone(),
            },
        );
        Ok(id)
    }

    async fn find(&self, id: i64) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.get(id))
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<OrderRecord>, StoreError> {
        let mut orders: Vec<OrderRecord> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.status == status)
            .cloned()
            .collect();
        orders.sort_by_key(|record| record.id);
        Ok(orders)
    }

    async fn set_status(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        let mut orders = self.orders.lock().unwrap();
        let interleaved = self.interleaved.lock().unwrap().take();
        if let (Some(status), Some(record)) = (interleaved, orders.get_mut(&id)) {
            record.status = status;
        }
        match orders.get_mut(&id) {
            Some(record) if record.status == from => {
                record.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct FakeReviews {
    pub submitted: Mutex<Vec<NewReview>>,
    pub submit_calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeReviews {
    pub fn calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewStore for FakeReviews {
    async fn submit(&self, review: &NewReview) -> Result<i64, StoreError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reviews offline".to_string()));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(review.clone());
        Ok(submitted.len() as i64)
    }

    async fn has_review(&self, order_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .submitted
            .lock()
            .unwrap()
            .iter()
            .any(|review| review.order_id == order_id))
    }
}

#[derive(Default)]
pub struct FakeReferrals {
    pub referrals: Mutex<Vec<ReferralRecord>>,
}

#[async_trait]
impl ReferralStore for FakeReferrals {
    async fn register(&self, inviter_chat_id: i64, invitee_chat_id: i64) -> Result<bool, StoreError> {
        let mut referrals = self.referrals.lock().unwrap();
        if referrals.iter().any(|r| r.invitee_chat_id == invitee_chat_id) {
            return Ok(false);
        }
        referrals.push(ReferralRecord {
            inviter_chat_id,
            invitee_chat_id,
            payout_requested: false,
        });
        Ok(true)
    }

    async fn list_invitees(&self, inviter_chat_id: i64) -> Result<Vec<ReferralRecord>, StoreError> {
        Ok(self
            .referrals
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.inviter_chat_id == inviter_chat_id)
            .cloned()
            .collect())
    }

    async fn request_payout(
        &self,
        inviter_chat_id: i64,
        invitee_chat_id: i64,
    ) -> Result<bool, StoreError> {
        let mut referrals = self.referrals.lock().unwrap();
        match referrals.iter_mut().find(|r| {
            r.inviter_chat_id == inviter_chat_id
                && r.invitee_chat_id == invitee_chat_id
                && !r.payout_requested
        }) {
            Some(referral) => {
                referral.payout_requested = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct FakeStats {
    pub periods: Mutex<Vec<StatsPeriod>>,
}

#[async_trait]
impl StatsStore for FakeStats {
    async fn stats(&self, period: StatsPeriod) -> Result<OrderStats, StoreError> {
        self.periods.lock().unwrap().push(period);
        Ok(OrderStats {
            total_orders: 7,
            waste_removal: 4,
            demolition: 2,
            construction_materials: 1,
            completed: 5,
            reviews: 3,
            average_rating: Some(4.5),
        })
    }
}

/// Router wired to in-memory collaborators
pub struct Harness {
    pub router: Arc<UpdateRouter>,
    pub sessions: Arc<SessionStore>,
    pub directory: Arc<FakeDirectory>,
    pub orders: Arc<FakeOrders>,
    pub reviews: Arc<FakeReviews>,
    pub referrals: Arc<FakeReferrals>,
    pub stats: Arc<FakeStats>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        let sessions = Arc::new(SessionStore::new());
        let directory = Arc::new(FakeDirectory::default());
        let orders = Arc::new(FakeOrders::default());
        let reviews = Arc::new(FakeReviews::default());
        let referrals = Arc::new(FakeReferrals::default());
        let stats = Arc::new(FakeStats::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let services = Collaborators {
            directory: directory.clone(),
            orders: orders.clone(),
            reviews: reviews.clone(),
            referrals: referrals.clone(),
            stats: stats.clone(),
            notifier: notifier.clone(),
        };
        let ctx = BotContext::new(Arc::clone(&sessions), services, BotConfig::default());

        Self {
            router: Arc::new(UpdateRouter::new(ctx)),
            sessions,
            directory,
            orders,
            reviews,
            referrals,
            stats,
            notifier,
        }
    }

    pub fn sender(chat_id: i64) -> Sender {
        Sender {
            chat_id,
            username: None,
            first_name: Some("Test".to_string()),
            last_name: None,
            language_code: LANG.map(str::to_string),
        }
    }

    /// Register a linked user with the given role
    pub fn user(&self, chat_id: i64, role: Role) -> i64 {
        self.directory.insert(Some(chat_id), role, None)
    }

    pub async fn input(&self, chat_id: i64, input: Input) {
        self.router
            .handle(Event::Message {
                sender: Self::sender(chat_id),
                input,
            })
            .await;
    }

    pub async fn text(&self, chat_id: i64, text: &str) {
        self.input(chat_id, Input::Text(text.to_string())).await;
    }

    pub async fn photo(&self, chat_id: i64, file_id: &str) {
        self.input(chat_id, Input::Photo(file_id.to_string())).await;
    }

    pub async fn callback(&self, chat_id: i64, data: &str) {
        self.router
            .handle(Event::Callback {
                sender: Self::sender(chat_id),
                callback_id: format!("cb-{chat_id}-{data}"),
                data: Some(data.to_string()),
            })
            .await;
    }

    pub fn session(&self, chat_id: i64) -> Session {
        self.sessions.get(chat_id)
    }
}

impl Harness {
    /// `/start` from a user with a Telegram username
    pub async fn start_as(&self, chat_id: i64, username: Option<&str>, payload: Option<&str>) {
        let mut sender = Self::sender(chat_id);
        sender.username = username.map(str::to_string);
        let text = match payload {
            Some(payload) => format!("/start {payload}"),
            None => "/start".to_string(),
        };
        self.router
            .handle(Event::Message {
                sender,
                input: Input::Text(text),
            })
            .await;
    }
}

/// A finished waste-removal order of `client_chat_id`
pub fn sample_order(client_chat_id: i64) -> NewOrder {
    NewOrder {
        client_chat_id,
        category: Category::WasteRemoval,
        subcategory: "trash".to_string(),
        name: "Ivan".to_string(),
        photos: Vec::new(),
        video: None,
        date: ScheduledDate::Urgent,
        time: None,
        phone: "+7(978)-123-45-67".to_string(),
        address: "Lenina 1".to_string(),
        description: None,
        payment: PaymentMethod::Cash,
    }
}
