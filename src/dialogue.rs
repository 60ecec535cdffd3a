//! Dialogue session model and step input validation.
//!
//! A [`Session`] is the per-chat conversation state. The collected data is a
//! tagged union ([`Draft`]) with one record shape per module, so an idle session
//! can never carry data and an order flow can never hold staff fields.

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::errors::InputError;

/// Maximum number of photos attached to one order
pub const MAX_PHOTOS: usize = 20;
/// Maximum length of a free-text field
pub const MAX_TEXT_LEN: usize = 255;
/// Maximum length of an order description or chat message
pub const MAX_LONG_TEXT_LEN: usize = 2000;

static NON_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\D").expect("Non-digit pattern should be valid"));
static NICKNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{3,32}$").expect("Nickname pattern should be valid")
});

/// The active dialogue type of a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Module {
    #[default]
    None,
    CreateOrder,
    AddStaff,
    EditStaff,
    Review,
    Chat,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::None => "none",
            Module::CreateOrder => "create_order",
            Module::AddStaff => "add_staff",
            Module::EditStaff => "edit_staff",
            Module::Review => "review",
            Module::Chat => "chat",
        }
    }
}

/// Service category chosen at the start of an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    WasteRemoval,
    Demolition,
    ConstructionMaterials,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::WasteRemoval,
        Category::Demolition,
        Category::ConstructionMaterials,
    ];

    /// Stored category value
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::WasteRemoval => "waste_removal",
            Category::Demolition => "demolition",
            Category::ConstructionMaterials => "construction_materials",
        }
    }

    /// Callback argument (`category_<token>`)
    pub fn token(&self) -> &'static str {
        match self {
            Category::WasteRemoval => "waste",
            Category::Demolition => "demolition",
            Category::ConstructionMaterials => "materials",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.token() == token)
    }

    pub fn from_str_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            Category::WasteRemoval => "category-waste-removal",
            Category::Demolition => "category-demolition",
            Category::ConstructionMaterials => "category-construction-materials",
        }
    }

    /// Subcategory keys offered for this category
    pub fn subcategories(&self) -> &'static [&'static str] {
        match self {
            Category::WasteRemoval => &[
                "trash", "furniture", "metal", "debris", "tires", "food", "other",
            ],
            Category::Demolition => &[
                "floors", "plumbing", "walls", "openings", "prep", "house", "other",
            ],
            Category::ConstructionMaterials => &["sand", "cement", "brick", "other"],
        }
    }

    /// Step sequence of the order flow for this category
    pub fn plan(&self) -> OrderPlan {
        match self {
            Category::Demolition => OrderPlan::Compact,
            Category::WasteRemoval | Category::ConstructionMaterials => OrderPlan::Full,
        }
    }
}

/// Localization key of a subcategory label
pub fn subcategory_label_key(subcategory: &str) -> String {
    format!("subcategory-{subcategory}")
}

/// One prompt of the order flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStep {
    Subcategory,
    Name,
    Media,
    Date,
    Time,
    Phone,
    Address,
    Description,
    Payment,
}

const FULL_PLAN: [OrderStep; 9] = [
    OrderStep::Subcategory,
    OrderStep::Name,
    OrderStep::Media,
    OrderStep::Date,
    OrderStep::Time,
    OrderStep::Phone,
    OrderStep::Address,
    OrderStep::Description,
    OrderStep::Payment,
];

const COMPACT_PLAN: [OrderStep; 7] = [
    OrderStep::Subcategory,
    OrderStep::Name,
    OrderStep::Media,
    OrderStep::Date,
    OrderStep::Phone,
    OrderStep::Address,
    OrderStep::Payment,
];

/// Order flow variant, fixed once when the category is chosen
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderPlan {
    /// 9 steps, with time slot and description
    Full,
    /// 7 steps, booked per day without a description
    Compact,
}

impl OrderPlan {
    pub fn steps(&self) -> &'static [OrderStep] {
        match self {
            OrderPlan::Full => &FULL_PLAN,
            OrderPlan::Compact => &COMPACT_PLAN,
        }
    }

    pub fn total_steps(&self) -> u8 {
        self.steps().len() as u8
    }

    /// Prompt at the 1-based step number
    pub fn step_at(&self, step: u8) -> Option<OrderStep> {
        let index = usize::from(step).checked_sub(1)?;
        self.steps().get(index).copied()
    }

    /// 1-based step number of a prompt, if the plan has it
    pub fn position_of(&self, order_step: OrderStep) -> Option<u8> {
        self.steps()
            .iter()
            .position(|s| *s == order_step)
            .map(|i| i as u8 + 1)
    }
}

/// Requested service date
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledDate {
    /// As soon as possible
    Urgent,
    On(NaiveDate),
}

/// Payment method chosen at the terminal step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 2] = [PaymentMethod::Cash, PaymentMethod::Card];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == token)
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "payment-cash",
            PaymentMethod::Card => "payment-card",
        }
    }
}

/// Data collected by the order flow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub category: Category,
    pub plan: OrderPlan,
    pub subcategory: Option<String>,
    pub name: Option<String>,
    pub photos: Vec<String>,
    pub video: Option<String>,
    pub date: Option<ScheduledDate>,
    pub time: Option<NaiveTime>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub payment: Option<PaymentMethod>,
}

impl OrderDraft {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            plan: category.plan(),
            subcategory: None,
            name: None,
            photos: Vec::new(),
            video: None,
            date: None,
            time: None,
            phone: None,
            address: None,
            description: None,
            payment: None,
        }
    }

    /// Attach a photo, returning the new photo count
    pub fn add_photo(&mut self, file_id: String) -> Result<usize, InputError> {
        if self.photos.len() >= MAX_PHOTOS {
            return Err(InputError::PhotoLimit(MAX_PHOTOS));
        }
        self.photos.push(file_id);
        Ok(self.photos.len())
    }
}

/// Data collected by the staff-add flow
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffDraft {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub phone: Option<String>,
}

/// Editable field of a staff record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaffField {
    FirstName,
    LastName,
    Phone,
    Role,
}

impl StaffField {
    pub const ALL: [StaffField; 4] = [
        StaffField::FirstName,
        StaffField::LastName,
        StaffField::Phone,
        StaffField::Role,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            StaffField::FirstName => "name",
            StaffField::LastName => "lastname",
            StaffField::Phone => "phone",
            StaffField::Role => "role",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.token() == token)
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            StaffField::FirstName => "staff-field-name",
            StaffField::LastName => "staff-field-lastname",
            StaffField::Phone => "staff-field-phone",
            StaffField::Role => "staff-field-role",
        }
    }
}

/// Target of the staff-edit flow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffEditDraft {
    pub target_user_id: i64,
    pub field: Option<StaffField>,
}

/// Data collected by the review flow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDraft {
    pub order_id: i64,
    pub rating: Option<u8>,
}

/// Operator chat state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDraft {
    /// Waiting for a phone number to pass on as a call-back request
    pub awaiting_phone: bool,
}

/// Data collected by the active flow, one shape per module
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Draft {
    #[default]
    None,
    CreateOrder(OrderDraft),
    AddStaff(StaffDraft),
    EditStaff(StaffEditDraft),
    Review(ReviewDraft),
    Chat(ChatDraft),
}

impl Draft {
    pub fn module(&self) -> Module {
        match self {
            Draft::None => Module::None,
            Draft::CreateOrder(_) => Module::CreateOrder,
            Draft::AddStaff(_) => Module::AddStaff,
            Draft::EditStaff(_) => Module::EditStaff,
            Draft::Review(_) => Module::Review,
            Draft::Chat(_) => Module::Chat,
        }
    }
}

/// State saved before each advance, restored by "back"
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: u8,
    pub draft: Draft,
}

/// Per-chat conversation state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    step: u8,
    total_steps: u8,
    draft: Draft,
    history: Vec<Snapshot>,
}

impl Session {
    /// Start a flow at step 1; `total_steps` is fixed for the lifetime of the flow
    pub fn start(draft: Draft, total_steps: u8) -> Self {
        if matches!(draft, Draft::None) {
            return Self::default();
        }
        Self {
            step: 1,
            total_steps: total_steps.max(1),
            draft,
            history: Vec::new(),
        }
    }

    pub fn module(&self) -> Module {
        self.draft.module()
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn total_steps(&self) -> u8 {
        self.total_steps
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Mutate the collected data without moving to another step
    pub fn draft_mut(&mut self) -> &mut Draft {
        &mut self.draft
    }

    pub fn is_idle(&self) -> bool {
        self.module() == Module::None
    }

    pub fn is_at(&self, module: Module, step: u8) -> bool {
        self.module() == module && self.step == step
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn order(&self) -> Option<&OrderDraft> {
        match &self.draft {
            Draft::CreateOrder(order) => Some(order),
            _ => None,
        }
    }

    /// Order prompt the session is currently on
    pub fn order_step(&self) -> Option<OrderStep> {
        self.order().and_then(|order| order.plan.step_at(self.step))
    }

    /// Record the current state in the history, apply `update` and move to `next_step`.
    ///
    /// The step is clamped to `1..=total_steps`, so a flow can never leave its range.
    pub fn advance(&mut self, next_step: u8, update: impl FnOnce(&mut Draft)) {
        if self.is_idle() {
            return;
        }
        self.history.push(Snapshot {
            step: self.step,
            draft: self.draft.clone(),
        });
        update(&mut self.draft);
        self.step = next_step.clamp(1, self.total_steps);
    }

    /// Restore the state saved before the last advance
    pub fn back(&mut self) -> bool {
        match self.history.pop() {
            Some(snapshot) => {
                self.step = snapshot.step;
                self.draft = snapshot.draft;
                true
            }
            None => false,
        }
    }
}

/// Validates a free-text field
pub fn validate_text(input: &str, max_len: usize) -> Result<String, InputError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(InputError::Empty);
    }

    if trimmed.chars().count() > max_len {
        return Err(InputError::TooLong);
    }

    Ok(trimmed.to_string())
}

/// Normalizes a phone number to `+7(XXX)-XXX-XX-XX`
pub fn normalize_phone(input: &str) -> Result<String, InputError> {
    let digits = NON_DIGITS.replace_all(input, "");

    let digits = match digits.len() {
        10 => format!("7{digits}"),
        11 if digits.starts_with('8') => format!("7{}", &digits[1..]),
        11 if digits.starts_with('7') => digits.into_owned(),
        _ => return Err(InputError::InvalidPhone),
    };

    Ok(format!(
        "+7({})-{}-{}-{}",
        &digits[1..4],
        &digits[4..7],
        &digits[7..9],
        &digits[9..11]
    ))
}

/// Parses a requested date, rejecting dates before `today`
pub fn parse_order_date(input: &str, today: NaiveDate) -> Result<NaiveDate, InputError> {
    let trimmed = input.trim();
    let date = NaiveDate::parse_from_str(trimmed, "%d.%m.%Y")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .map_err(|_| InputError::InvalidDate)?;

    if date < today {
        return Err(InputError::PastDate);
    }

    Ok(date)
}

/// Parses an `HH:MM` time slot
pub fn parse_time_slot(input: &str) -> Result<NaiveTime, InputError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M").map_err(|_| InputError::InvalidTime)
}

/// Validates a unique staff nickname (the staff member's Telegram username)
pub fn validate_nickname(input: &str) -> Result<String, InputError> {
    let trimmed = input.trim().trim_start_matches('@');

    if trimmed.is_empty() {
        return Err(InputError::Empty);
    }

    if !NICKNAME.is_match(trimmed) {
        return Err(InputError::InvalidNickname);
    }

    Ok(trimmed.to_string())
}
