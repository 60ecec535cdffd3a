//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `router`: Single entry point for inbound events, per-chat ordering and access gating
//! - `message_handler`: Handles commands, menu texts and dialogue input
//! - `callback_handler`: Parses callback tokens and dispatches through the prefix table
//! - `dialogue_manager`: Order creation flow
//! - `staff_dialogue`, `review_dialogue`, `contact`: The other flows
//! - `referrals`, `stats`, `manage_orders`: Menu sections without a multi-step flow
//! - `ui_builder`: Creates keyboards and formats messages
//! - `telegram`: teloxide adapter

pub mod callback_handler;
pub mod contact;
pub mod dialogue_manager;
pub mod manage_orders;
pub mod message_handler;
pub mod referrals;
pub mod review_dialogue;
pub mod router;
pub mod staff_dialogue;
pub mod stats;
pub mod telegram;
pub mod ui_builder;

// Re-export the entry points used by main.rs and the tests
pub use callback_handler::{CallbackRegistry, CallbackToken};
pub use router::{BotContext, Caller, Collaborators, Event, Input, Sender, UpdateRouter};
pub use telegram::{callback_endpoint, message_endpoint, TelegramNotifier};
pub use ui_builder::main_menu;
