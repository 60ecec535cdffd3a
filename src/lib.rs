//! # Order Intake Telegram Bot
//!
//! A Telegram bot that walks clients through a multi-step service order form,
//! routes staff and review flows, and gates every menu by the user's role.

pub mod access;
pub mod bot;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod localization;
pub mod services;
pub mod session_store;
