//! Telegram adapter: turns teloxide updates into router events and delivers replies

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, User};
use tracing::debug;

use crate::errors::NotifyError;
use crate::services::{Notifier, Outbound};

use super::router::{Event, Input, Sender, UpdateRouter};

/// `Notifier` backed by the Bot API
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, message: Outbound) -> Result<(), NotifyError> {
        let mut request = self.bot.send_message(ChatId(chat_id), message.text);
        if let Some(markup) = message.markup {
            request = request.reply_markup(markup);
        }
        request.await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), NotifyError> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .await?;
        Ok(())
    }
}

fn sender_from_user(chat_id: i64, user: &User) -> Sender {
    Sender {
        chat_id,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
    }
}

/// Event for a message; `None` when it has no human sender
pub fn event_from_message(msg: &Message) -> Option<Event> {
    let user = msg.from.as_ref()?;
    let sender = sender_from_user(msg.chat.id.0, user);

    let input = if let Some(text) = msg.text() {
        Input::Text(text.to_string())
    } else if let Some(largest) = msg.photo().and_then(|sizes| sizes.last()) {
        Input::Photo(largest.file.id.to_string())
    } else if let Some(video) = msg.video() {
        Input::Video(video.file.id.to_string())
    } else if let Some(contact) = msg.contact() {
        Input::Contact {
            phone: contact.phone_number.clone(),
        }
    } else {
        Input::Unsupported
    };

    Some(Event::Message { sender, input })
}

pub fn event_from_callback(q: &CallbackQuery) -> Event {
    let chat_id = q
        .message
        .as_ref()
        .map(|message| message.chat().id)
        .unwrap_or_else(|| ChatId::from(q.from.id));

    Event::Callback {
        sender: sender_from_user(chat_id.0, &q.from),
        callback_id: q.id.0.clone(),
        data: q.data.clone(),
    }
}

pub async fn message_endpoint(msg: Message, router: Arc<UpdateRouter>) -> Result<()> {
    match event_from_message(&msg) {
        Some(event) => router.handle(event).await,
        None => debug!(chat_id = %msg.chat.id, "Ignoring message without sender"),
    }
    Ok(())
}

pub async fn callback_endpoint(q: CallbackQuery, router: Arc<UpdateRouter>) -> Result<()> {
    router.handle(event_from_callback(&q)).await;
    Ok(())
}
