//! Staff administration: the add and edit dialogues plus list, block and delete actions

use teloxide::types::{InlineKeyboardMarkup, ReplyMarkup};
use tracing::{debug, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import dialogue types
use crate::dialogue::{
    normalize_phone, validate_nickname, validate_text, Draft, Module, Session, StaffDraft,
    StaffEditDraft, StaffField, MAX_TEXT_LEN,
};
use crate::errors::InputError;
use crate::services::{NewStaff, Outbound, Role, StaffUpdate, UserRecord};

use super::callback_handler::CallbackToken;
use super::router::{BotContext, Caller, HandlerResult, Input};

// Import UI builder functions
use super::ui_builder::{
    assignable_roles, create_main_menu_keyboard, create_role_keyboard, create_staff_actions_keyboard,
    create_staff_field_keyboard, create_staff_list_keyboard, create_staff_menu_keyboard,
    create_staff_roles_keyboard, format_staff_card,
};

pub const ADD_STAFF_STEPS: u8 = 5;
pub const EDIT_STAFF_STEPS: u8 = 2;

/// Owners are never managed here; main operators are managed only by owners
pub fn can_manage(actor: Role, target: &UserRecord) -> bool {
    match target.role {
        Role::Owner => false,
        Role::MainOperator => actor == Role::Owner,
        _ => true,
    }
}

pub async fn show_staff_menu(ctx: &BotContext, caller: &Caller<'_>) {
    ctx.reply(
        caller.chat_id(),
        Outbound::with_markup(
            t_lang("staff-menu", caller.lang()),
            create_staff_menu_keyboard(caller.lang()),
        ),
    )
    .await;
}

/// `staff_*`, `edit_field_*` and `role_*` buttons
pub async fn handle_staff_callback(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    match token.prefix() {
        "role" => {
            token.expect_args(1)?;
            let role = Role::from_token(token.arg(0)?).ok_or_else(|| token.malformed())?;
            apply_role(ctx, caller, role).await
        }
        "edit" => {
            token.expect_args(3)?;
            if token.arg(0)? != "field" {
                return Err(token.malformed().into());
            }
            let field = StaffField::from_token(token.arg(1)?).ok_or_else(|| token.malformed())?;
            let target = token.id_arg(2)?;
            choose_edit_field(ctx, caller, field, target).await
        }
        _ => handle_staff_action(ctx, caller, token).await,
    }
}

async fn handle_staff_action(
    ctx: &BotContext,
    caller: &Caller<'_>,
    token: &CallbackToken,
) -> HandlerResult {
    let lang = caller.lang();

    match token.arg(0)? {
        "menu" => show_staff_menu(ctx, caller).await,
        "add" => {
            let session = Session::start(Draft::AddStaff(StaffDraft::default()), ADD_STAFF_STEPS);
            ctx.sessions.set(caller.chat_id(), session.clone());
            info!(chat_id = caller.chat_id(), "Staff add flow started");
            prompt_staff_step(ctx, caller, &session).await;
        }
        "list" if token.args().len() == 1 => {
            ctx.reply(
                caller.chat_id(),
                Outbound::with_markup(t_lang("staff-choose-role", lang), create_staff_roles_keyboard(lang)),
            )
            .await;
        }
        "list" => {
            token.expect_args(2)?;
            let role = Role::from_token(token.arg(1)?).ok_or_else(|| token.malformed())?;
            let users = ctx.services.directory.list_by_role(role).await?;
            let key = if users.is_empty() {
                "staff-list-empty"
            } else {
                "staff-list-title"
            };
            ctx.reply(
                caller.chat_id(),
                Outbound::with_markup(
                    t_args_lang(key, &[("role", &t_lang(role.label_key(), lang))], lang),
                    create_staff_list_keyboard(role, &users, lang),
                ),
            )
            .await;
        }
        "select" => {
            token.expect_args(3)?;
            let role = Role::from_token(token.arg(1)?).ok_or_else(|| token.malformed())?;
            let Some(user) = find_manageable(ctx, caller, token.id_arg(2)?).await? else {
                return Ok(());
            };
            ctx.reply(
                caller.chat_id(),
                Outbound::with_markup(
                    format_staff_card(&user, lang),
                    create_staff_actions_keyboard(role, &user, lang),
                ),
            )
            .await;
        }
        "action" => {
            token.expect_args(3)?;
            let action = token.arg(1)?;
            let Some(user) = find_manageable(ctx, caller, token.id_arg(2)?).await? else {
                return Ok(());
            };
            match action {
                "edit" => start_edit(ctx, caller, &user).await,
                "delete" => {
                    ctx.services.directory.delete_user(user.id).await?;
                    info!(chat_id = caller.chat_id(), staff_id = user.id, "Staff member deleted");
                    ctx.reply_with_menu(
                        caller,
                        t_args_lang("staff-deleted", &[("name", &user.display_name())], lang),
                    )
                    .await;
                }
                "block" => {
                    let blocked = !user.is_blocked;
                    ctx.services.directory.set_blocked(user.id, blocked).await?;
                    info!(chat_id = caller.chat_id(), staff_id = user.id, blocked, "Staff block toggled");
                    let key = if blocked { "staff-blocked" } else { "staff-unblocked" };
                    ctx.reply_text(
                        caller.chat_id(),
                        t_args_lang(key, &[("name", &user.display_name())], lang),
                    )
                    .await;
                }
                _ => return Err(token.malformed().into()),
            }
        }
        _ => return Err(token.malformed().into()),
    }

    Ok(())
}

/// Load a staff record the caller may manage; replies and returns `None` otherwise
async fn find_manageable(
    ctx: &BotContext,
    caller: &Caller<'_>,
    id: i64,
) -> anyhow::Result<Option<UserRecord>> {
    match ctx.services.directory.find_by_id(id).await? {
        Some(user) if can_manage(caller.role, &user) => Ok(Some(user)),
        Some(user) => {
            warn!(chat_id = caller.chat_id(), staff_id = user.id, "Staff record not manageable by caller");
            ctx.deny(caller.sender).await;
            Ok(None)
        }
        None => {
            ctx.reply_text(caller.chat_id(), t_lang("staff-not-found", caller.lang()))
                .await;
            Ok(None)
        }
    }
}

async fn start_edit(ctx: &BotContext, caller: &Caller<'_>, user: &UserRecord) {
    let session = Session::start(
        Draft::EditStaff(StaffEditDraft {
            target_user_id: user.id,
            field: None,
        }),
        EDIT_STAFF_STEPS,
    );
    ctx.sessions.set(caller.chat_id(), session.clone());
    info!(chat_id = caller.chat_id(), staff_id = user.id, "Staff edit flow started");
    prompt_staff_step(ctx, caller, &session).await;
}

/// `edit_field_<field>_<id>`; only valid on the first edit step for the same target
async fn choose_edit_field(
    ctx: &BotContext,
    caller: &Caller<'_>,
    field: StaffField,
    target: i64,
) -> HandlerResult {
    let mut session = ctx.sessions.get(caller.chat_id());

    let on_step = match session.draft() {
        Draft::EditStaff(edit) => session.step() == 1 && edit.target_user_id == target,
        _ => false,
    };
    if !on_step {
        debug!(chat_id = caller.chat_id(), target, "Stale edit-field callback ignored");
        return Ok(());
    }

    session.advance(2, |draft| {
        if let Draft::EditStaff(edit) = draft {
            edit.field = Some(field);
        }
    });
    ctx.sessions.set(caller.chat_id(), session.clone());
    prompt_staff_step(ctx, caller, &session).await;
    Ok(())
}

/// `role_<token>`; only valid on the role step of either staff flow
async fn apply_role(ctx: &BotContext, caller: &Caller<'_>, role: Role) -> HandlerResult {
    let session = ctx.sessions.get(caller.chat_id());

    let on_role_step = match session.draft() {
        Draft::AddStaff(_) => session.step() == ADD_STAFF_STEPS,
        Draft::EditStaff(edit) => session.step() == 2 && edit.field == Some(StaffField::Role),
        _ => false,
    };
    if !on_role_step {
        debug!(chat_id = caller.chat_id(), role = role.as_str(), "Stale role callback ignored");
        return Ok(());
    }

    if !assignable_roles(caller.role).contains(&role) {
        reject_input(ctx, caller, &session, InputError::UnknownRole).await;
        return Ok(());
    }

    finish_with_role(ctx, caller, &session, role).await
}

async fn finish_with_role(
    ctx: &BotContext,
    caller: &Caller<'_>,
    session: &Session,
    role: Role,
) -> HandlerResult {
    match session.draft() {
        Draft::AddStaff(staff) => create_staff(ctx, caller, staff, role).await,
        Draft::EditStaff(edit) => {
            update_staff(ctx, caller, edit.target_user_id, StaffUpdate::Role(role)).await
        }
        _ => Ok(()),
    }
}

async fn create_staff(
    ctx: &BotContext,
    caller: &Caller<'_>,
    staff: &StaffDraft,
    role: Role,
) -> HandlerResult {
    let (Some(first_name), Some(last_name), Some(nickname), Some(phone)) = (
        staff.first_name.clone(),
        staff.last_name.clone(),
        staff.nickname.clone(),
        staff.phone.clone(),
    ) else {
        warn!(chat_id = caller.chat_id(), "Staff draft incomplete at role step");
        return Err(InputError::Unexpected.into());
    };

    let new_staff = NewStaff {
        first_name,
        last_name,
        nickname,
        phone,
        role,
    };
    let created = ctx.services.directory.create_staff(&new_staff).await?;

    ctx.sessions.clear(caller.chat_id());
    info!(
        chat_id = caller.chat_id(),
        staff_id = created.id,
        role = role.as_str(),
        "Staff member created"
    );
    ctx.reply_with_menu(
        caller,
        t_args_lang(
            "staff-created",
            &[
                ("name", &created.display_name()),
                ("nickname", &new_staff.nickname),
            ],
            caller.lang(),
        ),
    )
    .await;
    Ok(())
}

async fn update_staff(
    ctx: &BotContext,
    caller: &Caller<'_>,
    target: i64,
    update: StaffUpdate,
) -> HandlerResult {
    ctx.services.directory.update_staff(target, &update).await?;

    ctx.sessions.clear(caller.chat_id());
    info!(chat_id = caller.chat_id(), staff_id = target, update = ?update, "Staff member updated");
    ctx.reply_with_menu(caller, t_lang("staff-updated", caller.lang()))
        .await;
    Ok(())
}

/// Message input while a staff flow is active
pub async fn handle_staff_input(
    ctx: &BotContext,
    caller: &Caller<'_>,
    mut session: Session,
    input: &Input,
) -> HandlerResult {
    let chat_id = caller.chat_id();
    let lang = caller.lang();

    let text = match input {
        Input::Text(text) => text.clone(),
        Input::Contact { phone } if is_phone_step(&session) => phone.clone(),
        _ => {
            reject_input(ctx, caller, &session, InputError::Unexpected).await;
            return Ok(());
        }
    };

    match session.draft().clone() {
        Draft::AddStaff(_) => {
            let step = session.step();
            let value = match step {
                1 | 2 => validate_text(&text, MAX_TEXT_LEN),
                3 => match validate_nickname(&text) {
                    Ok(nickname) => {
                        if ctx.services.directory.nickname_taken(&nickname).await? {
                            Err(InputError::NicknameTaken)
                        } else {
                            Ok(nickname)
                        }
                    }
                    Err(e) => Err(e),
                },
                4 => normalize_phone(&text),
                _ => {
                    match resolve_role_text(&text, lang) {
                        Some(role) if assignable_roles(caller.role).contains(&role) => {
                            return finish_with_role(ctx, caller, &session, role).await;
                        }
                        _ => Err(InputError::UnknownRole),
                    }
                }
            };

            match value {
                Ok(value) => {
                    session.advance(step + 1, |draft| {
                        if let Draft::AddStaff(staff) = draft {
                            match step {
                                1 => staff.first_name = Some(value),
                                2 => staff.last_name = Some(value),
                                3 => staff.nickname = Some(value),
                                _ => staff.phone = Some(value),
                            }
                        }
                    });
                    ctx.sessions.set(chat_id, session.clone());
                    prompt_staff_step(ctx, caller, &session).await;
                }
                Err(e) => reject_input(ctx, caller, &session, e).await,
            }
        }
        Draft::EditStaff(edit) => {
            let update = match edit.field {
                None => Err(InputError::Unexpected),
                Some(StaffField::FirstName) => validate_text(&text, MAX_TEXT_LEN).map(StaffUpdate::FirstName),
                Some(StaffField::LastName) => validate_text(&text, MAX_TEXT_LEN).map(StaffUpdate::LastName),
                Some(StaffField::Phone) => normalize_phone(&text).map(StaffUpdate::Phone),
                Some(StaffField::Role) => resolve_role_text(&text, lang)
                    .filter(|role| assignable_roles(caller.role).contains(role))
                    .map(StaffUpdate::Role)
                    .ok_or(InputError::UnknownRole),
            };

            match update {
                Ok(update) => return update_staff(ctx, caller, edit.target_user_id, update).await,
                Err(e) => reject_input(ctx, caller, &session, e).await,
            }
        }
        _ => {}
    }

    Ok(())
}

fn is_phone_step(session: &Session) -> bool {
    match session.draft() {
        Draft::AddStaff(_) => session.step() == 4,
        Draft::EditStaff(edit) => edit.field == Some(StaffField::Phone),
        _ => false,
    }
}

fn resolve_role_text(text: &str, language_code: Option<&str>) -> Option<Role> {
    let text = text.trim();
    Role::STAFF
        .into_iter()
        .find(|role| role.token() == text || t_lang(role.label_key(), language_code) == text)
}

async fn reject_input(ctx: &BotContext, caller: &Caller<'_>, session: &Session, e: InputError) {
    ctx.reply_text(caller.chat_id(), t_lang(e.message_key(), caller.lang()))
        .await;
    prompt_staff_step(ctx, caller, session).await;
}

/// Send the prompt of the current staff step
pub async fn prompt_staff_step(ctx: &BotContext, caller: &Caller<'_>, session: &Session) {
    let lang = caller.lang();
    let step = session.step();

    let (text, markup): (String, InlineKeyboardMarkup) = match session.draft() {
        Draft::AddStaff(_) => {
            let key = match step {
                1 => "staff-step-first-name",
                2 => "staff-step-last-name",
                3 => "staff-step-nickname",
                4 => "staff-step-phone",
                _ => "staff-step-role",
            };
            let markup = if step == ADD_STAFF_STEPS {
                create_role_keyboard(caller.role, lang)
            } else {
                create_main_menu_keyboard(lang)
            };
            let header = t_args_lang(
                "staff-step-progress",
                &[
                    ("step", &step.to_string()),
                    ("total", &session.total_steps().to_string()),
                ],
                lang,
            );
            (format!("{header}\n{}", t_lang(key, lang)), markup)
        }
        Draft::EditStaff(edit) => match edit.field {
            None => (
                t_lang("staff-edit-choose-field", lang),
                create_staff_field_keyboard(edit.target_user_id, lang),
            ),
            Some(StaffField::Role) => (
                t_lang("staff-step-role", lang),
                create_role_keyboard(caller.role, lang),
            ),
            Some(field) => (
                t_args_lang(
                    "staff-edit-enter-value",
                    &[("field", &t_lang(field.label_key(), lang))],
                    lang,
                ),
                create_main_menu_keyboard(lang),
            ),
        },
        _ => return,
    };

    ctx.reply(
        caller.chat_id(),
        Outbound {
            text,
            markup: Some(ReplyMarkup::InlineKeyboard(markup)),
        },
    )
    .await;
}

/// Whether `module` is handled by this file
pub fn is_staff_module(module: Module) -> bool {
    matches!(module, Module::AddStaff | Module::EditStaff)
}
