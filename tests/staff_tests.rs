//! # Staff Tests
//!
//! Staff administration flows and the first `/start` of a pre-created staff member.

mod common;

use common::{callback_data, en, Harness};
use order_intake::dialogue::Module;
use order_intake::services::Role;

const ADMIN: i64 = 5001;

async fn add_driver(h: &Harness, nickname: &str) {
    h.callback(ADMIN, "staff_add").await;
    h.text(ADMIN, "Petr").await;
    h.text(ADMIN, "Sidorov").await;
    h.text(ADMIN, nickname).await;
    h.text(ADMIN, "8 978 765 43 21").await;
    h.callback(ADMIN, "role_driver").await;
}

#[tokio::test]
async fn test_add_staff_flow_creates_record() {
    let h = Harness::new();
    h.user(ADMIN, Role::MainOperator);

    h.callback(ADMIN, "staff_add").await;
    let session = h.session(ADMIN);
    assert!(session.is_at(Module::AddStaff, 1));
    assert_eq!(session.total_steps(), 5);

    add_driver(&h, "@petr_driver").await;

    assert!(h.session(ADMIN).is_idle());
    assert_eq!(h.directory.count(), 2);
    let staff = h.directory.get(2).unwrap();
    assert_eq!(staff.role, Role::Driver);
    assert_eq!(staff.chat_id, None);
    assert_eq!(staff.nickname.as_deref(), Some("petr_driver"));
    assert_eq!(staff.phone.as_deref(), Some("+7(978)-765-43-21"));
    assert!(h.notifier.received(ADMIN, "@petr_driver"));
}

#[tokio::test]
async fn test_operator_cannot_manage_staff() {
    let h = Harness::new();
    let operator = 2001;
    h.user(operator, Role::Operator);

    h.callback(operator, "staff_add").await;
    h.text(operator, &en("menu-staff")).await;

    assert!(h.session(operator).is_idle());
    assert_eq!(
        h.notifier
            .texts_to(operator)
            .iter()
            .filter(|text| **text == en("access-denied"))
            .count(),
        2
    );
}

#[tokio::test]
async fn test_invalid_and_taken_nicknames_are_rejected() {
    let h = Harness::new();
    h.user(ADMIN, Role::MainOperator);
    h.directory.insert(None, Role::Loader, Some("busy_name"));

    h.callback(ADMIN, "staff_add").await;
    h.text(ADMIN, "Petr").await;
    h.text(ADMIN, "Sidorov").await;
    let at_nickname = h.session(ADMIN);
    assert_eq!(at_nickname.step(), 3);

    h.text(ADMIN, "no spaces allowed").await;
    assert_eq!(h.session(ADMIN), at_nickname);
    assert!(h.notifier.received(ADMIN, &en("error-invalid-nickname")));

    h.text(ADMIN, "BUSY_NAME").await;
    assert_eq!(h.session(ADMIN), at_nickname);
    assert!(h.notifier.received(ADMIN, &en("error-nickname-taken")));
}

#[tokio::test]
async fn test_main_operator_cannot_assign_main_operator() {
    let h = Harness::new();
    h.user(ADMIN, Role::MainOperator);

    h.callback(ADMIN, "staff_add").await;
    h.text(ADMIN, "Petr").await;
    h.text(ADMIN, "Sidorov").await;
    h.text(ADMIN, "petr").await;
    h.text(ADMIN, "+7 978 765 43 21").await;

    let role_prompt = h.notifier.last_to(ADMIN).unwrap();
    assert!(!callback_data(&role_prompt).contains(&"role_mainoperator".to_string()));

    h.callback(ADMIN, "role_mainoperator").await;
    assert!(h.session(ADMIN).is_at(Module::AddStaff, 5));
    assert!(h.notifier.received(ADMIN, &en("error-unknown-role")));
    assert_eq!(h.directory.count(), 1);
}

#[tokio::test]
async fn test_back_returns_to_previous_staff_step() {
    let h = Harness::new();
    h.user(ADMIN, Role::Owner);

    h.callback(ADMIN, "staff_add").await;
    h.text(ADMIN, "Petr").await;
    assert_eq!(h.session(ADMIN).step(), 2);

    h.text(ADMIN, &en("button-back")).await;
    assert!(h.session(ADMIN).is_at(Module::AddStaff, 1));
}

#[tokio::test]
async fn test_edit_staff_phone() {
    let h = Harness::new();
    h.user(ADMIN, Role::MainOperator);
    let loader = h.directory.insert(None, Role::Loader, Some("loader_one"));

    h.callback(ADMIN, &format!("staff_action_edit_{loader}")).await;
    assert!(h.session(ADMIN).is_at(Module::EditStaff, 1));

    // A field button for another record is stale
    h.callback(ADMIN, "edit_field_phone_999").await;
    assert!(h.session(ADMIN).is_at(Module::EditStaff, 1));

    h.callback(ADMIN, &format!("edit_field_phone_{loader}")).await;
    assert!(h.session(ADMIN).is_at(Module::EditStaff, 2));

    h.text(ADMIN, "12345").await;
    assert!(h.notifier.received(ADMIN, &en("error-invalid-phone")));

    h.text(ADMIN, "+7 999 000 11 22").await;
    assert!(h.session(ADMIN).is_idle());
    assert_eq!(
        h.directory.get(loader).unwrap().phone.as_deref(),
        Some("+7(999)-000-11-22")
    );
}

#[tokio::test]
async fn test_block_toggle_and_owner_protection() {
    let h = Harness::new();
    h.user(ADMIN, Role::MainOperator);
    let driver = h.directory.insert(Some(3001), Role::Driver, Some("driver"));
    let owner = h.user(4001, Role::Owner);

    h.callback(ADMIN, &format!("staff_action_block_{driver}")).await;
    assert!(h.directory.get(driver).unwrap().is_blocked);
    h.callback(ADMIN, &format!("staff_action_block_{driver}")).await;
    assert!(!h.directory.get(driver).unwrap().is_blocked);

    h.callback(ADMIN, &format!("staff_action_delete_{owner}")).await;
    assert!(h.directory.get(owner).is_some());
    assert!(h.notifier.received(ADMIN, &en("access-denied")));

    h.callback(ADMIN, &format!("staff_action_delete_{driver}")).await;
    assert!(h.directory.get(driver).is_none());
}

#[tokio::test]
async fn test_staff_list_by_role() {
    let h = Harness::new();
    h.user(ADMIN, Role::Owner);
    let loader = h.directory.insert(None, Role::Loader, Some("loader_one"));

    h.callback(ADMIN, "staff_list_loader").await;
    let list = h.notifier.last_to(ADMIN).unwrap();
    assert!(callback_data(&list).contains(&format!("staff_select_loader_{loader}")));

    h.callback(ADMIN, "staff_list_driver").await;
    assert!(h.notifier.received(ADMIN, "There are no employees with role Driver"));
}

#[tokio::test]
async fn test_created_staff_is_linked_on_first_start() {
    let h = Harness::new();
    h.user(ADMIN, Role::MainOperator);
    add_driver(&h, "petr_driver").await;

    let driver_chat = 3002;
    h.start_as(driver_chat, Some("Petr_Driver"), None).await;

    let linked = h.directory.by_chat(driver_chat).unwrap();
    assert_eq!(linked.role, Role::Driver);
    assert_eq!(linked.nickname.as_deref(), Some("petr_driver"));
    assert_eq!(h.directory.count(), 2);

    // Drivers reach no module
    h.callback(driver_chat, "category_waste").await;
    assert!(h.session(driver_chat).is_idle());
}
