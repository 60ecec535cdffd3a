//! # Localization Tests
//!
//! Message retrieval, argument formatting and language fallback for the bundled
//! translations.

use order_intake::localization::{t_args_lang, t_lang, LocalizationManager};
use std::collections::{BTreeSet, HashMap};

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        LocalizationManager::new().expect("Failed to create localization manager")
    }

    /// Message ids defined in a bundled `.ftl` file
    fn message_ids(source: &str) -> BTreeSet<String> {
        source
            .lines()
            .filter(|line| !line.starts_with(' ') && !line.starts_with('#'))
            .filter_map(|line| line.split_once(" = ").map(|(id, _)| id.trim().to_string()))
            .collect()
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("help", "en", None);
        assert!(message.contains("/start"));
        assert!(message.contains("/cancel"));
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("nonexistent-key", "en", None);
        assert_eq!(message, "Missing translation: nonexistent-key");
    }

    #[test]
    fn test_unsupported_language_falls_back_to_russian() {
        let manager = setup_localization();

        let fallback = manager.get_message_in_language("access-denied", "de", None);
        let russian = manager.get_message_in_language("access-denied", "ru", None);
        assert_eq!(fallback, russian);
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let mut args = HashMap::new();
        args.insert("step", "3");
        args.insert("total", "9");

        let message = manager.get_message_in_language("order-step-progress", "en", Some(&args));
        assert_eq!(message, "Step 3 of 9");
    }

    #[test]
    fn test_arguments_are_not_isolated() {
        let message = t_args_lang("order-created", &[("id", "17")], Some("en"));
        assert!(message.contains("Order #17 has"));
        assert!(!message.contains('\u{2068}'));
    }

    #[test]
    fn test_multiline_values() {
        let report = t_args_lang(
            "stats-report",
            &[
                ("period", "Today"),
                ("total", "3"),
                ("waste", "1"),
                ("demolition", "1"),
                ("materials", "1"),
                ("completed", "2"),
                ("reviews", "1"),
                ("rating", "5.0"),
            ],
            Some("en"),
        );
        assert_eq!(report.lines().count(), 8);
        assert!(report.ends_with("Average rating: 5.0"));
    }

    #[test]
    fn test_regional_language_codes() {
        assert_eq!(t_lang("payment-cash", Some("en-GB")), t_lang("payment-cash", Some("en")));
        assert_eq!(t_lang("payment-cash", Some("ru-RU")), t_lang("payment-cash", None));
    }

    #[test]
    fn test_bundles_define_the_same_keys() {
        let en = message_ids(include_str!("../locales/en/main.ftl"));
        let ru = message_ids(include_str!("../locales/ru/main.ftl"));

        assert!(en.len() > 100);
        assert_eq!(en, ru);
    }

    #[test]
    fn test_menu_labels_are_distinct() {
        let manager = setup_localization();
        for language in ["en", "ru"] {
            let labels: BTreeSet<String> = [
                "menu-order",
                "menu-contact",
                "menu-referrals",
                "menu-manage-orders",
                "menu-staff",
                "menu-stats",
                "menu-main",
                "button-back",
                "button-cancel",
            ]
            .iter()
            .map(|key| manager.get_message_in_language(key, language, None))
            .collect();
            assert_eq!(labels.len(), 9, "duplicate menu label in {language}");
        }
    }
}
