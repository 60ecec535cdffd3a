use anyhow::{anyhow, bail, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{error, warn};
use unic_langid::LanguageIdentifier;

use crate::config::DEFAULT_LANGUAGE;

/// Bundled translations, embedded at compile time
const LOCALES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en/main.ftl")),
    ("ru", include_str!("../locales/ru/main.ftl")),
];

/// Localization manager for the bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
    default_language: String,
}

impl LocalizationManager {
    /// Create a new localization manager with the built-in default language
    pub fn new() -> Result<Self> {
        Self::with_default_language(DEFAULT_LANGUAGE)
    }

    /// Create a localization manager falling back to `default_language`
    pub fn with_default_language(default_language: &str) -> Result<Self> {
        let mut bundles = HashMap::new();

        for (code, source) in LOCALES {
            let locale: LanguageIdentifier = code.parse()?;
            let bundle = Self::create_bundle(&locale, source)?;
            bundles.insert((*code).to_string(), bundle);
        }

        if !bundles.contains_key(default_language) {
            bail!("Default language {default_language} has no translation bundle");
        }

        Ok(Self {
            bundles,
            default_language: default_language.to_string(),
        })
    }

    fn empty() -> Self {
        Self {
            bundles: HashMap::new(),
            default_language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(
        locale: &LanguageIdentifier,
        source: &str,
    ) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Keep Telegram text free of bidi isolation marks
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Failed to parse {locale} resource: {errors:?}"))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Failed to load {locale} resource: {errors:?}"))?;

        Ok(bundle)
    }

    /// Map a Telegram language code (e.g. `ru-RU`) onto a supported bundle
    pub fn resolve_language(&self, language_code: Option<&str>) -> &str {
        let primary = language_code
            .and_then(|code| code.split(['-', '_']).next())
            .map(str::to_lowercase);

        match primary {
            Some(code) => match self.bundles.get_key_value(code.as_str()) {
                Some((key, _)) => key.as_str(),
                None => self.default_language.as_str(),
            },
            None => self.default_language.as_str(),
        }
    }

    pub fn is_language_supported(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }

    /// Get a localized message in the requested language, falling back to the default one
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let language = self.resolve_language(Some(language));
        let bundle = match self
            .bundles
            .get(language)
            .or_else(|| self.bundles.get(&self.default_language))
        {
            Some(bundle) => bundle,
            None => return format!("Missing translation: {key}"),
        };

        let msg = match bundle.get_message(key) {
            Some(msg) => msg,
            None => return format!("Missing translation: {key}"),
        };

        let pattern = match msg.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {key}"),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(*value));
            }
            fluent_args
        });

        let mut value = String::new();
        let mut errors = vec![];
        if bundle
            .write_pattern(&mut value, pattern, fluent_args.as_ref(), &mut errors)
            .is_err()
            || !errors.is_empty()
        {
            warn!(key, ?errors, "Localized message formatted with errors");
        }

        value
    }
}

static LOCALIZATION_MANAGER: OnceLock<LocalizationManager> = OnceLock::new();

/// Initialize the global localization manager
pub fn init_localization(default_language: &str) -> Result<()> {
    let manager = LocalizationManager::with_default_language(default_language)?;
    // A second initialisation keeps the first manager
    let _ = LOCALIZATION_MANAGER.set(manager);
    Ok(())
}

/// Get the global localization manager, initialising it with defaults on first use
pub fn get_localization_manager() -> &'static LocalizationManager {
    LOCALIZATION_MANAGER.get_or_init(|| {
        LocalizationManager::new().unwrap_or_else(|e| {
            error!(error = %e, "Failed to load translations");
            LocalizationManager::empty()
        })
    })
}

/// Localized message for the user's language
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    let manager = get_localization_manager();
    let language = manager.resolve_language(language_code);
    manager.get_message_in_language(key, language, None)
}

/// Localized message with arguments for the user's language
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    let manager = get_localization_manager();
    let language = manager.resolve_language(language_code);
    let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
    manager.get_message_in_language(key, language, Some(&args_map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_language_variants() {
        let manager = LocalizationManager::new().expect("bundled translations parse");
        assert_eq!(manager.resolve_language(Some("en-US")), "en");
        assert_eq!(manager.resolve_language(Some("RU")), "ru");
        assert_eq!(manager.resolve_language(Some("de")), "ru");
        assert_eq!(manager.resolve_language(None), "ru");
    }

    #[test]
    fn test_unknown_default_language_rejected() {
        assert!(LocalizationManager::with_default_language("xx").is_err());
    }
}
