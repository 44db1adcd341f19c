use anyhow::Result;
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{error, warn};
use unic_langid::LanguageIdentifier;

use crate::clinic_model::Language;

const RU_RESOURCE: &str = include_str!("../locales/ru/main.ftl");
const UZ_RESOURCE: &str = include_str!("../locales/uz/main.ftl");

/// Localization manager for the clinic directory bot
#[derive(Default)]
pub struct LocalizationManager {
    bundles: HashMap<Language, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a localization manager with every supported language loaded
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();

        for language in Language::all() {
            let bundle = Self::create_bundle(language)?;
            bundles.insert(language, bundle);
        }

        Ok(Self { bundles })
    }

    /// Create a fluent bundle for a specific language
    fn create_bundle(language: Language) -> Result<FluentBundle<FluentResource>> {
        let locale: LanguageIdentifier = language.code().parse()?;
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // Telegram renders bidi isolation marks literally
        bundle.set_use_isolating(false);

        let source = match language {
            Language::Ru => RU_RESOURCE,
            Language::Uz => UZ_RESOURCE,
        };

        let resource = match FluentResource::try_new(source.to_string()) {
            Ok(resource) => resource,
            Err((resource, errors)) => {
                warn!(language = %language, errors = errors.len(), "Locale resource has syntax errors");
                resource
            }
        };

        if let Err(errors) = bundle.add_resource(resource) {
            warn!(language = %language, errors = errors.len(), "Locale resource has duplicate keys");
        }

        Ok(bundle)
    }

    /// Get a localized message in the given language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: Language,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let Some(bundle) = self.bundles.get(&language) else {
            return format!("Missing translation: {}", key);
        };

        let msg = match bundle.get_message(key) {
            Some(msg) => msg,
            None => return format!("Missing translation: {}", key),
        };

        let pattern = match msg.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {}", key),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(*value));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        if !errors.is_empty() {
            warn!(key, language = %language, "Unresolved placeables in message");
        }

        value.into_owned()
    }
}

/// Global localization instance
static LOCALIZATION_MANAGER: OnceLock<LocalizationManager> = OnceLock::new();

/// Initialize the global localization manager
pub fn init_localization() -> Result<()> {
    let manager = LocalizationManager::new()?;
    // A second initialization keeps the first manager
    let _ = LOCALIZATION_MANAGER.set(manager);
    Ok(())
}

/// Get the global localization manager, initializing it on first use
pub fn get_localization_manager() -> &'static LocalizationManager {
    LOCALIZATION_MANAGER.get_or_init(|| {
        LocalizationManager::new().unwrap_or_else(|e| {
            error!(error = %e, "Failed to load locales, messages will show their keys");
            LocalizationManager::default()
        })
    })
}

/// Convenience function to get a localized message
pub fn t_lang(key: &str, language: Language) -> String {
    get_localization_manager().get_message_in_language(key, language, None)
}

/// Convenience function to get a localized message with arguments
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language: Language) -> String {
    let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
    get_localization_manager().get_message_in_language(key, language, Some(&args_map))
}
