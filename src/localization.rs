use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{error, warn};
use unic_langid::LanguageIdentifier;

/// Languages shipped with the bot, with their embedded Fluent resources
const LOCALES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en/main.ftl")),
    ("hi", include_str!("../locales/hi/main.ftl")),
];

const FALLBACK_LANGUAGE: &str = "en";

/// Localization manager for the Admit Card Bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
    default_language: String,
}

impl LocalizationManager {
    /// Create a localization manager with English as the default language
    pub fn new() -> Result<Self> {
        Self::with_default_language(FALLBACK_LANGUAGE)
    }

    /// Create a localization manager preferring `default_language` for users
    /// whose Telegram language is not supported
    pub fn with_default_language(default_language: &str) -> Result<Self> {
        let mut bundles = HashMap::new();
        for (code, source) in LOCALES {
            let locale: LanguageIdentifier = code.parse()?;
            bundles.insert(code.to_string(), Self::create_bundle(locale, source)?);
        }

        let default_language = if bundles.contains_key(default_language) {
            default_language.to_string()
        } else {
            warn!(language = default_language, "Unsupported default language, using English");
            FALLBACK_LANGUAGE.to_string()
        };

        Ok(Self {
            bundles,
            default_language,
        })
    }

    /// A manager with no bundles; every lookup renders `Missing translation: <key>`
    pub fn without_bundles() -> Self {
        Self {
            bundles: HashMap::new(),
            default_language: FALLBACK_LANGUAGE.to_string(),
        }
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(locale: LanguageIdentifier, source: &str) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Plain text for Telegram, no bidi isolation marks around arguments
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid Fluent resource for {locale}: {errors:?}"))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Duplicate Fluent messages for {locale}: {errors:?}"))?;
        Ok(bundle)
    }

    /// Whether a language code maps to a shipped bundle
    pub fn is_language_supported(&self, language_code: &str) -> bool {
        self.bundles.contains_key(&Self::primary_subtag(language_code))
    }

    /// "en-US" -> "en"
    fn primary_subtag(language_code: &str) -> String {
        language_code
            .split(['-', '_'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase()
    }

    fn bundle_for(&self, language_code: Option<&str>) -> Option<&FluentBundle<FluentResource>> {
        language_code
            .map(Self::primary_subtag)
            .and_then(|code| self.bundles.get(&code))
            .or_else(|| self.bundles.get(&self.default_language))
            .or_else(|| self.bundles.get(FALLBACK_LANGUAGE))
    }

    /// Get a localized message in a specific language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language_code: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        self.format(key, Some(language_code), args)
    }

    /// Get a localized message in the default language
    pub fn get_message(&self, key: &str, args: Option<&HashMap<&str, &str>>) -> String {
        self.format(key, None, args)
    }

    fn format(&self, key: &str, language_code: Option<&str>, args: Option<&HashMap<&str, &str>>) -> String {
        // Untranslated keys fall back to English
        let found = self
            .bundle_for(language_code)
            .into_iter()
            .chain(self.bundles.get(FALLBACK_LANGUAGE))
            .find_map(|bundle| bundle.get_message(key).map(|msg| (bundle, msg)));
        let Some((bundle, message)) = found else {
            return format!("Missing translation: {key}");
        };

        let pattern = match message.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {key}"),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (k, v) in args {
                fluent_args.set(*k, FluentValue::from(*v));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        if !errors.is_empty() {
            warn!(key, ?errors, "Errors while formatting localized message");
        }
        value.into_owned()
    }
}

static LOCALIZATION_MANAGER: OnceLock<LocalizationManager> = OnceLock::new();

/// Initialize the global localization manager with a preferred default language
pub fn init_localization_with_default(default_language: &str) -> Result<()> {
    let manager = LocalizationManager::with_default_language(default_language)?;
    // A second initialization keeps the first manager
    let _ = LOCALIZATION_MANAGER.set(manager);
    Ok(())
}

/// Initialize the global localization manager
pub fn init_localization() -> Result<()> {
    init_localization_with_default(FALLBACK_LANGUAGE)
}

/// Get the global localization manager, initializing it with defaults if needed
pub fn get_localization_manager() -> &'static LocalizationManager {
    LOCALIZATION_MANAGER.get_or_init(|| {
        LocalizationManager::new().unwrap_or_else(|e| {
            error!(error = %e, "Embedded locale resources failed to load, replies will show message keys");
            LocalizationManager::without_bundles()
        })
    })
}

/// Convenience function to get a localized message in the user's language
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    get_localization_manager().format(key, language_code, None)
}

/// Convenience function to get a localized message with arguments in the user's language
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
    get_localization_manager().format(key, language_code, Some(&args_map))
}

/// Convenience function to get a localized message in the default language
pub fn t(key: &str) -> String {
    t_lang(key, None)
}
