//! Message catalog backed by JSON bundles.
//!
//! The English bundle is compiled in. `MESSAGES_PATH` may point at a file of
//! the form `{"<locale>": {"<key>": "<text>"}}` whose entries are layered on
//! top. Lookups fall back from the requested locale to the default locale and
//! finally to the key itself.

use std::collections::HashMap;

use escrow_lifecycle::messages::MessageCatalog;
use tracing::{info, warn};

use crate::errors::{Result, ServiceError};

const BUILT_IN_LOCALE: &str = "en";
const BUILT_IN_BUNDLE: &str = include_str!("../messages/en.json");

type Bundle = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct JsonCatalog {
    bundles: HashMap<String, Bundle>,
    default_locale: String,
}

impl JsonCatalog {
    /// Built-in English messages only.
    pub fn built_in(default_locale: &str) -> Result<Self> {
        let english: Bundle = serde_json::from_str(BUILT_IN_BUNDLE)?;
        Ok(Self {
            bundles: HashMap::from([(BUILT_IN_LOCALE.to_string(), english)]),
            default_locale: default_locale.to_string(),
        })
    }

    /// Built-in messages plus the bundles in the file at `path`, if any.
    pub fn load(path: Option<&str>, default_locale: &str) -> Result<Self> {
        let mut catalog = Self::built_in(default_locale)?;
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                ServiceError::Config(format!("Cannot read MESSAGES_PATH {path}: {e}"))
            })?;
            catalog.merge(&raw)?;
            info!("Loaded message bundles from {path}");
        }
        Ok(catalog)
    }

    fn merge(&mut self, raw: &str) -> Result<()> {
        let overlay: HashMap<String, Bundle> = serde_json::from_str(raw)?;
        for (locale, entries) in overlay {
            self.bundles.entry(locale).or_default().extend(entries);
        }
        Ok(())
    }

    fn lookup(&self, locale: &str, code: &str) -> Option<&str> {
        self.bundles
            .get(locale)
            .and_then(|bundle| bundle.get(code))
            .map(String::as_str)
    }
}

impl MessageCatalog for JsonCatalog {
    fn resolve(&self, code: &str, locale: &str) -> String {
        match self
            .lookup(locale, code)
            .or_else(|| self.lookup(&self.default_locale, code))
            .or_else(|| self.lookup(BUILT_IN_LOCALE, code))
        {
            Some(text) => text.to_string(),
            None => {
                warn!("No message for {code} in locale {locale}");
                code.to_string()
            }
        }
    }
}
