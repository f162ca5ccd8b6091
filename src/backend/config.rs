//! Backend configuration.
//!
//! [`BackendConfig`] is a plain struct with defaults; [`BackendBuilder`]
//! assembles it together with the storage handle and the filter parser and
//! validates it once before a [`Backend`] is handed out.

use crate::backend::hooks::WriteHook;
use crate::backend::Backend;
use crate::error::{BuildError, BuildResult};
use crate::filter::{FilterParser, ScimFilterParser};
use crate::resource::{EtagComputer, Meta, ResourceType};
use crate::storage::StorageProvider;
use std::fmt;
use std::sync::Arc;

/// Settings shared by every use-case of a [`Backend`].
#[derive(Clone)]
pub struct BackendConfig {
    /// Root URL of the SCIM service, used for `meta.location` and `$ref`.
    pub base_url: String,

    /// Protocol version segment placed after the base URL. Defaults to "v2".
    pub scim_version: String,

    /// Version-stamp salt. A random salt is drawn at build time when unset.
    pub salt: Option<Vec<u8>>,

    /// Hard upper bound on the number of resources one search returns.
    pub max_results: usize,

    /// Page size used when a search request carries no `count`.
    pub default_page_size: usize,

    /// Recompute `meta.version` after a PATCH. Off by default, so a patched
    /// resource keeps the version it had before the patch.
    pub recompute_etag_on_patch: bool,

    /// Post-write hooks, run in order.
    pub hooks: Vec<Arc<dyn WriteHook>>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost".to_string(),
            scim_version: "v2".to_string(),
            salt: None,
            max_results: 1000,
            default_page_size: 100,
            recompute_etag_on_patch: false,
            hooks: Vec::new(),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("scim_version", &self.scim_version)
            .field("salt", &self.salt.as_ref().map(|_| "<set>"))
            .field("max_results", &self.max_results)
            .field("default_page_size", &self.default_page_size)
            .field("recompute_etag_on_patch", &self.recompute_etag_on_patch)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl BackendConfig {
    /// `{base_url}/{scim_version}/{endpoint}/{id}`
    pub fn ref_url(&self, resource_type: ResourceType, id: &str) -> String {
        let base = format!("{}/{}", self.base_url.trim_end_matches('/'), self.scim_version);
        Meta::generate_location(&base, resource_type.endpoint(), id)
    }

    pub fn validate(&self) -> BuildResult<()> {
        if self.base_url.is_empty() {
            return Err(invalid("Base URL cannot be empty"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(invalid("Base URL must start with http:// or https://"));
        }
        if self.scim_version.is_empty() {
            return Err(invalid("SCIM version cannot be empty"));
        }
        if self.salt.as_ref().is_some_and(Vec::is_empty) {
            return Err(invalid("Version salt cannot be empty"));
        }
        if self.max_results == 0 {
            return Err(invalid("max_results must be at least 1"));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_results {
            return Err(invalid(
                "default_page_size must be between 1 and max_results",
            ));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> BuildError {
    BuildError::InvalidConfiguration {
        message: message.to_string(),
    }
}

/// Builder for [`Backend`] instances.
///
/// ```rust
/// use scim_store::backend::BackendBuilder;
/// use scim_store::storage::InMemoryStorage;
///
/// let backend = BackendBuilder::new(InMemoryStorage::new())
///     .with_base_url("https://scim.example.com")
///     .with_salt(b"fixed".to_vec())
///     .build()
///     .unwrap();
/// assert_eq!(backend.config().base_url, "https://scim.example.com");
/// ```
pub struct BackendBuilder<S> {
    storage: S,
    parser: Arc<dyn FilterParser>,
    config: BackendConfig,
}

impl<S: StorageProvider> BackendBuilder<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            parser: Arc::new(ScimFilterParser::default()),
            config: BackendConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: BackendConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn with_scim_version(mut self, version: impl Into<String>) -> Self {
        self.config.scim_version = version.into();
        self
    }

    /// Fix the version-stamp salt, making stamps reproducible across restarts.
    pub fn with_salt(mut self, salt: impl Into<Vec<u8>>) -> Self {
        self.config.salt = Some(salt.into());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.config.max_results = max_results;
        self
    }

    pub fn with_default_page_size(mut self, page_size: usize) -> Self {
        self.config.default_page_size = page_size;
        self
    }

    pub fn recompute_etag_on_patch(mut self, enabled: bool) -> Self {
        self.config.recompute_etag_on_patch = enabled;
        self
    }

    /// Append a post-write hook. Hooks run in the order they were added.
    pub fn with_hook(mut self, hook: impl WriteHook + 'static) -> Self {
        self.config.hooks.push(Arc::new(hook));
        self
    }

    /// Use another filter parser.
    pub fn with_parser(mut self, parser: impl FilterParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn build(self) -> BuildResult<Backend<S>> {
        self.config.validate()?;
        let etags = match &self.config.salt {
            Some(salt) => EtagComputer::new(salt.clone()),
            None => EtagComputer::random(),
        };
        Ok(Backend::from_parts(
            self.storage,
            self.parser,
            etags,
            self.config,
        ))
    }
}
