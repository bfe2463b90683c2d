//! Engine configuration.
//!
//! A TOML file is parsed into [`Settings`] (raw values with defaults), secrets
//! are overlaid from the environment, and the result is validated once into
//! an immutable [`EngineConfig`]. Folder roots are canonicalized and probed
//! for writability at this point; after startup the allow-lists are only read.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::download::{
    CONNECT_TIMEOUT_SECS, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY,
    DEFAULT_MAX_RETRIES, FLUSH_INTERVAL, FLUSH_INTERVAL_BYTES, READ_TIMEOUT_SECS, RetryPolicy,
    TransferConfig,
};

/// Environment variable overriding `[resolver] api_key`.
pub const RESOLVER_API_KEY_ENV: &str = "LINKDROP_RESOLVER_API_KEY";

/// Environment variable overriding `[notifier] token`.
pub const NOTIFIER_TOKEN_ENV: &str = "LINKDROP_NOTIFIER_TOKEN";

/// Default number of jobs transferring at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Default file host API.
pub const DEFAULT_RESOLVER_API_BASE: &str = "https://api.1fichier.com";

const MIN_URL_LENGTH: usize = 10;
const DEFAULT_MAX_URL_LENGTH: usize = 2048;

/// A submitted link or destination was rejected. No job is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The link is too short or too long.
    #[error("URL length {len} outside allowed range {min}..={max}")]
    UrlLength {
        /// Submitted length.
        len: usize,
        /// Minimum length.
        min: usize,
        /// Maximum length.
        max: usize,
    },

    /// The link does not parse.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// Submitted link.
        url: String,
    },

    /// The scheme is not in the allow-list.
    #[error("scheme '{scheme}' is not allowed")]
    SchemeNotAllowed {
        /// Submitted scheme.
        scheme: String,
    },

    /// The host is not in the allow-list.
    #[error("host '{host}' is not allowed")]
    HostNotAllowed {
        /// Submitted host, empty when missing.
        host: String,
    },

    /// The destination resolves outside every allow-listed root.
    #[error("destination {} is outside the allowed folders", path.display())]
    DestinationOutsideRoots {
        /// Resolved destination.
        path: PathBuf,
    },

    /// The destination does not exist or is not a directory.
    #[error("destination {} is not usable: {reason}", path.display())]
    DestinationUnusable {
        /// Submitted destination.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}

/// Startup configuration failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Settings`].
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A numeric setting is outside its range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Setting name.
        field: &'static str,
        /// Configured value.
        value: String,
        /// Accepted range.
        expected: &'static str,
    },

    /// A URL setting does not parse.
    #[error("invalid config value for `{field}`: {value} is not a valid URL")]
    InvalidUrl {
        /// Setting name.
        field: &'static str,
        /// Configured value.
        value: String,
    },

    /// `[folders] roots` is empty.
    #[error("no download roots configured")]
    NoRoots,

    /// A root does not exist or is not a directory.
    #[error("download root {} is missing or not a directory", path.display())]
    RootMissing {
        /// Configured root.
        path: PathBuf,
    },

    /// A root cannot be written to.
    #[error("download root {} is not writable: {source}", path.display())]
    RootNotWritable {
        /// Configured root.
        path: PathBuf,
        /// Error from the probe write.
        #[source]
        source: std::io::Error,
    },

    /// The default destination is not inside any root.
    #[error("default destination {} is outside the configured roots", path.display())]
    DefaultOutsideRoots {
        /// Configured default destination.
        path: PathBuf,
    },
}

// ==================== Raw settings ====================

/// Raw TOML settings with defaults applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// `[engine]`
    #[serde(default)]
    pub engine: EngineSection,
    /// `[transfer]`
    #[serde(default)]
    pub transfer: TransferSection,
    /// `[retry]`
    #[serde(default)]
    pub retry: RetrySection,
    /// `[sources]`
    #[serde(default)]
    pub sources: SourcesSection,
    /// `[folders]`
    #[serde(default)]
    pub folders: FoldersSection,
    /// `[resolver]`
    #[serde(default)]
    pub resolver: ResolverSection,
    /// `[notifier]`
    #[serde(default)]
    pub notifier: NotifierSection,
    /// `[storage]`
    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferSection {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_flush_interval_bytes")]
    pub flush_interval_bytes: u64,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesSection {
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
    #[serde(default = "default_max_url_length")]
    pub max_url_length: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FoldersSection {
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default)]
    pub default_destination: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverSection {
    #[serde(default = "default_resolver_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
}

fn default_max_concurrent_jobs() -> usize {
    DEFAULT_MAX_CONCURRENT_JOBS
}
fn default_connect_timeout_secs() -> u64 {
    CONNECT_TIMEOUT_SECS
}
fn default_read_timeout_secs() -> u64 {
    READ_TIMEOUT_SECS
}
fn default_flush_interval_bytes() -> u64 {
    FLUSH_INTERVAL_BYTES
}
#[allow(clippy::cast_possible_truncation)]
fn default_flush_interval_ms() -> u64 {
    FLUSH_INTERVAL.as_millis() as u64
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_RETRIES
}
#[allow(clippy::cast_possible_truncation)]
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY.as_millis() as u64
}
#[allow(clippy::cast_possible_truncation)]
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY.as_millis() as u64
}
fn default_multiplier() -> f32 {
    DEFAULT_BACKOFF_MULTIPLIER
}
fn default_allowed_schemes() -> Vec<String> {
    vec!["https".to_string()]
}
fn default_allowed_hosts() -> Vec<String> {
    vec!["1fichier.com".to_string(), "www.1fichier.com".to_string()]
}
fn default_max_url_length() -> usize {
    DEFAULT_MAX_URL_LENGTH
}
fn default_resolver_api_base() -> String {
    DEFAULT_RESOLVER_API_BASE.to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            flush_interval_bytes: default_flush_interval_bytes(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            allowed_schemes: default_allowed_schemes(),
            allowed_hosts: default_allowed_hosts(),
            max_url_length: default_max_url_length(),
        }
    }
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            api_base: default_resolver_api_base(),
            api_key: None,
        }
    }
}

impl Settings {
    /// Parses settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input or unknown keys.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlays secrets from the environment (`lookup` is `std::env::var` in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(RESOLVER_API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.resolver.api_key = Some(key);
        }
        if let Some(token) = lookup(NOTIFIER_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.notifier.token = Some(token);
        }
    }
}

// ==================== Validated configuration ====================

/// Scheme and host allow-list for submitted links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    allowed_schemes: Vec<String>,
    allowed_hosts: Vec<String>,
    max_url_length: usize,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self::new(default_allowed_schemes(), default_allowed_hosts(), DEFAULT_MAX_URL_LENGTH)
    }
}

impl SourcePolicy {
    /// Creates a policy; schemes and hosts compare case-insensitively.
    #[must_use]
    pub fn new(schemes: Vec<String>, hosts: Vec<String>, max_url_length: usize) -> Self {
        Self {
            allowed_schemes: schemes.into_iter().map(|s| s.to_ascii_lowercase()).collect(),
            allowed_hosts: hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
            max_url_length: max_url_length.max(MIN_URL_LENGTH),
        }
    }

    /// Checks a submitted link against the allow-list.
    ///
    /// # Errors
    ///
    /// The first [`ValidationError`] that applies.
    pub fn check(&self, raw: &str) -> Result<Url, ValidationError> {
        let len = raw.len();
        if !(MIN_URL_LENGTH..=self.max_url_length).contains(&len) {
            return Err(ValidationError::UrlLength {
                len,
                min: MIN_URL_LENGTH,
                max: self.max_url_length,
            });
        }

        let url = Url::parse(raw).map_err(|_| ValidationError::InvalidUrl {
            url: raw.to_string(),
        })?;

        if !self.allowed_schemes.iter().any(|s| s == url.scheme()) {
            return Err(ValidationError::SchemeNotAllowed {
                scheme: url.scheme().to_string(),
            });
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if host.is_empty() || !self.allowed_hosts.iter().any(|h| *h == host) {
            return Err(ValidationError::HostNotAllowed { host });
        }

        Ok(url)
    }
}

/// Allow-listed download roots and the default destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPolicy {
    roots: Vec<PathBuf>,
    default_destination: PathBuf,
}

impl FolderPolicy {
    /// Canonicalizes and probes `roots`, then checks the default destination.
    ///
    /// Without a default destination the first root is used.
    ///
    /// # Errors
    ///
    /// A [`ConfigError`] when a root is missing, not a directory or not
    /// writable, or when the default destination lies outside every root.
    pub fn new<I>(roots: I, default_destination: Option<PathBuf>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut canonical_roots = Vec::new();
        for root in roots {
            let canonical = fs::canonicalize(&root)
                .ok()
                .filter(|p| p.is_dir())
                .ok_or_else(|| ConfigError::RootMissing { path: root.clone() })?;
            probe_writable(&canonical)?;
            debug!(root = %canonical.display(), "download root accepted");
            canonical_roots.push(canonical);
        }

        let Some(first) = canonical_roots.first().cloned() else {
            return Err(ConfigError::NoRoots);
        };

        let mut policy = Self {
            roots: canonical_roots,
            default_destination: first,
        };
        if let Some(default) = default_destination {
            policy.default_destination = policy
                .check_destination(&default)
                .map_err(|_| ConfigError::DefaultOutsideRoots { path: default })?;
        }
        Ok(policy)
    }

    /// Canonical roots.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Canonical default destination.
    #[must_use]
    pub fn default_destination(&self) -> &Path {
        &self.default_destination
    }

    /// Resolves `candidate` to a canonical directory inside a root.
    ///
    /// Relative paths are taken relative to the default destination. Blocks
    /// on the filesystem; async callers use [`FolderPolicy::resolve_destination`].
    ///
    /// # Errors
    ///
    /// [`ValidationError::DestinationUnusable`] when the directory does not
    /// exist, [`ValidationError::DestinationOutsideRoots`] when it resolves
    /// outside every root (symlinks included).
    pub fn check_destination(&self, candidate: &Path) -> Result<PathBuf, ValidationError> {
        let canonical = fs::canonicalize(self.anchored(candidate))
            .map_err(|e| destination_unusable(candidate, &e))?;
        let is_dir = canonical.is_dir();
        self.accept(candidate, canonical, is_dir)
    }

    /// Same check as [`FolderPolicy::check_destination`] on `tokio::fs`.
    ///
    /// # Errors
    ///
    /// See [`FolderPolicy::check_destination`].
    pub async fn resolve_destination(&self, candidate: &Path) -> Result<PathBuf, ValidationError> {
        let canonical = tokio::fs::canonicalize(self.anchored(candidate))
            .await
            .map_err(|e| destination_unusable(candidate, &e))?;
        let is_dir = tokio::fs::metadata(&canonical)
            .await
            .is_ok_and(|meta| meta.is_dir());
        self.accept(candidate, canonical, is_dir)
    }

    fn anchored(&self, candidate: &Path) -> PathBuf {
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.default_destination.join(candidate)
        }
    }

    fn accept(
        &self,
        candidate: &Path,
        canonical: PathBuf,
        is_dir: bool,
    ) -> Result<PathBuf, ValidationError> {
        if !is_dir {
            return Err(ValidationError::DestinationUnusable {
                path: candidate.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        if self.contains(&canonical) {
            Ok(canonical)
        } else {
            Err(ValidationError::DestinationOutsideRoots { path: canonical })
        }
    }

    /// Component-wise prefix check against every root.
    fn contains(&self, canonical: &Path) -> bool {
        // canonicalize already removed `..`, this guards hand-built paths.
        if canonical
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return false;
        }
        self.roots.iter().any(|root| canonical.starts_with(root))
    }
}

fn destination_unusable(candidate: &Path, error: &std::io::Error) -> ValidationError {
    ValidationError::DestinationUnusable {
        path: candidate.to_path_buf(),
        reason: error.to_string(),
    }
}

fn probe_writable(dir: &Path) -> Result<(), ConfigError> {
    let probe = dir.join(format!(".linkdrop-probe-{}", uuid::Uuid::new_v4()));
    fs::File::create(&probe)
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|source| ConfigError::RootNotWritable {
            path: dir.to_path_buf(),
            source,
        })
}

/// File host API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// API base URL.
    pub api_base: String,
    /// API key; links pass through unchanged when absent.
    pub api_key: Option<String>,
}

/// Media library rescan settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Library server base URL.
    pub base_url: String,
    /// Access token.
    pub token: String,
    /// Library section to refresh; all sections when absent.
    pub section_id: Option<String>,
}

/// Optional on-disk state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// SQLite database for job records; in-memory only when absent.
    pub database_path: Option<PathBuf>,
    /// JSONL audit log.
    pub audit_log_path: Option<PathBuf>,
}

/// Validated, immutable engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size.
    pub max_concurrent_jobs: usize,
    /// Per-attempt timeouts and flush cadence.
    pub transfer: TransferConfig,
    /// Retry budget and backoff.
    pub retry: RetryPolicy,
    /// Link allow-list.
    pub sources: SourcePolicy,
    /// Destination allow-list.
    pub folders: FolderPolicy,
    /// File host API.
    pub resolver: ResolverConfig,
    /// Library rescan; disabled when absent.
    pub notifier: Option<NotifierConfig>,
    /// Database and audit log locations.
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Creates a configuration with defaults around validated folders.
    #[must_use]
    pub fn new(folders: FolderPolicy) -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            transfer: TransferConfig::default(),
            retry: RetryPolicy::default(),
            sources: SourcePolicy::default(),
            folders,
            resolver: ResolverConfig {
                api_base: DEFAULT_RESOLVER_API_BASE.to_string(),
                api_key: None,
            },
            notifier: None,
            storage: StorageConfig::default(),
        }
    }

    /// Loads, overlays environment secrets, and validates a config file.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from reading, parsing or validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = Settings::load(path)?;
        settings.apply_env_overrides(|name| std::env::var(name).ok());
        Self::from_settings(settings)
    }

    /// Validates raw settings.
    ///
    /// # Errors
    ///
    /// The first [`ConfigError`] found.
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let Settings {
            engine,
            transfer,
            retry,
            sources,
            folders,
            resolver,
            notifier,
            storage,
        } = settings;

        check_range("engine.max_concurrent_jobs", engine.max_concurrent_jobs, 1, 100, "1..=100")?;
        check_range("transfer.connect_timeout_secs", transfer.connect_timeout_secs, 1, 3600, "1..=3600")?;
        check_range("transfer.read_timeout_secs", transfer.read_timeout_secs, 1, 3600, "1..=3600")?;
        check_range(
            "transfer.flush_interval_bytes",
            transfer.flush_interval_bytes,
            4096,
            1 << 30,
            "4096..=1073741824",
        )?;
        check_range("transfer.flush_interval_ms", transfer.flush_interval_ms, 10, 60_000, "10..=60000")?;
        check_range("retry.max_attempts", retry.max_attempts, 1, 20, "1..=20")?;
        check_range("retry.max_delay_ms", retry.max_delay_ms, 0, 3_600_000, "0..=3600000")?;
        if !(1.0..=10.0).contains(&retry.multiplier) {
            return Err(ConfigError::OutOfRange {
                field: "retry.multiplier",
                value: retry.multiplier.to_string(),
                expected: "1.0..=10.0",
            });
        }
        check_range("sources.max_url_length", sources.max_url_length, 10, 65_536, "10..=65536")?;

        Url::parse(&resolver.api_base).map_err(|_| ConfigError::InvalidUrl {
            field: "resolver.api_base",
            value: resolver.api_base.clone(),
        })?;

        let notifier = match (notifier.base_url, notifier.token) {
            (Some(base_url), Some(token)) if !token.is_empty() => {
                Url::parse(&base_url).map_err(|_| ConfigError::InvalidUrl {
                    field: "notifier.base_url",
                    value: base_url.clone(),
                })?;
                Some(NotifierConfig {
                    base_url,
                    token,
                    section_id: notifier.section_id.filter(|s| !s.is_empty()),
                })
            }
            _ => None,
        };

        Ok(Self {
            max_concurrent_jobs: engine.max_concurrent_jobs,
            transfer: TransferConfig {
                connect_timeout: Duration::from_secs(transfer.connect_timeout_secs),
                read_timeout: Duration::from_secs(transfer.read_timeout_secs),
                flush_interval_bytes: transfer.flush_interval_bytes,
                flush_interval: Duration::from_millis(transfer.flush_interval_ms),
            },
            retry: RetryPolicy::new(
                retry.max_attempts,
                Duration::from_millis(retry.base_delay_ms),
                Duration::from_millis(retry.max_delay_ms),
                retry.multiplier,
            ),
            sources: SourcePolicy::new(
                sources.allowed_schemes,
                sources.allowed_hosts,
                sources.max_url_length,
            ),
            folders: FolderPolicy::new(folders.roots, folders.default_destination)?,
            resolver: ResolverConfig {
                api_base: resolver.api_base,
                api_key: resolver.api_key.filter(|k| !k.is_empty()),
            },
            notifier,
            storage: StorageConfig {
                database_path: storage.database_path,
                audit_log_path: storage.audit_log_path,
            },
        })
    }
}

fn check_range<T>(
    field: &'static str,
    value: T,
    min: T,
    max: T,
    expected: &'static str,
) -> Result<(), ConfigError>
where
    T: PartialOrd + ToString,
{
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        });
    }
    Ok(())
}
