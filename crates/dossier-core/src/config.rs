//! Pipeline configuration
//!
//! Loaded from TOML; every field has a default so a partial file is valid.
//!
//! ```toml
//! max_rewrite_cycles = 2
//! rewrite_policy = "recritique"
//! include_news = true
//!
//! [roles.writer]
//! temperature = 0.7
//! tier = "default"
//! ```

use crate::collaborators::{ModelTier, Role};
use crate::error::ConfigError;
use crate::retry::{ExhaustionPolicy, RewriteBudget, RewritePolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rewrite passes allowed before the exhaustion policy applies
    pub max_rewrite_cycles: u32,
    /// Routing after a rewrite
    pub rewrite_policy: RewritePolicy,
    /// Behavior when the rewrite budget runs out
    pub exhaustion_policy: ExhaustionPolicy,
    /// Concurrent per-item calls in writer, critic and retrieval
    pub max_concurrency: usize,
    /// Characters kept per retrieved source
    pub max_document_chars: usize,
    /// Also query the news source
    pub include_news: bool,
    /// Per-stage time budget in seconds, 0 disables
    pub stage_timeout_secs: u64,
    /// Persist a snapshot after every merged stage
    pub checkpoint_each_stage: bool,
    /// Sampling settings per role
    pub roles: RoleSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_rewrite_cycles: 3,
            rewrite_policy: RewritePolicy::OneShot,
            exhaustion_policy: ExhaustionPolicy::AcceptBestEffort,
            max_concurrency: 4,
            max_document_chars: 20_000,
            include_news: false,
            stage_timeout_secs: 600,
            checkpoint_each_stage: false,
            roles: RoleSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate TOML
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.max_document_chars == 0 {
            return Err(ConfigError::Invalid(
                "max_document_chars must be at least 1".into(),
            ));
        }
        for role in [Role::Router, Role::Extractor, Role::Writer, Role::Critic] {
            let t = self.roles.get(role).temperature;
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "{role} temperature {t} outside 0.0..=2.0"
                )));
            }
        }
        Ok(())
    }

    /// Rewrite cycle budget
    #[inline]
    #[must_use]
    pub fn budget(&self) -> RewriteBudget {
        RewriteBudget::new(self.max_rewrite_cycles)
    }

    /// Stage time budget, if enabled
    #[inline]
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        (self.stage_timeout_secs > 0).then(|| Duration::from_secs(self.stage_timeout_secs))
    }

    /// With rewrite cycle budget
    #[inline]
    #[must_use]
    pub fn with_max_rewrite_cycles(mut self, cycles: u32) -> Self {
        self.max_rewrite_cycles = cycles;
        self
    }

    /// With rewrite policy
    #[inline]
    #[must_use]
    pub fn with_rewrite_policy(mut self, policy: RewritePolicy) -> Self {
        self.rewrite_policy = policy;
        self
    }

    /// With exhaustion policy
    #[inline]
    #[must_use]
    pub fn with_exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion_policy = policy;
        self
    }

    /// With concurrency limit
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// With per-source character limit
    #[inline]
    #[must_use]
    pub fn with_max_document_chars(mut self, chars: usize) -> Self {
        self.max_document_chars = chars;
        self
    }

    /// With news retrieval toggled
    #[inline]
    #[must_use]
    pub fn with_news(mut self, include: bool) -> Self {
        self.include_news = include;
        self
    }

    /// With stage timeout in seconds
    #[inline]
    #[must_use]
    pub fn with_stage_timeout_secs(mut self, secs: u64) -> Self {
        self.stage_timeout_secs = secs;
        self
    }

    /// With per-stage checkpointing toggled
    #[inline]
    #[must_use]
    pub fn with_checkpointing(mut self, enabled: bool) -> Self {
        self.checkpoint_each_stage = enabled;
        self
    }
}

/// Sampling settings for one role
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoleConfig {
    /// Sampling temperature
    pub temperature: f32,
    /// Model size hint
    pub tier: ModelTier,
}

impl RoleConfig {
    /// Create role settings
    #[inline]
    #[must_use]
    pub fn new(temperature: f32, tier: ModelTier) -> Self {
        Self { temperature, tier }
    }
}

/// Sampling settings for every role
///
/// A role table in TOML only overrides the keys it names; missing keys keep
/// that role's own default rather than the global one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RoleOverrides")]
pub struct RoleSettings {
    /// Source selection
    pub router: RoleConfig,
    /// Knowledge extraction
    pub extractor: RoleConfig,
    /// Section writing
    pub writer: RoleConfig,
    /// Section review
    pub critic: RoleConfig,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            router: RoleConfig::new(0.0, ModelTier::Small),
            extractor: RoleConfig::new(0.0, ModelTier::Small),
            writer: RoleConfig::new(0.5, ModelTier::Default),
            critic: RoleConfig::new(0.2, ModelTier::Default),
        }
    }
}

impl RoleSettings {
    /// Settings for a role
    #[inline]
    #[must_use]
    pub fn get(&self, role: Role) -> RoleConfig {
        match role {
            Role::Router => self.router,
            Role::Extractor => self.extractor,
            Role::Writer => self.writer,
            Role::Critic => self.critic,
        }
    }
}

/// TOML shape of [`RoleSettings`], every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RoleOverrides {
    router: RoleOverride,
    extractor: RoleOverride,
    writer: RoleOverride,
    critic: RoleOverride,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RoleOverride {
    temperature: Option<f32>,
    tier: Option<ModelTier>,
}

impl RoleOverride {
    fn apply(self, base: RoleConfig) -> RoleConfig {
        RoleConfig {
            temperature: self.temperature.unwrap_or(base.temperature),
            tier: self.tier.unwrap_or(base.tier),
        }
    }
}

impl From<RoleOverrides> for RoleSettings {
    fn from(overrides: RoleOverrides) -> Self {
        let base = Self::default();
        Self {
            router: overrides.router.apply(base.router),
            extractor: overrides.extractor.apply(base.extractor),
            writer: overrides.writer.apply(base.writer),
            critic: overrides.critic.apply(base.critic),
        }
    }
}
