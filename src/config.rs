//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. [`load_config`] parses and validates in one step.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lex_ingest_core::classify::KeywordClassifier;
use lex_ingest_core::extract::{default_hints, ContentHint, HeuristicExtractor};
use lex_ingest_core::profile::SourceProfile;
use lex_ingest_core::segment::ArticleSegmenter;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default = "default_max_article_chars")]
    pub max_article_chars: usize,
    #[serde(default = "default_classifier_window_chars")]
    pub classifier_window_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            store_timeout_secs: default_store_timeout_secs(),
            min_content_chars: default_min_content_chars(),
            max_content_chars: default_max_content_chars(),
            max_article_chars: default_max_article_chars(),
            classifier_window_chars: default_classifier_window_chars(),
        }
    }
}

impl PipelineConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_store_timeout_secs() -> u64 {
    30
}
fn default_min_content_chars() -> usize {
    100
}
fn default_max_content_chars() -> usize {
    40_000
}
fn default_max_article_chars() -> usize {
    1000
}
fn default_classifier_window_chars() -> usize {
    500
}

/// Per-source overrides, selected with `lex ingest --profile <name>`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProfileConfig {
    /// Category used when no keyword rule matches.
    #[serde(default)]
    pub default_category: Option<String>,
    /// Extra content containers tried before the built-in hints.
    #[serde(default)]
    pub content_selectors: Vec<ContentSelectorConfig>,
}

/// One content container hint: an element name plus an optional
/// case-insensitive class or id pattern.
#[derive(Debug, Deserialize, Clone)]
pub struct ContentSelectorConfig {
    #[serde(default = "default_selector_tag")]
    pub tag: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

fn default_selector_tag() -> String {
    "div".to_string()
}

impl ContentSelectorConfig {
    fn to_hint(&self) -> Result<ContentHint> {
        let hint = match (&self.class, &self.id) {
            (Some(_), Some(_)) => {
                anyhow::bail!("content selector for <{}> sets both class and id", self.tag)
            }
            (Some(class), None) => ContentHint::class(&self.tag, &format!("(?i){}", class))
                .with_context(|| format!("Invalid class pattern: {}", class))?,
            (None, Some(id)) => ContentHint::id(&self.tag, &format!("(?i){}", id))
                .with_context(|| format!("Invalid id pattern: {}", id))?,
            (None, None) => ContentHint::tag(&self.tag),
        };
        Ok(hint)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub filesystem: Option<FilesystemConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

pub(crate) fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.html".to_string(),
        "**/*.htm".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.pdf".to_string(),
    ]
}

impl Config {
    /// Build the strategy triple for `name`.
    ///
    /// Unknown names are an error; `None` selects the stock profile.
    pub fn source_profile(&self, name: Option<&str>) -> Result<SourceProfile> {
        let (profile_name, overrides) = match name {
            Some(n) => {
                let p = self.profiles.get(n).ok_or_else(|| {
                    let known: Vec<_> = self.profiles.keys().map(String::as_str).collect();
                    anyhow::anyhow!(
                        "Unknown profile: '{}'. Configured profiles: {}",
                        n,
                        if known.is_empty() {
                            "(none)".to_string()
                        } else {
                            known.join(", ")
                        }
                    )
                })?;
                (n.to_string(), p.clone())
            }
            None => ("default".to_string(), ProfileConfig::default()),
        };

        let mut classifier =
            KeywordClassifier::default().with_window(self.pipeline.classifier_window_chars);
        if let Some(category) = &overrides.default_category {
            classifier = classifier.with_default_category(category.clone());
        }

        let mut hints = overrides
            .content_selectors
            .iter()
            .map(ContentSelectorConfig::to_hint)
            .collect::<Result<Vec<_>>>()?;
        hints.extend(default_hints());

        Ok(SourceProfile::standard(profile_name)
            .with_extractor(Arc::new(HeuristicExtractor::with_hints(hints)))
            .with_segmenter(Arc::new(ArticleSegmenter::new(
                self.pipeline.max_article_chars,
            )))
            .with_classifier(Arc::new(classifier)))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let p = &config.pipeline;
    if p.concurrency == 0 {
        anyhow::bail!("pipeline.concurrency must be >= 1");
    }
    if p.store_timeout_secs == 0 {
        anyhow::bail!("pipeline.store_timeout_secs must be >= 1");
    }
    if p.min_content_chars == 0 || p.max_content_chars == 0 {
        anyhow::bail!("pipeline.min_content_chars and pipeline.max_content_chars must be > 0");
    }
    if p.min_content_chars > p.max_content_chars {
        anyhow::bail!(
            "pipeline.min_content_chars ({}) must not exceed pipeline.max_content_chars ({})",
            p.min_content_chars,
            p.max_content_chars
        );
    }
    if p.max_article_chars == 0 {
        anyhow::bail!("pipeline.max_article_chars must be > 0");
    }
    if p.classifier_window_chars == 0 {
        anyhow::bail!("pipeline.classifier_window_chars must be > 0");
    }

    for (name, profile) in &config.profiles {
        for selector in &profile.content_selectors {
            selector
                .to_hint()
                .with_context(|| format!("profiles.{}.content_selectors", name))?;
        }
    }

    Ok(())
}
