// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Kernel configuration.
//!
//! Plain `serde` + `Default` derives, deserializable from JSON, YAML, or
//! TOML depending on how the embedding application loads it — no DI
//! container.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::budget::ResourceType;
use crate::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_LOOP_WINDOW,
    DEFAULT_PRIOR_ALPHA, DEFAULT_PRIOR_BETA, DEFAULT_RAG_MIN_RELEVANCE, DEFAULT_RAG_TOP_K,
    DEFAULT_SEMANTIC_THRESHOLD,
};

/// Step Execution Cache settings (`cache.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// `cache.capacity`.
    pub capacity: usize,
    /// `cache.useBounded`.
    pub use_bounded: bool,
    /// `cache.defaultTtl`.
    pub default_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            use_bounded: false,
            default_ttl: None,
        }
    }
}

/// Progress Ledger & Loop Detector settings (`loopDetection.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoopDetectionConfig {
    /// `loopDetection.windowSize`.
    pub window_size: usize,
    /// `loopDetection.semanticThreshold`.
    pub semantic_threshold: f64,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_LOOP_WINDOW,
            semantic_threshold: DEFAULT_SEMANTIC_THRESHOLD,
        }
    }
}

/// Thompson Sampling settings (`thompson.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThompsonConfig {
    /// `thompson.priorAlpha`.
    pub prior_alpha: f64,
    /// `thompson.priorBeta`.
    pub prior_beta: f64,
    /// `thompson.confidenceThreshold`.
    pub confidence_threshold: f64,
}

impl Default for ThompsonConfig {
    fn default() -> Self {
        Self {
            prior_alpha: DEFAULT_PRIOR_ALPHA,
            prior_beta: DEFAULT_PRIOR_BETA,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Retrieval-augmented-generation settings (`rag.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RagConfig {
    /// `rag.topK`.
    pub top_k: usize,
    /// `rag.minRelevance`.
    pub min_relevance: f64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_RAG_TOP_K,
            min_relevance: DEFAULT_RAG_MIN_RELEVANCE,
        }
    }
}

/// Top-level kernel configuration, covering every documented
/// configuration option.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct KernelConfig {
    /// Step Execution Cache settings.
    pub cache: CacheConfig,
    /// Progress Ledger & Loop Detector settings.
    pub loop_detection: LoopDetectionConfig,
    /// Thompson Sampling settings.
    pub thompson: ThompsonConfig,
    /// `budget.limits`: resource -> numeric limit.
    pub budget_limits: HashMap<ResourceType, f64>,
    /// Retrieval settings.
    pub rag: RagConfig,
}

impl KernelConfig {
    /// Parse configuration from a JSON document.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(input: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(input)
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.cache.capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.loop_detection.window_size, DEFAULT_LOOP_WINDOW);
        assert_eq!(config.thompson.prior_alpha, DEFAULT_PRIOR_ALPHA);
        assert_eq!(config.rag.top_k, DEFAULT_RAG_TOP_K);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = KernelConfig::from_json(r#"{"cache": {"capacity": 42}}"#).unwrap();
        assert_eq!(config.cache.capacity, 42);
        assert_eq!(config.rag.top_k, DEFAULT_RAG_TOP_K);
    }

    #[test]
    fn camel_case_keys_deserialize_into_snake_case_fields() {
        let config = KernelConfig::from_json(
            r#"{"cache": {"useBounded": true, "defaultTtl": null}, "thompson": {"priorAlpha": 3.0}, "rag": {"topK": 9}}"#,
        )
        .unwrap();
        assert!(config.cache.use_bounded);
        assert_eq!(config.thompson.prior_alpha, 3.0);
        assert_eq!(config.rag.top_k, 9);
    }

    #[test]
    fn yaml_round_trips_budget_limits() {
        let config = KernelConfig::from_yaml(
            "budgetLimits:\n  Tokens: 1000.0\n  Steps: 50.0\n",
        )
        .unwrap();
        assert_eq!(config.budget_limits.get(&ResourceType::Tokens), Some(&1000.0));
    }

    #[test]
    fn toml_parses() {
        let config = KernelConfig::from_toml("[cache]\ncapacity = 7\n").unwrap();
        assert_eq!(config.cache.capacity, 7);
    }
}
