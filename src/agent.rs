// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Agent provider contract.
//!
//! The kernel dispatches step work to agents through this trait; concrete
//! LLM-backed providers live outside this crate. `StaticAgentProvider` is a
//! deterministic double used by the kernel's own tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;

/// Output of a generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Output of a content review call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Free-text feedback.
    pub feedback: String,
    /// Numeric quality score in `[0, 1]`.
    pub score: f64,
}

/// An agent capable of generating and reviewing content for workflow steps.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    /// Produce a finished generation for `prompt`, honoring cooperative
    /// cancellation via `cancel`.
    async fn generate(&self, prompt: &str, cancel: watch::Receiver<bool>) -> Result<Generation>;

    /// Produce a low-effort draft, used by speculative/child branches that
    /// may be discarded.
    async fn generate_draft(&self, prompt: &str) -> Result<Generation>;

    /// Review previously generated `content` and return structured feedback.
    async fn review_content(&self, content: &str) -> Result<Review>;
}

/// A deterministic `AgentProvider` double keyed by prompt, for tests and
/// local development. Unmatched prompts fall back to `default_response`.
#[derive(Debug, Clone, Default)]
pub struct StaticAgentProvider {
    responses: HashMap<String, Generation>,
    default_response: Option<Generation>,
}

impl StaticAgentProvider {
    /// Create an empty provider; every call uses `default_response`.
    pub fn new(default_response: Generation) -> Self {
        Self {
            responses: HashMap::new(),
            default_response: Some(default_response),
        }
    }

    /// Register a canned response for an exact prompt match.
    #[must_use]
    pub fn with_response(mut self, prompt: impl Into<String>, generation: Generation) -> Self {
        self.responses.insert(prompt.into(), generation);
        self
    }

    fn respond(&self, prompt: &str) -> Generation {
        self.responses
            .get(prompt)
            .cloned()
            .or_else(|| self.default_response.clone())
            .unwrap_or(Generation {
                text: String::new(),
                confidence: 0.0,
            })
    }
}

#[async_trait]
impl AgentProvider for StaticAgentProvider {
    async fn generate(&self, prompt: &str, _cancel: watch::Receiver<bool>) -> Result<Generation> {
        Ok(self.respond(prompt))
    }

    async fn generate_draft(&self, prompt: &str) -> Result<Generation> {
        Ok(self.respond(prompt))
    }

    async fn review_content(&self, _content: &str) -> Result<Review> {
        Ok(Review {
            feedback: "looks fine".to_string(),
            score: 1.0,
        })
    }
}
