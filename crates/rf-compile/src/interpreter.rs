//! Interpreter boundary

use crate::candidate::CandidateRule;
use crate::error::InterpretationError;
use async_trait::async_trait;
use rf_core::SchemaDescriptor;
use std::collections::BTreeMap;
use std::time::Duration;

/// Turns rule text into a candidate rule.
///
/// This is the only non-deterministic step of compilation. Implementations
/// may call out to a model service; the compiler bounds each call with a
/// timeout.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(
        &self,
        rule_text: &str,
        schema: &SchemaDescriptor,
    ) -> Result<CandidateRule, InterpretationError>;
}

/// Interpreter answering from a fixed table of rule texts.
///
/// Rule texts are matched after trimming, lowercasing and collapsing
/// whitespace.
#[derive(Debug, Clone, Default)]
pub struct StaticInterpreter {
    rules: BTreeMap<String, CandidateRule>,
    fallback: Option<CandidateRule>,
    delay: Option<Duration>,
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl StaticInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `candidate` for `rule_text`
    pub fn with_rule(mut self, rule_text: &str, candidate: CandidateRule) -> Self {
        self.rules.insert(normalize_text(rule_text), candidate);
        self
    }

    /// Answer `candidate` for any unknown rule text
    pub fn with_fallback(mut self, candidate: CandidateRule) -> Self {
        self.fallback = Some(candidate);
        self
    }

    /// Wait before answering (simulates a slow model call)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Interpreter for StaticInterpreter {
    async fn interpret(
        &self,
        rule_text: &str,
        _schema: &SchemaDescriptor,
    ) -> Result<CandidateRule, InterpretationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let key = normalize_text(rule_text);
        if key.is_empty() {
            return Err(InterpretationError::new("rule text is empty"));
        }
        self.rules
            .get(&key)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| InterpretationError::new(format!("no interpretation for '{}'", rule_text)))
    }
}
