//! Error Classifier (spec §4.I) — two-tier: a fixed regex catalogue
//! (always on, confidence 1.0) and an optional LLM tier gated at a
//! configurable confidence floor.

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;

use conductor_kernel::error::KernelResult;
use conductor_kernel::{Category, DetectedError, Logger, Method};

use crate::config::OrchestratorConfig;

/// One entry in the Tier-1 catalogue: checked in order, first match wins.
struct Pattern {
    regex: Regex,
    category: Category,
    agent_can_fix: bool,
    requires_human_intervention: bool,
    suggestion: &'static str,
}

fn catalogue() -> Vec<Pattern> {
    vec![
        Pattern {
            regex: Regex::new(r"(?i)xcodebuild: error: multiple devices matched").unwrap(),
            category: Category::EnvLevel,
            agent_can_fix: false,
            requires_human_intervention: true,
            suggestion: "select a single simulator/device destination before retrying",
        },
        Pattern {
            regex: Regex::new(r"(?i)error\[E\d+\]|error: expected|cannot find (type|function|value)|unresolved import").unwrap(),
            category: Category::CodeLevel,
            agent_can_fix: true,
            requires_human_intervention: false,
            suggestion: "fix the reported compile error and retry",
        },
        Pattern {
            regex: Regex::new(r"(?i)no such file or directory|command not found|package .* not found").unwrap(),
            category: Category::EnvLevel,
            agent_can_fix: false,
            requires_human_intervention: true,
            suggestion: "install the missing dependency or fix the environment, then retry",
        },
        Pattern {
            regex: Regex::new(r"(?i)permission denied|eacces").unwrap(),
            category: Category::EnvLevel,
            agent_can_fix: false,
            requires_human_intervention: true,
            suggestion: "adjust file/process permissions before retrying",
        },
        Pattern {
            regex: Regex::new(r"(?i)test(s)? failed|assertion failed|FAILED \(|panicked at").unwrap(),
            category: Category::TestFailure,
            agent_can_fix: true,
            requires_human_intervention: false,
            suggestion: "inspect the failing assertion and correct the implementation",
        },
        Pattern {
            regex: Regex::new(r"(?i)depends_on references unknown task|unknown task number|plan validation failed").unwrap(),
            category: Category::PlanLevel,
            agent_can_fix: false,
            requires_human_intervention: true,
            suggestion: "correct the plan document's task graph",
        },
        Pattern {
            regex: Regex::new(r"(?i)timed? ?out|deadline exceeded").unwrap(),
            category: Category::EnvLevel,
            agent_can_fix: false,
            requires_human_intervention: true,
            suggestion: "increase the timeout or investigate the hang, then retry",
        },
    ]
}

/// The LLM classification tier's response envelope (spec §6). Only the
/// fields the retry gate/prompt injector need are kept as typed; the rest
/// of the documented schema (`severity_level`, `time_to_resolve`,
/// `error_language`, `reasoning`) has no spec-named consumer yet and is
/// accepted-and-discarded via `#[serde(default)]`/`deny_unknown_fields`
/// omission rather than modelled.
#[derive(Debug, Clone, Deserialize)]
struct LlmClassification {
    category: String,
    #[serde(default)]
    agent_can_fix: bool,
    #[serde(default)]
    requires_human_intervention: bool,
    #[serde(default)]
    suggestion: String,
    confidence: f64,
}

fn parse_category(s: &str) -> Category {
    match s.to_ascii_uppercase().as_str() {
        "CODE_LEVEL" => Category::CodeLevel,
        "PLAN_LEVEL" => Category::PlanLevel,
        "ENV_LEVEL" => Category::EnvLevel,
        "TEST_FAILURE" => Category::TestFailure,
        _ => Category::Unknown,
    }
}

/// Invokes an LLM classification agent; left abstract so `classify` stays
/// unit-testable without a real agent, same seam as [`conductor_kernel::AgentInvoker`].
#[async_trait::async_trait]
pub trait ClassificationAgent: Send + Sync {
    async fn classify(&self, command: &str, output: &str, task_context: &str) -> KernelResult<String>;
}

pub struct ErrorClassifier<'a> {
    config: &'a OrchestratorConfig,
    agent: Option<&'a dyn ClassificationAgent>,
    logger: Option<&'a dyn Logger>,
}

impl<'a> ErrorClassifier<'a> {
    pub fn new(
        config: &'a OrchestratorConfig,
        agent: Option<&'a dyn ClassificationAgent>,
        logger: Option<&'a dyn Logger>,
    ) -> Self {
        ErrorClassifier { config, agent, logger }
    }

    /// Runs Tier 1 first; if `llm_classification_enabled` and an agent is
    /// configured, attempts Tier 2 and prefers it when confidence clears
    /// the floor (spec §4.I).
    pub async fn classify(&self, task_number: &str, command: &str, output: &str) -> DetectedError {
        let tier1 = self.classify_tier1(output);

        if !self.config.llm_classification_enabled {
            return self.finish(task_number, tier1);
        }
        let Some(agent) = self.agent else {
            return self.finish(task_number, tier1);
        };

        match agent.classify(command, output, task_number).await {
            Ok(raw) => match serde_json::from_str::<LlmClassification>(&raw) {
                Ok(parsed) if parsed.confidence >= self.config.classifier_confidence_threshold => {
                    let detected = DetectedError::regex_match(
                        parse_category(&parsed.category),
                        parsed.agent_can_fix,
                        parsed.requires_human_intervention,
                        parsed.suggestion,
                        output,
                        Utc::now(),
                    );
                    let detected = DetectedError {
                        method: Method::Llm,
                        confidence: parsed.confidence,
                        ..detected
                    };
                    self.finish(task_number, detected)
                }
                _ => self.finish(task_number, tier1),
            },
            Err(_) => self.finish(task_number, tier1),
        }
    }

    fn classify_tier1(&self, output: &str) -> DetectedError {
        for pattern in catalogue() {
            if pattern.regex.is_match(output) {
                return DetectedError::regex_match(
                    pattern.category,
                    pattern.agent_can_fix,
                    pattern.requires_human_intervention,
                    pattern.suggestion,
                    output,
                    Utc::now(),
                );
            }
        }
        DetectedError::regex_match(
            Category::Unknown,
            false,
            false,
            "no known pattern matched; manual triage recommended",
            output,
            Utc::now(),
        )
    }

    fn finish(&self, task_number: &str, detected: DetectedError) -> DetectedError {
        conductor_kernel::logging::log_detected_error(self.logger, &detected, task_number);
        detected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAgent(String);

    #[async_trait::async_trait]
    impl ClassificationAgent for StubAgent {
        async fn classify(&self, _command: &str, _output: &str, _task_context: &str) -> KernelResult<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn adaptive_skip_xcodebuild_multiple_devices() {
        let config = OrchestratorConfig::default();
        let classifier = ErrorClassifier::new(&config, None, None);
        let detected = classifier
            .classify("7", "xcodebuild test", "xcodebuild: error: multiple devices matched")
            .await;
        assert_eq!(detected.category, Category::EnvLevel);
        assert_eq!(detected.method, Method::Regex);
        assert!(!detected.agent_can_fix);
        assert!(detected.requires_human_intervention);
        assert_eq!(detected.confidence, 1.0);
    }

    #[tokio::test]
    async fn compile_error_is_code_level_and_agent_fixable() {
        let config = OrchestratorConfig::default();
        let classifier = ErrorClassifier::new(&config, None, None);
        let detected = classifier
            .classify("1", "cargo build", "error[E0433]: cannot find type `Foo` in this scope")
            .await;
        assert_eq!(detected.category, Category::CodeLevel);
        assert!(detected.agent_can_fix);
    }

    #[tokio::test]
    async fn unmatched_output_is_unknown_category() {
        let config = OrchestratorConfig::default();
        let classifier = ErrorClassifier::new(&config, None, None);
        let detected = classifier.classify("1", "cmd", "something entirely novel happened").await;
        assert_eq!(detected.category, Category::Unknown);
    }

    #[tokio::test]
    async fn llm_tier_used_when_confidence_clears_threshold() {
        let mut config = OrchestratorConfig::default();
        config.llm_classification_enabled = true;
        let agent = StubAgent(
            r#"{"category": "TEST_FAILURE", "agent_can_fix": true, "requires_human_intervention": false, "suggestion": "fix the assertion", "confidence": 0.95}"#.to_string(),
        );
        let classifier = ErrorClassifier::new(&config, Some(&agent), None);
        let detected = classifier.classify("1", "cmd", "assertion failed at line 4").await;
        assert_eq!(detected.method, Method::Llm);
        assert_eq!(detected.category, Category::TestFailure);
        assert_eq!(detected.confidence, 0.95);
    }

    #[tokio::test]
    async fn llm_tier_falls_back_to_regex_below_threshold() {
        let mut config = OrchestratorConfig::default();
        config.llm_classification_enabled = true;
        let agent = StubAgent(
            r#"{"category": "CODE_LEVEL", "confidence": 0.4}"#.to_string(),
        );
        let classifier = ErrorClassifier::new(&config, Some(&agent), None);
        let detected = classifier
            .classify("1", "cmd", "assertion failed: expected 1, got 2")
            .await;
        assert_eq!(detected.method, Method::Regex);
        assert_eq!(detected.category, Category::TestFailure);
    }

    #[tokio::test]
    async fn llm_tier_falls_back_to_regex_on_invalid_json() {
        let mut config = OrchestratorConfig::default();
        config.llm_classification_enabled = true;
        let agent = StubAgent("not json at all".to_string());
        let classifier = ErrorClassifier::new(&config, Some(&agent), None);
        let detected = classifier.classify("1", "cmd", "permission denied").await;
        assert_eq!(detected.method, Method::Regex);
        assert_eq!(detected.category, Category::EnvLevel);
    }
}
