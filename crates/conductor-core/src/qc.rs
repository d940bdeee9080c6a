//! QC Controller (spec §4.F) — prompt construction, response parsing,
//! single- and multi-reviewer invocation, strictest-wins aggregation.

use error_stack::Report;
use futures::future::join_all;
use regex::Regex;
use serde_json::Value;

use conductor_kernel::error::KernelResult;
use conductor_kernel::{AgentInvoker, Issue, KernelError, Logger, ReviewResult, Task, Verdict};

use crate::config::{OrchestratorConfig, QcMode};

/// Selects which reviewer agents run for a task. Left abstract: the
/// concrete registry/config lookup behind `auto`/`mixed` selection is an
/// external collaborator, same as the agent invoker (spec §4.F).
pub trait ReviewerSelector: Send + Sync {
    fn select(&self, task: &Task, config: &OrchestratorConfig) -> Vec<String>;
}

/// A selector returning a fixed, pre-configured reviewer list — sufficient
/// for `explicit` mode and for tests.
pub struct FixedReviewerSelector(pub Vec<String>);

impl ReviewerSelector for FixedReviewerSelector {
    fn select(&self, _task: &Task, _config: &OrchestratorConfig) -> Vec<String> {
        self.0.clone()
    }
}

pub struct QcController<'a> {
    invoker: &'a dyn AgentInvoker,
    selector: &'a dyn ReviewerSelector,
    config: &'a OrchestratorConfig,
    logger: Option<&'a dyn Logger>,
}

impl<'a> QcController<'a> {
    pub fn new(
        invoker: &'a dyn AgentInvoker,
        selector: &'a dyn ReviewerSelector,
        config: &'a OrchestratorConfig,
        logger: Option<&'a dyn Logger>,
    ) -> Self {
        QcController {
            invoker,
            selector,
            config,
            logger,
        }
    }

    /// Runs single- or multi-agent review per the configured mode and
    /// returns the (possibly aggregated) [`ReviewResult`] (spec §4.F).
    pub async fn review(
        &self,
        task: &Task,
        agent_output: &str,
        historical_context: Option<&str>,
    ) -> KernelResult<ReviewResult> {
        let reviewers = self.selector.select(task, self.config);
        let multi = matches!(self.config.qc_mode, QcMode::Auto | QcMode::Mixed) || reviewers.len() > 1;

        if reviewers.is_empty() {
            return Err(Report::new(KernelError::Internal(format!(
                "qc: reviewer selection for task {} yielded no agents",
                task.number
            ))));
        }

        conductor_kernel::logging::log_info(
            self.logger,
            format!("qc: selected reviewers {:?} for task {}", reviewers, task.number),
        );

        let result = if !multi || reviewers.len() == 1 {
            self.single_agent_review(task, &reviewers[0], agent_output, historical_context)
                .await
        } else {
            self.multi_agent_review(task, &reviewers, agent_output, historical_context).await
        };

        conductor_kernel::logging::log_qc_aggregated_result(self.logger, &task.number, &result);
        Ok(result)
    }

    async fn single_agent_review(
        &self,
        task: &Task,
        agent: &str,
        agent_output: &str,
        historical_context: Option<&str>,
    ) -> ReviewResult {
        let prompt = build_prompt(task, agent_output, historical_context);
        let review_task = Task::new(&task.number, &task.name).with_prompt(prompt).with_agent(agent);

        match self.invoker.invoke(&review_task).await {
            Ok(outcome) if !outcome.is_failure() => {
                let mut result = parse_response(&outcome.output);
                result.agent_name = agent.to_string();
                result
            }
            Ok(outcome) => ReviewResult::failure(
                agent,
                outcome.error.unwrap_or_else(|| "reviewer exited non-zero".to_string()),
            ),
            Err(e) => ReviewResult::failure(agent, format!("reviewer invocation error: {e:?}")),
        }
    }

    async fn multi_agent_review(
        &self,
        task: &Task,
        reviewers: &[String],
        agent_output: &str,
        historical_context: Option<&str>,
    ) -> ReviewResult {
        let futures = reviewers
            .iter()
            .map(|agent| self.single_agent_review(task, agent, agent_output, historical_context));

        let results: Vec<ReviewResult> = join_all(futures).await;
        conductor_kernel::logging::log_qc_individual_verdicts(self.logger, &task.number, &results);
        aggregate(&results)
    }
}

/// Prompt construction (spec §4.F): task name, original prompt, agent
/// output, optional historical-context block, JSON-instruction footer.
pub fn build_prompt(task: &Task, agent_output: &str, historical_context: Option<&str>) -> String {
    let mut sections = vec![
        format!("Task: {}", task.name),
        format!("Original prompt:\n{}", task.prompt),
        format!("Agent output:\n{agent_output}"),
    ];
    if let Some(context) = historical_context {
        if !context.is_empty() {
            sections.push(format!("Historical context:\n{context}"));
        }
    }
    sections.push(
        "Respond with strict JSON matching this schema: {\"verdict\": \"GREEN|RED|YELLOW\", \
         \"feedback\": string, \"issues\": [{\"severity\", \"description\", \"location\"}], \
         \"recommendations\": [string], \"should_retry\": bool, \"suggested_agent\": string}"
            .to_string(),
    );
    sections.join("\n\n")
}

/// Robust to three envelopes (spec §4.F):
/// 1. outer JSON with a `result` field wrapping the payload;
/// 2. a fenced ```json``` markdown block;
/// 3. loose text ("Quality Control: GREEN|RED|YELLOW" or the first bare
///    verdict keyword).
pub fn parse_response(raw: &str) -> ReviewResult {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if let Some(inner) = value.get("result").and_then(|v| v.as_str()) {
            return parse_response(inner);
        }
        if let Some(direct) = parse_qc_json(&value) {
            return direct;
        }
    }

    if let Some(fenced) = extract_json_fence(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(&fenced) {
            if let Some(direct) = parse_qc_json(&value) {
                return direct;
            }
        }
    }

    parse_loose_text(raw)
}

fn parse_qc_json(value: &Value) -> Option<ReviewResult> {
    let verdict_str = value.get("verdict")?.as_str()?;
    let flag = Verdict::parse(verdict_str);
    let issues = value
        .get("issues")
        .and_then(|v| serde_json::from_value::<Vec<Issue>>(v.clone()).ok())
        .unwrap_or_default();
    let recommendations = value
        .get("recommendations")
        .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
        .unwrap_or_default();

    Some(ReviewResult {
        flag,
        feedback: value.get("feedback").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        issues,
        recommendations,
        should_retry: value.get("should_retry").and_then(|v| v.as_bool()).unwrap_or(false),
        suggested_agent: value
            .get("suggested_agent")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        agent_name: String::new(),
    })
}

fn extract_json_fence(raw: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap();
    re.captures(raw).map(|c| c[1].to_string())
}

fn parse_loose_text(raw: &str) -> ReviewResult {
    let labelled = Regex::new(r"(?i)Quality\s*Control:\s*(GREEN|RED|YELLOW)").unwrap();
    if let Some(caps) = labelled.captures(raw) {
        let flag = Verdict::parse(&caps[1]);
        let after = &raw[caps.get(0).unwrap().end()..];
        let feedback: String = after
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        return ReviewResult {
            flag,
            feedback,
            ..Default::default()
        };
    }

    let bare = Regex::new(r"(?i)\b(GREEN|RED|YELLOW)\b").unwrap();
    if let Some(caps) = bare.captures(raw) {
        return ReviewResult {
            flag: Verdict::parse(&caps[1]),
            ..Default::default()
        };
    }

    ReviewResult::failure("", "unable to parse reviewer response")
}

/// Strictest-wins aggregation (spec §4.F, GLOSSARY): start at GREEN; an
/// empty flag promotes to YELLOW (a reviewer failure is a warning, not a
/// veto); any RED wins outright; else any YELLOW wins; else GREEN.
/// Implemented as `max` over [`Verdict`]'s derived ordering, which is
/// exactly the strictest-wins relation since `Green < Yellow < Red`.
pub fn aggregate(results: &[ReviewResult]) -> ReviewResult {
    let mut final_flag = Verdict::Green;
    let mut feedback_parts = Vec::new();
    let mut suggested_agent = String::new();
    let mut agent_names = Vec::new();
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    for r in results {
        let effective = r.flag.unwrap_or(Verdict::Yellow);
        if effective > final_flag {
            final_flag = effective;
        }
        if !r.feedback.is_empty() {
            feedback_parts.push(format!("[{}] {}", r.agent_name, r.feedback));
        }
        if suggested_agent.is_empty() && !r.suggested_agent.is_empty() {
            suggested_agent = r.suggested_agent.clone();
        }
        agent_names.push(r.agent_name.clone());
        issues.extend(r.issues.iter().cloned());
        recommendations.extend(r.recommendations.iter().cloned());
    }

    ReviewResult {
        flag: Some(final_flag),
        feedback: feedback_parts.join("\n"),
        issues,
        recommendations,
        should_retry: results.iter().any(|r| r.should_retry),
        suggested_agent,
        agent_name: format!("multi-agent({})", agent_names.join(",")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockAgentInvoker;

    #[test]
    fn parse_response_handles_result_envelope() {
        let raw = r#"{"result": "{\"verdict\": \"GREEN\", \"feedback\": \"looks good\"}"}"#;
        let r = parse_response(raw);
        assert_eq!(r.flag, Some(Verdict::Green));
        assert_eq!(r.feedback, "looks good");
    }

    #[test]
    fn parse_response_handles_fenced_json() {
        let raw = "Here is my review:\n```json\n{\"verdict\": \"YELLOW\", \"feedback\": \"minor nit\"}\n```\nthanks";
        let r = parse_response(raw);
        assert_eq!(r.flag, Some(Verdict::Yellow));
        assert_eq!(r.feedback, "minor nit");
    }

    #[test]
    fn parse_response_handles_labelled_loose_text() {
        let raw = "Quality Control: RED\nMissing error handling.\nPlease retry.";
        let r = parse_response(raw);
        assert_eq!(r.flag, Some(Verdict::Red));
        assert!(r.feedback.contains("Missing error handling"));
    }

    #[test]
    fn parse_response_falls_back_to_bare_keyword() {
        let raw = "I think this is GREEN overall, nice work.";
        let r = parse_response(raw);
        assert_eq!(r.flag, Some(Verdict::Green));
    }

    #[test]
    fn parse_response_unparseable_yields_empty_flag() {
        let r = parse_response("no idea what happened here");
        assert!(r.flag.is_none());
    }

    #[test]
    fn aggregate_all_green_is_green() {
        let results = vec![
            ReviewResult {
                flag: Some(Verdict::Green),
                agent_name: "a".into(),
                ..Default::default()
            },
            ReviewResult {
                flag: Some(Verdict::Green),
                agent_name: "b".into(),
                ..Default::default()
            },
        ];
        assert_eq!(aggregate(&results).flag, Some(Verdict::Green));
    }

    #[test]
    fn aggregate_strictest_wins_three_reviewers() {
        let results = vec![
            ReviewResult {
                flag: Some(Verdict::Green),
                agent_name: "claude".into(),
                feedback: "ok".into(),
                ..Default::default()
            },
            ReviewResult {
                flag: Some(Verdict::Yellow),
                agent_name: "gpt".into(),
                feedback: "nit".into(),
                ..Default::default()
            },
            ReviewResult {
                flag: Some(Verdict::Red),
                agent_name: "gemini".into(),
                feedback: "broken".into(),
                ..Default::default()
            },
        ];
        let combined = aggregate(&results);
        assert_eq!(combined.flag, Some(Verdict::Red));
        assert!(combined.feedback.contains("[claude]"));
        assert!(combined.feedback.contains("[gpt]"));
        assert!(combined.feedback.contains("[gemini]"));
        assert_eq!(combined.agent_name, "multi-agent(claude,gpt,gemini)");
    }

    #[test]
    fn aggregate_empty_flag_promotes_to_yellow_not_failure() {
        let results = vec![ReviewResult::failure("a", "errored"), ReviewResult::failure("b", "errored")];
        assert_eq!(aggregate(&results).flag, Some(Verdict::Yellow));
    }

    #[tokio::test]
    async fn single_reviewer_mode_invokes_once() {
        let invoker = MockAgentInvoker::new().push_output("Quality Control: GREEN\nAll good.");
        let selector = FixedReviewerSelector(vec!["claude".into()]);
        let config = OrchestratorConfig::default();
        let qc = QcController::new(&invoker, &selector, &config, None);
        let task = Task::new("1", "do thing").with_prompt("p");
        let result = qc.review(&task, "output", None).await.unwrap();
        assert_eq!(result.flag, Some(Verdict::Green));
        assert_eq!(result.agent_name, "claude");
    }

    #[tokio::test]
    async fn empty_reviewer_selection_fails() {
        let invoker = MockAgentInvoker::new();
        let selector = FixedReviewerSelector(vec![]);
        let config = OrchestratorConfig::default();
        let qc = QcController::new(&invoker, &selector, &config, None);
        let task = Task::new("1", "x");
        assert!(qc.review(&task, "output", None).await.is_err());
    }
}
