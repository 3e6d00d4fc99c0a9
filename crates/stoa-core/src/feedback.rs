//! Feedback synthesis: one more model call that merges the three evaluator
//! verdicts into a single score and a short constructive summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bloom::BloomLevel;
use crate::error::StoaResult;
use crate::evaluate::{EvaluationOutcome, EvaluatorResult};
use crate::extract::{clamp_score, extract_json_object, score_field};
use crate::gateway::{invoke_role, ChatMessage, LlmClient};
use crate::language::Language;
use crate::prompts::Role;

/// The merged verdict. `score` is the synthesizer's own number, not
/// necessarily the evaluator mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedFeedback {
    pub score: f64,
    pub feedback: String,
}

/// One stored feedback record, the unit of the feedback history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub task_level: BloomLevel,
    pub task_name: String,
    /// Synthesized score actually awarded for the task.
    pub score: f64,
    pub evaluators: Vec<EvaluatorResult>,
    pub average_raw_score: f64,
    pub variance: f64,
    pub credibility: u8,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEntry {
    pub fn new(
        level: BloomLevel,
        language: Language,
        outcome: &EvaluationOutcome,
        synthesized: &SynthesizedFeedback,
    ) -> Self {
        Self {
            task_level: level,
            task_name: level.label(language).to_string(),
            score: synthesized.score,
            evaluators: outcome.results.clone(),
            average_raw_score: outcome.average_raw_score,
            variance: outcome.variance,
            credibility: outcome.credibility,
            summary: synthesized.feedback.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Ask the feedback role to merge the evaluator verdicts, with the filtered
/// conversation context ahead of the summary block. A reply whose JSON does
/// not parse degrades to the evaluator mean plus the verbatim reply text;
/// malformed model output never surfaces as an error here.
pub fn synthesize_feedback(
    client: &dyn LlmClient,
    results: &[EvaluatorResult],
    language: Language,
    level: BloomLevel,
    context: Vec<ChatMessage>,
) -> StoaResult<SynthesizedFeedback> {
    let summary_block = evaluator_summary(results, language);
    let instruction = match language {
        Language::En => format!(
            "Below are the scores and feedback from three evaluators. Please synthesize this information to provide a final score and feedback summary:\n\n{summary_block}"
        ),
        Language::Zh => format!(
            "以下是三个评估者的评分和反馈，请综合这些信息给出最终得分和反馈总结：\n\n{summary_block}"
        ),
    };

    let mut messages = context;
    messages.push(ChatMessage::user(instruction));

    let reply = invoke_role(client, Role::Feedback, language, level, messages)?;

    if let Some(value) = extract_json_object(&reply) {
        if let Some(score) = score_field(&value) {
            let feedback = value
                .get("feedback")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| reply.clone());
            return Ok(SynthesizedFeedback {
                score: clamp_score(score),
                feedback,
            });
        }
    }

    // Fallback: evaluator mean plus the raw reply, so the learner always
    // gets something readable.
    debug!("feedback reply had no parseable JSON, falling back to evaluator mean");
    let mean = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.raw_score).sum::<f64>() / results.len() as f64
    };
    Ok(SynthesizedFeedback {
        score: clamp_score(mean),
        feedback: reply,
    })
}

fn evaluator_summary(results: &[EvaluatorResult], language: Language) -> String {
    results
        .iter()
        .enumerate()
        .map(|(index, r)| {
            let letter = char::from(b'A' + index as u8);
            let score = format!("{:.1}", r.raw_score);
            match language {
                Language::En => format!(
                    "Evaluator {letter}: Score {score}/10, Feedback: {}",
                    r.feedback
                ),
                Language::Zh => format!("评估者{letter}: 得分 {score}/10，反馈：{}", r.feedback),
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedClient;

    fn results() -> Vec<EvaluatorResult> {
        vec![
            EvaluatorResult {
                id: "evaluator_1".into(),
                label: "Evaluator A".into(),
                raw_score: 6.0,
                feedback: "ok".into(),
            },
            EvaluatorResult {
                id: "evaluator_2".into(),
                label: "Evaluator B".into(),
                raw_score: 7.0,
                feedback: "decent".into(),
            },
            EvaluatorResult {
                id: "evaluator_3".into(),
                label: "Evaluator C".into(),
                raw_score: 8.0,
                feedback: "strong".into(),
            },
        ]
    }

    #[test]
    fn test_synthesis_parses_json_reply() {
        let client = ScriptedClient::new([r#"{"score": 7.5, "feedback": "Well reasoned overall."}"#]);
        let merged = synthesize_feedback(
            &client,
            &results(),
            Language::En,
            BloomLevel::Understand,
            Vec::new(),
        )
        .unwrap();

        assert_eq!(merged.score, 7.5);
        assert_eq!(merged.feedback, "Well reasoned overall.");

        // The request carries the feedback system prompt plus the summary.
        let requests = client.requests.borrow();
        let content = &requests[0].messages.last().unwrap().content;
        assert!(content.contains("Evaluator A: Score 6.0/10"));
        assert!(content.contains("Evaluator C: Score 8.0/10"));
    }

    #[test]
    fn test_malformed_reply_falls_back_to_mean_and_verbatim_text() {
        let client = ScriptedClient::new(["You did fine, keep going."]);
        let merged = synthesize_feedback(
            &client,
            &results(),
            Language::En,
            BloomLevel::Understand,
            Vec::new(),
        )
        .unwrap();

        assert_eq!(merged.score, 7.0);
        assert_eq!(merged.feedback, "You did fine, keep going.");
    }

    #[test]
    fn test_out_of_range_synthesized_score_is_clamped() {
        let client = ScriptedClient::new([r#"{"score": 99, "feedback": "generous"}"#]);
        let merged = synthesize_feedback(
            &client,
            &results(),
            Language::En,
            BloomLevel::Create,
            Vec::new(),
        )
        .unwrap();
        assert_eq!(merged.score, 10.0);
    }
}
