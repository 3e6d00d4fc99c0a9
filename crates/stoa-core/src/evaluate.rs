//! Multi-evaluator scoring pipeline.
//!
//! Every answer is scored by the same panel of three evaluators, each with a
//! different lens: strict rubric compliance, growth orientation, and
//! cognitive-process analysis. Scores are averaged; when the panel disagrees
//! too much the whole panel is re-run (bounded), with the disagreement
//! disclosed so evaluators can reconsider.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bloom::BloomLevel;
use crate::extract::{clamp_score, extract_json_object, score_field};
use crate::gateway::{ChatMessage, CompletionRequest, LlmClient};
use crate::language::Language;

/// Disagreement policy. The defaults are the values used in the pilot study;
/// both stay configurable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Population variance above which the panel is considered in dispute.
    pub variance_threshold: f64,
    /// Total panel runs allowed, first run included.
    pub max_attempts: u32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 1.0,
            max_attempts: 5,
        }
    }
}

/// One evaluator's verdict. Identity (A, B, C) is positional and stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorResult {
    pub id: String,
    pub label: String,
    pub raw_score: f64,
    pub feedback: String,
}

/// Aggregate of one full evaluation, after any disagreement re-runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    /// Panel mean rounded to 1 decimal, the headline score.
    pub score: f64,
    /// The three verdicts, in evaluator order A, B, C.
    pub results: Vec<EvaluatorResult>,
    /// Panel mean rounded to 2 decimals, kept for analysis exports.
    pub average_raw_score: f64,
    /// Population variance of the three raw scores.
    pub variance: f64,
    /// 1 when the final variance still exceeds the threshold; carried into
    /// the stored feedback as a low-confidence marker, never used to block.
    pub credibility: u8,
    /// Panel runs actually performed.
    pub attempts: u32,
    /// Per-evaluator score/feedback lines joined for display.
    pub combined_feedback: String,
}

/// The three evaluation lenses, in panel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lens {
    Strict,
    Growth,
    Cognitive,
}

const PANEL: [Lens; 3] = [Lens::Strict, Lens::Growth, Lens::Cognitive];

/// Everything a lens needs to phrase its prompt.
struct EvaluationTask<'a> {
    question: &'a str,
    answer: &'a str,
    level: BloomLevel,
    language: Language,
    reference_answer: Option<&'a str>,
    /// Variance of the previous round, when this is a re-run.
    prior_disagreement: Option<f64>,
}

/// Score an answer with the full panel, re-running while the verdicts
/// disagree and the attempt budget lasts. Never fails: an evaluator whose
/// call errors or whose reply has no parseable JSON is recorded with score 0
/// and the error text (or raw reply) as feedback.
pub fn evaluate_answer(
    client: &dyn LlmClient,
    config: &EvaluationConfig,
    question: &str,
    answer: &str,
    reference_answer: Option<&str>,
    level: BloomLevel,
    language: Language,
) -> EvaluationOutcome {
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut prior_disagreement = None;
    let mut results = Vec::new();
    let mut variance = 0.0;

    while attempts < max_attempts {
        attempts += 1;
        let task = EvaluationTask {
            question,
            answer,
            level,
            language,
            reference_answer,
            prior_disagreement,
        };
        results = run_panel(client, &task);
        variance = population_variance(&results);
        if variance <= config.variance_threshold {
            break;
        }
        if attempts < max_attempts {
            debug!(variance, attempts, "evaluator panel disagrees, re-running");
            prior_disagreement = Some(variance);
        } else {
            warn!(variance, attempts, "evaluator disagreement persisted past attempt budget");
        }
    }

    let mean = results.iter().map(|r| r.raw_score).sum::<f64>() / results.len() as f64;
    let credibility = u8::from(variance > config.variance_threshold);
    let combined_feedback = combined_feedback(&results, language);

    EvaluationOutcome {
        score: round_to(mean, 1),
        results,
        average_raw_score: round_to(mean, 2),
        variance,
        credibility,
        attempts,
        combined_feedback,
    }
}

/// One pass over the three lenses, sequentially, identities in panel order.
fn run_panel(client: &dyn LlmClient, task: &EvaluationTask<'_>) -> Vec<EvaluatorResult> {
    PANEL
        .iter()
        .enumerate()
        .map(|(index, lens)| {
            let prompt = lens.build_prompt(task);
            let request = CompletionRequest::scoring(vec![ChatMessage::system(prompt)]);
            let (raw_score, feedback) = match client.complete(&request) {
                Ok(reply) => match extract_json_object(&reply) {
                    Some(value) => {
                        let score = clamp_score(score_field(&value).unwrap_or(0.0));
                        let feedback = value
                            .get("feedback")
                            .and_then(serde_json::Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| reply.clone());
                        (score, feedback)
                    }
                    // Recorded failure mode, not a retry: the raw reply
                    // becomes the feedback and the score is zero.
                    None => (0.0, reply),
                },
                Err(err) => (0.0, error_feedback(&err.to_string(), task.language)),
            };

            EvaluatorResult {
                id: format!("evaluator_{}", index + 1),
                label: evaluator_label(task.language, index),
                raw_score,
                feedback,
            }
        })
        .collect()
}

fn evaluator_label(language: Language, index: usize) -> String {
    let letter = char::from(b'A' + index as u8);
    match language {
        Language::En => format!("Evaluator {letter}"),
        Language::Zh => format!("评估者{letter}"),
    }
}

fn error_feedback(message: &str, language: Language) -> String {
    match language {
        Language::En => format!("Evaluation error: {message}"),
        Language::Zh => format!("评估出现错误：{message}"),
    }
}

fn combined_feedback(results: &[EvaluatorResult], language: Language) -> String {
    results
        .iter()
        .map(|r| {
            let score = format!("{:.1}", r.raw_score);
            match language {
                Language::En => {
                    format!("{}: Score {score}/10; Feedback: {}", r.label, r.feedback)
                }
                Language::Zh => {
                    format!("{}: 得分 {score}/10；反馈：{}", r.label, r.feedback)
                }
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn population_variance(results: &[EvaluatorResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let mean = results.iter().map(|r| r.raw_score).sum::<f64>() / results.len() as f64;
    results
        .iter()
        .map(|r| (r.raw_score - mean).powi(2))
        .sum::<f64>()
        / results.len() as f64
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

impl Lens {
    fn build_prompt(self, task: &EvaluationTask<'_>) -> String {
        let label = task.level.label(task.language);
        let mut prompt = match (self, task.language) {
            (Lens::Strict, Language::En) => format!(
                r#"As a strict educational standards assessment expert, please evaluate based on precise Bloom's taxonomy criteria.

Evaluation Task: {label} level ({criteria})

Question: "{question}"

Answer: "{answer}"

Evaluation Requirements:

1. Strictly score (0-10) based on the core competency requirements of the {label} level

2. Scoring must be based on objective evidence, not considering student potential or effort

3. Feedback must clearly indicate whether the answer meets the cognitive requirements of this level

4. If the answer involves other level abilities, do not use them as bonus points

Please output JSON: {{ "score": number, "feedback": "specific technical feedback" }}"#,
                criteria = self.focus(task.level, task.language),
                question = task.question,
                answer = task.answer,
            ),
            (Lens::Strict, Language::Zh) => format!(
                r#"作为严格的教育标准评估专家，请基于Bloom分类学的精确标准进行评估。

评估任务：{label}层级（{criteria}）

问题："{question}"

回答："{answer}"

评估要求：

1. 严格按照{label}层级的核心能力要求进行评分（0-10分）

2. 评分必须基于客观证据，不考虑学生潜力或努力程度

3. 反馈需明确指出回答是否符合该层级的认知要求

4. 如回答涉及其他层级能力，不作为加分依据

请输出JSON：{{ "score": 数字, "feedback": "具体的技术性反馈" }}"#,
                criteria = self.focus(task.level, task.language),
                question = task.question,
                answer = task.answer,
            ),
            (Lens::Growth, Language::En) => format!(
                r#"As a student development mentor, please evaluate the answer from a growth perspective, focusing on learning potential and room for improvement.

Evaluation Focus: {label} level - {focus}

Question: "{question}"

Student Answer: "{answer}"

Please evaluate from the following dimensions:

1. Current performance level at the {label} level (0-10 points)

2. Thinking highlights and development potential shown in the answer

3. Specific actionable improvement suggestions

4. How to advance from the current level to higher levels

Feedback should be encouraging and constructive, helping students recognize strengths and weaknesses.

Please output JSON: {{ "score": number, "feedback": "encouraging constructive feedback" }}"#,
                focus = self.focus(task.level, task.language),
                question = task.question,
                answer = task.answer,
            ),
            (Lens::Growth, Language::Zh) => format!(
                r#"作为学生发展指导师，请从成长视角评估回答，关注学习潜力和进步空间。

评估重点：{label}层级的{focus}

问题："{question}"

学生回答："{answer}"

请从以下维度评估：

1. 当前在{label}层级的表现水平（0-10分）

2. 回答中展现的思维亮点和发展潜力

3. 具体可操作的改进建议

4. 如何从当前水平向更高层级迈进

反馈应体现鼓励性、建设性，帮助学生认识优势与不足。

请输出JSON：{{ "score": 数字, "feedback": "鼓励性建设反馈" }}"#,
                focus = self.focus(task.level, task.language),
                question = task.question,
                answer = task.answer,
            ),
            (Lens::Cognitive, Language::En) => format!(
                r#"As a cognitive science analyst, please deeply analyze the cognitive processing reflected in the answer.

Analysis Framework: {label} level cognitive processes - {process}

Question: "{question}"

Answer Sample: "{answer}"

Please analyze:

1. Specific evidence of cognitive processes observed in the answer

2. Completeness and complexity of the thinking process

3. Cognitive leaps or missing links

4. Score (0-10) based on the quality of cognitive processes

Feedback should reveal the mechanisms of thinking operation and point out key nodes of cognitive development.

Please output JSON: {{ "score": number, "feedback": "cognitive process analysis" }}"#,
                process = self.focus(task.level, task.language),
                question = task.question,
                answer = task.answer,
            ),
            (Lens::Cognitive, Language::Zh) => format!(
                r#"作为认知科学分析师，请深入分析回答中体现的认知加工过程。

分析框架：{label}层级的认知过程 - {process}

问题："{question}"

回答样本："{answer}"

请分析：

1. 回答中观察到的具体认知过程证据

2. 思维过程的完整性和复杂性

3. 认知跳跃或缺失环节

4. 基于认知过程质量的评分（0-10分）

反馈应揭示思维运作机制，指出认知发展的关键节点。

请输出JSON：{{ "score": 数字, "feedback": "认知过程分析" }}"#,
                process = self.focus(task.level, task.language),
                question = task.question,
                answer = task.answer,
            ),
        };

        if let Some(reference) = task.reference_answer {
            prompt.push_str(&match task.language {
                Language::En => format!(
                    "\n\nReference answer (for calibration only, the student has not seen it): \"{reference}\""
                ),
                Language::Zh => format!("\n\n参考标准答案（仅用于评分校准，学生不可见）：\"{reference}\""),
            });
        }

        if let Some(variance) = task.prior_disagreement {
            prompt.push_str(&match task.language {
                Language::En => format!(
                    "\n\nNote: in the previous round the three evaluators disagreed strongly (score variance {variance:.2}). Re-examine the answer against the rubric before scoring."
                ),
                Language::Zh => format!(
                    "\n\n注意：上一轮三位评估者的评分分歧较大（方差 {variance:.2}）。请对照评分标准重新审视回答后再给分。"
                ),
            });
        }

        prompt
    }

    /// Per-lens, per-level emphasis line embedded into the prompt.
    fn focus(self, level: BloomLevel, language: Language) -> &'static str {
        match (self, language) {
            (Lens::Strict, Language::En) => match level {
                BloomLevel::Remember => "Ability to accurately recall facts, terms, and basic concepts",
                BloomLevel::Understand => "Ability to explain, summarize, infer, and compare concepts",
                BloomLevel::Apply => "Ability to apply knowledge to solve problems in new situations",
                BloomLevel::Analyze => "Ability to break down materials, identify relationships, and organize structures",
                BloomLevel::Evaluate => "Ability to make judgments and critical evaluations based on criteria",
                BloomLevel::Create => "Ability to integrate elements into novel coherent wholes or propose new solutions",
            },
            (Lens::Strict, Language::Zh) => match level {
                BloomLevel::Remember => "精确回忆事实、术语、基础概念的能力",
                BloomLevel::Understand => "解释、总结、推断和比较概念的能力",
                BloomLevel::Apply => "在新情境中运用知识解决问题的能力",
                BloomLevel::Analyze => "分解材料、识别关系和组织结构的能力",
                BloomLevel::Evaluate => "基于标准做出判断和批判性评价的能力",
                BloomLevel::Create => "整合元素形成新颖连贯的整体或提出新方案的能力",
            },
            (Lens::Growth, Language::En) => match level {
                BloomLevel::Remember => "Accuracy and organization of memory",
                BloomLevel::Understand => "Conceptual understanding and meaning construction",
                BloomLevel::Apply => "Knowledge transfer and practical application",
                BloomLevel::Analyze => "Systematic and logical thinking",
                BloomLevel::Evaluate => "Critical thinking and judgment",
                BloomLevel::Create => "Innovative thinking and synthesis ability",
            },
            (Lens::Growth, Language::Zh) => match level {
                BloomLevel::Remember => "记忆的准确性和组织性",
                BloomLevel::Understand => "概念理解和意义建构",
                BloomLevel::Apply => "知识迁移和实践应用",
                BloomLevel::Analyze => "思维的系统性和逻辑性",
                BloomLevel::Evaluate => "批判思维和判断力",
                BloomLevel::Create => "创新思维和综合能力",
            },
            (Lens::Cognitive, Language::En) => match level {
                BloomLevel::Remember => "Identify → Recall → Retrieve",
                BloomLevel::Understand => "Explain → Exemplify → Classify → Summarize → Infer → Compare",
                BloomLevel::Apply => "Execute → Implement",
                BloomLevel::Analyze => "Differentiate → Organize → Attribute",
                BloomLevel::Evaluate => "Check → Critique",
                BloomLevel::Create => "Generate → Plan → Produce",
            },
            (Lens::Cognitive, Language::Zh) => match level {
                BloomLevel::Remember => "识别→回忆→提取",
                BloomLevel::Understand => "解释→举例→分类→总结→推断→比较→说明",
                BloomLevel::Apply => "执行→实施",
                BloomLevel::Analyze => "区分→组织→归因",
                BloomLevel::Evaluate => "检查→批评",
                BloomLevel::Create => "生成→规划→产生",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{FailingClient, ScriptedClient};

    fn agreeing_replies() -> Vec<String> {
        vec![
            r#"{"score": 7, "feedback": "accurate recall"}"#.into(),
            r#"{"score": 8, "feedback": "good potential"}"#.into(),
            r#"{"score": 7.5, "feedback": "clear retrieval"}"#.into(),
        ]
    }

    #[test]
    fn test_agreeing_panel_runs_once() {
        let client = ScriptedClient::new(agreeing_replies());
        let outcome = evaluate_answer(
            &client,
            &EvaluationConfig::default(),
            "List two data structures",
            "Array and linked list",
            None,
            BloomLevel::Remember,
            Language::En,
        );

        assert_eq!(client.call_count(), 3);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.average_raw_score, 7.5);
        assert_eq!(outcome.score, 7.5);
        assert_eq!(outcome.credibility, 0);
        assert_eq!(outcome.results[0].label, "Evaluator A");
        assert_eq!(outcome.results[2].label, "Evaluator C");
        assert!(outcome.combined_feedback.contains("Evaluator B"));
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        let client = ScriptedClient::new([
            r#"{"score": 42, "feedback": "way high"}"#,
            r#"{"score": -5, "feedback": "way low"}"#,
            r#"{"score": "8", "feedback": "stringly"}"#,
        ]);
        let outcome = evaluate_answer(
            &client,
            &EvaluationConfig {
                variance_threshold: 100.0,
                max_attempts: 5,
            },
            "q",
            "a",
            None,
            BloomLevel::Remember,
            Language::En,
        );

        let scores: Vec<f64> = outcome.results.iter().map(|r| r.raw_score).collect();
        assert_eq!(scores, vec![10.0, 0.0, 8.0]);
        assert!(outcome.results.iter().all(|r| (0.0..=10.0).contains(&r.raw_score)));
    }

    #[test]
    fn test_malformed_reply_scores_zero_with_raw_text() {
        let client = ScriptedClient::new([
            "I refuse to answer in JSON.",
            r#"{"score": 6, "feedback": "fine"}"#,
            r#"{"score": 6, "feedback": "fine"}"#,
        ]);
        let outcome = evaluate_answer(
            &client,
            &EvaluationConfig {
                variance_threshold: 100.0,
                max_attempts: 5,
            },
            "q",
            "a",
            None,
            BloomLevel::Understand,
            Language::En,
        );

        assert_eq!(outcome.results[0].raw_score, 0.0);
        assert_eq!(outcome.results[0].feedback, "I refuse to answer in JSON.");
    }

    #[test]
    fn test_gateway_failure_is_recorded_not_raised() {
        let outcome = evaluate_answer(
            &FailingClient,
            &EvaluationConfig {
                variance_threshold: 100.0,
                max_attempts: 5,
            },
            "q",
            "a",
            None,
            BloomLevel::Apply,
            Language::En,
        );

        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results.iter().all(|r| r.raw_score == 0.0));
        assert!(outcome.results[0].feedback.starts_with("Evaluation error:"));
    }

    #[test]
    fn test_disagreement_rerun_stops_at_attempt_budget() {
        // Scores 0 / 10 / 5 give variance ~16.7 forever: the pipeline must
        // run exactly max_attempts panels (5 * 3 calls) and then stop.
        let replies: Vec<String> = (0..15)
            .map(|i| {
                let score = [0, 10, 5][i % 3];
                format!(r#"{{"score": {score}, "feedback": "split"}}"#)
            })
            .collect();
        let client = ScriptedClient::new(replies);
        let config = EvaluationConfig::default();
        let outcome = evaluate_answer(
            &client,
            &config,
            "q",
            "a",
            None,
            BloomLevel::Evaluate,
            Language::En,
        );

        assert_eq!(outcome.attempts, 5);
        assert_eq!(client.call_count(), 15);
        assert_eq!(outcome.credibility, 1);
        assert!(outcome.variance > config.variance_threshold);

        // Re-run prompts disclose the disagreement.
        let requests = client.requests.borrow();
        let later_prompt = &requests[3].messages[0].content;
        assert!(later_prompt.contains("disagreed strongly"));
    }

    #[test]
    fn test_reference_answer_reaches_prompts() {
        let client = ScriptedClient::new(agreeing_replies());
        evaluate_answer(
            &client,
            &EvaluationConfig::default(),
            "q",
            "a",
            Some("Array and linked list."),
            BloomLevel::Remember,
            Language::En,
        );
        let requests = client.requests.borrow();
        assert!(requests[0].messages[0].content.contains("Reference answer"));
        assert_eq!(requests[0].temperature, 0.3);
        assert_eq!(requests[0].max_tokens, 300);
    }
}
