//! Best-effort structured extraction from free-text model replies.
//!
//! Models are asked for JSON but routinely wrap it in prose or code fences.
//! Extraction here never errors: callers get `Option` and decide their own
//! fallback (zero score, verbatim text, and so on).

use serde_json::Value;

/// Pull the first JSON object out of a reply. A fenced ```json block wins;
/// otherwise the span from the first `{` to the last `}` is tried, which is
/// forgiving enough for replies that append prose after the object.
pub fn extract_json_object(text: &str) -> Option<Value> {
    if let Some((source, _)) = fenced_json(text) {
        if let Ok(value) = serde_json_lenient::from_str::<Value>(source) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    let (source, _) = brace_span(text)?;
    serde_json_lenient::from_str::<Value>(source)
        .ok()
        .filter(Value::is_object)
}

/// Clamp a score into [0, 10]; non-finite values collapse to 0.
pub fn clamp_score(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, 10.0)
}

/// Read a score field that may arrive as a number or a numeric string.
pub fn score_field(value: &Value) -> Option<f64> {
    match value.get("score")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Examiner replies carry prose for display plus a trailing JSON object with
/// the clean question text and a hidden reference answer.
#[derive(Debug, Clone, Default)]
pub struct ExaminerOutput {
    /// The reply with the JSON block stripped, safe to show the learner.
    pub display_text: String,
    /// The plain question text, if the JSON block parsed.
    pub question: Option<String>,
    /// Reference answer for the evaluators only; never shown.
    pub standard_answer: Option<String>,
}

impl ExaminerOutput {
    /// Text to show the learner, preferring prose, then the bare question,
    /// then the raw reply.
    pub fn display<'a>(&'a self, raw: &'a str) -> &'a str {
        if !self.display_text.is_empty() {
            &self.display_text
        } else if let Some(q) = self.question.as_deref() {
            q
        } else {
            raw
        }
    }

    /// Question text the evaluation pipeline should score against.
    pub fn question_text<'a>(&'a self, raw: &'a str) -> &'a str {
        if let Some(q) = self.question.as_deref() {
            q
        } else if !self.display_text.is_empty() {
            &self.display_text
        } else {
            raw
        }
    }
}

/// Split an examiner reply into display text, question, and reference answer.
/// A reply with no parseable JSON comes back as display text only.
pub fn parse_examiner_output(raw: &str) -> ExaminerOutput {
    let mut out = ExaminerOutput {
        display_text: raw.trim().to_string(),
        ..Default::default()
    };

    let (source, full_span) = match fenced_json(raw).or_else(|| brace_span(raw)) {
        Some(found) => found,
        None => return out,
    };

    let value: Value = match serde_json_lenient::from_str(source) {
        Ok(v) => v,
        Err(_) => return out,
    };
    if !value.is_object() {
        return out;
    }

    out.display_text = raw.replace(full_span, "").trim().to_string();
    out.question = value
        .get("question")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    out.standard_answer = value
        .get("standard_answer")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    out
}

/// Extract the DOT source from a mind-map reply: a fenced ```dot block, or a
/// bare `digraph`/`graph` body as fallback.
pub fn extract_dot_block(text: &str) -> Option<String> {
    if let Some(inner) = fenced_block(text, "dot") {
        return Some(inner.trim().to_string());
    }
    let start = text.find("digraph").or_else(|| text.find("graph"))?;
    let open = text[start..].find('{')? + start;
    let close = text.rfind('}')?;
    if close <= open {
        return None;
    }
    Some(text[start..=close].trim().to_string())
}

/// Inner text of the first fenced ```json block, plus the full fence span
/// (for stripping it out of display text).
fn fenced_json(text: &str) -> Option<(&str, &str)> {
    let fence_start = text.find("```json").or_else(|| text.find("```JSON"))?;
    let body_start = fence_start + "```json".len();
    let body_len = text[body_start..].find("```")?;
    let inner = &text[body_start..body_start + body_len];
    let full = &text[fence_start..body_start + body_len + 3];
    Some((inner, full))
}

fn fenced_block<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let marker = format!("```{tag}");
    let fence_start = text.find(&marker)?;
    let body_start = fence_start + marker.len();
    let body_len = text[body_start..].find("```")?;
    Some(&text[body_start..body_start + body_len])
}

/// Greedy span from the first `{` to the last `}`; the prompts place the
/// object last in the reply.
fn brace_span(text: &str) -> Option<(&str, &str)> {
    let open = text.find('{')?;
    let close = text.rfind('}')?;
    if close <= open {
        return None;
    }
    let span = &text[open..=close];
    Some((span, span))
}
