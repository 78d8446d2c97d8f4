use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use swarm_models::VoteAction;

use crate::error::AgentError;

/// A specialist's answer as extracted from backend text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVote {
    pub action: VoteAction,
    /// Already clamped into [0, 1].
    pub confidence: Decimal,
    pub analysis: String,
}

/// Locate the vote object in free-form model output.
///
/// Candidates are tried in order: the whole answer, each fenced code block,
/// then every top-level `{...}` span in the prose. The first candidate that
/// parses as a JSON object carrying an `action` (or `vote`) key wins, so
/// braces quoted in the surrounding text do not shadow the real answer.
pub fn extract_vote_object(text: &str) -> Result<Map<String, Value>, AgentError> {
    let trimmed = text.trim();
    let fenced = fenced_blocks(trimmed);
    let spans = object_spans(trimmed);

    std::iter::once(trimmed)
        .chain(fenced)
        .chain(spans)
        .filter_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .find(|map| map.contains_key("action") || map.contains_key("vote"))
        .ok_or_else(|| {
            AgentError::Parse(format!(
                "No vote object found in response (length={})",
                text.len()
            ))
        })
}

/// Bodies of ``` fenced blocks, with an optional language tag dropped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    text.split("```")
        .skip(1)
        .step_by(2)
        .map(|block| match block.split_once('\n') {
            Some((tag, body)) if !tag.trim_start().starts_with('{') => body.trim(),
            _ => block.trim(),
        })
        .collect()
}

/// Every balanced top-level `{...}` span, ignoring braces inside strings.
fn object_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}

/// Confidence may arrive as a number, a numeric string or a percentage string.
fn parse_confidence(value: Option<&Value>) -> Result<Decimal, AgentError> {
    let raw = match value {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => {
            return Err(AgentError::Parse(format!("confidence is not numeric: {other}")))
        }
        None => return Err(AgentError::Parse("missing confidence".to_string())),
    };

    let (digits, scale) = match raw.strip_suffix('%') {
        Some(stripped) => (stripped.trim(), Decimal::ONE_HUNDRED),
        None => (raw.as_str(), Decimal::ONE),
    };
    let confidence = Decimal::from_str(digits)
        .or_else(|_| Decimal::from_scientific(digits))
        .map_err(|e| AgentError::Parse(format!("confidence {raw}: {e}")))?
        / scale;
    Ok(confidence.clamp(Decimal::ZERO, Decimal::ONE))
}

/// Parse `{action, confidence, analysis}` out of raw backend output.
///
/// Action spellings are lenient (`strong_buy`, `STRONG BUY`, `strong-buy`).
/// Confidence outside [0, 1] is clamped rather than rejected.
pub fn parse_vote(raw: &str) -> Result<ParsedVote, AgentError> {
    let object = extract_vote_object(raw)?;

    let action = object
        .get("action")
        .or_else(|| object.get("vote"))
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::Parse("action is not a string".to_string()))?;
    let action = VoteAction::from_str(action).map_err(AgentError::Parse)?;

    let confidence = parse_confidence(object.get("confidence"))?;

    let analysis = match object.get("analysis").or_else(|| object.get("reasoning")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Ok(ParsedVote {
        action,
        confidence,
        analysis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bare_object() {
        let object = extract_vote_object(r#"{"action": "BUY", "confidence": 0.75}"#).unwrap();
        assert_eq!(object["action"], "BUY");
    }

    #[test]
    fn fenced_with_and_without_tag() {
        let tagged = "Here is my view:\n```json\n{\"action\": \"SELL\"}\n```\nDone.";
        assert_eq!(extract_vote_object(tagged).unwrap()["action"], "SELL");

        let untagged = "Result:\n```\n{\"vote\": \"HOLD\"}\n```";
        assert_eq!(extract_vote_object(untagged).unwrap()["vote"], "HOLD");

        let inline = "```{\"action\": \"BUY\"}```";
        assert_eq!(extract_vote_object(inline).unwrap()["action"], "BUY");
    }

    #[test]
    fn object_inside_prose() {
        let input = "After weighing the tape:\n{\"action\": \"HOLD\", \"confidence\": 0.4} trailing";
        assert_eq!(extract_vote_object(input).unwrap()["confidence"], 0.4);
    }

    #[test]
    fn skips_objects_without_action() {
        let input = r#"Inputs were {"rsi": 71}. My call: {"action": "SELL", "confidence": 0.6}"#;
        assert_eq!(extract_vote_object(input).unwrap()["action"], "SELL");
    }

    #[test]
    fn braces_and_quotes_inside_strings() {
        let input = r#"note {"analysis": "range {low} to \"high}\"", "action": "BUY", "confidence": 0.5}"#;
        let object = extract_vote_object(input).unwrap();
        assert_eq!(object["analysis"], "range {low} to \"high}\"");
    }

    #[test]
    fn stray_closing_brace_does_not_panic() {
        let input = "} oops {\"action\": \"BUY\", \"confidence\": 1}";
        assert!(extract_vote_object(input).is_ok());
    }

    #[test]
    fn no_vote_object() {
        assert!(extract_vote_object("plain prose, no object").is_err());
        assert!(extract_vote_object(r#"{"confidence": 0.9}"#).is_err());
    }

    #[test]
    fn parse_full_vote() {
        let input = "```json\n{\"action\": \"strong-buy\", \"confidence\": \"0.82\", \"analysis\": \"Breakout on volume\"}\n```";
        let vote = parse_vote(input).unwrap();
        assert_eq!(vote.action, VoteAction::StrongBuy);
        assert_eq!(vote.confidence, dec!(0.82));
        assert_eq!(vote.analysis, "Breakout on volume");
    }

    #[test]
    fn lenient_spellings_and_clamping() {
        let vote = parse_vote(r#"{"action": "STRONG SELL", "confidence": 1.7}"#).unwrap();
        assert_eq!(vote.action, VoteAction::StrongSell);
        assert_eq!(vote.confidence, Decimal::ONE);

        let vote = parse_vote(r#"{"action": "hold", "confidence": -0.2}"#).unwrap();
        assert_eq!(vote.confidence, Decimal::ZERO);
        assert_eq!(vote.analysis, "");

        let vote = parse_vote(r#"{"vote": "buy", "confidence": "65%", "reasoning": "dip bought"}"#).unwrap();
        assert_eq!(vote.confidence, dec!(0.65));
        assert_eq!(vote.analysis, "dip bought");
    }

    #[test]
    fn unknown_action_or_bad_confidence_is_an_error() {
        assert!(parse_vote(r#"{"action": "moon", "confidence": 0.9}"#).is_err());
        assert!(parse_vote(r#"{"action": "BUY"}"#).is_err());
        assert!(parse_vote(r#"{"action": "BUY", "confidence": [1]}"#).is_err());
        assert!(parse_vote(r#"{"action": 3, "confidence": 0.5}"#).is_err());
    }
}
