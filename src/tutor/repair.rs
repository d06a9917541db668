//! Reply repair for malformed backend output.
//!
//! The backend is instructed to answer with a bare 4-field JSON object, but
//! generative output is not trusted to be well-formed: replies arrive
//! wrapped in markdown fences (`` ```json ... ``` ``), or as plain prose
//! with no JSON at all. This module strips the fence wrapping, tries to
//! parse the fixed schema, and on failure degrades instead of erroring:
//! the text becomes the `russian` field and every annotation is `None`.
//! Parsing therefore never fails; only transport can.

use tracing::warn;

use super::protocol::TutorResponse;

/// Remove markdown code fences from around the reply body.
///
/// Handles `` ```json\n...\n``` `` (tag case ignored) and plain `` ``` ``
/// fences plus surrounding whitespace; anything unfenced passes through
/// trimmed.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();

    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = match after_open.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &after_open[4..],
        _ => after_open,
    };
    let after_open = after_open.strip_prefix('\n').unwrap_or(after_open);

    match after_open.trim_end().strip_suffix("```") {
        Some(stripped) => stripped.trim(),
        None => after_open.trim(),
    }
}

/// Parse a raw backend reply into a [`TutorResponse`], degrading on failure.
///
/// Never returns an error: if the text is not the expected JSON object
/// (or is JSON without a `russian` string), the whole fence-stripped text
/// is treated as the Russian reply and the annotations are dropped.
pub fn parse_reply(raw: &str) -> TutorResponse {
    let body = strip_code_fences(raw);

    match serde_json::from_str::<TutorResponse>(body) {
        Ok(reply) => reply,
        Err(err) => {
            warn!("Tutor reply did not match schema ({err}), using degraded response");
            TutorResponse {
                russian: body.to_string(),
                english_feedback: None,
                transliteration: None,
                topic_alignment: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_json_fence() {
        let input = "```json\n{\"russian\": \"Привет\"}\n```";
        assert_eq!(strip_code_fences(input), "{\"russian\": \"Привет\"}");
    }

    #[test]
    fn strip_plain_fence() {
        let input = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn unfenced_passes_through_trimmed() {
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn fence_tag_case_is_ignored() {
        let input = "```JSON\n{\"russian\":\"Да\"}\n```";
        assert_eq!(strip_code_fences(input), "{\"russian\":\"Да\"}");

        let reply = parse_reply(input);
        assert_eq!(reply.russian, "Да");
    }

    #[test]
    fn fence_without_closing() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn fenced_valid_json_parses_to_embedded_reply() {
        let raw = "```json\n{\"russian\":\"Привет! Как дела?\",\"english_feedback\":null,\"transliteration\":\"Privet! Kak dela?\",\"topic_alignment\":\"Greetings\"}\n```";
        let reply = parse_reply(raw);
        assert_eq!(reply.russian, "Привет! Как дела?");
        assert_eq!(reply.english_feedback, None);
        assert_eq!(reply.transliteration.as_deref(), Some("Privet! Kak dela?"));
        assert_eq!(reply.topic_alignment.as_deref(), Some("Greetings"));
    }

    #[test]
    fn non_json_text_degrades() {
        let reply = parse_reply("Извини, я не понял твой вопрос.");
        assert_eq!(reply.russian, "Извини, я не понял твой вопрос.");
        assert_eq!(reply.english_feedback, None);
        assert_eq!(reply.transliteration, None);
        assert_eq!(reply.topic_alignment, None);
    }

    #[test]
    fn json_without_russian_field_degrades() {
        let raw = r#"{"reply": "Привет"}"#;
        let reply = parse_reply(raw);
        assert_eq!(reply.russian, raw);
        assert_eq!(reply.transliteration, None);
    }

    #[test]
    fn fenced_non_json_degrades_to_stripped_text() {
        let reply = parse_reply("```\nПросто текст без JSON\n```");
        assert_eq!(reply.russian, "Просто текст без JSON");
    }

    #[test]
    fn missing_optional_fields_default_to_none() {
        let reply = parse_reply(r#"{"russian":"Да","english_feedback":"Use «да», not «до»"}"#);
        assert_eq!(reply.russian, "Да");
        assert_eq!(reply.english_feedback.as_deref(), Some("Use «да», not «до»"));
        assert_eq!(reply.transliteration, None);
    }
}
