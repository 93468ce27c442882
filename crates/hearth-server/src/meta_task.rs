//! Meta-task chat-history unwrapping for `POST /process-conversation`
//! (`spec.md §6.1`). Ported in semantics from
//! `original_source/app/conversation_utils/message_parser.py`'s
//! `parse_openwebui_query`: OpenWebUI-style clients sometimes wrap the actual
//! conversation in a templated prompt asking for something else entirely
//! (tag generation, a title, …) with the real turns embedded as
//! `### Chat History: <chat_history>USER: ... ASSISTANT: ...</chat_history>`.

use hearth_context::Turn;
use regex::Regex;
use std::sync::OnceLock;

fn chat_history_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)### Chat History:\s*<chat_history>(.*?)</chat_history>").expect("static regex is valid")
    })
}

fn role_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(USER:|ASSISTANT:)").expect("static regex is valid"))
}

/// How the conversation turns were recovered from the raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// The payload was already a plain user utterance.
    Direct,
    /// A `### Chat History: <chat_history>...</chat_history>` wrapper was unwrapped.
    MetaTask,
    /// `USER:`/`ASSISTANT:` markers were present without the meta-task wrapper.
    SimpleChat,
}

/// Turns recovered from a raw payload, split into history and the current turn.
#[derive(Debug, Clone)]
pub struct ParsedConversation {
    /// Every turn in order, including the final user turn.
    pub turns: Vec<Turn>,
    pub method: ExtractionMethod,
}

impl ParsedConversation {
    /// The last `user` turn's content, which drives the retrieval pipeline.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.turns.iter().rev().find(|turn| turn.role == "user").map(|turn| turn.content.as_str())
    }

    /// Every turn before the last user turn, used as `conversation_history`.
    #[must_use]
    pub fn history_before_last_user(&self) -> Vec<Turn> {
        let Some(last_user_index) = self.turns.iter().rposition(|turn| turn.role == "user") else {
            return Vec::new();
        };
        self.turns[..last_user_index].to_vec()
    }
}

/// Split a `USER:`/`ASSISTANT:`-delimited block into ordered turns.
fn extract_chat_messages(content: &str) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut current_role: Option<&str> = None;
    let mut last_end = 0;

    let markers: Vec<_> = role_marker_regex().find_iter(content).collect();
    for (i, marker) in markers.iter().enumerate() {
        if let Some(role) = current_role {
            let segment = content[last_end..marker.start()].trim();
            if !segment.is_empty() {
                let normalized: Vec<&str> = segment.split_whitespace().collect();
                turns.push(Turn { role: role.to_string(), content: normalized.join(" ") });
            }
        }
        current_role = Some(if marker.as_str().eq_ignore_ascii_case("USER:") { "user" } else { "assistant" });
        last_end = marker.end();
        if i == markers.len() - 1 {
            if let Some(role) = current_role {
                let segment = content[last_end..].trim();
                if !segment.is_empty() {
                    let normalized: Vec<&str> = segment.split_whitespace().collect();
                    turns.push(Turn { role: role.to_string(), content: normalized.join(" ") });
                }
            }
        }
    }
    turns
}

/// Parse a raw payload string into ordered conversation turns, unwrapping a
/// meta-task template if one is present.
#[must_use]
pub fn parse(raw: &str) -> ParsedConversation {
    if raw.contains("### Task:") && raw.contains("### Chat History:") {
        if let Some(captures) = chat_history_regex().captures(raw) {
            let chat_content = captures.get(1).map_or("", |m| m.as_str()).trim();
            let turns = extract_chat_messages(chat_content);
            if !turns.is_empty() {
                return ParsedConversation { turns, method: ExtractionMethod::MetaTask };
            }
        }
        if let Some(tail) = raw.split("### Chat History:").nth(1) {
            let turns = extract_chat_messages(tail.trim());
            if !turns.is_empty() {
                return ParsedConversation { turns, method: ExtractionMethod::MetaTask };
            }
        }
    }

    if raw.to_uppercase().contains("USER:") || raw.to_uppercase().contains("ASSISTANT:") {
        let turns = extract_chat_messages(raw);
        if !turns.is_empty() {
            return ParsedConversation { turns, method: ExtractionMethod::SimpleChat };
        }
    }

    ParsedConversation {
        turns: vec![Turn { role: "user".to_string(), content: raw.trim().to_string() }],
        method: ExtractionMethod::Direct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_query_passes_through_unchanged() {
        let parsed = parse("Mekkora a nedvesség a kertben?");
        assert_eq!(parsed.method, ExtractionMethod::Direct);
        assert_eq!(parsed.last_user_message(), Some("Mekkora a nedvesség a kertben?"));
        assert!(parsed.history_before_last_user().is_empty());
    }

    #[test]
    fn simple_chat_format_without_wrapper_is_split_into_turns() {
        let parsed = parse("USER: Hány fok van? ASSISTANT: 23. USER: És kint?");
        assert_eq!(parsed.method, ExtractionMethod::SimpleChat);
        assert_eq!(parsed.last_user_message(), Some("És kint?"));
        let history = parsed.history_before_last_user();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "assistant");
    }

    #[test]
    fn meta_task_wrapper_is_unwrapped_to_the_last_user_turn() {
        let raw = "### Task: Generate tags for this conversation ### Chat History: <chat_history>USER: Hány fok van? ASSISTANT: 23. USER: És kint?</chat_history>";
        let parsed = parse(raw);
        assert_eq!(parsed.method, ExtractionMethod::MetaTask);
        assert_eq!(parsed.last_user_message(), Some("És kint?"));
        assert_eq!(parsed.history_before_last_user().len(), 2);
    }

    #[test]
    fn meta_task_wrapper_without_xml_tags_falls_back_to_suffix_split() {
        let raw = "### Task: Generate tags ### Chat History: USER: Hány fok van? ASSISTANT: 23.";
        let parsed = parse(raw);
        assert_eq!(parsed.method, ExtractionMethod::MetaTask);
        assert_eq!(parsed.last_user_message(), Some("Hány fok van?"));
    }
}
