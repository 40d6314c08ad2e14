//! Chat prompt assembly.

use crate::retrieval::RetrievedContext;

/// Build the full prompt for one chat turn.
///
/// Layout, with empty sections dropped so no stray blank blocks appear:
///
/// ```text
/// Conversation History:
/// <history>
///
/// <user context>
///
/// <knowledge context>
///
/// User: <message>
///
/// Assistant:
/// ```
pub fn build_chat_prompt(context: &RetrievedContext, message: &str) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !context.conversation_history.is_empty() {
        sections.push(format!(
            "Conversation History:\n{}",
            context.conversation_history
        ));
    }
    if !context.user_context.is_empty() {
        sections.push(context.user_context.clone());
    }
    if !context.knowledge_context.is_empty() {
        sections.push(context.knowledge_context.clone());
    }
    sections.push(format!("User: {message}"));
    sections.push("Assistant:".to_string());

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_context_renders_all_sections() {
        let ctx = RetrievedContext {
            conversation_history: "User: hi\n\nAssistant: hello".into(),
            knowledge_context: "Relevant Knowledge:\n1. rust is fast".into(),
            user_context: "User Information:\nFact: my name is Ada".into(),
        };
        let prompt = build_chat_prompt(&ctx, "what next?");
        assert_eq!(
            prompt,
            "Conversation History:\nUser: hi\n\nAssistant: hello\n\n\
             User Information:\nFact: my name is Ada\n\n\
             Relevant Knowledge:\n1. rust is fast\n\n\
             User: what next?\n\n\
             Assistant:"
        );
    }

    #[test]
    fn empty_sections_are_dropped() {
        let prompt = build_chat_prompt(&RetrievedContext::default(), "hello");
        assert_eq!(prompt, "User: hello\n\nAssistant:");
    }

    #[test]
    fn history_only() {
        let ctx = RetrievedContext {
            conversation_history: "User: hi".into(),
            ..Default::default()
        };
        let prompt = build_chat_prompt(&ctx, "again");
        assert_eq!(
            prompt,
            "Conversation History:\nUser: hi\n\nUser: again\n\nAssistant:"
        );
    }
}
