//! Prompt templates

/// Built-in referee assistant prompt. Placeholders: `{query}`, `{context}`.
pub const REFEREE_PROMPT: &str = "\
You are an assistant to a referee of a competitive game. Answer the user's \
question using only the rule fragments below. Never invent rules, numbers or \
penalties that are not present in the fragments. If the fragments do not \
cover the question, say that the rules provided do not answer it.

User question:
{query}

Relevant rule fragments:
{context}
";

/// Substitute `{query}` and `{context}` into `template`.
///
/// Placeholders are replaced in one pass, so braces inside the question or
/// the rule text are left alone.
#[must_use]
pub fn render_prompt(template: &str, query: &str, context: &str) -> String {
    let mut out = String::with_capacity(template.len() + query.len() + context.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if let Some(after) = tail.strip_prefix("{query}") {
            out.push_str(query);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_both_placeholders() {
        let prompt = render_prompt(REFEREE_PROMPT, "How many players?", "1.1. Ten players");
        assert!(prompt.contains("User question:\nHow many players?\n"));
        assert!(prompt.contains("Relevant rule fragments:\n1.1. Ten players\n"));
        assert!(!prompt.contains("{query}"));
        assert!(!prompt.contains("{context}"));
    }

    #[test]
    fn test_placeholders_in_input_are_not_expanded() {
        let prompt = render_prompt("Q={query} C={context}", "what is {context}?", "{x}");
        assert_eq!(prompt, "Q=what is {context}? C={x}");
    }

    #[test]
    fn test_empty_context() {
        assert_eq!(render_prompt("[{context}]", "q", ""), "[]");
    }

    #[test]
    fn test_other_braces_kept() {
        assert_eq!(render_prompt("{\"a\": {query}}", "1", ""), "{\"a\": 1}");
    }
}
