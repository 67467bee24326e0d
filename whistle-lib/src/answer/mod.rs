//! Retrieval-augmented answering
//!
//! For each question the [`Orchestrator`] retrieves the top-k rule fragments,
//! renders them into a context block, fills the prompt template, calls the
//! language model once and attaches the paragraph ids of the fragments it
//! retrieved as citations.
//!
//! Nothing is retried here; search and LLM failures propagate to the caller,
//! which shows [`FAILURE_NOTICE`] to the user.

use crate::config::Settings;
use crate::llm::prompt::{render_prompt, REFEREE_PROMPT};
use crate::llm::{LlmAnswer, LlmClient};
use crate::store::{FragmentSearch, SearchResult};
use crate::Result;

/// Default number of fragments retrieved per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Default heading above the cited paragraph ids.
pub const DEFAULT_CITATION_LABEL: &str = "Relevant rule paragraphs:";

/// Reply shown to the user when answering fails for any reason.
pub const FAILURE_NOTICE: &str =
    "Sorry, I could not answer this question right now. Please try again later.";

/// A composed answer with its citations.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub answer: LlmAnswer,
    /// Paragraph ids of the retrieved fragments, in search order
    pub cited_paragraphs: Vec<String>,
    /// The context block the model was given
    pub context: String,
}

impl Answer {
    /// Render the reply text sent back to the user.
    ///
    /// ```text
    /// <answer>
    ///
    /// <label>
    /// 6.1, 6.2
    /// ```
    ///
    /// With `include_context`, the fragments the answer was based on are
    /// listed as bullets before the citations.
    #[must_use]
    pub fn render(&self, label: &str, include_context: bool) -> String {
        let citations = format!("{label}\n{}", self.cited_paragraphs.join(", "));

        if include_context {
            let bullets = self
                .context
                .lines()
                .map(|line| format!("\t• {line}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "{}\n\nBased on these rule fragments:\n{bullets}\n\n{citations}",
                self.answer
            )
        } else {
            format!("{}\n\n{citations}", self.answer)
        }
    }
}

/// Render one search result as a context entry: breadcrumb, then text.
#[must_use]
pub fn render_fragment(result: &SearchResult) -> String {
    format!("{}\n{}", result.metadata.full_path, result.content)
}

/// Ties fragment search and the language model together.
pub struct Orchestrator<S: FragmentSearch, L: LlmClient> {
    search: S,
    llm: L,
    top_k: usize,
    template: String,
    citation_label: String,
    include_context: bool,
}

impl<S: FragmentSearch, L: LlmClient> Orchestrator<S, L> {
    /// Create an orchestrator with the built-in prompt and defaults.
    #[must_use]
    pub fn new(search: S, llm: L) -> Self {
        Self {
            search,
            llm,
            top_k: DEFAULT_TOP_K,
            template: REFEREE_PROMPT.to_string(),
            citation_label: DEFAULT_CITATION_LABEL.to_string(),
            include_context: false,
        }
    }

    /// Create an orchestrator configured from the `bot` and `llm` sections.
    #[must_use]
    pub fn from_settings(search: S, llm: L, settings: &Settings) -> Self {
        let mut orchestrator = Self::new(search, llm)
            .with_top_k(settings.bot.top_k)
            .with_citation_label(&settings.bot.citation_label)
            .with_include_context(settings.bot.include_context);
        if let Some(template) = &settings.llm.prompt_template {
            orchestrator = orchestrator.with_template(template);
        }
        orchestrator
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Replace the prompt; `{query}` and `{context}` are substituted.
    #[must_use]
    pub fn with_template(mut self, template: &str) -> Self {
        self.template = template.to_string();
        self
    }

    #[must_use]
    pub fn with_citation_label(mut self, label: &str) -> Self {
        self.citation_label = label.to_string();
        self
    }

    #[must_use]
    pub fn with_include_context(mut self, include_context: bool) -> Self {
        self.include_context = include_context;
        self
    }

    /// Returns a reference to the search backend.
    #[must_use]
    pub fn search(&self) -> &S {
        &self.search
    }

    /// Answer `query` from the top-k retrieved fragments.
    ///
    /// An empty search result is not an error: the model is still called,
    /// with an empty context, and is expected to say it cannot answer.
    pub fn answer(&self, query: &str) -> Result<Answer> {
        let results = self.search.search(query, self.top_k)?;
        if results.is_empty() {
            tracing::warn!(query, "no fragments found, asking without context");
        }

        let context = results
            .iter()
            .map(render_fragment)
            .collect::<Vec<_>>()
            .join("\n");
        tracing::debug!(query, %context, "built context");

        let prompt = render_prompt(&self.template, query, &context);
        let raw = self.llm.complete(&prompt)?;

        Ok(Answer {
            answer: LlmAnswer::parse(&raw),
            cited_paragraphs: results.into_iter().map(|r| r.metadata.paragraph).collect(),
            context,
        })
    }

    /// Answer a chat message and render the reply text.
    pub fn handle_question(&self, text: &str) -> Result<String> {
        let answer = self
            .answer(text)
            .inspect_err(|e| tracing::error!(error = %e, "failed to answer question"))?;
        Ok(answer.render(&self.citation_label, self.include_context))
    }

    /// Reply text for a chat message; any failure becomes [`FAILURE_NOTICE`].
    ///
    /// The error itself is logged by [`handle_question`](Self::handle_question)
    /// and never reaches the user.
    #[must_use]
    pub fn reply(&self, text: &str) -> String {
        self.handle_question(text)
            .unwrap_or_else(|_| FAILURE_NOTICE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::fragment::RecordMetadata;
    use crate::Error;

    struct FixedSearch(Vec<SearchResult>);

    impl FragmentSearch for FixedSearch {
        fn search(&self, _query: &str, k: usize) -> Result<Vec<SearchResult>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct FailingSearch;

    impl FragmentSearch for FailingSearch {
        fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchResult>> {
            Err(Error::Connectivity("store down".to_string()))
        }
    }

    struct FailingLlm;

    impl LlmClient for FailingLlm {
        fn complete(&self, _prompt: &str) -> Result<String> {
            Err(Error::Llm("endpoint returned 401: secret-key-rejected".to_string()))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    /// Returns a canned reply and records every prompt it was sent.
    struct ScriptedLlm {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl LlmClient for &ScriptedLlm {
        fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn result(paragraph: &str, full_path: &str, content: &str) -> SearchResult {
        SearchResult {
            content: content.to_string(),
            metadata: RecordMetadata {
                paragraph: paragraph.to_string(),
                full_path: full_path.to_string(),
            },
            relevance_score: 0.9,
        }
    }

    fn fixtures() -> Vec<SearchResult> {
        vec![
            result("6.1", "6. Violations", "A foul is awarded for gestures."),
            result("6.2", "6. Violations", "Four fouls remove a player."),
            result("6.1", "6. Violations", "Repeated on purpose."),
            result("7.1", "7. Voting", "Votes are counted aloud."),
        ]
    }

    #[test]
    fn test_citations_align_with_search_order() {
        let llm = ScriptedLlm::new("Four fouls.");
        let orchestrator = Orchestrator::new(FixedSearch(fixtures()), &llm);

        let answer = orchestrator.answer("How many fouls?").unwrap();
        assert_eq!(answer.cited_paragraphs, vec!["6.1", "6.2", "6.1"]);
        assert_eq!(answer.answer, LlmAnswer::Text("Four fouls.".to_string()));
    }

    #[test]
    fn test_prompt_contains_query_and_context() {
        let llm = ScriptedLlm::new("ok");
        let orchestrator = Orchestrator::new(FixedSearch(fixtures()), &llm)
            .with_top_k(2)
            .with_template("Q: {query}\nC:\n{context}");

        let answer = orchestrator.answer("fouls?").unwrap();
        let expected_context = "6. Violations\nA foul is awarded for gestures.\n\
                                6. Violations\nFour fouls remove a player.";
        assert_eq!(answer.context, expected_context);
        assert_eq!(llm.prompts(), vec![format!("Q: fouls?\nC:\n{expected_context}")]);
    }

    #[test]
    fn test_empty_results_still_call_llm() {
        let llm = ScriptedLlm::new("The rules do not cover this.");
        let orchestrator = Orchestrator::new(FixedSearch(vec![]), &llm);

        let answer = orchestrator.answer("Who wins at chess?").unwrap();
        assert!(answer.cited_paragraphs.is_empty());
        assert_eq!(answer.context, "");
        assert_eq!(llm.prompts().len(), 1);
    }

    #[test]
    fn test_json_reply_is_parsed() {
        let llm = ScriptedLlm::new(r#"{"answer": "Four"}"#);
        let orchestrator = Orchestrator::new(FixedSearch(fixtures()), &llm);

        let answer = orchestrator.answer("How many fouls?").unwrap();
        assert!(matches!(answer.answer, LlmAnswer::Json(_)));
    }

    #[test]
    fn test_render_without_context() {
        let answer = Answer {
            answer: LlmAnswer::Text("Four fouls.".to_string()),
            cited_paragraphs: vec!["6.1".to_string(), "6.2".to_string()],
            context: "6. Violations\nFour fouls remove a player.".to_string(),
        };
        assert_eq!(
            answer.render("Rules:", false),
            "Four fouls.\n\nRules:\n6.1, 6.2"
        );
    }

    #[test]
    fn test_render_with_context() {
        let answer = Answer {
            answer: LlmAnswer::Text("Four fouls.".to_string()),
            cited_paragraphs: vec!["6.2".to_string()],
            context: "6. Violations\nFour fouls remove a player.".to_string(),
        };
        assert_eq!(
            answer.render("Rules:", true),
            "Four fouls.\n\nBased on these rule fragments:\n\
             \t• 6. Violations\n\t• Four fouls remove a player.\n\nRules:\n6.2"
        );
    }

    #[test]
    fn test_handle_question_uses_configured_label() {
        let llm = ScriptedLlm::new("Four fouls.");
        let orchestrator = Orchestrator::new(FixedSearch(fixtures()), &llm)
            .with_top_k(1)
            .with_citation_label("See:");

        let reply = orchestrator.handle_question("How many fouls?").unwrap();
        assert_eq!(reply, "Four fouls.\n\nSee:\n6.1");
    }

    #[test]
    fn test_search_failure_skips_llm() {
        let llm = ScriptedLlm::new("unused");
        let orchestrator = Orchestrator::new(FailingSearch, &llm);

        let err = orchestrator.handle_question("anything").unwrap_err();
        assert!(err.is_connectivity());
        assert!(llm.prompts().is_empty());
    }

    #[test]
    fn test_reply_hides_llm_failure() {
        let orchestrator = Orchestrator::new(FixedSearch(fixtures()), FailingLlm);

        let reply = orchestrator.reply("How many fouls?");
        assert_eq!(reply, FAILURE_NOTICE);
        assert!(!reply.contains("secret-key-rejected"));
        assert!(!reply.contains("401"));
    }

    #[test]
    fn test_reply_hides_search_failure() {
        let orchestrator = Orchestrator::new(FailingSearch, FailingLlm);

        let reply = orchestrator.reply("anything");
        assert_eq!(reply, FAILURE_NOTICE);
        assert!(!reply.contains("store down"));
    }

    #[test]
    fn test_reply_passes_answer_through() {
        let llm = ScriptedLlm::new("Four fouls.");
        let orchestrator = Orchestrator::new(FixedSearch(fixtures()), &llm).with_top_k(1);
        assert_eq!(orchestrator.reply("fouls?"), "Four fouls.\n\nRelevant rule paragraphs:\n6.1");
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.bot.top_k = 2;
        settings.bot.citation_label = "Paragraphs:".to_string();
        settings.llm.prompt_template = Some("{context}|{query}".to_string());

        let llm = ScriptedLlm::new("x");
        let orchestrator = Orchestrator::from_settings(FixedSearch(fixtures()), &llm, &settings);
        let reply = orchestrator.handle_question("q").unwrap();

        assert_eq!(reply, "x\n\nParagraphs:\n6.1, 6.2");
        assert!(llm.prompts()[0].ends_with("|q"));
    }
}
