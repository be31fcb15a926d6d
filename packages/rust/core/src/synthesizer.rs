//! Grounded answer synthesis.
//!
//! Builds one constrained prompt from the question and the retrieved
//! snippets, asks the completion service for remediation steps, and appends
//! a "Useful Links" block only when the reply is substantive.

use std::collections::HashSet;

use tracing::{debug, instrument};

use incidentqa_completion::{ChatMessage, CompletionClient};
use incidentqa_shared::{Answer, AnswerKind, DocSnippet, Result, SourceLink};

/// Phrase the model is told to answer with when the snippets do not help.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information available.";

/// Replies containing any of these are not substantive.
const SENTINEL_PHRASES: [&str; 2] = ["no relevant information available", "i don't know"];

/// Heading of the appended link block.
pub const LINKS_HEADING: &str = "**Useful Links**";

/// Label used for the log search link.
const SEARCH_LINK_LABEL: &str = "Log search";

const SYSTEM_PROMPT: &str = "You are a helpful assistant that uses internal documentation \
to answer incident questions. You only use the documentation snippets you are given.";

/// Build the user prompt embedding snippets, question and grounding rules.
pub(crate) fn build_prompt(question: &str, snippets: &[DocSnippet]) -> String {
    let context = if snippets.is_empty() {
        "(no documentation snippets were found)".to_string()
    } else {
        snippets
            .iter()
            .map(DocSnippet::context_line)
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Documentation snippets:
{context}

User query:
{question}

Instructions:
- Using only the documentation snippets above, narrate clear steps for resolving the issue.
- Present the steps in a simple, easy-to-follow manner, suitable for someone without technical expertise.
- Share every step mentioned in the relevant snippets.
- If the snippets contain no relevant information, respond with exactly "{NO_RELEVANT_INFORMATION}"
- Never ask the user to wait or to check back later.
- Do not add a list of links; links are attached separately."#
    )
}

/// Whether a completion reply is a real answer rather than a sentinel.
pub fn is_substantive(text: &str) -> bool {
    let normalized = text.to_lowercase().replace('\u{2019}', "'");
    !SENTINEL_PHRASES
        .iter()
        .any(|phrase| normalized.contains(phrase))
}

/// Source links for snippets that resolved to a page, de-duplicated by URL.
pub fn doc_links(snippets: &[DocSnippet]) -> Vec<SourceLink> {
    let mut seen = HashSet::new();
    snippets
        .iter()
        .filter_map(|s| {
            let url = s.source_url.as_ref()?;
            seen.insert(url.clone()).then(|| SourceLink {
                label: s.title.clone(),
                url: url.clone(),
            })
        })
        .collect()
}

/// Render the fixed-format link block.
fn render_links(links: &[SourceLink]) -> String {
    let mut block = String::from(LINKS_HEADING);
    for link in links {
        block.push_str(&format!("\n- [{}]({})", link.label, link.url));
    }
    block
}

/// Produces the final answer from question and context.
#[derive(Debug, Clone)]
pub struct ResponseSynthesizer {
    completion: CompletionClient,
}

impl ResponseSynthesizer {
    pub fn new(completion: CompletionClient) -> Self {
        Self { completion }
    }

    /// Synthesize an answer. Completion failures are returned as-is.
    #[instrument(skip_all, fields(snippets = snippets.len()))]
    pub async fn synthesize(
        &self,
        question: &str,
        snippets: &[DocSnippet],
        search_link: Option<&str>,
        doc_links: &[SourceLink],
    ) -> Result<Answer> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(question, snippets)),
        ];
        let completion = self.completion.complete(&messages).await?;
        let text = completion.text.trim().to_string();

        if !is_substantive(&text) {
            debug!("completion reported no relevant information");
            return Ok(Answer::plain(AnswerKind::NoRelevantInformation, text));
        }

        let mut links = Vec::new();
        if let Some(url) = search_link {
            links.push(SourceLink {
                label: SEARCH_LINK_LABEL.to_string(),
                url: url.to_string(),
            });
        }
        for link in doc_links {
            if !links.iter().any(|l| l.url == link.url) {
                links.push(link.clone());
            }
        }

        let text = if links.is_empty() {
            text
        } else {
            format!("{text}\n\n{}", render_links(&links))
        };

        Ok(Answer {
            kind: AnswerKind::Synthesized,
            text,
            sources: links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(title: &str, url: Option<&str>) -> DocSnippet {
        DocSnippet {
            keyword: "parser".into(),
            title: title.into(),
            body_text: format!("{title} body"),
            source_url: url.map(String::from),
        }
    }

    #[test]
    fn prompt_contains_context_question_and_rules() {
        let prompt = build_prompt(
            "How do I fix err001?",
            &[snippet("Runbook", None), snippet("FAQ", None)],
        );
        assert!(prompt.contains("Runbook: Runbook body\nFAQ: FAQ body"));
        assert!(prompt.contains("User query:\nHow do I fix err001?"));
        assert!(prompt.contains(NO_RELEVANT_INFORMATION));
        assert!(prompt.contains("Never ask the user to wait"));
    }

    #[test]
    fn prompt_marks_missing_context() {
        let prompt = build_prompt("q", &[]);
        assert!(prompt.contains("(no documentation snippets were found)"));
    }

    #[test]
    fn sentinel_detection() {
        assert!(!is_substantive("No relevant information available."));
        assert!(!is_substantive("I don’t know."));
        assert!(!is_substantive("Sorry, i DON'T KNOW"));
        assert!(is_substantive("1. Restart the parser deployment."));
    }

    #[test]
    fn doc_links_skip_missing_and_duplicate_urls() {
        let links = doc_links(&[
            snippet("A", Some("https://wiki/a")),
            snippet("B", None),
            snippet("A again", Some("https://wiki/a")),
            snippet("C", Some("https://wiki/c")),
        ]);
        assert_eq!(
            links,
            vec![
                SourceLink { label: "A".into(), url: "https://wiki/a".into() },
                SourceLink { label: "C".into(), url: "https://wiki/c".into() },
            ]
        );
    }

    #[test]
    fn links_block_format() {
        let block = render_links(&[
            SourceLink { label: "Log search".into(), url: "https://splunk/s?sid=1".into() },
            SourceLink { label: "Runbook".into(), url: "https://wiki/r".into() },
        ]);
        assert_eq!(
            block,
            "**Useful Links**\n- [Log search](https://splunk/s?sid=1)\n- [Runbook](https://wiki/r)"
        );
    }
}
