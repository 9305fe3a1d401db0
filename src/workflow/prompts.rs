//! Prompt templates and the text formatting the steps feed into them
//!
//! - Planner: query → JSON array of sub-questions (smart tier)
//! - Summarizer: paper excerpt → 3-4 sentence summary (fast tier)
//! - Writer: plan + summaries + retrieved context → cited report (smart tier)

use crate::tools::truncate_chars;
use crate::vector::ChunkMatch;

use super::state::DocumentInfo;

/// Marker appended to writer context cut at the character budget
pub const CONTEXT_TRUNCATED: &str = "\n\n[Additional context truncated]";

/// Marker appended to paper text cut before summarization
pub const TEXT_TRUNCATED: &str = "\n\n[Text truncated for length]";

/// Writer context when no vector index is configured
pub const NO_VECTOR_CONTEXT: &str = "No vector search available - using paper summaries only.";

/// Summaries block when no paper made it through processing
pub const NO_SUMMARIES: &str = "No papers were successfully processed.";

/// Prompt templates for the research workflow
pub struct ResearchPrompts;

impl ResearchPrompts {
    pub fn planner_system() -> &'static str {
        r#"You are a senior research director planning a literature review.

Break the research goal into specific questions that can each be answered by searching academic papers on arXiv.

Rules:
1. Produce between 3 and 5 distinct questions
2. Order them from foundational to advanced
3. Make every question concrete enough to return relevant search results
4. Cover different aspects of the goal
5. Do not answer the questions

Reply with a JSON array of strings and nothing else."#
    }

    pub fn planner_user(query: &str) -> String {
        format!(
            "Research goal: {query}\n\nList 3-5 searchable academic questions for this goal as a JSON array:"
        )
    }

    /// Summarization prompt over at most `max_chars` characters of `text`.
    pub fn summary(text: &str, max_chars: usize) -> String {
        let mut excerpt = truncate_chars(text, max_chars).to_string();
        if excerpt.len() < text.len() {
            excerpt.push_str(TEXT_TRUNCATED);
        }

        format!(
            r#"Summarize the following research paper excerpt in 3-4 sentences.

Cover:
- the problem or research question
- the method or approach
- the key findings or contributions

Paper excerpt:
{excerpt}

Summary:"#
        )
    }

    pub fn writer_system() -> &'static str {
        r#"You are an academic writer who synthesizes research papers into clear, well-organized reports.

Your reports:
1. Answer the original research question directly
2. Combine findings across papers rather than listing them one by one
3. Cite every claim with a markdown link to the paper: [Paper Title](pdf_url)
4. Use precise, professional language
5. Are organized under markdown headers"#
    }

    pub fn writer_user(query: &str, plan: &str, summaries: &str, context: &str) -> String {
        format!(
            r#"Write a research report from the material below.

## Research Question
{query}

## Questions Investigated
{plan}

## Paper Summaries
{summaries}

## Retrieved Passages
{context}

---

The report must:
1. Open with an executive summary
2. Give each major finding its own section
3. Cite papers inline as markdown links to their PDFs
4. End with a "References" section listing every cited paper
5. Use markdown headers, bullet points and bold key terms

Report:"#
        )
    }
}

// =============================================================================
// FORMATTING HELPERS
// =============================================================================

/// Numbered list of sub-questions.
pub fn format_plan(plan: &[String]) -> String {
    plan.iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Title link, first three authors, and summary for each document.
pub fn format_summaries(documents: &[DocumentInfo]) -> String {
    if documents.is_empty() {
        return NO_SUMMARIES.to_string();
    }

    documents
        .iter()
        .map(|doc| {
            let authors = if doc.authors.is_empty() {
                "Unknown".to_string()
            } else {
                doc.authors.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
            };
            format!(
                "### [{}]({})\n**Authors:** {}\n\n{}",
                doc.title, doc.pdf_url, authors, doc.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Retrieved chunks with their source titles, cut to `max_chars`.
pub fn format_context(chunks: &[ChunkMatch], max_chars: usize) -> String {
    let joined = chunks
        .iter()
        .map(|c| format!("**Source:** {}\n\n{}", c.metadata.title, c.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let cut = truncate_chars(&joined, max_chars);
    if cut.len() < joined.len() {
        format!("{}{}", cut, CONTEXT_TRUNCATED)
    } else {
        joined
    }
}

/// Report assembled from summaries alone, used when synthesis fails.
pub fn fallback_report(query: &str, documents: &[DocumentInfo]) -> String {
    let mut report = format!(
        "# Research Report: {}\n\n## Summary\n\nThe full report could not be generated. These are the summaries of the papers that were found:\n\n",
        query
    );
    for doc in documents {
        report.push_str(&format!(
            "### [{}]({})\n\n{}\n\n---\n\n",
            doc.title, doc.pdf_url, doc.summary
        ));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::ChunkMetadata;

    fn doc(title: &str, authors: &[&str]) -> DocumentInfo {
        DocumentInfo {
            title: title.to_string(),
            summary: format!("{} summary.", title),
            pdf_url: format!("https://arxiv.org/pdf/{}", title),
            arxiv_id: title.to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn chunk(title: &str, text: &str) -> ChunkMatch {
        ChunkMatch {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source_url: String::new(),
                title: title.to_string(),
                doc_id: title.to_string(),
                chunk_index: 0,
            },
            distance: 0.1,
        }
    }

    #[test]
    fn test_format_plan() {
        let plan = vec!["What is QEC?".to_string(), "What are surface codes?".to_string()];
        assert_eq!(format_plan(&plan), "1. What is QEC?\n2. What are surface codes?");
    }

    #[test]
    fn test_format_summaries_limits_authors() {
        let text = format_summaries(&[doc("Paper", &["A", "B", "C", "D"])]);
        assert!(text.starts_with("### [Paper](https://arxiv.org/pdf/Paper)"));
        assert!(text.contains("**Authors:** A, B, C\n"));
        assert!(!text.contains('D'));
    }

    #[test]
    fn test_format_summaries_unknown_authors_and_empty() {
        assert!(format_summaries(&[doc("P", &[])]).contains("**Authors:** Unknown"));
        assert_eq!(format_summaries(&[]), NO_SUMMARIES);
    }

    #[test]
    fn test_format_context_truncates() {
        let chunks = vec![chunk("One", &"x".repeat(100)), chunk("Two", "short")];

        let full = format_context(&chunks, 10_000);
        assert!(full.contains("**Source:** Two\n\nshort"));
        assert!(full.contains("\n\n---\n\n"));
        assert!(!full.ends_with(CONTEXT_TRUNCATED));

        let cut = format_context(&chunks, 50);
        assert!(cut.ends_with(CONTEXT_TRUNCATED));
        assert_eq!(cut.len(), 50 + CONTEXT_TRUNCATED.len());
    }

    #[test]
    fn test_summary_prompt_marks_truncation() {
        assert!(!ResearchPrompts::summary("short text", 100).contains(TEXT_TRUNCATED));

        let prompt = ResearchPrompts::summary(&"y".repeat(200), 100);
        assert!(prompt.contains(TEXT_TRUNCATED));
        assert!(!prompt.contains(&"y".repeat(101)));
    }

    #[test]
    fn test_fallback_report_lists_every_title() {
        let docs = vec![doc("Alpha", &[]), doc("Beta", &[])];
        let report = fallback_report("quantum error correction", &docs);

        assert!(report.starts_with("# Research Report: quantum error correction"));
        assert!(report.contains("[Alpha](https://arxiv.org/pdf/Alpha)"));
        assert!(report.contains("Beta summary."));
    }

    #[test]
    fn test_user_prompts_embed_inputs() {
        assert!(ResearchPrompts::planner_user("graph neural networks").contains("graph neural networks"));
        let writer = ResearchPrompts::writer_user("Q", "1. a", "SUMS", "CTX");
        assert!(writer.contains("SUMS") && writer.contains("CTX") && writer.contains("1. a"));
    }
}
