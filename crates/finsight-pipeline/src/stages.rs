//! Prompt construction for the four analysis stages.
//!
//! Each stage is one LLM call: a fixed system prompt giving the stage its
//! role, and a user prompt assembled from the submitted query, the
//! document, web-search context, and earlier stage outputs.

use finsight_core::defaults::PROMPT_DOCUMENT_MAX_CHARS;
use finsight_core::{SearchHit, StageName, StageOutput};

/// Inputs available to a stage's prompt builder.
pub struct StageContext<'a> {
    /// The user's analysis query.
    pub query: &'a str,
    /// Original upload filename.
    pub file_name: &'a str,
    /// Stored document size.
    pub size_bytes: i64,
    /// Whether the stored bytes carry the PDF magic header. Advisory only.
    pub looks_like_pdf: bool,
    /// Extracted document text. Absent during verification, which runs
    /// before extraction.
    pub document_text: Option<&'a str>,
    /// Web-search hits for market context. Empty in degraded mode.
    pub search_hits: &'a [SearchHit],
    /// Outputs of earlier stages, in execution order.
    pub prior: &'a [StageOutput],
}

/// Fixed system prompt for a stage.
pub fn system_prompt(stage: StageName) -> &'static str {
    match stage {
        StageName::Verification => {
            "You are a meticulous document verification specialist at a financial \
             research firm. You judge whether an uploaded document is plausibly a \
             financial document suitable for investment analysis, and note any \
             irregularities. You never refuse to proceed; you flag concerns and move on."
        }
        StageName::Analysis => {
            "You are a senior financial analyst. You read financial documents and \
             produce a grounded, factual analysis: key figures, trends, notable \
             line items, and how they bear on the user's question. You cite the \
             document rather than inventing numbers."
        }
        StageName::Recommendation => {
            "You are an investment advisor. Building on a completed financial \
             analysis, you articulate a clear, reasoned investment recommendation \
             with its supporting evidence and the conditions under which it would \
             change. You are not permitted to omit the recommendation."
        }
        StageName::Risk => {
            "You are a risk assessment specialist. Given a financial analysis and \
             an investment recommendation, you enumerate the material risks, rate \
             their severity and likelihood, and state what would mitigate them."
        }
    }
}

fn truncate_at_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

fn push_search_context(prompt: &mut String, hits: &[SearchHit]) {
    if hits.is_empty() {
        return;
    }
    prompt.push_str("\n\nRecent market context from web search:\n");
    for hit in hits {
        prompt.push_str(&format!("- {} ({}): {}\n", hit.title, hit.url, hit.snippet));
    }
}

fn push_prior_outputs(prompt: &mut String, prior: &[StageOutput]) {
    for output in prior {
        prompt.push_str(&format!(
            "\n\n{} (completed earlier):\n{}",
            output.stage.report_heading(),
            output.output
        ));
    }
}

/// Build the user prompt for a stage.
pub fn build_prompt(stage: StageName, ctx: &StageContext<'_>) -> String {
    let mut prompt = format!("User query: {}\n", ctx.query);

    match stage {
        StageName::Verification => {
            prompt.push_str(&format!(
                "\nUploaded document: '{}', {} bytes. ",
                ctx.file_name, ctx.size_bytes
            ));
            if ctx.looks_like_pdf {
                prompt.push_str("The file carries a valid PDF header.");
            } else {
                prompt.push_str(
                    "Note: the file does NOT carry a PDF header; it may be \
                     mislabeled or corrupt. Flag this in your assessment.",
                );
            }
            prompt.push_str(
                "\n\nAssess whether this looks like a financial document suitable \
                 for the user's query and note any concerns. Keep it brief.",
            );
        }
        StageName::Analysis => {
            if let Some(text) = ctx.document_text {
                prompt.push_str("\nDocument content:\n---\n");
                prompt.push_str(truncate_at_char_boundary(text, PROMPT_DOCUMENT_MAX_CHARS));
                prompt.push_str("\n---\n");
            }
            push_search_context(&mut prompt, ctx.search_hits);
            push_prior_outputs(&mut prompt, ctx.prior);
            prompt.push_str(
                "\n\nProduce a thorough financial analysis of this document, \
                 focused on the user's query.",
            );
        }
        StageName::Recommendation => {
            push_search_context(&mut prompt, ctx.search_hits);
            push_prior_outputs(&mut prompt, ctx.prior);
            prompt.push_str(
                "\n\nBased on the analysis above, give a clear investment \
                 recommendation with supporting reasoning.",
            );
        }
        StageName::Risk => {
            push_prior_outputs(&mut prompt, ctx.prior);
            prompt.push_str(
                "\n\nAssess the material risks of following the recommendation \
                 above: severity, likelihood, and mitigations.",
            );
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(prior: &'a [StageOutput], hits: &'a [SearchHit]) -> StageContext<'a> {
        StageContext {
            query: "Is this company a good long-term hold?",
            file_name: "q3-report.pdf",
            size_bytes: 52_000,
            looks_like_pdf: true,
            document_text: Some("Revenue: $10M. Net income: $1M."),
            search_hits: hits,
            prior,
        }
    }

    #[test]
    fn test_every_stage_has_distinct_system_prompt() {
        let prompts: Vec<&str> = StageName::ORDER.iter().map(|s| system_prompt(*s)).collect();
        for (i, a) in prompts.iter().enumerate() {
            for b in &prompts[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_verification_prompt_flags_missing_pdf_header() {
        let mut c = ctx(&[], &[]);
        c.looks_like_pdf = false;
        let prompt = build_prompt(StageName::Verification, &c);
        assert!(prompt.contains("does NOT carry a PDF header"));

        c.looks_like_pdf = true;
        let prompt = build_prompt(StageName::Verification, &c);
        assert!(prompt.contains("valid PDF header"));
    }

    #[test]
    fn test_analysis_prompt_includes_document_and_query() {
        let c = ctx(&[], &[]);
        let prompt = build_prompt(StageName::Analysis, &c);
        assert!(prompt.contains("Revenue: $10M"));
        assert!(prompt.contains("long-term hold"));
    }

    #[test]
    fn test_analysis_prompt_truncates_long_documents() {
        let long_text = "x".repeat(PROMPT_DOCUMENT_MAX_CHARS * 2);
        let c = StageContext {
            document_text: Some(&long_text),
            ..ctx(&[], &[])
        };
        let prompt = build_prompt(StageName::Analysis, &c);
        assert!(prompt.len() < PROMPT_DOCUMENT_MAX_CHARS + 2_000);
    }

    #[test]
    fn test_later_stages_carry_prior_outputs() {
        let prior = vec![
            StageOutput {
                stage: StageName::Analysis,
                output: "Margins improved year over year.".to_string(),
            },
            StageOutput {
                stage: StageName::Recommendation,
                output: "Accumulate on weakness.".to_string(),
            },
        ];
        let c = ctx(&prior, &[]);
        let prompt = build_prompt(StageName::Risk, &c);
        assert!(prompt.contains("Margins improved"));
        assert!(prompt.contains("Accumulate on weakness"));
    }

    #[test]
    fn test_search_context_included_when_present() {
        let hits = vec![SearchHit {
            title: "Sector outlook".to_string(),
            url: "https://example.com".to_string(),
            snippet: "Analysts expect slower growth.".to_string(),
        }];
        let c = ctx(&[], &hits);
        let prompt = build_prompt(StageName::Analysis, &c);
        assert!(prompt.contains("Sector outlook"));
        assert!(prompt.contains("slower growth"));

        // Degraded mode omits the section entirely
        let c = ctx(&[], &[]);
        let prompt = build_prompt(StageName::Analysis, &c);
        assert!(!prompt.contains("web search"));
    }
}
