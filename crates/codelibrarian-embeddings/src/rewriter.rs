//! LLM query rewriter over an OpenAI-compatible chat completions API.
//!
//! Failures of any kind (timeout, connection refused, bad JSON) return
//! `None`; search falls back to the original query.

use codelibrarian_core::{Focus, QueryRewriteConfig, RewrittenQuery};
use regex::Regex;

const SYSTEM_PROMPT_HEADER: &str = "You are a code search assistant. Given a natural language \
question about a codebase, return JSON with search terms a developer would use to find the \
relevant code.";

const SYSTEM_PROMPT_RULES: &str = r#"Return ONLY valid JSON:
{"terms": ["term1", "term2", ...], "focus": "implementation"|"tests"|"all"}

Rules:
- terms: 3-6 search terms, preferring actual symbol names from the codebase
- focus: "implementation" if asking about how code works, "tests" if asking about testing, "all" if unclear
- No explanations, just JSON"#;

/// Client for the `[query_rewrite]` chat-completions endpoint.
pub struct QueryRewriter {
    api_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl QueryRewriter {
    pub fn new(config: &QueryRewriteConfig) -> Option<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs_f64(config.timeout.max(0.1)))
            .build()
            .ok()?;
        Some(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }

    /// Rewrite a natural-language query into code search terms.
    ///
    /// `vocabulary`, when non-empty, is included in the prompt so the model
    /// can pick real identifiers from the index instead of generic words.
    pub fn rewrite(&self, query: &str, vocabulary: &[String]) -> Option<RewrittenQuery> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": build_system_prompt(vocabulary)},
                {"role": "user", "content": query},
            ],
            "temperature": 0.0,
        });

        let response = match self.client.post(&self.api_url).json(&body).send() {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!("Query rewrite failed: {err}");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!("Query rewrite returned status {}", response.status());
            return None;
        }

        let json: serde_json::Value = match response.json() {
            Ok(json) => json,
            Err(err) => {
                tracing::debug!("Query rewrite response unreadable: {err}");
                return None;
            }
        };
        let content = json
            .get("choices")?
            .as_array()?
            .first()?
            .get("message")?
            .get("content")?
            .as_str()?;

        parse_rewrite_response(content)
    }
}

fn build_system_prompt(vocabulary: &[String]) -> String {
    if vocabulary.is_empty() {
        format!("{SYSTEM_PROMPT_HEADER}\n\n{SYSTEM_PROMPT_RULES}")
    } else {
        format!(
            "{SYSTEM_PROMPT_HEADER}\n\nAvailable symbols in the codebase:\n{}\n\n{SYSTEM_PROMPT_RULES}",
            vocabulary.join(", ")
        )
    }
}

/// Parse the model's reply, tolerating surrounding code fences and prose.
fn parse_rewrite_response(content: &str) -> Option<RewrittenQuery> {
    let fence_open = Regex::new(r"^```(?:json)?\s*\n?").expect("static regex");
    let fence_close = Regex::new(r"\n?```\s*$").expect("static regex");
    let cleaned = fence_close
        .replace(&fence_open.replace(content.trim(), ""), "")
        .into_owned();

    let parsed: serde_json::Value = match serde_json::from_str(cleaned.trim()) {
        Ok(value) => value,
        Err(_) => {
            tracing::debug!("Query rewrite returned invalid JSON");
            return None;
        }
    };

    let terms: Vec<String> = parsed
        .get("terms")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    if terms.is_empty() {
        return None;
    }

    let focus = match parsed.get("focus").and_then(|v| v.as_str()) {
        Some("implementation") => Focus::Implementation,
        Some("tests") => Focus::Tests,
        _ => Focus::All,
    };

    Some(RewrittenQuery { terms, focus })
}
