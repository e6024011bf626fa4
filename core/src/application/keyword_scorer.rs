// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The deterministic lexical ranker (C7, spec §4.7). Pure, no I/O: the
//! mandatory fallback whenever the Advisor is unavailable.

use crate::domain::tool::{normalize_tokens, FullyQualifiedToolName, Tool};

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTool {
    pub tool: FullyQualifiedToolName,
    pub score: f64,
}

/// Weighted-Jaccard score, boosted +0.15 (capped at 1.0) when the task
/// text exactly substring-matches the tool's local name, ties broken by
/// ascending declared-keyword count (prefer more specific tools).
pub fn score(task_text: &str, tools: &[Tool]) -> Vec<ScoredTool> {
    let task_tokens = normalize_tokens(task_text);
    let task_lower = task_text.to_lowercase();

    let mut scored: Vec<(ScoredTool, usize)> = tools
        .iter()
        .map(|tool| {
            let tool_tokens = tool.searchable_tokens();
            let intersection = task_tokens.intersection(&tool_tokens).count() as f64;
            let union = task_tokens.union(&tool_tokens).count().max(1) as f64;
            let mut jaccard = intersection / union;
            if task_lower.contains(&tool.local_name.to_lowercase()) {
                jaccard = (jaccard + 0.15).min(1.0);
            }
            (
                ScoredTool { tool: tool.fully_qualified_name.clone(), score: jaccard },
                tool.keywords.len(),
            )
        })
        .collect();

    scored.sort_by(|(a, a_kw), (b, b_kw)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a_kw.cmp(b_kw))
            .then_with(|| a.tool.as_str().cmp(b.tool.as_str()))
    });

    scored.into_iter().map(|(scored_tool, _)| scored_tool).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::Schema;
    use crate::domain::service::ServiceName;
    use std::collections::BTreeSet as Set;

    fn tool(service: &str, local: &str, description: &str, keywords: &[&str]) -> Tool {
        Tool {
            fully_qualified_name: FullyQualifiedToolName::new(&ServiceName::new(service), local),
            local_name: local.to_string(),
            description: description.to_string(),
            input_schema: Schema::Object { properties: Default::default(), required: vec![] },
            keywords: keywords.iter().map(|k| k.to_string()).collect::<Set<_>>(),
        }
    }

    #[test]
    fn is_pure_and_deterministic() {
        let tools = vec![
            tool("fs", "read", "Read a file from disk", &["file", "read"]),
            tool("fs", "write", "Write a file to disk", &["file", "write"]),
            tool("git", "status", "Show git status", &["git", "status"]),
        ];
        let a = score("open file /tmp/x.md", &tools);
        let b = score("open file /tmp/x.md", &tools);
        assert_eq!(a, b);
    }

    #[test]
    fn exact_name_substring_boosts_score() {
        let tools = vec![tool("fs", "read", "Read a file from disk", &["file"])];
        let scored = score("please read this", &tools);
        assert!(scored[0].score > 0.0);
    }

    #[test]
    fn ties_prefer_fewer_declared_keywords() {
        let tools = vec![
            tool("a", "x", "same description text", &["one", "two", "three"]),
            tool("b", "x", "same description text", &["one"]),
        ];
        let scored = score("same description text", &tools);
        assert_eq!(scored[0].tool.as_str(), "b/x");
    }
}
