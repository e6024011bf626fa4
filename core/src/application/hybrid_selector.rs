// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Combines advisor and keyword rankings into one ranked candidate list
//! (C9, spec §4.9). Falls back to the Keyword Scorer alone whenever the
//! Advisor is unreachable, slow, or returns a reply below the minimum
//! confidence threshold.

use thiserror::Error;

use crate::domain::config::RouterPolicyConfig;
use crate::domain::selection::{Candidate, Selection, SelectionMethod};
use crate::domain::tool::Tool;
use crate::infrastructure::advisor_client::{AdvisorCandidate, AdvisorClient};

use super::keyword_scorer;

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("no tools available to select from")]
    NoToolsAvailable,
}

pub struct HybridSelector<'a> {
    advisor: &'a AdvisorClient,
    policy: RouterPolicyConfig,
}

impl<'a> HybridSelector<'a> {
    pub fn new(advisor: &'a AdvisorClient, policy: RouterPolicyConfig) -> Self {
        Self { advisor, policy }
    }

    pub async fn select(&self, task_text: &str, tools: &[Tool]) -> Result<Selection, SelectorError> {
        let started = std::time::Instant::now();
        if tools.is_empty() {
            return Err(SelectorError::NoToolsAvailable);
        }

        let keyword_ranked = keyword_scorer::score(task_text, tools);

        // Exactly one candidate: skip the Advisor entirely (spec §4.9 edge case).
        if tools.len() == 1 {
            let only = &keyword_ranked[0];
            let candidates = vec![Candidate {
                tool: only.tool.clone(),
                keyword_score: only.score,
                advisor_score: None,
                combined_score: only.score,
                chosen: true,
            }];
            return Ok(Selection {
                task_text: task_text.to_string(),
                candidates,
                method: SelectionMethod::KeywordFallback,
                advisor_latency_ms: None,
                advisor_confidence: None,
                duration_ms: started.elapsed().as_millis() as u64,
                low_confidence: false,
                recorded_at: chrono::Utc::now(),
            });
        }

        let top_adv: Vec<&keyword_scorer::ScoredTool> =
            keyword_ranked.iter().take(self.policy.top_n_adv).collect();
        let tools_by_name: std::collections::HashMap<&str, &Tool> =
            tools.iter().map(|t| (t.fully_qualified_name.as_str(), t)).collect();
        let advisor_candidates: Vec<AdvisorCandidate> = top_adv
            .iter()
            .filter_map(|scored| tools_by_name.get(scored.tool.as_str()))
            .map(|tool| AdvisorCandidate { name: tool.fully_qualified_name.to_string(), description: tool.description.clone() })
            .collect();

        let advisor_start = std::time::Instant::now();
        let advisor_outcome = self.advisor.rank(task_text, &advisor_candidates).await;
        let advisor_latency_ms = advisor_start.elapsed().as_millis() as u64;

        let (candidates, method, low_confidence, advisor_confidence) = match advisor_outcome {
            Err(_e) => (
                self.keyword_only_candidates(&keyword_ranked),
                SelectionMethod::KeywordFallback,
                false,
                None,
            ),
            Ok(ranked) => {
                let advisor_scores: std::collections::HashMap<String, (f64, Option<String>)> = ranked
                    .into_iter()
                    .map(|r| (r.name, (r.confidence, r.reason)))
                    .collect();

                let mut candidates: Vec<Candidate> = keyword_ranked
                    .iter()
                    .map(|scored| {
                        let tool_name = scored.tool.to_string();
                        match advisor_scores.get(&tool_name) {
                            Some((advisor_score, _reason)) => Candidate {
                                tool: scored.tool.clone(),
                                keyword_score: scored.score,
                                advisor_score: Some(*advisor_score),
                                combined_score: self.policy.advisor_weight * advisor_score
                                    + (1.0 - self.policy.advisor_weight) * scored.score,
                                chosen: false,
                            },
                            None => Candidate {
                                tool: scored.tool.clone(),
                                keyword_score: scored.score,
                                advisor_score: None,
                                combined_score: (1.0 - self.policy.advisor_weight) * scored.score,
                                chosen: false,
                            },
                        }
                    })
                    .collect();

                candidates.sort_by(|a, b| {
                    b.combined_score
                        .partial_cmp(&a.combined_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.keyword_score.partial_cmp(&a.keyword_score).unwrap_or(std::cmp::Ordering::Equal))
                        .then_with(|| a.tool.as_str().cmp(b.tool.as_str()))
                });

                let top_confidence = candidates.first().and_then(|c| c.advisor_score).unwrap_or(0.0);
                let method = if top_confidence < self.policy.min_confidence {
                    SelectionMethod::KeywordFallback
                } else {
                    SelectionMethod::Hybrid
                };
                let low_confidence =
                    candidates.first().map(|c| c.combined_score < 0.1).unwrap_or(false);
                let top_advisor_confidence = candidates.first().and_then(|c| c.advisor_score);
                (candidates, method, low_confidence, top_advisor_confidence)
            }
        };

        let mut candidates = candidates;
        candidates.truncate(self.policy.top_n);
        if let Some(first) = candidates.first_mut() {
            first.chosen = true;
        }

        let advisor_latency_ms = if method == SelectionMethod::KeywordFallback && advisor_confidence.is_none() {
            None
        } else {
            Some(advisor_latency_ms)
        };

        Ok(Selection {
            task_text: task_text.to_string(),
            candidates,
            method,
            advisor_latency_ms,
            advisor_confidence,
            duration_ms: started.elapsed().as_millis() as u64,
            low_confidence,
            recorded_at: chrono::Utc::now(),
        })
    }

    fn keyword_only_candidates(&self, ranked: &[keyword_scorer::ScoredTool]) -> Vec<Candidate> {
        ranked
            .iter()
            .take(self.policy.top_n)
            .map(|scored| Candidate {
                tool: scored.tool.clone(),
                keyword_score: scored.score,
                advisor_score: None,
                combined_score: scored.score,
                chosen: false,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::Schema;
    use crate::domain::service::ServiceName;
    use crate::domain::tool::FullyQualifiedToolName;
    use std::time::Duration;

    fn tool(service: &str, local: &str, description: &str) -> Tool {
        Tool {
            fully_qualified_name: FullyQualifiedToolName::new(&ServiceName::new(service), local),
            local_name: local.to_string(),
            description: description.to_string(),
            input_schema: Schema::Object { properties: Default::default(), required: vec![] },
            keywords: Default::default(),
        }
    }

    #[tokio::test]
    async fn empty_candidate_set_fails() {
        let advisor = AdvisorClient::new("http://127.0.0.1:1", "test-model", Duration::from_millis(10));
        let selector = HybridSelector::new(&advisor, RouterPolicyConfig::default());
        let err = selector.select("do something", &[]).await.unwrap_err();
        assert!(matches!(err, SelectorError::NoToolsAvailable));
    }

    #[tokio::test]
    async fn single_candidate_skips_advisor() {
        let advisor = AdvisorClient::new("http://127.0.0.1:1", "test-model", Duration::from_millis(10));
        let selector = HybridSelector::new(&advisor, RouterPolicyConfig::default());
        let tools = vec![tool("fs", "read", "Read a file")];
        let selection = selector.select("read the file", &tools).await.unwrap();
        assert_eq!(selection.method, SelectionMethod::KeywordFallback);
        assert_eq!(selection.candidates.len(), 1);
        assert!(selection.candidates[0].chosen);
    }

    #[tokio::test]
    async fn unreachable_advisor_falls_back_to_keyword() {
        let advisor = AdvisorClient::new("http://127.0.0.1:1", "test-model", Duration::from_millis(10));
        let selector = HybridSelector::new(&advisor, RouterPolicyConfig::default());
        let tools = vec![
            tool("fs", "read", "Read a file from disk"),
            tool("fs", "write", "Write a file to disk"),
        ];
        let selection = selector.select("read a file", &tools).await.unwrap();
        assert_eq!(selection.method, SelectionMethod::KeywordFallback);
        assert!(selection.chosen_tool().is_some());
    }
}
