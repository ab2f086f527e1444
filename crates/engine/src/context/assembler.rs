//! Token-budgeted context assembly.
//!
//! Builds the message sequence handed to a generation capability:
//!
//! 1. **System** prompt (never trimmed)
//! 2. **Retrieval** context, one synthesized message (omitted when empty)
//! 3. **History**, first turn plus the most recent turns, whole turns only
//! 4. **User** message (never trimmed)
//!
//! Every acceptance step checks the running budget before committing, so
//! the emitted sequence never exceeds the tier's maximum input tokens as
//! long as system prompt and user message fit on their own.
//!
//! Budget arithmetic is content-only: per-message overhead is not counted.
//! Assembly is deterministic: identical inputs give identical outputs.

use crate::context::token;
use serde::{Deserialize, Serialize};
use tierwise_core::message::{Message, Role};
use tierwise_core::retrieval::RetrievalChunk;
use tierwise_core::tier::{ContextBudget, Tier, TierProfile};
use tracing::{debug, warn};

/// Appended to passages cut to the per-chunk limit.
pub const TRUNCATION_MARKER: &str = " […]";

const RETRIEVAL_HEADER: &str = "Relevant sources (ranked, authority in brackets):\n";

// ── Types ─────────────────────────────────────────────────────────────────

/// All inputs required by the assembler for a single generation call.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    pub system_prompt: &'a str,
    pub user_message: &'a str,
    /// Fused passages, in any order.
    pub passages: &'a [RetrievalChunk],
    /// Conversation history, oldest first.
    pub history: &'a [Message],
}

/// The assembled context, ready for a provider request.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// System → retrieval context → history → user.
    pub messages: Vec<Message>,
    pub metadata: AssemblyMetadata,
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub tier: Tier,
    /// Total estimated tokens in the assembled context.
    pub total_tokens: usize,
    /// The tier's maximum input tokens.
    pub budget: usize,
    /// Budget utilization percentage (0.0–100.0+).
    pub utilization_pct: f32,
    /// System prompt and user message alone exceeded the budget.
    pub base_exceeded: bool,
    pub per_layer: Vec<LayerStats>,
    pub drops: Vec<DropInfo>,
}

/// Statistics for a single context layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items dropped from a layer during budget enforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler for one tier. Stateless.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    tier: Tier,
    budget: ContextBudget,
}

impl ContextAssembler {
    pub fn new(tier: Tier, budget: ContextBudget) -> Self {
        Self { tier, budget }
    }

    pub fn for_profile(profile: &TierProfile) -> Self {
        Self::new(profile.tier, profile.budget)
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    pub fn assemble(&self, input: &AssemblyInput<'_>) -> AssembledContext {
        let max = self.budget.max_input_tokens;
        let system_tokens = token::estimate_tokens(input.system_prompt);
        let user_tokens = token::estimate_tokens(input.user_message);
        let base = system_tokens + user_tokens;

        let mut stats = vec![LayerStats {
            name: "system".into(),
            tokens: system_tokens,
            items_included: 1,
            items_total: 1,
        }];
        let mut drops = Vec::new();
        let mut messages = vec![Message::system(input.system_prompt)];

        let base_exceeded = base > max;
        if base_exceeded {
            warn!(
                tier = %self.tier,
                base_tokens = base,
                budget = max,
                "System prompt and user message exceed the tier budget"
            );
        }
        let token_budget = max.saturating_sub(base);

        // ── Retrieval context ──────────────────────────────────────────────
        let (rag_message, rag_stats, rag_drops) = self.render_retrieval(input.passages, token_budget);
        let rag_tokens = rag_stats.tokens;
        stats.push(rag_stats);
        drops.extend(rag_drops);
        if let Some(m) = rag_message {
            messages.push(m);
        }

        // ── History ────────────────────────────────────────────────────────
        let history_budget = token_budget.saturating_sub(rag_tokens);
        let (history, hist_stats, hist_drops) = self.render_history(input.history, history_budget);
        let hist_tokens = hist_stats.tokens;
        stats.push(hist_stats);
        drops.extend(hist_drops);
        messages.extend(history);

        // ── User ───────────────────────────────────────────────────────────
        messages.push(Message::user(input.user_message));
        stats.push(LayerStats {
            name: "user_message".into(),
            tokens: user_tokens,
            items_included: 1,
            items_total: 1,
        });

        let total_tokens = base + rag_tokens + hist_tokens;
        let utilization_pct = if max == 0 {
            100.0
        } else {
            (total_tokens as f32 / max as f32) * 100.0
        };

        debug!(
            tier = %self.tier,
            total_tokens,
            budget = max,
            messages = messages.len(),
            dropped = drops.iter().map(|d| d.items_dropped).sum::<usize>(),
            "Context assembled"
        );

        AssembledContext {
            messages,
            metadata: AssemblyMetadata {
                tier: self.tier,
                total_tokens,
                budget: max,
                utilization_pct,
                base_exceeded,
                per_layer: stats,
                drops,
            },
        }
    }

    // ── Layer renderers ───────────────────────────────────────────────────

    fn render_retrieval(
        &self,
        passages: &[RetrievalChunk],
        budget: usize,
    ) -> (Option<Message>, LayerStats, Vec<DropInfo>) {
        let layer = "retrieval";
        if passages.is_empty() {
            return (None, empty_stats(layer, 0), Vec::new());
        }

        let mut ranked: Vec<&RetrievalChunk> = passages.iter().collect();
        // Stable: equal weighted scores keep fusion order.
        ranked.sort_by(|a, b| {
            b.weighted_score()
                .partial_cmp(&a.weighted_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let header_tokens = token::estimate_tokens(RETRIEVAL_HEADER);
        let mut used = header_tokens;
        let mut body = String::new();
        let mut accepted = 0;
        let mut truncated = 0;
        let mut stop_reason = None;

        for (i, passage) in ranked.iter().enumerate() {
            if accepted == self.budget.max_chunks {
                stop_reason = Some((i, "Chunk limit reached"));
                break;
            }
            let (content, cut) = token::truncate_to_tokens(
                &passage.content,
                self.budget.max_tokens_per_chunk,
                TRUNCATION_MARKER,
            );
            let entry = format!(
                "\n[{}] [{}] {}\n{}\n",
                accepted + 1,
                passage.authority.marker(),
                passage.title,
                content
            );
            let entry_tokens = token::estimate_tokens(&entry);
            if used + entry_tokens > budget {
                stop_reason = Some((i, "Token budget exhausted"));
                break;
            }
            body.push_str(&entry);
            used += entry_tokens;
            accepted += 1;
            if cut {
                truncated += 1;
            }
        }

        let mut drops = Vec::new();
        if let Some((from, reason)) = stop_reason {
            let rest = &ranked[from..];
            drops.push(DropInfo {
                layer: layer.into(),
                items_dropped: rest.len(),
                tokens_dropped: rest.iter().map(|p| token::estimate_tokens(&p.content)).sum(),
                reason: reason.into(),
            });
        }
        if truncated > 0 {
            debug!(tier = %self.tier, truncated, "Passages truncated to chunk limit");
        }

        if accepted == 0 {
            return (None, empty_stats(layer, passages.len()), drops);
        }

        let message = Message::system(format!("{RETRIEVAL_HEADER}{body}"));
        (
            Some(message),
            LayerStats {
                name: layer.into(),
                tokens: used,
                items_included: accepted,
                items_total: passages.len(),
            },
            drops,
        )
    }

    fn render_history(
        &self,
        history: &[Message],
        budget: usize,
    ) -> (Vec<Message>, LayerStats, Vec<DropInfo>) {
        let layer = "conversation_history";
        let turns: Vec<&Message> = history.iter().filter(|m| m.role != Role::System).collect();
        if turns.is_empty() {
            return (Vec::new(), empty_stats(layer, 0), Vec::new());
        }

        let window = history_window(turns.len(), self.budget.max_turns);
        let mut drops = Vec::new();
        let outside = turns.len() - window.len();
        if outside > 0 {
            let tokens = (0..turns.len())
                .filter(|i| !window.contains(i))
                .map(|i| token::estimate_tokens(&turns[i].content))
                .sum();
            drops.push(DropInfo {
                layer: layer.into(),
                items_dropped: outside,
                tokens_dropped: tokens,
                reason: "Outside turn window".into(),
            });
        }

        let mut used = 0;
        let mut included = Vec::new();
        for (n, &i) in window.iter().enumerate() {
            let turn_tokens = token::estimate_tokens(&turns[i].content);
            if used + turn_tokens > budget {
                let rest = &window[n..];
                drops.push(DropInfo {
                    layer: layer.into(),
                    items_dropped: rest.len(),
                    tokens_dropped: rest
                        .iter()
                        .map(|&j| token::estimate_tokens(&turns[j].content))
                        .sum(),
                    reason: "Token budget exhausted".into(),
                });
                break;
            }
            included.push(turns[i].clone());
            used += turn_tokens;
        }

        let count = included.len();
        (
            included,
            LayerStats {
                name: layer.into(),
                tokens: used,
                items_included: count,
                items_total: turns.len(),
            },
            drops,
        )
    }
}

/// Indices of history candidates: the first turn, then the most recent
/// `max_turns`, deduplicated, in chronological order.
fn history_window(len: usize, max_turns: usize) -> Vec<usize> {
    if len == 0 || max_turns == 0 {
        return Vec::new();
    }
    let recent_start = len.saturating_sub(max_turns).max(1);
    std::iter::once(0).chain(recent_start..len).collect()
}

fn empty_stats(layer: &str, total: usize) -> LayerStats {
    LayerStats {
        name: layer.into(),
        tokens: 0,
        items_included: 0,
        items_total: total,
    }
}

/// Assemble the context for `profile`'s tier.
pub fn build_context(
    system_prompt: &str,
    user_message: &str,
    passages: &[RetrievalChunk],
    history: &[Message],
    profile: &TierProfile,
) -> AssembledContext {
    ContextAssembler::for_profile(profile).assemble(&AssemblyInput {
        system_prompt,
        user_message,
        passages,
        history,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────
