//! Extractive text compression, also used to fold summarized interactions
//! into a conversation digest.

use std::collections::HashSet;

use serde::Serialize;

use super::embedder::tokenize;
use super::extractor::is_stop_word;
use crate::types::{MemxError, MemxResult};

/// Compression output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compression {
    pub compressed_text: String,
    /// Output length over input length, in characters.
    pub ratio_achieved: f32,
}

/// Text-to-text compressor.
pub trait TextCompressor: Send + Sync {
    /// Shrink `text` to roughly `target_ratio` of its length. Sentences
    /// overlapping `instruction` are preferred when something must go.
    fn compress(
        &self,
        text: &str,
        instruction: Option<&str>,
        target_ratio: f32,
    ) -> MemxResult<Compression>;
}

/// Sentence-level extractive compressor.
///
/// Passes, stopping as soon as the text fits: drop repeated sentences, drop
/// filler words, keep the highest-ranked sentences, cut at a word boundary.
#[derive(Debug, Default)]
pub struct ExtractiveCompressor;

impl ExtractiveCompressor {
    pub fn new() -> Self {
        Self
    }
}

impl TextCompressor for ExtractiveCompressor {
    fn compress(
        &self,
        text: &str,
        instruction: Option<&str>,
        target_ratio: f32,
    ) -> MemxResult<Compression> {
        if text.trim().is_empty() {
            return Err(MemxError::Validation(
                "text to compress must not be empty".to_string(),
            ));
        }
        if !(target_ratio > 0.0 && target_ratio <= 1.0) {
            return Err(MemxError::Validation(format!(
                "target_ratio must be in (0, 1], got {target_ratio}"
            )));
        }

        let original_len = text.chars().count();
        let budget = ((original_len as f32 * target_ratio).ceil() as usize).max(1);

        let mut sentences = dedup_sentences(text);
        if joined_len(&sentences) > budget {
            sentences = sentences.iter().map(|s| drop_filler(s)).collect();
            sentences.retain(|s| !s.is_empty());
        }
        if joined_len(&sentences) > budget {
            sentences = select_ranked(&sentences, instruction, budget);
        }

        let mut compressed = sentences.join(" ");
        if compressed.chars().count() > budget {
            compressed = truncate_words(&compressed, budget);
        }

        let ratio_achieved = compressed.chars().count() as f32 / original_len as f32;
        Ok(Compression {
            compressed_text: compressed,
            ratio_achieved,
        })
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c == '\n' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            push_sentence(&mut sentences, &mut current);
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let sentence = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
    current.clear();
}

fn dedup_sentences(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    split_sentences(text)
        .into_iter()
        .filter(|s| seen.insert(tokenize(s).join(" ")))
        .collect()
}

fn drop_filler(sentence: &str) -> String {
    sentence
        .split_whitespace()
        .filter(|w| {
            let bare = w.trim_matches(|c: char| !c.is_alphanumeric());
            bare.is_empty() || !is_stop_word(bare)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn joined_len(sentences: &[String]) -> usize {
    let chars: usize = sentences.iter().map(|s| s.chars().count()).sum();
    chars + sentences.len().saturating_sub(1)
}

/// Greedily keep the best sentences that fit, emitted in original order.
/// Rank: overlap with the instruction, then density of content words, then position.
fn select_ranked(sentences: &[String], instruction: Option<&str>, budget: usize) -> Vec<String> {
    let wanted: HashSet<String> = instruction.map(tokenize).unwrap_or_default().into_iter().collect();

    let mut ranked: Vec<(usize, usize, usize)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let tokens = tokenize(s);
            let overlap = tokens.iter().filter(|t| wanted.contains(*t)).count();
            let content = tokens.iter().filter(|t| !is_stop_word(t)).count();
            (i, overlap, content)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));

    let mut keep = vec![false; sentences.len()];
    let mut used = 0usize;
    for &(i, _, _) in &ranked {
        let cost = sentences[i].chars().count() + usize::from(used > 0);
        if used + cost <= budget {
            keep[i] = true;
            used += cost;
        }
    }
    if used == 0 {
        // Nothing fits whole; keep the top sentence for truncation.
        if let Some(&(i, _, _)) = ranked.first() {
            keep[i] = true;
        }
    }

    sentences
        .iter()
        .zip(keep)
        .filter_map(|(s, k)| k.then(|| s.clone()))
        .collect()
}

fn truncate_words(text: &str, budget: usize) -> String {
    let mut out = String::new();
    for word in text.split_whitespace() {
        let extra = word.chars().count() + usize::from(!out.is_empty());
        if out.chars().count() + extra > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        out = text.chars().take(budget).collect();
    }
    out
}
