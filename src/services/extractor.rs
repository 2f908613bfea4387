//! Entity/relation extraction used when promoting interactions to the graph.

use std::collections::HashSet;

use serde::Serialize;

use crate::types::knowledge::normalize_label;
use crate::types::MemxResult;

/// How an entity was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Run of capitalized words.
    Named,
    /// Code-like token (snake_case, camelCase, paths, calls).
    Identifier,
    /// Text inside quotes or backticks.
    Quoted,
    /// Fallback label summarizing the interaction.
    Topic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedEntity {
    pub label: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRelation {
    pub from: String,
    pub to: String,
    pub relation: String,
    pub weight: f32,
}

/// Extraction result. `entities` is never empty for non-empty input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    pub relations: Vec<ExtractedRelation>,
}

impl Extraction {
    /// Entities other than the topic fallback.
    pub fn named_entities(&self) -> impl Iterator<Item = &ExtractedEntity> {
        self.entities.iter().filter(|e| e.kind != EntityKind::Topic)
    }
}

/// NLP extraction collaborator.
pub trait Extractor: Send + Sync {
    fn extract(&self, text: &str) -> MemxResult<Extraction>;
}

const MAX_ENTITIES: usize = 8;
const ADJACENT_WEIGHT: f32 = 0.5;
const TOPIC_WORDS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "did", "do", "does",
    "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in", "into", "is",
    "it", "its", "just", "me", "my", "no", "not", "of", "on", "or", "our", "she", "so", "that",
    "the", "their", "then", "there", "these", "they", "this", "those", "to", "too", "us", "was",
    "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you",
    "your", "yes", "ok", "okay", "please", "thanks", "hello", "hi",
];

pub(crate) fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word.to_lowercase().as_str())
}

/// Rule-based extractor: quoted spans, code identifiers and capitalized
/// phrases, with consecutive entities linked by `related_to`.
#[derive(Debug, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for HeuristicExtractor {
    fn extract(&self, text: &str) -> MemxResult<Extraction> {
        let mut found = Found::default();

        let remainder = extract_quoted(text, &mut found);
        let mut phrase: Vec<&str> = Vec::new();

        for raw in remainder.split_whitespace() {
            let breaks_phrase = raw.ends_with([',', '.', ';', ':', '!', '?', ')']);
            let word = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');

            if is_identifier(raw) {
                flush_phrase(&mut phrase, &mut found);
                found.push(trim_identifier(raw), EntityKind::Identifier);
            } else if is_capitalized(word) && !is_stop_word(word) {
                phrase.push(word);
            } else {
                flush_phrase(&mut phrase, &mut found);
            }

            if breaks_phrase {
                flush_phrase(&mut phrase, &mut found);
            }
        }
        flush_phrase(&mut phrase, &mut found);

        let mut entities = found.entities;
        entities.truncate(MAX_ENTITIES);

        let relations = entities
            .windows(2)
            .map(|pair| ExtractedRelation {
                from: pair[0].label.clone(),
                to: pair[1].label.clone(),
                relation: "related_to".to_string(),
                weight: ADJACENT_WEIGHT,
            })
            .collect();

        if entities.is_empty() {
            if let Some(topic) = topic_label(text) {
                entities.push(ExtractedEntity {
                    label: topic,
                    kind: EntityKind::Topic,
                });
            }
        }

        Ok(Extraction {
            entities,
            relations,
        })
    }
}

#[derive(Default)]
struct Found {
    entities: Vec<ExtractedEntity>,
    seen: HashSet<String>,
}

impl Found {
    fn push(&mut self, label: &str, kind: EntityKind) {
        let label = label.trim();
        if label.is_empty() || label.len() > 120 {
            return;
        }
        if self.seen.insert(normalize_label(label)) {
            self.entities.push(ExtractedEntity {
                label: label.to_string(),
                kind,
            });
        }
    }
}

/// Pull out double-quoted and backticked spans, returning the text with
/// those spans blanked.
fn extract_quoted(text: &str, found: &mut Found) -> String {
    let mut rest = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '"' || c == '`' {
            let span: String = chars.by_ref().take_while(|&n| n != c).collect();
            found.push(&span, EntityKind::Quoted);
            rest.push(' ');
        } else {
            rest.push(c);
        }
    }
    rest
}

fn flush_phrase(phrase: &mut Vec<&str>, found: &mut Found) {
    if !phrase.is_empty() {
        found.push(&phrase.join(" "), EntityKind::Named);
        phrase.clear();
    }
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(|c| c.is_uppercase())
}

fn trim_identifier(raw: &str) -> &str {
    raw.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '!' | '?' | '(' | '\'' | '"'))
        .trim_end_matches('.')
}

fn is_identifier(raw: &str) -> bool {
    let token = trim_identifier(raw);
    if token.len() < 3 || !token.chars().any(|c| c.is_alphabetic()) {
        return false;
    }
    let snake = token.contains('_') && token.chars().all(|c| c.is_alphanumeric() || c == '_');
    let path = token.contains("::") || (token.contains('/') && !token.starts_with("http"));
    let call = token.ends_with("()");
    let dotted = token
        .split('.')
        .filter(|part| !part.is_empty())
        .count()
        >= 2
        && token.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_');
    let camel = token
        .chars()
        .zip(token.chars().skip(1))
        .any(|(a, b)| a.is_lowercase() && b.is_uppercase());
    snake || path || call || dotted || camel
}

/// First content words, lowercased, as a coarse topic. Falls back to the
/// first words of any kind when everything is filler.
fn topic_label(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mut words: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|w| w.len() > 1 && !is_stop_word(w))
        .take(TOPIC_WORDS)
        .collect();
    if words.is_empty() {
        words = tokens.into_iter().take(TOPIC_WORDS).collect();
    }
    if words.is_empty() {
        return None;
    }
    Some(format!("topic: {}", words.join(" ").to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(extraction: &Extraction) -> Vec<&str> {
        extraction.entities.iter().map(|e| e.label.as_str()).collect()
    }

    #[test]
    fn test_capitalized_phrases_and_identifiers() {
        let x = HeuristicExtractor::new()
            .extract("Alice moved the build_cache into Project Atlas.")
            .unwrap();
        assert_eq!(labels(&x), vec!["Alice", "build_cache", "Project Atlas"]);
        assert_eq!(x.relations.len(), 2);
        assert_eq!(x.relations[0].relation, "related_to");
    }

    #[test]
    fn test_quoted_span() {
        let x = HeuristicExtractor::new()
            .extract("the flag is called \"fast path\" now")
            .unwrap();
        assert_eq!(labels(&x), vec!["fast path"]);
    }

    #[test]
    fn test_topic_fallback() {
        let x = HeuristicExtractor::new()
            .extract("the deploy failed due to a timeout")
            .unwrap();
        assert_eq!(x.entities.len(), 1);
        assert_eq!(x.entities[0].kind, EntityKind::Topic);
        assert_eq!(x.entities[0].label, "topic: deploy failed due");
        assert!(x.relations.is_empty());
    }
}
