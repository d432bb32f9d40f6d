//! Trigger detection
//!
//! Pattern-based classification of incoming text into save / recall /
//! synthesize / align intents, plus the smaller classifiers built on the
//! same tables: assistant-insight scanning, semantic-signal scoring,
//! memorable-point extraction, importance/type/tag estimation.
//!
//! The pattern lists are a closed configuration: ordered vectors of
//! `(regex, memory type, confidence)` per category, first hit wins. The
//! master detector layers category priority on top: synthesize and align
//! require confidence >= 0.8, recall and save >= 0.7, checked in that
//! order. Align patterns carry 0.75 and so practically never win - that
//! ordering is long-standing observed behavior and is kept as-is.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::memory::MemoryType;
use crate::text::{jaccard, split_sentences};

/// Minimum confidence for synthesize and align categories
const HIGH_GATE: f64 = 0.8;
/// Minimum confidence for recall and save categories
const LOW_GATE: f64 = 0.7;
/// Jaccard above which two extracted insights are duplicates
const INSIGHT_DEDUP_THRESHOLD: f64 = 0.7;
/// Jaccard above which two memorable points are duplicates
const POINT_DEDUP_THRESHOLD: f64 = 0.8;
/// Minimum length for a memorable point
const MIN_POINT_LENGTH: usize = 20;

// ============================================================================
// TYPES
// ============================================================================

/// Intent category of a trigger match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// The text asks to store something
    Save,
    /// The text asks to look something up
    Recall,
    /// The text asks for a synthesis across memories
    Synthesize,
    /// The text asks to re-align on prior context
    Align,
}

impl TriggerKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Save => "save",
            TriggerKind::Recall => "recall",
            TriggerKind::Synthesize => "synthesize",
            TriggerKind::Align => "align",
        }
    }
}

/// A classified trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerMatch {
    /// Intent category
    pub kind: TriggerKind,
    /// Memory type the content should be stored under
    pub memory_type: MemoryType,
    /// Pattern confidence, in [0.7, 1]
    pub confidence: f64,
    /// Extracted payload (capture group when the pattern has one)
    pub content: String,
}

/// Urgency classification of a passage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalLevel {
    /// Security/data-loss/outage territory
    Critical,
    /// Decisions, architecture, root causes
    Important,
    /// Preferences and conventions
    Notable,
    /// Everything else
    Routine,
}

/// Semantic-signal result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSignal {
    /// Urgency level
    pub signal: SignalLevel,
    /// The phrase that triggered the level
    pub reason: String,
    /// Importance boost the level carries (2 / 1 / 0.5 / 0)
    pub boost: f64,
}

/// A save-worthy sentence extracted from a passage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorablePoint {
    /// The sentence content
    pub content: String,
    /// Memory type it classified as
    pub memory_type: MemoryType,
    /// Confidence of the classification
    pub confidence: f64,
}

// ============================================================================
// PATTERN TABLES
// ============================================================================

struct TriggerPattern {
    regex: Regex,
    memory_type: MemoryType,
    confidence: f64,
}

fn pattern(raw: &str, memory_type: MemoryType, confidence: f64) -> TriggerPattern {
    TriggerPattern {
        // Table patterns are fixed at compile time; a bad one is a bug
        regex: Regex::new(raw).expect("trigger pattern must compile"),
        memory_type,
        confidence,
    }
}

static SAVE_PATTERNS: LazyLock<Vec<TriggerPattern>> = LazyLock::new(|| {
    vec![
        pattern(r"(?i)\bremember (?:that )?(.+)", MemoryType::Context, 0.9),
        pattern(
            r"(?i)\bwe (?:decided|agreed) (?:to |on |that )?(.+)",
            MemoryType::Decision,
            0.9,
        ),
        pattern(
            r"(?i)\bdon'?t forget (?:that |to )?(.+)",
            MemoryType::Todo,
            0.85,
        ),
        pattern(
            r"(?i)\b(?:important|crucial|critical):\s*(.+)",
            MemoryType::Context,
            0.85,
        ),
        pattern(
            r"(?i)\b(?:i|we) learned (?:that )?(.+)",
            MemoryType::Learning,
            0.85,
        ),
        pattern(
            r"(?i)\blesson learned:?\s*(.+)",
            MemoryType::Learning,
            0.85,
        ),
        pattern(
            r"(?i)\bnote (?:that |down )?(.+)",
            MemoryType::Context,
            0.8,
        ),
        pattern(
            r"(?i)\bkeep in mind (?:that )?(.+)",
            MemoryType::Context,
            0.8,
        ),
        pattern(r"(?i)\btodo:?\s+(.+)", MemoryType::Todo, 0.8),
        pattern(
            r"(?i)\bfor future reference,?\s*(.+)",
            MemoryType::Reference,
            0.8,
        ),
        pattern(
            r"(?i)\bi (?:prefer|always|never) (.+)",
            MemoryType::Preference,
            0.75,
        ),
    ]
});

static RECALL_PATTERNS: LazyLock<Vec<TriggerPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            r"(?i)\bwhat did we (?:decide|say|discuss|agree) (?:about |on )?(.+)",
            MemoryType::Context,
            0.9,
        ),
        pattern(r"(?i)\bdo you remember (.+)", MemoryType::Context, 0.85),
        pattern(
            r"(?i)\bremind me (?:about |of |what )?(.+)",
            MemoryType::Context,
            0.85,
        ),
        pattern(
            r"(?i)\bwhat do you know about (.+)",
            MemoryType::Context,
            0.8,
        ),
        pattern(r"(?i)\brecall (.+)", MemoryType::Context, 0.8),
        pattern(
            r"(?i)\bhave we (?:discussed|talked about|seen) (.+)",
            MemoryType::Context,
            0.75,
        ),
        pattern(
            r"(?i)\bwhat was (?:the |our )?(.+)",
            MemoryType::Context,
            0.7,
        ),
    ]
});

static SYNTHESIZE_PATTERNS: LazyLock<Vec<TriggerPattern>> = LazyLock::new(|| {
    vec![
        pattern(r"(?i)\bsynthesi[sz]e (.+)", MemoryType::Summary, 0.9),
        pattern(
            r"(?i)\bsummari[sz]e (?:the |our |what )?(.+)",
            MemoryType::Summary,
            0.85,
        ),
        pattern(
            r"(?i)\bconsolidate (?:the |our )?(.+)",
            MemoryType::Summary,
            0.85,
        ),
        pattern(r"(?i)\bsum up (.+)", MemoryType::Summary, 0.8),
        pattern(
            r"(?i)\bwhat have we learned (?:about )?(.*)",
            MemoryType::Summary,
            0.8,
        ),
        pattern(
            r"(?i)\bgive me (?:an? )?overview of (.+)",
            MemoryType::Summary,
            0.8,
        ),
        pattern(r"(?i)\bpull together (.+)", MemoryType::Summary, 0.8),
    ]
});

// Align patterns sit at 0.75, under the category's 0.8 gate. See the
// module docs: this mirrors long-observed behavior and stays as-is.
static ALIGN_PATTERNS: LazyLock<Vec<TriggerPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            r"(?i)\blet'?s (?:get )?(?:re)?aligned? (?:on )?(.*)",
            MemoryType::Context,
            0.75,
        ),
        pattern(
            r"(?i)\bget (?:us )?back on track(?: with| on)? ?(.*)",
            MemoryType::Context,
            0.75,
        ),
        pattern(
            r"(?i)\bwhere were we(?: with| on)? ?(.*)",
            MemoryType::Context,
            0.75,
        ),
        pattern(
            r"(?i)\blet'?s continue (?:working on |with )?(.+)",
            MemoryType::Context,
            0.75,
        ),
    ]
});

static INSIGHT_PATTERNS: LazyLock<Vec<TriggerPattern>> = LazyLock::new(|| {
    vec![
        pattern(r"(?i)\bkey insight:?\s*(.+)", MemoryType::Learning, 0.9),
        pattern(
            r"(?i)\bi (?:discovered|found) (?:that )?(.+)",
            MemoryType::Learning,
            0.85,
        ),
        pattern(
            r"(?i)\bthe (?:root cause|underlying issue) (?:is|was) (.+)",
            MemoryType::Learning,
            0.85,
        ),
        pattern(
            r"(?i)\bthe pattern here is (?:that )?(.+)",
            MemoryType::Pattern,
            0.85,
        ),
        pattern(
            r"(?i)\bthe solution (?:is|was) (?:to )?(.+)",
            MemoryType::Learning,
            0.8,
        ),
        pattern(r"(?i)\bi recommend (.+)", MemoryType::Pattern, 0.8),
        pattern(
            r"(?i)\bthis suggests (?:that )?(.+)",
            MemoryType::Pattern,
            0.75,
        ),
    ]
});

static CRITICAL_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(security|vulnerability|data loss|breaking change|outage|production (?:is )?down|incident|corruption)\b",
    )
    .expect("signal pattern must compile")
});

static IMPORTANT_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(decision|decided|architecture|root cause|migration|deadline|blocker)\b")
        .expect("signal pattern must compile")
});

static NOTABLE_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(preference|convention|style|tip|shortcut|reminder|naming)\b")
        .expect("signal pattern must compile")
});

// ============================================================================
// DETECTOR
// ============================================================================

/// The trigger detector; stateless, all tables built once
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerDetector;

impl TriggerDetector {
    /// Create a detector
    pub fn new() -> Self {
        Self
    }

    /// Classify `text` into at most one intent.
    ///
    /// Categories are checked in priority order - synthesize, align,
    /// recall, save - each with its confidence gate.
    pub fn detect_trigger(&self, text: &str) -> Option<TriggerMatch> {
        let categories: [(&[TriggerPattern], TriggerKind, f64); 4] = [
            (SYNTHESIZE_PATTERNS.as_slice(), TriggerKind::Synthesize, HIGH_GATE),
            (ALIGN_PATTERNS.as_slice(), TriggerKind::Align, HIGH_GATE),
            (RECALL_PATTERNS.as_slice(), TriggerKind::Recall, LOW_GATE),
            (SAVE_PATTERNS.as_slice(), TriggerKind::Save, LOW_GATE),
        ];
        for (patterns, kind, gate) in categories {
            if let Some(found) = first_match(patterns, kind, text) {
                if found.confidence >= gate {
                    return Some(found);
                }
            }
        }
        None
    }

    /// First save-pattern hit, no category priority applied
    pub fn detect_save_trigger(&self, text: &str) -> Option<TriggerMatch> {
        first_match(SAVE_PATTERNS.as_slice(), TriggerKind::Save, text)
    }

    /// First recall-pattern hit
    pub fn detect_recall_trigger(&self, text: &str) -> Option<TriggerMatch> {
        first_match(RECALL_PATTERNS.as_slice(), TriggerKind::Recall, text)
    }

    /// Scan a longer assistant passage for insight phrasings.
    ///
    /// Every sentence is checked against the insight table; duplicates
    /// (Jaccard over extracted content > 0.7) collapse to the first hit.
    pub fn detect_claude_insights(&self, text: &str) -> Vec<TriggerMatch> {
        let mut insights: Vec<TriggerMatch> = vec![];
        for sentence in split_sentences(text) {
            let Some(found) = first_match(INSIGHT_PATTERNS.as_slice(), TriggerKind::Save, sentence) else {
                continue;
            };
            let duplicate = insights
                .iter()
                .any(|seen| jaccard(&seen.content, &found.content) > INSIGHT_DEDUP_THRESHOLD);
            if !duplicate {
                insights.push(found);
            }
        }
        insights
    }

    /// Ordered urgency check: critical > important > notable > routine
    pub fn detect_semantic_signal(&self, text: &str) -> SemanticSignal {
        if let Some(found) = CRITICAL_SIGNAL.find(text) {
            return SemanticSignal {
                signal: SignalLevel::Critical,
                reason: found.as_str().to_lowercase(),
                boost: 2.0,
            };
        }
        if let Some(found) = IMPORTANT_SIGNAL.find(text) {
            return SemanticSignal {
                signal: SignalLevel::Important,
                reason: found.as_str().to_lowercase(),
                boost: 1.0,
            };
        }
        if let Some(found) = NOTABLE_SIGNAL.find(text) {
            return SemanticSignal {
                signal: SignalLevel::Notable,
                reason: found.as_str().to_lowercase(),
                boost: 0.5,
            };
        }
        SemanticSignal {
            signal: SignalLevel::Routine,
            reason: String::new(),
            boost: 0.0,
        }
    }

    /// Split a passage into save-worthy sentences.
    ///
    /// Sentences shorter than 20 characters are skipped; near-duplicates
    /// (Jaccard > 0.8) collapse to the first occurrence.
    pub fn extract_memorable_points(&self, text: &str) -> Vec<MemorablePoint> {
        let mut points: Vec<MemorablePoint> = vec![];
        for sentence in split_sentences(text) {
            if sentence.len() <= MIN_POINT_LENGTH {
                continue;
            }
            let Some(found) = self.detect_save_trigger(sentence) else {
                continue;
            };
            let duplicate = points
                .iter()
                .any(|seen| jaccard(&seen.content, sentence) > POINT_DEDUP_THRESHOLD);
            if !duplicate {
                points.push(MemorablePoint {
                    content: sentence.to_string(),
                    memory_type: found.memory_type,
                    confidence: found.confidence,
                });
            }
        }
        points
    }

    /// Estimate importance on the 1-5 scale from the semantic signal
    pub fn estimate_importance(&self, text: &str) -> u8 {
        match self.detect_semantic_signal(text).signal {
            SignalLevel::Critical => 5,
            SignalLevel::Important => 4,
            SignalLevel::Notable => 3,
            SignalLevel::Routine => {
                let lower = text.to_lowercase();
                if lower.contains("minor") || lower.contains("trivial") || lower.contains("fyi") {
                    2
                } else {
                    3
                }
            }
        }
    }

    /// Classify the memory type of free text by keyword families
    pub fn detect_memory_type(&self, text: &str) -> MemoryType {
        let lower = text.to_lowercase();
        let any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if any(&["decided", "decision", "chose", "we will use", "going with"]) {
            MemoryType::Decision
        } else if any(&["todo", "need to", "remember to", "don't forget"]) {
            MemoryType::Todo
        } else if any(&["learned", "discovered", "realized", "turns out", "til "]) {
            MemoryType::Learning
        } else if any(&["prefer", "favorite", "always use", "never use", "i like"]) {
            MemoryType::Preference
        } else if any(&["pattern", "usually", "tend to", "every time", "keeps happening"]) {
            MemoryType::Pattern
        } else if any(&["http://", "https://", "see docs", "documentation", "rfc "]) {
            MemoryType::Reference
        } else {
            MemoryType::Context
        }
    }

    /// Extract a deduplicated lowercase tag list from free text
    pub fn detect_tags(&self, text: &str) -> Vec<String> {
        const VOCABULARY: &[&str] = &[
            "database",
            "postgres",
            "postgresql",
            "mongodb",
            "redis",
            "auth",
            "authentication",
            "security",
            "api",
            "frontend",
            "backend",
            "testing",
            "deployment",
            "docker",
            "kubernetes",
            "performance",
            "migration",
            "architecture",
            "config",
            "logging",
            "cache",
            "caching",
            "billing",
            "rust",
            "python",
            "typescript",
        ];

        let lower = text.to_lowercase();
        let mut tags: Vec<String> = vec![];
        for word in VOCABULARY {
            if lower.contains(word) && !tags.iter().any(|t| t == word) {
                tags.push(word.to_string());
            }
        }
        // Explicit #hashtags always count
        for token in lower.split_whitespace() {
            if let Some(tag) = token.strip_prefix('#') {
                let tag: String = tag
                    .chars()
                    .filter(|c| c.is_alphanumeric() || *c == '-')
                    .collect();
                if !tag.is_empty() && !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        tags
    }
}

/// First pattern hit in a table, carrying the table's type and confidence
fn first_match(
    patterns: &[TriggerPattern],
    kind: TriggerKind,
    text: &str,
) -> Option<TriggerMatch> {
    for pattern in patterns {
        let Some(captures) = pattern.regex.captures(text) else {
            continue;
        };
        let content = captures
            .get(1)
            .map(|g| g.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(text)
            .trim()
            .trim_end_matches(['.', '!', '?'])
            .to_string();
        return Some(TriggerMatch {
            kind,
            memory_type: pattern.memory_type,
            confidence: pattern.confidence,
            content,
        });
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================
