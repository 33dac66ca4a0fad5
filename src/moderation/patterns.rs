//! Pattern analyzer — deterministic pre-AI scan of message text.
//!
//! Runs before the AI judge to catch obvious abuse with zero latency:
//! excessive caps, mass mentions, broadcast-ping attempts, invite links,
//! character floods, and word repetition. A finding with a severity hint
//! of 4 or higher lets the decision engine skip the AI call entirely.

use regex::Regex;

use crate::moderation::types::{QuickFinding, ViolationKind};

/// Caps rule only applies to text longer than this many characters.
const CAPS_MIN_LEN: usize = 10;
/// Uppercase-to-letter ratio above which the caps rule fires.
const CAPS_RATIO: f64 = 0.7;
/// More mention tokens than this is a mass mention.
const MAX_MENTIONS: usize = 5;
/// A single character repeated this many times is a flood.
const CHAR_FLOOD_RUN: usize = 10;
/// Word-repetition rule needs more words than this to apply.
const REPEAT_MIN_WORDS: usize = 3;
/// Total-to-distinct word ratio above which the repetition rule fires.
const REPEAT_RATIO: f64 = 3.0;

/// Deterministic, local pattern scan. Pure: no I/O, no failure mode.
pub struct PatternAnalyzer {
    mention_re: Regex,
    broadcast_re: Regex,
    invite_re: Regex,
}

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self {
            // Platform-native user mention tokens: <@123> or <@!123>
            mention_re: Regex::new(r"<@!?\d+>").unwrap(),
            // Broadcast pings typed as plain text (bypassing the native mention)
            broadcast_re: Regex::new(r"@everyone|@here").unwrap(),
            invite_re: Regex::new(r"(?i)discord\.gg/|discord\.com/invite/").unwrap(),
        }
    }

    /// Scan message text against every rule. Rules are independent and
    /// each fires at most once; findings may co-occur.
    pub fn scan(&self, text: &str) -> Vec<QuickFinding> {
        let mut findings = Vec::new();

        if let Some(f) = self.check_caps(text) {
            findings.push(f);
        }
        if self.mention_re.find_iter(text).count() > MAX_MENTIONS {
            findings.push(QuickFinding {
                kind: ViolationKind::Spam,
                severity_hint: 4,
                reason: "Mass mentions",
            });
        }
        if self.broadcast_re.is_match(text) {
            findings.push(QuickFinding {
                kind: ViolationKind::Spam,
                severity_hint: 3,
                reason: "Broadcast ping attempt",
            });
        }
        if self.invite_re.is_match(text) {
            findings.push(QuickFinding {
                kind: ViolationKind::Advertising,
                severity_hint: 3,
                reason: "Invite link",
            });
        }
        if has_char_flood(text, CHAR_FLOOD_RUN) {
            findings.push(QuickFinding {
                kind: ViolationKind::Spam,
                severity_hint: 2,
                reason: "Repeated characters",
            });
        }
        if let Some(f) = check_word_repetition(text) {
            findings.push(f);
        }

        findings
    }

    fn check_caps(&self, text: &str) -> Option<QuickFinding> {
        if text.chars().count() <= CAPS_MIN_LEN {
            return None;
        }
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        if letters == 0 {
            return None;
        }
        let caps = text.chars().filter(|c| c.is_uppercase()).count();
        if caps as f64 / letters as f64 > CAPS_RATIO {
            Some(QuickFinding {
                kind: ViolationKind::Spam,
                severity_hint: 2,
                reason: "Excessive caps",
            })
        } else {
            None
        }
    }
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// True if any single character repeats `run` or more times consecutively.
///
/// The regex crate has no backreferences, so this is a manual scan.
fn has_char_flood(text: &str, run: usize) -> bool {
    let mut current = None;
    let mut count = 0;
    for c in text.chars() {
        if Some(c) == current {
            count += 1;
            if count >= run {
                return true;
            }
        } else {
            current = Some(c);
            count = 1;
        }
    }
    false
}

/// Word-repetition rule: fires when the total-to-distinct word ratio
/// exceeds the threshold on messages with more than three words.
fn check_word_repetition(text: &str) -> Option<QuickFinding> {
    let words: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if words.len() <= REPEAT_MIN_WORDS {
        return None;
    }
    let distinct: std::collections::HashSet<&str> =
        words.iter().map(String::as_str).collect();
    if words.len() as f64 / distinct.len() as f64 > REPEAT_RATIO {
        Some(QuickFinding {
            kind: ViolationKind::Spam,
            severity_hint: 2,
            reason: "Repeated words",
        })
    } else {
        None
    }
}
