//! Timer detection in recipe instruction text
//!
//! Finds a duration such as "20 minutes" in an instruction and picks a
//! short label ("Simmer", "Bake", ...) from the cooking verbs around it.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Label used when no vocabulary keyword matches
pub const FALLBACK_LABEL: &str = "Timer";

/// Confidence reported for the fallback label
const FALLBACK_CONFIDENCE: f64 = 0.1;

struct LabelEntry {
    label: &'static str,
    keywords: &'static [&'static str],
    /// Higher priority wins ties
    priority: u8,
}

const VOCABULARY: &[LabelEntry] = &[
    // Cooking methods
    LabelEntry {
        label: "Bake",
        keywords: &["bake", "baking", "baked", "oven", "roast", "roasting", "roasted"],
        priority: 10,
    },
    LabelEntry {
        label: "Boil",
        keywords: &["boil", "boiling", "boiled", "bubbling", "rolling boil"],
        priority: 10,
    },
    LabelEntry {
        label: "Simmer",
        keywords: &["simmer", "simmering", "simmered", "gentle boil", "low heat"],
        priority: 10,
    },
    LabelEntry {
        label: "Fry",
        keywords: &[
            "fry", "frying", "fried", "pan fry", "deep fry", "sauté", "sautéing", "sautéed",
        ],
        priority: 10,
    },
    LabelEntry {
        label: "Grill",
        keywords: &["grill", "grilling", "grilled", "barbecue", "bbq", "char"],
        priority: 10,
    },
    LabelEntry {
        label: "Steam",
        keywords: &["steam", "steaming", "steamed", "steam basket"],
        priority: 10,
    },
    LabelEntry {
        label: "Braise",
        keywords: &["braise", "braising", "braised", "slow cook"],
        priority: 9,
    },
    LabelEntry {
        label: "Broil",
        keywords: &["broil", "broiling", "broiled", "broiler"],
        priority: 9,
    },
    // Preparation techniques
    LabelEntry {
        label: "Blend",
        keywords: &["blend", "blending", "blended"],
        priority: 9,
    },
    LabelEntry {
        label: "Mix",
        keywords: &[
            "mix", "mixing", "mixed", "combine", "combining", "stir", "stirring", "whisk",
            "whisking",
        ],
        priority: 8,
    },
    LabelEntry {
        label: "Knead",
        keywords: &["knead", "kneading", "kneaded", "work dough", "massage"],
        priority: 9,
    },
    LabelEntry {
        label: "Beat",
        keywords: &["beat", "beating", "beaten", "whip", "whipping", "whipped"],
        priority: 8,
    },
    LabelEntry {
        label: "Cream",
        keywords: &["cream", "creaming", "creamed", "cream together"],
        priority: 8,
    },
    LabelEntry {
        label: "Fold",
        keywords: &["fold", "folding", "folded", "fold in", "gently combine"],
        priority: 8,
    },
    // Temperature and resting
    LabelEntry {
        label: "Cool",
        keywords: &["cool", "cooling", "cooled", "cool down", "room temperature"],
        priority: 9,
    },
    LabelEntry {
        label: "Chill",
        keywords: &[
            "chill", "chilling", "chilled", "refrigerate", "refrigerating", "refrigerated",
            "fridge",
        ],
        priority: 9,
    },
    LabelEntry {
        label: "Freeze",
        keywords: &["freeze", "freezing", "frozen", "freezer"],
        priority: 9,
    },
    LabelEntry {
        label: "Rest",
        keywords: &[
            "rest", "resting", "rested", "sit", "sitting", "stand", "standing", "let stand",
        ],
        priority: 8,
    },
    LabelEntry {
        label: "Rise",
        keywords: &[
            "rise", "rising", "risen", "proof", "proofing", "proofed", "double in size",
        ],
        priority: 9,
    },
    // Specialized techniques
    LabelEntry {
        label: "Marinate",
        keywords: &["marinate", "marinating", "marinated", "marinade"],
        priority: 7,
    },
    LabelEntry {
        label: "Steep",
        keywords: &["steep", "steeping", "steeped", "infuse", "infusing"],
        priority: 7,
    },
    LabelEntry {
        label: "Bloom",
        keywords: &["bloom", "blooming", "bloomed", "activate", "dissolve"],
        priority: 7,
    },
    LabelEntry {
        label: "Reduce",
        keywords: &["reduce", "reducing", "reduced", "thicken", "concentrate"],
        priority: 7,
    },
    LabelEntry {
        label: "Caramelize",
        keywords: &["caramelize", "caramelizing", "caramelized", "golden brown"],
        priority: 7,
    },
    // Baking
    LabelEntry {
        label: "Preheat",
        keywords: &["preheat", "preheating", "preheated", "heat oven", "warm oven"],
        priority: 6,
    },
    LabelEntry {
        label: "Proof",
        keywords: &["proof", "proofing", "proofed", "activate yeast", "bloom yeast"],
        priority: 7,
    },
    LabelEntry {
        label: "Set",
        keywords: &["set", "setting", "firm up", "solidify"],
        priority: 6,
    },
    // Generic
    LabelEntry {
        label: "Cook",
        keywords: &["cook", "cooking", "cooked", "heat", "heating", "heated"],
        priority: 5,
    },
    LabelEntry {
        label: "Prepare",
        keywords: &["prepare", "preparing", "prepared", "prep"],
        priority: 4,
    },
    LabelEntry {
        label: "Process",
        keywords: &["process", "processing", "processed"],
        priority: 4,
    },
    LabelEntry {
        label: "Wait",
        keywords: &["wait", "waiting", "hold", "pause"],
        priority: 3,
    },
];

/// Label guess for an instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelMatch {
    pub label: String,
    pub confidence: f64,
}

impl LabelMatch {
    fn fallback() -> Self {
        Self {
            label: FALLBACK_LABEL.to_string(),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

/// Timer found in an instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedTimer {
    /// Seconds
    pub duration: u64,
    pub label: String,
    pub confidence: f64,
    /// The matched duration text, e.g. "20 minutes"
    pub raw_time_text: String,
}

struct CompiledKeyword {
    keyword: &'static str,
    whole_word: Regex,
}

/// Whole-word regexes for every keyword, in vocabulary order
fn compiled_vocabulary() -> &'static [(&'static LabelEntry, Vec<CompiledKeyword>)] {
    static COMPILED: OnceLock<Vec<(&'static LabelEntry, Vec<CompiledKeyword>)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        VOCABULARY
            .iter()
            .map(|entry| {
                let keywords = entry
                    .keywords
                    .iter()
                    .copied()
                    .map(|keyword| CompiledKeyword {
                        keyword,
                        whole_word: Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword)))
                            .expect("Failed to compile keyword regex"),
                    })
                    .collect();
                (entry, keywords)
            })
            .collect()
    })
}

/// Pick a label from keyword frequency across the whole text
pub fn detect_timer_label(text: &str) -> LabelMatch {
    let lower = text.to_lowercase();

    let mut best: Option<(LabelMatch, u8)> = None;
    for (entry, keywords) in compiled_vocabulary() {
        let mut matches = 0.0;
        for keyword in keywords {
            if lower.contains(keyword.keyword) {
                matches += 1.0;
                if keyword.whole_word.is_match(text) {
                    matches += 0.5;
                }
            }
        }

        if matches == 0.0 {
            continue;
        }

        let confidence = matches / keywords.len() as f64 * f64::from(entry.priority);
        let better = match &best {
            None => true,
            Some((current, priority)) => {
                confidence > current.confidence
                    || (confidence == current.confidence && entry.priority > *priority)
            }
        };

        if better {
            best = Some((
                LabelMatch {
                    label: entry.label.to_string(),
                    confidence,
                },
                entry.priority,
            ));
        }
    }

    best.map(|(found, _)| found)
        .unwrap_or_else(LabelMatch::fallback)
}

/// Grammatical weight of a keyword: base form 3, gerund 2, past 1
fn verb_form(keyword: &str, label: &str) -> u8 {
    let keyword = keyword.to_lowercase();
    if keyword == label.to_lowercase() || (!keyword.ends_with("ing") && !keyword.ends_with("ed")) {
        3
    } else if keyword.ends_with("ing") {
        2
    } else {
        1
    }
}

/// Pick the verb closest before `time_index` (a byte offset into `text`).
///
/// A stronger verb form wins over proximity; among equal forms the closest
/// one wins.
pub fn detect_timer_label_with_proximity(text: &str, time_index: usize) -> LabelMatch {
    // (label, distance, verb form)
    let mut best: Option<(&'static str, usize, u8)> = None;

    for (entry, keywords) in compiled_vocabulary() {
        for keyword in keywords {
            for found in keyword.whole_word.find_iter(text) {
                if found.start() >= time_index {
                    continue;
                }

                let distance = time_index - found.start();
                let form = verb_form(keyword.keyword, entry.label);
                let better = match best {
                    None => true,
                    Some((_, best_distance, best_form)) => {
                        form > best_form || (form == best_form && distance < best_distance)
                    }
                };

                if better {
                    best = Some((entry.label, distance, form));
                }
            }
        }
    }

    match best {
        Some((label, _, _)) => LabelMatch {
            label: label.to_string(),
            confidence: 1.0,
        },
        None => LabelMatch::fallback(),
    }
}

#[derive(Debug, Clone, Copy)]
enum DurationUnit {
    Minutes,
    Hours,
    Seconds,
    HoursAndMinutes,
}

fn duration_patterns() -> &'static [(Regex, DurationUnit)] {
    static PATTERNS: OnceLock<Vec<(Regex, DurationUnit)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                r"(?i)(\d+)(?:[-–](\d+))?\s*(?:to\s+(\d+)\s*)?(?:minutes?|mins?|min)\b",
                DurationUnit::Minutes,
            ),
            (
                r"(?i)(\d+)(?:[-–](\d+))?\s*(?:to\s+(\d+)\s*)?(?:hours?|hrs?|hr)\b",
                DurationUnit::Hours,
            ),
            (
                r"(?i)(\d+)(?:[-–](\d+))?\s*(?:to\s+(\d+)\s*)?(?:seconds?|secs?|sec)\b",
                DurationUnit::Seconds,
            ),
            (
                r"(?i)(\d+)\s*(?:hours?|hrs?|h)\s*(?:and\s+)?(\d+)\s*(?:minutes?|mins?|m)\b",
                DurationUnit::HoursAndMinutes,
            ),
            (r"(?i)(\d+)h\s*(\d+)m\b", DurationUnit::HoursAndMinutes),
        ]
        .into_iter()
        .map(|(pattern, unit)| {
            (
                Regex::new(pattern).expect("Failed to compile duration regex"),
                unit,
            )
        })
        .collect()
    })
}

/// Find a timer in an instruction.
///
/// Patterns are tried in order (minutes, hours, seconds, combined) and the
/// first one that matches anywhere in the text decides the duration; for a
/// range such as "2-3 minutes" the lower bound is used. Returns `None` when
/// no positive duration is found.
pub fn parse_timer_from_text(text: &str) -> Option<DetectedTimer> {
    for (pattern, unit) in duration_patterns() {
        let Some(captures) = pattern.captures(text) else {
            continue;
        };

        let whole = captures.get(0)?;
        let number = |index: usize| -> u64 {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        // Durations too large to represent count as no timer
        let duration = match unit {
            DurationUnit::Minutes => number(1).checked_mul(60),
            DurationUnit::Hours => number(1).checked_mul(60 * 60),
            DurationUnit::Seconds => Some(number(1)),
            DurationUnit::HoursAndMinutes => number(1)
                .checked_mul(60)
                .and_then(|minutes| minutes.checked_add(number(2)))
                .and_then(|minutes| minutes.checked_mul(60)),
        };

        let duration = duration.filter(|&secs| secs > 0)?;

        let label = detect_timer_label_with_proximity(text, whole.start());
        return Some(DetectedTimer {
            duration,
            label: label.label,
            confidence: label.confidence,
            raw_time_text: whole.as_str().to_string(),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_minutes_with_label() {
        let timer = parse_timer_from_text("Simmer for 20 minutes until thick").unwrap();
        assert_eq!(timer.duration, 1200);
        assert_eq!(timer.label, "Simmer");
        assert_eq!(timer.confidence, 1.0);
        assert_eq!(timer.raw_time_text, "20 minutes");
    }

    #[test]
    fn test_parses_hours_and_seconds() {
        let timer = parse_timer_from_text("Let the dough rise for 2 hours").unwrap();
        assert_eq!(timer.duration, 7200);
        assert_eq!(timer.label, "Rise");

        let timer = parse_timer_from_text("Blend for 30 seconds").unwrap();
        assert_eq!(timer.duration, 30);
        assert_eq!(timer.label, "Blend");
    }

    #[test]
    fn test_oversized_durations_are_ignored() {
        assert_eq!(parse_timer_from_text("Bake for 999999999999999999 minutes"), None);
        assert_eq!(parse_timer_from_text("Rest for 999999999999999999 hours"), None);
        assert_eq!(parse_timer_from_text("Roast 999999999999999999h 30m"), None);

        let timer = parse_timer_from_text("Wait 999999999999999999 seconds").unwrap();
        assert_eq!(timer.duration, 999_999_999_999_999_999);
    }

    #[test]
    fn test_range_uses_lower_bound() {
        let timer = parse_timer_from_text("Bake 25-30 min").unwrap();
        assert_eq!(timer.duration, 1500);
        assert_eq!(timer.label, "Bake");
    }

    #[test]
    fn test_compact_hours_and_minutes() {
        let timer = parse_timer_from_text("Roast 1h 30m").unwrap();
        assert_eq!(timer.duration, 5400);
        assert_eq!(timer.label, "Bake");
        assert_eq!(timer.raw_time_text, "1h 30m");
    }

    #[test]
    fn test_minutes_pattern_wins_over_hours() {
        // Minutes are tried first, so only the minutes part is picked up
        let timer = parse_timer_from_text("Braise for 1 hour 30 minutes").unwrap();
        assert_eq!(timer.duration, 1800);
    }

    #[test]
    fn test_no_duration() {
        assert_eq!(parse_timer_from_text("Season to taste"), None);
        assert_eq!(parse_timer_from_text("Rest for 0 minutes"), None);
    }

    #[test]
    fn test_label_falls_back_without_verb() {
        let timer = parse_timer_from_text("After 10 minutes, serve").unwrap();
        assert_eq!(timer.label, FALLBACK_LABEL);
        assert_eq!(timer.confidence, 0.1);
    }

    #[test]
    fn test_proximity_prefers_base_form_then_distance() {
        // "baked" is closer but "stir" is a base form
        let text = "Stir the baked crumbs for 5 minutes";
        let index = text.find("5 minutes").unwrap();
        assert_eq!(detect_timer_label_with_proximity(text, index).label, "Mix");

        // Two base forms: the closer one wins
        let text = "Mix, then bake for 5 minutes";
        let index = text.find("5 minutes").unwrap();
        assert_eq!(detect_timer_label_with_proximity(text, index).label, "Bake");
    }

    #[test]
    fn test_proximity_ignores_verbs_after_duration() {
        let text = "For 5 minutes, whisk";
        let index = text.find("5 minutes").unwrap();
        assert_eq!(
            detect_timer_label_with_proximity(text, index),
            LabelMatch::fallback()
        );
    }

    #[test]
    fn test_keyword_frequency_detection() {
        let found = detect_timer_label("Chill in the fridge, then refrigerate overnight");
        assert_eq!(found.label, "Chill");
        // chill, refrigerate and fridge: three whole-word hits out of seven
        // keywords, priority 9
        assert!((found.confidence - 4.5 / 7.0 * 9.0).abs() < 1e-9);

        assert_eq!(detect_timer_label("Serve warm"), LabelMatch::fallback());
    }

    #[test]
    fn test_detection_handles_accents() {
        let timer = parse_timer_from_text("Sauté the onions for 8 minutes").unwrap();
        assert_eq!(timer.label, "Fry");
        assert_eq!(timer.duration, 480);
    }
}
