//! Deterministic consent analyzer.
//!
//! Pure function of (text, context, options): no I/O, no shared mutable
//! state, safe to call from any number of tasks at once.
//!
//! ## Pipeline
//! 1. Normalize text to its comparison form (case, accents, punctuation).
//! 2. Run the rule dispatcher over every family.
//! 3. The decisive family sets the level; confidence comes from
//!    [`ConsentThresholds`].
//! 4. Media message types and sensitive-content markers force confirmation.

use super::error::ThresholdError;
use super::normalize::{normalize, padded, word_count};
use super::rules::{dispatch, RuleFamily, RuleHits, RuleMatch};
use super::types::{
    AnalyzeOptions, ConsentAnalysis, ConsentLevel, MessageType, SuggestedAction,
};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Characters of the original message quoted in the explanation.
const EXPLANATION_EXCERPT_CHARS: usize = 80;

// ── Thresholds ───────────────────────────────────────────────────

/// Heuristic confidence constants. Overridable through config; the defaults
/// are the long-standing values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ConsentThresholds {
    /// Confidence of a single refusal term. Must stay at or above 70.
    pub negative_base: u8,
    /// Added per additional refusal term.
    pub negative_step: u8,
    /// Added once when any multi-word refusal phrase matched.
    pub negative_specificity_bonus: u8,
    /// Confidence of a single affirmative term. Must stay above 50.
    pub explicit_base: u8,
    /// Added per additional corroborating affirmative term.
    pub explicit_step: u8,
    /// Confidence of an ambiguous verdict before hedge terms are counted.
    pub ambiguous_base: u8,
    /// Added per hedge term.
    pub uncertainty_step: u8,
    /// Upper bound for ambiguous confidence. Must stay at or below 50.
    pub ambiguous_ceiling: u8,
    /// Word count at which an unmatched message counts as ambiguous.
    pub ambiguous_min_words: usize,
    /// Confidence of a non-empty message with no signal.
    pub none_confidence: u8,
}

impl Default for ConsentThresholds {
    fn default() -> Self {
        Self {
            negative_base: 70,
            negative_step: 10,
            negative_specificity_bonus: 10,
            explicit_base: 60,
            explicit_step: 10,
            ambiguous_base: 35,
            uncertainty_step: 5,
            ambiguous_ceiling: 50,
            ambiguous_min_words: 4,
            none_confidence: 20,
        }
    }
}

impl ConsentThresholds {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        let bounded = [
            ("negative_base", self.negative_base),
            ("negative_step", self.negative_step),
            ("negative_specificity_bonus", self.negative_specificity_bonus),
            ("explicit_base", self.explicit_base),
            ("explicit_step", self.explicit_step),
            ("ambiguous_base", self.ambiguous_base),
            ("uncertainty_step", self.uncertainty_step),
            ("ambiguous_ceiling", self.ambiguous_ceiling),
            ("none_confidence", self.none_confidence),
        ];
        for (name, value) in bounded {
            if value > 100 {
                return Err(ThresholdError::OutOfRange { name, value });
            }
        }
        if self.negative_base < 70 {
            return Err(ThresholdError::NegativeTooLow(self.negative_base));
        }
        if self.explicit_base <= 50 {
            return Err(ThresholdError::ExplicitTooLow(self.explicit_base));
        }
        if self.ambiguous_ceiling > 50 {
            return Err(ThresholdError::AmbiguousTooHigh(self.ambiguous_ceiling));
        }
        if self.ambiguous_base > self.ambiguous_ceiling {
            return Err(ThresholdError::AmbiguousBaseAboveCeiling {
                base: self.ambiguous_base,
                ceiling: self.ambiguous_ceiling,
            });
        }
        Ok(())
    }
}

/// Base plus a per-extra-match step, clamped to 0-100.
fn scaled(base: u8, step: u8, matches: usize, bonus: u8) -> u8 {
    let extra = matches.saturating_sub(1) as u32;
    let score = u32::from(base) + u32::from(step) * extra + u32::from(bonus);
    score.min(100) as u8
}

// ── Analyzer ─────────────────────────────────────────────────────

/// Consent analyzer. Cheap to clone; holds only its thresholds.
#[derive(Debug, Clone, Default)]
pub struct ConsentAnalyzer {
    thresholds: ConsentThresholds,
}

/// What the dispatcher decided, before it is turned into an analysis.
struct Verdict {
    level: ConsentLevel,
    confidence: u8,
    rule: String,
}

impl ConsentAnalyzer {
    /// Create an analyzer with custom thresholds.
    pub fn new(thresholds: ConsentThresholds) -> Result<Self, ThresholdError> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &ConsentThresholds {
        &self.thresholds
    }

    /// Classify one message. Never fails.
    pub fn analyze(&self, text: &str, context: &str, options: &AnalyzeOptions) -> ConsentAnalysis {
        let message_type = options.message_type.clone().unwrap_or_default();
        let normalized = normalize(text);
        let hits = if normalized.is_empty() {
            RuleHits::default()
        } else {
            dispatch(&padded(&normalized))
        };

        let verdict = if normalized.is_empty() {
            Verdict {
                level: ConsentLevel::None,
                confidence: 0,
                rule: "none rule: empty message".to_string(),
            }
        } else {
            self.decide(text, &normalized, &hits)
        };

        let type_sensitive = message_type.is_sensitive();
        let content_sensitive = hits.has_sensitive_content();
        let requires_confirmation = type_sensitive || content_sensitive;

        let suggested_action = match verdict.level {
            ConsentLevel::Negative => SuggestedAction::Block,
            _ if requires_confirmation => SuggestedAction::Confirm,
            ConsentLevel::Explicit => SuggestedAction::Allow,
            ConsentLevel::Ambiguous | ConsentLevel::None => SuggestedAction::Review,
        };

        let mut explanation = verdict.rule;
        if type_sensitive {
            explanation.push_str(&format!(
                "; confirmation required for {message_type} messages"
            ));
        }
        if content_sensitive {
            explanation.push_str(&format!(
                "; confirmation required for sensitive content {}",
                term_list(&hits.sensitive)
            ));
        }
        if !normalized.is_empty() {
            explanation.push_str(&format!("; message \"{}\"", excerpt(text)));
        }

        ConsentAnalysis {
            consent_level: verdict.level,
            confidence: verdict.confidence,
            keywords: hits.keywords(),
            context: context.to_string(),
            requires_confirmation,
            suggested_action,
            explanation,
            timestamp: Utc::now(),
        }
    }

    /// Convenience wrapper for the common "text + type tag" call.
    pub fn analyze_with_type(&self, text: &str, context: &str, message_type: &str) -> ConsentAnalysis {
        self.analyze(
            text,
            context,
            &AnalyzeOptions::with_message_type(MessageType::parse(message_type)),
        )
    }

    fn decide(&self, original: &str, normalized: &str, hits: &RuleHits) -> Verdict {
        let t = &self.thresholds;

        match hits.decisive() {
            Some(RuleFamily::Negative) => {
                let bonus = if hits.negative.iter().any(RuleMatch::is_specific) {
                    t.negative_specificity_bonus
                } else {
                    0
                };
                let mut rule = format!(
                    "negative rule: refusal terms {}",
                    term_list(&hits.negative)
                );
                if !hits.explicit.is_empty() {
                    rule.push_str(&format!(
                        " take precedence over affirmative terms {}",
                        term_list(&hits.explicit)
                    ));
                }
                Verdict {
                    level: ConsentLevel::Negative,
                    confidence: scaled(t.negative_base, t.negative_step, hits.negative.len(), bonus),
                    rule,
                }
            }
            Some(RuleFamily::Explicit) => Verdict {
                level: ConsentLevel::Explicit,
                confidence: scaled(t.explicit_base, t.explicit_step, hits.explicit.len(), 0),
                rule: format!(
                    "explicit rule: affirmative terms {}",
                    term_list(&hits.explicit)
                ),
            },
            Some(RuleFamily::Uncertainty) => {
                let score = u32::from(t.ambiguous_base)
                    + u32::from(t.uncertainty_step) * hits.uncertainty.len() as u32;
                Verdict {
                    level: ConsentLevel::Ambiguous,
                    confidence: score.min(u32::from(t.ambiguous_ceiling)) as u8,
                    rule: format!(
                        "ambiguous rule: hedging terms {}",
                        term_list(&hits.uncertainty)
                    ),
                }
            }
            Some(RuleFamily::Sensitive) | None => {
                if let Some(shape) = self.uncertain_shape(original, normalized) {
                    Verdict {
                        level: ConsentLevel::Ambiguous,
                        confidence: t.ambiguous_base.min(t.ambiguous_ceiling),
                        rule: format!("ambiguous rule: no consent terms, {shape}"),
                    }
                } else {
                    Verdict {
                        level: ConsentLevel::None,
                        confidence: t.none_confidence.min(t.ambiguous_ceiling),
                        rule: "none rule: no consent terms matched".to_string(),
                    }
                }
            }
        }
    }

    /// Why an unmatched message still reads as uncertain, if it does.
    fn uncertain_shape(&self, original: &str, normalized: &str) -> Option<&'static str> {
        if original.contains('?') || original.contains('¿') {
            Some("message is a question")
        } else if original.contains("...") || original.contains('…') {
            Some("message trails off")
        } else if word_count(normalized) >= self.thresholds.ambiguous_min_words {
            Some("message is long enough to carry an unclear signal")
        } else {
            None
        }
    }
}

fn term_list(matches: &[RuleMatch]) -> String {
    let terms: Vec<&str> = matches.iter().map(|m| m.term.as_str()).collect();
    format!("[{}]", terms.join(", "))
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    let mut out: String = trimmed.chars().take(EXPLANATION_EXCERPT_CHARS).collect();
    if trimmed.chars().count() > EXPLANATION_EXCERPT_CHARS {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &[&str] = &[
        "",
        "   ",
        "sí, de acuerdo",
        "SI CLARO, por supuesto",
        "no quiero, basta",
        "no",
        "sí pero no",
        "ok... no sé, tal vez",
        "yes, go ahead, I agree",
        "I don't want this, stop",
        "te mando foto",
        "mensaje",
        "¿qué opinas?",
        "bueno, ya hablaremos de esto mañana por la tarde",
        "nosotros okupamos el sitio",
        "quizás mañana",
        "desnuda, sí, no",
        "🙂🙂🙂",
    ];

    const SENSITIVE_TYPES: &[&str] = &["image", "video", "audio", "voice", "file", "document"];

    fn analyzer() -> ConsentAnalyzer {
        ConsentAnalyzer::default()
    }

    fn analyze(text: &str) -> ConsentAnalysis {
        analyzer().analyze(text, "chat", &AnalyzeOptions::default())
    }

    #[test]
    fn spanish_agreement_is_explicit() {
        let analysis = analyze("sí, de acuerdo");
        assert_eq!(analysis.consent_level, ConsentLevel::Explicit);
        assert!(analysis.confidence > 50);
        assert_eq!(analysis.keywords, vec!["si", "de acuerdo"]);
        assert_eq!(analysis.suggested_action, SuggestedAction::Allow);
        assert!(!analysis.requires_confirmation);
        assert_eq!(analysis.context, "chat");
    }

    #[test]
    fn spanish_refusal_is_negative() {
        let analysis = analyze("no quiero, basta");
        assert_eq!(analysis.consent_level, ConsentLevel::Negative);
        assert!(analysis.confidence >= 70);
        assert_eq!(analysis.suggested_action, SuggestedAction::Block);
        assert!(analysis.explanation.starts_with("negative rule"));
    }

    #[test]
    fn image_message_requires_confirmation() {
        let analysis = analyzer().analyze_with_type("te mando foto", "chat", "image");
        assert!(analysis.requires_confirmation);
        assert_eq!(analysis.suggested_action, SuggestedAction::Confirm);
        assert!(analysis.explanation.contains("image messages"));
    }

    #[test]
    fn sensitive_content_requires_confirmation_for_text() {
        let analysis = analyzer().analyze_with_type("sí, te mando foto", "chat", "text");
        assert_eq!(analysis.consent_level, ConsentLevel::Explicit);
        assert!(analysis.requires_confirmation);
        assert_eq!(analysis.suggested_action, SuggestedAction::Confirm);
        assert!(analysis.keywords.contains(&"foto".to_string()));
    }

    #[test]
    fn empty_message_is_none_with_zero_confidence() {
        for text in ["", "   \n\t"] {
            let analysis = analyze(text);
            assert_eq!(analysis.consent_level, ConsentLevel::None);
            assert_eq!(analysis.confidence, 0);
            assert!(!analysis.requires_confirmation);
            assert!(analysis.keywords.is_empty());
            assert!(!analysis.explanation.is_empty());
        }
    }

    #[test]
    fn empty_media_message_still_requires_confirmation() {
        let analysis = analyzer().analyze_with_type("", "chat", "video");
        assert_eq!(analysis.consent_level, ConsentLevel::None);
        assert_eq!(analysis.confidence, 0);
        assert!(analysis.requires_confirmation);
    }

    #[test]
    fn hedges_and_question_shapes_are_ambiguous() {
        let hedge = analyze("quizás mañana");
        assert_eq!(hedge.consent_level, ConsentLevel::Ambiguous);
        assert!(hedge.confidence <= 50);

        let question = analyze("¿qué opinas?");
        assert_eq!(question.consent_level, ConsentLevel::Ambiguous);
        assert!(question.explanation.contains("question"));

        let long = analyze("bueno, ya hablaremos de esto mañana por la tarde");
        assert_eq!(long.consent_level, ConsentLevel::Ambiguous);
    }

    #[test]
    fn short_unmatched_message_is_none() {
        let analysis = analyze("mensaje");
        assert_eq!(analysis.consent_level, ConsentLevel::None);
        assert!(analysis.confidence <= 50);
        assert_eq!(analysis.suggested_action, SuggestedAction::Review);
    }

    #[test]
    fn corroborating_terms_raise_confidence() {
        let one = analyze("yes");
        let three = analyze("yes, go ahead, I agree");
        assert_eq!(one.confidence, 60);
        assert_eq!(three.confidence, 80);
    }

    #[test]
    fn accent_and_case_variants_classify_identically() {
        let a = analyze("Sí");
        let b = analyze("si");
        let c = analyze("SI");
        assert_eq!(a.consent_level, b.consent_level);
        assert_eq!(a.keywords, b.keywords);
        assert_eq!(b.confidence, c.confidence);
    }

    #[test]
    fn confidence_is_always_bounded() {
        for text in CORPUS {
            let analysis = analyze(text);
            assert!(analysis.confidence <= 100, "{text}");
        }
        let noisy = "no ".repeat(50) + &"basta stop never nunca jamás ".repeat(20);
        assert!(analyze(&noisy).confidence <= 100);
    }

    #[test]
    fn explicit_always_above_fifty() {
        for text in CORPUS {
            let analysis = analyze(text);
            if analysis.consent_level == ConsentLevel::Explicit {
                assert!(analysis.confidence > 50, "{text}");
            }
        }
    }

    #[test]
    fn refusal_beats_affirmation() {
        for text in ["sí pero no", "ok, stop", "de acuerdo... no, basta", "yes. never mind, no"] {
            let analysis = analyze(text);
            assert_eq!(analysis.consent_level, ConsentLevel::Negative, "{text}");
            assert_eq!(analysis.suggested_action, SuggestedAction::Block);
        }
        let mixed = analyze("sí pero no");
        assert!(mixed.explanation.contains("take precedence"));
    }

    #[test]
    fn sensitive_types_always_require_confirmation() {
        for kind in SENSITIVE_TYPES {
            for text in CORPUS {
                let analysis = analyzer().analyze_with_type(text, "chat", kind);
                assert!(analysis.requires_confirmation, "{kind}: {text}");
            }
        }
    }

    #[test]
    fn analysis_is_deterministic() {
        for text in CORPUS {
            let a = analyzer().analyze_with_type(text, "chat", "text");
            let b = analyzer().analyze_with_type(text, "chat", "text");
            assert_eq!(a.consent_level, b.consent_level);
            assert_eq!(a.confidence, b.confidence);
            assert_eq!(a.keywords, b.keywords);
            assert_eq!(a.requires_confirmation, b.requires_confirmation);
            assert_eq!(a.explanation, b.explanation);
        }
    }

    #[test]
    fn long_messages_are_excerpted() {
        let text = "a".repeat(200);
        let analysis = analyze(&text);
        assert!(analysis.explanation.ends_with("…\""));
        assert!(analysis.explanation.len() < 200);
    }

    #[test]
    fn custom_thresholds_are_applied() {
        let analyzer = ConsentAnalyzer::new(ConsentThresholds {
            explicit_base: 90,
            ..ConsentThresholds::default()
        })
        .unwrap();
        let analysis = analyzer.analyze("sí, de acuerdo", "chat", &AnalyzeOptions::default());
        assert_eq!(analysis.confidence, 100);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let low = ConsentThresholds {
            explicit_base: 50,
            ..ConsentThresholds::default()
        };
        assert_eq!(
            ConsentAnalyzer::new(low).unwrap_err(),
            ThresholdError::ExplicitTooLow(50)
        );

        let high = ConsentThresholds {
            ambiguous_ceiling: 60,
            ..ConsentThresholds::default()
        };
        assert!(matches!(
            high.validate(),
            Err(ThresholdError::AmbiguousTooHigh(60))
        ));

        let out_of_range = ConsentThresholds {
            negative_base: 150,
            ..ConsentThresholds::default()
        };
        assert!(matches!(
            out_of_range.validate(),
            Err(ThresholdError::OutOfRange { name: "negative_base", .. })
        ));
    }

    #[test]
    fn refusal_floor_cannot_be_lowered() {
        let lowered = ConsentThresholds {
            negative_base: 60,
            ..ConsentThresholds::default()
        };
        assert_eq!(
            ConsentAnalyzer::new(lowered).unwrap_err(),
            ThresholdError::NegativeTooLow(60)
        );

        let raised = ConsentAnalyzer::new(ConsentThresholds {
            negative_base: 80,
            ..ConsentThresholds::default()
        })
        .unwrap();
        let analysis = raised.analyze("no", "chat", &AnalyzeOptions::default());
        assert_eq!(analysis.consent_level, ConsentLevel::Negative);
        assert_eq!(analysis.confidence, 80);
    }

    #[test]
    fn default_thresholds_are_valid() {
        assert!(ConsentThresholds::default().validate().is_ok());
    }
}
