//! Keyword rule tables and the dispatcher that applies them.
//!
//! Each [`RuleFamily`] owns one table of terms (Spanish + English) compiled
//! into a single Aho-Corasick automaton. Terms are normalized the same way
//! message text is, and matched as whole words/phrases against the padded
//! comparison form.
//!
//! ## Precedence
//! [`dispatch`] scans every family and [`RuleHits::decisive`] picks the
//! winner in [`RuleFamily::PRECEDENCE`] order. A refusal always beats an
//! affirmative token in the same message.

use super::normalize::normalize;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::sync::LazyLock;

// ── Families ─────────────────────────────────────────────────────

/// Named keyword family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleFamily {
    /// Refusal / stop terms.
    Negative,
    /// Affirmative / agreement terms.
    Explicit,
    /// Hedges that make an otherwise unmatched message ambiguous.
    Uncertainty,
    /// Sensitive-content markers; never decides the level, only forces
    /// confirmation.
    Sensitive,
}

impl RuleFamily {
    /// Families that can decide the consent level, strongest first.
    pub const PRECEDENCE: [RuleFamily; 3] = [Self::Negative, Self::Explicit, Self::Uncertainty];

    /// Order in which matched terms are reported.
    pub const REPORT_ORDER: [RuleFamily; 4] = [
        Self::Negative,
        Self::Explicit,
        Self::Uncertainty,
        Self::Sensitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Explicit => "explicit",
            Self::Uncertainty => "uncertainty",
            Self::Sensitive => "sensitive",
        }
    }

    fn terms(&self) -> &'static [&'static str] {
        match self {
            Self::Negative => NEGATIVE_TERMS,
            Self::Explicit => EXPLICIT_TERMS,
            Self::Uncertainty => UNCERTAINTY_TERMS,
            Self::Sensitive => SENSITIVE_TERMS,
        }
    }
}

// ── Tables ───────────────────────────────────────────────────────

const NEGATIVE_TERMS: &[&str] = &[
    "no",
    "no quiero",
    "no gracias",
    "no acepto",
    "no consiento",
    "no me gusta",
    "no estoy de acuerdo",
    "basta",
    "para ya",
    "detente",
    "déjame en paz",
    "ni hablar",
    "nunca",
    "jamás",
    "rechazo",
    "stop",
    "don't",
    "do not",
    "i don't want",
    "no thanks",
    "no way",
    "not ok",
    "not okay",
    "i refuse",
    "never",
    "leave me alone",
];

const EXPLICIT_TERMS: &[&str] = &[
    "sí",
    "claro",
    "de acuerdo",
    "vale",
    "acepto",
    "consiento",
    "doy mi consentimiento",
    "por supuesto",
    "me parece bien",
    "está bien",
    "adelante",
    "dale",
    "perfecto",
    "yes",
    "sure",
    "ok",
    "okay",
    "agreed",
    "i agree",
    "i consent",
    "of course",
    "go ahead",
];

const UNCERTAINTY_TERMS: &[&str] = &[
    "tal vez",
    "quizás",
    "quizá",
    "a lo mejor",
    "puede ser",
    "depende",
    "ya veremos",
    "déjame pensarlo",
    "maybe",
    "perhaps",
    "not sure",
    "i guess",
    "let me think",
    "dunno",
];

const SENSITIVE_TERMS: &[&str] = &[
    "foto",
    "fotos",
    "video",
    "videos",
    "selfie",
    "desnudo",
    "desnuda",
    "desnudos",
    "sin ropa",
    "íntimo",
    "íntima",
    "sexting",
    "photo",
    "photos",
    "pic",
    "pics",
    "nude",
    "nudes",
    "naked",
    "sexy",
];

// ── Compiled tables ──────────────────────────────────────────────

struct CompiledFamily {
    family: RuleFamily,
    /// Normalized terms, index-aligned with the automaton's pattern ids.
    terms: Vec<String>,
    automaton: AhoCorasick,
}

impl CompiledFamily {
    fn compile(family: RuleFamily) -> Self {
        let terms: Vec<String> = family.terms().iter().map(|t| normalize(t)).collect();
        let padded: Vec<String> = terms.iter().map(|t| format!(" {t} ")).collect();
        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .build(&padded)
            .expect("consent rule tables are static and must compile");
        Self {
            family,
            terms,
            automaton,
        }
    }
}

static COMPILED: LazyLock<Vec<CompiledFamily>> = LazyLock::new(|| {
    RuleFamily::REPORT_ORDER
        .iter()
        .map(|family| CompiledFamily::compile(*family))
        .collect()
});

// ── Dispatch ─────────────────────────────────────────────────────

/// One matched term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub family: RuleFamily,
    /// Canonical (normalized) term.
    pub term: String,
    /// Byte offset into the padded comparison form.
    pub start: usize,
    end: usize,
}

impl RuleMatch {
    /// Multi-word phrases are more specific than single tokens.
    pub fn is_specific(&self) -> bool {
        self.term.contains(' ')
    }
}

/// All matches of one message, grouped per family in text order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleHits {
    pub negative: Vec<RuleMatch>,
    pub explicit: Vec<RuleMatch>,
    pub uncertainty: Vec<RuleMatch>,
    pub sensitive: Vec<RuleMatch>,
}

impl RuleHits {
    pub fn family(&self, family: RuleFamily) -> &[RuleMatch] {
        match family {
            RuleFamily::Negative => &self.negative,
            RuleFamily::Explicit => &self.explicit,
            RuleFamily::Uncertainty => &self.uncertainty,
            RuleFamily::Sensitive => &self.sensitive,
        }
    }

    fn family_mut(&mut self, family: RuleFamily) -> &mut Vec<RuleMatch> {
        match family {
            RuleFamily::Negative => &mut self.negative,
            RuleFamily::Explicit => &mut self.explicit,
            RuleFamily::Uncertainty => &mut self.uncertainty,
            RuleFamily::Sensitive => &mut self.sensitive,
        }
    }

    /// The family that decides the consent level, if any.
    pub fn decisive(&self) -> Option<RuleFamily> {
        RuleFamily::PRECEDENCE
            .into_iter()
            .find(|family| !self.family(*family).is_empty())
    }

    /// Matched terms across all families, in report order, deduplicated.
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        for family in RuleFamily::REPORT_ORDER {
            for m in self.family(family) {
                if !keywords.contains(&m.term) {
                    keywords.push(m.term.clone());
                }
            }
        }
        keywords
    }

    pub fn has_sensitive_content(&self) -> bool {
        !self.sensitive.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        RuleFamily::REPORT_ORDER
            .iter()
            .all(|family| self.family(*family).is_empty())
    }
}

/// Run every family's table against a padded comparison form
/// (see [`super::normalize::padded`]).
pub fn dispatch(padded: &str) -> RuleHits {
    let mut hits = RuleHits::default();

    for compiled in COMPILED.iter() {
        let mut found: Vec<RuleMatch> = compiled
            .automaton
            .find_overlapping_iter(padded)
            .map(|m| RuleMatch {
                family: compiled.family,
                term: compiled.terms[m.pattern().as_usize()].clone(),
                start: m.start(),
                end: m.end(),
            })
            .collect();

        // "no quiero" swallows its own "no".
        let spans: Vec<(usize, usize)> = found.iter().map(|m| (m.start, m.end)).collect();
        found.retain(|m| {
            !spans.iter().any(|&(s, e)| {
                s <= m.start && m.end <= e && (e - s) > (m.end - m.start)
            })
        });
        found.sort_by_key(|m| (m.start, m.end));
        let mut seen: Vec<String> = Vec::with_capacity(found.len());
        found.retain(|m| {
            if seen.contains(&m.term) {
                false
            } else {
                seen.push(m.term.clone());
                true
            }
        });

        *hits.family_mut(compiled.family) = found;
    }

    hits
}
