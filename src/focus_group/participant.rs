// src/focus_group/participant.rs
// PARTICIPANT AGENT
// Wraps one persona: renders its character sheet, answers questions in character,
// scores its own sentiment and tracks opinion drift.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::prompts::{
    format_context, participant_response_prompt, persona_system_prompt, shift_detection_prompt,
    PersonaSheet, SHIFT_SYSTEM_PROMPT,
};
use super::{DiscussionMessage, MessageRole, Phase};
use crate::brain::TextGenerator;
use crate::error::Result;
use crate::persona::Persona;

const CONTEXT_WINDOW: usize = 16;
const RESPONSE_MAX_TOKENS: u32 = 180;
const SHIFT_MAX_TOKENS: u32 = 60;
const PRIOR_DEADBAND: f64 = 0.2;
const SENTIMENT_DEADBAND: f64 = 0.25;

static POSITIVE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(like|love|useful|good|great|buy|helpful|positive)\b").expect("positive lexicon")
});
static NEGATIVE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(dislike|hate|bad|worry|concern|avoid|negative|skeptical)\b").expect("negative lexicon")
});

/// Lexicon score in [-1, 1]; 0 when no signal word appears.
pub fn sentiment_score(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let positive = POSITIVE_WORDS.find_iter(&lowered).count();
    let negative = NEGATIVE_WORDS.find_iter(&lowered).count();
    let total = positive + negative;
    if total == 0 {
        return 0.0;
    }
    ((positive as f64 - negative as f64) / total as f64).clamp(-1.0, 1.0)
}

/// Sign flip between the prior valence and the new sentiment, outside both deadbands.
pub fn heuristic_shift(prior: Option<f64>, sentiment: f64) -> bool {
    match prior {
        Some(v) => (v < -PRIOR_DEADBAND && sentiment > SENTIMENT_DEADBAND)
            || (v > PRIOR_DEADBAND && sentiment < -SENTIMENT_DEADBAND),
        None => false,
    }
}

/// Outcome of the opinion-shift step, tier by tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShiftAssessment {
    /// The classifier answered with usable JSON.
    Model { changed: bool, new_valence: Option<f64> },
    /// Classifier output was unusable; lexicon sign-flip rule instead.
    Heuristic(bool),
    /// Phase does not track shifts.
    Skipped,
}

impl ShiftAssessment {
    pub fn changed(&self) -> bool {
        match self {
            ShiftAssessment::Model { changed, .. } => *changed,
            ShiftAssessment::Heuristic(changed) => *changed,
            ShiftAssessment::Skipped => false,
        }
    }
}

#[derive(Deserialize)]
struct ShiftVerdict {
    changed_mind: bool,
    #[serde(default)]
    new_valence: Option<f64>,
}

fn level_text(value: f64) -> &'static str {
    if value >= 0.75 {
        "very"
    } else if value >= 0.45 {
        "moderately"
    } else {
        "not very"
    }
}

fn describe_openness(score: f64) -> &'static str {
    if score >= 80.0 {
        "You're naturally curious and enjoy experimenting with unfamiliar ideas and products."
    } else if score >= 50.0 {
        "You balance practical choices with occasional curiosity for new options."
    } else {
        "You prefer familiar, proven options and are cautious about novelty."
    }
}

fn describe_conscientiousness(score: f64) -> &'static str {
    if score >= 80.0 {
        "You're organized and deliberate, and you plan purchases carefully."
    } else if score >= 50.0 {
        "You're reasonably structured but can be flexible when needed."
    } else {
        "You're more spontaneous and less focused on rigid planning."
    }
}

fn describe_extraversion(score: f64) -> &'static str {
    if score >= 70.0 {
        "You're socially energetic, quick to speak, and comfortable leading discussions."
    } else if score >= 40.0 {
        "You're socially balanced and speak up when you have something useful to add."
    } else {
        "You're reserved and usually concise unless directly asked."
    }
}

fn describe_agreeableness(score: f64) -> &'static str {
    if score >= 70.0 {
        "You're cooperative and inclined to find common ground with others."
    } else if score >= 30.0 {
        "You're polite but still willing to disagree when it matters."
    } else {
        "You're independent-minded and do not go along just to keep the peace."
    }
}

fn describe_neuroticism(score: f64) -> &'static str {
    if score >= 70.0 {
        "You tend to worry about risks and downside scenarios, so reassurance matters."
    } else if score >= 40.0 {
        "You notice risks but usually keep concerns in proportion."
    } else {
        "You're emotionally steady and not easily rattled by uncertainty."
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub persona: Persona,
    pub times_spoken: usize,
}

impl Participant {
    pub fn new(persona: Persona) -> Self {
        Self {
            persona,
            times_spoken: 0,
        }
    }

    pub fn id(&self) -> String {
        self.persona.id.to_string()
    }

    pub fn name(&self) -> &str {
        &self.persona.name
    }

    /// Character sheet in trait buckets; no raw scores leak into the prompt.
    pub fn build_system_prompt(&self) -> String {
        let p = &self.persona;
        let ocean = p.ocean();
        let personality = [
            describe_openness(ocean.openness),
            describe_conscientiousness(ocean.conscientiousness),
            describe_extraversion(ocean.extraversion),
            describe_agreeableness(ocean.agreeableness),
            describe_neuroticism(ocean.neuroticism),
        ];
        let communication_style = format!(
            "You usually communicate in a {} way with {} vocabulary. You're typically {} in how much you say.",
            p.voice.communication_style, p.voice.vocabulary_level, p.voice.verbosity
        );
        let consumer_behavior = format!(
            "You're generally {} price-sensitive, {} brand-loyal, and {} likely to research before buying. \
            Your decision style is {}.",
            level_text(p.consumer.price_sensitivity),
            level_text(p.consumer.brand_loyalty),
            level_text(p.consumer.research_tendency),
            p.consumer.decision_style
        );
        let location = p.location_label();
        let engagement = p.consumer.category_engagement.to_string();

        persona_system_prompt(&PersonaSheet {
            name: &p.name,
            age: p.demographics.age,
            occupation: &p.demographics.occupation,
            location: &location,
            personality: &personality,
            communication_style: &communication_style,
            consumer_behavior: &consumer_behavior,
            category_engagement: &engagement,
            initial_opinion: p.initial_opinion.as_deref(),
        })
    }

    /// Answers `question` in character. `context` is everything said so far; only the
    /// tail is shown to the model. Brain failures propagate.
    pub async fn respond(
        &mut self,
        brain: &dyn TextGenerator,
        question: &str,
        context: &[DiscussionMessage],
        phase: Phase,
        temperature: f32,
    ) -> Result<DiscussionMessage> {
        let system_prompt = self.build_system_prompt();
        let window = &context[context.len().saturating_sub(CONTEXT_WINDOW)..];
        let user_prompt = participant_response_prompt(phase, &format_context(window), question);

        let raw = brain
            .complete(&system_prompt, &user_prompt, temperature, RESPONSE_MAX_TOKENS)
            .await?;
        let content = raw.trim().to_string();
        let sentiment = sentiment_score(&content);

        let assessment = if phase.tracks_opinion_shift() {
            self.detect_shift(brain, &content, sentiment).await
        } else {
            ShiftAssessment::Skipped
        };
        let changed_mind = self.apply_shift(assessment, sentiment);
        self.times_spoken += 1;

        Ok(DiscussionMessage {
            role: MessageRole::Participant,
            speaker_id: self.id(),
            speaker_name: self.persona.name.clone(),
            content,
            phase,
            turn_number: context.len() + 1,
            replied_to: None,
            sentiment: Some(sentiment),
            changed_mind,
        })
    }

    /// Classifier first, lexicon heuristic on any failure. Never errors.
    pub async fn detect_shift(&self, brain: &dyn TextGenerator, response: &str, sentiment: f64) -> ShiftAssessment {
        let prompt = shift_detection_prompt(
            self.persona.initial_opinion.as_deref(),
            self.persona.opinion_valence,
            response,
        );
        let heuristic = || ShiftAssessment::Heuristic(heuristic_shift(self.persona.opinion_valence, sentiment));

        let raw = match brain.complete_json(SHIFT_SYSTEM_PROMPT, &prompt, 0.0, SHIFT_MAX_TOKENS).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(persona = %self.persona.name, error = %err, "PARTICIPANT: Shift classifier failed");
                return heuristic();
            }
        };
        match serde_json::from_str::<ShiftVerdict>(&raw) {
            Ok(verdict) => ShiftAssessment::Model {
                changed: verdict.changed_mind,
                new_valence: verdict.new_valence.filter(|v| v.is_finite()),
            },
            Err(_) => heuristic(),
        }
    }

    /// Overwrites the valence on a confirmed shift; returns the changed-mind flag.
    fn apply_shift(&mut self, assessment: ShiftAssessment, sentiment: f64) -> bool {
        let new_valence = match assessment {
            ShiftAssessment::Model { changed: true, new_valence } => new_valence.unwrap_or(sentiment),
            ShiftAssessment::Heuristic(true) => sentiment,
            _ => return false,
        };
        let before = self.persona.opinion_valence;
        self.persona.opinion_valence = Some(new_valence.clamp(-1.0, 1.0));
        debug!(
            persona = %self.persona.name,
            before = ?before,
            after = ?self.persona.opinion_valence,
            "PARTICIPANT: Opinion shifted"
        );
        true
    }

    /// Named in the question: always. Otherwise a draw against the extraversion tier.
    pub fn should_speak<R: Rng + ?Sized>(
        &self,
        _phase: Phase,
        _turn: usize,
        question: Option<&str>,
        rng: &mut R,
    ) -> bool {
        if let Some(q) = question {
            if q.to_lowercase().contains(&self.persona.name.to_lowercase()) {
                return true;
            }
        }
        let e = self.persona.extraversion();
        let threshold = if e >= 70.0 {
            0.85
        } else if e >= 40.0 {
            0.60
        } else {
            0.35
        };
        rng.gen::<f64>() < threshold
    }
}
