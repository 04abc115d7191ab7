// src/focus_group/moderator.rs
// MODERATOR AGENT
// Writes the questions, decides who answers, and occasionally probes deeper.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::{debug, info};

use super::participant::Participant;
use super::prompts::{moderator_question_prompt, MODERATOR_SYSTEM_PROMPT};
use super::{DiscussionConfig, DiscussionMessage, Phase};
use crate::brain::TextGenerator;
use crate::error::Result;

const QUESTION_TEMPERATURE: f32 = 0.7;
const QUESTION_MAX_TOKENS: u32 = 120;
const FOLLOWUP_PROBABILITY: f64 = 0.2;
const FOLLOWUP_SENTIMENT: f64 = 0.75;
const SUMMARY_WINDOW: usize = 10;
const SUMMARY_SNIPPETS: usize = 3;
const SNIPPET_CHARS: usize = 80;

const MIN_RESPONDENTS: usize = 3;
const QUIET_POOL_THRESHOLD: usize = 12;
const QUIET_POOL_SHARE: f64 = 0.4;
const QUIET_RESERVE_SHARE: f64 = 0.3;
const RECENT_QUESTIONS: usize = 3;
const ABSENT_BONUS: f64 = 2.0;
const SPEAK_PENALTY: f64 = 0.3;

/// Selection memory carried from one question to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    /// Times each persona id has been selected so far.
    pub speak_counts: HashMap<String, usize>,
    /// Selected ids for the most recent questions, oldest first.
    pub recent: VecDeque<HashSet<String>>,
}

impl SelectionState {
    pub fn speak_count(&self, id: &str) -> usize {
        self.speak_counts.get(id).copied().unwrap_or(0)
    }

    fn recent_union(&self) -> HashSet<&str> {
        self.recent.iter().flatten().map(String::as_str).collect()
    }

    fn record(&mut self, selected: HashSet<String>) {
        for id in &selected {
            *self.speak_counts.entry(id.clone()).or_default() += 1;
        }
        self.recent.push_back(selected);
        while self.recent.len() > RECENT_QUESTIONS {
            self.recent.pop_front();
        }
    }
}

pub struct Moderator {
    config: DiscussionConfig,
    rng: StdRng,
    guide: Vec<String>,
}

impl Moderator {
    pub fn new(config: DiscussionConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            guide: Vec::new(),
        }
    }

    pub fn config(&self) -> &DiscussionConfig {
        &self.config
    }

    pub fn discussion_guide(&self) -> &[String] {
        &self.guide
    }

    /// Drafts every question of the run up front, phase by phase.
    pub async fn generate_discussion_guide(&mut self, brain: &dyn TextGenerator) -> Result<Vec<String>> {
        let mut guide = Vec::with_capacity(self.config.phases.len() * self.config.questions_per_phase);
        for phase in self.config.phases.clone() {
            for _ in 0..self.config.questions_per_phase {
                guide.push(self.generate_question(brain, phase, &[], &[]).await?);
            }
        }
        info!(questions = guide.len(), "MODERATOR: Discussion guide ready");
        self.guide = guide.clone();
        Ok(guide)
    }

    pub async fn generate_question(
        &self,
        brain: &dyn TextGenerator,
        phase: Phase,
        transcript_so_far: &[DiscussionMessage],
        quiet: &[String],
    ) -> Result<String> {
        let prompt = moderator_question_prompt(
            phase,
            &self.config.product_concept,
            &self.config.category,
            self.config.stimulus_material.as_deref(),
            &summarize_recent(transcript_so_far),
            quiet,
        );
        let raw = brain
            .complete(MODERATOR_SYSTEM_PROMPT, &prompt, QUESTION_TEMPERATURE, QUESTION_MAX_TOKENS)
            .await?;
        let mut question = raw.trim().to_string();

        if let Some(first) = quiet.first() {
            let lowered = question.to_lowercase();
            if !quiet.iter().any(|name| lowered.contains(&name.to_lowercase())) {
                question = format!("{question} {first}, I want your take as well.");
            }
        }
        debug!(phase = %phase, "MODERATOR: {question}");
        Ok(question)
    }

    /// A probe for the last speaker, or `None`. Fires on a 20% draw, a changed mind,
    /// or a strongly charged answer.
    pub fn generate_followup(&mut self, last_response: &DiscussionMessage, _phase: Phase) -> Option<String> {
        let charged = last_response.sentiment.unwrap_or(0.0).abs() >= FOLLOWUP_SENTIMENT;
        let drawn = self.rng.gen::<f64>() < FOLLOWUP_PROBABILITY;
        if drawn || last_response.changed_mind || charged {
            Some(format!(
                "{}, can you expand on that specific point a bit more?",
                last_response.speaker_name
            ))
        } else {
            None
        }
    }

    /// Picks who answers `question`, as indices into `participants` in speaking order.
    ///
    /// Returns between `min(3, pool)` and `min(max_responses_per_question, pool)` people.
    /// Large pools reserve seats for the least extraverted, and anyone absent from the last
    /// three questions is favoured over frequent speakers.
    pub fn select_respondents(
        &mut self,
        participants: &[Participant],
        question: &str,
        phase: Phase,
        turn: usize,
        mut state: SelectionState,
    ) -> (Vec<usize>, SelectionState) {
        let pool = participants.len();
        if pool == 0 {
            return (Vec::new(), state);
        }

        // 1. Bounds
        let max_pick = self.config.max_responses_per_question.min(pool);
        let target = respondent_target(max_pick);

        let ids: Vec<String> = participants.iter().map(Participant::id).collect();
        let recent = state.recent_union();
        let absent = |i: usize| !recent.contains(ids[i].as_str());

        let mut chosen: Vec<usize> = Vec::with_capacity(max_pick);
        let mut taken = vec![false; pool];
        let mut take = |i: usize, chosen: &mut Vec<usize>| {
            if !taken[i] {
                taken[i] = true;
                chosen.push(i);
            }
        };

        // 2. Anyone addressed by name
        let lowered = question.to_lowercase();
        for (i, p) in participants.iter().enumerate() {
            if lowered.contains(&p.name().to_lowercase()) {
                take(i, &mut chosen);
            }
        }

        // 3. Quiet-pool reservation
        if pool > QUIET_POOL_THRESHOLD {
            let quiet_size = (pool as f64 * QUIET_POOL_SHARE).round_ties_even() as usize;
            let mut by_extraversion: Vec<usize> = (0..pool).collect();
            by_extraversion.sort_by(|a, b| {
                participants[*a]
                    .persona
                    .extraversion()
                    .total_cmp(&participants[*b].persona.extraversion())
            });
            let quiet = &by_extraversion[..quiet_size];
            let reserve = 1.max((target as f64 * QUIET_RESERVE_SHARE).round_ties_even() as usize);
            let already = chosen.iter().filter(|i| quiet.contains(i)).count();

            let mut candidates: Vec<usize> = quiet.iter().copied().filter(|i| !chosen.contains(i)).collect();
            candidates.sort_by_key(|i| (!absent(*i), state.speak_count(&ids[*i])));
            for i in candidates.into_iter().take(reserve.saturating_sub(already)) {
                take(i, &mut chosen);
            }
        }

        // 4. Never-spoken participants, most extraverted first
        let mut fresh: Vec<usize> = (0..pool)
            .filter(|i| !chosen.contains(i) && participants[*i].times_spoken == 0)
            .collect();
        fresh.sort_by(|a, b| {
            participants[*b]
                .persona
                .extraversion()
                .total_cmp(&participants[*a].persona.extraversion())
        });
        for i in fresh {
            if chosen.len() >= target {
                break;
            }
            take(i, &mut chosen);
        }

        // 5. Scored remainder, gated by willingness to speak
        let mut scored: Vec<(f64, usize)> = (0..pool)
            .filter(|i| !chosen.contains(i))
            .map(|i| {
                let jitter = self.rng.gen::<f64>();
                let bonus = if absent(i) { ABSENT_BONUS } else { 0.0 };
                let penalty = SPEAK_PENALTY * state.speak_count(&ids[i]) as f64;
                (jitter + bonus - penalty, i)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        for (_, i) in &scored {
            if chosen.len() >= target {
                break;
            }
            if participants[*i].should_speak(phase, turn, Some(question), &mut self.rng) {
                take(*i, &mut chosen);
            }
        }

        // 6. Minimum group size regardless of willingness
        for (_, i) in &scored {
            if chosen.len() >= MIN_RESPONDENTS {
                break;
            }
            take(*i, &mut chosen);
        }

        // 7. Cap and remember
        chosen.truncate(max_pick);
        drop(recent);
        state.record(chosen.iter().map(|i| ids[*i].clone()).collect());
        debug!(phase = %phase, turn, picked = chosen.len(), target, "MODERATOR: Respondents selected");
        (chosen, state)
    }
}

/// Replies aimed for per question: midway between the minimum and `max_pick`, halves to even.
fn respondent_target(max_pick: usize) -> usize {
    let midpoint = ((MIN_RESPONDENTS + max_pick) as f64 / 2.0).round_ties_even() as usize;
    max_pick.min(MIN_RESPONDENTS.max(midpoint))
}

/// Tone tally over the last ten participant messages plus the last three snippets.
pub fn summarize_recent(messages: &[DiscussionMessage]) -> String {
    if messages.is_empty() {
        return "No discussion yet.".to_string();
    }
    let participant_msgs: Vec<&DiscussionMessage> = messages.iter().filter(|m| m.is_participant()).collect();
    if participant_msgs.is_empty() {
        return "Moderator has introduced the session; participant viewpoints are pending.".to_string();
    }

    let (mut positive, mut neutral, mut negative) = (0, 0, 0);
    for m in participant_msgs.iter().rev().take(SUMMARY_WINDOW) {
        match m.sentiment.unwrap_or(0.0) {
            s if s > 0.2 => positive += 1,
            s if s < -0.2 => negative += 1,
            _ => neutral += 1,
        }
    }
    let snippets = participant_msgs[participant_msgs.len().saturating_sub(SUMMARY_SNIPPETS)..]
        .iter()
        .map(|m| {
            let snippet: String = m.content.chars().take(SNIPPET_CHARS).collect();
            format!("{}: {snippet}", m.speaker_name)
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "Recent tone -> positive: {positive}, neutral: {neutral}, negative: {negative}. Recent comments: {snippets}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockBrain;
    use crate::focus_group::MessageRole;
    use crate::persona_generator::PersonaGenerator;

    fn config(n: usize, max_responses: usize) -> DiscussionConfig {
        DiscussionConfig::builder("AI meal planner", "app")
            .num_personas(n.clamp(4, 48))
            .max_responses_per_question(max_responses)
            .build()
            .unwrap()
    }

    fn panel(n: usize) -> Vec<Participant> {
        PersonaGenerator::new(42)
            .generate(n, None, Some("AI meal planner"), Some("app"))
            .unwrap()
            .into_iter()
            .map(Participant::new)
            .collect()
    }

    fn reply(name: &str, sentiment: f64, changed_mind: bool) -> DiscussionMessage {
        DiscussionMessage {
            role: MessageRole::Participant,
            speaker_id: "p1".into(),
            speaker_name: name.into(),
            content: "ok".into(),
            phase: Phase::DeepDive,
            turn_number: 2,
            replied_to: None,
            sentiment: Some(sentiment),
            changed_mind,
        }
    }

    #[test]
    fn selection_stays_within_bounds() {
        for (n, max_responses) in [(4, 3), (8, 5), (13, 7), (20, 10), (48, 10)] {
            let participants = panel(n);
            let mut moderator = Moderator::new(config(n, max_responses));
            let mut state = SelectionState::default();
            for turn in 0..12 {
                let (picked, next) = moderator.select_respondents(&participants, "Any thoughts?", Phase::Exploration, turn, state);
                state = next;
                let max_pick = max_responses.min(n);
                assert!((3..=max_pick).contains(&picked.len()), "n={n} picked={}", picked.len());
                let unique: HashSet<usize> = picked.iter().copied().collect();
                assert_eq!(unique.len(), picked.len());
            }
        }
    }

    #[test]
    fn target_rounds_halves_to_even() {
        assert_eq!(respondent_target(2), 2);
        assert_eq!(respondent_target(3), 3);
        assert_eq!(respondent_target(5), 4);
        assert_eq!(respondent_target(6), 4);
        assert_eq!(respondent_target(7), 5);
        assert_eq!(respondent_target(10), 6);
    }

    #[test]
    fn tiny_pool_returns_everyone() {
        let participants: Vec<Participant> = panel(4).into_iter().take(2).collect();
        let mut moderator = Moderator::new(config(4, 5));
        let (picked, _) = moderator.select_respondents(&participants, "?", Phase::Warmup, 0, SelectionState::default());
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn named_participant_is_selected() {
        let participants = panel(8);
        let name = participants[6].name().to_string();
        let mut moderator = Moderator::new(config(8, 5));
        let question = format!("{name}, what would make you switch?");
        let (picked, _) = moderator.select_respondents(&participants, &question, Phase::DeepDive, 0, SelectionState::default());
        assert_eq!(picked[0], 6);
    }

    #[test]
    fn history_keeps_three_questions() {
        let participants = panel(8);
        let mut moderator = Moderator::new(config(8, 5));
        let mut state = SelectionState::default();
        for turn in 0..5 {
            state = moderator.select_respondents(&participants, "?", Phase::Warmup, turn, state).1;
        }
        assert_eq!(state.recent.len(), 3);
        assert!(state.speak_counts.values().sum::<usize>() >= 15);
    }

    #[test]
    fn followups_fire_on_strong_signals() {
        let mut moderator = Moderator::new(config(8, 5));
        let q = moderator.generate_followup(&reply("Dana Kim", 0.9, false), Phase::DeepDive).unwrap();
        assert_eq!(q, "Dana Kim, can you expand on that specific point a bit more?");
        assert!(moderator.generate_followup(&reply("Dana Kim", 0.0, true), Phase::DeepDive).is_some());

        let fired = (0..500)
            .filter(|_| moderator.generate_followup(&reply("Dana Kim", 0.1, false), Phase::DeepDive).is_some())
            .count();
        assert!((50..=150).contains(&fired), "fired {fired} of 500");
    }

    #[test]
    fn summary_reports_tone_and_snippets() {
        assert_eq!(summarize_recent(&[]), "No discussion yet.");
        let intro = DiscussionMessage::moderator("Welcome", Phase::Warmup, 1);
        assert!(summarize_recent(&[intro.clone()]).contains("pending"));

        let long = "x".repeat(200);
        let mut msgs = vec![intro, reply("A", 0.5, false), reply("B", -0.5, false), reply("C", 0.0, false)];
        msgs[3].content = long;
        let summary = summarize_recent(&msgs);
        assert!(summary.contains("positive: 1, neutral: 1, negative: 1"));
        assert!(summary.contains(&format!("C: {}", "x".repeat(80))));
        assert!(!summary.contains(&"x".repeat(81)));
    }

    #[tokio::test]
    async fn quiet_callout_is_appended_when_missing() {
        struct Plain;
        #[async_trait::async_trait]
        impl TextGenerator for Plain {
            fn name(&self) -> &str {
                "plain"
            }
            async fn complete(&self, _s: &str, _u: &str, _t: f32, _m: u32) -> std::result::Result<String, crate::error::LlmError> {
                Ok("What do you think?".into())
            }
        }
        let moderator = Moderator::new(config(8, 5));
        let quiet = vec!["Riley Chen".to_string(), "Ava Patel".to_string()];
        let q = moderator.generate_question(&Plain, Phase::Warmup, &[], &quiet).await.unwrap();
        assert_eq!(q, "What do you think? Riley Chen, I want your take as well.");
    }

    #[tokio::test]
    async fn guide_covers_every_slot() {
        let mut moderator = Moderator::new(config(8, 5));
        let guide = moderator.generate_discussion_guide(&MockBrain::new()).await.unwrap();
        assert_eq!(guide.len(), 10);
        assert_eq!(moderator.discussion_guide().len(), 10);
    }
}
