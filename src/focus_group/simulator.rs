// src/focus_group/simulator.rs
// DISCUSSION SIMULATOR
// Phases x questions, strictly sequential: every reply sees everything said before it.

use std::sync::Arc;

use tracing::{debug, info};

use super::moderator::{Moderator, SelectionState};
use super::participant::Participant;
use super::prompts::RECOVERY_QUESTION;
use super::{DiscussionConfig, DiscussionMessage, DiscussionTranscript, Phase};
use crate::brain::TextGenerator;
use crate::error::{FocusGroupError, Result};
use crate::persona::Persona;
use crate::persona_generator::PersonaGenerator;

const QUIET_HINTS: usize = 2;

pub struct DiscussionSimulator {
    config: DiscussionConfig,
    brain: Arc<dyn TextGenerator>,
}

impl DiscussionSimulator {
    pub fn new(config: DiscussionConfig, brain: Arc<dyn TextGenerator>) -> Self {
        Self { config, brain }
    }

    pub fn config(&self) -> &DiscussionConfig {
        &self.config
    }

    /// Generates the panel from the config seed, then runs the discussion.
    pub async fn generate_and_run(&self) -> Result<DiscussionTranscript> {
        self.config.validate()?;
        let personas = PersonaGenerator::new(self.config.seed).generate(
            self.config.num_personas,
            None,
            Some(&self.config.product_concept),
            Some(&self.config.category),
        )?;
        self.run(personas).await
    }

    pub async fn run(&self, personas: Vec<Persona>) -> Result<DiscussionTranscript> {
        self.run_with_observer(personas, |_| {}).await
    }

    /// Same as [`run`](Self::run), reporting each message to `observer` as it is appended.
    pub async fn run_with_observer<F>(&self, personas: Vec<Persona>, mut observer: F) -> Result<DiscussionTranscript>
    where
        F: FnMut(&DiscussionMessage) + Send,
    {
        self.config.validate()?;
        if personas.is_empty() {
            return Err(FocusGroupError::Config("cannot run a discussion without personas".into()));
        }
        let config = if self.config.auto_scale {
            self.config.auto_scaled()
        } else {
            self.config.clone()
        };
        let brain = self.brain.as_ref();

        info!(
            brain = brain.name(),
            personas = personas.len(),
            phases = config.phases.len(),
            questions_per_phase = config.questions_per_phase,
            "SIMULATOR: Starting discussion on '{}'",
            config.product_concept
        );

        let mut transcript = DiscussionTranscript::new(config.clone(), personas.clone());
        let mut participants: Vec<Participant> = personas.into_iter().map(Participant::new).collect();
        let mut moderator = Moderator::new(config.clone());
        let mut state = SelectionState::default();

        // --- PHASES ---
        for phase in config.phases.iter().copied() {
            for turn in 0..config.questions_per_phase {
                // 1. Question, nudging the least-heard
                let quiet = quiet_names(&transcript, &participants);
                let question = moderator
                    .generate_question(brain, phase, &transcript.messages, &quiet)
                    .await?;
                let asked = DiscussionMessage::moderator(&question, phase, transcript.next_turn());
                push(&mut transcript, &mut observer, asked);

                // 2. Respondents, in order
                let (picked, next_state) = moderator.select_respondents(&participants, &question, phase, turn, state);
                state = next_state;
                let mut last: Option<(usize, DiscussionMessage)> = None;
                for idx in picked {
                    let reply = participants[idx]
                        .respond(brain, &question, &transcript.messages, phase, config.temperature)
                        .await?;
                    push(&mut transcript, &mut observer, reply.clone());
                    last = Some((idx, reply));
                }

                // 3. At most one follow-up, to the last respondent
                if let Some((idx, reply)) = last {
                    if let Some(followup) = moderator.generate_followup(&reply, phase) {
                        let probe = DiscussionMessage::moderator(&followup, phase, transcript.next_turn())
                            .replying_to(participants[idx].id());
                        push(&mut transcript, &mut observer, probe);
                        let answer = participants[idx]
                            .respond(brain, &followup, &transcript.messages, phase, config.temperature)
                            .await?;
                        push(&mut transcript, &mut observer, answer);
                    }
                }
            }
            debug!(phase = %phase, messages = transcript.messages.len(), "SIMULATOR: Phase complete");
        }

        // --- RECOVERY ROUND ---
        let silent: Vec<usize> = (0..participants.len())
            .filter(|i| participants[*i].times_spoken == 0)
            .collect();
        if !silent.is_empty() {
            let phase = config.phases.last().copied().unwrap_or(Phase::Synthesis);
            info!(silent = silent.len(), "SIMULATOR: Recovery round for unheard participants");
            let recovery = DiscussionMessage::moderator(RECOVERY_QUESTION, phase, transcript.next_turn());
            push(&mut transcript, &mut observer, recovery);
            for idx in silent {
                let reply = participants[idx]
                    .respond(brain, RECOVERY_QUESTION, &transcript.messages, phase, config.temperature)
                    .await?;
                push(&mut transcript, &mut observer, reply);
            }
        }

        transcript.personas = participants.into_iter().map(|p| p.persona).collect();
        info!(messages = transcript.messages.len(), "SIMULATOR: Discussion complete");
        Ok(transcript)
    }
}

fn push<F: FnMut(&DiscussionMessage)>(transcript: &mut DiscussionTranscript, observer: &mut F, message: DiscussionMessage) {
    observer(&message);
    transcript.messages.push(message);
}

/// The least-heard participants by authored messages; ties keep seat order.
fn quiet_names(transcript: &DiscussionTranscript, participants: &[Participant]) -> Vec<String> {
    let mut counts: Vec<(usize, usize)> = participants
        .iter()
        .enumerate()
        .map(|(seat, p)| {
            let id = p.id();
            let authored = transcript
                .participant_messages()
                .filter(|m| m.speaker_id == id)
                .count();
            (authored, seat)
        })
        .collect();
    counts.sort();
    counts
        .into_iter()
        .take(QUIET_HINTS)
        .map(|(_, seat)| participants[seat].name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockBrain;
    use crate::focus_group::MessageRole;

    fn config() -> DiscussionConfig {
        DiscussionConfig::builder("AI meal planner", "app").build().unwrap()
    }

    #[test]
    fn quiet_names_prefer_unheard_then_seat_order() {
        let personas = PersonaGenerator::new(3).generate(4, None, None, None).unwrap();
        let participants: Vec<Participant> = personas.iter().cloned().map(Participant::new).collect();
        let mut transcript = DiscussionTranscript::new(config(), personas);
        assert_eq!(quiet_names(&transcript, &participants), vec![participants[0].name(), participants[1].name()]);

        for seat in [0, 1, 0] {
            transcript.messages.push(DiscussionMessage {
                role: MessageRole::Participant,
                speaker_id: participants[seat].id(),
                speaker_name: participants[seat].name().to_string(),
                content: "hi".into(),
                phase: Phase::Warmup,
                turn_number: transcript.next_turn(),
                replied_to: None,
                sentiment: Some(0.0),
                changed_mind: false,
            });
        }
        assert_eq!(quiet_names(&transcript, &participants), vec![participants[2].name(), participants[3].name()]);
    }

    #[tokio::test]
    async fn empty_panel_is_rejected() {
        let sim = DiscussionSimulator::new(config(), Arc::new(MockBrain::new()));
        assert!(matches!(sim.run(Vec::new()).await, Err(FocusGroupError::Config(_))));
    }

    #[tokio::test]
    async fn observer_sees_every_message_in_order() {
        let sim = DiscussionSimulator::new(config(), Arc::new(MockBrain::new()));
        let personas = PersonaGenerator::new(7).generate(6, None, Some("AI meal planner"), Some("app")).unwrap();
        let mut seen = Vec::new();
        let transcript = sim
            .run_with_observer(personas, |m| seen.push(m.turn_number))
            .await
            .unwrap();
        let turns: Vec<usize> = transcript.messages.iter().map(|m| m.turn_number).collect();
        assert_eq!(seen, turns);
        assert_eq!(turns, (1..=turns.len()).collect::<Vec<_>>());
    }
}
