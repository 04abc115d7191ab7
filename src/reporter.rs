// src/reporter.rs
// TRANSCRIPT REPORTER
// Markdown / JSON / CSV renderings of a finished discussion, plus summary statistics.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::error::{FocusGroupError, Result};
use crate::focus_group::{DiscussionMessage, DiscussionTranscript, MessageRole, Phase};

const CSV_HEADER: [&str; 9] = [
    "turn_number",
    "phase",
    "role",
    "speaker_id",
    "speaker_name",
    "content",
    "sentiment",
    "changed_mind",
    "replied_to",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseStats {
    pub phase: Phase,
    pub messages: usize,
    /// Mean participant sentiment; `None` when nobody spoke in the phase.
    pub avg_sentiment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpinionShift {
    pub speaker_id: String,
    pub speaker_name: String,
    pub phase: Phase,
    pub turn_number: usize,
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptStats {
    pub total_messages: usize,
    pub by_role: BTreeMap<String, usize>,
    pub by_phase: Vec<PhaseStats>,
    /// Authored participant messages keyed by speaker name.
    pub by_participant: BTreeMap<String, usize>,
    pub opinion_shifts: Vec<OpinionShift>,
    pub final_valences: BTreeMap<String, Option<f64>>,
    pub most_active: Option<String>,
    pub least_active: Option<String>,
}

fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::Moderator => "moderator",
        MessageRole::Participant => "participant",
        MessageRole::System => "system",
    }
}

pub struct Reporter;

impl Reporter {
    pub fn to_markdown(transcript: &DiscussionTranscript) -> String {
        let config = &transcript.config;
        let mut out = format!("# Focus Group: {}\n\n", config.product_concept);
        out.push_str(&format!("**Category:** {}\n", config.category));
        if let Some(stimulus) = &config.stimulus_material {
            out.push_str(&format!("**Stimulus:** {stimulus}\n"));
        }
        out.push_str(&format!("**Participants:** {}\n", transcript.personas.len()));

        let mut current: Option<Phase> = None;
        for msg in &transcript.messages {
            if current != Some(msg.phase) {
                out.push_str(&format!("\n## Phase: {}\n\n", msg.phase.title()));
                current = Some(msg.phase);
            }
            out.push_str(&format!("**{}:** {}\n\n", msg.speaker_name, msg.content));
        }
        out
    }

    pub fn to_json(transcript: &DiscussionTranscript) -> Result<String> {
        Ok(serde_json::to_string_pretty(transcript)?)
    }

    /// Writes the transcript plus stats and an export timestamp.
    pub fn export_json(path: impl AsRef<Path>, transcript: &DiscussionTranscript) -> Result<()> {
        let output = serde_json::json!({
            "transcript": transcript,
            "stats": Self::summary_stats(transcript),
            "export_timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let mut file = File::create(path.as_ref())?;
        file.write_all(serde_json::to_string_pretty(&output)?.as_bytes())?;
        info!(path = %path.as_ref().display(), "REPORTER: JSON exported");
        Ok(())
    }

    fn write_rows<W: Write>(wtr: &mut Writer<W>, messages: &[DiscussionMessage]) -> Result<()> {
        wtr.write_record(CSV_HEADER)?;
        for msg in messages {
            let turn = msg.turn_number.to_string();
            let sentiment = msg.sentiment.map(|s| format!("{s:.3}")).unwrap_or_default();
            wtr.write_record([
                turn.as_str(),
                msg.phase.label(),
                role_label(msg.role),
                msg.speaker_id.as_str(),
                msg.speaker_name.as_str(),
                msg.content.as_str(),
                sentiment.as_str(),
                if msg.changed_mind { "true" } else { "false" },
                msg.replied_to.as_deref().unwrap_or(""),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// One row per message.
    pub fn export_csv(path: impl AsRef<Path>, transcript: &DiscussionTranscript) -> Result<()> {
        let mut wtr = Writer::from_path(path.as_ref())?;
        Self::write_rows(&mut wtr, &transcript.messages)?;
        info!(path = %path.as_ref().display(), rows = transcript.messages.len(), "REPORTER: CSV exported");
        Ok(())
    }

    pub fn to_csv(transcript: &DiscussionTranscript) -> Result<String> {
        let mut wtr = Writer::from_writer(Vec::new());
        Self::write_rows(&mut wtr, &transcript.messages)?;
        let bytes = wtr
            .into_inner()
            .map_err(|err| FocusGroupError::Io(err.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn summary_stats(transcript: &DiscussionTranscript) -> TranscriptStats {
        let mut by_role: BTreeMap<String, usize> = BTreeMap::new();
        for msg in &transcript.messages {
            *by_role.entry(role_label(msg.role).to_string()).or_default() += 1;
        }

        let by_phase = transcript
            .config
            .phases
            .iter()
            .map(|phase| {
                let in_phase: Vec<&DiscussionMessage> =
                    transcript.messages.iter().filter(|m| m.phase == *phase).collect();
                let sentiments: Vec<f64> = in_phase
                    .iter()
                    .filter(|m| m.is_participant())
                    .filter_map(|m| m.sentiment)
                    .collect();
                PhaseStats {
                    phase: *phase,
                    messages: in_phase.len(),
                    avg_sentiment: (!sentiments.is_empty())
                        .then(|| sentiments.iter().sum::<f64>() / sentiments.len() as f64),
                }
            })
            .collect();

        // Every panel member appears, even with zero messages.
        let mut by_participant: BTreeMap<String, usize> =
            transcript.personas.iter().map(|p| (p.name.clone(), 0)).collect();
        for msg in transcript.participant_messages() {
            *by_participant.entry(msg.speaker_name.clone()).or_default() += 1;
        }

        let opinion_shifts = transcript
            .participant_messages()
            .filter(|m| m.changed_mind)
            .map(|m| OpinionShift {
                speaker_id: m.speaker_id.clone(),
                speaker_name: m.speaker_name.clone(),
                phase: m.phase,
                turn_number: m.turn_number,
                sentiment: m.sentiment,
            })
            .collect();

        let final_valences = transcript
            .personas
            .iter()
            .map(|p| (p.name.clone(), p.opinion_valence))
            .collect();

        // Ties: most active takes the first name alphabetically, least active likewise.
        let most_active = by_participant
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.clone());
        let least_active = by_participant
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(name, _)| name.clone());

        TranscriptStats {
            total_messages: transcript.messages.len(),
            by_role,
            by_phase,
            by_participant,
            opinion_shifts,
            final_valences,
            most_active,
            least_active,
        }
    }

    /// Logs the headline numbers at info level.
    pub fn log_summary(stats: &TranscriptStats) {
        info!(
            total = stats.total_messages,
            shifts = stats.opinion_shifts.len(),
            most_active = ?stats.most_active,
            least_active = ?stats.least_active,
            "REPORTER: Discussion summary"
        );
        for phase in &stats.by_phase {
            info!(
                phase = %phase.phase,
                messages = phase.messages,
                avg_sentiment = ?phase.avg_sentiment,
                "REPORTER: Phase summary"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus_group::DiscussionConfig;
    use crate::persona_generator::PersonaGenerator;
    use pretty_assertions::assert_eq;

    fn transcript() -> DiscussionTranscript {
        let config = DiscussionConfig::builder("AI meal planner", "app")
            .phases(vec![Phase::Warmup, Phase::DeepDive])
            .build()
            .unwrap();
        let personas = PersonaGenerator::new(5).generate(4, None, Some("AI meal planner"), Some("app")).unwrap();
        let mut t = DiscussionTranscript::new(config, personas);
        let speak = |t: &DiscussionTranscript, seat: usize, phase, content: &str, sentiment, changed_mind| DiscussionMessage {
            role: MessageRole::Participant,
            speaker_id: t.personas[seat].id.to_string(),
            speaker_name: t.personas[seat].name.clone(),
            content: content.to_string(),
            phase,
            turn_number: t.next_turn(),
            replied_to: None,
            sentiment: Some(sentiment),
            changed_mind,
        };
        t.messages.push(DiscussionMessage::moderator("How do you plan meals?", Phase::Warmup, 1));
        let m = speak(&t, 0, Phase::Warmup, "Mostly on Sundays, I like it.", 0.5, false);
        t.messages.push(m);
        let m = speak(&t, 1, Phase::Warmup, "I wing it, \"honestly\".", 0.0, false);
        t.messages.push(m);
        t.messages.push(DiscussionMessage::moderator("Would you pay for it?", Phase::DeepDive, 4));
        let m = speak(&t, 0, Phase::DeepDive, "Now I would avoid it.", -1.0, true);
        t.messages.push(m);
        t
    }

    #[test]
    fn markdown_groups_by_phase() {
        let t = transcript();
        let md = Reporter::to_markdown(&t);
        assert!(md.starts_with("# Focus Group: AI meal planner"));
        assert_eq!(md.matches("## Phase: ").count(), 2);
        assert!(md.contains("## Phase: Deep Dive"));
        assert!(md.contains(&format!("**{}:** Mostly on Sundays, I like it.", t.personas[0].name)));
        assert!(md.contains("**Moderator:** How do you plan meals?"));
    }

    #[test]
    fn stats_tally_roles_phases_and_shifts() {
        let t = transcript();
        let stats = Reporter::summary_stats(&t);
        assert_eq!(stats.total_messages, 5);
        assert_eq!(stats.by_role["moderator"], 2);
        assert_eq!(stats.by_role["participant"], 3);
        assert_eq!(stats.by_phase[0].messages, 3);
        assert_eq!(stats.by_phase[0].avg_sentiment, Some(0.25));
        assert_eq!(stats.by_phase[1].avg_sentiment, Some(-1.0));
        assert_eq!(stats.opinion_shifts.len(), 1);
        assert_eq!(stats.by_participant.len(), 4);
        assert_eq!(stats.most_active.as_deref(), Some(t.personas[0].name.as_str()));
        assert_eq!(stats.by_participant[stats.least_active.as_deref().unwrap()], 0);
    }

    #[test]
    fn csv_export_round_trips_through_the_csv_reader() {
        let t = transcript();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.csv");
        Reporter::export_csv(&path, &t).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        assert_eq!(rdr.headers().unwrap().iter().collect::<Vec<_>>(), CSV_HEADER.to_vec());
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 5);
        assert_eq!(&rows[2][5], "I wing it, \"honestly\".");
        assert_eq!(&rows[4][7], "true");
        assert_eq!(Reporter::to_csv(&t).unwrap(), std::fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn json_export_contains_transcript_and_stats() {
        let t = transcript();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        Reporter::export_json(&path, &t).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["transcript"]["messages"].as_array().unwrap().len(), 5);
        assert_eq!(value["stats"]["total_messages"], 5);
        assert!(value["export_timestamp"].is_string());

        let parsed: DiscussionTranscript = serde_json::from_str(&Reporter::to_json(&t).unwrap()).unwrap();
        assert_eq!(parsed.messages, t.messages);
        assert_eq!(parsed.config, t.config);
        assert_eq!(parsed.personas.len(), t.personas.len());
    }
}
