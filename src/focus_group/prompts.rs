// src/focus_group/prompts.rs
// PROMPT TEMPLATES
// Markers below are matched verbatim by the offline engine; keep them stable.

use super::{DiscussionMessage, Phase};

pub const MODERATOR_MARKER: &str = "You are moderating a market research focus group.";
pub const QUIET_MARKER: &str = "Quiet participants to draw out:";
pub const SHIFT_MARKER: &str = "Determine whether this participant shifted their opinion.";
pub const SHIFT_SYSTEM_PROMPT: &str = "You classify opinion shifts.";
pub const MODERATOR_SYSTEM_PROMPT: &str = "You are a skilled focus group moderator.";
pub const RECOVERY_QUESTION: &str =
    "Before we close, I want to hear from anyone we have not heard much from yet.";
const NO_CONTEXT: &str = "No prior discussion yet.";

/// Everything a participant's character sheet needs, already rendered as prose.
pub struct PersonaSheet<'a> {
    pub name: &'a str,
    pub age: u8,
    pub occupation: &'a str,
    pub location: &'a str,
    pub personality: &'a [&'static str],
    pub communication_style: &'a str,
    pub consumer_behavior: &'a str,
    pub category_engagement: &'a str,
    pub initial_opinion: Option<&'a str>,
}

pub fn persona_system_prompt(sheet: &PersonaSheet<'_>) -> String {
    let personality = sheet
        .personality
        .iter()
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are {name}, a focus group participant.\n\n\
        --- IDENTITY ---\n\
        - Age: {age}\n\
        - Occupation: {occupation}\n\
        - Location: {location}\n\n\
        --- PERSONALITY ---\n\
        {personality}\n\n\
        --- COMMUNICATION STYLE ---\n\
        {style}\n\n\
        --- CONSUMER BEHAVIOR ---\n\
        {consumer}\n\n\
        --- CATEGORY ENGAGEMENT ---\n\
        {engagement}\n\n\
        --- PRIVATE INITIAL REACTION TO THE CONCEPT ---\n\
        {opinion}\n\n\
        RULES:\n\
        - Stay in character at all times.\n\
        - Speak naturally and concretely, 1-4 sentences.\n\
        - Do not be artificially agreeable.\n\
        - If your personality suggests disagreement, disagree clearly.\n\
        - React to what others said when relevant.",
        name = sheet.name,
        age = sheet.age,
        occupation = sheet.occupation,
        location = sheet.location,
        style = sheet.communication_style,
        consumer = sheet.consumer_behavior,
        engagement = sheet.category_engagement,
        opinion = sheet.initial_opinion.unwrap_or("No strong initial opinion."),
    )
}

pub fn phase_guidance(phase: Phase) -> &'static str {
    match phase {
        Phase::Warmup => "ask an easy opener about personal category experience.",
        Phase::Exploration => "ask open-ended associations and expectations.",
        Phase::DeepDive => "probe features, price, trust, barriers, tradeoffs.",
        Phase::Reaction => "ask direct response to the stimulus and likely action.",
        Phase::Synthesis => "ask final decision, purchase intent, and key reason.",
    }
}

pub fn moderator_question_prompt(
    phase: Phase,
    concept: &str,
    category: &str,
    stimulus: Option<&str>,
    summary: &str,
    quiet: &[String],
) -> String {
    let quiet = if quiet.is_empty() {
        "None".to_string()
    } else {
        quiet.join(", ")
    };
    let guidance = Phase::ALL
        .iter()
        .map(|p| format!("- {}: {}", p.label(), phase_guidance(*p)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{MODERATOR_MARKER}\n\n\
        Current phase: {phase}\n\
        Product concept: {concept}\n\
        Category: {category}\n\
        Stimulus: {stimulus}\n\n\
        Summary so far:\n{summary}\n\n\
        {QUIET_MARKER} {quiet}\n\n\
        Phase guidance:\n{guidance}\n\n\
        Return one conversational moderator question only.",
        phase = phase.label(),
        stimulus = stimulus.unwrap_or("None"),
    )
}

/// "Speaker: content" per line, oldest first.
pub fn format_context(messages: &[DiscussionMessage]) -> String {
    if messages.is_empty() {
        return NO_CONTEXT.to_string();
    }
    messages
        .iter()
        .map(|m| format!("{}: {}", m.speaker_name, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn participant_response_prompt(phase: Phase, context: &str, question: &str) -> String {
    format!(
        "Discussion phase: {phase}\n\n\
        Discussion context:\n{context}\n\n\
        Moderator question:\n{question}\n\n\
        INSTRUCTIONS:\n\
        - Respond in 1-4 sentences.\n\
        - Stay consistent with persona personality and communication style.\n\
        - React to what others said where appropriate (agree, disagree, or build on).\n\
        - Higher agreeableness should sound more collaborative.\n\
        - Lower agreeableness should challenge weak points directly.\n\
        - Higher extraversion tends to be more assertive and verbose.\n\
        - Lower extraversion tends to be concise unless directly invited.\n\n\
        Return only the participant response text.",
        phase = phase.label(),
    )
}

pub fn shift_detection_prompt(initial_opinion: Option<&str>, initial_valence: Option<f64>, response: &str) -> String {
    let valence = initial_valence.map_or_else(|| "unknown".to_string(), |v| format!("{v:.2}"));
    format!(
        "{SHIFT_MARKER}\n\n\
        Initial opinion summary:\n{opinion}\n\
        Initial valence: {valence}\n\n\
        New response:\n{response}\n\n\
        Return JSON with keys:\n\
        - changed_mind: boolean\n\
        - new_valence: number in [-1, 1] or null if unchanged",
        opinion = initial_opinion.unwrap_or("No initial opinion"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderator_prompt_carries_markers() {
        let quiet = vec!["Riley Chen".to_string(), "Ava Patel".to_string()];
        let prompt = moderator_question_prompt(Phase::DeepDive, "AI meal planner", "app", None, "No discussion yet.", &quiet);
        assert!(prompt.starts_with(MODERATOR_MARKER));
        assert!(prompt.contains("Current phase: deep_dive"));
        assert!(prompt.contains(&format!("{QUIET_MARKER} Riley Chen, Ava Patel")));
        assert!(prompt.contains("Stimulus: None"));
    }

    #[test]
    fn empty_quiet_list_reads_none() {
        let prompt = moderator_question_prompt(Phase::Warmup, "x", "app", Some("a photo"), "s", &[]);
        assert!(prompt.contains(&format!("{QUIET_MARKER} None")));
        assert!(prompt.contains("Stimulus: a photo"));
    }

    #[test]
    fn empty_context_has_placeholder() {
        assert_eq!(format_context(&[]), NO_CONTEXT);
        let msg = DiscussionMessage::moderator("Hello?", Phase::Warmup, 1);
        assert_eq!(format_context(&[msg]), "Moderator: Hello?");
    }
}
