// src/persona/voice.rs
// VOICE PROFILE: how a persona talks. Pure function of education and traits.

use super::{
    CommunicationStyle, Demographics, Education, Psychographics, Verbosity, VocabularyLevel,
    VoiceProfile,
};

fn vocabulary(education: Education) -> VocabularyLevel {
    match education {
        Education::HighSchool => VocabularyLevel::Basic,
        Education::SomeCollege => VocabularyLevel::Moderate,
        Education::Bachelors | Education::Masters => VocabularyLevel::Advanced,
        Education::Doctorate => VocabularyLevel::Expert,
    }
}

fn verbosity(extraversion: f64) -> Verbosity {
    if extraversion >= 67.0 {
        Verbosity::Verbose
    } else if extraversion <= 38.0 {
        Verbosity::Terse
    } else {
        Verbosity::Moderate
    }
}

fn style(psycho: &Psychographics) -> CommunicationStyle {
    let ocean = &psycho.ocean;
    let (o, c, e, a, n) = (
        ocean.openness,
        ocean.conscientiousness,
        ocean.extraversion,
        ocean.agreeableness,
        ocean.neuroticism,
    );
    if c >= 65.0 && o >= 55.0 {
        CommunicationStyle::Analytical
    } else if a >= 65.0 || (a >= 58.0 && n >= 58.0) {
        CommunicationStyle::Diplomatic
    } else if e >= 65.0 && o >= 55.0 {
        CommunicationStyle::Storytelling
    } else {
        CommunicationStyle::Direct
    }
}

pub fn derive(demo: &Demographics, psycho: &Psychographics) -> VoiceProfile {
    let o = psycho.ocean.openness / 100.0;
    let c = psycho.ocean.conscientiousness / 100.0;
    let e = psycho.ocean.extraversion / 100.0;
    let a = psycho.ocean.agreeableness / 100.0;
    let n = psycho.ocean.neuroticism / 100.0;

    VoiceProfile {
        vocabulary_level: vocabulary(demo.education),
        verbosity: verbosity(psycho.ocean.extraversion),
        communication_style: style(psycho),
        hedging: (n * a).clamp(0.0, 1.0),
        expressiveness: (e * (1.0 - c)).clamp(0.0, 1.0),
        assertiveness: (e * (1.0 - a)).clamp(0.0, 1.0),
        humor: (o * e).clamp(0.0, 1.0),
    }
}
