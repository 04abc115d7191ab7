// src/persona/mod.rs
// PERSONA ENGINE - DATA MODEL
// Demographics -> Psychographics -> Consumer/Voice -> Opinion, assembled into a Persona.

use std::fmt;

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod consumer;
pub mod demographics;
pub mod diversity;
pub mod opinion_seeder;
pub mod psychographics;
pub mod voice;

pub use demographics::DemographicConstraints;
pub use diversity::{DiversityChecker, DiversityReport, DiversityTarget};

/// Closed categorical sets serialize as snake_case and print the same way.
macro_rules! labeled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

labeled_enum!(Gender {
    Male => "male",
    Female => "female",
    NonBinary => "non_binary",
});

labeled_enum!(Education {
    HighSchool => "high_school",
    SomeCollege => "some_college",
    Bachelors => "bachelors",
    Masters => "masters",
    Doctorate => "doctorate",
});

impl Education {
    pub fn is_degree(&self) -> bool {
        matches!(self, Education::Bachelors | Education::Masters | Education::Doctorate)
    }
}

labeled_enum!(Urbanicity {
    Urban => "urban",
    Suburban => "suburban",
    Rural => "rural",
});

labeled_enum!(HouseholdType {
    Single => "single",
    MarriedNoKids => "married_no_kids",
    MarriedWithKids => "married_with_kids",
    SingleParent => "single_parent",
});

labeled_enum!(Ethnicity {
    White => "white",
    Black => "black",
    HispanicLatino => "hispanic_latino",
    Asian => "asian",
    NativeAmerican => "native_american",
    Multiracial => "multiracial",
});

labeled_enum!(Region {
    West => "west",
    South => "south",
    Northeast => "northeast",
    Midwest => "midwest",
});

labeled_enum!(
    /// VALS-style lifestyle segment.
    LifestyleSegment {
        Innovator => "innovator",
        Thinker => "thinker",
        Achiever => "achiever",
        Experiencer => "experiencer",
        Believer => "believer",
        Striver => "striver",
        Maker => "maker",
        Survivor => "survivor",
    }
);

labeled_enum!(
    /// Schwartz basic human values.
    ValueDomain {
        SelfDirection => "self_direction",
        Stimulation => "stimulation",
        Hedonism => "hedonism",
        Achievement => "achievement",
        Power => "power",
        Security => "security",
        Conformity => "conformity",
        Tradition => "tradition",
        Benevolence => "benevolence",
        Universalism => "universalism",
    }
);

labeled_enum!(Engagement {
    Heavy => "heavy",
    Moderate => "moderate",
    Light => "light",
    NonUser => "non_user",
});

labeled_enum!(DecisionStyle {
    Analytical => "analytical",
    Emotional => "emotional",
    Habitual => "habitual",
    Impulsive => "impulsive",
});

labeled_enum!(VocabularyLevel {
    Basic => "basic",
    Moderate => "moderate",
    Advanced => "advanced",
    Expert => "expert",
});

labeled_enum!(Verbosity {
    Terse => "terse",
    Moderate => "moderate",
    Verbose => "verbose",
});

labeled_enum!(CommunicationStyle {
    Analytical => "analytical",
    Diplomatic => "diplomatic",
    Storytelling => "storytelling",
    Direct => "direct",
});

labeled_enum!(
    /// One of the five OCEAN dimensions.
    Trait {
        Openness => "openness",
        Conscientiousness => "conscientiousness",
        Extraversion => "extraversion",
        Agreeableness => "agreeableness",
        Neuroticism => "neuroticism",
    }
);

// --- DEMOGRAPHICS ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub state: String,
    pub metro_area: Option<String>,
    pub urbanicity: Urbanicity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub age: u8,
    pub gender: Gender,
    pub income: u32,
    pub education: Education,
    pub occupation: String,
    pub location: Location,
    pub household_type: HouseholdType,
    pub race_ethnicity: Ethnicity,
}

// --- PSYCHOGRAPHICS ---

pub const TRAIT_MIN: f64 = 0.0;
pub const TRAIT_MAX: f64 = 100.0;

pub fn clamp_trait(value: f64) -> f64 {
    value.clamp(TRAIT_MIN, TRAIT_MAX)
}

/// Big-Five scores, each kept in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OceanScores {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

impl OceanScores {
    pub fn new(o: f64, c: f64, e: f64, a: f64, n: f64) -> Self {
        Self {
            openness: clamp_trait(o),
            conscientiousness: clamp_trait(c),
            extraversion: clamp_trait(e),
            agreeableness: clamp_trait(a),
            neuroticism: clamp_trait(n),
        }
    }

    pub fn get(&self, t: Trait) -> f64 {
        match t {
            Trait::Openness => self.openness,
            Trait::Conscientiousness => self.conscientiousness,
            Trait::Extraversion => self.extraversion,
            Trait::Agreeableness => self.agreeableness,
            Trait::Neuroticism => self.neuroticism,
        }
    }

    /// Writes a trait, clamped to [0, 100].
    pub fn set(&mut self, t: Trait, value: f64) {
        let value = clamp_trait(value);
        match t {
            Trait::Openness => self.openness = value,
            Trait::Conscientiousness => self.conscientiousness = value,
            Trait::Extraversion => self.extraversion = value,
            Trait::Agreeableness => self.agreeableness = value,
            Trait::Neuroticism => self.neuroticism = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuePriorities {
    pub primary: ValueDomain,
    pub secondary: ValueDomain,
    pub tertiary: Option<ValueDomain>,
}

impl ValuePriorities {
    pub fn ranked(&self) -> Vec<ValueDomain> {
        let mut out = vec![self.primary, self.secondary];
        out.extend(self.tertiary);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psychographics {
    pub ocean: OceanScores,
    pub lifestyle_segment: LifestyleSegment,
    pub values: ValuePriorities,
}

// --- DERIVED PROFILES ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerProfile {
    pub price_sensitivity: f64,
    pub brand_loyalty: f64,
    pub research_tendency: f64,
    pub impulse_tendency: f64,
    pub social_influence: f64,
    pub risk_tolerance: f64,
    pub category_engagement: Engagement,
    pub decision_style: DecisionStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub vocabulary_level: VocabularyLevel,
    pub verbosity: Verbosity,
    pub communication_style: CommunicationStyle,
    pub hedging: f64,
    pub expressiveness: f64,
    pub assertiveness: f64,
    pub humor: f64,
}

// --- PERSONA ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub name: String,
    pub demographics: Demographics,
    pub psychographics: Psychographics,
    pub consumer: ConsumerProfile,
    pub voice: VoiceProfile,
    pub initial_opinion: Option<String>,
    /// Disposition toward the evaluated concept, in [-1, 1].
    pub opinion_valence: Option<f64>,
}

impl Persona {
    pub fn ocean(&self) -> &OceanScores {
        &self.psychographics.ocean
    }

    pub fn extraversion(&self) -> f64 {
        self.psychographics.ocean.extraversion
    }

    /// "Metro, ST" when a metro is known, else the state.
    pub fn location_label(&self) -> String {
        let loc = &self.demographics.location;
        match &loc.metro_area {
            Some(metro) => format!("{metro}, {}", loc.state),
            None => loc.state.clone(),
        }
    }
}

// --- SAMPLING HELPERS ---

/// Weighted categorical draw. Degenerate weights fall back to the first entry.
pub(crate) fn weighted_pick<T: Clone, R: Rng + ?Sized>(rng: &mut R, table: &[(T, f64)]) -> T {
    match WeightedIndex::new(table.iter().map(|(_, w)| *w)) {
        Ok(dist) => table[dist.sample(rng)].0.clone(),
        Err(_) => table[0].0.clone(),
    }
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Evenly spaced values from `lo` to `hi` inclusive.
pub(crate) fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => (0..n)
            .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// Indices of `values` ordered ascending (stable on ties).
pub(crate) fn rank_order(values: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
    idx
}

/// Deterministic v4-shaped id drawn from the caller's RNG.
pub(crate) fn random_id<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    #[test]
    fn ocean_set_clamps() {
        let mut ocean = OceanScores::new(50.0, 50.0, 50.0, 50.0, 50.0);
        ocean.set(Trait::Openness, 140.0);
        ocean.set(Trait::Neuroticism, -3.0);
        assert_eq!(ocean.openness, 100.0);
        assert_eq!(ocean.neuroticism, 0.0);
    }

    #[test]
    fn std_dev_matches_population_formula() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn linspace_hits_both_ends() {
        assert_eq!(linspace(-18.0, 18.0, 3), vec![-18.0, 0.0, 18.0]);
        assert_eq!(linspace(1.0, 5.0, 1), vec![1.0]);
    }

    #[test]
    fn random_ids_follow_the_rng() {
        let a = random_id(&mut StdRng::seed_from_u64(9));
        let b = random_id(&mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 4);
    }

    #[test]
    fn labels_are_snake_case() {
        assert_eq!(HouseholdType::MarriedWithKids.to_string(), "married_with_kids");
        assert_eq!(
            serde_json::to_string(&ValueDomain::SelfDirection).unwrap(),
            "\"self_direction\""
        );
    }
}
