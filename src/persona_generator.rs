// src/persona_generator.rs
// PERSONA GENERATOR
// One seeded batch: demographics -> psychographics -> names -> consumer/voice -> opinions
// -> diversity enforcement -> large-pool age/region corrections.

use std::collections::HashSet;

use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::error::{FocusGroupError, Result};
use crate::persona::demographics::{self, region_of, representative_state, sample_location_in};
use crate::persona::opinion_seeder::{fill_missing, rerender, seed_opinions};
use crate::persona::{
    consumer, psychographics, random_id, voice, DemographicConstraints, DiversityChecker,
    DiversityTarget, Gender, Persona, Region,
};

const MALE_FIRST: &[&str] = &[
    "James", "Robert", "Michael", "David", "William", "Daniel", "Marcus", "Anthony", "Kevin",
    "Brian", "Luis", "Andre", "Thomas", "Eric", "Samuel", "Raj", "Omar", "Jason", "Tyler", "Carlos",
];
const FEMALE_FIRST: &[&str] = &[
    "Emma", "Olivia", "Sophia", "Maria", "Jennifer", "Linda", "Aisha", "Priya", "Grace", "Hannah",
    "Rachel", "Keisha", "Elena", "Megan", "Laura", "Mei", "Sarah", "Nicole", "Rosa", "Diane",
];
const NEUTRAL_FIRST: &[&str] = &[
    "Taylor", "Jordan", "Alex", "Casey", "Riley", "Morgan", "Avery", "Quinn", "Jamie", "Rowan",
    "Sage", "Skyler",
];
const SURNAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Garcia", "Miller", "Davis", "Rodriguez", "Martinez",
    "Nguyen", "Patel", "Kim", "Thompson", "Walker", "Robinson", "Lewis", "Hernandez", "Clark",
    "Okafor", "Chen",
];
const RANDOM_NAME_TRIES: usize = 50;

/// (low, high, representative age) per age bracket; the last one is open-ended.
const AGE_BRACKETS: [(u8, u8, u8); 4] = [(18, 29, 24), (30, 44, 37), (45, 59, 52), (60, u8::MAX, 68)];
const MIN_AGE_BRACKETS: usize = 3;
const AGE_SPREAD_POOL: usize = 12;
const REGION_SPREAD_POOL: usize = 16;
const RESAMPLE_SEED_STEP: u64 = 0x9E37_79B9_7F4A_7C15;

pub struct PersonaGenerator {
    seed: u64,
}

impl PersonaGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Builds `n` personas. Opinions are seeded only when both `concept` and `category`
    /// are given; the same seed always yields the same batch.
    pub fn generate(
        &self,
        n: usize,
        constraints: Option<&DemographicConstraints>,
        concept: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<Persona>> {
        if n == 0 {
            return Err(FocusGroupError::Config("persona count must be at least 1".into()));
        }
        let topic = concept.zip(category);
        info!(n, seed = self.seed, concept = ?concept, "GENERATOR: Synthesizing personas");

        let mut rng = StdRng::seed_from_u64(self.seed);
        let batch = build_batch(&mut rng, n, constraints, topic)?;

        // --- DIVERSITY ---
        let target = if topic.is_some() {
            DiversityTarget::for_pool(n)
        } else {
            DiversityTarget::traits_only(n)
        };
        let seed = self.seed;
        let resample = move |attempt: usize| -> Result<Vec<Persona>> {
            let mut rng = StdRng::seed_from_u64(resample_seed(seed, attempt));
            build_batch(&mut rng, n, constraints, topic)
        };
        let mut personas = DiversityChecker::with_resampler(&resample).enforce(batch, &target)?;

        // --- LARGE-POOL CORRECTIONS ---
        let constraints = constraints.filter(|c| !c.is_empty());
        if n > AGE_SPREAD_POOL && constraints.map_or(true, |c| c.age_range.is_none()) {
            let moved = spread_age_brackets(&mut personas);
            debug!(moved, "GENERATOR: Age bracket correction");
        }
        if n > REGION_SPREAD_POOL
            && constraints.map_or(true, |c| c.states.is_none() && c.urbanicity.is_none())
        {
            let moved = spread_regions(&mut rng, &mut personas);
            debug!(moved, "GENERATOR: Region correction");
        }
        if let Some((concept, category)) = topic {
            let filled = fill_missing(&mut rng, &mut personas, concept, category);
            if filled > 0 {
                debug!(filled, "GENERATOR: Re-seeded opinions after corrections");
            }
            rerender(&mut personas, concept, category);
        }

        info!(n = personas.len(), "GENERATOR: Batch ready");
        Ok(personas)
    }
}

fn resample_seed(seed: u64, attempt: usize) -> u64 {
    seed.wrapping_add(RESAMPLE_SEED_STEP.wrapping_mul(attempt as u64 + 1))
}

fn build_batch<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    constraints: Option<&DemographicConstraints>,
    topic: Option<(&str, &str)>,
) -> Result<Vec<Persona>> {
    // 1. Demographics and traits
    let demos = demographics::sample(rng, n, constraints)?;
    let psychos = psychographics::generate(rng, &demos);

    // 2. Identity and derived profiles
    let mut used_names = HashSet::with_capacity(n);
    let mut personas = Vec::with_capacity(n);
    for (demographics, psychographics) in demos.into_iter().zip(psychos) {
        let id = random_id(rng);
        let name = unique_name(rng, demographics.gender, &mut used_names);
        let consumer = consumer::derive(rng, &demographics, &psychographics);
        let voice = voice::derive(&demographics, &psychographics);
        personas.push(Persona {
            id,
            name,
            demographics,
            psychographics,
            consumer,
            voice,
            initial_opinion: None,
            opinion_valence: None,
        });
    }

    // 3. Opinions
    Ok(match topic {
        Some((concept, category)) => seed_opinions(rng, personas, concept, category),
        None => personas,
    })
}

fn unique_name<R: Rng + ?Sized>(rng: &mut R, gender: Gender, used: &mut HashSet<String>) -> String {
    let firsts = match gender {
        Gender::Male => MALE_FIRST,
        Gender::Female => FEMALE_FIRST,
        Gender::NonBinary => NEUTRAL_FIRST,
    };
    for _ in 0..RANDOM_NAME_TRIES {
        let first = firsts[rng.gen_range(0..firsts.len())];
        let last = SURNAMES[rng.gen_range(0..SURNAMES.len())];
        let name = format!("{first} {last}");
        if used.insert(name.clone()) {
            return name;
        }
    }
    // Dense pools: walk the combinations in order.
    for first in firsts {
        for last in SURNAMES {
            let name = format!("{first} {last}");
            if used.insert(name.clone()) {
                return name;
            }
        }
    }
    let mut suffix = 2;
    loop {
        let name = format!("{} {} {suffix}", firsts[0], SURNAMES[0]);
        if used.insert(name.clone()) {
            return name;
        }
        suffix += 1;
    }
}

fn age_bracket(age: u8) -> usize {
    AGE_BRACKETS
        .iter()
        .position(|(lo, hi, _)| (*lo..=*hi).contains(&age))
        .unwrap_or(0)
}

/// Overwrites trailing ages until at least three brackets are present. Only personas that
/// share their bracket with someone else are moved.
fn spread_age_brackets(personas: &mut [Persona]) -> usize {
    let mut moved = 0;
    loop {
        let mut counts = [0usize; AGE_BRACKETS.len()];
        for p in personas.iter() {
            counts[age_bracket(p.demographics.age)] += 1;
        }
        if counts.iter().filter(|c| **c > 0).count() >= MIN_AGE_BRACKETS.min(personas.len()) {
            return moved;
        }
        let Some(missing) = counts.iter().position(|c| *c == 0) else {
            return moved;
        };
        let Some(idx) = (0..personas.len())
            .rev()
            .find(|i| counts[age_bracket(personas[*i].demographics.age)] > 1)
        else {
            return moved;
        };
        personas[idx].demographics.age = AGE_BRACKETS[missing].2;
        moved += 1;
    }
}

fn region_index(persona: &Persona) -> usize {
    let region = region_of(&persona.demographics.location.state).unwrap_or(Region::West);
    Region::ALL.iter().position(|r| *r == region).unwrap_or(0)
}

/// Same policy as [`spread_age_brackets`] for the four census regions.
fn spread_regions<R: Rng + ?Sized>(rng: &mut R, personas: &mut [Persona]) -> usize {
    let mut moved = 0;
    loop {
        let mut counts = vec![0usize; Region::ALL.len()];
        for p in personas.iter() {
            counts[region_index(p)] += 1;
        }
        let Some(missing) = counts.iter().position(|c| *c == 0) else {
            return moved;
        };
        let Some(idx) = (0..personas.len())
            .rev()
            .find(|i| counts[region_index(&personas[*i])] > 1)
        else {
            return moved;
        };
        let state = representative_state(Region::ALL[missing]);
        personas[idx].demographics.location = sample_location_in(rng, state);
        moved += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::Education;
    use pretty_assertions::assert_eq;

    #[test]
    fn same_seed_same_batch() {
        let a = PersonaGenerator::new(42).generate(8, None, Some("AI meal planner"), Some("app")).unwrap();
        let b = PersonaGenerator::new(42).generate(8, None, Some("AI meal planner"), Some("app")).unwrap();
        assert_eq!(a, b);
        let c = PersonaGenerator::new(43).generate(8, None, Some("AI meal planner"), Some("app")).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn zero_personas_is_a_config_error() {
        let err = PersonaGenerator::new(1).generate(0, None, None, None).unwrap_err();
        assert!(matches!(err, FocusGroupError::Config(_)));
    }

    #[test]
    fn opinions_need_both_concept_and_category() {
        let personas = PersonaGenerator::new(3).generate(6, None, Some("x"), None).unwrap();
        assert!(personas.iter().all(|p| p.opinion_valence.is_none() && p.initial_opinion.is_none()));
    }

    #[test]
    fn constraints_are_respected_after_corrections() {
        let constraints = DemographicConstraints {
            age_range: Some((25, 34)),
            education: Some(vec![Education::Bachelors, Education::Masters]),
            ..Default::default()
        };
        let personas = PersonaGenerator::new(9)
            .generate(20, Some(&constraints), Some("x"), Some("app"))
            .unwrap();
        for p in &personas {
            assert!(constraints.matches(&p.demographics), "{:?}", p.demographics);
        }
    }

    #[test]
    fn large_pools_span_ages_and_regions() {
        let personas = PersonaGenerator::new(11).generate(20, None, None, None).unwrap();
        let brackets: HashSet<usize> = personas.iter().map(|p| age_bracket(p.demographics.age)).collect();
        let regions: HashSet<usize> = personas.iter().map(region_index).collect();
        assert!(brackets.len() >= 3);
        assert_eq!(regions.len(), 4);
    }

    #[test]
    fn age_correction_moves_only_duplicates() {
        let mut personas = PersonaGenerator::new(2).generate(14, None, None, None).unwrap();
        for p in personas.iter_mut() {
            p.demographics.age = 33;
        }
        personas[0].demographics.age = 70;
        assert_eq!(spread_age_brackets(&mut personas), 1);
        assert_eq!(personas[0].demographics.age, 70);
        assert_eq!(personas[13].demographics.age, 24);
    }

    #[test]
    fn name_pool_exhaustion_still_yields_unique_names() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut used = HashSet::new();
        let total = NEUTRAL_FIRST.len() * SURNAMES.len() + 3;
        for _ in 0..total {
            unique_name(&mut rng, Gender::NonBinary, &mut used);
        }
        assert_eq!(used.len(), total);
    }
}
