// src/persona/opinion_seeder.rs
// OPINION SEEDER
// Initial disposition toward a concept: a valence in [-1, 1] plus a grounded rationale.

use rand::prelude::*;

use super::{Engagement, Persona};

const NOISE: f64 = 0.2;

fn engagement_multiplier(engagement: Engagement) -> f64 {
    match engagement {
        Engagement::Heavy => 1.2,
        Engagement::Moderate => 1.0,
        Engagement::Light => 0.8,
        Engagement::NonUser => 0.6,
    }
}

/// Valence before noise is added; `noise` is expected in [-0.2, 0.2].
pub fn valence_for(persona: &Persona, noise: f64) -> f64 {
    let ocean = persona.ocean();
    let base = (ocean.openness - 50.0) / 50.0 * 0.55 + (50.0 - ocean.neuroticism) / 50.0 * 0.45;
    let price_penalty = (persona.consumer.price_sensitivity - 0.5) * 0.45;
    let multiplier = engagement_multiplier(persona.consumer.category_engagement);
    ((base - price_penalty) * multiplier + noise).clamp(-1.0, 1.0)
}

fn bucket_sentence(valence: f64, concept: &str, category: &str) -> String {
    if valence > 0.5 {
        format!("I am enthusiastic about this {category} concept. {concept} feels genuinely useful and worth trying.")
    } else if valence > 0.15 {
        format!("I am cautiously positive about this {category} idea. {concept} has potential if priced right.")
    } else if valence < -0.5 {
        format!("I am strongly skeptical of this {category} concept. {concept} feels risky or unnecessary.")
    } else if valence < -0.15 {
        format!("I am hesitant about this {category} idea. I would need better proof before considering {concept}.")
    } else {
        format!("I am neutral on this {category} concept. {concept} has pros and cons for me.")
    }
}

/// (extremity in [0, 1], fragment) for each trait-driven reason.
fn reasons(persona: &Persona) -> Vec<(f64, &'static str)> {
    let ocean = persona.ocean();
    let consumer = &persona.consumer;
    let pick = |signed: f64, high: &'static str, low: &'static str| {
        (signed.abs().min(1.0), if signed >= 0.0 { high } else { low })
    };
    vec![
        pick(
            (ocean.openness - 50.0) / 50.0,
            "I enjoy trying new things",
            "I tend to be cautious with anything new",
        ),
        pick(
            (ocean.neuroticism - 50.0) / 50.0,
            "I worry about what could go wrong",
            "I stay calm about the unknowns",
        ),
        pick(
            (consumer.price_sensitivity - 0.5) * 2.0,
            "cost is a big factor for me",
            "I am willing to pay for quality",
        ),
        pick(
            (consumer.research_tendency - 0.5) * 2.0,
            "I would research it thoroughly first",
            "I usually go with my gut",
        ),
        pick(
            (consumer.brand_loyalty - 0.5) * 2.0,
            "I tend to stick with brands I already trust",
            "I am open to switching away from familiar brands",
        ),
    ]
}

fn capitalize(fragment: &str) -> String {
    let mut chars = fragment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Deterministic rationale for `valence`: bucket sentence, the two (or three, when the
/// third is pronounced) most extreme trait reasons, and an age-framed closer.
pub fn opinion_text(persona: &Persona, valence: f64, concept: &str, category: &str) -> String {
    let mut ranked = reasons(persona);
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut text = bucket_sentence(valence, concept, category);
    text.push_str(&format!(" {}, and {}", capitalize(ranked[0].1), ranked[1].1));
    if ranked[2].0 >= 0.5 {
        text.push_str(&format!("; also, {}", ranked[2].1));
    }
    text.push('.');

    let age = persona.demographics.age;
    if age < 30 {
        text.push_str(" At my age, it has to fit how I already live day to day.");
    } else if age >= 60 {
        text.push_str(" At my stage of life, it has to be simple and clearly worth the effort.");
    }
    text
}

/// Sets valence and rationale on every persona.
pub fn seed_opinions<R: Rng + ?Sized>(
    rng: &mut R,
    personas: Vec<Persona>,
    concept: &str,
    category: &str,
) -> Vec<Persona> {
    personas
        .into_iter()
        .map(|mut persona| {
            let noise = rng.gen_range(-NOISE..=NOISE);
            let valence = valence_for(&persona, noise);
            persona.initial_opinion = Some(opinion_text(&persona, valence, concept, category));
            persona.opinion_valence = Some(valence);
            persona
        })
        .collect()
}

/// Seeds only personas that have no valence yet; returns how many were filled.
pub fn fill_missing<R: Rng + ?Sized>(
    rng: &mut R,
    personas: &mut [Persona],
    concept: &str,
    category: &str,
) -> usize {
    let mut filled = 0;
    for persona in personas.iter_mut().filter(|p| p.opinion_valence.is_none()) {
        let noise = rng.gen_range(-NOISE..=NOISE);
        persona.opinion_valence = Some(valence_for(persona, noise));
        filled += 1;
    }
    if filled > 0 {
        rerender(personas, concept, category);
    }
    filled
}

/// Rewrites every rationale from the current valence and demographics.
pub fn rerender(personas: &mut [Persona], concept: &str, category: &str) {
    for persona in personas.iter_mut() {
        if let Some(valence) = persona.opinion_valence {
            persona.initial_opinion = Some(opinion_text(persona, valence, concept, category));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona_generator::PersonaGenerator;
    use rand::rngs::StdRng;

    fn personas(n: usize) -> Vec<Persona> {
        PersonaGenerator::new(21).generate(n, None, None, None).unwrap()
    }

    #[test]
    fn valences_are_bounded_and_texts_match_buckets() {
        let mut rng = StdRng::seed_from_u64(4);
        let seeded = seed_opinions(&mut rng, personas(12), "AI meal planner", "app");
        for p in &seeded {
            let v = p.opinion_valence.unwrap();
            assert!((-1.0..=1.0).contains(&v));
            let text = p.initial_opinion.as_deref().unwrap();
            assert_eq!(text, opinion_text(p, v, "AI meal planner", "app"));
            if v > 0.5 {
                assert!(text.starts_with("I am enthusiastic"));
            } else if v < -0.5 {
                assert!(text.starts_with("I am strongly skeptical"));
            }
        }
    }

    #[test]
    fn same_draw_same_opinion() {
        let base = personas(6);
        let a = seed_opinions(&mut StdRng::seed_from_u64(8), base.clone(), "x", "app");
        let b = seed_opinions(&mut StdRng::seed_from_u64(8), base, "x", "app");
        assert_eq!(a, b);
    }

    #[test]
    fn fill_missing_only_touches_gaps() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut seeded = seed_opinions(&mut rng, personas(5), "x", "app");
        let kept = seeded[0].opinion_valence;
        seeded[3].opinion_valence = None;
        assert_eq!(fill_missing(&mut rng, &mut seeded, "x", "app"), 1);
        assert_eq!(seeded[0].opinion_valence, kept);
        assert!(seeded[3].opinion_valence.is_some());
    }
}
