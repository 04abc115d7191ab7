// src/persona/psychographics.rs
// PSYCHOGRAPHICS GENERATOR
// OCEAN traits from normal noise + age/gender drift + quadrant stratification,
// then archetype seeding and spread widening across the whole batch.

use rand::prelude::*;
use rand_distr::StandardNormal;

use super::diversity::DEFAULT_MIN_TRAIT_STD;
use super::{
    linspace, rank_order, std_dev, Demographics, Education, Gender, LifestyleSegment,
    OceanScores, Psychographics, Trait, ValueDomain, ValuePriorities,
};

const TRAIT_MEAN: f64 = 50.0;
const TRAIT_SD: f64 = 15.0;
const QUADRANT_PULL: f64 = 0.25;
/// (openness, extraversion) anchors, assigned round-robin by batch position.
const QUADRANTS: [(f64, f64); 4] = [(35.0, 35.0), (35.0, 70.0), (70.0, 35.0), (70.0, 70.0)];
const RAMP_HALF_WIDTH: f64 = 18.0;
const TERTIARY_VALUE_PROBABILITY: f64 = 0.55;

fn draw_trait<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    TRAIT_MEAN + TRAIT_SD * z
}

fn age_gender_adjusted(base: [f64; 5], demo: &Demographics) -> OceanScores {
    let [o, mut c, mut e, mut a, mut n] = base;
    let age = demo.age as f64;
    let decades_past_30 = (age - 30.0).max(0.0) / 10.0;
    e -= 0.3 * decades_past_30;
    a += 0.2 * decades_past_30;

    c += match demo.age {
        40..=60 => 6.0,
        30..=39 | 61..=70 => 3.0,
        _ => -2.0,
    };

    if demo.gender == Gender::Female {
        a += 4.0;
        n += 4.0;
    }
    OceanScores::new(o, c, e, a, n)
}

/// Forces the four required archetypes into the first four slots.
pub(crate) fn seed_archetypes(oceans: &mut [&mut OceanScores]) {
    if oceans.len() < 4 {
        return;
    }
    let a0 = oceans[0].agreeableness.min(25.0);
    oceans[0].set(Trait::Agreeableness, a0);
    let o1 = oceans[1].openness.max(85.0);
    oceans[1].set(Trait::Openness, o1);
    let o2 = oceans[2].openness.min(25.0);
    oceans[2].set(Trait::Openness, o2);
    let n3 = oceans[3].neuroticism.max(75.0);
    oceans[3].set(Trait::Neuroticism, n3);
}

/// Adds `ramp[rank]` to each persona's trait, rank taken over the current values.
/// Monotone in rank, so the minimum only falls and the maximum only rises.
pub(crate) fn apply_rank_ramp(oceans: &mut [&mut OceanScores], t: Trait, half_width: f64) {
    let values: Vec<f64> = oceans.iter().map(|o| o.get(t)).collect();
    let ramp = linspace(-half_width, half_width, values.len());
    for (rank, idx) in rank_order(&values).into_iter().enumerate() {
        let shifted = values[idx] + ramp[rank];
        oceans[idx].set(t, shifted);
    }
}

/// Rule-first lifestyle segmentation with a nearest-profile fallback.
pub fn lifestyle_segment(ocean: &OceanScores, demo: &Demographics) -> LifestyleSegment {
    let OceanScores {
        openness: o,
        conscientiousness: c,
        extraversion: e,
        agreeableness: a,
        ..
    } = *ocean;
    let income = demo.income;
    let high_income = income >= 120_000;
    let low_income = income < 55_000;
    let high_edu = demo.education.is_degree();
    let lower_edu = matches!(demo.education, Education::HighSchool | Education::SomeCollege);
    let young = demo.age <= 34;

    if o > 65.0 && c > 65.0 && high_income && high_edu {
        return LifestyleSegment::Innovator;
    }
    if o > 60.0 && c > 60.0 && (40.0..=70.0).contains(&e) && high_edu {
        return LifestyleSegment::Thinker;
    }
    if c > 65.0 && e > 60.0 && income >= 70_000 {
        return LifestyleSegment::Achiever;
    }
    if o > 65.0 && e > 65.0 && c < 45.0 && young {
        return LifestyleSegment::Experiencer;
    }
    if o < 40.0 && a > 55.0 && c > 55.0 && lower_edu {
        return LifestyleSegment::Believer;
    }
    if e > 60.0 && c < 45.0 && low_income {
        return LifestyleSegment::Striver;
    }
    if e < 45.0 && c > 55.0 && low_income {
        return LifestyleSegment::Maker;
    }
    if (o + c + e + a) / 4.0 < 45.0 && income < 45_000 {
        return LifestyleSegment::Survivor;
    }

    let mut best = LifestyleSegment::Innovator;
    let mut best_score = f64::NEG_INFINITY;
    for (segment, score) in segment_scores(ocean, demo) {
        if score > best_score {
            best = segment;
            best_score = score;
        }
    }
    best
}

/// Closed-form affinity of a persona to every segment, in `LifestyleSegment::ALL` order.
pub fn segment_scores(ocean: &OceanScores, demo: &Demographics) -> [(LifestyleSegment, f64); 8] {
    let OceanScores {
        openness: o,
        conscientiousness: c,
        extraversion: e,
        agreeableness: a,
        neuroticism: n,
    } = *ocean;
    let bonus = |cond: bool, points: f64| if cond { points } else { 0.0 };
    let low_income = demo.income < 55_000;
    let lower_edu = matches!(demo.education, Education::HighSchool | Education::SomeCollege);

    [
        (
            LifestyleSegment::Innovator,
            (o + c) / 2.0 + bonus(demo.income >= 120_000, 15.0) + bonus(demo.education.is_degree(), 10.0),
        ),
        (LifestyleSegment::Thinker, (o + c) / 2.0 - (e - 55.0).abs()),
        (
            LifestyleSegment::Achiever,
            (c + e) / 2.0 + bonus(demo.income >= 70_000, 8.0),
        ),
        (
            LifestyleSegment::Experiencer,
            (o + e - c) / 2.0 + bonus(demo.age <= 34, 8.0),
        ),
        (
            LifestyleSegment::Believer,
            ((100.0 - o) + a + c) / 3.0 + bonus(lower_edu, 8.0),
        ),
        (
            LifestyleSegment::Striver,
            (e + (100.0 - c)) / 2.0 + bonus(low_income, 8.0),
        ),
        (
            LifestyleSegment::Maker,
            ((100.0 - e) + c) / 2.0 + bonus(low_income, 8.0),
        ),
        (
            LifestyleSegment::Survivor,
            ((100.0 - o) + (100.0 - c) + (100.0 - e) + (100.0 - a) + n) / 5.0
                + bonus(demo.income < 45_000, 12.0),
        ),
    ]
}

/// Trait-to-value affinities, highest first; the third slot is filled ~55% of the time.
pub fn value_priorities<R: Rng + ?Sized>(rng: &mut R, ocean: &OceanScores) -> ValuePriorities {
    let weight = |v: ValueDomain| match v {
        ValueDomain::SelfDirection => ocean.openness,
        ValueDomain::Stimulation => ocean.openness * 0.9,
        ValueDomain::Achievement => ocean.conscientiousness * 0.8,
        ValueDomain::Security => ocean.conscientiousness * 0.6 + ocean.neuroticism * 0.8,
        ValueDomain::Power => ocean.extraversion * 0.7,
        ValueDomain::Hedonism => ocean.extraversion * 0.6,
        ValueDomain::Benevolence => ocean.agreeableness * 0.8,
        ValueDomain::Universalism => ocean.agreeableness * 0.7,
        ValueDomain::Conformity => ocean.agreeableness * 0.5,
        ValueDomain::Tradition => ocean.neuroticism * 0.6,
    };
    let mut ranked: Vec<(ValueDomain, f64)> =
        ValueDomain::ALL.iter().map(|v| (*v, weight(*v))).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let tertiary = (rng.gen::<f64>() < TERTIARY_VALUE_PROBABILITY).then_some(ranked[2].0);
    ValuePriorities {
        primary: ranked[0].0,
        secondary: ranked[1].0,
        tertiary,
    }
}

/// One psychographic profile per demographic record, same order.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, demographics: &[Demographics]) -> Vec<Psychographics> {
    // 1. Noise, drift, quadrant pull
    let mut oceans: Vec<OceanScores> = demographics
        .iter()
        .enumerate()
        .map(|(idx, demo)| {
            let base = [
                draw_trait(rng),
                draw_trait(rng),
                draw_trait(rng),
                draw_trait(rng),
                draw_trait(rng),
            ];
            let mut ocean = age_gender_adjusted(base, demo);
            let (target_o, target_e) = QUADRANTS[idx % QUADRANTS.len()];
            let o = ocean.openness * (1.0 - QUADRANT_PULL) + target_o * QUADRANT_PULL;
            let e = ocean.extraversion * (1.0 - QUADRANT_PULL) + target_e * QUADRANT_PULL;
            ocean.set(Trait::Openness, o);
            ocean.set(Trait::Extraversion, e);
            ocean
        })
        .collect();

    // 2. Archetypes
    {
        let mut refs: Vec<&mut OceanScores> = oceans.iter_mut().collect();
        seed_archetypes(&mut refs);

        // 3. Widen thin traits, proportionally to the shortfall
        if refs.len() > 1 {
            for t in Trait::ALL {
                let values: Vec<f64> = refs.iter().map(|o| o.get(*t)).collect();
                let spread = std_dev(&values);
                if spread < DEFAULT_MIN_TRAIT_STD {
                    let boost = ((DEFAULT_MIN_TRAIT_STD - spread) / 10.0 + 0.2).min(1.0);
                    apply_rank_ramp(&mut refs, *t, RAMP_HALF_WIDTH * boost);
                }
            }
        }
    }

    // 4. Labels from the final traits
    oceans
        .into_iter()
        .zip(demographics)
        .map(|(ocean, demo)| Psychographics {
            lifestyle_segment: lifestyle_segment(&ocean, demo),
            values: value_priorities(rng, &ocean),
            ocean,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::demographics;
    use rand::rngs::StdRng;

    fn batch(seed: u64, n: usize) -> (Vec<Demographics>, Vec<Psychographics>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let demos = demographics::sample(&mut rng, n, None).unwrap();
        let psychos = generate(&mut rng, &demos);
        (demos, psychos)
    }

    #[test]
    fn batch_contains_archetypes_and_valid_ranges() {
        for seed in 0..20 {
            let (_, psychos) = batch(seed, 8);
            assert_eq!(psychos.len(), 8);
            assert!(psychos.iter().any(|p| p.ocean.agreeableness < 30.0));
            assert!(psychos.iter().any(|p| p.ocean.openness > 80.0));
            assert!(psychos.iter().any(|p| p.ocean.openness < 30.0));
            assert!(psychos.iter().any(|p| p.ocean.neuroticism > 70.0));
            for p in &psychos {
                for t in Trait::ALL {
                    let v = p.ocean.get(*t);
                    assert!((0.0..=100.0).contains(&v), "{t} out of range: {v}");
                }
                let ranked = p.values.ranked();
                assert!(ranked.len() == 2 || ranked.len() == 3);
            }
        }
    }

    #[test]
    fn rank_ramp_keeps_extremes_extreme() {
        let mut oceans = vec![
            OceanScores::new(10.0, 50.0, 50.0, 50.0, 50.0),
            OceanScores::new(55.0, 50.0, 50.0, 50.0, 50.0),
            OceanScores::new(50.0, 50.0, 50.0, 50.0, 50.0),
            OceanScores::new(90.0, 50.0, 50.0, 50.0, 50.0),
        ];
        let mut refs: Vec<&mut OceanScores> = oceans.iter_mut().collect();
        apply_rank_ramp(&mut refs, Trait::Openness, 20.0);
        assert_eq!(oceans[0].openness, 0.0);
        assert_eq!(oceans[3].openness, 100.0);
        assert!(oceans[2].openness < oceans[1].openness);
    }

    #[test]
    fn segment_rules_take_precedence_over_scores() {
        let (demos, _) = batch(3, 1);
        let mut demo = demos[0].clone();
        demo.income = 150_000;
        demo.education = Education::Masters;
        let ocean = OceanScores::new(80.0, 80.0, 50.0, 50.0, 50.0);
        assert_eq!(lifestyle_segment(&ocean, &demo), LifestyleSegment::Innovator);

        demo.income = 30_000;
        demo.education = Education::HighSchool;
        let flat = OceanScores::new(30.0, 30.0, 30.0, 30.0, 60.0);
        assert_eq!(lifestyle_segment(&flat, &demo), LifestyleSegment::Survivor);
    }

    #[test]
    fn value_ranking_follows_dominant_trait() {
        let mut rng = StdRng::seed_from_u64(1);
        let curious = OceanScores::new(95.0, 20.0, 20.0, 20.0, 10.0);
        let values = value_priorities(&mut rng, &curious);
        assert_eq!(values.primary, ValueDomain::SelfDirection);
        assert_eq!(values.secondary, ValueDomain::Stimulation);
    }
}
