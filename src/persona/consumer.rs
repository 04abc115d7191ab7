// src/persona/consumer.rs
// CONSUMER PROFILE: fixed linear blends of traits and income, plus two categoricals.

use rand::prelude::*;

use super::{
    weighted_pick, ConsumerProfile, DecisionStyle, Demographics, Engagement, Psychographics, Trait,
};

fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Engagement weights shift toward heavy use for younger, higher-income personas.
fn engagement_weights(demo: &Demographics) -> [(Engagement, f64); 4] {
    let age_factor: f64 = match demo.age {
        0..=40 => 1.0,
        41..=60 => 0.75,
        _ => 0.55,
    };
    let income_factor = match demo.income {
        i if i >= 90_000 => 1.0,
        i if i >= 50_000 => 0.85,
        _ => 0.65,
    };
    let heavy = 0.22 * age_factor * income_factor;
    let moderate = 0.44;
    let light = 0.26 + if demo.age > 60 { 0.10 } else { 0.0 };
    let non_user = (1.0 - heavy - moderate - light).max(0.04);
    let total = heavy + moderate + light + non_user;
    [
        (Engagement::Heavy, heavy / total),
        (Engagement::Moderate, moderate / total),
        (Engagement::Light, light / total),
        (Engagement::NonUser, non_user / total),
    ]
}

/// Style of whichever trait dominates. Ties resolve in the order conscientiousness,
/// neuroticism, agreeableness, extraversion, openness.
pub fn decision_style(psycho: &Psychographics) -> DecisionStyle {
    let ocean = &psycho.ocean;
    let c = ocean.conscientiousness;
    let e = ocean.extraversion;
    let order = [
        Trait::Conscientiousness,
        Trait::Neuroticism,
        Trait::Agreeableness,
        Trait::Extraversion,
        Trait::Openness,
    ];
    let mut dominant = order[0];
    for t in &order[1..] {
        if ocean.get(*t) > ocean.get(dominant) {
            dominant = *t;
        }
    }

    match dominant {
        Trait::Conscientiousness => DecisionStyle::Analytical,
        Trait::Neuroticism => DecisionStyle::Emotional,
        Trait::Agreeableness => DecisionStyle::Habitual,
        Trait::Extraversion if c < 45.0 => DecisionStyle::Impulsive,
        Trait::Openness if c >= 55.0 => DecisionStyle::Analytical,
        _ if e >= 65.0 && c < 50.0 => DecisionStyle::Impulsive,
        _ => DecisionStyle::Habitual,
    }
}

pub fn derive<R: Rng + ?Sized>(
    rng: &mut R,
    demo: &Demographics,
    psycho: &Psychographics,
) -> ConsumerProfile {
    let o = psycho.ocean.openness / 100.0;
    let c = psycho.ocean.conscientiousness / 100.0;
    let e = psycho.ocean.extraversion / 100.0;
    let a = psycho.ocean.agreeableness / 100.0;
    let n = psycho.ocean.neuroticism / 100.0;

    let income_inverse = unit(1.0 - (demo.income as f64 - 20_000.0) / 180_000.0);

    ConsumerProfile {
        price_sensitivity: unit(income_inverse * (1.0 - c / 2.0)),
        brand_loyalty: unit((1.0 - o) * 0.55 + c * 0.45),
        research_tendency: unit(c * 0.7 + n * 0.3),
        impulse_tendency: unit((1.0 - c) * e),
        social_influence: unit(a * 0.5 + e * 0.3 + n * 0.2),
        risk_tolerance: unit(o * 0.4 + e * 0.3 - n * 0.3),
        category_engagement: weighted_pick(rng, &engagement_weights(demo)),
        decision_style: decision_style(psycho),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{
        Education, Ethnicity, Gender, HouseholdType, LifestyleSegment, Location, OceanScores,
        Urbanicity, ValueDomain, ValuePriorities,
    };
    use rand::rngs::StdRng;

    fn demo(age: u8, income: u32) -> Demographics {
        Demographics {
            age,
            gender: Gender::Female,
            income,
            education: Education::Bachelors,
            occupation: "teacher".into(),
            location: Location {
                state: "OH".into(),
                metro_area: Some("Columbus".into()),
                urbanicity: Urbanicity::Urban,
            },
            household_type: HouseholdType::Single,
            race_ethnicity: Ethnicity::White,
        }
    }

    fn psycho(o: f64, c: f64, e: f64, a: f64, n: f64) -> Psychographics {
        Psychographics {
            ocean: OceanScores::new(o, c, e, a, n),
            lifestyle_segment: LifestyleSegment::Maker,
            values: ValuePriorities {
                primary: ValueDomain::Security,
                secondary: ValueDomain::Tradition,
                tertiary: None,
            },
        }
    }

    #[test]
    fn engagement_weights_are_normalized_with_a_non_user_floor() {
        for (age, income) in [(25, 120_000), (50, 60_000), (72, 20_000)] {
            let weights = engagement_weights(&demo(age, income));
            let total: f64 = weights.iter().map(|(_, w)| w).sum();
            assert!((total - 1.0).abs() < 1e-9, "age {age} total {total}");
            assert!(weights.iter().all(|(_, w)| *w > 0.0));
        }
        let young_rich = engagement_weights(&demo(25, 120_000));
        let older_poor = engagement_weights(&demo(72, 20_000));
        assert!(young_rich[0].1 > older_poor[0].1);
    }

    #[test]
    fn scalars_stay_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(5);
        for (o, c, e, a, n) in [(0.0, 0.0, 100.0, 0.0, 100.0), (100.0, 100.0, 0.0, 100.0, 0.0)] {
            for income in [5_000, 400_000] {
                let profile = derive(&mut rng, &demo(30, income), &psycho(o, c, e, a, n));
                for v in [
                    profile.price_sensitivity,
                    profile.brand_loyalty,
                    profile.research_tendency,
                    profile.impulse_tendency,
                    profile.social_influence,
                    profile.risk_tolerance,
                ] {
                    assert!((0.0..=1.0).contains(&v));
                }
            }
        }
    }

    #[test]
    fn low_income_is_more_price_sensitive() {
        let mut rng = StdRng::seed_from_u64(5);
        let p = psycho(50.0, 50.0, 50.0, 50.0, 50.0);
        let poor = derive(&mut rng, &demo(30, 25_000), &p);
        let rich = derive(&mut rng, &demo(30, 190_000), &p);
        assert!(poor.price_sensitivity > rich.price_sensitivity);
    }

    #[test]
    fn decision_style_tie_breaks() {
        assert_eq!(decision_style(&psycho(40.0, 80.0, 50.0, 50.0, 50.0)), DecisionStyle::Analytical);
        assert_eq!(decision_style(&psycho(40.0, 50.0, 50.0, 50.0, 80.0)), DecisionStyle::Emotional);
        assert_eq!(decision_style(&psycho(40.0, 50.0, 50.0, 80.0, 50.0)), DecisionStyle::Habitual);
        assert_eq!(decision_style(&psycho(40.0, 30.0, 80.0, 50.0, 50.0)), DecisionStyle::Impulsive);
        assert_eq!(decision_style(&psycho(40.0, 60.0, 80.0, 50.0, 50.0)), DecisionStyle::Habitual);
        assert_eq!(decision_style(&psycho(90.0, 60.0, 50.0, 50.0, 50.0)), DecisionStyle::Analytical);
        // equal conscientiousness and neuroticism: conscientiousness first
        assert_eq!(decision_style(&psycho(40.0, 70.0, 50.0, 50.0, 70.0)), DecisionStyle::Analytical);
    }
}
