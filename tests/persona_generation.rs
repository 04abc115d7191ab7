// Persona batches: identity, diversity guarantees and the seeded reference panel.

use std::collections::{BTreeSet, HashSet};

use focus_panel::persona::diversity::opinion_entropy;
use focus_panel::{DiversityChecker, DiversityTarget, PersonaGenerator};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const CONCEPT: &str = "AI meal planner";
const CATEGORY: &str = "app";

#[test]
fn every_pool_size_has_unique_ids_and_names() {
    for n in 4..=48 {
        let personas = PersonaGenerator::new(n as u64).generate(n, None, None, None).unwrap();
        assert_eq!(personas.len(), n);
        let ids: HashSet<_> = personas.iter().map(|p| p.id).collect();
        let names: HashSet<_> = personas.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(ids.len(), n, "duplicate id at n={n}");
        assert_eq!(names.len(), n, "duplicate name at n={n}");
    }
}

#[test]
fn reference_panel_spans_segments_and_opinions() {
    let personas = PersonaGenerator::new(42)
        .generate(8, None, Some(CONCEPT), Some(CATEGORY))
        .unwrap();
    assert_eq!(personas.len(), 8);

    let segments: BTreeSet<_> = personas.iter().map(|p| p.psychographics.lifestyle_segment).collect();
    assert!(segments.len() >= 3, "only {} segments", segments.len());

    let valences: Vec<f64> = personas.iter().map(|p| p.opinion_valence.unwrap()).collect();
    let min = valences.iter().copied().fold(f64::INFINITY, f64::min);
    let max = valences.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert!(min < -0.3, "min valence {min}");
    assert!(max > 0.3, "max valence {max}");
    assert!(personas.iter().all(|p| p.initial_opinion.is_some()));
}

#[test]
fn enforce_leaves_a_passing_batch_alone() {
    let personas = PersonaGenerator::new(9)
        .generate(10, None, Some(CONCEPT), Some(CATEGORY))
        .unwrap();
    let target = DiversityTarget::for_pool(personas.len());
    assert!(DiversityChecker::check(&personas, &target).passes);

    let enforced = DiversityChecker::new().enforce(personas.clone(), &target).unwrap();
    assert_eq!(enforced, personas);
}

#[test]
fn large_pool_keeps_its_diversity_after_corrections() {
    let personas = PersonaGenerator::new(5)
        .generate(40, None, Some(CONCEPT), Some(CATEGORY))
        .unwrap();
    let report = DiversityChecker::check(&personas, &DiversityTarget::for_pool(40));
    assert!(report.passes, "{:?}", report.issues);
    assert!(report.opinion_entropy >= 1.5);
    assert_eq!(report.opinion_entropy, opinion_entropy(&personas));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn generated_batches_pass_the_diversity_check(seed in any::<u64>(), n in 4usize..=48) {
        let personas = PersonaGenerator::new(seed)
            .generate(n, None, Some(CONCEPT), Some(CATEGORY))
            .unwrap();
        let report = DiversityChecker::check(&personas, &DiversityTarget::for_pool(n));
        prop_assert!(report.passes, "seed {} n {}: {:?}", seed, n, report.issues);
    }

    #[test]
    fn valences_stay_in_range(seed in any::<u64>(), n in 4usize..=16) {
        let personas = PersonaGenerator::new(seed)
            .generate(n, None, Some(CONCEPT), Some(CATEGORY))
            .unwrap();
        for p in &personas {
            let v = p.opinion_valence.unwrap();
            prop_assert!((-1.0..=1.0).contains(&v), "{} has valence {}", p.name, v);
        }
    }
}
