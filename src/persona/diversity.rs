// src/persona/diversity.rs
// DIVERSITY CHECKER / ENFORCER
// Population-level guarantees for a persona batch: opinion entropy, trait spread,
// no runaway opinion majority, the four archetypes, and a mix of lifestyle segments.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::opinion_seeder::valence_for;
use super::psychographics::{apply_rank_ramp, seed_archetypes, segment_scores};
use super::{rank_order, std_dev, LifestyleSegment, OceanScores, Persona, Trait};
use crate::error::{FocusGroupError, Result};

pub const DEFAULT_MIN_TRAIT_STD: f64 = 15.0;
pub const DEFAULT_MIN_ENTROPY: f64 = 1.5;
pub const RESAMPLE_ATTEMPTS: usize = 30;

const SIGN_DEADBAND: f64 = 0.1;
const POLARITY_THRESHOLD: f64 = 0.3;
/// Histogram edges over [-1, 1]; the last bin is closed.
const VALENCE_BIN_EDGES: [f64; 4] = [-0.6, -0.2, 0.2, 0.6];
const VALENCE_SEEDS: [f64; 8] = [-0.9, -0.6, -0.3, -0.05, 0.2, 0.5, 0.75, 0.95];
const REPAIR_RAMP_START: f64 = 20.0;
const REPAIR_RAMP_STEP: f64 = 10.0;
const REPAIR_RAMP_ROUNDS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityTarget {
    pub min_opinion_entropy: f64,
    pub min_trait_std: f64,
    pub max_same_sign: usize,
    pub require_contrarian: bool,
    pub require_enthusiast: bool,
    pub require_skeptic: bool,
    pub require_worrier: bool,
    /// Entropy, sign-majority and polarity checks; off when no concept was seeded.
    pub require_opinion_spread: bool,
    /// At least one valence below -0.3 and one above 0.3.
    pub require_polarized_extremes: bool,
    pub min_distinct_segments: usize,
}

impl Default for DiversityTarget {
    fn default() -> Self {
        Self::for_pool(8)
    }
}

impl DiversityTarget {
    /// Thresholds scaled to a pool of `n`. Pools under four cannot host every
    /// archetype, so they only get the segment check.
    pub fn for_pool(n: usize) -> Self {
        if n < 4 {
            return Self {
                min_opinion_entropy: 0.0,
                min_trait_std: 0.0,
                max_same_sign: n,
                require_contrarian: false,
                require_enthusiast: false,
                require_skeptic: false,
                require_worrier: false,
                require_opinion_spread: false,
                require_polarized_extremes: false,
                min_distinct_segments: 3.min(n),
            };
        }
        Self {
            min_opinion_entropy: DEFAULT_MIN_ENTROPY,
            min_trait_std: DEFAULT_MIN_TRAIT_STD,
            max_same_sign: 5.max((5 * n).div_ceil(8)),
            require_contrarian: true,
            require_enthusiast: true,
            require_skeptic: true,
            require_worrier: true,
            require_opinion_spread: true,
            require_polarized_extremes: true,
            min_distinct_segments: 3,
        }
    }

    /// Same as [`for_pool`](Self::for_pool) without any opinion checks.
    pub fn traits_only(n: usize) -> Self {
        Self {
            require_opinion_spread: false,
            require_polarized_extremes: false,
            ..Self::for_pool(n)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityReport {
    pub opinion_entropy: f64,
    pub trait_spread: BTreeMap<Trait, f64>,
    pub passes: bool,
    pub issues: Vec<String>,
}

fn valence_bin(v: f64) -> usize {
    VALENCE_BIN_EDGES.iter().take_while(|edge| v >= **edge).count()
}

/// Shannon entropy (bits) of valences over five fixed bins. Unset valences are skipped.
pub fn opinion_entropy(personas: &[Persona]) -> f64 {
    let mut hist = [0usize; 5];
    for v in personas.iter().filter_map(|p| p.opinion_valence) {
        hist[valence_bin(v)] += 1;
    }
    let total: usize = hist.iter().sum();
    if total == 0 {
        return 0.0;
    }
    hist.iter()
        .filter(|count| **count > 0)
        .map(|count| {
            let p = *count as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Signature of the regeneration callback: attempt index in, fresh batch out.
pub type Resampler<'a> = dyn Fn(usize) -> Result<Vec<Persona>> + Sync + 'a;

pub struct DiversityChecker<'a> {
    resampler: Option<&'a Resampler<'a>>,
    attempts: usize,
}

impl Default for DiversityChecker<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> DiversityChecker<'a> {
    /// Checker without a resampler: enforcement goes straight to repair.
    pub fn new() -> Self {
        Self {
            resampler: None,
            attempts: RESAMPLE_ATTEMPTS,
        }
    }

    pub fn with_resampler(resampler: &'a Resampler<'a>) -> Self {
        Self {
            resampler: Some(resampler),
            attempts: RESAMPLE_ATTEMPTS,
        }
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn check(personas: &[Persona], target: &DiversityTarget) -> DiversityReport {
        let mut issues = Vec::new();
        if personas.is_empty() {
            return DiversityReport {
                opinion_entropy: 0.0,
                trait_spread: Trait::ALL.iter().map(|t| (*t, 0.0)).collect(),
                passes: false,
                issues: vec!["No personas provided".to_string()],
            };
        }

        let oceans: Vec<&OceanScores> = personas.iter().map(|p| p.ocean()).collect();
        let trait_spread: BTreeMap<Trait, f64> = Trait::ALL
            .iter()
            .map(|t| {
                let values: Vec<f64> = oceans.iter().map(|o| o.get(*t)).collect();
                (*t, std_dev(&values))
            })
            .collect();

        let archetypes = [
            (target.require_contrarian, "contrarian (agreeableness < 30)", oceans.iter().any(|o| o.agreeableness < 30.0)),
            (target.require_enthusiast, "enthusiast (openness > 80)", oceans.iter().any(|o| o.openness > 80.0)),
            (target.require_skeptic, "skeptic (openness < 30)", oceans.iter().any(|o| o.openness < 30.0)),
            (target.require_worrier, "worrier (neuroticism > 70)", oceans.iter().any(|o| o.neuroticism > 70.0)),
        ];
        for (required, label, present) in archetypes {
            if required && !present {
                issues.push(format!("Missing {label}"));
            }
        }

        let entropy = opinion_entropy(personas);
        if target.require_opinion_spread {
            if entropy < target.min_opinion_entropy {
                issues.push(format!(
                    "Opinion entropy too low ({entropy:.2} < {})",
                    target.min_opinion_entropy
                ));
            }
            let valences: Vec<f64> = personas.iter().filter_map(|p| p.opinion_valence).collect();
            let positive = valences.iter().filter(|v| **v > SIGN_DEADBAND).count();
            let negative = valences.iter().filter(|v| **v < -SIGN_DEADBAND).count();
            if positive.max(negative) > target.max_same_sign {
                issues.push(format!(
                    "Too many personas share the same opinion sign ({} > {})",
                    positive.max(negative),
                    target.max_same_sign
                ));
            }
            if target.require_polarized_extremes
                && !(valences.iter().any(|v| *v < -POLARITY_THRESHOLD)
                    && valences.iter().any(|v| *v > POLARITY_THRESHOLD))
            {
                issues.push("Opinions lack a clear critic and a clear supporter".to_string());
            }
        }

        for (t, spread) in &trait_spread {
            if *spread < target.min_trait_std {
                issues.push(format!(
                    "Trait spread too low for {t} ({spread:.2} < {})",
                    target.min_trait_std
                ));
            }
        }

        let segments: BTreeSet<LifestyleSegment> = personas
            .iter()
            .map(|p| p.psychographics.lifestyle_segment)
            .collect();
        if segments.len() < target.min_distinct_segments {
            issues.push(format!(
                "Too few lifestyle segments ({} < {})",
                segments.len(),
                target.min_distinct_segments
            ));
        }

        DiversityReport {
            opinion_entropy: entropy,
            trait_spread,
            passes: issues.is_empty(),
            issues,
        }
    }

    /// Returns `personas` untouched when they pass; otherwise the first passing
    /// regenerated batch (in attempt order), otherwise a deterministic repair.
    pub fn enforce(&self, personas: Vec<Persona>, target: &DiversityTarget) -> Result<Vec<Persona>> {
        let report = Self::check(&personas, target);
        if report.passes {
            return Ok(personas);
        }
        debug!(issues = ?report.issues, "DIVERSITY: Batch failed check");

        if let Some(resample) = self.resampler {
            let found = (0..self.attempts)
                .into_par_iter()
                .filter_map(|attempt| match resample(attempt) {
                    Ok(batch) => Some((attempt, batch)),
                    Err(err) => {
                        warn!(attempt, error = %err, "DIVERSITY: Resample failed");
                        None
                    }
                })
                .find_first(|(_, batch)| Self::check(batch, target).passes);
            if let Some((attempt, batch)) = found {
                info!(attempt, "DIVERSITY: Accepted regenerated batch");
                return Ok(batch);
            }
            info!(attempts = self.attempts, "DIVERSITY: Resampling exhausted, repairing");
        }

        Self::repair(personas, target)
    }

    /// Deterministic repair. Touches only `ocean`, `opinion_valence` and
    /// `lifestyle_segment`; a passing set comes back unchanged.
    pub fn repair(mut personas: Vec<Persona>, target: &DiversityTarget) -> Result<Vec<Persona>> {
        if Self::check(&personas, target).passes {
            return Ok(personas);
        }

        // 1. Archetypes at fixed slots, then widen every thin trait by rank
        {
            let mut oceans: Vec<&mut OceanScores> = personas
                .iter_mut()
                .map(|p| &mut p.psychographics.ocean)
                .collect();
            seed_archetypes(&mut oceans);

            if oceans.len() > 1 {
                for t in Trait::ALL {
                    let mut width = REPAIR_RAMP_START;
                    for _ in 0..REPAIR_RAMP_ROUNDS {
                        let values: Vec<f64> = oceans.iter().map(|o| o.get(*t)).collect();
                        if std_dev(&values) >= target.min_trait_std {
                            break;
                        }
                        apply_rank_ramp(&mut oceans, *t, width);
                        width += REPAIR_RAMP_STEP;
                    }
                }
            }
        }

        // 2. Fixed valence spread, handed out in order of each persona's leaning
        if target.require_opinion_spread && !personas.is_empty() {
            let leaning: Vec<f64> = personas
                .iter()
                .map(|p| p.opinion_valence.unwrap_or_else(|| valence_for(p, 0.0)))
                .collect();
            let n = personas.len();
            for (rank, idx) in rank_order(&leaning).into_iter().enumerate() {
                let seed = VALENCE_SEEDS[rank * VALENCE_SEEDS.len() / n];
                personas[idx].opinion_valence = Some(seed);
            }
        }

        // 3. Relabel trailing duplicates until enough segments are present
        fill_segments(&mut personas, target.min_distinct_segments);

        let report = Self::check(&personas, target);
        if !report.passes {
            return Err(FocusGroupError::DiversityRepair(report.issues));
        }
        info!(n = personas.len(), "DIVERSITY: Repaired batch");
        Ok(personas)
    }
}

fn fill_segments(personas: &mut [Persona], min_distinct: usize) {
    loop {
        let mut counts: HashMap<LifestyleSegment, usize> = HashMap::new();
        for p in personas.iter() {
            *counts.entry(p.psychographics.lifestyle_segment).or_default() += 1;
        }
        if counts.len() >= min_distinct {
            return;
        }
        let Some(idx) = (0..personas.len())
            .rev()
            .find(|i| counts[&personas[*i].psychographics.lifestyle_segment] > 1)
        else {
            return;
        };

        let persona = &personas[idx];
        let mut best: Option<(LifestyleSegment, f64)> = None;
        for (segment, score) in segment_scores(persona.ocean(), &persona.demographics) {
            if counts.contains_key(&segment) {
                continue;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((segment, score));
            }
        }
        match best {
            Some((segment, _)) => personas[idx].psychographics.lifestyle_segment = segment,
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona_generator::PersonaGenerator;
    use pretty_assertions::assert_eq;

    fn flat_batch(n: usize) -> Vec<Persona> {
        let mut personas = PersonaGenerator::new(5).generate(n, None, None, None).unwrap();
        for p in personas.iter_mut() {
            p.psychographics.ocean = OceanScores::new(50.0, 50.0, 50.0, 50.0, 50.0);
            p.psychographics.lifestyle_segment = LifestyleSegment::Maker;
            p.opinion_valence = Some(0.4);
        }
        personas
    }

    #[test]
    fn entropy_uses_five_fixed_bins() {
        let mut personas = flat_batch(5);
        for (p, v) in personas.iter_mut().zip([-0.9, -0.4, 0.0, 0.4, 0.9]) {
            p.opinion_valence = Some(v);
        }
        assert!((opinion_entropy(&personas) - 5f64.log2()).abs() < 1e-9);

        for p in personas.iter_mut() {
            p.opinion_valence = Some(0.3);
        }
        assert_eq!(opinion_entropy(&personas), 0.0);
    }

    #[test]
    fn bin_edges_are_left_closed() {
        assert_eq!(valence_bin(-1.0), 0);
        assert_eq!(valence_bin(-0.6), 1);
        assert_eq!(valence_bin(0.2), 3);
        assert_eq!(valence_bin(1.0), 4);
    }

    #[test]
    fn flat_batch_reports_every_problem() {
        let report = DiversityChecker::check(&flat_batch(8), &DiversityTarget::for_pool(8));
        assert!(!report.passes);
        let joined = report.issues.join("\n");
        for needle in ["contrarian", "enthusiast", "skeptic", "worrier", "entropy", "same opinion sign", "critic", "openness", "segments"] {
            assert!(joined.contains(needle), "missing issue for {needle}: {joined}");
        }
    }

    #[test]
    fn repair_fixes_a_flat_batch() {
        for n in [4, 5, 7, 8, 13, 30] {
            let target = DiversityTarget::for_pool(n);
            let repaired = DiversityChecker::new().enforce(flat_batch(n), &target).unwrap();
            let report = DiversityChecker::check(&repaired, &target);
            assert!(report.passes, "n={n}: {:?}", report.issues);
        }
    }

    #[test]
    fn repair_is_idempotent() {
        let target = DiversityTarget::for_pool(8);
        let once = DiversityChecker::repair(flat_batch(8), &target).unwrap();
        let twice = DiversityChecker::repair(once.clone(), &target).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn resampler_result_wins_when_it_passes() {
        let good = DiversityChecker::repair(flat_batch(8), &DiversityTarget::for_pool(8)).unwrap();
        let marker = good[0].id;
        let resample = move |_attempt: usize| -> Result<Vec<Persona>> { Ok(good.clone()) };
        let checker = DiversityChecker::with_resampler(&resample).with_attempts(3);
        let out = checker.enforce(flat_batch(8), &DiversityTarget::for_pool(8)).unwrap();
        assert_eq!(out[0].id, marker);
    }

    #[test]
    fn traits_only_ignores_missing_valences() {
        let mut personas = DiversityChecker::repair(flat_batch(8), &DiversityTarget::for_pool(8)).unwrap();
        for p in personas.iter_mut() {
            p.opinion_valence = None;
        }
        assert!(DiversityChecker::check(&personas, &DiversityTarget::traits_only(8)).passes);
        assert!(!DiversityChecker::check(&personas, &DiversityTarget::for_pool(8)).passes);
    }
}
