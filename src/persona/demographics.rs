// src/persona/demographics.rs
// DEMOGRAPHICS SAMPLER
// Calibrated weighted tables; age drives income/education/household, region drives urbanicity.

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    weighted_pick, Demographics, Education, Ethnicity, Gender, HouseholdType, Location, Region,
    Urbanicity,
};
use crate::error::{FocusGroupError, Result};

pub const MIN_AGE: u8 = 18;
pub const MAX_AGE: u8 = 85;

// --- DISTRIBUTION TABLES ---

const AGE_BUCKETS: &[((u8, u8), f64)] = &[
    ((18, 24), 0.12),
    ((25, 34), 0.18),
    ((35, 44), 0.17),
    ((45, 54), 0.16),
    ((55, 64), 0.18),
    ((65, 85), 0.19),
];

const GENDERS: &[(Gender, f64)] = &[
    (Gender::Male, 0.485),
    (Gender::Female, 0.495),
    (Gender::NonBinary, 0.02),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgeBand {
    Young,
    Mid,
    Older,
}

fn age_band(age: u8) -> AgeBand {
    match age {
        0..=34 => AgeBand::Young,
        35..=59 => AgeBand::Mid,
        _ => AgeBand::Older,
    }
}

fn income_table(band: AgeBand) -> &'static [((u32, u32), f64)] {
    match band {
        AgeBand::Young => &[
            ((20_000, 39_999), 0.36),
            ((40_000, 69_999), 0.38),
            ((70_000, 109_999), 0.20),
            ((110_000, 180_000), 0.06),
        ],
        AgeBand::Mid => &[
            ((25_000, 44_999), 0.24),
            ((45_000, 79_999), 0.36),
            ((80_000, 129_999), 0.28),
            ((130_000, 220_000), 0.12),
        ],
        AgeBand::Older => &[
            ((22_000, 44_999), 0.30),
            ((45_000, 74_999), 0.37),
            ((75_000, 119_999), 0.24),
            ((120_000, 200_000), 0.09),
        ],
    }
}

fn education_table(band: AgeBand) -> [(Education, f64); 5] {
    let w = match band {
        AgeBand::Young => [0.24, 0.37, 0.29, 0.08, 0.02],
        AgeBand::Mid => [0.20, 0.30, 0.31, 0.15, 0.04],
        AgeBand::Older => [0.30, 0.31, 0.25, 0.10, 0.04],
    };
    [
        (Education::HighSchool, w[0]),
        (Education::SomeCollege, w[1]),
        (Education::Bachelors, w[2]),
        (Education::Masters, w[3]),
        (Education::Doctorate, w[4]),
    ]
}

fn household_table(band: AgeBand) -> [(HouseholdType, f64); 4] {
    let w = match band {
        AgeBand::Young => [0.56, 0.20, 0.14, 0.10],
        AgeBand::Mid => [0.31, 0.23, 0.33, 0.13],
        AgeBand::Older => [0.34, 0.39, 0.19, 0.08],
    };
    [
        (HouseholdType::Single, w[0]),
        (HouseholdType::MarriedNoKids, w[1]),
        (HouseholdType::MarriedWithKids, w[2]),
        (HouseholdType::SingleParent, w[3]),
    ]
}

/// A sampled state: weight, region and the metros a non-rural resident may live in.
/// `None` entries are the share of urban/suburban residents outside a named metro.
struct StateInfo {
    code: &'static str,
    weight: f64,
    region: Region,
    metros: &'static [Option<&'static str>],
}

const STATES: &[StateInfo] = &[
    StateInfo { code: "CA", weight: 0.12, region: Region::West, metros: &[Some("Los Angeles"), Some("San Francisco"), Some("San Diego")] },
    StateInfo { code: "TX", weight: 0.09, region: Region::South, metros: &[Some("Dallas"), Some("Houston"), Some("Austin")] },
    StateInfo { code: "FL", weight: 0.075, region: Region::South, metros: &[Some("Miami"), Some("Tampa"), Some("Orlando")] },
    StateInfo { code: "NY", weight: 0.06, region: Region::Northeast, metros: &[Some("New York"), Some("Buffalo"), Some("Rochester")] },
    StateInfo { code: "PA", weight: 0.04, region: Region::Northeast, metros: &[Some("Philadelphia"), Some("Pittsburgh"), None] },
    StateInfo { code: "IL", weight: 0.04, region: Region::Midwest, metros: &[Some("Chicago"), None] },
    StateInfo { code: "OH", weight: 0.035, region: Region::Midwest, metros: &[Some("Columbus"), Some("Cleveland"), Some("Cincinnati")] },
    StateInfo { code: "GA", weight: 0.032, region: Region::South, metros: &[Some("Atlanta"), None] },
    StateInfo { code: "NC", weight: 0.03, region: Region::South, metros: &[Some("Charlotte"), Some("Raleigh"), None] },
    StateInfo { code: "MI", weight: 0.028, region: Region::Midwest, metros: &[Some("Detroit"), Some("Grand Rapids"), None] },
    StateInfo { code: "WA", weight: 0.026, region: Region::West, metros: &[Some("Seattle"), None] },
    StateInfo { code: "AZ", weight: 0.024, region: Region::West, metros: &[Some("Phoenix"), Some("Tucson"), None] },
];

fn urbanicity_table(region: Region) -> [(Urbanicity, f64); 3] {
    let w = match region {
        Region::West => [0.38, 0.46, 0.16],
        Region::South => [0.29, 0.44, 0.27],
        Region::Northeast => [0.35, 0.51, 0.14],
        Region::Midwest => [0.27, 0.45, 0.28],
    };
    [
        (Urbanicity::Urban, w[0]),
        (Urbanicity::Suburban, w[1]),
        (Urbanicity::Rural, w[2]),
    ]
}

const ETHNICITIES: &[(Ethnicity, f64)] = &[
    (Ethnicity::White, 0.58),
    (Ethnicity::Black, 0.12),
    (Ethnicity::HispanicLatino, 0.19),
    (Ethnicity::Asian, 0.07),
    (Ethnicity::NativeAmerican, 0.01),
    (Ethnicity::Multiracial, 0.03),
];

fn occupations_for(education: Education) -> &'static [&'static str] {
    match education {
        Education::HighSchool => &["retail associate", "warehouse worker", "driver", "administrative assistant"],
        Education::SomeCollege => &["sales representative", "customer success specialist", "technician", "office coordinator"],
        Education::Bachelors => &["software engineer", "teacher", "marketing manager", "business analyst", "nurse"],
        Education::Masters => &["product manager", "financial analyst", "data scientist", "engineering manager"],
        Education::Doctorate => &["research scientist", "physician", "professor", "principal engineer"],
    }
}

pub const TECH_OCCUPATIONS: &[&str] = &[
    "business analyst",
    "data scientist",
    "engineering manager",
    "principal engineer",
    "product manager",
    "software engineer",
    "technician",
];

/// Every occupation the sampler can emit.
pub fn all_occupations() -> Vec<&'static str> {
    Education::ALL
        .iter()
        .flat_map(|edu| occupations_for(*edu).iter().copied())
        .collect()
}

pub fn known_states() -> impl Iterator<Item = &'static str> {
    STATES.iter().map(|s| s.code)
}

fn state_info(code: &str) -> Option<&'static StateInfo> {
    STATES.iter().find(|s| s.code.eq_ignore_ascii_case(code))
}

/// Region of a known state code.
pub fn region_of(state: &str) -> Option<Region> {
    state_info(state).map(|s| s.region)
}

/// Highest-weight state in a region; used when a region must be represented.
pub fn representative_state(region: Region) -> &'static str {
    match region {
        Region::West => "CA",
        Region::South => "TX",
        Region::Northeast => "NY",
        Region::Midwest => "IL",
    }
}

// --- CONSTRAINTS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupationSector {
    Tech,
}

/// Hard filters on sampled demographics. `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemographicConstraints {
    pub age_range: Option<(u8, u8)>,
    pub income_min: Option<u32>,
    pub income_max: Option<u32>,
    pub genders: Option<Vec<Gender>>,
    pub education: Option<Vec<Education>>,
    pub states: Option<Vec<String>>,
    pub urbanicity: Option<Vec<Urbanicity>>,
    pub occupation_contains: Option<String>,
    pub occupation_sector: Option<OccupationSector>,
    pub household_types: Option<Vec<HouseholdType>>,
    pub race_ethnicity: Option<Vec<Ethnicity>>,
}

fn unsatisfiable(msg: impl Into<String>) -> FocusGroupError {
    FocusGroupError::UnsatisfiableConstraints(msg.into())
}

fn allows<T: PartialEq>(set: &Option<Vec<T>>, value: &T) -> bool {
    set.as_ref().map_or(true, |allowed| allowed.contains(value))
}

impl DemographicConstraints {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Rejects internally contradictory constraint sets before any sampling.
    pub fn validate(&self) -> Result<()> {
        if let (Some(lo), Some(hi)) = (self.income_min, self.income_max) {
            if lo > hi {
                return Err(unsatisfiable(format!("income_min {lo} exceeds income_max {hi}")));
            }
        }
        if let Some((lo, hi)) = self.age_range {
            if lo > hi {
                return Err(unsatisfiable(format!("age range {lo}-{hi} is inverted")));
            }
            if hi < MIN_AGE || lo > MAX_AGE {
                return Err(unsatisfiable(format!(
                    "age range {lo}-{hi} lies outside {MIN_AGE}-{MAX_AGE}"
                )));
            }
        }

        let empty_set = [
            ("genders", self.genders.as_ref().map(Vec::len)),
            ("education", self.education.as_ref().map(Vec::len)),
            ("states", self.states.as_ref().map(Vec::len)),
            ("urbanicity", self.urbanicity.as_ref().map(Vec::len)),
            ("household_types", self.household_types.as_ref().map(Vec::len)),
            ("race_ethnicity", self.race_ethnicity.as_ref().map(Vec::len)),
        ]
        .into_iter()
        .find(|(_, len)| *len == Some(0));
        if let Some((field, _)) = empty_set {
            return Err(unsatisfiable(format!("{field} allows no values")));
        }

        if let Some(states) = &self.states {
            if let Some(unknown) = states.iter().find(|s| state_info(s).is_none()) {
                return Err(unsatisfiable(format!("unknown state '{unknown}'")));
            }
        }

        if self.candidate_occupations().is_empty() {
            return Err(unsatisfiable("no known occupation matches the occupation filters"));
        }
        Ok(())
    }

    fn occupation_ok(&self, occupation: &str) -> bool {
        if let Some(needle) = &self.occupation_contains {
            if !occupation.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        match self.occupation_sector {
            Some(OccupationSector::Tech) => TECH_OCCUPATIONS.contains(&occupation),
            None => true,
        }
    }

    fn candidate_occupations(&self) -> Vec<&'static str> {
        all_occupations()
            .into_iter()
            .filter(|occ| self.occupation_ok(occ))
            .collect()
    }

    fn state_ok(&self, state: &str) -> bool {
        self.states
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|s| s.eq_ignore_ascii_case(state)))
    }

    pub fn matches(&self, demo: &Demographics) -> bool {
        if let Some((lo, hi)) = self.age_range {
            if demo.age < lo || demo.age > hi {
                return false;
            }
        }
        if self.income_min.is_some_and(|min| demo.income < min)
            || self.income_max.is_some_and(|max| demo.income > max)
        {
            return false;
        }
        allows(&self.genders, &demo.gender)
            && allows(&self.education, &demo.education)
            && self.state_ok(&demo.location.state)
            && allows(&self.urbanicity, &demo.location.urbanicity)
            && self.occupation_ok(&demo.occupation)
            && allows(&self.household_types, &demo.household_type)
            && allows(&self.race_ethnicity, &demo.race_ethnicity)
    }

    /// Moves violating fields onto an allowed value so rejection stays cheap.
    fn nudge<R: Rng + ?Sized>(&self, rng: &mut R, demo: &mut Demographics) {
        if let Some(genders) = &self.genders {
            if !genders.contains(&demo.gender) {
                demo.gender = pick_from(rng, genders, demo.gender);
            }
        }
        if let Some((lo, hi)) = self.age_range {
            let (lo, hi) = (lo.max(MIN_AGE), hi.min(MAX_AGE));
            if demo.age < lo || demo.age > hi {
                demo.age = rng.gen_range(lo..=hi);
            }
        }
        if let Some(education) = &self.education {
            if !education.contains(&demo.education) {
                demo.education = pick_from(rng, education, demo.education);
                demo.occupation = pick_occupation(rng, demo.education);
            }
        }
        if let Some(states) = &self.states {
            if !self.state_ok(&demo.location.state) {
                let allowed: Vec<(&'static str, f64)> = STATES
                    .iter()
                    .filter(|s| states.iter().any(|c| c.eq_ignore_ascii_case(s.code)))
                    .map(|s| (s.code, s.weight))
                    .collect();
                if !allowed.is_empty() {
                    let state = weighted_pick(rng, &allowed);
                    demo.location = sample_location_in(rng, state);
                }
            }
        }
        if let Some(urbanicity) = &self.urbanicity {
            if !urbanicity.contains(&demo.location.urbanicity) {
                let choice = pick_from(rng, urbanicity, demo.location.urbanicity);
                set_urbanicity(rng, &mut demo.location, choice);
            }
        }
        if !self.occupation_ok(&demo.occupation) {
            let candidates = self.candidate_occupations();
            if let Some(occ) = candidates.choose(rng) {
                demo.occupation = (*occ).to_string();
            }
        }
        if let Some(min) = self.income_min {
            if demo.income < min {
                demo.income = min.min(500_000);
            }
        }
        if let Some(max) = self.income_max {
            if demo.income > max {
                demo.income = max.min(500_000);
            }
        }
        if let Some(households) = &self.household_types {
            if !households.contains(&demo.household_type) {
                demo.household_type = pick_from(rng, households, demo.household_type);
            }
        }
        if let Some(ethnicities) = &self.race_ethnicity {
            if !ethnicities.contains(&demo.race_ethnicity) {
                demo.race_ethnicity = pick_from(rng, ethnicities, demo.race_ethnicity);
            }
        }
    }
}

fn pick_from<T: Copy, R: Rng + ?Sized>(rng: &mut R, allowed: &[T], fallback: T) -> T {
    allowed.choose(rng).copied().unwrap_or(fallback)
}

// --- SAMPLING ---

fn pick_occupation<R: Rng + ?Sized>(rng: &mut R, education: Education) -> String {
    let options = occupations_for(education);
    let occupation = options.choose(rng).copied().unwrap_or("consultant");
    occupation.to_string()
}

fn set_urbanicity<R: Rng + ?Sized>(rng: &mut R, location: &mut Location, urbanicity: Urbanicity) {
    location.urbanicity = urbanicity;
    location.metro_area = match (urbanicity, state_info(&location.state)) {
        (Urbanicity::Rural, _) | (_, None) => None,
        (_, Some(info)) => info.metros.choose(rng).copied().flatten().map(str::to_string),
    };
}

/// Urbanicity and metro for a resident of `state`.
pub fn sample_location_in<R: Rng + ?Sized>(rng: &mut R, state: &str) -> Location {
    let region = region_of(state).unwrap_or(Region::West);
    let urbanicity = weighted_pick(rng, &urbanicity_table(region));
    let mut location = Location {
        state: state.to_uppercase(),
        metro_area: None,
        urbanicity,
    };
    set_urbanicity(rng, &mut location, urbanicity);
    location
}

fn sample_one<R: Rng + ?Sized>(rng: &mut R) -> Demographics {
    let (age_lo, age_hi) = weighted_pick(rng, AGE_BUCKETS);
    let age = rng.gen_range(age_lo..=age_hi);
    let band = age_band(age);
    let gender = weighted_pick(rng, GENDERS);

    let (income_lo, income_hi) = weighted_pick(rng, income_table(band));
    let income = rng.gen_range(income_lo..=income_hi);
    let education = weighted_pick(rng, &education_table(band));

    let states: Vec<(&'static str, f64)> = STATES.iter().map(|s| (s.code, s.weight)).collect();
    let state = weighted_pick(rng, &states);
    let location = sample_location_in(rng, state);

    let mut household_type = weighted_pick(rng, &household_table(band));
    if gender == Gender::Male && household_type == HouseholdType::SingleParent && rng.gen::<f64>() < 0.2 {
        household_type = HouseholdType::Single;
    }

    let mut occupation = pick_occupation(rng, education);
    if matches!(education, Education::Bachelors | Education::Masters) && rng.gen::<f64>() < 0.18 {
        occupation = "software engineer".to_string();
    }
    let race_ethnicity = weighted_pick(rng, ETHNICITIES);

    Demographics {
        age,
        gender,
        income,
        education,
        occupation,
        location,
        household_type,
        race_ethnicity,
    }
}

/// Draws `n` demographic records satisfying `constraints`.
///
/// Fails with [`FocusGroupError::UnsatisfiableConstraints`] when the filters contradict
/// each other or the attempt budget (`max(5000, 1000 * n)`) runs out; never returns a
/// short list.
pub fn sample<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    constraints: Option<&DemographicConstraints>,
) -> Result<Vec<Demographics>> {
    let constraints = constraints.filter(|c| !c.is_empty());
    if let Some(c) = constraints {
        c.validate()?;
    }

    let max_attempts = (n * 1000).max(5000);
    let mut samples = Vec::with_capacity(n);
    let mut attempts = 0;
    while samples.len() < n && attempts < max_attempts {
        attempts += 1;
        let mut candidate = sample_one(rng);
        if let Some(c) = constraints {
            c.nudge(rng, &mut candidate);
            if !c.matches(&candidate) {
                continue;
            }
        }
        samples.push(candidate);
    }

    if samples.len() < n {
        return Err(unsatisfiable(format!(
            "only {} of {n} records satisfied the constraints after {attempts} attempts",
            samples.len()
        )));
    }
    debug!(n, attempts, "DEMOGRAPHICS: Sampled batch");
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn unconstrained_samples_stay_in_range() {
        let demos = sample(&mut rng(), 200, None).unwrap();
        assert_eq!(demos.len(), 200);
        for d in &demos {
            assert!((MIN_AGE..=MAX_AGE).contains(&d.age));
            assert!(state_info(&d.location.state).is_some());
            if d.location.urbanicity == Urbanicity::Rural {
                assert!(d.location.metro_area.is_none());
            }
            assert!(all_occupations().contains(&d.occupation.as_str()));
        }
    }

    #[test]
    fn constraints_are_honored() {
        let constraints = DemographicConstraints {
            age_range: Some((25, 40)),
            income_min: Some(60_000),
            genders: Some(vec![Gender::Female]),
            states: Some(vec!["tx".into(), "FL".into()]),
            occupation_sector: Some(OccupationSector::Tech),
            ..Default::default()
        };
        let demos = sample(&mut rng(), 30, Some(&constraints)).unwrap();
        for d in &demos {
            assert!(constraints.matches(d));
            assert_eq!(d.gender, Gender::Female);
            assert!(TECH_OCCUPATIONS.contains(&d.occupation.as_str()));
        }
    }

    #[test]
    fn contradictory_constraints_fail_fast() {
        let inverted = DemographicConstraints {
            income_min: Some(90_000),
            income_max: Some(10_000),
            ..Default::default()
        };
        assert!(matches!(
            sample(&mut rng(), 4, Some(&inverted)),
            Err(FocusGroupError::UnsatisfiableConstraints(_))
        ));

        let no_match = DemographicConstraints {
            occupation_contains: Some("astronaut".into()),
            ..Default::default()
        };
        assert!(no_match.validate().is_err());

        let unknown_state = DemographicConstraints {
            states: Some(vec!["ZZ".into()]),
            ..Default::default()
        };
        assert!(unknown_state.validate().is_err());
    }

    #[test]
    fn same_seed_same_batch() {
        let a = sample(&mut StdRng::seed_from_u64(11), 12, None).unwrap();
        let b = sample(&mut StdRng::seed_from_u64(11), 12, None).unwrap();
        assert_eq!(a, b);
    }
}
