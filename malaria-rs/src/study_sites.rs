use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};

use crate::config_builder::CampaignSink;
use crate::error::{Error, Result};
use crate::reference::{
    AgeBinned, DatedDensityBinning, GAMETOCYTEMIA_CHANNEL, InfectiousnessBins,
    InfectiousnessCounts, PARASITEMIA_CHANNEL, ReferenceTable, SeasonCounts, SeasonInfectiousness,
    read_parasitology_file, seasonal_density, seasonal_infectiousness,
};

const BIRTH_COHORT_DEMOGRAPHICS: &str = "Calibration\\birth_cohort_demographics.compiled.json";

/// Seventy years including leap days.
const BIRTH_COHORT_DURATION: u32 = 365 * 70 + 1;

fn birth_cohort(duration: u32, extra: Value) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("Simulation_Duration".to_string(), json!(duration));
    params.insert(
        "Demographics_Filenames".to_string(),
        json!([BIRTH_COHORT_DEMOGRAPHICS]),
    );
    if let Value::Object(extra) = extra {
        params.extend(extra);
    }
    params
}

pub trait CalibSite {
    fn name(&self) -> &str;

    /// Pushes site-specific simulation parameters into `sink`.
    fn setup(&self, _sink: &mut dyn CampaignSink) {}

    fn reference_data(&self) -> Result<ReferenceTable>;
}

/// Looks a site up by name. Garki villages and Matsari read their records
/// from `parasitology_csv`.
pub fn by_name(name: &str, parasitology_csv: Option<&Path>) -> Result<Box<dyn CalibSite>> {
    match name {
        "Namawala" => Ok(Box::new(AgeBinnedSite::namawala())),
        "Dielmo" => Ok(Box::new(AgeBinnedSite::dielmo())),
        "Ndiop" => Ok(Box::new(AgeBinnedSite::ndiop())),
        "Dapelogo" => Ok(Box::new(DapelogoSite::new(name))),
        "DapelogoInf" => Ok(Box::new(InfectiousnessSite::Dapelogo)),
        "Laye" => Ok(Box::new(InfectiousnessSite::Laye)),
        _ => {
            let csv = parasitology_csv.ok_or_else(|| {
                Error::MissingInput(format!("parasitology CSV for study site {name}"))
            })?;
            match name {
                "Matsari" => Ok(Box::new(GarkiSite::matsari(csv)?)),
                "Sugungum" => Ok(Box::new(GarkiSite::sugungum(csv)?)),
                village => Ok(Box::new(GarkiSite::new(village, csv)?)),
            }
        }
    }
}

/// Birth-cohort sites reporting one value per age bin.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeBinnedSite {
    name: &'static str,
    channel: &'static str,
    age_bins: &'static [f64],
    population: &'static [f64],
    values: &'static [f64],
}

const SENEGAL_AGE_BINS: &[f64] = &[
    1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 20.0, 25.0,
    30.0, 40.0, 50.0, 60.0, 100.0,
];

impl AgeBinnedSite {
    pub fn namawala() -> Self {
        Self {
            name: "Namawala",
            channel: "PfPR by Age Bin",
            age_bins: &[0.5, 1.0, 2.0, 4.0, 5.0, 10.0, 15.0, 20.0, 30.0, 40.0, 50.0],
            population: &[
                150.0, 150.0, 626.0, 1252.0, 626.0, 2142.0, 1074.0, 1074.0, 605.0, 605.0, 489.0,
            ],
            values: &[0.55, 0.85, 0.9, 0.88, 0.85, 0.82, 0.75, 0.65, 0.45, 0.42, 0.4],
        }
    }

    pub fn dielmo() -> Self {
        Self {
            name: "Dielmo",
            channel: "Annual Clinical Incidence by Age Bin",
            age_bins: SENEGAL_AGE_BINS,
            population: &[
                55.0, 60.0, 55.0, 50.0, 50.0, 38.0, 38.0, 38.0, 38.0, 38.0, 26.0, 26.0, 26.0,
                26.0, 26.0, 110.0, 75.0, 75.0, 150.0, 70.0, 70.0, 90.0,
            ],
            values: &[
                3.2, 5.0, 6.1, 4.75, 3.1, 2.75, 2.7, 1.9, 0.12, 0.8, 0.5, 0.25, 0.1, 0.2, 0.4, 0.3,
                0.2, 0.2, 0.2, 0.15, 0.15, 0.15,
            ],
        }
    }

    pub fn ndiop() -> Self {
        Self {
            name: "Ndiop",
            channel: "Annual Clinical Incidence by Age Bin",
            age_bins: SENEGAL_AGE_BINS,
            population: &[
                31.0, 34.0, 31.0, 28.0, 28.0, 21.0, 21.0, 21.0, 21.0, 21.0, 15.0, 15.0, 15.0,
                15.0, 15.0, 62.0, 42.0, 42.0, 84.0, 39.0, 39.0, 50.0,
            ],
            values: &[
                1.9, 2.2, 2.6, 2.8, 2.9, 3.0, 2.8, 2.7, 2.6, 2.6, 2.5, 2.2, 2.1, 1.8, 1.5, 1.0,
                0.8, 0.6, 0.5, 0.4, 0.3, 0.4,
            ],
        }
    }
}

impl CalibSite for AgeBinnedSite {
    fn name(&self) -> &str {
        self.name
    }

    fn setup(&self, sink: &mut dyn CampaignSink) {
        sink.update_params(birth_cohort(BIRTH_COHORT_DURATION, Value::Null));
    }

    fn reference_data(&self) -> Result<ReferenceTable> {
        AgeBinned {
            channel: self.channel.to_string(),
            age_bins: self.age_bins.to_vec(),
            population: self.population.to_vec(),
            values: self.values.to_vec(),
        }
        .to_table()
    }
}

/// Counts of individuals by age and density, from three cross-sectional
/// surveys across one transmission season.
#[derive(Debug, Clone, PartialEq)]
pub struct DapelogoSite {
    village: String,
}

const DAPELOGO_AGE_BINS: &[f64] = &[5.0, 15.0, f64::INFINITY];
const DAPELOGO_DENSITY_BINS: &[f64] = &[0.0, 50.0, 500.0, 5000.0, 50000.0, f64::INFINITY];
const DAPELOGO_SEASONS_BY_MONTH: &[(&str, &str)] = &[
    ("July", "start_wet"),
    ("September", "peak_wet"),
    ("January", "end_wet"),
];

#[rustfmt::skip]
const DAPELOGO_COUNTS: &[(&str, [[f64; 6]; 3], [[f64; 6]; 3])] = &[
    (
        "start_wet",
        [[1.0, 0.0, 0.0, 2.0, 2.0, 3.0], [2.0, 1.0, 0.0, 2.0, 0.0, 4.0], [9.0, 5.0, 4.0, 4.0, 2.0, 3.0]],
        [[0.0, 1.0, 4.0, 2.0, 2.0, 0.0], [0.0, 1.0, 4.0, 6.0, 0.0, 0.0], [12.0, 8.0, 3.0, 4.0, 0.0, 0.0]],
    ),
    (
        "peak_wet",
        [[1.0, 2.0, 0.0, 1.0, 3.0, 1.0], [2.0, 5.0, 2.0, 3.0, 1.0, 1.0], [6.0, 8.0, 4.0, 4.0, 0.0, 2.0]],
        [[1.0, 3.0, 2.0, 2.0, 0.0, 0.0], [0.0, 8.0, 0.0, 3.0, 0.0, 0.0], [11.0, 10.0, 2.0, 2.0, 0.0, 0.0]],
    ),
    (
        "end_wet",
        [[1.0, 1.0, 0.0, 4.0, 3.0, 1.0], [4.0, 1.0, 2.0, 4.0, 2.0, 1.0], [6.0, 9.0, 6.0, 2.0, 2.0, 0.0]],
        [[2.0, 3.0, 2.0, 2.0, 1.0, 0.0], [2.0, 5.0, 4.0, 2.0, 1.0, 0.0], [14.0, 7.0, 4.0, 0.0, 0.0, 0.0]],
    ),
];

impl DapelogoSite {
    pub fn new(village: &str) -> Self {
        Self {
            village: village.to_string(),
        }
    }

    fn counts() -> SeasonCounts {
        DAPELOGO_COUNTS
            .iter()
            .map(|(season, parasites, gametocytes)| {
                let to_rows = |matrix: &[[f64; 6]; 3]| -> Vec<Vec<f64>> {
                    matrix.iter().map(|row| row.to_vec()).collect()
                };
                let channels: BTreeMap<String, Vec<Vec<f64>>> = [
                    (PARASITEMIA_CHANNEL.to_string(), to_rows(parasites)),
                    (GAMETOCYTEMIA_CHANNEL.to_string(), to_rows(gametocytes)),
                ]
                .into_iter()
                .collect();
                (season.to_string(), channels)
            })
            .collect()
    }
}

impl CalibSite for DapelogoSite {
    fn name(&self) -> &str {
        &self.village
    }

    fn reference_data(&self) -> Result<ReferenceTable> {
        let reference = seasonal_density(
            &Self::counts(),
            DAPELOGO_SEASONS_BY_MONTH,
            DAPELOGO_AGE_BINS,
            DAPELOGO_DENSITY_BINS,
        )?;
        Ok(reference.to_table())
    }
}

/// Membrane-feeding surveys from Burkina Faso: the share of mosquitoes each
/// person infected, by age and gametocyte density, over one wet season.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfectiousnessSite {
    Laye,
    Dapelogo,
}

type AgeInfectiousness = [[u8; 6]; 3];
type DensityInfectiousness = [[[u8; 6]; 8]; 3];

const INFECTIOUSNESS_BINS: InfectiousnessBins<'static> = InfectiousnessBins {
    age: &[5.0, 15.0, f64::INFINITY],
    density: &[0.0, 0.5, 5.0, 50.0, 500.0, 5000.0, 50000.0, 500000.0],
    infectiousness: &[0.0, 5.0, 20.0, 50.0, 80.0, 100.0],
};

const LAYE_CHANNEL: &str = "Smeared Infectiousness by smeared Gametocytemia and Age Bin";
const DAPELOGO_AGE_CHANNEL: &str = "infectiousness_by_age_and_season";
const DAPELOGO_DENSITY_CHANNEL: &str = "density_and_infectiousness_by_age_and_season";

#[rustfmt::skip]
const LAYE_COUNTS: &[(&str, DensityInfectiousness)] = &[
    ("start_wet", [
        [[0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [1, 0, 2, 0, 1, 1], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
        [[1, 2, 0, 0, 0, 0], [1, 0, 1, 1, 0, 0], [1, 2, 0, 0, 0, 0], [1, 1, 0, 0, 1, 0], [3, 0, 2, 3, 0, 0], [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
        [[15, 1, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [2, 0, 0, 0, 0, 0], [3, 0, 0, 1, 0, 1], [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
    ]),
    ("peak_wet", [
        [[1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
        [[2, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [4, 0, 0, 0, 0, 0], [4, 0, 1, 2, 1, 0], [1, 1, 0, 1, 1, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
        [[7, 0, 0, 0, 0, 0], [3, 0, 0, 0, 0, 0], [1, 0, 1, 0, 0, 0], [4, 0, 1, 0, 0, 0], [4, 1, 0, 0, 0, 0], [1, 1, 0, 0, 1, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
    ]),
    ("end_wet", [
        [[1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
        [[7, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [3, 1, 1, 0, 0, 0], [3, 0, 0, 0, 0, 0], [2, 1, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
        [[13, 0, 0, 0, 0, 0], [3, 0, 0, 0, 0, 0], [2, 0, 0, 0, 0, 0], [6, 0, 0, 0, 0, 0], [2, 1, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
    ]),
];

#[rustfmt::skip]
const DAPELOGO_INFECTIOUSNESS_COUNTS: &[(&str, AgeInfectiousness, DensityInfectiousness)] = &[
    (
        "start_wet",
        [[2, 2, 0, 4, 1, 0], [1, 3, 5, 1, 1, 0], [18, 9, 0, 0, 0, 0]],
        [
            [[0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [1, 1, 0, 2, 0, 0], [0, 1, 0, 1, 0, 0], [0, 0, 0, 1, 1, 0], [0, 0, 0, 0, 0, 0]],
            [[0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 1, 0, 0, 0], [0, 2, 1, 0, 1, 0], [1, 1, 3, 1, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
            [[7, 5, 0, 0, 0, 0], [3, 0, 0, 0, 0, 0], [2, 0, 0, 0, 0, 0], [2, 1, 0, 0, 0, 0], [2, 1, 0, 0, 0, 0], [2, 2, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
        ],
    ),
    (
        "peak_wet",
        [[3, 1, 2, 2, 0, 0], [9, 0, 2, 0, 3, 0], [20, 1, 2, 1, 1, 0]],
        [
            [[0, 0, 1, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0], [1, 0, 1, 0, 0, 0], [0, 0, 0, 2, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
            [[4, 0, 1, 0, 0, 0], [0, 0, 0, 0, 0, 0], [2, 0, 0, 0, 0, 0], [0, 0, 1, 0, 2, 1], [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 1, 1], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
            [[13, 1, 0, 0, 0, 0], [4, 0, 1, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 1, 0], [1, 0, 1, 0, 0, 0], [1, 0, 0, 1, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
        ],
    ),
    (
        "end_wet",
        [[5, 0, 1, 3, 0, 0], [10, 1, 2, 1, 0, 0], [23, 2, 0, 0, 0, 0]],
        [
            [[2, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [1, 0, 0, 1, 0, 0], [1, 0, 0, 1, 0, 0], [0, 0, 0, 1, 0, 1], [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
            [[2, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [1, 0, 0, 1, 0, 0], [3, 0, 0, 0, 0, 0], [2, 0, 2, 0, 0, 0], [1, 1, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
            [[13, 1, 0, 0, 0, 0], [2, 0, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0], [3, 0, 0, 0, 0, 0], [4, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]],
        ],
    ),
];

fn by_age(counts: &AgeInfectiousness) -> InfectiousnessCounts {
    InfectiousnessCounts::ByAge(
        counts
            .iter()
            .map(|bins| bins.iter().copied().map(f64::from).collect())
            .collect(),
    )
}

fn by_age_and_density(counts: &DensityInfectiousness) -> InfectiousnessCounts {
    InfectiousnessCounts::ByAgeAndDensity(
        counts
            .iter()
            .map(|by_density| {
                by_density
                    .iter()
                    .map(|bins| bins.iter().copied().map(f64::from).collect())
                    .collect()
            })
            .collect(),
    )
}

impl InfectiousnessSite {
    fn bin_header(&self) -> &'static str {
        match self {
            Self::Laye => "Infectiousness Bin",
            Self::Dapelogo => "Percent Infected",
        }
    }

    fn counts(&self) -> SeasonInfectiousness {
        match self {
            Self::Laye => LAYE_COUNTS
                .iter()
                .map(|(season, counts)| {
                    let channels =
                        BTreeMap::from([(LAYE_CHANNEL.to_string(), by_age_and_density(counts))]);
                    (season.to_string(), channels)
                })
                .collect(),
            Self::Dapelogo => DAPELOGO_INFECTIOUSNESS_COUNTS
                .iter()
                .map(|(season, age, density)| {
                    let channels = BTreeMap::from([
                        (DAPELOGO_AGE_CHANNEL.to_string(), by_age(age)),
                        (DAPELOGO_DENSITY_CHANNEL.to_string(), by_age_and_density(density)),
                    ]);
                    (season.to_string(), channels)
                })
                .collect(),
        }
    }
}

impl CalibSite for InfectiousnessSite {
    fn name(&self) -> &str {
        match self {
            Self::Laye => "Laye",
            Self::Dapelogo => "Dapelogo",
        }
    }

    fn setup(&self, sink: &mut dyn CampaignSink) {
        let params = match self {
            Self::Laye => birth_cohort(
                365 * 70,
                json!({
                    "Antigen_Switch_Rate_LOG": -9.530186548,
                    "Base_Gametocyte_Production_Rate": 0.024177457,
                    "Falciparum_MSP_Variants": 6,
                    "Falciparum_Nonspecific_Types": 56,
                    "Falciparum_PfEMP1_Variants": 1473,
                    "Gametocyte_Stage_Survival_Rate": 0.667841154,
                    "MSP1_Merozoite_Kill_Fraction": 0.444193352,
                    "Max_Individual_Infections": 3,
                    "Nonspecific_Antigenicity_Factor": 0.262812768
                }),
            ),
            Self::Dapelogo => birth_cohort(365 * 5, Value::Null),
        };
        sink.update_params(params);
    }

    fn reference_data(&self) -> Result<ReferenceTable> {
        let reference = seasonal_infectiousness(
            &self.counts(),
            DAPELOGO_SEASONS_BY_MONTH,
            INFECTIOUSNESS_BINS,
            self.bin_header(),
        )?;
        Ok(reference.to_table())
    }
}

/// Garki project villages, surveyed repeatedly between late 1970 and 1971.
#[derive(Debug, Clone, PartialEq)]
pub struct GarkiSite {
    name: String,
    binning: DatedDensityBinning,
    parasitology_csv: PathBuf,
    setup_params: Map<String, Value>,
}

impl GarkiSite {
    pub fn new(village: &str, parasitology_csv: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            name: village.to_string(),
            binning: DatedDensityBinning::garki(village)?,
            parasitology_csv: parasitology_csv.into(),
            setup_params: Map::new(),
        })
    }

    /// Matsari reports smeared prevalence, so its channels say so.
    pub fn matsari(parasitology_csv: impl Into<PathBuf>) -> Result<Self> {
        let mut site = Self::new("Matsari", parasitology_csv)?;
        site.binning.channel_prefix = "Smeared ".to_string();
        Ok(site)
    }

    /// Sugungum pools all survey years, one month per season, and runs
    /// as a birth cohort.
    pub fn sugungum(parasitology_csv: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            name: "Sugungum".to_string(),
            binning: DatedDensityBinning::by_season("Sugungum", SUGUNGUM_SEASONS_BY_MONTH)?,
            parasitology_csv: parasitology_csv.into(),
            setup_params: birth_cohort(365 * 70, Value::Null),
        })
    }
}

const SUGUNGUM_SEASONS_BY_MONTH: &[(&str, &str)] =
    &[("May", "DH2"), ("September", "W2"), ("January", "DC2")];

impl CalibSite for GarkiSite {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&self, sink: &mut dyn CampaignSink) {
        if !self.setup_params.is_empty() {
            sink.update_params(self.setup_params.clone());
        }
    }

    fn reference_data(&self) -> Result<ReferenceTable> {
        let records = read_parasitology_file(&self.parasitology_csv)?;
        let reference = self.binning.reshape(&records)?;
        tracing::debug!(site = %self.name, rows = reference.rows.len(), "reshaped parasitology");
        Ok(reference.to_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_builder::ConfigBuilder;
    use std::io::Write;

    #[test]
    fn test_namawala() {
        let site = by_name("Namawala", None).unwrap();
        let table = site.reference_data().unwrap();
        assert_eq!(table.headers[2], "PfPR by Age Bin");
        assert_eq!(table.len(), 11);
        assert_eq!(table.rows[3], vec!["4", "1252", "0.88"]);

        let mut cb = ConfigBuilder::default();
        site.setup(&mut cb);
        assert_eq!(cb.params()["Simulation_Duration"], 25551);
        assert_eq!(
            cb.params()["Demographics_Filenames"],
            json!(["Calibration\\birth_cohort_demographics.compiled.json"])
        );
    }

    #[test]
    fn test_senegal_sites_share_bins() {
        for name in ["Dielmo", "Ndiop"] {
            let table = by_name(name, None).unwrap().reference_data().unwrap();
            assert_eq!(table.len(), 22);
            assert_eq!(table.headers[2], "Annual Clinical Incidence by Age Bin");
            assert_eq!(table.rows[21][0], "100");
        }
    }

    #[test]
    fn test_dapelogo() {
        let site = by_name("Dapelogo", None).unwrap();
        let table = site.reference_data().unwrap();
        // 2 channels x 3 seasons x 3 age bins x 6 density bins
        assert_eq!(table.len(), 108);
        assert_eq!(
            table.header_refs(),
            vec!["Channel", "Date", "Age Bin", "PfPR Bin", "Counts", "Counts_tot"]
        );

        // gametocytes, January, under fives: [2, 3, 2, 2, 1, 0]
        let first = &table.rows[0];
        assert_eq!(first[0], "PfPR by Gametocytemia and Age Bin");
        assert_eq!(first[1], "15");
        assert_eq!(first[2], "5");
        assert_eq!(first[3], "0");
        assert_eq!(first[4], "0.2");
        assert_eq!(first[5], "10");

        let dates: Vec<&str> = table.rows.iter().map(|r| r[1].as_str()).collect();
        assert!(dates.contains(&"195"));
        assert!(dates.contains(&"255"));
    }

    #[test]
    fn test_garki_needs_csv() {
        let err = by_name("Sugungum", None).err().unwrap();
        assert!(matches!(err, Error::MissingInput(_)));
    }

    #[test]
    fn test_matsari_channels() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Village,Date,Age,Parasitemia,Gametocytemia").unwrap();
        writeln!(file, "Matsari,1971-05-03,10.0,0.2,0.0").unwrap();
        writeln!(file, "Matsari,1971-05-20,30.0,0.0,0.0").unwrap();
        writeln!(file, "Rafin Marke,1971-05-20,30.0,0.9,0.0").unwrap();

        let site = by_name("Matsari", Some(file.path())).unwrap();
        let table = site.reference_data().unwrap();
        assert_eq!(table.len(), 2 * 8 * 5);
        assert!(table.rows.iter().all(|r| r[0].starts_with("Smeared PfPR by")));
        assert!(table.rows.iter().all(|r| r[1] == "135"));
    }

    #[test]
    fn test_laye_infectiousness() {
        let site = by_name("Laye", None).unwrap();
        let table = site.reference_data().unwrap();
        // 3 seasons x 3 age bins x 8 density bins x 6 infectiousness bins
        assert_eq!(table.len(), 432);
        assert_eq!(table.headers[4], "Infectiousness Bin");
        assert!(table.rows.iter().all(|r| r[0] == LAYE_CHANNEL));

        // January, under fives, no gametocytes: one person, no mosquitoes infected
        assert_eq!(table.rows[0][1], "15");
        assert_eq!(table.rows[0][2], "5");
        assert_eq!(table.rows[0][3], "0");
        assert_eq!(table.rows[0][5], "1");
        assert_eq!(table.rows[0][6], "1");
        // same date, fives to fifteens
        assert_eq!(table.rows[48][2], "15");
        assert_eq!(table.rows[48][6], "7");

        let mut cb = ConfigBuilder::default();
        site.setup(&mut cb);
        assert_eq!(cb.params()["Simulation_Duration"], 25550);
        assert_eq!(cb.params()["Max_Individual_Infections"], 3);
        assert_eq!(cb.params()["Falciparum_PfEMP1_Variants"], 1473);
        assert_eq!(
            cb.params()["Demographics_Filenames"],
            json!(["Calibration\\birth_cohort_demographics.compiled.json"])
        );
    }

    #[test]
    fn test_dapelogo_infectiousness() {
        let site = by_name("DapelogoInf", None).unwrap();
        assert_eq!(site.name(), "Dapelogo");
        let table = site.reference_data().unwrap();
        // 3 seasons x 3 age bins x (8 density bins + pooled) x 6 bins
        assert_eq!(table.len(), 432 + 54);
        assert_eq!(table.headers[4], "Percent Infected");

        let density = &table.rows[0];
        assert_eq!(density[0], DAPELOGO_DENSITY_CHANNEL);
        assert_eq!(density[3], "0");
        assert_eq!(density[5], "1");
        assert_eq!(density[6], "2");

        // January under fives pooled over densities: [5, 0, 1, 3, 0, 0]
        let pooled = &table.rows[432..438];
        assert!(pooled.iter().all(|r| r[0] == DAPELOGO_AGE_CHANNEL));
        assert!(pooled.iter().all(|r| r[1] == "15" && r[3].is_empty()));
        assert!(pooled.iter().all(|r| r[6] == "9"));
        assert_eq!(pooled[4][5], "0");

        let mut cb = ConfigBuilder::default();
        site.setup(&mut cb);
        assert_eq!(cb.params()["Simulation_Duration"], 1825);
        assert!(cb.params().get("Max_Individual_Infections").is_none());
    }

    #[test]
    fn test_sugungum_by_season() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Village,Date,Age,Parasitemia,Gametocytemia").unwrap();
        writeln!(file, "Sugungum,1971-09-14,2.0,0.5,0.0").unwrap();
        writeln!(file, "Sugungum,1972-09-02,2.0,0.0,0.0").unwrap();
        writeln!(file, "Sugungum,1972-03-02,2.0,0.0,0.0").unwrap();

        let site = by_name("Sugungum", Some(file.path())).unwrap();
        let table = site.reference_data().unwrap();
        // September only: 2 channels x 8 age bins x 5 density bins
        assert_eq!(table.len(), 2 * 8 * 5);
        assert!(table.rows.iter().all(|r| r[1] == "255"));

        let mut cb = ConfigBuilder::default();
        site.setup(&mut cb);
        assert_eq!(cb.params()["Simulation_Duration"], 25550);

        let mut cb = ConfigBuilder::default();
        by_name("Ajura", Some(file.path())).unwrap().setup(&mut cb);
        assert!(cb.params().is_empty());
    }

    #[test]
    fn test_missing_csv_is_io_error() {
        let site = GarkiSite::new("Ajura", "/nonexistent/garki.csv").unwrap();
        assert!(matches!(site.reference_data(), Err(Error::Io(_))));
    }
}
