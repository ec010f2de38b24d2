use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io;
use std::path::Path;

use chrono::{Datelike, Month, NaiveDate};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Blood volume examined per microscope field, in microlitres.
pub const UL_PER_FIELD: f64 = 0.5 / 200.0;

pub const PARASITEMIA_CHANNEL: &str = "PfPR by Parasitemia and Age Bin";
pub const GAMETOCYTEMIA_CHANNEL: &str = "PfPR by Gametocytemia and Age Bin";

const DENSITY_HEADERS: [&str; 6] = [
    "Channel",
    "Date",
    "Age Bin",
    "PfPR Bin",
    "Counts",
    "Counts_tot",
];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReferenceTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReferenceTable {
    pub fn header_refs(&self) -> Vec<&str> {
        self.headers.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One value per age bin, e.g. prevalence or annual clinical incidence.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeBinned {
    pub channel: String,
    pub age_bins: Vec<f64>,
    pub population: Vec<f64>,
    pub values: Vec<f64>,
}

impl AgeBinned {
    pub fn to_table(&self) -> Result<ReferenceTable> {
        if self.age_bins.len() != self.population.len() || self.age_bins.len() != self.values.len()
        {
            return Err(Error::Reference(format!(
                "{}: {} age bins, {} populations, {} values",
                self.channel,
                self.age_bins.len(),
                self.population.len(),
                self.values.len()
            )));
        }
        let rows = self
            .age_bins
            .iter()
            .zip(&self.population)
            .zip(&self.values)
            .map(|((age, population), value)| {
                vec![age.to_string(), population.to_string(), value.to_string()]
            })
            .collect();
        Ok(ReferenceTable {
            headers: vec![
                "Age Bin".to_string(),
                "Average Population by Age Bin".to_string(),
                self.channel.clone(),
            ],
            rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityRow {
    pub channel: String,
    /// Day of year.
    pub date: u32,
    /// Upper edge of the age bin.
    pub age_bin: f64,
    /// Upper edge of the density bin, in parasites per microlitre.
    pub pfpr_bin: f64,
    pub counts: f64,
    pub counts_tot: f64,
}

impl DensityRow {
    fn group_key(&self) -> (&str, u32, f64) {
        (&self.channel, self.date, self.age_bin)
    }

    fn cmp_key(&self, other: &Self) -> std::cmp::Ordering {
        self.channel
            .cmp(&other.channel)
            .then(self.date.cmp(&other.date))
            .then(self.age_bin.total_cmp(&other.age_bin))
            .then(self.pfpr_bin.total_cmp(&other.pfpr_bin))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DensityReference {
    pub rows: Vec<DensityRow>,
}

impl DensityReference {
    /// Takes raw counts, sorts them and normalizes within each group.
    fn from_counts(mut rows: Vec<DensityRow>) -> Self {
        rows.sort_by(DensityRow::cmp_key);
        for group in rows.chunk_by_mut(|a, b| a.group_key() == b.group_key()) {
            let total: f64 = group.iter().map(|row| row.counts).sum();
            for row in group.iter_mut() {
                row.counts_tot = total;
                row.counts = if total > 0.0 { row.counts / total } else { 0.0 };
            }
        }
        Self { rows }
    }

    pub fn to_table(&self) -> ReferenceTable {
        ReferenceTable {
            headers: DENSITY_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    vec![
                        row.channel.clone(),
                        row.date.to_string(),
                        row.age_bin.to_string(),
                        row.pfpr_bin.to_string(),
                        row.counts.to_string(),
                        row.counts_tot.to_string(),
                    ]
                })
                .collect(),
        }
    }
}

/// Day used for observations collected during `month`.
pub fn mid_month_day(month: Month) -> u32 {
    (month.number_from_month() - 1) * 30 + 15
}

fn parse_month(name: &str) -> Result<Month> {
    name.parse::<Month>()
        .map_err(|_| Error::Reference(format!("not a month: {name}")))
}

/// Season name → channel → counts by `[age bin][density bin]`.
pub type SeasonCounts = BTreeMap<String, BTreeMap<String, Vec<Vec<f64>>>>;

/// Reshapes seasonal count matrices. `seasons_by_month` pairs each
/// collection month with the season observed in it.
pub fn seasonal_density(
    counts: &SeasonCounts,
    seasons_by_month: &[(&str, &str)],
    age_bins: &[f64],
    density_bins: &[f64],
) -> Result<DensityReference> {
    let mut rows = Vec::new();
    for (month, season) in seasons_by_month {
        let date = mid_month_day(parse_month(month)?);
        let channels = counts
            .get(*season)
            .ok_or_else(|| Error::Reference(format!("no counts for season {season}")))?;
        for (channel, matrix) in channels {
            if matrix.len() != age_bins.len() {
                return Err(Error::Reference(format!(
                    "{season}/{channel}: {} age rows for {} age bins",
                    matrix.len(),
                    age_bins.len()
                )));
            }
            for (age_bin, by_density) in age_bins.iter().zip(matrix) {
                if by_density.len() != density_bins.len() {
                    return Err(Error::Reference(format!(
                        "{season}/{channel}: {} density columns for {} density bins",
                        by_density.len(),
                        density_bins.len()
                    )));
                }
                rows.extend(density_bins.iter().zip(by_density).map(|(pfpr_bin, count)| {
                    DensityRow {
                        channel: channel.clone(),
                        date,
                        age_bin: *age_bin,
                        pfpr_bin: *pfpr_bin,
                        counts: *count,
                        counts_tot: 0.0,
                    }
                }));
            }
        }
    }
    Ok(DensityReference::from_counts(rows))
}

/// Counts for one channel of an infectiousness survey.
#[derive(Debug, Clone, PartialEq)]
pub enum InfectiousnessCounts {
    /// `[age bin][infectiousness bin]`, pooled over densities.
    ByAge(Vec<Vec<f64>>),
    /// `[age bin][density bin][infectiousness bin]`.
    ByAgeAndDensity(Vec<Vec<Vec<f64>>>),
}

/// Season name → channel → counts.
pub type SeasonInfectiousness = BTreeMap<String, BTreeMap<String, InfectiousnessCounts>>;

#[derive(Debug, Clone, PartialEq)]
pub struct InfectiousnessRow {
    pub channel: String,
    pub date: u32,
    pub age_bin: f64,
    /// `None` for channels pooled over densities.
    pub pfpr_bin: Option<f64>,
    /// Upper edge of the percent-of-mosquitoes-infected bin.
    pub infectiousness_bin: f64,
    pub counts: f64,
    pub counts_tot: f64,
}

impl InfectiousnessRow {
    fn group_key(&self) -> (&str, u32, f64, Option<f64>) {
        (&self.channel, self.date, self.age_bin, self.pfpr_bin)
    }

    fn cmp_key(&self, other: &Self) -> std::cmp::Ordering {
        let pfpr = |row: &Self| row.pfpr_bin.unwrap_or(f64::NEG_INFINITY);
        self.channel
            .cmp(&other.channel)
            .then(self.date.cmp(&other.date))
            .then(self.age_bin.total_cmp(&other.age_bin))
            .then(pfpr(self).total_cmp(&pfpr(other)))
            .then(self.infectiousness_bin.total_cmp(&other.infectiousness_bin))
    }
}

/// Membrane-feeding results: how many people, by age and density, infected
/// each fraction of the mosquitoes fed on them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InfectiousnessReference {
    /// Column name for the infectiousness bin.
    pub bin_header: String,
    pub rows: Vec<InfectiousnessRow>,
}

impl InfectiousnessReference {
    pub fn to_table(&self) -> ReferenceTable {
        let headers = ["Channel", "Date", "Age Bin", "PfPR Bin"]
            .iter()
            .map(|h| h.to_string())
            .chain([self.bin_header.clone(), "Counts".to_string(), "Counts_tot".to_string()])
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                vec![
                    row.channel.clone(),
                    row.date.to_string(),
                    row.age_bin.to_string(),
                    row.pfpr_bin.map(|bin| bin.to_string()).unwrap_or_default(),
                    row.infectiousness_bin.to_string(),
                    row.counts.to_string(),
                    row.counts_tot.to_string(),
                ]
            })
            .collect();
        ReferenceTable { headers, rows }
    }
}

fn check_width(what: &str, found: usize, expected: usize) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(Error::Reference(format!("{what}: {found} entries for {expected} bins")))
    }
}

/// Bin edges for [`seasonal_infectiousness`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfectiousnessBins<'a> {
    pub age: &'a [f64],
    pub density: &'a [f64],
    pub infectiousness: &'a [f64],
}

/// Reshapes seasonal infectiousness counts. Each (channel, date, age bin,
/// density bin) group is normalized over its infectiousness bins.
pub fn seasonal_infectiousness(
    counts: &SeasonInfectiousness,
    seasons_by_month: &[(&str, &str)],
    bins: InfectiousnessBins<'_>,
    bin_header: &str,
) -> Result<InfectiousnessReference> {
    let mut rows = Vec::new();
    for (month, season) in seasons_by_month {
        let date = mid_month_day(parse_month(month)?);
        let channels = counts
            .get(*season)
            .ok_or_else(|| Error::Reference(format!("no counts for season {season}")))?;
        for (channel, channel_counts) in channels {
            let label = format!("{season}/{channel}");
            let mut push = |age_bin: f64, pfpr_bin: Option<f64>, by_bin: &[f64]| -> Result<()> {
                check_width(&label, by_bin.len(), bins.infectiousness.len())?;
                rows.extend(bins.infectiousness.iter().zip(by_bin).map(|(bin, count)| {
                    InfectiousnessRow {
                        channel: channel.clone(),
                        date,
                        age_bin,
                        pfpr_bin,
                        infectiousness_bin: *bin,
                        counts: *count,
                        counts_tot: 0.0,
                    }
                }));
                Ok(())
            };
            match channel_counts {
                InfectiousnessCounts::ByAge(matrix) => {
                    check_width(&label, matrix.len(), bins.age.len())?;
                    for (age_bin, by_bin) in bins.age.iter().zip(matrix) {
                        push(*age_bin, None, &by_bin[..])?;
                    }
                }
                InfectiousnessCounts::ByAgeAndDensity(cube) => {
                    check_width(&label, cube.len(), bins.age.len())?;
                    for (age_bin, by_density) in bins.age.iter().zip(cube) {
                        check_width(&label, by_density.len(), bins.density.len())?;
                        for (pfpr_bin, by_bin) in bins.density.iter().zip(by_density) {
                            push(*age_bin, Some(*pfpr_bin), &by_bin[..])?;
                        }
                    }
                }
            }
        }
    }

    rows.sort_by(InfectiousnessRow::cmp_key);
    for group in rows.chunk_by_mut(|a, b| a.group_key() == b.group_key()) {
        let total: f64 = group.iter().map(|row| row.counts).sum();
        for row in group.iter_mut() {
            row.counts_tot = total;
            row.counts = if total > 0.0 { row.counts / total } else { 0.0 };
        }
    }
    Ok(InfectiousnessReference {
        bin_header: bin_header.to_string(),
        rows,
    })
}

/// One person examined on one date, with the fraction of microscope fields
/// positive for asexual parasites and for gametocytes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParasitologyRecord {
    #[serde(rename = "Village")]
    pub village: String,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Age")]
    pub age: f64,
    #[serde(rename = "Parasitemia")]
    pub parasitemia: f64,
    #[serde(rename = "Gametocytemia")]
    pub gametocytemia: f64,
}

pub fn read_parasitology(reader: impl io::Read) -> Result<Vec<ParasitologyRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for record in rdr.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

pub fn read_parasitology_file(path: impl AsRef<Path>) -> Result<Vec<ParasitologyRecord>> {
    let file = File::open(path.as_ref())?;
    tracing::debug!(path = %path.as_ref().display(), "reading parasitology records");
    read_parasitology(file)
}

/// Expected fraction of fields positive at `density` parasites per uL.
pub fn field_fraction(density: f64) -> f64 {
    1.0 - (-density * UL_PER_FIELD).exp()
}

/// Index of the first right-closed bin containing `value`.
fn bin_index(edges: &[f64], value: f64) -> Option<usize> {
    edges.iter().position(|&edge| value <= edge)
}

/// Bins dated parasitology surveys by age and density, then collapses the
/// survey dates onto the middle of their month.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedDensityBinning {
    pub villages: Vec<String>,
    /// Exclusive on both ends.
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub age_bins: Vec<f64>,
    /// Density edges in parasites per uL; records are binned against their
    /// [`field_fraction`].
    pub density_bins: Vec<f64>,
    /// Collection months (1 to 12) to keep; empty keeps every month.
    pub months: Vec<u32>,
    /// Prepended to both channel names.
    pub channel_prefix: String,
}

impl DatedDensityBinning {
    pub fn garki(village: &str) -> Result<Self> {
        Ok(Self {
            villages: vec![village.replace('_', " ")],
            start: NaiveDate::parse_from_str("1970-11-01", "%Y-%m-%d")?,
            end: NaiveDate::parse_from_str("1971-12-31", "%Y-%m-%d")?,
            age_bins: vec![0.0, 1.0, 4.0, 8.0, 18.0, 28.0, 43.0, f64::INFINITY],
            density_bins: vec![0.0, 16.0, 70.0, 409.0, 4_000_000.0],
            months: Vec::new(),
            channel_prefix: String::new(),
        })
    }

    /// Every survey year pooled, keeping only the months that stand for a
    /// season.
    pub fn by_season(village: &str, seasons_by_month: &[(&str, &str)]) -> Result<Self> {
        let months = seasons_by_month
            .iter()
            .map(|(month, _)| parse_month(month).map(|m| m.number_from_month()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
            density_bins: vec![0.0, 16.0, 70.0, 409.0, f64::INFINITY],
            months,
            ..Self::garki(village)?
        })
    }

    pub fn reshape(&self, records: &[ParasitologyRecord]) -> Result<DensityReference> {
        let field_edges: Vec<f64> = self.density_bins.iter().map(|&d| field_fraction(d)).collect();
        let channels = [
            format!("{}{}", self.channel_prefix, PARASITEMIA_CHANNEL),
            format!("{}{}", self.channel_prefix, GAMETOCYTEMIA_CHANNEL),
        ];

        let kept: Vec<&ParasitologyRecord> = records
            .iter()
            .filter(|r| self.villages.contains(&r.village))
            .filter(|r| r.date > self.start && r.date < self.end)
            .filter(|r| self.months.is_empty() || self.months.contains(&r.date.month()))
            .collect();
        if kept.is_empty() {
            return Err(Error::Reference(format!(
                "no parasitology records for {} between {} and {}",
                self.villages.join(", "),
                self.start,
                self.end
            )));
        }

        // (channel, date, age bin, density bin) → people
        let mut counts: BTreeMap<(usize, NaiveDate, usize, usize), f64> = BTreeMap::new();
        let dates: BTreeSet<NaiveDate> = kept.iter().map(|r| r.date).collect();
        for &date in &dates {
            for channel in 0..channels.len() {
                for age in 0..self.age_bins.len() {
                    for density in 0..field_edges.len() {
                        counts.insert((channel, date, age, density), 0.0);
                    }
                }
            }
        }
        let mut unbinned = 0usize;
        for record in &kept {
            let Some(age) = bin_index(&self.age_bins, record.age) else {
                unbinned += 1;
                continue;
            };
            for (channel, fraction) in [record.parasitemia, record.gametocytemia]
                .into_iter()
                .enumerate()
            {
                match bin_index(&field_edges, fraction) {
                    Some(density) => {
                        if let Some(n) = counts.get_mut(&(channel, record.date, age, density)) {
                            *n += 1.0;
                        }
                    }
                    None => unbinned += 1,
                }
            }
        }
        if unbinned > 0 {
            tracing::warn!(unbinned, "parasitology values outside the bin edges were dropped");
        }

        // Normalize per survey round, then average rounds within a month.
        // Group sizes add up.
        let entries: Vec<_> = counts.into_iter().collect();
        let mut by_month: BTreeMap<(usize, u32, usize, usize), (f64, f64, u32)> = BTreeMap::new();
        for group in entries.chunk_by(|(a, _), (b, _)| (a.0, a.1, a.2) == (b.0, b.1, b.2)) {
            let total: f64 = group.iter().map(|(_, n)| n).sum();
            for &((channel, date, age, density), n) in group {
                let fraction = if total > 0.0 { n / total } else { 0.0 };
                let entry = by_month
                    .entry((channel, date.month(), age, density))
                    .or_insert((0.0, 0.0, 0));
                entry.0 += fraction;
                entry.1 += total;
                entry.2 += 1;
            }
        }

        let mut rows = Vec::with_capacity(by_month.len());
        for ((channel, month, age, density), (fraction_sum, total, rounds)) in by_month {
            let mid_month = NaiveDate::from_ymd_opt(1970, month, 15)
                .ok_or_else(|| Error::Reference(format!("invalid month {month}")))?;
            rows.push(DensityRow {
                channel: channels[channel].clone(),
                date: mid_month.ordinal(),
                age_bin: self.age_bins[age],
                pfpr_bin: self.density_bins[density],
                counts: fraction_sum / f64::from(rounds),
                counts_tot: total,
            });
        }
        rows.sort_by(DensityRow::cmp_key);
        Ok(DensityReference { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Patient_id,Village,Date,Age,Age Bins,Parasitemia,Gametocytemia
1,Ajura,1970-11-01,3.0,1.0,0.5,0.0
2,Ajura,1971-01-10,0.5,1.0,0.0,0.0
3,Ajura,1971-01-10,2.0,1.0,0.05,0.0
4,Ajura,1971-01-24,2.5,1.0,0.5,0.01
5,Kargo Kudu,1971-01-10,2.0,1.0,0.5,0.0
6,Ajura,1972-02-01,2.0,1.0,0.5,0.0
";

    #[test]
    fn test_age_binned_table() {
        let table = AgeBinned {
            channel: "PfPR by Age Bin".to_string(),
            age_bins: vec![0.5, 1.0],
            population: vec![150.0, 150.0],
            values: vec![0.55, 0.85],
        }
        .to_table()
        .unwrap();
        assert_eq!(
            table.header_refs(),
            vec!["Age Bin", "Average Population by Age Bin", "PfPR by Age Bin"]
        );
        assert_eq!(table.rows[0], vec!["0.5", "150", "0.55"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_age_binned_length_mismatch() {
        let err = AgeBinned {
            channel: "x".to_string(),
            age_bins: vec![1.0, 2.0],
            population: vec![1.0],
            values: vec![1.0, 2.0],
        }
        .to_table()
        .unwrap_err();
        assert!(matches!(err, Error::Reference(_)));
    }

    #[test]
    fn test_seasonal_density_normalizes_groups() {
        let mut counts = SeasonCounts::new();
        counts.entry("dry".to_string()).or_default().insert(
            "Parasites".to_string(),
            vec![vec![1.0, 3.0], vec![0.0, 0.0]],
        );
        counts
            .entry("wet".to_string())
            .or_default()
            .insert("Parasites".to_string(), vec![vec![2.0, 2.0], vec![5.0, 0.0]]);

        let reference = seasonal_density(
            &counts,
            &[("July", "wet"), ("January", "dry")],
            &[5.0, f64::INFINITY],
            &[0.0, 50.0],
        )
        .unwrap();
        assert_eq!(reference.rows.len(), 8);

        // January sorts first
        let first = &reference.rows[0];
        assert_eq!(first.date, 15);
        assert_eq!(first.age_bin, 5.0);
        assert_eq!(first.counts, 0.25);
        assert_eq!(first.counts_tot, 4.0);
        assert_eq!(reference.rows[1].counts, 0.75);

        // empty group
        assert_eq!(reference.rows[2].counts, 0.0);
        assert_eq!(reference.rows[2].counts_tot, 0.0);

        let july = &reference.rows[4];
        assert_eq!(july.date, 195);
        assert_eq!(july.counts, 0.5);
        assert_eq!(reference.rows[6].counts, 1.0);

        let table = reference.to_table();
        assert_eq!(table.headers[5], "Counts_tot");
        assert_eq!(table.rows[3][2], "inf");
    }

    #[test]
    fn test_seasonal_density_shape_errors() {
        let mut counts = SeasonCounts::new();
        counts
            .entry("wet".to_string())
            .or_default()
            .insert("Parasites".to_string(), vec![vec![1.0]]);
        let err = seasonal_density(&counts, &[("July", "wet")], &[5.0], &[0.0, 50.0]).unwrap_err();
        assert!(matches!(err, Error::Reference(_)));

        let err = seasonal_density(&counts, &[("Julember", "wet")], &[5.0], &[0.0]).unwrap_err();
        assert!(matches!(err, Error::Reference(_)));

        let err = seasonal_density(&counts, &[("July", "dry")], &[5.0], &[0.0]).unwrap_err();
        assert!(matches!(err, Error::Reference(_)));
    }

    #[test]
    fn test_field_fraction_edges() {
        assert_eq!(field_fraction(0.0), 0.0);
        assert!((field_fraction(16.0) - 0.0392).abs() < 1e-3);
        assert!(field_fraction(4_000_000.0) > 0.999_999);
    }

    #[test]
    fn test_read_parasitology() {
        let records = read_parasitology(CSV.as_bytes()).unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(records[4].village, "Kargo Kudu");
        assert_eq!(records[1].date, NaiveDate::from_ymd_opt(1971, 1, 10).unwrap());
    }

    #[test]
    fn test_read_parasitology_errors() {
        let err = read_parasitology_file("/nonexistent/parasitology.csv").unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let err = read_parasitology("Village,Date\nAjura,yesterday\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Csv(_)));
    }

    #[test]
    fn test_garki_reshape() {
        let records = read_parasitology(CSV.as_bytes()).unwrap();
        let binning = DatedDensityBinning::garki("Ajura").unwrap();
        let reference = binning.reshape(&records).unwrap();

        // two channels, one month, 8 age bins, 5 density bins
        assert_eq!(reference.rows.len(), 2 * 8 * 5);
        assert!(reference.rows.iter().all(|row| row.date == 15));
        assert_eq!(reference.rows[0].channel, GAMETOCYTEMIA_CHANNEL);

        let parasites: Vec<&DensityRow> = reference
            .rows
            .iter()
            .filter(|row| row.channel == PARASITEMIA_CHANNEL && row.age_bin == 4.0)
            .collect();
        assert_eq!(parasites.len(), 5);
        // one case per survey round, in different density bins
        let top = parasites.iter().find(|row| row.pfpr_bin == 409.0).unwrap();
        let total: f64 = parasites.iter().map(|row| row.counts_tot).sum();
        assert_eq!(total, 5.0 * 2.0);
        assert!(top.counts > 0.0);
        let sum: f64 = parasites.iter().map(|row| row.counts).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_garki_no_records() {
        let records = read_parasitology(CSV.as_bytes()).unwrap();
        let err = DatedDensityBinning::garki("Sugungum")
            .unwrap()
            .reshape(&records)
            .unwrap_err();
        assert!(matches!(err, Error::Reference(_)));
    }

    fn bins() -> InfectiousnessBins<'static> {
        InfectiousnessBins {
            age: &[5.0, f64::INFINITY],
            density: &[0.0, 50.0],
            infectiousness: &[0.0, 50.0, 100.0],
        }
    }

    #[test]
    fn test_seasonal_infectiousness() {
        let mut counts = SeasonInfectiousness::new();
        let channels = counts.entry("wet".to_string()).or_default();
        channels.insert(
            "by age".to_string(),
            InfectiousnessCounts::ByAge(vec![vec![2.0, 1.0, 1.0], vec![0.0, 0.0, 0.0]]),
        );
        channels.insert(
            "by density".to_string(),
            InfectiousnessCounts::ByAgeAndDensity(vec![
                vec![vec![1.0, 1.0, 0.0], vec![0.0, 0.0, 3.0]],
                vec![vec![4.0, 0.0, 0.0], vec![0.0, 0.0, 0.0]],
            ]),
        );

        let reference =
            seasonal_infectiousness(&counts, &[("September", "wet")], bins(), "Percent Infected")
                .unwrap();
        // 2 ages x 3 bins pooled, plus 2 ages x 2 densities x 3 bins
        assert_eq!(reference.rows.len(), 6 + 12);

        let first = &reference.rows[0];
        assert_eq!(first.channel, "by age");
        assert_eq!(first.date, 255);
        assert_eq!(first.pfpr_bin, None);
        assert_eq!(first.counts, 0.5);
        assert_eq!(first.counts_tot, 4.0);

        let dense: Vec<&InfectiousnessRow> = reference
            .rows
            .iter()
            .filter(|row| row.channel == "by density" && row.age_bin == 5.0)
            .collect();
        assert_eq!(dense[0].pfpr_bin, Some(0.0));
        assert_eq!(dense[0].counts, 0.5);
        assert_eq!(dense[5].pfpr_bin, Some(50.0));
        assert_eq!(dense[5].infectiousness_bin, 100.0);
        assert_eq!(dense[5].counts, 1.0);
        assert_eq!(dense[5].counts_tot, 3.0);

        let table = reference.to_table();
        assert_eq!(
            table.header_refs(),
            vec!["Channel", "Date", "Age Bin", "PfPR Bin", "Percent Infected", "Counts", "Counts_tot"]
        );
        assert_eq!(table.rows[0][3], "");
        assert_eq!(table.rows[6][3], "0");
    }

    #[test]
    fn test_seasonal_infectiousness_shape_errors() {
        let mut counts = SeasonInfectiousness::new();
        counts.entry("wet".to_string()).or_default().insert(
            "by density".to_string(),
            InfectiousnessCounts::ByAgeAndDensity(vec![
                vec![vec![1.0, 1.0, 0.0]],
                vec![vec![4.0, 0.0, 0.0]],
            ]),
        );
        let err = seasonal_infectiousness(&counts, &[("July", "wet")], bins(), "x").unwrap_err();
        assert!(matches!(err, Error::Reference(_)));

        let err = seasonal_infectiousness(&counts, &[("July", "dry")], bins(), "x").unwrap_err();
        assert!(matches!(err, Error::Reference(_)));
    }

    #[test]
    fn test_reshape_by_season_months() {
        let csv = "\
Village,Date,Age,Parasitemia,Gametocytemia
Sugungum,1971-01-10,2.0,0.5,0.0
Sugungum,1972-01-20,2.0,0.0,0.0
Sugungum,1973-05-03,30.0,0.05,0.0
Sugungum,1971-03-01,2.0,0.5,0.0
Ajura,1971-09-01,2.0,0.5,0.0
";
        let records = read_parasitology(csv.as_bytes()).unwrap();
        let binning = DatedDensityBinning::by_season(
            "Sugungum",
            &[("May", "DH2"), ("September", "W2"), ("January", "DC2")],
        )
        .unwrap();
        assert_eq!(binning.months, vec![5, 9, 1]);
        assert_eq!(binning.density_bins[4], f64::INFINITY);

        let reference = binning.reshape(&records).unwrap();
        // January and May, two channels, 8 age bins, 5 density bins
        assert_eq!(reference.rows.len(), 2 * 2 * 8 * 5);
        let dates: BTreeSet<u32> = reference.rows.iter().map(|row| row.date).collect();
        assert_eq!(dates, BTreeSet::from([15, 135]));

        // January rounds from two years are averaged
        let january: Vec<&DensityRow> = reference
            .rows
            .iter()
            .filter(|row| row.channel == PARASITEMIA_CHANNEL && row.date == 15 && row.age_bin == 4.0)
            .collect();
        assert_eq!(january[0].counts, 0.5);
        assert_eq!(january[3].counts, 0.5);
        assert_eq!(january[0].counts_tot, 2.0);
    }
}
