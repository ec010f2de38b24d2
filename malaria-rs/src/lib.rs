pub mod campaign;
pub mod config_builder;
pub mod diagnostic;
pub mod drug_campaign;
pub mod drugs;
pub mod error;
pub mod fragments;
pub mod irs;
pub mod reference;
pub mod study_sites;
pub mod symptoms;
pub mod trigger;

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use config_builder::{CampaignSink, ConfigBuilder};
pub use diagnostic::{DiagnosticSurvey, add_diagnostic_survey};
pub use drug_campaign::{CampaignType, DispatchMode, DrugCampaign, add_drug_campaign};
pub use drugs::{DrugLookup, DrugTable};
pub use error::{Error, Result};
pub use irs::{ReactiveIrs, add_reactive_node_irs};
pub use trigger::TriggerName;

/// One run request: typed input, named input files and an output target.
pub struct Environment<I = ()> {
    input_json: serde_json::Map<String, Value>,
    pub input: Option<I>,
    pub seed: u64,
    pub replicate: u64,
    pub files: HashMap<String, PathBuf>,
    output: Value,
}

impl Environment {
    pub fn from_json(data: Value) -> Self {
        let mut input_json = data
            .get("input")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let seed = input_json
            .remove("seed")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let replicate = input_json
            .remove("replicate")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let files = data
            .get("model")
            .and_then(|m| m.get("files"))
            .and_then(|f| f.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), PathBuf::from(s))))
                    .collect()
            })
            .unwrap_or_default();

        let output = data.get("output").cloned().unwrap_or(Value::Null);

        Self {
            input_json,
            input: None,
            seed,
            replicate,
            files,
            output,
        }
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        if raw.trim().is_empty() {
            return Err(Error::MissingInput("run request on stdin".to_string()));
        }
        let data: Value = serde_json::from_str(&raw)?;
        Ok(Self::from_json(data))
    }

    pub fn from_stdin() -> Result<Self> {
        Self::from_reader(io::stdin().lock())
    }

    pub fn with_input_type<I: DeserializeOwned>(self) -> Result<Environment<I>> {
        let input_value = Value::Object(self.input_json.clone());
        let input = serde_json::from_value(input_value)?;
        Ok(Environment {
            input_json: self.input_json,
            input: Some(input),
            seed: self.seed,
            replicate: self.replicate,
            files: self.files,
            output: self.output,
        })
    }
}

impl<I: DeserializeOwned> Environment<I> {
    pub fn load() -> Result<Self> {
        Environment::from_stdin()?.with_input_type::<I>()
    }
}

impl<I> Environment<I> {
    pub fn input_json(&self) -> &serde_json::Map<String, Value> {
        &self.input_json
    }

    pub fn file(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(PathBuf::as_path)
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        let output = &self.output;

        if output.get("spec").and_then(|v| v.as_str()) == Some("filesystem") {
            return output
                .get("dir")
                .and_then(|v| v.as_str())
                .map(PathBuf::from);
        }

        // profiled output: "default" wins, otherwise the first profile
        let profiles = output.get("profile").and_then(|v| v.as_object())?;
        let profile = profiles
            .get("default")
            .or_else(|| profiles.values().next())?;
        if profile.get("spec").and_then(|v| v.as_str()) != Some("filesystem") {
            return None;
        }
        profile.get("dir").and_then(|v| v.as_str()).map(PathBuf::from)
    }

    /// Writes `data` to `filename` in the output directory, or to stdout
    /// when there is none.
    pub fn write(&self, filename: &str, data: &[u8]) -> Result<()> {
        match self.output_dir() {
            Some(dir) => {
                fs::create_dir_all(&dir)?;
                fs::write(dir.join(filename), data)?;
                tracing::debug!(path = %dir.join(filename).display(), bytes = data.len(), "wrote output");
            }
            None => io::stdout().lock().write_all(data)?,
        }
        Ok(())
    }

    pub fn write_csv(&self, filename: &str, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
        match self.output_dir() {
            Some(dir) => {
                fs::create_dir_all(&dir)?;
                let file = fs::File::create(dir.join(filename))?;
                write_records(csv::Writer::from_writer(file), headers, rows)
            }
            None => write_records(csv::Writer::from_writer(io::stdout().lock()), headers, rows),
        }
    }
}

fn write_records<W: Write>(
    mut wtr: csv::Writer<W>,
    headers: &[&str],
    rows: &[Vec<String>],
) -> Result<()> {
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
