use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("campaign type not recognized: {0}")]
    UnknownCampaignType(String),

    #[error("unknown drug code: {0}")]
    UnknownDrugCode(String),

    #[error("{0} campaign needs at least one start day")]
    NoStartDays(String),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("day out of range: {0}")]
    DayOverflow(String),

    #[error("malformed reference data: {0}")]
    Reference(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("date error: {0}")]
    Date(#[from] chrono::ParseError),
}
