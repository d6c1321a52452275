pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} layout not supported; expected 96 or 384 wells")]
    UnsupportedLayout(String),
    #[error("files belong to more than one plate: {0:?}")]
    MultiPlateInput(Vec<String>),
    #[error("file table is empty and no plate name was given")]
    EmptyFileTable,
    #[error("invalid well {well:?}: {reason}")]
    InvalidWell { well: String, reason: String },
    #[error("spatial unit {0:?} not supported; only micrometers are")]
    UnsupportedUnit(String),
    #[error("axes don't match image dimensions: {axes} <> {ndim}")]
    AxisMismatch { axes: usize, ndim: usize },
    #[error("images must have 3 (c, y, x) or 4 (c, z, y, x) dimensions, got {0}")]
    UnsupportedDimensionality(usize),
    #[error("channel {channel} metadata is missing field {field:?}")]
    MissingChannelField { channel: usize, field: &'static str },
    #[error("histogram is empty")]
    EmptyHistogram,
    #[error("quantile {0} outside [0, 1]")]
    InvalidQuantile(f64),
    #[error("histogram would span {span} bins; at most {max} are supported")]
    HistogramTooWide { span: u64, max: u64 },
    #[error("{0}")]
    General(String),
    #[error(transparent)]
    Storage(#[from] zarrs::storage::StorageError),
    #[error(transparent)]
    StoreKey(#[from] zarrs::storage::StoreKeyError),
    #[error(transparent)]
    StorePrefix(#[from] zarrs::storage::StorePrefixError),
    #[error(transparent)]
    GroupCreate(#[from] zarrs::group::GroupCreateError),
    #[error(transparent)]
    ArrayCreate(#[from] zarrs::array::ArrayCreateError),
    #[error(transparent)]
    Array(#[from] zarrs::array::ArrayError),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn wrap(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }
}
