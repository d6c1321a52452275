//! Convert high-content-screening plate acquisitions into OME-Zarr (NGFF 0.4)
//! plate hierarchies: plate → row → column → field → pyramid levels.
pub mod channel;
pub mod chunking;
pub mod dtype;
mod error;
pub mod histogram;
pub mod metadata;
pub mod multiscale;
pub mod plate;
pub mod pyramid;
pub mod store;

pub use ndarray;
pub use zarrs;

pub use error::{Error, Result};
