//! File-backed input: path resolution, transparent compression and the CSV
//! reader.

pub mod compression;
pub mod glob;

#[cfg_attr(docsrs, doc(cfg(feature = "io-csv")))]
#[cfg(feature = "io-csv")]
pub mod csv;
