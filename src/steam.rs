//! Reading the files a Steam install keeps on disk.

pub mod accounts;
pub mod avatar;
pub mod keyvalues;
pub mod stats;
pub mod vdf;
