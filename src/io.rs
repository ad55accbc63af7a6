pub mod raw;
#[cfg(feature = "hdf5")]
pub mod hdf5;
