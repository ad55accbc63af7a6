pub use numeric::{Real, Float, C, lit, count};

/// Complex image, indexed `[row (y), column (x)]`
pub type ImageData<T> = ndarray::Array2<C<T>>;

/// Multi-coil k-space samples, indexed `[coil, projection, read]`
pub type KspaceData<T> = ndarray::Array3<C<T>>;

/// Trajectory coordinates, indexed `[projection, read, component]` where
/// component 0 is `kx` and component 1 is `ky`
pub type Coordinates<T> = ndarray::Array3<T>;

pub use crate::index::{Index1, Index2, Dim2};
