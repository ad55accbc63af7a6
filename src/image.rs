use std::path::Path;

use crate::index::{index1_to_2, Index1, Index2};
use crate::types::{ImageData, Real, C};

/// Reconstructed complex image, `[iy, ix]`
#[derive(Clone, Debug)]
pub struct Image<T: Real> {
    pub data: ImageData<T>,
}

impl<T: Real> core::ops::IndexMut<Index1> for Image<T> {
    #[inline]
    fn index_mut(&mut self, i: Index1) -> &mut Self::Output {
        let i2 = index1_to_2(i, self.shape());
        &mut self.data[i2]
    }
}

impl<T: Real> core::ops::Index<Index1> for Image<T> {
    type Output = C<T>;
    #[inline]
    fn index(&self, i: Index1) -> &Self::Output { &self.data[index1_to_2(i, self.shape())] }
}

impl<T: Real> core::ops::IndexMut<Index2> for Image<T> {
    fn index_mut(&mut self, i2: Index2) -> &mut Self::Output { &mut self.data[i2] }
}

impl<T: Real> core::ops::Index<Index2> for Image<T> {
    type Output = C<T>;
    fn index(&self, i2: Index2) -> &Self::Output { &self.data[i2] }
}

impl<T: Real> From<ImageData<T>> for Image<T> {
    fn from(data: ImageData<T>) -> Self { Self { data } }
}

impl<T: Real> Image<T> {

    pub fn zeros(n: usize) -> Self { Self { data: ImageData::zeros((n, n)) } }

    pub fn shape(&self) -> [usize; 2] { let (ny, nx) = self.data.dim(); [ny, nx] }

    /// Position and magnitude of the brightest pixel
    pub fn peak(&self) -> (Index2, T) {
        self.data.indexed_iter()
            .map(|((iy, ix), z)| ([iy, ix], z.norm()))
            .fold(([0, 0], T::neg_infinity()), |best, this| if this.1 > best.1 { this } else { best })
    }

    pub fn write_to_raw_file(&self, path: &Path) -> std::io::Result<()>
    where
        T: crate::io::raw::RawFloat,
    {
        crate::io::raw::write_complex(self.data.iter(), path)
    }

    pub fn from_raw_file(path: &Path, n: usize) -> Result<Self, crate::error::ReconError>
    where
        T: crate::io::raw::RawFloat,
    {
        let values: Vec<C<T>> = crate::io::raw::read_complex(path)?.collect::<Result<_, _>>()?;
        let found = values.len();
        let data = ImageData::from_shape_vec((n, n), values)
            .map_err(|_| crate::error::ReconError::shape_mismatch("raw image file", n * n, found))?;
        Ok(Self { data })
    }
}
