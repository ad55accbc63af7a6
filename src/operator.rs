//! The SENSE imaging operator: image → multi-coil non-uniform k-space, and
//! its adjoint.

use ndarray::{Array3, ArrayView2, ArrayView3, Axis, Zip};
use rayon::prelude::*;

use crate::density::DensityWeights;
use crate::error::ReconError;
use crate::gridding::Gridding;
use crate::sensitivity::CoilSensitivityMaps;
use crate::types::{ImageData, KspaceData, Real, C};

/// A linear map between images and k-space data, together with its adjoint.
/// This is all the CG solver needs to know about the operator.
pub trait LinearOperator<T: Real>: Sync {
    /// `(ny, nx)`
    fn image_shape(&self) -> (usize, usize);
    /// `(coils, projections, reads)`
    fn kspace_shape(&self) -> (usize, usize, usize);

    fn forward(&self, image: ArrayView2<C<T>>) -> KspaceData<T>;
    fn adjoint(&self, kspace: ArrayView3<C<T>>) -> ImageData<T>;

    /// `Aᴴ A x`
    fn normal(&self, image: ArrayView2<C<T>>) -> ImageData<T> {
        self.adjoint(self.forward(image).view())
    }
}

/// `A = W^½ F S`: coil sensitivity weighting `S`, non-uniform FFT `F`,
/// square-root density weighting `W^½`. Borrows its precomputed parts, so it
/// is cheap to construct and can be shared between threads.
#[derive(Clone, Copy, Debug)]
pub struct ImagingOperator<'a, T: Real> {
    gridding: &'a Gridding<T>,
    maps: &'a CoilSensitivityMaps<T>,
    weights: &'a DensityWeights<T>,
}

impl<'a, T: Real> ImagingOperator<'a, T> {

    pub fn new(gridding: &'a Gridding<T>, maps: &'a CoilSensitivityMaps<T>, weights: &'a DensityWeights<T>) -> Result<Self, ReconError> {
        let n = gridding.geometry().image_dim;
        if maps.image_dim() != n {
            return Err(ReconError::shape_mismatch("sensitivity map size vs image", n, maps.image_dim()));
        }
        let samples = weights.sqrt_weights().len();
        if samples != gridding.samples() {
            return Err(ReconError::shape_mismatch("density weights vs trajectory samples", gridding.samples(), samples));
        }
        Ok(Self { gridding, maps, weights })
    }
}

impl<T: Real> LinearOperator<T> for ImagingOperator<'_, T> {

    fn image_shape(&self) -> (usize, usize) { self.gridding.geometry().image_shape() }

    fn kspace_shape(&self) -> (usize, usize, usize) {
        let (projections, reads) = self.weights.sqrt_weights().dim();
        (self.maps.coils(), projections, reads)
    }

    fn forward(&self, image: ArrayView2<C<T>>) -> KspaceData<T> {
        let sqrt_w = self.weights.sqrt_weights();
        let per_coil: Vec<Vec<C<T>>> = (0..self.maps.coils()).into_par_iter()
            .map(|c| {
                let coil_image = &image * &self.maps.coil(c);
                let mut samples = self.gridding.forward(coil_image.view());
                samples.iter_mut().zip(sqrt_w.iter()).for_each(|(y, &s)| *y = *y * s);
                samples
            })
            .collect();
        let mut kspace = Array3::zeros(self.kspace_shape());
        for (mut lane, samples) in kspace.outer_iter_mut().zip(per_coil) {
            lane.iter_mut().zip(samples).for_each(|(k, y)| *k = y);
        }
        kspace
    }

    fn adjoint(&self, kspace: ArrayView3<C<T>>) -> ImageData<T> {
        let sqrt_w = self.weights.sqrt_weights();
        let empty_image = || ImageData::zeros(self.image_shape());
        (0..self.maps.coils()).into_par_iter()
            .map(|c| {
                let samples = kspace.index_axis(Axis(0), c);
                let mut image = self.gridding.adjoint(samples.iter().zip(sqrt_w.iter()).map(|(&y, &s)| y * s));
                Zip::from(&mut image).and(&self.maps.coil(c)).for_each(|x, s| *x = *x * s.conj());
                image
            })
            .reduce(empty_image, |a, b| a + b)
    }
}
