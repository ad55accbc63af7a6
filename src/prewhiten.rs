//! Noise decorrelation across receive coils.
//!
//! Given a noise-only scan, the coil noise covariance `Ψ = L Lᴴ` is estimated
//! and every multi-coil sample vector `d` is replaced by `L⁻¹ d`, after which
//! the noise is white and of unit variance in every (virtual) coil.

use ndarray::{Array2, ArrayView2, Axis, Zip};
use tracing::debug;

use crate::error::{NumericalError, ReconError};
use crate::types::{count, lit, KspaceData, Real, C};

/// Sample covariance of `noise` (`[coil, sample]`), mean removed, normalized
/// by `n - 1`.
pub fn noise_covariance<T: Real>(noise: ArrayView2<C<T>>) -> Result<Array2<C<T>>, ReconError> {
    let (coils, n) = noise.dim();
    if n < 2 { return Err(ReconError::shape_mismatch("noise samples per coil", "at least 2", n)) }
    let means: Vec<C<T>> = noise.outer_iter()
        .map(|lane| lane.iter().fold(C::new(T::zero(), T::zero()), |a, &z| a + z) / count::<T>(n))
        .collect();
    let centred = Array2::from_shape_fn((coils, n), |(c, s)| noise[[c, s]] - means[c]);
    let norm = count::<T>(n - 1);
    Ok(Array2::from_shape_fn((coils, coils), |(i, j)| {
        let row_i = centred.row(i);
        let row_j = centred.row(j);
        row_i.iter().zip(row_j.iter()).fold(C::new(T::zero(), T::zero()), |a, (&x, &y)| a + x * y.conj()) / norm
    }))
}

/// Lower-triangular `L` with `Ψ = L Lᴴ`
pub fn cholesky<T: Real>(psi: ArrayView2<C<T>>) -> Result<Array2<C<T>>, NumericalError> {
    let n = psi.nrows();
    let scale = (0..n).map(|i| psi[[i, i]].re).fold(T::zero(), T::max);
    let tiny = T::epsilon() * lit(1e3) * count::<T>(n) * scale;
    let mut l = Array2::<C<T>>::zeros((n, n));
    for j in 0..n {
        let d = psi[[j, j]].re - (0..j).map(|k| l[[j, k]].norm_sqr()).sum::<T>();
        if !(d > tiny) { return Err(NumericalError::NoiseCovarianceNotPositiveDefinite { pivot: j }) }
        let ljj = d.sqrt();
        l[[j, j]] = C::new(ljj, T::zero());
        for i in j + 1..n {
            let s = (0..j).fold(psi[[i, j]], |s, k| s - l[[i, k]] * l[[j, k]].conj());
            l[[i, j]] = s / ljj;
        }
    }
    Ok(l)
}

/// Decorrelate `samples` (`[coil, projection, read]`) in place, using the
/// noise scan `noise` (`[coil, sample]`).
pub fn prewhiten<T: Real>(samples: &mut KspaceData<T>, noise: ArrayView2<C<T>>) -> Result<(), ReconError> {
    let coils = samples.len_of(Axis(0));
    if noise.nrows() != coils {
        return Err(ReconError::shape_mismatch("noise scan coils", coils, noise.nrows()));
    }
    let psi = noise_covariance(noise)?;
    let l = cholesky(psi.view())?;
    debug!("noise covariance diagonal: {:?}", psi.diag().iter().map(|z| z.re).collect::<Vec<_>>());

    // Forward substitution `L z = d`, independently for every sample vector
    Zip::from(samples.lanes_mut(Axis(0))).par_for_each(|mut d| {
        for i in 0..coils {
            let s = (0..i).fold(d[i], |s, k| s - l[[i, k]] * d[k]);
            d[i] = s / l[[i, i]].re;
        }
    });
    Ok(())
}



#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::{Array3, arr2};
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn correlated_noise(n: usize, seed: u64) -> Array2<C<f64>> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mixing = arr2(&[[C::new(2.0, 0.0), C::new(0.0, 0.0), C::new( 0.0, 0.0)],
                            [C::new(0.5, 0.5), C::new(1.0, 0.0), C::new( 0.0, 0.0)],
                            [C::new(0.1, 0.0), C::new(0.3,-0.2), C::new( 0.7, 0.0)]]);
        let white = Array2::from_shape_fn((3, n), |_| C::new(normal.sample(&mut rng), normal.sample(&mut rng)));
        mixing.dot(&white)
    }

    #[test]
    fn cholesky_reconstructs_matrix() {
        let psi = noise_covariance(correlated_noise(500, 1).view()).unwrap();
        let l = cholesky(psi.view()).unwrap();
        let lh = l.t().mapv(|z| z.conj());
        let back = l.dot(&lh);
        for (a, b) in back.iter().zip(psi.iter()) {
            assert_float_eq!((a - b).norm(), 0.0, abs <= 1e-12);
        }
        // Lower triangular, real positive diagonal
        for i in 0..3 {
            assert!(l[[i, i]].re > 0.0 && l[[i, i]].im == 0.0);
            for j in i + 1..3 { assert_eq!(l[[i, j]], C::new(0.0, 0.0)) }
        }
    }

    #[test]
    fn whitened_noise_has_identity_covariance() {
        let noise = correlated_noise(2000, 2);
        let mut as_samples: Array3<C<f64>> = noise.clone().into_shape((3, 1, 2000)).unwrap();
        prewhiten(&mut as_samples, noise.view()).unwrap();
        let whitened = as_samples.into_shape((3, 2000)).unwrap();
        let psi = noise_covariance(whitened.view()).unwrap();
        for ((i, j), z) in psi.indexed_iter() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_float_eq!(z.re, expected, abs <= 1e-10);
            assert_float_eq!(z.im, 0.0, abs <= 1e-10);
        }
    }

    #[test]
    fn duplicated_coil_is_not_positive_definite() {
        let mut noise = correlated_noise(100, 3);
        let first = noise.row(0).to_owned();
        noise.row_mut(2).assign(&first);
        let mut samples = Array3::zeros((3, 2, 2));
        match prewhiten(&mut samples, noise.view()) {
            Err(ReconError::Numerical(NumericalError::NoiseCovarianceNotPositiveDefinite { pivot })) => assert_eq!(pivot, 2),
            other => panic!("expected non-positive-definite covariance, got {other:?}"),
        }
    }

    #[test]
    fn coil_count_must_match() {
        let noise = correlated_noise(10, 4);
        let mut samples = Array3::<C<f64>>::zeros((2, 2, 2));
        assert!(matches!(prewhiten(&mut samples, noise.view()), Err(ReconError::ShapeMismatch { .. })));
    }
}
