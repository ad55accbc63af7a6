//! Slice-level complex vector arithmetic used by iterative solvers.
//!
//! All vectors are flat slices; callers are responsible for passing slices of
//! equal length (checked with `debug_assert!` only, these sit in hot loops).

use crate::{Real, C};
use num_traits::Zero;

/// Inner product `⟨a, b⟩ = Σ conj(aᵢ) bᵢ` (conjugate-linear in the first
/// argument).
pub fn dot<T: Real>(a: &[C<T>], b: &[C<T>]) -> C<T> {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .fold(C::zero(), |acc, (x, y)| acc + x.conj() * y)
}

/// `‖a‖² = Σ |aᵢ|²`
pub fn norm_sqr<T: Real>(a: &[C<T>]) -> T {
    a.iter().map(|z| z.norm_sqr()).sum()
}

/// `y ← y + α x`
pub fn axpy<T: Real>(y: &mut [C<T>], alpha: C<T>, x: &[C<T>]) {
    debug_assert_eq!(y.len(), x.len());
    for (y, &x) in y.iter_mut().zip(x.iter()) {
        *y = *y + alpha * x;
    }
}

/// `y ← x + β y`: the conjugate-gradient search direction update.
pub fn xpby<T: Real>(x: &[C<T>], beta: T, y: &mut [C<T>]) {
    debug_assert_eq!(y.len(), x.len());
    for (y, &x) in y.iter_mut().zip(x.iter()) {
        *y = x + *y * beta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use proptest::prelude::*;

    fn c(re: f64, im: f64) -> C<f64> { C::new(re, im) }

    #[test]
    fn dot_conjugates_first_argument() {
        let a = [c(0.0, 1.0)];
        let b = [c(0.0, 1.0)];
        // conj(i) * i = 1
        assert_eq!(dot(&a, &b), c(1.0, 0.0));
    }

    #[test]
    fn updates() {
        let mut y = vec![c(1.0, 0.0), c(0.0, 1.0)];
        let x = vec![c(1.0, 1.0), c(2.0, 0.0)];
        axpy(&mut y, c(2.0, 0.0), &x);
        assert_eq!(y, vec![c(3.0, 2.0), c(4.0, 1.0)]);
        xpby(&x, 0.5, &mut y);
        assert_eq!(y, vec![c(2.5, 2.0), c(4.0, 0.5)]);
    }

    proptest! {
        #[test]
        fn norm_is_self_inner_product(
            v in proptest::collection::vec((-10.0..10.0_f64, -10.0..10.0_f64), 0..50)
        ) {
            let v: Vec<C<f64>> = v.into_iter().map(|(re, im)| c(re, im)).collect();
            let d = dot(&v, &v);
            assert_float_eq!(d.re, norm_sqr(&v), rmax <= 1e-12);
            assert_float_eq!(d.im, 0.0, abs <= 1e-12);
        }
    }
}
