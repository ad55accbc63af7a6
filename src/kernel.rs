//! Kaiser-Bessel interpolation kernel used for gridding.

use crate::types::{lit, count, Float, Real};

/// Modified Bessel function of the first kind, order zero, evaluated by its
/// power series `Σ ((x/2)^k / k!)²`. Converges quickly for the arguments
/// occurring here (`|x| < 30`).
pub fn bessel_i0<T: Real>(x: T) -> T {
    let quarter_x2 = x * x / lit(4.0);
    let mut term = T::one();
    let mut sum  = T::one();
    let mut k = T::one();
    loop {
        term = term * quarter_x2 / (k * k);
        sum = sum + term;
        if term <= sum * T::epsilon() { break sum }
        k = k + T::one();
    }
}

/// Separable Kaiser-Bessel kernel of footprint `width` grid cells, with its
/// shape parameter tuned to the oversampling ratio (Beatty et al., 2005).
#[derive(Clone, Copy, Debug)]
pub struct KaiserBessel<T: Real> {
    half_width: T,
    beta: T,
    norm: T,
}

impl<T: Real> KaiserBessel<T> {

    pub fn new(width: usize, overgridding: f64) -> Self {
        let w = width as f64;
        let a = overgridding;
        let beta = std::f64::consts::PI * ((w / a).powi(2) * (a - 0.5).powi(2) - 0.8).max(0.0).sqrt();
        let beta: T = lit(beta);
        Self { half_width: count::<T>(width) / lit(2.0), beta, norm: bessel_i0(beta) }
    }

    pub fn beta(&self) -> T { self.beta }

    /// Kernel value at distance `u` (in grid cells) from its centre; zero
    /// outside the footprint, 1 at the centre.
    pub fn value(&self, u: T) -> T {
        let u = Float::abs(u);
        if u > self.half_width { return T::zero() }
        let x = u / self.half_width;
        bessel_i0(self.beta * (T::one() - x * x).max(T::zero()).sqrt()) / self.norm
    }

    /// Signed grid indices within the footprint of a kernel centred at `centre`
    /// (in grid cells), paired with the corresponding kernel value.
    pub fn footprint(&self, centre: T) -> impl Iterator<Item = (isize, T)> + '_ {
        let lo = (centre - self.half_width).ceil ().to_isize().unwrap_or(0);
        let hi = (centre + self.half_width).floor().to_isize().unwrap_or(-1);
        (lo..=hi).map(move |m| {
            let position = T::from_isize(m).unwrap_or_else(T::nan);
            (m, self.value(position - centre))
        })
    }
}
