//! Float-polymorphic numerics shared by the reconstruction code.
//!
//! Everything numerical is written once, generic over `T: Real`, and
//! instantiated with a concrete float type (`f32` or `f64`) at the outermost
//! layer. This replaces choosing the precision with a string at run time and
//! then branching on it at every operation.

mod linalg;
pub use linalg::{axpy, dot, norm_sqr, xpby};

// This is the trait which allows us to abstract over different float types.
pub use num_traits::{Float, FloatConst, FromPrimitive, Zero, One};
pub use num_complex::Complex;

/// Complex sample with real and imaginary parts of type `T`.
pub type C<T> = Complex<T>;

/// Everything the reconstruction needs from a float type: arithmetic, the
/// transcendental functions, conversion from literals, FFT support and the
/// ability to be shared across rayon threads.
pub trait Real:
    Float
    + FloatConst
    + FromPrimitive
    + rustfft::FftNum
    + Default
    + std::fmt::Display
    + std::fmt::Debug
    + std::iter::Sum
    + Send
    + Sync
    + 'static
{}

impl<T> Real for T
where
    T: Float
    + FloatConst
    + FromPrimitive
    + rustfft::FftNum
    + Default
    + std::fmt::Display
    + std::fmt::Debug
    + std::iter::Sum
    + Send
    + Sync
    + 'static
{}

/// Helper to mitigate the boilerplate needed to convert from concrete float
/// literals to the generic one.
///
/// NOTE: values which are not representable in `T` come out as NaN, which the
/// numerical checks downstream will catch.
#[inline]
pub fn lit<T: Real>(x: f64) -> T { T::from_f64(x).unwrap_or_else(T::nan) }

/// Convert a count (number of samples, grid size ...) into `T`.
#[inline]
pub fn count<T: Real>(n: usize) -> T { T::from_usize(n).unwrap_or_else(T::nan) }
