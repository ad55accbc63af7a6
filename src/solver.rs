//! Conjugate gradients on the (optionally Tikhonov-regularized) normal
//! equations `(Aᴴ A + λ I) x = Aᴴ b`.
//!
//! Each iteration costs one forward and one adjoint application of `A`. The
//! loop is strictly sequential; all parallelism lives inside the operator.

use ndarray::{ArrayView2, ArrayView3};
use numeric::{axpy, dot, norm_sqr, xpby};
use tracing::{debug, warn};

use crate::error::{NumericalError, ReconError};
use crate::operator::LinearOperator;
use crate::types::{lit, ImageData, KspaceData, Real, C};

#[derive(Clone, Copy, Debug)]
pub struct CgSolver<T: Real> {
    pub tolerance: T,
    pub max_iterations: usize,
    pub regularization: T,
}

impl<T: Real> From<crate::config::reco::Solver> for CgSolver<T> {
    fn from(s: crate::config::reco::Solver) -> Self {
        Self { tolerance: lit(s.tolerance), max_iterations: s.max_iterations, regularization: lit(s.regularization) }
    }
}

/// Why the iteration stopped
#[derive(Clone, Debug, PartialEq)]
pub enum Termination {
    /// Relative residual fell below the tolerance
    Converged,
    /// Iteration limit reached first: not an error, but worth reporting
    IterationLimit,
    /// The last valid iterate is returned together with the cause
    Breakdown(NumericalError),
}

/// Per-iteration progress, handed to the solver's callback
#[derive(Clone, Copy, Debug)]
pub struct IterationReport<T> {
    pub iteration: usize,
    /// `‖r_k‖ / ‖r_0‖` of the normal equations
    pub relative_residual: T,
    /// `sqrt(‖b - A x_k‖² + λ ‖x_k‖²)`
    pub objective: T,
}

#[derive(Clone, Debug)]
pub struct Outcome<T: Real> {
    pub image: ImageData<T>,
    pub iterations: usize,
    pub relative_residual: T,
    /// Entry `k` belongs to `x_k`, entry 0 to the initial guess
    pub residual_history: Vec<T>,
    pub objective_history: Vec<T>,
    pub termination: Termination,
}

impl<T: Real> Outcome<T> {
    pub fn converged(&self) -> bool { self.termination == Termination::Converged }

    /// Treat numerical breakdown as an error
    pub fn into_result(self) -> Result<Self, ReconError> {
        match self.termination {
            Termination::Breakdown(e) => Err(e.into()),
            _ => Ok(self),
        }
    }
}

impl<T: Real> CgSolver<T> {

    pub fn solve<A: LinearOperator<T>>(
        &self,
        operator: &A,
        data: ArrayView3<C<T>>,
        initial: Option<ArrayView2<C<T>>>,
        mut callback: impl FnMut(&IterationReport<T>),
    ) -> Result<Outcome<T>, ReconError> {

        if data.dim() != operator.kspace_shape() {
            return Err(ReconError::shape_mismatch("solver data", operator.kspace_shape(), data.dim()));
        }
        let lambda = self.regularization;
        if !(lambda >= T::zero()) {
            return Err(crate::error::ConfigError::NegativeRegularization(lambda.to_f64().unwrap_or(f64::NAN)).into());
        }

        // -------- initial state ---------------------------------------------
        let mut x: ImageData<T> = match initial {
            Some(x0) if x0.dim() != operator.image_shape() => {
                return Err(ReconError::shape_mismatch("initial image", operator.image_shape(), x0.dim()))
            },
            Some(x0) => standard(x0.to_owned()),
            None     => ImageData::zeros(operator.image_shape()),
        };
        // s = b - A x: data-space residual, tracked for the objective
        let mut s: KspaceData<T> = standard(&data - &operator.forward(x.view()));
        // r = Aᴴ s - λ x: normal-equation residual
        let mut r = standard(operator.adjoint(s.view()));
        if lambda > T::zero() { r.zip_mut_with(&x, |r, &x| *r = *r - x * lambda) }
        let mut p = r.clone();

        let mut rr = norm_sqr(flat(&r));
        let rr0 = rr;
        let objective = |s: &KspaceData<T>, x: &ImageData<T>| (norm_sqr(flat(s)) + lambda * norm_sqr(flat(x))).sqrt();

        let mut residual_history  = vec![T::one()];
        let mut objective_history = vec![objective(&s, &x)];
        let finish = |x, iterations, residual_history: Vec<T>, objective_history, termination| {
            let relative_residual = residual_history.last().copied().unwrap_or_else(T::one);
            Ok(Outcome { image: x, iterations, relative_residual, residual_history, objective_history, termination })
        };

        if rr0 == T::zero() {
            debug!("CG: initial residual is zero");
            return finish(x, 0, vec![T::zero()], objective_history, Termination::Converged)
        }
        if !rr0.is_finite() {
            let e = NumericalError::NonFiniteResidual { iteration: 0 };
            return finish(x, 0, residual_history, objective_history, Termination::Breakdown(e))
        }

        // -------- iterate ----------------------------------------------------
        for iteration in 1..=self.max_iterations {
            let ap = standard(operator.forward(p.view()));
            let mut q = standard(operator.adjoint(ap.view()));
            if lambda > T::zero() { q.zip_mut_with(&p, |q, &p| *q = *q + p * lambda) }

            let pq = dot(flat(&p), flat(&q)).re;
            if !pq.is_finite() || pq <= T::min_positive_value() {
                let value = pq.to_f64().unwrap_or(f64::NAN);
                warn!("CG iteration {iteration}: degenerate search direction (⟨p, q⟩ = {value})");
                let e = NumericalError::DegenerateDirection { iteration, value };
                return finish(x, iteration - 1, residual_history, objective_history, Termination::Breakdown(e))
            }
            let alpha = rr / pq;
            let step = C::new(alpha, T::zero());

            // Candidate update; only committed if the new residual is sane
            let mut r_next = r.clone();
            axpy(flat_mut(&mut r_next), -step, flat(&q));
            let rr_next = norm_sqr(flat(&r_next));
            if !rr_next.is_finite() {
                warn!("CG iteration {iteration}: residual is not finite");
                let e = NumericalError::NonFiniteResidual { iteration };
                return finish(x, iteration - 1, residual_history, objective_history, Termination::Breakdown(e))
            }
            axpy(flat_mut(&mut x), step, flat(&p));
            axpy(flat_mut(&mut s), -step, flat(&ap));
            r = r_next;

            let beta = rr_next / rr;
            xpby(flat(&r), beta, flat_mut(&mut p));
            rr = rr_next;

            let relative_residual = (rr / rr0).sqrt();
            let report = IterationReport { iteration, relative_residual, objective: objective(&s, &x) };
            debug!("CG iteration {iteration}: relative residual {relative_residual}, objective {}", report.objective);
            residual_history.push(relative_residual);
            objective_history.push(report.objective);
            callback(&report);

            if relative_residual < self.tolerance {
                return finish(x, iteration, residual_history, objective_history, Termination::Converged)
            }
        }
        finish(x, self.max_iterations, residual_history, objective_history, Termination::IterationLimit)
    }
}

// All vectors handled by the solver are brought into standard layout, so that
// their flat buffers line up element by element.
fn standard<T: Real, D: ndarray::Dimension>(a: ndarray::Array<C<T>, D>) -> ndarray::Array<C<T>, D> {
    if a.is_standard_layout() { a } else { a.as_standard_layout().into_owned() }
}

fn flat<T: Real, D: ndarray::Dimension>(a: &ndarray::Array<C<T>, D>) -> &[C<T>] {
    a.as_slice().unwrap_or(&[])
}

fn flat_mut<T: Real, D: ndarray::Dimension>(a: &mut ndarray::Array<C<T>, D>) -> &mut [C<T>] {
    a.as_slice_mut().unwrap_or(&mut [])
}
