//! Conversion between 1d and 2d indices, and between centred (signed)
//! frequency/position indices and their locations in DFT-ordered arrays.

pub type Index1 = usize;
pub type Index2 = [usize; 2];
pub type Dim2   = [usize; 2];

use std::ops::{Add, Div, Mul, Rem};

/// Row-major: `[row, column]` with columns varying fastest
pub fn index2_to_1<T>([iy, ix]: [T; 2], [_ny, nx]: [T; 2]) -> T
where
    T: Mul<Output = T> + Add<Output = T>
{
    ix + iy * nx
}

pub fn index1_to_2<T>(i: T, [_ny, nx]: [T; 2]) -> [T; 2]
where
    T: Div<Output = T> +
    Rem<Output = T> +
    Copy
{
    [i / nx, i % nx]
}

/// Position in a DFT-ordered array of length `n` of the signed index `m`
/// (zero frequency at position 0, negative indices wrapped to the end).
#[inline]
pub fn wrap(m: isize, n: usize) -> usize {
    m.rem_euclid(n as isize) as usize
}

/// Signed index of pixel `i` of an image of size `n`, whose centre (pixel
/// `n/2`) sits at the origin.
#[inline]
pub fn centred(i: usize, n: usize) -> isize {
    i as isize - (n / 2) as isize
}

/// Position in a DFT-ordered oversampled grid of size `n_grid`, of pixel `i`
/// of the centred image of size `n_image`.
#[inline]
pub fn image_to_grid(i: usize, n_image: usize, n_grid: usize) -> usize {
    wrap(centred(i, n_image), n_grid)
}
