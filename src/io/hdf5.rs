/// Read radial acquisitions from, and write reconstructed images to, HDF5 files

use std::path::Path;

use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2, Ix3};

use crate::config::Config;
use crate::error::ReconError;
use crate::io::raw::RawFloat;
use crate::trajectory::{Acquisition, RawData, Trajectory};
use crate::types::{Real, C};

// HDF5 stores complex numbers as compounds with members `r` and `i`. The
// library converts between member precisions, so either pair can be used to
// read files written in either precision.
#[derive(hdf5::H5Type, Clone, Copy, PartialEq, Debug)]
#[repr(C)]
pub struct Complex32 { pub r: f32, pub i: f32 }

#[derive(hdf5::H5Type, Clone, Copy, PartialEq, Debug)]
#[repr(C)]
pub struct Complex64 { pub r: f64, pub i: f64 }

/// Float types which can be moved in and out of HDF5 datasets
pub trait Hdf5Float: RawFloat + hdf5::H5Type {
    type Pair: hdf5::H5Type + Copy;
    fn from_pair(p: Self::Pair) -> C<Self>;
    fn into_pair(z: C<Self>) -> Self::Pair;
}

impl Hdf5Float for f32 {
    type Pair = Complex32;
    fn from_pair(Complex32 { r, i }: Complex32) -> C<f32> { C::new(r, i) }
    fn into_pair(z: C<f32>) -> Complex32 { Complex32 { r: z.re, i: z.im } }
}

impl Hdf5Float for f64 {
    type Pair = Complex64;
    fn from_pair(Complex64 { r, i }: Complex64) -> C<f64> { C::new(r, i) }
    fn into_pair(z: C<f64>) -> Complex64 { Complex64 { r: z.re, i: z.im } }
}

/// Everything needed to reconstruct one slice
pub struct Input<T: Real> {
    pub acquisition: Acquisition<T>,
    /// Noise-only scan, `[coil, sample]`
    pub noise: Option<Array2<C<T>>>,
}

/// Read datasets `rawdata` (`[1,] reads, projections, coils`), `trajectory`
/// (`2, reads, projections`, arbitrary units) and, if present, `noise`
/// (`coils, samples`).
pub fn read_input<T: Hdf5Float>(path: &Path) -> Result<Input<T>, ReconError> {
    let file = hdf5::File::open(path)?;

    // ----- raw data: drop the optional leading slice axis, reorder to [coil, projection, read]
    let raw: ArrayD<C<T>> = file.dataset("rawdata")?.read_dyn::<T::Pair>()?.mapv(T::from_pair);
    let raw = match raw.ndim() {
        4 if raw.len_of(Axis(0)) == 1 => raw.index_axis_move(Axis(0), 0),
        3 => raw,
        _ => return Err(ReconError::shape_mismatch("rawdata", "[1,] reads × projections × coils", raw.shape())),
    };
    let raw = raw.into_dimensionality::<Ix3>()
        .map_err(|_| ReconError::shape_mismatch("rawdata", "3 axes", "other"))?
        .permuted_axes([2, 1, 0])
        .as_standard_layout()
        .into_owned();

    // ----- trajectory: [component, read, projection] -> [projection, read, component]
    let k: ArrayD<T> = file.dataset("trajectory")?.read_dyn::<T>()?;
    if k.ndim() != 3 || k.len_of(Axis(0)) != 2 {
        return Err(ReconError::shape_mismatch("trajectory", "2 × reads × projections", k.shape()));
    }
    let k = k.into_dimensionality::<Ix3>()
        .map_err(|_| ReconError::shape_mismatch("trajectory", "3 axes", "other"))?
        .permuted_axes([2, 1, 0])
        .as_standard_layout()
        .into_owned();

    let noise = match file.dataset("noise") {
        Ok(dataset) => {
            let noise = dataset.read_dyn::<T::Pair>()?.mapv(T::from_pair);
            let shape = noise.shape().to_vec();
            Some(noise.into_dimensionality::<Ix2>()
                 .map_err(|_| ReconError::shape_mismatch("noise", "coils × samples", shape))?)
        },
        Err(_) => None,
    };

    let acquisition = Acquisition::new(RawData::new(raw), Trajectory::from_raw(k)?)?;
    Ok(Input { acquisition, noise })
}

/// Write `image` as the complex dataset `CG_reco`
pub fn write_image<T: Hdf5Float>(path: &Path, image: ArrayView2<C<T>>) -> Result<(), ReconError> {
    let pairs = image.mapv(T::into_pair);
    hdf5::File::create(path)?
        .new_dataset_builder()
        .with_data(&pairs)
        .create("CG_reco")?;
    Ok(())
}

/// Output file name encoding the reconstruction settings
pub fn output_filename(config: &Config) -> String {
    format!("CG_reco_inscale_{}_denscor_{}_reduction_{}.h5",
            config.intensity_scaling as u8,
            config.density_compensation as u8,
            config.sampling.stride.unwrap_or(1))
}



#[cfg(test)]
mod test {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::{Array3, Array4};

    #[test]
    fn acquisition_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let (reads, projections, coils) = (4, 3, 2);
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("input.h5");
        {
            let raw = Array4::from_shape_fn((1, reads, projections, coils), |(_, r, p, c)| {
                Complex64 { r: (100 * c + 10 * p + r) as f64, i: -1.0 }
            });
            let k = Array3::from_shape_fn((2, reads, projections), |(d, r, _)| {
                if d == 0 { r as f64 - 2.0 } else { 0.0 }
            });
            let noise = Array2::from_elem((coils, 5), Complex64 { r: 0.5, i: 0.0 });
            let file = hdf5::File::create(&path)?;
            file.new_dataset_builder().with_data(&raw  ).create("rawdata"   )?;
            file.new_dataset_builder().with_data(&k    ).create("trajectory")?;
            file.new_dataset_builder().with_data(&noise).create("noise"     )?;
        }
        let Input { acquisition, noise } = read_input::<f32>(&path)?;
        assert_eq!(acquisition.raw.view().dim(), (coils, projections, reads));
        assert_eq!(acquisition.raw.view()[[1, 2, 3]], C::new(123.0, -1.0));
        // Largest |k| is 2: normalized to 0.5
        assert_float_eq!(acquisition.trajectory.view()[[0, 0, 0]], -0.5, ulps <= 1);
        assert_eq!(noise.map(|n| n.dim()), Some((coils, 5)));
        Ok(())
    }

    #[test]
    fn image_is_written_as_cg_reco() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.h5");
        let image = Array2::from_shape_fn((3, 3), |(y, x)| C::new(y as f64, x as f64));
        write_image(&path, image.view())?;
        let back = hdf5::File::open(&path)?.dataset("CG_reco")?.read_2d::<Complex64>()?;
        assert_eq!(back[[2, 1]], Complex64 { r: 2.0, i: 1.0 });
        Ok(())
    }

    #[test]
    fn filename_encodes_settings() {
        let mut config = Config::default();
        config.density_compensation = false;
        config.sampling.stride = Some(4);
        assert_eq!(output_filename(&config), "CG_reco_inscale_1_denscor_0_reduction_4.h5");
    }
}
