/// Read / write complex arrays as raw binary: interleaved little-endian
/// `(re, im)` pairs in the precision of the data

use std::fs::File;
use std::io::{Write, Read, BufWriter, BufReader};
use std::path::Path;

use crate::types::{Real, C};

/// Float types with a fixed little-endian byte representation
pub trait RawFloat: Real {
    const BYTES: usize;
    fn write_le(self, out: &mut impl Write) -> std::io::Result<()>;
    fn from_le(bytes: &[u8]) -> Self;
}

impl RawFloat for f32 {
    const BYTES: usize = 4;
    fn write_le(self, out: &mut impl Write) -> std::io::Result<()> { out.write_all(&self.to_le_bytes()) }
    fn from_le(bytes: &[u8]) -> Self {
        let mut b = [0; 4];
        b.copy_from_slice(&bytes[..4]);
        f32::from_le_bytes(b)
    }
}

impl RawFloat for f64 {
    const BYTES: usize = 8;
    fn write_le(self, out: &mut impl Write) -> std::io::Result<()> { out.write_all(&self.to_le_bytes()) }
    fn from_le(bytes: &[u8]) -> Self {
        let mut b = [0; 8];
        b.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(b)
    }
}

pub fn write_complex<'a, T: RawFloat>(data: impl IntoIterator<Item = &'a C<T>>, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut buf = BufWriter::new(file);
    for z in data {
        z.re.write_le(&mut buf)?;
        z.im.write_le(&mut buf)?;
    }
    buf.flush()
}

type IORes<T> = std::io::Result<T>;
pub fn read_complex<'a, T: RawFloat>(path: &Path) -> IORes<impl Iterator<Item = IORes<C<T>>> + 'a> {
    let file = File::open(path)?;
    let mut buf = BufReader::new(file);
    let mut buffer = vec![0; 2 * T::BYTES];

    Ok(std::iter::from_fn(move || {
        use std::io::ErrorKind::UnexpectedEof;
        match buf.read_exact(&mut buffer) {
            Ok(()) => Some(Ok(C::new(T::from_le(&buffer[..T::BYTES]), T::from_le(&buffer[T::BYTES..])))),
            Err(e) if e.kind() == UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip<T: RawFloat>(original_data: Vec<C<T>>) -> std::io::Result<()> {
        use tempfile::tempdir;
        #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

        // Harmless temporary location for output file
        let dir = tempdir()?;
        let file_path = dir.path().join("test.bin");

        // Write data to file
        write_complex(original_data.iter(), &file_path)?;
        assert_eq!(std::fs::metadata(&file_path)?.len() as usize, original_data.len() * 2 * T::BYTES);

        // Read data back from file
        let reloaded_data: Vec<C<T>> = read_complex(&file_path)?
            .collect::<Result<_, _>>()?;

        // Check that roundtrip didn't corrupt the data
        assert_eq!(original_data, reloaded_data);
        Ok(())
    }

    #[test]
    fn raw_io_roundtrip_single() -> std::io::Result<()> {
        roundtrip(vec![C::new(1.23_f32, -4.56), C::new(7.89, 0.0)])
    }

    #[test]
    fn raw_io_roundtrip_double() -> std::io::Result<()> {
        roundtrip(vec![C::new(1.23_f64, -4.56), C::new(f64::MIN_POSITIVE, 1e300)])
    }
}
