//! Machine snapshots in a small versioned binary format.
//!
//! Layout, all integers and floats little-endian, read strictly in order:
//!
//! ```text
//! magic   "NQSS"            4 bytes
//! version u32               currently 1
//! scalar  u8                components per entry: 1 real, 2 complex
//! bias    u8                0 or 1
//! visible u32
//! hidden  u32
//! w       u64 count, then count × components × f64   (column-major)
//! a       u64 count, then count × components × f64
//! b       u64 count, then count × components × f64
//! ```
//!
//! Every array carries its own length prefix, so a reader can validate the
//! stream against the header without seeking.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::Context;
use nalgebra::{DMatrix, DVector};

use crate::wavefunction::{Rbm, Scalar};

const MAGIC: [u8; 4] = *b"NQSS";
const VERSION: u32 = 1;

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f64<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn bad_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn write_block<T: Scalar, W: Write>(w: &mut W, data: &[T]) -> io::Result<()> {
    write_u64(w, data.len() as u64)?;
    for entry in data {
        let (re, im) = entry.to_parts();
        write_f64(w, re)?;
        if T::COMPONENTS == 2 {
            write_f64(w, im)?;
        }
    }
    Ok(())
}

fn read_block<T: Scalar, R: Read>(r: &mut R, expect: usize) -> io::Result<Vec<T>> {
    let count = read_u64(r)? as usize;
    if count != expect {
        return Err(bad_data(format!(
            "snapshot block holds {} entries, expected {}",
            count, expect
        )));
    }
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let re = read_f64(r)?;
        let im = if T::COMPONENTS == 2 { read_f64(r)? } else { 0.0 };
        out.push(T::from_parts(re, im));
    }
    Ok(out)
}

/// Serialize a machine.
pub fn save_machine<T: Scalar, W: Write>(writer: &mut W, machine: &Rbm<T>) -> io::Result<()> {
    writer.write_all(&MAGIC)?;
    write_u32(writer, VERSION)?;
    writer.write_all(&[T::COMPONENTS as u8, u8::from(machine.uses_bias())])?;
    write_u32(writer, machine.visible() as u32)?;
    write_u32(writer, machine.hidden() as u32)?;
    write_block(writer, machine.get_w().as_slice())?;
    write_block(writer, machine.get_a().as_slice())?;
    write_block(writer, machine.get_b().as_slice())?;
    Ok(())
}

/// Deserialize a machine; the scalar type must match the one saved.
pub fn load_machine<T: Scalar, R: Read>(reader: &mut R) -> io::Result<Rbm<T>> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(bad_data("not a machine snapshot (bad magic)"));
    }
    let version = read_u32(reader)?;
    if version != VERSION {
        return Err(bad_data(format!("unsupported snapshot version {}", version)));
    }
    let components = read_u8(reader)? as usize;
    if components != T::COMPONENTS {
        return Err(bad_data(format!(
            "snapshot stores {}-component parameters, machine expects {}",
            components,
            T::COMPONENTS
        )));
    }
    let use_bias = match read_u8(reader)? {
        0 => false,
        1 => true,
        other => return Err(bad_data(format!("invalid bias flag {}", other))),
    };
    let n = read_u32(reader)? as usize;
    let m = read_u32(reader)? as usize;
    if n == 0 || m == 0 {
        return Err(bad_data("snapshot with empty machine dimensions"));
    }

    let w = read_block::<T, _>(reader, n * m)?;
    let a = read_block::<T, _>(reader, n)?;
    let b = read_block::<T, _>(reader, m)?;

    Ok(Rbm::from_parts(
        use_bias,
        DMatrix::from_vec(m, n, w),
        DVector::from_vec(a),
        DVector::from_vec(b),
    ))
}

/// Write a snapshot file, replacing any existing one.
pub fn save_machine_to_path<T: Scalar, P: AsRef<Path>>(
    path: P,
    machine: &Rbm<T>,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    save_machine(&mut writer, machine)?;
    writer.flush()
}

/// Read a snapshot file.
pub fn load_machine_from_path<T: Scalar, P: AsRef<Path>>(path: P) -> io::Result<Rbm<T>> {
    let mut reader = BufReader::new(File::open(path)?);
    load_machine(&mut reader)
}

/// Write the machine as YAML, for inspection. Resumption goes through the
/// binary snapshot.
pub fn dump_machine_yaml<T, P>(path: P, machine: &Rbm<T>) -> anyhow::Result<()>
where
    T: Scalar + serde::Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let text = serde_yaml::to_string(machine)?;
    std::fs::write(path, text)
        .with_context(|| format!("cannot write machine dump {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Cursor;

    fn saved_bytes<T: Scalar>(machine: &Rbm<T>) -> Vec<u8> {
        let mut buf = Vec::new();
        save_machine(&mut buf, machine).unwrap();
        buf
    }

    #[test]
    fn test_round_trip_real() {
        let mut qs = Rbm::<f64>::new(5, 7, true);
        qs.init_random(&mut StdRng::seed_from_u64(601), 0.3);
        let bytes = saved_bytes(&qs);
        let loaded: Rbm<f64> = load_machine(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(loaded, qs);
    }

    #[test]
    fn test_round_trip_complex_no_bias() {
        let mut qs = Rbm::<Complex64>::new(4, 6, false);
        qs.init_random(&mut StdRng::seed_from_u64(611), 0.2);
        let bytes = saved_bytes(&qs);
        let loaded: Rbm<Complex64> = load_machine(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(loaded, qs);
        assert!(!loaded.uses_bias());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let qs = Rbm::<f64>::new(3, 3, true);
        let mut bytes = saved_bytes(&qs);
        bytes[0] = b'X';
        let err = load_machine::<f64, _>(&mut Cursor::new(&bytes)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_future_version() {
        let qs = Rbm::<f64>::new(3, 3, true);
        let mut bytes = saved_bytes(&qs);
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        let err = load_machine::<f64, _>(&mut Cursor::new(&bytes)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_scalar_mismatch() {
        let mut qs = Rbm::<f64>::new(3, 3, true);
        qs.init_random(&mut StdRng::seed_from_u64(621), 0.1);
        let bytes = saved_bytes(&qs);
        let err = load_machine::<Complex64, _>(&mut Cursor::new(&bytes)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_truncated_stream() {
        let mut qs = Rbm::<f64>::new(4, 4, true);
        qs.init_random(&mut StdRng::seed_from_u64(631), 0.1);
        let bytes = saved_bytes(&qs);
        let err =
            load_machine::<f64, _>(&mut Cursor::new(&bytes[..bytes.len() - 5])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_yaml_dump_round_trips() {
        let mut qs = Rbm::<f64>::new(3, 4, true);
        qs.init_random(&mut StdRng::seed_from_u64(641), 0.2);
        let path = std::env::temp_dir().join("nqs_rbm_dump_test.yml");
        dump_machine_yaml(&path, &qs).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let loaded: Rbm<f64> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(loaded, qs);
    }
}
