//! MTZ writing: the preamble record, the native-endian float32 data
//! block, and the fixed-width header records in format order.
//!
//! Per-column value ranges and the RESO bounds are recomputed from the
//! live data (NaNs ignored); the header copies of those values are not
//! trusted. A model without data or without a resolved space group cannot
//! be written.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, NativeEndian};

use super::{Mtz, MtzError};

impl Mtz {
    pub fn write_to_stream<W: Write>(&self, stream: &mut W) -> Result<(), MtzError> {
        if !self.has_data() {
            return Err(MtzError::NoData);
        }
        let sg = self.spacegroup.ok_or(MtzError::NoSpaceGroup)?;

        // Preamble: magic, header offset in words, machine stamp.
        let mut preamble = [b' '; 80];
        preamble[..4].copy_from_slice(b"MTZ ");
        let header_start = self.ncol * self.nreflections + 21;
        preamble[4..8].copy_from_slice(&header_start.to_ne_bytes());
        let machine_stamp: i32 = if cfg!(target_endian = "little") {
            0x0000_4144
        } else {
            0x1111_0000
        };
        preamble[8..12].copy_from_slice(&machine_stamp.to_ne_bytes());
        stream.write_all(&preamble)?;

        let mut raw = vec![0u8; 4 * self.data.len()];
        NativeEndian::write_f32_into(&self.data, &mut raw);
        stream.write_all(&raw)?;

        write_record(stream, "VERS MTZ:V1.1")?;
        write_record(stream, &format!("TITLE {}", self.title))?;
        write_record(
            stream,
            &format!("NCOL {:8} {:12} {:8}", self.ncol, self.nreflections, self.nbatches),
        )?;
        if self.cell.is_crystal() {
            write_record(
                stream,
                &format!(
                    "CELL  {:9.4} {:9.4} {:9.4} {:9.4} {:9.4} {:9.4}",
                    self.cell.a, self.cell.b, self.cell.c,
                    self.cell.alpha, self.cell.beta, self.cell.gamma
                ),
            )?;
        }
        write_record(
            stream,
            &format!(
                "SORT  {:3} {:3} {:3} {:3} {:3}",
                self.sort_order[0], self.sort_order[1], self.sort_order[2],
                self.sort_order[3], self.sort_order[4]
            ),
        )?;
        let ops = sg.operations();
        write_record(
            stream,
            &format!(
                "SYMINF {:3} {:2} {} {:5} {:>pad$}'{}' PG{}",
                ops.order(),
                ops.sym_ops.len(),
                sg.lattice_type(),
                sg.ccp4_number,
                "",
                sg.hm,
                sg.point_group_hm(),
                pad = 20usize.saturating_sub(sg.hm.len()),
            ),
        )?;
        for op in ops.iter() {
            write_record(stream, &format!("SYMM {}", op.triplet().to_ascii_uppercase()))?;
        }
        let reso = self.calculate_min_max_1_d2()?;
        write_record(stream, &format!("RESO {:<20.12} {:<20.12}", reso[0], reso[1]))?;
        if self.valm.is_nan() {
            write_record(stream, "VALM NAN")?;
        } else {
            write_record(stream, &format!("VALM {:.6}", self.valm))?;
        }
        for col in &self.columns {
            let (min, max) = min_max_disregarding_nans(self.column_values(col.idx));
            write_record(
                stream,
                &format!(
                    "COLUMN {:<30} {} {:>17} {:>17} {:4}",
                    col.label,
                    col.col_type,
                    format_g(min, 9),
                    format_g(max, 9),
                    col.dataset_id
                ),
            )?;
            if !col.source.is_empty() {
                write_record(
                    stream,
                    &format!("COLSRC {:<30} {:<36}  {:4}", col.label, col.source, col.dataset_id),
                )?;
            }
        }
        write_record(stream, &format!("NDIF {:8}", self.datasets.len()))?;
        for ds in &self.datasets {
            write_record(stream, &format!("PROJECT {:7} {}", ds.id, ds.project_name))?;
            write_record(stream, &format!("CRYSTAL {:7} {}", ds.id, ds.crystal_name))?;
            write_record(stream, &format!("DATASET {:7} {}", ds.id, ds.dataset_name))?;
            write_record(
                stream,
                &format!(
                    "DCELL {:9} {:10.4}{:10.4}{:10.4}{:10.4}{:10.4}{:10.4}",
                    ds.id, ds.cell.a, ds.cell.b, ds.cell.c,
                    ds.cell.alpha, ds.cell.beta, ds.cell.gamma
                ),
            )?;
            write_record(stream, &format!("DWAVEL {:8} {:10.5}", ds.id, ds.wavelength))?;
        }
        write_record(stream, "END")?;
        if !self.history.is_empty() {
            // The format allows at most 30 history lines; like the reader's
            // producers, the writer does not enforce the cap.
            write_record(stream, &format!("MTZHIST {:3}", self.history.len()))?;
            for line in &self.history {
                write_record(stream, line)?;
            }
        }
        write_record(stream, "MTZENDOFHEADERS")?;
        Ok(())
    }

    /// Write to a file, prefixing errors with the path.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), MtzError> {
        let path = path.as_ref();
        let wrap = |e: MtzError| MtzError::File {
            path: path.display().to_string(),
            source: Box::new(e),
        };
        let file = File::create(path).map_err(|e| wrap(MtzError::Io(e)))?;
        let mut writer = BufWriter::new(file);
        self.write_to_stream(&mut writer).map_err(wrap)?;
        writer.flush().map_err(|e| wrap(MtzError::Io(e)))
    }
}

/// Space-pad to exactly 80 bytes and emit. Longer text is clipped.
fn write_record<W: Write>(stream: &mut W, text: &str) -> Result<(), MtzError> {
    let mut record = [b' '; 80];
    let bytes = text.as_bytes();
    let n = bytes.len().min(80);
    record[..n].copy_from_slice(&bytes[..n]);
    stream.write_all(&record)?;
    Ok(())
}

/// Min and max of the non-NaN values; (NaN, NaN) when every value is NaN.
fn min_max_disregarding_nans(values: impl Iterator<Item = f32>) -> (f32, f32) {
    let mut min = f32::NAN;
    let mut max = f32::NAN;
    for v in values {
        if v.is_nan() {
            continue;
        }
        if min.is_nan() {
            min = v;
            max = v;
        } else if v < min {
            min = v;
        } else if v > max {
            max = v;
        }
    }
    (min, max)
}

/// Compact float formatting after printf's `%g`: fixed notation for
/// moderate exponents, scientific otherwise, trailing zeros stripped,
/// `precision` significant digits.
fn format_g(value: f32, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let p = precision.max(1) as i32;
    let exponent = f64::from(value).abs().log10().floor() as i32;
    if exponent < -4 || exponent >= p {
        let mantissa_digits = (p - 1) as usize;
        let s = format!("{value:.mantissa_digits$e}");
        match s.split_once('e') {
            Some((mantissa, exp)) => {
                format!("{}e{}", strip_trailing_zeros(mantissa), exp)
            }
            None => s,
        }
    } else {
        let decimals = (p - 1 - exponent).max(0) as usize;
        strip_trailing_zeros(&format!("{value:.decimals$}")).to_string()
    }
}

fn strip_trailing_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
