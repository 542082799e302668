//! MTZ reading: the fixed-offset preamble, the 80-byte ASCII header
//! records, and the raw float32 reflection block.
//!
//! Header records are dispatched on their first four alphanumeric
//! characters, case-insensitively. Malformed numeric fields inside a
//! recognized record parse leniently (a number prefix, else zero);
//! structural problems (bad magic, short preamble, NCOL/COLUMN mismatch)
//! are fatal.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{Column, Dataset, Mtz, MtzError};
use crate::sym;
use crate::types::cell::UnitCell;

/// Read an MTZ file from any seekable stream. With `with_data` the raw
/// reflection block is loaded as well; otherwise only headers are read.
pub fn read_mtz_stream<R: Read + Seek>(stream: &mut R, with_data: bool) -> Result<Mtz, MtzError> {
    let mut mtz = Mtz::default();
    mtz.read_first_bytes(stream)?;
    mtz.read_main_headers(stream)?;
    mtz.read_history_and_batch_headers(stream)?;
    mtz.setup_spacegroup();
    if with_data {
        mtz.read_raw_data(stream)?;
    }
    Ok(mtz)
}

/// Read an MTZ file, including its data block. Errors are prefixed with
/// the path.
pub fn read_mtz_file<P: AsRef<Path>>(path: P) -> Result<Mtz, MtzError> {
    let path = path.as_ref();
    let wrap = |e: MtzError| MtzError::File {
        path: path.display().to_string(),
        source: Box::new(e),
    };
    let file = File::open(path).map_err(|e| wrap(MtzError::Io(e)))?;
    let mut reader = BufReader::new(file);
    read_mtz_stream(&mut reader, true).map_err(wrap)
}

impl Mtz {
    /// Parse the 12 meaningful preamble bytes: magic, header offset and
    /// machine stamp. A stamp disagreeing with the host byte order flips
    /// `same_byte_order`; stamp values other than the big-endian and
    /// little-endian codes are treated as native.
    fn read_first_bytes<R: Read>(&mut self, stream: &mut R) -> Result<(), MtzError> {
        let mut buf = [0u8; 12];
        read_exact_or(stream, &mut buf, "the MTZ file preamble")?;
        if &buf[0..4] != b"MTZ " {
            return Err(MtzError::NotMtz);
        }
        // The machine stamp's first half-byte is the real-number format:
        // 1 = big endian, 4 = little endian. Only the all-BE and all-LE
        // combinations are handled.
        let foreign_code = if cfg!(target_endian = "little") { 0x10 } else { 0x40 };
        if buf[9] & 0xf0 == foreign_code {
            self.toggle_endianness();
        }
        self.header_offset = i32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if !self.same_byte_order {
            self.header_offset = self.header_offset.swap_bytes();
        }
        Ok(())
    }

    /// Read 80-byte records until END; dispatch each to
    /// `parse_main_header`.
    fn read_main_headers<R: Read + Seek>(&mut self, stream: &mut R) -> Result<(), MtzError> {
        if self.header_offset < 1 {
            return Err(MtzError::Inconsistent(format!(
                "bad header offset: {}",
                self.header_offset
            )));
        }
        stream.seek(SeekFrom::Start(4 * (self.header_offset as u64 - 1)))?;
        let mut buf = [0u8; 80];
        while read_record(stream, &mut buf)? {
            let line = String::from_utf8_lossy(&buf);
            if tag4(&line)[..3] == *b"END" {
                break;
            }
            self.parse_main_header(&line)?;
        }
        if self.ncol != self.columns.len() as i32 {
            return Err(MtzError::Inconsistent(
                "number of COLUMN records inconsistent with NCOL record".to_string(),
            ));
        }
        Ok(())
    }

    fn parse_main_header(&mut self, line: &str) -> Result<(), MtzError> {
        let mut fields = Fields::after_tag(line);
        match &tag4(line) {
            b"VERS" => self.version_stamp = rtrim(fields.rest.trim_start()).to_string(),
            b"TITL" => self.title = rtrim(fields.rest.trim_start()).to_string(),
            b"NCOL" => {
                self.ncol = fields.next_int();
                self.nreflections = fields.next_int();
                self.nbatches = fields.next_int();
            }
            b"CELL" => self.cell = read_cell_parameters(&mut fields),
            b"SORT" => {
                for slot in &mut self.sort_order {
                    *slot = fields.next_int();
                }
            }
            b"SYMI" => {
                self.nsymop = fields.next_int();
                if self.nsymop > 0 {
                    self.symops.reserve(self.nsymop as usize);
                }
                fields.next_int(); // number of primitive operations
                fields.next_word(); // lattice type letter
                self.spacegroup_number = fields.next_int();
                let rest = fields.rest.trim_start();
                self.spacegroup_name = if let Some(quoted) = rest.strip_prefix('\'') {
                    quoted
                        .split('\'')
                        .next()
                        .unwrap_or("")
                        .to_string()
                } else {
                    rest.split_whitespace().next().unwrap_or("").to_string()
                };
                // The point group at the end of the record is ignored.
            }
            b"SYMM" => {
                let op = sym::parse_triplet(fields.rest)
                    .map_err(|e| MtzError::BadSymmetry(e.to_string()))?;
                self.symops.push(op);
            }
            b"RESO" => {
                self.min_1_d2 = fields.next_f64();
                self.max_1_d2 = fields.next_f64();
            }
            b"VALM" => {
                let arg = fields.rest.trim_start();
                if !arg.starts_with('N') {
                    match fields.next_word().unwrap_or("").parse::<f32>() {
                        Ok(v) => self.valm = v,
                        Err(_) => self.warn(format!("Unexpected VALM value: {}", rtrim(arg))),
                    }
                }
            }
            b"COLU" => {
                let label = fields.next_word().unwrap_or("").to_string();
                let col_type = fields.next_word().unwrap_or("").chars().next().unwrap_or(' ');
                let min_value = fields.next_f64() as f32;
                let max_value = fields.next_f64() as f32;
                let dataset_id = fields.next_int();
                self.columns.push(Column {
                    dataset_id,
                    col_type,
                    label,
                    min_value,
                    max_value,
                    source: String::new(),
                    idx: self.columns.len(),
                });
            }
            b"COLS" => {
                fields.next_word(); // label, already known from COLUMN
                let source = fields.next_word().unwrap_or("").to_string();
                match self.columns.last_mut() {
                    Some(col) => col.source = source,
                    None => {
                        return Err(MtzError::Inconsistent(
                            "COLSRC before any COLUMN record".to_string(),
                        ))
                    }
                }
            }
            b"COLG" => {} // column group, not used
            b"NDIF" => {
                let n = fields.next_int();
                if n > 0 {
                    self.datasets.reserve(n as usize);
                }
            }
            b"PROJ" => {
                let id = fields.next_int();
                let project_name = fields.next_word().unwrap_or("").to_string();
                self.datasets.push(Dataset {
                    id,
                    project_name,
                    wavelength: 0.0,
                    ..Dataset::default()
                });
            }
            b"CRYS" => {
                if fields.next_int() == self.last_dataset_mut()?.id {
                    let name = fields.next_word().unwrap_or("").to_string();
                    self.last_dataset_mut()?.crystal_name = name;
                } else {
                    self.warn("MTZ CRYSTAL line: unusual numbering.".to_string());
                }
            }
            b"DATA" => {
                if fields.next_int() == self.last_dataset_mut()?.id {
                    let name = fields.next_word().unwrap_or("").to_string();
                    self.last_dataset_mut()?.dataset_name = name;
                } else {
                    self.warn("MTZ DATASET line: unusual numbering.".to_string());
                }
            }
            b"DCEL" => {
                if fields.next_int() == self.last_dataset_mut()?.id {
                    let cell = read_cell_parameters(&mut fields);
                    self.last_dataset_mut()?.cell = cell;
                } else {
                    self.warn("MTZ DCELL line: unusual numbering.".to_string());
                }
            }
            b"DWAV" => {
                if fields.next_int() == self.last_dataset_mut()?.id {
                    let wavelength = fields.next_f64();
                    self.last_dataset_mut()?.wavelength = wavelength;
                } else {
                    self.warn("MTZ DWAVEL line: unusual numbering.".to_string());
                }
            }
            b"BATC" => {} // BATCH, carries no information used here
            _ => self.warn(format!("Unknown header: {}", rtrim(line))),
        }
        Ok(())
    }

    /// Read the records between END and MTZENDOFHEADERS: history lines
    /// announced by MTZHIST, and batch blocks (MTZBATS) which are skipped.
    fn read_history_and_batch_headers<R: Read>(&mut self, stream: &mut R) -> Result<(), MtzError> {
        let mut buf = [0u8; 80];
        let mut pending = 0i32;
        while read_record(stream, &mut buf)? {
            let line = String::from_utf8_lossy(&buf);
            let tag = tag4(&line);
            if tag == *b"MTZE" {
                break;
            }
            if pending != 0 {
                self.history.push(trim_record(&line));
                pending -= 1;
            } else if tag == *b"MTZH" {
                pending = Fields::after_tag(&line).next_int();
                if !(0..=30).contains(&pending) {
                    self.warn(
                        "Wrong MTZ: number of headers should be between 0 and 30".to_string(),
                    );
                    return Ok(());
                }
                self.history.reserve(pending as usize);
            } else if tag == *b"MTZB" {
                // Batch headers (one block per batch) are not parsed.
            }
        }
        Ok(())
    }

    /// Resolve `spacegroup_name` against the space-group table; both an
    /// unknown name and a name/number mismatch are warnings only.
    fn setup_spacegroup(&mut self) {
        self.spacegroup = sym::find_spacegroup_by_name(&self.spacegroup_name);
        match self.spacegroup {
            None => {
                let name = self.spacegroup_name.clone();
                self.warn(format!("MTZ: unrecognized spacegroup name: {name}"));
            }
            Some(sg) if sg.ccp4_number != self.spacegroup_number => {
                self.warn("MTZ: inconsistent spacegroup name and number".to_string());
            }
            _ => {}
        }
    }

    /// Load the raw float32 block from byte 80, converting byte order in
    /// bulk when the file and host disagree. NaN payloads survive as-is.
    fn read_raw_data<R: Read + Seek>(&mut self, stream: &mut R) -> Result<(), MtzError> {
        if self.ncol < 0 || self.nreflections < 0 {
            return Err(MtzError::Inconsistent(format!(
                "negative data shape: {} x {}",
                self.ncol, self.nreflections
            )));
        }
        let n = self.ncol as usize * self.nreflections as usize;
        stream.seek(SeekFrom::Start(80))?;
        let mut raw = vec![0u8; 4 * n];
        read_exact_or(stream, &mut raw, "the MTZ data block")?;
        self.data = vec![0.0f32; n];
        let file_is_le = self.same_byte_order == cfg!(target_endian = "little");
        if file_is_le {
            LittleEndian::read_f32_into(&raw, &mut self.data);
        } else {
            BigEndian::read_f32_into(&raw, &mut self.data);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record and field scanning helpers
// ---------------------------------------------------------------------------

/// First four alphanumeric characters of a record, upper-cased and
/// zero-padded: the dispatch key.
fn tag4(line: &str) -> [u8; 4] {
    let mut tag = [0u8; 4];
    let mut bytes = line.bytes().take_while(u8::is_ascii_alphanumeric);
    for slot in &mut tag {
        match bytes.next() {
            Some(b) => *slot = b.to_ascii_uppercase(),
            None => break,
        }
    }
    tag
}

/// Read one 80-byte record; false on clean end of input. A final partial
/// record also ends the stream quietly.
fn read_record<R: Read>(stream: &mut R, buf: &mut [u8; 80]) -> Result<bool, MtzError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(true)
}

fn read_exact_or<R: Read>(
    stream: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), MtzError> {
    stream.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            MtzError::Truncated(what)
        } else {
            MtzError::Io(e)
        }
    })
}

fn read_cell_parameters(fields: &mut Fields) -> UnitCell {
    let a = fields.next_f64();
    let b = fields.next_f64();
    let c = fields.next_f64();
    let alpha = fields.next_f64();
    let beta = fields.next_f64();
    let gamma = fields.next_f64();
    UnitCell::new(a, b, c, alpha, beta, gamma)
}

/// Strip trailing whitespace and NUL padding.
fn rtrim(s: &str) -> &str {
    s.trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
}

/// History lines keep internal spacing but lose leading blanks and
/// trailing padding.
fn trim_record(line: &str) -> String {
    rtrim(line.trim_start_matches([' ', '\t'])).to_string()
}

/// Whitespace-separated field cursor over one header record. Numeric
/// fields parse the longest sensible prefix and fall back to zero, the
/// lenient convention of the format's readers.
struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    /// Cursor positioned after the record's leading tag word.
    fn after_tag(line: &'a str) -> Self {
        let mut fields = Fields { rest: line };
        fields.next_word();
        fields
    }

    fn next_word(&mut self) -> Option<&'a str> {
        let start = self.rest.trim_start();
        if start.is_empty() {
            self.rest = start;
            return None;
        }
        let end = start.find(char::is_whitespace).unwrap_or(start.len());
        let (word, rest) = start.split_at(end);
        self.rest = rest;
        Some(word)
    }

    fn next_int(&mut self) -> i32 {
        let word = self.next_word().unwrap_or("");
        let prefix = numeric_prefix(word, false);
        prefix.parse().unwrap_or(0)
    }

    fn next_f64(&mut self) -> f64 {
        let word = self.next_word().unwrap_or("");
        let prefix = numeric_prefix(word, true);
        // Full words like "nan" or "inf" are still meaningful floats.
        prefix.parse().or_else(|_| word.parse()).unwrap_or(0.0)
    }
}

fn numeric_prefix(word: &str, float: bool) -> &str {
    let bytes = word.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if float {
        if end < bytes.len() && bytes[end] == b'.' {
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
            let mut exp = end + 1;
            if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
                exp += 1;
            }
            let digits = exp;
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            if exp > digits {
                end = exp;
            }
        }
    }
    &word[..end]
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Append one space-padded 80-byte header record.
    pub fn push_record(bytes: &mut Vec<u8>, text: &str) {
        let mut record = [b' '; 80];
        record[..text.len()].copy_from_slice(text.as_bytes());
        bytes.extend_from_slice(&record);
    }

    /// Minimal single-reflection MTZ: columns H K L F PHIC, space group
    /// P 1, cell 10 10 10 90 90 90, reflection (1,0,0) with F=100 and
    /// phase 90 degrees.
    pub fn minimal_mtz() -> Vec<u8> {
        build_mtz(true, &[[1.0, 0.0, 0.0, 100.0, 90.0]])
    }

    /// Assemble a five-column MTZ with the given reflections, in either
    /// byte order.
    pub fn build_mtz(little_endian: bool, reflections: &[[f32; 5]]) -> Vec<u8> {
        let ncol = 5;
        let nref = reflections.len() as i32;
        let mut bytes = Vec::new();
        let mut preamble = [b' '; 80];
        preamble[..4].copy_from_slice(b"MTZ ");
        let header_offset = ncol * nref + 21;
        let put_i32 = |dst: &mut [u8], v: i32| {
            dst.copy_from_slice(&if little_endian { v.to_le_bytes() } else { v.to_be_bytes() });
        };
        put_i32(&mut preamble[4..8], header_offset);
        preamble[8..12].copy_from_slice(if little_endian {
            &[0x44, 0x41, 0x00, 0x00]
        } else {
            &[0x11, 0x11, 0x00, 0x00]
        });
        bytes.extend_from_slice(&preamble);
        for row in reflections {
            for &v in row {
                let b = if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
                bytes.extend_from_slice(&b);
            }
        }
        push_record(&mut bytes, "VERS MTZ:V1.1");
        push_record(&mut bytes, "TITLE test file");
        push_record(&mut bytes, &format!("NCOL {ncol:8} {nref:12}        0"));
        push_record(
            &mut bytes,
            "CELL     10.0000   10.0000   10.0000   90.0000   90.0000   90.0000",
        );
        push_record(&mut bytes, "SORT    1   2   3   0   0");
        push_record(&mut bytes, "SYMINF   1  1 P     1                 'P 1' PG1");
        push_record(&mut bytes, "SYMM X,Y,Z");
        push_record(&mut bytes, "RESO 0.010000             0.010000");
        push_record(&mut bytes, "VALM NAN");
        push_record(&mut bytes, "COLUMN H                              H        1        1    0");
        push_record(&mut bytes, "COLUMN K                              H        0        0    0");
        push_record(&mut bytes, "COLUMN L                              H        0        0    0");
        push_record(&mut bytes, "COLUMN F                              F      100      100    1");
        push_record(&mut bytes, "COLUMN PHIC                           P       90       90    1");
        push_record(&mut bytes, "COLSRC F                              refmac                1");
        push_record(&mut bytes, "NDIF        1");
        push_record(&mut bytes, "PROJECT       1 project");
        push_record(&mut bytes, "CRYSTAL       1 crystal");
        push_record(&mut bytes, "DATASET       1 dataset");
        push_record(
            &mut bytes,
            "DCELL         1    10.0000   10.0000   10.0000   90.0000   90.0000   90.0000",
        );
        push_record(&mut bytes, "DWAVEL        1    1.00000");
        push_record(&mut bytes, "END");
        push_record(&mut bytes, "MTZENDOFHEADERS");
        bytes
    }

    pub fn read_bytes(bytes: &[u8]) -> Result<Mtz, MtzError> {
        read_mtz_stream(&mut Cursor::new(bytes), true)
    }

    #[test]
    fn reads_minimal_file() {
        let mtz = read_bytes(&minimal_mtz()).unwrap();
        assert_eq!(mtz.ncol, 5);
        assert_eq!(mtz.nreflections, 1);
        assert_eq!(mtz.columns.len(), 5);
        assert_eq!(mtz.header_offset, 26);
        assert!(mtz.same_byte_order == cfg!(target_endian = "little"));
        assert_eq!(mtz.title, "test file");
        assert_eq!(mtz.version_stamp, "MTZ:V1.1");
        assert_eq!(mtz.sort_order, [1, 2, 3, 0, 0]);
        assert_eq!(mtz.cell.a, 10.0);
        assert_eq!(mtz.spacegroup_name, "P 1");
        assert_eq!(mtz.spacegroup_number, 1);
        assert_eq!(mtz.spacegroup.unwrap().ccp4_number, 1);
        assert_eq!(mtz.nsymop, 1);
        assert_eq!(mtz.symops.len(), 1);
        assert_eq!(mtz.datasets.len(), 1);
        assert_eq!(mtz.datasets[0].project_name, "project");
        assert_eq!(mtz.datasets[0].crystal_name, "crystal");
        assert_eq!(mtz.datasets[0].dataset_name, "dataset");
        assert_eq!(mtz.datasets[0].wavelength, 1.0);
        assert_eq!(mtz.columns[3].label, "F");
        assert_eq!(mtz.columns[3].col_type, 'F');
        assert_eq!(mtz.columns[3].source, "refmac");
        assert_eq!(mtz.columns[4].idx, 4);
        assert!(mtz.valm.is_nan());
        assert!(mtz.has_data());
        assert_eq!(mtz.data, vec![1.0, 0.0, 0.0, 100.0, 90.0]);
        assert!((mtz.resolution_high() - 10.0).abs() < 1e-9);
        assert!((mtz.resolution_low() - 10.0).abs() < 1e-9);
        assert!(mtz.warnings.is_empty());
    }

    #[test]
    fn both_byte_orders_read_to_the_same_values() {
        let rows = [[1.0, 2.0, -3.0, 55.5, -120.0], [0.0, 1.0, 4.0, 7.25, 30.0]];
        let le = read_bytes(&build_mtz(true, &rows)).unwrap();
        let be = read_bytes(&build_mtz(false, &rows)).unwrap();
        assert_eq!(le.data, be.data);
        assert_eq!(le.header_offset, be.header_offset);
        assert_ne!(le.same_byte_order, be.same_byte_order);
    }

    #[test]
    fn headers_only_read_skips_data() {
        let bytes = minimal_mtz();
        let mtz = read_mtz_stream(&mut Cursor::new(&bytes), false).unwrap();
        assert_eq!(mtz.ncol, 5);
        assert!(mtz.data.is_empty());
        assert!(!mtz.has_data());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = minimal_mtz();
        bytes[0] = b'X';
        assert!(matches!(read_bytes(&bytes), Err(MtzError::NotMtz)));
    }

    #[test]
    fn rejects_short_preamble() {
        assert!(matches!(
            read_bytes(b"MTZ "),
            Err(MtzError::Truncated("the MTZ file preamble"))
        ));
    }

    #[test]
    fn rejects_truncated_data_block() {
        let bytes = minimal_mtz();
        let short = &bytes[..96]; // preamble + 16 of the 20 data bytes
        let mut partial = Mtz::default();
        partial.ncol = 5;
        partial.nreflections = 1;
        assert!(matches!(
            partial.read_raw_data(&mut Cursor::new(short)),
            Err(MtzError::Truncated("the MTZ data block"))
        ));
    }

    #[test]
    fn ncol_mismatch_is_fatal() {
        let mut bytes = Vec::new();
        let source = minimal_mtz();
        bytes.extend_from_slice(&source);
        // Rewrite the NCOL record to claim 6 columns.
        let ncol_at = source
            .windows(4)
            .position(|w| w == b"NCOL")
            .unwrap();
        bytes[ncol_at..ncol_at + 80].copy_from_slice(&{
            let mut rec = [b' '; 80];
            let text = "NCOL        6            1        0";
            rec[..text.len()].copy_from_slice(text.as_bytes());
            rec
        });
        assert!(matches!(read_bytes(&bytes), Err(MtzError::Inconsistent(_))));
    }

    #[test]
    fn unknown_header_and_spacegroup_warn_but_read() {
        let mut bytes = minimal_mtz();
        let end_at = bytes.windows(3).position(|w| w == b"END").unwrap();
        // Splice an unknown record before END.
        let mut spliced = bytes[..end_at].to_vec();
        push_record(&mut spliced, "FROBNICATE 1 2 3");
        spliced.extend_from_slice(&bytes[end_at..]);
        bytes = spliced;
        // And make the space-group name unknown.
        let syminf_at = bytes.windows(6).position(|w| w == b"SYMINF").unwrap();
        let mut rec = [b' '; 80];
        let text = "SYMINF   1  1 P     1              'Q 9' PG1";
        rec[..text.len()].copy_from_slice(text.as_bytes());
        bytes[syminf_at..syminf_at + 80].copy_from_slice(&rec);

        let mtz = read_bytes(&bytes).unwrap();
        assert!(mtz.spacegroup.is_none());
        assert_eq!(mtz.spacegroup_name, "Q 9");
        assert!(mtz.warnings.iter().any(|w| w.starts_with("Unknown header: FROBNICATE")));
        assert!(mtz
            .warnings
            .iter()
            .any(|w| w.contains("unrecognized spacegroup name")));
    }

    #[test]
    fn spacegroup_name_number_mismatch_warns() {
        let mut bytes = minimal_mtz();
        let syminf_at = bytes.windows(6).position(|w| w == b"SYMINF").unwrap();
        let mut rec = [b' '; 80];
        let text = "SYMINF   1  1 P    19                 'P 1' PG1";
        rec[..text.len()].copy_from_slice(text.as_bytes());
        bytes[syminf_at..syminf_at + 80].copy_from_slice(&rec);
        let mtz = read_bytes(&bytes).unwrap();
        assert_eq!(mtz.spacegroup.unwrap().ccp4_number, 1);
        assert_eq!(mtz.spacegroup_number, 19);
        assert!(mtz
            .warnings
            .iter()
            .any(|w| w.contains("inconsistent spacegroup name and number")));
    }

    #[test]
    fn valm_values() {
        let mut bytes = minimal_mtz();
        let valm_at = bytes.windows(4).position(|w| w == b"VALM").unwrap();
        let set_valm = |bytes: &mut Vec<u8>, text: &str| {
            let mut rec = [b' '; 80];
            rec[..text.len()].copy_from_slice(text.as_bytes());
            bytes[valm_at..valm_at + 80].copy_from_slice(&rec);
        };
        set_valm(&mut bytes, "VALM 0.0");
        let mtz = read_bytes(&bytes).unwrap();
        assert_eq!(mtz.valm, 0.0);

        set_valm(&mut bytes, "VALM NAN");
        let mtz = read_bytes(&bytes).unwrap();
        assert!(mtz.valm.is_nan());
        assert!(mtz.warnings.is_empty());

        set_valm(&mut bytes, "VALM 1.5oops");
        let mtz = read_bytes(&bytes).unwrap();
        assert!(mtz.valm.is_nan());
        assert!(mtz.warnings.iter().any(|w| w.contains("Unexpected VALM")));
    }

    #[test]
    fn history_is_collected_and_trimmed() {
        let mut bytes = minimal_mtz();
        let end_of_headers = bytes.windows(15).position(|w| w == b"MTZENDOFHEADERS").unwrap();
        let mut spliced = bytes[..end_of_headers].to_vec();
        push_record(&mut spliced, "MTZHIST   2");
        push_record(&mut spliced, "  From refmac, 2024   ");
        push_record(&mut spliced, "Second line");
        spliced.extend_from_slice(&bytes[end_of_headers..]);
        bytes = spliced;
        let mtz = read_bytes(&bytes).unwrap();
        assert_eq!(mtz.history, vec!["From refmac, 2024", "Second line"]);
    }

    #[test]
    fn out_of_range_history_count_warns_and_reads() {
        let mut bytes = minimal_mtz();
        let end_of_headers = bytes.windows(15).position(|w| w == b"MTZENDOFHEADERS").unwrap();
        let mut spliced = bytes[..end_of_headers].to_vec();
        push_record(&mut spliced, "MTZHIST  40");
        spliced.extend_from_slice(&bytes[end_of_headers..]);
        let mtz = read_bytes(&spliced).unwrap();
        assert!(mtz.history.is_empty());
        assert!(mtz
            .warnings
            .iter()
            .any(|w| w.contains("between 0 and 30")));
        assert!(mtz.has_data());
    }

    #[test]
    fn dataset_record_numbering_mismatch_warns() {
        let mut bytes = minimal_mtz();
        let dwavel_at = bytes.windows(6).position(|w| w == b"DWAVEL").unwrap();
        let mut rec = [b' '; 80];
        let text = "DWAVEL        2    1.00000";
        rec[..text.len()].copy_from_slice(text.as_bytes());
        bytes[dwavel_at..dwavel_at + 80].copy_from_slice(&rec);
        let mtz = read_bytes(&bytes).unwrap();
        assert_eq!(mtz.datasets[0].wavelength, 0.0);
        assert!(mtz
            .warnings
            .iter()
            .any(|w| w.contains("DWAVEL line: unusual numbering")));
    }

    #[test]
    fn dataset_cell_fallback() {
        // No CELL record; the dataset's DCELL carries the crystal cell.
        let source = minimal_mtz();
        let mut bytes = source[..100].to_vec(); // preamble + data block
        for chunk_at in (100..source.len()).step_by(80) {
            let rec = &source[chunk_at..chunk_at + 80];
            if rec.starts_with(b"CELL ") {
                continue;
            }
            if rec.starts_with(b"DCELL") {
                push_record(
                    &mut bytes,
                    "DCELL         1    20.0000   20.0000   20.0000   90.0000   90.0000   90.0000",
                );
                continue;
            }
            bytes.extend_from_slice(rec);
        }
        let mtz = read_bytes(&bytes).unwrap();
        assert!(!mtz.cell.is_crystal());
        assert_eq!(mtz.get_cell(1).a, 20.0);
        assert!(mtz.get_cell(1).is_crystal());
        assert!(!mtz.get_cell(-1).is_crystal());
    }

    #[test]
    fn bad_symm_record_is_fatal() {
        let mut bytes = minimal_mtz();
        let symm_at = bytes.windows(5).position(|w| w == b"SYMM ").unwrap();
        let mut rec = [b' '; 80];
        let text = "SYMM W,Y,Z";
        rec[..text.len()].copy_from_slice(text.as_bytes());
        bytes[symm_at..symm_at + 80].copy_from_slice(&rec);
        assert!(matches!(read_bytes(&bytes), Err(MtzError::BadSymmetry(_))));
    }

    #[test]
    fn file_read_prefixes_path_on_error() {
        let err = read_mtz_file("/nonexistent/file.mtz").unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("/nonexistent/file.mtz: "), "{text}");
    }
}
