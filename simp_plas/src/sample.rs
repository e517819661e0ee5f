use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    path::Path,
};

use anyhow::Context;
use compress_io::compress::CompressIo;
use utils::get_next_line;

/// Expected plasmid size as given in the run configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedSize {
    Known(u64),
    Unknown,
}

impl ExpectedSize {
    /// Size usable as a hint for the assembler (known and non-zero)
    pub fn hint(&self) -> Option<u64> {
        match self {
            Self::Known(x) if *x > 0 => Some(*x),
            _ => None,
        }
    }
}

impl fmt::Display for ExpectedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(x) => write!(f, "{}", x),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// One configured plasmid
///
/// barcode - barcode directory name (e.g., barcode07), unique within a run
/// sample_name - sanitized sample name
/// expected_size - approximate plasmid size
/// has_reference_map - reads should be aligned to ReferenceMaps/{sample_name}.fasta
/// quality_cutoff, length_cutoff - read filter thresholds
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSpec {
    barcode: String,
    sample_name: String,
    expected_size: ExpectedSize,
    has_reference_map: bool,
    quality_cutoff: u32,
    length_cutoff: u32,
}

impl SampleSpec {
    pub fn new<S: Into<String>, T: Into<String>>(
        barcode: S,
        sample_name: T,
        expected_size: ExpectedSize,
        has_reference_map: bool,
        quality_cutoff: u32,
        length_cutoff: u32,
    ) -> Self {
        Self {
            barcode: barcode.into(),
            sample_name: sample_name.into(),
            expected_size,
            has_reference_map,
            quality_cutoff,
            length_cutoff,
        }
    }

    pub fn barcode(&self) -> &str {
        &self.barcode
    }

    pub fn name(&self) -> &str {
        &self.sample_name
    }

    pub fn expected_size(&self) -> ExpectedSize {
        self.expected_size
    }

    pub fn has_reference_map(&self) -> bool {
        self.has_reference_map
    }

    pub fn quality_cutoff(&self) -> u32 {
        self.quality_cutoff
    }

    pub fn length_cutoff(&self) -> u32 {
        self.length_cutoff
    }

    /// `{sample}_{barcode}`, used for directory names and FASTA headers
    pub fn tag(&self) -> String {
        format!("{}_{}", self.sample_name, self.barcode)
    }
}

fn parse_size(s: &str) -> anyhow::Result<ExpectedSize> {
    if s.is_empty() || s.eq_ignore_ascii_case("unknown") {
        Ok(ExpectedSize::Unknown)
    } else {
        Ok(ExpectedSize::Known(s.parse::<u64>()?))
    }
}

fn parse_flag(s: &str) -> anyhow::Result<bool> {
    match s.to_lowercase().as_str() {
        "1" | "y" | "yes" | "true" => Ok(true),
        "0" | "n" | "no" | "false" | "" => Ok(false),
        _ => Err(anyhow!("Illegal value for reference map flag: {}", s)),
    }
}

/// Read the per-run sample configuration written by the preparation step
///
/// Each line has the fields: barcode, sample, size, has_map, quality cutoff, length cutoff
pub fn read_sample_config<P: AsRef<Path>>(fname: P) -> anyhow::Result<Vec<SampleSpec>> {
    let fname = fname.as_ref();
    debug!("Reading in sample configuration from {}", fname.display());

    let mut rdr = CompressIo::new()
        .path(fname)
        .bufreader()
        .with_context(|| format!("Could not open {} for input", fname.display()))?;

    let mut buf = String::new();
    let mut line = 0;
    let mut samples = Vec::new();
    let mut barcodes: HashMap<String, String> = HashMap::new();

    while let Some(fields) = get_next_line(&mut rdr, &mut buf, ',')
        .with_context(|| format!("Error after reading {} lines from {}", line, fname.display()))?
    {
        line += 1;
        // Skip empty lines
        if fields.len() == 1 && fields[0].is_empty() {
            continue;
        }
        if fields.len() < 6 {
            return Err(anyhow!(
                "{}:{} Expected 6 fields, found {}",
                fname.display(),
                line,
                fields.len()
            ));
        }
        let expected_size = parse_size(fields[2])
            .with_context(|| format!("{}:{} Error reading plasmid size", fname.display(), line))?;
        let has_map = parse_flag(fields[3])
            .with_context(|| format!("{}:{} Error reading map flag", fname.display(), line))?;
        let score = fields[4].parse::<u32>().with_context(|| {
            format!("{}:{} Error reading quality cutoff", fname.display(), line)
        })?;
        let length = fields[5].parse::<u32>().with_context(|| {
            format!("{}:{} Error reading length cutoff", fname.display(), line)
        })?;

        match barcodes.entry(fields[0].to_owned()) {
            Entry::Occupied(e) => {
                return Err(anyhow!(
                    "{}:{} Barcode {} used for both {} and {}",
                    fname.display(),
                    line,
                    e.key(),
                    e.get(),
                    fields[1]
                ))
            }
            Entry::Vacant(e) => {
                e.insert(fields[1].to_owned());
            }
        }

        samples.push(SampleSpec::new(
            fields[0],
            fields[1],
            expected_size,
            has_map,
            score,
            length,
        ));
    }

    debug!(
        "Finished reading in {} lines; found {} samples",
        line,
        samples.len()
    );

    if samples.is_empty() {
        Err(anyhow!("No samples found in {}", fname.display()))
    } else {
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_cfg(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("plas_config.csv");
        fs::write(&p, content).unwrap();
        (dir, p)
    }

    #[test]
    fn reads_config_rows() {
        let (_d, p) = write_cfg(
            "barcode01,pUC19-a,2686,1,11,0\n\nbarcode02,pX,unknown,0,10,500\nbarcode03,pY,0,Y,9,100\n",
        );
        let v = read_sample_config(&p).unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v[0].barcode(), "barcode01");
        assert_eq!(v[0].name(), "pUC19-a");
        assert_eq!(v[0].expected_size(), ExpectedSize::Known(2686));
        assert!(v[0].has_reference_map());
        assert_eq!(v[0].tag(), "pUC19-a_barcode01");
        assert_eq!(v[1].expected_size(), ExpectedSize::Unknown);
        assert!(!v[1].has_reference_map());
        assert_eq!(v[1].length_cutoff(), 500);
        assert_eq!(v[2].expected_size().hint(), None);
        assert!(v[2].has_reference_map());
        assert_eq!(v[2].quality_cutoff(), 9);
    }

    #[test]
    fn rejects_duplicate_barcode() {
        let (_d, p) = write_cfg("barcode01,a,100,0,11,0\nbarcode01,b,100,0,11,0\n");
        let e = read_sample_config(&p).unwrap_err();
        assert!(format!("{:#}", e).contains("barcode01"));
    }

    #[test]
    fn rejects_short_or_bad_rows() {
        let (_d, p) = write_cfg("barcode01,a,100,0,11\n");
        assert!(read_sample_config(&p).is_err());
        let (_d, p) = write_cfg("barcode01,a,big,0,11,0\n");
        assert!(read_sample_config(&p).is_err());
        let (_d, p) = write_cfg("\n");
        assert!(read_sample_config(&p).is_err());
    }
}
