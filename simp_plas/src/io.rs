use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::Context;
use compress_io::{compress::CompressIo, compress_type::CompressType};
use regex::Regex;

fn fastq_regex() -> &'static Regex {
    static FASTQ: OnceLock<Regex> = OnceLock::new();
    FASTQ.get_or_init(|| Regex::new(r"(?i)[.](fastq|fq)([.]gz)?$").unwrap())
}

/// FASTQ files (optionally gzipped) in directory `dir`, sorted by name
pub fn fastq_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let reg = fastq_regex();
    let mut v = Vec::new();
    for f in dir
        .read_dir()
        .with_context(|| format!("Error checking input directory {}", dir.display()))?
    {
        let entry =
            f.with_context(|| format!("Could not get directory entry from {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && reg.is_match(&entry.file_name().to_string_lossy()) {
            v.push(path)
        }
    }
    v.sort();
    Ok(v)
}

/// Concatenate all FASTQ files from `dir` into `output`, decompressing as required
///
/// Returns the number of input files merged
pub fn merge_fastq(dir: &Path, output: &Path) -> anyhow::Result<usize> {
    let files = fastq_files(dir)?;
    trace!(
        "Merging {} files from {} into {}",
        files.len(),
        dir.display(),
        output.display()
    );
    let mut wrt = CompressIo::new()
        .path(output)
        .bufwriter()
        .with_context(|| format!("Could not open {} for output", output.display()))?;
    for p in files.iter() {
        let mut rdr = CompressIo::new()
            .path(p)
            .bufreader()
            .with_context(|| format!("Could not open {} for input", p.display()))?;
        io::copy(&mut rdr, &mut wrt)
            .with_context(|| format!("Error copying {} to {}", p.display(), output.display()))?;
    }
    wrt.flush()
        .with_context(|| format!("Error writing to {}", output.display()))?;
    Ok(files.len())
}

/// Compress `path` to `{path}.gz` and remove the uncompressed file
pub fn gzip_file(path: &Path) -> anyhow::Result<PathBuf> {
    let mut gz = path.as_os_str().to_owned();
    gz.push(".gz");
    let gz = PathBuf::from(gz);
    {
        let mut rdr = CompressIo::new()
            .path(path)
            .bufreader()
            .with_context(|| format!("Could not open {} for input", path.display()))?;
        let mut wrt = CompressIo::new()
            .path(&gz)
            .ctype(CompressType::Gzip)
            .bufwriter()
            .with_context(|| format!("Could not open {} for output", gz.display()))?;
        io::copy(&mut rdr, &mut wrt)
            .with_context(|| format!("Error compressing {}", path.display()))?;
        wrt.flush()
            .with_context(|| format!("Error writing to {}", gz.display()))?;
    }
    fs::remove_file(path).with_context(|| format!("Could not remove {}", path.display()))?;
    Ok(gz)
}

/// Replace all occurrences of `from` with `to` in file `path`
///
/// Returns the number of replacements made
pub fn substitute_in_file(path: &Path, from: &str, to: &str) -> anyhow::Result<usize> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let n = s.matches(from).count();
    if n > 0 {
        fs::write(path, s.replace(from, to))
            .with_context(|| format!("Could not write {}", path.display()))?;
    }
    Ok(n)
}

/// Rename files within `dir`.  Missing files are reported and skipped
///
/// Returns the number of files renamed
pub fn rename_in_dir(dir: &Path, renames: &[(String, String)]) -> usize {
    let mut n = 0;
    for (old, new) in renames.iter() {
        let from = dir.join(old);
        let to = dir.join(new);
        match fs::rename(&from, &to) {
            Ok(_) => {
                trace!("Renamed {} to {}", from.display(), to.display());
                n += 1
            }
            Err(e) => warn!("Could not rename {} to {}: {}", from.display(), new, e),
        }
    }
    n
}

/// Move directory `from` to `to`, replacing any existing `to`
pub fn replace_dir(from: &Path, to: &Path) -> anyhow::Result<()> {
    if to.exists() {
        debug!("Removing previous {}", to.display());
        fs::remove_dir_all(to).with_context(|| format!("Could not remove {}", to.display()))?;
    }
    fs::rename(from, to)
        .with_context(|| format!("Could not move {} to {}", from.display(), to.display()))
}

/// Remove directory tree if present.  Failures are logged, not returned
pub fn remove_dir_if_exists(dir: &Path) -> bool {
    match fs::remove_dir_all(dir) {
        Ok(_) => {
            debug!("Removed {}", dir.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Could not remove {}: {}", dir.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_every_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.fasta");
        fs::write(&p, ">barcode01 len=10\nACGT\n>barcode01_2 barcode01\n").unwrap();
        assert_eq!(substitute_in_file(&p, "barcode01", "p&1/x_barcode01").unwrap(), 3);
        assert_eq!(
            fs::read_to_string(&p).unwrap(),
            ">p&1/x_barcode01 len=10\nACGT\n>p&1/x_barcode01_2 p&1/x_barcode01\n"
        );
        assert_eq!(substitute_in_file(&p, "barcode99", "x").unwrap(), 0);
        assert!(substitute_in_file(&dir.path().join("none"), "a", "b").is_err());
    }

    #[test]
    fn renames_present_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let n = rename_in_dir(
            dir.path(),
            &[
                ("a.txt".to_string(), "b.txt".to_string()),
                ("missing".to_string(), "c.txt".to_string()),
            ],
        );
        assert_eq!(n, 1);
        assert!(dir.path().join("b.txt").exists());
        assert!(!dir.path().join("c.txt").exists());
    }

    #[test]
    fn replace_and_remove_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir(&a).unwrap();
        fs::write(a.join("new"), "1").unwrap();
        fs::create_dir(&b).unwrap();
        fs::write(b.join("stale"), "0").unwrap();
        replace_dir(&a, &b).unwrap();
        assert!(!a.exists());
        assert!(b.join("new").exists());
        assert!(!b.join("stale").exists());
        assert!(remove_dir_if_exists(&b));
        assert!(!remove_dir_if_exists(&b));
    }

    #[test]
    fn finds_and_merges_fastq() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("barcode01");
        fs::create_dir(&raw).unwrap();
        fs::write(raw.join("b.fastq"), "@r2\nCC\n+\nII\n").unwrap();
        fs::write(raw.join("a.fastq"), "@r1\nAA\n+\nII\n").unwrap();
        fs::write(raw.join("summary.txt"), "x").unwrap();
        let files = fastq_files(&raw).unwrap();
        assert_eq!(files, vec![raw.join("a.fastq"), raw.join("b.fastq")]);

        let merged = dir.path().join("merged.fastq");
        assert_eq!(merge_fastq(&raw, &merged).unwrap(), 2);
        assert_eq!(
            fs::read_to_string(&merged).unwrap(),
            "@r1\nAA\n+\nII\n@r2\nCC\n+\nII\n"
        );
    }
}
