use std::fs;

use anyhow::Context;

use crate::{
    config::Config,
    io,
    runner::{run_checked, LogFiles, ProcessRunner},
};
use utils::StepTimer;

/// Base call the run and collect the reads for each barcode
///
/// Base calling is skipped if output directories for all configured barcodes are
/// already present.  Otherwise stale barcode directories are removed before the base
/// caller is run.  Afterwards the reads of each barcode are merged into
/// `{barcode}_filt/merged.fastq` as input for the read filter.
pub fn base_calling<R: ProcessRunner + ?Sized>(cfg: &Config, runner: &mut R) -> anyhow::Result<()> {
    info!("Guppy base calling");
    let timer = StepTimer::start();
    let layout = cfg.layout();
    let out_dir = layout.called_dir();

    if cfg
        .samples()
        .iter()
        .all(|s| layout.raw_dir(s.barcode()).is_dir())
    {
        info!("Found all base called directories required from configuration, skip base calling");
    } else {
        for s in cfg.samples() {
            for d in [layout.raw_dir(s.barcode()), layout.filt_dir(s.barcode())] {
                if d.exists() {
                    info!("Remove incomplete base called directory {}", d.display());
                    io::remove_dir_if_exists(&d);
                }
            }
        }
        let cmd = cfg.tools().basecall_cmd(&layout.fast5_dir(), &out_dir);
        let logs = LogFiles::with_prefix(&cfg.log_prefix("guppy"));
        if !run_checked(runner, &cmd, &logs, "guppy base calling") {
            return Err(anyhow!(
                "Base calling failed; see {} and {}",
                logs.err.display(),
                logs.out.display()
            ));
        }
    }

    for s in cfg.samples() {
        let raw = layout.raw_dir(s.barcode());
        let filt = layout.filt_dir(s.barcode());
        fs::create_dir_all(&filt)
            .with_context(|| format!("Could not create directory {}", filt.display()))?;
        let merged = filt.join("merged.fastq");
        if merged.exists() {
            debug!("{} already present", merged.display());
            continue;
        }
        if raw.is_dir() {
            let n = io::merge_fastq(&raw, &merged)?;
            debug!("Merged {} files for {}", n, s.barcode());
        } else {
            warn!("No base called reads for {} in {}", s.barcode(), raw.display());
        }
    }

    info!("Base calling done");
    info!("time_elapsed {} seconds", timer.elapsed_secs());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Layout, ToolConfig},
        sample::{ExpectedSize, SampleSpec},
        testing::FakeRunner,
    };
    use std::path::PathBuf;

    fn setup() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![
            SampleSpec::new("barcode01", "a", ExpectedSize::Unknown, false, 10, 0),
            SampleSpec::new("barcode02", "b", ExpectedSize::Unknown, false, 10, 0),
        ];
        let cfg = Config::new(Layout::new(dir.path()), samples, ToolConfig::default());
        for d in cfg.layout().output_dirs() {
            fs::create_dir_all(d).unwrap();
        }
        (dir, cfg)
    }

    #[test]
    fn runs_base_caller_and_merges() {
        let (_d, cfg) = setup();
        let called = cfg.layout().called_dir();
        // Leftover from an interrupted run
        fs::create_dir_all(called.join("barcode01_filt")).unwrap();
        fs::write(called.join("barcode01_filt/merged.fastq"), "stale").unwrap();

        let c = called.clone();
        let mut r = FakeRunner::new(move |_, _| {
            for bc in ["barcode01", "barcode02"] {
                fs::create_dir_all(c.join(bc)).unwrap();
                fs::write(c.join(bc).join("x.fastq"), format!("@{}\nA\n+\nI\n", bc)).unwrap();
            }
            0
        });
        base_calling(&cfg, &mut r).unwrap();
        assert_eq!(r.calls.len(), 1);
        assert_eq!(r.calls[0].opt_value("-s"), Some(called.as_os_str()));
        assert_eq!(
            fs::read_to_string(called.join("barcode01_filt/merged.fastq")).unwrap(),
            "@barcode01\nA\n+\nI\n"
        );
        assert!(called.join("barcode02_filt/merged.fastq").exists());
    }

    #[test]
    fn skips_when_present() {
        let (_d, cfg) = setup();
        let called = cfg.layout().called_dir();
        for bc in ["barcode01", "barcode02"] {
            fs::create_dir_all(called.join(bc)).unwrap();
        }
        let mut r = FakeRunner::new(|_, _| 0);
        base_calling(&cfg, &mut r).unwrap();
        assert!(r.calls.is_empty());
        let merged: PathBuf = called.join("barcode02_filt/merged.fastq");
        assert!(merged.exists());
    }

    #[test]
    fn failure_is_fatal() {
        let (_d, cfg) = setup();
        let mut r = FakeRunner::new(|_, _| 2);
        assert!(base_calling(&cfg, &mut r).is_err());
    }
}
