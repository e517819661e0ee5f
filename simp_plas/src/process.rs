use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::{
    assembly::{asm_sample, AssemblyJob, FinalAssembly},
    config::Config,
    io,
    runner::{check_exit, run_checked, LogFiles, ProcessRunner},
    sample::SampleSpec,
};
use utils::StepTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Done,
    Failed,
    NoReference,
}

/// What happened to a sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    FilterFailed,
    AssemblyFailed,
    Completed {
        assembly: FinalAssembly,
        alignment: Alignment,
    },
}

impl fmt::Display for SampleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FilterFailed => f.write_str("skipped (read filtering failed)"),
            Self::AssemblyFailed => f.write_str("skipped (assembly failed)"),
            Self::Completed { assembly, alignment } => {
                write!(f, "completed ({} assembly", assembly.assembler)?;
                match alignment {
                    Alignment::Done => f.write_str(", aligned)"),
                    Alignment::Failed => f.write_str(", alignment failed)"),
                    Alignment::NoReference => f.write_str(")"),
                }
            }
        }
    }
}

/// Filter merged reads for a sample.  Returns path to filtered reads on success
fn filter_reads<R: ProcessRunner + ?Sized>(
    cfg: &Config,
    runner: &mut R,
    s: &SampleSpec,
) -> Option<PathBuf> {
    info!("Running NanoFilt");
    let timer = StepTimer::start();
    let filt_dir = cfg.layout().filt_dir(s.barcode());
    let merged = filt_dir.join("merged.fastq");
    let filt_fq = filt_dir.join(format!(
        "filt_l{}_q{}.fastq",
        s.length_cutoff(),
        s.quality_cutoff()
    ));
    let logs = LogFiles {
        out: filt_fq.clone(),
        err: PathBuf::from(format!("{}_{}.err.log", cfg.log_prefix("nanofilt"), s.tag())),
    };
    let tools = cfg.tools();
    let cmd = tools.filter_cmd(&merged, s.length_cutoff(), s.quality_cutoff());
    let res = runner.run_in_env(
        tools.conda.as_os_str(),
        &tools.nanofilt_env,
        &cmd,
        &logs.out,
        &logs.err,
    );
    if !check_exit(res, &cmd, &logs, "NanoFilt filtering") {
        error!("Please check {}", merged.display());
        return None;
    }
    if let Err(e) = fs::remove_file(&merged) {
        warn!("Could not remove {}: {}", merged.display(), e)
    }
    info!("time_elapsed {} seconds", timer.elapsed_secs());
    Some(filt_fq)
}

fn align_reads<R: ProcessRunner + ?Sized>(
    cfg: &Config,
    runner: &mut R,
    s: &SampleSpec,
    reads: &Path,
) -> Alignment {
    info!("Running alignment");
    let timer = StepTimer::start();
    let layout = cfg.layout();
    let reference = layout.ref_map_dir().join(format!("{}.fasta", s.name()));
    let out_prefix = layout.aln_dir().join(format!(
        "aln_{}_l{}_q{}",
        s.tag(),
        s.length_cutoff(),
        s.quality_cutoff()
    ));
    let logs = LogFiles::with_prefix(&format!("{}_{}", cfg.log_prefix("aln"), s.tag()));
    let cmd = cfg
        .tools()
        .align_cmd(&reference, reads, &out_prefix, &logs.err);
    if run_checked(runner, &cmd, &logs, "minimap2 alignment") {
        info!("time_elapsed {} seconds", timer.elapsed_secs());
        Alignment::Done
    } else {
        error!(
            "FAILURE aligning sample {} with barcode {}; please check reference file {} and query file {}",
            s.name(),
            s.barcode(),
            reference.display(),
            reads.display()
        );
        Alignment::Failed
    }
}

/// Process one sample: filter, assemble, compress filtered reads, align
fn process_sample<R: ProcessRunner + ?Sized>(
    cfg: &Config,
    runner: &mut R,
    s: &SampleSpec,
) -> SampleOutcome {
    let filt_fq = match filter_reads(cfg, runner, s) {
        Some(p) => p,
        None => return SampleOutcome::FilterFailed,
    };

    let layout = cfg.layout();
    let job = if cfg.filt_first() {
        AssemblyJob {
            sample: s,
            fq_dir: layout.filt_dir(s.barcode()),
            log_prefix: cfg.log_prefix("wf_cval_filt"),
            add_prefix: "filt_",
        }
    } else {
        AssemblyJob {
            sample: s,
            fq_dir: layout.raw_dir(s.barcode()),
            log_prefix: cfg.log_prefix("wf_cval"),
            add_prefix: "raw_",
        }
    };
    let assembly = match asm_sample(cfg, runner, &job) {
        Some(a) => a,
        None => return SampleOutcome::AssemblyFailed,
    };

    let reads = match io::gzip_file(&filt_fq) {
        Ok(p) => p,
        Err(e) => {
            warn!("Could not compress {}: {:#}", filt_fq.display(), e);
            filt_fq
        }
    };

    let alignment = if s.has_reference_map() {
        align_reads(cfg, runner, s, &reads)
    } else {
        info!("No reference map file provided, skip alignment");
        Alignment::NoReference
    };

    SampleOutcome::Completed {
        assembly,
        alignment,
    }
}

/// Process all configured samples in order
///
/// A failure for one sample never stops processing of the others.  Once all samples
/// have been processed the per barcode filter directories are removed.
pub fn process_samples<R: ProcessRunner + ?Sized>(
    cfg: &Config,
    runner: &mut R,
) -> Vec<SampleOutcome> {
    debug!("Starting processing of {} samples", cfg.samples().len());
    let mut outcomes = Vec::with_capacity(cfg.samples().len());
    for s in cfg.samples() {
        info!(
            "Processing - {} - {} (expected size {})",
            s.barcode(),
            s.name(),
            s.expected_size()
        );
        let timer = StepTimer::start();
        let outcome = process_sample(cfg, runner, s);
        match outcome {
            SampleOutcome::Completed { .. } => info!("Done"),
            _ => warn!("Skip {} ({})", s.tag(), outcome),
        }
        info!("time_elapsed {} seconds", timer.elapsed_secs());
        outcomes.push(outcome);
    }

    info!("Clean up");
    for s in cfg.samples() {
        io::remove_dir_if_exists(&cfg.layout().filt_dir(s.barcode()));
    }
    outcomes
}
