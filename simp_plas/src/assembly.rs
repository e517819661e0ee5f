//! Plasmid assembly with size-guided retry and fallback assembler
//!
//! The primary assembler (Flye-based workflow revision) is run first.  If it succeeds
//! but the assembled length is too far from the expected plasmid size, a single
//! corrective run with an explicit size hint is made.  If it fails in the assembly
//! stage and the expected size is known, the secondary assembler (Canu-based workflow
//! revision) is tried instead.  Every run writes to its own tagged directory; the
//! chosen result is then moved to the `final` directory for the sample.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    config::Config,
    io,
    runner::{check_exit, run_checked, LogFiles, ProcessRunner},
    sample::{ExpectedSize, SampleSpec},
    status::{read_status, SampleStatus, STATUS_FILE},
};
use utils::StepTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembler {
    Flye,
    Canu,
}

impl fmt::Display for Assembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flye => f.write_str("flye"),
            Self::Canu => f.write_str("canu"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("{assembler} assembly workflow exited with an error")]
    ProcessExitNonZero { assembler: Assembler },
    #[error("could not read status of {assembler} assembly")]
    StatusParse {
        assembler: Assembler,
        #[source]
        source: anyhow::Error,
    },
    #[error("secondary assembler revision {0} could not be prepared")]
    SecondaryAssemblerUnavailable(String),
    #[error("{assembler} assembly failed: {reason}")]
    AssemblyFailed { assembler: Assembler, reason: String },
    #[error("secondary assembler needed but the expected size is unknown")]
    SizeRequired,
    #[error("could not move assembly to final location")]
    Promotion(#[source] anyhow::Error),
}

/// Result of one assembly workflow run that exited cleanly
#[derive(Debug, Clone)]
pub struct AssemblyResult {
    pub assembler: Assembler,
    pub output_dir: PathBuf,
    pub status: SampleStatus,
}

impl AssemblyResult {
    pub fn succeeded(&self) -> bool {
        self.status.succeeded()
    }

    pub fn assembled_length(&self) -> Option<u64> {
        self.status.length()
    }
}

/// A promoted assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalAssembly {
    pub assembler: Assembler,
    pub dir: PathBuf,
    pub length: Option<u64>,
}

/// Inputs for assembling one sample
///
/// fq_dir - directory with reads to assemble
/// log_prefix - prefix of log files for this step
/// add_prefix - extra tag distinguishing raw/filtered input (e.g., "filt_")
///
pub struct AssemblyJob<'a> {
    pub sample: &'a SampleSpec,
    pub fq_dir: PathBuf,
    pub log_prefix: String,
    pub add_prefix: &'a str,
}

impl<'a> AssemblyJob<'a> {
    fn name(&self, tag: &str) -> String {
        format!("{}_{}{}", self.sample.tag(), self.add_prefix, tag)
    }

    fn attempt_dir(&self, cfg: &Config, tag: &str) -> PathBuf {
        cfg.layout().asm_dir().join(self.name(tag))
    }

    fn logs(&self, tag: &str) -> LogFiles {
        LogFiles::with_prefix(&format!("{}_{}", self.log_prefix, self.name(tag)))
    }

    pub fn final_dir(&self, cfg: &Config) -> PathBuf {
        self.attempt_dir(cfg, "final")
    }
}

/// True if the assembled length differs from the expected size by more than `apx_ratio`
///
/// Never true if the expected size is unknown or either size is zero
pub fn size_deviates(assembled: u64, expected: ExpectedSize, apx_ratio: f64) -> bool {
    match expected.hint() {
        Some(e) if assembled > 0 => {
            let (a, e) = (assembled as f64, e as f64);
            a.max(e) / a.min(e) > apx_ratio
        }
        _ => false,
    }
}

/// Run the assembly workflow once into the directory tagged with `tag`
fn run_attempt<R: ProcessRunner + ?Sized>(
    cfg: &Config,
    runner: &mut R,
    job: &AssemblyJob,
    assembler: Assembler,
    tag: &str,
    opts: &[OsString],
) -> Result<AssemblyResult, AssemblyError> {
    let tools = cfg.tools();
    let revision = match assembler {
        Assembler::Flye => &tools.primary_revision,
        Assembler::Canu => &tools.secondary_revision,
    };
    let output_dir = job.attempt_dir(cfg, tag);
    let logs = job.logs(tag);
    let work_dir = cfg.layout().work_dir();
    let cmd = tools.assembly_cmd(revision, &job.fq_dir, &output_dir, &work_dir, opts);
    info!("Running {} assembly into {}", assembler, output_dir.display());

    if !run_checked(runner, &cmd, &logs, "wf-clone-validation") {
        return Err(AssemblyError::ProcessExitNonZero { assembler });
    }
    let status = read_status(output_dir.join(STATUS_FILE))
        .map_err(|source| AssemblyError::StatusParse { assembler, source })?;
    if status.id() != job.sample.barcode() {
        warn!(
            "Status file in {} is for {}, expected {}",
            output_dir.display(),
            status.id(),
            job.sample.barcode()
        );
    }
    Ok(AssemblyResult {
        assembler,
        output_dir,
        status,
    })
}

fn failed(res: &AssemblyResult) -> AssemblyError {
    AssemblyError::AssemblyFailed {
        assembler: res.assembler,
        reason: res
            .status
            .failure_reason()
            .unwrap_or("unknown error")
            .to_owned(),
    }
}

/// Fall back to the secondary assembler, which needs a size hint
fn run_secondary<R: ProcessRunner + ?Sized>(
    cfg: &Config,
    runner: &mut R,
    job: &AssemblyJob,
) -> Result<AssemblyResult, AssemblyError> {
    let size = job
        .sample
        .expected_size()
        .hint()
        .ok_or(AssemblyError::SizeRequired)?;
    let tools = cfg.tools();
    let pull = tools.pull_cmd(&tools.secondary_revision);
    let tag = format!("{}_{}", Assembler::Canu, size);
    let logs = job.logs(&format!("{}_pull", tag));
    let res = runner.run(&pull, &logs.out, &logs.err);
    if !check_exit(res, &pull, &logs, "nextflow pull") {
        return Err(AssemblyError::SecondaryAssemblerUnavailable(
            tools.secondary_revision.clone(),
        ));
    }
    let opts = [OsString::from("--approx_size"), OsString::from(size.to_string())];
    let res = run_attempt(cfg, runner, job, Assembler::Canu, &tag, &opts)?;
    if res.succeeded() {
        Ok(res)
    } else {
        Err(failed(&res))
    }
}

/// Choose the assembly to promote, running retries as required
fn select_assembly<R: ProcessRunner + ?Sized>(
    cfg: &Config,
    runner: &mut R,
    job: &AssemblyJob,
) -> Result<AssemblyResult, AssemblyError> {
    let primary = Assembler::Flye;
    let res = run_attempt(cfg, runner, job, primary, &primary.to_string(), &[])?;

    if !res.succeeded() {
        let reason = res.status.failure_reason().unwrap_or_default();
        let eligible = res
            .status
            .failure_class()
            .map(|c| c.secondary_eligible())
            .unwrap_or(false);
        return if eligible {
            warn!("{} assembly failed: {}", primary, reason);
            run_secondary(cfg, runner, job)
        } else {
            Err(failed(&res))
        };
    }

    let expected = job.sample.expected_size();
    match (res.assembled_length(), expected.hint()) {
        (Some(alen), Some(size)) if size_deviates(alen, expected, cfg.apx_ratio()) => {
            warn!(
                "Plasmid is smaller/bigger than expected: assembly size {}, approximate size {}",
                alen, size
            );
            info!("Rerun assembly with --approx_size {}", size);
            let tag = format!("{}_{}", primary, size);
            let opts = [OsString::from("--approx_size"), OsString::from(size.to_string())];
            match run_attempt(cfg, runner, job, primary, &tag, &opts) {
                Ok(r) if r.succeeded() => Ok(r),
                Ok(r) => {
                    warn!("Corrective assembly failed ({}); keeping first assembly", failed(&r));
                    Ok(res)
                }
                Err(e) => {
                    warn!("Corrective assembly failed ({}); keeping first assembly", e);
                    Ok(res)
                }
            }
        }
        _ => Ok(res),
    }
}

/// Move selected assembly to the final directory and give outputs sample specific names
fn promote(
    job: &AssemblyJob,
    res: &AssemblyResult,
    final_dir: &Path,
) -> Result<(), AssemblyError> {
    io::replace_dir(&res.output_dir, final_dir).map_err(AssemblyError::Promotion)?;

    // Secondary assembler output has a different layout
    if res.assembler == Assembler::Flye {
        let s = job.sample;
        let (name, bc) = (s.name(), s.barcode());
        let fasta = format!("{}.{}.assembly.fasta", name, bc);
        let renames = [
            (format!("{}.final.fasta", bc), fasta.clone()),
            (
                format!("{}.annotations.bed", bc),
                format!("{}.{}.annotations.bed", name, bc),
            ),
            (
                "wf-clone-validation-report.html".to_string(),
                format!("{}_assembly_report.html", s.tag()),
            ),
        ];
        io::rename_in_dir(final_dir, &renames);
        let fasta = final_dir.join(fasta);
        if fasta.exists() {
            if let Err(e) = io::substitute_in_file(&fasta, bc, &s.tag()) {
                warn!("Could not relabel {}: {:#}", fasta.display(), e)
            }
        }
    }
    Ok(())
}

/// Assemble one sample
///
/// Returns None if no usable assembly was produced.  Failures are logged here and
/// never propagate to the caller.
pub fn asm_sample<R: ProcessRunner + ?Sized>(
    cfg: &Config,
    runner: &mut R,
    job: &AssemblyJob,
) -> Option<FinalAssembly> {
    info!("Running plasmid assembly for {}", job.sample.tag());
    let timer = StepTimer::start();

    let res = select_assembly(cfg, runner, job).and_then(|res| {
        let final_dir = job.final_dir(cfg);
        promote(job, &res, &final_dir)?;
        Ok(FinalAssembly {
            assembler: res.assembler,
            dir: final_dir,
            length: res.assembled_length(),
        })
    });

    match res {
        Ok(fa) => {
            info!(
                "SUCCESS with {} assembly, moved to {}",
                fa.assembler,
                fa.dir.display()
            );
            info!("time_elapsed {} seconds", timer.elapsed_secs());
            Some(fa)
        }
        Err(e) => {
            error!(
                "FAILURE assembling sample {} with barcode {}: {:#}",
                job.sample.name(),
                job.sample.barcode(),
                anyhow::Error::from(e)
            );
            error!(
                "Please check logs {}_{}*.err.log and {}_{}*.out.log",
                job.log_prefix,
                job.name(""),
                job.log_prefix,
                job.name("")
            );
            None
        }
    }
}
