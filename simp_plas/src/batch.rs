use std::fs;

use anyhow::Context;

use crate::{
    basecall::base_calling,
    config::Config,
    process::{process_samples, SampleOutcome},
    runner::ProcessRunner,
};
use utils::StepTimer;

/// Number of samples with each outcome
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub completed: usize,
    pub filter_failed: usize,
    pub assembly_failed: usize,
}

impl Summary {
    pub fn from_outcomes(v: &[SampleOutcome]) -> Self {
        let mut s = Self::default();
        for o in v.iter() {
            match o {
                SampleOutcome::Completed { .. } => s.completed += 1,
                SampleOutcome::FilterFailed => s.filter_failed += 1,
                SampleOutcome::AssemblyFailed => s.assembly_failed += 1,
            }
        }
        s
    }

    pub fn total(&self) -> usize {
        self.completed + self.filter_failed + self.assembly_failed
    }
}

/// Create output directories for the run.  Existing directories are fine.
pub fn make_output_dirs(cfg: &Config) -> anyhow::Result<()> {
    for d in cfg.layout().output_dirs().iter() {
        fs::create_dir_all(d)
            .with_context(|| format!("Could not create output directory {}", d.display()))?;
    }
    Ok(())
}

fn print_summary(cfg: &Config, outcomes: &[SampleOutcome], summary: &Summary) {
    let layout = cfg.layout();
    for (s, o) in cfg.samples().iter().zip(outcomes.iter()) {
        println!("{}\t{}\t{}", s.barcode(), s.name(), o);
    }
    println!(
        "Samples processed: {} (completed: {}, read filtering failed: {}, assembly failed: {})",
        summary.total(),
        summary.completed,
        summary.filter_failed,
        summary.assembly_failed
    );
    println!(
        "All the logs can be found under directory: {}",
        layout.logs_dir().display()
    );
    println!(
        "All the base-called fastq can be found under directory: {}",
        layout.called_dir().display()
    );
    println!(
        "All the assemblies can be found under directory: {}",
        layout.asm_dir().display()
    );
    println!(
        "All the alignments can be found under directory: {}",
        layout.aln_dir().display()
    );
}

/// Run a complete batch: set up directories, base call, then process every sample
///
/// Per sample failures are reported in the summary and do not make the batch fail.
/// Errors are only returned when the run could not be set up or base calling failed.
pub fn run_batch<R: ProcessRunner + ?Sized>(
    cfg: &Config,
    runner: &mut R,
) -> anyhow::Result<Summary> {
    info!("Start data execution");
    let timer = StepTimer::start();

    make_output_dirs(cfg)?;
    base_calling(cfg, runner).with_context(|| "Error during base calling")?;

    let outcomes = process_samples(cfg, runner);
    let summary = Summary::from_outcomes(&outcomes);
    print_summary(cfg, &outcomes, &summary);
    info!("Done");
    info!("time_elapsed {} seconds", timer.elapsed_secs());
    Ok(summary)
}
