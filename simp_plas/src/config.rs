use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::{runner::ToolCmd, sample::SampleSpec};

pub const DEFAULT_APX_RATIO: f64 = 1.5;

/// Locations and versions of the external tools
///
/// Built once from the command line and read only afterwards
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub guppy: PathBuf,
    pub guppy_model: String,
    pub guppy_kit: String,
    pub nextflow: PathBuf,
    pub workflow: String,
    pub primary_revision: String,
    pub secondary_revision: String,
    pub conda: PathBuf,
    pub nanofilt: PathBuf,
    pub nanofilt_env: PathBuf,
    pub align_script: PathBuf,
    pub bin_dir: PathBuf,
    pub threads: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            guppy: PathBuf::from("guppy_basecaller"),
            guppy_model: "dna_r10.4.1_e8.2_400bps_sup.cfg".to_string(),
            guppy_kit: "SQK-RBK114-96".to_string(),
            nextflow: PathBuf::from("nextflow"),
            workflow: "epi2me-labs/wf-clone-validation".to_string(),
            primary_revision: "8b9748bc00".to_string(),
            secondary_revision: "v0.2.13".to_string(),
            conda: PathBuf::from("conda"),
            nanofilt: PathBuf::from("NanoFilt"),
            nanofilt_env: PathBuf::from("nanofilt-env"),
            align_script: PathBuf::from("alignment.sh"),
            bin_dir: PathBuf::from("bin"),
            threads: 1,
        }
    }
}

impl ToolConfig {
    pub fn basecall_cmd(&self, in_dir: &Path, out_dir: &Path) -> ToolCmd {
        ToolCmd::new(&self.guppy)
            .arg("-i")
            .arg(in_dir)
            .arg("-s")
            .arg(out_dir)
            .arg("-c")
            .arg(&self.guppy_model)
            .args(["-r", "-x", "auto", "--disable_qscore_filtering", "--barcode_kits"])
            .arg(&self.guppy_kit)
    }

    /// Read filter; writes filtered reads to stdout.  Run inside [ToolConfig::nanofilt_env]
    pub fn filter_cmd(&self, input: &Path, length: u32, score: u32) -> ToolCmd {
        ToolCmd::new(&self.nanofilt)
            .arg("-l")
            .arg(length.to_string())
            .arg("-q")
            .arg(score.to_string())
            .arg(input)
    }

    pub fn assembly_cmd(
        &self,
        revision: &str,
        fq_dir: &Path,
        out_dir: &Path,
        work_dir: &Path,
        opts: &[OsString],
    ) -> ToolCmd {
        ToolCmd::new(&self.nextflow)
            .arg("run")
            .arg(&self.workflow)
            .arg("-r")
            .arg(revision)
            .arg("-w")
            .arg(work_dir)
            .arg("--fastq")
            .arg(fq_dir)
            .arg("--out_dir")
            .arg(out_dir)
            .args(opts)
    }

    /// Fetch a workflow revision ahead of running it
    pub fn pull_cmd(&self, revision: &str) -> ToolCmd {
        ToolCmd::new(&self.nextflow)
            .arg("pull")
            .arg(&self.workflow)
            .arg("-revision")
            .arg(revision)
    }

    pub fn align_cmd(
        &self,
        reference: &Path,
        reads: &Path,
        out_prefix: &Path,
        err_log: &Path,
    ) -> ToolCmd {
        ToolCmd::new("bash")
            .arg(&self.align_script)
            .arg(&self.bin_dir)
            .arg(reference)
            .arg(reads)
            .arg(out_prefix)
            .arg(err_log)
            .arg(self.threads.to_string())
    }
}

/// Directory layout of a run below the root directory
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw instrument output moved here by the preparation step
    pub fn fast5_dir(&self) -> PathBuf {
        self.root.join("calledFast5")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn called_dir(&self) -> PathBuf {
        self.root.join("calledFastq")
    }

    pub fn asm_dir(&self) -> PathBuf {
        self.root.join("asmOutput")
    }

    pub fn aln_dir(&self) -> PathBuf {
        self.root.join("alnOutput")
    }

    /// Scratch space for the workflow engine
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    pub fn ref_map_dir(&self) -> PathBuf {
        self.root.join("ReferenceMaps")
    }

    pub fn no_sample_dir(&self) -> PathBuf {
        self.root.join("no_sample")
    }

    pub fn sample_config(&self) -> PathBuf {
        self.root.join("plas_config.csv")
    }

    /// Directories created at the start of a run
    pub fn output_dirs(&self) -> [PathBuf; 5] {
        [
            self.logs_dir(),
            self.called_dir(),
            self.asm_dir(),
            self.aln_dir(),
            self.work_dir(),
        ]
    }

    /// Per barcode directory with merged and filtered reads
    pub fn filt_dir(&self, barcode: &str) -> PathBuf {
        self.called_dir().join(format!("{}_filt", barcode))
    }

    pub fn raw_dir(&self, barcode: &str) -> PathBuf {
        self.called_dir().join(barcode)
    }
}

/// Config
///
/// Configuration info for the program
/// This is generated from the command line arguments
/// Once set it is read only
///
/// layout - run directory layout
/// samples - configured samples in input order
/// tools - external tool locations
/// apx_ratio - size deviation that triggers a corrective assembly
/// filt_first - assemble from filtered rather than raw reads
/// date_prefix - prefix for log file names
///
pub struct Config {
    layout: Layout,
    samples: Vec<SampleSpec>,
    tools: ToolConfig,
    apx_ratio: f64,
    filt_first: bool,
    date_prefix: String,
}

impl Config {
    pub fn new(layout: Layout, samples: Vec<SampleSpec>, tools: ToolConfig) -> Self {
        Self {
            layout,
            samples,
            tools,
            apx_ratio: DEFAULT_APX_RATIO,
            filt_first: false,
            date_prefix: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }

    pub fn set_apx_ratio(&mut self, x: f64) -> anyhow::Result<()> {
        if x > 1.0 {
            self.apx_ratio = x;
            Ok(())
        } else {
            Err(anyhow!("Approximate size ratio must be greater than 1.0, given {}", x))
        }
    }

    pub fn set_filt_first(&mut self, x: bool) {
        self.filt_first = x
    }

    pub fn set_date_prefix<S: Into<String>>(&mut self, s: S) {
        self.date_prefix = s.into()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn samples(&self) -> &[SampleSpec] {
        &self.samples
    }

    pub fn tools(&self) -> &ToolConfig {
        &self.tools
    }

    pub fn apx_ratio(&self) -> f64 {
        self.apx_ratio
    }

    pub fn filt_first(&self) -> bool {
        self.filt_first
    }

    /// Prefix for log files of a step: `{logs}/{date}_{step}`
    pub fn log_prefix(&self, step: &str) -> String {
        self.layout
            .logs_dir()
            .join(format!("{}_{}", self.date_prefix, step))
            .to_string_lossy()
            .into_owned()
    }
}
