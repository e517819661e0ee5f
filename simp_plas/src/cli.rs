use std::{num::NonZeroUsize, path::PathBuf};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_parser, Arg, ArgAction,
    Command,
};

use anyhow::Context;

use utils::{init_log, LogLevel};

use crate::{config::*, sample::read_sample_config};

fn path_arg(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .value_parser(value_parser!(PathBuf))
        .value_name("PATH")
        .help(help)
}

fn string_arg(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .value_parser(value_parser!(String))
        .value_name("STRING")
        .help(help)
}

/// Set up definition of command options for clap
fn cli_model() -> Command {
    Command::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .author(crate_authors!())
        .arg(
            Arg::new("timestamp")
                .short('X')
                .long("timestamp")
                .value_parser(value_parser!(stderrlog::Timestamp))
                .value_name("GRANULARITY")
                .default_value("none")
                .help("Prepend log entries with a timestamp"),
        )
        .arg(
            Arg::new("loglevel")
                .short('l')
                .long("loglevel")
                .value_name("LOGLEVEL")
                .value_parser(value_parser!(LogLevel))
                .ignore_case(true)
                .default_value("info")
                .help("Set log level"),
        )
        .arg(
            Arg::new("quiet")
                .action(ArgAction::SetTrue)
                .long("quiet")
                .conflicts_with("loglevel")
                .help("Silence all output"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .help("Set number of threads for the external tools [default: available cores]"),
        )
        .arg(
            Arg::new("apx_ratio")
                .short('a')
                .long("apx-ratio")
                .value_parser(value_parser!(f64))
                .value_name("FLOAT")
                .default_value("1.5")
                .help("Rerun assembly with a size hint if assembled and expected sizes differ by more than this ratio"),
        )
        .arg(
            Arg::new("filt_first")
                .short('f')
                .long("filt-first")
                .action(ArgAction::SetTrue)
                .help("Assemble from filtered reads rather than raw reads"),
        )
        .arg(path_arg(
            "guppy",
            "guppy",
            "Guppy base caller executable [default: guppy_basecaller]",
        ))
        .arg(string_arg(
            "guppy_model",
            "guppy-model",
            "Guppy model configuration [default: dna_r10.4.1_e8.2_400bps_sup.cfg]",
        ))
        .arg(string_arg(
            "guppy_kit",
            "guppy-kit",
            "Barcoding kit [default: SQK-RBK114-96]",
        ))
        .arg(path_arg(
            "nextflow",
            "nextflow",
            "Nextflow executable [default: nextflow]",
        ))
        .arg(string_arg(
            "workflow",
            "workflow",
            "Assembly workflow [default: epi2me-labs/wf-clone-validation]",
        ))
        .arg(string_arg(
            "primary_revision",
            "primary-revision",
            "Workflow revision for the primary (Flye) assembler [default: 8b9748bc00]",
        ))
        .arg(string_arg(
            "secondary_revision",
            "secondary-revision",
            "Workflow revision for the secondary (Canu) assembler [default: v0.2.13]",
        ))
        .arg(path_arg("conda", "conda", "Conda executable [default: conda]"))
        .arg(path_arg(
            "nanofilt",
            "nanofilt",
            "NanoFilt executable [default: NanoFilt]",
        ))
        .arg(path_arg(
            "nanofilt_env",
            "nanofilt-env",
            "Conda environment for NanoFilt [default: nanofilt-env]",
        ))
        .arg(path_arg(
            "align_script",
            "align-script",
            "Alignment script [default: alignment.sh]",
        ))
        .arg(path_arg(
            "bin_dir",
            "bin-dir",
            "Directory with binaries used by the alignment script [default: bin]",
        ))
        .arg(
            Arg::new("root_dir")
                .short('r')
                .long("root-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .required(true)
                .help("Run directory with no_sample/, ReferenceMaps/ and plas_config.csv"),
        )
}

/// Replace `x` with the value of option `id` if it was given
fn set_from<T: Clone + Send + Sync + 'static>(m: &clap::ArgMatches, id: &str, x: &mut T) {
    if let Some(v) = m.get_one::<T>(id) {
        *x = v.clone()
    }
}

/// Handle command line options.  Set up Config structure
pub fn handle_cli() -> anyhow::Result<Config> {
    // Get matches from command line
    let m = cli_model().get_matches();

    // Setup logging
    init_log(&m);

    debug!("Processing command line options");

    let nt = m
        .get_one::<NonZeroUsize>("threads")
        .map(|x| usize::from(*x))
        .unwrap_or_else(num_cpus::get);

    let layout = Layout::new(m.get_one::<PathBuf>("root_dir").expect("Missing root dir"));
    for d in [layout.no_sample_dir(), layout.ref_map_dir()] {
        if !d.is_dir() {
            return Err(anyhow!(
                "Directory {} not found under {}",
                d.display(),
                layout.root().display()
            ));
        }
    }

    let samples = read_sample_config(layout.sample_config())
        .with_context(|| "Could not read sample configuration file")?;
    debug!("Number of samples found: {}", samples.len());

    let mut tools = ToolConfig {
        threads: nt,
        ..Default::default()
    };
    set_from(&m, "guppy", &mut tools.guppy);
    set_from(&m, "guppy_model", &mut tools.guppy_model);
    set_from(&m, "guppy_kit", &mut tools.guppy_kit);
    set_from(&m, "nextflow", &mut tools.nextflow);
    set_from(&m, "workflow", &mut tools.workflow);
    set_from(&m, "primary_revision", &mut tools.primary_revision);
    set_from(&m, "secondary_revision", &mut tools.secondary_revision);
    set_from(&m, "conda", &mut tools.conda);
    set_from(&m, "nanofilt", &mut tools.nanofilt);
    set_from(&m, "nanofilt_env", &mut tools.nanofilt_env);
    set_from(&m, "align_script", &mut tools.align_script);
    set_from(&m, "bin_dir", &mut tools.bin_dir);

    let mut cfg = Config::new(layout, samples, tools);
    cfg.set_apx_ratio(*m.get_one::<f64>("apx_ratio").expect("Missing default apx ratio"))?;
    cfg.set_filt_first(m.get_flag("filt_first"));

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_is_consistent() {
        cli_model().debug_assert()
    }

    #[test]
    fn defaults() {
        let m = cli_model()
            .try_get_matches_from(["simp_plas", "-r", "/run"])
            .unwrap();
        assert_eq!(m.get_one::<f64>("apx_ratio"), Some(&1.5));
        assert!(!m.get_flag("filt_first"));
        let mut tools = ToolConfig::default();
        set_from(&m, "secondary_revision", &mut tools.secondary_revision);
        assert_eq!(tools.secondary_revision, "v0.2.13");
        assert_eq!(
            m.get_one::<LogLevel>("loglevel").map(|l| l.to_string()),
            Some("info".to_string())
        );
    }

    #[test]
    fn tool_overrides() {
        let m = cli_model()
            .try_get_matches_from([
                "simp_plas",
                "-r",
                "/run",
                "--primary-revision",
                "v1.0.0",
                "--nextflow",
                "/opt/nf/nextflow",
                "-f",
            ])
            .unwrap();
        let mut tools = ToolConfig::default();
        set_from(&m, "primary_revision", &mut tools.primary_revision);
        set_from(&m, "nextflow", &mut tools.nextflow);
        set_from(&m, "conda", &mut tools.conda);
        assert_eq!(tools.primary_revision, "v1.0.0");
        assert_eq!(tools.nextflow, PathBuf::from("/opt/nf/nextflow"));
        assert_eq!(tools.conda, PathBuf::from("conda"));
        assert!(m.get_flag("filt_first"));
    }

    #[test]
    fn root_dir_required() {
        assert!(cli_model().try_get_matches_from(["simp_plas"]).is_err());
    }
}
