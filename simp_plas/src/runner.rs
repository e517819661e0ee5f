use std::{
    ffi::{OsStr, OsString},
    fmt,
    fs::File,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::Context;

/// An external command as an argument vector
///
/// No shell is involved when the command is run, so arguments are passed through
/// unchanged whatever characters they contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCmd {
    program: OsString,
    args: Vec<OsString>,
}

impl ToolCmd {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, a: S) -> Self {
        self.args.push(a.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for a in args {
            self.args.push(a.as_ref().to_owned())
        }
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Value following option `opt` (e.g., the directory after `--out_dir`)
    pub fn opt_value(&self, opt: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == opt)
            .and_then(|i| self.args.get(i + 1))
            .map(|a| a.as_os_str())
    }

    pub fn has_arg(&self, a: &str) -> bool {
        self.args.iter().any(|x| x == a)
    }

    /// Wrap command so that it runs inside the conda environment `env`
    pub fn in_env<S: AsRef<OsStr>>(self, conda: S, env: &Path) -> Self {
        ToolCmd::new(conda)
            .arg("run")
            .arg("-p")
            .arg(env)
            .arg(self.program)
            .args(self.args)
    }
}

impl fmt::Display for ToolCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for a in self.args.iter() {
            write!(f, " {}", a.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs external commands, blocking until they finish
///
/// Standard output and standard error of the child are written to the files `out`
/// and `err`.  The exit code is returned (-1 if the child was killed by a signal).
/// Errors are only returned if the log files could not be created or the process
/// could not be started; callers treat these in the same way as a non-zero exit.
pub trait ProcessRunner {
    fn run(&mut self, cmd: &ToolCmd, out: &Path, err: &Path) -> anyhow::Result<i32>;

    /// Run `cmd` inside a conda environment
    fn run_in_env(
        &mut self,
        conda: &OsStr,
        env: &Path,
        cmd: &ToolCmd,
        out: &Path,
        err: &Path,
    ) -> anyhow::Result<i32> {
        let cmd = cmd.clone().in_env(conda, env);
        self.run(&cmd, out, err)
    }
}

/// Runs commands as child processes of the current process
#[derive(Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&mut self, cmd: &ToolCmd, out: &Path, err: &Path) -> anyhow::Result<i32> {
        debug!("Running command: {}", cmd);
        let out_file = File::create(out)
            .with_context(|| format!("Could not open {} for output", out.display()))?;
        let err_file = File::create(err)
            .with_context(|| format!("Could not open {} for output", err.display()))?;
        let status = Command::new(cmd.program())
            .args(cmd.get_args())
            .stdin(Stdio::null())
            .stdout(out_file)
            .stderr(err_file)
            .status()
            .with_context(|| format!("Could not start {}", cmd.program().to_string_lossy()))?;
        trace!("Command finished with {}", status);
        Ok(status.code().unwrap_or(-1))
    }
}

/// Stdout/stderr log file pair for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFiles {
    pub out: PathBuf,
    pub err: PathBuf,
}

impl LogFiles {
    /// `{prefix}.out.log` and `{prefix}.err.log`
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            out: PathBuf::from(format!("{}.out.log", prefix)),
            err: PathBuf::from(format!("{}.err.log", prefix)),
        }
    }
}

/// Run command and check the result, logging where the output logs can be found
///
/// Returns true if the command ran and exited with code 0
pub fn run_checked<R: ProcessRunner + ?Sized>(
    runner: &mut R,
    cmd: &ToolCmd,
    logs: &LogFiles,
    prog: &str,
) -> bool {
    let res = runner.run(cmd, &logs.out, &logs.err);
    check_exit(res, cmd, logs, prog)
}

/// Interpret the result of a [ProcessRunner] call
pub fn check_exit(res: anyhow::Result<i32>, cmd: &ToolCmd, logs: &LogFiles, prog: &str) -> bool {
    match res {
        Ok(0) => {
            debug!("out log can be found at {}", logs.out.display());
            debug!("err log can be found at {}", logs.err.display());
            true
        }
        Ok(code) => {
            error!("Error while running {} with exit code {}", prog, code);
            error!(
                "Please check error log {} and output log {}",
                logs.err.display(),
                logs.out.display()
            );
            info!("Failed command: {}", cmd);
            false
        }
        Err(e) => {
            error!("Could not run {}: {:#}", prog, e);
            info!("Failed command: {}", cmd);
            false
        }
    }
}
