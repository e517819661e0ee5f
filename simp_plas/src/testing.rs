//! Test doubles for the external tools

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    runner::{ProcessRunner, ToolCmd},
    status::STATUS_FILE,
};

/// Records every command and lets the test play the part of the tool
///
/// The handler gets the command and the file receiving its standard output
pub struct FakeRunner {
    pub calls: Vec<ToolCmd>,
    handler: Box<dyn FnMut(&ToolCmd, &Path) -> i32>,
}

impl FakeRunner {
    pub fn new<F: FnMut(&ToolCmd, &Path) -> i32 + 'static>(f: F) -> Self {
        Self {
            calls: Vec::new(),
            handler: Box::new(f),
        }
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&mut self, cmd: &ToolCmd, out: &Path, err: &Path) -> anyhow::Result<i32> {
        self.calls.push(cmd.clone());
        fs::write(out, "")?;
        fs::write(err, "")?;
        Ok((self.handler)(cmd, out))
    }
}

/// Output directory of an assembly workflow command
pub fn out_dir(cmd: &ToolCmd) -> PathBuf {
    PathBuf::from(cmd.opt_value("--out_dir").expect("not an assembly command"))
}

pub fn is_assembly(cmd: &ToolCmd) -> bool {
    cmd.has_arg("run") && cmd.opt_value("--out_dir").is_some()
}

/// Write a status file for the assembly command `cmd`; returns exit code 0
pub fn assembly_status(cmd: &ToolCmd, id: &str, text: &str, len: &str) -> i32 {
    let d = out_dir(cmd);
    fs::create_dir_all(&d).unwrap();
    fs::write(
        d.join(STATUS_FILE),
        format!("sample,pass,length\n{},{},{}\n", id, text, len),
    )
    .unwrap();
    0
}

/// Successful assembly of length `len` with the usual output files
pub fn assembly_ok(cmd: &ToolCmd, barcode: &str, len: u64) -> i32 {
    let d = out_dir(cmd);
    assembly_status(cmd, barcode, "Completed successfully", &len.to_string());
    fs::write(
        d.join(format!("{}.final.fasta", barcode)),
        format!(">{} length={}\nACGTACGT\n", barcode, len),
    )
    .unwrap();
    fs::write(d.join(format!("{}.annotations.bed", barcode)), "").unwrap();
    fs::write(d.join("wf-clone-validation-report.html"), "<html></html>").unwrap();
    0
}

/// Read filter command, run through conda
pub fn is_filter(cmd: &ToolCmd) -> bool {
    cmd.get_args().iter().any(|a| a == "NanoFilt")
}
