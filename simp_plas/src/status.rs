use std::{
    fs,
    path::Path,
    sync::OnceLock,
};

use anyhow::Context;
use regex::Regex;

/// Name of the status file written by the assembly workflow into its output directory
pub const STATUS_FILE: &str = "sample_status.txt";

const SUCCESS_TEXT: &str = "Completed successfully";

/// Broad class of a failed assembly, used to decide whether another assembler is worth trying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Not enough usable reads; no assembler will do better
    InsufficientData,
    /// The assembler itself failed (assembly, reconciliation or polishing)
    AssemblyStage,
    Unknown,
}

impl FailureClass {
    pub fn from_reason(reason: &str) -> Self {
        static INSUFFICIENT: OnceLock<Regex> = OnceLock::new();
        static ASSEMBLY: OnceLock<Regex> = OnceLock::new();
        let insufficient = INSUFFICIENT.get_or_init(|| {
            Regex::new(r"(?i)insufficient|too few|not enough|no reads").unwrap()
        });
        let assembly = ASSEMBLY
            .get_or_init(|| Regex::new(r"(?i)assembl|reconcil|polish|flye|trycycler").unwrap());

        if insufficient.is_match(reason) {
            Self::InsufficientData
        } else if assembly.is_match(reason) {
            Self::AssemblyStage
        } else {
            Self::Unknown
        }
    }

    /// Failures that a different assembler may be able to recover from
    pub fn secondary_eligible(&self) -> bool {
        matches!(self, Self::AssemblyStage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    Completed { length: u64 },
    Failed { reason: String },
}

/// Parsed contents of a status file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleStatus {
    id: String,
    outcome: StatusOutcome,
}

impl SampleStatus {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, StatusOutcome::Completed { .. })
    }

    /// Assembled length; only present for successful assemblies
    pub fn length(&self) -> Option<u64> {
        match self.outcome {
            StatusOutcome::Completed { length } => Some(length),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            StatusOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        self.failure_reason().map(FailureClass::from_reason)
    }
}

/// Parse status file contents
///
/// The first line is a header.  The second line has three comma separated fields:
/// identifier, status text and assembled length.
pub fn parse_status(s: &str) -> anyhow::Result<SampleStatus> {
    let line = s
        .lines()
        .nth(1)
        .ok_or_else(|| anyhow!("Status file has fewer than 2 lines"))?;
    let fields: Vec<_> = line.trim().split(',').map(|x| x.trim()).collect();
    if fields.len() != 3 {
        return Err(anyhow!(
            "Expected 3 fields in status line, found {}: {}",
            fields.len(),
            line
        ));
    }
    let outcome = if fields[1] == SUCCESS_TEXT {
        let length = fields[2]
            .parse::<u64>()
            .with_context(|| format!("Error reading assembly length {}", fields[2]))?;
        StatusOutcome::Completed { length }
    } else {
        StatusOutcome::Failed {
            reason: fields[1].to_owned(),
        }
    };
    Ok(SampleStatus {
        id: fields[0].to_owned(),
        outcome,
    })
}

pub fn read_status<P: AsRef<Path>>(path: P) -> anyhow::Result<SampleStatus> {
    let path = path.as_ref();
    trace!("Reading assembly status from {}", path.display());
    let s = fs::read_to_string(path)
        .with_context(|| format!("Could not read status file {}", path.display()))?;
    parse_status(&s).with_context(|| format!("Error parsing status file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_status() {
        for n in [1u64, 2686, 7000, 123456] {
            let s = parse_status(&format!(
                "sample,pass,length\nbarcode01,Completed successfully,{}\n",
                n
            ))
            .unwrap();
            assert_eq!(s.id(), "barcode01");
            assert!(s.succeeded());
            assert_eq!(s.length(), Some(n));
            assert_eq!(s.failure_class(), None);
        }
    }

    #[test]
    fn failed_status_has_no_length() {
        for text in [
            "Failed due to insufficient reads",
            "Failed to assemble using Flye",
            "completed successfully",
            "",
        ] {
            let s = parse_status(&format!("h\nbc05,{},5000\n", text)).unwrap();
            assert_eq!(s.id(), "bc05");
            assert!(!s.succeeded());
            assert_eq!(s.length(), None);
            assert_eq!(s.failure_reason(), Some(text));
        }
    }

    #[test]
    fn malformed_status() {
        assert!(parse_status("").is_err());
        assert!(parse_status("header only\n").is_err());
        assert!(parse_status("h\nbc01,Completed successfully\n").is_err());
        assert!(parse_status("h\nbc01,Completed successfully,10,extra\n").is_err());
        assert!(parse_status("h\nbc01,Completed successfully,ten\n").is_err());
    }

    #[test]
    fn classify_failures() {
        use FailureClass::*;
        assert_eq!(FailureClass::from_reason("Failed due to insufficient reads"), InsufficientData);
        assert_eq!(FailureClass::from_reason("Failed to assemble using Flye"), AssemblyStage);
        assert_eq!(
            FailureClass::from_reason("Failed to reconcile assemblies with Trycycler"),
            AssemblyStage
        );
        assert_eq!(FailureClass::from_reason("Something else"), Unknown);
        assert!(AssemblyStage.secondary_eligible());
        assert!(!InsufficientData.secondary_eligible());
        assert!(!Unknown.secondary_eligible());
    }

    #[test]
    fn read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join(STATUS_FILE);
        std::fs::write(&p, "sample,status,length\nbarcode02,Completed successfully,11000\n")
            .unwrap();
        let s = read_status(&p).unwrap();
        assert_eq!(s.length(), Some(11000));
        assert!(read_status(dir.path().join("missing.txt")).is_err());
    }
}
