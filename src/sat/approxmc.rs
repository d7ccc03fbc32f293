use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info};
use num_bigint::BigUint;
use rustsat::types::{Lit, Var};
use wait_timeout::ChildExt;

use crate::cnf::Formula;
use crate::{Error, Result};

/// Configuration of the `approxmc` approximate model counter
#[derive(Debug, Clone)]
pub struct ApproxMcConfig {
    /// Path to the executable
    pub binary: PathBuf,
    /// Tolerance of the estimate
    pub epsilon: f64,
    /// Confidence of the estimate
    pub delta: f64,
    /// Random seed
    pub seed: Option<u64>,
    /// Pass xor gates as native xor constraints
    pub use_xor_clauses: bool,
    /// Kill the counter after this time
    pub timeout: Option<Duration>,
    /// Keep the output of the counter in this file
    pub log_file: Option<PathBuf>,
}

impl Default for ApproxMcConfig {
    fn default() -> Self {
        ApproxMcConfig {
            binary: PathBuf::from("approxmc"),
            epsilon: 0.8,
            delta: 0.2,
            seed: None,
            use_xor_clauses: false,
            timeout: None,
            log_file: None,
        }
    }
}

impl ApproxMcConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the executable path
    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = path.into();
        self
    }

    /// Set the tolerance
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set the confidence
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Pass xor gates as native xor constraints
    pub fn with_xor_clauses(mut self, use_xor_clauses: bool) -> Self {
        self.use_xor_clauses = use_xor_clauses;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Keep the output of the counter in a file
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    fn tool_name(&self) -> String {
        self.binary.display().to_string()
    }

    /// Command line arguments for a formula file
    pub(crate) fn args(&self, formula_path: &Path, has_xors: bool) -> Vec<OsString> {
        let mut ret: Vec<OsString> = vec![
            format!("--epsilon={}", self.epsilon).into(),
            format!("--delta={}", self.delta).into(),
        ];
        if let Some(seed) = self.seed {
            ret.push(format!("--seed={}", seed).into());
        }
        if has_xors {
            ret.push("--detachxor=0".into());
        }
        ret.push(formula_path.as_os_str().to_owned());
        ret
    }

    /// Count the models of a formula projected on the sampling set
    pub fn count(&self, f: &Formula, sampling: &[Var]) -> Result<BigUint> {
        let mut formula_file = tempfile::Builder::new()
            .prefix("circuitgraph_approxmc_")
            .suffix(".cnf")
            .tempfile()?;
        write_dimacs(f, sampling, &mut formula_file)?;
        formula_file.flush()?;

        let mut log = match &self.log_file {
            Some(p) => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(p)?,
            None => tempfile::tempfile()?,
        };
        let status = self.run(formula_file.path(), !f.xors.is_empty(), &log)?;
        log.seek(SeekFrom::Start(0))?;
        let mut text = String::new();
        log.read_to_string(&mut text)?;
        if !status.success() {
            return Err(Error::ProcessFailed {
                tool: self.tool_name(),
                code: status.code(),
                stderr: text,
            });
        }
        parse_count(&text).ok_or_else(|| Error::UnexpectedOutput {
            tool: self.tool_name(),
            message: text,
        })
    }

    /// Run the counter with its output redirected to the log
    fn run(&self, formula_path: &Path, has_xors: bool, log: &File) -> Result<ExitStatus> {
        let args = self.args(formula_path, has_xors);
        info!("Running {} {:?}", self.tool_name(), args);
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?));
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ToolNotFound(self.tool_name()),
            _ => Error::Io(e),
        })?;
        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::Timeout {
                        tool: self.tool_name(),
                        timeout,
                    });
                }
            },
            None => child.wait()?,
        };
        debug!("{} exited with {}", self.tool_name(), status);
        Ok(status)
    }
}

fn dimacs_lit(l: Lit) -> String {
    let v = l.var().idx() + 1;
    if l.is_neg() {
        format!("-{}", v)
    } else {
        v.to_string()
    }
}

/// Write a formula in the extended DIMACS format of `approxmc`
///
/// The sampling set goes in a `c ind` line and xor constraints in `x` lines.
pub(crate) fn write_dimacs<W: Write>(f: &Formula, sampling: &[Var], w: &mut W) -> Result<()> {
    write!(w, "c ind")?;
    for v in sampling {
        write!(w, " {}", v.idx() + 1)?;
    }
    writeln!(w, " 0")?;
    writeln!(
        w,
        "p cnf {} {}",
        f.nb_vars(),
        f.clauses.len() + f.xors.len()
    )?;
    for c in &f.clauses {
        for l in c.iter() {
            write!(w, "{} ", dimacs_lit(*l))?;
        }
        writeln!(w, "0")?;
    }
    for x in &f.xors {
        let lits: Vec<String> = x.lits.iter().map(|l| dimacs_lit(*l)).collect();
        writeln!(w, "x{} 0", lits.join(" "))?;
    }
    Ok(())
}

/// Extract the count from a `s mc N` line
pub(crate) fn parse_count(output: &str) -> Option<BigUint> {
    output.lines().find_map(|l| {
        let rest = l.trim().strip_prefix("s mc")?;
        rest.trim().parse().ok()
    })
}
