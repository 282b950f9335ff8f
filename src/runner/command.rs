//! Solver command lines.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::MonitorError;

/// How the input deck reaches the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Passed as `-inp <file>` (pw.x).
    Argument,
    /// Redirected to standard input (bands.x, dos.x, projwfc.x).
    Stdin,
    /// Not passed at all; the arguments already carry everything.
    None,
}

/// A fully-specified external solver invocation.
///
/// Standard output is always redirected to [`SolverCommand::output`], which
/// the process monitor reads while the process is running.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverCommand {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    input: Option<PathBuf>,
    input_mode: InputMode,
    output: PathBuf,
    env: Vec<(String, String)>,
}

impl SolverCommand {
    /// Creates a command writing its standard output to `output`.
    pub fn new(program: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            input: None,
            input_mode: InputMode::None,
            output: output.into(),
            env: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory of the process.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Sets the input deck and how it is handed to the process.
    pub fn input(mut self, path: impl Into<PathBuf>, mode: InputMode) -> Self {
        self.input = Some(path.into());
        self.input_mode = mode;
        self
    }

    /// Adds an environment variable for the process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn input_path(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    /// Full argument vector, including `-inp <file>` in argument mode.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.args.clone();
        if let (InputMode::Argument, Some(input)) = (self.input_mode, &self.input) {
            argv.push("-inp".to_string());
            argv.push(input.display().to_string());
        }
        argv
    }

    /// Creates the output file and spawns the process without waiting on it.
    pub(crate) fn spawn(&self) -> Result<Child, MonitorError> {
        let stdout = File::create(&self.output)?;

        let stdin = match (self.input_mode, &self.input) {
            (InputMode::Stdin, Some(input)) => match File::open(input) {
                Ok(file) => Stdio::from(file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(MonitorError::InputMissing {
                        path: input.clone(),
                    })
                }
                Err(e) => return Err(e.into()),
            },
            _ => Stdio::null(),
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(self.argv())
            .current_dir(&self.working_dir)
            .stdin(stdin)
            .stdout(Stdio::from(stdout))
            .kill_on_drop(true);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd.spawn().map_err(|source| MonitorError::Spawn {
            command: self.to_string(),
            source,
        })
    }
}

impl fmt::Display for SolverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in self.argv() {
            write!(f, " {}", arg)?;
        }
        if let (InputMode::Stdin, Some(input)) = (self.input_mode, &self.input) {
            write!(f, " < {}", input.display())?;
        }
        write!(f, " > {}", self.output.display())
    }
}
