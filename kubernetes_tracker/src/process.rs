use std::{ffi::OsStr, fmt, io, num::NonZeroI32, process};

use log::debug;

pub struct Command(process::Command);

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0.args(args);
        self
    }

    pub fn try_output(mut self) -> Result<Output, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("capturing `{command:?}`...", command = &self.0);
        }

        match self.0.output() {
            Ok(output) => Ok(Output {
                command: self,
                output,
            }),
            Err(error) => Err(Error {
                command: self,
                kind: error.into(),
            }),
        }
    }

    pub fn output(self) -> Result<Output, Error> {
        self.try_output().and_then(Output::require_success)
    }

    /// Like [`Command::try_output`] but writes `input` to the stdin of the process.
    pub fn try_output_with_input(mut self, input: Vec<u8>) -> Result<Output, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("capturing `{command:?}` with input...", command = &self.0);
        }

        let spawned = self
            .0
            .stdin(process::Stdio::piped())
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        // Write from a separate thread so that a process producing a lot of output before consuming all of its input
        // can not deadlock us.
        let stdin_thread = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                use std::io::Write;
                stdin.write_all(&input)
            })
        });

        let output = child.wait_with_output();
        let written = stdin_thread.map_or(Ok(Ok(())), std::thread::JoinHandle::join);

        match (output, written) {
            (Ok(output), Ok(Ok(()))) => Ok(Output {
                command: self,
                output,
            }),
            (Err(error), _) | (Ok(_), Ok(Err(error))) => Err(Error {
                command: self,
                kind: error.into(),
            }),
            (Ok(_), Err(_)) => Err(Error {
                command: self,
                kind: ErrorKind::Io(io::ErrorKind::BrokenPipe),
            }),
        }
    }
}

#[derive(Debug)]
pub struct Output {
    pub command: Command,
    pub output: process::Output,
}

impl Output {
    pub fn require_success(self) -> Result<Output, Error> {
        let Output { command, output } = self;
        if output.status.success() {
            Ok(Output { command, output })
        } else {
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus {
                    code: output.status.code().and_then(NonZeroI32::new),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                },
            })
        }
    }
}

impl std::ops::Deref for Output {
    type Target = process::Output;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Io(io::ErrorKind),
    NonZeroExitStatus {
        code: Option<NonZeroI32>,
        stderr: String,
    },
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            kind => ErrorKind::Io(kind),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to run `{command:?}`: ",
            command = &self.command.0
        )?;
        let program = self.command.0.get_program().to_string_lossy();
        match &self.kind {
            ErrorKind::NotFound => {
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::Io(kind) => write!(f, "{kind}"),
            ErrorKind::NonZeroExitStatus { code, stderr } => {
                if let Some(code) = code {
                    write!(f, "exited with non-zero exit code `{code}`")?;
                } else {
                    write!(f, "did not run succesfully")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_reported() {
        let error = Command::new("/nonexistent/kubectl")
            .args(["version"])
            .output()
            .unwrap_err();
        assert!(matches!(error.kind, ErrorKind::NotFound));
        assert!(error
            .to_string()
            .contains("the `/nonexistent/kubectl` command is required"));
    }

    #[test]
    fn stderr_is_part_of_the_error() {
        let error = Command::new("sh")
            .args(["-c", "echo 'Error from server (Forbidden)' >&2; exit 3"])
            .output()
            .unwrap_err();
        assert_eq!(
            error.to_string().split_once("`: ").map(|(_, tail)| tail),
            Some("exited with non-zero exit code `3`: Error from server (Forbidden)")
        );
    }

    #[test]
    fn input_is_written_to_stdin() {
        let output = Command::new("cat")
            .try_output_with_input(b"{\"kind\":\"Job\"}".to_vec())
            .and_then(Output::require_success)
            .unwrap();
        assert_eq!(output.stdout, b"{\"kind\":\"Job\"}");
    }
}
