//! Converter that shells out to an external program.
//!
//! `{input}` and `{output}` in the argument list are replaced with the source
//! path and the converted-model path. The child runs in its own process
//! group; with a timeout it is polled and the whole group is killed once the
//! deadline passes. Facts are then read from the source with the bundled
//! STEP reader.

use super::step::StepModel;
use super::{Converter, GeometrySummary, ModelHandle, OpenOptions};
use crate::errors::ConvertError;
use crate::model::ModelFacts;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Captured stderr is truncated to this many bytes in errors.
const STDERR_LIMIT: usize = 4096;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long stderr is awaited after the converter has exited.
const STDERR_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandConverter {
    pub fn new(program: String, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    fn expand_args(&self, source: &Path, options: &OpenOptions) -> Vec<String> {
        let input = source.display().to_string();
        let output = options.converted_path.display().to_string();
        self.args
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }

    fn run(&self, source: &Path, options: &OpenOptions) -> Result<(), ConvertError> {
        let args = self.expand_args(source, options);
        debug!(program = %self.program, ?args, "starting converter");
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| ConvertError::io(&self.program, e))?;
        let stderr = drain_stderr(&mut child);

        let waited = match self.timeout {
            Some(timeout) => child.wait_timeout(timeout),
            None => child.wait().map(Some),
        };
        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill_tree(&mut child);
                // The reader thread finishes once the last holder of the pipe is gone.
                drop(stderr);
                return Err(ConvertError::TimedOut {
                    secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                });
            }
            Err(e) => {
                kill_tree(&mut child);
                return Err(ConvertError::io(&self.program, e));
            }
        };

        let stderr = collect_stderr(stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!("{}", line.trim_end());
        }
        check_status(status, stderr)
    }
}

fn check_status(status: ExitStatus, mut stderr: String) -> Result<(), ConvertError> {
    if status.success() {
        return Ok(());
    }
    if stderr.len() > STDERR_LIMIT {
        let mut cut = STDERR_LIMIT;
        while !stderr.is_char_boundary(cut) {
            cut -= 1;
        }
        stderr.truncate(cut);
    }
    Err(ConvertError::CommandFailed {
        status: status.to_string(),
        stderr: stderr.trim().to_string(),
    })
}

/// Kill the child's whole process group, then the child itself, and reap it.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Ok(pid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Read stderr on a separate thread so a chatty child cannot fill the pipe
/// and stall while being polled.
fn drain_stderr(child: &mut Child) -> Option<Receiver<String>> {
    let mut pipe = child.stderr.take()?;
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    Some(rx)
}

/// Wait a bounded time for the reader; processes the converter left behind
/// may keep the pipe open after it exits.
fn collect_stderr(rx: Option<Receiver<String>>) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    match rx.recv_timeout(STDERR_GRACE) {
        Ok(text) => text,
        Err(_) => {
            debug!("stderr still held open after converter exit; not waiting for it");
            String::new()
        }
    }
}

/// Extension trait to add `wait_timeout` to `Child`.
trait ChildExt {
    fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>>;
}

impl ChildExt for Child {
    fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
        let start = Instant::now();
        loop {
            match self.try_wait()? {
                Some(status) => return Ok(Some(status)),
                None => {
                    if start.elapsed() >= timeout {
                        return Ok(None);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn open(
        &self,
        source: &Path,
        options: &OpenOptions,
    ) -> Result<Box<dyn ModelHandle>, ConvertError> {
        self.run(source, options)?;
        match StepModel::load(source) {
            Ok(model) => Ok(Box::new(model)),
            Err(ConvertError::UnsupportedFormat { extension }) => {
                debug!(%extension, "no fact reader for this format");
                Ok(Box::new(OpaqueModel))
            }
            Err(e) => Err(e),
        }
    }
}

/// Converted by the external program but not readable here; reports no facts.
struct OpaqueModel;

impl ModelHandle for OpaqueModel {
    fn generate_geometry(&mut self) -> Result<GeometrySummary, ConvertError> {
        Ok(GeometrySummary::default())
    }

    fn facts(&self) -> Result<ModelFacts, ConvertError> {
        Ok(ModelFacts::default())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn opts(dir: &Path) -> OpenOptions {
        OpenOptions {
            caching: false,
            converted_path: dir.join("m.ifc.xbim"),
        }
    }

    fn sh(script: &str, timeout: Option<Duration>) -> CommandConverter {
        CommandConverter::new(
            "sh".into(),
            vec!["-c".into(), script.into(), "sh".into(), "{input}".into(), "{output}".into()],
            timeout,
        )
    }

    fn write_model(dir: &Path) -> std::path::PathBuf {
        let p = dir.join("m.ifc");
        std::fs::write(&p, "ISO-10303-21;\nDATA;\n#1=IFCWALL('g',$,$,$,$,$,$,$);\nENDSEC;\n").unwrap();
        p
    }

    #[test]
    fn substitutes_placeholders_and_reads_facts() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_model(dir.path());
        let conv = sh("cp \"$1\" \"$2\"", None);
        let model = conv.open(&source, &opts(dir.path())).unwrap();
        assert_eq!(model.facts().unwrap().entity_count, 1);
        assert!(dir.path().join("m.ifc.xbim").exists());
    }

    #[test]
    fn non_zero_exit_is_a_fault() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_model(dir.path());
        let conv = sh("echo broken geometry >&2; exit 3", None);
        let err = conv.open(&source, &opts(dir.path())).err().unwrap();
        match err {
            ConvertError::CommandFailed { stderr, .. } => assert_eq!(stderr, "broken geometry"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn deadline_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_model(dir.path());
        let conv = sh("exec sleep 5", Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = conv.open(&source, &opts(dir.path())).err().unwrap();
        assert!(matches!(err, ConvertError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn deadline_holds_when_the_script_has_children() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_model(dir.path());
        let conv = sh("sleep 4; echo done", Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = conv.open(&source, &opts(dir.path())).err().unwrap();
        assert!(matches!(err, ConvertError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn deadline_kills_background_processes_too() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_model(dir.path());
        let conv = sh("(sleep 1; touch \"$2\") & sleep 5", Some(Duration::from_millis(200)));
        let err = conv.open(&source, &opts(dir.path())).err().unwrap();
        assert!(matches!(err, ConvertError::TimedOut { .. }));
        std::thread::sleep(Duration::from_millis(1500));
        assert!(!dir.path().join("m.ifc.xbim").exists());
    }

    #[test]
    fn missing_program_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_model(dir.path());
        let conv = CommandConverter::new("definitely-not-a-converter-xyz".into(), vec![], None);
        assert!(matches!(
            conv.open(&source, &opts(dir.path())),
            Err(ConvertError::Io { .. })
        ));
    }
}
