use std::io::Read;
use std::path::Path;
use std::process::Child;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::MdtidyError;
use crate::MdtidyResult;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exit code and interleaved stdout and stderr of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
	/// `None` when the process was terminated by a signal.
	pub code: Option<i32>,
	pub output: String,
}

/// Exit code and separately captured streams of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
	pub code: Option<i32>,
	pub stdout: String,
	pub stderr: String,
}

/// Run a command line for an `execute-command` directive.
///
/// The command is split into shell words and run directly, without a shell.
/// Output is returned when the command exits with `0` or with the expected
/// exit code.
pub fn execute_command(
	cancel: &CancellationToken,
	command: &str,
	expected_exit_code: Option<i32>,
) -> MdtidyResult<String> {
	let words = shlex::split(command)
		.filter(|words| !words.is_empty())
		.ok_or_else(|| MdtidyError::CommandParse(command.to_string()))?;
	let (program, args) = words
		.split_first()
		.ok_or_else(|| MdtidyError::CommandParse(command.to_string()))?;

	let CommandOutput { code, output } = run_interleaved(cancel, program, args)?;

	if code == Some(0) || (code.is_some() && code == expected_exit_code) {
		return Ok(output);
	}

	Err(MdtidyError::CommandFailed {
		command: command.to_string(),
		code,
		output,
	})
}

/// Run `program` with stdin closed and stdout and stderr written to the same
/// pipe, so the output keeps the order in which the process wrote it.
#[tracing::instrument(skip(cancel, args), fields(args = args.len()))]
pub fn run_interleaved(
	cancel: &CancellationToken,
	program: &str,
	args: &[String],
) -> MdtidyResult<CommandOutput> {
	let command_line = render_command_line(program, args);
	let (reader, writer) = std::io::pipe()?;
	let stderr_writer = writer.try_clone()?;

	// The command owns the parent's copies of the write end. Dropping it right
	// after spawning lets the reader see end of file once the child exits.
	let mut child = {
		let mut command = Command::new(program);
		command
			.args(args)
			.stdin(Stdio::null())
			.stdout(writer)
			.stderr(stderr_writer);
		spawn(&mut command, &command_line)?
	};

	let reader = spawn_reader(reader);
	let status = wait(cancel, &mut child, &command_line)?;
	let output = join_reader(reader)?;

	tracing::debug!(command = %command_line, code = ?status.code(), "command finished");

	Ok(CommandOutput {
		code: status.code(),
		output,
	})
}

/// Run `program` in `dir` with stdout and stderr captured separately.
#[tracing::instrument(skip(cancel, args), fields(args = args.len()))]
pub fn run_captured(
	cancel: &CancellationToken,
	program: &str,
	args: &[&str],
	dir: &Path,
) -> MdtidyResult<CapturedOutput> {
	let command_line = render_command_line(program, args);
	let mut command = Command::new(program);
	command
		.args(args)
		.current_dir(dir)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped());
	let mut child = spawn(&mut command, &command_line)?;

	let stdout = child.stdout.take().map(spawn_reader);
	let stderr = child.stderr.take().map(spawn_reader);
	let status = wait(cancel, &mut child, &command_line)?;
	let stdout = stdout.map_or_else(|| Ok(String::new()), join_reader)?;
	let stderr = stderr.map_or_else(|| Ok(String::new()), join_reader)?;

	tracing::debug!(command = %command_line, code = ?status.code(), "command finished");

	Ok(CapturedOutput {
		code: status.code(),
		stdout,
		stderr,
	})
}

fn render_command_line(program: &str, args: &[impl AsRef<str>]) -> String {
	std::iter::once(program)
		.chain(args.iter().map(AsRef::as_ref))
		.collect::<Vec<_>>()
		.join(" ")
}

fn spawn(command: &mut Command, command_line: &str) -> MdtidyResult<Child> {
	command.spawn().map_err(|source| {
		MdtidyError::CommandSpawn {
			command: command_line.to_string(),
			source,
		}
	})
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
	std::thread::spawn(move || {
		let mut buffer = Vec::new();
		reader.read_to_end(&mut buffer)?;
		Ok(buffer)
	})
}

fn join_reader(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> MdtidyResult<String> {
	let bytes = handle
		.join()
		.map_err(|_| MdtidyError::Task("output reader panicked".to_string()))??;
	Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Wait for the child to exit, killing it when `cancel` fires.
fn wait(cancel: &CancellationToken, child: &mut Child, command_line: &str) -> MdtidyResult<ExitStatus> {
	loop {
		if let Some(status) = child.try_wait()? {
			return Ok(status);
		}

		if cancel.is_cancelled() {
			tracing::debug!(command = %command_line, "killing cancelled command");
			let _ = child.kill();
			let _ = child.wait();
			return Err(MdtidyError::Cancelled(command_line.to_string()));
		}

		std::thread::sleep(POLL_INTERVAL);
	}
}
