//! Shell invocation of packaged tools and activation probes.

use crate::tool::Invocation;
use crate::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Environment variable carrying the resolved executable path.
pub const BIN_ENV: &str = "PIPEWRIGHT_BIN";

/// Environment variable carrying a literal input.
pub const INPUT_ENV: &str = "PIPEWRIGHT_INPUT";

/// Render an invocation template into a shell command line.
///
/// Values are not spliced into the text: `$<bin>` and `$<input>` become
/// quoted references to [`BIN_ENV`] and [`INPUT_ENV`], which [`run`] sets
/// on the child, so paths and inputs never need escaping.
#[must_use]
pub fn render(invocation: &Invocation) -> String {
    let bin = match &invocation.interpreter {
        Some(interpreter) => format!("{interpreter} \"${BIN_ENV}\""),
        None => format!("\"${BIN_ENV}\""),
    };
    invocation
        .template
        .replace("$<bin>", &bin)
        .replace("$<args>", &invocation.args.join(" "))
        .replace("$<input>", &format!("\"${INPUT_ENV}\""))
        .trim()
        .to_string()
}

/// Run `invocation` for tool `tool`, feeding `input` and returning the
/// trimmed standard output.
///
/// The artifact goes to standard input unless the template consumes it as
/// `$<input>`.
///
/// # Errors
///
/// Returns [`Error::ToolExecutionFailed`] on a non-zero exit and an I/O
/// error if the shell cannot be spawned.
pub async fn run(
    tool: &str,
    invocation: &Invocation,
    bin: Option<&Path>,
    input: &[u8],
) -> Result<Vec<u8>> {
    let command_line = render(invocation);
    let literal_input = invocation.takes_literal_input();
    debug!(tool, command = %command_line, "Running tool");

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&command_line)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(bin) = bin {
        cmd.env(BIN_ENV, bin);
    }
    if literal_input {
        cmd.env(INPUT_ENV, String::from_utf8_lossy(input).into_owned())
            .stdin(Stdio::null());
    } else {
        cmd.stdin(Stdio::piped());
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::io(e, None, format!("spawn shell for '{tool}'")))?;

    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_vec();
        tokio::spawn(async move {
            // The tool may exit without reading everything.
            if let Err(e) = stdin.write_all(&input).await {
                trace!(error = %e, "Standard input closed early");
            }
        })
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::io(e, None, format!("wait for '{tool}'")))?;
    if let Some(writer) = writer
        && let Err(e) = writer.await
    {
        warn!(tool, error = %e, "Standard input writer did not finish");
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(tool, status = ?output.status.code(), stderr = %stderr, "Tool failed");
        return Err(Error::tool_failed(tool, output.status.code(), stderr));
    }

    Ok(output.stdout.trim_ascii().to_vec())
}

/// Run an activation probe; any failure counts as "not accepted".
pub async fn probe(tool: &str, invocation: &Invocation, bin: Option<&Path>, input: &[u8]) -> bool {
    match run(tool, invocation, bin, input).await {
        Ok(_) => true,
        Err(e) => {
            trace!(tool, error = %e, "Probe rejected input");
            false
        }
    }
}
