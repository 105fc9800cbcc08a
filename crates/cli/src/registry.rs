//! Built-in tool registry.
//!
//! Describes the Buggy chain: lisgy sources compile to port graphs, which
//! are laid out as kgraphs and rendered to SVG. Every tool is an npm
//! package run through `node`.

use pipewright_core::{Activation, Registry, Result, Tool, tool::INPUT_TYPE, version};

const NODE: &str = "node";

/// Whether `input` looks like a lisgy source file: its first non-blank
/// character opens an s-expression.
fn looks_like_lisgy(input: &[u8]) -> bool {
    input
        .iter()
        .find(|byte| !byte.is_ascii_whitespace())
        .is_some_and(|&byte| byte == b'(')
}

/// The registry shipped with the CLI.
///
/// # Errors
///
/// Fails only if a built-in minimum version does not parse.
pub fn builtin() -> Result<Registry> {
    let lisgy = Tool::new("lisgy")
        .with_package("@buggyorg/lisgy")
        .with_min_version(version::parse("0.2.0-pre.0")?)
        .consuming([INPUT_TYPE, "lisgy"])
        .producing(["portgraph"])
        .activated_by(Activation::in_process(looks_like_lisgy))
        .with_interpreter(NODE);

    let portgraph2kgraph = Tool::new("portgraph2kgraph")
        .with_package("@buggyorg/portgraph2kgraph")
        .consuming(["portgraph"])
        .producing(["kgraph"])
        .with_interpreter(NODE);

    let graphify = Tool::new("graphify")
        .with_package("@buggyorg/graphify")
        .with_min_version(version::parse("0.1.25")?)
        .consuming(["kgraph"])
        .producing(["svg"])
        .with_interpreter(NODE);

    Ok([lisgy, portgraph2kgraph, graphify].into_iter().collect())
}
