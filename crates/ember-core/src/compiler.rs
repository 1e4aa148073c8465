//! Offline Compiler
//!
//! Turns script source into a bytecode artifact without touching any
//! [`Host`](crate::Host). Every compilation works on its own prototype tree,
//! which is dropped before returning.

use std::io::Write;

use tracing::debug;

use crate::bytecode::dump::dump;
use crate::error::{EmberError, EmberResult};
use crate::script;

/// Compile `source` under the diagnostic tag `name`.
///
/// On a parse failure `error` receives the diagnostic text once, `write` is
/// never called and a `Compile` error is returned. On success the artifact
/// is streamed to `write` in successive chunks; a chunk rejected by `write`
/// stops the compilation with an `Io` error.
pub fn compile<W, E>(name: &str, source: &str, write: W, mut error: E) -> EmberResult<()>
where
    W: FnMut(&[u8]) -> bool,
    E: FnMut(&str),
{
    let proto = match script::compile(name, source) {
        Ok(proto) => proto,
        Err(diagnostic) => {
            let text = diagnostic.to_string();
            debug!(name, error = %text, "compile failed");
            error(&text);
            return Err(EmberError::Compile(text));
        }
    };
    dump(&proto, write)?;
    debug!(name, "compiled");
    Ok(())
}

/// Compile `source` and write the artifact to `out`
pub fn compile_to_writer<O: Write>(name: &str, source: &str, out: &mut O) -> EmberResult<()> {
    let mut io_error = None;
    let result = compile(
        name,
        source,
        |chunk| match out.write_all(chunk) {
            Ok(()) => true,
            Err(err) => {
                io_error = Some(err);
                false
            }
        },
        |_| {},
    );
    if let Some(err) = io_error {
        return Err(err.into());
    }
    result?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::is_bytecode;
    use crate::error::ErrorKind;

    #[test]
    fn valid_source_streams_chunks() {
        let mut artifact = Vec::new();
        let mut chunks = 0;
        let mut errors = 0;
        compile(
            "ok",
            "function add(a, b) return a + b end",
            |chunk| {
                chunks += 1;
                artifact.extend_from_slice(chunk);
                true
            },
            |_| errors += 1,
        )
        .unwrap();
        assert!(chunks > 1);
        assert_eq!(errors, 0);
        assert!(is_bytecode(&artifact));
    }

    #[test]
    fn invalid_source_reports_once_and_writes_nothing() {
        let mut writes = 0;
        let mut messages = Vec::new();
        let err = compile(
            "bad",
            "this is not valid syntax",
            |_| {
                writes += 1;
                true
            },
            |text| messages.push(text.to_string()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert_eq!(writes, 0);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("bad:1:"));
    }

    #[test]
    fn rejecting_sink_aborts() {
        let mut writes = 0;
        let err = compile(
            "ok",
            "x = 1",
            |_| {
                writes += 1;
                false
            },
            |_| panic!("not a parse failure"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(writes, 1);
    }

    #[test]
    fn writer_receives_the_whole_artifact() {
        let mut out = Vec::new();
        compile_to_writer("w", "return 1", &mut out).unwrap();
        assert!(is_bytecode(&out));

        let err = compile_to_writer("w", "return +", &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compile);
    }
}
