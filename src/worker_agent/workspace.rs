//! Small shell-safe helpers for writing and reading files inside the
//! sandbox workspace through [`Sandbox::exec`], which only accepts an
//! argv — there is no stdin channel into the container.

use crate::sandbox::{Sandbox, SandboxError};

const EXEC_TIMEOUT_SECS: u64 = 10;

/// Escape `s` for safe inclusion inside single quotes in a POSIX shell
/// command: close the quote, emit an escaped literal quote, reopen it.
fn shell_single_quote_escape(s: &str) -> String {
    s.replace('\'', "'\\''")
}

pub async fn write_file(sandbox: &Sandbox, path: &str, content: &str) -> Result<(), SandboxError> {
    let escaped = shell_single_quote_escape(content);
    let command = format!("printf '%s' '{escaped}' > {path}");
    let argv = vec!["sh".to_owned(), "-c".to_owned(), command];
    let out = sandbox.exec(&argv, EXEC_TIMEOUT_SECS).await?;
    if out.exit_code != 0 {
        return Err(SandboxError::Runtime(format!("write {path} failed: {}", out.stderr)));
    }
    Ok(())
}

pub async fn read_file(sandbox: &Sandbox, path: &str) -> Result<String, SandboxError> {
    let argv = vec!["cat".to_owned(), path.to_owned()];
    let out = sandbox.exec(&argv, EXEC_TIMEOUT_SECS).await?;
    if out.exit_code != 0 {
        return Err(SandboxError::Runtime(format!("read {path} failed: {}", out.stderr)));
    }
    Ok(out.stdout)
}

pub async fn tail_file(sandbox: &Sandbox, path: &str, lines: u32) -> Result<String, SandboxError> {
    let argv = vec!["tail".to_owned(), "-n".to_owned(), lines.to_string(), path.to_owned()];
    let out = sandbox.exec(&argv, EXEC_TIMEOUT_SECS).await?;
    Ok(out.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_embedded_single_quotes() {
        let escaped = shell_single_quote_escape("it's a test");
        assert_eq!(escaped, "it'\\''s a test");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(shell_single_quote_escape("plain text"), "plain text");
    }
}
