//! Local process backend.
//!
//! Runs the renderer command once per call, writing MJML to its stdin and
//! collecting HTML from stdout. Per the `mjml` CLI contract, diagnostics go to
//! stderr and nothing to stdout on failure, so any stderr output is treated
//! as a compile error regardless of the exit code.
//!
//! Stdout is collected into a spooled temporary file that stays in memory up
//! to [`STDOUT_SPOOL_THRESHOLD`] bytes and moves to disk beyond that, so
//! multi-megabyte templates do not balloon memory while the child runs.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::thread;

use crate::config::{CommandArgs, ProcessConfig};
use crate::consts::{REQUIRED_COMMAND_FLAGS, STDOUT_SPOOL_THRESHOLD};
use crate::error::{RenderError, Transport};
use crate::strategy::RenderStrategy;

/// Append `-i` and `-s` unless already present, keeping the given order.
#[must_use]
pub fn resolve_args(args: &CommandArgs) -> Vec<String> {
    let mut resolved = args.to_vec();
    for flag in REQUIRED_COMMAND_FLAGS {
        if !resolved.iter().any(|arg| arg == flag) {
            resolved.push(flag.to_owned());
        }
    }
    resolved
}

/// Renders by invoking a local `mjml` process.
pub struct ProcessStrategy {
    args: CommandArgs,
    env: Option<BTreeMap<String, String>>,
    check_on_startup: bool,
    resolved: OnceLock<Vec<String>>,
}

impl ProcessStrategy {
    /// Create a process backend from configuration.
    #[must_use]
    pub fn new(config: &ProcessConfig) -> Self {
        Self {
            args: config.args.clone(),
            env: config.env.clone(),
            check_on_startup: config.check_on_startup,
            resolved: OnceLock::new(),
        }
    }

    /// Resolved argument vector, computed once and reused by every call.
    pub fn resolved_args(&self) -> &[String] {
        self.resolved.get_or_init(|| resolve_args(&self.args))
    }

    fn command_line(&self) -> String {
        self.resolved_args().join(" ")
    }

    fn build_command(&self) -> Result<Command, RenderError> {
        let (program, args) = self
            .resolved_args()
            .split_first()
            .ok_or_else(|| RenderError::Configuration("renderer command is empty".to_owned()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(env) = &self.env {
            command.env_clear().envs(env);
        }

        Ok(command)
    }
}

impl RenderStrategy for ProcessStrategy {
    fn name(&self) -> &'static str {
        "process"
    }

    fn render(&self, source: &str) -> Result<String, RenderError> {
        let spawn_error = |source: io::Error| RenderError::Spawn {
            command: self.command_line(),
            source,
        };

        let mut child = self.build_command()?.spawn().map_err(spawn_error)?;
        let output = communicate(&mut child, source.as_bytes()).map_err(spawn_error)?;

        tracing::debug!(
            status = %output.status,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "mjml process finished"
        );

        if !output.stderr.is_empty() {
            return Err(RenderError::compile(
                Transport::Command,
                String::from_utf8_lossy(&output.stderr),
            ));
        }

        String::from_utf8(output.stdout).map_err(|e| {
            RenderError::protocol(Transport::Command, format!("output is not valid UTF-8: {e}"))
        })
    }

    fn check_on_startup(&self) -> bool {
        self.check_on_startup
    }
}

/// Everything the child produced.
struct CapturedOutput {
    status: std::process::ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn missing_pipe(name: &str) -> io::Error {
    io::Error::other(format!("child {name} was not captured"))
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, io::Result<T>>, name: &str) -> io::Result<T> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{name} thread panicked")))?
}

/// Feed `input` to the child and drain both output pipes concurrently.
///
/// Writing and reading happen on separate threads so a child that fills one
/// pipe while we block on another cannot deadlock the exchange.
fn communicate(child: &mut Child, input: &[u8]) -> io::Result<CapturedOutput> {
    let mut stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    let mut stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let mut stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
    let mut spool = tempfile::spooled_tempfile(STDOUT_SPOOL_THRESHOLD);

    let (written, errors, copied) = thread::scope(|scope| {
        let writer = scope.spawn(move || {
            let result = stdin.write_all(input);
            drop(stdin);
            match result {
                // The child may exit before reading all input; its stderr says why.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        });
        let reader = scope.spawn(move || {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).map(|_| buf)
        });
        let copied = io::copy(&mut stdout, &mut spool);
        (join(writer, "stdin"), join(reader, "stderr"), copied)
    });

    let status = child.wait()?;
    written?;
    let stderr = errors?;
    copied?;

    spool.seek(SeekFrom::Start(0))?;
    let mut stdout = Vec::new();
    spool.read_to_end(&mut stdout)?;

    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_resolve_args_appends_flags() {
        let resolved = resolve_args(&CommandArgs::List(strings(&["foo"])));
        assert_eq!(resolved, strings(&["foo", "-i", "-s"]));
    }

    #[test]
    fn test_resolve_args_single_program() {
        let resolved = resolve_args(&CommandArgs::Single("mjml".to_owned()));
        assert_eq!(resolved, strings(&["mjml", "-i", "-s"]));
    }

    #[test]
    fn test_resolve_args_does_not_duplicate() {
        let resolved = resolve_args(&CommandArgs::List(strings(&["npx", "mjml", "-s"])));
        assert_eq!(resolved, strings(&["npx", "mjml", "-s", "-i"]));

        let resolved = resolve_args(&CommandArgs::List(strings(&["mjml", "-i", "-s"])));
        assert_eq!(resolved, strings(&["mjml", "-i", "-s"]));
    }

    #[test]
    fn test_resolved_args_memoized() {
        let strategy = ProcessStrategy::new(&ProcessConfig::default());
        let first = strategy.resolved_args().as_ptr();
        let second = strategy.resolved_args().as_ptr();

        assert_eq!(first, second);
        assert_eq!(strategy.resolved_args(), strings(&["mjml", "-i", "-s"]));
    }

    #[test]
    fn test_nonexistent_executable_is_spawn_error() {
        let strategy = ProcessStrategy::new(&ProcessConfig {
            args: CommandArgs::Single("/nonexistent/mjml-binary".to_owned()),
            ..ProcessConfig::default()
        });

        let err = strategy.render("<mjml></mjml>").unwrap_err();

        assert!(matches!(err, RenderError::Spawn { .. }));
        assert!(
            err.to_string()
                .contains("Problem to run command \"/nonexistent/mjml-binary -i -s\"")
        );
    }

    #[test]
    fn test_check_on_startup_flag() {
        let strategy = ProcessStrategy::new(&ProcessConfig {
            check_on_startup: false,
            ..ProcessConfig::default()
        });
        assert!(!strategy.check_on_startup());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use pretty_assertions::assert_eq;

        /// Run `script` via `/bin/sh -c`; the appended `-i -s` become `$0` and `$1`.
        fn shell(script: &str, env: Option<&[(&str, &str)]>) -> ProcessStrategy {
            ProcessStrategy::new(&ProcessConfig {
                args: CommandArgs::List(strings(&["/bin/sh", "-c", script])),
                env: env.map(|vars| {
                    vars.iter()
                        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                        .collect()
                }),
                check_on_startup: true,
            })
        }

        #[test]
        fn test_stdout_returned_verbatim() {
            let strategy = shell("cat", None);
            let source = "<html lang=\"und\">\n  body  \n</html>\n";

            assert_eq!(strategy.render(source).unwrap(), source);
        }

        #[test]
        fn test_stderr_is_compile_error() {
            let strategy = shell("echo 'mj-button is not allowed here' >&2", None);

            let err = strategy.render("<mjml></mjml>").unwrap_err();

            match err {
                RenderError::Compile { via, message } => {
                    assert_eq!(via, Transport::Command);
                    assert_eq!(message, "mj-button is not allowed here\n");
                }
                other => panic!("expected compile error, got {other:?}"),
            }
        }

        #[test]
        fn test_stderr_wins_over_zero_exit_and_stdout() {
            let strategy = shell("cat; echo warning >&2; exit 0", None);

            let err = strategy.render("<mjml></mjml>").unwrap_err();
            assert!(matches!(err, RenderError::Compile { .. }));
        }

        #[test]
        fn test_nonzero_exit_without_stderr_returns_stdout() {
            let strategy = shell("printf '<html >'; exit 3", None);

            assert_eq!(strategy.render("<mjml></mjml>").unwrap(), "<html >");
        }

        /// Variables a shell may define on its own even with an empty environment.
        const SHELL_DEFAULTS: &[&str] = &[
            "PATH", "PWD", "OLDPWD", "HOME", "SHLVL", "IFS", "PS1", "PS2", "PS4", "OPTIND",
            "PPID", "MAIL", "MAILPATH", "_", "HOSTNAME", "HOSTTYPE", "MACHTYPE", "OSTYPE", "UID",
            "EUID", "GROUPS", "SHELLOPTS", "TERM", "COLUMNS", "LINES",
        ];

        /// A non-empty variable of the test process that only inheritance can explain.
        fn inherited_var() -> Option<(String, String)> {
            std::env::vars().find(|(name, value)| {
                !value.is_empty()
                    && !SHELL_DEFAULTS.contains(&name.as_str())
                    && !name.starts_with("BASH")
                    && name.starts_with(|c: char| c.is_ascii_alphabetic())
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
        }

        #[test]
        fn test_env_overlay_replaces_environment() {
            let Some((name, _)) = inherited_var() else {
                return;
            };
            let script = format!("printf '%s|%s' \"$MJ_TEST_VAR\" \"${{{name}:-unset}}\"");
            let strategy = shell(&script, Some(&[("MJ_TEST_VAR", "overlay")]));

            assert_eq!(strategy.render("").unwrap(), "overlay|unset");
        }

        #[test]
        fn test_no_env_overlay_inherits_environment() {
            let Some((name, value)) = inherited_var() else {
                return;
            };
            let script = format!("printf '%s' \"${name}\"");
            let strategy = shell(&script, None);

            assert_eq!(strategy.render("").unwrap(), value);
        }

        #[test]
        fn test_unicode_round_trip() {
            let strategy = shell("cat", None);
            let source = "<html lang=\"uk\">Український текст ☺✓🍭 ©</html>";

            let html = strategy.render(source).unwrap();
            assert_eq!(html.as_bytes(), source.as_bytes());
        }

        #[test]
        fn test_large_output_spools_past_threshold() {
            let strategy = shell("cat", None);
            let source = format!(
                "[START]{}[END]",
                "Big text. ".repeat(STDOUT_SPOOL_THRESHOLD / 10 + 1024)
            );

            let html = strategy.render(&source).unwrap();
            assert_eq!(html.len(), source.len());
            assert!(html.starts_with("[START]"));
            assert!(html.ends_with("[END]"));
        }

        #[test]
        fn test_child_ignoring_stdin_does_not_hang() {
            let strategy = shell("printf '<html >'", None);
            let source = "x".repeat(1024 * 1024);

            assert_eq!(strategy.render(&source).unwrap(), "<html >");
        }

        #[test]
        fn test_idempotent_render() {
            let strategy = shell("cat", None);

            let first = strategy.render("<mjml>same</mjml>").unwrap();
            let second = strategy.render("<mjml>same</mjml>").unwrap();
            assert_eq!(first, second);
        }
    }
}
