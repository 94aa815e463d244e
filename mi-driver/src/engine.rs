/// The top-level state machine: spawns the debugger child, installs the
/// user's breakpoints, and runs the stop/continue loop until the inferior
/// exits or the watchdog trips. Mirrors the shape of the teacher's
/// `GdbAdapter::start_session` plus its event loop, generalized to the
/// plugin trait instead of a fixed command set.
use std::panic::AssertUnwindSafe;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::breakpoint::{BreakpointRegistry, UserBreakpoint};
use crate::error::EngineError;
use crate::frame::{level_of, Frame};
use crate::interpreter::{Interpreter, InterpreterEvent};
use crate::record::{AsyncRecord, StopEvent};
use crate::value::Value;

/// The engine's lifecycle, per §4.5. `Banner` covers the startup text GDB
/// prints before its first prompt; `Dispatching` is entered every time a
/// `stopped` record arrives and left once the matched breakpoint's
/// `invoke` (if any) returns and `-exec-continue` has been issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    SpawningDebugger,
    Banner,
    InstallingBreakpoints,
    Starting,
    Running,
    Dispatching,
    Exited(i32),
    TimedOut,
}

/// Tunable policy knobs, separated from `Engine` so tests can construct one
/// without touching the rest of the setup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub gdb_path: String,
    pub program: String,
    pub args: Vec<String>,
    /// Overall wall-clock budget from `-exec-run` to the inferior's exit;
    /// `None` disables the watchdog.
    pub watchdog: Option<Duration>,
    /// When set, the `Starting` transition connects to this remote target
    /// (`-target-select remote SPEC`) and resumes with `-exec-continue`
    /// instead of spawning a local inferior.
    pub remote: Option<String>,
    /// Console commands run one at a time via `-interpreter-exec console`
    /// before the inferior starts, for sourcing init scripts. Ignored when
    /// `remote` is set.
    pub init_scripts: Vec<String>,
}

impl EngineConfig {
    pub fn new(program: impl Into<String>) -> Self {
        EngineConfig {
            gdb_path: "gdb".to_string(),
            program: program.into(),
            args: Vec::new(),
            watchdog: Some(Duration::from_secs(60)),
            remote: None,
            init_scripts: Vec::new(),
        }
    }
}

/// Drives one debugging session end to end.
pub struct Engine {
    config: EngineConfig,
    state: EngineState,
    breakpoints: BreakpointRegistry,
    child: Option<Child>,
    interpreter: Option<Interpreter>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine {
            config,
            state: EngineState::Created,
            breakpoints: BreakpointRegistry::new(),
            child: None,
            interpreter: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Builds an engine already bound to a running interpreter instead of
    /// spawning a debugger subprocess, for driving the dispatch loop over
    /// an in-memory transport in tests.
    pub fn from_interpreter(config: EngineConfig, interp: Interpreter) -> Self {
        Engine {
            config,
            state: EngineState::SpawningDebugger,
            breakpoints: BreakpointRegistry::new(),
            child: None,
            interpreter: Some(interp),
        }
    }

    /// Registers a breakpoint to be installed once the debugger is up.
    /// Must be called before `run()`.
    pub fn add_breakpoint(&mut self, bp: Arc<dyn UserBreakpoint>) {
        self.breakpoints.add(bp);
    }

    /// Spawns `gdb --interpreter=mi2`, loads the program, installs
    /// breakpoints, and runs the stop/dispatch loop to completion.
    pub async fn run(&mut self) -> Result<i32, EngineError> {
        if self.interpreter.is_none() {
            self.state = EngineState::SpawningDebugger;
            self.spawn_debugger().await?;

            self.state = EngineState::Banner;
            let info = self.interpreter.as_ref().expect("spawned above").read_header().await;
            if let Some(version) = &info.version {
                info!("debugger banner: {version}");
            }
        }

        let interp = self.interpreter.as_ref().expect("spawned above");
        interp.file_exec_and_symbols(&self.config.program).await?;
        if !self.config.args.is_empty() {
            interp.exec_arguments(&self.config.args.join(" ")).await?;
        }

        self.state = EngineState::InstallingBreakpoints;
        self.install_breakpoints().await?;

        self.state = EngineState::Starting;
        self.start_inferior().await?;
        self.state = EngineState::Running;

        let run_fut = self.dispatch_loop();
        let outcome = match self.config.watchdog {
            Some(budget) => match timeout(budget, run_fut).await {
                Ok(result) => result,
                Err(_) => {
                    self.state = EngineState::TimedOut;
                    warn!("watchdog tripped after {:?}, killing debugger", budget);
                    self.kill().await;
                    return Err(EngineError::Timeout(budget.as_secs()));
                }
            },
            None => run_fut.await,
        };

        self.kill().await;
        outcome
    }

    async fn spawn_debugger(&mut self) -> Result<(), EngineError> {
        let mut child = Command::new(&self.config.gdb_path)
            .arg("--interpreter=mi2")
            .arg("--nx")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(EngineError::SpawnFailed)?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");
        let reader = tokio::io::BufReader::new(stdout);

        info!("spawned {} --interpreter=mi2", self.config.gdb_path);
        self.interpreter = Some(Interpreter::spawn(reader, stdin));
        self.child = Some(child);

        // gdb's own stderr carries startup diagnostics (missing shared
        // libraries, bad command-line flags) that never go through the MI
        // channel at all; drain it into the log so it isn't silently lost.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => warn!("gdb stderr: {line}"),
                    Ok(None) | Err(_) => break,
                }
            }
        });

        Ok(())
    }

    /// The `Starting` transition (§4.5): attach to a remote target, run
    /// init scripts, or start the inferior locally, in that priority order.
    async fn start_inferior(&mut self) -> Result<(), EngineError> {
        let interp = self.interpreter.as_ref().expect("spawned before starting");
        if let Some(spec) = &self.config.remote {
            interp.target_select_remote(spec).await?;
            interp.exec_continue().await?;
        } else if !self.config.init_scripts.is_empty() {
            for script in &self.config.init_scripts {
                interp.interpreter_exec("console", script).await?;
            }
        } else {
            interp.exec_run().await?;
        }
        Ok(())
    }

    async fn install_breakpoints(&mut self) -> Result<(), EngineError> {
        let interp = self.interpreter.as_ref().expect("spawned before install");
        for slot in 0..self.breakpoints_len() {
            let bp = self.breakpoints.get(slot).expect("slot just counted").clone();
            let arg = bp.location().to_mi_arg();
            match interp.break_insert(&arg, bp.flags()).await {
                Ok(bkpt) => {
                    let numbers = numbers_from_bkpt(&bkpt);
                    self.breakpoints.bind(slot, &numbers);
                    match numbers.as_slice() {
                        [] => warn!("break-insert for {arg} returned no breakpoint numbers"),
                        [single] => bp.on_set(*single).await,
                        many => bp.on_set_multiple(many).await,
                    }
                }
                Err(err) => {
                    debug!("break-insert for {arg} failed: {err}");
                    bp.on_not_found().await;
                }
            }
        }
        Ok(())
    }

    fn breakpoints_len(&self) -> usize {
        let mut n = 0;
        while self.breakpoints.get(n).is_some() {
            n += 1;
        }
        n
    }

    /// Consumes interpreter events until the inferior exits, dispatching
    /// each `stopped` record to its matching breakpoint (if any) and
    /// resuming with `-exec-continue` once the plugin callback returns.
    async fn dispatch_loop(&mut self) -> Result<i32, EngineError> {
        loop {
            let event = {
                let interp = self.interpreter.as_ref().expect("spawned before dispatch");
                interp.next_event().await
            };
            match event {
                Some(InterpreterEvent::Async(record)) => {
                    if let Some(code) = self.handle_async(&record).await? {
                        return Ok(code);
                    }
                }
                Some(InterpreterEvent::Stream(s)) => {
                    debug!("[{:?}] {}", s.kind, s.text);
                }
                Some(InterpreterEvent::Error(e)) => {
                    return Err(EngineError::Protocol(e));
                }
                Some(InterpreterEvent::Ready(_)) => {
                    // A prompt after the banner phase carries no new lines;
                    // nothing to do.
                }
                Some(InterpreterEvent::Gone) | None => {
                    return Err(EngineError::Protocol(crate::error::ProtocolError::DebuggerGone));
                }
            }
        }
    }

    /// Handles one async record. Returns `Some(exit_code)` once the
    /// inferior has exited.
    async fn handle_async(&mut self, record: &AsyncRecord) -> Result<Option<i32>, EngineError> {
        if record.class != "stopped" {
            return Ok(None);
        }
        self.state = EngineState::Dispatching;
        let stop = StopEvent::from_async(record);
        let interp = self.interpreter.as_ref().expect("spawned before dispatch");

        if let Some(reason) = &stop.reason {
            if reason.starts_with("exited") {
                let code = interp.pending_exit().unwrap_or_else(|| stop.exit_code.unwrap_or(0));
                info!("inferior exited ({reason}), code {code}");
                self.state = EngineState::Exited(code);
                return Ok(Some(code));
            }

            if stop.bkptno.is_none() {
                // A stop neither reporting an exit nor a breakpoint hit is
                // outside the contract this engine understands (a signal,
                // a fork event, ...): log it and end the session rather
                // than loop on it forever.
                let code = interp.pending_exit().unwrap_or(-1);
                warn!("unhandled stop reason {reason:?}, treating as exit code {code}");
                self.state = EngineState::Exited(code);
                return Ok(Some(code));
            }
        }

        if let Some(bkptno) = stop.bkptno {
            let bp = self.breakpoints.by_number(bkptno).cloned();
            if let Some(bp) = bp {
                let level = stop.frame.as_deref().and_then(level_of).unwrap_or(0);
                let frame = Frame::new(interp, level);
                let file = stop.frame.as_deref().and_then(|t| crate::value::tuple_get(t, "file")).and_then(Value::as_str);
                let line = stop.frame.as_deref().and_then(|t| crate::value::tuple_get(t, "line")).and_then(Value::as_str).and_then(|s| s.parse().ok());
                let outcome = AssertUnwindSafe(bp.invoke(&frame, file, line)).catch_unwind().await;
                match outcome {
                    Ok(result) => result?,
                    Err(payload) => {
                        let message = panic_message(&payload);
                        return Err(EngineError::PluginPanic(message));
                    }
                }
            }
        }

        self.state = EngineState::Running;
        self.interpreter.as_ref().expect("spawned before dispatch").exec_continue().await?;
        Ok(None)
    }

    async fn kill(&mut self) {
        if let Some(interp) = self.interpreter.take() {
            // gdb doesn't always answer -gdb-exit before it tears its pipes
            // down; don't let a silent debugger wedge teardown.
            let _ = timeout(Duration::from_secs(5), interp.gdb_exit()).await;
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }
}

/// Extracts a human-readable message from a caught panic payload, the way
/// the standard panic hook does for `&str`/`String` payloads.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "plugin callback panicked with a non-string payload".to_string()
    }
}

/// GDB represents a multi-location breakpoint's own sub-locations with
/// dotted numbers (`"2.1"`, `"2.2"`) that don't fit `u64`, and a `stopped`
/// record's `bkptno` reports the parent integer regardless of which
/// location was actually hit. So dispatch only needs the parent number;
/// a breakpoint with more than one address still maps every stop back to
/// the same `UserBreakpoint` because they all carry the same `bkptno`.
fn numbers_from_bkpt(bkpt: &[crate::value::NamedValue]) -> Vec<u64> {
    crate::value::tuple_get(bkpt, "number")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_from_bkpt_reads_the_number_field() {
        let bkpt = vec![crate::value::NamedValue::new("number", Value::String("1".into()))];
        assert_eq!(numbers_from_bkpt(&bkpt), vec![1]);
    }

    #[test]
    fn numbers_from_bkpt_ignores_unrelated_fields() {
        let bkpt = vec![
            crate::value::NamedValue::new("number", Value::String("2".into())),
            crate::value::NamedValue::new("func", Value::String("main".into())),
        ];
        assert_eq!(numbers_from_bkpt(&bkpt), vec![2]);
    }

    #[test]
    fn numbers_from_bkpt_is_empty_without_a_number_field() {
        let bkpt = vec![crate::value::NamedValue::new("func", Value::String("main".into()))];
        assert!(numbers_from_bkpt(&bkpt).is_empty());
    }
}
