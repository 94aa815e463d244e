/// The command/response half of the driver: turns high-level MI operations
/// into framed commands, correlates replies by token, and forwards
/// everything the background reader doesn't own to an event channel.
///
/// Mirrors the teacher's `GdbCommunication`: a spawned reader task owns the
/// pipe, a token counter and a map of pending one-shot replies let many
/// callers await their own command concurrently.
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::ProtocolError;
use crate::record::{AsyncRecord, Classification, Record, ResultClass, ResultRecord, StreamRecord};
use crate::token_stream::TokenStream;
use crate::value::{NamedValue, Value};

/// Everything the reader task hands to the rest of the engine: async
/// notifications, console/log/target stream text, and the one-shot
/// banner collected before the debugger's very first prompt.
#[derive(Debug)]
pub enum InterpreterEvent {
    Async(AsyncRecord),
    Stream(StreamRecord),
    /// Every stream line seen before the first `(gdb)` prompt, delivered
    /// once as a batch instead of individually, so the engine's `Banner`
    /// phase has a clean place to wait.
    Ready(Vec<String>),
    /// A protocol-level contract violation the reader task detected on
    /// its own (unsolicited token, mis-tokened async record, ...).
    Error(ProtocolError),
    /// The debugger closed its output pipe.
    Gone,
}

/// The version/toolset/config banner GDB prints before its first prompt,
/// parsed out of the raw lines on a best-effort basis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub raw: Vec<String>,
    pub version: Option<String>,
    pub toolset: Option<String>,
    pub config: Option<String>,
}

impl VersionInfo {
    fn from_banner(raw: Vec<String>) -> Self {
        let version = raw.iter().find(|l| l.starts_with("GNU gdb")).cloned();
        let config = raw
            .iter()
            .find_map(|l| l.split_once("configured as \"").map(|(_, rest)| rest.trim_end_matches(['.', '"']).to_string()));
        let toolset = raw.iter().find(|l| l.contains("--host=") || l.contains("--target=")).cloned();
        VersionInfo { raw, version, toolset, config }
    }
}

/// One memory region as returned by `-data-read-memory-bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBytes {
    pub begin: u64,
    pub offset: u64,
    pub contents: Vec<u8>,
}

/// A tracepoint hit located by `trace_find` and its variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundTracepoint {
    pub found: bool,
    pub fields: Vec<NamedValue>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<ResultRecord>>>>;

/// Sentinel for "no plugin has called `set_exit` yet" in `pending_exit`;
/// real exit codes fit comfortably inside an `i32`, so this value can
/// never collide with a legitimate one.
const NO_PENDING_EXIT: i64 = i64::MIN;

/// Drives one debugger subprocess's MI channel.
pub struct Interpreter {
    next_token: AtomicU64,
    pending: Pending,
    command_tx: mpsc::UnboundedSender<(Option<u64>, String)>,
    events: Mutex<mpsc::UnboundedReceiver<InterpreterEvent>>,
    /// The process's pending exit slot (§3): written by a plugin's
    /// `Frame::set_exit`, read by the engine when the inferior actually
    /// terminates. `NO_PENDING_EXIT` means unset.
    pending_exit: AtomicI64,
}

impl Interpreter {
    /// Spawns the reader/writer pump over `reader`/`writer` and returns a
    /// handle. The pump runs until the stream hits EOF or an unrecoverable
    /// parse error, at which point it emits `InterpreterEvent::Gone`.
    pub fn spawn<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<(Option<u64>, String)>();

        let mut stream = TokenStream::new(reader, writer);
        let reader_pending = pending.clone();
        let reader_events = event_tx.clone();

        tokio::spawn(async move {
            // Everything gdb prints before its very first `(gdb)` prompt
            // is the startup banner, not a reply to anything: it's
            // buffered here and handed over once as `Ready` instead of
            // being forwarded line-by-line as ordinary stream records.
            let mut banner = Vec::new();
            let mut banner_sent = false;

            loop {
                tokio::select! {
                    biased;
                    next = stream.next_classified() => {
                        match next {
                            Ok(Some(Classification::Record(Record::Result(r)))) => {
                                let Some(token) = r.token else {
                                    let _ = reader_events.send(InterpreterEvent::Error(
                                        ProtocolError::UnexpectedRecord(format!("result record with no token: {r:?}")),
                                    ));
                                    continue;
                                };
                                let mut pending_guard = reader_pending.lock().await;
                                if let Some(tx) = pending_guard.remove(&token) {
                                    drop(pending_guard);
                                    let _ = tx.send(r);
                                    continue;
                                }
                                let expected = pending_guard.keys().min().copied().unwrap_or(token);
                                drop(pending_guard);
                                let _ = reader_events.send(InterpreterEvent::Error(
                                    ProtocolError::MismatchedToken { expected, got: token },
                                ));
                            }
                            Ok(Some(Classification::Record(Record::Async(a)))) => {
                                if a.token.is_some() {
                                    let _ = reader_events.send(InterpreterEvent::Error(
                                        ProtocolError::UnexpectedAsyncRecord(format!("{a:?}")),
                                    ));
                                } else {
                                    let _ = reader_events.send(InterpreterEvent::Async(a));
                                }
                            }
                            Ok(Some(Classification::Record(Record::Stream(s)))) => {
                                if banner_sent {
                                    let _ = reader_events.send(InterpreterEvent::Stream(s));
                                } else {
                                    banner.push(s.text);
                                }
                            }
                            Ok(Some(Classification::Prompt)) => {
                                if !banner_sent {
                                    banner_sent = true;
                                    let _ = reader_events.send(InterpreterEvent::Ready(std::mem::take(&mut banner)));
                                }
                            }
                            Ok(Some(Classification::Ignored)) => continue,
                            Ok(None) => {
                                reader_pending.lock().await.clear();
                                let _ = reader_events.send(InterpreterEvent::Gone);
                                break;
                            }
                            Err(_) => {
                                reader_pending.lock().await.clear();
                                let _ = reader_events.send(InterpreterEvent::Gone);
                                break;
                            }
                        }
                    }
                    cmd = command_rx.recv() => {
                        match cmd {
                            Some((token, text)) => {
                                if stream.send(token, &text).await.is_err() {
                                    reader_pending.lock().await.clear();
                                    let _ = reader_events.send(InterpreterEvent::Gone);
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Interpreter {
            next_token: AtomicU64::new(1),
            pending,
            command_tx,
            events: Mutex::new(event_rx),
            pending_exit: AtomicI64::new(NO_PENDING_EXIT),
        }
    }

    /// Waits for the banner batch that precedes the debugger's first
    /// prompt and parses a best-effort version/toolset/config out of it.
    /// Must be called once, before the first command is issued.
    pub async fn read_header(&self) -> VersionInfo {
        match self.next_event().await {
            Some(InterpreterEvent::Ready(lines)) => VersionInfo::from_banner(lines),
            _ => VersionInfo::default(),
        }
    }

    /// Records the process's eventual exit code, overriding whatever the
    /// terminal `stopped` record's own `exit-code` field says. Last
    /// writer wins.
    pub fn set_pending_exit(&self, code: i32) {
        self.pending_exit.store(code as i64, Ordering::SeqCst);
    }

    /// The exit code a plugin set via `set_pending_exit`, if any.
    pub fn pending_exit(&self) -> Option<i32> {
        match self.pending_exit.load(Ordering::SeqCst) {
            NO_PENDING_EXIT => None,
            code => Some(code as i32),
        }
    }

    /// Waits for the next event not already consumed as a command reply.
    pub async fn next_event(&self) -> Option<InterpreterEvent> {
        self.events.lock().await.recv().await
    }

    /// Sends `command` and awaits its correlated result record, surfacing
    /// `^error` replies as `ProtocolError::DebuggerError`.
    pub async fn execute(&self, command: &str) -> Result<ResultRecord, ProtocolError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(token, tx);

        if self.command_tx.send((Some(token), command.to_string())).is_err() {
            self.pending.lock().await.remove(&token);
            return Err(ProtocolError::DebuggerGone);
        }

        let record = rx.await.map_err(|_| ProtocolError::DebuggerGone)?;
        if record.class == ResultClass::Error {
            let msg = record
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("(no message)")
                .to_string();
            let code = record.get("code").and_then(Value::as_str).map(str::to_string);
            return Err(ProtocolError::DebuggerError { msg, code });
        }
        Ok(record)
    }

    fn results_of(record: &ResultRecord) -> &[NamedValue] {
        &record.results
    }

    /// Like `execute`, but also raises `UnexpectedResultClass` if the
    /// reply isn't the class the caller contractually expects (most
    /// commands reply `done`; a handful, like the execution family,
    /// reply `running` instead).
    async fn execute_expect(&self, command: &str, expected: ResultClass) -> Result<ResultRecord, ProtocolError> {
        let record = self.execute(command).await?;
        if record.class != expected {
            return Err(ProtocolError::UnexpectedResultClass {
                expected: format!("{expected:?}"),
                got: format!("{:?}", record.class),
            });
        }
        Ok(record)
    }

    // ---- Session (§4.3) ----------------------------------------------

    pub async fn gdb_set(&self, name: &str, value: &str) -> Result<(), ProtocolError> {
        self.execute(&format!("-gdb-set {name} {value}")).await?;
        Ok(())
    }

    /// `show(name)`: the value side of `gdb_set`.
    pub async fn show(&self, name: &str) -> Result<String, ProtocolError> {
        let record = self.execute(&format!("-gdb-show {name}")).await?;
        record
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MissingValue("value".into()))
    }

    pub async fn version(&self) -> Result<String, ProtocolError> {
        self.show("version").await
    }

    pub async fn enable_timings(&self, enable: bool) -> Result<(), ProtocolError> {
        self.gdb_set("timings", if enable { "1" } else { "0" }).await
    }

    pub async fn file_exec_and_symbols(&self, path: &str) -> Result<(), ProtocolError> {
        self.execute(&format!("-file-exec-and-symbols {path}")).await?;
        Ok(())
    }

    /// Runs `command` through GDB's CLI interpreter layer (used for init
    /// scripts and anything with no dedicated MI verb).
    pub async fn interpreter_exec(&self, interpreter: &str, command: &str) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self
            .execute(&format!("-interpreter-exec {interpreter} {}", crate::value::quote(command)))
            .await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn target_select_remote(&self, spec: &str) -> Result<(), ProtocolError> {
        self.execute_expect(&format!("-target-select remote {spec}"), ResultClass::Connected).await?;
        Ok(())
    }

    pub async fn exec_arguments(&self, args: &str) -> Result<(), ProtocolError> {
        self.execute(&format!("-exec-arguments {args}")).await?;
        Ok(())
    }

    pub async fn environment_cd(&self, dir: &str) -> Result<(), ProtocolError> {
        self.execute(&format!("-environment-cd {dir}")).await?;
        Ok(())
    }

    // ---- Breakpoints ---------------------------------------------------

    /// Issues `-break-insert` with the given location and flags, returning
    /// the parsed `bkpt` tuple (or, for a pending location, the first
    /// `bkpt` of a possible multi-location insert).
    pub async fn break_insert(&self, location: &str, flags: &str) -> Result<Vec<NamedValue>, ProtocolError> {
        let command = if flags.is_empty() {
            format!("-break-insert {location}")
        } else {
            format!("-break-insert {flags} {location}")
        };
        let record = self.execute(&command).await?;
        record
            .get("bkpt")
            .and_then(Value::as_tuple)
            .map(|t| t.to_vec())
            .ok_or_else(|| ProtocolError::MissingValue("bkpt".into()))
    }

    pub async fn break_delete(&self, numbers: &[u64]) -> Result<(), ProtocolError> {
        let nums = numbers.iter().map(u64::to_string).collect::<Vec<_>>().join(" ");
        self.execute(&format!("-break-delete {nums}")).await?;
        Ok(())
    }

    pub async fn break_condition(&self, number: u64, expr: &str) -> Result<(), ProtocolError> {
        self.execute(&format!("-break-condition {number} {expr}")).await?;
        Ok(())
    }

    pub async fn break_list(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute("-break-list").await?;
        Ok(Self::results_of(&record).to_vec())
    }

    /// Ignores the first `count` hits of breakpoint `number`.
    pub async fn break_after(&self, number: u64, count: u64) -> Result<(), ProtocolError> {
        self.execute(&format!("-break-after {number} {count}")).await?;
        Ok(())
    }

    /// Attaches `commands` to run (in order) every time breakpoint
    /// `number` is hit.
    pub async fn break_commands(&self, number: u64, commands: &[String]) -> Result<(), ProtocolError> {
        let joined = commands.iter().map(|c| crate::value::quote(c)).collect::<Vec<_>>().join(" ");
        self.execute(&format!("-break-commands {number} {joined}")).await?;
        Ok(())
    }

    pub async fn break_enable(&self, numbers: &[u64]) -> Result<(), ProtocolError> {
        let nums = numbers.iter().map(u64::to_string).collect::<Vec<_>>().join(" ");
        self.execute(&format!("-break-enable {nums}")).await?;
        Ok(())
    }

    pub async fn break_disable(&self, numbers: &[u64]) -> Result<(), ProtocolError> {
        let nums = numbers.iter().map(u64::to_string).collect::<Vec<_>>().join(" ");
        self.execute(&format!("-break-disable {nums}")).await?;
        Ok(())
    }

    pub async fn break_info(&self, number: u64) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute(&format!("-break-info {number}")).await?;
        record
            .get("bkpt")
            .and_then(Value::as_tuple)
            .map(|t| t.to_vec())
            .ok_or_else(|| ProtocolError::MissingValue("bkpt".into()))
    }

    /// Installs a watchpoint; `access`/`read` select `-a`/`-r` instead of
    /// a plain write watchpoint.
    pub async fn break_watch(&self, expr: &str, access: bool, read: bool) -> Result<Vec<NamedValue>, ProtocolError> {
        let flag = if access { "-a " } else if read { "-r " } else { "" };
        let record = self.execute(&format!("-break-watch {flag}{expr}")).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn catch_load(&self, regex: &str, temporary: bool) -> Result<Vec<NamedValue>, ProtocolError> {
        let flag = if temporary { "-t " } else { "" };
        let record = self.execute(&format!("-catch-load {flag}{regex}")).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn catch_unload(&self, regex: &str, temporary: bool) -> Result<Vec<NamedValue>, ProtocolError> {
        let flag = if temporary { "-t " } else { "" };
        let record = self.execute(&format!("-catch-unload {flag}{regex}")).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn catch_assert(&self, condition: Option<&str>) -> Result<Vec<NamedValue>, ProtocolError> {
        let command = match condition {
            Some(c) => format!("-catch-assert {c}"),
            None => "-catch-assert".to_string(),
        };
        let record = self.execute(&command).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn catch_exception(&self, exception: Option<&str>) -> Result<Vec<NamedValue>, ProtocolError> {
        let command = match exception {
            Some(e) => format!("-catch-exception -e {e}"),
            None => "-catch-exception".to_string(),
        };
        let record = self.execute(&command).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    /// Inserts a dynamic printf: logs `format` with `args` every time
    /// `location` is hit, without stopping.
    pub async fn dprintf_insert(&self, location: &str, format: &str, args: &[String]) -> Result<Vec<NamedValue>, ProtocolError> {
        let mut command = format!("-dprintf-insert {location} {}", crate::value::quote(format));
        for a in args {
            command.push(',');
            command.push_str(a);
        }
        let record = self.execute(&command).await?;
        record
            .get("bkpt")
            .and_then(Value::as_tuple)
            .map(|t| t.to_vec())
            .ok_or_else(|| ProtocolError::MissingValue("bkpt".into()))
    }

    // ---- Execution ------------------------------------------------------

    pub async fn exec_run(&self) -> Result<(), ProtocolError> {
        self.execute_expect("-exec-run", ResultClass::Running).await?;
        Ok(())
    }

    pub async fn exec_continue(&self) -> Result<(), ProtocolError> {
        self.execute_expect("-exec-continue", ResultClass::Running).await?;
        Ok(())
    }

    pub async fn exec_next(&self) -> Result<(), ProtocolError> {
        self.execute_expect("-exec-next", ResultClass::Running).await?;
        Ok(())
    }

    pub async fn exec_step(&self) -> Result<(), ProtocolError> {
        self.execute_expect("-exec-step", ResultClass::Running).await?;
        Ok(())
    }

    pub async fn exec_step_instruction(&self, reverse: bool) -> Result<(), ProtocolError> {
        let command = if reverse { "-exec-step-instruction --reverse" } else { "-exec-step-instruction" };
        self.execute_expect(command, ResultClass::Running).await?;
        Ok(())
    }

    pub async fn exec_next_instruction(&self, reverse: bool) -> Result<(), ProtocolError> {
        let command = if reverse { "-exec-next-instruction --reverse" } else { "-exec-next-instruction" };
        self.execute_expect(command, ResultClass::Running).await?;
        Ok(())
    }

    pub async fn exec_finish(&self) -> Result<(), ProtocolError> {
        self.execute_expect("-exec-finish", ResultClass::Running).await?;
        Ok(())
    }

    pub async fn exec_jump(&self, location: &str) -> Result<(), ProtocolError> {
        self.execute_expect(&format!("-exec-jump {location}"), ResultClass::Running).await?;
        Ok(())
    }

    pub async fn exec_until(&self, location: Option<&str>) -> Result<(), ProtocolError> {
        let command = match location {
            Some(l) => format!("-exec-until {l}"),
            None => "-exec-until".to_string(),
        };
        self.execute_expect(&command, ResultClass::Running).await?;
        Ok(())
    }

    pub async fn exec_return(&self, value: Option<&str>) -> Result<(), ProtocolError> {
        match value {
            Some(v) => self.execute(&format!("-exec-return {v}")).await?,
            None => self.execute("-exec-return").await?,
        };
        Ok(())
    }

    pub async fn exec_interrupt(&self) -> Result<(), ProtocolError> {
        self.execute("-exec-interrupt").await?;
        Ok(())
    }

    // ---- Stack ----------------------------------------------------------

    pub async fn stack_list_frames(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute("-stack-list-frames").await?;
        record
            .get("stack")
            .and_then(Value::as_list)
            .and_then(|l| l.as_results())
            .map(|r| r.to_vec())
            .ok_or_else(|| ProtocolError::MissingValue("stack".into()))
    }

    pub async fn stack_select_frame(&self, level: u64) -> Result<(), ProtocolError> {
        self.execute(&format!("-stack-select-frame {level}")).await?;
        Ok(())
    }

    pub async fn stack_info_frame(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute("-stack-info-frame").await?;
        record
            .get("frame")
            .and_then(Value::as_tuple)
            .map(|t| t.to_vec())
            .ok_or_else(|| ProtocolError::MissingValue("frame".into()))
    }

    pub async fn stack_info_depth(&self) -> Result<u64, ProtocolError> {
        let record = self.execute("-stack-info-depth").await?;
        record
            .get("depth")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProtocolError::MissingValue("depth".into()))
    }

    pub async fn stack_list_arguments(&self, frame: u64) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self
            .execute(&format!("-stack-list-arguments --all-values {frame} {frame}"))
            .await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn stack_list_locals(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute("-stack-list-locals --all-values").await?;
        let locals = record
            .get("locals")
            .and_then(Value::as_list)
            .and_then(|l| l.as_values())
            .ok_or_else(|| ProtocolError::MissingValue("locals".into()))?;
        locals
            .iter()
            .map(|v| v.as_tuple().map(|t| t.to_vec()).ok_or_else(|| ProtocolError::UnexpectedType("locals entry".into())))
            .collect()
    }

    pub async fn stack_list_variables(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute("-stack-list-variables --all-values").await?;
        let vars = record
            .get("variables")
            .and_then(Value::as_list)
            .and_then(|l| l.as_values())
            .ok_or_else(|| ProtocolError::MissingValue("variables".into()))?;
        vars.iter()
            .map(|v| v.as_tuple().map(|t| t.to_vec()).ok_or_else(|| ProtocolError::UnexpectedType("variables entry".into())))
            .collect()
    }

    // ---- Variable objects -------------------------------------------------

    pub async fn var_create(&self, name: &str, expr: &str) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute(&format!("-var-create {name} * {expr}")).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn var_delete(&self, name: &str) -> Result<(), ProtocolError> {
        self.execute(&format!("-var-delete {name}")).await?;
        Ok(())
    }

    pub async fn var_set_format(&self, name: &str, format: &str) -> Result<(), ProtocolError> {
        self.execute(&format!("-var-set-format {name} {format}")).await?;
        Ok(())
    }

    pub async fn var_show_format(&self, name: &str) -> Result<String, ProtocolError> {
        let record = self.execute(&format!("-var-show-format {name}")).await?;
        record
            .get("format")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MissingValue("format".into()))
    }

    pub async fn var_info_num_children(&self, name: &str) -> Result<u64, ProtocolError> {
        let record = self.execute(&format!("-var-info-num-children {name}")).await?;
        record
            .get("numchild")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProtocolError::MissingValue("numchild".into()))
    }

    pub async fn var_list_children(&self, name: &str) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute(&format!("-var-list-children --all-values {name}")).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn var_info_type(&self, name: &str) -> Result<String, ProtocolError> {
        let record = self.execute(&format!("-var-info-type {name}")).await?;
        record
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MissingValue("type".into()))
    }

    pub async fn var_info_expression(&self, name: &str) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute(&format!("-var-info-expression {name}")).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn var_info_path_expression(&self, name: &str) -> Result<String, ProtocolError> {
        let record = self.execute(&format!("-var-info-path-expression {name}")).await?;
        record
            .get("path_expr")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MissingValue("path_expr".into()))
    }

    pub async fn var_show_attributes(&self, name: &str) -> Result<String, ProtocolError> {
        let record = self.execute(&format!("-var-show-attributes {name}")).await?;
        record
            .get("attr")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MissingValue("attr".into()))
    }

    pub async fn var_evaluate_expression(&self, name: &str) -> Result<String, ProtocolError> {
        let record = self.execute(&format!("-var-evaluate-expression {name}")).await?;
        record
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MissingValue("value".into()))
    }

    pub async fn var_assign(&self, name: &str, expr: &str) -> Result<String, ProtocolError> {
        let record = self.execute(&format!("-var-assign {name} {}", crate::value::quote(expr))).await?;
        record
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MissingValue("value".into()))
    }

    pub async fn var_update(&self, name: &str) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute(&format!("-var-update --all-values {name}")).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn var_set_frozen(&self, name: &str, frozen: bool) -> Result<(), ProtocolError> {
        self.execute(&format!("-var-set-frozen {name} {}", if frozen { 1 } else { 0 })).await?;
        Ok(())
    }

    pub async fn var_set_update_range(&self, name: &str, from: u64, to: u64) -> Result<(), ProtocolError> {
        self.execute(&format!("-var-set-update-range {name} {from} {to}")).await?;
        Ok(())
    }

    pub async fn var_set_visualizer(&self, name: &str, visualizer: &str) -> Result<(), ProtocolError> {
        self.execute(&format!("-var-set-visualizer {name} {visualizer}")).await?;
        Ok(())
    }

    // ---- Data / expressions ---------------------------------------------

    pub async fn data_evaluate_expression(&self, expr: &str) -> Result<String, ProtocolError> {
        let record = self.execute(&format!("-data-evaluate-expression \"{expr}\"")).await?;
        record
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MissingValue("value".into()))
    }

    /// Disassembles `start`..`end` (mode 0: no source interleaved).
    pub async fn data_disassemble(&self, start: &str, end: &str, mode: u8) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute(&format!("-data-disassemble -s {start} -e {end} -- {mode}")).await?;
        let instructions = record
            .get("asm_insns")
            .and_then(Value::as_list)
            .and_then(|l| l.as_values())
            .ok_or_else(|| ProtocolError::MissingValue("asm_insns".into()))?;
        instructions
            .iter()
            .map(|v| v.as_tuple().map(|t| t.to_vec()).ok_or_else(|| ProtocolError::UnexpectedType("asm_insns entry".into())))
            .collect()
    }

    pub async fn data_list_changed_registers(&self) -> Result<Vec<String>, ProtocolError> {
        let record = self.execute("-data-list-changed-registers").await?;
        let names = record
            .get("changed-registers")
            .and_then(Value::as_list)
            .and_then(|l| l.as_values())
            .ok_or_else(|| ProtocolError::MissingValue("changed-registers".into()))?;
        Ok(names.iter().filter_map(Value::as_str).map(str::to_string).collect())
    }

    pub async fn data_list_register_names(&self) -> Result<Vec<String>, ProtocolError> {
        let record = self.execute("-data-list-register-names").await?;
        let names = record
            .get("register-names")
            .and_then(Value::as_list)
            .and_then(|l| l.as_values())
            .ok_or_else(|| ProtocolError::MissingValue("register-names".into()))?;
        Ok(names.iter().filter_map(Value::as_str).map(str::to_string).collect())
    }

    /// Each element of the reply's `register-values` list is a bare tuple
    /// (`{number="0",value="0x0"}`), not a keyed result, so this returns
    /// one tuple per register rather than `Vec<NamedValue>`.
    pub async fn data_list_register_values(&self) -> Result<Vec<Vec<NamedValue>>, ProtocolError> {
        let record = self.execute("-data-list-register-values x").await?;
        let values = record
            .get("register-values")
            .and_then(Value::as_list)
            .and_then(|l| l.as_values())
            .ok_or_else(|| ProtocolError::MissingValue("register-values".into()))?;
        values
            .iter()
            .map(|v| v.as_tuple().map(|t| t.to_vec()).ok_or_else(|| ProtocolError::UnexpectedType("register-values entry".into())))
            .collect()
    }

    pub async fn data_read_memory(&self, address: &str, word_size: u8, rows: u64, cols: u64) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute(&format!("-data-read-memory {address} x {word_size} {rows} {cols}")).await?;
        Ok(Self::results_of(&record).to_vec())
    }

    /// Reads `count` raw bytes at `address`, as used by `Frame::print`'s
    /// bitwise rendering path.
    pub async fn data_read_memory_bytes(&self, address: &str, count: u64) -> Result<MemoryBytes, ProtocolError> {
        let record = self.execute(&format!("-data-read-memory-bytes {address} {count}")).await?;
        let memory = record
            .get("memory")
            .and_then(Value::as_list)
            .and_then(|l| l.as_values())
            .ok_or_else(|| ProtocolError::MissingValue("memory".into()))?;
        let entry = memory
            .first()
            .and_then(Value::as_tuple)
            .ok_or_else(|| ProtocolError::MissingValue("memory[0]".into()))?;
        let hex_field = |key: &str| -> Result<u64, ProtocolError> {
            let text = entry
                .iter()
                .find(|nv| nv.key == key)
                .and_then(|nv| nv.value.as_str())
                .ok_or_else(|| ProtocolError::MissingValue(key.into()))?;
            u64::from_str_radix(text.trim_start_matches("0x"), 16)
                .map_err(|_| ProtocolError::UnexpectedType(format!("{key} {text:?} not hex")))
        };
        let begin = hex_field("begin")?;
        let offset = hex_field("offset")?;
        let contents_hex = entry
            .iter()
            .find(|nv| nv.key == "contents")
            .and_then(|nv| nv.value.as_str())
            .ok_or_else(|| ProtocolError::MissingValue("contents".into()))?;
        let contents = decode_hex_bytes(contents_hex)
            .ok_or_else(|| ProtocolError::UnexpectedType(format!("contents {contents_hex:?} not hex")))?;
        Ok(MemoryBytes { begin, offset, contents })
    }

    pub async fn data_write_memory_bytes(&self, address: &str, contents_hex: &str) -> Result<(), ProtocolError> {
        self.execute(&format!("-data-write-memory-bytes {address} {contents_hex}")).await?;
        Ok(())
    }

    // ---- Trace ------------------------------------------------------------

    async fn trace_find_raw(&self, mode_and_args: &str) -> Result<FoundTracepoint, ProtocolError> {
        let record = self.execute(&format!("-trace-find {mode_and_args}")).await?;
        let found = record.get("found").and_then(Value::as_str).map(|s| s != "0").unwrap_or(false);
        Ok(FoundTracepoint { found, fields: Self::results_of(&record).to_vec() })
    }

    pub async fn trace_find_none(&self) -> Result<FoundTracepoint, ProtocolError> {
        self.trace_find_raw("none").await
    }

    pub async fn trace_find_frame_number(&self, n: u64) -> Result<FoundTracepoint, ProtocolError> {
        self.trace_find_raw(&format!("frame-number {n}")).await
    }

    pub async fn trace_find_tracepoint_number(&self, n: u64) -> Result<FoundTracepoint, ProtocolError> {
        self.trace_find_raw(&format!("tracepoint-number {n}")).await
    }

    pub async fn trace_find_pc(&self, addr: &str) -> Result<FoundTracepoint, ProtocolError> {
        self.trace_find_raw(&format!("pc {addr}")).await
    }

    pub async fn trace_find_pc_inside_range(&self, start: &str, end: &str) -> Result<FoundTracepoint, ProtocolError> {
        self.trace_find_raw(&format!("pc-inside-range {start} {end}")).await
    }

    pub async fn trace_find_pc_outside_range(&self, start: &str, end: &str) -> Result<FoundTracepoint, ProtocolError> {
        self.trace_find_raw(&format!("pc-outside-range {start} {end}")).await
    }

    pub async fn trace_find_line(&self, location: &str) -> Result<FoundTracepoint, ProtocolError> {
        self.trace_find_raw(&format!("line {location}")).await
    }

    pub async fn trace_define_variable(&self, name: &str, value: Option<&str>) -> Result<(), ProtocolError> {
        let command = match value {
            Some(v) => format!("-trace-define-variable {name} {v}"),
            None => format!("-trace-define-variable {name}"),
        };
        self.execute(&command).await?;
        Ok(())
    }

    pub async fn trace_frame_collected(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute("-trace-frame-collected").await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn trace_list_variables(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute("-trace-list-variables").await?;
        let vars = record
            .get("trace-variables")
            .and_then(Value::as_list)
            .and_then(|l| l.as_values())
            .ok_or_else(|| ProtocolError::MissingValue("trace-variables".into()))?;
        vars.iter()
            .map(|v| v.as_tuple().map(|t| t.to_vec()).ok_or_else(|| ProtocolError::UnexpectedType("trace-variables entry".into())))
            .collect()
    }

    pub async fn trace_save(&self, filename: &str, remote: bool) -> Result<(), ProtocolError> {
        let flag = if remote { "-r " } else { "" };
        self.execute(&format!("-trace-save {flag}{filename}")).await?;
        Ok(())
    }

    pub async fn trace_start(&self) -> Result<(), ProtocolError> {
        self.execute("-trace-start").await?;
        Ok(())
    }

    pub async fn trace_status(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute("-trace-status").await?;
        Ok(Self::results_of(&record).to_vec())
    }

    pub async fn trace_stop(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        let record = self.execute("-trace-stop").await?;
        Ok(Self::results_of(&record).to_vec())
    }

    // ---- Process control / misc -----------------------------------------

    pub async fn gdb_exit(&self) -> Result<(), ProtocolError> {
        let _ = self.execute_expect("-gdb-exit", ResultClass::Exit).await;
        Ok(())
    }
}

/// Decodes a lowercase hex byte string (`-data-read-memory-bytes`'s
/// `contents` field) into raw bytes.
fn decode_hex_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
