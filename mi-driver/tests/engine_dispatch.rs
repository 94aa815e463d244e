//! End-to-end coverage of the engine's dispatch loop against a fake
//! debugger: a task that reads MI commands off one end of a duplex pipe
//! and writes scripted MI replies back, standing in for a real `gdb`
//! child process (the teacher's own test suite is parser-only for the
//! same reason: spawning a real debugger in CI is not worth the
//! flakiness).
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use mi_driver::breakpoint::UserBreakpoint;
use mi_driver::engine::{Engine, EngineConfig};
use mi_driver::error::EngineError;
use mi_driver::frame::Frame;
use mi_driver::interpreter::Interpreter;
use mi_driver::locator::Locator;

/// Starts an `Interpreter` wired to one side of a duplex pipe and returns
/// it along with the other side, split into a line-buffered reader (what
/// the fake gdb "hears") and a raw writer (what it "says").
fn fake_session() -> (Interpreter, BufReader<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
    let (a_read, b_write) = tokio::io::duplex(1 << 16);
    let (b_read, a_write) = tokio::io::duplex(1 << 16);
    let interp = Interpreter::spawn(BufReader::new(a_read), a_write);
    (interp, BufReader::new(b_read), b_write)
}

struct ExitCapture {
    code: AtomicI32,
    saw_stop: AtomicBool,
}

#[async_trait]
impl UserBreakpoint for ExitCapture {
    fn location(&self) -> Locator {
        Locator::Raw("main".into())
    }

    async fn invoke(&self, _frame: &Frame<'_>, _file: Option<&str>, _line: Option<u64>) -> Result<(), EngineError> {
        self.saw_stop.store(true, Ordering::SeqCst);
        self.code.store(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reads lines from `reader` and replies with the scripted text for each
/// command (matched on everything after the leading `token-`), looking
/// replies up by exact command text. Panics if gdb is asked something the
/// script doesn't cover, so a test's script is also its own documentation
/// of the exact command sequence the engine issues.
async fn run_fake_gdb(
    mut reader: BufReader<tokio::io::DuplexStream>,
    mut writer: tokio::io::DuplexStream,
    script: Vec<(&'static str, &'static str)>,
) {
    let mut line = String::new();
    loop {
        line.clear();
        let n = match reader.read_line(&mut line).await {
            Ok(n) => n,
            Err(_) => return,
        };
        if n == 0 {
            return;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let (token, rest) = match trimmed.split_once('-') {
            Some((digits, rest)) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
                (Some(digits.to_string()), rest)
            }
            _ => (None, trimmed),
        };
        let command_key = format!("-{rest}");
        let reply = script
            .iter()
            .find(|(cmd, _)| *cmd == command_key)
            .map(|(_, reply)| *reply)
            .unwrap_or_else(|| panic!("fake gdb has no scripted reply for {command_key:?}"));
        for reply_line in reply.split('\n').filter(|l| !l.is_empty()) {
            let framed = match token.as_deref() {
                Some(t) if reply_line.starts_with('^') => format!("{t}{reply_line}\n"),
                _ => format!("{reply_line}\n"),
            };
            if writer.write_all(framed.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

#[tokio::test]
async fn breakpoint_invokes_plugin_and_engine_reports_exit_code() {
    let (interp, server_reader, server_writer) = fake_session();

    let script = vec![
        ("-file-exec-and-symbols demo", "^done\n"),
        ("-break-insert main", "^done,bkpt={number=\"1\",type=\"breakpoint\",func=\"main\"}\n"),
        (
            "-exec-run",
            "^running\n*stopped,reason=\"breakpoint-hit\",bkptno=\"1\",thread-id=\"1\",frame={level=\"0\",func=\"main\",file=\"t.c\",line=\"3\"}\n",
        ),
        (
            "-exec-continue",
            "^running\n*stopped,reason=\"exited-normally\",exit-code=\"00\"\n",
        ),
        ("-gdb-exit", "^exit\n"),
    ];
    let gdb_task = tokio::spawn(run_fake_gdb(server_reader, server_writer, script));

    let bp = Arc::new(ExitCapture { code: AtomicI32::new(0), saw_stop: AtomicBool::new(false) });

    let config = EngineConfig { watchdog: Some(Duration::from_secs(5)), ..EngineConfig::new("demo") };
    let mut engine = Engine::from_interpreter(config, interp);
    engine.add_breakpoint(bp.clone());

    let exit_code = engine.run().await.expect("engine should run to completion");

    assert!(bp.saw_stop.load(Ordering::SeqCst), "breakpoint plugin should have been invoked");
    assert_eq!(exit_code, 0, "exited-normally carries exit code 0");
    gdb_task.await.unwrap();
}

#[tokio::test]
async fn exited_with_nonzero_status_decodes_octal_exit_code() {
    let (interp, server_reader, server_writer) = fake_session();

    let script = vec![
        ("-file-exec-and-symbols demo", "^done\n"),
        ("-break-insert main", "^done,bkpt={number=\"1\",type=\"breakpoint\",func=\"main\"}\n"),
        (
            "-exec-run",
            "^running\n*stopped,reason=\"breakpoint-hit\",bkptno=\"1\",thread-id=\"1\",frame={level=\"0\",func=\"main\",file=\"t.c\",line=\"3\"}\n",
        ),
        (
            "-exec-continue",
            "^running\n*stopped,reason=\"exited\",exit-code=\"01\"\n",
        ),
        ("-gdb-exit", "^exit\n"),
    ];
    let gdb_task = tokio::spawn(run_fake_gdb(server_reader, server_writer, script));

    let bp = Arc::new(ExitCapture { code: AtomicI32::new(0), saw_stop: AtomicBool::new(false) });
    let config = EngineConfig { watchdog: Some(Duration::from_secs(5)), ..EngineConfig::new("demo") };
    let mut engine = Engine::from_interpreter(config, interp);
    engine.add_breakpoint(bp.clone());

    let exit_code = engine.run().await.expect("engine should run to completion");
    assert_eq!(exit_code, 1, "octal exit-code \"01\" decodes to 1");
    gdb_task.await.unwrap();
}

#[tokio::test]
async fn register_filter_skips_indices_past_the_name_table() {
    let (interp, server_reader, server_writer) = fake_session();
    let script = vec![
        ("-stack-select-frame 0", "^done\n"),
        ("-data-list-register-names", "^done,register-names=[\"rax\",\"rbx\"]\n"),
        (
            "-data-list-register-values x",
            "^done,register-values=[{number=\"0\",value=\"0x1\"},{number=\"1\",value=\"0x2\"},{number=\"2\",value=\"0x3\"}]\n",
        ),
    ];
    let gdb_task = tokio::spawn(run_fake_gdb(server_reader, server_writer, script));

    let frame = Frame::new(&interp, 0);
    let regs = frame.regs().await.unwrap();
    assert_eq!(regs.len(), 2, "register at index 2 has no name and must be skipped, not panic");
    assert_eq!(regs[0].name, "rax");
    assert_eq!(regs[1].name, "rbx");

    drop(frame);
    drop(interp);
    gdb_task.abort();
}
