//! Thin front end over `mi-driver`: runs a program under `gdb`, stops at
//! one user-chosen location, logs the frame it stopped in, and lets the
//! program run to completion.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use log::info;

use mi_driver::breakpoint::UserBreakpoint;
use mi_driver::engine::{Engine, EngineConfig};
use mi_driver::error::EngineError;
use mi_driver::frame::Frame;
use mi_driver::locator::Locator;

#[derive(Parser, Debug)]
#[command(about = "Run a program under gdb and log the frame at one breakpoint")]
struct Cli {
    /// Path to the program to debug.
    program: String,

    /// Arguments passed to the debuggee.
    #[arg(last = true)]
    program_args: Vec<String>,

    /// Where to stop: anything `-break-insert` accepts (a function name,
    /// `file:line`, `*0xADDR`, ...).
    #[arg(short, long, default_value = "main")]
    at: String,

    /// Path to the gdb binary.
    #[arg(long, default_value = "gdb")]
    gdb: String,

    /// Seconds to wait for the program to exit before killing it.
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

/// Logs the arguments of the frame it stops in, once.
struct LogFrameArgs {
    location: String,
}

#[async_trait]
impl UserBreakpoint for LogFrameArgs {
    fn location(&self) -> Locator {
        Locator::Raw(self.location.clone())
    }

    async fn on_set(&self, number: u64) {
        info!("breakpoint {number} installed at {}", self.location);
    }

    async fn on_set_multiple(&self, numbers: &[u64]) {
        info!("breakpoint at {} resolved to {} locations: {numbers:?}", self.location, numbers.len());
    }

    async fn on_not_found(&self) {
        info!("breakpoint at {} accepted pending, not yet resolved", self.location);
    }

    async fn invoke(&self, frame: &Frame<'_>, file: Option<&str>, line: Option<u64>) -> Result<(), EngineError> {
        info!(
            "stopped at {}:{} (frame level {})",
            file.unwrap_or("?"),
            line.map(|l| l.to_string()).unwrap_or_else(|| "?".into()),
            frame.level()
        );
        for arg in frame.arg_list().await? {
            info!("  {} = {:?}", arg.name, arg.value);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = EngineConfig::new(cli.program);
    config.gdb_path = cli.gdb;
    config.args = cli.program_args;
    config.watchdog = Some(Duration::from_secs(cli.timeout));

    let mut engine = Engine::new(config);
    engine.add_breakpoint(Arc::new(LogFrameArgs { location: cli.at }));

    let exit_code = engine.run().await?;
    info!("debuggee exited with code {exit_code}");
    std::process::exit(exit_code);
}
