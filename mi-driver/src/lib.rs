//! Drives a GDB subprocess through its machine-interface dialect: frames
//! and parses the wire protocol, issues commands and correlates their
//! replies by token, and dispatches `stopped` events to user-supplied
//! breakpoint plugins.
//!
//! The pieces compose bottom-up: [`parser`] turns one line of output into
//! a [`record::Record`], [`token_stream::TokenStream`] frames that over an
//! async pipe pair, [`interpreter::Interpreter`] correlates commands with
//! replies and exposes the MI command set, [`frame::Frame`] is the
//! high-level view bound to a stopped thread's frame, and [`engine::Engine`]
//! owns the subprocess and the stop/dispatch loop.

pub mod breakpoint;
pub mod engine;
pub mod error;
pub mod frame;
pub mod interpreter;
pub mod locator;
pub mod parser;
pub mod record;
pub mod token_stream;
pub mod value;

pub use breakpoint::{BreakpointRegistry, UserBreakpoint};
pub use engine::{Engine, EngineConfig, EngineState};
pub use error::{EngineError, ParseError, ProtocolError};
pub use frame::{Frame, ParsedValue};
pub use interpreter::{FoundTracepoint, Interpreter, InterpreterEvent, MemoryBytes, VersionInfo};
pub use locator::{Address, Explicit, Linespec, Locator};
pub use record::{AsyncRecord, Classification, Record, ResultClass, ResultRecord, StopEvent, StreamRecord};
pub use value::{NamedValue, Value, ValueList};
