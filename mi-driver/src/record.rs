/// The three record families the debugger emits, plus the stop-event view
/// the engine extracts from an async `stopped` record.
use crate::value::{tuple_get, NamedValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Console,
    Target,
    Log,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub kind: StreamKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    Exec,
    Status,
    Notify,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsyncRecord {
    pub kind: AsyncKind,
    /// The raw class identifier (`"stopped"`, `"running"`, `"breakpoint-modified"`, ...).
    /// Unknown classes are accepted verbatim so new debugger versions don't break parsing.
    pub class: String,
    pub results: Vec<NamedValue>,
    pub token: Option<u64>,
}

impl AsyncRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        tuple_get(&self.results, key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
    /// A class identifier outside the known set, surfaced verbatim.
    Other,
}

impl ResultClass {
    pub fn parse(s: &str) -> (Self, Option<&str>) {
        match s {
            "done" => (ResultClass::Done, None),
            "running" => (ResultClass::Running, None),
            "connected" => (ResultClass::Connected, None),
            "error" => (ResultClass::Error, None),
            "exit" => (ResultClass::Exit, None),
            other => (ResultClass::Other, Some(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub token: Option<u64>,
    pub class: ResultClass,
    pub raw_class: Option<String>,
    pub results: Vec<NamedValue>,
}

impl ResultRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        tuple_get(&self.results, key)
    }
}

/// One classified line of debugger output.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Stream(StreamRecord),
    Async(AsyncRecord),
    Result(ResultRecord),
}

impl Record {
    pub fn token(&self) -> Option<u64> {
        match self {
            Record::Stream(_) => None,
            Record::Async(a) => a.token,
            Record::Result(r) => r.token,
        }
    }
}

/// Result of classifying one raw debugger output line.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Prompt,
    Record(Record),
    /// Blank or otherwise uninterpretable-but-harmless input.
    Ignored,
}

/// The content of an async `stopped` record, materialized for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StopEvent {
    pub reason: Option<String>,
    pub bkptno: Option<u64>,
    pub thread_id: Option<String>,
    pub frame: Option<Vec<NamedValue>>,
    pub exit_code: Option<i32>,
    pub results: Vec<NamedValue>,
}

impl StopEvent {
    pub fn from_async(record: &AsyncRecord) -> Self {
        let reason = record.get("reason").and_then(Value::as_str).map(str::to_string);
        let bkptno = record
            .get("bkptno")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());
        let thread_id = record.get("thread-id").and_then(Value::as_str).map(str::to_string);
        let frame = record.get("frame").and_then(Value::as_tuple).map(|t| t.to_vec());
        let exit_code = record.get("exit-code").and_then(Value::as_str).and_then(parse_octal_exit_code);
        StopEvent {
            reason,
            bkptno,
            thread_id,
            frame,
            exit_code,
            results: record.results.clone(),
        }
    }
}

/// GDB renders the MI `exit-code` field in octal (e.g. `"01"` for exit code 1).
fn parse_octal_exit_code(s: &str) -> Option<i32> {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        return Some(0);
    }
    i32::from_str_radix(trimmed, 8).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_exit_code_parses() {
        assert_eq!(parse_octal_exit_code("01"), Some(1));
        assert_eq!(parse_octal_exit_code("00"), Some(0));
        assert_eq!(parse_octal_exit_code("012"), Some(10));
    }
}
