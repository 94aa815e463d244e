/// The frame façade: a short-lived view over "the stopped thread's current
/// frame" that composes MI commands the way the original `frame` interface
/// did, but as owned data plus free functions over the interpreter instead
/// of a C++ abstract base class.
use crate::error::ProtocolError;
use crate::interpreter::Interpreter;
use crate::value::{NamedValue, Value};

/// One `name=value` argument of a stack frame, with the c-string detected
/// and decoded out of `value` when present.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: String,
    pub value: ParsedValue,
}

/// A register, pulled from `-data-list-register-values` paired up with its
/// name from `-data-list-register-names`.
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub name: String,
    pub value: String,
}

/// One element of a backtrace.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktraceElem {
    pub level: u64,
    pub addr: Option<String>,
    pub func: Option<String>,
    pub args: Vec<Arg>,
    pub file: Option<String>,
    pub line: Option<u64>,
}

/// The four shapes a `call()`/`print()` reply resolves to, checked in the
/// same order the interpreter's value renderer tries them: a bare
/// reference, a pointer annotated with a symbol and/or trailing C string,
/// a typed scalar rendered with its char literal, or an unparsed fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    /// `@0xADDRESS` — a reference value.
    Reference { address: String },
    /// `0xADDRESS <symbol+offset> "cstring"` — a pointer, optionally
    /// annotated with the symbol it falls inside and/or the string it
    /// points at. `ellipsis` is true when the debugger truncated the
    /// string itself (`"abc"...`) because it ran past the print-elements
    /// limit; a truncated string must be completed byte-by-byte rather
    /// than trusted as-is.
    Pointer {
        address: String,
        symbol: Option<String>,
        cstring: Option<String>,
        ellipsis: bool,
    },
    /// `N 'c'` — an integral value rendered together with its character
    /// literal (e.g. a `char`).
    CharLiteral { number: String, literal: char },
    /// Anything else, kept verbatim.
    Raw(String),
}

impl ParsedValue {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(addr) = trimmed.strip_prefix('@') {
            if addr.starts_with("0x") {
                return ParsedValue::Reference { address: addr.to_string() };
            }
        }

        if let Some(rest) = trimmed.strip_prefix("0x") {
            let hex_len = rest.chars().take_while(|c| c.is_ascii_hexdigit()).count();
            if hex_len > 0 {
                let address = format!("0x{}", &rest[..hex_len]);
                let mut remainder = rest[hex_len..].trim_start();

                let mut symbol = None;
                if let Some(after_lt) = remainder.strip_prefix('<') {
                    if let Some(end) = after_lt.find('>') {
                        symbol = Some(after_lt[..end].to_string());
                        remainder = after_lt[end + 1..].trim_start();
                    }
                }

                let mut cstring = None;
                let mut ellipsis = false;
                if let Some(after_quote) = remainder.strip_prefix('"') {
                    if let Some(end) = after_quote.rfind('"') {
                        cstring = Some(after_quote[..end].to_string());
                        ellipsis = after_quote[end + 1..].trim_start().starts_with("...");
                    }
                }

                return ParsedValue::Pointer { address, symbol, cstring, ellipsis };
            }
        }

        if let Some(space_idx) = trimmed.find(' ') {
            let (number, rest) = trimmed.split_at(space_idx);
            let rest = rest.trim_start();
            if !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit() || c == '-')
                && rest.len() >= 3
                && rest.starts_with('\'')
                && rest.ends_with('\'')
            {
                let inner = &rest[1..rest.len() - 1];
                if let Some(literal) = decode_char_literal(inner) {
                    return ParsedValue::CharLiteral { number: number.to_string(), literal };
                }
            }
        }

        ParsedValue::Raw(trimmed.to_string())
    }
}

fn decode_char_literal(inner: &str) -> Option<char> {
    let mut chars = inner.chars();
    match chars.next()? {
        '\\' => match chars.next()? {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '0' => Some('\0'),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            other => Some(other),
        },
        c if chars.next().is_none() => Some(c),
        _ => None,
    }
}

/// A short-lived handle over the interpreter bound to "the currently
/// stopped frame" at the time it was created. Selecting a different frame
/// invalidates any other `Frame` created before the selection, exactly as
/// with the original's single-threaded frame object.
pub struct Frame<'a> {
    interp: &'a Interpreter,
    level: u64,
}

impl<'a> Frame<'a> {
    pub fn new(interp: &'a Interpreter, level: u64) -> Self {
        Frame { interp, level }
    }

    pub fn level(&self) -> u64 {
        self.level
    }

    /// Selects this frame in the debugger so subsequent commands act on it.
    pub async fn select(&self) -> Result<(), ProtocolError> {
        self.interp.stack_select_frame(self.level).await
    }

    /// The frame's raw `func`/`file`/`line`/`addr` tuple via
    /// `-stack-info-frame`, after selecting this frame.
    pub async fn info(&self) -> Result<Vec<NamedValue>, ProtocolError> {
        self.select().await?;
        self.interp.stack_info_frame().await
    }

    pub async fn arg_list(&self) -> Result<Vec<Arg>, ProtocolError> {
        self.args_for_level(self.level).await
    }

    /// `-stack-list-arguments --all-values LOW HIGH` replies with
    /// `stack-args=[frame={level=N,args=[{name=..,value=..}, ...]}]`:
    /// one top-level keyed list holding the frame tuple, whose own
    /// `args` is a bare list of tuples (not itself keyed). Factored out
    /// of `arg_list` so `backtrace()` can pull arguments for every frame,
    /// not just the one this façade is bound to.
    async fn args_for_level(&self, level: u64) -> Result<Vec<Arg>, ProtocolError> {
        let entries = self.interp.stack_list_arguments(level).await?;
        let stack_args = entries
            .iter()
            .find(|nv| nv.key == "stack-args")
            .and_then(|nv| nv.value.as_list())
            .and_then(|l| l.as_results())
            .ok_or_else(|| ProtocolError::MissingValue("stack-args".into()))?;
        let frame = stack_args
            .iter()
            .find(|nv| nv.key == "frame")
            .and_then(|nv| nv.value.as_tuple())
            .ok_or_else(|| ProtocolError::MissingValue("frame".into()))?;
        let args = frame
            .iter()
            .find(|nv| nv.key == "args")
            .and_then(|nv| nv.value.as_list())
            .and_then(|l| l.as_values())
            .unwrap_or(&[]);
        Ok(args
            .iter()
            .filter_map(|value| {
                let tuple = value.as_tuple()?;
                let name = tuple.iter().find(|e| e.key == "name")?.value.as_str()?.to_string();
                let value = tuple
                    .iter()
                    .find(|e| e.key == "value")
                    .and_then(|e| e.value.as_str())
                    .map(ParsedValue::parse)
                    .unwrap_or(ParsedValue::Raw(String::new()));
                Some(Arg { name, value })
            })
            .collect())
    }

    /// Evaluates `expr` in this frame's context and post-parses the reply
    /// into one of the four value shapes. With `bitwise`, ignores the
    /// textual rendering entirely and instead reads the raw bytes behind
    /// the expression (`sizeof` for the length, `&expr` for the address,
    /// `data_read_memory_bytes` for the contents), returning them as a
    /// lowercase hex string — the one case where `print()` wants the exact
    /// bit pattern rather than GDB's value rendering.
    pub async fn print(&self, expr: &str, bitwise: bool) -> Result<ParsedValue, ProtocolError> {
        self.select().await?;
        if bitwise {
            let size_text = self.interp.data_evaluate_expression(&format!("sizeof({expr})")).await?;
            let size: u64 = size_text
                .trim()
                .parse()
                .map_err(|_| ProtocolError::UnexpectedType(format!("sizeof({expr}) returned {size_text:?}")))?;
            let addr_text = self.interp.data_evaluate_expression(&format!("&{expr}")).await?;
            let bytes = self.interp.data_read_memory_bytes(addr_text.trim(), size).await?;
            let mut hex = String::with_capacity(bytes.contents.len() * 2);
            for byte in &bytes.contents {
                hex.push_str(&format!("{byte:02x}"));
            }
            return Ok(ParsedValue::Raw(hex));
        }
        let raw = self.interp.data_evaluate_expression(expr).await?;
        Ok(ParsedValue::parse(&raw))
    }

    /// Reads a NUL-terminated C string from `arg`'s cached value. When the
    /// debugger's own rendering already captured the whole string (no
    /// ellipsis), that cached copy is trusted outright; otherwise the rest
    /// is read one element at a time via `arg[idx]`, continuing from the
    /// length of the already-cached prefix.
    pub async fn get_cstring(&self, arg: &Arg) -> Result<String, ProtocolError> {
        let ParsedValue::Pointer { cstring: Some(cached), ellipsis, .. } = &arg.value else {
            return Err(ProtocolError::UnexpectedType(format!("get_cstring on non-pointer argument {arg:?}")));
        };
        if !ellipsis {
            return Ok(cached.clone());
        }
        let mut out = cached.clone();
        let mut index = out.len();
        loop {
            let element_expr = format!("{}[{}]", arg.name, index);
            let byte = match self.print(&element_expr, false).await? {
                ParsedValue::CharLiteral { literal, .. } => literal as i64,
                ParsedValue::Raw(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::UnexpectedType(format!("cstring element {s:?} not numeric")))?,
                other => return Err(ProtocolError::UnexpectedType(format!("{other:?}"))),
            };
            if byte == 0 {
                break;
            }
            out.push(byte as u8 as char);
            index += 1;
            if index > 1 << 20 {
                return Err(ProtocolError::UnexpectedType("cstring exceeded 1MiB without a NUL".into()));
            }
        }
        Ok(out)
    }

    /// Calls a function in the inferior and post-parses the result, same
    /// shapes as `print()`.
    pub async fn call(&self, expr: &str) -> Result<ParsedValue, ProtocolError> {
        self.print(expr, false).await
    }

    pub async fn set(&self, lvalue: &str, value: &str) -> Result<(), ProtocolError> {
        self.select().await?;
        self.interp.data_evaluate_expression(&format!("{lvalue} = {value}")).await?;
        Ok(())
    }

    /// Forces an early return from this frame, optionally with a value.
    pub async fn return_(&self, value: Option<&str>) -> Result<(), ProtocolError> {
        self.select().await?;
        self.interp.exec_return(value).await
    }

    /// Writes `code` into the process's pending exit slot instead of
    /// forcing the inferior to call `exit()` itself: the engine reports
    /// this code once the inferior actually terminates, pre-empting
    /// whatever (if anything) the terminal `stopped` record's own
    /// `exit-code` field says. Last writer wins if called more than once.
    pub async fn set_exit(&self, code: i32) -> Result<(), ProtocolError> {
        self.interp.set_pending_exit(code);
        Ok(())
    }

    /// The registers whose name is known, correctly skipping any register
    /// number that falls outside the name table (the original's
    /// `r.number > reg_names.size()` check is off by one, and an extra
    /// unnamed register at the boundary index would panic on index-out-of-
    /// bounds rather than being skipped).
    pub async fn regs(&self) -> Result<Vec<Register>, ProtocolError> {
        self.select().await?;
        let names = self.interp.data_list_register_names().await?;
        let values = self.interp.data_list_register_values().await?;

        let mut registers = Vec::new();
        for tuple in &values {
            let number: usize = tuple
                .iter()
                .find(|nv| nv.key == "number")
                .and_then(|nv| nv.value.as_str())
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ProtocolError::MissingValue("number".into()))?;
            if number >= names.len() {
                continue;
            }
            let name = names[number].clone();
            if name.is_empty() {
                continue;
            }
            let value = tuple
                .iter()
                .find(|nv| nv.key == "value")
                .and_then(|nv| nv.value.as_str())
                .unwrap_or_default()
                .to_string();
            registers.push(Register { name, value });
        }
        Ok(registers)
    }

    /// The full backtrace via `-stack-list-frames`, with each frame's
    /// arguments filled in from a per-level `-stack-list-arguments` call
    /// (a frame with no resolvable arguments just gets an empty list
    /// rather than failing the whole backtrace).
    pub async fn backtrace(&self) -> Result<Vec<BacktraceElem>, ProtocolError> {
        let frames = self.interp.stack_list_frames().await?;
        let mut out = Vec::with_capacity(frames.len());
        for nv in &frames {
            let tuple = nv.value.as_tuple().ok_or_else(|| ProtocolError::UnexpectedType("stack entry".into()))?;
            let level: u64 = tuple
                .iter()
                .find(|e| e.key == "level")
                .and_then(|e| e.value.as_str())
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ProtocolError::MissingValue("level".into()))?;
            let field = |key: &str| -> Option<String> {
                tuple.iter().find(|e| e.key == key).and_then(|e| e.value.as_str()).map(str::to_string)
            };
            let args = self.args_for_level(level).await.unwrap_or_default();
            out.push(BacktraceElem {
                level,
                addr: field("addr"),
                func: field("func"),
                args,
                file: field("file"),
                line: field("line").and_then(|s| s.parse().ok()),
            });
        }
        Ok(out)
    }
}

/// Looks up a field in a raw `key=value` tuple as a plain string, a
/// convenience used outside this module when translating stop-event
/// payloads into a `Frame`'s starting level.
pub fn level_of(frame_tuple: &[NamedValue]) -> Option<u64> {
    frame_tuple
        .iter()
        .find(|nv| nv.key == "level")
        .and_then(|nv| nv.value.as_str())
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_shape() {
        assert_eq!(
            ParsedValue::parse("@0xdeadbeef"),
            ParsedValue::Reference { address: "0xdeadbeef".into() }
        );
    }

    #[test]
    fn parses_pointer_with_symbol_and_cstring() {
        let parsed = ParsedValue::parse(r#"0x4005a0 <greeting> "hello""#);
        assert_eq!(
            parsed,
            ParsedValue::Pointer {
                address: "0x4005a0".into(),
                symbol: Some("greeting".into()),
                cstring: Some("hello".into()),
                ellipsis: false,
            }
        );
    }

    #[test]
    fn parses_truncated_cstring_with_ellipsis() {
        let parsed = ParsedValue::parse(r#"0x4005a0 <greeting> "hello"..."#);
        assert_eq!(
            parsed,
            ParsedValue::Pointer {
                address: "0x4005a0".into(),
                symbol: Some("greeting".into()),
                cstring: Some("hello".into()),
                ellipsis: true,
            }
        );
    }

    #[test]
    fn parses_bare_pointer() {
        let parsed = ParsedValue::parse("0x7ffdeadbeef");
        assert_eq!(
            parsed,
            ParsedValue::Pointer { address: "0x7ffdeadbeef".into(), symbol: None, cstring: None, ellipsis: false }
        );
    }

    #[test]
    fn parses_char_literal_shape() {
        assert_eq!(
            ParsedValue::parse("65 'A'"),
            ParsedValue::CharLiteral { number: "65".into(), literal: 'A' }
        );
    }

    #[test]
    fn parses_negative_number_without_char_literal_as_raw() {
        assert_eq!(ParsedValue::parse("-12"), ParsedValue::Raw("-12".into()));
    }

    #[test]
    fn falls_back_to_raw() {
        assert_eq!(ParsedValue::parse("3.14"), ParsedValue::Raw("3.14".into()));
    }

    #[test]
    fn level_of_reads_level_field() {
        let tuple = vec![NamedValue::new("level", Value::String("2".into()))];
        assert_eq!(level_of(&tuple), Some(2));
    }
}
