/// Single-pass, hand-rolled recursive-descent parser for one line of MI
/// output, implementing the EBNF grammar from the design (record / value
/// grammar). Total on well-formed input; raises `ParseError` otherwise.
use crate::error::ParseError;
use crate::record::{AsyncKind, AsyncRecord, Classification, Record, ResultClass, ResultRecord, StreamKind, StreamRecord};
use crate::value::{NamedValue, Value, ValueList};

/// Default maximum accepted line length, per §4.2.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024 * 1024;

struct Cursor<'a> {
    line: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Cursor { line, chars: line.char_indices().peekable() }
    }

    fn pos(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.line.len())
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn next(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn err(&mut self, expected: &str) -> ParseError {
        ParseError::Malformed {
            line: self.line.to_string(),
            position: self.pos(),
            expected: expected.to_string(),
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), ParseError> {
        if self.peek() == Some(ch) {
            self.next();
            Ok(())
        } else {
            Err(self.err(&format!("'{ch}'")))
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.next();
        }
    }
}

/// Classify one raw debugger output line.
pub fn classify_line(raw: &str, max_line_len: usize) -> Result<Classification, ParseError> {
    if raw.len() > max_line_len {
        return Err(ParseError::ProtocolLimit { limit: max_line_len });
    }
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Ok(Classification::Ignored);
    }
    if trimmed == "(gdb)" {
        return Ok(Classification::Prompt);
    }

    let mut cur = Cursor::new(trimmed);
    let token = parse_optional_token(&mut cur);

    match cur.peek() {
        Some('~') => {
            cur.next();
            let text = parse_cstring(&mut cur)?;
            Ok(Classification::Record(Record::Stream(StreamRecord { kind: StreamKind::Console, text })))
        }
        Some('@') => {
            cur.next();
            let text = parse_cstring(&mut cur)?;
            Ok(Classification::Record(Record::Stream(StreamRecord { kind: StreamKind::Target, text })))
        }
        Some('&') => {
            cur.next();
            let text = parse_cstring(&mut cur)?;
            Ok(Classification::Record(Record::Stream(StreamRecord { kind: StreamKind::Log, text })))
        }
        Some('*') => {
            cur.next();
            parse_async(&mut cur, token, AsyncKind::Exec)
        }
        Some('+') => {
            cur.next();
            parse_async(&mut cur, token, AsyncKind::Status)
        }
        Some('=') => {
            cur.next();
            parse_async(&mut cur, token, AsyncKind::Notify)
        }
        Some('^') => {
            cur.next();
            parse_result(&mut cur, token)
        }
        _ => Err(cur.err("one of '~' '@' '&' '*' '+' '=' '^'")),
    }
}

fn parse_optional_token(cur: &mut Cursor) -> Option<u64> {
    // Probe on a clone so a failed match (e.g. a stray digit run with no
    // following record marker) leaves the real cursor untouched.
    let mut probe = cur.chars.clone();
    let mut digits = String::new();
    while matches!(probe.peek(), Some((_, c)) if c.is_ascii_digit()) {
        digits.push(probe.next().unwrap().1);
    }
    if digits.is_empty() {
        return None;
    }
    match probe.peek() {
        Some((_, '~' | '@' | '&' | '*' | '+' | '=' | '^')) => {
            cur.chars = probe;
            digits.parse().ok()
        }
        _ => None,
    }
}

fn parse_ident(cur: &mut Cursor) -> Result<String, ParseError> {
    let mut id = String::new();
    while let Some(c) = cur.peek() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            id.push(c);
            cur.next();
        } else {
            break;
        }
    }
    if id.is_empty() {
        Err(cur.err("identifier"))
    } else {
        Ok(id)
    }
}

fn parse_cstring(cur: &mut Cursor) -> Result<String, ParseError> {
    cur.expect('"')?;
    let mut out = String::new();
    loop {
        match cur.next() {
            None => return Err(cur.err("closing '\"'")),
            Some('"') => break,
            Some('\\') => match cur.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(cur.err("escape sequence")),
            },
            Some(c) => out.push(c),
        }
    }
    Ok(out)
}

fn parse_value(cur: &mut Cursor) -> Result<Value, ParseError> {
    match cur.peek() {
        Some('"') => Ok(Value::String(parse_cstring(cur)?)),
        Some('{') => {
            cur.next();
            let tuple = parse_result_entries(cur, '}')?;
            cur.expect('}')?;
            Ok(Value::Tuple(tuple))
        }
        Some('[') => {
            cur.next();
            cur.skip_spaces();
            if cur.peek() == Some(']') {
                cur.next();
                return Ok(Value::List(ValueList::Empty));
            }
            // Peek ahead: a list of values starts with a quote, brace, or
            // bracket; a list of results starts with an identifier char
            // followed eventually by '='.
            let list = if looks_like_result(cur) {
                let entries = parse_result_entries(cur, ']')?;
                ValueList::Results(entries)
            } else {
                let mut values = Vec::new();
                loop {
                    values.push(parse_value(cur)?);
                    cur.skip_spaces();
                    if cur.peek() == Some(',') {
                        cur.next();
                        cur.skip_spaces();
                    } else {
                        break;
                    }
                }
                ValueList::Values(values)
            };
            cur.expect(']')?;
            Ok(Value::List(list))
        }
        _ => Err(cur.err("a value ('\"', '{' or '[')")),
    }
}

/// Looks ahead (without consuming) to tell whether the upcoming list
/// elements are bare values or `ident=value` results.
fn looks_like_result(cur: &Cursor) -> bool {
    let mut probe = cur.chars.clone();
    let mut saw_ident_char = false;
    for (_, c) in probe.by_ref() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            saw_ident_char = true;
            continue;
        }
        return saw_ident_char && c == '=';
    }
    false
}

fn parse_result_entries(cur: &mut Cursor, terminator: char) -> Result<Vec<NamedValue>, ParseError> {
    let mut entries = Vec::new();
    cur.skip_spaces();
    if cur.peek() == Some(terminator) {
        return Ok(entries);
    }
    loop {
        let key = parse_ident(cur)?;
        cur.expect('=')?;
        let value = parse_value(cur)?;
        entries.push(NamedValue::new(key, value));
        cur.skip_spaces();
        if cur.peek() == Some(',') {
            cur.next();
            cur.skip_spaces();
        } else {
            break;
        }
    }
    Ok(entries)
}

fn parse_trailing_results(cur: &mut Cursor) -> Result<Vec<NamedValue>, ParseError> {
    if cur.peek() == Some(',') {
        cur.next();
        parse_result_entries(cur, '\0')
    } else if cur.peek().is_none() {
        Ok(Vec::new())
    } else {
        Err(cur.err("',' or end of line"))
    }
}

fn parse_async(cur: &mut Cursor, token: Option<u64>, kind: AsyncKind) -> Result<Classification, ParseError> {
    let class = parse_ident(cur)?;
    let results = parse_trailing_results(cur)?;
    Ok(Classification::Record(Record::Async(AsyncRecord { kind, class, results, token })))
}

fn parse_result(cur: &mut Cursor, token: Option<u64>) -> Result<Classification, ParseError> {
    let class_str = parse_ident(cur)?;
    let (class, raw) = ResultClass::parse(&class_str);
    let results = parse_trailing_results(cur)?;
    Ok(Classification::Record(Record::Result(ResultRecord {
        token,
        class,
        raw_class: raw.map(str::to_string),
        results,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StreamKind;

    #[test]
    fn cstring_with_escaped_quote() {
        let classified = classify_line(r#"~"hello\"world""#, DEFAULT_MAX_LINE_LEN).unwrap();
        match classified {
            Classification::Record(Record::Stream(s)) => {
                assert_eq!(s.kind, StreamKind::Console);
                assert_eq!(s.text, "hello\"world");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn async_with_token_and_nested_frame() {
        let line = r#"42*stopped,reason="breakpoint-hit",bkptno="3",thread-id="1",frame={func="f",args=[{name="p",value="0x0"}],file="t.c",line="21"}"#;
        let classified = classify_line(line, DEFAULT_MAX_LINE_LEN).unwrap();
        match classified {
            Classification::Record(Record::Async(a)) => {
                assert_eq!(a.kind, AsyncKind::Exec);
                assert_eq!(a.class, "stopped");
                assert_eq!(a.get("bkptno").unwrap().as_str(), Some("3"));
                let frame = a.get("frame").unwrap().as_tuple().unwrap();
                assert_eq!(crate::value::tuple_get(frame, "func").unwrap().as_str(), Some("f"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn result_with_error_class() {
        let line = r#"7^error,msg="No symbol \"foo\".""#;
        let classified = classify_line(line, DEFAULT_MAX_LINE_LEN).unwrap();
        match classified {
            Classification::Record(Record::Result(r)) => {
                assert_eq!(r.token, Some(7));
                assert_eq!(r.class, ResultClass::Error);
                assert_eq!(r.get("msg").unwrap().as_str(), Some("No symbol \"foo\"."));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_list_value() {
        let line = r#"^done,groups=[]"#;
        let classified = classify_line(line, DEFAULT_MAX_LINE_LEN).unwrap();
        match classified {
            Classification::Record(Record::Result(r)) => {
                assert_eq!(r.get("groups").unwrap().as_list().unwrap(), &ValueList::Empty);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn list_of_results_vs_list_of_values() {
        let line = r#"^done,thread-groups=["i1"],stack=[frame={level="0"}]"#;
        let classified = classify_line(line, DEFAULT_MAX_LINE_LEN).unwrap();
        match classified {
            Classification::Record(Record::Result(r)) => {
                let groups = r.get("thread-groups").unwrap().as_list().unwrap();
                assert!(groups.as_values().is_some());
                let stack = r.get("stack").unwrap().as_list().unwrap();
                assert!(stack.as_results().is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prompt_and_blank_are_classified() {
        assert_eq!(classify_line("(gdb)", DEFAULT_MAX_LINE_LEN).unwrap(), Classification::Prompt);
        assert_eq!(classify_line("", DEFAULT_MAX_LINE_LEN).unwrap(), Classification::Ignored);
    }

    #[test]
    fn overlong_line_is_protocol_limit() {
        let line = "~".to_string() + &"\"a\"".repeat(10);
        let err = classify_line(&line, 5).unwrap_err();
        assert!(matches!(err, ParseError::ProtocolLimit { limit: 5 }));
    }

    #[test]
    fn unknown_class_is_surfaced_raw() {
        let line = r#"^frobnicated,x="1""#;
        let classified = classify_line(line, DEFAULT_MAX_LINE_LEN).unwrap();
        match classified {
            Classification::Record(Record::Result(r)) => {
                assert_eq!(r.class, ResultClass::Other);
                assert_eq!(r.raw_class.as_deref(), Some("frobnicated"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
