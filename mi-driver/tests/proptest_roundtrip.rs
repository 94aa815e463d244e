//! Property-based coverage for the two totality properties the hand-rolled
//! parser must hold: quoting a string and parsing it back always yields
//! the original, and every token the interpreter hands out is unique for
//! the lifetime of the session.
use std::sync::Arc;

use proptest::prelude::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use mi_driver::interpreter::Interpreter;
use mi_driver::parser::{classify_line, DEFAULT_MAX_LINE_LEN};
use mi_driver::record::{Classification, Record};
use mi_driver::value::{quote, Value};

proptest! {
    /// Any string built from printable characters survives a
    /// quote-then-classify-then-extract round trip unchanged.
    #[test]
    fn cstring_quote_parse_round_trip(s in "\\PC*") {
        let line = format!("^done,msg={}", quote(&s));
        let classified = classify_line(&line, DEFAULT_MAX_LINE_LEN).unwrap();
        let Classification::Record(Record::Result(r)) = classified else {
            panic!("expected a result record");
        };
        prop_assert_eq!(r.get("msg").and_then(Value::as_str), Some(s.as_str()));
    }

    /// A line's leading token, if present, always round-trips to the same
    /// `u64` regardless of what record marker and body follow it.
    #[test]
    fn leading_token_round_trips(token in 0u64..1_000_000_000) {
        let line = format!("{token}^done");
        let classified = classify_line(&line, DEFAULT_MAX_LINE_LEN).unwrap();
        let Classification::Record(record) = classified else {
            panic!("expected a record");
        };
        prop_assert_eq!(record.token(), Some(token));
    }
}

#[tokio::test]
async fn interpreter_issues_unique_tokens_under_concurrent_use() {
    let (a_read, b_write) = tokio::io::duplex(1 << 16);
    let (b_read, a_write) = tokio::io::duplex(1 << 16);
    let interp = Arc::new(Interpreter::spawn(BufReader::new(a_read), a_write));

    let seen_tokens = Arc::new(std::sync::Mutex::new(Vec::new()));
    let responder_tokens = seen_tokens.clone();
    let responder = tokio::spawn(async move {
        let mut reader = BufReader::new(b_read);
        let mut writer = b_write;
        let mut line = String::new();
        for _ in 0..20 {
            line.clear();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            let token: u64 = trimmed.split('-').next().unwrap().parse().unwrap();
            responder_tokens.lock().unwrap().push(token);
            writer.write_all(format!("{token}^done\n").as_bytes()).await.unwrap();
        }
    });

    let mut handles = Vec::new();
    for _ in 0..20 {
        let interp = interp.clone();
        handles.push(tokio::spawn(async move {
            interp.execute("-data-evaluate-expression 1").await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    responder.await.unwrap();

    let mut tokens = seen_tokens.lock().unwrap().clone();
    let original_len = tokens.len();
    tokens.sort_unstable();
    tokens.dedup();
    assert_eq!(tokens.len(), original_len, "every command token must be unique");
}
