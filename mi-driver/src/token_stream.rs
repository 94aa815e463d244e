/// Line framing over the debugger's pipes: writes `token-command\n` to
/// stdin and classifies each line read back from stdout, per §4.1.
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::parser::{classify_line, DEFAULT_MAX_LINE_LEN};
use crate::record::Classification;

/// Wraps a reader/writer pair cut from the debugger's stdout/stdin. Generic
/// so tests can drive it over `tokio::io::duplex` instead of a real child.
pub struct TokenStream<R, W> {
    reader: R,
    writer: W,
    max_line_len: usize,
    line_buf: String,
}

impl<R, W> TokenStream<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        TokenStream {
            reader,
            writer,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            line_buf: String::new(),
        }
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Writes one line to the debugger's stdin: `command` already carries
    /// its own leading `-`, so a token (if any) is prepended directly,
    /// e.g. `5-break-insert main`, not `5--break-insert main`.
    pub async fn send(&mut self, token: Option<u64>, command: &str) -> Result<(), ProtocolError> {
        let line = match token {
            Some(t) => format!("{t}{command}\n"),
            None => format!("{command}\n"),
        };
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads and classifies the next line. Returns `Ok(None)` on clean EOF
    /// (the debugger closed its stdout); an open connection never returns
    /// `Ignored` to the caller, it just keeps reading past blank lines.
    pub async fn next_classified(&mut self) -> Result<Option<Classification>, ProtocolError> {
        loop {
            self.line_buf.clear();
            let n = self.reader.read_line(&mut self.line_buf).await?;
            if n == 0 {
                return Ok(None);
            }
            match classify_line(&self.line_buf, self.max_line_len)? {
                Classification::Ignored => continue,
                other => return Ok(Some(other)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Classification, Record};
    use tokio::io::{AsyncReadExt, BufReader};

    #[tokio::test]
    async fn send_frames_token_and_command() {
        let (mut readback, writer_end) = tokio::io::duplex(4096);
        let (_unused_reader, unused_writer) = tokio::io::duplex(1);
        let mut stream = TokenStream::new(BufReader::new(_unused_reader), writer_end);
        let _ = unused_writer;
        stream.send(Some(5), "-break-insert main").await.unwrap();
        stream.send(None, "-exec-continue").await.unwrap();
        drop(stream);

        let mut buf = Vec::new();
        readback.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"5-break-insert main\n-exec-continue\n");
    }

    #[tokio::test]
    async fn next_classified_skips_blank_lines_and_stops_on_eof() {
        let (reader, mut writer) = tokio::io::duplex(4096);
        let (_unused_reader, unused_writer) = tokio::io::duplex(1);
        let mut stream = TokenStream::new(BufReader::new(reader), unused_writer);
        writer.write_all(b"\n~\"hi\\n\"\n(gdb)\n").await.unwrap();
        drop(writer);

        let first = stream.next_classified().await.unwrap().unwrap();
        assert!(matches!(first, Classification::Record(Record::Stream(_))));
        let second = stream.next_classified().await.unwrap().unwrap();
        assert_eq!(second, Classification::Prompt);
        assert_eq!(stream.next_classified().await.unwrap(), None);
    }
}
