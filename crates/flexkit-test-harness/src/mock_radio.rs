//! Scripted radio peer for command-channel testing.
//!
//! [`MockRadio`] is a TCP listener on localhost that plays a fixed script
//! against the single client that connects to it: push status lines,
//! expect command frames, reply to them by sequence number, pause, or hang
//! up. It enables deterministic testing of the command channel and the
//! session context without a real radio.
//!
//! # Example
//!
//! ```
//! use flexkit_test_harness::MockRadio;
//!
//! # async fn example() -> flexkit_core::Result<()> {
//! let mut radio = MockRadio::new().await?;
//! radio
//!     .push_line("V1.4.0.0")
//!     .push_line("H2A3B4C5D")
//!     .expect_command("sub slice all")
//!     .reply("0", "");
//! radio.start();
//! // ... connect a channel to radio.port() ...
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use flexkit_core::error::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One step of a [`MockRadio`] script.
#[derive(Debug, Clone)]
enum Step {
    /// Write a line (newline appended) to the client.
    Push(String),
    /// Read one frame and require its command text to equal this string.
    Expect(String),
    /// Reply to the most recently expected command.
    Reply { code: String, text: String },
    /// Sleep.
    Pause(Duration),
    /// Close the connection.
    Hangup,
}

/// A scripted, single-connection radio peer.
pub struct MockRadio {
    port: u16,
    listener: Option<TcpListener>,
    script: VecDeque<Step>,
    server_handle: Option<JoinHandle<std::result::Result<Vec<String>, String>>>,
}

impl MockRadio {
    /// Bind a new mock radio on a random localhost port.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock radio: {}", e)))?;
        let port = listener.local_addr().map_err(Error::Io)?.port();

        Ok(Self {
            port,
            listener: Some(listener),
            script: VecDeque::new(),
            server_handle: None,
        })
    }

    /// The host clients should connect to.
    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    /// The port the mock radio is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send `line` to the client.
    pub fn push_line(&mut self, line: &str) -> &mut Self {
        self.script.push_back(Step::Push(line.to_string()));
        self
    }

    /// Wait for a command frame `C[D]<seq>|<command>` with exactly this
    /// command text.
    pub fn expect_command(&mut self, command: &str) -> &mut Self {
        self.script.push_back(Step::Expect(command.to_string()));
        self
    }

    /// Reply `R<seq>|<code>|<text>` to the most recently expected command.
    pub fn reply(&mut self, code: &str, text: &str) -> &mut Self {
        self.script.push_back(Step::Reply {
            code: code.to_string(),
            text: text.to_string(),
        });
        self
    }

    /// Pause the script.
    pub fn pause(&mut self, duration: Duration) -> &mut Self {
        self.script.push_back(Step::Pause(duration));
        self
    }

    /// Close the connection at this point in the script.
    pub fn hangup(&mut self) -> &mut Self {
        self.script.push_back(Step::Hangup);
        self
    }

    /// Accept one client and run the script in a background task.
    ///
    /// Once the script is exhausted the connection is held open until the
    /// client closes it, so a trailing [`hangup`](Self::hangup) is needed to
    /// simulate a radio-side disconnect.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let script: Vec<Step> = self.script.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;
            tracing::debug!(peer = %peer, "Mock radio accepted client");

            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut received = Vec::new();
            let mut last_seq: Option<String> = None;

            for (i, step) in script.into_iter().enumerate() {
                match step {
                    Step::Push(line) => {
                        write_half
                            .write_all(format!("{line}\n").as_bytes())
                            .await
                            .map_err(|e| format!("step {}: write error: {}", i, e))?;
                    }
                    Step::Expect(command) => {
                        let mut line = String::new();
                        let n = reader
                            .read_line(&mut line)
                            .await
                            .map_err(|e| format!("step {}: read error: {}", i, e))?;
                        if n == 0 {
                            return Err(format!("step {}: client disconnected", i));
                        }
                        let frame = line.trim_end().to_string();
                        let (seq, text) = split_frame(&frame)
                            .ok_or_else(|| format!("step {}: not a command frame: {}", i, frame))?;
                        if text != command {
                            return Err(format!(
                                "step {}: command mismatch: expected {:?}, got {:?}",
                                i, command, text
                            ));
                        }
                        last_seq = Some(seq.to_string());
                        received.push(frame);
                    }
                    Step::Reply { code, text } => {
                        let seq = last_seq
                            .as_deref()
                            .ok_or_else(|| format!("step {}: reply before any command", i))?;
                        write_half
                            .write_all(format!("R{seq}|{code}|{text}\n").as_bytes())
                            .await
                            .map_err(|e| format!("step {}: write error: {}", i, e))?;
                    }
                    Step::Pause(d) => tokio::time::sleep(d).await,
                    Step::Hangup => {
                        let _ = write_half.shutdown().await;
                        return Ok(received);
                    }
                }
            }

            // Hold the connection until the client goes away, recording any
            // further frames.
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => received.push(line.trim_end().to_string()),
                }
            }
            Ok(received)
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the script task to finish and return every frame received.
    pub async fn wait(self) -> std::result::Result<Vec<String>, String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("mock radio task panicked: {}", e))?,
            None => Ok(Vec::new()),
        }
    }
}

/// Split `C[D]<seq>|<text>` into `(seq, text)`.
fn split_frame(frame: &str) -> Option<(&str, &str)> {
    let body = frame.strip_prefix('C')?;
    let body = body.strip_prefix('D').unwrap_or(body);
    body.split_once('|')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain_frame() {
        assert_eq!(split_frame("C12|info"), Some(("12", "info")));
    }

    #[test]
    fn split_diagnostic_frame() {
        assert_eq!(split_frame("CD3|ping"), Some(("3", "ping")));
    }

    #[test]
    fn split_rejects_non_command() {
        assert_eq!(split_frame("R1|0|"), None);
        assert_eq!(split_frame("C1 info"), None);
    }

    #[tokio::test]
    async fn script_round_trip() {
        let mut radio = MockRadio::new().await.unwrap();
        radio
            .push_line("V1.4.0.0")
            .expect_command("info")
            .reply("0", "model=FLEX-6600")
            .hangup();
        let port = radio.port();
        radio.start();

        let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        let (r, mut w) = stream.into_split();
        let mut reader = BufReader::new(r);

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "V1.4.0.0\n");

        w.write_all(b"C7|info\n").await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "R7|0|model=FLEX-6600\n");

        let frames = radio.wait().await.unwrap();
        assert_eq!(frames, vec!["C7|info".to_string()]);
    }

    #[tokio::test]
    async fn mismatched_command_is_reported() {
        let mut radio = MockRadio::new().await.unwrap();
        radio.expect_command("info");
        let port = radio.port();
        radio.start();

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        stream.write_all(b"C0|version\n").await.unwrap();

        let err = radio.wait().await.unwrap_err();
        assert!(err.contains("command mismatch"), "{err}");
    }
}
