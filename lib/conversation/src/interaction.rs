//! External interaction channel.
//!
//! A stage that needs the customer's input suspends on
//! [`InteractionChannel::ask`] until a non-empty reply arrives. There is no
//! timeout; the only ways out are a reply, cancellation, or the channel
//! closing.

use crate::error::InteractionError;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Prompt shown when a caller passes an empty prompt.
pub const DEFAULT_PROMPT: &str = "Please enter your response:";

/// Shown when the customer submits a blank reply.
pub const INVALID_INPUT_NOTICE: &str = "Invalid input. Please enter a valid response.";

/// Returns the prompt to display, substituting the default for a blank one.
#[must_use]
pub fn effective_prompt(prompt: &str) -> &str {
    if prompt.trim().is_empty() {
        DEFAULT_PROMPT
    } else {
        prompt
    }
}

/// A channel to the customer.
#[async_trait]
pub trait InteractionChannel: Send + Sync {
    /// Shows `prompt` and waits for a non-empty reply.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if `cancel` fires first, `Closed` if the input
    /// side ends.
    async fn ask(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, InteractionError>;
}

/// Line-oriented channel over an async reader and writer.
///
/// [`ConsoleChannel::stdio`] wires it to the process's stdin and stdout.
pub struct ConsoleChannel<R, W> {
    io: Mutex<ConsoleIo<R, W>>,
}

struct ConsoleIo<R, W> {
    reader: R,
    writer: W,
}

impl ConsoleChannel<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Creates a channel over stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> ConsoleChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a channel over the given reader and writer.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new(ConsoleIo { reader, writer }),
        }
    }

    /// Writes a line of output.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub async fn say(&self, text: &str) -> Result<(), InteractionError> {
        let mut io = self.io.lock().await;
        io.write_line(text).await
    }

    /// Consumes the channel, returning the writer.
    pub fn into_writer(self) -> W {
        self.io.into_inner().writer
    }
}

impl<R, W> ConsoleIo<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn write_line(&mut self, text: &str) -> Result<(), InteractionError> {
        self.writer
            .write_all(format!("{text}\n").as_bytes())
            .await
            .map_err(io_error)?;
        self.writer.flush().await.map_err(io_error)
    }

    async fn read_line(&mut self) -> Result<String, InteractionError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await.map_err(io_error)?;
        if read == 0 {
            return Err(InteractionError::Closed);
        }
        Ok(line)
    }
}

fn io_error(e: std::io::Error) -> InteractionError {
    InteractionError::Io {
        reason: e.to_string(),
    }
}

#[async_trait]
impl<R, W> InteractionChannel for ConsoleChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn ask(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, InteractionError> {
        let mut io = self.io.lock().await;
        io.write_line(effective_prompt(prompt)).await?;

        loop {
            let line = tokio::select! {
                () = cancel.cancelled() => return Err(InteractionError::Cancelled),
                line = io.read_line() => line?,
            };

            let reply = line.trim();
            if !reply.is_empty() {
                return Ok(reply.to_string());
            }
            io.write_line(INVALID_INPUT_NOTICE).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(input: &'static str) -> ConsoleChannel<&'static [u8], Vec<u8>> {
        ConsoleChannel::new(input.as_bytes(), Vec::new())
    }

    #[tokio::test]
    async fn returns_trimmed_reply() {
        let channel = channel("  sim  \n");
        let reply = channel
            .ask("Resolvido?", &CancellationToken::new())
            .await
            .expect("reply");
        assert_eq!(reply, "sim");

        let output = String::from_utf8(channel.into_writer()).expect("utf8");
        assert_eq!(output, "Resolvido?\n");
    }

    #[tokio::test]
    async fn blank_replies_are_rejected_and_reprompted() {
        let channel = channel("\n   \nconta bloqueada\n");
        let reply = channel
            .ask("Como posso ajudar?", &CancellationToken::new())
            .await
            .expect("reply");
        assert_eq!(reply, "conta bloqueada");

        let output = String::from_utf8(channel.into_writer()).expect("utf8");
        assert_eq!(output.matches(INVALID_INPUT_NOTICE).count(), 2);
    }

    #[tokio::test]
    async fn blank_prompt_uses_default() {
        let channel = channel("ok\n");
        channel
            .ask("   ", &CancellationToken::new())
            .await
            .expect("reply");
        let output = String::from_utf8(channel.into_writer()).expect("utf8");
        assert!(output.starts_with(DEFAULT_PROMPT));
    }

    #[tokio::test]
    async fn end_of_input_is_closed() {
        let channel = channel("\n");
        let err = channel
            .ask("Resolvido?", &CancellationToken::new())
            .await
            .expect_err("no reply");
        assert_eq!(err, InteractionError::Closed);
    }

    #[tokio::test]
    async fn cancellation_aborts_wait() {
        let (_writer_end, reader_end) = tokio::io::duplex(64);
        let channel = ConsoleChannel::new(BufReader::new(reader_end), Vec::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = channel
            .ask("Resolvido?", &cancel)
            .await
            .expect_err("cancelled");
        assert_eq!(err, InteractionError::Cancelled);
    }
}
