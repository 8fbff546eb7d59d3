//! Minimal server-sent-events framing shared by the streaming providers.

use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};

use super::ProviderError;

/// Split a raw byte stream into the payloads of its `data:` lines.
///
/// Comment lines, event names, and blank keep-alive lines are dropped.
/// Payloads are yielded verbatim, including end-of-stream sentinels such
/// as OpenAI's `[DONE]`; the caller decides what terminates the stream.
pub(crate) fn data_lines<S, B, E>(source: S) -> BoxStream<'static, Result<String, ProviderError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = (Box::pin(source), String::new());
    futures_util::stream::try_unfold(state, |(mut source, mut buffer)| async move {
        loop {
            if let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                let line = line.trim_end_matches(['\r', '\n']);
                if let Some(payload) = line.strip_prefix("data:") {
                    let payload = payload.trim_start();
                    if !payload.is_empty() {
                        return Ok(Some((payload.to_string(), (source, buffer))));
                    }
                }
                continue;
            }
            match source.next().await {
                Some(Ok(chunk)) => {
                    buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));
                }
                Some(Err(e)) => {
                    return Err(ProviderError::Stream {
                        message: e.to_string(),
                    });
                }
                None => return Ok(None),
            }
        }
    })
    .boxed()
}
