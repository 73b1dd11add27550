//! One-way streaming calls over HTTP.
//!
//! The host answers log and action requests with newline-delimited JSON
//! `{"message": "...", "error": "..."}` records.

use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{join_url, ActionStreamFn, MessageStream, StreamCall, StreamClient, StreamMessage};
use crate::session::DeployAction;
use crate::transport::TransportError;

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    file: &'a str,
    services: &'a [String],
}

/// reqwest-backed [`StreamClient`]
#[derive(Clone)]
pub struct HttpStreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStreamClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl StreamClient for HttpStreamClient {
    fn log_stream(&self, url: &str) -> StreamCall {
        let request = self.client.get(join_url(&self.base_url, url));
        Box::new(move |token| ndjson_stream(request, token))
    }

    fn action_stream(&self, action: DeployAction) -> ActionStreamFn {
        let client = self.client.clone();
        let url = join_url(
            &self.base_url,
            &format!("/api/stacks/{}", action.as_str()),
        );
        Arc::new(move |file: &str, services: &[String]| {
            let request = client
                .post(&url)
                .json(&ActionRequest { file, services });
            Box::new(move |token| ndjson_stream(request, token)) as StreamCall
        })
    }
}

fn ndjson_stream(request: reqwest::RequestBuilder, token: CancellationToken) -> MessageStream {
    let open = async move {
        let response = tokio::select! {
            _ = token.cancelled() => return Err(TransportError::Cancelled),
            response = request.send() => response?,
        };
        let response = response.error_for_status()?;
        tracing::debug!(url = %response.url(), "Stream opened");
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from))
            .boxed();
        Ok::<_, TransportError>(LineReader::new(body).into_stream())
    };

    stream::once(open).try_flatten().boxed()
}

/// Splits a byte stream into JSON records, one per line
struct LineReader {
    body: BoxStream<'static, Result<Vec<u8>, TransportError>>,
    buf: Vec<u8>,
    done: bool,
}

impl LineReader {
    fn new(body: BoxStream<'static, Result<Vec<u8>, TransportError>>) -> Self {
        Self {
            body,
            buf: Vec::new(),
            done: false,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let newline = self.buf.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=newline).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    fn into_stream(self) -> MessageStream {
        stream::unfold(self, |mut reader| async move {
            loop {
                let line = match reader.next_line() {
                    Some(line) => Some(line),
                    None if reader.done => match reader.take_rest() {
                        Some(rest) => Some(rest),
                        None => return None,
                    },
                    None => None,
                };

                if let Some(line) = line {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    tracing::trace!("Stream raw line: {}", line);
                    match serde_json::from_str::<StreamMessage>(line) {
                        Ok(message) => return Some((Ok(message), reader)),
                        Err(e) => {
                            // Don't fail the whole stream on a single bad record
                            tracing::warn!("Failed to parse stream line: {e}. Line: {line}");
                            continue;
                        }
                    }
                }

                match reader.body.next().await {
                    Some(Ok(bytes)) => reader.buf.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        reader.done = true;
                        reader.buf.clear();
                        return Some((Err(e), reader));
                    }
                    None => reader.done = true,
                }
            }
        })
        .boxed()
    }
}
