use super::config::HttpConfig;
use super::protocol::{Frame, HttpCodec, HttpProtocolError, ResponseHead};
use super::request::Request;
use super::response::{Body, DocumentStream, Response};
use crate::Result;
use crate::dump::Router;

use futures_util::{Sink, SinkExt, StreamExt};
use http::header::{self, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// How a streamed body ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every document and the terminating chunk were written
    Completed(usize),
    /// Writing stopped after this many documents; the connection is unusable
    Aborted(usize),
}

/// Result of writing one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Complete,
    StreamAborted,
}

/// Serves requests on one connection until it closes, idles out or breaks
pub async fn serve_connection<T>(
    io: T,
    addr: SocketAddr,
    router: &Router,
    config: &HttpConfig,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let codec = HttpCodec::new(config.limits.clone());
    let mut framed = Framed::with_capacity(io, codec, config.buffer_size);
    let remote_addr = addr.to_string();

    loop {
        let decoded = match timeout(config.read_timeout, framed.next()).await {
            Ok(Some(Ok(decoded))) => decoded,
            Ok(Some(Err(e))) => match e.status() {
                Some(status) => {
                    warn!(%addr, error = %e, status = status.as_u16(), "Rejecting request");
                    let response = Response::reason(status);
                    let _ = timeout(
                        config.write_timeout,
                        write_response(&mut framed, response, config, false, false),
                    )
                    .await;
                    break;
                }
                None => return Err(e.into()),
            },
            Ok(None) => {
                debug!(%addr, "Client closed connection");
                break;
            }
            Err(_) => {
                debug!(%addr, "Idle timeout");
                break;
            }
        };

        let request = Request::from_decoded(decoded, remote_addr.clone(), false);
        let keep_alive = request.keep_alive();
        let head_only = request.method() == Method::HEAD;
        let response = router.dispatch(&request);
        debug!(
            %addr,
            method = %request.method(),
            path = request.path(),
            status = response.status().as_u16(),
            "Dispatched request"
        );

        let written = timeout(
            config.write_timeout,
            write_response(&mut framed, response, config, head_only, keep_alive),
        )
        .await;
        match written {
            Ok(Ok(WriteOutcome::Complete)) => {}
            Ok(Ok(WriteOutcome::StreamAborted)) => break,
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "Failed to write response");
                break;
            }
            Err(_) => {
                warn!(%addr, "Write timeout");
                break;
            }
        }

        if !keep_alive {
            break;
        }
    }

    Ok(())
}

/// Frames `response` onto `sink`
///
/// Full bodies get a `Content-Length`, document streams go out chunked
/// through [`pump_documents`]. An informational status is written as an
/// interim head before a final 200. Statuses that forbid a body, and
/// `HEAD` requests, get the head only.
pub async fn write_response<S>(
    sink: &mut S,
    response: Response,
    config: &HttpConfig,
    head_only: bool,
    keep_alive: bool,
) -> std::result::Result<WriteOutcome, HttpProtocolError>
where
    S: Sink<Frame, Error = HttpProtocolError> + Unpin,
{
    let (mut status, mut headers, body) = response.into_parts();

    // Interim 1xx heads are followed by an empty final 200
    if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
        sink.feed(Frame::Head(ResponseHead {
            status,
            headers: HeaderMap::new(),
        }))
        .await?;
        status = StatusCode::OK;
    }

    if let Some(name) = &config.server_name {
        if let Ok(value) = HeaderValue::from_str(name) {
            headers.insert(header::SERVER, value);
        }
    }
    if !keep_alive {
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    }

    if forbids_body(status) {
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::TRANSFER_ENCODING);
        sink.send(Frame::Head(ResponseHead { status, headers })).await?;
        return Ok(WriteOutcome::Complete);
    }

    match body {
        Body::Empty => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
            sink.send(Frame::Head(ResponseHead { status, headers })).await?;
        }
        Body::Full(bytes) => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            let head = Frame::Head(ResponseHead { status, headers });
            if head_only {
                sink.send(head).await?;
            } else {
                sink.feed(head).await?;
                sink.send(Frame::Data(bytes)).await?;
            }
        }
        Body::Documents(documents) => {
            headers.remove(header::CONTENT_LENGTH);
            headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            sink.send(Frame::Head(ResponseHead { status, headers })).await?;
            if head_only {
                return Ok(WriteOutcome::Complete);
            }
            if let StreamOutcome::Aborted(_) = pump_documents(sink, documents).await {
                return Ok(WriteOutcome::StreamAborted);
            }
        }
    }

    Ok(WriteOutcome::Complete)
}

/// Writes each document as its own flushed chunk, then the final chunk
///
/// The first encode or write failure ends the stream. Nothing is reported
/// to the peer since the connection is already broken at that point.
pub async fn pump_documents<S>(sink: &mut S, documents: DocumentStream) -> StreamOutcome
where
    S: Sink<Frame, Error = HttpProtocolError> + Unpin,
{
    let mut written = 0;
    for document in documents {
        let chunk = match document {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, written, "Failed to encode document, ending stream");
                return StreamOutcome::Aborted(written);
            }
        };
        if let Err(e) = sink.send(Frame::Chunk(chunk)).await {
            debug!(error = %e, written, "Stream write failed, ending stream");
            return StreamOutcome::Aborted(written);
        }
        written += 1;
    }

    match sink.send(Frame::EndOfChunks).await {
        Ok(()) => StreamOutcome::Completed(written),
        Err(e) => {
            debug!(error = %e, written, "Failed to terminate stream");
            StreamOutcome::Aborted(written)
        }
    }
}

fn forbids_body(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}
