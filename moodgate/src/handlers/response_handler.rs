use bytes::Bytes;
use common::consts::{JSON_CONTENT_TYPE, SSE_CONTENT_TYPE};
use common::errors::MoodGateError;
use framewire::StreamFrame;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Builders for the JSON and event-stream bodies the server sends.
pub struct ResponseHandler;

impl ResponseHandler {
    pub fn create_full_body<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
        Full::new(chunk.into())
            .map_err(|never| match never {})
            .boxed()
    }

    pub fn create_json_response(
        status: StatusCode,
        body: &Value,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, MoodGateError> {
        Ok(Response::builder()
            .status(status)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(Self::create_full_body(body.to_string()))?)
    }

    /// One `data: ` line per frame, written as frames arrive.
    pub fn create_sse_response(
        frames: ReceiverStream<StreamFrame>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, MoodGateError> {
        let stream = frames.map(|frame| Ok::<_, hyper::Error>(Frame::data(frame.to_bytes())));
        let stream_body = BoxBody::new(StreamBody::new(stream));

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, SSE_CONTENT_TYPE)
            .header(CACHE_CONTROL, "no-cache")
            .body(stream_body)?)
    }

    /// Error bodies always go out, even if the builder itself failed.
    pub fn create_error_response(err: MoodGateError) -> Response<BoxBody<Bytes, hyper::Error>> {
        err.into_response()
    }
}
