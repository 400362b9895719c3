//! Line-delimited JSON framing over a TCP stream.
//!
//! One frame per line; a malformed line is reported with its raw text and
//! skipped by callers rather than tearing the connection down. The read and
//! write helpers are generic over the framed stream's halves so a connection
//! can be split between a reader task and a writer task.

use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::error::ProtocolError;

/// Frames over 8 MiB are rejected; state trees bigger than that indicate a
/// runaway encode, not a legitimate snapshot.
const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

pub type FramedConnection = Framed<TcpStream, LinesCodec>;
pub type FrameSink = SplitSink<FramedConnection, String>;
pub type FrameStream = SplitStream<FramedConnection>;

/// Wrap a freshly accepted or connected stream.
pub fn frame(stream: TcpStream) -> FramedConnection {
    Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH))
}

/// Split a connection into independently owned write and read halves.
pub fn split(connection: FramedConnection) -> (FrameSink, FrameStream) {
    connection.split()
}

/// Serialize and send one frame.
pub async fn send_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), ProtocolError>
where
    W: Sink<String, Error = LinesCodecError> + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(frame)
        .map_err(|e| ProtocolError::Framing(format!("failed to serialize frame: {e}")))?;
    writer
        .send(json)
        .await
        .map_err(|e| ProtocolError::Framing(e.to_string()))
}

/// Read the next frame. `Err(ConnectionClosed)` once the peer hangs up;
/// `Err(MalformedEnvelope)` for a line that is not a valid `T`.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, ProtocolError>
where
    R: Stream<Item = Result<String, LinesCodecError>> + Unpin,
    T: DeserializeOwned,
{
    match reader.next().await {
        Some(Ok(line)) => {
            serde_json::from_str(&line).map_err(|e| ProtocolError::MalformedEnvelope {
                reason: e.to_string(),
                raw: line,
            })
        }
        Some(Err(e)) => Err(ProtocolError::Framing(e.to_string())),
        None => Err(ProtocolError::ConnectionClosed),
    }
}
