//! Length-prefixed bincode framing.
//!
//! Every message is one frame: a 4-byte big-endian length followed by the
//! bincode body. The length bound exists so a corrupt or hostile peer cannot
//! make the receiver allocate unbounded memory.

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use surge_common::error::ProtocolError;
use surge_common::prelude::*;

/// Upper bound on a single frame body. Keys and values in this system are
/// short strings; anything near this size is a protocol violation.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Write `msg` as one frame and flush it.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(msg)
        .map_err(|e| Error::Protocol(ProtocolError::InvalidFrame(e.to_string())))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::Protocol(ProtocolError::FrameTooLarge(body.len())));
    }

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it.
///
/// A clean EOF before the length prefix is reported as
/// `ProtocolError::ConnectionClosed` so server loops can tell an orderly
/// disconnect from a broken stream.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::Protocol(ProtocolError::ConnectionClosed));
        }
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(Error::Protocol(ProtocolError::FrameTooLarge(len)));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    bincode::deserialize(&body)
        .map_err(|e| Error::Protocol(ProtocolError::InvalidFrame(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{GetReply, Request, Response};
    use surge_common::{ClientId, ConflictReason, TxnId};

    #[tokio::test]
    async fn test_frame_round_trip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let request = Request::Put {
            key: "account_3".into(),
            value: "1000".into(),
            txid: TxnId(77),
            client_id: ClientId(5),
        };
        write_frame(&mut client, &request).await.unwrap();
        let decoded: Request = read_frame(&mut server).await.unwrap();
        assert_eq!(decoded, request);

        let response = Response::Get(Ok(GetReply {
            value: String::new(),
            present: false,
        }));
        write_frame(&mut server, &response).await.unwrap();
        let decoded: Response = read_frame(&mut client).await.unwrap();
        assert_eq!(decoded, response);
    }

    #[tokio::test]
    async fn test_eof_reports_connection_closed() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let err = read_frame::<_, Request>(&mut server).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let huge = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut client, &huge)
            .await
            .unwrap();

        let err = read_frame::<_, Response>(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn test_conflict_reason_survives_the_wire() {
        let (mut client, mut server) = tokio::io::duplex(256);

        let response = Response::Put(Err(ConflictReason::ReadLockedByOther));
        write_frame(&mut server, &response).await.unwrap();

        let decoded: Response = read_frame(&mut client).await.unwrap();
        match decoded {
            Response::Put(Err(reason)) => {
                assert_eq!(reason, ConflictReason::ReadLockedByOther);
                assert!(reason.to_string().contains("Cannot acquire"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
