// Popup surface over a Unix domain socket: one length-prefixed JSON request,
// one length-prefixed JSON response per connection

use crate::error::{Result, ToxwatchError};
use crate::store::StatusKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Maximum frame size (1MB)
const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Requests from the CLI to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IpcMessage {
    /// Start observing and remember it
    Start,
    /// Stop observing and remember it
    Stop,
    /// Observation state, progress and flags
    Status,
    /// Classify a free text
    Analyze { text: String },
    /// Classify one recorded post again
    Recheck { id: u64 },
    /// Toggle a stored flag
    Flag { key: StatusKey, value: bool },
    /// Shut the daemon down
    Shutdown,
}

/// Response sent back for every request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl IpcResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn success_with_data(data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Unix domain socket server
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            listener: None,
        }
    }

    /// Bind, replacing a stale socket file left by a previous run
    pub fn bind(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ToxwatchError::Io {
                source: e,
                context: format!("Failed to remove existing socket: {:?}", self.socket_path),
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ToxwatchError::Io {
                source: e,
                context: format!("Failed to create socket directory: {:?}", parent),
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| ToxwatchError::Io {
            source: e,
            context: format!("Failed to bind to socket: {:?}", self.socket_path),
        })?;
        self.listener = Some(listener);

        tracing::info!("IPC server listening on {:?}", self.socket_path);
        Ok(())
    }

    pub async fn accept(&self) -> Result<UnixStream> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| ToxwatchError::Daemon("Server not bound".to_string()))?;

        let (stream, _addr) = listener.accept().await.map_err(|e| ToxwatchError::Io {
            source: e,
            context: "Failed to accept connection".to_string(),
        })?;
        Ok(stream)
    }

    /// Remove the socket file
    pub fn shutdown(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ToxwatchError::Io {
                source: e,
                context: format!("Failed to remove socket: {:?}", self.socket_path),
            })?;
        }
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Read one 4-byte big-endian length-prefixed JSON frame
async fn read_frame<R, T>(reader: &mut R, what: &str) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let length = reader.read_u32().await.map_err(|e| ToxwatchError::Io {
        source: e,
        context: format!("Failed to read {} length", what),
    })?;

    if length > MAX_MESSAGE_SIZE {
        return Err(ToxwatchError::Daemon(format!(
            "{} too large: {} bytes (max: {})",
            what, length, MAX_MESSAGE_SIZE
        )));
    }

    let mut buffer = vec![0u8; length as usize];
    reader
        .read_exact(&mut buffer)
        .await
        .map_err(|e| ToxwatchError::Io {
            source: e,
            context: format!("Failed to read {} payload", what),
        })?;

    serde_json::from_slice(&buffer).map_err(|e| ToxwatchError::Json {
        source: e,
        context: format!("Failed to deserialize {}", what),
    })
}

/// Write one length-prefixed JSON frame and flush
async fn write_frame<W, T>(writer: &mut W, value: &T, what: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value).map_err(|e| ToxwatchError::Json {
        source: e,
        context: format!("Failed to serialize {}", what),
    })?;

    if payload.len() > MAX_MESSAGE_SIZE as usize {
        return Err(ToxwatchError::Daemon(format!(
            "{} too large: {} bytes (max: {})",
            what,
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    writer
        .write_u32(payload.len() as u32)
        .await
        .map_err(|e| ToxwatchError::Io {
            source: e,
            context: format!("Failed to write {} length", what),
        })?;
    writer
        .write_all(&payload)
        .await
        .map_err(|e| ToxwatchError::Io {
            source: e,
            context: format!("Failed to write {} payload", what),
        })?;
    writer.flush().await.map_err(|e| ToxwatchError::Io {
        source: e,
        context: format!("Failed to flush {}", what),
    })
}

pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<IpcMessage> {
    read_frame(reader, "IPC message").await
}

pub async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &IpcResponse) -> Result<()> {
    write_frame(writer, response, "IPC response").await
}

/// Client used by the CLI
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send one request and wait for its response
    pub async fn send(&self, message: &IpcMessage) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| ToxwatchError::Io {
                source: e,
                context: format!("Failed to connect to daemon at {:?}", self.socket_path),
            })?;

        write_frame(&mut stream, message, "IPC message").await?;
        read_frame(&mut stream, "IPC response").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_string(&IpcMessage::Flag {
            key: StatusKey::HideToxic,
            value: true,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"flag","key":"hide_toxic","value":true}"#);

        let parsed: IpcMessage = serde_json::from_str(r#"{"type":"recheck","id":4}"#).unwrap();
        assert_eq!(parsed, IpcMessage::Recheck { id: 4 });
    }

    #[test]
    fn test_ipc_response_creation() {
        let success = IpcResponse::success("Observation started");
        assert!(success.success);
        assert_eq!(success.message.unwrap(), "Observation started");

        let error = IpcResponse::error("Unknown post");
        assert!(!error.success);
        assert!(error.data.is_none());
    }

    #[tokio::test]
    async fn test_frame_over_stream_pair() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let message = IpcMessage::Analyze {
            text: "hello there".to_string(),
        };

        write_frame(&mut a, &message, "IPC message").await.unwrap();
        assert_eq!(read_message(&mut b).await.unwrap(), message);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        a.write_u32(MAX_MESSAGE_SIZE + 1).await.unwrap();

        match read_message(&mut b).await {
            Err(ToxwatchError::Daemon(msg)) => assert!(msg.contains("too large")),
            other => panic!("Expected size error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_server_exchange() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("toxwatch.sock");
        let mut server = IpcServer::new(path.clone());
        server.bind().unwrap();

        let serve = tokio::spawn(async move {
            let mut stream = server.accept().await.unwrap();
            let message = read_message(&mut stream).await.unwrap();
            assert_eq!(message, IpcMessage::Status);
            write_response(&mut stream, &IpcResponse::success("ok")).await.unwrap();
            server.shutdown().unwrap();
        });

        let response = IpcClient::new(path.clone()).send(&IpcMessage::Status).await.unwrap();
        assert!(response.success);
        serve.await.unwrap();
        assert!(!path.exists());
    }
}
