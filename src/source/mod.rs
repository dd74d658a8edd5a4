pub mod connection;

use tokio::{
    io::AsyncRead,
    net::TcpStream,
};

/// Opens the stream the BEAST data is read from.
///
/// The reader calls this every time it (re)connects.
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + Send + Unpin + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Stream, std::io::Error>> + Send;
}

/// Connects to a BEAST server via TCP.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream, std::io::Error> {
        tracing::debug!(address = %self.address, "connecting");
        TcpStream::connect(&self.address).await
    }
}
