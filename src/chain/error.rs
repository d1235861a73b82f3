use crate::btcjson::RpcError;

/// Chain client errors.
pub enum ChainClientError {
    /// Error returned by the RPC server.
    Rpc(RpcError),

    /// Transport failure between client and backing node.
    Connection(String),

    /// The backend is shutting down or not connected.
    ClientShutdown,

    /// The backend returned a response the client could not interpret.
    InvalidResponse(String),
}

impl ChainClientError {
    /// Reports whether the error is the server's distinguishable *no
    /// transaction info* code.
    pub fn is_no_tx_info(&self) -> bool {
        match self {
            ChainClientError::Rpc(e) => e.is_no_tx_info(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ChainClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ChainClientError::Rpc(ref e) => write!(f, "Server returned an error: {}.", e),
            ChainClientError::Connection(ref e) => write!(f, "Connection error: {}.", e),
            ChainClientError::ClientShutdown => write!(f, "Chain client disconnected."),
            ChainClientError::InvalidResponse(ref e) => {
                write!(f, "Invalid response from server, error: {}.", e)
            }
        }
    }
}

impl std::fmt::Debug for ChainClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ChainClientError::Rpc(ref e) => {
                write!(f, "ChainClientError(server returned an error: {})", e)
            }
            ChainClientError::Connection(ref e) => {
                write!(f, "ChainClientError(connection error: {})", e)
            }
            ChainClientError::ClientShutdown => {
                write!(f, "ChainClientError(chain client disconnected)")
            }
            ChainClientError::InvalidResponse(ref e) => {
                write!(f, "ChainClientError(invalid response from server, error: {})", e)
            }
        }
    }
}
