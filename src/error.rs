use std::fmt;
use std::sync::PoisonError;

use tonic::{Code, Status};

#[derive(Debug, PartialEq)]
pub enum DFSError {
    ConfigError(String),
    ConnectionError(String),
    TonicError(String),
    RPCError(String),
    IOError(String),
    NotFound(String),
    InsufficientReplicas(String),
    ReplicaUnavailable(String),
    InvalidBlockId(String),
    RegistrationFailed(String),
    LockError(String),
    TaskError(String),
}

impl DFSError {
    /// True when the failure indicts one datanode rather than the operation itself.
    pub fn is_node_fatal(&self) -> bool {
        matches!(
            self,
            DFSError::ConnectionError(_)
                | DFSError::TonicError(_)
                | DFSError::RPCError(_)
                | DFSError::ReplicaUnavailable(_)
        )
    }
}

impl fmt::Display for DFSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DFSError::ConfigError(msg) => write!(f, "config error: {}", msg),
            DFSError::ConnectionError(msg) => write!(f, "connection error: {}", msg),
            DFSError::TonicError(msg) => write!(f, "transport error: {}", msg),
            DFSError::RPCError(msg) => write!(f, "rpc error: {}", msg),
            DFSError::IOError(msg) => write!(f, "io error: {}", msg),
            DFSError::NotFound(msg) => write!(f, "not found: {}", msg),
            DFSError::InsufficientReplicas(msg) => write!(f, "insufficient replicas: {}", msg),
            DFSError::ReplicaUnavailable(msg) => write!(f, "replica unavailable: {}", msg),
            DFSError::InvalidBlockId(msg) => write!(f, "invalid block id: {}", msg),
            DFSError::RegistrationFailed(msg) => write!(f, "registration failed: {}", msg),
            DFSError::LockError(msg) => write!(f, "lock error: {}", msg),
            DFSError::TaskError(msg) => write!(f, "task error: {}", msg),
        }
    }
}

impl std::error::Error for DFSError {}

impl From<tonic::transport::Error> for DFSError {
    fn from(error: tonic::transport::Error) -> Self {
        DFSError::TonicError(error.to_string())
    }
}

impl From<toml::de::Error> for DFSError {
    fn from(error: toml::de::Error) -> Self {
        DFSError::ConfigError(error.to_string())
    }
}

impl From<serde_xml_rs::Error> for DFSError {
    fn from(error: serde_xml_rs::Error) -> Self {
        DFSError::ConfigError(error.to_string())
    }
}

impl From<std::io::Error> for DFSError {
    fn from(error: std::io::Error) -> Self {
        DFSError::IOError(error.to_string())
    }
}

impl From<tokio::task::JoinError> for DFSError {
    fn from(error: tokio::task::JoinError) -> Self {
        DFSError::TaskError(error.to_string())
    }
}

impl<T> From<PoisonError<T>> for DFSError {
    fn from(error: PoisonError<T>) -> DFSError {
        DFSError::LockError(format!("Lock error: {}", error))
    }
}

impl From<DFSError> for Status {
    fn from(error: DFSError) -> Self {
        match error {
            DFSError::NotFound(msg) => Status::not_found(msg),
            DFSError::InsufficientReplicas(msg) => Status::failed_precondition(msg),
            DFSError::InvalidBlockId(msg) => Status::invalid_argument(msg),
            DFSError::ConfigError(msg) => Status::invalid_argument(msg),
            DFSError::IOError(msg) => Status::internal(msg),
            DFSError::LockError(msg) => Status::internal(msg),
            DFSError::TaskError(msg) => Status::internal(msg),
            other => Status::unavailable(other.to_string()),
        }
    }
}

impl From<Status> for DFSError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::NotFound => DFSError::NotFound(message),
            Code::FailedPrecondition => DFSError::InsufficientReplicas(message),
            _ => DFSError::RPCError(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, DFSError>;
