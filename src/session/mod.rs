//! Session module - Supervision of the remote service connection

pub mod supervisor;

pub use supervisor::{
    ConnectError, ConnectionRecord, ConnectionStatus, ConnectionSupervisor,
    DEFAULT_CONNECT_TIMEOUT,
};
