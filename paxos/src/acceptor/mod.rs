//! Acceptor role of a node

mod handler;

pub use handler::AcceptorHandler;
