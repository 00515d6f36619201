//! inbox-sorter: learns mailbox categories from labelled mail and files
//! new mail as push notifications arrive.

pub mod artifacts;
pub mod config;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod inference;
pub mod mail;
pub mod model;
pub mod server;
pub mod text;
pub mod training;
