//! Shared domain and wire types for the Threadline timeline engine.

pub mod codec;
pub mod contact;
pub mod event;
pub mod message;
