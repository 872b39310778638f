//! Domains module containing business logic organized by bounded contexts.
//!
//! The image tools are the only domain; resources and prompts are advertised
//! as empty lists by the transport layer.

pub mod tools;
