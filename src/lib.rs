//! Claims Intake — automated insurance claim intake over email.
//!
//! A mail monitor polls an IMAP inbox, filters messages through an LLM
//! relevance classifier, validates senders against the user registry,
//! assesses whether a claim carries everything it needs, and either
//! archives the claim or asks the customer for the missing pieces.

pub mod api;
pub mod attachments;
pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod templates;
