//! drona - cache-augmented conversational front end
//!
//! Turns go to a generation service (Gemini); text-only answers are cached
//! in a shared store (Firebase Realtime Database) for seven days. The client
//! keeps the conversation in local storage and reveals fresh answers
//! incrementally.
//!
//! Leaves first: [`key`], [`cache`], [`gateway`], [`conversation`],
//! [`render`], then [`pipeline`] (server half) and [`orchestrator`]
//! (client half).

pub mod attachments;
pub mod backend;
pub mod cache;
pub mod config;
pub mod conversation;
pub mod error;
pub mod firebase;
pub mod gateway;
pub mod gemini;
pub mod key;
pub mod logging;
pub mod markdown;
pub mod orchestrator;
pub mod persona;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod storage;
pub mod terminal;
pub mod trending;
pub mod turn;
