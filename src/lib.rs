//! taskvault keeps a live index of the markdown checklist tasks in a folder
//! of notes (a "vault") and edits task lines back into their files safely.
//!
//! - [`cache::Cache`] follows [`vault::Vault`] events and publishes task
//!   snapshots through [`events::TasksEvents`].
//! - [`edit::TaskEditor`] finds a task's current line even after the file
//!   has shifted, and retries while the vault's metadata catches up.

pub mod cache;
pub mod cli;
pub mod edit;
pub mod events;
pub mod io;
pub mod model;
pub mod notice;
pub mod parse;
pub mod vault;
