//! Split-pane layout engine for a tabbed terminal.
//!
//! Each tab holds a binary tree of [`layout::Split`]s with terminals at the
//! leaves. [`tab::TabContent`] owns one tree and performs every change to it;
//! [`notebook::Notebook`] owns the tabs and routes loop events to them.

pub mod config;
pub mod divider;
pub mod error;
pub mod event;
pub mod inspect;
pub mod layout;
pub mod notebook;
pub mod record;
pub mod session;
pub mod signal;
pub mod tab;
pub mod terminal;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;
