//! Bug journal
//!
//! Records bug reports into a per-user cloud document collection, keeps a
//! live filtered list of them and asks an AI model for fix suggestions.

pub mod adapter;
pub mod auth;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod filter;
pub mod record;
pub mod session;
pub mod store;
pub mod suggestion;
pub mod view;

pub use adapter::{BugStore, RecordListSnapshot, RecordStream};
pub use error::{JournalError, JournalResult};
pub use filter::{filter_records, FilterState, SeverityFilter};
pub use record::{BugDraft, BugRecord, RecordId, Severity, ValidationProfile};
pub use session::{Principal, PrincipalId, SessionContext};
pub use view::{InFlight, JournalView, Notice, NoticeLevel, ViewEvent};
