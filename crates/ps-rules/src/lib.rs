//! Privacy Shield Rule Management
//!
//! This crate backs the settings surfaces: editing user rules and domain rule
//! sets, exporting and importing settings files, validating the bundled rule
//! file, and the popup's view of the current tab.

pub mod popup;
pub mod rule_file;
pub mod settings;
pub mod transfer;

pub use popup::{toggle_protection, PopupView};
pub use rule_file::{parse_rule_file, validate_domains, RuleIssue, Severity};
pub use settings::{Outcome, RuleEditError, RuleEditor, RuleKind, ToastKind};
pub use transfer::{create_export, export_filename, parse_import, ExportData, ImportData, ImportError};
