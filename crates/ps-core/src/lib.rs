//! Privacy Shield Core Library
//!
//! This crate provides the content-script engine for the Privacy Shield
//! extension: the rule store, the domain rule resolver and the DOM hiding
//! engine that removes privacy-sensitive elements (delivery addresses,
//! location widgets) from rendered pages.
//!
//! # Architecture
//!
//! Every extension context (content script, popup, options page, background
//! worker) talks to the same persistent key-value store through [`RuleStore`].
//! A content script owns one [`PageSession`] per page load. The session
//! resolves the domain rule set for the page, runs the [`HidingEngine`] over
//! the document and re-runs it whenever the DOM mutates or the store reports
//! a rule change. The host platform (live DOM, `chrome.storage`, runtime
//! messaging) is reached only through the [`Document`], [`StorageArea`],
//! [`BundledRules`] and [`MessageSink`] traits.
//!
//! # Modules
//!
//! - `types`: Rule entries, user rules, domain rule sets and settings
//! - `config`: Constants and the built-in domain table
//! - `store`: Storage backend trait, in-memory backend and typed accessors
//! - `resolver`: Three-tier domain rule resolution and pattern compilation
//! - `dom`: Document abstraction, selector engine and in-memory page tree
//! - `engine`: The hiding engine
//! - `timer`: Deadline-based debounce and toast timers
//! - `session`: Per-page reactive session
//! - `message`: Cross-context message contract and background handler

pub mod config;
pub mod dom;
pub mod engine;
pub mod message;
pub mod resolver;
pub mod session;
pub mod store;
pub mod text;
pub mod timer;
pub mod types;

// Re-export commonly used types
pub use dom::{Document, PageTree, SelectorError};
pub use engine::{ActiveRules, HiddenItems, HidingEngine, ScanReport};
pub use message::{BackgroundService, BadgeRenderer, MessageSink, Request, Response};
pub use resolver::{BundledRules, Resolver, ResourceError};
pub use session::PageSession;
pub use store::{MemoryStorage, RuleStore, StorageArea, StorageChanges, StorageError};
pub use types::{DomainRuleSet, DomainRules, GeneralSettings, RuleEntry, RuleFile, UserRules};
