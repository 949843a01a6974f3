//! Subcommand implementations. Each returns `Err` with a printable message.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;

use ps_core::dom::parse_html;
use ps_core::message::{MessageSink, Request};
use ps_core::resolver::{self, Resolver, RuleTier};
use ps_core::session::PageSession;
use ps_core::store::RuleStore;
use ps_core::types::{RuleEntry, UserRules};
use ps_rules::rule_file::{is_usable, parse_rule_file, validate_domains};
use ps_rules::transfer::export_filename;
use ps_rules::{Outcome, RuleEditor, RuleKind};

use crate::file_store::{FileRules, JsonFileStorage};

/// Store and rule file locations shared by every command.
pub struct Context {
    store: PathBuf,
    rules_file: Option<PathBuf>,
}

impl Context {
    pub fn new(store: PathBuf, rules_file: Option<PathBuf>) -> Self {
        Self { store, rules_file }
    }

    fn store(&self) -> RuleStore<JsonFileStorage> {
        RuleStore::new(JsonFileStorage::new(&self.store))
    }

    fn resolver(&self) -> Resolver<FileRules> {
        Resolver::new(FileRules::new(self.rules_file.clone()))
    }

    async fn editor(&self) -> RuleEditor {
        RuleEditor::load(&self.store()).await
    }
}

/// Badge updates have no consumer outside the browser.
struct LogMessenger;

impl MessageSink for LogMessenger {
    fn send(&self, request: Request) {
        log::debug!("Message: {:?}", request);
    }
}

fn report(outcome: Outcome) -> Result<(), String> {
    if outcome.is_success() {
        println!("{}", outcome.message);
        Ok(())
    } else {
        Err(outcome.message)
    }
}

fn entries(rules: &UserRules, kind: RuleKind) -> &[RuleEntry] {
    match kind {
        RuleKind::Keyword => &rules.keywords,
        RuleKind::Pattern => &rules.patterns,
    }
}

fn print_entries(label: &str, entries: &[RuleEntry]) {
    println!("{} ({}):", label, entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let state = if entry.is_enabled() { "on " } else { "off" };
        println!("  [{}] {} {}", index, state, entry.value());
    }
}

// =============================================================================
// Engine
// =============================================================================

pub async fn init(ctx: &Context) -> Result<(), String> {
    if !ctx.store().initialize().await {
        return Err(format!("Failed to initialize '{}'", ctx.store.display()));
    }
    println!("Initialized '{}'", ctx.store.display());
    Ok(())
}

pub async fn scan(ctx: &Context, html: &Path, host: &str, as_json: bool) -> Result<(), String> {
    let text = fs::read_to_string(html).map_err(|e| format!("Failed to read '{}': {}", html.display(), e))?;
    let tree = parse_html(&text).map_err(|e| format!("Failed to parse '{}': {}", html.display(), e))?;

    let mut session = PageSession::new(host, tree, ctx.store(), ctx.resolver(), LogMessenger);
    let result = session.start(0).await;
    if result.changed() && !session.flush().await {
        log::warn!("Hidden items were not saved to '{}'", ctx.store.display());
    }

    let rule_set = session.domain_rules().map(|rules| rules.name.clone());
    let items = session.hidden_items().items();

    if as_json {
        let output = json!({
            "host": host,
            "ruleSet": rule_set,
            "paused": session.is_paused(),
            "selectorHits": result.selector_hits,
            "keywordHits": result.keyword_hits,
            "patternHits": result.pattern_hits,
            "hiddenItems": items,
        });
        let text = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }

    match &rule_set {
        Some(name) => println!("Rule set:  {}", name),
        None => println!("Rule set:  none (no rule set matches '{}')", host),
    }
    if session.is_paused() {
        println!("Protection is paused; nothing was hidden");
        return Ok(());
    }
    println!("Hidden:    {} element(s)", result.total());
    println!("  Selectors: {}", result.selector_hits);
    println!("  Keywords:  {}", result.keyword_hits);
    println!("  Patterns:  {}", result.pattern_hits);
    for item in items {
        println!("  - {}", item);
    }
    Ok(())
}

pub async fn resolve(ctx: &Context, host: &str) -> Result<(), String> {
    let store = ctx.store();
    let Some((tier, rules)) = ctx.resolver().resolve_with_tier(&store, host).await else {
        return Err(format!("No rule set matches '{}'", host));
    };
    let source = match tier {
        RuleTier::Stored => "stored domain rules",
        RuleTier::Bundled => "rule file",
        RuleTier::BuiltIn => "built-in table",
    };
    println!("{} (from {})", rules.name, source);
    println!("  Enabled:   {}", resolver::is_domain_enabled(&rules));
    println!("  Matches:   {}", rules.matches.join(", "));
    println!("  Selectors:");
    for selector in &rules.selectors {
        println!("    {}", selector);
    }
    Ok(())
}

pub fn test_pattern(pattern: &str, text: &str) -> Result<(), String> {
    let found = resolver::test_pattern(pattern, text).ok_or_else(|| format!("Invalid pattern: {}", pattern))?;
    if found.is_empty() {
        println!("No matches");
    }
    for m in found {
        println!("{}", m);
    }
    Ok(())
}

pub fn validate_rules(input: &Path) -> Result<(), String> {
    let text = fs::read_to_string(input).map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?;
    let file = parse_rule_file(&text).map_err(|e| format!("Invalid rule file: {}", e))?;
    let issues = validate_domains(&file.domains);

    for issue in &issues {
        println!("{:?}: {}", issue.severity(), issue);
    }
    if !is_usable(&issues) {
        return Err(format!("'{}' has errors", input.display()));
    }
    println!("'{}' is valid ({} rule sets, {} warnings)", input.display(), file.domains.len(), issues.len());
    Ok(())
}

// =============================================================================
// Store
// =============================================================================

pub async fn list_rules(ctx: &Context) -> Result<(), String> {
    let editor = ctx.editor().await;
    print_entries("Keywords", &editor.user_rules().keywords);
    print_entries("Patterns", &editor.user_rules().patterns);
    println!("Domains ({}):", editor.domain_rules().len());
    for (key, set) in editor.domain_rules().iter() {
        let state = if set.is_enabled() { "on " } else { "off" };
        println!("  {} {} ({}): {}", state, key, set.name, set.matches.join(", "));
    }
    Ok(())
}

pub async fn add_rule(ctx: &Context, kind: RuleKind, value: &str) -> Result<(), String> {
    let mut editor = ctx.editor().await;
    match editor.add_and_commit(&ctx.store(), kind, value).await {
        Some(outcome) => report(outcome),
        None => Err(format!("Empty {}", kind.label())),
    }
}

pub async fn remove_rules(ctx: &Context, kind: RuleKind, indices: &[usize]) -> Result<(), String> {
    let mut editor = ctx.editor().await;
    report(editor.delete_many_and_commit(&ctx.store(), kind, indices).await)
}

pub async fn toggle_rule(ctx: &Context, kind: RuleKind, index: usize) -> Result<(), String> {
    let mut editor = ctx.editor().await;
    let enabled = entries(editor.user_rules(), kind)
        .get(index)
        .map(|entry| !entry.is_enabled())
        .unwrap_or(true);
    editor.set_enabled(kind, index, enabled).map_err(|e| e.to_string())?;
    let state = if enabled { "enabled" } else { "disabled" };
    report(editor.commit(&ctx.store(), &format!("{} {} {}", kind.label(), index, state)).await)
}

pub async fn move_rule(ctx: &Context, kind: RuleKind, from: usize, to: usize) -> Result<(), String> {
    let mut editor = ctx.editor().await;
    editor.move_rule(kind, from, to).map_err(|e| e.to_string())?;
    report(editor.commit(&ctx.store(), &format!("Moved {} {} to {}", kind.label(), from, to)).await)
}

pub async fn set_domain(ctx: &Context, key: &str, enabled: bool) -> Result<(), String> {
    let mut editor = ctx.editor().await;
    let outcome = editor.set_domain_enabled(key, enabled).map_err(|e| e.to_string())?;
    report(editor.commit(&ctx.store(), &outcome.message).await)
}

pub async fn reset(ctx: &Context) -> Result<(), String> {
    let mut editor = ctx.editor().await;
    report(editor.reset_and_commit(&ctx.store()).await)
}

pub async fn set_paused(ctx: &Context, paused: bool) -> Result<(), String> {
    if !ctx.store().set_is_paused(paused).await {
        return Err(format!("Failed to write '{}'", ctx.store.display()));
    }
    println!("{}", if paused { "Protection paused" } else { "Protection resumed" });
    Ok(())
}

pub async fn export(ctx: &Context, output: Option<PathBuf>) -> Result<(), String> {
    let now = Utc::now();
    let editor = ctx.editor().await;
    let text = editor.export(now).to_pretty_json().map_err(|e| e.to_string())?;
    let path = output.unwrap_or_else(|| PathBuf::from(export_filename(now)));
    fs::write(&path, text).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    println!("Exported settings to '{}'", path.display());
    Ok(())
}

pub async fn import(ctx: &Context, input: &Path) -> Result<(), String> {
    let text = fs::read_to_string(input).map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?;
    let mut editor = ctx.editor().await;
    report(editor.import_and_commit(&ctx.store(), &text).await)
}
