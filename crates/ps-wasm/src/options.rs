//! Options page bindings
//!
//! The page holds one working copy of the rules. Each edit runs on a clone
//! that replaces the working copy once the edit and its save have finished.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use js_sys::{Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use ps_core::resolver::test_pattern;
use ps_core::types::GeneralSettings;
use ps_rules::rule_file::{parse_rule_file, validate_domains};
use ps_rules::settings::messages;
use ps_rules::transfer::export_filename;
use ps_rules::{Outcome, RuleEditor, RuleKind};

use crate::bridge::{from_js, now_ms, to_js};
use crate::chrome;

fn parse_kind(kind: &str) -> Result<RuleKind, JsValue> {
    match kind {
        "keyword" | "keywords" => Ok(RuleKind::Keyword),
        "pattern" | "patterns" => Ok(RuleKind::Pattern),
        other => Err(JsValue::from_str(&format!("Unknown rule kind: {}", other))),
    }
}

fn outcome_to_js(outcome: Option<Outcome>) -> Result<JsValue, JsValue> {
    match outcome {
        Some(outcome) => to_js(&outcome),
        None => Ok(JsValue::UNDEFINED),
    }
}

/// Save without a toast unless the save fails.
async fn save_quietly(editor: &RuleEditor) -> Option<Outcome> {
    if editor.save(&chrome::local_store()).await {
        None
    } else {
        Some(Outcome::error(messages::SAVE_FAILED))
    }
}

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(now_ms() as i64).unwrap_or_default()
}

#[wasm_bindgen]
pub struct OptionsPage {
    editor: Rc<RefCell<RuleEditor>>,
}

#[wasm_bindgen]
pub async fn load_options() -> Result<OptionsPage, JsValue> {
    let editor = RuleEditor::load(&chrome::local_store()).await;
    Ok(OptionsPage {
        editor: Rc::new(RefCell::new(editor)),
    })
}

impl OptionsPage {
    /// Run `edit` on a copy of the working rules, then keep the copy.
    fn edit<F>(&self, edit: F) -> Promise
    where
        F: AsyncFnOnce(&mut RuleEditor) -> Option<Outcome> + 'static,
    {
        let shared = self.editor.clone();
        future_to_promise(async move {
            let mut working = shared.borrow().clone();
            let outcome = edit(&mut working).await;
            *shared.borrow_mut() = working;
            outcome_to_js(outcome)
        })
    }
}

#[wasm_bindgen]
impl OptionsPage {
    /// `{ userRules, domainRules, generalSettings }`
    pub fn state(&self) -> Result<JsValue, JsValue> {
        let editor = self.editor.borrow();
        let result = js_sys::Object::new();
        Reflect::set(&result, &"userRules".into(), &to_js(editor.user_rules())?)?;
        Reflect::set(&result, &"domainRules".into(), &to_js(editor.domain_rules())?)?;
        Reflect::set(&result, &"generalSettings".into(), &to_js(editor.general_settings())?)?;
        Ok(result.into())
    }

    /// Rules whose value contains `query`, as `{ index, value, enabled }`.
    pub fn filter(&self, kind: &str, query: &str) -> Result<JsValue, JsValue> {
        let kind = parse_kind(kind)?;
        let editor = self.editor.borrow();
        let rows = js_sys::Array::new();
        for (index, entry) in editor.filter(kind, query) {
            let row = js_sys::Object::new();
            let _ = Reflect::set(&row, &"index".into(), &JsValue::from(index as u32));
            let _ = Reflect::set(&row, &"value".into(), &JsValue::from_str(entry.value()));
            let _ = Reflect::set(&row, &"enabled".into(), &JsValue::from(entry.is_enabled()));
            rows.push(&row);
        }
        Ok(rows.into())
    }

    /// Domain rule sets matching `query`, as `{ key, name, enabled, matches, selectorCount }`.
    pub fn filter_domains(&self, query: &str) -> JsValue {
        let editor = self.editor.borrow();
        let rows = js_sys::Array::new();
        for (key, set) in editor.filter_domains(query) {
            let row = js_sys::Object::new();
            let matches: js_sys::Array = set.matches.iter().map(|m| JsValue::from_str(m)).collect();
            let _ = Reflect::set(&row, &"key".into(), &JsValue::from_str(key));
            let _ = Reflect::set(&row, &"name".into(), &JsValue::from_str(&set.name));
            let _ = Reflect::set(&row, &"enabled".into(), &JsValue::from(set.is_enabled()));
            let _ = Reflect::set(&row, &"matches".into(), &matches);
            let _ = Reflect::set(&row, &"selectorCount".into(), &JsValue::from(set.selectors.len() as u32));
            rows.push(&row);
        }
        rows.into()
    }

    pub fn add_rule(&self, kind: &str, input: String) -> Result<Promise, JsValue> {
        let kind = parse_kind(kind)?;
        Ok(self.edit(async move |editor: &mut RuleEditor| {
            editor.add_and_commit(&chrome::local_store(), kind, &input).await
        }))
    }

    pub fn delete_rule(&self, kind: &str, index: usize) -> Result<Promise, JsValue> {
        let kind = parse_kind(kind)?;
        Ok(self.edit(async move |editor: &mut RuleEditor| match editor.delete(kind, index) {
            Ok(_) => save_quietly(editor).await,
            Err(e) => Some(Outcome::from(&e)),
        }))
    }

    pub fn delete_rules(&self, kind: &str, indices: Vec<u32>) -> Result<Promise, JsValue> {
        let kind = parse_kind(kind)?;
        let indices: Vec<usize> = indices.into_iter().map(|i| i as usize).collect();
        Ok(self.edit(async move |editor: &mut RuleEditor| {
            Some(
                editor
                    .delete_many_and_commit(&chrome::local_store(), kind, &indices)
                    .await,
            )
        }))
    }

    pub fn set_enabled(&self, kind: &str, index: usize, enabled: bool) -> Result<Promise, JsValue> {
        let kind = parse_kind(kind)?;
        Ok(self.edit(async move |editor: &mut RuleEditor| {
            match editor.set_enabled(kind, index, enabled) {
                Ok(()) => save_quietly(editor).await,
                Err(e) => Some(Outcome::from(&e)),
            }
        }))
    }

    /// Drag-and-drop reorder.
    pub fn move_rule(&self, kind: &str, from: usize, to: usize) -> Result<Promise, JsValue> {
        let kind = parse_kind(kind)?;
        Ok(self.edit(async move |editor: &mut RuleEditor| match editor.move_rule(kind, from, to) {
            Ok(()) => save_quietly(editor).await,
            Err(e) => Some(Outcome::from(&e)),
        }))
    }

    pub fn set_domain_enabled(&self, key: String, enabled: bool) -> Promise {
        self.edit(async move |editor: &mut RuleEditor| {
            match editor.set_domain_enabled(&key, enabled) {
                Ok(outcome) => Some(save_quietly(editor).await.unwrap_or(outcome)),
                Err(e) => Some(Outcome::from(&e)),
            }
        })
    }

    pub fn set_general_settings(&self, settings: JsValue) -> Result<Promise, JsValue> {
        let settings: GeneralSettings = serde_json::from_value(from_js(&settings)?)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(self.edit(async move |editor: &mut RuleEditor| {
            *editor.general_settings_mut() = settings;
            if editor.save_general(&chrome::local_store()).await {
                Some(Outcome::success(messages::SAVED))
            } else {
                Some(Outcome::error(messages::SAVE_FAILED))
            }
        }))
    }

    pub fn reset(&self) -> Promise {
        self.edit(async move |editor: &mut RuleEditor| {
            Some(editor.reset_and_commit(&chrome::local_store()).await)
        })
    }

    pub fn import_settings(&self, text: String) -> Promise {
        self.edit(async move |editor: &mut RuleEditor| {
            Some(editor.import_and_commit(&chrome::local_store(), &text).await)
        })
    }

    /// `{ filename, json, outcome }` for a download.
    pub fn export_settings(&self) -> Result<JsValue, JsValue> {
        let now = now();
        let result = js_sys::Object::new();
        let outcome = match self.editor.borrow().export(now).to_pretty_json() {
            Ok(json) => {
                Reflect::set(&result, &"filename".into(), &JsValue::from_str(&export_filename(now)))?;
                Reflect::set(&result, &"json".into(), &JsValue::from_str(&json))?;
                Outcome::success(messages::EXPORTED)
            }
            Err(e) => {
                log::error!("Failed to export settings: {}", e);
                Outcome::error(messages::EXPORT_FAILED)
            }
        };
        Reflect::set(&result, &"outcome".into(), &to_js(&outcome)?)?;
        Ok(result.into())
    }
}

/// Matches of `pattern` in `text`, or null for an invalid pattern.
#[wasm_bindgen]
pub fn try_pattern(pattern: &str, text: &str) -> JsValue {
    match test_pattern(pattern, text) {
        Some(found) => found
            .iter()
            .map(|m| JsValue::from_str(m))
            .collect::<js_sys::Array>()
            .into(),
        None => JsValue::NULL,
    }
}

/// Problems in a rule file, as `{ severity, message }`.
#[wasm_bindgen]
pub fn check_rule_file(text: &str) -> Result<JsValue, JsValue> {
    let file = parse_rule_file(text).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let issues = js_sys::Array::new();
    for issue in validate_domains(&file.domains) {
        let row = js_sys::Object::new();
        let severity = format!("{:?}", issue.severity()).to_lowercase();
        let _ = Reflect::set(&row, &"severity".into(), &JsValue::from_str(&severity));
        let _ = Reflect::set(&row, &"message".into(), &JsValue::from_str(&issue.to_string()));
        issues.push(&row);
    }
    Ok(issues.into())
}
