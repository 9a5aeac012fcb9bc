// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spec compilation: raw JSON document to indexed, validated form.
//!
//! Compilation is deterministic: the same spec version always produces
//! the same compiled form. The interpreter looks entry commands up
//! menu-first, so a menu and a wizard may share an `entry_cmd` and the
//! menu wins.

use std::collections::HashMap;
use std::sync::Arc;

use apiary_core::ApiaryError;
use regex::Regex;

use crate::spec::{Action, BotSpec, CalendarAction, MenuOption, RawFlow, WizardStep};

/// Default wizard state TTL in seconds.
pub const DEFAULT_WIZARD_TTL_SECS: u64 = 86_400;
/// Lower bound for a spec-configured wizard TTL.
pub const MIN_WIZARD_TTL_SECS: u64 = 60;
/// Hard cap on wizard length.
pub const MAX_WIZARD_STEPS: usize = 10;

/// A compiled, immutable bot spec ready for routing.
#[derive(Debug, Clone)]
pub struct CompiledSpec {
    /// Monotone version tag of the published spec this was built from.
    pub version: i64,
    /// `cmd` -> literal reply.
    pub intents: HashMap<String, String>,
    /// `entry_cmd` -> menu flow (checked before wizards).
    pub menus: HashMap<String, Arc<MenuFlow>>,
    /// `entry_cmd` -> wizard flow.
    pub wizards: HashMap<String, Arc<WizardFlow>>,
    /// Locale used when no preference resolves.
    pub default_locale: String,
}

impl CompiledSpec {
    /// Look an entry command up with the menu-first precedence.
    pub fn entry(&self, cmd: &str) -> Option<FlowEntry<'_>> {
        if let Some(menu) = self.menus.get(cmd) {
            return Some(FlowEntry::Menu(menu));
        }
        self.wizards.get(cmd).map(FlowEntry::Wizard)
    }
}

/// Result of an entry-command lookup.
#[derive(Debug)]
pub enum FlowEntry<'a> {
    Menu(&'a Arc<MenuFlow>),
    Wizard(&'a Arc<WizardFlow>),
}

/// A stateless navigation menu.
#[derive(Debug, Clone)]
pub struct MenuFlow {
    pub entry_cmd: String,
    pub title: String,
    pub options: Vec<MenuOption>,
}

/// A stateful multi-step dialogue.
#[derive(Debug, Clone)]
pub struct WizardFlow {
    pub entry_cmd: String,
    pub steps: Vec<CompiledStep>,
    pub on_enter: Vec<Action>,
    pub on_step: Vec<Action>,
    pub on_complete: Vec<Action>,
    pub ttl_secs: u64,
}

/// One compiled wizard step with its validation regex built.
#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub ask: Option<String>,
    pub var: String,
    pub validate: Option<CompiledValidation>,
    pub widget: Option<CalendarAction>,
}

/// Compiled step validation.
#[derive(Debug, Clone)]
pub struct CompiledValidation {
    pub regex: Regex,
    pub msg: String,
}

/// Compile a raw spec into its indexed form.
pub fn compile(spec: &BotSpec, version: i64) -> Result<CompiledSpec, ApiaryError> {
    let mut intents = HashMap::new();
    for intent in &spec.intents {
        intents.insert(intent.cmd.clone(), intent.reply.clone());
    }

    let mut menus = HashMap::new();
    let mut wizards = HashMap::new();

    let classified = spec
        .flows
        .iter()
        .map(|f| (f, classify(f)))
        .chain(spec.menu_flows.iter().map(|f| (f, FlowKind::Menu)))
        .chain(spec.wizard_flows.iter().map(|f| (f, FlowKind::Wizard)));

    for (raw, kind) in classified {
        let entry_cmd = raw
            .entry_cmd
            .clone()
            .ok_or_else(|| ApiaryError::SpecInvalid("flow without entry_cmd".into()))?;
        match kind {
            FlowKind::Menu => {
                let menu = compile_menu(raw, entry_cmd.clone());
                menus.insert(entry_cmd, Arc::new(menu));
            }
            FlowKind::Wizard => {
                let wizard = compile_wizard(raw, entry_cmd.clone())?;
                wizards.insert(entry_cmd, Arc::new(wizard));
            }
        }
    }

    let default_locale = spec
        .i18n
        .as_ref()
        .map(|s| s.default_locale.clone())
        .unwrap_or_else(|| "ru".to_string());

    Ok(CompiledSpec {
        version,
        intents,
        menus,
        wizards,
        default_locale,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowKind {
    Menu,
    Wizard,
}

/// Decide what an untagged flow is. An explicit `type` tag wins;
/// otherwise the shape decides: options or a title make a menu,
/// anything else is a wizard. Flows from the segregated arrays skip
/// this entirely.
fn classify(raw: &RawFlow) -> FlowKind {
    match raw.kind.as_deref() {
        Some("flow.menu.v1") => FlowKind::Menu,
        Some("flow.wizard.v1") => FlowKind::Wizard,
        _ => {
            let has_options = raw.options.is_some()
                || raw
                    .params
                    .as_ref()
                    .is_some_and(|p| p.options.is_some() || p.title.is_some());
            if has_options || raw.title.is_some() {
                FlowKind::Menu
            } else {
                FlowKind::Wizard
            }
        }
    }
}

fn compile_menu(raw: &RawFlow, entry_cmd: String) -> MenuFlow {
    let params = raw.params.as_ref();
    let title = raw
        .title
        .clone()
        .or_else(|| params.and_then(|p| p.title.clone()))
        .unwrap_or_else(|| "Выберите действие:".to_string());
    let options = raw
        .options
        .clone()
        .or_else(|| params.and_then(|p| p.options.clone()))
        .unwrap_or_default();
    MenuFlow {
        entry_cmd,
        title,
        options,
    }
}

fn compile_wizard(raw: &RawFlow, entry_cmd: String) -> Result<WizardFlow, ApiaryError> {
    let params = raw.params.as_ref();
    let steps = raw
        .steps
        .clone()
        .or_else(|| params.and_then(|p| p.steps.clone()))
        .unwrap_or_default();
    if steps.len() > MAX_WIZARD_STEPS {
        return Err(ApiaryError::SpecInvalid(format!(
            "wizard {entry_cmd} has {} steps, max is {MAX_WIZARD_STEPS}",
            steps.len()
        )));
    }

    let steps = steps
        .iter()
        .map(|s| compile_step(s, &entry_cmd))
        .collect::<Result<Vec<_>, _>>()?;

    let ttl_secs = raw
        .ttl_sec
        .or_else(|| params.and_then(|p| p.ttl_sec))
        .unwrap_or(DEFAULT_WIZARD_TTL_SECS)
        .max(MIN_WIZARD_TTL_SECS);

    Ok(WizardFlow {
        entry_cmd,
        on_enter: raw
            .on_enter
            .clone()
            .or_else(|| params.and_then(|p| p.on_enter.clone()))
            .unwrap_or_default(),
        on_step: raw
            .on_step
            .clone()
            .or_else(|| params.and_then(|p| p.on_step.clone()))
            .unwrap_or_default(),
        on_complete: raw
            .on_complete
            .clone()
            .or_else(|| params.and_then(|p| p.on_complete.clone()))
            .unwrap_or_default(),
        steps,
        ttl_secs,
    })
}

fn compile_step(step: &WizardStep, entry_cmd: &str) -> Result<CompiledStep, ApiaryError> {
    if step.ask.is_none() && step.widget.is_none() {
        return Err(ApiaryError::SpecInvalid(format!(
            "wizard {entry_cmd}: step for var {} has neither ask nor widget",
            step.var
        )));
    }
    let validate = step
        .validate
        .as_ref()
        .map(|v| {
            Regex::new(&v.regex)
                .map(|regex| CompiledValidation {
                    regex,
                    msg: v.msg.clone(),
                })
                .map_err(|e| {
                    ApiaryError::SpecInvalid(format!(
                        "wizard {entry_cmd}: bad regex for var {}: {e}",
                        step.var
                    ))
                })
        })
        .transpose()?;
    Ok(CompiledStep {
        ask: step.ask.clone(),
        var: step.var.clone(),
        validate,
        widget: step.widget.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_from(json: &str) -> BotSpec {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn intents_and_flows_index_by_command() {
        let spec = spec_from(
            r#"{
                "intents": [{"cmd": "/start", "reply": "Hi!"}],
                "flows": [
                    {"type": "flow.menu.v1", "entry_cmd": "/menu",
                     "params": {"title": "Меню", "options": [{"text": "A", "callback": "/a"}]}},
                    {"entry_cmd": "/book",
                     "steps": [{"ask": "Какая услуга?", "var": "service"}]}
                ]
            }"#,
        );
        let compiled = compile(&spec, 3).unwrap();
        assert_eq!(compiled.version, 3);
        assert_eq!(compiled.intents.get("/start").unwrap(), "Hi!");
        assert!(matches!(compiled.entry("/menu"), Some(FlowEntry::Menu(_))));
        assert!(matches!(compiled.entry("/book"), Some(FlowEntry::Wizard(_))));
        assert!(compiled.entry("/nope").is_none());
    }

    #[test]
    fn menu_wins_over_wizard_for_shared_entry_cmd() {
        let spec = spec_from(
            r#"{
                "menu_flows": [{"entry_cmd": "/go", "params": {"title": "m", "options": []}}],
                "wizard_flows": [{"entry_cmd": "/go", "steps": [{"ask": "q", "var": "v"}]}]
            }"#,
        );
        let compiled = compile(&spec, 1).unwrap();
        assert!(matches!(compiled.entry("/go"), Some(FlowEntry::Menu(_))));
    }

    #[test]
    fn both_wizard_encodings_compile_identically() {
        let legacy = compile(
            &spec_from(
                r#"{"flows": [{"entry_cmd": "/w", "ttl_sec": 120,
                    "steps": [{"ask": "q", "var": "v",
                               "validate": {"regex": "^\\d+$", "msg": "digits"}}]}]}"#,
            ),
            1,
        )
        .unwrap();
        let v1 = compile(
            &spec_from(
                r#"{"flows": [{"type": "flow.wizard.v1", "entry_cmd": "/w",
                    "params": {"ttl_sec": 120,
                               "steps": [{"ask": "q", "var": "v",
                                          "validate": {"regex": "^\\d+$", "msg": "digits"}}]}}]}"#,
            ),
            1,
        )
        .unwrap();
        let (a, b) = (&legacy.wizards["/w"], &v1.wizards["/w"]);
        assert_eq!(a.ttl_secs, b.ttl_secs);
        assert_eq!(a.steps.len(), b.steps.len());
        assert_eq!(a.steps[0].var, b.steps[0].var);
        assert_eq!(
            a.steps[0].validate.as_ref().unwrap().msg,
            b.steps[0].validate.as_ref().unwrap().msg
        );
    }

    #[test]
    fn wizard_ttl_is_clamped_to_minimum() {
        let compiled = compile(
            &spec_from(r#"{"flows": [{"entry_cmd": "/w", "ttl_sec": 5, "steps": [{"ask": "q", "var": "v"}]}]}"#),
            1,
        )
        .unwrap();
        assert_eq!(compiled.wizards["/w"].ttl_secs, MIN_WIZARD_TTL_SECS);
    }

    #[test]
    fn oversized_wizard_is_rejected() {
        let steps: Vec<String> = (0..11)
            .map(|i| format!(r#"{{"ask": "q{i}", "var": "v{i}"}}"#))
            .collect();
        let json = format!(
            r#"{{"flows": [{{"entry_cmd": "/w", "steps": [{}]}}]}}"#,
            steps.join(",")
        );
        let err = compile(&spec_from(&json), 1).unwrap_err();
        assert_eq!(err.code(), "spec_invalid");
    }

    #[test]
    fn bad_step_regex_is_rejected() {
        let err = compile(
            &spec_from(
                r#"{"flows": [{"entry_cmd": "/w",
                    "steps": [{"ask": "q", "var": "v", "validate": {"regex": "(", "msg": "m"}}]}]}"#,
            ),
            1,
        )
        .unwrap_err();
        assert_eq!(err.code(), "spec_invalid");
    }

    #[test]
    fn compile_is_deterministic() {
        let spec = spec_from(
            r#"{"intents": [{"cmd": "/a", "reply": "x"}],
                "flows": [{"entry_cmd": "/w", "steps": [{"ask": "q", "var": "v"}]}]}"#,
        );
        let one = compile(&spec, 7).unwrap();
        let two = compile(&spec, 7).unwrap();
        assert_eq!(one.version, two.version);
        assert_eq!(one.intents, two.intents);
        assert_eq!(
            one.wizards.keys().collect::<Vec<_>>(),
            two.wizards.keys().collect::<Vec<_>>()
        );
    }
}
