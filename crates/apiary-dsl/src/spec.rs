// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serde types for the raw bot spec document.
//!
//! Two wizard encodings are in circulation: the legacy shape with
//! `steps`/`on_complete` at the top level of a flow, and the `v1` shape
//! nesting them under `params`. Both deserialize into [`RawFlow`] and
//! compile to the same normalized form. Flows may arrive in a unified
//! `flows` array or in the segregated `menu_flows`/`wizard_flows`
//! arrays.

use serde::Deserialize;

/// A raw, uncompiled bot spec as published through the management API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotSpec {
    /// Enabled component tags (informational).
    #[serde(default, rename = "use")]
    pub use_tags: Vec<String>,

    #[serde(default)]
    pub intents: Vec<Intent>,

    /// Unified flow array; each entry self-identifies via `type` or its
    /// shape.
    #[serde(default)]
    pub flows: Vec<RawFlow>,

    #[serde(default)]
    pub menu_flows: Vec<RawFlow>,

    #[serde(default)]
    pub wizard_flows: Vec<RawFlow>,

    #[serde(default)]
    pub i18n: Option<I18nSection>,
}

/// A trivial `cmd -> reply` pair.
#[derive(Debug, Clone, Deserialize)]
pub struct Intent {
    pub cmd: String,
    #[serde(default)]
    pub reply: String,
}

/// Locale defaults declared by the spec.
#[derive(Debug, Clone, Deserialize)]
pub struct I18nSection {
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default)]
    pub supported: Vec<String>,
}

fn default_locale() -> String {
    "ru".to_string()
}

/// A flow before normalization. Carries the union of both encodings;
/// the compiler decides whether it is a menu or a wizard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFlow {
    /// `flow.menu.v1` or `flow.wizard.v1` when tagged.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub entry_cmd: Option<String>,

    /// v1 encoding: everything nested here.
    #[serde(default)]
    pub params: Option<FlowParams>,

    // Legacy encoding: wizard fields at the top level.
    #[serde(default)]
    pub steps: Option<Vec<WizardStep>>,
    #[serde(default)]
    pub on_enter: Option<Vec<Action>>,
    #[serde(default)]
    pub on_step: Option<Vec<Action>>,
    #[serde(default)]
    pub on_complete: Option<Vec<Action>>,
    #[serde(default)]
    pub ttl_sec: Option<u64>,

    // Legacy encoding: menu fields at the top level.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<MenuOption>>,
}

/// Nested flow parameters of the v1 encoding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowParams {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<MenuOption>>,
    #[serde(default)]
    pub steps: Option<Vec<WizardStep>>,
    #[serde(default)]
    pub on_enter: Option<Vec<Action>>,
    #[serde(default)]
    pub on_step: Option<Vec<Action>>,
    #[serde(default)]
    pub on_complete: Option<Vec<Action>>,
    #[serde(default)]
    pub ttl_sec: Option<u64>,
}

/// One selectable row of a menu flow.
#[derive(Debug, Clone, Deserialize)]
pub struct MenuOption {
    pub text: String,
    /// Callback data; values starting with `/` re-enter the router as
    /// commands.
    pub callback: String,
}

/// One question of a wizard flow.
#[derive(Debug, Clone, Deserialize)]
pub struct WizardStep {
    /// Question text. Optional when the step is asked by a widget.
    #[serde(default)]
    pub ask: Option<String>,

    /// Variable the validated input is stored under.
    pub var: String,

    #[serde(default)]
    pub validate: Option<StepValidation>,

    /// Ask via an interactive widget instead of free text.
    #[serde(default)]
    pub widget: Option<CalendarAction>,
}

/// Regex validation attached to a wizard step.
#[derive(Debug, Clone, Deserialize)]
pub struct StepValidation {
    pub regex: String,
    /// Reply sent when the input does not match.
    pub msg: String,
}

/// One unit of side effect inside a handler.
///
/// The wire shape is a single-key object, e.g.
/// `{"action.sql_query.v1": {"sql": "...", "result_var": "rows"}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Action {
    SqlQuery {
        #[serde(rename = "action.sql_query.v1")]
        params: SqlQueryAction,
    },
    SqlExec {
        #[serde(rename = "action.sql_exec.v1")]
        params: SqlExecAction,
    },
    ReplyTemplate {
        #[serde(rename = "action.reply_template.v1")]
        params: ReplyTemplateAction,
    },
    Calendar {
        #[serde(rename = "widget.calendar.v1")]
        params: CalendarAction,
    },
}

/// `action.sql_query.v1`: read rows into a scope variable.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlQueryAction {
    pub sql: String,
    pub result_var: String,
    /// Store the first column of the first row (or null).
    #[serde(default)]
    pub scalar: bool,
    /// Store a flat array of values; requires exactly one column.
    #[serde(default)]
    pub flatten: bool,
}

/// `action.sql_exec.v1`: run a mutating statement.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlExecAction {
    pub sql: String,
}

/// `action.reply_template.v1`: render and send a reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyTemplateAction {
    pub text: String,
    #[serde(default)]
    pub empty_text: Option<String>,
    /// Inline keyboard rows: `[[{"text": ..., "callback": ...}]]`.
    #[serde(default)]
    pub keyboard: Option<Vec<Vec<MenuOption>>>,
    /// Pass the rendered text through LLM improvement.
    #[serde(default)]
    pub llm_improve: bool,
}

/// `widget.calendar.v1`: interactive date / datetime picker.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarAction {
    #[serde(default)]
    pub mode: CalendarMode,
    /// Wizard variable that receives the picked value.
    pub var: String,
    /// Inclusive lower bound, `YYYY-MM-DD`.
    #[serde(default)]
    pub min: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD`.
    #[serde(default)]
    pub max: Option<String>,
    #[serde(default)]
    pub tz: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Calendar selection granularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarMode {
    #[default]
    Date,
    Datetime,
}

impl CalendarMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarMode::Date => "date",
            CalendarMode::Datetime => "datetime",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_wire_shape_round_trips() {
        let action: Action = serde_json::from_str(
            r#"{"action.sql_query.v1": {"sql": "SELECT 1", "result_var": "one", "scalar": true}}"#,
        )
        .unwrap();
        match action {
            Action::SqlQuery { params } => {
                assert_eq!(params.result_var, "one");
                assert!(params.scalar);
                assert!(!params.flatten);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_action_key_is_an_error() {
        let res: Result<Action, _> =
            serde_json::from_str(r#"{"action.launch_missiles.v1": {}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn both_wizard_encodings_deserialize() {
        let legacy: RawFlow = serde_json::from_str(
            r#"{"entry_cmd": "/book",
                "steps": [{"ask": "Какая услуга?", "var": "service"}],
                "on_complete": [{"action.reply_template.v1": {"text": "ok"}}]}"#,
        )
        .unwrap();
        assert_eq!(legacy.steps.as_ref().unwrap().len(), 1);

        let v1: RawFlow = serde_json::from_str(
            r#"{"type": "flow.wizard.v1", "entry_cmd": "/book",
                "params": {"steps": [{"ask": "Какая услуга?", "var": "service"}]}}"#,
        )
        .unwrap();
        assert_eq!(v1.kind.as_deref(), Some("flow.wizard.v1"));
        assert_eq!(v1.params.unwrap().steps.unwrap().len(), 1);
    }
}
