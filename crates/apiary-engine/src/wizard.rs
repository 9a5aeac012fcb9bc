// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wizard state machine.
//!
//! State lives in the shared store; the in-process code never mirrors
//! it. An update transitions a wizard only through a validated step
//! input or an explicit restart, and the compare-and-set in the store
//! picks a single winner when two updates race on the same key. The
//! loser is shown the still-pending question and changes nothing.

use std::sync::Arc;

use apiary_core::{ApiaryError, Reply, TraceId};
use apiary_dsl::{CompiledSpec, WizardFlow};
use apiary_prometheus::recording;
use apiary_storage::models::{
    iso_after_secs, now_iso, BotRow, WizardStateRow, WIZARD_STATE_FORMAT,
};
use apiary_storage::queries::state;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::actions::ActionCtx;
use crate::Engine;

/// Reply for flows that finish without producing one themselves.
const DONE_REPLY: &str = "Готово.";

/// A decoded, validated wizard state with its flow resolved against
/// the current spec.
pub(crate) struct ActiveWizard {
    pub flow: Arc<WizardFlow>,
    pub step: usize,
    pub vars: Map<String, Value>,
}

impl Engine {
    /// Load and decode the active wizard for a key.
    ///
    /// Anything that does not decode (unknown format tag, unparseable
    /// vars, a flow the current spec no longer has, a step out of
    /// range) is corrupt: the record is discarded and the caller sees
    /// "no state".
    pub(crate) async fn load_active_wizard(
        &self,
        bot: &BotRow,
        spec: &CompiledSpec,
        user_id: i64,
        trace: &TraceId,
    ) -> Result<Option<ActiveWizard>, ApiaryError> {
        let Some(row) = state::load(&self.db, bot.id, user_id).await? else {
            return Ok(None);
        };
        match decode_state(&row, spec) {
            Some(active) => Ok(Some(active)),
            None => {
                warn!(bot_id = %bot.id, user_id, "discarding corrupt wizard state");
                recording::record_error(bot.id, "wizard", "state_corrupt");
                self.sink
                    .error(
                        bot.id,
                        Some(user_id),
                        "wizard",
                        "state_corrupt",
                        "wizard state discarded",
                        trace,
                    )
                    .await;
                state::delete(&self.db, bot.id, user_id).await?;
                Ok(None)
            }
        }
    }

    /// Enter a wizard flow, resetting any previous state for the key.
    pub(crate) async fn start_wizard(
        &self,
        bot: &BotRow,
        flow: &Arc<WizardFlow>,
        user_id: i64,
        chat_id: Option<i64>,
        locale: String,
        trace: &TraceId,
    ) -> Result<Option<Reply>, ApiaryError> {
        debug!(bot_id = %bot.id, user_id, entry_cmd = %flow.entry_cmd, "wizard started");

        if !flow.on_enter.is_empty() {
            let mut ctx = ActionCtx::new(bot, user_id, chat_id, locale.clone(), trace);
            if let Some(reply) = self.run_actions(&mut ctx, &flow.on_enter).await {
                // Entry-only flows reply from on_enter and keep no state.
                state::delete(&self.db, bot.id, user_id).await?;
                return Ok(Some(reply));
            }
        }

        if flow.steps.is_empty() {
            state::delete(&self.db, bot.id, user_id).await?;
            return Ok(Some(Reply::text(DONE_REPLY)));
        }

        state::start(
            &self.db,
            WizardStateRow {
                bot_id: bot.id,
                user_id,
                format: WIZARD_STATE_FORMAT.to_string(),
                flow_cmd: flow.entry_cmd.clone(),
                step: 0,
                vars: "{}".to_string(),
                started_at: now_iso(),
                expires_at: iso_after_secs(flow.ttl_secs as i64),
            },
        )
        .await?;

        Ok(Some(self.ask_step(bot, flow, 0, user_id, trace).await))
    }

    /// Feed one input into an active wizard.
    ///
    /// `skip_validation` is set for widget picks, which arrive already
    /// constrained by the grid.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn continue_wizard(
        &self,
        bot: &BotRow,
        spec: &CompiledSpec,
        active: ActiveWizard,
        input: &str,
        skip_validation: bool,
        user_id: i64,
        chat_id: Option<i64>,
        locale: String,
        trace: &TraceId,
    ) -> Result<Option<Reply>, ApiaryError> {
        let flow = active.flow.clone();
        let step = &flow.steps[active.step];

        if !skip_validation {
            if let Some(validation) = &step.validate {
                if !validation.regex.is_match(input) {
                    debug!(
                        bot_id = %bot.id,
                        user_id,
                        step = active.step,
                        "wizard validation failed"
                    );
                    recording::record_error(bot.id, "wizard", "validation_failed");
                    self.sink
                        .error(
                            bot.id,
                            Some(user_id),
                            "wizard",
                            "validation_failed",
                            &format!("step {} of {}", active.step, flow.entry_cmd),
                            trace,
                        )
                        .await;
                    return Ok(Some(Reply::text(validation.msg.clone())));
                }
            }
        }

        let mut vars = active.vars.clone();
        vars.insert(step.var.clone(), Value::String(input.to_string()));
        let new_step = active.step + 1;

        let won = state::advance(
            &self.db,
            bot.id,
            user_id,
            active.step as i64,
            new_step as i64,
            Value::Object(vars.clone()).to_string(),
            iso_after_secs(flow.ttl_secs as i64),
        )
        .await?;
        if !won {
            // Another update advanced the wizard first; this one is out
            // of turn and only re-asks whatever is pending now.
            debug!(bot_id = %bot.id, user_id, "wizard advance lost the race");
            return match self.load_active_wizard(bot, spec, user_id, trace).await? {
                Some(current) => Ok(Some(
                    self.ask_step(bot, &current.flow, current.step, user_id, trace)
                        .await,
                )),
                None => Ok(None),
            };
        }

        self.sink
            .emit(
                bot.id,
                Some(user_id),
                "flow_step",
                json!({
                    "flow_cmd": flow.entry_cmd,
                    "step": active.step,
                    "var": step.var,
                }),
                trace,
            )
            .await;

        let mut ctx = ActionCtx::new(bot, user_id, chat_id, locale, trace).with_vars(&vars);
        if !flow.on_step.is_empty() {
            let _ = self.run_actions(&mut ctx, &flow.on_step).await;
        }

        if new_step >= flow.steps.len() {
            let reply = if flow.on_complete.is_empty() {
                Reply::text(DONE_REPLY)
            } else {
                self.run_actions(&mut ctx, &flow.on_complete)
                    .await
                    .unwrap_or_else(|| Reply::text(DONE_REPLY))
            };
            state::delete(&self.db, bot.id, user_id).await?;
            debug!(bot_id = %bot.id, user_id, entry_cmd = %flow.entry_cmd, "wizard completed");
            return Ok(Some(reply));
        }

        Ok(Some(self.ask_step(bot, &flow, new_step, user_id, trace).await))
    }

    /// Produce the question for a step: plain text, or a widget.
    pub(crate) async fn ask_step(
        &self,
        bot: &BotRow,
        flow: &Arc<WizardFlow>,
        step_index: usize,
        user_id: i64,
        trace: &TraceId,
    ) -> Reply {
        let Some(step) = flow.steps.get(step_index) else {
            return Reply::text(DONE_REPLY);
        };
        if let Some(widget_params) = &step.widget {
            return self
                .render_calendar(bot.id, user_id, widget_params, trace)
                .await;
        }
        Reply::text(step.ask.clone().unwrap_or_default())
    }
}

fn decode_state(row: &WizardStateRow, spec: &CompiledSpec) -> Option<ActiveWizard> {
    if row.format != WIZARD_STATE_FORMAT {
        return None;
    }
    let vars: Map<String, Value> = match serde_json::from_str(&row.vars) {
        Ok(Value::Object(map)) => map,
        _ => return None,
    };
    let flow = spec.wizards.get(&row.flow_cmd)?.clone();
    let step = usize::try_from(row.step).ok()?;
    if step >= flow.steps.len() {
        return None;
    }
    Some(ActiveWizard { flow, step, vars })
}
