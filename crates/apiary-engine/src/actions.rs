// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The action executor.
//!
//! A handler's actions run strictly in listed order and share one
//! scope: `sql_query` results land in the scope under `result_var`,
//! later actions and templates read them. A failed action emits an
//! `error` event and the handler proceeds; a reply that cannot be
//! produced at all degrades to the generic failure text.
//!
//! `bot_id` and `user_id` are bound implicitly into every statement;
//! the SQL gatekeeper has already confirmed the statement touches
//! nothing else.

use std::time::Instant;

use apiary_core::{ApiaryError, BotId, InlineButton, InlineKeyboard, Reply, TraceId};
use apiary_dsl::{
    sqlgate, template, Action, CalendarAction, ReplyTemplateAction, SqlExecAction, SqlMode,
    SqlQueryAction,
};
use apiary_prometheus::recording;
use apiary_storage::dynamic;
use apiary_storage::models::BotRow;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::{widget, Engine, GENERIC_ERROR_REPLY};

/// Mutable context threaded through one handler's actions.
pub struct ActionCtx<'a> {
    pub bot: &'a BotRow,
    pub user_id: i64,
    pub chat_id: Option<i64>,
    pub locale: String,
    pub scope: Map<String, Value>,
    pub trace: &'a TraceId,
}

impl<'a> ActionCtx<'a> {
    pub fn new(bot: &'a BotRow, user_id: i64, chat_id: Option<i64>, locale: String, trace: &'a TraceId) -> Self {
        let mut scope = Map::new();
        scope.insert("user_id".to_string(), Value::from(user_id));
        Self {
            bot,
            user_id,
            chat_id,
            locale,
            scope,
            trace,
        }
    }

    /// Seed the scope with wizard variables.
    pub fn with_vars(mut self, vars: &Map<String, Value>) -> Self {
        for (name, value) in vars {
            self.scope.insert(name.clone(), value.clone());
        }
        self
    }

    fn bind_values(&self, names: &[String]) -> Vec<Value> {
        names
            .iter()
            .map(|name| match name.as_str() {
                "bot_id" => Value::String(self.bot.id.to_string()),
                "user_id" => Value::from(self.user_id),
                other => self.scope.get(other).cloned().unwrap_or(Value::Null),
            })
            .collect()
    }

    fn var_names(&self) -> Vec<String> {
        self.scope.keys().cloned().collect()
    }
}

impl Engine {
    /// Run a handler's actions in order; the last produced reply wins.
    pub(crate) async fn run_actions(
        &self,
        ctx: &mut ActionCtx<'_>,
        actions: &[Action],
    ) -> Option<Reply> {
        let mut reply = None;
        for action in actions {
            match self.run_action(ctx, action).await {
                Ok(Some(produced)) => reply = Some(produced),
                Ok(None) => {}
                Err(e) => {
                    recording::record_error(ctx.bot.id, "actions", e.code());
                    self.sink
                        .error(
                            ctx.bot.id,
                            Some(ctx.user_id),
                            "actions",
                            e.code(),
                            &e.to_string(),
                            ctx.trace,
                        )
                        .await;
                    // A reply action that failed outright still owes
                    // the user an answer.
                    if matches!(action, Action::ReplyTemplate { .. }) && reply.is_none() {
                        reply = Some(Reply::text(GENERIC_ERROR_REPLY));
                    }
                }
            }
        }
        reply
    }

    async fn run_action(
        &self,
        ctx: &mut ActionCtx<'_>,
        action: &Action,
    ) -> Result<Option<Reply>, ApiaryError> {
        match action {
            Action::SqlQuery { params } => {
                self.run_sql_query(ctx, params).await?;
                Ok(None)
            }
            Action::SqlExec { params } => {
                self.run_sql_exec(ctx, params).await?;
                Ok(None)
            }
            Action::ReplyTemplate { params } => Ok(Some(self.run_reply_template(ctx, params).await)),
            Action::Calendar { params } => Ok(Some(self.run_calendar(ctx, params).await)),
        }
    }

    async fn run_sql_query(
        &self,
        ctx: &mut ActionCtx<'_>,
        params: &SqlQueryAction,
    ) -> Result<(), ApiaryError> {
        let started = Instant::now();
        let prepared = sqlgate::validate(&params.sql, SqlMode::Query, &ctx.var_names())?;
        let rows = dynamic::run_query(&self.db, &prepared, ctx.bind_values(&prepared.binds)).await?;
        let row_count = rows.len();

        let value = if params.scalar {
            rows.first()
                .and_then(|row| row.as_object())
                .and_then(|row| row.values().next().cloned())
                .unwrap_or(Value::Null)
        } else if params.flatten {
            let mut flat = Vec::with_capacity(rows.len());
            for row in &rows {
                let object = row.as_object().filter(|o| o.len() == 1).ok_or_else(|| {
                    ApiaryError::SqlFailed("flatten requires exactly one column".into())
                })?;
                flat.extend(object.values().cloned());
            }
            Value::Array(flat)
        } else {
            Value::Array(rows)
        };
        ctx.scope.insert(params.result_var.clone(), value);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        recording::record_sql_query(ctx.bot.id);
        recording::record_action_latency("sql_query", elapsed_ms);
        self.sink
            .emit(
                ctx.bot.id,
                Some(ctx.user_id),
                "action_sql",
                json!({
                    "mode": "query",
                    "sql_hash": format!("{:016x}", prepared.hash),
                    "rows": row_count,
                    "result_var": params.result_var,
                    "duration_ms": elapsed_ms as u64,
                }),
                ctx.trace,
            )
            .await;
        Ok(())
    }

    async fn run_sql_exec(
        &self,
        ctx: &mut ActionCtx<'_>,
        params: &SqlExecAction,
    ) -> Result<(), ApiaryError> {
        let started = Instant::now();
        let prepared = sqlgate::validate(&params.sql, SqlMode::Exec, &ctx.var_names())?;
        let affected =
            dynamic::run_exec(&self.db, &prepared, ctx.bind_values(&prepared.binds)).await?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        recording::record_sql_exec(ctx.bot.id);
        recording::record_action_latency("sql_exec", elapsed_ms);
        self.sink
            .emit(
                ctx.bot.id,
                Some(ctx.user_id),
                "action_sql",
                json!({
                    "mode": "exec",
                    "sql_hash": format!("{:016x}", prepared.hash),
                    "rows_affected": affected,
                    "duration_ms": elapsed_ms as u64,
                }),
                ctx.trace,
            )
            .await;
        Ok(())
    }

    /// Render a reply template. Never fails: a template error falls
    /// back to the directive-stripped text and is recorded as an
    /// unsuccessful `action_reply`.
    async fn run_reply_template(
        &self,
        ctx: &mut ActionCtx<'_>,
        params: &ReplyTemplateAction,
    ) -> Reply {
        let started = Instant::now();
        let bot_id = ctx.bot.id;

        let text = self.i18n.resolve(bot_id, &ctx.locale, &params.text).await;
        let empty_text = match &params.empty_text {
            Some(marker) => Some(self.i18n.resolve(bot_id, &ctx.locale, marker).await),
            None => None,
        };

        let (mut rendered, success) =
            match template::render(&text, &ctx.scope, empty_text.as_deref()) {
                Ok(rendered) => (rendered, true),
                Err(e) => {
                    warn!(bot_id = %bot_id, error = %e, "template render failed");
                    recording::record_error(bot_id, "template", e.code());
                    self.sink
                        .error(
                            bot_id,
                            Some(ctx.user_id),
                            "template",
                            e.code(),
                            &e.to_string(),
                            ctx.trace,
                        )
                        .await;
                    (template::strip_directives(&text, &ctx.scope), false)
                }
            };

        if params.llm_improve {
            let improved = self.llm.improve(ctx.bot, ctx.user_id, &rendered).await;
            self.sink
                .emit(
                    bot_id,
                    Some(ctx.user_id),
                    "llm_improve",
                    json!({
                        "cached": improved.cached,
                        "total_tokens": improved.total_tokens,
                        "refused": improved.refused,
                    }),
                    ctx.trace,
                )
                .await;
            rendered = improved.text;
        }

        let keyboard = params.keyboard.as_ref().map(|rows| InlineKeyboard {
            rows: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|option| InlineButton::new(&option.text, &option.callback))
                        .collect()
                })
                .collect(),
        });

        recording::record_action_latency(
            "reply_template",
            started.elapsed().as_secs_f64() * 1000.0,
        );
        self.sink
            .emit(
                bot_id,
                Some(ctx.user_id),
                "action_reply",
                json!({
                    "template_length": params.text.len(),
                    "rendered_length": rendered.len(),
                    "success": success,
                }),
                ctx.trace,
            )
            .await;

        Reply {
            text: rendered,
            keyboard,
            edit: false,
        }
    }

    async fn run_calendar(&self, ctx: &mut ActionCtx<'_>, params: &CalendarAction) -> Reply {
        let started = Instant::now();
        let reply = self
            .render_calendar(ctx.bot.id, ctx.user_id, params, ctx.trace)
            .await;
        recording::record_action_latency(
            "widget_calendar",
            started.elapsed().as_secs_f64() * 1000.0,
        );
        reply
    }

    /// Render the opening month page of a calendar widget.
    pub(crate) async fn render_calendar(
        &self,
        bot_id: BotId,
        user_id: i64,
        params: &CalendarAction,
        trace: &TraceId,
    ) -> Reply {
        let keyboard = widget::month_keyboard(bot_id, user_id, widget::current_month(), params);
        recording::record_calendar_render(bot_id);
        self.sink
            .emit(
                bot_id,
                Some(user_id),
                "widget_calendar_render",
                json!({"mode": params.mode.as_str(), "var": params.var}),
                trace,
            )
            .await;
        Reply::with_keyboard(widget::title(params), keyboard)
    }
}
