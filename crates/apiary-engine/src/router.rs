// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update routing.
//!
//! Precedence, highest first: active wizard (its own entry command
//! restarts it), widget callback, menu flow, wizard flow, intent,
//! silence. Menu wins when a menu and a wizard share an entry command.
//! Callbacks carry the owning bot and user; a callback addressed to a
//! different user is dropped.

use apiary_core::{ApiaryError, InboundUpdate, Reply, TraceId, UpdateKind};
use apiary_dsl::{CalendarMode, CompiledSpec, FlowEntry, MenuFlow};
use apiary_prometheus::recording;
use apiary_storage::models::BotRow;
use apiary_storage::queries::{bots, users};
use chrono::NaiveDate;
use serde_json::json;
use tracing::debug;

use crate::widget::{self, CalAction, CalCallback};
use crate::wizard::ActiveWizard;
use crate::{Engine, MAX_INPUT_LEN};

impl Engine {
    pub(crate) async fn route(
        &self,
        update: &InboundUpdate,
        trace: &TraceId,
    ) -> Result<Option<Reply>, ApiaryError> {
        let bot = bots::get_bot(&self.db, update.bot_id)
            .await?
            .ok_or_else(|| ApiaryError::NotFound(format!("bot {}", update.bot_id)))?;
        if !bot.is_active() {
            debug!(bot_id = %bot.id, "update for disabled bot dropped");
            return Ok(None);
        }
        let spec = self.specs.get(bot.id).await?;
        users::touch_user(&self.db, bot.id, update.user_id).await?;
        let locale = self
            .i18n
            .locale_for(bot.id, update.user_id, update.chat_id, &spec.default_locale)
            .await;

        match &update.kind {
            UpdateKind::Text(text) => {
                self.route_text(&bot, &spec, update.user_id, update.chat_id, text, locale, trace)
                    .await
            }
            UpdateKind::Callback(data) => {
                self.route_callback(&bot, &spec, update.user_id, update.chat_id, data, locale, trace)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn route_text(
        &self,
        bot: &BotRow,
        spec: &CompiledSpec,
        user_id: i64,
        chat_id: Option<i64>,
        text: &str,
        locale: String,
        trace: &TraceId,
    ) -> Result<Option<Reply>, ApiaryError> {
        let input = truncate_input(text);

        if let Some(active) = self.load_active_wizard(bot, spec, user_id, trace).await? {
            if input == active.flow.entry_cmd {
                // Idempotent restart: back to step 0.
                self.sink
                    .emit(
                        bot.id,
                        Some(user_id),
                        "update",
                        json!({"cmd": input, "matched": true, "restart": true}),
                        trace,
                    )
                    .await;
                let flow = active.flow.clone();
                return self
                    .start_wizard(bot, &flow, user_id, chat_id, locale, trace)
                    .await;
            }
            self.sink
                .emit(
                    bot.id,
                    Some(user_id),
                    "update",
                    json!({"matched": true, "wizard": active.flow.entry_cmd}),
                    trace,
                )
                .await;
            return self
                .continue_wizard(bot, spec, active, input, false, user_id, chat_id, locale, trace)
                .await;
        }

        if let Some(entry) = spec.entry(input) {
            self.sink
                .emit(
                    bot.id,
                    Some(user_id),
                    "update",
                    json!({"cmd": input, "matched": true}),
                    trace,
                )
                .await;
            return match entry {
                FlowEntry::Menu(menu) => {
                    let menu = menu.clone();
                    self.show_menu(bot, &menu, user_id, locale, trace).await
                }
                FlowEntry::Wizard(flow) => {
                    let flow = flow.clone();
                    self.start_wizard(bot, &flow, user_id, chat_id, locale, trace)
                        .await
                }
            };
        }

        if let Some(reply_text) = spec.intents.get(input) {
            self.sink
                .emit(
                    bot.id,
                    Some(user_id),
                    "update",
                    json!({"cmd": input, "matched": true}),
                    trace,
                )
                .await;
            let resolved = self.i18n.resolve(bot.id, &locale, reply_text).await;
            self.sink
                .emit(
                    bot.id,
                    Some(user_id),
                    "action_reply",
                    json!({
                        "template_length": reply_text.len(),
                        "rendered_length": resolved.len(),
                        "success": true,
                    }),
                    trace,
                )
                .await;
            return Ok(Some(Reply::text(resolved)));
        }

        // No handler matched: silence.
        self.sink
            .emit(
                bot.id,
                Some(user_id),
                "update",
                json!({"matched": false}),
                trace,
            )
            .await;
        Ok(None)
    }

    async fn show_menu(
        &self,
        bot: &BotRow,
        menu: &MenuFlow,
        user_id: i64,
        locale: String,
        trace: &TraceId,
    ) -> Result<Option<Reply>, ApiaryError> {
        let title = self.i18n.resolve(bot.id, &locale, &menu.title).await;
        let keyboard = apiary_core::InlineKeyboard {
            // One option per row reads best on small screens.
            rows: menu
                .options
                .iter()
                .map(|option| {
                    vec![apiary_core::InlineButton::new(
                        &option.text,
                        &option.callback,
                    )]
                })
                .collect(),
        };
        self.sink
            .emit(
                bot.id,
                Some(user_id),
                "action_reply",
                json!({
                    "template_length": menu.title.len(),
                    "rendered_length": title.len(),
                    "success": true,
                }),
                trace,
            )
            .await;
        Ok(Some(Reply::with_keyboard(title, keyboard)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn route_callback(
        &self,
        bot: &BotRow,
        spec: &CompiledSpec,
        user_id: i64,
        chat_id: Option<i64>,
        data: &str,
        locale: String,
        trace: &TraceId,
    ) -> Result<Option<Reply>, ApiaryError> {
        if widget::is_calendar_callback(data) {
            let Some(callback) = widget::parse_callback(data) else {
                debug!(bot_id = %bot.id, "malformed calendar callback dropped");
                return Ok(None);
            };
            if callback.bot_id != bot.id || callback.user_id != user_id {
                recording::record_error(bot.id, "widget", "callback_owner_mismatch");
                self.sink
                    .error(
                        bot.id,
                        Some(user_id),
                        "widget",
                        "callback_owner_mismatch",
                        "callback addressed to another user",
                        trace,
                    )
                    .await;
                return Ok(None);
            }
            return self
                .handle_calendar_callback(bot, spec, callback, chat_id, locale, trace)
                .await;
        }

        // Menu options carry commands as callback data.
        if data.starts_with('/') {
            return self
                .route_text(bot, spec, user_id, chat_id, data, locale, trace)
                .await;
        }

        self.sink
            .emit(
                bot.id,
                Some(user_id),
                "update",
                json!({"matched": false, "callback": true}),
                trace,
            )
            .await;
        Ok(None)
    }

    async fn handle_calendar_callback(
        &self,
        bot: &BotRow,
        spec: &CompiledSpec,
        callback: CalCallback,
        chat_id: Option<i64>,
        locale: String,
        trace: &TraceId,
    ) -> Result<Option<Reply>, ApiaryError> {
        let user_id = callback.user_id;
        let active = self.load_active_wizard(bot, spec, user_id, trace).await?;
        let widget_params = active
            .as_ref()
            .and_then(|a| a.flow.steps.get(a.step))
            .and_then(|step| step.widget.clone());
        // A calendar callback without an owning wizard step is stale.
        let (Some(active), Some(params)) = (active, widget_params) else {
            debug!(bot_id = %bot.id, user_id, "calendar callback without active widget step");
            return Ok(None);
        };

        match callback.action {
            CalAction::Noop => Ok(None),
            CalAction::Nav(month_payload) => {
                let Some(month) = widget::parse_month(&month_payload) else {
                    return Ok(None);
                };
                Ok(Some(Reply::edit(
                    widget::title(&params),
                    widget::month_keyboard(bot.id, user_id, month, &params),
                )))
            }
            CalAction::Back => Ok(Some(Reply::edit(
                widget::title(&params),
                widget::month_keyboard(bot.id, user_id, widget::current_month(), &params),
            ))),
            CalAction::PickDate(date) => {
                let Some(parsed) = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok() else {
                    return Ok(None);
                };
                if !widget::in_bounds(&params, parsed) {
                    // Disabled cell; a forged callback changes nothing.
                    return Ok(None);
                }
                match params.mode {
                    CalendarMode::Date => {
                        recording::record_calendar_pick(bot.id, "date");
                        self.sink
                            .emit(
                                bot.id,
                                Some(user_id),
                                "widget_calendar_pick_date",
                                json!({"date": date, "var": params.var}),
                                trace,
                            )
                            .await;
                        self.finish_widget_pick(
                            bot, spec, active, &date, CalendarMode::Date, user_id, chat_id,
                            locale, trace,
                        )
                        .await
                    }
                    CalendarMode::Datetime => Ok(Some(Reply::edit(
                        format!("Выберите время на {date}"),
                        widget::time_keyboard(bot.id, user_id, &date),
                    ))),
                }
            }
            CalAction::PickTime(date, time) => {
                let Some(parsed) = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok() else {
                    return Ok(None);
                };
                if !widget::in_bounds(&params, parsed) {
                    return Ok(None);
                }
                let value = format!("{date} {time}");
                recording::record_calendar_pick(bot.id, "datetime");
                self.sink
                    .emit(
                        bot.id,
                        Some(user_id),
                        "widget_calendar_pick_time",
                        json!({"datetime": value, "var": params.var}),
                        trace,
                    )
                    .await;
                self.finish_widget_pick(
                    bot,
                    spec,
                    active,
                    &value,
                    CalendarMode::Datetime,
                    user_id,
                    chat_id,
                    locale,
                    trace,
                )
                .await
            }
        }
    }

    /// Store a terminal pick into the wizard's variable and advance,
    /// prefixing the confirmation line to the next question.
    #[allow(clippy::too_many_arguments)]
    async fn finish_widget_pick(
        &self,
        bot: &BotRow,
        spec: &CompiledSpec,
        active: ActiveWizard,
        value: &str,
        mode: CalendarMode,
        user_id: i64,
        chat_id: Option<i64>,
        locale: String,
        trace: &TraceId,
    ) -> Result<Option<Reply>, ApiaryError> {
        let confirmation = widget::confirmation(mode, value);
        let next = self
            .continue_wizard(bot, spec, active, value, true, user_id, chat_id, locale, trace)
            .await?;
        Ok(next.map(|reply| Reply {
            text: format!("{confirmation}\n{}", reply.text),
            ..reply
        }))
    }
}

/// Truncate step input at the documented limit, on a char boundary.
fn truncate_input(text: &str) -> &str {
    match text.char_indices().nth(MAX_INPUT_LEN) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_truncates_at_1024_chars_on_char_boundary() {
        let short = "привет";
        assert_eq!(truncate_input(short), short);
        let long: String = "д".repeat(2000);
        let truncated = truncate_input(&long);
        assert_eq!(truncated.chars().count(), MAX_INPUT_LEN);
    }
}
