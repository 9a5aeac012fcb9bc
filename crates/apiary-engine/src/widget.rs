// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The calendar widget: a stateless month/time grid renderer and its
//! callback codec.
//!
//! Callback data format: `cal:<bot>:<user>:<action>:<payload>` with
//! actions `nav` (month page), `d` (date pick), `t` (time pick),
//! `back` (time grid back to dates), `noop` (decorative cells). The
//! payload never contains `:`; times travel as `HH-MM`.
//!
//! The widget itself holds no state. Bounds and the target variable
//! come from the owning wizard step at decode time, and a terminal
//! pick is fed back into the wizard as validated input.

use apiary_core::{BotId, InlineButton, InlineKeyboard};
use apiary_dsl::{CalendarAction, CalendarMode};
use chrono::{Datelike, NaiveDate, Utc};

/// Time slots offered in `datetime` mode.
const TIME_SLOTS: &[&str] = &[
    "09:00", "09:30", "10:00", "10:30", "11:00", "11:30", "12:00", "12:30", "13:00", "13:30",
    "14:00", "14:30", "15:00", "15:30", "16:00", "16:30", "17:00", "17:30", "18:00", "18:30",
    "19:00", "19:30", "20:00",
];

const WEEKDAYS: &[&str] = &["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];

/// Default widget title.
pub const DEFAULT_TITLE: &str = "Выберите дату";

/// A decoded calendar callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalCallback {
    pub bot_id: BotId,
    pub user_id: i64,
    pub action: CalAction,
}

/// What the pressed cell asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalAction {
    /// Show another month page (`YYYY-MM`).
    Nav(String),
    /// Date picked (`YYYY-MM-DD`).
    PickDate(String),
    /// Time picked for a date (`YYYY-MM-DD`, `HH:MM`).
    PickTime(String, String),
    /// Back from the time grid to the month grid.
    Back,
    /// Decorative cell; ignored.
    Noop,
}

pub fn is_calendar_callback(data: &str) -> bool {
    data.starts_with("cal:")
}

/// Decode callback data. Returns `None` for anything malformed.
pub fn parse_callback(data: &str) -> Option<CalCallback> {
    let mut parts = data.split(':');
    if parts.next()? != "cal" {
        return None;
    }
    let bot_id = BotId::parse(parts.next()?)?;
    let user_id: i64 = parts.next()?.parse().ok()?;
    let action = parts.next()?;
    let payload = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return None;
    }
    let action = match action {
        "nav" => CalAction::Nav(payload.to_string()),
        "d" => CalAction::PickDate(payload.to_string()),
        "t" => {
            let (date, time) = payload.split_once('_')?;
            CalAction::PickTime(date.to_string(), time.replace('-', ":"))
        }
        "back" => CalAction::Back,
        "noop" => CalAction::Noop,
        _ => return None,
    };
    Some(CalCallback {
        bot_id,
        user_id,
        action,
    })
}

fn callback_data(bot_id: BotId, user_id: i64, action: &str, payload: &str) -> String {
    format!("cal:{bot_id}:{user_id}:{action}:{payload}")
}

/// The widget title for a step, falling back to the default.
pub fn title(params: &CalendarAction) -> String {
    params
        .title
        .clone()
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

/// First day of the month the widget opens on.
pub fn current_month() -> NaiveDate {
    let today = Utc::now().date_naive();
    today.with_day(1).unwrap_or(today)
}

/// Parse a `YYYY-MM` navigation payload.
pub fn parse_month(payload: &str) -> Option<NaiveDate> {
    let (year, month) = payload.split_once('-')?;
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

/// Whether `date` lies inside the widget's inclusive bounds.
pub fn in_bounds(params: &CalendarAction, date: NaiveDate) -> bool {
    let min = params
        .min
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
    let max = params
        .max
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
    min.map_or(true, |min| date >= min) && max.map_or(true, |max| date <= max)
}

/// Build the month grid for one page.
pub fn month_keyboard(
    bot_id: BotId,
    user_id: i64,
    month: NaiveDate,
    params: &CalendarAction,
) -> InlineKeyboard {
    let noop = || callback_data(bot_id, user_id, "noop", "-");
    let mut rows = Vec::new();

    let prev = previous_month(month);
    let next = next_month(month);
    rows.push(vec![
        InlineButton::new(
            "◀",
            callback_data(bot_id, user_id, "nav", &prev.format("%Y-%m").to_string()),
        ),
        InlineButton::new(month.format("%B %Y").to_string(), noop()),
        InlineButton::new(
            "▶",
            callback_data(bot_id, user_id, "nav", &next.format("%Y-%m").to_string()),
        ),
    ]);

    rows.push(
        WEEKDAYS
            .iter()
            .map(|day| InlineButton::new(*day, noop()))
            .collect(),
    );

    let leading = month.weekday().num_days_from_monday() as usize;
    let days = days_in_month(month);
    let mut week: Vec<InlineButton> = (0..leading)
        .map(|_| InlineButton::new(" ", noop()))
        .collect();
    for day in 1..=days {
        let date = month.with_day(day).unwrap_or(month);
        if in_bounds(params, date) {
            week.push(InlineButton::new(
                day.to_string(),
                callback_data(
                    bot_id,
                    user_id,
                    "d",
                    &date.format("%Y-%m-%d").to_string(),
                ),
            ));
        } else {
            week.push(InlineButton::new(format!("·{day}·"), noop()));
        }
        if week.len() == 7 {
            rows.push(std::mem::take(&mut week));
        }
    }
    if !week.is_empty() {
        while week.len() < 7 {
            week.push(InlineButton::new(" ", noop()));
        }
        rows.push(week);
    }

    InlineKeyboard { rows }
}

/// Build the time grid shown after a date pick in `datetime` mode.
pub fn time_keyboard(bot_id: BotId, user_id: i64, date: &str) -> InlineKeyboard {
    let noop = || callback_data(bot_id, user_id, "noop", "-");
    let mut rows = vec![vec![InlineButton::new(format!("Время на {date}"), noop())]];

    for chunk in TIME_SLOTS.chunks(3) {
        let mut row: Vec<InlineButton> = chunk
            .iter()
            .map(|slot| {
                let payload = format!("{date}_{}", slot.replace(':', "-"));
                InlineButton::new(*slot, callback_data(bot_id, user_id, "t", &payload))
            })
            .collect();
        while row.len() < 3 {
            row.push(InlineButton::new(" ", noop()));
        }
        rows.push(row);
    }

    rows.push(vec![InlineButton::new(
        "◀ Назад к дате",
        callback_data(bot_id, user_id, "back", "-"),
    )]);
    InlineKeyboard { rows }
}

/// The terminal confirmation line for a pick.
pub fn confirmation(mode: CalendarMode, value: &str) -> String {
    match mode {
        CalendarMode::Date => format!("✅ Выбрана дата: {value}"),
        CalendarMode::Datetime => format!("✅ Выбраны дата и время: {value}"),
    }
}

fn previous_month(month: NaiveDate) -> NaiveDate {
    let (year, m) = if month.month() == 1 {
        (month.year() - 1, 12)
    } else {
        (month.year(), month.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, m, 1).unwrap_or(month)
}

fn next_month(month: NaiveDate) -> NaiveDate {
    let (year, m) = if month.month() == 12 {
        (month.year() + 1, 1)
    } else {
        (month.year(), month.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, m, 1).unwrap_or(month)
}

fn days_in_month(month: NaiveDate) -> u32 {
    next_month(month)
        .pred_opt()
        .map(|last| last.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(min: Option<&str>, max: Option<&str>) -> CalendarAction {
        CalendarAction {
            mode: CalendarMode::Date,
            var: "when".to_string(),
            min: min.map(str::to_string),
            max: max.map(str::to_string),
            tz: None,
            title: None,
        }
    }

    #[test]
    fn callbacks_round_trip() {
        let bot = BotId::new();
        let data = callback_data(bot, 42, "d", "2025-01-15");
        let parsed = parse_callback(&data).unwrap();
        assert_eq!(parsed.bot_id, bot);
        assert_eq!(parsed.user_id, 42);
        assert_eq!(parsed.action, CalAction::PickDate("2025-01-15".to_string()));

        let time = callback_data(bot, 42, "t", "2025-01-15_14-00");
        assert_eq!(
            parse_callback(&time).unwrap().action,
            CalAction::PickTime("2025-01-15".to_string(), "14:00".to_string())
        );
    }

    #[test]
    fn malformed_callbacks_are_rejected() {
        assert!(parse_callback("cal:not-a-uuid:1:d:x").is_none());
        assert!(parse_callback("other:stuff").is_none());
        assert!(parse_callback("cal:").is_none());
    }

    #[test]
    fn month_grid_has_header_weekdays_and_full_weeks() {
        let bot = BotId::new();
        let month = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let kb = month_keyboard(bot, 1, month, &params(None, None));
        assert_eq!(kb.rows[0].len(), 3);
        assert_eq!(kb.rows[1].len(), 7);
        for week in &kb.rows[2..] {
            assert_eq!(week.len(), 7);
        }
        // January 2025 starts on a Wednesday: two leading blanks.
        assert_eq!(kb.rows[2][0].text, " ");
        assert_eq!(kb.rows[2][1].text, " ");
        assert_eq!(kb.rows[2][2].text, "1");
    }

    #[test]
    fn out_of_bounds_cells_are_disabled() {
        let bot = BotId::new();
        let month = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let kb = month_keyboard(bot, 1, month, &params(Some("2025-01-10"), Some("2025-01-20")));
        let cells: Vec<&InlineButton> = kb.rows[2..].iter().flatten().collect();
        let day5 = cells.iter().find(|b| b.text == "·5·").unwrap();
        assert!(day5.callback_data.contains(":noop:"));
        let day15 = cells.iter().find(|b| b.text == "15").unwrap();
        assert!(day15.callback_data.contains(":d:2025-01-15"));
        assert!(cells.iter().any(|b| b.text == "·25·"));
    }

    #[test]
    fn time_grid_covers_all_slots_in_rows_of_three() {
        let bot = BotId::new();
        let kb = time_keyboard(bot, 1, "2025-01-15");
        let slots: Vec<&InlineButton> = kb
            .rows
            .iter()
            .flatten()
            .filter(|b| b.callback_data.contains(":t:"))
            .collect();
        assert_eq!(slots.len(), TIME_SLOTS.len());
        assert!(slots
            .iter()
            .any(|b| b.callback_data.ends_with("2025-01-15_14-00")));
        // Last row is the back button.
        assert_eq!(kb.rows.last().unwrap()[0].text, "◀ Назад к дате");
    }

    #[test]
    fn month_navigation_wraps_year_boundaries() {
        let jan = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(previous_month(jan), NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        let dec = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        assert_eq!(next_month(dec), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }
}
