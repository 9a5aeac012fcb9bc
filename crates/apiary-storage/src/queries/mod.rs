// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Every function takes `&Database` and carries a
//! `bot_id` predicate on tenant data.

pub mod bots;
pub mod broadcasts;
pub mod events;
pub mod i18n;
pub mod llm_cache;
pub mod specs;
pub mod state;
pub mod users;
