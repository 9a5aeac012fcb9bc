// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The declarative bot DSL: schema, compiler, template renderer, and
//! SQL gatekeeper.
//!
//! A bot is defined by a JSON spec of intents, menu flows, and wizard
//! flows. [`compile`] turns the raw document into an indexed
//! [`CompiledSpec`] the interpreter routes against; [`template`]
//! renders `{{var}}` / `{{#each}}` reply bodies; [`sqlgate`] is the
//! lexical firewall every inline SQL statement passes through.

pub mod compile;
pub mod spec;
pub mod sqlgate;
pub mod template;

pub use compile::{
    compile, CompiledSpec, CompiledStep, CompiledValidation, FlowEntry, MenuFlow, WizardFlow,
};
pub use spec::{
    Action, BotSpec, CalendarAction, CalendarMode, MenuOption, RawFlow, ReplyTemplateAction,
    SqlExecAction, SqlQueryAction, StepValidation, WizardStep,
};
pub use sqlgate::{PreparedSql, SqlMode};
