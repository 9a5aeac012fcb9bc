// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration for the Apiary bot runtime.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `apiary.toml` in the working directory, then the documented raw
//! environment variables (`DATABASE_URL`, `LLM_*`, `LOG_LEVEL`, ...).

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_str};
pub use model::ApiaryConfig;
