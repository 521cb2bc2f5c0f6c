// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for Tern
//!
//! Provider-format messages and the abstract streaming provider contract.

pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod retry;

pub use message::*;
pub use provider::*;
