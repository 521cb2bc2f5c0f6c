// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI module for Tern
//!
//! Command-line argument parsing; dispatch lives in the binary.

pub mod args;

pub use args::*;
