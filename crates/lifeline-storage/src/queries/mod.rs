// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for operations on storage entities.

pub mod alerts;
pub mod attempts;
pub mod events;
pub mod kv;
pub mod notices;
