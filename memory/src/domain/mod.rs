// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Domain layer for the memory bounded context

pub mod episode;
pub mod error;
pub mod events;
pub mod pattern;
pub mod summary;
pub mod text;

pub use episode::*;
pub use error::*;
pub use events::*;
pub use pattern::*;
pub use summary::*;
