/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Invertible sketches of keyed multisets.

mod iblt;
pub use iblt::{Entries, Error, Iblt, Lookup, CHECK_SEED, HASH_COUNT};
