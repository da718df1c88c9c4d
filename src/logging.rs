/*
 * Created on Tue Jul 28 2026
 *
 * This file is a part of pathspace
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Logging
//!
//! The source used a process-wide mutable `Logger` global (spec.md §9). We
//! thread a `Logger` through `RegistryOptions` instead; the default
//! implementation forwards to the `log` facade so the host application
//! picks the backend (`env_logger` in this crate's own tests).

use std::fmt;

pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// forwards every level to the `log` crate's global facade
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeLogger;

impl Logger for FacadeLogger {
    fn debug(&self, msg: &str) {
        log::debug!("{msg}");
    }
    fn info(&self, msg: &str) {
        log::info!("{msg}");
    }
    fn warn(&self, msg: &str) {
        log::warn!("{msg}");
    }
    fn error(&self, msg: &str) {
        log::error!("{msg}");
    }
}

impl fmt::Debug for dyn Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Logger")
    }
}
