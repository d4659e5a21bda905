// Short names for the logging macros, so modules can `use crate::prelude::debug`
// regardless of which backend (if any) is enabled.

#[allow(unused_imports, reason = "not every level is used in every build")]
pub(crate) use crate::observability::{log_debug as debug, log_info as info, log_warn as warn};
