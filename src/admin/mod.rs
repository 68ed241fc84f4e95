//! Jaskier Shared Pattern — admin
//! Control-plane handlers (spec.md §6, prefix `/admin` or `/api`), all
//! behind `auth::require_user_token`.

pub mod logs;
pub mod providers;
pub mod ratelimit;
pub mod rules;
pub mod stats;
pub mod tokens;

pub use logs::*;
pub use providers::*;
pub use ratelimit::*;
pub use rules::*;
pub use stats::*;
pub use tokens::*;
