//! Stateless repositories — every method takes `&Connection`.
//!
//! Repositories do single-statement work; multi-step operations (e.g.
//! find-or-create of a direct conversation) are composed into transactions
//! by the [`crate::ChatStore`] facade.

pub mod calls;
pub mod conversations;
pub mod messages;
pub mod users;
