//! Entry-confirmation tally.
//!
//! Counts how many of four independent indicators currently agree on a
//! direction for a scanned pair. Informational only: the agent applies its
//! own stricter gate before entering.

pub mod rules;
pub mod tally;

pub use rules::TallyRules;
pub use tally::{is_leveraged_market, tally, ConfirmationTally, SideFlags, TallyStatus};
