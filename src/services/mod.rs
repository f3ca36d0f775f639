pub mod advance;
pub mod notify;
pub mod reconciliation;
pub mod reimbursement;
pub mod stats;

pub use advance::CascadeResult;
pub use notify::{LogDispatcher, NotificationDispatcher, NotificationIntent, NotificationKind};
pub use reconciliation::ReconciliationService;
pub use reimbursement::ReimbursementService;
pub use stats::StatsService;
