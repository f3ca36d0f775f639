pub mod status;

pub use status::{
    map_gateway_status, AdvanceStatus, PaymentMethod, ReimbursementStatus, TransactionStatus,
};
