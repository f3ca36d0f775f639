pub mod client;

pub use client::{
    GatewayClient, GatewayError, GatewayPaymentRecord, InitiatePaymentRequest, InitiatedPayment,
    StatusLookup,
};
