//! Wire types for the billing service's gRPC surface.
//!
//! Hand-maintained prost messages mirroring `billing.proto`. The
//! service exposes a single unary RPC:
//!
//! ```proto
//! service BillingService {
//!   rpc CreateBillingAccount (BillingRequest) returns (BillingResponse);
//! }
//! ```

/// Create-account request as carried on the wire.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BillingAccountRequest {
    /// Patient identifier (UUID string).
    #[prost(string, tag = "1")]
    pub patient_id: ::prost::alloc::string::String,
    /// Patient name.
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    /// Patient email.
    #[prost(string, tag = "3")]
    pub email: ::prost::alloc::string::String,
}

/// Create-account response as carried on the wire.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BillingAccountResponse {
    /// Billing-side account identifier.
    #[prost(string, tag = "1")]
    pub account_id: ::prost::alloc::string::String,
    /// Account status string (e.g. `"ACTIVE"`).
    #[prost(string, tag = "2")]
    pub status: ::prost::alloc::string::String,
}

/// Full method path of the create-account RPC.
pub const CREATE_BILLING_ACCOUNT_PATH: &str = "/billing.BillingService/CreateBillingAccount";
