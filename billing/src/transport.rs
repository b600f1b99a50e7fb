//! tonic transport to the billing service.
//!
//! Maps gRPC status codes 1:1 onto [`BillingError`] variants. The
//! mapping never inspects message text; tonic itself surfaces transport
//! failures (connection refused, reset) as `Code::Unavailable`.

use patientcare_core::billing::{BillingError, BillingRequest, BillingResponse, BillingTransport};
use patientcare_core::patient::PatientId;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

use crate::pb;

/// Connection settings for the billing service.
#[derive(Clone, Debug)]
pub struct BillingConfig {
    /// Billing service endpoint, e.g. `http://billing:9001`.
    pub endpoint: String,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl BillingConfig {
    /// Config with default timeouts (5s request, 2s connect).
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Override the per-request deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// [`BillingTransport`] over a tonic channel.
///
/// The channel connects lazily; an unreachable billing service shows up
/// as [`BillingError::Unavailable`] on the first call, not at
/// construction.
#[derive(Clone)]
pub struct GrpcBillingTransport {
    channel: Channel,
    request_timeout: Duration,
}

impl GrpcBillingTransport {
    /// Build a transport from config.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidArgument`] if the endpoint is not
    /// a valid URI.
    pub fn new(config: &BillingConfig) -> Result<Self, BillingError> {
        let endpoint = Endpoint::from_shared(config.endpoint.clone())
            .map_err(|e| BillingError::InvalidArgument(format!("invalid billing endpoint: {e}")))?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);

        Ok(Self {
            channel: endpoint.connect_lazy(),
            request_timeout: config.request_timeout,
        })
    }
}

/// Derive the typed error from a gRPC status code.
fn map_status(status: &tonic::Status, patient_id: PatientId) -> BillingError {
    match status.code() {
        tonic::Code::AlreadyExists => BillingError::AccountExists { patient_id },
        tonic::Code::InvalidArgument => {
            BillingError::InvalidArgument(status.message().to_string())
        }
        tonic::Code::DeadlineExceeded => BillingError::Timeout,
        tonic::Code::Unavailable => BillingError::Unavailable,
        tonic::Code::Unauthenticated | tonic::Code::PermissionDenied => BillingError::AuthFailed,
        code => BillingError::Unknown(format!("{code:?}: {}", status.message())),
    }
}

impl BillingTransport for GrpcBillingTransport {
    fn create_billing_account(
        &self,
        request: BillingRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BillingResponse, BillingError>> + Send + '_>> {
        let channel = self.channel.clone();
        let request_timeout = self.request_timeout;

        Box::pin(async move {
            let patient_id = request.patient_id;
            let wire_request = pb::BillingAccountRequest {
                patient_id: patient_id.to_string(),
                name: request.name,
                email: request.email,
            };

            let mut grpc = tonic::client::Grpc::new(channel);
            let call = async move {
                grpc.ready().await.map_err(|e| {
                    tonic::Status::unavailable(format!("billing channel not ready: {e}"))
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path = tonic::codegen::http::uri::PathAndQuery::from_static(
                    pb::CREATE_BILLING_ACCOUNT_PATH,
                );
                grpc.unary(tonic::Request::new(wire_request), path, codec)
                    .await
            };

            // The channel carries its own timeout; this outer deadline
            // also covers time spent waiting for the channel to become
            // ready.
            let response: tonic::Response<pb::BillingAccountResponse> =
                match tokio::time::timeout(request_timeout, call).await {
                    Ok(Ok(response)) => response,
                    Ok(Err(status)) => {
                        tracing::warn!(
                            patient_id = %patient_id,
                            code = ?status.code(),
                            "billing RPC failed"
                        );
                        return Err(map_status(&status, patient_id));
                    }
                    Err(_) => {
                        tracing::warn!(patient_id = %patient_id, "billing RPC timed out");
                        return Err(BillingError::Timeout);
                    }
                };

            let inner = response.into_inner();
            Ok(BillingResponse {
                account_id: inner.account_id,
                status: inner.status,
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn status_error(code: tonic::Code) -> BillingError {
        map_status(&tonic::Status::new(code, "boom"), PatientId::new())
    }

    #[test]
    fn status_codes_map_to_typed_errors() {
        assert!(matches!(
            status_error(tonic::Code::AlreadyExists),
            BillingError::AccountExists { .. }
        ));
        assert!(matches!(
            status_error(tonic::Code::InvalidArgument),
            BillingError::InvalidArgument(_)
        ));
        assert_eq!(status_error(tonic::Code::DeadlineExceeded), BillingError::Timeout);
        assert_eq!(status_error(tonic::Code::Unavailable), BillingError::Unavailable);
        assert_eq!(status_error(tonic::Code::Unauthenticated), BillingError::AuthFailed);
        assert_eq!(status_error(tonic::Code::PermissionDenied), BillingError::AuthFailed);
        assert!(matches!(
            status_error(tonic::Code::Internal),
            BillingError::Unknown(_)
        ));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let config = BillingConfig::new("not a uri");
        assert!(matches!(
            GrpcBillingTransport::new(&config),
            Err(BillingError::InvalidArgument(_))
        ));
    }
}
