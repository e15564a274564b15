//! Wraps the `x-client-transaction` crate behind a narrow interface.
//!
//! The platform's edge rejects GraphQL requests lacking a valid
//! `x-client-transaction-id` header. The header is derived from a signing
//! key embedded in the platform's home page markup, so a signer instance
//! must bootstrap once by fetching that page before it can sign requests.

use x_client_transaction::ClientTransaction;

use crate::error::XClientError;

/// Computes `x-client-transaction-id` values for outgoing requests.
pub struct TransactionSigner {
    inner: Option<ClientTransaction>,
}

impl TransactionSigner {
    /// Bootstraps a signer from the platform's home page HTML.
    pub async fn bootstrap(http: &rquest::Client, home_url: &str) -> Result<Self, XClientError> {
        let home_html = http
            .get(home_url)
            .send()
            .await
            .map_err(|e| XClientError::NetworkError {
                message: format!("failed to fetch home page for transaction signing: {e}"),
            })?
            .text()
            .await
            .map_err(|e| XClientError::NetworkError {
                message: format!("failed to read home page body: {e}"),
            })?;

        let inner =
            ClientTransaction::new(&home_html).map_err(|e| XClientError::NetworkError {
                message: format!("failed to derive transaction signing key: {e}"),
            })?;

        Ok(Self { inner: Some(inner) })
    }

    /// A signer that emits a fixed placeholder id, for tests that don't
    /// exercise the real signing algorithm against a mock home page.
    pub fn test_fixture() -> Self {
        Self { inner: None }
    }

    pub fn sign(&self, method: &str, path: &str) -> Result<String, XClientError> {
        match &self.inner {
            Some(inner) => inner
                .generate_transaction_id(method, path)
                .map_err(|e| XClientError::NetworkError {
                    message: format!("failed to sign request: {e}"),
                }),
            None => Ok("test-transaction-id".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_signs_without_network_access() {
        let signer = TransactionSigner::test_fixture();
        let id = signer.sign("GET", "/i/api/graphql/abc/UserTweets").unwrap();
        assert_eq!(id, "test-transaction-id");
    }
}
