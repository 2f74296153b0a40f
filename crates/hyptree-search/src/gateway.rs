//! Search Gateway (SG) — a query-in, text-out capability used only by the
//! research stage. Failures degrade to an empty string rather than an error
//! (spec §4.4: "core degrades gracefully").

use async_trait::async_trait;

#[async_trait]
pub trait SearchGateway: Send + Sync {
    async fn search(&self, query: &str) -> String;
}

/// Zero-config fallback and the gateway used in tests — always returns empty.
pub struct NullSearchGateway;

#[async_trait]
impl SearchGateway for NullSearchGateway {
    async fn search(&self, _query: &str) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_gateway_always_returns_empty() {
        let sg = NullSearchGateway;
        assert_eq!(sg.search("anything").await, "");
    }
}
