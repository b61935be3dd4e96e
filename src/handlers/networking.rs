//! The `/api/networking` document: the latest networking sample plus the
//! ring history. An empty ring (startup race) triggers a synchronous
//! collection instead of an error.

use crate::{
    errors::ServeError,
    http::{request::Request, response::Response, types::APPLICATION_JSON},
    router::RouteHandler,
    sampler::{collect_networking, HISTORY_LEN},
    AppState,
};
use async_trait::async_trait;
use serde_json::json;

pub(crate) struct NetworkingHandler;

#[async_trait]
impl RouteHandler for NetworkingHandler {
    async fn call(
        &self,
        state: &AppState,
        _request: &Request<'_>,
        response: &mut Response,
    ) -> Result<(), ServeError> {
        let latest = state
            .networking
            .latest()
            .or_else(|| collect_networking(state.probe.as_ref()))
            .ok_or(ServeError::Internal("networking snapshot failed"))?;

        let doc = json!({
            "timestamp": latest.timestamp,
            "routes": latest.routes,
            "dns": latest.dns,
            "interfaces": latest.interfaces,
            "history": state.networking.last(HISTORY_LEN),
        });

        response
            .status(200)
            .content_type(APPLICATION_JSON)
            .body(doc.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod networking_tests {
    use super::*;
    use crate::http::request::testutil::parse;
    use crate::sampler::NetworkingSample;
    use crate::testutil::state_with_templates;
    use serde_json::Value;

    async fn fetch(state: &AppState) -> Value {
        let request = parse(b"GET /api/networking HTTP/1.1\r\n\r\n").unwrap();
        let mut response = Response::new();
        NetworkingHandler
            .call(state, &request, &mut response)
            .await
            .unwrap();
        assert_eq!(response.status_code(), 200);
        serde_json::from_slice(response.body_bytes()).unwrap()
    }

    #[tokio::test]
    async fn empty_ring_collects_synchronously() {
        let (state, _dirs) = state_with_templates(&[("base.html", "x")]);

        let doc = fetch(&state).await;
        assert_eq!(doc["routes"][0]["gateway"], "192.168.1.1");
        assert_eq!(doc["dns"]["nameservers"][0], "9.9.9.9");
        assert_eq!(doc["interfaces"][0]["name"], "em0");
        // Synchronous collection does not feed the ring.
        assert_eq!(doc["history"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn ring_sample_is_preferred() {
        let (state, _dirs) = state_with_templates(&[("base.html", "x")]);
        state.networking.push(NetworkingSample {
            timestamp: 7777,
            routes: Vec::new(),
            dns: Default::default(),
            interfaces: Vec::new(),
        });

        let doc = fetch(&state).await;
        assert_eq!(doc["timestamp"], 7777);
        assert_eq!(doc["history"].as_array().unwrap().len(), 1);
    }
}
