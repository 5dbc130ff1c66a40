//! Shared test fixtures

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::Client;

#[derive(Clone)]
struct PanickingKubeService;

impl tower::Service<http::Request<kube::client::Body>> for PanickingKubeService {
    type Response = http::Response<kube::client::Body>;
    type Error = std::convert::Infallible;
    type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<kube::client::Body>) -> Self::Future {
        panic!("unexpected api request: {} {}", req.method(), req.uri())
    }
}

/// A kube client that fails the test on any API request. Used to prove
/// code paths that must not touch the cluster.
pub fn panicking_client() -> Client {
    Client::new(PanickingKubeService, "default")
}

pub fn empty_service() -> Service {
    Service::default()
}

pub fn empty_ingress() -> Ingress {
    Ingress::default()
}
