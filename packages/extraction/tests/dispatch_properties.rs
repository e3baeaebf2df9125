//! Property tests for strategy selection and delegation bounds.

use std::collections::HashMap;
use std::sync::Arc;

use extraction::{
    default_strategies, ExtractionError, FetchedPage, MockFetcher, StrategyRegistry,
};
use proptest::prelude::*;
use url::Url;

fn host() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("arxiv.org"),
        Just("www.arxiv.org"),
        Just("pubmed.ncbi.nlm.nih.gov"),
        Just("www.ncbi.nlm.nih.gov"),
        Just("example.com"),
        Just("cdn.podcasts.example"),
    ]
}

fn path() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("abs"), Just("pdf"), Just("post"), Just("episodes")],
        "[a-z0-9]{1,8}",
        prop_oneof![Just(""), Just(".pdf"), Just(".mp3"), Just(".html")],
    )
        .prop_map(|(dir, stem, ext)| format!("/{dir}/{stem}{ext}"))
}

fn content_type() -> impl Strategy<Value = Option<&'static str>> {
    prop_oneof![
        Just(None),
        Just(Some("text/html; charset=utf-8")),
        Just(Some("text/plain")),
        Just(Some("application/pdf")),
        Just(Some("audio/mpeg")),
        Just(Some("application/octet-stream")),
        Just(Some("image/png")),
    ]
}

fn headers(ct: Option<&str>) -> HashMap<String, String> {
    ct.map(|ct| HashMap::from([("content-type".to_string(), ct.to_string())]))
        .unwrap_or_default()
}

proptest! {
    #[test]
    fn selection_is_deterministic(host in host(), path in path(), ct in content_type()) {
        let url = Url::parse(&format!("https://{host}{path}")).unwrap();
        let headers = headers(ct);

        let first = StrategyRegistry::new(Arc::new(MockFetcher::new()))
            .select(&url, &headers)
            .map(|s| s.name());
        let second = StrategyRegistry::new(Arc::new(MockFetcher::new()))
            .select(&url, &headers)
            .map(|s| s.name());

        prop_assert_eq!(first, second);
    }

    #[test]
    fn selection_is_first_match_in_registration_order(
        host in host(),
        path in path(),
        ct in content_type(),
    ) {
        let url = Url::parse(&format!("https://{host}{path}")).unwrap();
        let headers = headers(ct);
        let strategies = default_strategies();

        let expected = strategies
            .iter()
            .position(|s| s.can_handle(&url, &headers));
        let registry = StrategyRegistry::new(Arc::new(MockFetcher::new()));
        let selected = registry.select(&url, &headers).map(|s| s.name());

        prop_assert_eq!(selected, expected.map(|i| strategies[i].name()));
    }
}

#[tokio::test]
async fn self_referencing_delegation_terminates() {
    // An arXiv PDF link whose abstract page redirects back to the PDF
    let mock = MockFetcher::new()
        .with_page(
            FetchedPage::new("https://arxiv.org/pdf/1234.5678", "")
                .with_content_type("application/pdf")
                .with_byte_len(10),
        )
        .with_page(
            FetchedPage::new("https://arxiv.org/abs/1234.5678", "")
                .with_content_type("application/pdf")
                .with_final_url("https://arxiv.org/pdf/1234.5678"),
        );

    let registry = StrategyRegistry::new(Arc::new(mock.clone()));
    let err = registry
        .dispatch("https://arxiv.org/pdf/1234.5678")
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractionError::DelegationCycle { .. }));
    assert!(mock.fetch_call_count() <= registry.max_hops() + 1);
}

#[tokio::test]
async fn zero_hop_cap_refuses_any_delegation() {
    let mock = MockFetcher::new().with_page(
        FetchedPage::new("https://arxiv.org/pdf/1234.5678", "")
            .with_content_type("application/pdf")
            .with_byte_len(10),
    );

    let err = StrategyRegistry::new(Arc::new(mock))
        .with_max_hops(0)
        .dispatch("https://arxiv.org/pdf/1234.5678")
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractionError::DelegationLimit { max_hops: 0, .. }));
}
