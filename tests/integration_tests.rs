//! Integration tests for the econ-news aggregator
//!
//! These tests run the full path from configuration loading through the
//! aggregators and the HTTP router against mocked upstreams.

use std::io::Write;
use tempfile::NamedTempFile;

mod common {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// RSS body with `(title, pubDate)` items in the given order
    pub fn rss(items: &[(&str, Option<&str>)]) -> String {
        let body: String = items
            .iter()
            .enumerate()
            .map(|(i, (title, date))| {
                let date = date
                    .map(|d| format!("<pubDate>{}</pubDate>", d))
                    .unwrap_or_default();
                format!(
                    "<item><title>{}</title><link>https://example.com/{}</link><description>{} 요약</description>{}</item>",
                    title, i, title, date
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Feed</title><link>https://example.com</link><description>Feed</description>{}</channel></rss>"#,
            body
        )
    }

    pub async fn mount_body(server: &MockServer, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    /// Config TOML pointing every upstream at the mock server
    pub fn config_toml(server: &MockServer, per_feed_limit: usize) -> String {
        format!(
            r#"
            news_limit = 100
            per_feed_limit = {limit}
            feed_timeout_secs = 2

            [[feeds]]
            name = "Chosun Economy"
            url = "{uri}/chosun.xml"
            source = "조선일보"

            [[feeds]]
            name = "Donga Economy"
            url = "{uri}/donga.xml"
            source = "동아일보"

            [[feeds]]
            name = "Broken"
            url = "{uri}/broken.xml"

            [prices]
            ticker_url = "{uri}/v1/ticker"
            timeout_secs = 2

            [prices.fx]
            kind = "records"
            url = "{uri}/forex"
            "#,
            limit = per_feed_limit,
            uri = server.uri()
        )
    }
}

#[cfg(test)]
mod config_integration_tests {
    use super::*;
    use econ_news::config::{Config, FxSource};

    #[test]
    fn test_load_actual_feeds_config() {
        let config = Config::load("feeds.toml");
        assert!(config.is_ok(), "Failed to load feeds.toml: {:?}", config.err());

        let config = config.unwrap();
        assert!(!config.feeds.is_empty(), "feeds.toml should have at least one feed");
        assert!(config.news_limit > 0);
        assert!(config.per_feed_limit > 0);
        assert!(config.feeds.iter().all(|f| !f.source_label.is_empty()));
    }

    #[test]
    fn test_config_from_file() {
        let toml_content = r#"
            per_feed_limit = 30

            [[feeds]]
            name = "조선일보 경제"
            url = "https://www.chosun.com/arc/outboundfeeds/rss/category/economy/?outputType=xml"
            source = "조선일보"

            [prices.fx]
            kind = "records"
            url = "https://quotation-api-cdn.dunamu.com/v1/forex/recent?codes=FRX.KRWUSD"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.per_feed_limit, 30);
        assert_eq!(config.news_limit, 100);
        assert_eq!(config.feeds[0].source_label, "조선일보");
        assert!(matches!(config.prices.fx, FxSource::Records { .. }));
    }
}

#[cfg(test)]
mod news_integration_tests {
    use super::common::*;
    use econ_news::config::Config;
    use econ_news::news::{NewsAggregator, SUMMARY_MAX_CHARS};
    use wiremock::MockServer;

    async fn aggregator(server: &MockServer, per_feed_limit: usize) -> NewsAggregator {
        let config = Config::from_str(&config_toml(server, per_feed_limit)).unwrap();
        let timeout = config.feed_timeout();
        NewsAggregator::new(
            econ_news::http_client().unwrap(),
            config.feeds,
            config.per_feed_limit,
            timeout,
        )
    }

    #[tokio::test]
    async fn test_merge_across_feeds_with_failure() {
        let server = MockServer::start().await;
        mount_body(
            &server,
            "/chosun.xml",
            200,
            rss(&[
                ("C3", Some("Tue, 10 Dec 2024 08:00:00 +0900")),
                ("C1", Some("Mon, 09 Dec 2024 08:00:00 +0900")),
                ("Cundated", None),
            ]),
        )
        .await;
        mount_body(
            &server,
            "/donga.xml",
            200,
            rss(&[
                ("D4", Some("Wed, 11 Dec 2024 08:00:00 +0900")),
                ("D2", Some("Mon, 09 Dec 2024 20:00:00 +0900")),
            ]),
        )
        .await;
        mount_body(&server, "/broken.xml", 500, String::new()).await;

        let news = aggregator(&server, 40).await;
        let items = news.fetch_news(100).await;

        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["D4", "C3", "D2", "C1", "Cundated"]);

        assert!(items
            .windows(2)
            .all(|w| w[0].published_epoch >= w[1].published_epoch));
        assert_eq!(items.last().unwrap().published_epoch, 0);
        assert!(items
            .iter()
            .all(|i| i.summary.chars().count() <= SUMMARY_MAX_CHARS));
        assert_eq!(items[0].source_label, "동아일보");
        assert_eq!(items[1].source_label, "조선일보");
    }

    #[tokio::test]
    async fn test_per_feed_cap_applies_before_merge() {
        let server = MockServer::start().await;
        let dated: Vec<String> = (0..10)
            .map(|i| format!("Mon, 09 Dec 2024 {:02}:00:00 GMT", 20 - i))
            .collect();
        let titles: Vec<String> = (0..10).map(|i| format!("Chosun{}", i)).collect();
        let entries: Vec<(&str, Option<&str>)> = titles
            .iter()
            .zip(dated.iter())
            .map(|(t, d)| (t.as_str(), Some(d.as_str())))
            .collect();
        mount_body(&server, "/chosun.xml", 200, rss(&entries)).await;
        mount_body(&server, "/donga.xml", 404, String::new()).await;
        mount_body(&server, "/broken.xml", 404, String::new()).await;

        let news = aggregator(&server, 3).await;
        let items = news.fetch_news(100).await;

        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Chosun0", "Chosun1", "Chosun2"]);
    }

    #[tokio::test]
    async fn test_all_feeds_down() {
        let server = MockServer::start().await;

        let news = aggregator(&server, 40).await;
        assert!(news.fetch_news(100).await.is_empty());
    }
}

#[cfg(test)]
mod end_to_end_tests {
    use super::common::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use econ_news::config::Config;
    use econ_news::news::NewsAggregator;
    use econ_news::prices::PriceAggregator;
    use econ_news::routes::{router, AppState};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::MockServer;

    async fn app(server: &MockServer) -> axum::Router {
        let config = Config::from_str(&config_toml(server, 40)).unwrap();
        let client = econ_news::http_client().unwrap();

        let state = Arc::new(AppState {
            news: NewsAggregator::new(
                client.clone(),
                config.feeds.clone(),
                config.per_feed_limit,
                config.feed_timeout(),
            ),
            prices: PriceAggregator::new(client, &config.prices),
            news_limit: config.news_limit,
        });
        router(state)
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_page_and_prices_from_config() {
        let server = MockServer::start().await;
        mount_body(
            &server,
            "/chosun.xml",
            200,
            rss(&[("Rate decision", Some("Mon, 09 Dec 2024 12:00:00 GMT"))]),
        )
        .await;
        mount_body(
            &server,
            "/v1/ticker",
            200,
            r#"[{"market":"KRW-BTC","trade_price":50000000},{"market":"KRW-ETH","trade_price":3000000}]"#
                .to_string(),
        )
        .await;
        mount_body(
            &server,
            "/forex",
            200,
            r#"[{"code":"FRX.KRWUSD","currencyCode":"USD","basePrice":1350.2}]"#.to_string(),
        )
        .await;

        let (status, page) = get(app(&server).await, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("Rate decision"));
        assert!(page.contains("조선일보"));
        assert!(page.contains("Rate decision 요약"));

        let (status, prices) = get(app(&server).await, "/api/prices").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&prices).unwrap();
        assert_eq!(json["BTC_KRW"], 50000000.0);
        assert_eq!(json["ETH_KRW"], 3000000.0);
        assert_eq!(json["USDKRW"], 1350.2);
    }

    #[tokio::test]
    async fn test_everything_down_still_serves() {
        let server = MockServer::start().await;

        let (status, _page) = get(app(&server).await, "/").await;
        assert_eq!(status, StatusCode::OK);

        let (status, prices) = get(app(&server).await, "/api/prices").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&prices).unwrap();
        assert!(json["BTC_KRW"].is_null());
        assert!(json["ETH_KRW"].is_null());
        assert!(json["USDKRW"].is_null());
        assert!(json["timestamp"].is_string());
    }
}
