//! Upstream price APIs.
//!
//! Each provider speaks its own ad hoc JSON dialect; all of them are normalized into
//! [`MetalRates`] per gram in the configured base currency.

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use super::{MetalRates, RateProvider, grams_per_troy_ounce};
use crate::config::RatesConfig;

/// Assemble the provider chain in priority order: the three keyed APIs (when configured), then
/// the keyless spot API.
pub fn build_chain(client: Client, config: &RatesConfig) -> Vec<Box<dyn RateProvider>> {
    let providers = &config.providers;
    let currency = config.base_currency.clone();
    let mut chain: Vec<Box<dyn RateProvider>> = Vec::new();

    if let Some(api_key) = &providers.metalprice_api_key {
        chain.push(Box::new(MetalPriceApi {
            client: client.clone(),
            base_url: providers.metalprice_url.clone(),
            api_key: api_key.clone(),
            currency: currency.clone(),
        }));
    }
    if let Some(api_key) = &providers.goldapi_api_key {
        chain.push(Box::new(GoldApi {
            client: client.clone(),
            base_url: providers.goldapi_url.clone(),
            api_key: api_key.clone(),
            currency: currency.clone(),
        }));
    }
    if let Some(api_key) = &providers.metalsdev_api_key {
        chain.push(Box::new(MetalsDev {
            client: client.clone(),
            base_url: providers.metalsdev_url.clone(),
            api_key: api_key.clone(),
            currency: currency.clone(),
        }));
    }
    if let Some(spot_url) = &providers.spot_url {
        chain.push(Box::new(SpotPrice {
            client,
            spot_url: spot_url.clone(),
            forex_url: providers.forex_url.clone(),
            currency,
        }));
    }

    chain
}

/// Makes sure a url has a trailing slash, so that `join` appends instead of replacing the last
/// path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

fn endpoint(base: &Url, path: &str) -> anyhow::Result<Url> {
    ensure_slash(base)
        .join(path)
        .map_err(|e| anyhow!("Failed to construct provider URL from {base} and {path}: {e}"))
}

fn decimal(value: f64, what: &str) -> anyhow::Result<Decimal> {
    Decimal::from_f64(value).with_context(|| format!("{what} is not a finite number: {value}"))
}

async fn get_json<T: serde::de::DeserializeOwned>(request: reqwest::RequestBuilder) -> anyhow::Result<T> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        bail!("upstream returned {status}: {body}");
    }
    debug!("Rate provider response body: {}", body);
    serde_json::from_str(&body).with_context(|| format!("error decoding response body: {body}"))
}

/// metalpriceapi.com: `GET /v1/latest?api_key=&base=INR&currencies=XAU,XAG`.
///
/// Rates are quoted as troy ounces of metal per unit of base currency, so they are inverted.
pub struct MetalPriceApi {
    pub client: Client,
    pub base_url: Url,
    pub api_key: String,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct MetalPriceResponse {
    success: bool,
    #[serde(default)]
    rates: HashMap<String, f64>,
    error: Option<serde_json::Value>,
}

#[async_trait]
impl RateProvider for MetalPriceApi {
    fn name(&self) -> &str {
        "metalpriceapi"
    }

    async fn fetch(&self) -> anyhow::Result<MetalRates> {
        let url = endpoint(&self.base_url, "v1/latest")?;
        let body: MetalPriceResponse = get_json(self.client.get(url).query(&[
            ("api_key", self.api_key.as_str()),
            ("base", self.currency.as_str()),
            ("currencies", "XAU,XAG"),
        ]))
        .await?;

        if !body.success {
            bail!("metalpriceapi reported failure: {:?}", body.error);
        }

        let per_gram = |symbol: &str| -> anyhow::Result<Decimal> {
            let ounces_per_unit = body.rates.get(symbol).copied().with_context(|| format!("missing {symbol} rate"))?;
            let ounces_per_unit = decimal(ounces_per_unit, symbol)?;
            if ounces_per_unit <= Decimal::ZERO {
                bail!("non-positive {symbol} rate");
            }
            let per_ounce = Decimal::ONE
                .checked_div(ounces_per_unit)
                .with_context(|| format!("{symbol} rate {ounces_per_unit} is too small to invert"))?;
            Ok(per_ounce / grams_per_troy_ounce())
        };

        Ok(MetalRates::from_gold_24k(per_gram("XAU")?, per_gram("XAG")?))
    }
}

/// goldapi.io: `GET /api/{XAU|XAG}/INR` with an `x-access-token` header. Gold responses carry
/// per-gram prices for each purity.
pub struct GoldApi {
    pub client: Client,
    pub base_url: Url,
    pub api_key: String,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct GoldApiResponse {
    price_gram_24k: f64,
    price_gram_22k: Option<f64>,
    price_gram_18k: Option<f64>,
}

impl GoldApi {
    async fn quote(&self, symbol: &str) -> anyhow::Result<GoldApiResponse> {
        let url = endpoint(&self.base_url, &format!("api/{symbol}/{}", self.currency))?;
        get_json(self.client.get(url).header("x-access-token", &self.api_key)).await
    }
}

#[async_trait]
impl RateProvider for GoldApi {
    fn name(&self) -> &str {
        "goldapi"
    }

    async fn fetch(&self) -> anyhow::Result<MetalRates> {
        let gold = self.quote("XAU").await?;
        let silver = self.quote("XAG").await?;

        let mut rates = MetalRates::from_gold_24k(decimal(gold.price_gram_24k, "gold 24k")?, decimal(silver.price_gram_24k, "silver")?);
        if let Some(price) = gold.price_gram_22k {
            rates.gold_22k = decimal(price, "gold 22k")?;
        }
        if let Some(price) = gold.price_gram_18k {
            rates.gold_18k = decimal(price, "gold 18k")?;
        }
        Ok(rates)
    }
}

/// metals.dev: `GET /v1/latest?api_key=&currency=INR&unit=g`, already per gram.
pub struct MetalsDev {
    pub client: Client,
    pub base_url: Url,
    pub api_key: String,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct MetalsDevResponse {
    status: String,
    metals: Option<MetalsDevMetals>,
}

#[derive(Debug, Deserialize)]
struct MetalsDevMetals {
    gold: f64,
    silver: f64,
}

#[async_trait]
impl RateProvider for MetalsDev {
    fn name(&self) -> &str {
        "metals.dev"
    }

    async fn fetch(&self) -> anyhow::Result<MetalRates> {
        let url = endpoint(&self.base_url, "v1/latest")?;
        let body: MetalsDevResponse = get_json(self.client.get(url).query(&[
            ("api_key", self.api_key.as_str()),
            ("currency", self.currency.as_str()),
            ("unit", "g"),
        ]))
        .await?;

        if body.status != "success" {
            bail!("metals.dev reported status {}", body.status);
        }
        let metals = body.metals.context("metals.dev response has no metals")?;

        Ok(MetalRates::from_gold_24k(decimal(metals.gold, "gold")?, decimal(metals.silver, "silver")?))
    }
}

/// Keyless spot API quoting USD per troy ounce (`GET /price/XAU`), converted with a USD forex
/// table (`GET /v6/latest/USD`).
pub struct SpotPrice {
    pub client: Client,
    pub spot_url: Url,
    pub forex_url: Url,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct SpotResponse {
    price: f64,
}

#[derive(Debug, Deserialize)]
struct ForexResponse {
    rates: HashMap<String, f64>,
}

impl SpotPrice {
    async fn usd_per_ounce(&self, symbol: &str) -> anyhow::Result<Decimal> {
        let url = endpoint(&self.spot_url, &format!("price/{symbol}"))?;
        let body: SpotResponse = get_json(self.client.get(url)).await?;
        decimal(body.price, symbol)
    }

    async fn usd_exchange_rate(&self) -> anyhow::Result<Decimal> {
        let url = endpoint(&self.forex_url, "v6/latest/USD")?;
        let body: ForexResponse = get_json(self.client.get(url)).await?;
        let rate = body
            .rates
            .get(&self.currency)
            .copied()
            .with_context(|| format!("forex table has no {} rate", self.currency))?;
        decimal(rate, "exchange rate")
    }
}

#[async_trait]
impl RateProvider for SpotPrice {
    fn name(&self) -> &str {
        "gold-api.com"
    }

    async fn fetch(&self) -> anyhow::Result<MetalRates> {
        let gold = self.usd_per_ounce("XAU").await?;
        let silver = self.usd_per_ounce("XAG").await?;
        let fx = self.usd_exchange_rate().await?;

        let per_gram = |usd_per_ounce: Decimal| -> anyhow::Result<Decimal> {
            let local = usd_per_ounce
                .checked_mul(fx)
                .with_context(|| format!("{usd_per_ounce} USD at {fx} {} per USD is out of range", self.currency))?;
            Ok(local / grams_per_troy_ounce())
        };
        Ok(MetalRates::from_gold_24k(per_gram(gold)?, per_gram(silver)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvidersConfig;
    use crate::rates::{FALLBACK_SOURCE, RateFetcher};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> Client {
        Client::builder().timeout(Duration::from_secs(5)).build().unwrap()
    }

    fn url(server: &MockServer) -> Url {
        Url::parse(&server.uri()).unwrap()
    }

    fn round2(d: Decimal) -> Decimal {
        d.round_dp(2)
    }

    #[test]
    fn test_ensure_slash() {
        let base = Url::parse("https://api.example.com/prefix").unwrap();
        assert_eq!(endpoint(&base, "v1/latest").unwrap().as_str(), "https://api.example.com/prefix/v1/latest");

        let base = Url::parse("https://api.example.com").unwrap();
        assert_eq!(endpoint(&base, "v1/latest").unwrap().as_str(), "https://api.example.com/v1/latest");
    }

    #[test]
    fn test_build_chain_only_includes_keyed_providers_with_keys() {
        let mut config = RatesConfig::default();
        assert_eq!(
            build_chain(client(), &config).iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            vec!["gold-api.com"]
        );

        config.providers = ProvidersConfig {
            metalprice_api_key: Some("a".to_string()),
            metalsdev_api_key: Some("c".to_string()),
            spot_url: None,
            ..Default::default()
        };
        assert_eq!(
            build_chain(client(), &config).iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            vec!["metalpriceapi", "metals.dev"]
        );
    }

    #[tokio::test]
    async fn test_metalpriceapi_inverts_ounce_rates() {
        let server = MockServer::start().await;
        // 1 / (0.0000025 oz/INR) = 400000 INR per oz
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("api_key", "secret"))
            .and(query_param("base", "INR"))
            .and(query_param("currencies", "XAU,XAG"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "base": "INR",
                "rates": { "XAU": 0.0000025, "XAG": 0.0002 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = MetalPriceApi {
            client: client(),
            base_url: url(&server),
            api_key: "secret".to_string(),
            currency: "INR".to_string(),
        };

        let rates = provider.fetch().await.unwrap();
        // 400000 / 31.1034768 = 12860.30..
        assert_eq!(round2(rates.gold_24k), Decimal::new(1286030, 2));
        // 5000 / 31.1034768 = 160.75..
        assert_eq!(round2(rates.silver), Decimal::new(16075, 2));
        assert_eq!(round2(rates.gold_22k), round2(rates.gold_24k * Decimal::from(22) / Decimal::from(24)));
    }

    #[tokio::test]
    async fn test_metalpriceapi_failure_flag_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": { "statusCode": 101, "message": "invalid api key" }
            })))
            .mount(&server)
            .await;

        let provider = MetalPriceApi {
            client: client(),
            base_url: url(&server),
            api_key: "bad".to_string(),
            currency: "INR".to_string(),
        };

        assert!(provider.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_goldapi_uses_published_purities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/XAU/INR"))
            .and(header("x-access-token", "goldkey"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metal": "XAU",
                "currency": "INR",
                "price": 226000.0,
                "price_gram_24k": 7265.5,
                "price_gram_22k": 6660.25,
                "price_gram_18k": 5449.0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/XAG/INR"))
            .and(header("x-access-token", "goldkey"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metal": "XAG",
                "currency": "INR",
                "price_gram_24k": 88.4
            })))
            .mount(&server)
            .await;

        let provider = GoldApi {
            client: client(),
            base_url: url(&server),
            api_key: "goldkey".to_string(),
            currency: "INR".to_string(),
        };

        let rates = provider.fetch().await.unwrap();
        assert_eq!(rates.gold_24k, Decimal::new(72655, 1));
        assert_eq!(rates.gold_22k, Decimal::new(666025, 2));
        assert_eq!(rates.gold_18k, Decimal::from(5449));
        assert_eq!(rates.silver, Decimal::new(884, 1));
    }

    #[tokio::test]
    async fn test_metalsdev_per_gram() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("unit", "g"))
            .and(query_param("currency", "INR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "currency": "INR",
                "unit": "g",
                "metals": { "gold": 7200.0, "silver": 90.0 }
            })))
            .mount(&server)
            .await;

        let provider = MetalsDev {
            client: client(),
            base_url: url(&server),
            api_key: "devkey".to_string(),
            currency: "INR".to_string(),
        };

        let rates = provider.fetch().await.unwrap();
        assert_eq!(rates.gold_24k, Decimal::from(7200));
        assert_eq!(rates.gold_22k, Decimal::from(6600));
        assert_eq!(rates.gold_18k, Decimal::from(5400));
        assert_eq!(rates.silver, Decimal::from(90));
    }

    #[tokio::test]
    async fn test_spot_price_converts_usd_ounces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/XAU"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Gold", "price": 2488.278072, "symbol": "XAU" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/price/XAG"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Silver", "price": 31.1034768, "symbol": "XAG" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v6/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "base_code": "USD",
                "rates": { "USD": 1, "INR": 90.0 }
            })))
            .mount(&server)
            .await;

        let provider = SpotPrice {
            client: client(),
            spot_url: url(&server),
            forex_url: url(&server),
            currency: "INR".to_string(),
        };

        let rates = provider.fetch().await.unwrap();
        // 2488.278072 USD/oz = 80 USD/g -> 7200 INR/g
        assert_eq!(round2(rates.gold_24k), Decimal::from(7200));
        // 1 USD/g -> 90 INR/g
        assert_eq!(round2(rates.silver), Decimal::from(90));
    }

    #[tokio::test]
    async fn test_out_of_range_quotes_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/XAU"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "price": 1e27 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/price/XAG"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "price": 31.1 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v6/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rates": { "INR": 83.0 } })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("base", "INR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "rates": { "XAU": 1e-28, "XAG": 0.0002 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("unit", "g"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "metals": { "gold": 1e20, "silver": 90.0 }
            })))
            .mount(&server)
            .await;

        let spot = SpotPrice {
            client: client(),
            spot_url: url(&server),
            forex_url: url(&server),
            currency: "INR".to_string(),
        };
        assert!(spot.fetch().await.is_err());

        let config = RatesConfig {
            providers: ProvidersConfig {
                metalprice_url: url(&server),
                metalprice_api_key: Some("a".to_string()),
                metalsdev_url: url(&server),
                metalsdev_api_key: Some("c".to_string()),
                spot_url: Some(url(&server)),
                forex_url: url(&server),
                ..Default::default()
            },
            ..Default::default()
        };

        let quote = RateFetcher::from_config(&config).unwrap().fetch().await;
        assert_eq!(quote.source, FALLBACK_SOURCE);
    }

    #[tokio::test]
    async fn test_chain_falls_through_failed_http_providers() {
        let failing = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&failing)
            .await;

        let working = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "metals": { "gold": 7000.0, "silver": 85.0 }
            })))
            .mount(&working)
            .await;

        let config = RatesConfig {
            providers: ProvidersConfig {
                metalprice_url: url(&failing),
                metalprice_api_key: Some("a".to_string()),
                goldapi_url: url(&failing),
                goldapi_api_key: Some("b".to_string()),
                metalsdev_url: url(&working),
                metalsdev_api_key: Some("c".to_string()),
                spot_url: Some(url(&failing)),
                forex_url: url(&failing),
            },
            ..Default::default()
        };

        let fetcher = RateFetcher::from_config(&config).unwrap();
        let quote = fetcher.fetch().await;
        assert_eq!(quote.source, "metals.dev");
        assert_eq!(quote.rates.gold_24k, Decimal::from(7000));
    }

    #[tokio::test]
    async fn test_chain_uses_fallback_when_everything_is_down() {
        let failing = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&failing)
            .await;

        let config = RatesConfig {
            providers: ProvidersConfig {
                metalprice_url: url(&failing),
                metalprice_api_key: Some("a".to_string()),
                spot_url: Some(url(&failing)),
                forex_url: url(&failing),
                ..Default::default()
            },
            ..Default::default()
        };

        let fetcher = RateFetcher::from_config(&config).unwrap();
        let quote = fetcher.fetch().await;
        assert_eq!(quote.source, FALLBACK_SOURCE);
    }
}
