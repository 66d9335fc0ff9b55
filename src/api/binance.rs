use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::error::NO_NEED_TO_CHANGE_MARGIN_CODE;
use super::{Exchange, ExchangeError, ExchangeResult};
use crate::config::ExchangeSettings;
use crate::models::{
    normalize_symbol, Balance, Candle, MarginMode, Order, OrderBookTop, OrderSide, OrderStatus,
    OrderType, Position, Side, Timeframe,
};

// Binance USD-M futures REST API
// Docs: https://developers.binance.com/docs/derivatives/usds-margined-futures
pub const BINANCE_FUTURES_API: &str = "https://fapi.binance.com";

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Lot and tick sizes for one symbol, loaded from exchangeInfo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolRules {
    pub step_size: f64,
    pub tick_size: f64,
}

/// Client for the Binance USD-M perpetual futures API
///
/// Cloneable; clones share the clock offset, symbol rules and rate limiter.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    time_offset_ms: Arc<AtomicI64>,
    rules: Arc<RwLock<HashMap<String, SymbolRules>>>,
    rate_limiter: Arc<BinanceRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ServerTime {
    #[serde(rename = "serverTime")]
    server_time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
    entry_price: String,
    #[serde(default)]
    position_side: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetBalance {
    asset: String,
    balance: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    client_order_id: String,
    symbol: String,
    status: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    avg_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER")]
    Price {
        #[serde(rename = "tickSize")]
        tick_size: String,
    },
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize")]
        step_size: String,
    },
    #[serde(other)]
    Other,
}

// ============== Implementation ==============

impl BinanceFuturesClient {
    pub fn new(settings: &ExchangeSettings) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            recv_window_ms: settings.recv_window_ms,
            time_offset_ms: Arc::new(AtomicI64::new(0)),
            rules: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter,
        })
    }

    /// Current clock offset applied to signed requests
    pub fn time_offset_ms(&self) -> i64 {
        self.time_offset_ms.load(Ordering::Relaxed)
    }

    pub fn symbol_rules(&self, symbol: &str) -> Option<SymbolRules> {
        self.rules
            .read()
            .ok()
            .and_then(|rules| rules.get(&normalize_symbol(symbol)).copied())
    }

    fn sign(&self, payload: &str) -> ExchangeResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Authentication(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn timestamp_ms(&self) -> i64 {
        Utc::now().timestamp_millis() + self.time_offset_ms()
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(params).send().await?;
        Self::parse_response(response).await
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(ExchangeError::Authentication(
                "API key and secret are not configured".to_string(),
            ));
        }

        self.rate_limiter.until_ready().await;

        let mut query: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        query.push(format!("recvWindow={}", self.recv_window_ms));
        query.push(format!("timestamp={}", self.timestamp_ms()));
        let query = query.join("&");
        let signature = self.sign(&query)?;

        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(&body) {
            if status.as_u16() == 401 {
                return Err(ExchangeError::Authentication(api_error.msg));
            }
            return Err(ExchangeError::from_api(api_error.code, api_error.msg));
        }

        Err(match status.as_u16() {
            401 | 403 => ExchangeError::Authentication(body),
            418 | 429 => ExchangeError::RateLimited(body),
            code if code >= 500 => ExchangeError::Network(format!("HTTP {}: {}", status, body)),
            code => ExchangeError::Rejected {
                code: i64::from(code),
                message: body,
            },
        })
    }

    fn format_quantity(&self, symbol: &str, quantity: f64) -> String {
        match self.symbol_rules(symbol) {
            Some(rules) => format_to_step(floor_to_step(quantity, rules.step_size), rules.step_size),
            None => quantity.to_string(),
        }
    }

    fn format_price(&self, symbol: &str, price: f64, side: OrderSide) -> String {
        match self.symbol_rules(symbol) {
            Some(rules) => {
                // Round toward the book so the order stays marketable
                let rounded = match side {
                    OrderSide::Sell => floor_to_step(price, rules.tick_size),
                    OrderSide::Buy => (price / rules.tick_size).ceil() * rules.tick_size,
                };
                format_to_step(rounded, rules.tick_size)
            }
            None => price.to_string(),
        }
    }

    async fn submit_order(&self, params: Vec<(&str, String)>) -> ExchangeResult<Order> {
        let response: OrderResponse = self
            .signed_request(Method::POST, "/fapi/v1/order", &params)
            .await?;
        tracing::info!(
            symbol = %response.symbol,
            order_id = response.order_id,
            status = %response.status,
            "Order acknowledged"
        );
        response.try_into()
    }
}

impl TryFrom<OrderResponse> for Order {
    type Error = ExchangeError;

    fn try_from(raw: OrderResponse) -> Result<Self, Self::Error> {
        let status = match raw.status.as_str() {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
            other => return Err(ExchangeError::Decode(format!("unknown order status {}", other))),
        };
        let side = match raw.side.as_str() {
            "BUY" => OrderSide::Buy,
            "SELL" => OrderSide::Sell,
            other => return Err(ExchangeError::Decode(format!("unknown order side {}", other))),
        };
        let order_type = match raw.order_type.as_str() {
            "LIMIT" => OrderType::Limit,
            _ => OrderType::Market,
        };
        let executed_qty = raw
            .executed_qty
            .as_deref()
            .map(parse_f64)
            .transpose()?
            .unwrap_or(0.0);
        let avg_price = raw
            .avg_price
            .as_deref()
            .map(parse_f64)
            .transpose()?
            .filter(|p| *p > 0.0);

        Ok(Order {
            id: raw.order_id.to_string(),
            client_order_id: raw.client_order_id,
            symbol: raw.symbol,
            side,
            order_type,
            status,
            executed_qty,
            avg_price,
        })
    }
}

#[async_trait]
impl Exchange for BinanceFuturesClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let params = [
            ("symbol", normalize_symbol(symbol)),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<serde_json::Value>> =
            self.public_get("/fapi/v1/klines", &params).await?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<f64> {
        let params = [("symbol", normalize_symbol(symbol))];
        let ticker: TickerPrice = self.public_get("/fapi/v1/ticker/price", &params).await?;
        parse_f64(&ticker.price)
    }

    async fn fetch_positions(&self, symbols: &[String]) -> ExchangeResult<Vec<Position>> {
        let wanted: HashSet<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        let params: Vec<(&str, String)> = match symbols {
            [single] => vec![("symbol", normalize_symbol(single))],
            _ => Vec::new(),
        };

        let raw: Vec<PositionRisk> = self
            .signed_request(Method::GET, "/fapi/v2/positionRisk", &params)
            .await?;

        raw.into_iter()
            .filter(|p| wanted.is_empty() || wanted.contains(&p.symbol))
            .map(|p| -> ExchangeResult<Position> {
                let amount = parse_f64(&p.position_amt)?;
                let side = if amount < 0.0 || p.position_side.as_deref() == Some("SHORT") {
                    Side::Short
                } else {
                    Side::Long
                };
                Ok(Position {
                    symbol: p.symbol,
                    side,
                    contracts: amount.abs(),
                    entry_price: parse_f64(&p.entry_price)?,
                })
            })
            .collect()
    }

    async fn fetch_balance(&self, asset: &str) -> ExchangeResult<Balance> {
        let balances: Vec<AssetBalance> = self
            .signed_request(Method::GET, "/fapi/v2/balance", &[])
            .await?;

        match balances.into_iter().find(|b| b.asset == asset) {
            Some(balance) => {
                let total = parse_f64(&balance.balance)?;
                let free = parse_f64(&balance.available_balance)?;
                Ok(Balance {
                    free,
                    used: (total - free).max(0.0),
                    total,
                })
            }
            None => Ok(Balance::default()),
        }
    }

    async fn create_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
    ) -> ExchangeResult<Order> {
        let mut params = vec![
            ("symbol", normalize_symbol(symbol)),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", self.format_quantity(symbol, quantity)),
            ("newClientOrderId", uuid::Uuid::new_v4().simple().to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        self.submit_order(params).await
    }

    async fn create_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        reduce_only: bool,
    ) -> ExchangeResult<Order> {
        let mut params = vec![
            ("symbol", normalize_symbol(symbol)),
            ("side", side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "IOC".to_string()),
            ("quantity", self.format_quantity(symbol, quantity)),
            ("price", self.format_price(symbol, price, side)),
            ("newClientOrderId", uuid::Uuid::new_v4().simple().to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        self.submit_order(params).await
    }

    async fn fetch_order_book_top(&self, symbol: &str) -> ExchangeResult<OrderBookTop> {
        let params = [("symbol", normalize_symbol(symbol)), ("limit", "5".to_string())];
        let depth: DepthResponse = self.public_get("/fapi/v1/depth", &params).await?;

        Ok(OrderBookTop {
            best_bid: depth.bids.first().map(|level| parse_f64(&level[0])).transpose()?,
            best_ask: depth.asks.first().map(|level| parse_f64(&level[0])).transpose()?,
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        let params = [
            ("symbol", normalize_symbol(symbol)),
            ("leverage", leverage.to_string()),
        ];
        let _: serde_json::Value = self
            .signed_request(Method::POST, "/fapi/v1/leverage", &params)
            .await?;
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> ExchangeResult<()> {
        let margin_type = match mode {
            MarginMode::Cross => "CROSSED",
            MarginMode::Isolated => "ISOLATED",
        };
        let params = [
            ("symbol", normalize_symbol(symbol)),
            ("marginType", margin_type.to_string()),
        ];
        let result: ExchangeResult<serde_json::Value> = self
            .signed_request(Method::POST, "/fapi/v1/marginType", &params)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(ExchangeError::Rejected { code, .. }) if code == NO_NEED_TO_CHANGE_MARGIN_CODE => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_time(&self) -> ExchangeResult<i64> {
        let time: ServerTime = self.public_get("/fapi/v1/time", &[]).await?;
        Ok(time.server_time)
    }

    async fn sync_time(&self) -> ExchangeResult<i64> {
        let server_time = self.fetch_time().await?;
        let offset = server_time - Utc::now().timestamp_millis();
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        tracing::info!("Time synchronized with Binance server. Offset: {}ms", offset);
        Ok(offset)
    }

    async fn load_markets(&self) -> ExchangeResult<HashSet<String>> {
        let info: ExchangeInfo = self.public_get("/fapi/v1/exchangeInfo", &[]).await?;

        let mut loaded = HashMap::new();
        for symbol in info.symbols.iter().filter(|s| s.status == "TRADING") {
            let mut step_size = None;
            let mut tick_size = None;
            for filter in &symbol.filters {
                match filter {
                    SymbolFilter::LotSize { step_size: step } => step_size = Some(parse_f64(step)?),
                    SymbolFilter::Price { tick_size: tick } => tick_size = Some(parse_f64(tick)?),
                    SymbolFilter::Other => {}
                }
            }
            if let (Some(step_size), Some(tick_size)) = (step_size, tick_size) {
                loaded.insert(symbol.symbol.clone(), SymbolRules { step_size, tick_size });
            }
        }

        let symbols: HashSet<String> = loaded.keys().cloned().collect();
        tracing::info!("Loaded {} tradable symbols from Binance", symbols.len());

        if let Ok(mut rules) = self.rules.write() {
            *rules = loaded;
        }
        Ok(symbols)
    }

    fn name(&self) -> &str {
        "binance-usdm"
    }
}

// ============== Helpers ==============

fn parse_f64(raw: &str) -> ExchangeResult<f64> {
    raw.parse::<f64>()
        .map_err(|e| ExchangeError::Decode(format!("invalid number '{}': {}", raw, e)))
}

fn value_f64(value: &serde_json::Value) -> ExchangeResult<f64> {
    match value {
        serde_json::Value::String(s) => parse_f64(s),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExchangeError::Decode(format!("invalid number {}", n))),
        other => Err(ExchangeError::Decode(format!("expected number, got {}", other))),
    }
}

/// Kline row: [open_time, open, high, low, close, volume, close_time, ...]
fn parse_kline(row: &[serde_json::Value]) -> ExchangeResult<Candle> {
    if row.len() < 6 {
        return Err(ExchangeError::Decode(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .ok_or_else(|| ExchangeError::Decode("kline open time is not an integer".to_string()))?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(open_time)
        .ok_or_else(|| ExchangeError::Decode(format!("invalid kline time {}", open_time)))?;

    Ok(Candle {
        timestamp,
        open: value_f64(&row[1])?,
        high: value_f64(&row[2])?,
        low: value_f64(&row[3])?,
        close: value_f64(&row[4])?,
        volume: value_f64(&row[5])?,
    })
}

fn floor_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    // Nudge before flooring so 0.3 / 0.1 does not land on 2.999..
    ((value / step) + 1e-9).floor() * step
}

fn format_to_step(value: f64, step: f64) -> String {
    let decimals = if step > 0.0 && step < 1.0 {
        (-step.log10()).round() as usize
    } else {
        0
    };
    format!("{:.*}", decimals, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings(base_url: &str) -> ExchangeSettings {
        ExchangeSettings {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
            ..ExchangeSettings::default()
        }
    }

    #[test]
    fn test_step_formatting() {
        assert_eq!(format_to_step(floor_to_step(0.123456, 0.001), 0.001), "0.123");
        assert_eq!(format_to_step(floor_to_step(0.3, 0.1), 0.1), "0.3");
        assert_eq!(format_to_step(floor_to_step(17.9, 1.0), 1.0), "17");
    }

    #[test]
    fn test_signature_is_hex_hmac() {
        let client = BinanceFuturesClient::new(&settings("http://localhost")).unwrap();
        let signature = client.sign("symbol=BTCUSDT&timestamp=1").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(signature, client.sign("symbol=BTCUSDT&timestamp=1").unwrap());
    }

    #[tokio::test]
    async fn test_fetch_ticker() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v1/ticker/price")
            .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
            .with_status(200)
            .with_body(r#"{"symbol":"BTCUSDT","price":"64123.50","time":1700000000000}"#)
            .create_async()
            .await;

        let client = BinanceFuturesClient::new(&settings(&server.url())).unwrap();
        let price = client.fetch_ticker("BTC/USDT").await.unwrap();

        assert_eq!(price, 64123.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_candles_decodes_klines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v1/klines")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "ETHUSDT".into()),
                Matcher::UrlEncoded("interval".into(), "15m".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[
                    [1700000000000,"2000.0","2010.5","1995.0","2005.0","120.5",1700000899999,"0",10,"0","0","0"],
                    [1700000900000,"2005.0","2020.0","2001.0","2018.0","98.1",1700001799999,"0",12,"0","0","0"]
                ]"#,
            )
            .create_async()
            .await;

        let client = BinanceFuturesClient::new(&settings(&server.url())).unwrap();
        let candles = client
            .fetch_candles("ETHUSDT", Timeframe::M15, 2)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].high, 2010.5);
        assert_eq!(candles[1].close, 2018.0);
        assert_eq!(candles[1].timestamp.timestamp_millis(), 1700000900000);
    }

    #[tokio::test]
    async fn test_fetch_positions_is_signed_and_decoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v2/positionRisk")
            .match_header("X-MBX-APIKEY", "test-key")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::Regex("signature=[0-9a-f]{64}".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[{"symbol":"BTCUSDT","positionAmt":"-0.010","entryPrice":"50000.0","positionSide":"BOTH","leverage":"2"}]"#,
            )
            .create_async()
            .await;

        let client = BinanceFuturesClient::new(&settings(&server.url())).unwrap();
        let positions = client
            .fetch_positions(&["BTC/USDT".to_string()])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, Side::Short);
        assert_eq!(positions[0].contracts, 0.01);
        assert_eq!(positions[0].entry_price, 50000.0);
    }

    #[tokio::test]
    async fn test_fetch_balance_for_asset() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v2/balance")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[
                    {"asset":"BNB","balance":"1.0","availableBalance":"1.0"},
                    {"asset":"USDT","balance":"150.00","availableBalance":"120.00"}
                ]"#,
            )
            .create_async()
            .await;

        let client = BinanceFuturesClient::new(&settings(&server.url())).unwrap();
        let balance = client.fetch_balance("USDT").await.unwrap();

        assert_eq!(balance.total, 150.0);
        assert_eq!(balance.free, 120.0);
        assert_eq!(balance.used, 30.0);
    }

    #[tokio::test]
    async fn test_percent_price_rejection_maps_to_price_band() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-4131,"msg":"The counterparty's best price does not meet the PERCENT_PRICE filter limit."}"#)
            .create_async()
            .await;

        let client = BinanceFuturesClient::new(&settings(&server.url())).unwrap();
        let err = client
            .create_market_order("BTCUSDT", OrderSide::Sell, 0.01, true)
            .await
            .unwrap_err();

        assert!(err.is_price_band());
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v2/balance")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#)
            .create_async()
            .await;

        let client = BinanceFuturesClient::new(&settings(&server.url())).unwrap();
        let err = client.fetch_balance("USDT").await.unwrap_err();

        assert!(err.is_authentication());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_margin_mode_already_set_is_ok() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/fapi/v1/marginType")
            .match_query(Matcher::UrlEncoded("marginType".into(), "CROSSED".into()))
            .with_status(400)
            .with_body(r#"{"code":-4046,"msg":"No need to change margin type."}"#)
            .create_async()
            .await;

        let client = BinanceFuturesClient::new(&settings(&server.url())).unwrap();
        let result = client.set_margin_mode("BTCUSDT", MarginMode::Cross).await;

        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn test_order_quantity_rounded_to_lot_size() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v1/exchangeInfo")
            .with_status(200)
            .with_body(
                r#"{"symbols":[
                    {"symbol":"BTCUSDT","status":"TRADING","filters":[
                        {"filterType":"PRICE_FILTER","tickSize":"0.10","minPrice":"556.80"},
                        {"filterType":"LOT_SIZE","stepSize":"0.001","minQty":"0.001"},
                        {"filterType":"MIN_NOTIONAL","notional":"100"}
                    ]},
                    {"symbol":"OLDUSDT","status":"SETTLING","filters":[]}
                ]}"#,
            )
            .create_async()
            .await;
        let order_mock = server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("quantity".into(), "0.123".into()),
                Matcher::UrlEncoded("side".into(), "BUY".into()),
                Matcher::UrlEncoded("type".into(), "MARKET".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"orderId":22542179,"clientOrderId":"abc","symbol":"BTCUSDT","status":"FILLED",
                    "side":"BUY","type":"MARKET","executedQty":"0.123","avgPrice":"50010.0"}"#,
            )
            .create_async()
            .await;

        let client = BinanceFuturesClient::new(&settings(&server.url())).unwrap();
        let symbols = client.load_markets().await.unwrap();
        assert!(symbols.contains("BTCUSDT"));
        assert!(!symbols.contains("OLDUSDT"));

        let order = client
            .create_market_order("BTCUSDT", OrderSide::Buy, 0.12345, false)
            .await
            .unwrap();

        order_mock.assert_async().await;
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_price, Some(50010.0));
        assert_eq!(order.executed_qty, 0.123);
    }

    #[tokio::test]
    async fn test_limit_order_is_immediate_or_cancel() {
        let mut server = mockito::Server::new_async().await;
        let order_mock = server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("type".into(), "LIMIT".into()),
                Matcher::UrlEncoded("timeInForce".into(), "IOC".into()),
                Matcher::UrlEncoded("reduceOnly".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"orderId":22542180,"clientOrderId":"def","symbol":"BTCUSDT","status":"EXPIRED",
                    "side":"SELL","type":"LIMIT","executedQty":"0","avgPrice":"0.00000"}"#,
            )
            .create_async()
            .await;

        let client = BinanceFuturesClient::new(&settings(&server.url())).unwrap();
        let order = client
            .create_limit_order("BTCUSDT", OrderSide::Sell, 0.01, 49950.0, true)
            .await
            .unwrap();

        order_mock.assert_async().await;
        assert_eq!(order.status, OrderStatus::Expired);
        assert_eq!(order.executed_qty, 0.0);
    }

    #[tokio::test]
    async fn test_signed_request_without_credentials_fails_fast() {
        let client = BinanceFuturesClient::new(&ExchangeSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ExchangeSettings::default()
        })
        .unwrap();

        let err = client.fetch_balance("USDT").await.unwrap_err();
        assert!(err.is_authentication());
    }
}
