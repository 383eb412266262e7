//! Binance USD-M futures REST gateway
//!
//! Signed access to `/fapi/v1/order` for submit, query and cancel, the open
//! order listing, and the public ticker used to pick a grid reference price.
//! Every response is mapped onto [`GatewayError`] so the strategies can decide
//! what is worth retrying.
//!
//! # Example
//! ```no_run
//! use execution_strategies::config::ExchangeConfig;
//! use execution_strategies::gateway::BinanceFuturesGateway;
//! use execution_strategies::Symbol;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut exchange = ExchangeConfig::default();
//!     exchange.load_credentials_from_env();
//!     let gateway = BinanceFuturesGateway::from_config(&exchange)?;
//!     let price = gateway.ticker_price(&Symbol::new("BTCUSDT")).await?;
//!     println!("BTCUSDT: {}", price);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::auth::Credentials;
use super::throttle::RequestThrottle;
use super::{OpenOrder, OrderAck, OrderGateway, OrderTicket};
use crate::config::ExchangeConfig;
use crate::error::GatewayError;
use crate::{Money, OrderId, OrderStatus, OrderType, Side, Symbol};

const ORDER_PATH: &str = "/fapi/v1/order";
const OPEN_ORDERS_PATH: &str = "/fapi/v1/openOrders";
const TICKER_PRICE_PATH: &str = "/fapi/v1/ticker/price";

/// Binance error codes worth retrying unchanged:
/// -1001 disconnected, -1003 too many requests, -1007 backend timeout,
/// -1008 server overloaded
const TRANSIENT_CODES: [i64; 4] = [-1001, -1003, -1007, -1008];

/// -2011 unknown order sent (cancel), -2013 order does not exist (query)
const NOT_FOUND_CODES: [i64; 2] = [-2011, -2013];

pub struct BinanceFuturesGateway {
    http: Client,
    credentials: Credentials,
    base_url: String,
    recv_window_ms: u64,
    throttle: RequestThrottle,
}

impl BinanceFuturesGateway {
    pub fn new(
        credentials: Credentials,
        base_url: impl Into<String>,
        recv_window_ms: u64,
        timeout: Duration,
        max_requests_per_second: usize,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            recv_window_ms,
            throttle: RequestThrottle::new(max_requests_per_second),
        })
    }

    /// Build from config; fails when the API credentials are missing
    pub fn from_config(config: &ExchangeConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("BINANCE_API_KEY is not set (use --paper to run without credentials)")?;
        let api_secret = config
            .api_secret
            .clone()
            .context("BINANCE_API_SECRET is not set (use --paper to run without credentials)")?;

        Self::new(
            Credentials::new(api_key, api_secret),
            config.resolved_base_url(),
            config.recv_window_ms,
            Duration::from_secs(config.timeout_secs),
            config.max_requests_per_second,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Latest traded price, from the public ticker endpoint
    pub async fn ticker_price(&self, symbol: &Symbol) -> Result<Money, GatewayError> {
        #[derive(Deserialize)]
        struct TickerPrice {
            price: Money,
        }

        self.throttle.acquire().await;
        let url = format!(
            "{}{}?symbol={}",
            self.base_url,
            TICKER_PRICE_PATH,
            symbol.as_str()
        );
        let response = self.http.get(&url).send().await.map_err(transport_error)?;
        let ticker: TickerPrice = read_response(response).await?;
        Ok(ticker.price)
    }

    /// Live orders for `symbol`, or for every symbol when `None`
    pub async fn open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<OpenOrder>, GatewayError> {
        let params = symbol
            .map(|s| vec![("symbol", s.as_str().to_string())])
            .unwrap_or_default();
        let listed: Vec<ListedOrder> = self
            .signed_request(Method::GET, OPEN_ORDERS_PATH, params)
            .await?;
        listed.into_iter().map(ListedOrder::into_open_order).collect()
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<T, GatewayError> {
        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = encode_params(&params);
        let url = format!("{}{}?{}", self.base_url, path, self.credentials.signed(&query));
        debug!(method = %method, path, query = %query, "Binance request");

        self.throttle.acquire().await;
        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", self.credentials.api_key())
            .send()
            .await
            .map_err(transport_error)?;

        read_response(response).await
    }
}

#[async_trait]
impl OrderGateway for BinanceFuturesGateway {
    async fn submit_order(&self, ticket: &OrderTicket) -> Result<OrderAck, GatewayError> {
        let params = order_params(ticket)?;
        let response: FuturesOrder = self.signed_request(Method::POST, ORDER_PATH, params).await?;
        response.into_ack()
    }

    async fn query_order(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
    ) -> Result<OrderStatus, GatewayError> {
        let params = vec![
            ("symbol", symbol.as_str().to_string()),
            ("orderId", order_id.to_string()),
        ];
        let response: FuturesOrder = self.signed_request(Method::GET, ORDER_PATH, params).await?;
        map_order_status(&response.status)
    }

    async fn cancel_order(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
    ) -> Result<OrderStatus, GatewayError> {
        let params = vec![
            ("symbol", symbol.as_str().to_string()),
            ("orderId", order_id.to_string()),
        ];
        let response: FuturesOrder = self
            .signed_request(Method::DELETE, ORDER_PATH, params)
            .await?;
        map_order_status(&response.status)
    }

    fn name(&self) -> &'static str {
        "binance-futures"
    }
}

/// Order payload as returned by submit, query and cancel
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesOrder {
    order_id: OrderId,
    status: String,
    #[serde(default)]
    avg_price: Option<String>,
}

impl FuturesOrder {
    fn into_ack(self) -> Result<OrderAck, GatewayError> {
        let status = map_order_status(&self.status)?;
        // avgPrice is "0.00000" until something executes
        let avg_price = self
            .avg_price
            .and_then(|raw| raw.parse::<Money>().ok())
            .filter(|price| price.is_positive());
        Ok(OrderAck {
            order_id: self.order_id,
            status,
            avg_price,
        })
    }
}

/// Entry of the `/fapi/v1/openOrders` listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedOrder {
    order_id: OrderId,
    symbol: Symbol,
    side: Side,
    #[serde(rename = "type")]
    order_type: String,
    orig_qty: Money,
    executed_qty: Money,
    price: Money,
    stop_price: Money,
    status: String,
}

impl ListedOrder {
    fn into_open_order(self) -> Result<OpenOrder, GatewayError> {
        // Unused prices are reported as "0"
        let set = |price: Money| Some(price).filter(|p| p.is_positive());
        Ok(OpenOrder {
            order_id: self.order_id,
            status: map_order_status(&self.status)?,
            symbol: self.symbol,
            side: self.side,
            order_type: self.order_type,
            quantity: self.orig_qty,
            executed_quantity: self.executed_qty,
            price: set(self.price),
            stop_price: set(self.stop_price),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

fn order_params(ticket: &OrderTicket) -> Result<Vec<(&'static str, String)>, GatewayError> {
    let mut params = vec![
        ("symbol", ticket.symbol.as_str().to_string()),
        ("side", ticket.side.as_str().to_string()),
        ("type", wire_order_type(ticket.order_type).to_string()),
        ("quantity", ticket.quantity.normalize().to_string()),
    ];

    if ticket.order_type != OrderType::Market {
        let price = ticket.price.ok_or_else(|| {
            GatewayError::Rejected(format!(
                "{} order for {} without a price",
                ticket.order_type, ticket.symbol
            ))
        })?;
        params.push(("price", price.normalize().to_string()));
    }
    if ticket.order_type == OrderType::StopLimit {
        let stop_price = ticket.stop_price.ok_or_else(|| {
            GatewayError::Rejected(format!("stop-limit order for {} without a stop price", ticket.symbol))
        })?;
        params.push(("stopPrice", stop_price.normalize().to_string()));
        params.push(("workingType", "CONTRACT_PRICE".to_string()));
    }
    if ticket.order_type != OrderType::Market {
        params.push(("timeInForce", "GTC".to_string()));
    }

    params.push(("newOrderRespType", "RESULT".to_string()));
    Ok(params)
}

/// USD-M futures call a stop-limit order `STOP`
fn wire_order_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::StopLimit => "STOP",
    }
}

/// Values are symbols, enum names and decimals, none of which need escaping
fn encode_params(params: &[(&'static str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn map_order_status(raw: &str) -> Result<OrderStatus, GatewayError> {
    match raw {
        "NEW" | "PARTIALLY_FILLED" => Ok(OrderStatus::New),
        "FILLED" => Ok(OrderStatus::Filled),
        "CANCELED" | "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Canceled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        other => Err(GatewayError::Rejected(format!(
            "unrecognised order status '{}'",
            other
        ))),
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Transient(err.to_string())
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(classify_api_error(status, &body));
    }

    // A 2xx we cannot read may still have placed an order; retrying could duplicate it
    serde_json::from_str(&body).map_err(|e| {
        GatewayError::Rejected(format!("unreadable response ({}): {}", e, body))
    })
}

fn classify_api_error(status: StatusCode, body: &str) -> GatewayError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let detail = match &parsed {
        Some(err) => format!("{} (code {}): {}", status, err.code, err.msg),
        None => format!("{}: {}", status, body),
    };

    let transient_status = status == StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == 418
        || status.is_server_error();
    let code = parsed.as_ref().map(|err| err.code);

    if transient_status || code.is_some_and(|c| TRANSIENT_CODES.contains(&c)) {
        GatewayError::Transient(detail)
    } else if code.is_some_and(|c| NOT_FOUND_CODES.contains(&c)) {
        GatewayError::NotFound(detail)
    } else {
        GatewayError::Rejected(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_order_status("NEW").unwrap(), OrderStatus::New);
        assert_eq!(map_order_status("PARTIALLY_FILLED").unwrap(), OrderStatus::New);
        assert_eq!(map_order_status("FILLED").unwrap(), OrderStatus::Filled);
        assert_eq!(map_order_status("EXPIRED").unwrap(), OrderStatus::Canceled);
        assert_eq!(map_order_status("REJECTED").unwrap(), OrderStatus::Rejected);
        assert!(map_order_status("PENDING_NEW").is_err());
    }

    #[test]
    fn test_error_classification() {
        let rate_limited = classify_api_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"code":-1003,"msg":"Too many requests."}"#,
        );
        assert!(rate_limited.is_transient());

        let overloaded = classify_api_error(StatusCode::SERVICE_UNAVAILABLE, "<html>busy</html>");
        assert!(overloaded.is_transient());

        let timeout = classify_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":-1007,"msg":"Timeout waiting for response from backend server."}"#,
        );
        assert!(timeout.is_transient());

        let missing = classify_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":-2013,"msg":"Order does not exist."}"#,
        );
        assert!(matches!(missing, GatewayError::NotFound(_)));

        let margin = classify_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":-2019,"msg":"Margin is insufficient."}"#,
        );
        assert!(matches!(margin, GatewayError::Rejected(ref msg) if msg.contains("-2019")));
    }

    #[test]
    fn test_limit_order_params() {
        let ticket = OrderTicket::limit(
            Symbol::new("BTCUSDT"),
            Side::Buy,
            Money::new(dec!(0.0010)),
            Money::new(dec!(24666.670)),
        );
        let query = encode_params(&order_params(&ticket).unwrap());
        assert_eq!(
            query,
            "symbol=BTCUSDT&side=BUY&type=LIMIT&quantity=0.001&price=24666.67\
             &timeInForce=GTC&newOrderRespType=RESULT"
        );
    }

    #[test]
    fn test_market_order_params_have_no_price() {
        let ticket = OrderTicket::market(Symbol::new("ETHUSDT"), Side::Sell, Money::new(dec!(0.5)));
        let query = encode_params(&order_params(&ticket).unwrap());
        assert_eq!(
            query,
            "symbol=ETHUSDT&side=SELL&type=MARKET&quantity=0.5&newOrderRespType=RESULT"
        );
    }

    #[test]
    fn test_stop_limit_order_params() {
        let ticket = OrderTicket::stop_limit(
            Symbol::new("BTCUSDT"),
            Side::Sell,
            Money::new(dec!(0.002)),
            Money::new(dec!(24900.00)),
            Money::new(dec!(25000)),
        );
        let query = encode_params(&order_params(&ticket).unwrap());
        assert_eq!(
            query,
            "symbol=BTCUSDT&side=SELL&type=STOP&quantity=0.002&price=24900\
             &stopPrice=25000&workingType=CONTRACT_PRICE&timeInForce=GTC&newOrderRespType=RESULT"
        );

        let mut untriggerable = ticket.clone();
        untriggerable.stop_price = None;
        assert!(matches!(order_params(&untriggerable), Err(GatewayError::Rejected(_))));
    }

    #[test]
    fn test_open_orders_listing() {
        let listed: Vec<ListedOrder> = serde_json::from_str(
            r#"[
                {"orderId":101,"symbol":"BTCUSDT","side":"BUY","type":"LIMIT","status":"NEW",
                 "origQty":"0.001","executedQty":"0","price":"24000","stopPrice":"0",
                 "timeInForce":"GTC","avgPrice":"0.00000"},
                {"orderId":102,"symbol":"BTCUSDT","side":"SELL","type":"STOP","status":"NEW",
                 "origQty":"0.002","executedQty":"0","price":"24900","stopPrice":"25000",
                 "timeInForce":"GTC","avgPrice":"0.00000"}
            ]"#,
        )
        .unwrap();
        let orders: Vec<OpenOrder> = listed
            .into_iter()
            .map(ListedOrder::into_open_order)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(orders[0].order_id, 101);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].price, Some(Money::new(dec!(24000))));
        assert_eq!(orders[0].stop_price, None);
        assert_eq!(orders[1].order_type, "STOP");
        assert_eq!(orders[1].stop_price, Some(Money::new(dec!(25000))));
        assert_eq!(orders[1].quantity, Money::new(dec!(0.002)));
        assert_eq!(orders[1].status, OrderStatus::New);
    }

    #[test]
    fn test_limit_without_price_is_rejected() {
        let mut ticket =
            OrderTicket::limit(Symbol::new("BTCUSDT"), Side::Buy, Money::ONE, Money::ONE);
        ticket.price = None;
        assert!(matches!(order_params(&ticket), Err(GatewayError::Rejected(_))));
    }

    #[test]
    fn test_ack_ignores_zero_avg_price() {
        let resting: FuturesOrder = serde_json::from_str(
            r#"{"orderId":22542179,"status":"NEW","avgPrice":"0.00000","executedQty":"0"}"#,
        )
        .unwrap();
        let ack = resting.into_ack().unwrap();
        assert_eq!(ack.order_id, 22542179);
        assert_eq!(ack.avg_price, None);

        let filled: FuturesOrder = serde_json::from_str(
            r#"{"orderId":7,"status":"FILLED","avgPrice":"25010.10","executedQty":"0.001"}"#,
        )
        .unwrap();
        let ack = filled.into_ack().unwrap();
        assert_eq!(ack.status, OrderStatus::Filled);
        assert_eq!(ack.avg_price, Some(Money::new(dec!(25010.10))));
    }
}
