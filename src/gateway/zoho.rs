use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{decimal_from_json, GatewayError, PaymentGateway, PaymentLink, PaymentVerification};
use super::token::{TokenCache, DEFAULT_TOKEN_VALIDITY};
use crate::config::{Environment, GatewayConfig, GatewayCredentials};
use crate::domain::value_objects::MOCK_PAYMENT_PREFIX;
use crate::domain::{Order, PaymentChannel};

const ORG_HEADER: &str = "X-com-zoho-payment-organizationid";
const CLIENT_CREDENTIALS_SCOPE: &str = "ZohoPayments.fullaccess.ALL";
const DESCRIPTION_LIMIT: usize = 200;
const CURRENCY: &str = "INR";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct LinkResponse {
    payment_link: Option<String>,
    payment_link_id: Option<String>,
}

#[derive(Deserialize)]
struct PaymentBody {
    status: Option<String>,
    #[serde(default)]
    amount: Value,
    payment_mode: Option<String>,
    reference_number: Option<String>,
    payment_link_id: Option<String>,
}

#[derive(Deserialize)]
struct LinkBody {
    status: Option<String>,
    #[serde(default)]
    amount: Value,
    #[serde(default)]
    amount_paid: Value,
    reference_id: Option<String>,
    payment_link_id: Option<String>,
}

fn transport(context: &str, error: reqwest::Error) -> GatewayError {
    GatewayError::Transport { context: context.to_string(), source: error.without_url() }
}

fn invalid(context: &str, message: impl Into<String>) -> GatewayError {
    GatewayError::InvalidResponse { context: context.to_string(), message: message.into() }
}

fn ensure_success(response: Response, context: &str) -> Result<Response, GatewayError> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(GatewayError::Unauthorized { context: context.to_string() }),
        status if !status.is_success() => Err(GatewayError::Status { context: context.to_string(), status: status.as_u16() }),
        _ => Ok(response),
    }
}

/// Hosted payment-link gateway client.
///
/// Without usable credentials, development runs get deterministic mock
/// links and skip re-verification; production runs fail instead.
pub struct ZohoGateway {
    http: reqwest::Client,
    config: GatewayConfig,
    credentials: Option<GatewayCredentials>,
    environment: Environment,
    tokens: TokenCache,
}

impl ZohoGateway {
    pub fn new(config: GatewayConfig, environment: Environment) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| transport("building http client", e))?;
        let credentials = config.credentials();
        if credentials.is_none() {
            warn!(production = environment.is_production(), "Payment gateway credentials not configured");
        }
        Ok(Self { http, config, credentials, environment, tokens: TokenCache::new() })
    }

    /// Endpoint under the API base. Segments are percent-encoded, so an id
    /// can never step outside its resource.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let unusable = || GatewayError::NotConfigured(format!("unusable gateway API url {}", self.config.api_url));
        let mut url = Url::parse(&self.config.api_url).map_err(|_| unusable())?;
        url.path_segments_mut().map_err(|_| unusable())?.pop_if_empty().extend(segments);
        Ok(url)
    }

    async fn fetch(&self, credentials: &GatewayCredentials, context: &str, url: Url) -> Result<Value, GatewayError> {
        let response = self
            .send_authorized(credentials, context, |token| self.authorize(self.http.get(url.clone()), token))
            .await?;
        response.json().await.map_err(|e| transport(context, e))
    }

    /// Credentials for a live call, or `None` when the mock path applies.
    fn live_credentials(&self, action: &str) -> Result<Option<&GatewayCredentials>, GatewayError> {
        match (&self.credentials, self.environment.is_production()) {
            (Some(credentials), _) => Ok(Some(credentials)),
            (None, true) => Err(GatewayError::NotConfigured(format!("cannot {action} in production"))),
            (None, false) => Ok(None),
        }
    }

    async fn access_token(&self, credentials: &GatewayCredentials) -> Result<String, GatewayError> {
        match self.tokens.current().await {
            Some(token) => Ok(token),
            None => self.fetch_token(credentials).await,
        }
    }

    async fn fetch_token(&self, credentials: &GatewayCredentials) -> Result<String, GatewayError> {
        let context = "refreshing access token";
        let mut form = vec![
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ];
        let grant = match credentials.refresh_token.as_deref() {
            Some(refresh_token) => {
                form.push(("refresh_token", refresh_token));
                "refresh_token"
            }
            None => {
                form.push(("scope", CLIENT_CREDENTIALS_SCOPE));
                "client_credentials"
            }
        };
        form.push(("grant_type", grant));
        debug!(grant, "Requesting gateway access token");

        let url = format!("{}/oauth/v2/token", self.config.accounts_url.trim_end_matches('/'));
        let response = self.http.post(url).form(&form).send().await.map_err(|e| transport(context, e))?;
        let response = ensure_success(response, context)?;
        let body: TokenResponse = response.json().await.map_err(|e| transport(context, e))?;

        let token = match (body.access_token, body.error) {
            (Some(token), _) if !token.is_empty() => token,
            (_, Some(error)) => return Err(invalid(context, error)),
            _ => return Err(invalid(context, "no access_token in response")),
        };
        let valid_for = body.expires_in.map(Duration::from_secs).unwrap_or(DEFAULT_TOKEN_VALIDITY);
        self.tokens.store(token.clone(), valid_for).await;
        info!(grant, expires_in = valid_for.as_secs(), "Gateway access token refreshed");
        Ok(token)
    }

    fn authorize(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        let request = request.header(AUTHORIZATION, format!("Zoho-oauthtoken {token}"));
        match self.config.organization() {
            Some(org) => request.header(ORG_HEADER, org),
            None => request,
        }
    }

    /// Sends with the cached token. A 401 drops the token and the request is
    /// retried once with a fresh one.
    async fn send_authorized<F>(&self, credentials: &GatewayCredentials, context: &str, build: F) -> Result<Response, GatewayError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token(credentials).await?;
        let response = build(&token).send().await.map_err(|e| transport(context, e))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return ensure_success(response, context);
        }

        warn!(context, "Gateway rejected access token, retrying with a fresh one");
        self.tokens.invalidate().await;
        let token = self.fetch_token(credentials).await?;
        let response = build(&token).send().await.map_err(|e| transport(context, e))?;
        ensure_success(response, context)
    }

    fn mock_link(&self, order: &Order) -> PaymentLink {
        let order_id = order.order_id.as_str();
        PaymentLink {
            payment_link: format!(
                "{}/order-success?id={order_id}&mock_payment=true",
                self.config.website_url.trim_end_matches('/')
            ),
            transaction_id: format!("{MOCK_PAYMENT_PREFIX}{order_id}"),
            raw: json!({ "mock": true }),
        }
    }
}

/// Request body for a hosted payment link.
pub fn payment_link_payload(order: &Order, config: &GatewayConfig) -> Value {
    let booking = &order.booking_details;
    let description: String = format!(
        "Order #{} - {} {} - {}",
        order.order_id,
        booking.date,
        booking.time,
        order.address.as_deref().unwrap_or_default()
    )
    .chars()
    .take(DESCRIPTION_LIMIT)
    .collect();
    let owner = order.owner.as_ref();
    let website = config.website_url.trim_end_matches('/');

    json!({
        "reference_id": order.order_id,
        "amount": order.total_amount,
        "currency_code": CURRENCY,
        "description": description,
        "customer": {
            "name": owner.map(|o| o.full_name()).unwrap_or_else(|| "Customer".to_string()),
            "email": owner.map(|o| o.email.as_str()),
            "phone": owner.and_then(|o| o.phone.as_deref()),
        },
        "return_url": format!("{website}/order-success?id={}", order.order_id),
        "notify_url": format!("{}/api/orders/payment/verify", config.backend_url.trim_end_matches('/')),
        "payment_methods": { "upi": true, "card": true, "netbanking": true, "wallet": true, "emi": true },
    })
}

#[async_trait]
impl PaymentGateway for ZohoGateway {
    async fn create_payment_link(&self, order: &Order) -> Result<PaymentLink, GatewayError> {
        let Some(credentials) = self.live_credentials("create payment links")? else {
            warn!(order_id = %order.order_id, "[DEV] Returning mock payment link");
            return Ok(self.mock_link(order));
        };

        let context = format!("creating payment link for order {}", order.order_id);
        let payload = payment_link_payload(order, &self.config);
        let url = self.endpoint(&["payment_links"])?;
        let response = self
            .send_authorized(credentials, &context, |token| self.authorize(self.http.post(url.clone()), token).json(&payload))
            .await?;

        let raw: Value = response.json().await.map_err(|e| transport(&context, e))?;
        let parsed: LinkResponse = serde_json::from_value(raw.clone()).map_err(|e| invalid(&context, e.to_string()))?;
        let payment_link = parsed.payment_link.ok_or_else(|| invalid(&context, "response carried no payment_link"))?;
        let transaction_id = parsed.payment_link_id.unwrap_or_else(|| order.order_id.to_string());

        info!(order_id = %order.order_id, transaction_id, "Payment link created");
        Ok(PaymentLink { payment_link, transaction_id, raw })
    }

    async fn verify_payment(&self, payment_id: &str) -> Result<PaymentVerification, GatewayError> {
        let Some(credentials) = self.live_credentials("verify payments")? else {
            debug!(payment_id, "[DEV] Skipping gateway re-verification");
            return Ok(PaymentVerification::unverified());
        };

        let context = format!("verifying payment {payment_id}");
        let raw = self.fetch(credentials, &context, self.endpoint(&["payments", payment_id])?).await?;

        let Some(payment) = raw.get("payment").cloned() else {
            warn!(payment_id, "Gateway response carried no payment object");
            return Ok(PaymentVerification { raw, ..PaymentVerification::unverified() });
        };
        let payment: PaymentBody = serde_json::from_value(payment).map_err(|e| invalid(&context, e.to_string()))?;

        Ok(PaymentVerification {
            status: payment.status.unwrap_or_else(|| "unknown".to_string()),
            amount_paid: decimal_from_json(&payment.amount),
            channel: payment.payment_mode.as_deref().and_then(PaymentChannel::parse),
            reference: payment.reference_number,
            link_id: payment.payment_link_id,
            verified: true,
            raw,
        })
    }

    async fn verify_payment_link(&self, link_id: &str) -> Result<PaymentVerification, GatewayError> {
        let Some(credentials) = self.live_credentials("verify payment links")? else {
            debug!(link_id, "[DEV] Skipping gateway re-verification");
            return Ok(PaymentVerification::unverified());
        };

        let context = format!("verifying payment link {link_id}");
        let raw = self.fetch(credentials, &context, self.endpoint(&["payment_links", link_id])?).await?;

        let Some(link) = raw.get("payment_links").cloned() else {
            warn!(link_id, "Gateway response carried no payment link object");
            return Ok(PaymentVerification { raw, ..PaymentVerification::unverified() });
        };
        let link: LinkBody = serde_json::from_value(link).map_err(|e| invalid(&context, e.to_string()))?;

        Ok(PaymentVerification {
            status: link.status.unwrap_or_else(|| "unknown".to_string()),
            amount_paid: decimal_from_json(&link.amount_paid).or_else(|| decimal_from_json(&link.amount)),
            channel: None,
            reference: link.reference_id,
            link_id: link.payment_link_id.or_else(|| Some(link_id.to_string())),
            verified: true,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{EntityRef, OrderId, Period};
    use crate::domain::{BookingDetails, NewOrder, Owner};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn order(address: &str) -> Order {
        let mut order = Order::place(
            OrderId::mint("WTF", Period::of(Utc::now()), 7),
            None,
            NewOrder {
                entity: EntityRef::Occasion("wedding".into()),
                items: vec![],
                booking_details: BookingDetails { date: "2025-12-01".into(), time: "19:00".into(), veg_guests: 40, non_veg_guests: 10 },
                total_amount: Decimal::new(45050, 2),
                payment_method: None,
                address: address.into(),
                notes: None,
            },
        );
        order.owner = Some(Owner {
            id: Uuid::new_v4(),
            first_name: "Asha".into(),
            last_name: Some("Rao".into()),
            email: "asha@example.com".into(),
            phone: None,
        });
        order
    }

    fn unconfigured() -> GatewayConfig {
        GatewayConfig::unconfigured("http://127.0.0.1:9/api/v1", "http://127.0.0.1:9")
    }

    #[test]
    fn test_payload_fields() {
        let order = order("12 Main Street");
        let payload = payment_link_payload(&order, &unconfigured());
        assert_eq!(payload["reference_id"], order.order_id.as_str());
        assert_eq!(payload["currency_code"], "INR");
        assert_eq!(payload["amount"], 450.5);
        assert_eq!(payload["customer"]["name"], "Asha Rao");
        assert!(payload["notify_url"].as_str().unwrap().ends_with("/api/orders/payment/verify"));
    }

    #[test]
    fn test_payload_description_format() {
        let order = order("12 Main Street");
        let payload = payment_link_payload(&order, &unconfigured());
        assert_eq!(payload["description"], format!("Order #{} - 2025-12-01 19:00 - 12 Main Street", order.order_id));
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let gateway = ZohoGateway::new(unconfigured(), Environment::Development).unwrap();
        let url = gateway.endpoint(&["payments", "../payment_links/x"]).unwrap();
        assert_eq!(url.path(), "/api/v1/payments/..%2Fpayment_links%2Fx");

        let mut config = unconfigured();
        config.api_url = "http://127.0.0.1:9/api/v1/".into();
        let gateway = ZohoGateway::new(config, Environment::Development).unwrap();
        assert_eq!(gateway.endpoint(&["payments", "pay_1"]).unwrap().path(), "/api/v1/payments/pay_1");
    }

    #[test]
    fn test_payload_description_truncated() {
        let order = order(&"x".repeat(400));
        let payload = payment_link_payload(&order, &unconfigured());
        assert_eq!(payload["description"].as_str().unwrap().chars().count(), DESCRIPTION_LIMIT);
    }

    #[tokio::test]
    async fn test_development_without_credentials_mocks() {
        let gateway = ZohoGateway::new(unconfigured(), Environment::Development).unwrap();
        let order = order("12 Main Street");

        let link = gateway.create_payment_link(&order).await.unwrap();
        assert_eq!(link.transaction_id, format!("MOCK-{}", order.order_id));
        assert!(link.payment_link.ends_with(&format!("order-success?id={}&mock_payment=true", order.order_id)));

        let verification = gateway.verify_payment("pay_1").await.unwrap();
        assert!(!verification.verified);
        assert!(!verification.confirms_payment());
        assert!(!gateway.verify_payment_link(&link.transaction_id).await.unwrap().verified);
    }

    #[tokio::test]
    async fn test_production_without_credentials_fails() {
        let gateway = ZohoGateway::new(unconfigured(), Environment::Production).unwrap();
        let err = gateway.create_payment_link(&order("12 Main Street")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured(_)));
        assert!(matches!(gateway.verify_payment("pay_1").await, Err(GatewayError::NotConfigured(_))));
        assert!(matches!(gateway.verify_payment_link("link_1").await, Err(GatewayError::NotConfigured(_))));
    }
}
