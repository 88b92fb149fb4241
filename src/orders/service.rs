use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::payload::{CreateOrderRequest, PaymentLinkResponse, VerifyPaymentCommand};
use crate::config::Environment;
use crate::domain::value_objects::is_mock_payment;
use crate::domain::{GatewayStatus, Order, OrderEvent, PaymentOutcome, PaymentSettlement, StatusUpdate};
use crate::gateway::{check_signature, PaymentGateway, SignatureCheck};
use crate::pagination::PageRequest;
use crate::sequence::OrderIdGenerator;
use crate::store::{OrderFilter, OrderPage, OrderSortField, OrderStore};
use crate::{CateringError, Result};

/// How a verification request ended.
#[derive(Debug)]
pub enum VerifyOutcome {
    Confirmed(Order),
    AlreadyPaid,
    Failed(Order),
    /// Intermediate gateway state, stored without a transition.
    Recorded(Order),
}

impl VerifyOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Confirmed(_) => "Payment verified successfully",
            Self::AlreadyPaid => "Payment already verified",
            Self::Failed(_) => "Payment failed",
            Self::Recorded(_) => "Payment status recorded",
        }
    }
}

/// Order lifecycle operations over the store and the payment gateway.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    ids: OrderIdGenerator,
    gateway: Arc<dyn PaymentGateway>,
    environment: Environment,
    webhook_secret: Option<String>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        ids: OrderIdGenerator,
        gateway: Arc<dyn PaymentGateway>,
        environment: Environment,
        webhook_secret: Option<String>,
    ) -> Self {
        Self { store, ids, gateway, environment, webhook_secret }
    }

    pub async fn create(&self, user_id: Uuid, request: CreateOrderRequest) -> Result<Order> {
        let new = request.into_new_order()?;
        let order_id = self.ids.next().await?;
        let order = Order::place(order_id, Some(user_id), new);
        self.store.insert(&order).await?;

        OrderEvent::Placed { order_id: order.order_id.to_string(), user_id: order.user_id, total: order.total_amount }.record();
        Ok(order)
    }

    pub async fn get(&self, order_id: &str) -> Result<Order> {
        self.store
            .find(order_id, true)
            .await?
            .ok_or_else(|| CateringError::order_not_found(order_id))
    }

    pub async fn list(&self, filter: &OrderFilter, request: &PageRequest<OrderSortField>) -> Result<OrderPage> {
        self.store.list(filter, request).await
    }

    pub async fn list_for_owner(&self, user_id: Uuid, request: &PageRequest<OrderSortField>) -> Result<OrderPage> {
        self.store.list(&OrderFilter::for_owner(user_id), request).await
    }

    pub async fn update_status(&self, order_id: &str, update: &StatusUpdate) -> Result<Order> {
        if update.is_empty() {
            return Err(CateringError::invalid("status", "Provide status or paymentStatus"));
        }
        let order = self
            .store
            .update_status(order_id, update)
            .await?
            .ok_or_else(|| CateringError::order_not_found(order_id))?;

        OrderEvent::StatusChanged {
            order_id: order.order_id.to_string(),
            status: order.status,
            payment_status: order.payment_status,
        }
        .record();
        Ok(order)
    }

    pub async fn initiate_payment(&self, order_id: &str) -> Result<PaymentLinkResponse> {
        let order = self.get(order_id).await?;
        if order.is_paid() {
            return Err(CateringError::PaymentAlreadyCompleted(order_id.to_string()));
        }

        let link = self.gateway.create_payment_link(&order).await?;
        // a confirmation may have landed while the link was being created
        self.store
            .attach_transaction(order_id, &link.transaction_id, &link.raw)
            .await?
            .ok_or_else(|| CateringError::PaymentAlreadyCompleted(order_id.to_string()))?;

        OrderEvent::PaymentInitiated { order_id: order_id.to_string(), transaction_id: link.transaction_id.clone() }.record();
        Ok(PaymentLinkResponse { payment_link: link.payment_link, transaction_id: link.transaction_id })
    }

    /// Handles a payment confirmation from the gateway webhook or the client.
    ///
    /// `body` is the raw request body; the signature is computed over it
    /// byte for byte.
    pub async fn verify_payment(&self, body: &[u8], signature: Option<&str>) -> Result<VerifyOutcome> {
        let command = VerifyPaymentCommand::from_body(body)?;
        let order = self
            .store
            .find(&command.order_id, false)
            .await?
            .ok_or_else(|| CateringError::order_not_found(&command.order_id))?;

        if command.payment_id.as_deref().is_some_and(is_mock_payment) {
            return self.confirm_mock(&command).await;
        }

        match check_signature(self.webhook_secret.as_deref(), signature, body) {
            SignatureCheck::Verified => {}
            SignatureCheck::Skipped(reason) => warn!(order_id = %command.order_id, reason, "Webhook signature not verified"),
            SignatureCheck::Mismatch => {
                warn!(order_id = %command.order_id, "Webhook signature mismatch");
                return Err(CateringError::Unauthorized("Invalid webhook signature".into()));
            }
        }

        if order.is_paid() {
            info!(order_id = %command.order_id, "Payment already verified");
            return Ok(VerifyOutcome::AlreadyPaid);
        }

        let settlement = self.resolve(&order, &command).await?;
        self.settle(&command.order_id, settlement).await
    }

    async fn confirm_mock(&self, command: &VerifyPaymentCommand) -> Result<VerifyOutcome> {
        if self.environment.is_production() {
            warn!(order_id = %command.order_id, payment_id = ?command.payment_id, "Rejected mock payment in production");
            return Err(CateringError::MockPaymentRejected);
        }
        warn!(order_id = %command.order_id, "[DEV] Auto-confirming mock payment");
        let settlement = PaymentSettlement {
            outcome: PaymentOutcome::Paid { channel: command.channel },
            payment_id: command.payment_id.clone(),
            gateway_response: Some(command.raw.clone()),
        };
        self.settle(&command.order_id, settlement).await
    }

    /// Decides the settlement, asking the gateway when the order has a
    /// transaction. The gateway overrides the claim only with a payment that
    /// belongs to this order and covers its total. Any other answer, when either
    /// side says success, is recorded without a transition.
    async fn resolve(&self, order: &Order, command: &VerifyPaymentCommand) -> Result<PaymentSettlement> {
        let claimed = GatewayStatus::classify(&command.claimed_status);
        let claim = PaymentSettlement {
            outcome: claimed_outcome(claimed, command),
            payment_id: command.payment_id.clone(),
            gateway_response: Some(command.raw.clone()),
        };
        let Some(transaction_id) = order.transaction_id.as_deref() else {
            return Ok(claim);
        };

        let verification = match command.payment_id.as_deref() {
            Some(payment_id) => self.gateway.verify_payment(payment_id).await,
            None => self.gateway.verify_payment_link(transaction_id).await,
        };
        match verification {
            Ok(verification) if verification.settles(order) => Ok(PaymentSettlement {
                outcome: PaymentOutcome::Paid { channel: verification.channel.or(command.channel) },
                payment_id: command.payment_id.clone(),
                gateway_response: Some(verification.raw),
            }),
            Ok(verification) if verification.verified && (claimed == GatewayStatus::Succeeded || verification.confirms_payment()) => {
                warn!(
                    order_id = %command.order_id,
                    gateway_status = %verification.status,
                    amount_paid = ?verification.amount_paid,
                    reference = ?verification.reference,
                    "Gateway did not confirm payment for this order"
                );
                Ok(PaymentSettlement {
                    outcome: PaymentOutcome::Recorded { status: verification.status },
                    payment_id: command.payment_id.clone(),
                    gateway_response: Some(verification.raw),
                })
            }
            Ok(_) => Ok(claim),
            Err(error) if claimed == GatewayStatus::Succeeded => Err(error.into()),
            Err(error) => {
                warn!(order_id = %command.order_id, error = %error, "Gateway re-verification failed, keeping reported status");
                Ok(claim)
            }
        }
    }

    async fn settle(&self, order_id: &str, settlement: PaymentSettlement) -> Result<VerifyOutcome> {
        let Some(order) = self.store.settle_payment(order_id, &settlement).await? else {
            info!(order_id, "Payment already verified");
            return Ok(VerifyOutcome::AlreadyPaid);
        };

        let order_id = order.order_id.to_string();
        let payment_id = settlement.payment_id.clone();
        let (event, outcome) = match settlement.outcome {
            PaymentOutcome::Paid { channel } => {
                let mock = payment_id.as_deref().is_some_and(is_mock_payment);
                (OrderEvent::PaymentConfirmed { order_id, payment_id, channel, mock }, VerifyOutcome::Confirmed(order))
            }
            PaymentOutcome::Failed => (OrderEvent::PaymentFailed { order_id, payment_id }, VerifyOutcome::Failed(order)),
            PaymentOutcome::Recorded { status } => {
                (OrderEvent::PaymentRecorded { order_id, gateway_status: status }, VerifyOutcome::Recorded(order))
            }
        };
        event.record();
        Ok(outcome)
    }
}

fn claimed_outcome(claimed: GatewayStatus, command: &VerifyPaymentCommand) -> PaymentOutcome {
    match claimed {
        GatewayStatus::Succeeded => PaymentOutcome::Paid { channel: command.channel },
        GatewayStatus::Failed => PaymentOutcome::Failed,
        GatewayStatus::Other => PaymentOutcome::Recorded { status: command.claimed_status.clone() },
    }
}
