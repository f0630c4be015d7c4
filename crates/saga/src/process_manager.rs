//! Order process manager: reacts to collaborator notifications and drives
//! each order to confirmation or compensation.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::Duration;
use common::AggregateId;
use domain::{
    Aggregate, CancellationReason, InventoryStatus, Order, OrderError, OrderStatus, PaymentStatus,
    RollbackStatus,
};
use projections::{OrderProjection, OrderState};
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};
use crate::completion::{Completion, evaluate_completion};
use crate::error::{Result, SagaError};
use crate::integration::{
    CollaboratorEvent, DefaultIntegrationEventMapper, IncomingIntegrationEvent,
    IntegrationEventMapper,
};
use crate::persistence::persist_order;
use crate::ports::{EventRepository, OrderRepository, TransactionManager, UnitOfWork};

/// Runtime knobs of the process manager.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// How long a side may stay pending, measured from order creation.
    pub pending_timeout: Duration,
    /// Orders examined per idle sweep.
    pub sweep_batch_size: usize,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::seconds(60),
            sweep_batch_size: 100,
        }
    }
}

/// What happened to the order while handling one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleOutcome {
    pub order_id: AggregateId,
    pub status: OrderStatus,
    /// A pending side was forced to failure by the timeout policy.
    pub timed_out: bool,
}

/// The domain mutation a unit of work starts from.
#[derive(Debug, Clone, Copy)]
enum Step {
    InventoryReserved,
    InventoryFailed(CancellationReason),
    PaymentDeducted,
    PaymentFailed(CancellationReason),
    InventoryRolledBack,
    PaymentRolledBack,
    /// Idle sweep: no new outcome, only the timeout policy.
    TimeoutCheck,
}

/// Saga orchestrator for order fulfillment.
///
/// Every step runs in its own unit of work: lock the order, fold its
/// history, apply the step, evaluate completion, persist. Two notifications
/// for the same order serialize on the order lock and the log version.
pub struct OrderProcessManager<T: TransactionManager> {
    transactions: T,
    mapper: Arc<dyn IntegrationEventMapper>,
    clock: Arc<dyn Clock>,
    config: SagaConfig,
}

impl<T: TransactionManager> OrderProcessManager<T> {
    pub fn new(
        transactions: T,
        mapper: Arc<dyn IntegrationEventMapper>,
        clock: Arc<dyn Clock>,
        config: SagaConfig,
    ) -> Self {
        Self {
            transactions,
            mapper,
            clock,
            config,
        }
    }

    /// Default mapper, system clock, reference timeouts.
    pub fn with_defaults(transactions: T) -> Self {
        Self::new(
            transactions,
            Arc::new(DefaultIntegrationEventMapper),
            Arc::new(SystemClock),
            SagaConfig::default(),
        )
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Dispatches a collaborator notification to its handler.
    #[tracing::instrument(
        skip(self, notification),
        fields(event_type = %notification.event_type, correlation_id = ?notification.correlation_id)
    )]
    pub async fn handle(&self, notification: &IncomingIntegrationEvent) -> Result<HandleOutcome> {
        let kind = CollaboratorEvent::from_event_type(&notification.event_type)
            .ok_or_else(|| SagaError::UnsupportedEvent(notification.event_type.clone()))?;
        let order_id = notification.order_id()?;
        let correlation_id = notification.correlation_id.as_deref();
        let reason = || CancellationReason::from_collaborator(notification.reason());

        let started = Instant::now();
        let result = match kind {
            CollaboratorEvent::InventoryReservationCompleted => {
                self.handle_inventory_reservation_completed(order_id, correlation_id)
                    .await
            }
            CollaboratorEvent::InventoryReservationFailed => {
                self.handle_inventory_reservation_failed(order_id, reason(), correlation_id)
                    .await
            }
            CollaboratorEvent::PaymentDeductionCompleted => {
                self.handle_payment_deduction_completed(order_id, correlation_id)
                    .await
            }
            CollaboratorEvent::PaymentDeductionFailed => {
                self.handle_payment_deduction_failed(order_id, reason(), correlation_id)
                    .await
            }
            CollaboratorEvent::InventoryRollbackCompleted => {
                self.handle_inventory_rollback_completed(order_id, correlation_id)
                    .await
            }
            CollaboratorEvent::PaymentRollbackCompleted => {
                self.handle_payment_rollback_completed(order_id, correlation_id)
                    .await
            }
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind().as_str(),
        };
        metrics::counter!(
            "saga_events_handled_total",
            "event_type" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("saga_event_duration_seconds").record(started.elapsed().as_secs_f64());

        if let Err(err) = &result {
            tracing::warn!(
                %order_id,
                error = %err,
                retryable = err.is_retryable(),
                "notification handling failed"
            );
        }
        result
    }

    pub async fn handle_inventory_reservation_completed(
        &self,
        order_id: AggregateId,
        correlation_id: Option<&str>,
    ) -> Result<HandleOutcome> {
        self.process(order_id, correlation_id, Step::InventoryReserved)
            .await
    }

    pub async fn handle_inventory_reservation_failed(
        &self,
        order_id: AggregateId,
        reason: CancellationReason,
        correlation_id: Option<&str>,
    ) -> Result<HandleOutcome> {
        self.process(order_id, correlation_id, Step::InventoryFailed(reason))
            .await
    }

    pub async fn handle_payment_deduction_completed(
        &self,
        order_id: AggregateId,
        correlation_id: Option<&str>,
    ) -> Result<HandleOutcome> {
        self.process(order_id, correlation_id, Step::PaymentDeducted)
            .await
    }

    pub async fn handle_payment_deduction_failed(
        &self,
        order_id: AggregateId,
        reason: CancellationReason,
        correlation_id: Option<&str>,
    ) -> Result<HandleOutcome> {
        self.process(order_id, correlation_id, Step::PaymentFailed(reason))
            .await
    }

    pub async fn handle_inventory_rollback_completed(
        &self,
        order_id: AggregateId,
        correlation_id: Option<&str>,
    ) -> Result<HandleOutcome> {
        self.process(order_id, correlation_id, Step::InventoryRolledBack)
            .await
    }

    pub async fn handle_payment_rollback_completed(
        &self,
        order_id: AggregateId,
        correlation_id: Option<&str>,
    ) -> Result<HandleOutcome> {
        self.process(order_id, correlation_id, Step::PaymentRolledBack)
            .await
    }

    /// Applies the timeout policy to up to `limit` pending orders, oldest first.
    ///
    /// Each order runs in its own unit of work; a failure on one is logged
    /// and the sweep moves on. Returns how many orders timed out.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale_orders(&self, limit: usize) -> Result<usize> {
        let ids = {
            let mut uow = self.transactions.begin().await?;
            uow.find_ids_by_status(OrderStatus::Pending, limit).await?
        };

        let mut expired = 0;
        for order_id in ids {
            match self.process(order_id, None, Step::TimeoutCheck).await {
                Ok(outcome) if outcome.timed_out => expired += 1,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%order_id, error = %err, "timeout sweep failed for order");
                }
            }
        }
        if expired > 0 {
            tracing::info!(expired, "stale orders expired");
        }
        Ok(expired)
    }

    /// Sweeps `sweep_batch_size` orders every `interval` until `shutdown`
    /// turns true or its sender drops.
    pub async fn run_timeout_sweep(&self, interval: StdDuration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.expire_stale_orders(self.config.sweep_batch_size).await {
                        tracing::error!(error = %err, "timeout sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("timeout sweep stopped");
    }

    #[tracing::instrument(skip(self, correlation_id))]
    async fn process(
        &self,
        order_id: AggregateId,
        correlation_id: Option<&str>,
        step: Step,
    ) -> Result<HandleOutcome> {
        let mut uow = self.transactions.begin().await?;

        let mut order = uow
            .find_by_id(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;
        let history = uow.get_by_aggregate_id(order_id).await?;
        let mut state =
            OrderProjection::fold(&history)?.ok_or(SagaError::NoStateFound(order_id))?;
        let expected = state.version;

        apply_step(&mut order, &mut state, step)?;
        let timed_out = self.enforce_timeout(&mut order, &mut state);
        decide(&mut order, &state)?;

        let status = order.status();
        persist_order(
            &mut uow,
            &mut order,
            expected,
            correlation_id,
            self.mapper.as_ref(),
            self.clock.now(),
        )
        .await?;
        uow.commit().await?;

        Ok(HandleOutcome {
            order_id,
            status,
            timed_out,
        })
    }

    /// Forces every side still pending past the window to its failure value.
    fn enforce_timeout(&self, order: &mut Order, state: &mut OrderState) -> bool {
        if order.status() != OrderStatus::Pending
            || !state.is_expired(self.clock.now(), self.config.pending_timeout)
        {
            return false;
        }

        if state.payment.is_pending() {
            order.mark_payment_verification_failed(CancellationReason::Timeout);
            state.set_payment(PaymentStatus::Rejected, Some(CancellationReason::Timeout));
        }
        if state.inventory.is_pending() {
            order.mark_inventory_reservation_failed(CancellationReason::Timeout);
            state.set_inventory(
                InventoryStatus::Unavailable,
                Some(CancellationReason::Timeout),
            );
        }

        metrics::counter!("saga_timeouts_total").increment(1);
        tracing::warn!(order_id = %order.id(), "pending window elapsed, forcing failure");
        true
    }
}

/// Records the step on the aggregate and mirrors it on the folded state.
///
/// Rollback confirmations are only accepted once compensation has started.
fn apply_step(order: &mut Order, state: &mut OrderState, step: Step) -> Result<()> {
    if matches!(step, Step::InventoryRolledBack | Step::PaymentRolledBack)
        && !matches!(
            order.status(),
            OrderStatus::CompensationPending | OrderStatus::Compensated
        )
    {
        return Err(OrderError::InvalidTransition {
            from: order.status(),
            to: OrderStatus::Compensated,
        }
        .into());
    }

    match step {
        Step::InventoryReserved => {
            order.mark_inventory_reservation_completed();
            state.set_inventory(InventoryStatus::Reserved, None);
        }
        Step::InventoryFailed(reason) => {
            order.mark_inventory_reservation_failed(reason);
            state.set_inventory(InventoryStatus::Unavailable, Some(reason));
        }
        Step::PaymentDeducted => {
            order.mark_payment_deduction_completed();
            state.set_payment(PaymentStatus::Approved, None);
        }
        Step::PaymentFailed(reason) => {
            order.mark_payment_verification_failed(reason);
            state.set_payment(PaymentStatus::Rejected, Some(reason));
        }
        Step::InventoryRolledBack => {
            order.mark_inventory_rollback_completed();
            state.inventory_rollback = RollbackStatus::Completed;
        }
        Step::PaymentRolledBack => {
            order.mark_payment_rollback_completed();
            state.payment_rollback = RollbackStatus::Completed;
        }
        Step::TimeoutCheck => {}
    }
    Ok(())
}

/// Moves the order along the status graph according to the folded state.
fn decide(order: &mut Order, state: &OrderState) -> Result<()> {
    match order.status() {
        OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Cancelled => {
            match evaluate_completion(state.payment, state.inventory) {
                Completion::Pending => {}
                Completion::Confirm => {
                    if order.status() == OrderStatus::Pending {
                        order.confirm()?;
                        metrics::counter!("saga_orders_confirmed_total").increment(1);
                        tracing::info!(order_id = %order.id(), "order confirmed");
                    }
                }
                Completion::Cancel => cancel(order, state)?,
            }
        }
        OrderStatus::CompensationPending => {
            if !state.compensation_outstanding() {
                order.complete_compensation()?;
                tracing::info!(order_id = %order.id(), "compensation completed");
            }
        }
        // Late notifications for settled orders are recorded only.
        OrderStatus::Compensated | OrderStatus::Completed => {}
    }
    Ok(())
}

fn cancel(order: &mut Order, state: &OrderState) -> Result<()> {
    for reason in state.failure_reasons() {
        order.add_cancellation_reason(reason);
    }

    let was_cancelled = order.status() == OrderStatus::Cancelled;
    let plan = order.cancel(state.payment, state.inventory)?;

    if !was_cancelled {
        metrics::counter!("saga_orders_cancelled_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            reasons = ?order.cancellation_reasons(),
            "order cancelled"
        );
    }
    if let Some(plan) = plan {
        metrics::counter!("saga_compensations_started_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            refund = plan.requires_refund(),
            inventory_rollback = plan.requires_inventory_rollback(),
            "compensation started"
        );
    }
    Ok(())
}
