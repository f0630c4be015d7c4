//! Order use cases outside the notification flow.

use std::sync::Arc;

use common::AggregateId;
use domain::{Aggregate, CustomerId, Order, OrderItem, OrderSnapshot};
use event_store::{EventEnvelope, Version};
use projections::{OrderProjection, OrderState};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SagaError};
use crate::integration::{DefaultIntegrationEventMapper, IntegrationEventMapper};
use crate::persistence::persist_order;
use crate::ports::{EventRepository, OrderRepository, TransactionManager, UnitOfWork};

/// Creates, reads and completes orders.
pub struct OrderService<T: TransactionManager> {
    transactions: T,
    mapper: Arc<dyn IntegrationEventMapper>,
    clock: Arc<dyn Clock>,
}

impl<T: TransactionManager> OrderService<T> {
    pub fn new(
        transactions: T,
        mapper: Arc<dyn IntegrationEventMapper>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transactions,
            mapper,
            clock,
        }
    }

    pub fn with_defaults(transactions: T) -> Self {
        Self::new(
            transactions,
            Arc::new(DefaultIntegrationEventMapper),
            Arc::new(SystemClock),
        )
    }

    /// Places an order: snapshot, `ORDER_CREATED` at version 1 and its
    /// outbox entry, in one unit of work.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        correlation_id: Option<&str>,
    ) -> Result<OrderSnapshot> {
        let mut order = Order::create_at(customer_id, items, self.clock.now())?;

        let mut uow = self.transactions.begin().await?;
        OrderRepository::save(&mut uow, &order).await?;
        persist_order(
            &mut uow,
            &mut order,
            Version::initial(),
            correlation_id,
            self.mapper.as_ref(),
            self.clock.now(),
        )
        .await?;
        uow.commit().await?;

        tracing::info!(order_id = %order.id(), total = %order.total_amount(), "order created");
        Ok(order.snapshot())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<OrderSnapshot> {
        let mut uow = self.transactions.begin().await?;
        let order = uow
            .find_by_id(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;
        Ok(order.snapshot())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order_events(&self, order_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let mut uow = self.transactions.begin().await?;
        let events = uow.get_by_aggregate_id(order_id).await?;
        if events.is_empty() {
            return Err(SagaError::OrderNotFound(order_id));
        }
        Ok(events)
    }

    /// Current decision state, folded from the event log.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_state(&self, order_id: AggregateId) -> Result<OrderState> {
        let events = self.get_order_events(order_id).await?;
        OrderProjection::fold(&events)?.ok_or(SagaError::NoStateFound(order_id))
    }

    /// Marks a confirmed order as completed.
    #[tracing::instrument(skip(self))]
    pub async fn complete_order(&self, order_id: AggregateId) -> Result<OrderSnapshot> {
        let mut uow = self.transactions.begin().await?;
        let mut order = uow
            .find_by_id(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;
        let expected = uow
            .get_last_event(order_id)
            .await?
            .map(|event| event.version)
            .ok_or(SagaError::NoStateFound(order_id))?;

        order.complete()?;
        persist_order(
            &mut uow,
            &mut order,
            expected,
            None,
            self.mapper.as_ref(),
            self.clock.now(),
        )
        .await?;
        uow.commit().await?;

        tracing::info!(%order_id, "order completed");
        Ok(order.snapshot())
    }
}
