//! Reorder workflow service.
//!
//! Transitions are serialized per request id. Fulfillment writes the RESTOCK
//! entry through the ledger first and only then commits FULFILLED, so a
//! failed ledger write leaves the request where it was. A RESTOCK already
//! booked under the request's reference is reused, so retrying after a failed
//! FULFILLED commit never restocks twice.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use stockwise_core::{AggregateId, UserId};
use stockwise_events::EventBus;
use stockwise_inventory::{MovementKind, ProductId, StockMovement};
use stockwise_reorder::{
    Approve, Cancel, CreateReorderRequest, Fulfill, MarkOrdered, Reject, ReorderCommand,
    ReorderEvent, ReorderRequest, ReorderRequestId, ReorderStatus,
};

use crate::command_dispatcher::{CommandDispatcher, DomainMessage, RetryPolicy};
use crate::error::ServiceError;
use crate::ledger_service::{LedgerService, MovementRequest};
use crate::locks::KeyedLocks;
use crate::store::EventStore;

fn make_request(id: AggregateId) -> ReorderRequest {
    ReorderRequest::empty(ReorderRequestId::new(id))
}

fn restock_reference(request_id: ReorderRequestId) -> String {
    format!("REORDER-{request_id}")
}

pub struct ReorderService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    ledger: Arc<LedgerService<B>>,
    locks: KeyedLocks<ReorderRequestId>,
}

impl<S, B> core::fmt::Debug for ReorderService<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReorderService").finish_non_exhaustive()
    }
}

impl<S, B> ReorderService<S, B>
where
    S: EventStore<ReorderEvent>,
    B: EventBus<DomainMessage>,
{
    pub fn new(store: S, bus: B, ledger: Arc<LedgerService<B>>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            ledger,
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.dispatcher = self.dispatcher.with_retry(retry);
        self
    }

    /// Open a PENDING request for an existing product.
    pub fn create(
        &self,
        product_id: ProductId,
        requested_quantity: i64,
        notes: Option<String>,
        actor: UserId,
    ) -> Result<ReorderRequest, ServiceError> {
        self.ledger.product(product_id)?;

        let request_id = ReorderRequestId::new(AggregateId::new());
        self.dispatcher.dispatch(
            request_id.0,
            &ReorderCommand::Create(CreateReorderRequest {
                request_id,
                product_id,
                requested_quantity,
                notes,
                actor,
                occurred_at: Utc::now(),
            }),
            make_request,
        )?;

        info!(%request_id, %product_id, requested_quantity, %actor, "reorder request created");
        self.get(request_id)
    }

    pub fn approve(
        &self,
        request_id: ReorderRequestId,
        actor: UserId,
    ) -> Result<ReorderRequest, ServiceError> {
        self.transition(
            request_id,
            ReorderCommand::Approve(Approve {
                request_id,
                actor,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn reject(
        &self,
        request_id: ReorderRequestId,
        reason: impl Into<String>,
        actor: UserId,
    ) -> Result<ReorderRequest, ServiceError> {
        self.transition(
            request_id,
            ReorderCommand::Reject(Reject {
                request_id,
                reason: reason.into(),
                actor,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn mark_ordered(
        &self,
        request_id: ReorderRequestId,
        actor: UserId,
    ) -> Result<ReorderRequest, ServiceError> {
        self.transition(
            request_id,
            ReorderCommand::MarkOrdered(MarkOrdered {
                request_id,
                actor,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn cancel(
        &self,
        request_id: ReorderRequestId,
        reason: impl Into<String>,
        actor: UserId,
    ) -> Result<ReorderRequest, ServiceError> {
        self.transition(
            request_id,
            ReorderCommand::Cancel(Cancel {
                request_id,
                reason: reason.into(),
                actor,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Receive the goods: one RESTOCK of `requested_quantity`, then FULFILLED.
    pub fn fulfill(
        &self,
        request_id: ReorderRequestId,
        actor: UserId,
    ) -> Result<(ReorderRequest, StockMovement), ServiceError> {
        self.locks.with(request_id, || {
            let request = self.get(request_id)?;
            request.ensure_can_fulfill(request_id)?;
            let product_id = request
                .product_id()
                .ok_or_else(|| ServiceError::not_found(format!("product of request {request_id}")))?;

            let reference = restock_reference(request_id);
            let booked = self
                .ledger
                .movements(product_id)?
                .into_iter()
                .find(|m| m.kind == MovementKind::Restock && m.reference.as_deref() == Some(reference.as_str()));

            let movement = match booked {
                Some(movement) => {
                    warn!(
                        %request_id,
                        movement_id = %movement.id,
                        "restock already booked; completing fulfillment only"
                    );
                    movement
                }
                None => self.ledger.record_movement(
                    MovementRequest::new(product_id, MovementKind::Restock, request.requested_quantity())
                        .with_reason(format!("Reorder request fulfilled: {request_id}"))
                        .with_reference(reference),
                    actor,
                )?,
            };

            let fulfilled = self.dispatcher.dispatch(
                request_id.0,
                &ReorderCommand::Fulfill(Fulfill {
                    request_id,
                    restock_movement_id: movement.id,
                    actor,
                    occurred_at: Utc::now(),
                }),
                make_request,
            );
            if let Err(err) = &fulfilled {
                error!(
                    %request_id,
                    movement_id = %movement.id,
                    error = %err,
                    "restock recorded but request could not be marked fulfilled"
                );
            }
            fulfilled?;

            info!(%request_id, %product_id, quantity = movement.quantity, %actor, "reorder request fulfilled");
            Ok((self.get(request_id)?, movement))
        })
    }

    pub fn get(&self, request_id: ReorderRequestId) -> Result<ReorderRequest, ServiceError> {
        let request = self.dispatcher.load(request_id.0, make_request)?;
        if !request.is_created() {
            return Err(ServiceError::not_found(format!("reorder request {request_id}")));
        }
        Ok(request)
    }

    /// Requests currently in `status`, oldest first.
    pub fn list_by_status(&self, status: ReorderStatus) -> Result<Vec<ReorderRequest>, ServiceError> {
        let mut requests = Vec::new();
        for id in self.dispatcher.store().stream_ids()? {
            let request = self.dispatcher.load(id, make_request)?;
            if request.is_created() && request.status() == status {
                requests.push(request);
            }
        }
        requests.sort_by_key(|r| r.requested_at());
        Ok(requests)
    }

    fn transition(
        &self,
        request_id: ReorderRequestId,
        command: ReorderCommand,
    ) -> Result<ReorderRequest, ServiceError> {
        self.locks.with(request_id, || {
            self.dispatcher.dispatch(request_id.0, &command, make_request)?;
            let request = self.get(request_id)?;
            info!(%request_id, status = %request.status().as_str(), "reorder request transitioned");
            Ok(request)
        })
    }
}
