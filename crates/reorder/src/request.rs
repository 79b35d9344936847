use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{Aggregate, AggregateId, AggregateRoot, DomainError, RecordId, UserId};
use stockwise_events::Event;
use stockwise_inventory::ProductId;

/// Reorder request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReorderRequestId(pub AggregateId);

impl ReorderRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReorderRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Reorder request lifecycle.
///
/// ```text
/// PENDING -> APPROVED -> ORDERED -> FULFILLED
///    |          |          |
///    v          +----------+--> CANCELLED
/// REJECTED      +-------------> FULFILLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReorderStatus {
    Pending,
    Approved,
    Rejected,
    Ordered,
    Fulfilled,
    Cancelled,
}

impl ReorderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReorderStatus::Rejected | ReorderStatus::Fulfilled | ReorderStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReorderStatus::Pending => "PENDING",
            ReorderStatus::Approved => "APPROVED",
            ReorderStatus::Rejected => "REJECTED",
            ReorderStatus::Ordered => "ORDERED",
            ReorderStatus::Fulfilled => "FULFILLED",
            ReorderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for ReorderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: ReorderRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderRequest {
    id: ReorderRequestId,
    product_id: Option<ProductId>,
    requested_quantity: i64,
    status: ReorderStatus,
    requester: Option<UserId>,
    approver: Option<UserId>,
    requested_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    ordered_at: Option<DateTime<Utc>>,
    fulfilled_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    /// Rejection or cancellation reason.
    status_reason: Option<String>,
    restock_movement_id: Option<RecordId>,
    version: u64,
    created: bool,
}

impl ReorderRequest {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ReorderRequestId) -> Self {
        Self {
            id,
            product_id: None,
            requested_quantity: 0,
            status: ReorderStatus::Pending,
            requester: None,
            approver: None,
            requested_at: None,
            approved_at: None,
            ordered_at: None,
            fulfilled_at: None,
            notes: None,
            status_reason: None,
            restock_movement_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReorderRequestId {
        self.id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn requested_quantity(&self) -> i64 {
        self.requested_quantity
    }

    pub fn status(&self) -> ReorderStatus {
        self.status
    }

    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }

    pub fn approver(&self) -> Option<UserId> {
        self.approver
    }

    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn ordered_at(&self) -> Option<DateTime<Utc>> {
        self.ordered_at
    }

    pub fn fulfilled_at(&self) -> Option<DateTime<Utc>> {
        self.fulfilled_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    /// Ledger entry booked when the request was fulfilled.
    pub fn restock_movement_id(&self) -> Option<RecordId> {
        self.restock_movement_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for ReorderRequest {
    type Id = ReorderRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateReorderRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReorderRequest {
    pub request_id: ReorderRequestId,
    pub product_id: ProductId,
    pub requested_quantity: i64,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve (PENDING only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub request_id: ReorderRequestId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reject (PENDING only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reject {
    pub request_id: ReorderRequestId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkOrdered (APPROVED only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOrdered {
    pub request_id: ReorderRequestId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel (APPROVED or ORDERED).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub request_id: ReorderRequestId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Fulfill (APPROVED or ORDERED).
///
/// `restock_movement_id` references the RESTOCK entry the caller has already
/// committed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfill {
    pub request_id: ReorderRequestId,
    pub restock_movement_id: RecordId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReorderCommand {
    Create(CreateReorderRequest),
    Approve(Approve),
    Reject(Reject),
    MarkOrdered(MarkOrdered),
    Cancel(Cancel),
    Fulfill(Fulfill),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReorderEvent {
    Requested {
        request_id: ReorderRequestId,
        product_id: ProductId,
        requested_quantity: i64,
        notes: Option<String>,
        requester: UserId,
        occurred_at: DateTime<Utc>,
    },
    Approved {
        request_id: ReorderRequestId,
        approver: UserId,
        occurred_at: DateTime<Utc>,
    },
    Rejected {
        request_id: ReorderRequestId,
        reason: String,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    },
    Ordered {
        request_id: ReorderRequestId,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    },
    Cancelled {
        request_id: ReorderRequestId,
        reason: String,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    },
    Fulfilled {
        request_id: ReorderRequestId,
        product_id: ProductId,
        quantity: i64,
        restock_movement_id: RecordId,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ReorderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReorderEvent::Requested { .. } => "reorder.request.created",
            ReorderEvent::Approved { .. } => "reorder.request.approved",
            ReorderEvent::Rejected { .. } => "reorder.request.rejected",
            ReorderEvent::Ordered { .. } => "reorder.request.ordered",
            ReorderEvent::Cancelled { .. } => "reorder.request.cancelled",
            ReorderEvent::Fulfilled { .. } => "reorder.request.fulfilled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReorderEvent::Requested { occurred_at, .. }
            | ReorderEvent::Approved { occurred_at, .. }
            | ReorderEvent::Rejected { occurred_at, .. }
            | ReorderEvent::Ordered { occurred_at, .. }
            | ReorderEvent::Cancelled { occurred_at, .. }
            | ReorderEvent::Fulfilled { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for ReorderRequest {
    type Command = ReorderCommand;
    type Event = ReorderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReorderEvent::Requested {
                request_id,
                product_id,
                requested_quantity,
                notes,
                requester,
                occurred_at,
            } => {
                self.id = *request_id;
                self.product_id = Some(*product_id);
                self.requested_quantity = *requested_quantity;
                self.notes = notes.clone();
                self.requester = Some(*requester);
                self.requested_at = Some(*occurred_at);
                self.status = ReorderStatus::Pending;
                self.created = true;
            }
            ReorderEvent::Approved {
                approver,
                occurred_at,
                ..
            } => {
                self.status = ReorderStatus::Approved;
                self.approver = Some(*approver);
                self.approved_at = Some(*occurred_at);
            }
            ReorderEvent::Rejected { reason, actor, .. } => {
                self.status = ReorderStatus::Rejected;
                self.approver = Some(*actor);
                self.status_reason = Some(reason.clone());
            }
            ReorderEvent::Ordered { occurred_at, .. } => {
                self.status = ReorderStatus::Ordered;
                self.ordered_at = Some(*occurred_at);
            }
            ReorderEvent::Cancelled { reason, .. } => {
                self.status = ReorderStatus::Cancelled;
                self.status_reason = Some(reason.clone());
            }
            ReorderEvent::Fulfilled {
                restock_movement_id,
                occurred_at,
                ..
            } => {
                self.status = ReorderStatus::Fulfilled;
                self.fulfilled_at = Some(*occurred_at);
                self.restock_movement_id = Some(*restock_movement_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReorderCommand::Create(cmd) => self.handle_create(cmd),
            ReorderCommand::Approve(cmd) => {
                self.ensure_transition(cmd.request_id, &[ReorderStatus::Pending], "approve")?;
                Ok(vec![ReorderEvent::Approved {
                    request_id: cmd.request_id,
                    approver: cmd.actor,
                    occurred_at: cmd.occurred_at,
                }])
            }
            ReorderCommand::Reject(cmd) => {
                self.ensure_transition(cmd.request_id, &[ReorderStatus::Pending], "reject")?;
                Ok(vec![ReorderEvent::Rejected {
                    request_id: cmd.request_id,
                    reason: cmd.reason.clone(),
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                }])
            }
            ReorderCommand::MarkOrdered(cmd) => {
                self.ensure_transition(cmd.request_id, &[ReorderStatus::Approved], "mark ordered")?;
                Ok(vec![ReorderEvent::Ordered {
                    request_id: cmd.request_id,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                }])
            }
            ReorderCommand::Cancel(cmd) => {
                self.ensure_transition(
                    cmd.request_id,
                    &[ReorderStatus::Approved, ReorderStatus::Ordered],
                    "cancel",
                )?;
                Ok(vec![ReorderEvent::Cancelled {
                    request_id: cmd.request_id,
                    reason: cmd.reason.clone(),
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                }])
            }
            ReorderCommand::Fulfill(cmd) => {
                self.ensure_can_fulfill(cmd.request_id)?;
                let product_id = self.product_id.ok_or(DomainError::NotFound)?;
                Ok(vec![ReorderEvent::Fulfilled {
                    request_id: cmd.request_id,
                    product_id,
                    quantity: self.requested_quantity,
                    restock_movement_id: cmd.restock_movement_id,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                }])
            }
        }
    }
}

impl ReorderRequest {
    /// Check that `fulfill` is legal without producing events.
    ///
    /// Callers use this before writing the RESTOCK entry so a request in the
    /// wrong state never touches the ledger.
    pub fn ensure_can_fulfill(&self, request_id: ReorderRequestId) -> Result<(), DomainError> {
        self.ensure_transition(
            request_id,
            &[ReorderStatus::Approved, ReorderStatus::Ordered],
            "fulfill",
        )
    }

    fn ensure_transition(
        &self,
        request_id: ReorderRequestId,
        allowed_from: &[ReorderStatus],
        action: &str,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != request_id {
            return Err(DomainError::invariant("request_id mismatch"));
        }
        if !allowed_from.contains(&self.status) {
            return Err(DomainError::invalid_transition(self.status, action));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateReorderRequest) -> Result<Vec<ReorderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("reorder request already exists"));
        }
        if cmd.requested_quantity < 1 {
            return Err(DomainError::validation(
                "requested_quantity must be at least 1",
            ));
        }

        Ok(vec![ReorderEvent::Requested {
            request_id: cmd.request_id,
            product_id: cmd.product_id,
            requested_quantity: cmd.requested_quantity,
            notes: cmd.notes.clone(),
            requester: cmd.actor,
            occurred_at: cmd.occurred_at,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_request_id() -> ReorderRequestId {
        ReorderRequestId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn run(request: &mut ReorderRequest, cmd: ReorderCommand) -> Result<(), DomainError> {
        let events = request.handle(&cmd)?;
        for e in &events {
            request.apply(e);
        }
        Ok(())
    }

    fn pending(quantity: i64) -> ReorderRequest {
        let id = test_request_id();
        let mut request = ReorderRequest::empty(id);
        run(
            &mut request,
            ReorderCommand::Create(CreateReorderRequest {
                request_id: id,
                product_id: test_product_id(),
                requested_quantity: quantity,
                notes: Some("forecast says 10 days left".to_string()),
                actor: UserId::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        request
    }

    fn approve(request: &mut ReorderRequest) -> Result<(), DomainError> {
        let request_id = request.id_typed();
        run(
            request,
            ReorderCommand::Approve(Approve {
                request_id,
                actor: UserId::new(),
                occurred_at: test_time(),
            }),
        )
    }

    fn fulfill_cmd(request: &ReorderRequest) -> ReorderCommand {
        ReorderCommand::Fulfill(Fulfill {
            request_id: request.id_typed(),
            restock_movement_id: RecordId::new(),
            actor: UserId::new(),
            occurred_at: test_time(),
        })
    }

    fn cancel_cmd(request: &ReorderRequest) -> ReorderCommand {
        ReorderCommand::Cancel(Cancel {
            request_id: request.id_typed(),
            reason: "supplier out of stock".to_string(),
            actor: UserId::new(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_starts_pending() {
        let request = pending(40);
        assert_eq!(request.status(), ReorderStatus::Pending);
        assert_eq!(request.requested_quantity(), 40);
        assert!(request.requested_at().is_some());
        assert_eq!(request.version(), 1);
    }

    #[test]
    fn create_rejects_zero_quantity() {
        let id = test_request_id();
        let err = ReorderRequest::empty(id)
            .handle(&ReorderCommand::Create(CreateReorderRequest {
                request_id: id,
                product_id: test_product_id(),
                requested_quantity: 0,
                notes: None,
                actor: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn approve_stamps_approver_and_time() {
        let mut request = pending(10);
        approve(&mut request).unwrap();
        assert_eq!(request.status(), ReorderStatus::Approved);
        assert!(request.approver().is_some());
        assert!(request.approved_at().is_some());
    }

    #[test]
    fn approve_twice_is_invalid_transition() {
        let mut request = pending(10);
        approve(&mut request).unwrap();
        let err = approve(&mut request).unwrap_err();
        assert_eq!(err, DomainError::invalid_transition("APPROVED", "approve"));
    }

    #[test]
    fn fulfill_on_pending_fails() {
        let request = pending(10);
        let err = request.handle(&fulfill_cmd(&request)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn fulfill_after_approval_emits_requested_quantity() {
        let mut request = pending(25);
        approve(&mut request).unwrap();

        let events = request.handle(&fulfill_cmd(&request)).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ReorderEvent::Fulfilled { quantity, .. } => assert_eq!(*quantity, 25),
            _ => panic!("Expected Fulfilled event"),
        }

        request.apply(&events[0]);
        assert_eq!(request.status(), ReorderStatus::Fulfilled);
        assert!(request.fulfilled_at().is_some());
        assert!(request.restock_movement_id().is_some());
    }

    #[test]
    fn ordered_can_be_fulfilled_or_cancelled() {
        let mut request = pending(10);
        approve(&mut request).unwrap();
        let request_id = request.id_typed();
        run(
            &mut request,
            ReorderCommand::MarkOrdered(MarkOrdered {
                request_id,
                actor: UserId::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(request.status(), ReorderStatus::Ordered);

        assert!(request.handle(&fulfill_cmd(&request)).is_ok());
        let cmd = cancel_cmd(&request);
        run(&mut request, cmd).unwrap();
        assert_eq!(request.status(), ReorderStatus::Cancelled);
        assert_eq!(request.status_reason(), Some("supplier out of stock"));
    }

    #[test]
    fn pending_cannot_be_cancelled() {
        let request = pending(10);
        assert!(matches!(
            request.handle(&cancel_cmd(&request)),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let mut request = pending(10);
        let request_id = request.id_typed();
        run(
            &mut request,
            ReorderCommand::Reject(Reject {
                request_id,
                reason: "budget freeze".to_string(),
                actor: UserId::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(request.status().is_terminal());

        assert!(approve(&mut request).is_err());
        assert!(request.handle(&fulfill_cmd(&request)).is_err());
        assert!(request.handle(&cancel_cmd(&request)).is_err());
    }

    #[test]
    fn unknown_request_is_not_found() {
        let request = ReorderRequest::empty(test_request_id());
        assert_eq!(
            request.handle(&fulfill_cmd(&request)).unwrap_err(),
            DomainError::NotFound
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy)]
        enum Action {
            Approve,
            Reject,
            MarkOrdered,
            Cancel,
            Fulfill,
        }

        fn action_strategy() -> impl Strategy<Value = Action> {
            prop_oneof![
                Just(Action::Approve),
                Just(Action::Reject),
                Just(Action::MarkOrdered),
                Just(Action::Cancel),
                Just(Action::Fulfill),
            ]
        }

        fn command(request: &ReorderRequest, action: Action) -> ReorderCommand {
            let request_id = request.id_typed();
            let actor = UserId::new();
            let occurred_at = test_time();
            match action {
                Action::Approve => ReorderCommand::Approve(Approve {
                    request_id,
                    actor,
                    occurred_at,
                }),
                Action::Reject => ReorderCommand::Reject(Reject {
                    request_id,
                    reason: "no".to_string(),
                    actor,
                    occurred_at,
                }),
                Action::MarkOrdered => ReorderCommand::MarkOrdered(MarkOrdered {
                    request_id,
                    actor,
                    occurred_at,
                }),
                Action::Cancel => cancel_cmd(request),
                Action::Fulfill => fulfill_cmd(request),
            }
        }

        fn legal(from: ReorderStatus, to: ReorderStatus) -> bool {
            use ReorderStatus::*;
            matches!(
                (from, to),
                (Pending, Approved)
                    | (Pending, Rejected)
                    | (Approved, Ordered)
                    | (Approved, Cancelled)
                    | (Approved, Fulfilled)
                    | (Ordered, Fulfilled)
                    | (Ordered, Cancelled)
            )
        }

        proptest! {
            /// Whatever sequence of calls arrives, only edges of the lifecycle graph are taken.
            #[test]
            fn only_legal_transitions_are_taken(
                actions in prop::collection::vec(action_strategy(), 0..20)
            ) {
                let mut request = pending(5);
                for action in actions {
                    let before = request.status();
                    let cmd = command(&request, action);
                    match run(&mut request, cmd) {
                        Ok(()) => prop_assert!(legal(before, request.status())),
                        Err(err) => {
                            let is_transition_error =
                                matches!(err, DomainError::InvalidTransition { .. });
                            prop_assert!(is_transition_error);
                            prop_assert_eq!(before, request.status());
                        }
                    }
                }
            }
        }
    }
}
