//! Order and policy issuance.
//!
//! This crate turns a validated purchase request into a persisted order and
//! policy, assigns the policy code, and activates the order according to its
//! payment mode:
//! - cash on delivery: a courier booking is queued on the outbox in the same
//!   transaction and the order moves to `pendingCOD` once the courier accepts
//!   it
//! - B2B: the order is verified and the policy handed downstream immediately
//! - card and other modes: activation waits for the gateway callback
//!
//! Courier bookings run in [`OutboxWorker`], decoupled from requests, and are
//! retried with exponential backoff.

pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod outbox;
pub mod resolver;
pub mod service;
pub mod services;
pub mod verifier;
pub mod writer;

pub use agent::{BookingOutcome, CourierBookingAgent};
pub use config::{
    AgentConfig, CourierAccount, CourierConfig, IssuanceConfig, OutboxConfig, PartnerConfig,
    ShipperIdentity,
};
pub use dispatcher::{DispatchOutcome, FulfillmentDispatcher};
pub use error::{IssuanceError, Result};
pub use outbox::{OutboxSignal, OutboxWorker, RunReport};
pub use resolver::{ReferenceKeys, ReferenceResolver, ResolvedReferences};
pub use service::{IssuanceService, OrderSummary};
pub use services::{
    BookingPayload, BookingProduct, BookingResult, CallbackNotificationService, CourierService,
    HttpCourierService, InMemoryCourierService, InMemoryNotificationService, LoggingNotificationService,
    Notification, NotificationChannel, NotificationPayload, NotificationService,
};
pub use verifier::CardTransactionVerifier;
pub use writer::{TransactionalWriter, build_issuance};
