//! External service traits and implementations used by the booking agent.

pub mod courier;
mod http;
pub mod notification;

pub use courier::{
    BookingPayload, BookingProduct, BookingResponse, BookingResult, CourierService,
    HttpCourierService, InMemoryCourierService,
};
pub use notification::{
    CallbackNotificationService, InMemoryNotificationService, LoggingNotificationService,
    Notification, NotificationChannel, NotificationPayload, NotificationService,
    signed_document_link,
};
