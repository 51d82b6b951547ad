use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use memory_store::MemoryStore;
use model::{NewOrder, Order, OrderId, OrderItemRequest, OrderRequest, OrderStatus};
use notifier::{NotificationDispatcher, Notifier, NotifyError, TelegramNotifier};
use repository::{CreatedOrder, OrderStore, RepositoryError};
use service::{OrderPolicy, OrderService, OrderServiceImpl, ServiceError, ValidationError};

/// Records every notification it receives.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(OrderId, NewOrder)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, order_id: OrderId, order: &NewOrder) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((order_id, order.clone()));
        Ok(())
    }
}

/// A store whose every operation fails as if the database were down.
#[derive(Default)]
struct UnavailableStore {
    calls: AtomicUsize,
}

#[async_trait]
impl OrderStore for UnavailableStore {
    async fn create_order_with_items(&self, _order: &NewOrder) -> Result<CreatedOrder, RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RepositoryError::Constraint("connection refused".into()))
    }

    async fn list_orders_for_requester(&self, _telegram_id: i64) -> Result<Vec<Order>, RepositoryError> {
        Err(RepositoryError::Constraint("connection refused".into()))
    }

    async fn get_status(&self, _order_id: OrderId) -> Result<OrderStatus, RepositoryError> {
        Err(RepositoryError::Constraint("connection refused".into()))
    }

    async fn update_status(
        &self,
        _order_id: OrderId,
        _expected: Option<OrderStatus>,
        _status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Constraint("connection refused".into()))
    }
}

/// Reports a status on read, but another writer changes it before the
/// compare-and-set lands.
struct RacingStore;

#[async_trait]
impl OrderStore for RacingStore {
    async fn create_order_with_items(&self, _order: &NewOrder) -> Result<CreatedOrder, RepositoryError> {
        Ok(CreatedOrder { order_id: 1, created: true })
    }

    async fn list_orders_for_requester(&self, _telegram_id: i64) -> Result<Vec<Order>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn get_status(&self, _order_id: OrderId) -> Result<OrderStatus, RepositoryError> {
        Ok(OrderStatus::Pending)
    }

    async fn update_status(
        &self,
        _order_id: OrderId,
        expected: Option<OrderStatus>,
        _status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        match expected {
            Some(_) => Err(RepositoryError::NotFound),
            None => Ok(()),
        }
    }
}

fn request() -> OrderRequest {
    OrderRequest {
        telegram_id: Some(123456),
        name: Some("Test User".into()),
        recipient_name: Some("Anna".into()),
        contact_type: Some("whatsapp".into()),
        contact_value: Some("+84900000000".into()),
        latitude: Some("12.25".into()),
        longitude: Some("109.19".into()),
        delivery_date: Some("2025-01-20".into()),
        delivery_time: Some("15:00-18:00".into()),
        items: Some(vec![OrderItemRequest {
            product_name: Some("Roses".into()),
            product_photo: Some("http://x/p.jpg".into()),
            size: Some("standard".into()),
            price: Some(800000),
            quantity: Some(1),
        }]),
        items_total: Some(800000),
        delivery_cost: Some(100000),
        total: Some(900000),
        ..Default::default()
    }
}

fn service_with(
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
    policy: OrderPolicy,
) -> OrderServiceImpl<MemoryStore> {
    OrderServiceImpl::new(store, NotificationDispatcher::new(notifier), policy)
}

#[tokio::test]
async fn test_end_to_end_submission() {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service_with(store.clone(), notifier.clone(), OrderPolicy::default());

    let submission = service.submit_order(&request()).await.unwrap();
    assert!(submission.order_id > 0);
    assert!(!submission.message.is_empty());

    let orders = service.list_orders(123456).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, submission.order_id);
    assert_eq!(orders[0].total, 900000);
    assert_eq!(orders[0].status, OrderStatus::Pending);
    assert_eq!(orders[0].items.len(), 1);
    assert_eq!(orders[0].items[0].quantity, 1);

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, submission.order_id);
    assert_eq!(sent[0].1.recipient_name, "Anna");
}

#[tokio::test]
async fn test_validation_failure_touches_nothing() {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service_with(store.clone(), notifier.clone(), OrderPolicy::default());

    let mut req = request();
    req.contact_type = Some("sms".into());
    let err = service.submit_order(&req).await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::InvalidContactType(_))
    ));
    assert_eq!(store.row_counts().await, (0, 0));
    assert!(notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_trimmed_values_are_stored() {
    let store = Arc::new(MemoryStore::new());
    let service = service_with(store.clone(), Arc::new(RecordingNotifier::default()), OrderPolicy::default());

    let mut req = request();
    req.contact_value = Some("  abc  ".into());
    let submission = service.submit_order(&req).await.unwrap();

    let order = store.get(submission.order_id).await.unwrap();
    assert_eq!(order.contact_value, "abc");
}

#[tokio::test]
async fn test_store_failure_skips_notification() {
    let store = Arc::new(UnavailableStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = OrderServiceImpl::new(
        store.clone(),
        NotificationDispatcher::new(notifier.clone()),
        OrderPolicy::default(),
    );

    let err = service.submit_order(&request()).await.unwrap_err();
    assert!(matches!(err, ServiceError::StoreUnavailable(_)));
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    assert!(notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_item_leaves_no_rows() {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service_with(store.clone(), notifier.clone(), OrderPolicy::default());

    // Quantity is not range-checked by validation; the store's constraint rejects it.
    let mut req = request();
    let items = req.items.as_mut().unwrap();
    let empty_line = OrderItemRequest {
        quantity: Some(0),
        ..items[0].clone()
    };
    items.push(empty_line);

    let err = service.submit_order(&req).await.unwrap_err();
    assert!(matches!(err, ServiceError::StoreUnavailable(_)));
    assert_eq!(store.row_counts().await, (0, 0));
    assert!(notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_notification_endpoint_still_places_order() {
    let store = Arc::new(MemoryStore::new());
    // Nothing listens on port 9 of localhost.
    let telegram = TelegramNotifier::new("http://127.0.0.1:9", "123:abc", -100, Duration::from_secs(1)).unwrap();
    let service = OrderServiceImpl::new(
        store.clone(),
        NotificationDispatcher::new(Arc::new(telegram)),
        OrderPolicy::default(),
    );

    let submission = service.submit_order(&request()).await.unwrap();
    let orders = service.list_orders(123456).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, submission.order_id);
}

#[tokio::test]
async fn test_notification_server_error_still_places_order() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let telegram = TelegramNotifier::new(&server.uri(), "123:abc", -100, Duration::from_secs(1)).unwrap();
    let service = OrderServiceImpl::new(
        store.clone(),
        NotificationDispatcher::new(Arc::new(telegram)),
        OrderPolicy::default(),
    );

    assert!(service.submit_order(&request()).await.is_ok());
    assert_eq!(store.row_counts().await, (1, 1));
}

#[tokio::test]
async fn test_disabled_notifications() {
    let store = Arc::new(MemoryStore::new());
    let service = OrderServiceImpl::new(store, NotificationDispatcher::disabled(), OrderPolicy::default());
    assert!(service.submit_order(&request()).await.is_ok());
}

#[tokio::test]
async fn test_duplicate_submission_is_not_renotified() {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service_with(store.clone(), notifier.clone(), OrderPolicy::default());

    let mut req = request();
    req.idempotency_key = Some("checkout-42".into());
    let first = service.submit_order(&req).await.unwrap();
    let second = service.submit_order(&req).await.unwrap();

    assert_eq!(first.order_id, second.order_id);
    assert_eq!(store.row_counts().await, (1, 1));
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_verify_totals_policy() {
    let mut req = request();
    req.total = Some(1);

    let lenient = service_with(
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingNotifier::default()),
        OrderPolicy::default(),
    );
    assert!(lenient.submit_order(&req).await.is_ok());

    let strict = service_with(
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingNotifier::default()),
        OrderPolicy {
            verify_totals: true,
            ..OrderPolicy::default()
        },
    );
    let err = strict.submit_order(&req).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::TotalsMismatch { field: "total", .. })
    ));
}

#[tokio::test]
async fn test_set_status_on_missing_order() {
    let service = service_with(
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingNotifier::default()),
        OrderPolicy::default(),
    );
    let err = service.set_status(999999, "confirmed").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(999999)));

    let permissive = service_with(
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingNotifier::default()),
        OrderPolicy {
            enforce_status_transitions: false,
            ..OrderPolicy::default()
        },
    );
    let err = permissive.set_status(999999, "confirmed").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(999999)));
}

#[tokio::test]
async fn test_set_status_follows_state_machine() {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service_with(store.clone(), notifier.clone(), OrderPolicy::default());
    let order_id = service.submit_order(&request()).await.unwrap().order_id;

    assert_eq!(service.set_status(order_id, "confirmed").await.unwrap(), OrderStatus::Confirmed);
    assert_eq!(service.set_status(order_id, "making").await.unwrap(), OrderStatus::Making);

    let err = service.set_status(order_id, "pending").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::IllegalTransition {
            from: OrderStatus::Making,
            to: OrderStatus::Pending
        }
    ));

    assert_eq!(service.set_status(order_id, "cancelled").await.unwrap(), OrderStatus::Cancelled);
    assert!(service.set_status(order_id, "delivering").await.is_err());

    // Status changes are not announced.
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_set_status_permissive_and_unknown() {
    let store = Arc::new(MemoryStore::new());
    let service = service_with(
        store.clone(),
        Arc::new(RecordingNotifier::default()),
        OrderPolicy {
            enforce_status_transitions: false,
            ..OrderPolicy::default()
        },
    );
    let order_id = service.submit_order(&request()).await.unwrap().order_id;

    assert_eq!(service.set_status(order_id, "delivered").await.unwrap(), OrderStatus::Delivered);
    assert_eq!(service.set_status(order_id, "pending").await.unwrap(), OrderStatus::Pending);

    let err = service.set_status(order_id, "shipped").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatus(s) if s == "shipped"));
}

#[tokio::test]
async fn test_store_failure_on_listing() {
    let service = OrderServiceImpl::new(
        Arc::new(UnavailableStore::default()),
        NotificationDispatcher::disabled(),
        OrderPolicy::default(),
    );
    assert!(matches!(
        service.list_orders(1).await,
        Err(ServiceError::StoreUnavailable(_))
    ));
    assert!(matches!(
        service.set_status(1, "confirmed").await,
        Err(ServiceError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn test_same_key_from_another_requester_places_a_new_order() {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service_with(store.clone(), notifier.clone(), OrderPolicy::default());

    let mut first = request();
    first.telegram_id = Some(111);
    first.idempotency_key = Some("checkout-1".into());
    let mut second = first.clone();
    second.telegram_id = Some(222);

    let a = service.submit_order(&first).await.unwrap();
    let b = service.submit_order(&second).await.unwrap();
    assert_ne!(a.order_id, b.order_id);

    let orders = service.list_orders(222).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, b.order_id);
    assert_eq!(notifier.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_reused_key_with_different_cart_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service_with(store.clone(), notifier.clone(), OrderPolicy::default());

    let mut req = request();
    req.idempotency_key = Some("checkout-1".into());
    let placed = service.submit_order(&req).await.unwrap();

    req.items.as_mut().unwrap()[0].quantity = Some(3);
    let err = service.submit_order(&req).await.unwrap_err();
    assert!(matches!(err, ServiceError::IdempotencyKeyReused(id) if id == placed.order_id));
    assert_eq!(store.row_counts().await, (1, 1));
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_status_change_is_a_conflict() {
    let service = OrderServiceImpl::new(
        Arc::new(RacingStore),
        NotificationDispatcher::disabled(),
        OrderPolicy::default(),
    );
    let err = service.set_status(7, "confirmed").await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(7)));
}
