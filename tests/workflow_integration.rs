//! End-to-end tests for the itinerary workflow.
//!
//! These tests drive the public API the way the page does:
//! - Generate through the gateway (fallback, rate limit, HTTP front)
//! - Format and split for the partial reveal
//! - Unlock through both lead sinks, with session persistence

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, http::StatusCode, routing::post};
use tokio::net::TcpListener;

use itinerary_forge::generation::{FallbackReason, ProviderError};
use itinerary_forge::prompts::PromptBuilder;
use itinerary_forge::server::{AppState, router};
use itinerary_forge::unlock::{
    ContactEmailSink, LeadRecordSink, LeadStoreSink, LeadSubmission, MemorySessionStore,
    SinkError, SubmissionOutcome, UnlockError,
};
use itinerary_forge::{
    BudgetTier, Destination, GenerationError, GenerationGateway, HttpGenerationClient,
    InMemoryRateLimiter, LeadContact, LeadSinks, LocalBackend, RetryPolicy, RevealFraction,
    TextProvider, TripRequest, UnlockController, UnlockState, UserFacingError, format_itinerary,
    split_html,
};

// ============================================================================
// Fakes
// ============================================================================

struct FixedProvider {
    name: &'static str,
    text: String,
    calls: AtomicUsize,
}

impl FixedProvider {
    fn new(name: &'static str, text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name,
            text: text.into(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextProvider for FixedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

struct HangingProvider;

#[async_trait]
impl TextProvider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        std::future::pending().await
    }
}

struct OkRelay;

#[async_trait]
impl ContactEmailSink for OkRelay {
    async fn send_contact(&self, _lead: &LeadSubmission) -> Result<(), SinkError> {
        Ok(())
    }
}

struct OkStore;

#[async_trait]
impl LeadRecordSink for OkStore {
    async fn record_lead(&self, _lead: &LeadSubmission) -> Result<(), SinkError> {
        Ok(())
    }
}

fn ok_sinks() -> LeadSinks {
    LeadSinks::new(Arc::new(OkRelay), Arc::new(OkStore))
}

fn honeymoon_in_paris() -> TripRequest {
    TripRequest::new(Destination::named("Paris"), BudgetTier::Luxury, "Honeymoon", 5)
}

fn gateway(primary: Arc<dyn TextProvider>, fallback: Arc<dyn TextProvider>) -> GenerationGateway {
    GenerationGateway::new(
        primary,
        fallback,
        Arc::new(InMemoryRateLimiter::new(3, Duration::from_secs(300))),
        PromptBuilder::bundled().unwrap(),
    )
}

fn contact() -> LeadContact {
    LeadContact::new("Camille", "camille@example.com", "+33 6 11 22 33 44", "itinerary-unlock")
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

// ============================================================================
// Full flow
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_paris_honeymoon_partial_reveal_and_timer() {
    let text = "abcdefghij".repeat(100);
    let primary = FixedProvider::new("openai", text.clone());
    let gw = Arc::new(gateway(primary, FixedProvider::new("gemini", "unused")));

    let backend = LocalBackend::new(gw, "ip:203.0.113.7");
    let document = RetryPolicy::default()
        .generate(&backend, &honeymoon_in_paris())
        .await
        .unwrap();
    assert_eq!(document.raw_text.chars().count(), 1_000);
    assert_eq!(document.provider_name, "openai");

    let fraction = RevealFraction::new(0.3).unwrap();
    let split = split_html(&format_itinerary(&document.raw_text), fraction);
    assert_eq!(split.visible, text[..300]);
    assert_eq!(split.locked, text[300..]);

    let controller = UnlockController::new(
        &document,
        "Paris",
        fraction,
        ok_sinks(),
        Arc::new(MemorySessionStore::new()),
    )
    .unwrap();
    assert_eq!(controller.state(), UnlockState::Locked);
    assert!(controller.render().html.starts_with(&text[..300]));
    assert!(!controller.render().html.contains(&text[..301]));

    controller.arm_auto_prompt(Duration::from_millis(9_000));
    tokio::time::sleep(Duration::from_millis(8_999)).await;
    assert_eq!(controller.state(), UnlockState::Locked);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(controller.state(), UnlockState::PromptShown);

    assert_eq!(
        controller.submit(contact()).await.unwrap(),
        SubmissionOutcome::Unlocked
    );
    assert_eq!(controller.render().html, text);
}

#[tokio::test]
async fn test_unlock_is_monotonic_and_survives_reload() {
    let store = Arc::new(MemorySessionStore::new());
    let fraction = RevealFraction::new(0.3).unwrap();
    let document = itinerary_forge::ItineraryDocument::new(
        "# Day 1\n- Eiffel Tower\n- Dinner cruise".to_string(),
        itinerary_forge::models::ProviderRole::Fallback,
        "gemini".to_string(),
    );

    let controller =
        UnlockController::new(&document, "Paris", fraction, ok_sinks(), store.clone()).unwrap();
    controller.open_prompt();
    controller.submit(contact()).await.unwrap();

    // Nothing moves it back
    assert!(!controller.dismiss());
    assert!(!controller.open_prompt());
    assert!(!controller.timer_elapsed());
    assert!(matches!(
        controller.submit(contact()).await,
        Err(UnlockError::PromptNotShown)
    ));
    assert_eq!(controller.state(), UnlockState::Unlocked);

    // Same session, fresh page
    let reloaded = UnlockController::restore(fraction, ok_sinks(), store)
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.state(), UnlockState::Unlocked);
    assert_eq!(reloaded.provider_name(), "gemini");
    assert_eq!(reloaded.destination(), "Paris");
    assert!(reloaded.render().html.contains("Dinner cruise"));

    // Different session starts locked
    let other = UnlockController::new(
        &document,
        "Paris",
        fraction,
        ok_sinks(),
        Arc::new(MemorySessionStore::new()),
    )
    .unwrap();
    assert_eq!(other.state(), UnlockState::Locked);
}

// ============================================================================
// Lead sinks
// ============================================================================

#[tokio::test]
async fn test_lead_store_500_keeps_prompt_open() {
    let app = Router::new().route(
        "/api/leads",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable") }),
    );
    let base = serve(app).await;

    let store = LeadStoreSink::new(format!("{}/api/leads", base)).unwrap();
    let sinks = LeadSinks::new(Arc::new(OkRelay), Arc::new(store));
    let document = itinerary_forge::ItineraryDocument::new(
        "Day 1: Montmartre walk, then a long lunch".to_string(),
        itinerary_forge::models::ProviderRole::Primary,
        "openai".to_string(),
    );
    let controller = UnlockController::new(
        &document,
        "Paris",
        RevealFraction::new(0.3).unwrap(),
        sinks,
        Arc::new(MemorySessionStore::new()),
    )
    .unwrap();

    controller.open_prompt();
    let err = controller.submit(contact()).await.unwrap_err();
    match err {
        UnlockError::LeadSubmissionPartialFailure { email, store } => {
            assert!(email.is_none());
            assert!(store.unwrap().contains("500"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(controller.state(), UnlockState::PromptShown);
    assert!(controller.render().prompt_error.is_some());
    assert!(controller.unlocked_html().is_none());
}

// ============================================================================
// Gateway
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_hanging_primary_falls_back_with_timeout_reason() {
    let fallback = FixedProvider::new("gemini", "# Paris in five days");
    let gw = gateway(Arc::new(HangingProvider), fallback.clone());

    let report = gw
        .generate_with_report("ip:1", &honeymoon_in_paris())
        .await
        .unwrap();
    assert_eq!(report.document.raw_text, "# Paris in five days");
    assert_eq!(report.document.provider_name, "gemini");

    let event = report.fallback.unwrap();
    assert_eq!(event.reason, FallbackReason::Timeout);
    assert_eq!(event.reason.to_string(), "TIMEOUT");
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_window() {
    let primary = FixedProvider::new("openai", "Day 1");
    let gw = gateway(primary.clone(), FixedProvider::new("gemini", "Day 1"));
    let request = honeymoon_in_paris();

    for _ in 0..3 {
        gw.generate("ip:7", &request).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    assert!(matches!(
        gw.generate("ip:7", &request).await,
        Err(GenerationError::RateLimited { .. })
    ));

    // First request was at t=0; the window is 5 minutes
    tokio::time::sleep(Duration::from_secs(121)).await;
    assert!(gw.generate("ip:7", &request).await.is_ok());
    assert_eq!(primary.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_http_client_against_server() {
    let gw = gateway(
        FixedProvider::new("openai", "# Day 1\n- Louvre"),
        FixedProvider::new("gemini", "unused"),
    );
    let base = serve(router(AppState::new(Arc::new(gw), false))).await;
    let client = HttpGenerationClient::new(&base).unwrap();
    let policy = RetryPolicy::default();

    for _ in 0..3 {
        let document = policy.generate(&client, &honeymoon_in_paris()).await.unwrap();
        assert_eq!(document.provider_name, "openai");
    }

    // All HTTP calls come from the same peer address, so the fourth is throttled
    let err = policy
        .generate(&client, &honeymoon_in_paris())
        .await
        .unwrap_err();
    assert!(matches!(err, UserFacingError::Throttled { .. }));
    assert!(err.to_string().contains("Please wait 5 minute(s)"));
}
