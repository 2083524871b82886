use super::*;
use crate::error::AppError;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Copy)]
enum StartBehavior {
    Ok,
    Fail(&'static str),
    FailAfter(Duration, &'static str),
    BlockUntilCancelled,
    FailAtRuntime(Duration, &'static str),
    Panic,
}

#[derive(Clone, Copy)]
enum StopBehavior {
    Ok,
    Fail,
    Hang,
}

type EventLog = Arc<Mutex<Vec<String>>>;

struct MockComponent {
    name: String,
    start: StartBehavior,
    stop: StopBehavior,
    events: EventLog,
    stop_expired: Arc<Mutex<Option<bool>>>,
}

impl MockComponent {
    fn new(name: &str, events: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            start: StartBehavior::Ok,
            stop: StopBehavior::Ok,
            events: Arc::clone(events),
            stop_expired: Arc::new(Mutex::new(None)),
        }
    }

    fn with_start(mut self, start: StartBehavior) -> Self {
        self.start = start;
        self
    }

    fn with_stop(mut self, stop: StopBehavior) -> Self {
        self.stop = stop;
        self
    }

    fn record(&self, event: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:{}", event, self.name));
    }
}

#[async_trait::async_trait]
impl Component for MockComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: RunContext) -> crate::error::Result<()> {
        self.record("start");
        match self.start {
            StartBehavior::Ok => Ok(()),
            StartBehavior::Fail(message) => Err(AppError::component(self.name.clone(), message)),
            StartBehavior::FailAfter(delay, message) => {
                tokio::time::sleep(delay).await;
                Err(AppError::component(self.name.clone(), message))
            }
            StartBehavior::BlockUntilCancelled => {
                ctx.ready().await;
                ctx.cancelled().await;
                self.record("unwound");
                Ok(())
            }
            StartBehavior::FailAtRuntime(delay, message) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    ctx.fail(AppError::system(message));
                });
                Ok(())
            }
            StartBehavior::Panic => panic!("start exploded"),
        }
    }

    async fn stop(&self, ctx: &ShutdownContext) -> crate::error::Result<()> {
        self.record("stop");
        *self.stop_expired.lock().unwrap() = Some(ctx.is_expired());
        match self.stop {
            StopBehavior::Ok => Ok(()),
            StopBehavior::Fail => Err(AppError::component(self.name.clone(), "stop failed")),
            StopBehavior::Hang => {
                // Ignores the deadline on purpose
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }
    }
}

fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn events_with_prefix(events: &EventLog, prefix: &str) -> Vec<String> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|event| event.starts_with(prefix))
        .cloned()
        .collect()
}

fn signal_after(delay: Duration) -> impl Future<Output = ShutdownReason> + Send + 'static {
    async move {
        tokio::time::sleep(delay).await;
        ShutdownReason::Signal("TEST".to_string())
    }
}

fn never() -> impl Future<Output = ShutdownReason> + Send + 'static {
    std::future::pending::<ShutdownReason>()
}

#[tokio::test]
async fn test_signal_after_successful_start_stops_in_reverse_order() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("a", &events))
        .component(MockComponent::new("b", &events))
        .component(MockComponent::new("c", &events))
        .shutdown_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let started = Instant::now();
    let result = app.run_with_signal(signal_after(Duration::from_millis(10))).await;

    assert!(result.is_ok(), "unexpected error: {:?}", result);
    assert_eq!(events_with_prefix(&events, "start").len(), 3);
    assert_eq!(
        events_with_prefix(&events, "stop"),
        vec!["stop:c", "stop:b", "stop:a"]
    );
    assert!(started.elapsed() <= Duration::from_secs(2));
}

#[tokio::test]
async fn test_start_failure_returns_error_without_stopping() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("a", &events))
        .component(
            MockComponent::new("b", &events).with_start(StartBehavior::Fail("bind: address in use")),
        )
        .component(MockComponent::new("c", &events))
        .build()
        .unwrap();

    let result = app.run_with_signal(never()).await;

    match result {
        Err(AppError::Component { component, message }) => {
            assert_eq!(component, "b");
            assert_eq!(message, "bind: address in use");
        }
        other => panic!("expected component start error, got {:?}", other),
    }
    assert!(events_with_prefix(&events, "stop").is_empty());
}

#[tokio::test]
async fn test_start_failure_unwinds_blocking_siblings() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("server", &events).with_start(StartBehavior::BlockUntilCancelled))
        .component(MockComponent::new("db", &events).with_start(StartBehavior::FailAfter(
            Duration::from_millis(20),
            "connection refused",
        )))
        .build()
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), app.run_with_signal(never()))
        .await
        .expect("run should return once the failing start cancels its siblings");

    assert!(result.is_err());
    assert_eq!(events_with_prefix(&events, "unwound"), vec!["unwound:server"]);
    assert!(events_with_prefix(&events, "stop").is_empty());
}

#[tokio::test]
async fn test_blocking_start_counts_as_success() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("listener", &events).with_start(StartBehavior::BlockUntilCancelled))
        .component(MockComponent::new("worker", &events))
        .build()
        .unwrap();
    let states = app.states();

    let result = app.run_with_signal(signal_after(Duration::from_millis(10))).await;

    assert!(result.is_ok());
    assert_eq!(
        events_with_prefix(&events, "stop"),
        vec!["stop:worker", "stop:listener"]
    );
    assert_eq!(states.get("listener").await, Some(ComponentState::Stopped));
}

#[tokio::test]
async fn test_serving_component_is_running_while_blocked() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("listener", &events).with_start(StartBehavior::BlockUntilCancelled))
        .build()
        .unwrap();
    let states = app.states();
    let handle = app.shutdown_handle();
    let running = tokio::spawn(app.run_with_signal(never()));

    tokio::time::timeout(Duration::from_secs(2), async {
        while states.get("listener").await != Some(ComponentState::Running) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener should be running while its start blocks");
    assert_eq!(states.running().await, 1);
    assert!(events_with_prefix(&events, "unwound").is_empty());

    handle.shutdown();
    running.await.unwrap().unwrap();
    assert_eq!(states.get("listener").await, Some(ComponentState::Stopped));
    assert_eq!(states.running().await, 0);
}

#[tokio::test]
async fn test_stop_error_does_not_abort_shutdown() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("a", &events))
        .component(MockComponent::new("b", &events).with_stop(StopBehavior::Fail))
        .component(MockComponent::new("c", &events))
        .build()
        .unwrap();
    let states = app.states();

    let result = app.run_with_signal(signal_after(Duration::from_millis(5))).await;

    // Stop failures are logged only
    assert!(result.is_ok());
    assert_eq!(
        events_with_prefix(&events, "stop"),
        vec!["stop:c", "stop:b", "stop:a"]
    );
    assert_eq!(states.get("b").await, Some(ComponentState::Failed));
    assert_eq!(states.get("a").await, Some(ComponentState::Stopped));
}

#[tokio::test]
async fn test_shutdown_deadline_bounds_whole_sequence() {
    let events = new_log();
    let first = MockComponent::new("a", &events);
    let first_expired = Arc::clone(&first.stop_expired);
    let app = App::builder("test-app")
        .component(first)
        .component(MockComponent::new("b", &events).with_stop(StopBehavior::Hang))
        .shutdown_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let started = Instant::now();
    let result = app.run_with_signal(signal_after(Duration::from_millis(5))).await;

    assert!(result.is_ok());
    assert!(started.elapsed() < Duration::from_secs(5));
    // "a" still gets its attempt, with the shared budget already spent
    assert_eq!(events_with_prefix(&events, "stop"), vec!["stop:b", "stop:a"]);
    assert_eq!(*first_expired.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn test_runtime_failure_is_returned_after_shutdown() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("a", &events))
        .component(MockComponent::new("b", &events).with_start(StartBehavior::FailAtRuntime(
            Duration::from_millis(10),
            "downstream gone",
        )))
        .build()
        .unwrap();

    let result = app.run_with_signal(never()).await;

    match result {
        Err(AppError::Shutdown(cause)) => {
            assert!(matches!(*cause, AppError::System { ref message } if message == "downstream gone"));
        }
        other => panic!("expected shutdown cause, got {:?}", other),
    }
    assert_eq!(events_with_prefix(&events, "stop"), vec!["stop:b", "stop:a"]);
}

#[tokio::test]
async fn test_shutdown_handle_requests_normal_stop() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("a", &events))
        .build()
        .unwrap();
    let handle = app.shutdown_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.shutdown();
    });

    let result = app.run_with_signal(never()).await;
    assert!(result.is_ok());
    assert_eq!(events_with_prefix(&events, "stop"), vec!["stop:a"]);
}

#[tokio::test]
async fn test_first_trigger_wins() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("a", &events))
        .build()
        .unwrap();
    let handle = app.shutdown_handle();

    handle.shutdown();
    handle.fail(AppError::system("too late"));
    assert!(handle.is_triggered());

    let result = app.run_with_signal(never()).await;
    assert!(result.is_ok());
    assert_eq!(events_with_prefix(&events, "stop"), vec!["stop:a"]);
}

#[tokio::test]
async fn test_cleanup_on_startup_failure_stops_started_components() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("a", &events))
        .component(MockComponent::new("b", &events).with_start(StartBehavior::FailAfter(
            Duration::from_millis(20),
            "bind: address in use",
        )))
        .component(MockComponent::new("c", &events))
        .cleanup_on_startup_failure(true)
        .build()
        .unwrap();

    let result = app.run_with_signal(never()).await;

    assert!(result.is_err());
    assert_eq!(events_with_prefix(&events, "stop"), vec!["stop:c", "stop:a"]);
}

#[tokio::test]
async fn test_panicking_start_is_a_startup_failure() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("a", &events))
        .component(MockComponent::new("b", &events).with_start(StartBehavior::Panic))
        .build()
        .unwrap();

    let result = app.run_with_signal(never()).await;

    assert!(matches!(result, Err(AppError::System { .. })));
    assert!(events_with_prefix(&events, "stop").is_empty());
}

#[tokio::test]
async fn test_empty_application_runs_and_stops() {
    let app = App::new("empty", Vec::new());
    let result = app.run_with_signal(signal_after(Duration::from_millis(1))).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_component_states_through_a_run() {
    let events = new_log();
    let app = App::builder("test-app")
        .component(MockComponent::new("a", &events))
        .component(MockComponent::new("b", &events))
        .build()
        .unwrap();
    let states = app.states();
    assert!(states.snapshot().await.is_empty());

    let handle = app.shutdown_handle();
    let watcher = tokio::spawn({
        let states = states.clone();
        async move {
            while states.running().await < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            handle.shutdown();
        }
    });

    let result = app.run_with_signal(never()).await;
    assert!(result.is_ok());
    watcher.await.unwrap();

    let snapshot = states.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.values().all(|state| *state == ComponentState::Stopped));
}

#[test]
fn test_name_is_stable() {
    let events = new_log();
    let component = MockComponent::new("stable", &events);
    assert_eq!(component.name(), component.name());
    assert!(events.lock().unwrap().is_empty());

    let app = App::new("named", vec![Arc::new(component) as Arc<dyn Component>]);
    assert_eq!(app.name(), "named");
    assert_eq!(app.component_names(), vec!["stable".to_string()]);
}

#[test]
fn test_builder_rejects_zero_shutdown_timeout() {
    let result = App::builder("test-app")
        .shutdown_timeout(Duration::ZERO)
        .build();
    assert!(matches!(result, Err(AppError::Settings { .. })));
}

#[test]
fn test_builder_rejects_duplicate_component_names() {
    let events = new_log();
    let result = App::builder("test-app")
        .component(MockComponent::new("db", &events))
        .component(MockComponent::new("cache", &events))
        .component(MockComponent::new("db", &events))
        .build();
    match result {
        Err(AppError::Settings { message }) => assert!(message.contains("'db'")),
        Err(other) => panic!("expected settings error, got {:?}", other),
        Ok(_) => panic!("duplicate names were accepted"),
    }
}

#[test]
fn test_builder_applies_lifecycle_config() {
    let config = crate::config::LifecycleConfig {
        shutdown_timeout_seconds: 3,
        cleanup_on_startup_failure: true,
    };
    let app = App::builder("test-app").lifecycle(&config).build().unwrap();
    assert_eq!(app.shutdown_timeout(), Duration::from_secs(3));
    assert!(app.cleanup_on_startup_failure);
}

#[test]
fn test_shutdown_context_deadline() {
    let ctx = ShutdownContext::with_timeout(Duration::from_secs(10));
    assert!(!ctx.is_expired());
    assert!(ctx.remaining() <= Duration::from_secs(10));

    let expired = ShutdownContext::with_timeout(Duration::ZERO);
    assert!(expired.is_expired());
    assert_eq!(expired.remaining(), Duration::ZERO);
}
