use std::sync::{Arc, Mutex};

use tether_core::{
    DeliveryContext, DeliveryQueue, Error, LifecycleRegistry, Observable, SharedSource, SourceExt,
    Subject, Tristate, Visibility, from_values, just,
};
use tether_runtime::{Action, ActionCallbacks, BindManager, BindableExt, DriverExt, bindable_fn};

const CATALOG: &[&str] = &["rust", "ruby", "python", "go", "haskell"];

fn lookup(query: &str) -> Vec<String> {
    CATALOG
        .iter()
        .filter(|name| name.starts_with(query))
        .map(|name| (*name).to_string())
        .collect()
}

/// View-model scope plus the state it exposes to a search screen.
struct SearchModel {
    scope: Arc<LifecycleRegistry>,
    query: Observable<String>,
    search: Action<String, Vec<String>>,
}

impl SearchModel {
    fn new(queue: &DeliveryQueue) -> Self {
        let scope = Arc::new(LifecycleRegistry::resumed());
        let query = Observable::new(String::new());
        let trigger = query
            .clone()
            .into_driver_or_default()
            .deliver_on(DeliveryContext::queue(queue));
        let search = Action::triggered(&scope, trigger, |q: String| -> SharedSource<Vec<String>> {
            if q.is_empty() {
                Arc::new(just(Vec::new()))
            } else {
                Arc::new(from_values(vec![lookup(&q)]))
            }
        });
        Self {
            scope,
            query,
            search,
        }
    }
}

#[test]
fn search_screen_follows_the_query() {
    let queue = DeliveryQueue::new();
    let model = SearchModel::new(&queue);
    let manager = BindManager::new();
    let screen = Arc::new(LifecycleRegistry::resumed());

    let results = Observable::new(vec!["stale".to_string()]);
    let spinner_history = Arc::new(Mutex::new(Vec::new()));
    let list_visibility = Observable::new(Visibility::Gone);

    results.bind(&manager, &screen, model.search.output_driver(Vec::new()));
    let h = Arc::clone(&spinner_history);
    manager.bind(
        &screen,
        bindable_fn(move |v: Visibility| h.lock().unwrap().push(v)),
        model
            .search
            .executing_driver()
            .map(Visibility::from_flag, Visibility::Invisible),
    );
    list_visibility.bind(
        &manager,
        &screen,
        model
            .search
            .executing_driver()
            .map(Visibility::inverse_of, Visibility::Visible),
    );

    queue.run_pending();
    assert_eq!(results.get(), Vec::<String>::new());
    assert_eq!(list_visibility.get(), Visibility::Visible);

    model.query.set("ru".to_string());
    queue.run_pending();
    assert_eq!(results.get(), vec!["rust".to_string(), "ruby".to_string()]);
    assert_eq!(
        spinner_history.lock().unwrap().last(),
        Some(&Visibility::Invisible)
    );
    assert!(
        spinner_history
            .lock()
            .unwrap()
            .contains(&Visibility::Visible)
    );
    assert_eq!(list_visibility.get(), Visibility::Visible);
    assert!(!model.search.is_executing());

    screen.destroy();
    assert!(manager.is_empty());

    model.scope.destroy();
    assert!(model.search.is_destroyed());
    model.query.set("py".to_string());
    queue.run_pending();
    assert_eq!(model.search.value(), Some(vec!["rust".to_string(), "ruby".to_string()]));
}

#[test]
fn slow_earlier_query_never_overwrites_a_later_one() {
    let scope = Arc::new(LifecycleRegistry::resumed());
    let query = Subject::new();
    let pending: Arc<Mutex<Vec<(String, Subject<String>)>>> = Arc::new(Mutex::new(Vec::new()));
    let p = Arc::clone(&pending);

    let action = Action::triggered(
        &scope,
        query
            .clone()
            .into_driver(String::new())
            .deliver_on(DeliveryContext::immediate()),
        move |q: String| {
            let reply = Subject::new();
            p.lock().unwrap().push((q, reply.clone()));
            reply
        },
    );

    query.emit("a".to_string());
    query.emit("ab".to_string());
    assert!(action.is_executing());

    let replies = pending.lock().unwrap().clone();
    let (_, first) = &replies[0];
    let (_, second) = &replies[1];
    assert_eq!(first.observer_count(), 0);

    second.emit("result for ab".to_string());
    first.emit("result for a".to_string());

    assert_eq!(action.value(), Some("result for ab".to_string()));
    assert!(!action.is_executing());
}

#[test]
fn one_shot_ignores_start_while_running() {
    let queue = DeliveryQueue::new();
    let reply: Subject<u64> = Subject::new();
    let r = reply.clone();
    let action = Action::new(move |n: u64| r.clone().map(move |v: u64| v * n));
    action
        .deliver_on(DeliveryContext::queue(&queue))
        .input(2);

    action.start();
    action.start();
    assert_eq!(reply.observer_count(), 1);
    assert!(action.is_executing());

    reply.emit(21);
    reply.complete();
    queue.run_pending();

    assert_eq!(action.value(), Some(42));
    assert!(!action.is_executing());
    assert_eq!(reply.observer_count(), 0);

    action.start();
    assert_eq!(reply.observer_count(), 0);
}

#[test]
fn observed_one_shot_reports_every_phase_in_order() {
    let screen = Arc::new(LifecycleRegistry::resumed());
    let events = Arc::new(Mutex::new(Vec::new()));
    let action = Action::new(|name: String| from_values(vec![format!("saved {name}")]));
    action.deliver_on(DeliveryContext::immediate());

    let (e1, e2, e3, e4) = (
        Arc::clone(&events),
        Arc::clone(&events),
        Arc::clone(&events),
        Arc::clone(&events),
    );
    action.observe(
        &screen,
        ActionCallbacks::new()
            .on_executing(move |busy| e1.lock().unwrap().push(format!("executing {busy:?}")))
            .on_output(move |out: Option<&String>| {
                e2.lock().unwrap().push(format!("output {out:?}"));
            })
            .on_error(move |err| e3.lock().unwrap().push(format!("error {}", err.is_some())))
            .on_completed(move || e4.lock().unwrap().push("completed".to_string())),
    );

    action.input("draft".to_string()).start();

    let events = events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("executing Some(true)"));
    assert!(events.contains(&"output Some(\"saved draft\")".to_string()));
    assert!(events.contains(&"completed".to_string()));
    let done = events.iter().position(|e| e == "completed");
    let idle = events.iter().position(|e| e == "executing Some(false)");
    assert!(idle < done);
    assert!(!events.contains(&"error true".to_string()));
}

#[test]
fn failing_run_surfaces_error_until_next_start() {
    let attempts = Arc::new(Mutex::new(0u32));
    let a = Arc::clone(&attempts);
    let action = Action::new(move |_: ()| -> SharedSource<u32> {
        let mut n = a.lock().unwrap();
        *n += 1;
        if *n == 1 {
            Arc::new(tether_core::fail(Error::msg("offline")))
        } else {
            Arc::new(just(*n))
        }
    });
    action.deliver_on(DeliveryContext::immediate()).input(());

    action.start();
    assert!(matches!(action.error().value(), Tristate::Set(_)));
    assert!(!action.is_executing());

    action.start();
    assert!(!action.error().value().is_set());
    assert_eq!(action.value(), Some(2));
}

#[test]
fn error_channel_binds_into_a_label() {
    let manager = BindManager::new();
    let screen = Arc::new(LifecycleRegistry::resumed());
    let action: Action<(), u8> = Action::new(|_: ()| tether_core::fail(Error::msg("offline")));
    action.deliver_on(DeliveryContext::immediate()).input(());

    let label = Observable::new(String::new());
    label.bind(
        &manager,
        &screen,
        action
            .error()
            .clone()
            .map(|err: Error| err.to_string())
            .into_driver_or_default()
            .deliver_on(DeliveryContext::immediate()),
    );

    action.start();
    assert!(label.get().contains("offline"));
}
